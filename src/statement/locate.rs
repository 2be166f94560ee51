// ============================================================================
// Token location over logical SQL text
// ============================================================================
//
// The statement builder receives already-parsed structure from the caller but
// still needs byte positions for the rewriter. These helpers scan the text
// once, skipping string literals and tracking parenthesis depth, so only
// top-level keywords and real identifiers are reported.
//
// ============================================================================

use super::condition::ValueExpr;
use super::insert::{InsertClause, InsertRow};
use super::select::{Limit, LimitValue};
use crate::core::{Result, ShardingError, Value};

fn is_ident_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'$'
}

/// Per-byte flag: true when the byte belongs to a single-quoted literal.
fn literal_mask(sql: &str) -> Vec<bool> {
    let bytes = sql.as_bytes();
    let mut mask = vec![false; bytes.len()];
    let mut in_literal = false;
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\'' {
            if in_literal && bytes.get(i + 1) == Some(&b'\'') {
                mask[i] = true;
                mask[i + 1] = true;
                i += 2;
                continue;
            }
            in_literal = !in_literal;
            mask[i] = true;
        } else {
            mask[i] = in_literal;
        }
        i += 1;
    }
    mask
}

/// Parenthesis depth at every byte, ignoring literals.
fn depth_map(sql: &str, mask: &[bool]) -> Vec<usize> {
    let mut depths = Vec::with_capacity(sql.len());
    let mut depth = 0usize;
    for (i, byte) in sql.bytes().enumerate() {
        if !mask[i] && byte == b')' {
            depth = depth.saturating_sub(1);
        }
        depths.push(depth);
        if !mask[i] && byte == b'(' {
            depth += 1;
        }
    }
    depths
}

fn matches_word_at(sql: &str, mask: &[bool], at: usize, word: &str) -> bool {
    let bytes = sql.as_bytes();
    let end = at + word.len();
    if end > bytes.len() || mask[at] {
        return false;
    }
    if !bytes[at..end].eq_ignore_ascii_case(word.as_bytes()) {
        return false;
    }
    let before_ok = at == 0 || !is_ident_byte(bytes[at - 1]);
    let after_ok = end == bytes.len() || !is_ident_byte(bytes[end]);
    before_ok && after_ok
}

/// Every `(start, end)` span where `identifier` appears as a whole word
/// outside string literals, case-insensitively.
pub fn find_identifier(sql: &str, identifier: &str) -> Vec<(usize, usize)> {
    if identifier.is_empty() {
        return Vec::new();
    }
    let mask = literal_mask(sql);
    (0..sql.len())
        .filter(|&at| sql.is_char_boundary(at) && matches_word_at(sql, &mask, at, identifier))
        .map(|at| (at, at + identifier.len()))
        .collect()
}

/// First top-level occurrence of `keyword` at or after `from`.
pub fn find_keyword(sql: &str, keyword: &str, from: usize) -> Option<usize> {
    let mask = literal_mask(sql);
    let depths = depth_map(sql, &mask);
    (from..sql.len()).find(|&at| {
        sql.is_char_boundary(at) && depths[at] == 0 && matches_word_at(sql, &mask, at, keyword)
    })
}

/// Number of `?` placeholders before `position`, i.e. the ordinal of the next one.
pub fn placeholder_ordinal(sql: &str, position: usize) -> usize {
    let mask = literal_mask(sql);
    sql.as_bytes()[..position.min(sql.len())]
        .iter()
        .enumerate()
        .filter(|(i, byte)| **byte == b'?' && !mask[*i])
        .count()
}

fn skip_whitespace(bytes: &[u8], mut at: usize) -> usize {
    while at < bytes.len() && bytes[at].is_ascii_whitespace() {
        at += 1;
    }
    at
}

/// Where derived text belongs at the end of the statement: before a trailing
/// semicolon and whitespace.
pub fn statement_end(sql: &str) -> usize {
    sql.trim_end().trim_end_matches(';').trim_end().len()
}

fn parse_limit_term(sql: &str, at: usize) -> Result<(LimitValue, usize)> {
    let bytes = sql.as_bytes();
    let start = skip_whitespace(bytes, at);
    if bytes.get(start) == Some(&b'?') {
        let value = LimitValue {
            value: ValueExpr::Parameter(placeholder_ordinal(sql, start)),
            start,
            end: start + 1,
        };
        return Ok((value, start + 1));
    }
    let mut end = start;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    let number: i64 = sql[start..end].parse().map_err(|_| {
        ShardingError::Rewrite(format!("Cannot read LIMIT value at byte {} of '{}'", start, sql))
    })?;
    let value = LimitValue {
        value: ValueExpr::Literal(Value::Integer(number)),
        start,
        end,
    };
    Ok((value, end))
}

/// Reads `LIMIT count`, `LIMIT offset, count` or `LIMIT count OFFSET offset`.
pub fn locate_limit(sql: &str) -> Result<Option<Limit>> {
    let Some(keyword) = find_keyword(sql, "LIMIT", 0) else {
        return Ok(None);
    };
    let bytes = sql.as_bytes();
    let (first, after_first) = parse_limit_term(sql, keyword + "LIMIT".len())?;
    let next = skip_whitespace(bytes, after_first);
    if bytes.get(next) == Some(&b',') {
        let (second, _) = parse_limit_term(sql, next + 1)?;
        return Ok(Some(Limit {
            offset: Some(first),
            row_count: Some(second),
        }));
    }
    if let Some(offset_at) = find_keyword(sql, "OFFSET", next).filter(|at| *at == next) {
        let (second, _) = parse_limit_term(sql, offset_at + "OFFSET".len())?;
        return Ok(Some(Limit {
            offset: Some(second),
            row_count: Some(first),
        }));
    }
    Ok(Some(Limit {
        offset: None,
        row_count: Some(first),
    }))
}

/// Index of the `)` closing the `(` at `open`.
fn matching_paren(sql: &str, mask: &[bool], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, byte) in sql.bytes().enumerate().skip(open) {
        if mask[i] {
            continue;
        }
        match byte {
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Splits `sql[start..end]` on top-level commas, returning trimmed spans.
fn split_top_level(sql: &str, mask: &[bool], start: usize, end: usize) -> Vec<(usize, usize)> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut part_start = start;
    for i in start..end {
        if mask[i] {
            continue;
        }
        match sql.as_bytes()[i] {
            b'(' => depth += 1,
            b')' => depth = depth.saturating_sub(1),
            b',' if depth == 0 => {
                parts.push((part_start, i));
                part_start = i + 1;
            }
            _ => {}
        }
    }
    parts.push((part_start, end));
    parts
        .into_iter()
        .map(|(s, e)| {
            let text = &sql[s..e];
            let lead = text.len() - text.trim_start().len();
            let trail = text.len() - text.trim_end().len();
            (s + lead, e - trail)
        })
        .filter(|(s, e)| s < e)
        .collect()
}

fn parse_insert_value(sql: &str, start: usize, end: usize) -> ValueExpr {
    let text = &sql[start..end];
    if text == "?" {
        return ValueExpr::Parameter(placeholder_ordinal(sql, start));
    }
    if text.len() >= 2 && text.starts_with('\'') && text.ends_with('\'') {
        return ValueExpr::Literal(Value::Text(text[1..text.len() - 1].replace("''", "'")));
    }
    if text.eq_ignore_ascii_case("NULL") {
        return ValueExpr::Literal(Value::Null);
    }
    if text.eq_ignore_ascii_case("TRUE") || text.eq_ignore_ascii_case("FALSE") {
        return ValueExpr::Literal(Value::Boolean(text.eq_ignore_ascii_case("TRUE")));
    }
    if let Ok(number) = text.parse::<i64>() {
        return ValueExpr::Literal(Value::Integer(number));
    }
    if let Ok(number) = text.parse::<f64>() {
        return ValueExpr::Literal(Value::Float(number));
    }
    ValueExpr::Expression(text.to_string())
}

/// Reads the column list and the `VALUES (...), (...)` rows of an INSERT.
pub fn locate_insert(sql: &str) -> Result<InsertClause> {
    let values_at = find_keyword(sql, "VALUES", 0)
        .ok_or_else(|| ShardingError::Routing(format!("INSERT without VALUES: '{}'", sql)))?;
    let mask = literal_mask(sql);
    let bytes = sql.as_bytes();

    let mut columns = Vec::new();
    let mut columns_end = None;
    let before = sql[..values_at].trim_end();
    if before.ends_with(')') {
        let close = before.len() - 1;
        let open = (0..close)
            .rev()
            .find(|&i| !mask[i] && bytes[i] == b'(' && matching_paren(sql, &mask, i) == Some(close))
            .ok_or_else(|| ShardingError::Routing(format!("Unbalanced column list in '{}'", sql)))?;
        columns = split_top_level(sql, &mask, open + 1, close)
            .into_iter()
            .map(|(s, e)| sql[s..e].trim_matches(|c| c == '`' || c == '"').to_string())
            .collect();
        columns_end = Some(close);
    }

    let mut rows = Vec::new();
    let mut at = values_at + "VALUES".len();
    loop {
        at = skip_whitespace(bytes, at);
        if bytes.get(at) != Some(&b'(') {
            break;
        }
        let close = matching_paren(sql, &mask, at)
            .ok_or_else(|| ShardingError::Routing(format!("Unbalanced VALUES row in '{}'", sql)))?;
        let values: Vec<ValueExpr> = split_top_level(sql, &mask, at + 1, close)
            .into_iter()
            .map(|(s, e)| parse_insert_value(sql, s, e))
            .collect();
        let first_parameter = placeholder_ordinal(sql, at);
        let parameter_end = placeholder_ordinal(sql, close);
        rows.push(InsertRow {
            start: at,
            end: close + 1,
            values,
            parameters: first_parameter..parameter_end,
        });
        at = skip_whitespace(bytes, close + 1);
        if bytes.get(at) == Some(&b',') {
            at += 1;
        } else {
            break;
        }
    }
    if rows.is_empty() {
        return Err(ShardingError::Routing(format!("INSERT has no VALUES rows: '{}'", sql)));
    }
    Ok(InsertClause {
        columns,
        columns_end,
        rows,
    })
}
