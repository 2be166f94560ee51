// ============================================================================
// Inline expressions: `ds${0..1}.t_order_${[0, 1]}` and `t_order_${order_id % 2}`
// ============================================================================

use crate::core::{Result, ShardingError, Value};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref PLACEHOLDER: Regex = Regex::new(r"\$\{([^}]*)\}").expect("valid placeholder regex");
    static ref RANGE: Regex = Regex::new(r"^\s*(-?\d+)\s*\.\.\s*(-?\d+)\s*$").expect("valid range regex");
    static ref LIST: Regex = Regex::new(r"^\s*\[(.*)\]\s*$").expect("valid list regex");
    static ref MODULO: Regex =
        Regex::new(r"^\s*([A-Za-z_][A-Za-z0-9_]*)\s*(?:%\s*(\d+))?\s*$").expect("valid modulo regex");
}

/// Upper bound on the number of names a single expression may expand to.
const MAX_EXPANSION: usize = 65_536;

/// Expands an inline expression into every concrete name it denotes.
///
/// Comma-separated segments are expanded independently and concatenated in
/// order; placeholders within a segment expand as a cartesian product.
pub fn expand(expression: &str) -> Result<Vec<String>> {
    let mut result = Vec::new();
    for segment in split_segments(expression) {
        let segment = segment.trim();
        if segment.is_empty() {
            continue;
        }
        result.extend(expand_segment(segment)?);
        if result.len() > MAX_EXPANSION {
            return Err(ShardingError::Config(format!(
                "Inline expression '{}' expands to more than {} names",
                expression, MAX_EXPANSION
            )));
        }
    }
    Ok(result)
}

fn split_segments(expression: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    for (idx, ch) in expression.char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                segments.push(&expression[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }
    segments.push(&expression[start..]);
    segments
}

fn expand_segment(segment: &str) -> Result<Vec<String>> {
    let mut partial = vec![String::new()];
    let mut last = 0usize;
    for captures in PLACEHOLDER.captures_iter(segment) {
        let Some(whole) = captures.get(0) else {
            continue;
        };
        let literal = &segment[last..whole.start()];
        let choices = expand_placeholder(&captures[1], segment)?;
        let mut next = Vec::with_capacity(partial.len() * choices.len());
        for prefix in &partial {
            for choice in &choices {
                next.push(format!("{}{}{}", prefix, literal, choice));
            }
        }
        partial = next;
        last = whole.end();
    }
    let tail = &segment[last..];
    Ok(partial.into_iter().map(|prefix| prefix + tail).collect())
}

fn expand_placeholder(content: &str, segment: &str) -> Result<Vec<String>> {
    if let Some(captures) = RANGE.captures(content) {
        let lower: i64 = captures[1].parse().map_err(|_| invalid(segment))?;
        let upper: i64 = captures[2].parse().map_err(|_| invalid(segment))?;
        if upper < lower {
            return Err(ShardingError::Config(format!(
                "Inline range {}..{} in '{}' is empty",
                lower, upper, segment
            )));
        }
        if (upper - lower) as usize >= MAX_EXPANSION {
            return Err(invalid(segment));
        }
        return Ok((lower..=upper).map(|i| i.to_string()).collect());
    }
    if let Some(captures) = LIST.captures(content) {
        return Ok(captures[1]
            .split(',')
            .map(|item| item.trim().trim_matches(|c| c == '\'' || c == '"').to_string())
            .filter(|item| !item.is_empty())
            .collect());
    }
    Err(invalid(segment))
}

fn invalid(segment: &str) -> ShardingError {
    ShardingError::Config(format!("Invalid inline expression '{}'", segment))
}

/// A `${column % n}` placeholder of an evaluable expression.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Placeholder {
    column: String,
    modulus: Option<u64>,
}

/// An expression evaluated against sharding values, e.g. `t_order_${order_id % 2}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineExpression {
    source: String,
    literals: Vec<String>,
    placeholders: Vec<Placeholder>,
}

impl InlineExpression {
    pub fn parse(source: &str) -> Result<Self> {
        let mut literals = Vec::new();
        let mut placeholders = Vec::new();
        let mut last = 0usize;
        for captures in PLACEHOLDER.captures_iter(source) {
            let Some(whole) = captures.get(0) else {
                continue;
            };
            literals.push(source[last..whole.start()].to_string());
            let inner = MODULO.captures(&captures[1]).ok_or_else(|| invalid(source))?;
            let modulus = match inner.get(2) {
                Some(m) => {
                    let n: u64 = m.as_str().parse().map_err(|_| invalid(source))?;
                    if n == 0 {
                        return Err(ShardingError::Config(format!(
                            "Modulus must be >= 1 in '{}'",
                            source
                        )));
                    }
                    Some(n)
                }
                None => None,
            };
            placeholders.push(Placeholder {
                column: inner[1].to_string(),
                modulus,
            });
            last = whole.end();
        }
        literals.push(source[last..].to_string());
        if placeholders.is_empty() {
            return Err(ShardingError::Config(format!(
                "Inline expression '{}' has no placeholder",
                source
            )));
        }
        Ok(Self {
            source: source.to_string(),
            literals,
            placeholders,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Column names referenced by the placeholders, in order, without duplicates.
    pub fn columns(&self) -> Vec<String> {
        let mut columns: Vec<String> = Vec::new();
        for placeholder in &self.placeholders {
            if !columns.iter().any(|c| c.eq_ignore_ascii_case(&placeholder.column)) {
                columns.push(placeholder.column.clone());
            }
        }
        columns
    }

    /// Smallest modulus among the placeholders; bounds how many distinct names a range can hit.
    pub fn modulus(&self) -> Option<u64> {
        self.placeholders.iter().filter_map(|p| p.modulus).min()
    }

    /// Evaluates the expression, resolving each column through `lookup`.
    pub fn evaluate<F>(&self, lookup: F) -> Result<String>
    where
        F: Fn(&str) -> Option<Value>,
    {
        let mut out = String::with_capacity(self.source.len());
        for (idx, placeholder) in self.placeholders.iter().enumerate() {
            out.push_str(&self.literals[idx]);
            let value = lookup(&placeholder.column).ok_or_else(|| {
                ShardingError::UnsupportedRouting(format!(
                    "No sharding value for column '{}' in '{}'",
                    placeholder.column, self.source
                ))
            })?;
            match placeholder.modulus {
                Some(n) => {
                    let number = value.as_i64().ok_or_else(|| {
                        ShardingError::UnsupportedRouting(format!(
                            "Sharding value '{}' of column '{}' is not an integer",
                            value, placeholder.column
                        ))
                    })?;
                    out.push_str(&number.rem_euclid(n as i64).to_string());
                }
                None => out.push_str(&value.to_string()),
            }
        }
        out.push_str(&self.literals[self.placeholders.len()]);
        Ok(out)
    }
}
