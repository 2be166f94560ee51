use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ShardingError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Routing error: {0}")]
    Routing(String),

    #[error("Unsupported routing: {0}")]
    UnsupportedRouting(String),

    #[error("Incompatible join: {0}")]
    IncompatibleJoin(String),

    #[error("Rewrite error: {0}")]
    Rewrite(String),

    #[error("Execution error on '{data_source}': {message}")]
    Execution { data_source: String, message: String },

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Key generation error: {0}")]
    KeyGeneration(String),

    #[error("Merge error: {0}")]
    Merge(String),

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Arithmetic overflow: {0}")]
    Overflow(String),

    #[error("Lock error: {0}")]
    LockError(String),
}

impl ShardingError {
    pub fn execution(data_source: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Execution {
            data_source: data_source.into(),
            message: message.into(),
        }
    }

    /// True for errors raised before any backend was contacted.
    pub fn is_routing_error(&self) -> bool {
        matches!(
            self,
            Self::Routing(_) | Self::UnsupportedRouting(_) | Self::IncompatibleJoin(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ShardingError>;

impl<T> From<std::sync::PoisonError<T>> for ShardingError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}

impl From<serde_json::Error> for ShardingError {
    fn from(err: serde_json::Error) -> Self {
        Self::Config(err.to_string())
    }
}
