use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("Invalid input for {0}: {1}")]
    InvalidInput(String, String),

    #[error("Unknown {kind} '{value}'. Must be one of: {allowed}")]
    UnknownVariant {
        kind: &'static str,
        value: String,
        allowed: String,
    },

    /// A business rule rejected the request. The message is client facing.
    #[error("{0}")]
    Rule(String),

    #[error("Calculation error: {0}")]
    Calculation(String),
}
