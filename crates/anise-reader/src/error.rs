use thiserror::Error;

pub const ERROR_TAG: &str = "\x1b[31m[ERROR]\x1b[0m";

/// Every reader failure falls into one of these families. The message is the
/// payload; the reader reports no stream locations.
#[derive(Error, Debug, Clone)]
pub enum ReaderError {
    #[error("{0}")]
    Eof(String),

    #[error("{0}")]
    Lexical(String),

    #[error("{0}")]
    Structural(String),

    #[error("{0}")]
    Semantic(String),

    #[error("{0}")]
    MacroPosition(String),
}

impl ReaderError {
    pub fn eof(message: impl Into<String>) -> Self {
        ReaderError::Eof(message.into())
    }

    pub fn lexical(message: impl Into<String>) -> Self {
        ReaderError::Lexical(message.into())
    }

    pub fn structural(message: impl Into<String>) -> Self {
        ReaderError::Structural(message.into())
    }

    pub fn semantic(message: impl Into<String>) -> Self {
        ReaderError::Semantic(message.into())
    }

    pub fn macro_position(message: impl Into<String>) -> Self {
        ReaderError::MacroPosition(message.into())
    }

    pub fn message(&self) -> &str {
        match self {
            ReaderError::Eof(msg)
            | ReaderError::Lexical(msg)
            | ReaderError::Structural(msg)
            | ReaderError::Semantic(msg)
            | ReaderError::MacroPosition(msg) => msg,
        }
    }
}

/// Render an error the way the CLI surfaces diagnostics.
pub fn format_error(err: &ReaderError) -> String {
    format!("{} {}", ERROR_TAG, err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_the_bare_message() {
        let err = ReaderError::structural("Unmatched delimiter: )");
        assert_eq!(err.to_string(), "Unmatched delimiter: )");
    }

    #[test]
    fn format_error_prefixes_the_tag() {
        let err = ReaderError::eof("EOF while reading");
        assert!(format_error(&err).contains("[ERROR]"));
        assert!(format_error(&err).ends_with("EOF while reading"));
    }
}
