use thiserror::Error;

/// Errors that can occur while framing raw bytes into a [`crate::resp::Token`].
///
/// Every variant carries the byte offset (relative to the start of the buffer
/// that was handed to [`crate::resp::parse`]) at which the problem was found,
/// so callers can report a deterministic position.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("invalid leading byte {byte:#04x} at offset {offset}")]
    InvalidLeadingByte { byte: u8, offset: usize },

    #[error("invalid data at offset {offset}: {reason}")]
    InvalidData { offset: usize, reason: &'static str },

    #[error("invalid element count {count} at offset {offset}")]
    InvalidElementCount { count: i64, offset: usize },

    #[error("aggregates nested deeper than {max} levels at offset {offset}")]
    TooDeeplyNestedAggregates { max: usize, offset: usize },

    #[error("verbatim string is missing its ':' type marker at offset {offset}")]
    MissingColonInVerbatimString { offset: usize },

    #[error("could not parse integer from {bytes:?} at offset {offset}")]
    CanNotParseInteger { bytes: Vec<u8>, offset: usize },

    #[error("could not parse double from {bytes:?} at offset {offset}")]
    CanNotParseDouble { bytes: Vec<u8>, offset: usize },

    #[error("could not parse big number from {bytes:?} at offset {offset}")]
    CanNotParseBigNumber { bytes: Vec<u8>, offset: usize },
}

/// Errors that occur when converting an already-framed [`crate::resp::Value`]
/// into a typed Rust value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("expected one of {accepted:?}, got {got}")]
    TokenMismatch {
        accepted: &'static [&'static str],
        got: &'static str,
    },

    #[error("invalid array size {got}, expected {expected}")]
    InvalidArraySize { got: usize, expected: String },

    #[error("missing expected token for key {key}")]
    MissingToken { key: String },

    #[error("could not parse integer from {0:?}")]
    CanNotParseInteger(Vec<u8>),

    #[error("could not parse double from {0:?}")]
    CanNotParseDouble(Vec<u8>),

    #[error("unexpected token: {0}")]
    UnexpectedToken(String),
}

impl DecodeError {
    pub(crate) fn invalid_array_size(got: usize, expected: impl Into<String>) -> Self {
        Self::InvalidArraySize {
            got,
            expected: expected.into(),
        }
    }
}
