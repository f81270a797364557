//! Error type shared by the builder and the slice reader.

use thiserror::Error;

/// Error type for all velocypack operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VpackError {
    #[error("builder value not yet sealed")]
    BuilderNotClosed,
    #[error("need open array or object")]
    BuilderNeedOpenCompound,
    #[error("need open array")]
    BuilderNeedOpenArray,
    #[error("need open object")]
    BuilderNeedOpenObject,
    #[error("need at least one subvalue")]
    BuilderNeedSubValue,
    #[error("attribute key already written")]
    BuilderKeyAlreadyWritten,
    #[error("attribute key must be a string")]
    BuilderKeyMustBeString,
    #[error("unexpected value type: {0}")]
    BuilderUnexpectedType(String),
    #[error("duplicate attribute name")]
    DuplicateAttributeName,
    #[error("cannot translate integer attribute name without translator")]
    NeedAttributeTranslator,
    #[error("invalid type: {0}")]
    InvalidType(String),
    #[error("index out of bounds")]
    IndexOutOfBounds,
    #[error("number out of range")]
    NumberOutOfRange,
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, VpackError>;
