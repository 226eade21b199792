//! Error types for the item store.

use crate::types::ItemId;
use thiserror::Error;

/// Main error type for store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Item not found: {0}")]
    NotFound(ItemId),

    #[error("Invalid input: {0}")]
    Validation(#[from] ValidationError),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Corruption detected: {0}")]
    Corruption(String),

    #[error("Checksum mismatch: expected {expected}, got {got}")]
    ChecksumMismatch { expected: u32, got: u32 },

    #[error("Store is locked by another process")]
    Locked,

    #[error("Store not initialized")]
    NotInitialized,

    #[error("Invalid store format: {0}")]
    InvalidFormat(String),

    #[error("Store service has shut down")]
    Closed,

    #[error("Timed out waiting for the store")]
    TimedOut,
}

/// Coarse classification used by callers to decide how to report a failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorClass {
    /// Bad user input, rejected before reaching the store.
    Validation,
    /// The targeted item does not exist.
    NotFound,
    /// Anything the storage layer failed at.
    Storage,
}

impl StoreError {
    pub fn class(&self) -> ErrorClass {
        match self {
            StoreError::Validation(_) => ErrorClass::Validation,
            StoreError::NotFound(_) => ErrorClass::NotFound,
            _ => ErrorClass::Storage,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

/// Rejected form or prompt input.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("item name must not be empty")]
    EmptyName,

    #[error("quantity is not a whole number: {0:?}")]
    InvalidQuantity(String),

    #[error("quantity must be greater than zero, got {0}")]
    NonPositiveQuantity(i64),

    #[error("quantity must not be negative, got {0}")]
    NegativeQuantity(i64),
}

impl From<rmp_serde::encode::Error> for StoreError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for StoreError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        StoreError::Deserialization(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_class() {
        assert_eq!(StoreError::NotFound(ItemId(3)).class(), ErrorClass::NotFound);
        assert_eq!(
            StoreError::from(ValidationError::EmptyName).class(),
            ErrorClass::Validation
        );
        assert_eq!(StoreError::Locked.class(), ErrorClass::Storage);
        assert_eq!(StoreError::Closed.class(), ErrorClass::Storage);
    }

    #[test]
    fn test_validation_messages() {
        let err = ValidationError::InvalidQuantity("ten".into());
        assert_eq!(err.to_string(), "quantity is not a whole number: \"ten\"");
        assert_eq!(
            ValidationError::NonPositiveQuantity(0).to_string(),
            "quantity must be greater than zero, got 0"
        );
    }
}
