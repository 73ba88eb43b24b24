//! Ledger error types.

use crate::game::Chips;
use thiserror::Error;

/// Ledger errors
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Guarded debit failed: balance below the requested amount
    #[error("Insufficient chips: available {available}, required {required}")]
    InsufficientChips { available: Chips, required: Chips },

    /// No account exists for the key
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    /// Delta amounts must be positive
    #[error("Invalid amount: {0}")]
    InvalidAmount(Chips),
}

impl LedgerError {
    /// Client-safe message that doesn't leak store internals.
    pub fn client_message(&self) -> String {
        match self {
            LedgerError::Database(_) => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }
}

/// Result type for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;
