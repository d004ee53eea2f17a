//! Error taxonomy for the payment core

use sea_orm::DbErr;
use thiserror::Error;

use crate::services::gateway::GatewayError;

pub type PaymentResult<T> = Result<T, PaymentError>;

#[derive(Debug, Error)]
pub enum PaymentError {
    /// Malformed purchase request; raised before any gateway call or write
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    /// Adapter call failed. Nothing local was changed, the caller may retry.
    #[error("payment gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// Ledger legs missing or disagreeing with their business row
    #[error("ledger inconsistency: {0}")]
    Consistency(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("database error: {0}")]
    Database(#[from] DbErr),
}

impl PaymentError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, PaymentError::Gateway(_) | PaymentError::Database(_))
    }
}
