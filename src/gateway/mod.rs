//! Account Gateway
//!
//! The sole authority for reading and mutating account balances and status.
//! The rest of the system consumes this narrow contract and never touches
//! account rows directly. Two implementations: `PgAccountGateway` for the
//! embedded (same-process) deployment, `HttpAccountGateway` for talking to
//! an out-of-process accounts service.

mod http;
mod pg;

pub use http::{
    HttpAccountGateway, WireBalance, WireError, WireMutation, WirePinRequest, WirePinResult,
};
pub use pg::PgAccountGateway;

use async_trait::async_trait;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::{AccountSnapshot, Amount, Balance};

/// Gateway error taxonomy, mirrored 1:1 onto transaction failure reasons.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Account not found: {0}")]
    NotFound(String),

    #[error("Account is inactive or closed: {0}")]
    Inactive(String),

    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds {
        required: Decimal,
        available: Decimal,
    },

    #[error("Account gateway unavailable: {0}")]
    Unavailable(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Account gateway internal error: {0}")]
    Internal(String),
}

/// Contract for account validation and balance mutation.
///
/// `debit` and `credit` are atomic against the stored row: any failure
/// leaves the balance untouched, and a retried call with the same
/// idempotency key returns the result of the first successful call
/// instead of applying the change again.
#[async_trait]
pub trait AccountGateway: Send + Sync {
    /// Current balance, status, and privilege tier. No side effects.
    async fn get_account(&self, account_number: &str) -> Result<AccountSnapshot, GatewayError>;

    /// Side-effect-free credential check.
    async fn verify_pin(&self, account_number: &str, pin: &str) -> Result<bool, GatewayError>;

    /// Atomically decrement the balance if the account is operational and
    /// the balance covers `amount`. Returns the new balance.
    async fn debit(
        &self,
        account_number: &str,
        amount: &Amount,
        idempotency_key: Uuid,
    ) -> Result<Balance, GatewayError>;

    /// Atomically increment the balance if the account is operational.
    /// Returns the new balance.
    async fn credit(
        &self,
        account_number: &str,
        amount: &Amount,
        idempotency_key: Uuid,
    ) -> Result<Balance, GatewayError>;
}
