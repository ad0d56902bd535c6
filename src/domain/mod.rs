//! Domain types
//!
//! Validated domain primitives and pure business types shared by the
//! gateway, limit ledger, transfer engine, and audit trail.

mod account;
mod amount;
mod context;
mod error;
mod transaction;

pub use account::{pin_digest, validate_pin_format, AccountSnapshot, AccountType, PrivilegeTier};
pub use amount::{Amount, AmountError, Balance};
pub use context::OperationContext;
pub use error::DomainError;
pub use transaction::{
    TransactionRecord, TransactionStatus, TransactionType, TransferMode,
};
