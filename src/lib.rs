//! bank-core Library
//!
//! Re-exports modules for integration testing and external use.

pub mod api;
pub mod audit;
pub mod domain;
pub mod engine;
pub mod gateway;
pub mod limits;

// Private modules (used only by main.rs binary)
pub mod config;
pub mod db;
mod error;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use domain::{Amount, AmountError, Balance, DomainError, OperationContext};
pub use engine::{TransactionOutcome, TransferEngine};
