//! Command definitions
//!
//! Commands represent a caller's intent to move money. Amounts travel as
//! strings so precision survives the wire; parsing and validation happen
//! inside the engine where the failure can be recorded.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{TransactionRecord, TransactionStatus, TransferMode};

/// Command to withdraw cash from an account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawCommand {
    pub account_number: String,
    pub amount: String,
    pub pin: String,
    pub description: Option<String>,
}

impl WithdrawCommand {
    pub fn new(account_number: String, amount: String, pin: String) -> Self {
        Self {
            account_number,
            amount,
            pin,
            description: None,
        }
    }

    pub fn with_description(mut self, description: String) -> Self {
        self.description = Some(description);
        self
    }
}

/// Command to deposit cash into an account. No PIN: deposits only require
/// the account to exist and be active.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositCommand {
    pub account_number: String,
    pub amount: String,
    pub description: Option<String>,
}

impl DepositCommand {
    pub fn new(account_number: String, amount: String) -> Self {
        Self {
            account_number,
            amount,
            description: None,
        }
    }

    pub fn with_description(mut self, description: String) -> Self {
        self.description = Some(description);
        self
    }
}

/// Command to transfer between two accounts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferCommand {
    pub from_account: String,
    pub to_account: String,
    pub amount: String,
    pub pin: String,
    pub mode: TransferMode,
    pub description: Option<String>,
}

impl TransferCommand {
    pub fn new(
        from_account: String,
        to_account: String,
        amount: String,
        pin: String,
        mode: TransferMode,
    ) -> Self {
        Self {
            from_account,
            to_account,
            amount,
            pin,
            mode,
            description: None,
        }
    }

    pub fn with_description(mut self, description: String) -> Self {
        self.description = Some(description);
        self
    }
}

/// Balances observed after a successful mutation.
#[derive(Debug, Clone, Default)]
pub struct BalanceChanges {
    pub source_balance: Option<Decimal>,
    pub destination_balance: Option<Decimal>,
}

/// Terminal result of one transaction attempt, successful or not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionOutcome {
    pub transaction_id: Uuid,
    pub status: TransactionStatus,
    pub source_balance: Option<Decimal>,
    pub destination_balance: Option<Decimal>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
}

impl TransactionOutcome {
    /// The record carries its resulting balances once terminal, so a fresh
    /// completion and an idempotent replay build the same outcome.
    pub fn from_record(record: &TransactionRecord) -> Self {
        Self {
            transaction_id: record.id,
            status: record.status,
            source_balance: record.source_balance,
            destination_balance: record.destination_balance,
            error_code: record.error_code.clone(),
            error_message: record.error_message.clone(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == TransactionStatus::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_withdraw_command_builder() {
        let cmd = WithdrawCommand::new(
            "1001".to_string(),
            "3000.00".to_string(),
            "4321".to_string(),
        )
        .with_description("ATM withdrawal".to_string());

        assert_eq!(cmd.amount, "3000.00");
        assert_eq!(cmd.description, Some("ATM withdrawal".to_string()));
    }

    #[test]
    fn test_outcome_carries_stored_balances() {
        use crate::domain::{TransactionRecord, TransactionType};
        use chrono::Utc;

        let record = TransactionRecord {
            id: Uuid::new_v4(),
            txn_type: TransactionType::Withdraw,
            transfer_mode: None,
            from_account: Some("1001".to_string()),
            to_account: None,
            amount: Decimal::new(3_000, 0),
            source_balance: Some(Decimal::new(7_000, 0)),
            destination_balance: None,
            status: TransactionStatus::Success,
            idempotency_key: Uuid::new_v4(),
            description: None,
            error_code: None,
            error_message: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let outcome = TransactionOutcome::from_record(&record);
        assert!(outcome.is_success());
        assert_eq!(outcome.source_balance, Some(Decimal::new(7_000, 0)));
        assert!(outcome.destination_balance.is_none());
    }

    #[test]
    fn test_transfer_command_builder() {
        let cmd = TransferCommand::new(
            "1001".to_string(),
            "1002".to_string(),
            "2000".to_string(),
            "4321".to_string(),
            TransferMode::Imps,
        );

        assert_eq!(cmd.mode, TransferMode::Imps);
        assert!(cmd.description.is_none());
    }
}
