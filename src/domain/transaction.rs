//! Transaction types
//!
//! One `TransactionRecord` per attempted withdrawal, deposit, or transfer.
//! Status moves pending -> success/failed only; a terminal record is
//! immutable.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Kind of attempted operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Withdraw,
    Deposit,
    Transfer,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Withdraw => "withdraw",
            TransactionType::Deposit => "deposit",
            TransactionType::Transfer => "transfer",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "withdraw" => Ok(TransactionType::Withdraw),
            "deposit" => Ok(TransactionType::Deposit),
            "transfer" => Ok(TransactionType::Transfer),
            other => Err(format!("Unknown transaction type: {}", other)),
        }
    }
}

/// Wire mode for account-to-account transfers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferMode {
    Neft,
    Rtgs,
    Imps,
    Upi,
    Cheque,
    Internal,
}

impl TransferMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferMode::Neft => "neft",
            TransferMode::Rtgs => "rtgs",
            TransferMode::Imps => "imps",
            TransferMode::Upi => "upi",
            TransferMode::Cheque => "cheque",
            TransferMode::Internal => "internal",
        }
    }
}

impl fmt::Display for TransferMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TransferMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "neft" => Ok(TransferMode::Neft),
            "rtgs" => Ok(TransferMode::Rtgs),
            "imps" => Ok(TransferMode::Imps),
            "upi" => Ok(TransferMode::Upi),
            "cheque" => Ok(TransferMode::Cheque),
            "internal" => Ok(TransferMode::Internal),
            other => Err(format!("Unknown transfer mode: {}", other)),
        }
    }
}

/// Lifecycle status. Terminal states are sinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Success,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Success => "success",
            TransactionStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TransactionStatus::Pending),
            "success" => Ok(TransactionStatus::Success),
            "failed" => Ok(TransactionStatus::Failed),
            other => Err(format!("Unknown transaction status: {}", other)),
        }
    }
}

/// Persisted transaction row.
///
/// `from_account` is None for pure deposits, `to_account` is None for pure
/// withdrawals. `amount` holds the raw requested value so that even an
/// invalid-amount attempt is recorded faithfully. The resulting balances
/// are stored on success so a replayed idempotency key can return the full
/// prior result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: Uuid,
    pub txn_type: TransactionType,
    pub transfer_mode: Option<TransferMode>,
    pub from_account: Option<String>,
    pub to_account: Option<String>,
    pub amount: Decimal,
    pub source_balance: Option<Decimal>,
    pub destination_balance: Option<Decimal>,
    pub status: TransactionStatus,
    pub idempotency_key: Uuid,
    pub description: Option<String>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TransactionRecord {
    /// True if this record references `account_number` on either side.
    pub fn involves(&self, account_number: &str) -> bool {
        self.from_account.as_deref() == Some(account_number)
            || self.to_account.as_deref() == Some(account_number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_terminal() {
        assert!(!TransactionStatus::Pending.is_terminal());
        assert!(TransactionStatus::Success.is_terminal());
        assert!(TransactionStatus::Failed.is_terminal());
    }

    #[test]
    fn test_transfer_mode_round_trip() {
        for mode in [
            TransferMode::Neft,
            TransferMode::Rtgs,
            TransferMode::Imps,
            TransferMode::Upi,
            TransferMode::Cheque,
            TransferMode::Internal,
        ] {
            assert_eq!(mode.as_str().parse::<TransferMode>().unwrap(), mode);
        }
    }

    #[test]
    fn test_txn_type_parse_unknown() {
        assert!("refund".parse::<TransactionType>().is_err());
    }

    #[test]
    fn test_involves() {
        let record = TransactionRecord {
            id: Uuid::new_v4(),
            txn_type: TransactionType::Transfer,
            transfer_mode: Some(TransferMode::Imps),
            from_account: Some("1001".to_string()),
            to_account: Some("1002".to_string()),
            amount: Decimal::new(500, 0),
            source_balance: None,
            destination_balance: None,
            status: TransactionStatus::Pending,
            idempotency_key: Uuid::new_v4(),
            description: None,
            error_code: None,
            error_message: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        assert!(record.involves("1001"));
        assert!(record.involves("1002"));
        assert!(!record.involves("1003"));
    }
}
