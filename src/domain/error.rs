//! Domain Error Types
//!
//! Pure business failures, independent of the web/infrastructure layer.
//! Every variant maps to a stable machine-readable failure code that is
//! persisted on the transaction record and audit row.

use rust_decimal::Decimal;
use thiserror::Error;

/// Business rule violations and precondition failures.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DomainError {
    /// Account does not exist
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    /// Account is inactive or closed
    #[error("Account is inactive or closed: {0}")]
    AccountInactive(String),

    /// PIN does not match the 4-6 digit format rule
    #[error("PIN must be 4 to 6 digits")]
    InvalidPinFormat,

    /// PIN credential check failed
    #[error("Invalid PIN")]
    InvalidPin,

    /// Amount is zero, negative, badly scaled, or out of range
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Transfer with identical source and destination
    #[error("Cannot transfer to the same account")]
    SameAccountTransfer,

    /// Balance does not cover the debit
    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds {
        required: Decimal,
        available: Decimal,
    },

    /// Daily transfer amount ceiling would be exceeded
    #[error("Daily transfer limit exceeded: remaining {remaining}, requested {requested}")]
    DailyAmountExceeded {
        remaining: Decimal,
        requested: Decimal,
    },

    /// Daily transaction count ceiling would be exceeded
    #[error("Daily transaction count limit ({ceiling}) exceeded")]
    DailyCountExceeded { ceiling: i32 },

    /// Source was debited but the destination credit did not complete.
    /// Requires reconciliation, not retry; never reversed automatically.
    #[error("Credit to {to_account} failed after debiting {amount} from {from_account}")]
    CreditFailedAfterDebit {
        from_account: String,
        to_account: String,
        amount: Decimal,
    },

    /// A collaborator was unreachable or timed out
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Unexpected datastore or internal failure
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DomainError {
    /// Stable machine-readable code, persisted with failed transactions.
    pub fn failure_code(&self) -> &'static str {
        match self {
            DomainError::AccountNotFound(_) => "account_not_found",
            DomainError::AccountInactive(_) => "account_inactive",
            DomainError::InvalidPinFormat => "invalid_pin_format",
            DomainError::InvalidPin => "invalid_pin",
            DomainError::InvalidAmount(_) => "invalid_amount",
            DomainError::SameAccountTransfer => "same_account_transfer",
            DomainError::InsufficientFunds { .. } => "insufficient_funds",
            DomainError::DailyAmountExceeded { .. } => "daily_amount_exceeded",
            DomainError::DailyCountExceeded { .. } => "daily_count_exceeded",
            DomainError::CreditFailedAfterDebit { .. } => "credit_failed_after_debit",
            DomainError::ServiceUnavailable(_) => "service_unavailable",
            DomainError::Internal(_) => "internal_error",
        }
    }

    /// Precondition failures: detected and reported before any mutation.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::AccountNotFound(_)
                | Self::AccountInactive(_)
                | Self::InvalidPinFormat
                | Self::InvalidPin
                | Self::InvalidAmount(_)
                | Self::SameAccountTransfer
        )
    }

    /// Business rule violations: legal requests the rules reject.
    pub fn is_business_rule(&self) -> bool {
        matches!(
            self,
            Self::InsufficientFunds { .. }
                | Self::DailyAmountExceeded { .. }
                | Self::DailyCountExceeded { .. }
        )
    }

    /// Partial failure: funds left the source but never reached the
    /// destination. Needs reconciliation tooling, never a blind retry.
    pub fn is_partial_failure(&self) -> bool {
        matches!(self, Self::CreditFailedAfterDebit { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_codes_stable() {
        assert_eq!(
            DomainError::InvalidPin.failure_code(),
            "invalid_pin"
        );
        assert_eq!(
            DomainError::DailyAmountExceeded {
                remaining: Decimal::new(2_000, 0),
                requested: Decimal::new(3_000, 0),
            }
            .failure_code(),
            "daily_amount_exceeded"
        );
        assert_eq!(
            DomainError::CreditFailedAfterDebit {
                from_account: "1001".to_string(),
                to_account: "1002".to_string(),
                amount: Decimal::new(500, 0),
            }
            .failure_code(),
            "credit_failed_after_debit"
        );
    }

    #[test]
    fn test_taxonomy_classifiers() {
        let precondition = DomainError::SameAccountTransfer;
        assert!(precondition.is_precondition());
        assert!(!precondition.is_business_rule());

        let rule = DomainError::InsufficientFunds {
            required: Decimal::new(100, 0),
            available: Decimal::new(50, 0),
        };
        assert!(rule.is_business_rule());
        assert!(!rule.is_precondition());

        let partial = DomainError::CreditFailedAfterDebit {
            from_account: "1001".to_string(),
            to_account: "1002".to_string(),
            amount: Decimal::new(500, 0),
        };
        assert!(partial.is_partial_failure());
        assert!(!partial.is_business_rule());
    }

    #[test]
    fn test_partial_failure_message_names_both_sides() {
        let err = DomainError::CreditFailedAfterDebit {
            from_account: "1001".to_string(),
            to_account: "1002".to_string(),
            amount: Decimal::new(500, 0),
        };
        let message = err.to_string();
        assert!(message.contains("1001"));
        assert!(message.contains("1002"));
        assert!(message.contains("500"));
    }
}
