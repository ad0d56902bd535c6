//! Limit Ledger
//!
//! Tracks per-account, per-UTC-calendar-day transfer usage and enforces the
//! privilege-tier daily ceilings. The critical contract is
//! `check_and_reserve`: the ceiling check and the usage increment are one
//! conditional upsert against the (account, date) row, so two concurrent
//! transfers can never both pass the check and then both record usage.

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::PgPool;

use crate::domain::{Amount, PrivilegeTier};

/// Daily ceilings for one privilege tier. Reference data; the core never
/// writes these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferLimitRule {
    pub privilege: PrivilegeTier,
    pub daily_amount_ceiling: Decimal,
    pub daily_txn_ceiling: i32,
}

impl TransferLimitRule {
    /// Policy constants per tier. These seed the rules table and serve as
    /// the fallback when a row is missing.
    pub fn defaults_for(privilege: PrivilegeTier) -> Self {
        let (amount, count) = match privilege {
            PrivilegeTier::Silver => (25_000, 20),
            PrivilegeTier::Gold => (50_000, 30),
            PrivilegeTier::Premium => (100_000, 50),
        };
        Self {
            privilege,
            daily_amount_ceiling: Decimal::from(amount),
            daily_txn_ceiling: count,
        }
    }
}

/// What an account can still transfer today. Floored at zero.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct RemainingCapacity {
    pub remaining_amount: Decimal,
    pub remaining_count: i32,
}

/// Limit ledger errors.
#[derive(Debug, thiserror::Error)]
pub enum LimitError {
    #[error("Daily transfer limit exceeded: remaining {remaining}, requested {requested}")]
    AmountExceeded {
        remaining: Decimal,
        requested: Decimal,
    },

    #[error("Daily transaction count limit ({ceiling}) exceeded")]
    CountExceeded { ceiling: i32 },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Capacity queries and usage reservation for daily transfer limits.
#[async_trait]
pub trait LimitLedger: Send + Sync {
    /// The rule for a privilege tier.
    async fn get_rule(&self, privilege: PrivilegeTier) -> Result<TransferLimitRule, LimitError>;

    /// Remaining amount/count capacity for `account_number` on `day`.
    /// A missing usage row means zero usage.
    async fn remaining_capacity(
        &self,
        account_number: &str,
        privilege: PrivilegeTier,
        day: NaiveDate,
    ) -> Result<RemainingCapacity, LimitError>;

    /// Atomically reserve `amount` (and one transaction slot) against the
    /// daily ceilings. On success the usage is recorded; the reservation is
    /// not released if the subsequent debit fails.
    async fn check_and_reserve(
        &self,
        account_number: &str,
        privilege: PrivilegeTier,
        amount: &Amount,
        day: NaiveDate,
    ) -> Result<(), LimitError>;
}

/// Postgres-backed limit ledger.
#[derive(Debug, Clone)]
pub struct PgLimitLedger {
    pool: PgPool,
}

impl PgLimitLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn current_usage(
        &self,
        account_number: &str,
        day: NaiveDate,
    ) -> Result<(Decimal, i32), LimitError> {
        let usage: Option<(Decimal, i32)> = sqlx::query_as(
            r#"
            SELECT total_amount, txn_count
            FROM daily_usage
            WHERE account_number = $1 AND usage_date = $2
            "#,
        )
        .bind(account_number)
        .bind(day)
        .fetch_optional(&self.pool)
        .await?;

        Ok(usage.unwrap_or((Decimal::ZERO, 0)))
    }

    /// Decide which ceiling a rejected reservation hit, from a fresh read.
    async fn classify_rejection(
        &self,
        account_number: &str,
        day: NaiveDate,
        rule: &TransferLimitRule,
        requested: Decimal,
    ) -> Result<LimitError, LimitError> {
        let (total, count) = self.current_usage(account_number, day).await?;

        if total + requested > rule.daily_amount_ceiling {
            let remaining = (rule.daily_amount_ceiling - total).max(Decimal::ZERO);
            Ok(LimitError::AmountExceeded {
                remaining,
                requested,
            })
        } else {
            // Usage only grows, so when the amount ceiling clears on this
            // read the count ceiling is what rejected the upsert.
            debug_assert!(count + 1 > rule.daily_txn_ceiling);
            Ok(LimitError::CountExceeded {
                ceiling: rule.daily_txn_ceiling,
            })
        }
    }
}

#[async_trait]
impl LimitLedger for PgLimitLedger {
    async fn get_rule(&self, privilege: PrivilegeTier) -> Result<TransferLimitRule, LimitError> {
        let row: Option<(Decimal, i32)> = sqlx::query_as(
            r#"
            SELECT daily_amount_ceiling, daily_txn_ceiling
            FROM transfer_limit_rules
            WHERE privilege = $1
            "#,
        )
        .bind(privilege.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(match row {
            Some((daily_amount_ceiling, daily_txn_ceiling)) => TransferLimitRule {
                privilege,
                daily_amount_ceiling,
                daily_txn_ceiling,
            },
            None => {
                tracing::warn!(
                    tier = privilege.as_str(),
                    "No limit rule row for tier, using built-in defaults"
                );
                TransferLimitRule::defaults_for(privilege)
            }
        })
    }

    async fn remaining_capacity(
        &self,
        account_number: &str,
        privilege: PrivilegeTier,
        day: NaiveDate,
    ) -> Result<RemainingCapacity, LimitError> {
        let rule = self.get_rule(privilege).await?;
        let (total, count) = self.current_usage(account_number, day).await?;

        Ok(RemainingCapacity {
            remaining_amount: (rule.daily_amount_ceiling - total).max(Decimal::ZERO),
            remaining_count: (rule.daily_txn_ceiling - count).max(0),
        })
    }

    async fn check_and_reserve(
        &self,
        account_number: &str,
        privilege: PrivilegeTier,
        amount: &Amount,
        day: NaiveDate,
    ) -> Result<(), LimitError> {
        let rule = self.get_rule(privilege).await?;
        let requested = amount.value();

        // The fresh-insert path has no existing row to guard on.
        if requested > rule.daily_amount_ceiling {
            return Err(self
                .classify_rejection(account_number, day, &rule, requested)
                .await?);
        }
        if rule.daily_txn_ceiling < 1 {
            return Err(LimitError::CountExceeded {
                ceiling: rule.daily_txn_ceiling,
            });
        }

        // Single guarded upsert: the check and the increment happen against
        // the same row in one statement. No row returned means a ceiling
        // would have been crossed and nothing was recorded.
        let reserved: Option<(Decimal, i32)> = sqlx::query_as(
            r#"
            INSERT INTO daily_usage (account_number, usage_date, total_amount, txn_count)
            VALUES ($1, $2, $3, 1)
            ON CONFLICT (account_number, usage_date) DO UPDATE
            SET total_amount = daily_usage.total_amount + EXCLUDED.total_amount,
                txn_count = daily_usage.txn_count + 1
            WHERE daily_usage.total_amount + EXCLUDED.total_amount <= $4
              AND daily_usage.txn_count + 1 <= $5
            RETURNING total_amount, txn_count
            "#,
        )
        .bind(account_number)
        .bind(day)
        .bind(requested)
        .bind(rule.daily_amount_ceiling)
        .bind(rule.daily_txn_ceiling)
        .fetch_optional(&self.pool)
        .await?;

        match reserved {
            Some((total, count)) => {
                tracing::debug!(
                    account = account_number,
                    %day,
                    total = %total,
                    count,
                    "Daily usage reserved"
                );
                Ok(())
            }
            None => Err(self
                .classify_rejection(account_number, day, &rule, requested)
                .await?),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rules_per_tier() {
        let silver = TransferLimitRule::defaults_for(PrivilegeTier::Silver);
        assert_eq!(silver.daily_amount_ceiling, Decimal::from(25_000));
        assert_eq!(silver.daily_txn_ceiling, 20);

        let gold = TransferLimitRule::defaults_for(PrivilegeTier::Gold);
        assert_eq!(gold.daily_amount_ceiling, Decimal::from(50_000));
        assert_eq!(gold.daily_txn_ceiling, 30);

        let premium = TransferLimitRule::defaults_for(PrivilegeTier::Premium);
        assert_eq!(premium.daily_amount_ceiling, Decimal::from(100_000));
        assert_eq!(premium.daily_txn_ceiling, 50);
    }

    #[test]
    fn test_limit_error_display() {
        let err = LimitError::AmountExceeded {
            remaining: Decimal::new(2_000, 0),
            requested: Decimal::new(3_000, 0),
        };
        assert!(err.to_string().contains("2000"));
        assert!(err.to_string().contains("3000"));

        let err = LimitError::CountExceeded { ceiling: 30 };
        assert!(err.to_string().contains("30"));
    }
}
