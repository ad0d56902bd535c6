//! Postgres account gateway
//!
//! Balance mutations are single conditional UPDATEs so the active/closed
//! check, the sufficient-balance check, and the decrement happen as one
//! indivisible step against the stored row. Idempotency is enforced by a
//! dedup ledger (`gateway_operations`) claimed inside the same database
//! transaction as the balance change.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::{
    pin_digest, AccountSnapshot, AccountType, Amount, Balance, PrivilegeTier,
};

use super::{AccountGateway, GatewayError};

/// Account gateway backed directly by the accounts table.
#[derive(Debug, Clone)]
pub struct PgAccountGateway {
    pool: PgPool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpKind {
    Debit,
    Credit,
}

impl OpKind {
    fn as_str(&self) -> &'static str {
        match self {
            OpKind::Debit => "debit",
            OpKind::Credit => "credit",
        }
    }
}

impl PgAccountGateway {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Return the stored result of a previously committed operation with
    /// this idempotency key.
    async fn replay_result(&self, idempotency_key: Uuid) -> Result<Balance, GatewayError> {
        let stored: Option<(Option<Decimal>,)> = sqlx::query_as(
            r#"
            SELECT resulting_balance FROM gateway_operations
            WHERE idempotency_key = $1
            "#,
        )
        .bind(idempotency_key)
        .fetch_optional(&self.pool)
        .await?;

        match stored {
            Some((Some(balance),)) => Balance::new(balance)
                .map_err(|e| GatewayError::Internal(e.to_string())),
            Some((None,)) => Err(GatewayError::Internal(format!(
                "dedup row for key {} has no recorded result",
                idempotency_key
            ))),
            None => Err(GatewayError::Internal(format!(
                "dedup row for key {} disappeared",
                idempotency_key
            ))),
        }
    }

    async fn apply(
        &self,
        account_number: &str,
        amount: &Amount,
        idempotency_key: Uuid,
        op: OpKind,
    ) -> Result<Balance, GatewayError> {
        let mut tx = self.pool.begin().await?;

        // Claim the idempotency key first. A replay, or a concurrent call
        // with the same key, loses the claim and gets the stored result.
        // Concurrent claimants block here until the winner commits.
        let claimed = sqlx::query(
            r#"
            INSERT INTO gateway_operations (idempotency_key, account_number, op_kind, amount)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (idempotency_key) DO NOTHING
            "#,
        )
        .bind(idempotency_key)
        .bind(account_number)
        .bind(op.as_str())
        .bind(amount.value())
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if claimed == 0 {
            tx.rollback().await?;
            return self.replay_result(idempotency_key).await;
        }

        let updated: Option<(Decimal,)> = match op {
            OpKind::Debit => {
                sqlx::query_as(
                    r#"
                    UPDATE accounts
                    SET balance = balance - $2
                    WHERE account_number = $1
                      AND is_active
                      AND closed_at IS NULL
                      AND balance >= $2
                    RETURNING balance
                    "#,
                )
                .bind(account_number)
                .bind(amount.value())
                .fetch_optional(&mut *tx)
                .await?
            }
            OpKind::Credit => {
                sqlx::query_as(
                    r#"
                    UPDATE accounts
                    SET balance = balance + $2
                    WHERE account_number = $1
                      AND is_active
                      AND closed_at IS NULL
                    RETURNING balance
                    "#,
                )
                .bind(account_number)
                .bind(amount.value())
                .fetch_optional(&mut *tx)
                .await?
            }
        };

        let new_balance = match updated {
            Some((balance,)) => balance,
            None => {
                // Distinguish the rejection reason while still inside the
                // transaction. The claim row rolls back with it, so a later
                // retry of the same key is evaluated afresh.
                let row: Option<(bool, Option<DateTime<Utc>>, Decimal)> = sqlx::query_as(
                    r#"
                    SELECT is_active, closed_at, balance
                    FROM accounts
                    WHERE account_number = $1
                    "#,
                )
                .bind(account_number)
                .fetch_optional(&mut *tx)
                .await?;

                tx.rollback().await?;

                return Err(match row {
                    None => GatewayError::NotFound(account_number.to_string()),
                    Some((is_active, closed_at, _)) if !is_active || closed_at.is_some() => {
                        GatewayError::Inactive(account_number.to_string())
                    }
                    Some((_, _, available)) => GatewayError::InsufficientFunds {
                        required: amount.value(),
                        available,
                    },
                });
            }
        };

        sqlx::query(
            r#"
            UPDATE gateway_operations
            SET resulting_balance = $2
            WHERE idempotency_key = $1
            "#,
        )
        .bind(idempotency_key)
        .bind(new_balance)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::debug!(
            account = account_number,
            op = op.as_str(),
            amount = %amount,
            new_balance = %new_balance,
            "Balance mutation applied"
        );

        Balance::new(new_balance).map_err(|e| GatewayError::Internal(e.to_string()))
    }
}

#[async_trait::async_trait]
impl AccountGateway for PgAccountGateway {
    async fn get_account(&self, account_number: &str) -> Result<AccountSnapshot, GatewayError> {
        let row: Option<(
            String,
            String,
            String,
            Decimal,
            String,
            bool,
            Option<DateTime<Utc>>,
        )> = sqlx::query_as(
            r#"
            SELECT account_number, account_type, holder_name, balance, privilege,
                   is_active, closed_at
            FROM accounts
            WHERE account_number = $1
            "#,
        )
        .bind(account_number)
        .fetch_optional(&self.pool)
        .await?;

        let (account_number, account_type, holder_name, balance, privilege, is_active, closed_at) =
            row.ok_or_else(|| GatewayError::NotFound(account_number.to_string()))?;

        let account_type: AccountType = account_type
            .parse()
            .map_err(GatewayError::Internal)?;
        let privilege: PrivilegeTier = privilege
            .parse()
            .map_err(GatewayError::Internal)?;

        Ok(AccountSnapshot {
            account_number,
            account_type,
            holder_name,
            balance,
            privilege,
            is_active,
            closed_at,
        })
    }

    async fn verify_pin(&self, account_number: &str, pin: &str) -> Result<bool, GatewayError> {
        let row: Option<(String, String)> = sqlx::query_as(
            r#"
            SELECT pin_salt, pin_hash FROM accounts WHERE account_number = $1
            "#,
        )
        .bind(account_number)
        .fetch_optional(&self.pool)
        .await?;

        let (salt, hash) =
            row.ok_or_else(|| GatewayError::NotFound(account_number.to_string()))?;

        Ok(pin_digest(pin, &salt) == hash)
    }

    async fn debit(
        &self,
        account_number: &str,
        amount: &Amount,
        idempotency_key: Uuid,
    ) -> Result<Balance, GatewayError> {
        self.apply(account_number, amount, idempotency_key, OpKind::Debit)
            .await
    }

    async fn credit(
        &self,
        account_number: &str,
        amount: &Amount,
        idempotency_key: Uuid,
    ) -> Result<Balance, GatewayError> {
        self.apply(account_number, amount, idempotency_key, OpKind::Credit)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_op_kind_as_str() {
        assert_eq!(OpKind::Debit.as_str(), "debit");
        assert_eq!(OpKind::Credit.as_str(), "credit");
    }
}
