//! Audit Trail
//!
//! Append-only record of every transaction attempt, success or failure.
//! Recording is best-effort auxiliary work: a failure to write an audit row
//! must never mask or alter the already-determined transaction status, so
//! the engine logs and continues when `record` errs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::{TransactionRecord, TransactionStatus};

/// One audit row. Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub transaction_id: Uuid,
    pub txn_type: String,
    pub status: String,
    pub from_account: Option<String>,
    pub to_account: Option<String>,
    pub amount: Decimal,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

/// Audit trail errors.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Append and query the audit log.
#[async_trait]
pub trait AuditTrail: Send + Sync {
    /// Record one transaction attempt. Called unconditionally, regardless
    /// of the transaction's outcome.
    async fn record(&self, transaction: &TransactionRecord) -> Result<Uuid, AuditError>;

    /// Entry for a specific transaction, if recorded.
    async fn get_by_transaction(
        &self,
        transaction_id: Uuid,
    ) -> Result<Option<AuditEntry>, AuditError>;

    /// Entries where the account appears as source or destination,
    /// newest first, optionally bounded to a date range.
    async fn get_by_account(
        &self,
        account_number: &str,
        skip: i64,
        limit: i64,
        range: Option<(DateTime<Utc>, DateTime<Utc>)>,
    ) -> Result<Vec<AuditEntry>, AuditError>;

    /// Entries with a given status, newest first.
    async fn get_by_status(
        &self,
        status: TransactionStatus,
        skip: i64,
        limit: i64,
    ) -> Result<Vec<AuditEntry>, AuditError>;
}

type AuditRow = (
    Uuid,
    Uuid,
    String,
    String,
    Option<String>,
    Option<String>,
    Decimal,
    Option<String>,
    Option<String>,
    DateTime<Utc>,
);

fn entry_from_row(row: AuditRow) -> AuditEntry {
    let (
        id,
        transaction_id,
        txn_type,
        status,
        from_account,
        to_account,
        amount,
        error_code,
        error_message,
        recorded_at,
    ) = row;
    AuditEntry {
        id,
        transaction_id,
        txn_type,
        status,
        from_account,
        to_account,
        amount,
        error_code,
        error_message,
        recorded_at,
    }
}

/// Postgres-backed audit trail.
#[derive(Debug, Clone)]
pub struct PgAuditTrail {
    pool: PgPool,
}

impl PgAuditTrail {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditTrail for PgAuditTrail {
    async fn record(&self, transaction: &TransactionRecord) -> Result<Uuid, AuditError> {
        let id = Uuid::new_v4();

        sqlx::query(
            r#"
            INSERT INTO audit_logs (
                id, transaction_id, txn_type, status,
                from_account, to_account, amount,
                error_code, error_message
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(id)
        .bind(transaction.id)
        .bind(transaction.txn_type.as_str())
        .bind(transaction.status.as_str())
        .bind(&transaction.from_account)
        .bind(&transaction.to_account)
        .bind(transaction.amount)
        .bind(&transaction.error_code)
        .bind(&transaction.error_message)
        .execute(&self.pool)
        .await?;

        tracing::debug!(
            audit_id = %id,
            transaction_id = %transaction.id,
            status = transaction.status.as_str(),
            "Audit entry recorded"
        );

        Ok(id)
    }

    async fn get_by_transaction(
        &self,
        transaction_id: Uuid,
    ) -> Result<Option<AuditEntry>, AuditError> {
        let row: Option<AuditRow> = sqlx::query_as(
            r#"
            SELECT id, transaction_id, txn_type, status,
                   from_account, to_account, amount,
                   error_code, error_message, recorded_at
            FROM audit_logs
            WHERE transaction_id = $1
            ORDER BY recorded_at DESC
            LIMIT 1
            "#,
        )
        .bind(transaction_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(entry_from_row))
    }

    async fn get_by_account(
        &self,
        account_number: &str,
        skip: i64,
        limit: i64,
        range: Option<(DateTime<Utc>, DateTime<Utc>)>,
    ) -> Result<Vec<AuditEntry>, AuditError> {
        let rows: Vec<AuditRow> = match range {
            Some((from, to)) => {
                sqlx::query_as(
                    r#"
                    SELECT id, transaction_id, txn_type, status,
                           from_account, to_account, amount,
                           error_code, error_message, recorded_at
                    FROM audit_logs
                    WHERE (from_account = $1 OR to_account = $1)
                      AND recorded_at >= $2 AND recorded_at <= $3
                    ORDER BY recorded_at DESC
                    OFFSET $4 LIMIT $5
                    "#,
                )
                .bind(account_number)
                .bind(from)
                .bind(to)
                .bind(skip)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as(
                    r#"
                    SELECT id, transaction_id, txn_type, status,
                           from_account, to_account, amount,
                           error_code, error_message, recorded_at
                    FROM audit_logs
                    WHERE from_account = $1 OR to_account = $1
                    ORDER BY recorded_at DESC
                    OFFSET $2 LIMIT $3
                    "#,
                )
                .bind(account_number)
                .bind(skip)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
        };

        Ok(rows.into_iter().map(entry_from_row).collect())
    }

    async fn get_by_status(
        &self,
        status: TransactionStatus,
        skip: i64,
        limit: i64,
    ) -> Result<Vec<AuditEntry>, AuditError> {
        let rows: Vec<AuditRow> = sqlx::query_as(
            r#"
            SELECT id, transaction_id, txn_type, status,
                   from_account, to_account, amount,
                   error_code, error_message, recorded_at
            FROM audit_logs
            WHERE status = $1
            ORDER BY recorded_at DESC
            OFFSET $2 LIMIT $3
            "#,
        )
        .bind(status.as_str())
        .bind(skip)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(entry_from_row).collect())
    }
}
