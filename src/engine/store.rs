//! Transaction Store
//!
//! Persists transaction rows through their lifecycle. Two storage rules
//! carry the engine's guarantees: the unique index on the idempotency key
//! (a duplicate insert surfaces the prior record instead of creating a
//! second one) and the status guard on terminal updates (`WHERE status =
//! 'pending'`), which makes pending -> success/failed a one-way door.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::{
    TransactionRecord, TransactionStatus, TransactionType, TransferMode,
};

use super::BalanceChanges;

/// Fields for a new pending transaction row.
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub id: Uuid,
    pub txn_type: TransactionType,
    pub transfer_mode: Option<TransferMode>,
    pub from_account: Option<String>,
    pub to_account: Option<String>,
    pub amount: Decimal,
    pub idempotency_key: Uuid,
    pub description: Option<String>,
}

/// Transaction store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("A transaction with this idempotency key already exists")]
    DuplicateKey(Box<TransactionRecord>),

    #[error("Transaction not found: {0}")]
    NotFound(Uuid),

    #[error("Transaction {0} is already terminal")]
    AlreadyTerminal(Uuid),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Corrupt transaction row: {0}")]
    Corrupt(String),
}

/// Lifecycle operations on transaction rows.
#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Insert a pending row. If the idempotency key is already taken,
    /// returns `StoreError::DuplicateKey` carrying the existing record.
    async fn create_pending(&self, new: NewTransaction) -> Result<TransactionRecord, StoreError>;

    /// Transition pending -> success, storing the resulting balances so a
    /// replayed idempotency key can return them. Fails if the row is
    /// already terminal.
    async fn mark_success(
        &self,
        id: Uuid,
        changes: &BalanceChanges,
    ) -> Result<TransactionRecord, StoreError>;

    /// Transition pending -> failed with a stable failure code and message.
    async fn mark_failed(
        &self,
        id: Uuid,
        error_code: &str,
        error_message: &str,
    ) -> Result<TransactionRecord, StoreError>;

    /// Fetch a transaction by id.
    async fn get(&self, id: Uuid) -> Result<Option<TransactionRecord>, StoreError>;
}

type TxnRow = (
    Uuid,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    Decimal,
    Option<Decimal>,
    Option<Decimal>,
    String,
    Uuid,
    Option<String>,
    Option<String>,
    Option<String>,
    DateTime<Utc>,
    DateTime<Utc>,
);

fn record_from_row(row: TxnRow) -> Result<TransactionRecord, StoreError> {
    let (
        id,
        txn_type,
        transfer_mode,
        from_account,
        to_account,
        amount,
        source_balance,
        destination_balance,
        status,
        idempotency_key,
        description,
        error_code,
        error_message,
        created_at,
        updated_at,
    ) = row;

    let txn_type: TransactionType = txn_type.parse().map_err(StoreError::Corrupt)?;
    let status: TransactionStatus = status.parse().map_err(StoreError::Corrupt)?;
    let transfer_mode = transfer_mode
        .map(|m| m.parse::<TransferMode>())
        .transpose()
        .map_err(StoreError::Corrupt)?;

    Ok(TransactionRecord {
        id,
        txn_type,
        transfer_mode,
        from_account,
        to_account,
        amount,
        source_balance,
        destination_balance,
        status,
        idempotency_key,
        description,
        error_code,
        error_message,
        created_at,
        updated_at,
    })
}

const TXN_COLUMNS: &str = "id, txn_type, transfer_mode, from_account, to_account, amount, \
     source_balance, destination_balance, status, idempotency_key, description, error_code, \
     error_message, created_at, updated_at";

/// Postgres-backed transaction store.
#[derive(Debug, Clone)]
pub struct PgTransactionStore {
    pool: PgPool,
}

impl PgTransactionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn get_by_idempotency_key(
        &self,
        key: Uuid,
    ) -> Result<Option<TransactionRecord>, StoreError> {
        let row: Option<TxnRow> = sqlx::query_as(&format!(
            "SELECT {} FROM transactions WHERE idempotency_key = $1",
            TXN_COLUMNS
        ))
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        row.map(record_from_row).transpose()
    }
}

#[async_trait]
impl TransactionStore for PgTransactionStore {
    async fn create_pending(&self, new: NewTransaction) -> Result<TransactionRecord, StoreError> {
        let row: Option<TxnRow> = sqlx::query_as(&format!(
            r#"
            INSERT INTO transactions (
                id, txn_type, transfer_mode, from_account, to_account,
                amount, status, idempotency_key, description
            )
            VALUES ($1, $2, $3, $4, $5, $6, 'pending', $7, $8)
            ON CONFLICT (idempotency_key) DO NOTHING
            RETURNING {}
            "#,
            TXN_COLUMNS
        ))
        .bind(new.id)
        .bind(new.txn_type.as_str())
        .bind(new.transfer_mode.map(|m| m.as_str()))
        .bind(&new.from_account)
        .bind(&new.to_account)
        .bind(new.amount)
        .bind(new.idempotency_key)
        .bind(&new.description)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => record_from_row(row),
            None => {
                let existing = self
                    .get_by_idempotency_key(new.idempotency_key)
                    .await?
                    .ok_or_else(|| {
                        StoreError::Corrupt(format!(
                            "idempotency key {} conflicted but no row found",
                            new.idempotency_key
                        ))
                    })?;
                Err(StoreError::DuplicateKey(Box::new(existing)))
            }
        }
    }

    async fn mark_success(
        &self,
        id: Uuid,
        changes: &BalanceChanges,
    ) -> Result<TransactionRecord, StoreError> {
        let row: Option<TxnRow> = sqlx::query_as(&format!(
            r#"
            UPDATE transactions
            SET status = 'success', source_balance = $2, destination_balance = $3,
                updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            RETURNING {}
            "#,
            TXN_COLUMNS
        ))
        .bind(id)
        .bind(changes.source_balance)
        .bind(changes.destination_balance)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => record_from_row(row),
            None => match self.get(id).await? {
                Some(_) => Err(StoreError::AlreadyTerminal(id)),
                None => Err(StoreError::NotFound(id)),
            },
        }
    }

    async fn mark_failed(
        &self,
        id: Uuid,
        error_code: &str,
        error_message: &str,
    ) -> Result<TransactionRecord, StoreError> {
        let row: Option<TxnRow> = sqlx::query_as(&format!(
            r#"
            UPDATE transactions
            SET status = 'failed', error_code = $2, error_message = $3, updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            RETURNING {}
            "#,
            TXN_COLUMNS
        ))
        .bind(id)
        .bind(error_code)
        .bind(error_message)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => record_from_row(row),
            None => match self.get(id).await? {
                Some(_) => Err(StoreError::AlreadyTerminal(id)),
                None => Err(StoreError::NotFound(id)),
            },
        }
    }

    async fn get(&self, id: Uuid) -> Result<Option<TransactionRecord>, StoreError> {
        let row: Option<TxnRow> = sqlx::query_as(&format!(
            "SELECT {} FROM transactions WHERE id = $1",
            TXN_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(record_from_row).transpose()
    }
}
