//! Transfer Engine
//!
//! Orchestrates one transaction from request to terminal state across the
//! account gateway, the limit ledger, and the audit trail. Step ordering is
//! mandatory and never parallelized: validate -> limit-check -> debit ->
//! credit -> status update -> audit. Every collaborator call is bounded by
//! a timeout; a hung collaborator becomes FAILED(service_unavailable), not
//! a transaction stuck in pending.

mod commands;
mod store;


pub use commands::{
    BalanceChanges, DepositCommand, TransactionOutcome, TransferCommand, WithdrawCommand,
};
pub use store::{NewTransaction, PgTransactionStore, StoreError, TransactionStore};

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::audit::AuditTrail;
use crate::domain::{
    validate_pin_format, AccountSnapshot, Amount, DomainError, OperationContext,
    TransactionRecord, TransactionStatus, TransactionType,
};
use crate::gateway::{AccountGateway, GatewayError};
use crate::limits::{LimitError, LimitLedger};

/// Engine failures that cannot be represented as a recorded transaction.
/// Business failures never show up here; they terminate the transaction as
/// FAILED and come back inside a `TransactionOutcome`.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Transaction with idempotency key {0} is still in progress")]
    TransactionInFlight(Uuid),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The transaction-processing core.
pub struct TransferEngine {
    gateway: Arc<dyn AccountGateway>,
    limits: Arc<dyn LimitLedger>,
    audit: Arc<dyn AuditTrail>,
    store: Arc<dyn TransactionStore>,
    call_timeout: Duration,
}

impl TransferEngine {
    pub fn new(
        gateway: Arc<dyn AccountGateway>,
        limits: Arc<dyn LimitLedger>,
        audit: Arc<dyn AuditTrail>,
        store: Arc<dyn TransactionStore>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            gateway,
            limits,
            audit,
            store,
            call_timeout,
        }
    }

    // =========================================================================
    // Entry points
    // =========================================================================

    /// Withdraw cash: validate account, PIN, amount, funds, then debit.
    pub async fn withdraw(
        &self,
        command: WithdrawCommand,
        idempotency_key: Option<Uuid>,
        context: &OperationContext,
    ) -> Result<TransactionOutcome, EngineError> {
        let raw_amount = parse_raw_amount(&command.amount)?;
        let key = idempotency_key.unwrap_or_else(Uuid::new_v4);

        let record = match self
            .store
            .create_pending(NewTransaction {
                id: Uuid::new_v4(),
                txn_type: TransactionType::Withdraw,
                transfer_mode: None,
                from_account: Some(command.account_number.clone()),
                to_account: None,
                amount: raw_amount,
                idempotency_key: key,
                description: command.description.clone(),
            })
            .await
        {
            Ok(record) => record,
            Err(StoreError::DuplicateKey(prior)) => return self.replay(*prior),
            Err(e) => return Err(e.into()),
        };

        let result = self.run_withdraw(&command, raw_amount, key).await;
        self.finalize(record, result, context).await
    }

    /// Deposit cash: only account existence/activity and amount gate the
    /// credit. No PIN, no balance check, no daily limit.
    pub async fn deposit(
        &self,
        command: DepositCommand,
        idempotency_key: Option<Uuid>,
        context: &OperationContext,
    ) -> Result<TransactionOutcome, EngineError> {
        let raw_amount = parse_raw_amount(&command.amount)?;
        let key = idempotency_key.unwrap_or_else(Uuid::new_v4);

        let record = match self
            .store
            .create_pending(NewTransaction {
                id: Uuid::new_v4(),
                txn_type: TransactionType::Deposit,
                transfer_mode: None,
                from_account: None,
                to_account: Some(command.account_number.clone()),
                amount: raw_amount,
                idempotency_key: key,
                description: command.description.clone(),
            })
            .await
        {
            Ok(record) => record,
            Err(StoreError::DuplicateKey(prior)) => return self.replay(*prior),
            Err(e) => return Err(e.into()),
        };

        let result = self.run_deposit(&command, raw_amount, key).await;
        self.finalize(record, result, context).await
    }

    /// Account-to-account transfer: the full pipeline including the daily
    /// limit reservation, which must land strictly before the source debit.
    pub async fn transfer(
        &self,
        command: TransferCommand,
        idempotency_key: Option<Uuid>,
        context: &OperationContext,
    ) -> Result<TransactionOutcome, EngineError> {
        let raw_amount = parse_raw_amount(&command.amount)?;
        let key = idempotency_key.unwrap_or_else(Uuid::new_v4);

        let record = match self
            .store
            .create_pending(NewTransaction {
                id: Uuid::new_v4(),
                txn_type: TransactionType::Transfer,
                transfer_mode: Some(command.mode),
                from_account: Some(command.from_account.clone()),
                to_account: Some(command.to_account.clone()),
                amount: raw_amount,
                idempotency_key: key,
                description: command.description.clone(),
            })
            .await
        {
            Ok(record) => record,
            Err(StoreError::DuplicateKey(prior)) => return self.replay(*prior),
            Err(e) => return Err(e.into()),
        };

        let result = self.run_transfer(&command, raw_amount, key).await;
        self.finalize(record, result, context).await
    }

    /// Look up a transaction by id.
    pub async fn get_transaction(
        &self,
        id: Uuid,
    ) -> Result<Option<TransactionRecord>, EngineError> {
        Ok(self.store.get(id).await?)
    }

    // =========================================================================
    // Pipelines
    // =========================================================================

    async fn run_withdraw(
        &self,
        command: &WithdrawCommand,
        raw_amount: Decimal,
        key: Uuid,
    ) -> Result<BalanceChanges, DomainError> {
        let snapshot = self.fetch_operational(&command.account_number).await?;

        self.check_pin(&command.account_number, &command.pin).await?;

        let amount = validate_amount(raw_amount)?;
        check_advisory_funds(&snapshot, &amount)?;

        let new_balance = self
            .gateway_call(self.gateway.debit(&command.account_number, &amount, key))
            .await?;

        Ok(BalanceChanges {
            source_balance: Some(new_balance.value()),
            destination_balance: None,
        })
    }

    async fn run_deposit(
        &self,
        command: &DepositCommand,
        raw_amount: Decimal,
        key: Uuid,
    ) -> Result<BalanceChanges, DomainError> {
        self.fetch_operational(&command.account_number).await?;

        let amount = validate_amount(raw_amount)?;

        let new_balance = self
            .gateway_call(self.gateway.credit(&command.account_number, &amount, key))
            .await?;

        Ok(BalanceChanges {
            source_balance: None,
            destination_balance: Some(new_balance.value()),
        })
    }

    async fn run_transfer(
        &self,
        command: &TransferCommand,
        raw_amount: Decimal,
        key: Uuid,
    ) -> Result<BalanceChanges, DomainError> {
        // Rejected before any collaborator call.
        if command.from_account == command.to_account {
            return Err(DomainError::SameAccountTransfer);
        }

        let source = self.fetch_operational(&command.from_account).await?;
        self.fetch_operational(&command.to_account).await?;

        self.check_pin(&command.from_account, &command.pin).await?;

        let amount = validate_amount(raw_amount)?;
        check_advisory_funds(&source, &amount)?;

        // Limit reservation must land strictly before the source debit.
        // If the debit then fails, the reservation stays spent for the day.
        let today = Utc::now().date_naive();
        match self
            .limits
            .remaining_capacity(&command.from_account, source.privilege, today)
            .await
        {
            Ok(capacity) => tracing::debug!(
                account = command.from_account.as_str(),
                remaining_amount = %capacity.remaining_amount,
                remaining_count = capacity.remaining_count,
                "Daily capacity before reservation"
            ),
            Err(e) => tracing::warn!(
                account = command.from_account.as_str(),
                error = %e,
                "Capacity lookup failed; reservation remains the authority"
            ),
        }

        self.limit_call(self.limits.check_and_reserve(
            &command.from_account,
            source.privilege,
            &amount,
            today,
        ))
        .await?;

        let source_balance = self
            .gateway_call(self.gateway.debit(&command.from_account, &amount, key))
            .await?;

        // The credit gets its own idempotency key; the transaction key
        // already identifies the debit leg.
        let credit_key = Uuid::new_v4();
        let destination_balance = match self
            .gateway_call(self.gateway.credit(&command.to_account, &amount, credit_key))
            .await
        {
            Ok(balance) => balance,
            Err(credit_err) => {
                // Genuine partial failure: the source has already been
                // debited. Surfaced with a distinct reason so operational
                // tooling can reconcile; never reversed automatically.
                tracing::error!(
                    from_account = command.from_account.as_str(),
                    to_account = command.to_account.as_str(),
                    amount = %amount,
                    source_balance_after_debit = %source_balance.value(),
                    error = %credit_err,
                    "Credit failed after successful debit; manual reconciliation required"
                );
                return Err(DomainError::CreditFailedAfterDebit {
                    from_account: command.from_account.clone(),
                    to_account: command.to_account.clone(),
                    amount: amount.value(),
                });
            }
        };

        Ok(BalanceChanges {
            source_balance: Some(source_balance.value()),
            destination_balance: Some(destination_balance.value()),
        })
    }

    // =========================================================================
    // Shared steps
    // =========================================================================

    async fn fetch_operational(
        &self,
        account_number: &str,
    ) -> Result<AccountSnapshot, DomainError> {
        let snapshot = self
            .gateway_call(self.gateway.get_account(account_number))
            .await?;

        if !snapshot.is_operational() {
            return Err(DomainError::AccountInactive(account_number.to_string()));
        }

        Ok(snapshot)
    }

    async fn check_pin(&self, account_number: &str, pin: &str) -> Result<(), DomainError> {
        if !validate_pin_format(pin) {
            return Err(DomainError::InvalidPinFormat);
        }

        let valid = self
            .gateway_call(self.gateway.verify_pin(account_number, pin))
            .await?;

        if !valid {
            return Err(DomainError::InvalidPin);
        }

        Ok(())
    }

    async fn gateway_call<T, F>(&self, fut: F) -> Result<T, DomainError>
    where
        F: Future<Output = Result<T, GatewayError>> + Send,
    {
        match tokio::time::timeout(self.call_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(map_gateway_error(e)),
            Err(_) => Err(DomainError::ServiceUnavailable(
                "account gateway timed out".to_string(),
            )),
        }
    }

    async fn limit_call<F>(&self, fut: F) -> Result<(), DomainError>
    where
        F: Future<Output = Result<(), LimitError>> + Send,
    {
        match tokio::time::timeout(self.call_timeout, fut).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(map_limit_error(e)),
            Err(_) => Err(DomainError::ServiceUnavailable(
                "limit ledger timed out".to_string(),
            )),
        }
    }

    /// A replayed idempotency key: a terminal prior transaction yields its
    /// recorded outcome; a pending one is still being worked on.
    fn replay(&self, prior: TransactionRecord) -> Result<TransactionOutcome, EngineError> {
        if prior.status.is_terminal() {
            tracing::info!(
                transaction_id = %prior.id,
                idempotency_key = %prior.idempotency_key,
                "Replaying terminal transaction for repeated idempotency key"
            );
            Ok(TransactionOutcome::from_record(&prior))
        } else {
            Err(EngineError::TransactionInFlight(prior.idempotency_key))
        }
    }

    /// Drive the record to its terminal state and write the audit entry.
    /// The audit write is unconditional but best-effort: its failure is
    /// logged and must not alter the transaction's determined status. If
    /// the status update itself fails, the audit entry is still written
    /// from the in-memory record with the determined status, so a moved
    /// balance never goes unrecorded.
    async fn finalize(
        &self,
        record: TransactionRecord,
        result: Result<BalanceChanges, DomainError>,
        context: &OperationContext,
    ) -> Result<TransactionOutcome, EngineError> {
        let final_record = match result {
            Ok(changes) => match self.store.mark_success(record.id, &changes).await {
                Ok(updated) => updated,
                Err(store_err) => {
                    let mut determined = record;
                    determined.status = TransactionStatus::Success;
                    determined.source_balance = changes.source_balance;
                    determined.destination_balance = changes.destination_balance;
                    self.write_audit(&determined).await;
                    return Err(store_err.into());
                }
            },
            Err(domain_err) => {
                match self
                    .store
                    .mark_failed(record.id, domain_err.failure_code(), &domain_err.to_string())
                    .await
                {
                    Ok(updated) => updated,
                    Err(store_err) => {
                        let mut determined = record;
                        determined.status = TransactionStatus::Failed;
                        determined.error_code = Some(domain_err.failure_code().to_string());
                        determined.error_message = Some(domain_err.to_string());
                        self.write_audit(&determined).await;
                        return Err(store_err.into());
                    }
                }
            }
        };

        self.write_audit(&final_record).await;

        tracing::info!(
            transaction_id = %final_record.id,
            correlation_id = ?context.correlation_id,
            txn_type = final_record.txn_type.as_str(),
            status = final_record.status.as_str(),
            error_code = ?final_record.error_code,
            "Transaction finalized"
        );

        Ok(TransactionOutcome::from_record(&final_record))
    }

    async fn write_audit(&self, record: &TransactionRecord) {
        if let Err(audit_err) = self.audit.record(record).await {
            tracing::warn!(
                transaction_id = %record.id,
                error = %audit_err,
                "Failed to write audit entry"
            );
        }
    }
}

fn parse_raw_amount(amount: &str) -> Result<Decimal, EngineError> {
    amount
        .parse::<Decimal>()
        .map_err(|e| EngineError::InvalidRequest(format!("Invalid amount: {}", e)))
}

fn validate_amount(raw: Decimal) -> Result<Amount, DomainError> {
    Amount::new(raw).map_err(|e| DomainError::InvalidAmount(e.to_string()))
}

/// Advisory only: the debit re-checks atomically at the storage layer and
/// its verdict wins over this early read.
fn check_advisory_funds(snapshot: &AccountSnapshot, amount: &Amount) -> Result<(), DomainError> {
    if snapshot.balance < amount.value() {
        return Err(DomainError::InsufficientFunds {
            required: amount.value(),
            available: snapshot.balance,
        });
    }
    Ok(())
}

fn map_gateway_error(err: GatewayError) -> DomainError {
    match err {
        GatewayError::NotFound(account) => DomainError::AccountNotFound(account),
        GatewayError::Inactive(account) => DomainError::AccountInactive(account),
        GatewayError::InsufficientFunds {
            required,
            available,
        } => DomainError::InsufficientFunds {
            required,
            available,
        },
        GatewayError::Unavailable(msg) => DomainError::ServiceUnavailable(msg),
        GatewayError::Database(e) => DomainError::Internal(e.to_string()),
        GatewayError::Internal(msg) => DomainError::Internal(msg),
    }
}

fn map_limit_error(err: LimitError) -> DomainError {
    match err {
        LimitError::AmountExceeded {
            remaining,
            requested,
        } => DomainError::DailyAmountExceeded {
            remaining,
            requested,
        },
        LimitError::CountExceeded { ceiling } => DomainError::DailyCountExceeded { ceiling },
        LimitError::Database(e) => DomainError::Internal(e.to_string()),
    }
}
