//! API Routes
//!
//! HTTP endpoint definitions.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::audit::{AuditEntry, AuditTrail};
use crate::domain::{AccountSnapshot, Amount, OperationContext, TransactionStatus};
use crate::engine::{
    DepositCommand, TransactionOutcome, TransferCommand, TransferEngine, WithdrawCommand,
};
use crate::error::{AppError, AppResult};
use crate::gateway::{AccountGateway, GatewayError, WireBalance, WireError, WireMutation,
    WirePinRequest, WirePinResult};
use crate::limits::LimitLedger;

/// Shared application state behind every handler.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<TransferEngine>,
    pub gateway: Arc<dyn AccountGateway>,
    pub limits: Arc<dyn LimitLedger>,
    pub audit: Arc<dyn AuditTrail>,
}

// =========================================================================
// Request/Response types
// =========================================================================

#[derive(Debug, Deserialize)]
pub struct WithdrawRequest {
    pub account_number: String,
    pub amount: String,
    pub pin: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DepositRequest {
    pub account_number: String,
    pub amount: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TransferRequest {
    pub from_account: String,
    pub to_account: String,
    pub amount: String,
    pub pin: String,
    pub mode: crate::domain::TransferMode,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TransactionDetailResponse {
    pub id: Uuid,
    pub txn_type: crate::domain::TransactionType,
    pub transfer_mode: Option<crate::domain::TransferMode>,
    pub from_account: Option<String>,
    pub to_account: Option<String>,
    pub amount: Decimal,
    pub status: TransactionStatus,
    pub idempotency_key: Uuid,
    pub description: Option<String>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct AccountLimitsResponse {
    pub account_number: String,
    pub privilege: crate::domain::PrivilegeTier,
    pub daily_amount_ceiling: Decimal,
    pub daily_txn_ceiling: i32,
    pub remaining_amount: Decimal,
    pub remaining_count: i32,
}

#[derive(Debug, Deserialize)]
pub struct AuditAccountQuery {
    #[serde(default)]
    pub skip: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub to: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct AuditStatusQuery {
    #[serde(default)]
    pub skip: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    50
}

const MAX_PAGE_SIZE: i64 = 200;

fn clamp_page(skip: i64, limit: i64) -> AppResult<(i64, i64)> {
    if skip < 0 || limit < 1 {
        return Err(AppError::InvalidRequest(
            "skip must be >= 0 and limit >= 1".to_string(),
        ));
    }
    Ok((skip, limit.min(MAX_PAGE_SIZE)))
}

// =========================================================================
// API Router
// =========================================================================

/// Create the API router
pub fn create_router() -> Router<AppState> {
    Router::new()
        // Transactions
        .route("/transactions/withdraw", post(withdraw))
        .route("/transactions/deposit", post(deposit))
        .route("/transactions/transfer", post(transfer))
        .route("/transactions/:transaction_id", get(get_transaction))
        // Accounts
        .route("/accounts/:account_number", get(get_account))
        .route("/accounts/:account_number/limits", get(get_account_limits))
        // Gateway surface, consumed by peers running with a remote
        // account gateway (HttpAccountGateway)
        .route("/accounts/:account_number/verify-pin", post(verify_pin))
        .route("/accounts/:account_number/debit", post(debit_account))
        .route("/accounts/:account_number/credit", post(credit_account))
        // Audit
        .route(
            "/audit/transactions/:transaction_id",
            get(audit_by_transaction),
        )
        .route("/audit/accounts/:account_number", get(audit_by_account))
        .route("/audit/status/:status", get(audit_by_status))
}

/// Optional Idempotency-Key header; must be a UUID when present.
fn idempotency_key(headers: &HeaderMap) -> AppResult<Option<Uuid>> {
    match headers.get("Idempotency-Key") {
        None => Ok(None),
        Some(value) => {
            let value = value
                .to_str()
                .map_err(|_| AppError::InvalidHeader("Idempotency-Key".to_string()))?;
            value.parse().map(Some).map_err(|_| {
                AppError::InvalidHeader(format!("Idempotency-Key is not a UUID: {}", value))
            })
        }
    }
}

// =========================================================================
// POST /transactions/withdraw
// =========================================================================

/// Withdraw cash. A business failure is a 200 with a FAILED outcome; only
/// malformed requests and infrastructure faults produce error statuses.
async fn withdraw(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    headers: HeaderMap,
    Json(request): Json<WithdrawRequest>,
) -> AppResult<Json<TransactionOutcome>> {
    let key = idempotency_key(&headers)?;

    let command = WithdrawCommand::new(request.account_number, request.amount, request.pin);
    let command = match request.description {
        Some(description) => command.with_description(description),
        None => command,
    };

    // Spawned so the pipeline runs to completion even if the client
    // disconnects; axum drops handler futures on disconnect.
    let engine = state.engine.clone();
    let outcome = tokio::spawn(async move { engine.withdraw(command, key, &context).await })
        .await
        .map_err(|e| AppError::Internal(format!("Transaction task failed: {}", e)))??;

    Ok(Json(outcome))
}

// =========================================================================
// POST /transactions/deposit
// =========================================================================

/// Deposit cash
async fn deposit(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    headers: HeaderMap,
    Json(request): Json<DepositRequest>,
) -> AppResult<Json<TransactionOutcome>> {
    let key = idempotency_key(&headers)?;

    let command = DepositCommand::new(request.account_number, request.amount);
    let command = match request.description {
        Some(description) => command.with_description(description),
        None => command,
    };

    let engine = state.engine.clone();
    let outcome = tokio::spawn(async move { engine.deposit(command, key, &context).await })
        .await
        .map_err(|e| AppError::Internal(format!("Transaction task failed: {}", e)))??;

    Ok(Json(outcome))
}

// =========================================================================
// POST /transactions/transfer
// =========================================================================

/// Account-to-account transfer
async fn transfer(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    headers: HeaderMap,
    Json(request): Json<TransferRequest>,
) -> AppResult<Json<TransactionOutcome>> {
    let key = idempotency_key(&headers)?;

    let command = TransferCommand::new(
        request.from_account,
        request.to_account,
        request.amount,
        request.pin,
        request.mode,
    );
    let command = match request.description {
        Some(description) => command.with_description(description),
        None => command,
    };

    let engine = state.engine.clone();
    let outcome = tokio::spawn(async move { engine.transfer(command, key, &context).await })
        .await
        .map_err(|e| AppError::Internal(format!("Transaction task failed: {}", e)))??;

    Ok(Json(outcome))
}

// =========================================================================
// GET /transactions/:transaction_id
// =========================================================================

/// Transaction record by id
async fn get_transaction(
    State(state): State<AppState>,
    Path(transaction_id): Path<Uuid>,
) -> AppResult<Json<TransactionDetailResponse>> {
    let record = state
        .engine
        .get_transaction(transaction_id)
        .await?
        .ok_or(AppError::TransactionNotFound(transaction_id))?;

    Ok(Json(TransactionDetailResponse {
        id: record.id,
        txn_type: record.txn_type,
        transfer_mode: record.transfer_mode,
        from_account: record.from_account,
        to_account: record.to_account,
        amount: record.amount,
        status: record.status,
        idempotency_key: record.idempotency_key,
        description: record.description,
        error_code: record.error_code,
        error_message: record.error_message,
        created_at: record.created_at,
        updated_at: record.updated_at,
    }))
}

// =========================================================================
// GET /accounts/:account_number
// =========================================================================

/// Account snapshot: balance, status, privilege. No credential material.
async fn get_account(
    State(state): State<AppState>,
    Path(account_number): Path<String>,
) -> AppResult<Json<AccountSnapshot>> {
    let snapshot = state.gateway.get_account(&account_number).await?;
    Ok(Json(snapshot))
}

// =========================================================================
// GET /accounts/:account_number/limits
// =========================================================================

/// Daily transfer ceilings and what is left of them today (UTC).
async fn get_account_limits(
    State(state): State<AppState>,
    Path(account_number): Path<String>,
) -> AppResult<Json<AccountLimitsResponse>> {
    let snapshot = state.gateway.get_account(&account_number).await?;

    let today = Utc::now().date_naive();
    let rule = state.limits.get_rule(snapshot.privilege).await?;
    let capacity = state
        .limits
        .remaining_capacity(&account_number, snapshot.privilege, today)
        .await?;

    Ok(Json(AccountLimitsResponse {
        account_number,
        privilege: snapshot.privilege,
        daily_amount_ceiling: rule.daily_amount_ceiling,
        daily_txn_ceiling: rule.daily_txn_ceiling,
        remaining_amount: capacity.remaining_amount,
        remaining_count: capacity.remaining_count,
    }))
}

// =========================================================================
// Gateway surface
// =========================================================================

type WireFailure = (StatusCode, Json<WireError>);

fn wire_failure(err: GatewayError) -> WireFailure {
    let status = match &err {
        GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
        GatewayError::Inactive(_) | GatewayError::InsufficientFunds { .. } => {
            StatusCode::BAD_REQUEST
        }
        GatewayError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        GatewayError::Database(_) | GatewayError::Internal(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, Json(WireError::from_gateway_error(&err)))
}

fn wire_amount(raw: Decimal) -> Result<Amount, WireFailure> {
    Amount::new(raw).map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            Json(WireError {
                error_code: "invalid_amount".to_string(),
                message: e.to_string(),
                required: None,
                available: None,
            }),
        )
    })
}

/// POST /accounts/:account_number/verify-pin
async fn verify_pin(
    State(state): State<AppState>,
    Path(account_number): Path<String>,
    Json(request): Json<WirePinRequest>,
) -> Result<Json<WirePinResult>, WireFailure> {
    let valid = state
        .gateway
        .verify_pin(&account_number, &request.pin)
        .await
        .map_err(wire_failure)?;

    Ok(Json(WirePinResult { valid }))
}

/// POST /accounts/:account_number/debit
async fn debit_account(
    State(state): State<AppState>,
    Path(account_number): Path<String>,
    Json(request): Json<WireMutation>,
) -> Result<Json<WireBalance>, WireFailure> {
    let amount = wire_amount(request.amount)?;

    let balance = state
        .gateway
        .debit(&account_number, &amount, request.idempotency_key)
        .await
        .map_err(wire_failure)?;

    Ok(Json(WireBalance {
        account_number,
        balance: balance.value(),
    }))
}

/// POST /accounts/:account_number/credit
async fn credit_account(
    State(state): State<AppState>,
    Path(account_number): Path<String>,
    Json(request): Json<WireMutation>,
) -> Result<Json<WireBalance>, WireFailure> {
    let amount = wire_amount(request.amount)?;

    let balance = state
        .gateway
        .credit(&account_number, &amount, request.idempotency_key)
        .await
        .map_err(wire_failure)?;

    Ok(Json(WireBalance {
        account_number,
        balance: balance.value(),
    }))
}

// =========================================================================
// GET /audit/transactions/:transaction_id
// =========================================================================

/// Audit entry for a transaction
async fn audit_by_transaction(
    State(state): State<AppState>,
    Path(transaction_id): Path<Uuid>,
) -> AppResult<Json<AuditEntry>> {
    let entry = state
        .audit
        .get_by_transaction(transaction_id)
        .await?
        .ok_or(AppError::TransactionNotFound(transaction_id))?;

    Ok(Json(entry))
}

// =========================================================================
// GET /audit/accounts/:account_number
// =========================================================================

/// Audit entries touching an account, newest first, optionally bounded to
/// a [from, to] window.
async fn audit_by_account(
    State(state): State<AppState>,
    Path(account_number): Path<String>,
    Query(query): Query<AuditAccountQuery>,
) -> AppResult<Json<Vec<AuditEntry>>> {
    let (skip, limit) = clamp_page(query.skip, query.limit)?;

    let range = match (query.from, query.to) {
        (Some(from), Some(to)) if from <= to => Some((from, to)),
        (Some(_), Some(_)) => {
            return Err(AppError::InvalidRequest(
                "'from' must not be after 'to'".to_string(),
            ));
        }
        (None, None) => None,
        _ => {
            return Err(AppError::InvalidRequest(
                "'from' and 'to' must be provided together".to_string(),
            ));
        }
    };

    let entries = state
        .audit
        .get_by_account(&account_number, skip, limit, range)
        .await?;

    Ok(Json(entries))
}

// =========================================================================
// GET /audit/status/:status
// =========================================================================

/// Audit entries with a given status, newest first
async fn audit_by_status(
    State(state): State<AppState>,
    Path(status): Path<String>,
    Query(query): Query<AuditStatusQuery>,
) -> AppResult<Json<Vec<AuditEntry>>> {
    let status: TransactionStatus = status
        .parse()
        .map_err(|e: String| AppError::InvalidRequest(e))?;

    let (skip, limit) = clamp_page(query.skip, query.limit)?;

    let entries = state.audit.get_by_status(status, skip, limit).await?;

    Ok(Json(entries))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_page() {
        assert_eq!(clamp_page(0, 50).unwrap(), (0, 50));
        assert_eq!(clamp_page(10, 1000).unwrap(), (10, MAX_PAGE_SIZE));
        assert!(clamp_page(-1, 50).is_err());
        assert!(clamp_page(0, 0).is_err());
    }

    #[test]
    fn test_idempotency_key_header() {
        let mut headers = HeaderMap::new();
        assert_eq!(idempotency_key(&headers).unwrap(), None);

        let key = Uuid::new_v4();
        headers.insert("Idempotency-Key", key.to_string().parse().unwrap());
        assert_eq!(idempotency_key(&headers).unwrap(), Some(key));

        headers.insert("Idempotency-Key", "not-a-uuid".parse().unwrap());
        assert!(idempotency_key(&headers).is_err());
    }
}
