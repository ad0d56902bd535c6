//! Integration tests for the Postgres limit ledger

use chrono::Utc;
use rust_decimal::Decimal;

use bank_core::domain::{Amount, PrivilegeTier};
use bank_core::limits::{LimitError, LimitLedger, PgLimitLedger};

mod common;

#[tokio::test]
async fn test_concurrent_reservations_respect_ceiling() {
    let Some(pool) = common::try_setup_test_db().await else {
        return;
    };
    let ledger = PgLimitLedger::new(pool.clone());

    let account = common::unique_account();
    let today = Utc::now().date_naive();

    // SILVER allows 25,000/day: ten racing 4,000 reservations leave room
    // for exactly six, and recorded usage must never pass the ceiling.
    let mut tasks = Vec::new();
    for _ in 0..10 {
        let ledger = ledger.clone();
        let account = account.clone();
        tasks.push(tokio::spawn(async move {
            let amount = Amount::from_integer(4_000).unwrap();
            ledger
                .check_and_reserve(&account, PrivilegeTier::Silver, &amount, today)
                .await
        }));
    }

    let mut successes = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(()) => successes += 1,
            Err(LimitError::AmountExceeded { .. }) => {}
            Err(other) => panic!("unexpected error: {:?}", other),
        }
    }
    assert_eq!(successes, 6);

    let usage: (Decimal, i32) = sqlx::query_as(
        "SELECT total_amount, txn_count FROM daily_usage WHERE account_number = $1 AND usage_date = $2",
    )
    .bind(&account)
    .bind(today)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(usage, (Decimal::from(24_000), 6));
}

#[tokio::test]
async fn test_count_ceiling_reported_when_amount_fits() {
    let Some(pool) = common::try_setup_test_db().await else {
        return;
    };
    let ledger = PgLimitLedger::new(pool.clone());

    let account = common::unique_account();
    let today = Utc::now().date_naive();

    // Amount capacity is wide open; only the SILVER count ceiling of 20
    // is spent. The rejection must name the count ceiling.
    sqlx::query(
        "INSERT INTO daily_usage (account_number, usage_date, total_amount, txn_count) VALUES ($1, $2, 100, 20)",
    )
    .bind(&account)
    .bind(today)
    .execute(&pool)
    .await
    .unwrap();

    let amount = Amount::from_integer(10).unwrap();
    let err = ledger
        .check_and_reserve(&account, PrivilegeTier::Silver, &amount, today)
        .await
        .unwrap_err();
    assert!(matches!(err, LimitError::CountExceeded { ceiling: 20 }));

    // The rejected attempt consumed nothing.
    let usage: (Decimal, i32) = sqlx::query_as(
        "SELECT total_amount, txn_count FROM daily_usage WHERE account_number = $1 AND usage_date = $2",
    )
    .bind(&account)
    .bind(today)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(usage, (Decimal::from(100), 20));
}
