//! Integration tests for the Postgres account gateway

use rust_decimal::Decimal;
use uuid::Uuid;

use bank_core::domain::Amount;
use bank_core::gateway::{AccountGateway, GatewayError, PgAccountGateway};

mod common;

#[tokio::test]
async fn test_debit_exact_balance_then_insufficient() {
    let Some(pool) = common::try_setup_test_db().await else {
        return;
    };
    let gateway = PgAccountGateway::new(pool.clone());

    let account = common::unique_account();
    common::seed_account(&pool, &account, Decimal::from(500), "silver", "4321").await;

    let amount = Amount::from_integer(500).unwrap();
    let balance = gateway
        .debit(&account, &amount, Uuid::new_v4())
        .await
        .unwrap();
    assert_eq!(balance.value(), Decimal::ZERO);

    // Nothing left; the next debit must fail without touching the row.
    let one = Amount::from_integer(1).unwrap();
    let err = gateway.debit(&account, &one, Uuid::new_v4()).await;
    match err {
        Err(GatewayError::InsufficientFunds {
            required,
            available,
        }) => {
            assert_eq!(required, Decimal::from(1));
            assert_eq!(available, Decimal::ZERO);
        }
        other => panic!("expected InsufficientFunds, got {:?}", other),
    }

    assert_eq!(common::stored_balance(&pool, &account).await, Decimal::ZERO);
}

#[tokio::test]
async fn test_debit_idempotent_replay() {
    let Some(pool) = common::try_setup_test_db().await else {
        return;
    };
    let gateway = PgAccountGateway::new(pool.clone());

    let account = common::unique_account();
    common::seed_account(&pool, &account, Decimal::from(1_000), "gold", "4321").await;

    let amount = Amount::from_integer(300).unwrap();
    let key = Uuid::new_v4();

    let first = gateway.debit(&account, &amount, key).await.unwrap();
    assert_eq!(first.value(), Decimal::from(700));

    // Same key: the stored result comes back, the balance does not move.
    let second = gateway.debit(&account, &amount, key).await.unwrap();
    assert_eq!(second.value(), Decimal::from(700));
    assert_eq!(
        common::stored_balance(&pool, &account).await,
        Decimal::from(700)
    );

    let op_count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM gateway_operations WHERE idempotency_key = $1")
            .bind(key)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(op_count, 1);
}

#[tokio::test]
async fn test_failed_debit_leaves_no_dedup_row() {
    let Some(pool) = common::try_setup_test_db().await else {
        return;
    };
    let gateway = PgAccountGateway::new(pool.clone());

    let account = common::unique_account();
    common::seed_account(&pool, &account, Decimal::from(100), "silver", "4321").await;

    let amount = Amount::from_integer(200).unwrap();
    let key = Uuid::new_v4();

    let err = gateway.debit(&account, &amount, key).await;
    assert!(matches!(err, Err(GatewayError::InsufficientFunds { .. })));

    // The claim rolled back with the failed mutation, so a retry with the
    // same key after a top-up is evaluated afresh.
    let op_count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM gateway_operations WHERE idempotency_key = $1")
            .bind(key)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(op_count, 0);

    let top_up = Amount::from_integer(150).unwrap();
    gateway
        .credit(&account, &top_up, Uuid::new_v4())
        .await
        .unwrap();

    let balance = gateway.debit(&account, &amount, key).await.unwrap();
    assert_eq!(balance.value(), Decimal::from(50));
}

#[tokio::test]
async fn test_concurrent_debits_never_overdraw() {
    let Some(pool) = common::try_setup_test_db().await else {
        return;
    };
    let gateway = PgAccountGateway::new(pool.clone());

    let account = common::unique_account();
    common::seed_account(&pool, &account, Decimal::from(500), "gold", "4321").await;

    // Ten racing debits of 100 against a balance of 500: exactly five can
    // land; the rest must fail without the balance ever going negative.
    let mut tasks = Vec::new();
    for _ in 0..10 {
        let gateway = gateway.clone();
        let account = account.clone();
        tasks.push(tokio::spawn(async move {
            let amount = Amount::from_integer(100).unwrap();
            gateway.debit(&account, &amount, Uuid::new_v4()).await
        }));
    }

    let mut successes = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(balance) => {
                assert!(balance.value() >= Decimal::ZERO);
                successes += 1;
            }
            Err(GatewayError::InsufficientFunds { .. }) => {}
            Err(other) => panic!("unexpected error: {:?}", other),
        }
    }

    assert_eq!(successes, 5);
    assert_eq!(common::stored_balance(&pool, &account).await, Decimal::ZERO);
}

#[tokio::test]
async fn test_closed_account_rejected() {
    let Some(pool) = common::try_setup_test_db().await else {
        return;
    };
    let gateway = PgAccountGateway::new(pool.clone());

    let account = common::unique_account();
    common::seed_account(&pool, &account, Decimal::from(500), "silver", "4321").await;
    common::close_account(&pool, &account).await;

    let amount = Amount::from_integer(100).unwrap();
    assert!(matches!(
        gateway.debit(&account, &amount, Uuid::new_v4()).await,
        Err(GatewayError::Inactive(_))
    ));
    assert!(matches!(
        gateway.credit(&account, &amount, Uuid::new_v4()).await,
        Err(GatewayError::Inactive(_))
    ));
}

#[tokio::test]
async fn test_unknown_account_not_found() {
    let Some(pool) = common::try_setup_test_db().await else {
        return;
    };
    let gateway = PgAccountGateway::new(pool.clone());

    let account = common::unique_account();
    let amount = Amount::from_integer(100).unwrap();

    assert!(matches!(
        gateway.get_account(&account).await,
        Err(GatewayError::NotFound(_))
    ));
    assert!(matches!(
        gateway.credit(&account, &amount, Uuid::new_v4()).await,
        Err(GatewayError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_verify_pin() {
    let Some(pool) = common::try_setup_test_db().await else {
        return;
    };
    let gateway = PgAccountGateway::new(pool.clone());

    let account = common::unique_account();
    common::seed_account(&pool, &account, Decimal::from(100), "gold", "987654").await;

    assert!(gateway.verify_pin(&account, "987654").await.unwrap());
    assert!(!gateway.verify_pin(&account, "000000").await.unwrap());
}

#[tokio::test]
async fn test_account_snapshot_fields() {
    let Some(pool) = common::try_setup_test_db().await else {
        return;
    };
    let gateway = PgAccountGateway::new(pool.clone());

    let account = common::unique_account();
    common::seed_account(&pool, &account, Decimal::new(123_450, 2), "premium", "4321").await;

    let snapshot = gateway.get_account(&account).await.unwrap();
    assert_eq!(snapshot.account_number, account);
    assert_eq!(snapshot.balance, Decimal::new(123_450, 2));
    assert_eq!(
        snapshot.privilege,
        bank_core::domain::PrivilegeTier::Premium
    );
    assert!(snapshot.is_operational());
}
