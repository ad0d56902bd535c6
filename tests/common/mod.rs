//! Common test utilities

use rust_decimal::Decimal;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

use bank_core::domain::pin_digest;

/// Connect to the test database and apply the schema. Returns `None` when
/// DATABASE_URL is not set, so the integration suite skips instead of
/// failing on machines without Postgres.
pub async fn try_setup_test_db() -> Option<PgPool> {
    dotenvy::dotenv().ok();

    let database_url = match std::env::var("DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            eprintln!("DATABASE_URL not set; skipping integration test");
            return None;
        }
    };

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("Failed to connect to DB");

    // The schema file is idempotent, so every test can apply it.
    sqlx::raw_sql(include_str!("../../migrations/001_init.sql"))
        .execute(&pool)
        .await
        .expect("Failed to apply schema");

    Some(pool)
}

/// A unique account number so parallel tests never collide.
pub fn unique_account() -> String {
    format!("t{}", Uuid::new_v4().simple())
}

/// Seed one active account. The PIN is stored salted and hashed, the same
/// way production writes it.
pub async fn seed_account(
    pool: &PgPool,
    account_number: &str,
    balance: Decimal,
    privilege: &str,
    pin: &str,
) {
    let salt = format!("salt-{}", account_number);
    let hash = pin_digest(pin, &salt);

    sqlx::query(
        r#"
        INSERT INTO accounts (
            account_number, account_type, holder_name, balance,
            privilege, pin_salt, pin_hash
        )
        VALUES ($1, 'savings', 'Test Holder', $2, $3, $4, $5)
        "#,
    )
    .bind(account_number)
    .bind(balance)
    .bind(privilege)
    .bind(&salt)
    .bind(&hash)
    .execute(pool)
    .await
    .expect("Failed to seed account");
}

/// Mark an account closed.
pub async fn close_account(pool: &PgPool, account_number: &str) {
    sqlx::query(
        "UPDATE accounts SET is_active = FALSE, closed_at = NOW() WHERE account_number = $1",
    )
    .bind(account_number)
    .execute(pool)
    .await
    .expect("Failed to close account");
}

/// Current stored balance for an account.
pub async fn stored_balance(pool: &PgPool, account_number: &str) -> Decimal {
    sqlx::query_scalar("SELECT balance FROM accounts WHERE account_number = $1")
        .bind(account_number)
        .fetch_one(pool)
        .await
        .expect("Failed to read balance")
}
