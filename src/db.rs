//! Database module
//!
//! Database connection and schema verification utilities.
//! Migrations are raw SQL files in migrations/.

use sqlx::PgPool;

/// Simple connectivity check
pub async fn verify_connection(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;

    Ok(())
}

/// Check if required tables exist
pub async fn check_schema(pool: &PgPool) -> Result<bool, sqlx::Error> {
    let required_tables = vec![
        "accounts",
        "gateway_operations",
        "transfer_limit_rules",
        "daily_usage",
        "transactions",
        "audit_logs",
    ];

    for table in required_tables {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM information_schema.tables
                WHERE table_schema = 'public' AND table_name = $1
            )
            "#,
        )
        .bind(table)
        .fetch_one(pool)
        .await?;

        if !exists {
            tracing::error!("Required table '{}' does not exist", table);
            return Ok(false);
        }
    }

    if !check_limit_rules(pool).await? {
        return Ok(false);
    }

    Ok(true)
}

/// Check that every privilege tier has a limit rule row. The seed in
/// migrations/ inserts them; a missing row falls back to built-in defaults
/// at runtime, but a fresh deployment should start complete.
async fn check_limit_rules(pool: &PgPool) -> Result<bool, sqlx::Error> {
    for tier in ["silver", "gold", "premium"] {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM transfer_limit_rules WHERE privilege = $1)",
        )
        .bind(tier)
        .fetch_one(pool)
        .await?;

        if !exists {
            tracing::error!(
                "Limit rule for tier '{}' is missing. Please run database seed.",
                tier
            );
            return Ok(false);
        }
    }

    tracing::info!("Limit rules verified: silver, gold, premium");
    Ok(true)
}
