//! Database module
//!
//! Database connection and schema utilities.

use sqlx::PgPool;

/// Schema for the ledger table; also shipped as `migrations/0001_wallet.sql`
pub const WALLET_SCHEMA: &str = include_str!("../migrations/0001_wallet.sql");

/// Simple connectivity check
pub async fn verify_connection(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;

    Ok(())
}

/// Create the ledger table if it is missing
pub async fn apply_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query(WALLET_SCHEMA).execute(pool).await?;

    tracing::info!("Ledger schema applied");
    Ok(())
}

/// Check if required tables exist
pub async fn check_schema(pool: &PgPool) -> Result<bool, sqlx::Error> {
    let required_tables = ["wallet"];

    for table in required_tables {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM information_schema.tables
                WHERE table_schema = 'public' AND table_name = $1
            )
            "#
        )
        .bind(table)
        .fetch_one(pool)
        .await?;

        if !exists {
            tracing::error!("Required table '{}' does not exist", table);
            return Ok(false);
        }
    }

    Ok(true)
}
