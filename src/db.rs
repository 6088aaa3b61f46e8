//! Database connection management and migrations.

use crate::error::{LedgerError, Result};

use anyhow::Context as _;
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;
use std::path::Path;

/// Connect to the ledger database file and run migrations.
pub async fn connect(db_path: &Path) -> Result<SqlitePool> {
    let url = format!("sqlite:{}?mode=rwc", db_path.display());
    let pool = SqlitePool::connect(&url)
        .await
        .with_context(|| format!("failed to connect to ledger db at {}", db_path.display()))
        .map_err(LedgerError::storage)?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("failed to run ledger migrations")
        .map_err(LedgerError::storage)?;

    Ok(pool)
}

/// Connect to an in-memory database and run migrations.
///
/// Capped at one connection: every pooled connection to `sqlite::memory:`
/// would otherwise get its own empty database.
pub async fn connect_memory() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .context("failed to connect to in-memory sqlite")
        .map_err(LedgerError::storage)?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("failed to run ledger migrations")
        .map_err(LedgerError::storage)?;

    Ok(pool)
}
