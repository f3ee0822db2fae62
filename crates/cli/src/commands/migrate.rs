//! Database migration command.
//!
//! # Usage
//!
//! ```bash
//! cp-cli migrate
//! ```
//!
//! Migrations live in `crates/portal/migrations/` and are embedded at
//! compile time.

use super::{CliError, connect};

/// Run the portal migrations.
pub async fn run() -> Result<(), CliError> {
    let pool = connect().await?;

    tracing::info!("Running portal migrations...");
    sqlx::migrate!("../portal/migrations").run(&pool).await?;

    tracing::info!("Portal migrations complete!");
    Ok(())
}
