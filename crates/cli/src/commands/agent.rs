//! Delivery agent management.
//!
//! Agents created here have no identity or user link yet; the first sign-in
//! with the same email links them.
//!
//! # Environment Variables
//!
//! - `PORTAL_DATABASE_URL` - `PostgreSQL` connection string

use courier_portal::db::{PgStore, RepositoryError, Store};
use courier_portal::models::NewAgent;
use courier_portal_core::Email;

use super::{CliError, connect};

fn parse_email(email: &str) -> Result<Email, CliError> {
    Email::parse(email).map_err(|_| CliError::InvalidEmail(email.to_owned()))
}

/// Pre-provision an agent.
pub async fn create(email: &str, name: &str, phone: Option<&str>) -> Result<(), CliError> {
    let email = parse_email(email)?;
    let name = name.trim();
    if name.is_empty() {
        return Err(CliError::InvalidArgument("name cannot be empty".to_owned()));
    }

    let store = PgStore::new(connect().await?);

    let agent = store
        .insert_agent(&NewAgent {
            user_id: None,
            identity_id: None,
            email: email.clone(),
            name: name.to_owned(),
            phone: phone.map(str::trim).filter(|p| !p.is_empty()).map(String::from),
        })
        .await
        .map_err(|e| match e {
            RepositoryError::Conflict(_) => CliError::AgentExists(email.to_string()),
            other => other.into(),
        })?;

    tracing::info!(agent_id = %agent.id, email = %agent.email, "Delivery agent created");
    Ok(())
}

/// Enable or disable an agent by email.
pub async fn set_active(email: &str, active: bool) -> Result<(), CliError> {
    let email = parse_email(email)?;
    let store = PgStore::new(connect().await?);

    let agent = store
        .set_agent_active(&email, active)
        .await?
        .ok_or_else(|| CliError::AgentNotFound(email.to_string()))?;

    tracing::info!(
        agent_id = %agent.id,
        email = %agent.email,
        active,
        "Delivery agent updated"
    );
    Ok(())
}
