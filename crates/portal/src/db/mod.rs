//! Persistence for the courier portal.
//!
//! # Database schema: `portal`
//!
//! - `users` - Generic accounts shared with the other applications
//! - `delivery_agents` - Courier profiles
//! - `orders` / `order_items` - Orders written by checkout
//! - `order_assignments` - Which agent claimed which order (one per order)
//! - `ignored_orders` - Per-agent dismissed orders
//! - `tower_sessions.session` - Session storage
//!
//! Handlers talk to the [`Store`] trait. [`PgStore`] is the production
//! implementation; [`InMemoryStore`] backs the tests.
//!
//! # Migrations
//!
//! Migrations are stored in `crates/portal/migrations/` and run via:
//! ```bash
//! cargo run -p courier-portal-cli -- migrate
//! ```

pub mod memory;
pub mod postgres;

use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use courier_portal_core::{AgentId, Email, IdentityId, OrderId, OrderStatus, UserId};

use crate::models::{
    Agent, AgentStats, AssignedOrder, Assignment, IgnoredOrder, NewAgent, NewUser, Order,
    OrderItem, ProfileUpdate, User,
};

pub use memory::InMemoryStore;
pub use postgres::PgStore;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., unique email).
    #[error("constraint violation: {0}")]
    Conflict(String),

    /// The backend could not serve the request (lock poisoned, injected fault).
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl RepositoryError {
    /// Map a sqlx error, turning unique violations into [`Self::Conflict`].
    pub(crate) fn from_unique(err: sqlx::Error, what: &str) -> Self {
        if let sqlx::Error::Database(ref db_err) = err
            && db_err.is_unique_violation()
        {
            return Self::Conflict(format!("{what} already exists"));
        }
        Self::Database(err)
    }
}

/// Result of a compare-and-swap on an order's status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CasResult {
    /// The transition was applied.
    Success,
    /// No such order.
    NotFound,
    /// The order was not in the expected status.
    StateMismatch {
        /// The status that was found.
        actual: OrderStatus,
    },
}

impl CasResult {
    /// Returns true if the transition was applied.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Outcome of [`Store::claim_order`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// The order is now accepted and assigned to the requesting agent.
    Claimed(Assignment),
    /// The order was no longer in the expected status (lost the race).
    Lost,
    /// The status moved but the assignment could not be recorded; the status
    /// has been reverted.
    AssignmentFailed(String),
}

/// Storage abstraction for the portal.
///
/// Implementations provide point lookups, filtered listings, a
/// compare-and-swap status transition and inserts guarded by uniqueness
/// constraints. Concurrency correctness lives entirely here: no caller holds
/// locks across calls.
#[async_trait]
pub trait Store: Send + Sync {
    /// Cheap connectivity check for readiness probes.
    async fn ping(&self) -> Result<(), RepositoryError>;

    // --- Agents ---

    async fn agent_by_identity(
        &self,
        identity_id: &IdentityId,
    ) -> Result<Option<Agent>, RepositoryError>;

    async fn agent_by_user(&self, user_id: UserId) -> Result<Option<Agent>, RepositoryError>;

    async fn agent_by_email(&self, email: &Email) -> Result<Option<Agent>, RepositoryError>;

    /// Insert an agent. Unique email / identity / user violations map to
    /// [`RepositoryError::Conflict`].
    async fn insert_agent(&self, agent: &NewAgent) -> Result<Agent, RepositoryError>;

    /// Set the agent's identity link, and its user link when `user_id` is
    /// given (an existing user link is kept otherwise).
    async fn link_agent(
        &self,
        agent_id: AgentId,
        identity_id: &IdentityId,
        user_id: Option<UserId>,
    ) -> Result<Agent, RepositoryError>;

    async fn update_agent_profile(
        &self,
        agent_id: AgentId,
        update: &ProfileUpdate,
    ) -> Result<Agent, RepositoryError>;

    async fn set_agent_image(&self, agent_id: AgentId, url: &str)
    -> Result<Agent, RepositoryError>;

    /// Soft-enable or soft-disable an agent by email.
    async fn set_agent_active(
        &self,
        email: &Email,
        active: bool,
    ) -> Result<Option<Agent>, RepositoryError>;

    async fn agent_stats(&self, agent_id: AgentId) -> Result<AgentStats, RepositoryError>;

    // --- Users ---

    async fn user_by_id(&self, user_id: UserId) -> Result<Option<User>, RepositoryError>;

    async fn user_by_identity(
        &self,
        identity_id: &IdentityId,
    ) -> Result<Option<User>, RepositoryError>;

    async fn user_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError>;

    /// Insert a user. Delivery-agent users get an agent row provisioned by the
    /// backend when it supports it (database trigger).
    async fn insert_user(&self, user: &NewUser) -> Result<User, RepositoryError>;

    async fn link_user_identity(
        &self,
        user_id: UserId,
        identity_id: &IdentityId,
    ) -> Result<User, RepositoryError>;

    // --- Orders ---

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>, RepositoryError>;

    async fn order_items(&self, order_id: OrderId) -> Result<Vec<OrderItem>, RepositoryError>;

    /// Orders in any of `statuses`, newest first.
    async fn orders_with_status(
        &self,
        statuses: &[OrderStatus],
    ) -> Result<Vec<Order>, RepositoryError>;

    /// Atomically move an order from `expected` to `target`, stamping its
    /// update time.
    async fn transition_order(
        &self,
        order_id: OrderId,
        expected: OrderStatus,
        target: OrderStatus,
    ) -> Result<CasResult, RepositoryError>;

    // --- Assignments ---

    /// Record that `agent_id` owns `order_id`. A second assignment for the
    /// same order is a [`RepositoryError::Conflict`].
    async fn insert_assignment(
        &self,
        order_id: OrderId,
        agent_id: AgentId,
    ) -> Result<Assignment, RepositoryError>;

    async fn assignment_for_order(
        &self,
        order_id: OrderId,
    ) -> Result<Option<Assignment>, RepositoryError>;

    async fn assigned_order_ids(&self, agent_id: AgentId) -> Result<Vec<OrderId>, RepositoryError>;

    /// Orders assigned to `agent_id`, optionally restricted to `statuses`,
    /// newest assignment first.
    async fn assigned_orders(
        &self,
        agent_id: AgentId,
        statuses: Option<&[OrderStatus]>,
    ) -> Result<Vec<AssignedOrder>, RepositoryError>;

    // --- Ignored markers ---

    /// Upsert an ignored marker; a repeat is a no-op.
    async fn ignore_order(&self, order_id: OrderId, agent_id: AgentId)
    -> Result<(), RepositoryError>;

    async fn ignored_order_ids(&self, agent_id: AgentId) -> Result<Vec<OrderId>, RepositoryError>;

    /// Orders dismissed by `agent_id`, most recently ignored first.
    async fn ignored_orders(&self, agent_id: AgentId)
    -> Result<Vec<IgnoredOrder>, RepositoryError>;

    // --- Accept protocol ---

    /// Claim an order for an agent.
    ///
    /// The default runs two writes: a compare-and-swap `expected -> accepted`
    /// followed by the assignment insert. When the insert fails the status is
    /// swapped back to `expected` so no accepted order is left without an
    /// owner. Stores with transactions override this with a single atomic
    /// statement.
    async fn claim_order(
        &self,
        order_id: OrderId,
        agent_id: AgentId,
        expected: OrderStatus,
    ) -> Result<ClaimOutcome, RepositoryError> {
        match self
            .transition_order(order_id, expected, OrderStatus::Accepted)
            .await?
        {
            CasResult::Success => {}
            CasResult::NotFound | CasResult::StateMismatch { .. } => {
                return Ok(ClaimOutcome::Lost);
            }
        }

        match self.insert_assignment(order_id, agent_id).await {
            Ok(assignment) => Ok(ClaimOutcome::Claimed(assignment)),
            Err(err) => {
                tracing::error!(
                    order_id = %order_id,
                    agent_id = %agent_id,
                    error = %err,
                    "Assignment insert failed, reverting order status"
                );

                match self
                    .transition_order(order_id, OrderStatus::Accepted, expected)
                    .await
                {
                    Ok(CasResult::Success) => {}
                    Ok(other) => tracing::error!(
                        order_id = %order_id,
                        result = ?other,
                        "Order status changed before compensation could run"
                    ),
                    Err(revert_err) => tracing::error!(
                        order_id = %order_id,
                        error = %revert_err,
                        "Failed to revert order status"
                    ),
                }

                Ok(ClaimOutcome::AssignmentFailed(err.to_string()))
            }
        }
    }
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}
