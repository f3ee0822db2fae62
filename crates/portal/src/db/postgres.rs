//! `PostgreSQL` implementation of [`Store`].
//!
//! Queries are checked at runtime (`query_as` + `FromRow` row types) and
//! converted into domain types with `TryFrom`, so values the domain rejects
//! surface as [`RepositoryError::DataCorruption`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use courier_portal_core::{
    AgentId, AssignmentId, Email, IdentityId, OrderId, OrderItemId, OrderStatus, UserId, UserRole,
};

use super::{CasResult, ClaimOutcome, RepositoryError, Store};
use crate::models::{
    Agent, AgentStats, AssignedOrder, Assignment, IgnoredOrder, NewAgent, NewOrder, NewUser,
    Order, OrderItem, ProfileUpdate, User,
};

macro_rules! agent_columns {
    () => {
        "id, user_id, identity_id, email, name, phone, age, address, vehicle_number, \
         profile_image_url, is_active, created_at"
    };
}

macro_rules! user_columns {
    () => {
        "id, email, name, role, identity_id, is_verified, is_active, created_at"
    };
}

macro_rules! order_select {
    () => {
        "SELECT o.id, o.total_price, o.delivery_address, o.status, o.created_at, o.updated_at, \
                COALESCE((SELECT SUM(i.quantity) FROM portal.order_items i \
                          WHERE i.order_id = o.id), 0)::BIGINT AS total_items \
         FROM portal.orders o"
    };
}

// =============================================================================
// Row types
// =============================================================================

fn corrupt(what: &str, err: impl std::fmt::Display) -> RepositoryError {
    RepositoryError::DataCorruption(format!("invalid {what} in database: {err}"))
}

fn parse_email(raw: &str) -> Result<Email, RepositoryError> {
    Email::parse(raw).map_err(|e| corrupt("email", e))
}

fn parse_status(raw: &str) -> Result<OrderStatus, RepositoryError> {
    raw.parse().map_err(|e: String| corrupt("order status", e))
}

fn status_texts(statuses: &[OrderStatus]) -> Vec<String> {
    statuses.iter().map(|s| s.as_str().to_owned()).collect()
}

#[derive(Debug, sqlx::FromRow)]
struct AgentRow {
    id: Uuid,
    user_id: Option<Uuid>,
    identity_id: Option<String>,
    email: String,
    name: String,
    phone: Option<String>,
    age: Option<i32>,
    address: Option<String>,
    vehicle_number: Option<String>,
    profile_image_url: Option<String>,
    is_active: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<AgentRow> for Agent {
    type Error = RepositoryError;

    fn try_from(row: AgentRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: AgentId::new(row.id),
            user_id: row.user_id.map(UserId::new),
            identity_id: row.identity_id.map(IdentityId::new),
            email: parse_email(&row.email)?,
            name: row.name,
            phone: row.phone,
            age: row.age,
            address: row.address,
            vehicle_number: row.vehicle_number,
            profile_image_url: row.profile_image_url,
            is_active: row.is_active,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    name: Option<String>,
    role: String,
    identity_id: Option<String>,
    is_verified: bool,
    is_active: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = RepositoryError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let role: UserRole = row.role.parse().map_err(|e: String| corrupt("role", e))?;

        Ok(Self {
            id: UserId::new(row.id),
            email: parse_email(&row.email)?,
            name: row.name,
            role,
            identity_id: row.identity_id.map(IdentityId::new),
            is_verified: row.is_verified,
            is_active: row.is_active,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    total_price: Decimal,
    delivery_address: Option<serde_json::Value>,
    status: String,
    total_items: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = RepositoryError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: OrderId::new(row.id),
            total_price: row.total_price,
            delivery_address: row.delivery_address.unwrap_or_default(),
            status: parse_status(&row.status)?,
            total_items: row.total_items,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OrderItemRow {
    id: Uuid,
    order_id: Uuid,
    medicine_id: String,
    medicine_name: Option<String>,
    quantity: i32,
    price: Decimal,
}

impl From<OrderItemRow> for OrderItem {
    fn from(row: OrderItemRow) -> Self {
        Self {
            id: OrderItemId::new(row.id),
            order_id: OrderId::new(row.order_id),
            medicine_id: row.medicine_id,
            medicine_name: row.medicine_name,
            quantity: row.quantity,
            price: row.price,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct AssignmentRow {
    id: Uuid,
    order_id: Uuid,
    agent_id: Uuid,
    assigned_at: DateTime<Utc>,
}

impl From<AssignmentRow> for Assignment {
    fn from(row: AssignmentRow) -> Self {
        Self {
            id: AssignmentId::new(row.id),
            order_id: OrderId::new(row.order_id),
            agent_id: AgentId::new(row.agent_id),
            assigned_at: row.assigned_at,
        }
    }
}

/// An order row joined with an extra timestamp (assigned or ignored at).
#[derive(Debug, sqlx::FromRow)]
struct StampedOrderRow {
    #[sqlx(flatten)]
    order: OrderRow,
    stamped_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct StatsRow {
    total_accepted: i64,
    total_delivered: i64,
    active_deliveries: i64,
    ignored_count: i64,
}

// =============================================================================
// Store
// =============================================================================

/// `PostgreSQL`-backed store.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Insert an order with its line items in one transaction.
    ///
    /// Orders are normally written by checkout; this exists for seeding.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if any insert fails.
    pub async fn insert_order(&self, order: &NewOrder) -> Result<OrderId, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let (id,): (Uuid,) = sqlx::query_as(
            r"
            INSERT INTO portal.orders (total_price, delivery_address, status)
            VALUES ($1, $2, $3)
            RETURNING id
            ",
        )
        .bind(order.total_price)
        .bind(&order.delivery_address)
        .bind(order.status.as_str())
        .fetch_one(&mut *tx)
        .await?;

        for item in &order.items {
            sqlx::query(
                r"
                INSERT INTO portal.order_items (order_id, medicine_id, medicine_name, quantity, price)
                VALUES ($1, $2, $3, $4, $5)
                ",
            )
            .bind(id)
            .bind(&item.medicine_id)
            .bind(item.medicine_name.as_deref())
            .bind(item.quantity)
            .bind(item.price)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(OrderId::new(id))
    }

    async fn fetch_agent(&self, sql: &str, key: &str) -> Result<Option<Agent>, RepositoryError> {
        sqlx::query_as::<_, AgentRow>(sql)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?
            .map(Agent::try_from)
            .transpose()
    }

    async fn fetch_user(&self, sql: &str, key: &str) -> Result<Option<User>, RepositoryError> {
        sqlx::query_as::<_, UserRow>(sql)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?
            .map(User::try_from)
            .transpose()
    }

    async fn fetch_stamped(
        &self,
        sql: &str,
        agent_id: AgentId,
        statuses: Option<Vec<String>>,
    ) -> Result<Vec<(Order, DateTime<Utc>)>, RepositoryError> {
        let rows: Vec<StampedOrderRow> = sqlx::query_as(sql)
            .bind(agent_id.as_uuid())
            .bind(statuses)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|row| Ok((Order::try_from(row.order)?, row.stamped_at)))
            .collect()
    }
}

#[async_trait]
impl Store for PgStore {
    async fn ping(&self) -> Result<(), RepositoryError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn agent_by_identity(
        &self,
        identity_id: &IdentityId,
    ) -> Result<Option<Agent>, RepositoryError> {
        self.fetch_agent(
            concat!(
                "SELECT ",
                agent_columns!(),
                " FROM portal.delivery_agents WHERE identity_id = $1"
            ),
            identity_id.as_str(),
        )
        .await
    }

    async fn agent_by_user(&self, user_id: UserId) -> Result<Option<Agent>, RepositoryError> {
        sqlx::query_as::<_, AgentRow>(concat!(
            "SELECT ",
            agent_columns!(),
            " FROM portal.delivery_agents WHERE user_id = $1"
        ))
        .bind(user_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?
        .map(Agent::try_from)
        .transpose()
    }

    async fn agent_by_email(&self, email: &Email) -> Result<Option<Agent>, RepositoryError> {
        self.fetch_agent(
            concat!(
                "SELECT ",
                agent_columns!(),
                " FROM portal.delivery_agents WHERE email = $1"
            ),
            email.as_str(),
        )
        .await
    }

    async fn insert_agent(&self, agent: &NewAgent) -> Result<Agent, RepositoryError> {
        let row: AgentRow = sqlx::query_as(concat!(
            "INSERT INTO portal.delivery_agents (user_id, identity_id, email, name, phone) \
             VALUES ($1, $2, $3, $4, $5) RETURNING ",
            agent_columns!()
        ))
        .bind(agent.user_id.map(|id| id.as_uuid()))
        .bind(agent.identity_id.as_ref().map(IdentityId::as_str))
        .bind(agent.email.as_str())
        .bind(&agent.name)
        .bind(agent.phone.as_deref())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| RepositoryError::from_unique(e, "delivery agent"))?;

        row.try_into()
    }

    async fn link_agent(
        &self,
        agent_id: AgentId,
        identity_id: &IdentityId,
        user_id: Option<UserId>,
    ) -> Result<Agent, RepositoryError> {
        let row: Option<AgentRow> = sqlx::query_as(concat!(
            "UPDATE portal.delivery_agents \
             SET identity_id = $2, user_id = COALESCE($3, user_id) \
             WHERE id = $1 RETURNING ",
            agent_columns!()
        ))
        .bind(agent_id.as_uuid())
        .bind(identity_id.as_str())
        .bind(user_id.map(|id| id.as_uuid()))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepositoryError::from_unique(e, "agent identity link"))?;

        row.ok_or(RepositoryError::NotFound)?.try_into()
    }

    async fn update_agent_profile(
        &self,
        agent_id: AgentId,
        update: &ProfileUpdate,
    ) -> Result<Agent, RepositoryError> {
        let row: Option<AgentRow> = sqlx::query_as(concat!(
            "UPDATE portal.delivery_agents SET \
                name = COALESCE($2, name), \
                phone = CASE WHEN $3 THEN $4 ELSE phone END, \
                age = CASE WHEN $5 THEN $6 ELSE age END, \
                address = CASE WHEN $7 THEN $8 ELSE address END, \
                vehicle_number = CASE WHEN $9 THEN $10 ELSE vehicle_number END \
             WHERE id = $1 RETURNING ",
            agent_columns!()
        ))
        .bind(agent_id.as_uuid())
        .bind(update.name.as_deref())
        .bind(update.phone.is_some())
        .bind(update.phone.clone().flatten())
        .bind(update.age.is_some())
        .bind(update.age.flatten())
        .bind(update.address.is_some())
        .bind(update.address.clone().flatten())
        .bind(update.vehicle_number.is_some())
        .bind(update.vehicle_number.clone().flatten())
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or(RepositoryError::NotFound)?.try_into()
    }

    async fn set_agent_image(
        &self,
        agent_id: AgentId,
        url: &str,
    ) -> Result<Agent, RepositoryError> {
        let row: Option<AgentRow> = sqlx::query_as(concat!(
            "UPDATE portal.delivery_agents SET profile_image_url = $2 WHERE id = $1 RETURNING ",
            agent_columns!()
        ))
        .bind(agent_id.as_uuid())
        .bind(url)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or(RepositoryError::NotFound)?.try_into()
    }

    async fn set_agent_active(
        &self,
        email: &Email,
        active: bool,
    ) -> Result<Option<Agent>, RepositoryError> {
        sqlx::query_as::<_, AgentRow>(concat!(
            "UPDATE portal.delivery_agents SET is_active = $2 WHERE email = $1 RETURNING ",
            agent_columns!()
        ))
        .bind(email.as_str())
        .bind(active)
        .fetch_optional(&self.pool)
        .await?
        .map(Agent::try_from)
        .transpose()
    }

    async fn agent_stats(&self, agent_id: AgentId) -> Result<AgentStats, RepositoryError> {
        let row: StatsRow = sqlx::query_as(
            r"
            SELECT
                COUNT(a.id) AS total_accepted,
                COUNT(a.id) FILTER (WHERE o.status = 'delivered') AS total_delivered,
                COUNT(a.id) FILTER (WHERE o.status = ANY($2)) AS active_deliveries,
                (SELECT COUNT(*) FROM portal.ignored_orders WHERE agent_id = $1) AS ignored_count
            FROM portal.order_assignments a
            JOIN portal.orders o ON o.id = a.order_id
            WHERE a.agent_id = $1
            ",
        )
        .bind(agent_id.as_uuid())
        .bind(status_texts(&OrderStatus::ACTIVE))
        .fetch_one(&self.pool)
        .await?;

        Ok(AgentStats {
            total_accepted: row.total_accepted,
            total_delivered: row.total_delivered,
            active_deliveries: row.active_deliveries,
            ignored_count: row.ignored_count,
        })
    }

    async fn user_by_id(&self, user_id: UserId) -> Result<Option<User>, RepositoryError> {
        sqlx::query_as::<_, UserRow>(concat!(
            "SELECT ",
            user_columns!(),
            " FROM portal.users WHERE id = $1"
        ))
        .bind(user_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?
        .map(User::try_from)
        .transpose()
    }

    async fn user_by_identity(
        &self,
        identity_id: &IdentityId,
    ) -> Result<Option<User>, RepositoryError> {
        self.fetch_user(
            concat!(
                "SELECT ",
                user_columns!(),
                " FROM portal.users WHERE identity_id = $1"
            ),
            identity_id.as_str(),
        )
        .await
    }

    async fn user_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError> {
        self.fetch_user(
            concat!(
                "SELECT ",
                user_columns!(),
                " FROM portal.users WHERE email = $1"
            ),
            email.as_str(),
        )
        .await
    }

    async fn insert_user(&self, user: &NewUser) -> Result<User, RepositoryError> {
        let row: UserRow = sqlx::query_as(concat!(
            "INSERT INTO portal.users (email, name, role, identity_id, is_verified, is_active) \
             VALUES ($1, $2, $3, $4, $5, TRUE) RETURNING ",
            user_columns!()
        ))
        .bind(user.email.as_str())
        .bind(user.name.as_deref())
        .bind(user.role.as_str())
        .bind(user.identity_id.as_ref().map(IdentityId::as_str))
        .bind(user.is_verified)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| RepositoryError::from_unique(e, "user"))?;

        row.try_into()
    }

    async fn link_user_identity(
        &self,
        user_id: UserId,
        identity_id: &IdentityId,
    ) -> Result<User, RepositoryError> {
        let row: Option<UserRow> = sqlx::query_as(concat!(
            "UPDATE portal.users SET identity_id = $2, updated_at = now() WHERE id = $1 RETURNING ",
            user_columns!()
        ))
        .bind(user_id.as_uuid())
        .bind(identity_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepositoryError::from_unique(e, "user identity link"))?;

        row.ok_or(RepositoryError::NotFound)?.try_into()
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>, RepositoryError> {
        sqlx::query_as::<_, OrderRow>(concat!(order_select!(), " WHERE o.id = $1"))
            .bind(order_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .map(Order::try_from)
            .transpose()
    }

    async fn order_items(&self, order_id: OrderId) -> Result<Vec<OrderItem>, RepositoryError> {
        let rows: Vec<OrderItemRow> = sqlx::query_as(
            r"
            SELECT id, order_id, medicine_id, medicine_name, quantity, price
            FROM portal.order_items
            WHERE order_id = $1
            ORDER BY created_at, id
            ",
        )
        .bind(order_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(OrderItem::from).collect())
    }

    async fn orders_with_status(
        &self,
        statuses: &[OrderStatus],
    ) -> Result<Vec<Order>, RepositoryError> {
        let rows: Vec<OrderRow> = sqlx::query_as(concat!(
            order_select!(),
            " WHERE o.status = ANY($1) ORDER BY o.created_at DESC"
        ))
        .bind(status_texts(statuses))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Order::try_from).collect()
    }

    async fn transition_order(
        &self,
        order_id: OrderId,
        expected: OrderStatus,
        target: OrderStatus,
    ) -> Result<CasResult, RepositoryError> {
        let updated = sqlx::query(
            r"
            UPDATE portal.orders
            SET status = $3, updated_at = now()
            WHERE id = $1 AND status = $2
            ",
        )
        .bind(order_id.as_uuid())
        .bind(expected.as_str())
        .bind(target.as_str())
        .execute(&self.pool)
        .await?
        .rows_affected();

        if updated > 0 {
            return Ok(CasResult::Success);
        }

        let actual: Option<(String,)> =
            sqlx::query_as("SELECT status FROM portal.orders WHERE id = $1")
                .bind(order_id.as_uuid())
                .fetch_optional(&self.pool)
                .await?;

        match actual {
            None => Ok(CasResult::NotFound),
            Some((status,)) => Ok(CasResult::StateMismatch {
                actual: parse_status(&status)?,
            }),
        }
    }

    async fn insert_assignment(
        &self,
        order_id: OrderId,
        agent_id: AgentId,
    ) -> Result<Assignment, RepositoryError> {
        let row: AssignmentRow = sqlx::query_as(
            r"
            INSERT INTO portal.order_assignments (order_id, agent_id)
            VALUES ($1, $2)
            RETURNING id, order_id, agent_id, assigned_at
            ",
        )
        .bind(order_id.as_uuid())
        .bind(agent_id.as_uuid())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| RepositoryError::from_unique(e, "assignment"))?;

        Ok(row.into())
    }

    async fn assignment_for_order(
        &self,
        order_id: OrderId,
    ) -> Result<Option<Assignment>, RepositoryError> {
        let row: Option<AssignmentRow> = sqlx::query_as(
            r"
            SELECT id, order_id, agent_id, assigned_at
            FROM portal.order_assignments
            WHERE order_id = $1
            ",
        )
        .bind(order_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Assignment::from))
    }

    async fn assigned_order_ids(&self, agent_id: AgentId) -> Result<Vec<OrderId>, RepositoryError> {
        let rows: Vec<(Uuid,)> =
            sqlx::query_as("SELECT order_id FROM portal.order_assignments WHERE agent_id = $1")
                .bind(agent_id.as_uuid())
                .fetch_all(&self.pool)
                .await?;

        Ok(rows.into_iter().map(|(id,)| OrderId::new(id)).collect())
    }

    async fn assigned_orders(
        &self,
        agent_id: AgentId,
        statuses: Option<&[OrderStatus]>,
    ) -> Result<Vec<AssignedOrder>, RepositoryError> {
        let rows = self
            .fetch_stamped(
                concat!(
                    "SELECT q.*, a.assigned_at AS stamped_at FROM portal.order_assignments a \
                     JOIN (",
                    order_select!(),
                    ") q ON q.id = a.order_id \
                     WHERE a.agent_id = $1 AND ($2::TEXT[] IS NULL OR q.status = ANY($2)) \
                     ORDER BY a.assigned_at DESC"
                ),
                agent_id,
                statuses.map(status_texts),
            )
            .await?;

        Ok(rows
            .into_iter()
            .map(|(order, assigned_at)| AssignedOrder { order, assigned_at })
            .collect())
    }

    async fn ignore_order(
        &self,
        order_id: OrderId,
        agent_id: AgentId,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            INSERT INTO portal.ignored_orders (order_id, agent_id)
            VALUES ($1, $2)
            ON CONFLICT (order_id, agent_id) DO NOTHING
            ",
        )
        .bind(order_id.as_uuid())
        .bind(agent_id.as_uuid())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn ignored_order_ids(&self, agent_id: AgentId) -> Result<Vec<OrderId>, RepositoryError> {
        let rows: Vec<(Uuid,)> =
            sqlx::query_as("SELECT order_id FROM portal.ignored_orders WHERE agent_id = $1")
                .bind(agent_id.as_uuid())
                .fetch_all(&self.pool)
                .await?;

        Ok(rows.into_iter().map(|(id,)| OrderId::new(id)).collect())
    }

    async fn ignored_orders(
        &self,
        agent_id: AgentId,
    ) -> Result<Vec<IgnoredOrder>, RepositoryError> {
        let rows = self
            .fetch_stamped(
                concat!(
                    "SELECT q.*, g.ignored_at AS stamped_at FROM portal.ignored_orders g \
                     JOIN (",
                    order_select!(),
                    ") q ON q.id = g.order_id \
                     WHERE g.agent_id = $1 AND ($2::TEXT[] IS NULL OR q.status = ANY($2)) \
                     ORDER BY g.ignored_at DESC"
                ),
                agent_id,
                None,
            )
            .await?;

        Ok(rows
            .into_iter()
            .map(|(order, ignored_at)| IgnoredOrder { order, ignored_at })
            .collect())
    }

    /// Single-statement claim: the status swap feeds the assignment insert,
    /// so both commit or neither does.
    async fn claim_order(
        &self,
        order_id: OrderId,
        agent_id: AgentId,
        expected: OrderStatus,
    ) -> Result<ClaimOutcome, RepositoryError> {
        let result: Result<Option<AssignmentRow>, sqlx::Error> = sqlx::query_as(
            r"
            WITH claimed AS (
                UPDATE portal.orders
                SET status = 'accepted', updated_at = now()
                WHERE id = $1 AND status = $3
                RETURNING id
            )
            INSERT INTO portal.order_assignments (order_id, agent_id)
            SELECT id, $2 FROM claimed
            RETURNING id, order_id, agent_id, assigned_at
            ",
        )
        .bind(order_id.as_uuid())
        .bind(agent_id.as_uuid())
        .bind(expected.as_str())
        .fetch_optional(&self.pool)
        .await;

        match result {
            Ok(Some(row)) => Ok(ClaimOutcome::Claimed(row.into())),
            Ok(None) => Ok(ClaimOutcome::Lost),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                tracing::error!(
                    order_id = %order_id,
                    agent_id = %agent_id,
                    error = %db_err,
                    "Claimable order already had an assignment"
                );
                Ok(ClaimOutcome::AssignmentFailed(db_err.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}
