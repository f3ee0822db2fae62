//! In-memory store implementation for testing.
//!
//! [`InMemoryStore`] implements [`Store`] with `RwLock`-guarded maps and
//! enforces the same uniqueness rules as the SQL schema. It keeps the
//! default two-step [`Store::claim_order`], so the compare-and-swap race
//! guard and its compensation path are exercised directly.
//!
//! ## Limitations
//!
//! - **NOT suitable for production**: no durability, single process only

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use courier_portal_core::{
    AgentId, AssignmentId, Email, IdentityId, OrderId, OrderItemId, OrderStatus, UserId, UserRole,
};

use super::{CasResult, RepositoryError, Store};
use crate::models::{
    Agent, AgentStats, AssignedOrder, Assignment, IgnoredOrder, NewAgent, NewOrder, NewUser,
    Order, OrderItem, ProfileUpdate, User,
};

#[derive(Debug, Default)]
struct Tables {
    agents: HashMap<AgentId, Agent>,
    users: HashMap<UserId, User>,
    orders: HashMap<OrderId, Order>,
    items: HashMap<OrderId, Vec<OrderItem>>,
    assignments: HashMap<OrderId, Assignment>,
    ignored: HashMap<(OrderId, AgentId), DateTime<Utc>>,
}

impl Tables {
    fn agent_conflict(&self, candidate: &Agent) -> Option<&'static str> {
        self.agents
            .values()
            .filter(|other| other.id != candidate.id)
            .find_map(|other| {
                if other.email == candidate.email {
                    Some("email")
                } else if candidate.identity_id.is_some() && other.identity_id == candidate.identity_id
                {
                    Some("identity")
                } else if candidate.user_id.is_some() && other.user_id == candidate.user_id {
                    Some("user")
                } else {
                    None
                }
            })
    }

    fn order_with_total(&self, order: &Order) -> Order {
        let total_items = self
            .items
            .get(&order.id)
            .map_or(0, |items| items.iter().map(|i| i64::from(i.quantity)).sum());
        Order {
            total_items,
            ..order.clone()
        }
    }
}

/// In-memory store for testing.
#[derive(Debug)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
    writes: AtomicU64,
    fail_assignments: AtomicBool,
    provision_agents: bool,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Converts a lock poison error to a store error.
fn poison_err<T>(_: PoisonError<T>) -> RepositoryError {
    RepositoryError::Unavailable("lock poisoned".to_owned())
}

impl InMemoryStore {
    /// Creates an empty store without agent provisioning on user insert.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            writes: AtomicU64::new(0),
            fail_assignments: AtomicBool::new(false),
            provision_agents: false,
        }
    }

    /// Creates a store that, like the database trigger, inserts an agent row
    /// whenever a delivery-agent user is inserted.
    #[must_use]
    pub fn with_agent_provisioning() -> Self {
        Self {
            provision_agents: true,
            ..Self::new()
        }
    }

    /// Number of mutating calls served so far.
    #[must_use]
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Make every subsequent assignment insert fail.
    pub fn fail_assignment_inserts(&self, fail: bool) {
        self.fail_assignments.store(fail, Ordering::SeqCst);
    }

    /// Insert an order with its line items.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn insert_order(&self, order: &NewOrder) -> Result<OrderId, RepositoryError> {
        self.bump();
        let now = Utc::now();
        let id = OrderId::generate();
        let items = order
            .items
            .iter()
            .map(|item| OrderItem {
                id: OrderItemId::generate(),
                order_id: id,
                medicine_id: item.medicine_id.clone(),
                medicine_name: item.medicine_name.clone(),
                quantity: item.quantity,
                price: item.price,
            })
            .collect();

        let mut tables = self.tables.write().map_err(poison_err)?;
        tables.orders.insert(
            id,
            Order {
                id,
                total_price: order.total_price,
                delivery_address: order.delivery_address.clone(),
                status: order.status,
                total_items: 0,
                created_at: now,
                updated_at: now,
            },
        );
        tables.items.insert(id, items);
        Ok(id)
    }

    /// Insert a user directly, bypassing agent provisioning (fixtures for
    /// accounts created by other applications).
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the email or identity is taken.
    pub fn seed_user(&self, user: &NewUser) -> Result<User, RepositoryError> {
        let mut tables = self.tables.write().map_err(poison_err)?;
        Self::insert_user_row(&mut tables, user)
    }

    fn bump(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }

    fn insert_user_row(tables: &mut Tables, user: &NewUser) -> Result<User, RepositoryError> {
        let taken = tables.users.values().any(|other| {
            other.email == user.email
                || (user.identity_id.is_some() && other.identity_id == user.identity_id)
        });
        if taken {
            return Err(RepositoryError::Conflict("user already exists".to_owned()));
        }

        let row = User {
            id: UserId::generate(),
            email: user.email.clone(),
            name: user.name.clone(),
            role: user.role,
            identity_id: user.identity_id.clone(),
            is_verified: user.is_verified,
            is_active: true,
            created_at: Utc::now(),
        };
        tables.users.insert(row.id, row.clone());
        Ok(row)
    }

    fn insert_agent_row(tables: &mut Tables, agent: &NewAgent) -> Result<Agent, RepositoryError> {
        let row = Agent {
            id: AgentId::generate(),
            user_id: agent.user_id,
            identity_id: agent.identity_id.clone(),
            email: agent.email.clone(),
            name: agent.name.clone(),
            phone: agent.phone.clone(),
            age: None,
            address: None,
            vehicle_number: None,
            profile_image_url: None,
            is_active: true,
            created_at: Utc::now(),
        };
        if let Some(field) = tables.agent_conflict(&row) {
            return Err(RepositoryError::Conflict(format!(
                "delivery agent {field} already exists"
            )));
        }
        tables.agents.insert(row.id, row.clone());
        Ok(row)
    }

    fn find_agent(&self, pred: impl Fn(&Agent) -> bool) -> Result<Option<Agent>, RepositoryError> {
        let tables = self.tables.read().map_err(poison_err)?;
        Ok(tables.agents.values().find(|a| pred(a)).cloned())
    }

    fn find_user(&self, pred: impl Fn(&User) -> bool) -> Result<Option<User>, RepositoryError> {
        let tables = self.tables.read().map_err(poison_err)?;
        Ok(tables.users.values().find(|u| pred(u)).cloned())
    }

    fn mutate_agent(
        &self,
        agent_id: AgentId,
        f: impl FnOnce(&mut Agent),
    ) -> Result<Agent, RepositoryError> {
        self.bump();
        let mut tables = self.tables.write().map_err(poison_err)?;
        let mut agent = tables
            .agents
            .get(&agent_id)
            .cloned()
            .ok_or(RepositoryError::NotFound)?;
        f(&mut agent);
        if let Some(field) = tables.agent_conflict(&agent) {
            return Err(RepositoryError::Conflict(format!(
                "delivery agent {field} already exists"
            )));
        }
        tables.agents.insert(agent_id, agent.clone());
        Ok(agent)
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn ping(&self) -> Result<(), RepositoryError> {
        drop(self.tables.read().map_err(poison_err)?);
        Ok(())
    }

    async fn agent_by_identity(
        &self,
        identity_id: &IdentityId,
    ) -> Result<Option<Agent>, RepositoryError> {
        self.find_agent(|a| a.is_linked_to(identity_id))
    }

    async fn agent_by_user(&self, user_id: UserId) -> Result<Option<Agent>, RepositoryError> {
        self.find_agent(|a| a.user_id == Some(user_id))
    }

    async fn agent_by_email(&self, email: &Email) -> Result<Option<Agent>, RepositoryError> {
        self.find_agent(|a| &a.email == email)
    }

    async fn insert_agent(&self, agent: &NewAgent) -> Result<Agent, RepositoryError> {
        self.bump();
        let mut tables = self.tables.write().map_err(poison_err)?;
        Self::insert_agent_row(&mut tables, agent)
    }

    async fn link_agent(
        &self,
        agent_id: AgentId,
        identity_id: &IdentityId,
        user_id: Option<UserId>,
    ) -> Result<Agent, RepositoryError> {
        self.mutate_agent(agent_id, |agent| {
            agent.identity_id = Some(identity_id.clone());
            if user_id.is_some() {
                agent.user_id = user_id;
            }
        })
    }

    async fn update_agent_profile(
        &self,
        agent_id: AgentId,
        update: &ProfileUpdate,
    ) -> Result<Agent, RepositoryError> {
        self.mutate_agent(agent_id, |agent| update.apply_to(agent))
    }

    async fn set_agent_image(
        &self,
        agent_id: AgentId,
        url: &str,
    ) -> Result<Agent, RepositoryError> {
        self.mutate_agent(agent_id, |agent| {
            agent.profile_image_url = Some(url.to_owned());
        })
    }

    async fn set_agent_active(
        &self,
        email: &Email,
        active: bool,
    ) -> Result<Option<Agent>, RepositoryError> {
        let Some(agent) = self.agent_by_email(email).await? else {
            return Ok(None);
        };
        self.mutate_agent(agent.id, |agent| agent.is_active = active)
            .map(Some)
    }

    async fn agent_stats(&self, agent_id: AgentId) -> Result<AgentStats, RepositoryError> {
        let tables = self.tables.read().map_err(poison_err)?;
        let mut stats = AgentStats::default();

        for assignment in tables.assignments.values().filter(|a| a.agent_id == agent_id) {
            stats.total_accepted += 1;
            if let Some(order) = tables.orders.get(&assignment.order_id) {
                if order.status == OrderStatus::Delivered {
                    stats.total_delivered += 1;
                } else if order.status.is_active() {
                    stats.active_deliveries += 1;
                }
            }
        }
        stats.ignored_count = tables
            .ignored
            .keys()
            .filter(|(_, agent)| *agent == agent_id)
            .count()
            .try_into()
            .unwrap_or(i64::MAX);

        Ok(stats)
    }

    async fn user_by_id(&self, user_id: UserId) -> Result<Option<User>, RepositoryError> {
        let tables = self.tables.read().map_err(poison_err)?;
        Ok(tables.users.get(&user_id).cloned())
    }

    async fn user_by_identity(
        &self,
        identity_id: &IdentityId,
    ) -> Result<Option<User>, RepositoryError> {
        self.find_user(|u| u.identity_id.as_ref() == Some(identity_id))
    }

    async fn user_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError> {
        self.find_user(|u| &u.email == email)
    }

    async fn insert_user(&self, user: &NewUser) -> Result<User, RepositoryError> {
        self.bump();
        let mut tables = self.tables.write().map_err(poison_err)?;
        let row = Self::insert_user_row(&mut tables, user)?;

        if self.provision_agents && row.role == UserRole::DeliveryAgent {
            let provisioned = NewAgent {
                user_id: Some(row.id),
                identity_id: row.identity_id.clone(),
                email: row.email.clone(),
                name: row.name.clone().unwrap_or_else(|| row.email.to_string()),
                phone: None,
            };
            // Same as ON CONFLICT DO NOTHING in the trigger.
            let _ = Self::insert_agent_row(&mut tables, &provisioned);
        }

        Ok(row)
    }

    async fn link_user_identity(
        &self,
        user_id: UserId,
        identity_id: &IdentityId,
    ) -> Result<User, RepositoryError> {
        self.bump();
        let mut tables = self.tables.write().map_err(poison_err)?;
        let taken = tables
            .users
            .values()
            .any(|u| u.id != user_id && u.identity_id.as_ref() == Some(identity_id));
        if taken {
            return Err(RepositoryError::Conflict(
                "user identity link already exists".to_owned(),
            ));
        }
        let user = tables
            .users
            .get_mut(&user_id)
            .ok_or(RepositoryError::NotFound)?;
        user.identity_id = Some(identity_id.clone());
        Ok(user.clone())
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let tables = self.tables.read().map_err(poison_err)?;
        Ok(tables
            .orders
            .get(&order_id)
            .map(|order| tables.order_with_total(order)))
    }

    async fn order_items(&self, order_id: OrderId) -> Result<Vec<OrderItem>, RepositoryError> {
        let tables = self.tables.read().map_err(poison_err)?;
        Ok(tables.items.get(&order_id).cloned().unwrap_or_default())
    }

    async fn orders_with_status(
        &self,
        statuses: &[OrderStatus],
    ) -> Result<Vec<Order>, RepositoryError> {
        let tables = self.tables.read().map_err(poison_err)?;
        let mut orders: Vec<Order> = tables
            .orders
            .values()
            .filter(|o| statuses.contains(&o.status))
            .map(|o| tables.order_with_total(o))
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn transition_order(
        &self,
        order_id: OrderId,
        expected: OrderStatus,
        target: OrderStatus,
    ) -> Result<CasResult, RepositoryError> {
        self.bump();
        let mut tables = self.tables.write().map_err(poison_err)?;
        let Some(order) = tables.orders.get_mut(&order_id) else {
            return Ok(CasResult::NotFound);
        };
        if order.status != expected {
            return Ok(CasResult::StateMismatch {
                actual: order.status,
            });
        }
        order.status = target;
        order.updated_at = Utc::now();
        Ok(CasResult::Success)
    }

    async fn insert_assignment(
        &self,
        order_id: OrderId,
        agent_id: AgentId,
    ) -> Result<Assignment, RepositoryError> {
        self.bump();
        if self.fail_assignments.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable(
                "assignment insert failed".to_owned(),
            ));
        }

        let mut tables = self.tables.write().map_err(poison_err)?;
        if tables.assignments.contains_key(&order_id) {
            return Err(RepositoryError::Conflict(
                "assignment already exists".to_owned(),
            ));
        }
        let assignment = Assignment {
            id: AssignmentId::generate(),
            order_id,
            agent_id,
            assigned_at: Utc::now(),
        };
        tables.assignments.insert(order_id, assignment);
        Ok(assignment)
    }

    async fn assignment_for_order(
        &self,
        order_id: OrderId,
    ) -> Result<Option<Assignment>, RepositoryError> {
        let tables = self.tables.read().map_err(poison_err)?;
        Ok(tables.assignments.get(&order_id).copied())
    }

    async fn assigned_order_ids(&self, agent_id: AgentId) -> Result<Vec<OrderId>, RepositoryError> {
        let tables = self.tables.read().map_err(poison_err)?;
        Ok(tables
            .assignments
            .values()
            .filter(|a| a.agent_id == agent_id)
            .map(|a| a.order_id)
            .collect())
    }

    async fn assigned_orders(
        &self,
        agent_id: AgentId,
        statuses: Option<&[OrderStatus]>,
    ) -> Result<Vec<AssignedOrder>, RepositoryError> {
        let tables = self.tables.read().map_err(poison_err)?;
        let mut rows: Vec<AssignedOrder> = tables
            .assignments
            .values()
            .filter(|a| a.agent_id == agent_id)
            .filter_map(|a| {
                let order = tables.orders.get(&a.order_id)?;
                let wanted = statuses.is_none_or(|s| s.contains(&order.status));
                wanted.then(|| AssignedOrder {
                    order: tables.order_with_total(order),
                    assigned_at: a.assigned_at,
                })
            })
            .collect();
        rows.sort_by(|a, b| b.assigned_at.cmp(&a.assigned_at));
        Ok(rows)
    }

    async fn ignore_order(
        &self,
        order_id: OrderId,
        agent_id: AgentId,
    ) -> Result<(), RepositoryError> {
        self.bump();
        let mut tables = self.tables.write().map_err(poison_err)?;
        tables
            .ignored
            .entry((order_id, agent_id))
            .or_insert_with(Utc::now);
        Ok(())
    }

    async fn ignored_order_ids(&self, agent_id: AgentId) -> Result<Vec<OrderId>, RepositoryError> {
        let tables = self.tables.read().map_err(poison_err)?;
        Ok(tables
            .ignored
            .keys()
            .filter(|(_, agent)| *agent == agent_id)
            .map(|(order, _)| *order)
            .collect())
    }

    async fn ignored_orders(
        &self,
        agent_id: AgentId,
    ) -> Result<Vec<IgnoredOrder>, RepositoryError> {
        let tables = self.tables.read().map_err(poison_err)?;
        let mut rows: Vec<IgnoredOrder> = tables
            .ignored
            .iter()
            .filter(|((_, agent), _)| *agent == agent_id)
            .filter_map(|((order_id, _), ignored_at)| {
                let order = tables.orders.get(order_id)?;
                Some(IgnoredOrder {
                    order: tables.order_with_total(order),
                    ignored_at: *ignored_at,
                })
            })
            .collect();
        rows.sort_by(|a, b| b.ignored_at.cmp(&a.ignored_at));
        Ok(rows)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal::Decimal;
    use serde_json::json;

    use super::*;
    use crate::db::ClaimOutcome;
    use crate::models::NewOrderItem;

    fn pending_order(store: &InMemoryStore) -> OrderId {
        store
            .insert_order(&NewOrder {
                total_price: Decimal::new(2450, 2),
                delivery_address: json!("1 Harbour St"),
                status: OrderStatus::Pending,
                items: vec![
                    NewOrderItem {
                        medicine_id: "med-1".to_owned(),
                        medicine_name: Some("Ibuprofen".to_owned()),
                        quantity: 2,
                        price: Decimal::new(500, 2),
                    },
                    NewOrderItem {
                        medicine_id: "med-2".to_owned(),
                        medicine_name: None,
                        quantity: 3,
                        price: Decimal::new(483, 2),
                    },
                ],
            })
            .unwrap()
    }

    async fn agent(store: &InMemoryStore, email: &str) -> Agent {
        store
            .insert_agent(&NewAgent {
                user_id: None,
                identity_id: None,
                email: Email::parse(email).unwrap(),
                name: "Rider".to_owned(),
                phone: None,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_ping_releases_lock() {
        let store = InMemoryStore::new();
        store.ping().await.unwrap();
        pending_order(&store);
        assert!(store.get_order(OrderId::generate()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_total_items_sums_quantities() {
        let store = InMemoryStore::new();
        let id = pending_order(&store);
        let order = store.get_order(id).await.unwrap().unwrap();
        assert_eq!(order.total_items, 5);
        assert_eq!(order.total_price, Decimal::new(2450, 2));
    }

    #[tokio::test]
    async fn test_transition_reports_actual_status() {
        let store = InMemoryStore::new();
        let id = pending_order(&store);

        let first = store
            .transition_order(id, OrderStatus::Pending, OrderStatus::Accepted)
            .await
            .unwrap();
        assert!(first.is_success());

        let second = store
            .transition_order(id, OrderStatus::Pending, OrderStatus::Accepted)
            .await
            .unwrap();
        assert_eq!(
            second,
            CasResult::StateMismatch {
                actual: OrderStatus::Accepted
            }
        );

        let missing = store
            .transition_order(OrderId::generate(), OrderStatus::Pending, OrderStatus::Accepted)
            .await
            .unwrap();
        assert_eq!(missing, CasResult::NotFound);
    }

    #[tokio::test]
    async fn test_default_claim_compensates_failed_assignment() {
        let store = InMemoryStore::new();
        let id = pending_order(&store);
        let rider = agent(&store, "rider@example.com").await;

        store.fail_assignment_inserts(true);
        let outcome = store
            .claim_order(id, rider.id, OrderStatus::Pending)
            .await
            .unwrap();

        assert!(matches!(outcome, ClaimOutcome::AssignmentFailed(_)));
        let order = store.get_order(id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Pending);
        assert!(store.assignment_for_order(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_agent_uniqueness() {
        let store = InMemoryStore::new();
        agent(&store, "rider@example.com").await;

        let err = store
            .insert_agent(&NewAgent {
                user_id: None,
                identity_id: None,
                email: Email::parse("rider@example.com").unwrap(),
                name: "Again".to_owned(),
                phone: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_provisioning_trigger_links_user() {
        let store = InMemoryStore::with_agent_provisioning();
        let user = store
            .insert_user(&NewUser {
                email: Email::parse("new@example.com").unwrap(),
                name: Some("New Rider".to_owned()),
                role: UserRole::DeliveryAgent,
                identity_id: Some(IdentityId::new("kp_new")),
                is_verified: true,
            })
            .await
            .unwrap();

        let agent = store.agent_by_user(user.id).await.unwrap().unwrap();
        assert_eq!(agent.name, "New Rider");
        assert!(agent.is_linked_to(&IdentityId::new("kp_new")));
    }

    #[tokio::test]
    async fn test_ignore_is_idempotent() {
        let store = InMemoryStore::new();
        let id = pending_order(&store);
        let rider = agent(&store, "rider@example.com").await;

        store.ignore_order(id, rider.id).await.unwrap();
        store.ignore_order(id, rider.id).await.unwrap();

        assert_eq!(store.ignored_orders(rider.id).await.unwrap().len(), 1);
        assert_eq!(store.agent_stats(rider.id).await.unwrap().ignored_count, 1);
    }
}
