//! Order assignment service.
//!
//! Agents claim orders from a shared pool. The only cross-request guard is
//! the compare-and-swap on the order status performed by the store; nothing
//! here holds a lock or retries.

use std::collections::HashSet;

use thiserror::Error;

use courier_portal_core::{AgentId, OrderId, OrderStatus};

use crate::db::{CasResult, ClaimOutcome, RepositoryError, Store};
use crate::models::{AgentStats, AssignedOrder, Assignment, IgnoredOrder, Order, OrderItem};

/// Errors from order actions.
#[derive(Debug, Error)]
pub enum OrderError {
    #[error("order not found")]
    OrderNotFound,

    /// Lost the accept race, or the order already moved past claimable.
    #[error("order is no longer available")]
    OrderUnavailable,

    /// The status moved but the assignment could not be recorded.
    #[error("failed to assign order: {0}")]
    AssignmentFailed(String),

    #[error("order is not assigned to this agent")]
    NotAssigned,

    #[error("cannot move order from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

/// An order with its line items.
#[derive(Debug, Clone)]
pub struct OrderDetail {
    pub order: Order,
    pub items: Vec<OrderItem>,
}

/// Result of a complete action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    pub order_id: OrderId,
    /// The order was already delivered; nothing was written.
    pub already_delivered: bool,
}

/// Whether an owned order may move from `from` to `to`.
///
/// Only work in progress moves, and only forward.
const fn progresses(from: OrderStatus, to: OrderStatus) -> bool {
    from.is_active() && from.can_advance_to(to)
}

/// Order assignment service.
pub struct OrderService<'a> {
    store: &'a dyn Store,
}

impl<'a> OrderService<'a> {
    /// Create a new order service.
    #[must_use]
    pub const fn new(store: &'a dyn Store) -> Self {
        Self { store }
    }

    /// Claimable orders minus those the agent already owns or dismissed.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::Repository` if a lookup fails.
    pub async fn available(&self, agent_id: AgentId) -> Result<Vec<Order>, OrderError> {
        let assigned = self.store.assigned_order_ids(agent_id).await?;
        let ignored = self.store.ignored_order_ids(agent_id).await?;
        let excluded: HashSet<OrderId> = assigned.into_iter().chain(ignored).collect();

        let orders = self
            .store
            .orders_with_status(&OrderStatus::CLAIMABLE)
            .await?
            .into_iter()
            .filter(|order| !excluded.contains(&order.id))
            .collect();

        Ok(orders)
    }

    /// Order with line items.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::OrderNotFound` if the order does not exist.
    pub async fn detail(&self, order_id: OrderId) -> Result<OrderDetail, OrderError> {
        let order = self.load(order_id).await?;
        let items = self.store.order_items(order_id).await?;
        Ok(OrderDetail { order, items })
    }

    /// Claim an order for `agent_id`.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::OrderNotFound` if the order does not exist.
    /// Returns `OrderError::OrderUnavailable` if the order is not claimable or
    /// another agent won the race.
    /// Returns `OrderError::AssignmentFailed` if the assignment could not be
    /// recorded (the status has been reverted).
    pub async fn accept(
        &self,
        order_id: OrderId,
        agent_id: AgentId,
    ) -> Result<Assignment, OrderError> {
        let order = self.load(order_id).await?;

        if !order.status.is_claimable() {
            return Err(OrderError::OrderUnavailable);
        }

        match self.store.claim_order(order_id, agent_id, order.status).await? {
            ClaimOutcome::Claimed(assignment) => {
                tracing::info!(
                    order_id = %order_id,
                    agent_id = %agent_id,
                    "Order accepted"
                );
                Ok(assignment)
            }
            ClaimOutcome::Lost => {
                tracing::debug!(order_id = %order_id, agent_id = %agent_id, "Accept race lost");
                Err(OrderError::OrderUnavailable)
            }
            ClaimOutcome::AssignmentFailed(reason) => Err(OrderError::AssignmentFailed(reason)),
        }
    }

    /// Hide an order from the agent's available list. Repeats are no-ops and
    /// the order status is never touched.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::OrderNotFound` if the order does not exist.
    pub async fn ignore(&self, order_id: OrderId, agent_id: AgentId) -> Result<(), OrderError> {
        self.load(order_id).await?;
        self.store.ignore_order(order_id, agent_id).await?;
        Ok(())
    }

    /// Mark an owned order as out for delivery.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::NotAssigned` if another agent owns the order and
    /// `OrderError::InvalidTransition` if it is not assigned or accepted.
    pub async fn dispatch(&self, order_id: OrderId, agent_id: AgentId) -> Result<Order, OrderError> {
        let order = self.owned_order(order_id, agent_id).await?;
        let target = OrderStatus::OutForDelivery;

        if !progresses(order.status, target) {
            return Err(OrderError::InvalidTransition {
                from: order.status,
                to: target,
            });
        }

        match self.store.transition_order(order_id, order.status, target).await? {
            CasResult::Success => {}
            CasResult::NotFound => return Err(OrderError::OrderNotFound),
            CasResult::StateMismatch { actual } => {
                return Err(OrderError::InvalidTransition {
                    from: actual,
                    to: target,
                });
            }
        }

        tracing::info!(order_id = %order_id, agent_id = %agent_id, "Order out for delivery");
        self.load(order_id).await
    }

    /// Mark an owned order as delivered.
    ///
    /// Completing an already delivered order succeeds without writing.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::NotAssigned` if another agent owns the order and
    /// `OrderError::InvalidTransition` if it is not in an active status.
    pub async fn complete(
        &self,
        order_id: OrderId,
        agent_id: AgentId,
    ) -> Result<Completion, OrderError> {
        let order = self.owned_order(order_id, agent_id).await?;
        let target = OrderStatus::Delivered;

        if order.status == target {
            return Ok(Completion {
                order_id,
                already_delivered: true,
            });
        }

        if !progresses(order.status, target) {
            return Err(OrderError::InvalidTransition {
                from: order.status,
                to: target,
            });
        }

        let already_delivered = match self
            .store
            .transition_order(order_id, order.status, target)
            .await?
        {
            CasResult::Success => false,
            CasResult::NotFound => return Err(OrderError::OrderNotFound),
            CasResult::StateMismatch {
                actual: OrderStatus::Delivered,
            } => true,
            CasResult::StateMismatch { actual } => {
                return Err(OrderError::InvalidTransition {
                    from: actual,
                    to: target,
                });
            }
        };

        if !already_delivered {
            tracing::info!(order_id = %order_id, agent_id = %agent_id, "Order delivered");
        }

        Ok(Completion {
            order_id,
            already_delivered,
        })
    }

    /// Orders the agent is working on.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::Repository` if the lookup fails.
    pub async fn accepted(&self, agent_id: AgentId) -> Result<Vec<AssignedOrder>, OrderError> {
        Ok(self
            .store
            .assigned_orders(agent_id, Some(&OrderStatus::ACTIVE))
            .await?)
    }

    /// Orders the agent has delivered.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::Repository` if the lookup fails.
    pub async fn delivered(&self, agent_id: AgentId) -> Result<Vec<AssignedOrder>, OrderError> {
        Ok(self
            .store
            .assigned_orders(agent_id, Some(&[OrderStatus::Delivered]))
            .await?)
    }

    /// Every order ever assigned to the agent.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::Repository` if the lookup fails.
    pub async fn history(&self, agent_id: AgentId) -> Result<Vec<AssignedOrder>, OrderError> {
        Ok(self.store.assigned_orders(agent_id, None).await?)
    }

    /// Orders the agent has dismissed.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::Repository` if the lookup fails.
    pub async fn ignored(&self, agent_id: AgentId) -> Result<Vec<IgnoredOrder>, OrderError> {
        Ok(self.store.ignored_orders(agent_id).await?)
    }

    /// Profile counters.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::Repository` if the lookup fails.
    pub async fn stats(&self, agent_id: AgentId) -> Result<AgentStats, OrderError> {
        Ok(self.store.agent_stats(agent_id).await?)
    }

    async fn load(&self, order_id: OrderId) -> Result<Order, OrderError> {
        self.store
            .get_order(order_id)
            .await?
            .ok_or(OrderError::OrderNotFound)
    }

    /// Load an order the agent owns through its assignment row.
    async fn owned_order(&self, order_id: OrderId, agent_id: AgentId) -> Result<Order, OrderError> {
        let order = self.load(order_id).await?;

        match self.store.assignment_for_order(order_id).await? {
            Some(assignment) if assignment.agent_id == agent_id => Ok(order),
            _ => Err(OrderError::NotAssigned),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal::Decimal;
    use serde_json::json;

    use super::*;
    use crate::db::InMemoryStore;
    use crate::models::{NewOrder, NewOrderItem};

    fn order(store: &InMemoryStore, status: OrderStatus) -> OrderId {
        store
            .insert_order(&NewOrder {
                total_price: Decimal::new(1250, 2),
                delivery_address: json!("1 Main St"),
                status,
                items: vec![NewOrderItem {
                    medicine_id: "med-1".to_owned(),
                    medicine_name: Some("Ibuprofen".to_owned()),
                    quantity: 2,
                    price: Decimal::new(625, 2),
                }],
            })
            .unwrap()
    }

    #[test]
    fn test_progress_rules() {
        use OrderStatus::{Accepted, Assigned, Delivered, OutForDelivery, Paid, Pending};

        for from in [Assigned, Accepted] {
            assert!(progresses(from, OutForDelivery));
            assert!(progresses(from, Delivered));
        }
        assert!(progresses(OutForDelivery, Delivered));
        assert!(!progresses(OutForDelivery, OutForDelivery));

        for from in [Pending, Paid, Delivered] {
            assert!(!progresses(from, OutForDelivery), "{from}");
            assert!(!progresses(from, Delivered), "{from}");
        }
    }

    #[tokio::test]
    async fn test_accept_rejects_non_claimable() {
        let store = InMemoryStore::new();
        let id = order(&store, OrderStatus::OutForDelivery);

        let err = OrderService::new(&store)
            .accept(id, AgentId::generate())
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::OrderUnavailable));
    }

    #[tokio::test]
    async fn test_accept_missing_order() {
        let store = InMemoryStore::new();
        let err = OrderService::new(&store)
            .accept(OrderId::generate(), AgentId::generate())
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::OrderNotFound));
    }

    #[tokio::test]
    async fn test_dispatch_then_complete() {
        let store = InMemoryStore::new();
        let agent = AgentId::generate();
        let id = order(&store, OrderStatus::Paid);
        let service = OrderService::new(&store);

        service.accept(id, agent).await.unwrap();
        let dispatched = service.dispatch(id, agent).await.unwrap();
        assert_eq!(dispatched.status, OrderStatus::OutForDelivery);

        let err = service.dispatch(id, agent).await.unwrap_err();
        assert!(matches!(
            err,
            OrderError::InvalidTransition {
                from: OrderStatus::OutForDelivery,
                ..
            }
        ));

        let done = service.complete(id, agent).await.unwrap();
        assert!(!done.already_delivered);
    }

    #[tokio::test]
    async fn test_complete_twice_is_noop() {
        let store = InMemoryStore::new();
        let agent = AgentId::generate();
        let id = order(&store, OrderStatus::Pending);
        let service = OrderService::new(&store);

        service.accept(id, agent).await.unwrap();
        service.complete(id, agent).await.unwrap();

        let writes = store.write_count();
        let again = service.complete(id, agent).await.unwrap();
        assert!(again.already_delivered);
        assert_eq!(store.write_count(), writes);
    }

    #[tokio::test]
    async fn test_unassigned_order_cannot_be_completed() {
        let store = InMemoryStore::new();
        let id = order(&store, OrderStatus::Pending);

        let err = OrderService::new(&store)
            .complete(id, AgentId::generate())
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::NotAssigned));
    }

    #[tokio::test]
    async fn test_detail_includes_items() {
        let store = InMemoryStore::new();
        let id = order(&store, OrderStatus::Pending);

        let detail = OrderService::new(&store).detail(id).await.unwrap();
        assert_eq!(detail.order.total_items, 2);
        assert_eq!(detail.items.len(), 1);
        assert_eq!(detail.items[0].medicine_name.as_deref(), Some("Ibuprofen"));
    }
}
