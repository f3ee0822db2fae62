//! Orders, line items, assignments and ignored markers.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;

use courier_portal_core::{AgentId, AssignmentId, OrderId, OrderItemId, OrderStatus};

/// An order as seen by couriers.
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub id: OrderId,
    /// Stored order total; never recomputed from line items.
    pub total_price: Decimal,
    /// Shipping address exactly as written by checkout (string or object).
    pub delivery_address: Value,
    pub status: OrderStatus,
    /// Sum of line-item quantities.
    pub total_items: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A line item of an order.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub order_id: OrderId,
    /// Catalog id of the medicine; owned by the shop, opaque here.
    pub medicine_id: String,
    pub medicine_name: Option<String>,
    pub quantity: i32,
    /// Unit price at purchase.
    pub price: Decimal,
}

/// The link between an order and the agent that claimed it.
///
/// At most one per order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Assignment {
    pub id: AssignmentId,
    pub order_id: OrderId,
    pub agent_id: AgentId,
    pub assigned_at: DateTime<Utc>,
}

/// An order together with when it was assigned to the requesting agent.
#[derive(Debug, Clone, PartialEq)]
pub struct AssignedOrder {
    pub order: Order,
    pub assigned_at: DateTime<Utc>,
}

/// An order together with when the requesting agent dismissed it.
#[derive(Debug, Clone, PartialEq)]
pub struct IgnoredOrder {
    pub order: Order,
    pub ignored_at: DateTime<Utc>,
}

/// Values for inserting an order (seeding and tests).
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub total_price: Decimal,
    pub delivery_address: Value,
    pub status: OrderStatus,
    pub items: Vec<NewOrderItem>,
}

/// Values for inserting a line item.
#[derive(Debug, Clone)]
pub struct NewOrderItem {
    pub medicine_id: String,
    pub medicine_name: Option<String>,
    pub quantity: i32,
    pub price: Decimal,
}
