//! JSON response shapes.
//!
//! Every order listing shares [`OrderSummary`]; the variants only add the
//! timestamp that matters for that list. Money is rendered as a JSON number.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use courier_portal_core::{OrderId, OrderItemId, OrderStatus, format_delivery_address};

use crate::models::{AssignedOrder, IgnoredOrder, Order, OrderItem};
use crate::services::OrderDetail;

/// Common order fields.
#[derive(Debug, Serialize)]
pub struct OrderSummary {
    pub id: OrderId,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_price: Decimal,
    pub delivery_address: String,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub total_items: i64,
}

impl From<&Order> for OrderSummary {
    fn from(order: &Order) -> Self {
        Self {
            id: order.id,
            total_price: order.total_price,
            delivery_address: format_delivery_address(&order.delivery_address),
            status: order.status,
            created_at: order.created_at,
            total_items: order.total_items,
        }
    }
}

/// An order in one of the agent's assignment lists.
#[derive(Debug, Serialize)]
pub struct AssignedOrderView {
    #[serde(flatten)]
    pub order: OrderSummary,
    pub assigned_at: DateTime<Utc>,
    /// Only set in the delivered list.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivered_at: Option<DateTime<Utc>>,
}

impl AssignedOrderView {
    pub fn active(assigned: &AssignedOrder) -> Self {
        Self {
            order: OrderSummary::from(&assigned.order),
            assigned_at: assigned.assigned_at,
            delivered_at: None,
        }
    }

    /// Delivered orders report their last update as the delivery time.
    pub fn delivered(assigned: &AssignedOrder) -> Self {
        Self {
            delivered_at: Some(assigned.order.updated_at),
            ..Self::active(assigned)
        }
    }
}

#[derive(Debug, Serialize)]
pub struct IgnoredOrderView {
    #[serde(flatten)]
    pub order: OrderSummary,
    pub ignored_at: DateTime<Utc>,
}

impl From<&IgnoredOrder> for IgnoredOrderView {
    fn from(ignored: &IgnoredOrder) -> Self {
        Self {
            order: OrderSummary::from(&ignored.order),
            ignored_at: ignored.ignored_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OrderItemView {
    pub id: OrderItemId,
    pub medicine_id: String,
    pub medicine_name: Option<String>,
    pub quantity: i32,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
}

impl From<&OrderItem> for OrderItemView {
    fn from(item: &OrderItem) -> Self {
        Self {
            id: item.id,
            medicine_id: item.medicine_id.clone(),
            medicine_name: item.medicine_name.clone(),
            quantity: item.quantity,
            price: item.price,
        }
    }
}

/// Order detail page.
#[derive(Debug, Serialize)]
pub struct OrderDetailView {
    #[serde(flatten)]
    pub order: OrderSummary,
    pub updated_at: DateTime<Utc>,
    pub items: Vec<OrderItemView>,
}

impl From<&OrderDetail> for OrderDetailView {
    fn from(detail: &OrderDetail) -> Self {
        Self {
            order: OrderSummary::from(&detail.order),
            updated_at: detail.order.updated_at,
            items: detail.items.iter().map(OrderItemView::from).collect(),
        }
    }
}

/// Wrapper for list responses.
#[derive(Debug, Serialize)]
pub struct OrderList<T> {
    pub orders: Vec<T>,
}

impl<T> OrderList<T> {
    pub fn new<S>(rows: &[S], view: impl Fn(&S) -> T) -> Self {
        Self {
            orders: rows.iter().map(view).collect(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_summary_shape() {
        let now = Utc::now();
        let order = Order {
            id: OrderId::generate(),
            total_price: Decimal::new(1999, 2),
            delivery_address: json!({"street": "5 Rue Haute", "city": "Lyon"}),
            status: OrderStatus::Paid,
            total_items: 3,
            created_at: now,
            updated_at: now,
        };

        let value = serde_json::to_value(OrderSummary::from(&order)).unwrap();
        assert_eq!(value["total_price"], json!(19.99));
        assert_eq!(value["delivery_address"], "5 Rue Haute, Lyon");
        assert_eq!(value["status"], "paid");
        assert_eq!(value["total_items"], 3);
    }

    #[test]
    fn test_delivered_view_flattens_and_adds_timestamp() {
        let now = Utc::now();
        let assigned = AssignedOrder {
            order: Order {
                id: OrderId::generate(),
                total_price: Decimal::ONE,
                delivery_address: serde_json::Value::Null,
                status: OrderStatus::Delivered,
                total_items: 1,
                created_at: now,
                updated_at: now,
            },
            assigned_at: now,
        };

        let active = serde_json::to_value(AssignedOrderView::active(&assigned)).unwrap();
        assert!(active.get("delivered_at").is_none());
        assert_eq!(active["delivery_address"], "No address provided");

        let delivered = serde_json::to_value(AssignedOrderView::delivered(&assigned)).unwrap();
        assert!(delivered.get("delivered_at").is_some());
        assert!(delivered.get("assigned_at").is_some());
    }

    #[test]
    fn test_order_list_maps_rows() {
        let now = Utc::now();
        let ignored = IgnoredOrder {
            order: Order {
                id: OrderId::generate(),
                total_price: Decimal::TEN,
                delivery_address: json!("9 Quay Rd"),
                status: OrderStatus::Pending,
                total_items: 2,
                created_at: now,
                updated_at: now,
            },
            ignored_at: now,
        };

        let list = OrderList::new(std::slice::from_ref(&ignored), |row| {
            IgnoredOrderView::from(row)
        });
        let value = serde_json::to_value(&list).unwrap();
        assert_eq!(value["orders"][0]["delivery_address"], "9 Quay Rd");
        assert!(value["orders"][0]["ignored_at"].is_string());
    }
}
