//! The agent's own order lists.

use axum::{Json, extract::State};

use crate::error::Result;
use crate::middleware::RequireAgent;
use crate::services::OrderService;
use crate::state::AppState;

use super::views::{AssignedOrderView, IgnoredOrderView, OrderList};

/// Orders in progress.
///
/// # Route
///
/// `GET /api/delivery/accepted`
pub async fn accepted(
    State(state): State<AppState>,
    RequireAgent(current): RequireAgent,
) -> Result<Json<OrderList<AssignedOrderView>>> {
    let orders = OrderService::new(state.store())
        .accepted(current.agent.id)
        .await?;
    Ok(Json(OrderList::new(&orders, AssignedOrderView::active)))
}

/// # Route
///
/// `GET /api/delivery/delivered`
pub async fn delivered(
    State(state): State<AppState>,
    RequireAgent(current): RequireAgent,
) -> Result<Json<OrderList<AssignedOrderView>>> {
    let orders = OrderService::new(state.store())
        .delivered(current.agent.id)
        .await?;
    Ok(Json(OrderList::new(&orders, AssignedOrderView::delivered)))
}

/// # Route
///
/// `GET /api/delivery/ignored`
pub async fn ignored(
    State(state): State<AppState>,
    RequireAgent(current): RequireAgent,
) -> Result<Json<OrderList<IgnoredOrderView>>> {
    let orders = OrderService::new(state.store())
        .ignored(current.agent.id)
        .await?;
    Ok(Json(OrderList::new(&orders, |ignored| IgnoredOrderView::from(ignored))))
}

/// Every order ever assigned to the agent.
///
/// # Route
///
/// `GET /api/delivery/history`
pub async fn history(
    State(state): State<AppState>,
    RequireAgent(current): RequireAgent,
) -> Result<Json<OrderList<AssignedOrderView>>> {
    let orders = OrderService::new(state.store())
        .history(current.agent.id)
        .await?;
    Ok(Json(OrderList::new(&orders, AssignedOrderView::active)))
}
