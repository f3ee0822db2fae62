//! Order pool and order actions.

use axum::{
    Json,
    extract::{Path, State},
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use courier_portal_core::{AgentId, AssignmentId, OrderId};

use crate::error::{AppError, Result};
use crate::middleware::RequireAgent;
use crate::services::{OrderError, OrderService};
use crate::state::AppState;

use super::views::{OrderDetailView, OrderList, OrderSummary};

/// Malformed ids cannot name an order.
fn parse_order_id(raw: &str) -> Result<OrderId> {
    raw.parse()
        .map_err(|_| AppError::Order(OrderError::OrderNotFound))
}

/// Claimable orders the agent has neither accepted nor ignored.
///
/// # Route
///
/// `GET /api/delivery/orders`
pub async fn available(
    State(state): State<AppState>,
    RequireAgent(current): RequireAgent,
) -> Result<Json<OrderList<OrderSummary>>> {
    let orders = OrderService::new(state.store())
        .available(current.agent.id)
        .await?;
    Ok(Json(OrderList::new(&orders, |order| OrderSummary::from(order))))
}

/// # Route
///
/// `GET /api/delivery/orders/{id}`
pub async fn detail(
    State(state): State<AppState>,
    RequireAgent(_): RequireAgent,
    Path(id): Path<String>,
) -> Result<Json<OrderDetailView>> {
    let detail = OrderService::new(state.store())
        .detail(parse_order_id(&id)?)
        .await?;
    Ok(Json(OrderDetailView::from(&detail)))
}

#[derive(Debug, Serialize)]
pub struct AssignmentView {
    pub id: AssignmentId,
    pub order_id: OrderId,
    pub agent_id: AgentId,
    pub assigned_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct AcceptResponse {
    pub success: bool,
    pub message: &'static str,
    pub assignment: AssignmentView,
}

/// # Route
///
/// `POST /api/delivery/orders/{id}/accept`
pub async fn accept(
    State(state): State<AppState>,
    RequireAgent(current): RequireAgent,
    Path(id): Path<String>,
) -> Result<Json<AcceptResponse>> {
    let assignment = OrderService::new(state.store())
        .accept(parse_order_id(&id)?, current.agent.id)
        .await?;

    Ok(Json(AcceptResponse {
        success: true,
        message: "Order accepted successfully",
        assignment: AssignmentView {
            id: assignment.id,
            order_id: assignment.order_id,
            agent_id: assignment.agent_id,
            assigned_at: assignment.assigned_at,
        },
    }))
}

#[derive(Debug, Serialize)]
pub struct ActionResponse {
    pub success: bool,
    pub message: &'static str,
}

/// # Route
///
/// `POST /api/delivery/orders/{id}/ignore`
pub async fn ignore(
    State(state): State<AppState>,
    RequireAgent(current): RequireAgent,
    Path(id): Path<String>,
) -> Result<Json<ActionResponse>> {
    OrderService::new(state.store())
        .ignore(parse_order_id(&id)?, current.agent.id)
        .await?;

    Ok(Json(ActionResponse {
        success: true,
        message: "Order ignored",
    }))
}

#[derive(Debug, Serialize)]
pub struct DispatchResponse {
    pub success: bool,
    pub message: &'static str,
    pub order: OrderSummary,
}

/// # Route
///
/// `POST /api/delivery/orders/{id}/dispatch`
pub async fn dispatch(
    State(state): State<AppState>,
    RequireAgent(current): RequireAgent,
    Path(id): Path<String>,
) -> Result<Json<DispatchResponse>> {
    let order = OrderService::new(state.store())
        .dispatch(parse_order_id(&id)?, current.agent.id)
        .await?;

    Ok(Json(DispatchResponse {
        success: true,
        message: "Order is out for delivery",
        order: OrderSummary::from(&order),
    }))
}

#[derive(Debug, Serialize)]
pub struct CompleteResponse {
    pub success: bool,
    pub message: &'static str,
    pub already_delivered: bool,
}

/// # Route
///
/// `POST /api/delivery/orders/{id}/complete`
pub async fn complete(
    State(state): State<AppState>,
    RequireAgent(current): RequireAgent,
    Path(id): Path<String>,
) -> Result<Json<CompleteResponse>> {
    let completion = OrderService::new(state.store())
        .complete(parse_order_id(&id)?, current.agent.id)
        .await?;

    let message = if completion.already_delivered {
        "Order was already delivered"
    } else {
        "Order marked as delivered"
    };

    Ok(Json(CompleteResponse {
        success: true,
        message,
        already_delivered: completion.already_delivered,
    }))
}
