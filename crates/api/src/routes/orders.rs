//! Checkout and order listing endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use domain::{Aggregate, Checkout, Money, Order, OrderLine};
use event_store::EventStore;
use projections::OrderSummary;
use serde::Serialize;

use crate::AppState;
use crate::auth::AuthUser;
use crate::error::ApiError;

#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub id: String,
    pub user_id: String,
    pub lines: Vec<OrderLineResponse>,
    pub total_amount: Money,
    pub placed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct OrderLineResponse {
    pub product_id: String,
    pub title: String,
    pub unit_price: Money,
    pub quantity: u32,
    pub line_total: Money,
}

impl From<&OrderLine> for OrderLineResponse {
    fn from(line: &OrderLine) -> Self {
        Self {
            product_id: line.product_id.to_string(),
            title: line.title.clone(),
            unit_price: line.unit_price,
            quantity: line.quantity,
            line_total: line.line_total(),
        }
    }
}

impl From<&Order> for OrderResponse {
    fn from(order: &Order) -> Self {
        Self {
            id: order.id().map(|id| id.to_string()).unwrap_or_default(),
            user_id: order
                .user_id()
                .map(|id| id.to_string())
                .unwrap_or_default(),
            lines: order.lines().iter().map(OrderLineResponse::from).collect(),
            total_amount: order.total_amount(),
            placed_at: order.placed_at(),
        }
    }
}

impl From<OrderSummary> for OrderResponse {
    fn from(order: OrderSummary) -> Self {
        Self {
            id: order.order_id.to_string(),
            user_id: order.user_id.to_string(),
            lines: order.lines.iter().map(OrderLineResponse::from).collect(),
            total_amount: order.total_amount,
            placed_at: Some(order.placed_at),
        }
    }
}

/// POST /api/orders: check out the caller's cart.
#[tracing::instrument(skip(state), fields(user_id = %user.0))]
pub async fn checkout<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    user: AuthUser,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError> {
    let order = state.orders.checkout(Checkout::new(user.0)).await?;
    Ok((StatusCode::CREATED, Json(OrderResponse::from(&order))))
}

/// GET /api/orders: the caller's orders, newest first.
#[tracing::instrument(skip(state), fields(user_id = %user.0))]
pub async fn list<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    user: AuthUser,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    // The read model must include the caller's latest checkout.
    state.projections.run_catch_up().await?;

    let orders = state
        .user_orders
        .orders_for(user.0)
        .await
        .into_iter()
        .map(OrderResponse::from)
        .collect();

    Ok(Json(orders))
}
