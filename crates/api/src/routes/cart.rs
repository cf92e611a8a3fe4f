//! Cart endpoints for the authenticated user.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use domain::{AddItem, Aggregate, Cart, CartLine, ClearCart, Money, SetQuantity};
use event_store::EventStore;
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::auth::AuthUser;
use crate::error::ApiError;

// -- Request types --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AddItemRequest {
    #[serde(alias = "productId")]
    pub product_id: String,
    #[serde(default = "default_quantity")]
    pub quantity: i64,
}

fn default_quantity() -> i64 {
    1
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SetQuantityRequest {
    #[serde(alias = "productId")]
    pub product_id: String,
    pub quantity: i64,
}

// -- Response types --

#[derive(Debug, Serialize)]
pub struct CartResponse {
    pub user_id: String,
    pub items: Vec<CartItemResponse>,
    pub total_quantity: u64,
    pub total_amount: Money,
    pub version: i64,
}

#[derive(Debug, Serialize)]
pub struct CartItemResponse {
    pub product_id: String,
    pub title: String,
    pub quantity: u32,
    pub unit_price: Money,
    pub line_total: Money,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

impl CartResponse {
    fn new(user: AuthUser, cart: &Cart) -> Self {
        Self {
            user_id: user.0.to_string(),
            items: cart.lines().iter().map(CartItemResponse::from).collect(),
            total_quantity: cart.total_quantity(),
            total_amount: cart.total_amount(),
            version: cart.version().as_i64(),
        }
    }
}

impl From<&CartLine> for CartItemResponse {
    fn from(line: &CartLine) -> Self {
        Self {
            product_id: line.product_id.to_string(),
            title: line.title.clone(),
            quantity: line.quantity,
            unit_price: line.unit_price,
            line_total: line.line_total(),
        }
    }
}

// -- Handlers --

/// GET /api/cart: the caller's cart; empty when none exists.
#[tracing::instrument(skip(state), fields(user_id = %user.0))]
pub async fn get<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    user: AuthUser,
) -> Result<Json<CartResponse>, ApiError> {
    let cart = state.carts.get(user.0).await?;
    Ok(Json(CartResponse::new(user, &cart)))
}

/// POST /api/cart: add a product, or increase its quantity.
#[tracing::instrument(skip(state, body), fields(user_id = %user.0))]
pub async fn add_item<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    user: AuthUser,
    body: Result<Json<AddItemRequest>, JsonRejection>,
) -> Result<Json<CartResponse>, ApiError> {
    let Json(req) = body?;
    let result = state
        .carts
        .add_item(AddItem::new(user.0, req.product_id, req.quantity))
        .await?;
    Ok(Json(CartResponse::new(user, &result.aggregate)))
}

/// PUT /api/cart: set a line's quantity; zero or less removes the line.
#[tracing::instrument(skip(state, body), fields(user_id = %user.0))]
pub async fn set_quantity<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    user: AuthUser,
    body: Result<Json<SetQuantityRequest>, JsonRejection>,
) -> Result<Json<CartResponse>, ApiError> {
    let Json(req) = body?;
    let result = state
        .carts
        .set_quantity(SetQuantity::new(user.0, req.product_id, req.quantity))
        .await?;
    Ok(Json(CartResponse::new(user, &result.aggregate)))
}

/// DELETE /api/cart: remove every line.
#[tracing::instrument(skip(state), fields(user_id = %user.0))]
pub async fn clear<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    user: AuthUser,
) -> Result<Json<MessageResponse>, ApiError> {
    state.carts.clear(ClearCart::new(user.0)).await?;
    Ok(Json(MessageResponse {
        message: "Cart cleared",
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_item_defaults_quantity_to_one() {
        let req: AddItemRequest = serde_json::from_str(r#"{"product_id":"A"}"#).unwrap();
        assert_eq!(req.quantity, 1);
    }

    #[test]
    fn accepts_camel_case_product_id() {
        let req: SetQuantityRequest =
            serde_json::from_str(r#"{"productId":"A","quantity":3}"#).unwrap();
        assert_eq!(req.product_id, "A");
        assert_eq!(req.quantity, 3);
    }

    #[test]
    fn rejects_unknown_fields() {
        let result: Result<AddItemRequest, _> =
            serde_json::from_str(r#"{"product_id":"A","price":1}"#);
        assert!(result.is_err());
    }
}
