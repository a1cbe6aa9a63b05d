//! Order endpoints: checkout, guest lookup by code, the authenticated
//! order history, and the admin status transitions.

use crate::{
    auth::{AuthenticatedUser, MaybeAuthenticated, Requester},
    entities::{order, order_item, Size},
    errors::ServiceError,
    handlers::common::{created_response, success_response, validate_input},
    services::checkout::{CartItem, PlaceOrderInput, ShippingInfo},
    AppState,
};
use axum::{
    extract::{Path, Query, State},
    response::Response,
    routing::{get, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Serialize)]
pub struct CartItemRequest {
    pub product_id: Uuid,
    pub size: String,
    pub quantity: i32,
    /// Display price from the client; the catalog price wins.
    pub price: Option<Decimal>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateOrderRequest {
    #[validate(length(min = 1, message = "cart must contain at least one item"))]
    pub items: Vec<CartItemRequest>,
    pub promo_code_id: Option<Uuid>,
    /// Required when no bearer token is presented.
    #[validate(email)]
    pub guest_email: Option<String>,
    #[validate(length(min = 1))]
    pub full_name: String,
    #[validate(length(min = 1))]
    pub phone: String,
    #[validate(length(min = 1))]
    pub province: String,
    #[validate(length(min = 1))]
    pub district: String,
    #[validate(length(min = 1))]
    pub ward: String,
    #[validate(length(min = 1))]
    pub address: String,
    #[validate(length(min = 1))]
    pub payment_method: String,
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OrderLookupQuery {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct OrderItemResponse {
    pub product_id: Uuid,
    pub product_name: String,
    pub size: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub id: Uuid,
    pub order_code: String,
    pub status: String,
    pub payment_status: String,
    pub payment_method: String,
    pub subtotal: Decimal,
    pub promo_code: Option<String>,
    pub promo_amount: Decimal,
    pub shipping_fee: Decimal,
    pub total: Decimal,
    pub full_name: String,
    pub phone: String,
    pub province: String,
    pub district: String,
    pub ward: String,
    pub address: String,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub items: Vec<OrderItemResponse>,
}

impl OrderResponse {
    fn from_model(order: order::Model, items: Vec<order_item::Model>) -> Self {
        Self {
            id: order.id,
            order_code: order.order_code,
            status: order.status,
            payment_status: order.payment_status,
            payment_method: order.payment_method,
            subtotal: order.subtotal,
            promo_code: order.promo_code,
            promo_amount: order.promo_amount,
            shipping_fee: order.shipping_fee,
            total: order.total,
            full_name: order.full_name,
            phone: order.phone,
            province: order.province,
            district: order.district,
            ward: order.ward,
            address: order.address,
            note: order.note,
            created_at: order.created_at,
            items: items
                .into_iter()
                .map(|item| OrderItemResponse {
                    product_id: item.product_id,
                    product_name: item.product_name,
                    size: item.size,
                    quantity: item.quantity,
                    unit_price: item.unit_price,
                    line_total: item.line_total,
                })
                .collect(),
        }
    }
}

fn parse_size(raw: &str) -> Result<Size, ServiceError> {
    Size::from_str(raw)
        .map_err(|_| ServiceError::ValidationError(format!("Unknown size '{}'", raw)))
}

fn resolve_requester(
    user: Option<AuthenticatedUser>,
    guest_email: Option<String>,
) -> Result<Requester, ServiceError> {
    match user {
        Some(user) => Ok(Requester::Customer {
            id: user.customer_id,
            email: user.email,
        }),
        None => {
            let email = guest_email
                .map(|e| e.trim().to_string())
                .filter(|e| !e.is_empty())
                .ok_or_else(|| {
                    ServiceError::ValidationError(
                        "guest_email is required for guest checkout".to_string(),
                    )
                })?;
            Ok(Requester::Guest { email })
        }
    }
}

async fn create_order(
    State(state): State<AppState>,
    MaybeAuthenticated(user): MaybeAuthenticated,
    Json(payload): Json<CreateOrderRequest>,
) -> Result<Response, ServiceError> {
    validate_input(&payload)?;
    let requester = resolve_requester(user, payload.guest_email.clone())?;

    let mut items = Vec::with_capacity(payload.items.len());
    for item in &payload.items {
        items.push(CartItem {
            product_id: item.product_id,
            size: parse_size(&item.size)?,
            quantity: item.quantity,
            price: item.price,
        });
    }

    let input = PlaceOrderInput {
        items,
        promo_code_id: payload.promo_code_id,
        shipping: ShippingInfo {
            full_name: payload.full_name,
            phone: payload.phone,
            province: payload.province,
            district: payload.district,
            ward: payload.ward,
            address: payload.address,
        },
        payment_method: payload.payment_method,
        note: payload.note,
    };

    let placed = state.checkout.place_order(input, requester).await?;
    Ok(created_response(OrderResponse::from_model(
        placed.order,
        placed.items,
    )))
}

async fn get_order_by_code(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Query(query): Query<OrderLookupQuery>,
) -> Result<Response, ServiceError> {
    let (order, items) = state.orders.get_order_by_code(&code, &query.email).await?;
    Ok(success_response(OrderResponse::from_model(order, items)))
}

async fn my_orders(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Response, ServiceError> {
    let orders = state.orders.list_orders_for(user.customer_id).await?;
    let body: Vec<OrderResponse> = orders
        .into_iter()
        .map(|(order, items)| OrderResponse::from_model(order, items))
        .collect();
    Ok(success_response(body))
}

fn require_admin(user: &AuthenticatedUser) -> Result<(), ServiceError> {
    if !user.is_admin() {
        return Err(ServiceError::Forbidden(
            "Admin privileges required".to_string(),
        ));
    }
    Ok(())
}

async fn update_order_status(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(order_id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Response, ServiceError> {
    require_admin(&user)?;
    let order = state.orders.update_status(order_id, &payload.status).await?;
    Ok(success_response(OrderResponse::from_model(order, vec![])))
}

async fn update_payment_status(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(order_id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Response, ServiceError> {
    require_admin(&user)?;
    let order = state
        .orders
        .update_payment_status(order_id, &payload.status)
        .await?;
    Ok(success_response(OrderResponse::from_model(order, vec![])))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_order))
        .route("/mine", get(my_orders))
        .route("/by-code/:code", get(get_order_by_code))
        .route("/:id/status", put(update_order_status))
        .route("/:id/payment-status", put(update_payment_status))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_parsing_rejects_unknown_values() {
        assert!(parse_size("M").is_ok());
        assert!(parse_size("XL").is_ok());
        assert!(parse_size("Hat").is_ok());
        assert!(parse_size("XXL").is_err());
        assert!(parse_size("m").is_err());
    }

    #[test]
    fn guest_checkout_requires_email() {
        assert!(resolve_requester(None, None).is_err());
        assert!(resolve_requester(None, Some("   ".to_string())).is_err());
        let requester = resolve_requester(None, Some("shopper@example.com".to_string())).unwrap();
        assert!(!requester.is_authenticated());
    }

    #[test]
    fn authenticated_requester_ignores_guest_email() {
        let user = AuthenticatedUser {
            customer_id: Uuid::new_v4(),
            email: Some("a@b.c".to_string()),
            role: crate::auth::ROLE_CUSTOMER.to_string(),
        };
        let requester = resolve_requester(Some(user), Some("other@b.c".to_string())).unwrap();
        assert!(requester.is_authenticated());
        assert_eq!(requester.email(), Some("a@b.c"));
    }
}
