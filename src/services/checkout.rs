//! Order transaction coordinator.
//!
//! `place_order` runs the whole order-placement sequence inside one database
//! transaction: stock preflight, promo validation + redemption, order insert
//! with price snapshots, conditional stock decrement, and out-of-stock flag
//! maintenance. Any failure at any step rolls the transaction back; nothing
//! is persisted and no promo counter moves without its order.

use crate::{
    auth::Requester,
    config::AppConfig,
    db::DbPool,
    entities::{order, order_item, product, Product, Size},
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        inventory::InventoryService,
        promotions::{AppliedPromo, PromotionService},
    },
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, EntityTrait, Set, TransactionTrait};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// One cart line as submitted by the client. `price` is a display hint only;
/// the authoritative unit price is re-read from the catalog inside the
/// transaction.
#[derive(Debug, Clone)]
pub struct CartItem {
    pub product_id: Uuid,
    pub size: Size,
    pub quantity: i32,
    pub price: Option<Decimal>,
}

#[derive(Debug, Clone)]
pub struct ShippingInfo {
    pub full_name: String,
    pub phone: String,
    pub province: String,
    pub district: String,
    pub ward: String,
    pub address: String,
}

#[derive(Debug, Clone)]
pub struct PlaceOrderInput {
    pub items: Vec<CartItem>,
    pub promo_code_id: Option<Uuid>,
    pub shipping: ShippingInfo,
    pub payment_method: String,
    pub note: Option<String>,
}

/// The persisted order together with its line items.
#[derive(Debug, Clone)]
pub struct PlacedOrder {
    pub order: order::Model,
    pub items: Vec<order_item::Model>,
}

#[derive(Clone)]
pub struct CheckoutService {
    db: Arc<DbPool>,
    event_sender: EventSender,
    promotions: PromotionService,
    inventory: InventoryService,
    order_code_prefix: String,
    shipping_fee: Decimal,
}

impl CheckoutService {
    pub fn new(db: Arc<DbPool>, event_sender: EventSender, cfg: &AppConfig) -> Self {
        Self {
            db,
            event_sender,
            promotions: PromotionService::new(),
            inventory: InventoryService::new(),
            order_code_prefix: cfg.order_code_prefix.clone(),
            shipping_fee: cfg.shipping_fee,
        }
    }

    /// Places an order. See the module docs for the step sequence; every step
    /// after validation runs inside a single transaction and the result is
    /// returned only after a successful commit.
    #[instrument(skip(self, input, requester), fields(item_count = input.items.len()))]
    pub async fn place_order(
        &self,
        input: PlaceOrderInput,
        requester: Requester,
    ) -> Result<PlacedOrder, ServiceError> {
        validate_input(&input)?;

        let txn = self.db.begin().await?;

        // Stock preflight with authoritative prices from the catalog.
        let mut lines: Vec<(product::Model, Size, i32)> = Vec::with_capacity(input.items.len());
        for item in &input.items {
            let product = Product::find_by_id(item.product_id)
                .one(&txn)
                .await?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("Product {} not found", item.product_id))
                })?;
            if !product.is_active {
                return Err(ServiceError::ValidationError(format!(
                    "Product '{}' is no longer available",
                    product.name
                )));
            }
            self.inventory
                .ensure_available(&txn, &product, item.size, item.quantity)
                .await?;
            if let Some(hint) = item.price {
                if hint != product.price {
                    tracing::debug!(
                        product_id = %product.id,
                        %hint,
                        authoritative = %product.price,
                        "Client price hint differs from catalog price"
                    );
                }
            }
            lines.push((product, item.size, item.quantity));
        }

        let subtotal: Decimal = lines
            .iter()
            .map(|(product, _, quantity)| product.price * Decimal::from(*quantity))
            .sum();

        // Promo redemption shares the transaction: no order without its promo
        // being valid, no promo marked used without its order.
        let order_id = Uuid::new_v4();
        let applied: Option<AppliedPromo> = match input.promo_code_id {
            Some(promo_id) => Some(
                self.promotions
                    .validate_and_redeem(&txn, promo_id, &requester, order_id, subtotal)
                    .await?,
            ),
            None => None,
        };
        let promo_amount = applied.as_ref().map(|a| a.discount).unwrap_or(Decimal::ZERO);
        let total = subtotal - promo_amount + self.shipping_fee;

        let now = Utc::now();
        let order_model = order::ActiveModel {
            id: Set(order_id),
            order_code: Set(format!(
                "{}{}",
                self.order_code_prefix,
                now.format("%y%m%d%H%M%S")
            )),
            customer_id: Set(requester.customer_id()),
            email: Set(requester.email().map(|e| e.trim().to_lowercase())),
            status: Set(order::status::PENDING.to_string()),
            payment_status: Set(order::payment_status::PENDING.to_string()),
            payment_method: Set(input.payment_method.clone()),
            subtotal: Set(subtotal),
            promo_code_id: Set(applied.as_ref().map(|a| a.promo_code_id)),
            promo_code: Set(applied.as_ref().map(|a| a.code.clone())),
            promo_amount: Set(promo_amount),
            shipping_fee: Set(self.shipping_fee),
            total: Set(total),
            full_name: Set(input.shipping.full_name.clone()),
            phone: Set(input.shipping.phone.clone()),
            province: Set(input.shipping.province.clone()),
            district: Set(input.shipping.district.clone()),
            ward: Set(input.shipping.ward.clone()),
            address: Set(input.shipping.address.clone()),
            note: Set(input.note.clone()),
            created_at: Set(now),
            updated_at: Set(None),
        }
        .insert(&txn)
        .await?;

        let mut item_models = Vec::with_capacity(lines.len());
        for (product, size, quantity) in &lines {
            let item = order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(product.id),
                product_name: Set(product.name.clone()),
                size: Set(size.to_string()),
                quantity: Set(*quantity),
                unit_price: Set(product.price),
                line_total: Set(product.price * Decimal::from(*quantity)),
                created_at: Set(now),
            }
            .insert(&txn)
            .await?;
            item_models.push(item);
        }

        // Conditional decrement, then flag maintenance per touched product.
        for (product, size, quantity) in &lines {
            self.inventory
                .decrement(&txn, product, *size, *quantity)
                .await?;
        }
        let touched: BTreeSet<Uuid> = lines.iter().map(|(product, _, _)| product.id).collect();
        for product_id in &touched {
            self.inventory
                .refresh_out_of_stock_flags(&txn, *product_id)
                .await?;
        }

        txn.commit().await?;

        info!(
            order_id = %order_id,
            order_code = %order_model.order_code,
            %total,
            "Order placed"
        );

        // Post-commit side effects; never part of the atomic unit.
        self.event_sender.send(Event::OrderCreated(order_id)).await;
        if let Some(applied) = &applied {
            self.event_sender
                .send(Event::PromoRedeemed {
                    promo_code_id: applied.promo_code_id,
                    order_id,
                })
                .await;
        }
        for product_id in touched {
            self.event_sender
                .send(Event::ProductStockChanged(product_id))
                .await;
        }

        Ok(PlacedOrder {
            order: order_model,
            items: item_models,
        })
    }
}

/// Cheap structural checks performed before any transaction is opened.
fn validate_input(input: &PlaceOrderInput) -> Result<(), ServiceError> {
    if input.items.is_empty() {
        return Err(ServiceError::ValidationError("Cart is empty".to_string()));
    }
    for item in &input.items {
        if item.quantity <= 0 {
            return Err(ServiceError::ValidationError(format!(
                "Quantity for product {} must be positive",
                item.product_id
            )));
        }
    }
    let shipping = &input.shipping;
    let required = [
        ("full_name", &shipping.full_name),
        ("phone", &shipping.phone),
        ("province", &shipping.province),
        ("district", &shipping.district),
        ("ward", &shipping.ward),
        ("address", &shipping.address),
    ];
    for (field, value) in required {
        if value.trim().is_empty() {
            return Err(ServiceError::ValidationError(format!(
                "Shipping field '{}' is required",
                field
            )));
        }
    }
    if input.payment_method.trim().is_empty() {
        return Err(ServiceError::ValidationError(
            "Payment method is required".to_string(),
        ));
    }
    Ok(())
}
