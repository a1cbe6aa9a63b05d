//! Read and admin operations over persisted orders: guest lookup by code,
//! a customer's order history, and the two status transitions.

use crate::{
    db::DbPool,
    entities::{order, order_item, Order},
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, ModelTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

#[derive(Clone)]
pub struct OrderService {
    db: Arc<DbPool>,
    event_sender: EventSender,
}

impl OrderService {
    pub fn new(db: Arc<DbPool>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    /// Looks up one order by its public code, gated on the contact email it
    /// was placed with. A wrong email gets the same `NotFound` as a missing
    /// code, so the endpoint leaks nothing about which codes exist.
    #[instrument(skip(self, email))]
    pub async fn get_order_by_code(
        &self,
        code: &str,
        email: &str,
    ) -> Result<(order::Model, Vec<order_item::Model>), ServiceError> {
        let not_found = || ServiceError::NotFound(format!("Order {} not found", code));

        let order = Order::find()
            .filter(order::Column::OrderCode.eq(code))
            .one(self.db.as_ref())
            .await?
            .ok_or_else(not_found)?;

        let matches = order
            .email
            .as_deref()
            .map(|stored| stored.eq_ignore_ascii_case(email.trim()))
            .unwrap_or(false);
        if !matches {
            return Err(not_found());
        }

        let items = order
            .find_related(order_item::Entity)
            .all(self.db.as_ref())
            .await?;
        Ok((order, items))
    }

    /// All orders placed by one customer, newest first, each with its items.
    pub async fn list_orders_for(
        &self,
        customer_id: Uuid,
    ) -> Result<Vec<(order::Model, Vec<order_item::Model>)>, ServiceError> {
        Order::find()
            .filter(order::Column::CustomerId.eq(customer_id))
            .order_by_desc(order::Column::CreatedAt)
            .find_with_related(order_item::Entity)
            .all(self.db.as_ref())
            .await
            .map_err(ServiceError::DatabaseError)
    }

    /// Admin: moves an order to a new fulfillment status.
    #[instrument(skip(self))]
    pub async fn update_status(
        &self,
        order_id: Uuid,
        new_status: &str,
    ) -> Result<order::Model, ServiceError> {
        if !order::status::ALL.contains(&new_status) {
            return Err(ServiceError::ValidationError(format!(
                "Unknown order status '{}'",
                new_status
            )));
        }

        let txn = self.db.begin().await?;
        let order = Order::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;
        let old_status = order.status.clone();

        let mut active: order::ActiveModel = order.into();
        active.status = Set(new_status.to_string());
        active.updated_at = Set(Some(Utc::now()));
        let updated = active.update(&txn).await?;
        txn.commit().await?;

        info!(%order_id, %old_status, %new_status, "Order status updated");
        self.event_sender
            .send(Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status: new_status.to_string(),
            })
            .await;
        Ok(updated)
    }

    /// Admin: moves an order to a new payment status.
    #[instrument(skip(self))]
    pub async fn update_payment_status(
        &self,
        order_id: Uuid,
        new_status: &str,
    ) -> Result<order::Model, ServiceError> {
        if !order::payment_status::ALL.contains(&new_status) {
            return Err(ServiceError::ValidationError(format!(
                "Unknown payment status '{}'",
                new_status
            )));
        }

        let txn = self.db.begin().await?;
        let order = Order::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let mut active: order::ActiveModel = order.into();
        active.payment_status = Set(new_status.to_string());
        active.updated_at = Set(Some(Utc::now()));
        let updated = active.update(&txn).await?;
        txn.commit().await?;

        info!(%order_id, %new_status, "Payment status updated");
        Ok(updated)
    }
}
