//! Inventory store adapter: per-size stock reads, the conditional decrement
//! used by checkout, and out-of-stock flag maintenance. Stock rows are only
//! ever mutated through these helpers inside the coordinator's transaction.

use crate::{
    entities::{product, stock_level, Product, Size, StockLevel},
    errors::ServiceError,
};
use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set,
};
use tracing::{debug, instrument};
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
pub struct InventoryService;

impl InventoryService {
    pub fn new() -> Self {
        Self
    }

    /// Fetches the stock row for one product+size, if present.
    pub async fn get_stock<C: ConnectionTrait>(
        &self,
        conn: &C,
        product_id: Uuid,
        size: Size,
    ) -> Result<Option<stock_level::Model>, ServiceError> {
        StockLevel::find_by_id((product_id, size.to_string()))
            .one(conn)
            .await
            .map_err(ServiceError::DatabaseError)
    }

    /// Preflight check: the size must have at least `requested` units.
    pub async fn ensure_available<C: ConnectionTrait>(
        &self,
        conn: &C,
        product: &product::Model,
        size: Size,
        requested: i32,
    ) -> Result<(), ServiceError> {
        let available = self
            .get_stock(conn, product.id, size)
            .await?
            .map(|level| level.quantity)
            .unwrap_or(0);

        if available < requested {
            return Err(ServiceError::InsufficientStock {
                product: product.name.clone(),
                size: size.to_string(),
                requested,
                available,
            });
        }
        Ok(())
    }

    /// Decrements one size's quantity, re-checking `quantity >= requested` at
    /// write time. Zero rows affected means a concurrent order drained the
    /// stock after the preflight; the caller must abort its transaction.
    #[instrument(skip(self, conn, product), fields(product_id = %product.id, size = %size))]
    pub async fn decrement<C: ConnectionTrait>(
        &self,
        conn: &C,
        product: &product::Model,
        size: Size,
        quantity: i32,
    ) -> Result<(), ServiceError> {
        let result = StockLevel::update_many()
            .col_expr(
                stock_level::Column::Quantity,
                Expr::col(stock_level::Column::Quantity).sub(quantity),
            )
            .col_expr(stock_level::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(stock_level::Column::ProductId.eq(product.id))
            .filter(stock_level::Column::Size.eq(size.to_string()))
            .filter(stock_level::Column::Quantity.gte(quantity))
            .exec(conn)
            .await?;

        if result.rows_affected == 0 {
            return Err(ServiceError::ConcurrentStockExhaustion {
                product: product.name.clone(),
                size: size.to_string(),
            });
        }
        debug!(quantity, "Stock decremented");
        Ok(())
    }

    /// Re-derives the out-of-stock flags from current quantities: each size's
    /// flag is true iff its quantity is 0, and the product-level flag is true
    /// iff every size is 0.
    pub async fn refresh_out_of_stock_flags<C: ConnectionTrait>(
        &self,
        conn: &C,
        product_id: Uuid,
    ) -> Result<(), ServiceError> {
        let levels = StockLevel::find()
            .filter(stock_level::Column::ProductId.eq(product_id))
            .all(conn)
            .await?;

        for level in &levels {
            let should_flag = level.quantity == 0;
            if level.out_of_stock != should_flag {
                let mut active: stock_level::ActiveModel = level.clone().into();
                active.out_of_stock = Set(should_flag);
                active.updated_at = Set(Some(Utc::now()));
                active.update(conn).await?;
            }
        }

        let all_empty = !levels.is_empty() && levels.iter().all(|level| level.quantity == 0);
        let product = Product::find_by_id(product_id)
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;
        if product.out_of_stock != all_empty {
            let mut active: product::ActiveModel = product.into();
            active.out_of_stock = Set(all_empty);
            active.updated_at = Set(Some(Utc::now()));
            active.update(conn).await?;
        }
        Ok(())
    }
}
