//! Promo ledger: validation rules and atomic redemption bookkeeping.
//!
//! `validate_and_redeem` is only ever called inside the checkout
//! coordinator's transaction, so the `used_count` increment and the order
//! insert commit together or not at all.

use crate::{
    auth::Requester,
    entities::{
        promo_code::{self, DISCOUNT_FIXED, DISCOUNT_PERCENTAGE},
        promo_redemption, PromoCode, PromoRedemption,
    },
    errors::ServiceError,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait,
    QueryFilter, Set,
};
use tracing::{info, instrument};
use uuid::Uuid;

/// Snapshot of a successfully applied promo, denormalized onto the order.
#[derive(Debug, Clone)]
pub struct AppliedPromo {
    pub promo_code_id: Uuid,
    pub code: String,
    pub discount: Decimal,
}

#[derive(Debug, Clone, Default)]
pub struct PromotionService;

impl PromotionService {
    pub fn new() -> Self {
        Self
    }

    /// Pure validation: checks every redemption rule in order (first violated
    /// rule wins) and returns the discount that would apply. Mutates nothing,
    /// so calling it twice with the same inputs gives the same verdict.
    pub async fn validate<C: ConnectionTrait>(
        &self,
        conn: &C,
        promo_id: Uuid,
        requester: &Requester,
        subtotal: Decimal,
    ) -> Result<(promo_code::Model, Decimal), ServiceError> {
        let promo = PromoCode::find_by_id(promo_id)
            .one(conn)
            .await?
            .ok_or(ServiceError::PromoInvalid)?;

        if !promo.is_active {
            return Err(ServiceError::PromoInvalid);
        }
        if let Some(expires_at) = promo.expires_at {
            if expires_at <= Utc::now() {
                return Err(ServiceError::PromoExpired);
            }
        }
        if promo.login_required && !requester.is_authenticated() {
            return Err(ServiceError::LoginRequired);
        }
        if let Some(per_user_limit) = promo.per_user_limit {
            let prior = PromoRedemption::find()
                .filter(promo_redemption::Column::PromoCodeId.eq(promo.id))
                .filter(promo_redemption::Column::Redeemer.eq(requester.redeemer_key()))
                .count(conn)
                .await?;
            // A negative limit from bad admin data means no redemptions at all.
            if prior >= per_user_limit.max(0) as u64 {
                return Err(ServiceError::PerUserLimitExceeded);
            }
        }
        if let Some(total_limit) = promo.total_usage_limit {
            if promo.used_count >= total_limit {
                return Err(ServiceError::TotalLimitExceeded);
            }
        }

        let discount = compute_discount(&promo, subtotal)?;
        Ok((promo, discount))
    }

    /// Validates and, if every rule passes, records the redemption in the
    /// caller's transaction.
    #[instrument(skip(self, conn, requester), fields(promo_id = %promo_id, order_id = %order_id))]
    pub async fn validate_and_redeem<C: ConnectionTrait>(
        &self,
        conn: &C,
        promo_id: Uuid,
        requester: &Requester,
        order_id: Uuid,
        subtotal: Decimal,
    ) -> Result<AppliedPromo, ServiceError> {
        let (promo, discount) = self.validate(conn, promo_id, requester, subtotal).await?;
        self.redeem(conn, &promo, requester, order_id, discount)
            .await
    }

    /// Records one redemption of an already-validated promo: a conditional
    /// `used_count` increment plus an appended usage row.
    ///
    /// The increment is guarded on the `used_count` value the caller observed
    /// (and on the total limit when one is set), so two concurrent redemptions
    /// of the same code cannot both succeed. When the update matches zero
    /// rows, the code re-reads the counter to tell the two loser cases apart:
    /// a genuinely exhausted limit is `TotalLimitExceeded` (retrying cannot
    /// help), anything else is a retryable conflict.
    pub async fn redeem<C: ConnectionTrait>(
        &self,
        conn: &C,
        promo: &promo_code::Model,
        requester: &Requester,
        order_id: Uuid,
        discount: Decimal,
    ) -> Result<AppliedPromo, ServiceError> {
        let mut update = PromoCode::update_many()
            .col_expr(
                promo_code::Column::UsedCount,
                Expr::col(promo_code::Column::UsedCount).add(1),
            )
            .col_expr(promo_code::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(promo_code::Column::Id.eq(promo.id))
            .filter(promo_code::Column::UsedCount.eq(promo.used_count));
        if let Some(total_limit) = promo.total_usage_limit {
            update = update.filter(promo_code::Column::UsedCount.lt(total_limit));
        }

        let result = update.exec(conn).await?;
        if result.rows_affected == 0 {
            let fresh = PromoCode::find_by_id(promo.id)
                .one(conn)
                .await?
                .ok_or(ServiceError::PromoInvalid)?;
            if let Some(total_limit) = fresh.total_usage_limit {
                if fresh.used_count >= total_limit {
                    return Err(ServiceError::TotalLimitExceeded);
                }
            }
            return Err(ServiceError::Conflict(
                "Promo code was redeemed by another order, please retry".to_string(),
            ));
        }

        promo_redemption::ActiveModel {
            id: Set(Uuid::new_v4()),
            promo_code_id: Set(promo.id),
            order_id: Set(order_id),
            redeemer: Set(requester.redeemer_key()),
            redeemed_at: Set(Utc::now()),
        }
        .insert(conn)
        .await?;

        info!(code = %promo.code, %discount, "Promo code redeemed");
        Ok(AppliedPromo {
            promo_code_id: promo.id,
            code: promo.code.clone(),
            discount,
        })
    }
}

/// Discount amount for a promo against a pre-shipping subtotal. Fixed
/// discounts never exceed the subtotal; percentage discounts honor the
/// optional `max_amount` cap.
pub fn compute_discount(promo: &promo_code::Model, subtotal: Decimal) -> Result<Decimal, ServiceError> {
    match promo.discount_type.as_str() {
        DISCOUNT_FIXED => Ok(promo.value.min(subtotal)),
        DISCOUNT_PERCENTAGE => {
            let mut discount = subtotal * promo.value / Decimal::from(100);
            if let Some(cap) = promo.max_amount {
                discount = discount.min(cap);
            }
            Ok(discount.min(subtotal))
        }
        other => Err(ServiceError::InternalError(format!(
            "unknown discount type '{}'",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn promo(discount_type: &str, value: Decimal, max_amount: Option<Decimal>) -> promo_code::Model {
        promo_code::Model {
            id: Uuid::new_v4(),
            code: "TEST".to_string(),
            discount_type: discount_type.to_string(),
            value,
            max_amount,
            is_active: true,
            expires_at: None,
            login_required: false,
            per_user_limit: None,
            total_usage_limit: None,
            used_count: 0,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    #[test]
    fn fixed_discount_is_capped_at_subtotal() {
        let p = promo(DISCOUNT_FIXED, dec!(100000), None);
        assert_eq!(compute_discount(&p, dec!(500000)).unwrap(), dec!(100000));
        assert_eq!(compute_discount(&p, dec!(60000)).unwrap(), dec!(60000));
    }

    #[test]
    fn percentage_discount_honors_cap() {
        let p = promo(DISCOUNT_PERCENTAGE, dec!(10), Some(dec!(30000)));
        assert_eq!(compute_discount(&p, dec!(200000)).unwrap(), dec!(20000));
        assert_eq!(compute_discount(&p, dec!(1000000)).unwrap(), dec!(30000));
    }

    #[test]
    fn percentage_discount_without_cap() {
        let p = promo(DISCOUNT_PERCENTAGE, dec!(25), None);
        assert_eq!(compute_discount(&p, dec!(400000)).unwrap(), dec!(100000));
    }

    #[test]
    fn unknown_discount_type_errors() {
        let p = promo("bogus", dec!(10), None);
        assert!(compute_discount(&p, dec!(100)).is_err());
    }
}
