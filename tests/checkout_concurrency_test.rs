//! Races two checkouts for the same scarce resource and asserts exactly one
//! wins. Whichever transaction lands second must fail either at preflight or
//! at the conditional write; both paths leave no partial state behind.

mod common;

use assert_matches::assert_matches;
use common::{PromoSpec, TestApp};
use rust_decimal_macros::dec;
use sea_orm::{sea_query::Expr, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};
use uuid::Uuid;

use storefront_api::{
    auth::Requester,
    db::DbPool,
    entities::{order, promo_code, Size},
    errors::ServiceError,
    services::{
        checkout::{CartItem, PlaceOrderInput, ShippingInfo},
        inventory::InventoryService,
        promotions::PromotionService,
    },
};

fn input_for(product_id: Uuid, promo_code_id: Option<Uuid>) -> PlaceOrderInput {
    PlaceOrderInput {
        items: vec![CartItem {
            product_id,
            size: Size::M,
            quantity: 1,
            price: None,
        }],
        promo_code_id,
        shipping: ShippingInfo {
            full_name: "Racer".to_string(),
            phone: "0900000001".to_string(),
            province: "Da Nang".to_string(),
            district: "Hai Chau".to_string(),
            ward: "Thach Thang".to_string(),
            address: "3 Bach Dang".to_string(),
        },
        payment_method: "cod".to_string(),
        note: None,
    }
}

fn guest(n: u32) -> Requester {
    Requester::Guest {
        email: format!("racer{}@example.com", n),
    }
}

/// Simulates another order's redemption landing first.
async fn bump_used_count(db: &DbPool, promo_id: Uuid) {
    promo_code::Entity::update_many()
        .col_expr(
            promo_code::Column::UsedCount,
            Expr::col(promo_code::Column::UsedCount).add(1),
        )
        .filter(promo_code::Column::Id.eq(promo_id))
        .exec(db)
        .await
        .unwrap();
}

#[tokio::test]
async fn decrement_refuses_to_overdraw_at_write_time() {
    let app = TestApp::spawn().await;
    let product_id = app
        .seed_product("Scarce Tee", dec!(300000), &[(Size::M, 1)])
        .await;
    let product = app.product(product_id).await;

    // Requesting more than is available must fail at the conditional update
    // itself, as if a concurrent order drained the stock after preflight.
    let err = InventoryService::new()
        .decrement(app.db.as_ref(), &product, Size::M, 2)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ConcurrentStockExhaustion { .. });
    assert_eq!(app.stock(product_id, Size::M).await.quantity, 1);
}

#[tokio::test]
async fn stale_redeem_without_a_limit_is_a_retryable_conflict() {
    let app = TestApp::spawn().await;
    let promo_id = app
        .seed_promo(PromoSpec {
            code: "BUSY",
            value: dec!(20000),
            ..Default::default()
        })
        .await;

    let promotions = PromotionService::new();
    let (promo, discount) = promotions
        .validate(app.db.as_ref(), promo_id, &guest(1), dec!(200000))
        .await
        .unwrap();

    // The counter moves between validation and redemption, so the guarded
    // increment matches zero rows.
    bump_used_count(app.db.as_ref(), promo_id).await;

    let err = promotions
        .redeem(app.db.as_ref(), &promo, &guest(1), Uuid::new_v4(), discount)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Conflict(_));
    assert!(err.is_retryable());
    assert_eq!(app.promo(promo_id).await.used_count, 1);
}

#[tokio::test]
async fn stale_redeem_of_an_exhausted_limit_reports_the_limit() {
    let app = TestApp::spawn().await;
    let promo_id = app
        .seed_promo(PromoSpec {
            code: "SOLDOUT",
            value: dec!(20000),
            total_usage_limit: Some(1),
            ..Default::default()
        })
        .await;

    let promotions = PromotionService::new();
    let (promo, discount) = promotions
        .validate(app.db.as_ref(), promo_id, &guest(1), dec!(200000))
        .await
        .unwrap();

    // Another order takes the last redemption before ours lands. Retrying
    // can never succeed, so the loser must be told the limit is exhausted,
    // not asked to retry.
    bump_used_count(app.db.as_ref(), promo_id).await;

    let err = promotions
        .redeem(app.db.as_ref(), &promo, &guest(1), Uuid::new_v4(), discount)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::TotalLimitExceeded);
    assert!(!err.is_retryable());
    assert_eq!(app.promo(promo_id).await.used_count, 1);
}

#[tokio::test]
async fn last_unit_of_stock_goes_to_exactly_one_order() {
    let app = TestApp::spawn().await;
    let product_id = app
        .seed_product("Last One", dec!(350000), &[(Size::M, 1)])
        .await;

    let checkout_a = app.state.checkout.clone();
    let checkout_b = app.state.checkout.clone();
    let (a, b) = tokio::join!(
        tokio::spawn(async move { checkout_a.place_order(input_for(product_id, None), guest(1)).await }),
        tokio::spawn(async move { checkout_b.place_order(input_for(product_id, None), guest(2)).await }),
    );
    let results = [a.unwrap(), b.unwrap()];

    let successes = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1, "exactly one order may claim the last unit");
    for result in &results {
        if let Err(err) = result {
            assert!(
                matches!(
                    err,
                    ServiceError::InsufficientStock { .. }
                        | ServiceError::ConcurrentStockExhaustion { .. }
                ),
                "unexpected loser error: {err}"
            );
        }
    }

    assert_eq!(app.stock(product_id, Size::M).await.quantity, 0);
    assert!(app.stock(product_id, Size::M).await.out_of_stock);
    assert_eq!(
        order::Entity::find().count(app.db.as_ref()).await.unwrap(),
        1
    );
}

#[tokio::test]
async fn promo_with_one_use_left_is_redeemed_by_exactly_one_order() {
    let app = TestApp::spawn().await;
    let product_id = app
        .seed_product("Tee", dec!(200000), &[(Size::M, 10)])
        .await;
    let promo_id = app
        .seed_promo(PromoSpec {
            code: "LASTUSE",
            value: dec!(20000),
            total_usage_limit: Some(1),
            ..Default::default()
        })
        .await;

    let checkout_a = app.state.checkout.clone();
    let checkout_b = app.state.checkout.clone();
    let (a, b) = tokio::join!(
        tokio::spawn(
            async move { checkout_a.place_order(input_for(product_id, Some(promo_id)), guest(1)).await }
        ),
        tokio::spawn(
            async move { checkout_b.place_order(input_for(product_id, Some(promo_id)), guest(2)).await }
        ),
    );
    let results = [a.unwrap(), b.unwrap()];

    let successes = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1, "exactly one order may take the last redemption");
    for result in &results {
        if let Err(err) = result {
            assert!(
                matches!(
                    err,
                    ServiceError::TotalLimitExceeded | ServiceError::Conflict(_)
                ),
                "unexpected loser error: {err}"
            );
        }
    }

    let promo = app.promo(promo_id).await;
    assert_eq!(promo.used_count, 1);

    // The losing attempt must not have consumed stock either.
    assert_eq!(app.stock(product_id, Size::M).await.quantity, 9);
    assert_eq!(
        order::Entity::find().count(app.db.as_ref()).await.unwrap(),
        1
    );
}
