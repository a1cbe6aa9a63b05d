//! Shared integration test harness: a migrated SQLite database in a temp
//! directory plus the full application state.
//!
//! The pool is capped at one connection so overlapping transactions execute
//! one after the other, which makes the concurrency tests deterministic: both
//! contenders run their full transaction, and the conditional updates decide
//! the winner.

#![allow(dead_code)]

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;
use uuid::Uuid;

use storefront_api::{
    auth::{self, ROLE_ADMIN, ROLE_CUSTOMER},
    config::AppConfig,
    db::{self, DbConfig, DbPool},
    entities::{product, promo_code, stock_level, Size},
    events::EventSender,
    AppState,
};

pub const TEST_JWT_SECRET: &str = "integration_test_secret_0123456789abcdef";

pub struct TestApp {
    pub state: AppState,
    pub db: Arc<DbPool>,
    pub config: Arc<AppConfig>,
    _dir: TempDir,
    _event_rx: mpsc::Receiver<storefront_api::events::Event>,
}

impl TestApp {
    pub async fn spawn() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let url = format!(
            "sqlite://{}?mode=rwc",
            dir.path().join("storefront.db").display()
        );

        let db_config = DbConfig {
            url: url.clone(),
            max_connections: 1,
            min_connections: 1,
            connect_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(60),
            acquire_timeout: Duration::from_secs(30),
        };
        let pool = db::establish_connection_with_config(&db_config)
            .await
            .unwrap();
        db::run_migrations(&pool).await.unwrap();

        let config = Arc::new(AppConfig::new(
            url,
            TEST_JWT_SECRET.to_string(),
            "127.0.0.1".to_string(),
            0,
            "test".to_string(),
        ));

        let (tx, rx) = mpsc::channel(64);
        let db = Arc::new(pool);
        let state = AppState::new(db.clone(), config.clone(), EventSender::new(tx));

        Self {
            state,
            db,
            config,
            _dir: dir,
            _event_rx: rx,
        }
    }

    pub fn router(&self) -> axum::Router {
        storefront_api::app_router(self.state.clone())
    }

    pub fn customer_token(&self, customer_id: Uuid, email: &str) -> String {
        auth::issue_token(
            TEST_JWT_SECRET,
            customer_id,
            Some(email.to_string()),
            ROLE_CUSTOMER,
            3600,
        )
        .unwrap()
    }

    pub fn admin_token(&self) -> String {
        auth::issue_token(TEST_JWT_SECRET, Uuid::new_v4(), None, ROLE_ADMIN, 3600).unwrap()
    }

    /// Inserts a product with one stock row per given size.
    pub async fn seed_product(&self, name: &str, price: Decimal, stock: &[(Size, i32)]) -> Uuid {
        let id = Uuid::new_v4();
        product::ActiveModel {
            id: Set(id),
            name: Set(name.to_string()),
            price: Set(price),
            out_of_stock: Set(false),
            is_active: Set(true),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
        }
        .insert(self.db.as_ref())
        .await
        .unwrap();

        for (size, quantity) in stock {
            stock_level::ActiveModel {
                product_id: Set(id),
                size: Set(size.to_string()),
                quantity: Set(*quantity),
                out_of_stock: Set(*quantity == 0),
                updated_at: Set(None),
            }
            .insert(self.db.as_ref())
            .await
            .unwrap();
        }
        id
    }

    pub async fn seed_promo(&self, promo: PromoSpec<'_>) -> Uuid {
        let id = Uuid::new_v4();
        promo_code::ActiveModel {
            id: Set(id),
            code: Set(promo.code.to_string()),
            discount_type: Set(promo.discount_type.to_string()),
            value: Set(promo.value),
            max_amount: Set(promo.max_amount),
            is_active: Set(promo.is_active),
            expires_at: Set(promo.expires_at),
            login_required: Set(promo.login_required),
            per_user_limit: Set(promo.per_user_limit),
            total_usage_limit: Set(promo.total_usage_limit),
            used_count: Set(0),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
        }
        .insert(self.db.as_ref())
        .await
        .unwrap();
        id
    }

    pub async fn promo(&self, id: Uuid) -> promo_code::Model {
        promo_code::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .unwrap()
            .unwrap()
    }

    pub async fn stock(&self, product_id: Uuid, size: Size) -> stock_level::Model {
        stock_level::Entity::find_by_id((product_id, size.to_string()))
            .one(self.db.as_ref())
            .await
            .unwrap()
            .unwrap()
    }

    pub async fn product(&self, id: Uuid) -> product::Model {
        product::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .unwrap()
            .unwrap()
    }
}

pub struct PromoSpec<'a> {
    pub code: &'a str,
    pub discount_type: &'a str,
    pub value: Decimal,
    pub max_amount: Option<Decimal>,
    pub is_active: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub login_required: bool,
    pub per_user_limit: Option<i32>,
    pub total_usage_limit: Option<i32>,
}

impl Default for PromoSpec<'_> {
    fn default() -> Self {
        Self {
            code: "WELCOME",
            discount_type: promo_code::DISCOUNT_FIXED,
            value: Decimal::ZERO,
            max_amount: None,
            is_active: true,
            expires_at: None,
            login_required: false,
            per_user_limit: None,
            total_usage_limit: None,
        }
    }
}
