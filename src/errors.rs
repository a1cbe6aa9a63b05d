use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

/// Standard JSON error payload returned by every failing endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// HTTP status category (e.g. "Unprocessable Entity").
    pub error: String,
    /// Human-readable description with the corrective action.
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

/// Error taxonomy for the order-placement core. Every variant raised inside
/// the checkout transaction aborts it before propagating; nothing is partially
/// committed.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sea_orm::error::DbErr),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Insufficient stock for {product} size {size}: requested {requested}, available {available}")]
    InsufficientStock {
        product: String,
        size: String,
        requested: i32,
        available: i32,
    },

    #[error("Stock for {product} size {size} was exhausted by a concurrent order")]
    ConcurrentStockExhaustion { product: String, size: String },

    #[error("Promo code is invalid or inactive")]
    PromoInvalid,

    #[error("Promo code has expired")]
    PromoExpired,

    #[error("This promo code requires a signed-in account")]
    LoginRequired,

    #[error("You have already used this promo code the maximum number of times")]
    PerUserLimitExceeded,

    #[error("This promo code has reached its usage limit")]
    TotalLimitExceeded,

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl ServiceError {
    /// Single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::DatabaseError(_) | Self::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::ValidationError(_) => StatusCode::BAD_REQUEST,
            Self::InsufficientStock { .. }
            | Self::PromoInvalid
            | Self::PromoExpired
            | Self::PerUserLimitExceeded
            | Self::TotalLimitExceeded => StatusCode::UNPROCESSABLE_ENTITY,
            Self::ConcurrentStockExhaustion { .. } | Self::Conflict(_) => StatusCode::CONFLICT,
            Self::LoginRequired | Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
        }
    }

    /// Message suitable for HTTP responses. Internal errors are genericized so
    /// implementation details never leak; the caller is told to retry.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) | Self::InternalError(_) => {
                "Something went wrong on our side, please try again".to_string()
            }
            _ => self.to_string(),
        }
    }

    /// True for failures where resubmitting the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::DatabaseError(_) | Self::InternalError(_) | Self::Conflict(_)
        )
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let err = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message: self.response_message(),
            request_id: crate::request_id::current_request_id(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };
        (status, Json(err)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[test]
    fn status_code_mapping() {
        assert_eq!(
            ServiceError::NotFound("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ServiceError::ValidationError("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::InsufficientStock {
                product: "Tee".into(),
                size: "M".into(),
                requested: 5,
                available: 3,
            }
            .status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ServiceError::ConcurrentStockExhaustion {
                product: "Tee".into(),
                size: "M".into(),
            }
            .status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ServiceError::LoginRequired.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ServiceError::TotalLimitExceeded.status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ServiceError::Forbidden("x".into()).status_code(),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn insufficient_stock_names_product_size_and_quantity() {
        let err = ServiceError::InsufficientStock {
            product: "Logo Tee".into(),
            size: "L".into(),
            requested: 5,
            available: 3,
        };
        let msg = err.to_string();
        assert!(msg.contains("Logo Tee"));
        assert!(msg.contains("L"));
        assert!(msg.contains('3'));
    }

    #[test]
    fn internal_details_are_hidden() {
        let err = ServiceError::InternalError("connection pool exhausted".into());
        assert!(!err.response_message().contains("pool"));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn error_response_carries_request_id() {
        let response = crate::request_id::scope_request_id("req-42".to_string(), async {
            ServiceError::PromoExpired.into_response()
        })
        .await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let payload: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(payload.request_id.as_deref(), Some("req-42"));
    }
}
