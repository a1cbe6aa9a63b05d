//! Per-request id propagation. Each request gets an id (client-supplied
//! `x-request-id` or a generated one) held in a task-local so error payloads
//! and log lines can reference it without threading it through every call.

use axum::{
    body::Body,
    http::{HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use std::future::Future;
use tracing::{info_span, Instrument};
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

tokio::task_local! {
    static REQUEST_ID: String;
}

/// Runs `future` with the given request id in scope.
pub async fn scope_request_id<Fut, R>(request_id: String, future: Fut) -> R
where
    Fut: Future<Output = R>,
{
    REQUEST_ID.scope(request_id, future).await
}

/// The request id for the current task, if one is in scope.
pub fn current_request_id() -> Option<String> {
    REQUEST_ID.try_with(|rid| rid.clone()).ok()
}

/// Middleware: ensure every request carries an id, scope it for the handler,
/// and echo it on the response.
pub async fn request_id_middleware(mut req: Request<Body>, next: Next) -> Response {
    let rid = req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    if let Ok(value) = HeaderValue::from_str(&rid) {
        req.headers_mut().insert(REQUEST_ID_HEADER, value.clone());
        let span = info_span!("request", request_id = %rid);
        let mut response = scope_request_id(rid, next.run(req).instrument(span)).await;
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
        response
    } else {
        next.run(req).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn request_id_is_visible_inside_scope_only() {
        assert!(current_request_id().is_none());
        let seen = scope_request_id("abc".to_string(), async { current_request_id() }).await;
        assert_eq!(seen.as_deref(), Some("abc"));
        assert!(current_request_id().is_none());
    }
}
