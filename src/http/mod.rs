//! HTTP read surface.
//!
//! One route: `GET /{order_uid}`.
//!
//! | Outcome | Status | Body |
//! |---------|--------|------|
//! | found (cache or store) | 200 | order JSON |
//! | absent everywhere | 404 | `Order not found` |
//! | store failure | 500 | `Internal server error` |

use crate::lookup::{LookupError, LookupService};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use order_store::Order;
use thiserror::Error;
use tower_http::trace::TraceLayer;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub lookup: LookupService,
}

/// Lookup failures as HTTP responses.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Order not found")]
    NotFound,

    #[error("Internal server error")]
    Internal,
}

impl From<LookupError> for ApiError {
    fn from(e: LookupError) -> Self {
        match e {
            LookupError::NotFound(_) => ApiError::NotFound,
            LookupError::Store(_) => ApiError::Internal,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        // Plain text, no internal details
        (status, self.to_string()).into_response()
    }
}

pub fn router(lookup: LookupService) -> Router {
    Router::new()
        .route("/{order_uid}", get(get_order))
        .with_state(AppState { lookup })
        .layer(TraceLayer::new_for_http())
}

async fn get_order(
    State(state): State<AppState>,
    Path(order_uid): Path<String>,
) -> Result<Json<Order>, ApiError> {
    let order = state.lookup.get_order(&order_uid).await?;
    Ok(Json(order))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::OrderCache;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use order_store::{MemoryStore, MockStore, OrderStore, StoreError};
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    fn order(uid: &str) -> Order {
        let mut order = Order {
            order_uid: uid.to_string(),
            track_number: "WBILMTESTTRACK".to_string(),
            ..Order::default()
        };
        order.payment.transaction = uid.to_string();
        order
    }

    fn app(store: Arc<dyn OrderStore>, cache: Arc<OrderCache>) -> Router {
        router(LookupService::new(cache, store))
    }

    async fn body_string(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_cached_order_is_returned_as_json() {
        let cache = Arc::new(OrderCache::new());
        cache.set("o1", order("o1"));
        let app = app(Arc::new(MemoryStore::new()), cache);

        let response = app
            .oneshot(Request::get("/o1").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body: Order = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(body, order("o1"));
    }

    #[tokio::test]
    async fn test_unknown_order_is_404_text() {
        let app = app(Arc::new(MemoryStore::new()), Arc::new(OrderCache::new()));

        let response = app
            .oneshot(Request::get("/o2").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_string(response).await, "Order not found");
    }

    #[tokio::test]
    async fn test_store_failure_is_500() {
        let store = Arc::new(MockStore::new());
        store
            .expect_get_order_by_uid("o1")
            .return_err(StoreError::Timeout(Duration::from_secs(5)));
        let app = app(store.clone(), Arc::new(OrderCache::new()));

        let response = app
            .oneshot(Request::get("/o1").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_string(response).await, "Internal server error");
        store.verify();
    }

    #[tokio::test]
    async fn test_other_routes_do_not_exist() {
        let app = app(Arc::new(MemoryStore::new()), Arc::new(OrderCache::new()));

        let response = app
            .oneshot(Request::get("/a/b").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
