use axum::{
    extract::{Path, State},
    http::header,
    response::IntoResponse,
    Json,
};

use crate::error::{ApiResponse, Result};
use crate::models::{ProjectedView, VerifyPinRequest};
use crate::services::ShareService;
use crate::AppState;

// Views depend on live scope/PIN state and must never be served from a cache.
const NO_STORE: [(header::HeaderName, &str); 1] = [(header::CACHE_CONTROL, "no-store")];

/// Get the public view of a share
/// GET /share/:token
pub async fn get_share(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<impl IntoResponse> {
    let view = ShareService::view_share(state.shares.as_ref(), &state.pin_limiter, &token, None).await?;
    Ok((NO_STORE, Json(ApiResponse::<ProjectedView>::success(view))))
}

/// Unlock a PIN-protected share
/// POST /share/:token/verify
pub async fn verify_share(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Json(req): Json<VerifyPinRequest>,
) -> Result<impl IntoResponse> {
    let view = ShareService::view_share(
        state.shares.as_ref(),
        &state.pin_limiter,
        &token,
        Some(req.pin.trim()),
    )
    .await?;
    Ok((NO_STORE, Json(ApiResponse::<ProjectedView>::success(view))))
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use serde_json::Value;
    use std::collections::BTreeSet;
    use tower::ServiceExt;

    use crate::models::{ScopeCategory, ShareConfig};
    use crate::services::projector::fixtures::sentinel_record;
    use crate::services::share::fakes::FakeStore;
    use crate::test_state;

    const TOKEN: &str = "A1b2C3d4E5f6G7h8I9j0Kl";

    fn store() -> FakeStore {
        let mut store = FakeStore::default();
        store.shares.insert(
            TOKEN.to_string(),
            (
                sentinel_record("Fluffy"),
                ShareConfig {
                    scope: BTreeSet::from([ScopeCategory::Contacts, ScopeCategory::Vaccinations]),
                    pin: Some("0000".to_string()),
                    is_active: true,
                },
            ),
        );
        store
    }

    async fn send(request: Request<Body>) -> (StatusCode, Option<String>, Value) {
        let app = crate::create_router(test_state(store()));
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let cache = response
            .headers()
            .get("cache-control")
            .map(|v| v.to_str().unwrap().to_string());
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, cache, serde_json::from_slice(&body).unwrap())
    }

    fn verify(pin: &str) -> Request<Body> {
        Request::post(format!("/share/{}/verify", TOKEN))
            .header("content-type", "application/json")
            .body(Body::from(serde_json::json!({ "pin": pin }).to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_get_share_prompts_for_pin() {
        let request = Request::get(format!("/share/{}", TOKEN)).body(Body::empty()).unwrap();
        let (status, cache, body) = send(request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(cache.as_deref(), Some("no-store"));
        assert_eq!(body["data"]["status"], "pin_required");
        assert_eq!(body["data"]["pet_name"], "Fluffy");
        assert!(!body.to_string().contains("SENTINEL"));
    }

    #[tokio::test]
    async fn test_verify_with_correct_pin_returns_scoped_view() {
        let (status, _, body) = send(verify("0000")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "full_view");
        let categories: Vec<&str> = body["data"]["sections"]
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["category"].as_str().unwrap())
            .collect();
        assert_eq!(categories, vec!["contacts", "vaccinations"]);
    }

    #[tokio::test]
    async fn test_verify_with_wrong_pin_is_forbidden() {
        let (status, _, body) = send(verify("9999")).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["code"], 403);
    }

    #[tokio::test]
    async fn test_malformed_and_unknown_tokens() {
        let request = Request::get("/share/short").body(Body::empty()).unwrap();
        let (status, _, _) = send(request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let request = Request::get("/share/zzzzzzzzzzzzzzzzzzzzzz").body(Body::empty()).unwrap();
        let (status, _, body) = send(request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], 404);
    }
}
