use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use hearth_protocol::SuccessBody;
use serde_json::json;

use crate::state::AppState;

/// `GET /health`. Body is the standard success envelope with `status` plus
/// operational counters that have nowhere else to surface since this crate
/// exports no metrics sink.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(SuccessBody::with_data(
        "Health Check",
        json!({
            "status": "ok",
            "dropped_logs": state.pipeline.dropped_count(),
            "sessions": state.hub.session_count().await,
        }),
    ))
}

/// `GET /ping`. A liveness probe distinct from `/health` -- always `"pong"`,
/// never touches shared state.
pub async fn ping() -> impl IntoResponse {
    Json(SuccessBody::new("pong"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::Hub;
    use crate::pipeline::Pipeline;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn test_state() -> AppState {
        let (hub, actor) = Hub::new();
        actor.run();
        let pipeline = Pipeline::new_detached();
        AppState::new(hub, pipeline)
    }

    #[tokio::test]
    async fn health_reports_ok_status_with_counters() {
        let router = crate::http::build_router(test_state());
        let response = router
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["message"], "Health Check");
        assert_eq!(parsed["data"]["status"], "ok");
        assert_eq!(parsed["data"]["dropped_logs"], 0);
        assert_eq!(parsed["data"]["sessions"], 0);
    }

    #[tokio::test]
    async fn ping_returns_pong() {
        let router = crate::http::build_router(test_state());
        let response = router
            .oneshot(Request::get("/ping").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["message"], "pong");
    }
}
