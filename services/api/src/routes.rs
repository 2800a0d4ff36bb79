use crate::infra::AppState;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Extension;
use axum::Json;
use gradegate::workflows::otp::{otp_router, CodeGenerator, OtpVerifier};
use gradegate::workflows::results::{
    governance_router, GovernanceStore, NotificationSender, PublicationLockGovernor,
    ResultWorkflowService,
};
use serde_json::json;
use std::sync::Arc;

pub(crate) fn with_governance_routes<S, N, G>(
    results: Arc<ResultWorkflowService<S, N>>,
    governor: Arc<PublicationLockGovernor<S, N>>,
    verifier: Arc<OtpVerifier<N, G>>,
) -> axum::Router
where
    S: GovernanceStore + 'static,
    N: NotificationSender + 'static,
    G: CodeGenerator + 'static,
{
    governance_router(results, governor)
        .merge(otp_router(verifier))
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::InMemoryOutbox;
    use axum::body::Body;
    use axum::http::Request;
    use gradegate::workflows::otp::OtpPolicy;
    use gradegate::workflows::results::MemoryStore;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use std::sync::atomic::AtomicBool;
    use tower::ServiceExt;

    fn app(ready: bool) -> axum::Router {
        let store = Arc::new(MemoryStore::new());
        let outbox = Arc::new(InMemoryOutbox::default());
        let state = AppState {
            readiness: Arc::new(AtomicBool::new(ready)),
            metrics: Arc::new(PrometheusBuilder::new().build_recorder().handle()),
        };
        with_governance_routes(
            Arc::new(ResultWorkflowService::new(store.clone(), outbox.clone())),
            Arc::new(PublicationLockGovernor::new(store, outbox.clone())),
            Arc::new(OtpVerifier::new(OtpPolicy::default(), outbox)),
        )
        .layer(Extension(state))
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let response = app(true)
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn readiness_waits_for_listener() {
        let response = app(false)
            .oneshot(Request::get("/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let response = app(true)
            .oneshot(Request::get("/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn governance_and_otp_routes_are_mounted() {
        let response = app(true)
            .oneshot(
                Request::post("/api/v1/otp/status")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"identity":"clerk@uni.edu"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app(true)
            .oneshot(
                Request::post("/api/v1/sessions/summary")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(
                        r#"{"actor":{"id":"admin-1","role":"admin"},"session":"2024/2025"}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
