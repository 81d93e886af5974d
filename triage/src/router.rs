use std::future::ready;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::Method;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::advice::AdviceGenerator;
use crate::classifier::Classifier;
use crate::labels::LabelSet;
use crate::predict;
use crate::prometheus::{setup_metrics_recorder, track_metrics};
use crate::uploads::UploadStore;

#[derive(Clone)]
pub struct State {
    pub classifier: Arc<dyn Classifier + Send + Sync>,
    pub advice: Arc<dyn AdviceGenerator + Send + Sync>,
    pub labels: Arc<LabelSet>,
    pub uploads: UploadStore,
    pub threshold: f32,
}

async fn index() -> &'static str {
    "triage"
}

async fn status() -> &'static str {
    "ok"
}

#[allow(clippy::too_many_arguments)]
pub fn router<
    C: Classifier + Send + Sync + 'static,
    A: AdviceGenerator + Send + Sync + 'static,
>(
    classifier: C,
    advice: A,
    labels: Arc<LabelSet>,
    uploads: UploadStore,
    threshold: f32,
    max_upload_bytes: usize,
    metrics: bool,
) -> Router {
    let state = State {
        classifier: Arc::new(classifier),
        advice: Arc::new(advice),
        labels,
        uploads,
        threshold,
    };

    // Browsers call us from anywhere
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
        .allow_origin(Any);

    let status_router = Router::new()
        .route("/", get(index))
        .route("/_readiness", get(status))
        .route("/_liveness", get(status));

    let predict_router = Router::new()
        .route("/predict", post(predict::predict))
        .route("/predict/", post(predict::predict))
        .layer(DefaultBodyLimit::max(max_upload_bytes));

    let router = Router::new()
        .merge(status_router)
        .merge(predict_router)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(axum::middleware::from_fn(track_metrics))
        .with_state(state);

    // Don't install metrics unless asked to
    // Installing a global recorder when triage is used as a library (during tests etc)
    // does not work well.
    if metrics {
        let recorder_handle = setup_metrics_recorder();

        router.route("/metrics", get(move || ready(recorder_handle.render())))
    } else {
        router
    }
}
