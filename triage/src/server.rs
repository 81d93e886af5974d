use std::future::Future;
use std::sync::Arc;

use tokio::net::TcpListener;

use crate::advice::{LookupAdvice, OpenAiAdvice};
use crate::config::{AdviceBackend, Config};
use crate::labels::LabelSet;
use crate::onnx::OnnxClassifier;
use crate::router;
use crate::uploads::UploadStore;

pub async fn serve<F>(config: Config, listener: TcpListener, shutdown: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    let labels = match LabelSet::from_path(&config.labels_path) {
        Ok(labels) => Arc::new(labels),
        Err(e) => {
            tracing::error!("Failed to load labels from {}: {}", config.labels_path, e);
            return;
        }
    };
    tracing::info!(labels = labels.len(), "loaded label set");

    let classifier = match OnnxClassifier::load(&config.model_path, config.model_input_size) {
        Ok(classifier) => classifier,
        Err(e) => {
            tracing::error!("Failed to load image classifier: {}", e);
            return;
        }
    };

    let uploads = UploadStore::new(&config.upload_dir);
    if let Err(e) = uploads.ensure_dir().await {
        tracing::error!(
            "Failed to create upload directory {}: {}",
            config.upload_dir,
            e
        );
        return;
    }

    let app = match config.advice_backend {
        AdviceBackend::OpenAi => {
            let advice = match OpenAiAdvice::from_config(&config) {
                Ok(advice) => advice,
                Err(e) => {
                    tracing::error!("Failed to create advice client: {}", e);
                    return;
                }
            };
            router::router(
                classifier,
                advice,
                labels,
                uploads,
                config.prediction_threshold,
                config.max_upload_bytes,
                config.export_prometheus,
            )
        }
        AdviceBackend::Lookup => router::router(
            classifier,
            LookupAdvice::new(labels.clone()),
            labels,
            uploads,
            config.prediction_threshold,
            config.max_upload_bytes,
            config.export_prometheus,
        ),
    };

    match listener.local_addr() {
        Ok(addr) => tracing::info!("listening on {:?}", addr),
        Err(e) => tracing::warn!("listening on unknown address: {}", e),
    }

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
    {
        tracing::error!("triage http server failed: {}", e);
    }
}
