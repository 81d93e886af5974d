use std::time::Instant;

use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, State};
use axum::Json;
use bytes::Bytes;
use metrics::{counter, histogram};
use tracing::instrument;

use crate::api::{PredictError, PredictResponse};
use crate::classifier::{check_output_len, decode, ClassifierError};
use crate::prometheus::{
    report_skipped_image, ADVICE_FAILURES, CLASSIFY_DURATION, IMAGES_RECEIVED, PREDICTIONS,
};
use crate::{router, severity};

struct Upload {
    filename: Option<String>,
    bytes: Bytes,
}

impl Upload {
    fn is_unselected(&self) -> bool {
        self.filename.as_deref().map_or(true, str::is_empty) && self.bytes.is_empty()
    }
}

#[instrument(skip_all, fields(file_count, symptoms_len))]
pub async fn predict(
    State(state): State<router::State>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<PredictResponse>, PredictError> {
    // Anything that is not a multipart form carries no file parts
    let mut multipart = multipart.map_err(|rejection| {
        tracing::warn!("predict request is not a multipart form: {}", rejection);
        PredictError::NoFilesPart
    })?;

    let mut files_part = false;
    let mut uploads = Vec::new();
    let mut symptoms: Option<String> = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            // Plain text fields named `files` are not file parts
            Some("files") if field.file_name().is_some() => {
                files_part = true;
                let upload = Upload {
                    filename: field.file_name().map(str::to_owned),
                    bytes: field.bytes().await?,
                };
                if !upload.is_unselected() {
                    uploads.push(upload);
                }
            }
            // First value wins when the field is repeated
            Some("symptoms") if symptoms.is_none() => symptoms = Some(field.text().await?),
            _ => {}
        }
    }

    if !files_part {
        return Err(PredictError::NoFilesPart);
    }
    if uploads.is_empty() {
        return Err(PredictError::NoSelectedFiles);
    }

    state.uploads.ensure_dir().await.map_err(|e| {
        PredictError::Internal(format!(
            "failed to create upload directory {}: {}",
            state.uploads.dir().display(),
            e
        ))
    })?;

    let symptoms = symptoms.unwrap_or_default();
    if symptoms.is_empty() {
        return Err(PredictError::NoSymptoms);
    }

    tracing::Span::current().record("file_count", uploads.len());
    tracing::Span::current().record("symptoms_len", symptoms.len());
    counter!(IMAGES_RECEIVED).increment(uploads.len() as u64);

    // One image at a time, failures only drop the image
    let mut vectors = Vec::with_capacity(uploads.len());
    for upload in uploads {
        if let Some(vector) = process_upload(&state, upload).await {
            vectors.push(vector);
        }
    }

    let assessment = severity::aggregate(&vectors, &state.labels, state.threshold);
    tracing::info!(
        images = vectors.len(),
        predicted = ?assessment.predicted,
        severity = ?assessment.severity,
        "assessed uploads"
    );

    let disease = assessment.matched_disease(&symptoms);
    let advice = state
        .advice
        .advise(&symptoms, disease)
        .await
        .inspect_err(|_| counter!(ADVICE_FAILURES).increment(1))?;

    counter!(PREDICTIONS).increment(1);

    Ok(Json(PredictResponse {
        conclusion: assessment.conclusion().map(str::to_owned),
        severity: assessment.severity,
        advice_and_prescription: advice,
    }))
}

async fn process_upload(state: &router::State, upload: Upload) -> Option<Vec<f32>> {
    let name = upload.filename.clone().unwrap_or_default();

    match state
        .uploads
        .save(upload.filename.as_deref(), &upload.bytes)
        .await
    {
        Ok(path) => tracing::debug!(path = %path.display(), "saved upload"),
        Err(e) => {
            tracing::warn!(file = %name, "failed to save upload: {}", e);
            report_skipped_image("write");
            return None;
        }
    }

    let classifier = state.classifier.clone();
    let label_count = state.labels.len();
    let bytes = upload.bytes;

    let start = Instant::now();
    let result = tokio::task::spawn_blocking(move || {
        let image = decode(&bytes)?;
        let vector = classifier.classify(&image)?;
        check_output_len(&vector, label_count)?;
        Ok::<_, ClassifierError>(vector)
    })
    .await;
    histogram!(CLASSIFY_DURATION).record(start.elapsed().as_secs_f64());

    match result {
        Ok(Ok(vector)) => {
            for (label, probability) in state.labels.iter().zip(&vector) {
                tracing::debug!(file = %name, "{}: {:.2}%", label, probability * 100.0);
            }
            Some(vector)
        }
        Ok(Err(e)) => {
            tracing::warn!(file = %name, "error processing file: {}", e);
            report_skipped_image(match e {
                ClassifierError::Decode(_) => "decode",
                _ => "classify",
            });
            None
        }
        Err(e) => {
            tracing::warn!(file = %name, "classification task failed: {}", e);
            report_skipped_image("panic");
            None
        }
    }
}
