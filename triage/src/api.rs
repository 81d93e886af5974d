use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::advice::AdviceError;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PredictResponse {
    /// First predicted disease, if any image scored over the threshold
    pub conclusion: Option<String>,
    pub severity: Option<f64>,
    pub advice_and_prescription: String,
}

#[derive(Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Error, Debug)]
pub enum PredictError {
    #[error("No files part")]
    NoFilesPart,
    #[error("No selected files")]
    NoSelectedFiles,
    #[error("No symptoms provided")]
    NoSymptoms,

    #[error(transparent)]
    Multipart(#[from] MultipartError),
    #[error(transparent)]
    Advice(#[from] AdviceError),
    #[error("{0}")]
    Internal(String),
}

impl PredictError {
    pub fn status(&self) -> StatusCode {
        match self {
            PredictError::NoFilesPart | PredictError::NoSelectedFiles | PredictError::NoSymptoms => {
                StatusCode::BAD_REQUEST
            }

            PredictError::Multipart(_) | PredictError::Advice(_) | PredictError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for PredictError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("predict request failed: {}", self);
        } else {
            tracing::warn!("rejected predict request: {}", self);
        }

        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}
