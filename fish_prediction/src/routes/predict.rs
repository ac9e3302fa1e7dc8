use crate::{
    inference_service::{PredictionError, UploadedFile},
    model_service::ModelService,
    server::SharedState,
};
use axum::{
    extract::{multipart::MultipartError, Multipart, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use std::time::Instant;
use tracing::instrument;

#[derive(Serialize)]
struct ErrorDetail {
    detail: String,
}

impl PredictionError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            PredictionError::UnsupportedMediaType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            PredictionError::InvalidImage(_) | PredictionError::Multipart(_) => {
                StatusCode::BAD_REQUEST
            }
            PredictionError::MissingFile => StatusCode::UNPROCESSABLE_ENTITY,
            PredictionError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            PredictionError::InferenceFailure(_) | PredictionError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn outcome(&self) -> &'static str {
        match self {
            PredictionError::UnsupportedMediaType => "unsupported_media_type",
            PredictionError::InvalidImage(_) => "invalid_image",
            PredictionError::InferenceFailure(_) => "inference_failure",
            PredictionError::Internal(_) => "internal",
            PredictionError::MissingFile
            | PredictionError::Multipart(_)
            | PredictionError::PayloadTooLarge => "bad_upload",
        }
    }
}

impl From<MultipartError> for PredictionError {
    fn from(err: MultipartError) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            PredictionError::PayloadTooLarge
        } else {
            PredictionError::Multipart(err.body_text())
        }
    }
}

impl IntoResponse for PredictionError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (
            status,
            Json(ErrorDetail {
                detail: self.to_string(),
            }),
        )
            .into_response()
    }
}

#[instrument(skip(state, multipart))]
pub async fn predict_image<M: ModelService>(
    State(state): State<SharedState<M>>,
    multipart: Multipart,
) -> Result<Response, PredictionError> {
    let start = Instant::now();
    let result = run_prediction(&state, multipart).await;

    let outcome = match &result {
        Ok(_) => "success",
        Err(e) => e.outcome(),
    };
    state.metrics.record_prediction(outcome);
    state
        .metrics
        .record_prediction_duration(start.elapsed().as_millis() as u64, outcome);

    let classification = result?;
    Ok((
        [(header::CACHE_CONTROL, "no-store")],
        Json(classification),
    )
        .into_response())
}

async fn run_prediction<M: ModelService>(
    state: &SharedState<M>,
    multipart: Multipart,
) -> Result<crate::interpreter::ClassificationResult, PredictionError> {
    let upload = read_upload(multipart).await.inspect_err(|e| {
        tracing::error!(stage = "upload", error = %e, "Failed to read upload");
    })?;

    let inference_service = state.inference_service.clone();
    tokio::task::spawn_blocking(move || inference_service.handle(&upload))
        .await
        .map_err(|e| {
            tracing::error!(stage = "inference", error = %e, "Prediction task did not complete");
            PredictionError::Internal(e.to_string())
        })?
}

// The first part carrying a filename is the upload, whatever its field name.
async fn read_upload(mut multipart: Multipart) -> Result<UploadedFile, PredictionError> {
    while let Some(field) = multipart.next_field().await? {
        let filename = match (field.file_name(), field.name()) {
            (Some(filename), _) => filename.to_string(),
            (None, Some("file")) => String::new(),
            _ => continue,
        };
        let data = field.bytes().await?;
        return Ok(UploadedFile::new(filename, data));
    }

    Err(PredictionError::MissingFile)
}
