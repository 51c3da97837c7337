use axum::{
    extract::{multipart::MultipartRejection, rejection::JsonRejection, Multipart, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use serde_json::json;
use utoipa::ToSchema;

use crate::{
    error::{Error, ErrorKind},
    services::document_service::{PDF_CONTENT_TYPE, PDF_FILE_NAME},
    AppState,
};

/// Multipart body of the bulk upload.
#[derive(ToSchema)]
#[allow(dead_code)]
pub struct QuestionUpload {
    /// `.xlsx` workbook; row 1 is a header, columns A–I hold subject, topic,
    /// difficulty, question, options A–D and the correct answer.
    #[schema(value_type = String, format = Binary)]
    file: Vec<u8>,
}

#[derive(Serialize, ToSchema)]
pub struct UploadErrorBody {
    #[serde(rename = "Message")]
    pub message: String,
}

#[derive(Serialize, ToSchema)]
pub struct RenderErrorBody {
    pub message: String,
}

/// Failure envelope of the upload operation: validation problems are a 400,
/// anything the import itself hits is reported as a 404.
#[derive(Debug)]
pub struct UploadFailure(pub Error);

impl From<Error> for UploadFailure {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for UploadFailure {
    fn into_response(self) -> Response {
        let status = match self.0.kind() {
            // Includes duplicate rows refused under the `reject` policy.
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound | ErrorKind::Processing => StatusCode::NOT_FOUND,
        };
        (status, Json(json!({ "Message": self.0.to_string() }))).into_response()
    }
}

/// Failure envelope of the render operation: always a 400.
#[derive(Debug)]
pub struct RenderFailure(pub Error);

impl From<Error> for RenderFailure {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for RenderFailure {
    fn into_response(self) -> Response {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({ "message": self.0.to_string() })),
        )
            .into_response()
    }
}

#[utoipa::path(
    put,
    path = "/api/question",
    request_body(content = QuestionUpload, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "All rows imported"),
        (status = 400, description = "No file uploaded", body = UploadErrorBody),
        (status = 404, description = "Import failed", body = UploadErrorBody)
    )
)]
pub async fn add_questions_in_bulk(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<StatusCode, UploadFailure> {
    let mut multipart =
        multipart.map_err(|_| Error::Validation("No file uploaded".to_string()))?;

    let mut upload = None;
    while let Some(field) = multipart.next_field().await.map_err(Error::Multipart)? {
        let is_file = field.name() == Some("file") || field.file_name().is_some();
        if !is_file {
            continue;
        }
        let data = field.bytes().await.map_err(Error::Multipart)?;
        if !data.is_empty() {
            upload = Some(data);
            break;
        }
    }

    let data = upload.ok_or_else(|| Error::Validation("No file uploaded".to_string()))?;
    tracing::info!(bytes = data.len(), "Bulk question upload received");

    state
        .import_service
        .import_workbook(data)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Bulk question import failed");
            e
        })?;

    Ok(StatusCode::OK)
}

#[utoipa::path(
    post,
    path = "/api/question/download-pdf",
    request_body = Vec<i32>,
    responses(
        (status = 200, description = "PDF with one section per matched question", content_type = "application/pdf"),
        (status = 400, description = "No matching questions or rendering failed", body = RenderErrorBody)
    )
)]
pub async fn download_pdf(
    State(state): State<AppState>,
    payload: Result<Json<Vec<i32>>, JsonRejection>,
) -> Result<impl IntoResponse, RenderFailure> {
    let Json(question_ids) = payload.map_err(|e| Error::Validation(e.body_text()))?;

    let pdf = state
        .document_service
        .render_questions(&question_ids)
        .await
        .map_err(|e| {
            tracing::warn!(error = %e, "Question document could not be rendered");
            e
        })?;

    let disposition = format!("attachment; filename=\"{}\"", PDF_FILE_NAME);
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, PDF_CONTENT_TYPE.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        pdf,
    ))
}
