use axum::{response::IntoResponse, Json};
use utoipa::OpenApi;

use crate::routes::question::{QuestionUpload, RenderErrorBody, UploadErrorBody};

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::question::add_questions_in_bulk,
        crate::routes::question::download_pdf,
    ),
    components(schemas(QuestionUpload, UploadErrorBody, RenderErrorBody)),
    tags((name = "questions", description = "Bulk import and PDF export of quiz questions"))
)]
pub struct ApiDoc;

pub async fn openapi_json() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}
