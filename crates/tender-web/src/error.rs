use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tender_core::ApiResponse;
use tender_storage::RepositoryError;
use tender_sync::SyncError;
use tracing::error;

/// Handler failure rendered as an `ApiResponse` error envelope.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Sync(SyncError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Sync(err) => match err {
                SyncError::TenderNotFound(_)
                | SyncError::Repository(RepositoryError::TenderNotFound(_)) => {
                    StatusCode::NOT_FOUND
                }
                SyncError::NotReady(_) | SyncError::AlreadyRunning => StatusCode::CONFLICT,
                SyncError::NoDocuments
                | SyncError::EmptyQuestion
                | SyncError::InvalidDate(_)
                | SyncError::InvalidRange { .. } => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl From<SyncError> for ApiError {
    fn from(err: SyncError) -> Self {
        Self::Sync(err)
    }
}

impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        Self::Sync(SyncError::Repository(err))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            Self::BadRequest(message) => message.clone(),
            Self::Sync(err) => err.to_string(),
        };
        if status.is_server_error() {
            error!(%status, error = %message, "request failed");
        }
        (status, Json(ApiResponse::<()>::error(message))).into_response()
    }
}
