use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::{error, warn};

use crate::domain::error::IngestionError;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct ExistsResponse {
    pub exists: bool,
    pub bookings: u64,
    pub refunds: u64,
}

#[derive(Debug, Serialize)]
pub struct ClearResponse {
    pub success: bool,
    pub deleted: u64,
}

/// Pipeline error rendered as `{ "error": ... }` with a matching status.
#[derive(Debug)]
pub struct ApiError(pub IngestionError);

impl From<IngestionError> for ApiError {
    fn from(err: IngestionError) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self(IngestionError::Validation(message.into()))
    }
}

pub fn status_for(err: &IngestionError) -> StatusCode {
    match err {
        IngestionError::Validation(_) | IngestionError::Sheet(_) => StatusCode::BAD_REQUEST,
        IngestionError::Unauthorized => StatusCode::UNAUTHORIZED,
        IngestionError::TenantNotFound(_) => StatusCode::NOT_FOUND,
        IngestionError::CrossTenantConflict { .. } | IngestionError::UniqueConflict(_) => StatusCode::CONFLICT,
        IngestionError::TransactionTimeout(_) | IngestionError::Transient(_) => StatusCode::SERVICE_UNAVAILABLE,
        IngestionError::Database(_) | IngestionError::Config(_) | IngestionError::Unexpected(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        let message = if status.is_server_error() && !self.0.is_retryable() {
            error!("Request failed: {}", self.0);
            "Internal server error".to_string()
        } else {
            warn!("Request rejected with {}: {}", status, self.0);
            self.0.to_string()
        };
        (status, Json(ErrorBody { error: message })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::domain::error::SheetError;

    #[test]
    fn maps_taxonomy_to_statuses() {
        let too_large = IngestionError::Sheet(SheetError::FileTooLarge { size: 11, limit: 10 });
        assert_eq!(status_for(&too_large), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(&IngestionError::Unauthorized), StatusCode::UNAUTHORIZED);
        assert_eq!(
            status_for(&IngestionError::CrossTenantConflict {
                identifiers: vec!["P1".into()]
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_for(&IngestionError::TransactionTimeout(Duration::from_secs(60))),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_for(&IngestionError::Database("disk I/O".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
