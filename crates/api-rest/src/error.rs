//! Mapping of workflow errors onto HTTP responses.
//!
//! Every failure is returned as `{"error": {"code", "message", "details"}}`. Store and
//! rendering failures are logged and answered with a generic 500 body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use lims_core::LimsError;
use serde::Serialize;
use serde_json::{json, Value};

/// Errors a handler can return.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Missing or malformed actor headers.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    #[error(transparent)]
    Lims(#[from] LimsError),
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
    #[schema(value_type = Object)]
    pub details: Value,
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            Self::Lims(err) => match err {
                LimsError::PermissionDenied { .. } => StatusCode::FORBIDDEN,
                LimsError::InvalidTransition { .. }
                | LimsError::InvalidArgument(_)
                | LimsError::PreconditionFailed(_) => StatusCode::BAD_REQUEST,
                LimsError::NotFound { .. } => StatusCode::NOT_FOUND,
                LimsError::Conflict { .. } => StatusCode::CONFLICT,
                LimsError::Store(_) | LimsError::Rendering(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::Unauthenticated(_) => "unauthenticated",
            Self::Lims(err) => match err {
                LimsError::PermissionDenied { .. } => "permission_denied",
                LimsError::InvalidTransition { .. } => "invalid_transition",
                LimsError::InvalidArgument(_) => "invalid_argument",
                LimsError::PreconditionFailed(_) => "precondition_failed",
                LimsError::NotFound { .. } => "not_found",
                LimsError::Conflict { .. } => "conflict",
                LimsError::Store(_) | LimsError::Rendering(_) => "internal_error",
            },
        }
    }

    fn details(&self) -> Value {
        match self {
            Self::Lims(LimsError::PermissionDenied { role, action }) => {
                json!({ "role": role, "action": action })
            }
            Self::Lims(LimsError::InvalidTransition {
                entity,
                current,
                attempted,
            }) => json!({ "entity": entity, "current": current, "attempted": attempted }),
            Self::Lims(LimsError::NotFound { entity, id }) => {
                json!({ "entity": entity, "id": id })
            }
            _ => json!({}),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = if status.is_server_error() {
            tracing::error!("request failed: {:?}", self);
            "Internal error".to_string()
        } else {
            self.to_string()
        };

        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code(),
                message,
                details: self.details(),
            },
        };
        (status, Json(body)).into_response()
    }
}
