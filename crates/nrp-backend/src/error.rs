// SPDX-License-Identifier: Apache-2.0

//! The REST-facing error type (spec §7): each variant owns one row of the
//! error taxonomy and knows its own status code and `{message,type,data}`
//! body shape.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use nrp_core::{ApiErrorBody, LifecycleError};
use nrp_registry::RegistryError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Client(String),
    #[error("simulation `{0}` not found")]
    NotFound(String),
    #[error("permission denied")]
    Permission,
    #[error("{0}")]
    StateTransition(String),
    #[error("Another simulation is already running")]
    Conflict,
    #[error("{0}")]
    General(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Client(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Permission => StatusCode::UNAUTHORIZED,
            ApiError::StateTransition(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict => StatusCode::CONFLICT,
            ApiError::General(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ApiError::Client(_) => "ClientError",
            ApiError::NotFound(_) => "NotFound",
            ApiError::Permission => "PermissionError",
            ApiError::StateTransition(_) => "StateTransitionError",
            ApiError::Conflict => "ClientError",
            ApiError::General(_) => "GeneralError",
        }
    }
}

impl From<RegistryError> for ApiError {
    fn from(error: RegistryError) -> Self {
        match error {
            RegistryError::AnotherRunning => ApiError::Conflict,
            RegistryError::NotFound(id) => ApiError::NotFound(id.to_string()),
            RegistryError::MissingField(field) => {
                ApiError::Client(format!("missing required field `{field}`"))
            }
        }
    }
}

impl From<LifecycleError> for ApiError {
    fn from(error: LifecycleError) -> Self {
        match error {
            LifecycleError::InvalidTransition { .. } => {
                ApiError::StateTransition("state transition is invalid".to_string())
            }
            LifecycleError::HookFailed(hook_error) => {
                tracing::error!(error = %hook_error, "lifecycle hook failed");
                ApiError::General(hook_error.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ApiErrorBody { message: self.to_string(), kind: self.kind().to_string(), data: None };
        (status, Json(body)).into_response()
    }
}
