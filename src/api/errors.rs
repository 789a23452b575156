use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use thiserror::Error;

pub const MODEL_UNAVAILABLE: &str = "Model not initialized. Restart the service.";

/// JSON body of every failed request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorBody {
    pub status: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Route-boundary error: client input, missing model, or anything else.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{}", MODEL_UNAVAILABLE)]
    ModelUnavailable,

    #[error("{message}: {details}")]
    Internal { message: String, details: String },
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn internal(message: impl Into<String>, cause: impl Display) -> Self {
        ApiError::Internal {
            message: message.into(),
            details: cause.to_string(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::ModelUnavailable | ApiError::Internal { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn to_body(&self) -> ErrorBody {
        let (message, details) = match self {
            ApiError::BadRequest(msg) => (msg.clone(), None),
            ApiError::ModelUnavailable => (MODEL_UNAVAILABLE.to_string(), None),
            ApiError::Internal { message, details } => (message.clone(), Some(details.clone())),
        };
        ErrorBody {
            status: "error".to_string(),
            message,
            details,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            log::error!("{}", self);
        } else {
            log::warn!("{}", self);
        }
        (status, Json(self.to_body())).into_response()
    }
}
