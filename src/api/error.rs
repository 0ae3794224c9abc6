use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    Json,
};
use serde::Serialize;
use taskboard_core::StoreError;

use crate::views;

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub error: String,
}

/// Error answered with a JSON body, used by the action and API routes.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<StoreError> for ApiError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound(_) => Self::not_found("Todo not found"),
            other => Self::internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = %self.status, error = %self.message, "request failed");
        }
        (self.status, Json(ApiErrorBody { error: self.message })).into_response()
    }
}

/// Error answered with the rendered error page, used by the HTML routes.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct PageError {
    status: StatusCode,
    message: String,
}

impl PageError {
    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<StoreError> for PageError {
    fn from(value: StoreError) -> Self {
        Self::internal(value.to_string())
    }
}

impl From<tera::Error> for PageError {
    fn from(value: tera::Error) -> Self {
        Self::internal(format!("template error: {value}"))
    }
}

impl IntoResponse for PageError {
    fn into_response(self) -> Response {
        tracing::error!(status = %self.status, error = %self.message, "page request failed");
        match views::render_error_page(&self.message) {
            Ok(html) => (self.status, Html(html)).into_response(),
            Err(e) => {
                tracing::error!(error = %e, "failed to render error page");
                (self.status, self.message).into_response()
            }
        }
    }
}
