use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use log::error;
use thiserror::Error;

use crate::runtime::RuntimeError;

/// Failures decided before a response body starts streaming.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    /// Unknown container on endpoints that answer with a client error
    /// rather than 404.
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Runtime(#[from] RuntimeError),
}

impl ApiError {
    /// Map a lookup failure, answering 404 for unknown containers.
    pub fn lookup(err: RuntimeError) -> Self {
        if err.is_not_found() {
            Self::NotFound(err.to_string())
        } else {
            Self::Runtime(err)
        }
    }

    /// Map a lookup failure, answering 400 for unknown containers.
    pub fn lookup_as_bad_request(err: RuntimeError) -> Self {
        if err.is_not_found() {
            Self::BadRequest(err.to_string())
        } else {
            Self::Runtime(err)
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Runtime(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }
        (status, self.to_string()).into_response()
    }
}
