use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use thiserror::Error;

use crate::templates;

/// Failure of a call to the content API.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("API responded {status}: {}", .message.as_deref().unwrap_or("no message"))]
    Status {
        status: u16,
        message: Option<String>,
    },
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Malformed API response: {0}")]
    Decode(String),
}

impl ClientError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }

    /// Server-supplied message for the statuses the API documents with an
    /// `error` body (401, 404 and 500). Other failures carry no usable text.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            ClientError::Status {
                status: 401 | 404 | 500,
                message: Some(msg),
            } => Some(msg.as_str()),
            _ => None,
        }
    }

    /// Message shown to the user: the server's own text when it sent one,
    /// otherwise `fallback`.
    pub fn user_message(&self, fallback: &str) -> String {
        self.server_message().unwrap_or(fallback).to_string()
    }

    /// Free-form detail shown under a failed delete.
    pub fn detail(&self) -> String {
        match self {
            ClientError::Status {
                message: Some(msg), ..
            } => msg.clone(),
            other => other.to_string(),
        }
    }
}

/// Error surfaced by a view handler; rendered as the message page.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),
    #[error("Post not found")]
    PostNotFound,
    #[error("{message}")]
    Upstream {
        message: String,
        details: Option<String>,
    },
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn upstream(message: &str) -> Self {
        AppError::Upstream {
            message: message.to_string(),
            details: None,
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::PostNotFound => StatusCode::NOT_FOUND,
            AppError::Upstream { .. } => StatusCode::BAD_GATEWAY,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let html = match self {
            AppError::BadRequest(msg) => templates::render_message(msg, None),
            AppError::PostNotFound => templates::render_not_found(),
            AppError::Upstream { message, details } => {
                templates::render_message(message, details.as_deref())
            }
            AppError::Internal(_) => templates::render_message("Error interno", None),
        };

        HttpResponse::build(self.status_code())
            .content_type("text/html; charset=utf-8")
            .body(html)
    }
}
