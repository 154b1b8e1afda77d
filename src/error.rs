use std::fmt::Debug;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde_json::{json, Value};
use tracing::instrument;

pub const CODE_INVALID_STATE: i32 = 100;
pub const CODE_VALIDATION: i32 = 101;
pub const CODE_NOT_FOUND: i32 = 102;
pub const CODE_CONFLICT: i32 = 103;
pub const CODE_INTERNAL: i32 = 1;
pub const CODE_STORAGE: i32 = 2;

#[derive(Debug)]
pub struct Error {
    pub code: i32,
    pub message: String,
    pub details: Option<Value>,
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Error {
        storage_error(err)
    }
}

pub fn invalid_state_error(message: &str) -> Error {
    Error {
        code: CODE_INVALID_STATE,
        message: message.to_string(),
        details: None,
    }
}

pub fn validation_error(message: &str) -> Error {
    Error {
        code: CODE_VALIDATION,
        message: message.to_string(),
        details: None,
    }
}

pub fn not_found_error(message: &str) -> Error {
    Error {
        code: CODE_NOT_FOUND,
        message: message.to_string(),
        details: None,
    }
}

pub fn conflict_error(message: &str) -> Error {
    Error {
        code: CODE_CONFLICT,
        message: message.to_string(),
        details: None,
    }
}

pub fn internal_error(message: &str) -> Error {
    Error {
        code: CODE_INTERNAL,
        message: message.to_string(),
        details: None,
    }
}

#[instrument]
pub fn storage_error<T: Debug>(err: T) -> Error {
    Error {
        code: CODE_STORAGE,
        message: "storage error".to_string(),
        details: None,
    }
}

impl Error {
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    fn kind(&self) -> &'static str {
        match self.code {
            CODE_INVALID_STATE => "invalid_state",
            CODE_VALIDATION => "validation_failed",
            CODE_NOT_FOUND => "not_found",
            CODE_CONFLICT => "conflict",
            CODE_STORAGE => "storage_error",
            _ => "internal_error",
        }
    }

    fn http_status(&self) -> StatusCode {
        match self.code {
            CODE_INVALID_STATE | CODE_VALIDATION => StatusCode::BAD_REQUEST,
            CODE_NOT_FOUND => StatusCode::NOT_FOUND,
            CODE_CONFLICT => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let mut body = json!({
            "success": false,
            "error": self.kind(),
            "message": self.message,
            "timestamp": Utc::now().to_rfc3339(),
        });

        if let Some(ref details) = self.details {
            body["details"] = details.clone();
        }

        (self.http_status(), Json(body)).into_response()
    }
}
