// Error types shared by the HTTP client, the de-duplicator and the services

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use thiserror::Error;

// Failure of a single backend request. Clone so every waiter of a
// de-duplicated request can receive its own copy of the same outcome.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    #[error("HTTP {status}: {}", .message.as_deref().unwrap_or("request failed"))]
    HttpError {
        status: u16,
        message: Option<String>,
    },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Decode error: {0}")]
    DecodeError(String),
}

impl ApiError {
    // Message suitable for showing to a user verbatim. None means the backend
    // said nothing useful and the caller should fall back to its own text.
    pub fn user_message(&self) -> Option<String> {
        match self {
            ApiError::HttpError { message, .. } => message.clone(),
            ApiError::ValidationError(message) => Some(message.clone()),
            ApiError::NetworkError(_) | ApiError::Timeout(_) => Some(self.to_string()),
            ApiError::DecodeError(_) => None,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::HttpError { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::DecodeError(err.to_string())
    }
}

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Initialization error: {0}")]
    InitError(String),
}

// Outcome handed to UI collaborators. Services never return Err or panic past
// this boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiResult<T> {
    Success(T),
    Failure(String),
}

impl<T> ApiResult<T> {
    // Converts an internal result, using `fallback` when the error carries no
    // message worth showing.
    pub fn from_result(result: Result<T, ApiError>, fallback: &str) -> Self {
        match result {
            Ok(data) => ApiResult::Success(data),
            Err(err) => {
                tracing::warn!(error = %err, "{}", fallback);
                ApiResult::Failure(err.user_message().unwrap_or_else(|| fallback.to_string()))
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ApiResult::Success(_))
    }

    pub fn data(&self) -> Option<&T> {
        match self {
            ApiResult::Success(data) => Some(data),
            ApiResult::Failure(_) => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            ApiResult::Success(_) => None,
            ApiResult::Failure(message) => Some(message),
        }
    }

    pub fn into_result(self) -> Result<T, String> {
        match self {
            ApiResult::Success(data) => Ok(data),
            ApiResult::Failure(message) => Err(message),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ApiResult<U> {
        match self {
            ApiResult::Success(data) => ApiResult::Success(f(data)),
            ApiResult::Failure(message) => ApiResult::Failure(message),
        }
    }
}

// Serializes as {"success": true, "data": ...} or {"success": false, "error": "..."}
impl<T: Serialize> Serialize for ApiResult<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("ApiResult", 2)?;
        match self {
            ApiResult::Success(data) => {
                state.serialize_field("success", &true)?;
                state.serialize_field("data", data)?;
            }
            ApiResult::Failure(message) => {
                state.serialize_field("success", &false)?;
                state.serialize_field("error", message)?;
            }
        }
        state.end()
    }
}
