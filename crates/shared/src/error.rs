use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Unauthorized,
    Forbidden,
    NotFound,
    Validation,
    RateLimited,
    /// HTTP 451: the entity is embargoed for this client.
    UnavailableForLegalReasons,
    Internal,
    Network,
}

impl ErrorCode {
    pub fn from_status(status_code: u16) -> Self {
        match status_code {
            0 => Self::Network,
            400 | 409 | 413 | 422 => Self::Validation,
            401 => Self::Unauthorized,
            403 => Self::Forbidden,
            404 => Self::NotFound,
            429 => Self::RateLimited,
            451 => Self::UnavailableForLegalReasons,
            _ => Self::Internal,
        }
    }
}

/// Error reported by the chat server or by the transport underneath it.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{code:?} ({status_code}): {message}")]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default)]
    pub status_code: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_error_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            status_code: 0,
            server_error_id: None,
            url: None,
        }
    }

    pub fn from_status(status_code: u16, message: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::from_status(status_code),
            message: message.into(),
            status_code,
            server_error_id: None,
            url: None,
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Network, message)
    }

    pub fn with_server_error_id(mut self, id: impl Into<String>) -> Self {
        self.server_error_id = Some(id.into());
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// A 401 outside of the login endpoint means the session token is no
    /// longer accepted.
    pub fn is_session_invalid(&self) -> bool {
        self.status_code == 401
            && self
                .url
                .as_deref()
                .is_some_and(|url| !url.contains("/login"))
    }

    pub fn is_embargoed(&self) -> bool {
        self.status_code == 451
    }
}

/// Error body returned by the server on non-2xx responses.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerErrorBody {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub status_code: Option<u16>,
}
