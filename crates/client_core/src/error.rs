use shared::error::ApiError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("team not found or deleted")]
    TeamNotFound,
    /// Raised by channel search before any request is issued.
    #[error("no team id")]
    NoCurrentTeam,
    #[error("not logged in: missing current user")]
    NotLoggedIn,
    #[error("invalid server url: {0}")]
    InvalidServerUrl(String),
}

impl SyncError {
    pub fn api(&self) -> Option<&ApiError> {
        match self {
            Self::Api(err) => Some(err),
            _ => None,
        }
    }
}

pub type SyncResult<T> = std::result::Result<T, SyncError>;
