use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Failed to send the HTTP request: {0}")]
    Request(#[from] reqwest::Error),

    /// The backend answered with an error. `reason` is the human-readable text
    /// from its `error`/`message` field, or a status-derived fallback.
    #[error("{reason}")]
    Backend { status: u16, reason: String },

    #[error("Failed to deserialize the API response: {0}")]
    Deserialization(String),

    #[error("Invalid base URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Price stream error: {0}")]
    Stream(String),
}

impl ApiError {
    /// The text to show a user for this failure.
    pub fn reason(&self) -> String {
        match self {
            ApiError::Backend { reason, .. } => reason.clone(),
            other => other.to_string(),
        }
    }

    /// Fallback reason used when an error body carries neither `error` nor `message`.
    pub fn status_reason(status: u16) -> String {
        format!("HTTP error! status: {}", status)
    }
}
