use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("API client error: {0}")]
    ApiClient(#[from] api_client::error::ApiError),
}

impl EngineError {
    /// The text to show a user for this failure.
    pub fn reason(&self) -> String {
        match self {
            EngineError::ApiClient(e) => e.reason(),
        }
    }
}
