use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The server answered with a non-2xx status and an `{error, success}` body.
    #[error("server answered {status}: {message}")]
    Api { status: u16, message: String },

    #[error("invalid server URL '{0}'")]
    InvalidUrl(String),
}

impl ClientError {
    /// A 4xx answer will not change by asking again.
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::Api { status, .. } if (400..500).contains(status))
    }
}
