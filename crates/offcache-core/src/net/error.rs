use thiserror::Error;

#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Request to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("Request to {url} timed out")]
    Timeout { url: String },

    #[error("Resource not found: {url}")]
    NotFound { url: String },

    #[error("Server error {status} for {url}: {body}")]
    ServerError { url: String, status: u16, body: String },

    #[error("Bad response status {status} for {url}: {body}")]
    BadStatus { url: String, status: u16, body: String },

    #[error("Invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Invalid HTTP method: {0}")]
    InvalidMethod(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl NetworkError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    pub fn from_status(url: &str, status: u16, body: &str) -> Self {
        let url = url.to_string();
        match status {
            404 | 410 => NetworkError::NotFound { url },
            500..=599 => NetworkError::ServerError {
                url,
                status,
                body: Self::truncate_body(body),
            },
            _ => NetworkError::BadStatus {
                url,
                status,
                body: Self::truncate_body(body),
            },
        }
    }

    pub fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            NetworkError::Timeout {
                url: url.to_string(),
            }
        } else {
            NetworkError::Transport {
                url: url.to_string(),
                message: err.to_string(),
            }
        }
    }

    /// URL the error relates to, if any.
    pub fn url(&self) -> Option<&str> {
        match self {
            NetworkError::Transport { url, .. }
            | NetworkError::Timeout { url }
            | NetworkError::NotFound { url }
            | NetworkError::ServerError { url, .. }
            | NetworkError::BadStatus { url, .. }
            | NetworkError::InvalidUrl { url, .. } => Some(url),
            NetworkError::InvalidMethod(_) => None,
        }
    }
}
