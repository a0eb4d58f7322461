use axum::{http::StatusCode, response::IntoResponse, Json};
use thiserror::Error;

/// Failure of a single page retrieval, as classified by the resilient fetcher.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// Rate-limit or bot-challenge status (403 / 429 / 503).
    #[error("blocked with status {status}")]
    Blocked { status: u16 },

    /// Any other 4xx. Not retried.
    #[error("client error {status} for url: {url}")]
    ClientError { status: u16, url: String },

    /// Redirect loop or otherwise missing resource. Not retried.
    #[error("not found for url: {url}")]
    NotFound { url: String },

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("gave up on {url} after {attempts} attempts: {last}")]
    Exhausted {
        url: String,
        attempts: u32,
        last: Box<FetchError>,
    },
}

impl FetchError {
    /// Retrying the same request could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Blocked { .. } | FetchError::Transport(_) => true,
            FetchError::Exhausted { last, .. } => last.is_retryable(),
            FetchError::ClientError { .. } | FetchError::NotFound { .. } => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid selector: {0}")]
    Selector(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::Fetch(FetchError::ClientError { .. } | FetchError::NotFound { .. }) => {
                StatusCode::NOT_FOUND
            }
            AppError::Fetch(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        let body = serde_json::json!({ "detail": self.to_string() });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_resources_are_not_retryable() {
        assert!(FetchError::Blocked { status: 429 }.is_retryable());
        assert!(FetchError::Transport("reset".into()).is_retryable());
        assert!(!FetchError::NotFound { url: "u".into() }.is_retryable());
        assert!(!FetchError::ClientError { status: 404, url: "u".into() }.is_retryable());
        let exhausted = FetchError::Exhausted {
            url: "u".into(),
            attempts: 3,
            last: Box::new(FetchError::Blocked { status: 503 }),
        };
        assert!(exhausted.is_retryable());
    }

    #[test]
    fn missing_resources_map_to_404() {
        let err = AppError::Fetch(FetchError::ClientError { status: 410, url: "u".into() });
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::NotFound("x".into()).status_code(), StatusCode::NOT_FOUND);

        let exhausted = AppError::Fetch(FetchError::Exhausted {
            url: "u".into(),
            attempts: 3,
            last: Box::new(FetchError::Blocked { status: 503 }),
        });
        assert_eq!(exhausted.status_code(), StatusCode::BAD_GATEWAY);
    }
}
