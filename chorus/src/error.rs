use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChorusError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Too many requests, please try again later.")]
    RateLimited { retry_after_secs: u64 },

    #[error("Request cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ChorusError {
    pub fn status(&self) -> StatusCode {
        match self {
            ChorusError::Validation(_) => StatusCode::BAD_REQUEST,
            ChorusError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ChorusError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ChorusError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
            ChorusError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ChorusError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ChorusError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ChorusError::Validation(msg) => msg.clone(),
            ChorusError::Configuration(msg) => msg.clone(),
            ChorusError::RateLimited { .. } => self.to_string(),
            ChorusError::Cancelled => self.to_string(),
            ChorusError::Io(e) => {
                tracing::error!(error = %e, "IO failure while handling request");
                "Internal server error".to_string()
            }
            ChorusError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal failure while handling request");
                "Internal server error".to_string()
            }
        };

        let mut response = (status, Json(json!({ "error": message }))).into_response();

        if let ChorusError::RateLimited { retry_after_secs } = self {
            if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }

        response
    }
}

pub type Result<T> = std::result::Result<T, ChorusError>;

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_validation_maps_to_bad_request() {
        let response = ChorusError::Validation("Prompt is required".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json, json!({ "error": "Prompt is required" }));
    }

    #[tokio::test]
    async fn test_configuration_maps_to_internal_error() {
        let response =
            ChorusError::Configuration("AI client is not initialized".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body_json(response).await;
        assert_eq!(json["error"], "AI client is not initialized");
    }

    #[tokio::test]
    async fn test_internal_details_are_not_leaked() {
        let response = ChorusError::Internal("join error at task 3".to_string()).into_response();
        let json = body_json(response).await;
        assert_eq!(json["error"], "Internal server error");
    }

    #[tokio::test]
    async fn test_rate_limited_sets_retry_after() {
        let response = ChorusError::RateLimited {
            retry_after_secs: 42,
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "42");
    }
}
