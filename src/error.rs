use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Invalid request: {0}")]
    InvalidRequestShape(String),
    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),
    #[error("Invalid image data: {0}")]
    InvalidImageData(String),
    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),
    #[error("Empty model response: {0}")]
    EmptyModelResponse(String),
    #[error("Upstream rate limited: {0}")]
    UpstreamRateLimited(String),
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),
    #[error("Upstream rejected credential: {0}")]
    UpstreamAuthRejected(String),
    #[error("Upstream error: {0}")]
    UpstreamError(String),
    #[error("Internal error: {0}")]
    InternalError(String),
}

pub type Result<T> = std::result::Result<T, GatewayError>;

/// Body returned to callers on every failure.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub detail: String,
}

impl GatewayError {
    /// Short, stable name of the error category, used in server-side logs.
    pub fn category(&self) -> &'static str {
        match self {
            GatewayError::ConfigError(_) => "ConfigError",
            GatewayError::InvalidRequestShape(_) => "InvalidRequestShape",
            GatewayError::UnsupportedMediaType(_) => "UnsupportedMediaType",
            GatewayError::InvalidImageData(_) => "InvalidImageData",
            GatewayError::PayloadTooLarge(_) => "PayloadTooLarge",
            GatewayError::EmptyModelResponse(_) => "EmptyModelResponse",
            GatewayError::UpstreamRateLimited(_) => "UpstreamRateLimited",
            GatewayError::UpstreamUnavailable(_) => "UpstreamUnavailable",
            GatewayError::UpstreamAuthRejected(_) => "UpstreamAuthRejected",
            GatewayError::UpstreamError(_) => "UpstreamGenericError",
            GatewayError::InternalError(_) => "Unclassified",
        }
    }

    /// Message shown to the caller. Locally detected validation failures carry
    /// their own detail; anything that came from the upstream or from inside
    /// the process is reduced to a category description.
    pub fn public_message(&self) -> String {
        match self {
            GatewayError::InvalidRequestShape(msg)
            | GatewayError::UnsupportedMediaType(msg)
            | GatewayError::PayloadTooLarge(msg) => msg.clone(),
            GatewayError::InvalidImageData(_) => "Invalid image data provided".to_string(),
            GatewayError::EmptyModelResponse(_) => "No response from AI model".to_string(),
            GatewayError::UpstreamRateLimited(_) => {
                "Rate limit exceeded. Please try again later.".to_string()
            }
            GatewayError::UpstreamUnavailable(_) => {
                "Service temporarily unavailable. Please try again later.".to_string()
            }
            GatewayError::UpstreamAuthRejected(_) => "Invalid API key provided".to_string(),
            GatewayError::UpstreamError(_) => "The AI service returned an error".to_string(),
            GatewayError::ConfigError(_) | GatewayError::InternalError(_) => {
                "An unexpected error occurred".to_string()
            }
        }
    }
}

impl ResponseError for GatewayError {
    fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::InvalidRequestShape(_) => StatusCode::UNPROCESSABLE_ENTITY,
            GatewayError::UnsupportedMediaType(_) | GatewayError::InvalidImageData(_) => {
                StatusCode::BAD_REQUEST
            }
            GatewayError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            GatewayError::UpstreamRateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::UpstreamUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::UpstreamAuthRejected(_) => StatusCode::UNAUTHORIZED,
            GatewayError::EmptyModelResponse(_)
            | GatewayError::UpstreamError(_)
            | GatewayError::ConfigError(_)
            | GatewayError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            log::error!("❌ [{}] {}", self.category(), self);
        } else {
            log::warn!("⚠️  [{}] {}", self.category(), self);
        }

        HttpResponse::build(status).json(ErrorBody {
            detail: self.public_message(),
        })
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            GatewayError::UpstreamUnavailable(err.to_string())
        } else if err.is_decode() {
            GatewayError::UpstreamError(format!("unreadable response body: {}", err))
        } else {
            GatewayError::UpstreamError(err.to_string())
        }
    }
}

impl From<base64::DecodeError> for GatewayError {
    fn from(err: base64::DecodeError) -> Self {
        GatewayError::InvalidImageData(err.to_string())
    }
}
