use axum::http::StatusCode;
use serde::Serialize;
use thiserror::Error;

/// Failures surfaced by the relay, either as an HTTP response (before the
/// stream opens) or as the final `error` event of an open stream.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RelayError {
    #[error("only POST is supported")]
    MethodNotAllowed,
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("media type '{0}' is not accepted")]
    UnsupportedMediaType(String),
    #[error("image exceeds the {limit}-byte limit")]
    PayloadTooLarge { limit: usize },
    #[error("server configuration error")]
    Configuration { details: String },
    #[error("the image could not be processed")]
    Unsupported { details: String },
    #[error("generation quota exceeded")]
    Quota { details: String },
    #[error("generation service unavailable")]
    Network { details: String },
    #[error("generation service timed out")]
    Timeout { details: String },
    #[error("failed to process the image")]
    Unknown { details: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub error: ErrorPayload,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorPayload {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl RelayError {
    pub fn status(&self) -> StatusCode {
        match self {
            RelayError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            RelayError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            RelayError::UnsupportedMediaType(_) | RelayError::Unsupported { .. } => {
                StatusCode::UNSUPPORTED_MEDIA_TYPE
            }
            RelayError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            RelayError::Configuration { .. } => StatusCode::SERVICE_UNAVAILABLE,
            RelayError::Quota { .. } => StatusCode::TOO_MANY_REQUESTS,
            RelayError::Network { .. } => StatusCode::BAD_GATEWAY,
            RelayError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            RelayError::Unknown { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            RelayError::MethodNotAllowed => "method_not_allowed",
            RelayError::InvalidRequest(_) => "invalid_request",
            RelayError::UnsupportedMediaType(_) => "unsupported_media_type",
            RelayError::PayloadTooLarge { .. } => "payload_too_large",
            RelayError::Configuration { .. } => "configuration_error",
            RelayError::Unsupported { .. } => "unsupported_input",
            RelayError::Quota { .. } => "quota_exceeded",
            RelayError::Network { .. } => "upstream_unavailable",
            RelayError::Timeout { .. } => "timeout",
            RelayError::Unknown { .. } => "internal_error",
        }
    }

    /// Upstream description; never sent to clients in production.
    pub fn details(&self) -> Option<&str> {
        match self {
            RelayError::Configuration { details }
            | RelayError::Unsupported { details }
            | RelayError::Quota { details }
            | RelayError::Network { details }
            | RelayError::Timeout { details }
            | RelayError::Unknown { details } => Some(details),
            _ => None,
        }
    }

    pub fn body(&self, production: bool) -> ErrorBody {
        ErrorBody {
            error: ErrorPayload {
                code: self.code(),
                message: self.to_string(),
                details: if production {
                    None
                } else {
                    self.details().map(str::to_string)
                },
            },
        }
    }

    /// Rebuilds an error from the `code` and `details` of a received body.
    pub fn from_code(code: &str, message: &str, details: Option<String>) -> Self {
        let details = details.unwrap_or_else(|| message.to_string());
        match code {
            "method_not_allowed" => RelayError::MethodNotAllowed,
            "invalid_request" => RelayError::InvalidRequest(message.to_string()),
            "unsupported_media_type" => RelayError::UnsupportedMediaType(message.to_string()),
            "payload_too_large" => RelayError::PayloadTooLarge { limit: 0 },
            "configuration_error" => RelayError::Configuration { details },
            "unsupported_input" => RelayError::Unsupported { details },
            "quota_exceeded" => RelayError::Quota { details },
            "upstream_unavailable" => RelayError::Network { details },
            "timeout" => RelayError::Timeout { details },
            _ => RelayError::Unknown { details },
        }
    }

    /// Best-effort mapping of an upstream failure onto the taxonomy. Transport
    /// flags of the HTTP client win over the text of the description.
    pub fn classify(err: &anyhow::Error) -> Self {
        let details = format!("{:#}", err);

        if let Some(transport) = err
            .chain()
            .find_map(|cause| cause.downcast_ref::<reqwest::Error>())
        {
            if transport.is_timeout() {
                return RelayError::Timeout { details };
            }
            if transport.is_connect() {
                return RelayError::Network { details };
            }
        }

        let lower = details.to_lowercase();
        let has = |needles: &[&str]| needles.iter().any(|needle| lower.contains(needle));

        if details.contains("API_KEY") || has(&["api key", "unauthorized", "permission_denied"]) {
            RelayError::Configuration { details }
        } else if has(&["quota", "rate limit", "resource_exhausted", "too many requests", "(429"]) {
            RelayError::Quota { details }
        } else if has(&["timed out", "timeout", "deadline"]) {
            RelayError::Timeout { details }
        } else if has(&["failed to reach", "connection", "network", "unavailable", "(502", "(503"]) {
            RelayError::Network { details }
        } else if has(&["image", "mime"]) {
            RelayError::Unsupported { details }
        } else {
            RelayError::Unknown { details }
        }
    }
}
