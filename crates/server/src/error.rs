use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use leadflow_core::errors::{ApplicationError, InterfaceError};
use serde::Serialize;
use tracing::warn;

/// JSON error body returned by every route.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub correlation_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}

#[derive(Debug)]
pub struct ApiError(pub InterfaceError);

impl ApiError {
    pub fn new(error: impl Into<ApplicationError>, correlation_id: impl Into<String>) -> Self {
        Self(error.into().into_interface(correlation_id))
    }

    pub fn not_found(what: impl Into<String>, correlation_id: impl Into<String>) -> Self {
        Self::new(ApplicationError::NotFound(what.into()), correlation_id)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let error = self.0;
        let (status, detail, retry_after_secs) = match &error {
            InterfaceError::BadRequest { message, .. } => {
                (StatusCode::BAD_REQUEST, Some(message.clone()), None)
            }
            InterfaceError::NotFound { message, .. } => {
                (StatusCode::NOT_FOUND, Some(message.clone()), None)
            }
            InterfaceError::TooManyRequests { retry_after_secs, .. } => {
                (StatusCode::TOO_MANY_REQUESTS, None, Some(*retry_after_secs))
            }
            InterfaceError::ServiceUnavailable { .. } => {
                (StatusCode::SERVICE_UNAVAILABLE, None, None)
            }
            InterfaceError::Internal { .. } => (StatusCode::INTERNAL_SERVER_ERROR, None, None),
        };

        if status.is_server_error() {
            warn!(
                event_name = "http.request_failed",
                correlation_id = error.correlation_id(),
                status = status.as_u16(),
                error = %error,
                "request failed"
            );
        }

        let body = ErrorBody {
            error: error.user_message().to_string(),
            detail,
            correlation_id: error.correlation_id().to_string(),
            retry_after_secs,
        };
        let mut response = (status, Json(body)).into_response();
        if let Some(seconds) = retry_after_secs {
            if let Ok(value) = HeaderValue::from_str(&seconds.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use leadflow_core::errors::ApplicationError;
    use leadflow_core::store::StoreError;

    use super::ApiError;

    #[test]
    fn interface_errors_map_to_status_codes() {
        struct Case {
            error: ApplicationError,
            status: StatusCode,
        }

        let cases = vec![
            Case {
                error: ApplicationError::NotFound("session".to_string()),
                status: StatusCode::NOT_FOUND,
            },
            Case {
                error: ApplicationError::RateLimited { retry_after_secs: 30 },
                status: StatusCode::TOO_MANY_REQUESTS,
            },
            Case {
                error: StoreError::Transport("refused".to_string()).into(),
                status: StatusCode::SERVICE_UNAVAILABLE,
            },
            Case {
                error: ApplicationError::Configuration("bad".to_string()),
                status: StatusCode::INTERNAL_SERVER_ERROR,
            },
        ];

        for case in cases {
            let response = ApiError::new(case.error, "req-1").into_response();
            assert_eq!(response.status(), case.status);
        }
    }

    #[test]
    fn rate_limited_responses_carry_retry_after() {
        let response =
            ApiError::new(ApplicationError::RateLimited { retry_after_secs: 42 }, "req-2")
                .into_response();
        assert_eq!(
            response.headers().get("retry-after").and_then(|value| value.to_str().ok()),
            Some("42")
        );
    }
}
