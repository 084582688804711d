//! Mapping of tool endpoint HTTP failures onto [`ServiceError`].

use reqwest::StatusCode;
use serde_json::Value;

use super::{ErrorContext, ServiceError};

/// Map a non-success response from a capability endpoint.
///
/// Tool endpoints report errors as `{"error": {"code", "message"}}`,
/// `{"error": "..."}` or `{"message": "..."}`; anything else is treated as
/// plain text.
pub fn map_http_error(status: StatusCode, body: &str, context: &mut ErrorContext) -> ServiceError {
    context.status_code = Some(status.as_u16());

    let message = match serde_json::from_str::<Value>(body) {
        Ok(json) => extract_message(&json, context).unwrap_or_else(|| status.to_string()),
        Err(_) if body.is_empty() => status.to_string(),
        Err(_) => format!("{}: {}", status, crate::util::truncate_string(body, 100)),
    };

    let error = match classify_http_error(status) {
        "authentication" => ServiceError::authentication(message),
        "authorization" => ServiceError::authorization(message),
        "rate_limit" => ServiceError::rate_limit(message),
        "validation" => ServiceError::validation(message),
        "not_found" => ServiceError::not_found(message),
        "timeout" => ServiceError::timeout(message),
        "server" => ServiceError::external_service(message),
        _ => ServiceError::tool(message),
    };

    error.with_context(context.clone())
}

fn extract_message(json: &Value, context: &mut ErrorContext) -> Option<String> {
    match json.get("error") {
        Some(Value::Object(error)) => {
            if let Some(code) = error.get("code").and_then(Value::as_str) {
                context.error_code = Some(code.to_string());
            }
            error
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
        }
        Some(Value::String(message)) => Some(message.clone()),
        _ => json
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string),
    }
}

/// Classify an HTTP status into an error category
pub fn classify_http_error(status: StatusCode) -> &'static str {
    match status.as_u16() {
        400 | 422 => "validation",
        401 => "authentication",
        403 => "authorization",
        404 => "not_found",
        408 => "timeout",
        429 => "rate_limit",
        500..=599 => "server",
        _ => "unknown",
    }
}

/// Whether a status code signals a transient failure
pub fn is_retryable_status(status: StatusCode) -> bool {
    matches!(status.as_u16(), 408 | 429 | 500 | 502 | 503 | 504)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structured_error_body() {
        let mut context = ErrorContext::for_service("web_search");
        let body = r#"{"error": {"code": "quota", "message": "quota exceeded"}}"#;
        let err = map_http_error(StatusCode::TOO_MANY_REQUESTS, body, &mut context);

        assert!(matches!(err.root(), ServiceError::RateLimit(m) if m == "quota exceeded"));
        assert_eq!(err.status_code(), Some(429));
        assert_eq!(err.context().and_then(|c| c.error_code.as_deref()), Some("quota"));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_plain_text_body() {
        let mut context = ErrorContext::for_service("storage");
        let err = map_http_error(StatusCode::UNAUTHORIZED, "denied", &mut context);
        assert!(matches!(err.root(), ServiceError::Authentication(_)));
        assert!(err.is_permanent());
    }

    #[test]
    fn test_server_errors_are_retryable() {
        let mut context = ErrorContext::new();
        let err = map_http_error(StatusCode::BAD_GATEWAY, "", &mut context);
        assert!(err.is_retryable());
        assert!(is_retryable_status(StatusCode::SERVICE_UNAVAILABLE));
        assert!(!is_retryable_status(StatusCode::BAD_REQUEST));
    }
}
