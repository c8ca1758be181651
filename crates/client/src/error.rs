//! Error normalization at the HTTP boundary.
//!
//! The back office returns error bodies in a few shapes
//! (`{"message": ..}`, `{"error": ..}`, `{"errors": [..]}` or plain text).
//! All of them collapse into one [`ApiError`] with a readable message.

use coopdesk_core::ApiError;
use reqwest::StatusCode;
use serde_json::Value;

const MAX_TEXT_MESSAGE: usize = 300;

/// Translate a non-2xx response into an [`ApiError`].
pub fn normalize_response(status: StatusCode, body: &str) -> ApiError {
    let message = extract_message(body).unwrap_or_else(|| fallback_message(status));
    ApiError::from_status(status.as_u16(), message)
}

/// Translate a transport failure into an [`ApiError`].
pub fn normalize_transport(err: &reqwest::Error) -> ApiError {
    if err.is_timeout() {
        ApiError::transport("request timed out")
    } else if err.is_connect() {
        ApiError::transport("unable to reach the server")
    } else if err.is_decode() {
        ApiError::decode(format!("unexpected response body: {err}"))
    } else {
        ApiError::transport(format!("network error: {err}"))
    }
}

fn extract_message(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }

    match serde_json::from_str::<Value>(trimmed) {
        Ok(json) => message_from_json(&json),
        Err(_) => Some(truncate(trimmed)),
    }
}

fn message_from_json(json: &Value) -> Option<String> {
    if let Some(s) = json.as_str() {
        return non_empty(s);
    }

    for field in ["message", "error", "detail"] {
        match json.get(field) {
            Some(Value::String(s)) => {
                if let Some(m) = non_empty(s) {
                    return Some(m);
                }
            }
            // `{"error": {"message": ".."}}`
            Some(nested @ Value::Object(_)) => {
                if let Some(m) = message_from_json(nested) {
                    return Some(m);
                }
            }
            _ => {}
        }
    }

    json.get("errors")
        .and_then(Value::as_array)
        .and_then(|errors| errors.first())
        .and_then(message_from_json)
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| truncate(s))
}

fn truncate(s: &str) -> String {
    if s.chars().count() <= MAX_TEXT_MESSAGE {
        return s.to_string();
    }
    let mut out: String = s.chars().take(MAX_TEXT_MESSAGE).collect();
    out.push('…');
    out
}

fn fallback_message(status: StatusCode) -> String {
    match status.canonical_reason() {
        Some(reason) => format!("request failed: {} {reason}", status.as_u16()),
        None => format!("request failed with status {}", status.as_u16()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coopdesk_core::ErrorKind;

    #[test]
    fn message_field_wins() {
        let err = normalize_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            r#"{"error": "validation_error", "message": "Name is required"}"#,
        );
        assert_eq!(err.kind(), ErrorKind::Client);
        assert_eq!(err.message(), "Name is required");
        assert_eq!(err.status(), Some(422));
    }

    #[test]
    fn falls_back_to_error_then_errors_array() {
        let err = normalize_response(StatusCode::FORBIDDEN, r#"{"error": "forbidden"}"#);
        assert_eq!(err.message(), "forbidden");

        let err = normalize_response(
            StatusCode::BAD_REQUEST,
            r#"{"errors": [{"message": "amount must be positive"}, {"message": "other"}]}"#,
        );
        assert_eq!(err.message(), "amount must be positive");

        let err = normalize_response(StatusCode::BAD_REQUEST, r#"{"error": {"message": "nested"}}"#);
        assert_eq!(err.message(), "nested");
    }

    #[test]
    fn plain_text_body_is_used_verbatim() {
        let err = normalize_response(StatusCode::BAD_GATEWAY, "upstream unavailable\n");
        assert_eq!(err.kind(), ErrorKind::Server);
        assert_eq!(err.message(), "upstream unavailable");
    }

    #[test]
    fn empty_body_uses_status_reason() {
        let err = normalize_response(StatusCode::INTERNAL_SERVER_ERROR, "");
        assert_eq!(err.message(), "request failed: 500 Internal Server Error");

        let err = normalize_response(StatusCode::NOT_FOUND, "{}");
        assert_eq!(err.message(), "request failed: 404 Not Found");
    }

    #[test]
    fn long_text_is_truncated() {
        let body = "x".repeat(1000);
        let err = normalize_response(StatusCode::INTERNAL_SERVER_ERROR, &body);
        assert_eq!(err.message().chars().count(), MAX_TEXT_MESSAGE + 1);
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn every_failure_has_a_bounded_readable_message(status in 400u16..600, body in ".{0,600}") {
                let status = StatusCode::from_u16(status).unwrap();
                let err = normalize_response(status, &body);

                prop_assert!(!err.message().trim().is_empty());
                prop_assert!(err.message().chars().count() <= MAX_TEXT_MESSAGE + 1);
                prop_assert_eq!(err.kind() == ErrorKind::Client, status.is_client_error());
                prop_assert_eq!(err.is_retryable(), status.is_server_error());
            }
        }
    }
}
