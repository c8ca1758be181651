//! Payload decoding: bytes → UTF-8 → JSON.

use coopdesk_core::ApiError;
use serde_json::Value;

use crate::subject::Subject;

/// A decoded message delivered to a subscriber callback.
#[derive(Debug, Clone, PartialEq)]
pub struct RealtimeMessage {
    pub subject: Subject,
    pub payload: Value,
}

pub fn decode_message(bytes: &[u8]) -> Result<Value, ApiError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| ApiError::decode(format!("realtime payload is not UTF-8: {e}")))?;
    serde_json::from_str(text)
        .map_err(|e| ApiError::decode(format!("realtime payload is not JSON: {e}")))
}
