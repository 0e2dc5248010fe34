// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The JSON envelope carried inside every frame.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

pub const PROTOCOL_VERSION: &str = "1.0";

pub const MESSAGE_TYPE_PRINT_JOB: &str = "print_job";
pub const MESSAGE_TYPE_PING: &str = "ping";
pub const MESSAGE_TYPE_STATUS: &str = "status";
pub const MESSAGE_TYPE_RESPONSE: &str = "response";

/// One message on the wire: a typed, timestamped JSON envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub version: String,
    pub message_type: String,
    pub timestamp: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default = "default_data")]
    pub data: Value,
}

fn default_data() -> Value {
    Value::Object(serde_json::Map::new())
}

impl Message {
    pub fn new(message_type: impl Into<String>, data: Value) -> Self {
        Self {
            version: PROTOCOL_VERSION.to_string(),
            message_type: message_type.into(),
            timestamp: Utc::now().to_rfc3339(),
            headers: HashMap::new(),
            data,
        }
    }

    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    /// Extracts `Bearer <token>` from the `Authorization` header, if present.
    pub fn bearer_token(&self) -> Option<&str> {
        let raw = self.headers.get("Authorization")?;
        raw.strip_prefix("Bearer ").map(str::trim)
    }

    pub fn to_json_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    pub fn from_json_bytes(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

/// Builds a `message_type=response` envelope with the shape §6 specifies.
pub fn response_message(
    status: &str,
    message: &str,
    job_id: Option<String>,
    queue_position: Option<u32>,
    error_code: Option<&str>,
) -> Message {
    let mut data = serde_json::Map::new();
    data.insert("status".into(), Value::String(status.to_string()));
    data.insert("message".into(), Value::String(message.to_string()));
    data.insert(
        "job_id".into(),
        job_id.map(Value::String).unwrap_or(Value::Null),
    );
    data.insert(
        "queue_position".into(),
        queue_position
            .map(|p| Value::Number(p.into()))
            .unwrap_or(Value::Null),
    );
    data.insert(
        "error_code".into(),
        error_code
            .map(|c| Value::String(c.to_string()))
            .unwrap_or(Value::Null),
    );
    data.insert(
        "timestamp".into(),
        Value::String(Utc::now().to_rfc3339()),
    );
    Message::new(MESSAGE_TYPE_RESPONSE, Value::Object(data))
}

pub fn success_response(
    message: &str,
    job_id: Option<String>,
    queue_position: Option<u32>,
) -> Message {
    response_message("success", message, job_id, queue_position, None)
}

pub fn error_response(message: &str, error_code: &str) -> Message {
    response_message("error", message, None, None, Some(error_code))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_token_strips_prefix() {
        let mut headers = HashMap::new();
        headers.insert("Authorization".to_string(), "Bearer abc.def.ghi".to_string());
        let msg = Message::new(MESSAGE_TYPE_PING, Value::Null).with_headers(headers);
        assert_eq!(msg.bearer_token(), Some("abc.def.ghi"));
    }

    #[test]
    fn missing_authorization_header_yields_none() {
        let msg = Message::new(MESSAGE_TYPE_PING, Value::Null);
        assert_eq!(msg.bearer_token(), None);
    }

    #[test]
    fn success_response_has_expected_shape() {
        let msg = success_response("ok", Some("job-1".into()), Some(1));
        assert_eq!(msg.message_type, MESSAGE_TYPE_RESPONSE);
        assert_eq!(msg.data["status"], "success");
        assert_eq!(msg.data["job_id"], "job-1");
        assert_eq!(msg.data["queue_position"], 1);
        assert!(msg.data["error_code"].is_null());
    }
}
