// ABOUTME: Observation frame wire types plus the frames the runtime synthesizes itself
// ABOUTME: Agent frames stay opaque; only type, action_id and result fields are inspected

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const TYPE_START: &str = "start";
pub const TYPE_STREAM: &str = "stream";
pub const TYPE_ERROR: &str = "error";
pub const TYPE_RESULT: &str = "result";
pub const TYPE_END: &str = "end";

/// Exit code reported on `end` when the agent never produced a usable one.
pub const EXIT_CODE_UNKNOWN: i64 = -1;

/// The subset of an agent-pushed frame the runtime inspects.
///
/// Frames are forwarded to subscribers byte-identical to what the agent
/// posted; this envelope exists only so the runtime can route on `type` and
/// `action_id` and synthesize `end` from `result`. Fields the runtime does
/// not understand are ignored rather than rejected.
#[derive(Debug, Deserialize)]
pub struct ObservationEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub action_id: Option<String>,
    #[serde(default)]
    exit_code: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

impl ObservationEnvelope {
    pub fn parse(raw: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(raw)
    }

    pub fn is_result(&self) -> bool {
        self.kind == TYPE_RESULT
    }

    /// `exit_code` as an integer, tolerating absent or ill-typed values.
    pub fn exit_code_or_unknown(&self) -> i64 {
        self.exit_code
            .as_ref()
            .and_then(Value::as_i64)
            .unwrap_or(EXIT_CODE_UNKNOWN)
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error.as_ref().and_then(Value::as_str)
    }
}

#[derive(Serialize)]
struct StartFrame<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    action_id: &'a str,
}

#[derive(Serialize)]
struct ErrorFrame<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    action_id: &'a str,
    error: &'a str,
}

#[derive(Serialize)]
struct EndFrame<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    action_id: &'a str,
    exit_code: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
}

fn encode<T: Serialize>(frame: &T) -> Bytes {
    // Frames are flat structs of strings and integers; Value round-trips them
    // without a fallible serialization path.
    match serde_json::to_value(frame) {
        Ok(value) => Bytes::from(value.to_string()),
        Err(_) => Bytes::new(),
    }
}

/// The synthesized frame bracketing the start of an action.
pub fn start_frame(action_id: &str) -> Bytes {
    encode(&StartFrame {
        kind: TYPE_START,
        action_id,
    })
}

/// The synthesized frame reporting a runtime-side dispatch failure.
pub fn error_frame(action_id: &str, error: &str) -> Bytes {
    encode(&ErrorFrame {
        kind: TYPE_ERROR,
        action_id,
        error,
    })
}

/// The synthesized frame terminating an action. Always the last frame a
/// subscriber sees for an `action_id`.
pub fn end_frame(action_id: &str, exit_code: i64, error: Option<&str>) -> Bytes {
    encode(&EndFrame {
        kind: TYPE_END,
        action_id,
        exit_code,
        error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_agent_stream_frame() {
        let raw = br#"{"type":"stream","action_id":"a1","stream":"stdout","line":"hi"}"#;
        let envelope = ObservationEnvelope::parse(raw).unwrap();

        assert_eq!(envelope.kind, TYPE_STREAM);
        assert_eq!(envelope.action_id.as_deref(), Some("a1"));
        assert!(!envelope.is_result());
    }

    #[test]
    fn result_exit_code_defaults_when_absent_or_ill_typed() {
        let missing = ObservationEnvelope::parse(br#"{"type":"result","action_id":"a1"}"#).unwrap();
        assert_eq!(missing.exit_code_or_unknown(), EXIT_CODE_UNKNOWN);

        let ill_typed =
            ObservationEnvelope::parse(br#"{"type":"result","action_id":"a1","exit_code":"zero"}"#)
                .unwrap();
        assert_eq!(ill_typed.exit_code_or_unknown(), EXIT_CODE_UNKNOWN);

        let ok = ObservationEnvelope::parse(br#"{"type":"result","action_id":"a1","exit_code":0}"#)
            .unwrap();
        assert_eq!(ok.exit_code_or_unknown(), 0);
    }

    #[test]
    fn missing_action_id_is_parseable() {
        let envelope = ObservationEnvelope::parse(br#"{"type":"stream"}"#).unwrap();
        assert!(envelope.action_id.is_none());
    }

    #[test]
    fn malformed_json_is_rejected() {
        assert!(ObservationEnvelope::parse(b"not json").is_err());
    }

    #[test]
    fn synthesized_frames_carry_flat_fields() {
        let start: serde_json::Value = serde_json::from_slice(&start_frame("a1")).unwrap();
        assert_eq!(start["type"], "start");
        assert_eq!(start["action_id"], "a1");

        let end: serde_json::Value =
            serde_json::from_slice(&end_frame("a1", 0, None)).unwrap();
        assert_eq!(end["type"], "end");
        assert_eq!(end["exit_code"], 0);
        assert!(end.get("error").is_none());

        let failed: serde_json::Value =
            serde_json::from_slice(&end_frame("a1", -1, Some("boom"))).unwrap();
        assert_eq!(failed["exit_code"], -1);
        assert_eq!(failed["error"], "boom");
    }
}
