use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::UserId;

/// Inbound event names the server pushes over the realtime channel.
pub mod event {
    pub const NOTIFICATION: &str = "notification";
    pub const DATA_UPDATE: &str = "dataUpdate";
    /// Outbound: associates the connection with a user identity.
    pub const JOIN: &str = "join";
}

/// Wire envelope for every frame on the realtime channel, both directions:
/// `{ "event": "<name>", "data": <payload> }`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl Frame {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    /// The outbound `join` frame. Its payload is the bare numeric user id.
    pub fn join(user_id: UserId) -> Self {
        Self::new(event::JOIN, Value::from(user_id.as_i64()))
    }

    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_text(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Payload of an inbound `dataUpdate` event. The server may attach more
/// fields; only the subject tag matters here, and its absence is a no-op.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct DataUpdate {
    #[serde(rename = "subjectType", default)]
    pub subject_type: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn join_frame_has_bare_numeric_payload() {
        let frame = Frame::join(UserId::new(42));
        let text = frame.to_text().unwrap();
        assert_eq!(text, r#"{"event":"join","data":42}"#);
    }

    #[test]
    fn frame_roundtrip() {
        let frame = Frame::new(event::NOTIFICATION, json!({ "message": "hi" }));
        let parsed = Frame::from_text(&frame.to_text().unwrap()).unwrap();
        assert_eq!(parsed, frame);
    }

    #[test]
    fn frame_data_defaults_to_null() {
        let frame = Frame::from_text(r#"{"event":"dataUpdate"}"#).unwrap();
        assert_eq!(frame.event, event::DATA_UPDATE);
        assert!(frame.data.is_null());
    }

    #[test]
    fn data_update_parses_subject() {
        let upd: DataUpdate =
            serde_json::from_value(json!({ "subjectType": "projects", "extra": 1 })).unwrap();
        assert_eq!(upd.subject_type.as_deref(), Some("projects"));
    }

    #[test]
    fn data_update_subject_may_be_absent() {
        let upd: DataUpdate = serde_json::from_value(json!({})).unwrap();
        assert!(upd.subject_type.is_none());
    }
}
