use crate::audio::{Base64EncodedAudioBytes, Base64EncodedImage};
use crate::session::SessionConfig;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Value};

/// A frame sent from the client to the bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    Config { config: SessionConfig },
    Audio { data: Base64EncodedAudioBytes },
    Image { data: Base64EncodedImage },
    Text { data: String },
}

impl OutboundMessage {
    pub fn config(config: SessionConfig) -> Self {
        OutboundMessage::Config { config }
    }

    pub fn audio(data: impl Into<Base64EncodedAudioBytes>) -> Self {
        OutboundMessage::Audio { data: data.into() }
    }

    pub fn image(data: impl Into<Base64EncodedImage>) -> Self {
        OutboundMessage::Image { data: data.into() }
    }

    pub fn text(data: impl Into<String>) -> Self {
        OutboundMessage::Text { data: data.into() }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            OutboundMessage::Config { .. } => "config",
            OutboundMessage::Audio { .. } => "audio",
            OutboundMessage::Image { .. } => "image",
            OutboundMessage::Text { .. } => "text",
        }
    }
}

/// A frame received from the bridge.
///
/// Frames are dispatched on their `type` field. Anything that is not one of
/// the known kinds, or a known kind missing its payload, is kept verbatim as
/// [`InboundMessage::Other`] so callers can log it.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    Audio { data: Base64EncodedAudioBytes },
    Text { text: String },
    TurnComplete,
    Error { message: String },
    Other(Value),
}

impl InboundMessage {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_str(text)?;
        Ok(Self::from_value(value))
    }

    pub fn from_value(value: Value) -> Self {
        let field = |name: &str| value.get(name).and_then(Value::as_str).map(str::to_owned);
        let kind = field("type");
        match kind.as_deref() {
            Some("audio") => match field("data") {
                Some(data) => InboundMessage::Audio { data },
                None => InboundMessage::Other(value),
            },
            Some("text") => match field("text") {
                Some(text) => InboundMessage::Text { text },
                None => InboundMessage::Other(value),
            },
            Some("turn_complete") => InboundMessage::TurnComplete,
            Some("error") => InboundMessage::Error {
                message: field("message").unwrap_or_default(),
            },
            _ => InboundMessage::Other(value),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            InboundMessage::Audio { data } => json!({ "type": "audio", "data": data }),
            InboundMessage::Text { text } => json!({ "type": "text", "text": text }),
            InboundMessage::TurnComplete => json!({ "type": "turn_complete" }),
            InboundMessage::Error { message } => json!({ "type": "error", "message": message }),
            InboundMessage::Other(value) => value.clone(),
        }
    }

    pub fn kind(&self) -> &str {
        match self {
            InboundMessage::Audio { .. } => "audio",
            InboundMessage::Text { .. } => "text",
            InboundMessage::TurnComplete => "turn_complete",
            InboundMessage::Error { .. } => "error",
            InboundMessage::Other(value) => value.get("type").and_then(Value::as_str).unwrap_or("unknown"),
        }
    }
}

impl Serialize for InboundMessage {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for InboundMessage {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Value::deserialize(deserializer).map(InboundMessage::from_value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outbound_frames_match_wire_shape() {
        let audio = serde_json::to_value(OutboundMessage::audio("AAAA")).unwrap();
        assert_eq!(audio, json!({ "type": "audio", "data": "AAAA" }));

        let image = serde_json::to_value(OutboundMessage::image("/9j/")).unwrap();
        assert_eq!(image, json!({ "type": "image", "data": "/9j/" }));

        let text = serde_json::to_value(OutboundMessage::text("hello")).unwrap();
        assert_eq!(text, json!({ "type": "text", "data": "hello" }));

        let config = serde_json::to_value(OutboundMessage::config(SessionConfig::new())).unwrap();
        assert_eq!(config["type"], "config");
        assert_eq!(config["config"]["voice"], "Aoede");
    }

    #[test]
    fn test_inbound_known_kinds() {
        assert_eq!(
            InboundMessage::from_json(r#"{"type":"audio","data":"AQI="}"#).unwrap(),
            InboundMessage::Audio { data: "AQI=".to_string() }
        );
        assert_eq!(
            InboundMessage::from_json(r#"{"type":"text","text":"hi there"}"#).unwrap(),
            InboundMessage::Text { text: "hi there".to_string() }
        );
        assert_eq!(
            InboundMessage::from_json(r#"{"type":"turn_complete","data":true}"#).unwrap(),
            InboundMessage::TurnComplete
        );
        assert_eq!(
            InboundMessage::from_json(r#"{"type":"error","message":"First WebSocket message must be configuration."}"#).unwrap(),
            InboundMessage::Error {
                message: "First WebSocket message must be configuration.".to_string()
            }
        );
    }

    #[test]
    fn test_inbound_unknown_kinds_are_passed_through() {
        let raw = json!({ "type": "tool_result", "execution_id": "42", "result": { "ok": true } });
        let message = InboundMessage::from_value(raw.clone());
        assert_eq!(message, InboundMessage::Other(raw.clone()));
        assert_eq!(message.kind(), "tool_result");
        assert_eq!(message.to_value(), raw);

        let untyped = InboundMessage::from_json(r#"{"hello":"world"}"#).unwrap();
        assert_eq!(untyped.kind(), "unknown");
    }

    #[test]
    fn test_inbound_known_kind_without_payload_is_passed_through() {
        let message = InboundMessage::from_json(r#"{"type":"audio"}"#).unwrap();
        assert!(matches!(message, InboundMessage::Other(_)));
    }

    #[test]
    fn test_inbound_rejects_non_json() {
        assert!(InboundMessage::from_json("not json").is_err());
    }
}
