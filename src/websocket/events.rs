use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use super::connection::Frame;
use crate::db::Question;
use crate::error::WebSocketError;

/// Everything the server pushes to live clients.
///
/// Wire form is `{"type": "...", "data": ...}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Event {
    /// A question was created. Carries the committed question, no replies.
    NewQuestion(Question),
    /// A reply, status change or vote was committed. Carries the full
    /// question with its replies in insertion order.
    UpdateQuestion(Question),
    /// Ephemeral client signal. The received JSON text is copied through
    /// byte for byte, never re-encoded.
    TypingEvent(Box<RawValue>),
}

impl Event {
    pub fn kind(&self) -> &'static str {
        match self {
            Event::NewQuestion(_) => "NEW_QUESTION",
            Event::UpdateQuestion(_) => "UPDATE_QUESTION",
            Event::TypingEvent(_) => "TYPING_EVENT",
        }
    }

    /// Serialize once for the whole fan-out.
    pub fn encode(&self) -> Result<Frame, WebSocketError> {
        serde_json::to_string(self)
            .map(Frame::from)
            .map_err(|e| WebSocketError::Encode(e.to_string()))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum InboundKind {
    TypingEvent,
}

#[derive(Debug, Deserialize)]
struct InboundEnvelope {
    #[serde(rename = "type")]
    kind: InboundKind,
}

/// Messages a client may send unprompted.
#[derive(Debug, Clone)]
pub enum ClientMessage {
    /// The whole received payload, kept as text for the echo.
    Typing(Box<RawValue>),
}

impl ClientMessage {
    /// Structural decode only: valid JSON with a known `type`.
    pub fn parse(text: &str) -> Result<Self, WebSocketError> {
        let envelope: InboundEnvelope = serde_json::from_str(text)
            .map_err(|e| WebSocketError::InvalidFormat(e.to_string()))?;

        let payload = RawValue::from_string(text.to_owned())
            .map_err(|e| WebSocketError::InvalidFormat(e.to_string()))?;

        match envelope.kind {
            InboundKind::TypingEvent => Ok(ClientMessage::Typing(payload)),
        }
    }

    pub fn into_event(self) -> Event {
        match self {
            ClientMessage::Typing(payload) => Event::TypingEvent(payload),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::QuestionStatus;
    use chrono::Utc;
    use serde_json::{json, Value};

    fn question() -> Question {
        Question {
            id: 1,
            content: "Hi".to_string(),
            status: QuestionStatus::Pending,
            created_at: Utc::now(),
            votes: 0,
            replies: vec![],
        }
    }

    #[test]
    fn test_new_question_wire_format() {
        let encoded = Event::NewQuestion(question()).encode().unwrap();
        let value: Value = serde_json::from_str(&encoded).unwrap();

        assert_eq!(value["type"], "NEW_QUESTION");
        assert_eq!(value["data"]["id"], 1);
        assert_eq!(value["data"]["content"], "Hi");
        assert_eq!(value["data"]["status"], "Pending");
        assert_eq!(value["data"]["votes"], 0);
        assert_eq!(value["data"]["replies"], json!([]));
    }

    #[test]
    fn test_event_kind_matches_tag() {
        let events = [
            Event::NewQuestion(question()),
            Event::UpdateQuestion(question()),
            ClientMessage::parse(r#"{"type":"TYPING_EVENT"}"#).unwrap().into_event(),
        ];
        for event in events {
            let value: Value = serde_json::from_str(&event.encode().unwrap()).unwrap();
            assert_eq!(value["type"], event.kind());
        }
    }

    #[test]
    fn test_typing_payload_echoed_verbatim() {
        let raw = r#"{"type":"TYPING_EVENT","zeta":1,"alpha":2,"big":123456789012345678901234567890}"#;
        let event = ClientMessage::parse(raw).unwrap().into_event();

        let encoded = event.encode().unwrap();
        assert_eq!(&*encoded, format!(r#"{{"type":"TYPING_EVENT","data":{}}}"#, raw));
    }

    #[test]
    fn test_typing_payload_keeps_whitespace() {
        let raw = "{ \"type\" : \"TYPING_EVENT\",\n  \"user\": \"guest\" }";
        let encoded = ClientMessage::parse(raw).unwrap().into_event().encode().unwrap();
        assert!(encoded.ends_with(&format!(r#""data":{}}}"#, raw)));
    }

    #[test]
    fn test_malformed_inbound_rejected() {
        assert!(matches!(ClientMessage::parse("not json"), Err(WebSocketError::InvalidFormat(_))));
        assert!(matches!(ClientMessage::parse(r#"{"type":"DELETE_ALL"}"#), Err(WebSocketError::InvalidFormat(_))));
        assert!(matches!(ClientMessage::parse(r#"{"kind":"TYPING_EVENT"}"#), Err(WebSocketError::InvalidFormat(_))));
        assert!(matches!(ClientMessage::parse("[1,2,3]"), Err(WebSocketError::InvalidFormat(_))));
    }

    #[test]
    fn test_event_deserializes_back() {
        let event = Event::UpdateQuestion(question());
        let encoded = event.encode().unwrap();
        let parsed: Event = serde_json::from_str(&encoded).unwrap();
        assert!(matches!(&parsed, Event::UpdateQuestion(q) if q.id == 1 && q.content == "Hi"));
        assert_eq!(parsed.encode().unwrap(), encoded);
    }
}
