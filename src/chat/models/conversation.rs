use chrono::Local;
use serde::{Deserialize, Deserializer, Serialize};

/// Author tag for messages typed by the user.
pub const USER_AUTHOR: &str = "user";

/// Author tag for failures surfaced inline in the conversation.
pub const ERROR_AUTHOR: &str = "error";

/// Maximum number of characters a message body may carry once committed.
pub const DISPLAY_CAP: usize = 4096;

const TRUNCATION_MARKER: &str = "...";

/// Timestamp format used in conversation files.
pub const TIMESTAMP_FORMAT: &str = "%d/%m/%y %H:%M:%S";

/// A single persisted chat message.
///
/// `fecha_hora` is optional on read: old conversation folders contain messages
/// written without it, and those stay as-is when the file is rewritten.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub author: String,
    pub text: String,
    #[serde(rename = "fecha_hora", default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl StoredMessage {
    /// Create a message stamped with the current local time.
    pub fn new(author: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            text: text.into(),
            timestamp: Some(local_timestamp()),
        }
    }
}

/// One persisted chat thread: an optional title plus its ordered messages.
///
/// Serialized as `{ "titulo": ..., "mensajes": [...] }`. Files written before
/// the title wrapper existed are a bare array of messages and load with
/// `title = None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Conversation {
    #[serde(rename = "titulo")]
    pub title: Option<String>,
    #[serde(rename = "mensajes")]
    pub messages: Vec<StoredMessage>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ConversationDocument {
    Wrapped {
        #[serde(rename = "titulo", default)]
        title: Option<String>,
        #[serde(rename = "mensajes", default)]
        messages: Vec<StoredMessage>,
    },
    Legacy(Vec<StoredMessage>),
}

impl<'de> Deserialize<'de> for Conversation {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match ConversationDocument::deserialize(deserializer)? {
            ConversationDocument::Wrapped { title, messages } => Self { title, messages },
            ConversationDocument::Legacy(messages) => Self {
                title: None,
                messages,
            },
        })
    }
}

impl Conversation {
    /// Append a message. Conversations are append-only; list order is
    /// conversation order.
    pub fn push(&mut self, message: StoredMessage) {
        self.messages.push(message);
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Cap a message body at [`DISPLAY_CAP`] characters, marking the cut.
pub fn truncate_for_display(text: &str) -> String {
    let mut capped: String = text.chars().take(DISPLAY_CAP).collect();
    if capped.len() < text.len() {
        capped.push_str(TRUNCATION_MARKER);
    }
    capped
}

/// Current local time in the conversation-file format.
pub fn local_timestamp() -> String {
    Local::now().format(TIMESTAMP_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Conversation {
        Conversation {
            title: Some("Saludos".to_string()),
            messages: vec![
                StoredMessage {
                    author: USER_AUTHOR.to_string(),
                    text: "Hola".to_string(),
                    timestamp: Some("01/02/24 10:00:00".to_string()),
                },
                StoredMessage {
                    author: "DeepSeek".to_string(),
                    text: "Hola, ¿en qué puedo ayudarte?".to_string(),
                    timestamp: Some("01/02/24 10:00:05".to_string()),
                },
            ],
        }
    }

    #[test]
    fn test_round_trip_preserves_title_and_messages() {
        let conversation = sample();
        let json = serde_json::to_string_pretty(&conversation).unwrap();
        let loaded: Conversation = serde_json::from_str(&json).unwrap();
        assert_eq!(loaded, conversation);
    }

    #[test]
    fn test_wire_format_uses_spanish_keys() {
        let json = serde_json::to_value(sample()).unwrap();
        assert!(json.get("titulo").is_some());
        assert!(json.get("mensajes").is_some());
        assert!(json["mensajes"][0].get("fecha_hora").is_some());
        assert!(json["mensajes"][0].get("author").is_some());
    }

    #[test]
    fn test_legacy_bare_array_loads_without_title() {
        let legacy = r#"[
            {"author": "user", "text": "Hola", "fecha_hora": "01/02/24 10:00:00"},
            {"author": "DeepSeek", "text": "Hola"}
        ]"#;
        let loaded: Conversation = serde_json::from_str(legacy).unwrap();
        assert_eq!(loaded.title, None);
        assert_eq!(loaded.message_count(), 2);
        assert_eq!(loaded.messages[0].text, "Hola");
        assert_eq!(loaded.messages[1].timestamp, None);
    }

    #[test]
    fn test_legacy_and_wrapped_forms_agree() {
        let messages = r#"[{"author": "user", "text": "Hola", "fecha_hora": "01/02/24 10:00:00"}]"#;
        let wrapped = format!(r#"{{"titulo": null, "mensajes": {messages}}}"#);
        let from_legacy: Conversation = serde_json::from_str(messages).unwrap();
        let from_wrapped: Conversation = serde_json::from_str(&wrapped).unwrap();
        assert_eq!(from_legacy, from_wrapped);
    }

    #[test]
    fn test_missing_timestamp_stays_absent_on_rewrite() {
        let legacy = r#"[{"author": "user", "text": "Hola"}]"#;
        let loaded: Conversation = serde_json::from_str(legacy).unwrap();
        let json = serde_json::to_value(&loaded).unwrap();
        assert!(json["mensajes"][0].get("fecha_hora").is_none());
    }

    #[test]
    fn test_truncate_leaves_short_text_alone() {
        assert_eq!(truncate_for_display("hola"), "hola");
        let exact: String = "a".repeat(DISPLAY_CAP);
        assert_eq!(truncate_for_display(&exact), exact);
    }

    #[test]
    fn test_truncate_caps_and_marks_long_text() {
        let long: String = "a".repeat(DISPLAY_CAP + 100);
        let capped = truncate_for_display(&long);
        assert_eq!(capped.chars().count(), DISPLAY_CAP + TRUNCATION_MARKER.len());
        assert!(capped.ends_with("..."));
    }

    #[test]
    fn test_truncate_counts_characters_not_bytes() {
        let long: String = "ñ".repeat(DISPLAY_CAP + 1);
        let capped = truncate_for_display(&long);
        assert_eq!(capped.chars().count(), DISPLAY_CAP + TRUNCATION_MARKER.len());
    }
}
