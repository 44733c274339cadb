//! Chatwoot webhook payloads and their normalised form.
//!
//! Chatwoot delivers message fields either at the top level of the event or nested under
//! `message`, and encodes `message_type` as a string or as its integer discriminant. Everything
//! here is lenient: unknown or malformed optional fields decode to `None` instead of rejecting
//! the delivery.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

pub const EVENT_MESSAGE_CREATED: &str = "message_created";

const IGNORED_EVENTS: &[&str] = &[
    "conversation_status_changed",
    "message_updated",
    "conversation_typing_on",
    "conversation_typing_off",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Incoming,
    Outgoing,
    Activity,
    Template,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Incoming => "incoming",
            Self::Outgoing => "outgoing",
            Self::Activity => "activity",
            Self::Template => "template",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "incoming" => Some(Self::Incoming),
            "outgoing" => Some(Self::Outgoing),
            "activity" => Some(Self::Activity),
            "template" => Some(Self::Template),
            _ => None,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Incoming),
            1 => Some(Self::Outgoing),
            2 => Some(Self::Activity),
            3 => Some(Self::Template),
            _ => None,
        }
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(raw) => Self::parse(raw),
            Value::Number(number) => number.as_i64().and_then(Self::from_code),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WebhookEvent {
    #[serde(default)]
    pub event: String,
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: Option<i64>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub message_type: Option<Value>,
    #[serde(default)]
    pub private: Option<bool>,
    #[serde(default)]
    pub source_id: Option<String>,
    #[serde(default)]
    pub content_attributes: Option<Value>,
    #[serde(default)]
    pub message: Option<WebhookMessage>,
    #[serde(default)]
    pub sender: Option<WebhookSender>,
    #[serde(default)]
    pub conversation: Option<WebhookConversation>,
    #[serde(default)]
    pub account: Option<WebhookAccount>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WebhookMessage {
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: Option<i64>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub message_type: Option<Value>,
    #[serde(default)]
    pub private: Option<bool>,
    #[serde(default)]
    pub source_id: Option<String>,
    #[serde(default)]
    pub content_attributes: Option<Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WebhookSender {
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: Option<i64>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WebhookConversation {
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: Option<i64>,
    #[serde(default, deserialize_with = "lenient_id")]
    pub contact_id: Option<i64>,
    #[serde(default)]
    pub contact_inbox: Option<WebhookContactInbox>,
    #[serde(default)]
    pub meta: Option<WebhookConversationMeta>,
    #[serde(default)]
    pub messages: Vec<WebhookConversationMessage>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WebhookContactInbox {
    #[serde(default, deserialize_with = "lenient_id")]
    pub contact_id: Option<i64>,
    #[serde(default)]
    pub source_id: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WebhookConversationMeta {
    #[serde(default)]
    pub sender: Option<WebhookSender>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WebhookConversationMessage {
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: Option<i64>,
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WebhookAccount {
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: Option<i64>,
}

/// Single flat view of a webhook delivery used by recipient resolution and filtering.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NormalizedMessage {
    pub event: String,
    pub content: String,
    pub message_type: MessageKind,
    pub is_private: bool,
    pub source_id: Option<String>,
    pub crm_message_id: Option<i64>,
    pub conversation_id: Option<i64>,
    pub contact_id: Option<i64>,
    pub contact_phone: Option<String>,
    pub sender_phone: Option<String>,
    pub account_id: Option<i64>,
}

impl WebhookEvent {
    /// Events that never carry anything to relay.
    pub fn is_ignorable(&self) -> bool {
        IGNORED_EVENTS.contains(&self.event.trim())
    }

    pub fn normalize(&self) -> NormalizedMessage {
        let nested = self.message.as_ref();
        let conversation = self.conversation.as_ref();

        let message_type = nested
            .and_then(|message| message.message_type.as_ref())
            .or(self.message_type.as_ref())
            .and_then(MessageKind::from_value)
            .unwrap_or(MessageKind::Outgoing);

        let is_private = nested.and_then(|message| message.private).or(self.private).unwrap_or(false);

        let source_id = non_empty(nested.and_then(|message| message.source_id.as_deref()))
            .or_else(|| non_empty(self.source_id.as_deref()));

        let contact_id = conversation.and_then(|conversation| {
            conversation.contact_id.or_else(|| {
                conversation.contact_inbox.as_ref().and_then(|inbox| inbox.contact_id)
            })
        });

        let contact_phone = conversation
            .and_then(|conversation| conversation.meta.as_ref())
            .and_then(|meta| meta.sender.as_ref())
            .and_then(|sender| non_empty(sender.phone_number.as_deref()));

        NormalizedMessage {
            event: self.event.trim().to_string(),
            content: self.extract_content(),
            message_type,
            is_private,
            source_id,
            crm_message_id: nested.and_then(|message| message.id).or(self.id),
            conversation_id: conversation.and_then(|conversation| conversation.id),
            contact_id,
            contact_phone,
            sender_phone: self
                .sender
                .as_ref()
                .and_then(|sender| non_empty(sender.phone_number.as_deref())),
            account_id: self.account.as_ref().and_then(|account| account.id),
        }
    }

    /// Structured message content, then `content_attributes.text`, then the newest entry of the
    /// conversation's message list.
    fn extract_content(&self) -> String {
        let nested = self.message.as_ref();

        let structured = non_blank(nested.and_then(|message| message.content.as_deref()))
            .or_else(|| non_blank(self.content.as_deref()));
        if let Some(content) = structured {
            return content;
        }

        let attribute_text = nested
            .and_then(|message| attribute_text(message.content_attributes.as_ref()))
            .or_else(|| attribute_text(self.content_attributes.as_ref()));
        if let Some(content) = attribute_text {
            return content;
        }

        self.conversation
            .as_ref()
            .and_then(|conversation| conversation.messages.last())
            .and_then(|message| non_blank(message.content.as_deref()))
            .unwrap_or_default()
    }
}

fn attribute_text(attributes: Option<&Value>) -> Option<String> {
    attributes.and_then(|value| value.get("text")).and_then(Value::as_str).and_then(|text| {
        non_blank(Some(text))
    })
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|value| !value.is_empty()).map(str::to_string)
}

/// Message text is kept verbatim; only whitespace-only text counts as absent.
fn non_blank(value: Option<&str>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty()).map(str::to_string)
}

fn lenient_id<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(number)) => number.as_i64(),
        Some(Value::String(raw)) => raw.trim().parse::<i64>().ok(),
        _ => None,
    })
}
