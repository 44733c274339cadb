use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::session::SessionId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageDirection {
    /// WhatsApp contact to the CRM inbox.
    Inbound,
    /// CRM agent to the WhatsApp contact.
    Outbound,
}

impl MessageDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inbound => "inbound",
            Self::Outbound => "outbound",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "inbound" => Some(Self::Inbound),
            "outbound" => Some(Self::Outbound),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMessageMapping {
    pub session_id: SessionId,
    pub whatsapp_message_id: String,
    pub from_phone: String,
    pub to_phone: String,
    pub message_type: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub from_me: bool,
}

impl NewMessageMapping {
    pub fn direction(&self) -> MessageDirection {
        if self.from_me {
            MessageDirection::Outbound
        } else {
            MessageDirection::Inbound
        }
    }

    /// The phone on the far side of the bridge: the recipient for our own messages, the sender
    /// otherwise.
    pub fn remote_phone(&self) -> &str {
        if self.from_me {
            &self.to_phone
        } else {
            &self.from_phone
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageMapping {
    pub session_id: SessionId,
    pub whatsapp_message_id: String,
    pub direction: MessageDirection,
    pub remote_phone: String,
    pub message_type: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub crm_message_id: Option<i64>,
    pub crm_conversation_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MessageMapping {
    pub fn from_new(new: NewMessageMapping, now: DateTime<Utc>) -> Self {
        let direction = new.direction();
        let remote_phone = new.remote_phone().to_string();
        Self {
            session_id: new.session_id,
            whatsapp_message_id: new.whatsapp_message_id,
            direction,
            remote_phone,
            message_type: new.message_type,
            content: new.content,
            timestamp: new.timestamp,
            crm_message_id: None,
            crm_conversation_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_linked(&self) -> bool {
        self.crm_message_id.is_some() && self.crm_conversation_id.is_some()
    }
}
