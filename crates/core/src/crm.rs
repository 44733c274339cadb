use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::errors::{Classify, ErrorKind};
use crate::transport::IncomingMessage;

#[derive(Debug, Error)]
pub enum CrmError {
    #[error("crm {resource} `{id}` not found")]
    NotFound { resource: &'static str, id: i64 },
    #[error("crm request failed: {0}")]
    Request(String),
    #[error("crm request timed out: {0}")]
    Timeout(String),
    #[error("crm response could not be decoded: {0}")]
    Decode(String),
    #[error("crm integration is disabled")]
    Disabled,
}

impl Classify for CrmError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Request(_) | Self::Decode(_) => ErrorKind::TransportFailure,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Disabled => ErrorKind::InvalidState,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrmConversation {
    pub id: i64,
    pub contact_id: Option<i64>,
    pub inbox_id: Option<i64>,
    pub status: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrmContact {
    pub id: i64,
    pub name: Option<String>,
    pub phone_number: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrmMessageRef {
    pub conversation_id: i64,
    pub message_id: i64,
}

/// Read-only lookups used to find who a CRM conversation is with.
#[async_trait]
pub trait CrmDirectory: Send + Sync {
    async fn conversation(&self, conversation_id: i64) -> Result<CrmConversation, CrmError>;
    async fn contact(&self, contact_id: i64) -> Result<CrmContact, CrmError>;
    /// Phone of whoever sent the latest contact message in the conversation, if any.
    async fn conversation_sender_phone(
        &self,
        conversation_id: i64,
    ) -> Result<Option<String>, CrmError>;
}

#[async_trait]
pub trait CrmInbox: Send + Sync {
    /// Posts a WhatsApp message into the inbox, creating contact and conversation as needed.
    async fn deliver_incoming(
        &self,
        message: &IncomingMessage,
        source_id: &str,
    ) -> Result<CrmMessageRef, CrmError>;
}
