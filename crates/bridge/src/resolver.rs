use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use zapwoot_core::crm::CrmDirectory;
use zapwoot_core::domain::webhook::{MessageKind, NormalizedMessage};
use zapwoot_core::errors::{Classify, ErrorKind};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecipientSource {
    Payload,
    Contact,
    Conversation,
    ConversationSender,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Recipient {
    pub phone: String,
    pub source: RecipientSource,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("could not resolve recipient")]
pub struct ResolutionFailure {
    pub conversation_id: Option<i64>,
}

impl Classify for ResolutionFailure {
    fn kind(&self) -> ErrorKind {
        ErrorKind::ResolutionFailure
    }
}

/// Finds the WhatsApp phone a CRM message is meant for.
///
/// The payload is tried first, then the contact named in it, then the conversation's contact, and
/// finally whoever last wrote in the conversation. Lookup failures only move on to the next step.
pub struct IdentityResolver {
    directory: Arc<dyn CrmDirectory>,
}

impl IdentityResolver {
    pub fn new(directory: Arc<dyn CrmDirectory>) -> Self {
        Self { directory }
    }

    pub async fn resolve(&self, message: &NormalizedMessage) -> Result<Recipient, ResolutionFailure> {
        let from_payload = match message.message_type {
            MessageKind::Incoming => message.sender_phone.as_deref(),
            _ => message.contact_phone.as_deref(),
        };
        if let Some(phone) = from_payload.and_then(normalize_phone) {
            return Ok(Recipient { phone, source: RecipientSource::Payload });
        }

        if let Some(contact_id) = message.contact_id {
            if let Some(phone) = self.contact_phone(contact_id).await {
                return Ok(Recipient { phone, source: RecipientSource::Contact });
            }
        }

        let Some(conversation_id) = message.conversation_id else {
            return Err(ResolutionFailure { conversation_id: None });
        };

        match self.directory.conversation(conversation_id).await {
            Ok(conversation) => {
                let contact_id =
                    conversation.contact_id.filter(|id| Some(*id) != message.contact_id);
                if let Some(contact_id) = contact_id {
                    if let Some(phone) = self.contact_phone(contact_id).await {
                        return Ok(Recipient { phone, source: RecipientSource::Conversation });
                    }
                }
            }
            Err(error) => debug!(
                event_name = "bridge.resolve.conversation_lookup_failed",
                conversation_id,
                error = %error,
                "conversation lookup failed"
            ),
        }

        match self.directory.conversation_sender_phone(conversation_id).await {
            Ok(Some(phone)) => {
                if let Some(phone) = normalize_phone(&phone) {
                    return Ok(Recipient { phone, source: RecipientSource::ConversationSender });
                }
            }
            Ok(None) => {}
            Err(error) => debug!(
                event_name = "bridge.resolve.sender_lookup_failed",
                conversation_id,
                error = %error,
                "conversation sender lookup failed"
            ),
        }

        Err(ResolutionFailure { conversation_id: Some(conversation_id) })
    }

    async fn contact_phone(&self, contact_id: i64) -> Option<String> {
        match self.directory.contact(contact_id).await {
            Ok(contact) => contact.phone_number.as_deref().and_then(normalize_phone),
            Err(error) => {
                debug!(
                    event_name = "bridge.resolve.contact_lookup_failed",
                    contact_id,
                    error = %error,
                    "contact lookup failed"
                );
                None
            }
        }
    }
}

/// Reduces a CRM phone field to the digits WhatsApp addresses by.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    (!digits.is_empty()).then_some(digits)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use zapwoot_core::crm::{CrmContact, CrmConversation};
    use zapwoot_core::domain::webhook::{MessageKind, NormalizedMessage};

    use super::{normalize_phone, IdentityResolver, RecipientSource, ResolutionFailure};
    use crate::test_support::FakeDirectory;

    fn message() -> NormalizedMessage {
        NormalizedMessage {
            event: "message_created".to_string(),
            content: "hi".to_string(),
            message_type: MessageKind::Outgoing,
            is_private: false,
            source_id: None,
            crm_message_id: Some(901),
            conversation_id: Some(456),
            contact_id: None,
            contact_phone: None,
            sender_phone: None,
            account_id: None,
        }
    }

    fn contact(id: i64, phone: Option<&str>) -> CrmContact {
        CrmContact { id, name: None, phone_number: phone.map(str::to_string) }
    }

    #[tokio::test]
    async fn outgoing_uses_contact_phone_from_payload_without_lookups() {
        let directory = Arc::new(FakeDirectory::default());
        let resolver = IdentityResolver::new(directory.clone());
        let mut outgoing = message();
        outgoing.contact_phone = Some("+55 11 99999-9999".to_string());
        outgoing.sender_phone = Some("+5511000000001".to_string());

        let recipient = resolver.resolve(&outgoing).await.expect("resolve");

        assert_eq!(recipient.phone, "5511999999999");
        assert_eq!(recipient.source, RecipientSource::Payload);
        assert!(directory.calls().await.is_empty());
    }

    #[tokio::test]
    async fn incoming_uses_sender_phone() {
        let resolver = IdentityResolver::new(Arc::new(FakeDirectory::default()));
        let mut incoming = message();
        incoming.message_type = MessageKind::Incoming;
        incoming.contact_phone = Some("+5511999999999".to_string());
        incoming.sender_phone = Some("+5511000000001".to_string());

        let recipient = resolver.resolve(&incoming).await.expect("resolve");
        assert_eq!(recipient.phone, "5511000000001");
    }

    #[tokio::test]
    async fn payload_contact_id_is_looked_up() {
        let mut directory = FakeDirectory::default();
        directory.contacts.insert(1, contact(1, Some("+5511999999999")));
        let resolver = IdentityResolver::new(Arc::new(directory));
        let mut outgoing = message();
        outgoing.contact_id = Some(1);

        let recipient = resolver.resolve(&outgoing).await.expect("resolve");

        assert_eq!(recipient.phone, "5511999999999");
        assert_eq!(recipient.source, RecipientSource::Contact);
    }

    #[tokio::test]
    async fn falls_back_to_conversation_contact_then_sender() {
        let mut directory = FakeDirectory::default();
        directory.conversations.insert(
            456,
            CrmConversation { id: 456, contact_id: Some(9), inbox_id: Some(4), status: None },
        );
        directory.contacts.insert(9, contact(9, Some("5511888888888")));
        let resolver = IdentityResolver::new(Arc::new(directory));

        let recipient = resolver.resolve(&message()).await.expect("resolve");
        assert_eq!(recipient.phone, "5511888888888");
        assert_eq!(recipient.source, RecipientSource::Conversation);

        let mut directory = FakeDirectory::default();
        directory.contacts.insert(9, contact(9, None));
        directory.senders.insert(456, "+5511777777777".to_string());
        let resolver = IdentityResolver::new(Arc::new(directory));

        let recipient = resolver.resolve(&message()).await.expect("resolve");
        assert_eq!(recipient.phone, "5511777777777");
        assert_eq!(recipient.source, RecipientSource::ConversationSender);
    }

    #[tokio::test]
    async fn missing_conversation_still_asks_for_the_last_sender() {
        let mut directory = FakeDirectory::default();
        directory.senders.insert(456, "+5511777777777".to_string());
        let directory = Arc::new(directory);
        let resolver = IdentityResolver::new(directory.clone());

        let recipient = resolver.resolve(&message()).await.expect("resolve");

        assert_eq!(recipient.source, RecipientSource::ConversationSender);
        assert_eq!(directory.calls().await, vec!["conversation:456", "sender:456"]);
    }

    #[tokio::test]
    async fn nothing_found_is_a_resolution_failure() {
        let resolver = IdentityResolver::new(Arc::new(FakeDirectory::default()));

        let error = resolver.resolve(&message()).await.expect_err("unresolvable");
        assert_eq!(error, ResolutionFailure { conversation_id: Some(456) });
        assert_eq!(error.to_string(), "could not resolve recipient");

        let mut orphan = message();
        orphan.conversation_id = None;
        assert!(resolver.resolve(&orphan).await.is_err());
    }

    #[test]
    fn phone_normalization_keeps_digits_only() {
        assert_eq!(normalize_phone("+55 (11) 99999-9999").as_deref(), Some("5511999999999"));
        assert_eq!(normalize_phone(" + "), None);
    }
}
