//! CRM webhook handling and the WhatsApp to CRM relay.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};
use uuid::Uuid;

use zapwoot_core::config::BridgeConfig;
use zapwoot_core::crm::{CrmDirectory, CrmInbox, CrmMessageRef};
use zapwoot_core::domain::mapping::NewMessageMapping;
use zapwoot_core::domain::session::SessionId;
use zapwoot_core::domain::webhook::WebhookEvent;
use zapwoot_core::transport::{IncomingMessage, OutboundMessage, SentMessage, TransportManager};
use zapwoot_db::repositories::MessageMappingStore;

use crate::error::BridgeError;
use crate::filter::{FilterDecision, MessageFilter, SkipReason};
use crate::resolver::{IdentityResolver, Recipient};

#[derive(Clone, Debug)]
pub struct BridgeSettings {
    pub settle_delay: Duration,
    pub bot_source_prefix: String,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self { settle_delay: Duration::from_millis(500), bot_source_prefix: "WAID:".to_string() }
    }
}

impl From<&BridgeConfig> for BridgeSettings {
    fn from(config: &BridgeConfig) -> Self {
        Self {
            settle_delay: Duration::from_millis(config.settle_delay_ms),
            bot_source_prefix: config.bot_source_prefix.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WebhookOutcome {
    Ignored { event: String },
    Skipped { reason: SkipReason },
    Unresolved { conversation_id: Option<i64> },
    Forwarded { whatsapp_message_id: String, recipient: String },
    AlreadyForwarded { whatsapp_message_id: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RelayOutcome {
    SkippedOwn,
    SkippedEmpty,
    InboxDisabled,
    AlreadyRelayed,
    Relayed(CrmMessageRef),
}

pub struct BridgeService {
    transport: Arc<dyn TransportManager>,
    mappings: Arc<dyn MessageMappingStore>,
    resolver: IdentityResolver,
    filter: MessageFilter,
    inbox: Option<Arc<dyn CrmInbox>>,
    settings: BridgeSettings,
    tracker: TaskTracker,
}

impl BridgeService {
    pub fn new(
        transport: Arc<dyn TransportManager>,
        mappings: Arc<dyn MessageMappingStore>,
        directory: Arc<dyn CrmDirectory>,
        settings: BridgeSettings,
    ) -> Self {
        Self {
            transport,
            mappings,
            resolver: IdentityResolver::new(directory),
            filter: MessageFilter::new(settings.bot_source_prefix.clone()),
            inbox: None,
            settings,
            tracker: TaskTracker::new(),
        }
    }

    pub fn with_inbox(mut self, inbox: Arc<dyn CrmInbox>) -> Self {
        self.inbox = Some(inbox);
        self
    }

    /// Relays one CRM webhook to WhatsApp.
    ///
    /// Only a failed send is an error. Mapping bookkeeping runs on a tracked background task and
    /// its failures are logged without changing the outcome. A CRM message that already has a
    /// mapping is not sent again.
    pub async fn process_webhook(
        &self,
        session_id: &SessionId,
        event: WebhookEvent,
    ) -> Result<WebhookOutcome, BridgeError> {
        let correlation_id = Uuid::new_v4().to_string();

        // The CRM may still be persisting the message when the webhook fires.
        if !self.settings.settle_delay.is_zero() {
            tokio::time::sleep(self.settings.settle_delay).await;
        }

        if event.is_ignorable() {
            debug!(
                event_name = "bridge.webhook.ignored",
                correlation_id = %correlation_id,
                session_id = %session_id,
                webhook_event = %event.event,
                "webhook event ignored"
            );
            return Ok(WebhookOutcome::Ignored { event: event.event });
        }

        let message = event.normalize();

        let recipient = match self.resolver.resolve(&message).await {
            Ok(recipient) => recipient,
            Err(failure) => {
                warn!(
                    event_name = "bridge.webhook.unresolved",
                    correlation_id = %correlation_id,
                    session_id = %session_id,
                    conversation_id = ?failure.conversation_id,
                    error = %failure,
                    "dropping webhook"
                );
                return Ok(WebhookOutcome::Unresolved { conversation_id: failure.conversation_id });
            }
        };

        if let FilterDecision::Skip(reason) = self.filter.evaluate(&message) {
            debug!(
                event_name = "bridge.webhook.skipped",
                correlation_id = %correlation_id,
                session_id = %session_id,
                reason = reason.as_str(),
                "webhook message not forwarded"
            );
            return Ok(WebhookOutcome::Skipped { reason });
        }

        if let Some(crm_message_id) = message.crm_message_id {
            if let Some(existing) =
                self.mappings.find_by_crm_message_id(session_id, crm_message_id).await?
            {
                info!(
                    event_name = "bridge.webhook.duplicate",
                    correlation_id = %correlation_id,
                    session_id = %session_id,
                    crm_message_id,
                    whatsapp_message_id = %existing.whatsapp_message_id,
                    "webhook retry for a forwarded message"
                );
                return Ok(WebhookOutcome::AlreadyForwarded {
                    whatsapp_message_id: existing.whatsapp_message_id,
                });
            }
        }

        let outbound = OutboundMessage::text(recipient.phone.clone(), message.content.clone());
        let sent = self.transport.send_message(session_id, outbound).await.map_err(|source| {
            BridgeError::Send {
                session_id: session_id.clone(),
                recipient: recipient.phone.clone(),
                source,
            }
        })?;

        info!(
            event_name = "bridge.webhook.forwarded",
            correlation_id = %correlation_id,
            session_id = %session_id,
            whatsapp_message_id = %sent.message_id,
            "message forwarded to whatsapp"
        );

        self.spawn_outbound_mapping(
            session_id.clone(),
            &recipient,
            message.content,
            message.crm_message_id.zip(message.conversation_id),
            sent.clone(),
            correlation_id,
        );

        Ok(WebhookOutcome::Forwarded {
            whatsapp_message_id: sent.message_id,
            recipient: recipient.phone,
        })
    }

    /// Posts an incoming WhatsApp message into the CRM inbox, at most once per message id.
    pub async fn relay_incoming(
        &self,
        session_id: &SessionId,
        message: IncomingMessage,
    ) -> Result<RelayOutcome, BridgeError> {
        if message.from_me {
            return Ok(RelayOutcome::SkippedOwn);
        }
        if message.content.trim().is_empty() {
            return Ok(RelayOutcome::SkippedEmpty);
        }
        let Some(inbox) = self.inbox.as_ref() else {
            return Ok(RelayOutcome::InboxDisabled);
        };

        let mapping = self
            .mappings
            .create_mapping(NewMessageMapping {
                session_id: session_id.clone(),
                whatsapp_message_id: message.message_id.clone(),
                from_phone: message.from_phone.clone(),
                to_phone: message.to_phone.clone(),
                message_type: message.message_type.clone(),
                content: message.content.clone(),
                timestamp: message.timestamp,
                from_me: false,
            })
            .await?;
        if mapping.is_linked() {
            debug!(
                event_name = "bridge.relay.duplicate",
                session_id = %session_id,
                whatsapp_message_id = %message.message_id,
                "message already relayed"
            );
            return Ok(RelayOutcome::AlreadyRelayed);
        }

        let source_id = format!("{}{}", self.filter.bot_source_prefix(), message.message_id);
        let delivered = inbox.deliver_incoming(&message, &source_id).await?;

        if let Err(error) = self
            .mappings
            .update_mapping(
                session_id,
                &message.message_id,
                delivered.message_id,
                delivered.conversation_id,
            )
            .await
        {
            warn!(
                event_name = "bridge.relay.mapping_update_failed",
                session_id = %session_id,
                whatsapp_message_id = %message.message_id,
                error = %error,
                "relayed message could not be linked"
            );
        }

        info!(
            event_name = "bridge.relay.delivered",
            session_id = %session_id,
            whatsapp_message_id = %message.message_id,
            crm_message_id = delivered.message_id,
            "message relayed to crm"
        );
        Ok(RelayOutcome::Relayed(delivered))
    }

    /// Waits for outstanding mapping writes.
    pub async fn flush(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    fn spawn_outbound_mapping(
        &self,
        session_id: SessionId,
        recipient: &Recipient,
        content: String,
        crm_ids: Option<(i64, i64)>,
        sent: SentMessage,
        correlation_id: String,
    ) {
        let transport = Arc::clone(&self.transport);
        let mappings = Arc::clone(&self.mappings);
        let to_phone = recipient.phone.clone();

        self.tracker.spawn(async move {
            let from_phone = transport
                .device_info(&session_id)
                .await
                .map(|device| device.phone)
                .unwrap_or_default();
            let created = mappings
                .create_mapping(NewMessageMapping {
                    session_id: session_id.clone(),
                    whatsapp_message_id: sent.message_id.clone(),
                    from_phone,
                    to_phone,
                    message_type: "text".to_string(),
                    content,
                    timestamp: sent.timestamp,
                    from_me: true,
                })
                .await;
            if let Err(error) = created {
                warn!(
                    event_name = "bridge.mapping.create_failed",
                    correlation_id = %correlation_id,
                    session_id = %session_id,
                    whatsapp_message_id = %sent.message_id,
                    error = %error,
                    "outbound mapping not stored"
                );
                return;
            }

            let Some((crm_message_id, crm_conversation_id)) = crm_ids else {
                return;
            };
            if let Err(error) = mappings
                .update_mapping(&session_id, &sent.message_id, crm_message_id, crm_conversation_id)
                .await
            {
                warn!(
                    event_name = "bridge.mapping.update_failed",
                    correlation_id = %correlation_id,
                    session_id = %session_id,
                    whatsapp_message_id = %sent.message_id,
                    error = %error,
                    "outbound mapping not linked"
                );
            }
        });
    }
}
