use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use tokio::sync::Mutex;

use zapwoot_core::crm::{CrmContact, CrmConversation, CrmDirectory, CrmError};
use zapwoot_core::domain::session::{ProxyConfig, SessionId};
use zapwoot_core::transport::{
    DeviceInfo, OutboundMessage, SentMessage, TransportError, TransportManager,
};

#[derive(Default)]
pub(crate) struct FakeTransport {
    pub connected: Mutex<HashSet<String>>,
    pub qr_codes: Mutex<HashMap<String, String>>,
    pub proxies: Mutex<HashMap<String, ProxyConfig>>,
    pub sent: Mutex<Vec<(SessionId, OutboundMessage)>>,
    pub calls: Mutex<Vec<String>>,
    pub fail_create: bool,
    pub fail_connect: bool,
    pub connect_delay: Option<Duration>,
    pub fail_logout: bool,
    pub fail_send: bool,
    pub hang_disconnect: bool,
}

impl FakeTransport {
    pub async fn set_connected(&self, id: &str) {
        self.connected.lock().await.insert(id.to_string());
    }

    pub async fn calls(&self) -> Vec<String> {
        self.calls.lock().await.clone()
    }

    async fn record(&self, call: &str, id: &SessionId) {
        self.calls.lock().await.push(format!("{call}:{id}"));
    }
}

#[async_trait]
impl TransportManager for FakeTransport {
    async fn create_session(
        &self,
        session_id: &SessionId,
        proxy: Option<&ProxyConfig>,
    ) -> Result<(), TransportError> {
        self.record("create", session_id).await;
        if self.fail_create {
            return Err(TransportError::failed("create", "store unavailable"));
        }
        if let Some(proxy) = proxy {
            self.proxies.lock().await.insert(session_id.0.clone(), proxy.clone());
        }
        Ok(())
    }

    async fn connect_session(&self, session_id: &SessionId) -> Result<(), TransportError> {
        self.record("connect", session_id).await;
        if let Some(delay) = self.connect_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_connect {
            return Err(TransportError::failed("connect", "websocket handshake failed"));
        }
        Ok(())
    }

    async fn disconnect_session(&self, session_id: &SessionId) -> Result<(), TransportError> {
        self.record("disconnect", session_id).await;
        if self.hang_disconnect {
            std::future::pending::<()>().await;
        }
        self.connected.lock().await.remove(session_id.as_str());
        Ok(())
    }

    async fn logout_session(&self, session_id: &SessionId) -> Result<(), TransportError> {
        self.record("logout", session_id).await;
        if self.fail_logout {
            return Err(TransportError::failed("logout", "server refused logout"));
        }
        self.connected.lock().await.remove(session_id.as_str());
        Ok(())
    }

    async fn qr_code(&self, session_id: &SessionId) -> Result<Option<String>, TransportError> {
        Ok(self.qr_codes.lock().await.get(session_id.as_str()).cloned())
    }

    async fn pair_phone(&self, session_id: &SessionId, phone: &str) -> Result<String, TransportError> {
        self.record("pair", session_id).await;
        Ok(format!("PAIR-{}", &phone[phone.len().saturating_sub(4)..]))
    }

    async fn is_connected(&self, session_id: &SessionId) -> bool {
        self.connected.lock().await.contains(session_id.as_str())
    }

    async fn device_info(&self, session_id: &SessionId) -> Option<DeviceInfo> {
        self.connected.lock().await.contains(session_id.as_str()).then(|| DeviceInfo {
            jid: "5511000000001@s.whatsapp.net".to_string(),
            phone: "5511000000001".to_string(),
            push_name: None,
        })
    }

    async fn set_proxy(
        &self,
        session_id: &SessionId,
        proxy: Option<&ProxyConfig>,
    ) -> Result<(), TransportError> {
        let mut proxies = self.proxies.lock().await;
        match proxy {
            Some(proxy) => proxies.insert(session_id.0.clone(), proxy.clone()),
            None => proxies.remove(session_id.as_str()),
        };
        Ok(())
    }

    async fn proxy(&self, session_id: &SessionId) -> Result<Option<ProxyConfig>, TransportError> {
        Ok(self.proxies.lock().await.get(session_id.as_str()).cloned())
    }

    async fn send_message(
        &self,
        session_id: &SessionId,
        message: OutboundMessage,
    ) -> Result<SentMessage, TransportError> {
        if self.fail_send {
            return Err(TransportError::NotConnected(session_id.clone()));
        }
        let mut sent = self.sent.lock().await;
        sent.push((session_id.clone(), message));
        Ok(SentMessage {
            message_id: format!("3EB0{:04}", sent.len()),
            timestamp: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).single().unwrap_or_else(Utc::now),
        })
    }
}

#[derive(Default)]
pub(crate) struct FakeDirectory {
    pub conversations: HashMap<i64, CrmConversation>,
    pub contacts: HashMap<i64, CrmContact>,
    pub senders: HashMap<i64, String>,
    pub calls: Mutex<Vec<String>>,
}

impl FakeDirectory {
    pub fn with_contact(mut self, conversation_id: i64, contact_id: i64, phone: &str) -> Self {
        self.conversations.insert(
            conversation_id,
            CrmConversation {
                id: conversation_id,
                contact_id: Some(contact_id),
                inbox_id: Some(1),
                status: Some("open".to_string()),
            },
        );
        self.contacts.insert(
            contact_id,
            CrmContact { id: contact_id, name: None, phone_number: Some(phone.to_string()) },
        );
        self
    }

    pub async fn calls(&self) -> Vec<String> {
        self.calls.lock().await.clone()
    }
}

#[async_trait]
impl CrmDirectory for FakeDirectory {
    async fn conversation(&self, id: i64) -> Result<CrmConversation, CrmError> {
        self.calls.lock().await.push(format!("conversation:{id}"));
        self.conversations.get(&id).cloned().ok_or(CrmError::NotFound { resource: "conversation", id })
    }

    async fn contact(&self, id: i64) -> Result<CrmContact, CrmError> {
        self.calls.lock().await.push(format!("contact:{id}"));
        self.contacts.get(&id).cloned().ok_or(CrmError::NotFound { resource: "contact", id })
    }

    async fn conversation_sender_phone(&self, id: i64) -> Result<Option<String>, CrmError> {
        self.calls.lock().await.push(format!("sender:{id}"));
        Ok(self.senders.get(&id).cloned())
    }
}
