use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use zapwoot_core::domain::session::{ProxyConfig, SessionId};
use zapwoot_core::transport::{
    DeviceInfo, OutboundMessage, SentMessage, TransportError, TransportManager,
};

const NO_DRIVER: &str = "no whatsapp protocol driver is attached";

/// Transport used when the server runs without a WhatsApp protocol driver.
///
/// It tracks session shells and their proxy settings so the lifecycle API stays usable, but it
/// never links a device: connects and pairing fail, and every session reports disconnected.
#[derive(Default)]
pub struct DetachedTransport {
    sessions: RwLock<HashMap<String, Option<ProxyConfig>>>,
}

impl DetachedTransport {
    pub fn mode(&self) -> &'static str {
        "detached"
    }
}

#[async_trait]
impl TransportManager for DetachedTransport {
    async fn create_session(
        &self,
        session_id: &SessionId,
        proxy: Option<&ProxyConfig>,
    ) -> Result<(), TransportError> {
        self.sessions.write().await.insert(session_id.0.clone(), proxy.cloned());
        Ok(())
    }

    async fn connect_session(&self, _session_id: &SessionId) -> Result<(), TransportError> {
        Err(TransportError::Unavailable(NO_DRIVER.to_string()))
    }

    async fn disconnect_session(&self, _session_id: &SessionId) -> Result<(), TransportError> {
        Ok(())
    }

    async fn logout_session(&self, session_id: &SessionId) -> Result<(), TransportError> {
        Err(TransportError::NotConnected(session_id.clone()))
    }

    async fn qr_code(&self, _session_id: &SessionId) -> Result<Option<String>, TransportError> {
        Ok(None)
    }

    async fn pair_phone(
        &self,
        _session_id: &SessionId,
        _phone: &str,
    ) -> Result<String, TransportError> {
        Err(TransportError::Unavailable(NO_DRIVER.to_string()))
    }

    async fn is_connected(&self, _session_id: &SessionId) -> bool {
        false
    }

    async fn device_info(&self, _session_id: &SessionId) -> Option<DeviceInfo> {
        None
    }

    async fn set_proxy(
        &self,
        session_id: &SessionId,
        proxy: Option<&ProxyConfig>,
    ) -> Result<(), TransportError> {
        self.sessions.write().await.insert(session_id.0.clone(), proxy.cloned());
        Ok(())
    }

    async fn proxy(&self, session_id: &SessionId) -> Result<Option<ProxyConfig>, TransportError> {
        let sessions = self.sessions.read().await;
        match sessions.get(session_id.as_str()) {
            Some(proxy) => Ok(proxy.clone()),
            None => Err(TransportError::UnknownSession(session_id.clone())),
        }
    }

    async fn send_message(
        &self,
        session_id: &SessionId,
        _message: OutboundMessage,
    ) -> Result<SentMessage, TransportError> {
        Err(TransportError::NotConnected(session_id.clone()))
    }
}
