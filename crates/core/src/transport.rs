//! Capability boundary towards the WhatsApp multi-device protocol driver.
//!
//! The driver owns sockets, crypto and reconnect loops. The rest of the system only sees the
//! [`TransportManager`] calls and the [`TransportEvent`] stream it publishes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::domain::session::{ProxyConfig, SessionId};
use crate::errors::{Classify, ErrorKind};

pub const DEFAULT_EVENT_BUFFER: usize = 256;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport has no session `{0}`")]
    UnknownSession(SessionId),
    #[error("session `{0}` is not connected")]
    NotConnected(SessionId),
    #[error("transport unavailable: {0}")]
    Unavailable(String),
    #[error("transport operation `{operation}` failed: {message}")]
    Failed { operation: &'static str, message: String },
}

impl TransportError {
    pub fn failed(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Failed { operation, message: message.into() }
    }
}

impl Classify for TransportError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::TransportFailure
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub jid: String,
    pub phone: String,
    pub push_name: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub to: String,
    pub content: String,
    pub reply_to: Option<String>,
}

impl OutboundMessage {
    pub fn text(to: impl Into<String>, content: impl Into<String>) -> Self {
        Self { to: to.into(), content: content.into(), reply_to: None }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentMessage {
    pub message_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomingMessage {
    pub message_id: String,
    pub from_phone: String,
    pub to_phone: String,
    pub push_name: Option<String>,
    pub content: String,
    pub message_type: String,
    pub timestamp: DateTime<Utc>,
    pub from_me: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransportEventKind {
    QrCode { code: String, expires_at: DateTime<Utc> },
    PairSuccess { device_jid: String },
    Connected { device_jid: Option<String> },
    Disconnected { reason: Option<String> },
    LoggedOut,
    Error { message: String },
    IncomingMessage(IncomingMessage),
}

impl TransportEventKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::QrCode { .. } => "qr_code",
            Self::PairSuccess { .. } => "pair_success",
            Self::Connected { .. } => "connected",
            Self::Disconnected { .. } => "disconnected",
            Self::LoggedOut => "logged_out",
            Self::Error { .. } => "error",
            Self::IncomingMessage(_) => "incoming_message",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportEvent {
    pub session_id: SessionId,
    pub kind: TransportEventKind,
}

impl TransportEvent {
    pub fn new(session_id: SessionId, kind: TransportEventKind) -> Self {
        Self { session_id, kind }
    }
}

pub type TransportEventSender = mpsc::Sender<TransportEvent>;
pub type TransportEventReceiver = mpsc::Receiver<TransportEvent>;

pub fn event_channel(buffer: usize) -> (TransportEventSender, TransportEventReceiver) {
    mpsc::channel(buffer.max(1))
}

#[async_trait]
pub trait TransportManager: Send + Sync {
    async fn create_session(
        &self,
        session_id: &SessionId,
        proxy: Option<&ProxyConfig>,
    ) -> Result<(), TransportError>;
    async fn connect_session(&self, session_id: &SessionId) -> Result<(), TransportError>;
    async fn disconnect_session(&self, session_id: &SessionId) -> Result<(), TransportError>;
    async fn logout_session(&self, session_id: &SessionId) -> Result<(), TransportError>;
    async fn qr_code(&self, session_id: &SessionId) -> Result<Option<String>, TransportError>;
    async fn pair_phone(&self, session_id: &SessionId, phone: &str)
        -> Result<String, TransportError>;
    async fn is_connected(&self, session_id: &SessionId) -> bool;
    async fn device_info(&self, session_id: &SessionId) -> Option<DeviceInfo>;
    async fn set_proxy(
        &self,
        session_id: &SessionId,
        proxy: Option<&ProxyConfig>,
    ) -> Result<(), TransportError>;
    async fn proxy(&self, session_id: &SessionId) -> Result<Option<ProxyConfig>, TransportError>;
    async fn send_message(
        &self,
        session_id: &SessionId,
        message: OutboundMessage,
    ) -> Result<SentMessage, TransportError>;
}
