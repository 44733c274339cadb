use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Created,
    Connecting,
    Connected,
    Disconnected,
    Error,
    LoggedOut,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Error => "error",
            Self::LoggedOut => "logged_out",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "created" => Some(Self::Created),
            "connecting" => Some(Self::Connecting),
            "connected" => Some(Self::Connected),
            "disconnected" => Some(Self::Disconnected),
            "error" => Some(Self::Error),
            "logged_out" => Some(Self::LoggedOut),
            _ => None,
        }
    }

    /// Applies `event` to the current state.
    ///
    /// `ConnectionEstablished` is accepted from every state except `LoggedOut` because the
    /// transport's view of the link wins over whatever was stored; a logged-out device has no
    /// credentials left and must go back through `Connecting` to pair again.
    pub fn transition(
        &self,
        event: SessionEvent,
    ) -> Result<ConnectionState, SessionTransitionError> {
        use ConnectionState::{Connected, Connecting, Created, Disconnected, Error, LoggedOut};
        use SessionEvent::{
            ConnectRequested, ConnectionEstablished, ConnectionFailed, ConnectionLost,
            LogoutCompleted, TeardownStarted,
        };

        let next = match (*self, event) {
            (Created | Connecting | Disconnected | Error | LoggedOut, ConnectRequested) => {
                Connecting
            }
            (LoggedOut, ConnectionEstablished) => {
                return Err(SessionTransitionError { from: *self, event })
            }
            (_, ConnectionEstablished) => Connected,
            (LoggedOut, ConnectionFailed) => {
                return Err(SessionTransitionError { from: *self, event })
            }
            (_, ConnectionFailed) => Error,
            (Connecting | Connected | Disconnected | Error, ConnectionLost) => Disconnected,
            (_, TeardownStarted) => Disconnected,
            (_, LogoutCompleted) => LoggedOut,
            _ => return Err(SessionTransitionError { from: *self, event }),
        };

        Ok(next)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionEvent {
    ConnectRequested,
    ConnectionEstablished,
    ConnectionFailed,
    ConnectionLost,
    TeardownStarted,
    LogoutCompleted,
}

#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("invalid session transition from {from:?} using event {event:?}")]
pub struct SessionTransitionError {
    pub from: ConnectionState,
    pub event: SessionEvent,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyConfig {
    pub url: String,
}

impl ProxyConfig {
    pub fn parse(raw: &str) -> Result<Self, InvalidProxy> {
        let url = raw.trim();
        let supported = ["http://", "https://", "socks5://"];
        let has_host = supported
            .iter()
            .find_map(|scheme| url.strip_prefix(scheme))
            .map(|rest| !rest.trim_matches('/').is_empty())
            .unwrap_or(false);

        if !has_host {
            return Err(InvalidProxy(raw.to_string()));
        }

        Ok(Self { url: url.to_string() })
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("invalid proxy url `{0}` (expected http://, https:// or socks5:// with a host)")]
pub struct InvalidProxy(pub String);

/// Persisted lifecycle record of one WhatsApp device connection.
///
/// Fields are public for storage adapters; lifecycle changes go through the methods below so
/// that a QR code only exists while `Connecting` and `connected_at` only while `Connected`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub name: String,
    pub device_jid: Option<String>,
    pub connection_state: ConnectionState,
    pub qr_code: Option<String>,
    pub qr_expires_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub connected_at: Option<DateTime<Utc>>,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub proxy: Option<ProxyConfig>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(
        id: SessionId,
        name: impl Into<String>,
        proxy: Option<ProxyConfig>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            device_jid: None,
            connection_state: ConnectionState::Created,
            qr_code: None,
            qr_expires_at: None,
            last_error: None,
            connected_at: None,
            last_seen_at: None,
            proxy,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection_state == ConnectionState::Connected
    }

    pub fn can_logout(&self) -> bool {
        self.connection_state == ConnectionState::Connected
    }

    pub fn begin_connecting(&mut self, now: DateTime<Utc>) -> Result<(), SessionTransitionError> {
        self.apply(SessionEvent::ConnectRequested, now)?;
        self.last_error = None;
        Ok(())
    }

    /// Stores a freshly issued QR code, moving into `Connecting` first when needed.
    pub fn show_qr(
        &mut self,
        code: impl Into<String>,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), SessionTransitionError> {
        let code = code.into();
        if code.trim().is_empty() {
            self.qr_code = None;
            self.qr_expires_at = None;
            self.updated_at = now;
            return Ok(());
        }

        if self.connection_state != ConnectionState::Connecting {
            self.apply(SessionEvent::ConnectRequested, now)?;
        }
        self.qr_code = Some(code);
        self.qr_expires_at = Some(expires_at);
        self.updated_at = now;
        Ok(())
    }

    pub fn record_pairing(&mut self, device_jid: impl Into<String>, now: DateTime<Utc>) {
        self.device_jid = Some(device_jid.into()).filter(|jid| !jid.trim().is_empty());
        self.qr_code = None;
        self.qr_expires_at = None;
        self.updated_at = now;
    }

    pub fn mark_connected(
        &mut self,
        device_jid: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), SessionTransitionError> {
        let already_connected = self.is_connected();
        self.apply(SessionEvent::ConnectionEstablished, now)?;
        if let Some(jid) = device_jid.filter(|jid| !jid.trim().is_empty()) {
            self.device_jid = Some(jid);
        }
        if !already_connected || self.connected_at.is_none() {
            self.connected_at = Some(now);
        }
        self.last_seen_at = Some(now);
        self.last_error = None;
        Ok(())
    }

    pub fn mark_failed(
        &mut self,
        message: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(), SessionTransitionError> {
        self.apply(SessionEvent::ConnectionFailed, now)?;
        self.last_error = Some(message.into());
        Ok(())
    }

    /// Records a failure reason without touching the connection state.
    pub fn record_error(&mut self, message: impl Into<String>, now: DateTime<Utc>) {
        self.last_error = Some(message.into());
        self.updated_at = now;
    }

    pub fn mark_disconnected(&mut self, now: DateTime<Utc>) -> Result<(), SessionTransitionError> {
        self.apply(SessionEvent::ConnectionLost, now)
    }

    pub fn begin_teardown(&mut self, now: DateTime<Utc>) {
        // TeardownStarted is accepted from every state.
        let _ = self.apply(SessionEvent::TeardownStarted, now);
    }

    pub fn mark_logged_out(&mut self, now: DateTime<Utc>) {
        let _ = self.apply(SessionEvent::LogoutCompleted, now);
        self.device_jid = None;
    }

    pub fn set_proxy(&mut self, proxy: Option<ProxyConfig>, now: DateTime<Utc>) {
        self.proxy = proxy;
        self.updated_at = now;
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }

    pub fn mark_seen(&mut self, now: DateTime<Utc>) {
        self.last_seen_at = Some(now);
        self.updated_at = now;
    }

    pub fn qr_expired(&self, now: DateTime<Utc>) -> bool {
        self.qr_expires_at.map(|expires_at| now > expires_at).unwrap_or(false)
    }

    pub fn check_invariants(&self) -> Result<(), String> {
        if self.qr_code.is_some() && self.connection_state != ConnectionState::Connecting {
            return Err(format!(
                "session `{}` holds a qr code while `{}`",
                self.id, self.connection_state
            ));
        }
        if self.connected_at.is_some() && self.connection_state != ConnectionState::Connected {
            return Err(format!(
                "session `{}` has connected_at while `{}`",
                self.id, self.connection_state
            ));
        }
        Ok(())
    }

    fn apply(
        &mut self,
        event: SessionEvent,
        now: DateTime<Utc>,
    ) -> Result<(), SessionTransitionError> {
        let next = self.connection_state.transition(event)?;
        self.connection_state = next;
        if next != ConnectionState::Connecting {
            self.qr_code = None;
            self.qr_expires_at = None;
        }
        if next != ConnectionState::Connected {
            self.connected_at = None;
        }
        self.updated_at = now;
        Ok(())
    }
}
