//! Session lifecycle orchestration.
//!
//! The transport is the source of truth for whether a device is linked right now; the stored
//! record is reconciled towards it before any connect, disconnect or logout decision is made.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use zapwoot_core::config::SessionsConfig;
use zapwoot_core::domain::session::{ConnectionState, ProxyConfig, Session, SessionId};
use zapwoot_core::qr;
use zapwoot_core::transport::{TransportEvent, TransportEventKind, TransportManager};
use zapwoot_db::repositories::{RepositoryError, SessionRepository};

use crate::error::SessionError;

#[derive(Clone, Debug)]
pub struct SessionSettings {
    pub qr_on_create: bool,
    pub qr_ttl: Duration,
    pub disconnect_timeout: Duration,
    pub delete_settle: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            qr_on_create: false,
            qr_ttl: Duration::from_secs(120),
            disconnect_timeout: Duration::from_secs(10),
            delete_settle: Duration::from_millis(500),
        }
    }
}

impl From<&SessionsConfig> for SessionSettings {
    fn from(config: &SessionsConfig) -> Self {
        Self {
            qr_on_create: config.qr_on_create,
            qr_ttl: Duration::from_secs(config.qr_ttl_secs),
            disconnect_timeout: Duration::from_secs(config.disconnect_timeout_secs),
            delete_settle: Duration::from_millis(config.delete_settle_ms),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct NewSession {
    pub id: Option<SessionId>,
    pub name: String,
    pub proxy: Option<String>,
    pub qr_on_create: Option<bool>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct QrCodeImage {
    pub code: String,
    /// `data:image/svg+xml;base64,...`
    pub image: String,
    pub expires_at: DateTime<Utc>,
    pub timeout_secs: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventDisposition {
    Applied,
    UnknownSession,
}

pub struct SessionService {
    repository: Arc<dyn SessionRepository>,
    transport: Arc<dyn TransportManager>,
    settings: SessionSettings,
}

impl SessionService {
    pub fn new(
        repository: Arc<dyn SessionRepository>,
        transport: Arc<dyn TransportManager>,
        settings: SessionSettings,
    ) -> Self {
        Self { repository, transport, settings }
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub async fn get(&self, id: &SessionId) -> Result<Session, SessionError> {
        self.repository.find_by_id(id).await?.ok_or_else(|| SessionError::NotFound(id.clone()))
    }

    pub async fn list(&self) -> Result<Vec<Session>, SessionError> {
        Ok(self.repository.list().await?)
    }

    pub async fn create(&self, request: NewSession) -> Result<Session, SessionError> {
        let id = request.id.filter(|id| !id.0.trim().is_empty()).unwrap_or_else(SessionId::generate);
        let proxy = request.proxy.as_deref().map(ProxyConfig::parse).transpose()?;
        let name = if request.name.trim().is_empty() { id.0.clone() } else { request.name };

        let session = Session::new(id.clone(), name, proxy.clone(), Utc::now());
        if !self.repository.insert(session).await? {
            return Err(SessionError::AlreadyExists(id));
        }

        if let Err(source) = self.transport.create_session(&id, proxy.as_ref()).await {
            warn!(
                event_name = "session.create.transport_failed",
                session_id = %id,
                error = %source,
                "transport rejected new session; removing record"
            );
            self.repository.delete(&id).await?;
            return Err(SessionError::transport(&id, "create", source));
        }

        info!(event_name = "session.create.completed", session_id = %id, "session created");

        if request.qr_on_create.unwrap_or(self.settings.qr_on_create) {
            if let Err(error) = self.connect(&id).await {
                warn!(
                    event_name = "session.create.connect_failed",
                    session_id = %id,
                    error = %error,
                    "connect after create failed"
                );
            }
        }

        self.get(&id).await
    }

    pub async fn connect(&self, id: &SessionId) -> Result<Session, SessionError> {
        let mut session = self.get(id).await?;

        if self.transport.is_connected(id).await {
            self.reconcile_connected(&mut session).await?;
            return Err(SessionError::AlreadyConnected(id.clone()));
        }

        let now = Utc::now();
        if session.is_connected() {
            // Stored as connected but the transport lost the link.
            session.mark_disconnected(now)?;
        }
        session.begin_connecting(now)?;
        self.persist(session.clone()).await?;

        match self.transport.connect_session(id).await {
            Ok(()) => {
                info!(event_name = "session.connect.started", session_id = %id, "connect requested");
                self.get(id).await
            }
            Err(source) => {
                warn!(
                    event_name = "session.connect.failed",
                    session_id = %id,
                    error = %source,
                    "transport connect failed"
                );
                session.mark_failed(source.to_string(), Utc::now())?;
                self.persist_unless_deleted(session, "connect").await?;
                Err(SessionError::transport(id, "connect", source))
            }
        }
    }

    pub async fn disconnect(&self, id: &SessionId) -> Result<Session, SessionError> {
        let mut session = self.get(id).await?;
        let transport_connected = self.transport.is_connected(id).await;
        let stored_live = matches!(
            session.connection_state,
            ConnectionState::Connected | ConnectionState::Connecting
        );
        if !transport_connected && !stored_live {
            return Err(SessionError::AlreadyDisconnected(id.clone()));
        }

        session.begin_teardown(Utc::now());
        self.persist(session.clone()).await?;

        if transport_connected {
            self.bounded_disconnect(id).await;
        }

        info!(event_name = "session.disconnect.completed", session_id = %id, "session disconnected");
        Ok(session)
    }

    /// Tears the session down and removes its record.
    ///
    /// The disconnected state is persisted before the transport is asked to let go, so a hung
    /// transport cannot leave a live-looking row behind.
    pub async fn delete(&self, id: &SessionId) -> Result<(), SessionError> {
        let mut session = self.get(id).await?;
        let transport_connected = self.transport.is_connected(id).await;

        session.begin_teardown(Utc::now());
        self.persist(session).await?;

        if transport_connected {
            self.bounded_disconnect(id).await;
        }

        if !self.settings.delete_settle.is_zero() {
            tokio::time::sleep(self.settings.delete_settle).await;
        }

        self.repository.delete(id).await?;
        info!(event_name = "session.delete.completed", session_id = %id, "session deleted");
        Ok(())
    }

    pub async fn logout(&self, id: &SessionId) -> Result<Session, SessionError> {
        let mut session = self.get(id).await?;
        let transport_connected = self.transport.is_connected(id).await;

        if !transport_connected && !session.is_connected() {
            return Err(SessionError::AlreadyDisconnected(id.clone()));
        }
        if transport_connected && !session.is_connected() {
            self.reconcile_connected(&mut session).await?;
        }
        if !session.can_logout() {
            return Err(SessionError::InvalidState {
                id: id.clone(),
                operation: "logout",
                state: session.connection_state,
            });
        }

        if let Err(source) = self.transport.logout_session(id).await {
            warn!(
                event_name = "session.logout.failed",
                session_id = %id,
                error = %source,
                "transport logout failed"
            );
            session.record_error(source.to_string(), Utc::now());
            self.persist_unless_deleted(session, "logout").await?;
            return Err(SessionError::transport(id, "logout", source));
        }

        session.mark_logged_out(Utc::now());
        self.persist(session.clone()).await?;
        info!(event_name = "session.logout.completed", session_id = %id, "session logged out");
        Ok(session)
    }

    /// Current pairing QR rendered as an image, with the seconds left before it rotates.
    pub async fn qr_code(&self, id: &SessionId) -> Result<QrCodeImage, SessionError> {
        let mut session = self.get(id).await?;
        let now = Utc::now();

        // While connecting, the transport may hold a code whose event is not applied yet. Reads
        // never move the lifecycle, so other states ignore the transport's code.
        if session.qr_code.is_none() && session.connection_state == ConnectionState::Connecting {
            match self.transport.qr_code(id).await {
                Ok(Some(code)) if !code.trim().is_empty() => {
                    session.show_qr(code, now + ttl(self.settings.qr_ttl), now)?;
                    self.persist(session.clone()).await?;
                }
                Ok(_) => {}
                Err(error) => debug!(
                    event_name = "session.qr.transport_lookup_failed",
                    session_id = %id,
                    error = %error,
                    "transport qr lookup failed"
                ),
            }
        }

        let Some(code) = session.qr_code.clone() else {
            return Err(SessionError::QrNotFound(id.clone()));
        };
        if session.qr_expired(now) {
            return Err(SessionError::QrExpired(id.clone()));
        }

        let expires_at = session.qr_expires_at.unwrap_or_else(|| now + ttl(self.settings.qr_ttl));
        let timeout_secs = u64::try_from((expires_at - now).num_seconds()).unwrap_or(0);
        let image = qr::render_data_uri(&code)?;

        Ok(QrCodeImage { code, image, expires_at, timeout_secs })
    }

    pub async fn pair_phone(&self, id: &SessionId, phone: &str) -> Result<String, SessionError> {
        let mut session = self.get(id).await?;
        let digits: String = phone.chars().filter(char::is_ascii_digit).collect();
        if digits.len() < 8 {
            return Err(SessionError::InvalidPhone(phone.to_string()));
        }

        let code = self
            .transport
            .pair_phone(id, &digits)
            .await
            .map_err(|source| SessionError::transport(id, "pair", source))?;

        session.touch(Utc::now());
        self.persist(session).await?;
        info!(event_name = "session.pair.code_issued", session_id = %id, "pairing code issued");
        Ok(code)
    }

    pub async fn set_proxy(
        &self,
        id: &SessionId,
        proxy: Option<&str>,
    ) -> Result<Session, SessionError> {
        let proxy = proxy.filter(|raw| !raw.trim().is_empty()).map(ProxyConfig::parse).transpose()?;
        let mut session = self.get(id).await?;

        self.transport
            .set_proxy(id, proxy.as_ref())
            .await
            .map_err(|source| SessionError::transport(id, "set proxy on", source))?;

        session.set_proxy(proxy, Utc::now());
        self.persist(session.clone()).await?;
        Ok(session)
    }

    pub async fn proxy(&self, id: &SessionId) -> Result<Option<ProxyConfig>, SessionError> {
        let session = self.get(id).await?;
        match self.transport.proxy(id).await {
            Ok(Some(proxy)) => Ok(Some(proxy)),
            Ok(None) => Ok(session.proxy),
            Err(error) => {
                debug!(
                    event_name = "session.proxy.transport_lookup_failed",
                    session_id = %id,
                    error = %error,
                    "falling back to stored proxy"
                );
                Ok(session.proxy)
            }
        }
    }

    /// Applies one transport event to the stored session. Replaying an event is harmless.
    pub async fn handle_event(
        &self,
        event: TransportEvent,
    ) -> Result<EventDisposition, SessionError> {
        let TransportEvent { session_id, kind } = event;
        let Some(mut session) = self.repository.find_by_id(&session_id).await? else {
            warn!(
                event_name = "session.event.unknown_session",
                session_id = %session_id,
                transport_event = kind.name(),
                "dropping transport event for unknown session"
            );
            return Ok(EventDisposition::UnknownSession);
        };

        let now = Utc::now();
        let event_name = kind.name();
        match kind {
            TransportEventKind::QrCode { code, expires_at } => {
                if session.is_connected() {
                    session.mark_disconnected(now)?;
                }
                session.show_qr(code, expires_at, now)?;
            }
            TransportEventKind::PairSuccess { device_jid } => {
                session.record_pairing(device_jid, now);
            }
            TransportEventKind::Connected { device_jid } => {
                if session.connection_state == ConnectionState::LoggedOut {
                    session.begin_connecting(now)?;
                }
                session.mark_connected(device_jid, now)?;
            }
            TransportEventKind::Disconnected { reason } => match session.connection_state {
                ConnectionState::Connecting | ConnectionState::Connected | ConnectionState::Error => {
                    session.mark_disconnected(now)?;
                    if let Some(reason) = reason.filter(|reason| !reason.trim().is_empty()) {
                        session.last_error = Some(reason);
                    }
                }
                ConnectionState::Created
                | ConnectionState::Disconnected
                | ConnectionState::LoggedOut => {}
            },
            TransportEventKind::LoggedOut => session.mark_logged_out(now),
            TransportEventKind::Error { message } => {
                if session.connection_state == ConnectionState::LoggedOut {
                    session.record_error(message, now);
                } else {
                    session.mark_failed(message, now)?;
                }
            }
            TransportEventKind::IncomingMessage(_) => session.mark_seen(now),
        }

        match self.repository.save(session.clone()).await {
            Ok(()) => {}
            Err(RepositoryError::NotFound { .. }) => {
                warn!(
                    event_name = "session.event.deleted_session",
                    session_id = %session_id,
                    transport_event = event_name,
                    "session deleted while the event was applied; dropping it"
                );
                return Ok(EventDisposition::UnknownSession);
            }
            Err(error) => return Err(error.into()),
        }
        debug!(
            event_name = "session.event.applied",
            session_id = %session_id,
            transport_event = event_name,
            connection_state = session.connection_state.as_str(),
            "transport event applied"
        );
        Ok(EventDisposition::Applied)
    }

    /// Writes back a record read earlier; a row deleted in the meantime stays deleted.
    async fn persist(&self, session: Session) -> Result<(), SessionError> {
        let id = session.id.clone();
        self.repository.save(session).await.map_err(|error| match error {
            RepositoryError::NotFound { .. } => SessionError::NotFound(id),
            other => other.into(),
        })
    }

    /// Records a transport failure unless the session was deleted while the transport call ran.
    async fn persist_unless_deleted(
        &self,
        session: Session,
        operation: &'static str,
    ) -> Result<(), SessionError> {
        match self.persist(session).await {
            Err(SessionError::NotFound(id)) => {
                warn!(
                    event_name = "session.write.deleted_session",
                    session_id = %id,
                    operation,
                    "session deleted during transport call; failure not recorded"
                );
                Ok(())
            }
            other => other,
        }
    }

    async fn reconcile_connected(&self, session: &mut Session) -> Result<(), SessionError> {
        let device_jid = self.transport.device_info(&session.id).await.map(|device| device.jid);
        if session.is_connected() && (device_jid.is_none() || device_jid == session.device_jid) {
            return Ok(());
        }

        let now = Utc::now();
        if session.connection_state == ConnectionState::LoggedOut {
            session.begin_connecting(now)?;
        }
        session.mark_connected(device_jid, now)?;
        self.persist(session.clone()).await?;
        info!(
            event_name = "session.reconcile.connected",
            session_id = %session.id,
            "stored state reconciled to transport connection"
        );
        Ok(())
    }

    /// Runs the transport disconnect on its own task and stops waiting after the configured
    /// deadline. A late or failed disconnect is logged and otherwise ignored.
    async fn bounded_disconnect(&self, id: &SessionId) {
        let transport = Arc::clone(&self.transport);
        let task_id = id.clone();
        let handle = tokio::spawn(async move { transport.disconnect_session(&task_id).await });

        match tokio::time::timeout(self.settings.disconnect_timeout, handle).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(error))) => warn!(
                event_name = "session.disconnect.transport_failed",
                session_id = %id,
                error = %error,
                "transport disconnect failed"
            ),
            Ok(Err(join_error)) => warn!(
                event_name = "session.disconnect.task_failed",
                session_id = %id,
                error = %join_error,
                "transport disconnect task aborted"
            ),
            Err(_) => warn!(
                event_name = "session.disconnect.timeout",
                session_id = %id,
                timeout_secs = self.settings.disconnect_timeout.as_secs(),
                "transport disconnect timed out; continuing"
            ),
        }
    }
}

fn ttl(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::seconds(120))
}
