use thiserror::Error;

use zapwoot_core::crm::CrmError;
use zapwoot_core::domain::session::{ConnectionState, InvalidProxy, SessionId, SessionTransitionError};
use zapwoot_core::errors::{Classify, ErrorKind};
use zapwoot_core::qr::QrRenderError;
use zapwoot_core::transport::TransportError;
use zapwoot_db::repositories::RepositoryError;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session `{0}` not found")]
    NotFound(SessionId),
    #[error("session `{0}` already exists")]
    AlreadyExists(SessionId),
    #[error("session `{0}` is already connected")]
    AlreadyConnected(SessionId),
    #[error("session `{0}` is already disconnected")]
    AlreadyDisconnected(SessionId),
    #[error("session `{id}` cannot {operation} while `{state}`")]
    InvalidState { id: SessionId, operation: &'static str, state: ConnectionState },
    #[error("no qr code available for session `{0}`")]
    QrNotFound(SessionId),
    #[error("qr code for session `{0}` has expired")]
    QrExpired(SessionId),
    #[error("invalid phone number `{0}`")]
    InvalidPhone(String),
    #[error(transparent)]
    InvalidTransition(#[from] SessionTransitionError),
    #[error(transparent)]
    InvalidProxy(#[from] InvalidProxy),
    #[error("transport failed to {operation} session `{id}`: {source}")]
    Transport {
        id: SessionId,
        operation: &'static str,
        #[source]
        source: TransportError,
    },
    #[error(transparent)]
    Qr(#[from] QrRenderError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl SessionError {
    pub(crate) fn transport(id: &SessionId, operation: &'static str, source: TransportError) -> Self {
        Self::Transport { id: id.clone(), operation, source }
    }
}

impl Classify for SessionError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) | Self::QrNotFound(_) => ErrorKind::NotFound,
            Self::AlreadyExists(_) | Self::AlreadyConnected(_) | Self::AlreadyDisconnected(_) => {
                ErrorKind::Conflict
            }
            Self::InvalidState { .. } | Self::InvalidTransition(_) | Self::QrExpired(_) => {
                ErrorKind::InvalidState
            }
            Self::InvalidPhone(_) | Self::InvalidProxy(_) | Self::Qr(_) => ErrorKind::Validation,
            Self::Transport { .. } => ErrorKind::TransportFailure,
            Self::Repository(error) => error.kind(),
        }
    }
}

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("failed to send message to `{recipient}` on session `{session_id}`: {source}")]
    Send {
        session_id: SessionId,
        recipient: String,
        #[source]
        source: TransportError,
    },
    #[error(transparent)]
    Crm(#[from] CrmError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl Classify for BridgeError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Send { .. } => ErrorKind::TransportFailure,
            Self::Crm(error) => error.kind(),
            Self::Repository(error) => error.kind(),
        }
    }
}
