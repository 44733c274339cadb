use async_trait::async_trait;
use thiserror::Error;

use zapwoot_core::domain::mapping::{MessageMapping, NewMessageMapping};
use zapwoot_core::domain::session::{Session, SessionId};
use zapwoot_core::errors::{Classify, ErrorKind};

pub mod mapping;
pub mod memory;
pub mod session;

pub use mapping::SqlMessageMappingStore;
pub use memory::{InMemoryMessageMappingStore, InMemorySessionRepository};
pub use session::SqlSessionRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("{entity} `{id}` not found")]
    NotFound { entity: &'static str, id: String },
}

impl Classify for RepositoryError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Database(_) | Self::Decode(_) => ErrorKind::Persistence,
        }
    }
}

#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn find_by_id(&self, id: &SessionId) -> Result<Option<Session>, RepositoryError>;
    async fn list(&self) -> Result<Vec<Session>, RepositoryError>;
    /// Inserts a new record; `false` when the id is already taken.
    async fn insert(&self, session: Session) -> Result<bool, RepositoryError>;
    /// Overwrites a stored record; `NotFound` once the row is gone, so a deleted session is never
    /// written back.
    async fn save(&self, session: Session) -> Result<(), RepositoryError>;
    async fn delete(&self, id: &SessionId) -> Result<bool, RepositoryError>;
}

/// Idempotent WhatsApp message id ↔ CRM message id bookkeeping.
#[async_trait]
pub trait MessageMappingStore: Send + Sync {
    /// Inserts the mapping, or returns the row already stored under the same key untouched.
    async fn create_mapping(
        &self,
        mapping: NewMessageMapping,
    ) -> Result<MessageMapping, RepositoryError>;

    /// Links an existing mapping to its CRM message. Fails with `NotFound` before creation.
    async fn update_mapping(
        &self,
        session_id: &SessionId,
        whatsapp_message_id: &str,
        crm_message_id: i64,
        crm_conversation_id: i64,
    ) -> Result<MessageMapping, RepositoryError>;

    async fn find_by_whatsapp_id(
        &self,
        session_id: &SessionId,
        whatsapp_message_id: &str,
    ) -> Result<Option<MessageMapping>, RepositoryError>;

    async fn find_by_crm_message_id(
        &self,
        session_id: &SessionId,
        crm_message_id: i64,
    ) -> Result<Option<MessageMapping>, RepositoryError>;

    async fn list_for_session(
        &self,
        session_id: &SessionId,
    ) -> Result<Vec<MessageMapping>, RepositoryError>;
}

pub(crate) fn session_not_found(id: &SessionId) -> RepositoryError {
    RepositoryError::NotFound { entity: "session", id: id.to_string() }
}

pub(crate) fn mapping_not_found(session_id: &SessionId, whatsapp_message_id: &str) -> RepositoryError {
    RepositoryError::NotFound {
        entity: "message mapping",
        id: format!("{session_id}/{whatsapp_message_id}"),
    }
}
