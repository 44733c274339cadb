use std::collections::HashMap;

use chrono::Utc;
use tokio::sync::RwLock;

use zapwoot_core::domain::mapping::{MessageMapping, NewMessageMapping};
use zapwoot_core::domain::session::{Session, SessionId};

use super::{
    mapping_not_found, session_not_found, MessageMappingStore, RepositoryError, SessionRepository,
};

#[derive(Default)]
pub struct InMemorySessionRepository {
    sessions: RwLock<HashMap<String, Session>>,
}

#[async_trait::async_trait]
impl SessionRepository for InMemorySessionRepository {
    async fn find_by_id(&self, id: &SessionId) -> Result<Option<Session>, RepositoryError> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(id.as_str()).cloned())
    }

    async fn list(&self) -> Result<Vec<Session>, RepositoryError> {
        let sessions = self.sessions.read().await;
        let mut all: Vec<Session> = sessions.values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.0.cmp(&b.id.0)));
        Ok(all)
    }

    async fn insert(&self, session: Session) -> Result<bool, RepositoryError> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(session.id.as_str()) {
            return Ok(false);
        }
        sessions.insert(session.id.0.clone(), session);
        Ok(true)
    }

    async fn save(&self, session: Session) -> Result<(), RepositoryError> {
        let mut sessions = self.sessions.write().await;
        let Some(stored) = sessions.get_mut(session.id.as_str()) else {
            return Err(session_not_found(&session.id));
        };
        *stored = session;
        Ok(())
    }

    async fn delete(&self, id: &SessionId) -> Result<bool, RepositoryError> {
        let mut sessions = self.sessions.write().await;
        Ok(sessions.remove(id.as_str()).is_some())
    }
}

type MappingKey = (String, String);

#[derive(Default)]
pub struct InMemoryMessageMappingStore {
    mappings: RwLock<HashMap<MappingKey, MessageMapping>>,
}

impl InMemoryMessageMappingStore {
    pub async fn len(&self) -> usize {
        self.mappings.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.mappings.read().await.is_empty()
    }
}

fn key(session_id: &SessionId, whatsapp_message_id: &str) -> MappingKey {
    (session_id.0.clone(), whatsapp_message_id.to_string())
}

#[async_trait::async_trait]
impl MessageMappingStore for InMemoryMessageMappingStore {
    async fn create_mapping(
        &self,
        mapping: NewMessageMapping,
    ) -> Result<MessageMapping, RepositoryError> {
        let mut mappings = self.mappings.write().await;
        let entry = mappings
            .entry(key(&mapping.session_id, &mapping.whatsapp_message_id))
            .or_insert_with(|| MessageMapping::from_new(mapping, Utc::now()));
        Ok(entry.clone())
    }

    async fn update_mapping(
        &self,
        session_id: &SessionId,
        whatsapp_message_id: &str,
        crm_message_id: i64,
        crm_conversation_id: i64,
    ) -> Result<MessageMapping, RepositoryError> {
        let mut mappings = self.mappings.write().await;
        let existing = mappings
            .get_mut(&key(session_id, whatsapp_message_id))
            .ok_or_else(|| mapping_not_found(session_id, whatsapp_message_id))?;

        existing.crm_message_id = Some(crm_message_id);
        existing.crm_conversation_id = Some(crm_conversation_id);
        existing.updated_at = Utc::now();
        Ok(existing.clone())
    }

    async fn find_by_whatsapp_id(
        &self,
        session_id: &SessionId,
        whatsapp_message_id: &str,
    ) -> Result<Option<MessageMapping>, RepositoryError> {
        let mappings = self.mappings.read().await;
        Ok(mappings.get(&key(session_id, whatsapp_message_id)).cloned())
    }

    async fn find_by_crm_message_id(
        &self,
        session_id: &SessionId,
        crm_message_id: i64,
    ) -> Result<Option<MessageMapping>, RepositoryError> {
        let mappings = self.mappings.read().await;
        Ok(mappings
            .values()
            .filter(|mapping| {
                mapping.session_id == *session_id && mapping.crm_message_id == Some(crm_message_id)
            })
            .min_by_key(|mapping| mapping.created_at)
            .cloned())
    }

    async fn list_for_session(
        &self,
        session_id: &SessionId,
    ) -> Result<Vec<MessageMapping>, RepositoryError> {
        let mappings = self.mappings.read().await;
        let mut found: Vec<MessageMapping> =
            mappings.values().filter(|mapping| mapping.session_id == *session_id).cloned().collect();
        found.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        Ok(found)
    }
}
