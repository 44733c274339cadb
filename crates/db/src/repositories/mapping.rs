use chrono::Utc;
use sqlx::{sqlite::SqliteRow, Row};

use zapwoot_core::domain::mapping::{MessageDirection, MessageMapping, NewMessageMapping};
use zapwoot_core::domain::session::SessionId;

use super::session::parse_timestamp;
use super::{mapping_not_found, MessageMappingStore, RepositoryError};
use crate::DbPool;

const MAPPING_COLUMNS: &str = "session_id,
                whatsapp_message_id,
                direction,
                remote_phone,
                message_type,
                content,
                timestamp,
                crm_message_id,
                crm_conversation_id,
                created_at,
                updated_at";

pub struct SqlMessageMappingStore {
    pool: DbPool,
}

impl SqlMessageMappingStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl MessageMappingStore for SqlMessageMappingStore {
    async fn create_mapping(
        &self,
        mapping: NewMessageMapping,
    ) -> Result<MessageMapping, RepositoryError> {
        let session_id = mapping.session_id.clone();
        let whatsapp_message_id = mapping.whatsapp_message_id.clone();
        let row = MessageMapping::from_new(mapping, Utc::now());

        sqlx::query(&format!(
            "INSERT INTO message_mapping ({MAPPING_COLUMNS})
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(session_id, whatsapp_message_id) DO NOTHING"
        ))
        .bind(row.session_id.as_str())
        .bind(&row.whatsapp_message_id)
        .bind(row.direction.as_str())
        .bind(&row.remote_phone)
        .bind(&row.message_type)
        .bind(&row.content)
        .bind(row.timestamp.to_rfc3339())
        .bind(row.crm_message_id)
        .bind(row.crm_conversation_id)
        .bind(row.created_at.to_rfc3339())
        .bind(row.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        self.find_by_whatsapp_id(&session_id, &whatsapp_message_id)
            .await?
            .ok_or_else(|| mapping_not_found(&session_id, &whatsapp_message_id))
    }

    async fn update_mapping(
        &self,
        session_id: &SessionId,
        whatsapp_message_id: &str,
        crm_message_id: i64,
        crm_conversation_id: i64,
    ) -> Result<MessageMapping, RepositoryError> {
        let result = sqlx::query(
            "UPDATE message_mapping
             SET crm_message_id = ?, crm_conversation_id = ?, updated_at = ?
             WHERE session_id = ? AND whatsapp_message_id = ?",
        )
        .bind(crm_message_id)
        .bind(crm_conversation_id)
        .bind(Utc::now().to_rfc3339())
        .bind(session_id.as_str())
        .bind(whatsapp_message_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(mapping_not_found(session_id, whatsapp_message_id));
        }

        self.find_by_whatsapp_id(session_id, whatsapp_message_id)
            .await?
            .ok_or_else(|| mapping_not_found(session_id, whatsapp_message_id))
    }

    async fn find_by_whatsapp_id(
        &self,
        session_id: &SessionId,
        whatsapp_message_id: &str,
    ) -> Result<Option<MessageMapping>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {MAPPING_COLUMNS}
             FROM message_mapping
             WHERE session_id = ? AND whatsapp_message_id = ?"
        ))
        .bind(session_id.as_str())
        .bind(whatsapp_message_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(mapping_from_row).transpose()
    }

    async fn find_by_crm_message_id(
        &self,
        session_id: &SessionId,
        crm_message_id: i64,
    ) -> Result<Option<MessageMapping>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {MAPPING_COLUMNS}
             FROM message_mapping
             WHERE session_id = ? AND crm_message_id = ?
             ORDER BY created_at ASC
             LIMIT 1"
        ))
        .bind(session_id.as_str())
        .bind(crm_message_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(mapping_from_row).transpose()
    }

    async fn list_for_session(
        &self,
        session_id: &SessionId,
    ) -> Result<Vec<MessageMapping>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {MAPPING_COLUMNS}
             FROM message_mapping
             WHERE session_id = ?
             ORDER BY timestamp ASC, id ASC"
        ))
        .bind(session_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(mapping_from_row).collect()
    }
}

fn mapping_from_row(row: SqliteRow) -> Result<MessageMapping, RepositoryError> {
    let direction_raw = row.try_get::<String, _>("direction")?;
    let direction = MessageDirection::parse(&direction_raw).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown message direction `{direction_raw}`"))
    })?;

    Ok(MessageMapping {
        session_id: SessionId(row.try_get("session_id")?),
        whatsapp_message_id: row.try_get("whatsapp_message_id")?,
        direction,
        remote_phone: row.try_get("remote_phone")?,
        message_type: row.try_get("message_type")?,
        content: row.try_get("content")?,
        timestamp: parse_timestamp("timestamp", row.try_get("timestamp")?)?,
        crm_message_id: row.try_get("crm_message_id")?,
        crm_conversation_id: row.try_get("crm_conversation_id")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}
