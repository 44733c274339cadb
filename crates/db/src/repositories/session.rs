use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use zapwoot_core::domain::session::{ConnectionState, ProxyConfig, Session, SessionId};

use super::{session_not_found, RepositoryError, SessionRepository};
use crate::DbPool;

const SESSION_COLUMNS: &str = "id,
                name,
                device_jid,
                connection_state,
                qr_code,
                qr_expires_at,
                last_error,
                connected_at,
                last_seen_at,
                proxy_url,
                created_at,
                updated_at";

pub struct SqlSessionRepository {
    pool: DbPool,
}

impl SqlSessionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl SessionRepository for SqlSessionRepository {
    async fn find_by_id(&self, id: &SessionId) -> Result<Option<Session>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {SESSION_COLUMNS} FROM wa_session WHERE id = ?"))
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(session_from_row).transpose()
    }

    async fn list(&self) -> Result<Vec<Session>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {SESSION_COLUMNS} FROM wa_session ORDER BY created_at ASC, id ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(session_from_row).collect()
    }

    async fn insert(&self, session: Session) -> Result<bool, RepositoryError> {
        let result = sqlx::query(&format!(
            "INSERT INTO wa_session ({SESSION_COLUMNS})
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO NOTHING"
        ))
        .bind(session.id.as_str())
        .bind(&session.name)
        .bind(session.device_jid.as_deref())
        .bind(session.connection_state.as_str())
        .bind(session.qr_code.as_deref())
        .bind(session.qr_expires_at.map(|value| value.to_rfc3339()))
        .bind(session.last_error.as_deref())
        .bind(session.connected_at.map(|value| value.to_rfc3339()))
        .bind(session.last_seen_at.map(|value| value.to_rfc3339()))
        .bind(session.proxy.as_ref().map(|proxy| proxy.url.as_str()))
        .bind(session.created_at.to_rfc3339())
        .bind(session.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn save(&self, session: Session) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE wa_session SET
                name = ?,
                device_jid = ?,
                connection_state = ?,
                qr_code = ?,
                qr_expires_at = ?,
                last_error = ?,
                connected_at = ?,
                last_seen_at = ?,
                proxy_url = ?,
                updated_at = ?
             WHERE id = ?",
        )
        .bind(&session.name)
        .bind(session.device_jid.as_deref())
        .bind(session.connection_state.as_str())
        .bind(session.qr_code.as_deref())
        .bind(session.qr_expires_at.map(|value| value.to_rfc3339()))
        .bind(session.last_error.as_deref())
        .bind(session.connected_at.map(|value| value.to_rfc3339()))
        .bind(session.last_seen_at.map(|value| value.to_rfc3339()))
        .bind(session.proxy.as_ref().map(|proxy| proxy.url.as_str()))
        .bind(session.updated_at.to_rfc3339())
        .bind(session.id.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(session_not_found(&session.id));
        }
        Ok(())
    }

    async fn delete(&self, id: &SessionId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM wa_session WHERE id = ?")
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

fn session_from_row(row: SqliteRow) -> Result<Session, RepositoryError> {
    let state_raw = row.try_get::<String, _>("connection_state")?;
    let connection_state = ConnectionState::parse(&state_raw).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown connection state `{state_raw}`"))
    })?;

    // Stored proxies were validated on the way in; keep them verbatim.
    let proxy = row.try_get::<Option<String>, _>("proxy_url")?.map(|url| ProxyConfig { url });

    Ok(Session {
        id: SessionId(row.try_get("id")?),
        name: row.try_get("name")?,
        device_jid: row.try_get("device_jid")?,
        connection_state,
        qr_code: row.try_get("qr_code")?,
        qr_expires_at: parse_optional_timestamp("qr_expires_at", row.try_get("qr_expires_at")?)?,
        last_error: row.try_get("last_error")?,
        connected_at: parse_optional_timestamp("connected_at", row.try_get("connected_at")?)?,
        last_seen_at: parse_optional_timestamp("last_seen_at", row.try_get("last_seen_at")?)?,
        proxy,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

pub(crate) fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}

pub(crate) fn parse_optional_timestamp(
    column: &str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    value.map(|timestamp| parse_timestamp(column, timestamp)).transpose()
}
