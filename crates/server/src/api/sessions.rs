use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use zapwoot_bridge::{NewSession, QrCodeImage};
use zapwoot_core::domain::session::{ConnectionState, Session, SessionId};

use super::{ApiError, ApiState};

pub fn routes() -> Router<ApiState> {
    Router::new()
        .route("/api/v1/sessions", get(list_sessions).post(create_session))
        .route("/api/v1/sessions/{id}", get(get_session).delete(delete_session))
        .route("/api/v1/sessions/{id}/connect", post(connect_session))
        .route("/api/v1/sessions/{id}/disconnect", post(disconnect_session))
        .route("/api/v1/sessions/{id}/logout", post(logout_session))
        .route("/api/v1/sessions/{id}/pair", post(pair_phone))
        .route("/api/v1/sessions/{id}/qr", get(qr_code))
        .route("/api/v1/sessions/{id}/proxy", get(get_proxy).put(set_proxy))
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateSessionRequest {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub proxy: Option<String>,
    #[serde(default)]
    pub qr_on_create: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct PairRequest {
    pub phone: String,
}

#[derive(Debug, Serialize)]
pub struct PairResponse {
    pub session_id: String,
    pub code: String,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ProxyBody {
    #[serde(default)]
    pub proxy: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SessionView {
    pub id: String,
    pub name: String,
    pub device_jid: Option<String>,
    pub connection_state: ConnectionState,
    pub awaiting_scan: bool,
    pub last_error: Option<String>,
    pub proxy: Option<String>,
    pub connected_at: Option<DateTime<Utc>>,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Session> for SessionView {
    fn from(session: Session) -> Self {
        Self {
            awaiting_scan: session.qr_code.is_some(),
            id: session.id.0,
            name: session.name,
            device_jid: session.device_jid,
            connection_state: session.connection_state,
            last_error: session.last_error,
            proxy: session.proxy.map(|proxy| proxy.url),
            connected_at: session.connected_at,
            last_seen_at: session.last_seen_at,
            created_at: session.created_at,
            updated_at: session.updated_at,
        }
    }
}

async fn list_sessions(State(state): State<ApiState>) -> Result<Json<Vec<SessionView>>, ApiError> {
    let sessions = state.sessions.list().await?;
    Ok(Json(sessions.into_iter().map(SessionView::from).collect()))
}

async fn create_session(
    State(state): State<ApiState>,
    Json(request): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<SessionView>), ApiError> {
    let session = state
        .sessions
        .create(NewSession {
            id: request.id.map(|id| SessionId(id.trim().to_string())),
            name: request.name.unwrap_or_default(),
            proxy: request.proxy.filter(|proxy| !proxy.trim().is_empty()),
            qr_on_create: request.qr_on_create,
        })
        .await?;

    info!(
        event_name = "system.api.session_created",
        session_id = %session.id,
        "session created through api"
    );
    Ok((StatusCode::CREATED, Json(session.into())))
}

async fn get_session(
    Path(id): Path<String>,
    State(state): State<ApiState>,
) -> Result<Json<SessionView>, ApiError> {
    Ok(Json(state.sessions.get(&SessionId(id)).await?.into()))
}

async fn delete_session(
    Path(id): Path<String>,
    State(state): State<ApiState>,
) -> Result<StatusCode, ApiError> {
    state.sessions.delete(&SessionId(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn connect_session(
    Path(id): Path<String>,
    State(state): State<ApiState>,
) -> Result<Json<SessionView>, ApiError> {
    Ok(Json(state.sessions.connect(&SessionId(id)).await?.into()))
}

async fn disconnect_session(
    Path(id): Path<String>,
    State(state): State<ApiState>,
) -> Result<Json<SessionView>, ApiError> {
    Ok(Json(state.sessions.disconnect(&SessionId(id)).await?.into()))
}

async fn logout_session(
    Path(id): Path<String>,
    State(state): State<ApiState>,
) -> Result<Json<SessionView>, ApiError> {
    Ok(Json(state.sessions.logout(&SessionId(id)).await?.into()))
}

async fn pair_phone(
    Path(id): Path<String>,
    State(state): State<ApiState>,
    Json(request): Json<PairRequest>,
) -> Result<Json<PairResponse>, ApiError> {
    let code = state.sessions.pair_phone(&SessionId(id.clone()), &request.phone).await?;
    Ok(Json(PairResponse { session_id: id, code }))
}

async fn qr_code(
    Path(id): Path<String>,
    State(state): State<ApiState>,
) -> Result<Json<QrCodeImage>, ApiError> {
    Ok(Json(state.sessions.qr_code(&SessionId(id)).await?))
}

async fn get_proxy(
    Path(id): Path<String>,
    State(state): State<ApiState>,
) -> Result<Json<ProxyBody>, ApiError> {
    let proxy = state.sessions.proxy(&SessionId(id)).await?;
    Ok(Json(ProxyBody { proxy: proxy.map(|proxy| proxy.url) }))
}

async fn set_proxy(
    Path(id): Path<String>,
    State(state): State<ApiState>,
    Json(body): Json<ProxyBody>,
) -> Result<Json<SessionView>, ApiError> {
    let session = state.sessions.set_proxy(&SessionId(id), body.proxy.as_deref()).await?;
    Ok(Json(session.into()))
}
