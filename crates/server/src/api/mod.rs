//! JSON API for session lifecycle and the Chatwoot webhook.

pub mod sessions;
pub mod webhook;

use std::sync::Arc;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json, Router,
};
use secrecy::SecretString;
use serde::Serialize;
use tracing::{error, warn};
use uuid::Uuid;

use zapwoot_bridge::{BridgeError, BridgeService, SessionError, SessionService};
use zapwoot_core::errors::{Classify, InterfaceError};

#[derive(Clone)]
pub struct ApiState {
    pub sessions: Arc<SessionService>,
    pub bridge: Arc<BridgeService>,
    pub webhook_secret: Option<SecretString>,
}

pub fn router(state: ApiState) -> Router {
    Router::new().merge(sessions::routes()).merge(webhook::routes()).with_state(state)
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub kind: &'static str,
    pub message: &'static str,
    pub correlation_id: String,
}

#[derive(Debug)]
pub enum ApiError {
    Classified(InterfaceError),
    Unauthorized(&'static str),
}

impl ApiError {
    fn classify<E: Classify>(error: &E) -> Self {
        Self::Classified(error.into_interface(Uuid::new_v4().to_string()))
    }
}

impl From<SessionError> for ApiError {
    fn from(error: SessionError) -> Self {
        Self::classify(&error)
    }
}

impl From<BridgeError> for ApiError {
    fn from(error: BridgeError) -> Self {
        Self::classify(&error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::Unauthorized(reason) => (
                StatusCode::UNAUTHORIZED,
                Json(ErrorBody {
                    error: reason.to_string(),
                    kind: "unauthorized",
                    message: "The request is not authorized.",
                    correlation_id: Uuid::new_v4().to_string(),
                }),
            )
                .into_response(),
            Self::Classified(interface) => {
                let status = StatusCode::from_u16(interface.status_code())
                    .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                if status.is_server_error() {
                    error!(
                        event_name = "system.api.request_failed",
                        correlation_id = %interface.correlation_id,
                        kind = interface.kind.as_str(),
                        error = %interface.message,
                        "request failed"
                    );
                } else {
                    warn!(
                        event_name = "system.api.request_rejected",
                        correlation_id = %interface.correlation_id,
                        kind = interface.kind.as_str(),
                        error = %interface.message,
                        "request rejected"
                    );
                }

                let body = ErrorBody {
                    message: interface.user_message(),
                    kind: interface.kind.as_str(),
                    error: interface.message,
                    correlation_id: interface.correlation_id,
                };
                (status, Json(body)).into_response()
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
        Router,
    };
    use secrecy::SecretString;
    use serde_json::Value;
    use tower::ServiceExt;

    use zapwoot_bridge::{
        BridgeService, BridgeSettings, SessionService, SessionSettings,
    };
    use zapwoot_db::repositories::{InMemoryMessageMappingStore, InMemorySessionRepository};

    use super::{router, ApiState};
    use crate::chatwoot::DisabledCrm;
    use crate::transport::DetachedTransport;

    pub fn app(webhook_secret: Option<&str>) -> Router {
        let transport = Arc::new(DetachedTransport::default());
        let sessions = Arc::new(SessionService::new(
            Arc::new(InMemorySessionRepository::default()),
            transport.clone(),
            SessionSettings { delete_settle: std::time::Duration::ZERO, ..SessionSettings::default() },
        ));
        let bridge = Arc::new(BridgeService::new(
            transport,
            Arc::new(InMemoryMessageMappingStore::default()),
            Arc::new(DisabledCrm),
            BridgeSettings { settle_delay: std::time::Duration::ZERO, ..BridgeSettings::default() },
        ));

        router(ApiState {
            sessions,
            bridge,
            webhook_secret: webhook_secret.map(|secret| SecretString::from(secret.to_string())),
        })
    }

    pub async fn send(
        app: &Router,
        method: &str,
        uri: &str,
        body: Option<Value>,
        headers: &[(&str, &str)],
    ) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }
        let request = match body {
            Some(body) => request
                .header("content-type", "application/json")
                .body(Body::from(body.to_string())),
            None => request.body(Body::empty()),
        }
        .expect("request");

        let response = app.clone().oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("json body")
        };
        (status, value)
    }
}
