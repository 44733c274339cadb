use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tokio::sync::Mutex;

use zapwoot_bridge::{
    BridgeService, BridgeSettings, NewSession, SessionService, SessionSettings, WebhookOutcome,
};
use zapwoot_core::crm::{CrmContact, CrmConversation, CrmDirectory, CrmError};
use zapwoot_core::domain::mapping::MessageDirection;
use zapwoot_core::domain::session::{ConnectionState, ProxyConfig, SessionId};
use zapwoot_core::domain::webhook::WebhookEvent;
use zapwoot_core::transport::{
    DeviceInfo, OutboundMessage, SentMessage, TransportError, TransportEvent, TransportEventKind,
    TransportManager,
};
use zapwoot_db::repositories::{MessageMappingStore, SqlMessageMappingStore, SqlSessionRepository};
use zapwoot_db::{connect_with_settings, migrations, DbPool};

#[derive(Default)]
struct LinkedPhone {
    sent: Mutex<Vec<OutboundMessage>>,
}

#[async_trait]
impl TransportManager for LinkedPhone {
    async fn create_session(
        &self,
        _session_id: &SessionId,
        _proxy: Option<&ProxyConfig>,
    ) -> Result<(), TransportError> {
        Ok(())
    }

    async fn connect_session(&self, _session_id: &SessionId) -> Result<(), TransportError> {
        Ok(())
    }

    async fn disconnect_session(&self, _session_id: &SessionId) -> Result<(), TransportError> {
        Ok(())
    }

    async fn logout_session(&self, _session_id: &SessionId) -> Result<(), TransportError> {
        Ok(())
    }

    async fn qr_code(&self, _session_id: &SessionId) -> Result<Option<String>, TransportError> {
        Ok(None)
    }

    async fn pair_phone(
        &self,
        _session_id: &SessionId,
        _phone: &str,
    ) -> Result<String, TransportError> {
        Ok("ABCD-EFGH".to_string())
    }

    async fn is_connected(&self, _session_id: &SessionId) -> bool {
        true
    }

    async fn device_info(&self, _session_id: &SessionId) -> Option<DeviceInfo> {
        Some(DeviceInfo {
            jid: "5511000000001@s.whatsapp.net".to_string(),
            phone: "5511000000001".to_string(),
            push_name: Some("Support".to_string()),
        })
    }

    async fn set_proxy(
        &self,
        _session_id: &SessionId,
        _proxy: Option<&ProxyConfig>,
    ) -> Result<(), TransportError> {
        Ok(())
    }

    async fn proxy(&self, _session_id: &SessionId) -> Result<Option<ProxyConfig>, TransportError> {
        Ok(None)
    }

    async fn send_message(
        &self,
        _session_id: &SessionId,
        message: OutboundMessage,
    ) -> Result<SentMessage, TransportError> {
        let mut sent = self.sent.lock().await;
        sent.push(message);
        Ok(SentMessage { message_id: format!("3EB0-{}", sent.len()), timestamp: Utc::now() })
    }
}

struct Directory;

#[async_trait]
impl CrmDirectory for Directory {
    async fn conversation(&self, id: i64) -> Result<CrmConversation, CrmError> {
        Ok(CrmConversation { id, contact_id: Some(1), inbox_id: Some(4), status: None })
    }

    async fn contact(&self, id: i64) -> Result<CrmContact, CrmError> {
        match id {
            1 => Ok(CrmContact {
                id,
                name: Some("Maria".to_string()),
                phone_number: Some("+5511999999999".to_string()),
            }),
            _ => Err(CrmError::NotFound { resource: "contact", id }),
        }
    }

    async fn conversation_sender_phone(&self, _id: i64) -> Result<Option<String>, CrmError> {
        Ok(None)
    }
}

async fn pool() -> DbPool {
    let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
    migrations::run_pending(&pool).await.expect("migrate");
    pool
}

#[tokio::test]
async fn chatwoot_reply_reaches_whatsapp_and_is_mapped() {
    let pool = pool().await;
    let transport = Arc::new(LinkedPhone::default());
    let mappings = Arc::new(SqlMessageMappingStore::new(pool.clone()));
    let sessions = SessionService::new(
        Arc::new(SqlSessionRepository::new(pool.clone())),
        transport.clone(),
        SessionSettings::default(),
    );
    let bridge = BridgeService::new(
        transport.clone(),
        mappings.clone(),
        Arc::new(Directory),
        BridgeSettings { settle_delay: Duration::ZERO, ..BridgeSettings::default() },
    );

    let session_id = SessionId::from("S-1");
    sessions
        .create(NewSession {
            id: Some(session_id.clone()),
            name: "support line".to_string(),
            ..NewSession::default()
        })
        .await
        .expect("create session");
    sessions
        .handle_event(TransportEvent::new(
            session_id.clone(),
            TransportEventKind::Connected {
                device_jid: Some("5511000000001@s.whatsapp.net".to_string()),
            },
        ))
        .await
        .expect("connected event");
    assert_eq!(
        sessions.get(&session_id).await.expect("get").connection_state,
        ConnectionState::Connected
    );

    let payload: WebhookEvent = serde_json::from_value(json!({
        "event": "message_created",
        "content": "hi",
        "message_type": "outgoing",
        "conversation": { "id": 456, "contact_id": 1 }
    }))
    .expect("payload");

    let outcome = bridge.process_webhook(&session_id, payload).await.expect("process webhook");
    bridge.flush().await;

    assert_eq!(
        outcome,
        WebhookOutcome::Forwarded {
            whatsapp_message_id: "3EB0-1".to_string(),
            recipient: "5511999999999".to_string(),
        }
    );
    assert_eq!(transport.sent.lock().await.len(), 1);

    let rows = mappings.list_for_session(&session_id).await.expect("mappings");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].direction, MessageDirection::Outbound);
    assert_eq!(rows[0].remote_phone, "5511999999999");
    assert_eq!(rows[0].content, "hi");
    assert_eq!(rows[0].crm_message_id, None);
}

#[tokio::test]
async fn connect_against_a_live_transport_is_a_conflict() {
    let pool = pool().await;
    let sessions = SessionService::new(
        Arc::new(SqlSessionRepository::new(pool)),
        Arc::new(LinkedPhone::default()),
        SessionSettings::default(),
    );
    let session_id = SessionId::from("S-2");
    sessions
        .create(NewSession { id: Some(session_id.clone()), ..NewSession::default() })
        .await
        .expect("create session");

    let error = sessions.connect(&session_id).await.expect_err("already connected");

    assert_eq!(zapwoot_core::errors::Classify::kind(&error).http_status(), 409);
    assert_eq!(
        sessions.get(&session_id).await.expect("get").connection_state,
        ConnectionState::Connected
    );
}
