//! Chatwoot application API client.
//!
//! Implements the directory lookups used to resolve recipients and the inbox writes used to
//! relay incoming WhatsApp messages. Every request authenticates with the account's
//! `api_access_token`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client, Response, StatusCode};
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use zapwoot_core::config::ChatwootConfig;
use zapwoot_core::crm::{
    CrmContact, CrmConversation, CrmDirectory, CrmError, CrmInbox, CrmMessageRef,
};
use zapwoot_core::transport::IncomingMessage;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const INCOMING_MESSAGE_TYPE: i64 = 0;

#[derive(Clone, Debug)]
pub struct ChatwootClient {
    client: Client,
    base_url: String,
    account_id: i64,
    inbox_id: i64,
}

impl ChatwootClient {
    pub fn from_config(config: &ChatwootConfig) -> Result<Self, CrmError> {
        let base_url = config
            .base_url
            .as_deref()
            .ok_or_else(|| CrmError::Request("chatwoot.base_url is not configured".to_string()))?;
        let token = config
            .api_token
            .as_ref()
            .ok_or_else(|| CrmError::Request("chatwoot.api_token is not configured".to_string()))?;

        Self::new(base_url, token.expose_secret(), config.account_id, config.inbox_id)
    }

    pub fn new(
        base_url: &str,
        api_token: &str,
        account_id: i64,
        inbox_id: i64,
    ) -> Result<Self, CrmError> {
        let mut headers = HeaderMap::new();
        let mut token = HeaderValue::from_str(api_token)
            .map_err(|error| CrmError::Request(format!("invalid api token header value: {error}")))?;
        token.set_sensitive(true);
        headers.insert("api_access_token", token);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|error| CrmError::Request(format!("failed to build http client: {error}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            account_id,
            inbox_id,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1/accounts/{}/{}", self.base_url, self.account_id, path)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        resource: &'static str,
        id: i64,
    ) -> Result<T, CrmError> {
        let response = self.client.get(self.url(path)).send().await.map_err(request_error)?;
        decode(response, resource, id).await
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &Value,
        resource: &'static str,
    ) -> Result<T, CrmError> {
        let response =
            self.client.post(self.url(path)).json(body).send().await.map_err(request_error)?;
        decode(response, resource, 0).await
    }

    async fn find_or_create_contact(&self, message: &IncomingMessage) -> Result<i64, CrmError> {
        let phone = digits(&message.from_phone);
        let response = self
            .client
            .get(self.url("contacts/search"))
            .query(&[("q", phone.as_str())])
            .send()
            .await
            .map_err(request_error)?;
        let search: Payload<Vec<ContactBody>> = decode(response, "contact", 0).await?;

        let existing = search.payload.into_iter().find(|contact| {
            contact.phone_number.as_deref().map(digits).as_deref() == Some(phone.as_str())
        });
        if let Some(contact) = existing {
            return Ok(contact.id);
        }

        let name = message
            .push_name
            .clone()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| phone.clone());
        let created: Payload<CreatedContact> = self
            .post_json(
                "contacts",
                &json!({
                    "inbox_id": self.inbox_id,
                    "name": name,
                    "phone_number": format!("+{phone}"),
                }),
                "contact",
            )
            .await?;
        debug!(
            event_name = "chatwoot.contact.created",
            contact_id = created.payload.contact.id,
            "chatwoot contact created"
        );
        Ok(created.payload.contact.id)
    }

    async fn find_or_create_conversation(&self, contact_id: i64) -> Result<i64, CrmError> {
        let conversations: Payload<Vec<ConversationBody>> = self
            .get_json(&format!("contacts/{contact_id}/conversations"), "contact", contact_id)
            .await?;

        let open = conversations.payload.into_iter().find(|conversation| {
            conversation.inbox_id == Some(self.inbox_id)
                && conversation.status.as_deref() != Some("resolved")
        });
        if let Some(conversation) = open {
            return Ok(conversation.id);
        }

        let created: ConversationBody = self
            .post_json(
                "conversations",
                &json!({ "inbox_id": self.inbox_id, "contact_id": contact_id }),
                "conversation",
            )
            .await?;
        Ok(created.id)
    }
}

#[async_trait]
impl CrmDirectory for ChatwootClient {
    async fn conversation(&self, conversation_id: i64) -> Result<CrmConversation, CrmError> {
        let body: ConversationBody = self
            .get_json(&format!("conversations/{conversation_id}"), "conversation", conversation_id)
            .await?;
        Ok(body.into())
    }

    async fn contact(&self, contact_id: i64) -> Result<CrmContact, CrmError> {
        let body: MaybePayload<ContactBody> =
            self.get_json(&format!("contacts/{contact_id}"), "contact", contact_id).await?;
        let contact = body.into_inner();
        Ok(CrmContact { id: contact.id, name: contact.name, phone_number: contact.phone_number })
    }

    async fn conversation_sender_phone(
        &self,
        conversation_id: i64,
    ) -> Result<Option<String>, CrmError> {
        let messages: Payload<Vec<MessageBody>> = self
            .get_json(
                &format!("conversations/{conversation_id}/messages"),
                "conversation",
                conversation_id,
            )
            .await?;

        Ok(messages
            .payload
            .into_iter()
            .rev()
            .filter(|message| message.message_type == Some(INCOMING_MESSAGE_TYPE))
            .find_map(|message| {
                message
                    .sender
                    .and_then(|sender| sender.phone_number)
                    .filter(|phone| !phone.trim().is_empty())
            }))
    }
}

#[async_trait]
impl CrmInbox for ChatwootClient {
    async fn deliver_incoming(
        &self,
        message: &IncomingMessage,
        source_id: &str,
    ) -> Result<CrmMessageRef, CrmError> {
        let contact_id = self.find_or_create_contact(message).await?;
        let conversation_id = self.find_or_create_conversation(contact_id).await?;

        let created: MessageBody = self
            .post_json(
                &format!("conversations/{conversation_id}/messages"),
                &json!({
                    "content": message.content,
                    "message_type": "incoming",
                    "private": false,
                    "source_id": source_id,
                }),
                "message",
            )
            .await?;

        Ok(CrmMessageRef { conversation_id, message_id: created.id })
    }
}

/// Directory used while the Chatwoot integration is switched off. Recipients can then only be
/// resolved from the webhook payload itself.
pub struct DisabledCrm;

#[async_trait]
impl CrmDirectory for DisabledCrm {
    async fn conversation(&self, _conversation_id: i64) -> Result<CrmConversation, CrmError> {
        Err(CrmError::Disabled)
    }

    async fn contact(&self, _contact_id: i64) -> Result<CrmContact, CrmError> {
        Err(CrmError::Disabled)
    }

    async fn conversation_sender_phone(
        &self,
        _conversation_id: i64,
    ) -> Result<Option<String>, CrmError> {
        Err(CrmError::Disabled)
    }
}

fn request_error(error: reqwest::Error) -> CrmError {
    if error.is_timeout() {
        CrmError::Timeout(error.to_string())
    } else {
        CrmError::Request(error.to_string())
    }
}

async fn decode<T: DeserializeOwned>(
    response: Response,
    resource: &'static str,
    id: i64,
) -> Result<T, CrmError> {
    let status = response.status();
    if status == StatusCode::NOT_FOUND {
        return Err(CrmError::NotFound { resource, id });
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(CrmError::Request(format!("chatwoot returned {status}: {body}")));
    }
    response.json().await.map_err(|error| CrmError::Decode(error.to_string()))
}

fn digits(raw: &str) -> String {
    raw.chars().filter(char::is_ascii_digit).collect()
}

#[derive(Debug, Deserialize)]
struct Payload<T> {
    payload: T,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MaybePayload<T> {
    Wrapped { payload: T },
    Bare(T),
}

impl<T> MaybePayload<T> {
    fn into_inner(self) -> T {
        match self {
            Self::Wrapped { payload } => payload,
            Self::Bare(inner) => inner,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ContactBody {
    id: i64,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    phone_number: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreatedContact {
    contact: ContactBody,
}

#[derive(Debug, Default, Deserialize)]
struct ConversationBody {
    id: i64,
    #[serde(default)]
    inbox_id: Option<i64>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    meta: Option<ConversationMeta>,
    #[serde(default)]
    contact_inbox: Option<ContactInbox>,
}

#[derive(Debug, Default, Deserialize)]
struct ConversationMeta {
    #[serde(default)]
    sender: Option<ContactBody>,
}

#[derive(Debug, Default, Deserialize)]
struct ContactInbox {
    #[serde(default)]
    contact_id: Option<i64>,
}

impl From<ConversationBody> for CrmConversation {
    fn from(body: ConversationBody) -> Self {
        let contact_id = body
            .meta
            .and_then(|meta| meta.sender)
            .map(|sender| sender.id)
            .or_else(|| body.contact_inbox.and_then(|inbox| inbox.contact_id));
        Self { id: body.id, contact_id, inbox_id: body.inbox_id, status: body.status }
    }
}

#[derive(Debug, Deserialize)]
struct MessageBody {
    id: i64,
    #[serde(default)]
    message_type: Option<i64>,
    #[serde(default)]
    sender: Option<MessageSender>,
}

#[derive(Debug, Deserialize)]
struct MessageSender {
    #[serde(default)]
    phone_number: Option<String>,
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use zapwoot_core::crm::{CrmDirectory, CrmError, CrmInbox, CrmMessageRef};
    use zapwoot_core::errors::{Classify, ErrorKind};
    use zapwoot_core::transport::IncomingMessage;

    use super::ChatwootClient;

    fn client(server: &MockServer) -> ChatwootClient {
        ChatwootClient::new(&server.uri(), "cw-token", 7, 3).expect("client")
    }

    #[tokio::test]
    async fn conversation_lookup_reads_contact_from_meta_sender() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/accounts/7/conversations/456"))
            .and(header("api_access_token", "cw-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": 456,
                "inbox_id": 3,
                "status": "open",
                "meta": { "sender": { "id": 12, "phone_number": "+5511999999999" } }
            })))
            .mount(&server)
            .await;

        let conversation = client(&server).conversation(456).await.expect("conversation");

        assert_eq!(conversation.contact_id, Some(12));
        assert_eq!(conversation.inbox_id, Some(3));
    }

    #[tokio::test]
    async fn contact_lookup_accepts_wrapped_payload_and_maps_404() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/accounts/7/contacts/12"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "payload": { "id": 12, "name": "Maria", "phone_number": "+5511999999999" }
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/accounts/7/contacts/13"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = client(&server);
        let contact = client.contact(12).await.expect("contact");
        assert_eq!(contact.phone_number.as_deref(), Some("+5511999999999"));

        let missing = client.contact(13).await.expect_err("missing contact");
        assert!(matches!(missing, CrmError::NotFound { resource: "contact", id: 13 }));
        assert_eq!(missing.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn sender_phone_comes_from_latest_incoming_message() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/accounts/7/conversations/456/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "payload": [
                    { "id": 1, "message_type": 0, "sender": { "phone_number": "+5511111111111" } },
                    { "id": 2, "message_type": 0, "sender": { "phone_number": "+5511222222222" } },
                    { "id": 3, "message_type": 1, "sender": { "phone_number": null } }
                ]
            })))
            .mount(&server)
            .await;

        let phone = client(&server).conversation_sender_phone(456).await.expect("sender");
        assert_eq!(phone.as_deref(), Some("+5511222222222"));
    }

    #[tokio::test]
    async fn deliver_incoming_reuses_contact_and_open_conversation() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/accounts/7/contacts/search"))
            .and(query_param("q", "5511999999999"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "payload": [{ "id": 12, "name": "Maria", "phone_number": "+55 11 99999-9999" }]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/accounts/7/contacts/12/conversations"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "payload": [
                    { "id": 400, "inbox_id": 3, "status": "resolved" },
                    { "id": 456, "inbox_id": 3, "status": "open" }
                ]
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v1/accounts/7/conversations/456/messages"))
            .and(body_partial_json(json!({
                "content": "oi",
                "message_type": "incoming",
                "source_id": "WAID:3EB0AA"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": 9001 })))
            .expect(1)
            .mount(&server)
            .await;

        let message = IncomingMessage {
            message_id: "3EB0AA".to_string(),
            from_phone: "5511999999999".to_string(),
            to_phone: "5511000000001".to_string(),
            push_name: Some("Maria".to_string()),
            content: "oi".to_string(),
            message_type: "text".to_string(),
            timestamp: Utc::now(),
            from_me: false,
        };

        let delivered =
            client(&server).deliver_incoming(&message, "WAID:3EB0AA").await.expect("deliver");

        assert_eq!(delivered, CrmMessageRef { conversation_id: 456, message_id: 9001 });
    }

    #[tokio::test]
    async fn server_errors_are_request_failures() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/accounts/7/conversations/456"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let error = client(&server).conversation(456).await.expect_err("server error");

        assert!(matches!(error, CrmError::Request(ref message) if message.contains("500")));
        assert_eq!(error.kind(), ErrorKind::TransportFailure);
    }
}
