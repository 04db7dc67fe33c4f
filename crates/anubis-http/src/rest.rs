use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::RwLock;
use tracing::{debug, info};

use anubis_core::config::{ClientConfig, MAX_MESSAGE_LIMIT};
use anubis_core::error::{AuthError, ServiceError};
use anubis_core::service::{ChatService, SnapshotStream};
use anubis_types::api::{
    Availability, CreateChannelRequest, CreateChannelResponse, CreateServerRequest,
    CreateServerResponse, Credentials, EditMessageRequest, ErrorBody, PresenceRequest,
    RegisterRequest, RegisterResponse, SendMessageRequest, SendMessageResponse, Session,
};
use anubis_types::models::{
    AccountId, Channel, ChannelId, ChannelKind, Message, MessageId, PresenceStatus, Server,
    ServerId, UserPresence,
};

use crate::gateway;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Why a REST call failed, before it is narrowed to the caller's error kind.
#[derive(Debug)]
pub(crate) enum Failure {
    Transport(String),
    Status {
        status: StatusCode,
        body: Option<ErrorBody>,
    },
    Decode(String),
}

impl From<Failure> for ServiceError {
    fn from(failure: Failure) -> Self {
        match failure {
            Failure::Transport(msg) => ServiceError::Network(msg),
            Failure::Status {
                status: StatusCode::UNAUTHORIZED,
                ..
            } => ServiceError::Unauthenticated,
            Failure::Status {
                status: StatusCode::NOT_FOUND,
                body,
            } => ServiceError::NotFound(body.map(|b| b.message).unwrap_or_default()),
            Failure::Status { status, body } => ServiceError::Protocol(match body {
                Some(body) => format!("{} ({}): {}", status, body.code, body.message),
                None => status.to_string(),
            }),
            Failure::Decode(msg) => ServiceError::Protocol(msg),
        }
    }
}

impl From<Failure> for AuthError {
    fn from(failure: Failure) -> Self {
        match failure {
            Failure::Status {
                body: Some(body), ..
            } => auth_error(&body),
            other => ServiceError::from(other).into(),
        }
    }
}

/// Maps the auth provider's error code to the message shown to the user.
pub fn auth_error(body: &ErrorBody) -> AuthError {
    match body.code.as_str() {
        "user-not-found" => AuthError::UserNotFound,
        "wrong-password" | "invalid-credential" => AuthError::WrongPassword,
        "invalid-email" => AuthError::InvalidEmail,
        "user-disabled" => AuthError::AccountDisabled,
        "email-already-in-use" => AuthError::EmailInUse,
        "username-already-in-use" => AuthError::UsernameTaken,
        "weak-password" => AuthError::WeakPassword,
        "operation-not-allowed" => AuthError::RegistrationClosed,
        _ if !body.message.is_empty() => AuthError::Rejected(body.message.clone()),
        other => AuthError::Rejected(other.to_string()),
    }
}

struct Inner {
    client: Client,
    api_url: String,
    gateway_url: String,
    message_limit: usize,
    token: RwLock<Option<String>>,
}

/// REST + gateway client. Cheap to clone; clones share the session token.
#[derive(Clone)]
pub struct HttpService {
    inner: Arc<Inner>,
}

impl HttpService {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            inner: Arc::new(Inner {
                client,
                api_url: config.api_url.trim_end_matches('/').to_string(),
                gateway_url: config.gateway_url.clone(),
                message_limit: config.sync.message_limit.min(MAX_MESSAGE_LIMIT),
                token: RwLock::new(None),
            }),
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.inner.api_url, path)
    }

    pub(crate) fn gateway_url(&self) -> &str {
        &self.inner.gateway_url
    }

    /// Page size used when a gateway event triggers a re-fetch.
    pub(crate) fn message_limit(&self) -> usize {
        self.inner.message_limit
    }

    /// Status of every account, for seeding the presence feed.
    pub(crate) async fn presence_roster(&self) -> Result<Vec<UserPresence>, ServiceError> {
        Ok(self.get("/users/presence").await?)
    }

    pub(crate) async fn token(&self) -> Option<String> {
        self.inner.token.read().await.clone()
    }

    async fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.inner.client.request(method, self.url(path));
        match self.token().await {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn call<T: DeserializeOwned>(builder: RequestBuilder) -> Result<T, Failure> {
        let response = Self::send(builder).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| Failure::Decode(e.to_string()))
    }

    async fn call_empty(builder: RequestBuilder) -> Result<(), Failure> {
        Self::send(builder).await.map(|_| ())
    }

    async fn send(builder: RequestBuilder) -> Result<Response, Failure> {
        let response = builder
            .send()
            .await
            .map_err(|e| Failure::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.json::<ErrorBody>().await.ok();
        debug!("request failed with {}: {:?}", status, body);
        Err(Failure::Status { status, body })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, Failure> {
        Self::call(self.request(Method::GET, path).await).await
    }

    async fn post<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, Failure> {
        Self::call(self.request(Method::POST, path).await.json(body)).await
    }

    async fn availability(&self, key: &str, value: &str) -> Result<Availability, ServiceError> {
        let builder = self
            .request(Method::GET, "/users/availability")
            .await
            .query(&[(key, value)]);
        Ok(Self::call(builder).await?)
    }
}

#[async_trait]
impl ChatService for HttpService {
    async fn check_name_available(&self, name: &str) -> Result<Availability, ServiceError> {
        self.availability("username", name).await
    }

    async fn check_email_available(&self, email: &str) -> Result<Availability, ServiceError> {
        self.availability("email", email).await
    }

    async fn register_account(&self, request: &RegisterRequest) -> Result<AccountId, AuthError> {
        let response: RegisterResponse = self.post("/auth/register", request).await?;
        Ok(response.account_id)
    }

    async fn authenticate(&self, credentials: &Credentials) -> Result<Session, AuthError> {
        let session: Session = self.post("/auth/login", credentials).await?;
        *self.inner.token.write().await = Some(session.token.clone());
        info!("Authenticated as {}", session.username);
        Ok(session)
    }

    async fn sign_out(&self, _account_id: &AccountId) -> Result<(), ServiceError> {
        let result = Self::call_empty(self.request(Method::POST, "/auth/logout").await).await;
        // The local token is dropped even when the backend call fails.
        *self.inner.token.write().await = None;
        Ok(result?)
    }

    async fn set_presence(
        &self,
        account_id: &AccountId,
        status: PresenceStatus,
    ) -> Result<(), ServiceError> {
        let builder = self
            .request(Method::PUT, &format!("/users/{}/presence", account_id))
            .await
            .json(&PresenceRequest { status });
        Ok(Self::call_empty(builder).await?)
    }

    async fn list_servers(&self, account_id: &AccountId) -> Result<Vec<Server>, ServiceError> {
        Ok(self.get(&format!("/users/{}/servers", account_id)).await?)
    }

    async fn create_server(
        &self,
        name: &str,
        icon: Option<&str>,
        owner_id: &AccountId,
    ) -> Result<ServerId, ServiceError> {
        let request = CreateServerRequest {
            name: name.to_string(),
            icon: icon.map(str::to_string),
            owner_id: owner_id.clone(),
        };
        let response: CreateServerResponse = self.post("/servers", &request).await?;
        Ok(response.server_id)
    }

    async fn list_channels(&self, server_id: &ServerId) -> Result<Vec<Channel>, ServiceError> {
        Ok(self.get(&format!("/servers/{}/channels", server_id)).await?)
    }

    async fn create_channel(
        &self,
        server_id: &ServerId,
        name: &str,
        kind: ChannelKind,
        creator_id: &AccountId,
    ) -> Result<ChannelId, ServiceError> {
        let request = CreateChannelRequest {
            name: name.to_string(),
            kind,
            creator_id: creator_id.clone(),
        };
        let response: CreateChannelResponse = self
            .post(&format!("/servers/{}/channels", server_id), &request)
            .await?;
        Ok(response.channel_id)
    }

    async fn fetch_messages(
        &self,
        channel_id: &ChannelId,
        limit: usize,
    ) -> Result<Vec<Message>, ServiceError> {
        let limit = limit.min(MAX_MESSAGE_LIMIT);
        let builder = self
            .request(Method::GET, &format!("/channels/{}/messages", channel_id))
            .await
            .query(&[("limit", limit)]);
        Ok(Self::call(builder).await?)
    }

    async fn append_message(
        &self,
        channel_id: &ChannelId,
        author_id: &AccountId,
        content: &str,
    ) -> Result<MessageId, ServiceError> {
        let request = SendMessageRequest {
            author_id: author_id.clone(),
            content: content.to_string(),
        };
        let response: SendMessageResponse = self
            .post(&format!("/channels/{}/messages", channel_id), &request)
            .await?;
        Ok(response.id)
    }

    async fn edit_message(&self, message_id: &MessageId, content: &str) -> Result<(), ServiceError> {
        let builder = self
            .request(Method::PATCH, &format!("/messages/{}", message_id))
            .await
            .json(&EditMessageRequest {
                content: content.to_string(),
            });
        Ok(Self::call_empty(builder).await?)
    }

    async fn subscribe_messages(
        &self,
        channel_id: &ChannelId,
    ) -> Result<SnapshotStream<Message>, ServiceError> {
        gateway::message_feed(self.clone(), channel_id.clone()).await
    }

    async fn subscribe_presence(&self) -> Result<SnapshotStream<UserPresence>, ServiceError> {
        gateway::presence_feed(self.clone()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anubis_core::config::{RegistrationConfig, SyncConfig};

    fn body(code: &str, message: &str) -> ErrorBody {
        ErrorBody {
            code: code.into(),
            message: message.into(),
        }
    }

    fn config(api_url: &str) -> ClientConfig {
        ClientConfig {
            api_url: api_url.into(),
            gateway_url: "ws://localhost:3000/gateway".into(),
            sync: SyncConfig {
                message_limit: 500,
                ..SyncConfig::default()
            },
            registration: RegistrationConfig::default(),
        }
    }

    #[test]
    fn auth_codes_map_to_user_messages() {
        assert_eq!(auth_error(&body("user-not-found", "")), AuthError::UserNotFound);
        assert_eq!(auth_error(&body("wrong-password", "")), AuthError::WrongPassword);
        assert_eq!(auth_error(&body("user-disabled", "")), AuthError::AccountDisabled);
        assert_eq!(
            auth_error(&body("email-already-in-use", "")),
            AuthError::EmailInUse
        );
        assert_eq!(
            auth_error(&body("operation-not-allowed", "")),
            AuthError::RegistrationClosed
        );
        assert_eq!(
            auth_error(&body("weak-password", "")).to_string(),
            "Password is too weak"
        );
    }

    #[test]
    fn unknown_auth_code_keeps_backend_text() {
        assert_eq!(
            auth_error(&body("quota-exceeded", "Too many attempts")),
            AuthError::Rejected("Too many attempts".into())
        );
        assert_eq!(
            auth_error(&body("quota-exceeded", "")),
            AuthError::Rejected("quota-exceeded".into())
        );
    }

    #[test]
    fn status_failures_narrow_to_service_errors() {
        let unauthorized = Failure::Status {
            status: StatusCode::UNAUTHORIZED,
            body: None,
        };
        assert_eq!(ServiceError::from(unauthorized), ServiceError::Unauthenticated);

        let missing = Failure::Status {
            status: StatusCode::NOT_FOUND,
            body: Some(body("not-found", "no such channel")),
        };
        assert_eq!(
            ServiceError::from(missing),
            ServiceError::NotFound("no such channel".into())
        );

        let transport = Failure::Transport("connection refused".into());
        assert!(matches!(
            AuthError::from(transport),
            AuthError::Network(msg) if msg == "connection refused"
        ));
    }

    #[test]
    fn urls_join_without_double_slash() {
        let service = HttpService::new(&config("http://chat.example/api/")).unwrap();
        assert_eq!(
            service.url("/channels/c1/messages"),
            "http://chat.example/api/channels/c1/messages"
        );
        assert_eq!(service.message_limit(), MAX_MESSAGE_LIMIT);
    }

    #[tokio::test]
    async fn feeds_require_a_session() {
        let service = HttpService::new(&config("http://127.0.0.1:9")).unwrap();
        let err = match service.subscribe_presence().await {
            Err(e) => e,
            Ok(_) => panic!("presence feed opened without a token"),
        };
        assert_eq!(err, ServiceError::Unauthenticated);
    }
}
