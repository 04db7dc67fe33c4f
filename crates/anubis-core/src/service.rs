use async_trait::async_trait;
use futures_util::stream::BoxStream;

use anubis_types::api::{Availability, Credentials, RegisterRequest, Session};
use anubis_types::models::{
    AccountId, Channel, ChannelId, ChannelKind, Message, MessageId, PresenceStatus, Server,
    ServerId, UserPresence,
};

use crate::error::{AuthError, ServiceError};

/// Stream of full replacement snapshots. Dropping it detaches from the
/// backend feed.
pub type SnapshotStream<T> = BoxStream<'static, Vec<T>>;

/// The hosted directory, auth and messaging backend as the client sees it.
///
/// Implementations own the wire format. The core never retries on its own;
/// every failure is converted at the component boundary.
#[async_trait]
pub trait ChatService: Send + Sync + 'static {
    // -- Directory --

    async fn check_name_available(&self, name: &str) -> Result<Availability, ServiceError>;

    async fn check_email_available(&self, email: &str) -> Result<Availability, ServiceError>;

    // -- Auth --

    async fn register_account(&self, request: &RegisterRequest) -> Result<AccountId, AuthError>;

    async fn authenticate(&self, credentials: &Credentials) -> Result<Session, AuthError>;

    async fn sign_out(&self, account_id: &AccountId) -> Result<(), ServiceError>;

    async fn set_presence(
        &self,
        account_id: &AccountId,
        status: PresenceStatus,
    ) -> Result<(), ServiceError>;

    // -- Servers & channels --

    async fn list_servers(&self, account_id: &AccountId) -> Result<Vec<Server>, ServiceError>;

    async fn create_server(
        &self,
        name: &str,
        icon: Option<&str>,
        owner_id: &AccountId,
    ) -> Result<ServerId, ServiceError>;

    async fn list_channels(&self, server_id: &ServerId) -> Result<Vec<Channel>, ServiceError>;

    async fn create_channel(
        &self,
        server_id: &ServerId,
        name: &str,
        kind: ChannelKind,
        creator_id: &AccountId,
    ) -> Result<ChannelId, ServiceError>;

    // -- Messages --

    /// Newest-first, at most `limit` entries.
    async fn fetch_messages(
        &self,
        channel_id: &ChannelId,
        limit: usize,
    ) -> Result<Vec<Message>, ServiceError>;

    async fn append_message(
        &self,
        channel_id: &ChannelId,
        author_id: &AccountId,
        content: &str,
    ) -> Result<MessageId, ServiceError>;

    async fn edit_message(&self, message_id: &MessageId, content: &str)
    -> Result<(), ServiceError>;

    // -- Live feeds --

    /// Full channel snapshot on every change, in any order.
    async fn subscribe_messages(
        &self,
        channel_id: &ChannelId,
    ) -> Result<SnapshotStream<Message>, ServiceError>;

    /// Full roster on every presence change.
    async fn subscribe_presence(&self) -> Result<SnapshotStream<UserPresence>, ServiceError>;
}
