use std::sync::Arc;

use futures_util::StreamExt;
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};

use anubis_types::api::{Credentials, Session};
use anubis_types::models::{
    AccountId, Channel, ChannelId, ChannelKind, MessageId, PresenceStatus, Server, ServerId,
    UserPresence,
};

use crate::config::SyncConfig;
use crate::error::{ClientError, ServiceError, SyncError, ValidationError};
use crate::live::LiveHandle;
use crate::service::ChatService;
use crate::sync::{ChannelSync, SyncEvent, UpdateOutcome};

/// Name of the server created for accounts that have none.
pub const DEFAULT_SERVER_NAME: &str = "My server";

/// One applied background update of the workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkspaceUpdate {
    Messages(UpdateOutcome),
    Presence { online: usize },
    /// Posted by a presence feed from an earlier sign-in.
    StalePresence,
}

struct RosterUpdate {
    generation: u64,
    roster: Option<Vec<UserPresence>>,
}

/// Everything the main screen needs after sign-in: the account, its
/// servers and channels, who is online, and the active channel session.
pub struct Workspace {
    service: Arc<dyn ChatService>,
    session: Option<Session>,
    servers: Vec<Server>,
    channels: Vec<Channel>,
    current_server: Option<ServerId>,
    roster: Vec<UserPresence>,
    presence: Option<LiveHandle>,
    presence_generation: u64,
    presence_tx: mpsc::UnboundedSender<RosterUpdate>,
    presence_rx: mpsc::UnboundedReceiver<RosterUpdate>,
    sync: ChannelSync,
}

impl Workspace {
    pub fn new(service: Arc<dyn ChatService>, config: SyncConfig) -> Self {
        let (presence_tx, presence_rx) = mpsc::unbounded_channel();
        Self {
            sync: ChannelSync::new(Arc::clone(&service), config),
            service,
            session: None,
            servers: Vec::new(),
            channels: Vec::new(),
            current_server: None,
            roster: Vec::new(),
            presence: None,
            presence_generation: 0,
            presence_tx,
            presence_rx,
        }
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn servers(&self) -> &[Server] {
        &self.servers
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn current_server(&self) -> Option<&Server> {
        let id = self.current_server.as_ref()?;
        self.servers.iter().find(|s| &s.id == id)
    }

    pub fn roster(&self) -> &[UserPresence] {
        &self.roster
    }

    pub fn online_count(&self) -> usize {
        self.roster
            .iter()
            .filter(|u| u.status == PresenceStatus::Online)
            .count()
    }

    pub fn sync(&self) -> &ChannelSync {
        &self.sync
    }

    pub fn events(&self) -> broadcast::Receiver<SyncEvent> {
        self.sync.events()
    }

    fn account(&self) -> Result<&Session, ClientError> {
        self.session.as_ref().ok_or_else(|| {
            SyncError::Directory {
                what: "account",
                source: ServiceError::Unauthenticated,
            }
            .into()
        })
    }

    /// Signs in, marks the account online, loads its servers and opens the
    /// first channel of the first server. If that fails the account is
    /// signed out again before the error is returned.
    pub async fn sign_in(&mut self, credentials: &Credentials) -> Result<&Session, ClientError> {
        if self.session.is_some() {
            self.sign_out().await;
        }

        let session = self.service.authenticate(credentials).await?;
        info!("Signed in as {} ({})", session.username, session.account_id);

        if let Err(e) = self
            .service
            .set_presence(&session.account_id, PresenceStatus::Online)
            .await
        {
            warn!("Could not mark {} online: {}", session.account_id, e);
        }

        self.sync.set_local_account(Some(session.account_id.clone()));
        self.session = Some(session);

        self.watch_presence().await;
        if let Err(e) = self.load_servers().await {
            warn!("Sign-in aborted, workspace did not load: {}", e);
            self.sign_out().await;
            return Err(e);
        }
        self.account()
    }

    async fn watch_presence(&mut self) {
        self.presence_generation += 1;
        let generation = self.presence_generation;

        match self.service.subscribe_presence().await {
            Ok(mut stream) => {
                // Feeds open with the current roster.
                match stream.next().await {
                    Some(roster) => self.roster = roster,
                    None => {
                        warn!("Presence feed closed before the first roster");
                        return;
                    }
                }
                self.presence = Some(LiveHandle::forward(
                    "presence",
                    stream,
                    self.presence_tx.clone(),
                    move |roster| RosterUpdate { generation, roster },
                ));
            }
            // The roster is decoration; the workspace stays usable without it.
            Err(e) => warn!("Presence feed unavailable: {}", e),
        }
    }

    /// Reloads the server list, creating a default server when the account
    /// has none, and switches to the first one.
    pub async fn load_servers(&mut self) -> Result<(), ClientError> {
        let account_id = self.account()?.account_id.clone();

        let mut servers = self.list_servers(&account_id).await?;
        if servers.is_empty() {
            info!("{} has no servers, creating {:?}", account_id, DEFAULT_SERVER_NAME);
            self.service
                .create_server(DEFAULT_SERVER_NAME, None, &account_id)
                .await
                .map_err(|source| SyncError::Directory {
                    what: "servers",
                    source,
                })?;
            servers = self.list_servers(&account_id).await?;
        }
        self.servers = servers;

        match self.servers.first().map(|s| s.id.clone()) {
            Some(first) => self.switch_server(&first).await,
            None => Ok(()),
        }
    }

    async fn list_servers(
        &self,
        account_id: &AccountId,
    ) -> Result<Vec<Server>, SyncError> {
        self.service
            .list_servers(account_id)
            .await
            .map_err(|source| SyncError::Directory {
                what: "servers",
                source,
            })
    }

    /// Loads the server's channels and opens its first text channel.
    pub async fn switch_server(&mut self, server_id: &ServerId) -> Result<(), ClientError> {
        if !self.servers.iter().any(|s| &s.id == server_id) {
            return Err(SyncError::Directory {
                what: "server",
                source: ServiceError::NotFound(server_id.to_string()),
            }
            .into());
        }

        self.channels = self.list_channels(server_id).await?;
        self.current_server = Some(server_id.clone());

        let first_text = self
            .channels
            .iter()
            .find(|c| c.kind == ChannelKind::Text)
            .map(|c| c.id.clone());
        match first_text {
            Some(channel_id) => self.sync.switch_channel(&channel_id).await?,
            None => self.sync.teardown(),
        }
        Ok(())
    }

    async fn list_channels(&self, server_id: &ServerId) -> Result<Vec<Channel>, SyncError> {
        self.service
            .list_channels(server_id)
            .await
            .map_err(|source| SyncError::Directory {
                what: "channels",
                source,
            })
    }

    /// Opens a channel of the current server.
    pub async fn open_channel(&mut self, channel_id: &ChannelId) -> Result<(), ClientError> {
        if !self.channels.iter().any(|c| &c.id == channel_id) {
            return Err(SyncError::Directory {
                what: "channel",
                source: ServiceError::NotFound(channel_id.to_string()),
            }
            .into());
        }
        self.sync.switch_channel(channel_id).await?;
        Ok(())
    }

    /// Creates a server owned by the signed-in account and switches to it.
    pub async fn create_server(
        &mut self,
        name: &str,
        icon: Option<&str>,
    ) -> Result<ServerId, ClientError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ValidationError::MissingField("Server name").into());
        }
        let account_id = self.account()?.account_id.clone();

        let server_id = self
            .service
            .create_server(name, icon, &account_id)
            .await
            .map_err(|source| SyncError::Directory {
                what: "servers",
                source,
            })?;
        info!("Created server {:?} ({})", name, server_id);

        self.servers = self.list_servers(&account_id).await?;
        self.switch_server(&server_id).await?;
        Ok(server_id)
    }

    /// Adds a channel to the current server and refreshes the channel list.
    pub async fn create_channel(
        &mut self,
        name: &str,
        kind: ChannelKind,
    ) -> Result<ChannelId, ClientError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ValidationError::MissingField("Channel name").into());
        }
        let account_id = self.account()?.account_id.clone();
        let server_id = self.current_server.clone().ok_or(SyncError::Directory {
            what: "server",
            source: ServiceError::NotFound("no server selected".into()),
        })?;

        let channel_id = self
            .service
            .create_channel(&server_id, name, kind, &account_id)
            .await
            .map_err(|source| SyncError::Directory {
                what: "channels",
                source,
            })?;
        self.channels = self.list_channels(&server_id).await?;
        Ok(channel_id)
    }

    /// Sends to the active channel as the signed-in account.
    pub async fn send(&mut self, content: &str) -> Result<MessageId, ClientError> {
        let author_id = self.account()?.account_id.clone();
        let channel_id = self
            .sync
            .active_channel()
            .cloned()
            .ok_or(SyncError::NoActiveChannel)?;
        self.sync.send_message(&channel_id, &author_id, content).await
    }

    pub async fn edit(&mut self, message_id: &MessageId, content: &str) -> Result<(), ClientError> {
        self.account()?;
        self.sync.edit_message(message_id, content).await
    }

    /// Waits for the next message or presence update and applies it.
    pub async fn next_update(&mut self) -> WorkspaceUpdate {
        tokio::select! {
            outcome = self.sync.next_update() => WorkspaceUpdate::Messages(outcome),
            Some(update) = self.presence_rx.recv() => self.apply_roster(update),
        }
    }

    fn apply_roster(&mut self, update: RosterUpdate) -> WorkspaceUpdate {
        if update.generation != self.presence_generation || self.session.is_none() {
            return WorkspaceUpdate::StalePresence;
        }
        match update.roster {
            Some(roster) => self.roster = roster,
            None => {
                warn!("Presence feed closed by the backend");
                self.presence = None;
            }
        }
        WorkspaceUpdate::Presence {
            online: self.online_count(),
        }
    }

    /// Marks the account offline, signs out and drops every live handle.
    /// Backend failures are logged; local state is cleared regardless.
    pub async fn sign_out(&mut self) {
        self.sync.teardown();
        if let Some(presence) = self.presence.take() {
            presence.shutdown().await;
        }
        self.presence_generation += 1;

        if let Some(session) = self.session.take() {
            if let Err(e) = self
                .service
                .set_presence(&session.account_id, PresenceStatus::Offline)
                .await
            {
                warn!("Could not mark {} offline: {}", session.account_id, e);
            }
            if let Err(e) = self.service.sign_out(&session.account_id).await {
                warn!("Sign-out of {} failed: {}", session.account_id, e);
            }
            info!("Signed out {}", session.username);
        }

        self.sync.set_local_account(None);
        self.servers.clear();
        self.channels.clear();
        self.current_server = None;
        self.roster.clear();
    }
}
