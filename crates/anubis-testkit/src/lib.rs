//! In-memory backend for tests.
//!
//! [`MemoryService`] implements [`ChatService`] over plain collections behind
//! a `std::sync::Mutex`, with call recording, per-value lookup latency and
//! per-operation failure injection. Live feeds are tokio broadcast channels,
//! so the number of attached subscribers is observable.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use futures_util::stream;
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use anubis_core::error::{AuthError, ServiceError};
use anubis_core::service::{ChatService, SnapshotStream};
use anubis_types::api::{Availability, Credentials, RegisterRequest, Session};
use anubis_types::models::{
    AccountId, Channel, ChannelId, ChannelKind, Message, MessageId, PresenceStatus, Server,
    ServerId, UserPresence,
};

const FEED_CAPACITY: usize = 64;

/// Operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    NameCheck,
    EmailCheck,
    Authenticate,
    ListServers,
    ListChannels,
    Fetch,
    Append,
    Edit,
    SubscribeMessages,
    SubscribePresence,
    SetPresence,
}

#[derive(Debug, Clone)]
struct UserRecord {
    id: AccountId,
    username: String,
    email: String,
    password: String,
    disabled: bool,
    status: PresenceStatus,
}

#[derive(Debug, Default)]
struct Calls {
    name_checks: Vec<String>,
    email_checks: Vec<String>,
    fetches: Vec<ChannelId>,
    appends: usize,
    registrations: usize,
    subscribe_log: Vec<(ChannelId, HashMap<ChannelId, usize>)>,
}

#[derive(Debug)]
struct State {
    next_id: u64,
    epoch: DateTime<Utc>,
    users: Vec<UserRecord>,
    servers: Vec<Server>,
    channels: Vec<Channel>,
    messages: Vec<Message>,
    lookup_delays: HashMap<String, Duration>,
    failing: HashSet<Op>,
    calls: Calls,
}

impl State {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{}", prefix, self.next_id)
    }

    /// Strictly increasing timestamps so ordering never depends on the wall clock.
    fn tick(&mut self) -> DateTime<Utc> {
        self.next_id += 1;
        self.epoch + chrono::Duration::milliseconds(self.next_id as i64)
    }

    fn check(&self, op: Op) -> Result<(), ServiceError> {
        if self.failing.contains(&op) {
            Err(ServiceError::Network(format!("{:?} failed (injected)", op)))
        } else {
            Ok(())
        }
    }

    fn channel_snapshot(&self, channel_id: &ChannelId) -> Vec<Message> {
        let mut list: Vec<Message> = self
            .messages
            .iter()
            .filter(|m| &m.channel_id == channel_id)
            .cloned()
            .collect();
        list.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        list
    }

    fn roster(&self) -> Vec<UserPresence> {
        self.users
            .iter()
            .map(|u| UserPresence {
                id: u.id.clone(),
                username: u.username.clone(),
                status: u.status,
            })
            .collect()
    }

    fn insert_channel(
        &mut self,
        server_id: &ServerId,
        name: &str,
        kind: ChannelKind,
    ) -> ChannelId {
        let id = ChannelId::new(self.next_id("channel"));
        self.channels.push(Channel {
            id: id.clone(),
            server_id: server_id.clone(),
            name: name.to_string(),
            kind,
            topic: Some(match kind {
                ChannelKind::Text => "Welcome!".to_string(),
                ChannelKind::Voice => "Voice channel".to_string(),
            }),
        });
        id
    }
}

struct Inner {
    state: Mutex<State>,
    message_feeds: Mutex<HashMap<ChannelId, broadcast::Sender<Vec<Message>>>>,
    presence_feed: broadcast::Sender<Vec<UserPresence>>,
}

/// Cloning shares the same backend.
#[derive(Clone)]
pub struct MemoryService {
    inner: Arc<Inner>,
}

impl Default for MemoryService {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryService {
    pub fn new() -> Self {
        let (presence_feed, _) = broadcast::channel(FEED_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    next_id: 0,
                    epoch: Utc::now(),
                    users: Vec::new(),
                    servers: Vec::new(),
                    channels: Vec::new(),
                    messages: Vec::new(),
                    lookup_delays: HashMap::new(),
                    failing: HashSet::new(),
                    calls: Calls::default(),
                }),
                message_feeds: Mutex::new(HashMap::new()),
                presence_feed,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.inner.state.lock().expect("memory service state poisoned")
    }

    fn feed(&self, channel_id: &ChannelId) -> broadcast::Sender<Vec<Message>> {
        let mut feeds = self
            .inner
            .message_feeds
            .lock()
            .expect("memory service feeds poisoned");
        feeds
            .entry(channel_id.clone())
            .or_insert_with(|| broadcast::channel(FEED_CAPACITY).0)
            .clone()
    }

    fn publish_channel(&self, channel_id: &ChannelId) {
        let snapshot = self.state().channel_snapshot(channel_id);
        let _ = self.feed(channel_id).send(snapshot);
    }

    fn publish_presence(&self) {
        let roster = self.state().roster();
        let _ = self.inner.presence_feed.send(roster);
    }

    // -- Seeding --

    /// Adds an account without the home server that registration creates.
    pub fn add_user(&self, username: &str, email: &str, password: &str) -> AccountId {
        let mut state = self.state();
        let id = AccountId::new(state.next_id("user"));
        state.users.push(UserRecord {
            id: id.clone(),
            username: username.to_lowercase(),
            email: email.to_lowercase(),
            password: password.to_string(),
            disabled: false,
            status: PresenceStatus::Offline,
        });
        id
    }

    pub fn disable_user(&self, account_id: &AccountId) {
        if let Some(user) = self.state().users.iter_mut().find(|u| &u.id == account_id) {
            user.disabled = true;
        }
    }

    pub fn add_server(&self, name: &str, owner_id: &AccountId) -> ServerId {
        let mut state = self.state();
        let id = ServerId::new(state.next_id("server"));
        state.servers.push(Server {
            id: id.clone(),
            name: name.to_string(),
            owner_id: owner_id.clone(),
            icon: None,
            members: vec![owner_id.clone()],
        });
        id
    }

    pub fn add_channel(&self, server_id: &ServerId, name: &str, kind: ChannelKind) -> ChannelId {
        self.state().insert_channel(server_id, name, kind)
    }

    /// Stores `count` messages by `author_id` without notifying subscribers.
    pub fn seed_messages(&self, channel_id: &ChannelId, author_id: &AccountId, count: usize) {
        let mut state = self.state();
        for i in 0..count {
            let id = MessageId::new(state.next_id("msg"));
            let created_at = state.tick();
            state.messages.push(Message {
                id,
                channel_id: channel_id.clone(),
                author_id: author_id.clone(),
                content: format!("seed {}", i),
                created_at,
                edited: false,
            });
        }
    }

    /// Another client posts: stores the message and notifies subscribers.
    pub fn post_as(&self, channel_id: &ChannelId, author_id: &AccountId, content: &str) -> MessageId {
        let id = self.insert_message(channel_id, author_id, content);
        self.publish_channel(channel_id);
        id
    }

    /// Stores a message without notifying subscribers.
    pub fn insert_message(
        &self,
        channel_id: &ChannelId,
        author_id: &AccountId,
        content: &str,
    ) -> MessageId {
        let mut state = self.state();
        let id = MessageId::new(state.next_id("msg"));
        let created_at = state.tick();
        state.messages.push(Message {
            id: id.clone(),
            channel_id: channel_id.clone(),
            author_id: author_id.clone(),
            content: content.to_string(),
            created_at,
            edited: false,
        });
        id
    }

    /// Re-sends the current snapshot to subscribers, changed or not.
    pub fn republish(&self, channel_id: &ChannelId) {
        self.publish_channel(channel_id);
    }

    pub fn set_status(&self, account_id: &AccountId, status: PresenceStatus) {
        if let Some(user) = self.state().users.iter_mut().find(|u| &u.id == account_id) {
            user.status = status;
        }
        self.publish_presence();
    }

    /// Closes every message feed of `channel_id`, as a backend disconnect would.
    pub fn close_feed(&self, channel_id: &ChannelId) {
        self.inner
            .message_feeds
            .lock()
            .expect("memory service feeds poisoned")
            .remove(channel_id);
    }

    // -- Behaviour --

    pub fn set_lookup_delay(&self, value: &str, delay: Duration) {
        self.state().lookup_delays.insert(value.to_string(), delay);
    }

    pub fn fail(&self, op: Op) {
        self.state().failing.insert(op);
    }

    pub fn recover(&self, op: Op) {
        self.state().failing.remove(&op);
    }

    // -- Inspection --

    pub fn name_checks(&self) -> Vec<String> {
        self.state().calls.name_checks.clone()
    }

    pub fn email_checks(&self) -> Vec<String> {
        self.state().calls.email_checks.clone()
    }

    pub fn fetches(&self) -> Vec<ChannelId> {
        self.state().calls.fetches.clone()
    }

    pub fn append_calls(&self) -> usize {
        self.state().calls.appends
    }

    pub fn registrations(&self) -> usize {
        self.state().calls.registrations
    }

    pub fn message_count(&self, channel_id: &ChannelId) -> usize {
        self.state()
            .messages
            .iter()
            .filter(|m| &m.channel_id == channel_id)
            .count()
    }

    pub fn status_of(&self, account_id: &AccountId) -> Option<PresenceStatus> {
        self.state()
            .users
            .iter()
            .find(|u| &u.id == account_id)
            .map(|u| u.status)
    }

    /// One entry per `subscribe_messages` call, in order: the requested
    /// channel and the live subscriptions that existed at that moment.
    pub fn subscribe_log(&self) -> Vec<(ChannelId, HashMap<ChannelId, usize>)> {
        self.state().calls.subscribe_log.clone()
    }

    pub fn presence_subscribers(&self) -> usize {
        self.inner.presence_feed.receiver_count()
    }

    /// Number of live message subscriptions per channel, omitting zeros.
    pub fn active_subscriptions(&self) -> HashMap<ChannelId, usize> {
        self.inner
            .message_feeds
            .lock()
            .expect("memory service feeds poisoned")
            .iter()
            .map(|(id, tx)| (id.clone(), tx.receiver_count()))
            .filter(|(_, n)| *n > 0)
            .collect()
    }

    async fn lookup_delay(&self, value: &str) {
        let delay = self.state().lookup_delays.get(value).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

fn snapshot_stream<T: Clone + Send + 'static>(rx: broadcast::Receiver<Vec<T>>) -> SnapshotStream<T> {
    stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(snapshot) => return Some((snapshot, rx)),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    })
    .boxed()
}

#[async_trait]
impl ChatService for MemoryService {
    async fn check_name_available(&self, name: &str) -> Result<Availability, ServiceError> {
        self.state().calls.name_checks.push(name.to_string());
        self.lookup_delay(name).await;

        let state = self.state();
        state.check(Op::NameCheck)?;
        let wanted = name.to_lowercase();
        Ok(if state.users.iter().any(|u| u.username == wanted) {
            Availability::taken("Username is already taken")
        } else {
            Availability::available("Username is available")
        })
    }

    async fn check_email_available(&self, email: &str) -> Result<Availability, ServiceError> {
        self.state().calls.email_checks.push(email.to_string());
        self.lookup_delay(email).await;

        let state = self.state();
        state.check(Op::EmailCheck)?;
        let wanted = email.to_lowercase();
        Ok(if state.users.iter().any(|u| u.email == wanted) {
            Availability::taken("Email is already in use")
        } else {
            Availability::available("Email is available")
        })
    }

    async fn register_account(&self, request: &RegisterRequest) -> Result<AccountId, AuthError> {
        let account_id = {
            let mut state = self.state();
            state.calls.registrations += 1;

            let username = request.username.to_lowercase();
            let email = request.email.to_lowercase();
            if state.users.iter().any(|u| u.username == username) {
                return Err(AuthError::UsernameTaken);
            }
            if state.users.iter().any(|u| u.email == email) {
                return Err(AuthError::EmailInUse);
            }
            if !email.contains('@') {
                return Err(AuthError::InvalidEmail);
            }
            if request.password.chars().count() < 6 {
                return Err(AuthError::WeakPassword);
            }

            let id = AccountId::new(state.next_id("user"));
            state.users.push(UserRecord {
                id: id.clone(),
                username,
                email,
                password: request.password.clone(),
                disabled: false,
                status: PresenceStatus::Offline,
            });

            // Every new account gets a home server with the stock channels.
            let server_id = ServerId::new(state.next_id("server"));
            state.servers.push(Server {
                id: server_id.clone(),
                name: format!("{}'s Server", request.username),
                owner_id: id.clone(),
                icon: None,
                members: vec![id.clone()],
            });
            state.insert_channel(&server_id, "general", ChannelKind::Text);
            state.insert_channel(&server_id, "chat", ChannelKind::Text);
            state.insert_channel(&server_id, "Voice Chat", ChannelKind::Voice);
            id
        };
        debug!("memory service registered {}", account_id);
        Ok(account_id)
    }

    async fn authenticate(&self, credentials: &Credentials) -> Result<Session, AuthError> {
        let state = self.state();
        state.check(Op::Authenticate)?;

        let login = credentials.login.to_lowercase();
        let user = state
            .users
            .iter()
            .find(|u| {
                if login.contains('@') {
                    u.email == login
                } else {
                    u.username == login
                }
            })
            .ok_or(AuthError::UserNotFound)?;
        if user.disabled {
            return Err(AuthError::AccountDisabled);
        }
        if user.password != credentials.password {
            return Err(AuthError::WrongPassword);
        }

        Ok(Session {
            account_id: user.id.clone(),
            username: user.username.clone(),
            email: user.email.clone(),
            token: Uuid::new_v4().to_string(),
        })
    }

    async fn sign_out(&self, _account_id: &AccountId) -> Result<(), ServiceError> {
        Ok(())
    }

    async fn set_presence(
        &self,
        account_id: &AccountId,
        status: PresenceStatus,
    ) -> Result<(), ServiceError> {
        self.state().check(Op::SetPresence)?;
        self.set_status(account_id, status);
        Ok(())
    }

    async fn list_servers(&self, account_id: &AccountId) -> Result<Vec<Server>, ServiceError> {
        let state = self.state();
        state.check(Op::ListServers)?;
        Ok(state
            .servers
            .iter()
            .filter(|s| s.members.contains(account_id))
            .cloned()
            .collect())
    }

    async fn create_server(
        &self,
        name: &str,
        icon: Option<&str>,
        owner_id: &AccountId,
    ) -> Result<ServerId, ServiceError> {
        let mut state = self.state();
        let id = ServerId::new(state.next_id("server"));
        state.servers.push(Server {
            id: id.clone(),
            name: name.to_string(),
            owner_id: owner_id.clone(),
            icon: icon.map(str::to_string),
            members: vec![owner_id.clone()],
        });
        state.insert_channel(&id, "general", ChannelKind::Text);
        Ok(id)
    }

    async fn list_channels(&self, server_id: &ServerId) -> Result<Vec<Channel>, ServiceError> {
        let state = self.state();
        state.check(Op::ListChannels)?;
        Ok(state
            .channels
            .iter()
            .filter(|c| &c.server_id == server_id)
            .cloned()
            .collect())
    }

    async fn create_channel(
        &self,
        server_id: &ServerId,
        name: &str,
        kind: ChannelKind,
        _creator_id: &AccountId,
    ) -> Result<ChannelId, ServiceError> {
        let mut state = self.state();
        if !state.servers.iter().any(|s| &s.id == server_id) {
            return Err(ServiceError::NotFound(server_id.to_string()));
        }
        Ok(state.insert_channel(server_id, name, kind))
    }

    async fn fetch_messages(
        &self,
        channel_id: &ChannelId,
        limit: usize,
    ) -> Result<Vec<Message>, ServiceError> {
        let mut state = self.state();
        state.calls.fetches.push(channel_id.clone());
        state.check(Op::Fetch)?;

        let mut list = state.channel_snapshot(channel_id);
        list.reverse();
        list.truncate(limit);
        Ok(list)
    }

    async fn append_message(
        &self,
        channel_id: &ChannelId,
        author_id: &AccountId,
        content: &str,
    ) -> Result<MessageId, ServiceError> {
        {
            let mut state = self.state();
            state.calls.appends += 1;
            state.check(Op::Append)?;
        }
        // Stored now, echoed to subscribers only on the next publish, so the
        // optimistic entry is observable on its own.
        Ok(self.insert_message(channel_id, author_id, content))
    }

    async fn edit_message(&self, message_id: &MessageId, content: &str) -> Result<(), ServiceError> {
        let channel_id = {
            let mut state = self.state();
            state.check(Op::Edit)?;
            let message = state
                .messages
                .iter_mut()
                .find(|m| &m.id == message_id)
                .ok_or_else(|| ServiceError::NotFound(message_id.to_string()))?;
            message.content = content.to_string();
            message.edited = true;
            message.channel_id.clone()
        };
        self.publish_channel(&channel_id);
        Ok(())
    }

    async fn subscribe_messages(
        &self,
        channel_id: &ChannelId,
    ) -> Result<SnapshotStream<Message>, ServiceError> {
        self.state().check(Op::SubscribeMessages)?;
        let live = self.active_subscriptions();
        self.state()
            .calls
            .subscribe_log
            .push((channel_id.clone(), live));
        Ok(snapshot_stream(self.feed(channel_id).subscribe()))
    }

    /// Starts with the current roster, then follows every change.
    async fn subscribe_presence(&self) -> Result<SnapshotStream<UserPresence>, ServiceError> {
        self.state().check(Op::SubscribePresence)?;
        // Subscribed before the read, so a change in between reaches the feed.
        let rx = self.inner.presence_feed.subscribe();
        let current = self.state().roster();
        Ok(stream::once(async move { current })
            .chain(snapshot_stream(rx))
            .boxed())
    }
}
