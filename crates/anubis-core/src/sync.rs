//! Channel sync controller.
//!
//! Exactly one channel session is live at a time. Switching moves the old
//! session's live handle out and shuts it down before the next snapshot is
//! even requested. Background tasks never touch the session: they post
//! generation-stamped updates that [`ChannelSync::next_update`] applies only
//! while the stamp matches the current session.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, mpsc};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use anubis_types::models::{AccountId, ChannelId, Message, MessageId};

use crate::config::{LiveUpdate, SyncConfig};
use crate::error::{ClientError, SendError, ServiceError, SyncError, ValidationError};
use crate::live::LiveHandle;
use crate::notice::Notice;
use crate::reconcile::Timeline;
use crate::service::ChatService;

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Loading,
    Live,
}

/// What the rendering boundary receives.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// The displayed list changed; `messages` is oldest first.
    Render {
        channel_id: ChannelId,
        messages: Arc<[Message]>,
    },
    /// A record that was not displayed before arrived. For sound and toasts.
    NewMessage {
        channel_id: ChannelId,
        message: Message,
        own: bool,
    },
    Notice(Notice),
}

/// Result of applying one background update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Rendered,
    Unchanged,
    /// Posted by a session that has since been replaced or torn down.
    Stale,
    PollFailed,
    FeedClosed,
}

#[derive(Debug)]
enum FeedPayload {
    Pushed(Vec<Message>),
    Polled(Result<Vec<Message>, ServiceError>),
    Closed,
}

#[derive(Debug)]
struct FeedUpdate {
    generation: u64,
    payload: FeedPayload,
}

struct ChannelSession {
    channel_id: ChannelId,
    timeline: Timeline,
    live: Option<LiveHandle>,
}

pub struct ChannelSync {
    service: Arc<dyn ChatService>,
    config: SyncConfig,
    local_account: Option<AccountId>,
    state: SessionState,
    session: Option<ChannelSession>,
    generation: u64,
    feed_tx: mpsc::UnboundedSender<FeedUpdate>,
    feed_rx: mpsc::UnboundedReceiver<FeedUpdate>,
    events: broadcast::Sender<SyncEvent>,
}

impl ChannelSync {
    pub fn new(service: Arc<dyn ChatService>, config: SyncConfig) -> Self {
        let (feed_tx, feed_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            service,
            config,
            local_account: None,
            state: SessionState::Idle,
            session: None,
            generation: 0,
            feed_tx,
            feed_rx,
            events,
        }
    }

    /// The signed-in account, used to tell own echoes apart.
    pub fn set_local_account(&mut self, account: Option<AccountId>) {
        self.local_account = account;
    }

    pub fn events(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn active_channel(&self) -> Option<&ChannelId> {
        self.session.as_ref().map(|s| &s.channel_id)
    }

    /// Read-only snapshot of the displayed list, oldest first.
    pub fn messages(&self) -> Arc<[Message]> {
        match &self.session {
            Some(session) => session.timeline.snapshot(),
            None => Arc::from(Vec::new()),
        }
    }

    pub fn has_live_handle(&self) -> bool {
        self.session
            .as_ref()
            .and_then(|s| s.live.as_ref())
            .is_some_and(LiveHandle::is_active)
    }

    /// Makes `channel_id` the active channel.
    ///
    /// The previous session's subscription or timer is shut down first. On
    /// success the snapshot has been applied and a Render event emitted; on
    /// failure the controller is Idle.
    pub async fn switch_channel(&mut self, channel_id: &ChannelId) -> Result<(), SyncError> {
        if let Some(previous) = self.detach() {
            if let Some(live) = previous.live {
                live.shutdown().await;
            }
        }

        self.state = SessionState::Loading;
        let generation = self.generation;
        info!("Opening #{} (generation {})", channel_id, generation);

        let snapshot = match self
            .service
            .fetch_messages(channel_id, self.config.message_limit)
            .await
        {
            Ok(snapshot) => snapshot,
            Err(source) => {
                warn!("Snapshot for #{} failed: {}", channel_id, source);
                self.state = SessionState::Idle;
                return Err(SyncError::Fetch {
                    channel: channel_id.clone(),
                    source,
                });
            }
        };

        let live = match self.install_live(channel_id, generation).await {
            Ok(live) => live,
            Err(source) => {
                warn!("Live updates for #{} failed: {}", channel_id, source);
                self.state = SessionState::Idle;
                return Err(SyncError::Subscribe {
                    channel: channel_id.clone(),
                    source,
                });
            }
        };

        self.session = Some(ChannelSession {
            channel_id: channel_id.clone(),
            timeline: Timeline::from_snapshot(snapshot)
                .with_page_limit(self.config.message_limit),
            live: Some(live),
        });
        self.state = SessionState::Live;
        self.render();
        Ok(())
    }

    async fn install_live(
        &self,
        channel_id: &ChannelId,
        generation: u64,
    ) -> Result<LiveHandle, ServiceError> {
        let label = format!("#{} gen {}", channel_id, generation);
        match self.config.live_update {
            LiveUpdate::Push => {
                let stream = self.service.subscribe_messages(channel_id).await?;
                Ok(LiveHandle::forward(
                    label,
                    stream,
                    self.feed_tx.clone(),
                    move |snapshot| FeedUpdate {
                        generation,
                        payload: match snapshot {
                            Some(list) => FeedPayload::Pushed(list),
                            None => FeedPayload::Closed,
                        },
                    },
                ))
            }
            LiveUpdate::Poll { interval } => Ok(self.spawn_poller(
                label,
                channel_id.clone(),
                generation,
                interval,
            )),
        }
    }

    fn spawn_poller(
        &self,
        label: String,
        channel_id: ChannelId,
        generation: u64,
        period: Duration,
    ) -> LiveHandle {
        let service = Arc::clone(&self.service);
        let tx = self.feed_tx.clone();
        let limit = self.config.message_limit;

        LiveHandle::spawn(label, move |token| async move {
            let start = tokio::time::Instant::now() + period;
            let mut interval = tokio::time::interval_at(start, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {}
                }
                let result = tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    result = service.fetch_messages(&channel_id, limit) => result,
                };
                let update = FeedUpdate {
                    generation,
                    payload: FeedPayload::Polled(result),
                };
                if tx.send(update).is_err() {
                    break;
                }
            }
        })
    }

    /// Waits for the next background update and applies it.
    pub async fn next_update(&mut self) -> UpdateOutcome {
        match self.feed_rx.recv().await {
            Some(update) => self.apply(update),
            // Unreachable while `self` holds a sender.
            None => UpdateOutcome::Stale,
        }
    }

    /// Applies every update already queued without waiting.
    pub fn drain_updates(&mut self) -> Vec<UpdateOutcome> {
        let mut outcomes = Vec::new();
        while let Ok(update) = self.feed_rx.try_recv() {
            outcomes.push(self.apply(update));
        }
        outcomes
    }

    fn apply(&mut self, update: FeedUpdate) -> UpdateOutcome {
        if update.generation != self.generation || self.state != SessionState::Live {
            debug!("dropping update from generation {}", update.generation);
            return UpdateOutcome::Stale;
        }
        let Some(session) = self.session.as_mut() else {
            return UpdateOutcome::Stale;
        };

        let arrived = match update.payload {
            FeedPayload::Pushed(list) => session.timeline.replace(list),
            FeedPayload::Polled(Ok(list)) => {
                if !session.timeline.differs_from(&list) {
                    return UpdateOutcome::Unchanged;
                }
                session.timeline.replace(list)
            }
            FeedPayload::Polled(Err(e)) => {
                warn!("Poll of #{} failed: {}", session.channel_id, e);
                return UpdateOutcome::PollFailed;
            }
            FeedPayload::Closed => {
                let channel_id = session.channel_id.clone();
                warn!("Live feed for #{} closed by the backend", channel_id);
                self.teardown();
                self.emit(SyncEvent::Notice(Notice::warning(format!(
                    "Live updates for #{} stopped, reopen the channel",
                    channel_id
                ))));
                return UpdateOutcome::FeedClosed;
            }
        };

        debug!("#{}: {} new message(s)", session.channel_id, arrived.len());
        self.render();
        self.announce(arrived);
        UpdateOutcome::Rendered
    }

    /// Sends `content` to `channel_id` as `author_id`.
    ///
    /// Whitespace-only content is refused without touching the network. On
    /// success the message is shown immediately when `channel_id` is the
    /// active channel, and reconciled once the backend echoes it.
    pub async fn send_message(
        &mut self,
        channel_id: &ChannelId,
        author_id: &AccountId,
        content: &str,
    ) -> Result<MessageId, ClientError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(ValidationError::EmptyMessage.into());
        }

        let id = self
            .service
            .append_message(channel_id, author_id, content)
            .await
            .map_err(SendError::from)?;

        let optimistic = Message {
            id: id.clone(),
            channel_id: channel_id.clone(),
            author_id: author_id.clone(),
            content: content.to_string(),
            created_at: Utc::now(),
            edited: false,
        };
        if let Some(session) = self.session.as_mut().filter(|s| &s.channel_id == channel_id) {
            session.timeline.push_optimistic(optimistic);
            self.render();
        }
        Ok(id)
    }

    pub async fn edit_message(
        &mut self,
        message_id: &MessageId,
        content: &str,
    ) -> Result<(), ClientError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(ValidationError::EmptyMessage.into());
        }

        self.service
            .edit_message(message_id, content)
            .await
            .map_err(SendError::from)?;

        if let Some(session) = self.session.as_mut() {
            if session.timeline.mark_edited(message_id, content) {
                self.render();
            }
        }
        Ok(())
    }

    /// Ends the active session. Its live handle is cancelled before this
    /// returns and anything it already queued is discarded as stale.
    pub fn teardown(&mut self) {
        if let Some(session) = self.detach() {
            if let Some(live) = session.live {
                live.cancel();
            }
            info!("Closed #{}", session.channel_id);
        }
    }

    /// Moves the active session out and invalidates its generation.
    fn detach(&mut self) -> Option<ChannelSession> {
        self.generation += 1;
        self.state = SessionState::Idle;
        self.session.take()
    }

    fn render(&self) {
        if let Some(session) = &self.session {
            self.emit(SyncEvent::Render {
                channel_id: session.channel_id.clone(),
                messages: session.timeline.snapshot(),
            });
        }
    }

    fn announce(&self, arrived: Vec<Message>) {
        for message in arrived {
            let own = self.local_account.as_ref() == Some(&message.author_id);
            if own && !self.config.notify_own_echo {
                continue;
            }
            self.emit(SyncEvent::NewMessage {
                channel_id: message.channel_id.clone(),
                message,
                own,
            });
        }
    }

    fn emit(&self, event: SyncEvent) {
        // No subscribers is fine: the UI may not be attached yet.
        let _ = self.events.send(event);
    }
}

impl Drop for ChannelSync {
    fn drop(&mut self) {
        self.teardown();
    }
}
