use serde::{Deserialize, Serialize};

use crate::models::{AccountId, ChannelId, MessageId, PresenceStatus};

/// Events received over the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms successful authentication
    Ready { account_id: AccountId, username: String },

    /// A message was appended to a channel
    MessageCreate {
        id: MessageId,
        channel_id: ChannelId,
        author_id: AccountId,
    },

    /// A message's content was edited
    MessageUpdate {
        id: MessageId,
        channel_id: ChannelId,
    },

    /// A user changed presence status
    PresenceUpdate {
        account_id: AccountId,
        username: String,
        status: PresenceStatus,
    },
}

impl GatewayEvent {
    /// Returns the channel_id if this event is scoped to a specific channel.
    /// Events that return `None` are global.
    pub fn channel_id(&self) -> Option<&ChannelId> {
        match self {
            Self::MessageCreate { channel_id, .. } => Some(channel_id),
            Self::MessageUpdate { channel_id, .. } => Some(channel_id),
            _ => None,
        }
    }
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Authenticate the WebSocket connection
    Identify { token: String },

    /// Replace the set of channels whose events this connection receives.
    Subscribe { channel_ids: Vec<ChannelId> },
}
