//! WebSocket gateway feeds.
//!
//! Every feed owns its own connection: `Identify`, wait for `Ready`, then
//! `Subscribe`. Dropping the stream drops the socket, which is how the core's
//! live handles detach from the backend.

use std::collections::BTreeMap;

use futures_util::{SinkExt, StreamExt, future, stream};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message as Frame;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};

use anubis_core::error::ServiceError;
use anubis_core::service::{ChatService, SnapshotStream};
use anubis_types::events::{GatewayCommand, GatewayEvent};
use anubis_types::models::{AccountId, ChannelId, Message, UserPresence};

use crate::rest::HttpService;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Whether `event` changes the message list of `channel_id`.
pub fn triggers_refetch(event: &GatewayEvent, channel_id: &ChannelId) -> bool {
    matches!(
        event,
        GatewayEvent::MessageCreate { .. } | GatewayEvent::MessageUpdate { .. }
    ) && event.channel_id() == Some(channel_id)
}

/// Keys a roster listing by account, the shape [`fold_presence`] updates.
pub fn seed_roster(listing: Vec<UserPresence>) -> BTreeMap<AccountId, UserPresence> {
    listing.into_iter().map(|u| (u.id.clone(), u)).collect()
}

/// Folds a presence event into `roster`. Returns false for other events.
pub fn fold_presence(roster: &mut BTreeMap<AccountId, UserPresence>, event: GatewayEvent) -> bool {
    match event {
        GatewayEvent::PresenceUpdate {
            account_id,
            username,
            status,
        } => {
            roster.insert(
                account_id.clone(),
                UserPresence {
                    id: account_id,
                    username,
                    status,
                },
            );
            true
        }
        _ => false,
    }
}

async fn connect(
    service: &HttpService,
    channel_ids: Vec<ChannelId>,
) -> Result<Socket, ServiceError> {
    let token = service.token().await.ok_or(ServiceError::Unauthenticated)?;

    let (mut socket, _) = connect_async(service.gateway_url())
        .await
        .map_err(|e| ServiceError::Network(format!("gateway connect failed: {}", e)))?;

    send(&mut socket, &GatewayCommand::Identify { token }).await?;
    loop {
        match next_event(&mut socket).await {
            Some(GatewayEvent::Ready {
                account_id,
                username,
            }) => {
                debug!("Gateway ready for {} ({})", username, account_id);
                break;
            }
            Some(_) => continue,
            // The gateway closes unidentified connections.
            None => return Err(ServiceError::Unauthenticated),
        }
    }

    if !channel_ids.is_empty() {
        send(&mut socket, &GatewayCommand::Subscribe { channel_ids }).await?;
    }
    Ok(socket)
}

async fn send(socket: &mut Socket, command: &GatewayCommand) -> Result<(), ServiceError> {
    let text =
        serde_json::to_string(command).map_err(|e| ServiceError::Protocol(e.to_string()))?;
    socket
        .send(Frame::text(text))
        .await
        .map_err(|e| ServiceError::Network(e.to_string()))
}

/// Next decodable event, or `None` once the connection is gone.
async fn next_event(socket: &mut Socket) -> Option<GatewayEvent> {
    while let Some(frame) = socket.next().await {
        match frame {
            Ok(Frame::Text(text)) => match serde_json::from_str(text.as_str()) {
                Ok(event) => return Some(event),
                Err(e) => debug!("Skipping gateway frame: {}", e),
            },
            Ok(Frame::Close(reason)) => {
                debug!("Gateway closed: {:?}", reason);
                return None;
            }
            Ok(_) => {}
            Err(e) => {
                warn!("Gateway connection error: {}", e);
                return None;
            }
        }
    }
    None
}

/// Full message snapshot of `channel_id` after every create or edit in it.
pub async fn message_feed(
    service: HttpService,
    channel_id: ChannelId,
) -> Result<SnapshotStream<Message>, ServiceError> {
    let socket = connect(&service, vec![channel_id.clone()]).await?;
    info!("Gateway feed open for #{}", channel_id);

    let feed = stream::unfold(
        (socket, service, channel_id),
        |(mut socket, service, channel_id)| async move {
            loop {
                let event = next_event(&mut socket).await?;
                if !triggers_refetch(&event, &channel_id) {
                    continue;
                }
                match service
                    .fetch_messages(&channel_id, service.message_limit())
                    .await
                {
                    Ok(snapshot) => return Some((snapshot, (socket, service, channel_id))),
                    // The next event retries; the displayed list stays as is.
                    Err(e) => warn!("Re-fetch of #{} failed: {}", channel_id, e),
                }
            }
        },
    );
    Ok(feed.boxed())
}

/// The current roster, then the roster again after each presence change.
pub async fn presence_feed(
    service: HttpService,
) -> Result<SnapshotStream<UserPresence>, ServiceError> {
    let socket = connect(&service, Vec::new()).await?;
    // Listed after the socket is up so later changes arrive as events.
    let listing = service.presence_roster().await?;
    info!("Gateway presence feed open, {} accounts listed", listing.len());

    let roster = seed_roster(listing);
    let current: Vec<UserPresence> = roster.values().cloned().collect();
    let feed = stream::unfold(
        (socket, roster),
        |(mut socket, mut roster)| async move {
            loop {
                let event = next_event(&mut socket).await?;
                if fold_presence(&mut roster, event) {
                    let snapshot: Vec<UserPresence> = roster.values().cloned().collect();
                    return Some((snapshot, (socket, roster)));
                }
            }
        },
    );
    Ok(stream::once(future::ready(current)).chain(feed).boxed())
}
