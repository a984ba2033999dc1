//! Realtime push channel
//!
//! This module opens the backend's WebSocket endpoint and pumps message
//! creation events into a [`Subscription`]. The channel is scoped to the
//! configured project and message collection; the server greets with a
//! `connected` frame and then emits one `event` frame per document
//! mutation:
//!
//! ```text
//! {"type":"event","data":{"events":["...documents.*.create"],
//!  "channels":["databases.db.collections.messages.documents"],
//!  "payload":{<message document>}}}
//! ```
//!
//! Only `*.create` events for the message collection are forwarded: this
//! client never observes updates or deletes (messages are immutable).
//!
//! # Failure behaviour
//!
//! A handshake failure surfaces as `Realtime` from [`open`]. A transport
//! death after the handshake ends the pump task, which closes the inbound
//! channel; the consumer sees end-of-stream from [`Subscription::recv`]
//! and decides whether to reconnect. Reconnection policy lives with the
//! feed, not here.

use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use crate::backend::Subscription;
use crate::config::Config;
use crate::error::{PalaverError, Result};
use crate::models::Message;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// One frame off the realtime socket.
#[derive(Debug, Deserialize)]
struct RealtimeFrame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Option<EventData>,
}

/// Payload of an `event` frame.
#[derive(Debug, Deserialize, Default)]
struct EventData {
    #[serde(default)]
    events: Vec<String>,
    #[serde(default)]
    channels: Vec<String>,
    #[serde(default)]
    payload: Option<Message>,
}

/// Open a subscription on the configured message collection
///
/// Performs the WebSocket handshake, then spawns the pump task feeding
/// the returned [`Subscription`]. Handshake success is the "subscription
/// established" signal consumers key connectivity off.
///
/// # Errors
///
/// `Realtime` when the handshake fails.
pub(crate) async fn open(config: &Config) -> Result<Subscription> {
    let url = config.realtime_url()?;
    let (socket, _response) = connect_async(url.as_str())
        .await
        .map_err(|e| PalaverError::Realtime(format!("handshake failed: {}", e)))?;

    tracing::debug!(channel = %config.messages_channel(), "realtime channel open");

    let (tx, rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    tokio::spawn(pump(
        socket,
        config.messages_channel(),
        tx,
        cancel.clone(),
    ));

    Ok(Subscription::new(rx, cancel))
}

/// Forward creation events from the socket into the subscription channel.
///
/// Exits on cancellation (unsubscribe), transport error, server close, or
/// a dropped receiver. The socket is closed on the way out.
async fn pump(
    mut socket: WsStream,
    channel: String,
    tx: mpsc::UnboundedSender<Message>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = socket.close(None).await;
                break;
            }
            frame = socket.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => {
                    if let Some(message) = decode_frame(&text, &channel) {
                        if tx.send(message).is_err() {
                            break;
                        }
                    }
                }
                Some(Ok(WsMessage::Ping(payload))) => {
                    let _ = socket.send(WsMessage::Pong(payload)).await;
                }
                Some(Ok(WsMessage::Close(_))) | None => {
                    tracing::warn!("realtime channel closed by server");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "realtime transport error");
                    break;
                }
            }
        }
    }
}

/// Extract a created message from one text frame, if it carries one.
///
/// Non-event frames (`connected`, heartbeats), events for other channels,
/// and non-create events all decode to `None`.
fn decode_frame(text: &str, channel: &str) -> Option<Message> {
    let frame: RealtimeFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::trace!(error = %e, "ignoring undecodable realtime frame");
            return None;
        }
    };

    match frame.kind.as_str() {
        "connected" => {
            tracing::debug!("realtime subscription confirmed");
            None
        }
        "event" => {
            let data = frame.data?;
            let is_create = data.events.iter().any(|event| event.ends_with(".create"));
            let on_channel = data.channels.iter().any(|c| c == channel);
            if is_create && on_channel {
                data.payload
            } else {
                None
            }
        }
        _ => None,
    }
}
