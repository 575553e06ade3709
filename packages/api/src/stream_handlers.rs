// ABOUTME: WebSocket stream endpoint delivering observation frames to subscribers
// ABOUTME: One writer task per socket; hub pings are forwarded and pongs reported back

use crate::response::ApiError;
use crate::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use sandboxd_runtime::{SubscriberEvent, Subscription};
use tracing::debug;

/// GET /v1/sandboxes/{id}/stream (upgrade).
///
/// Unknown sandbox ids are rejected with 404 before the upgrade happens.
pub async fn stream_observations(
    State(state): State<AppState>,
    Path(sandbox_id): Path<String>,
    ws: WebSocketUpgrade,
) -> Response {
    match state.hub.subscribe(&sandbox_id).await {
        Ok(subscription) => {
            ws.on_upgrade(move |socket| drive_subscriber(socket, sandbox_id, subscription))
        }
        Err(e) => ApiError::not_found(e.to_string()).into_response(),
    }
}

/// Pump hub events onto the socket and socket pongs back to the hub.
///
/// This task is the socket's only writer. It ends when the hub closes the
/// subscription (sandbox removed or subscriber dropped) or the peer goes away.
async fn drive_subscriber(socket: WebSocket, sandbox_id: String, mut subscription: Subscription) {
    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            event = subscription.recv() => match event {
                Some(SubscriberEvent::Frame(frame)) => {
                    let text = String::from_utf8_lossy(&frame).into_owned();
                    if sink.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Some(SubscriberEvent::Ping) => {
                    if sink.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
                None => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            },
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Pong(_))) => subscription.pong(),
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(_)) => break,
                // Subscribers have nothing to say on this channel.
                Some(Ok(_)) => {}
            },
        }
    }

    debug!(%sandbox_id, "stream subscriber disconnected");
}
