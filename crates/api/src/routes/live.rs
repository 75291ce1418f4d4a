//! WebSocket live push.
//!
//! Browsers cannot set headers on the upgrade request, so the operator token
//! comes from `?token=`. Clients send `join:<group>` / `leave:<group>` text
//! frames and receive `{"event": .., "data": ..}` frames for joined groups.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use domain::models::PushGroup;
use domain::services::PushSubscriber;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::OperatorAuth;

#[derive(Debug, Deserialize)]
pub struct LiveQuery {
    pub token: Option<String>,
}

/// A parsed client frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientFrame {
    Join(PushGroup),
    Leave(PushGroup),
}

impl ClientFrame {
    /// Parses `join:<group>` or `leave:<group>`. Anything else is ignored.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if let Some(group) = text.strip_prefix("join:") {
            return group.parse().ok().map(ClientFrame::Join);
        }
        if let Some(group) = text.strip_prefix("leave:") {
            return group.parse().ok().map(ClientFrame::Leave);
        }
        None
    }
}

/// GET /api/v1/home-alarm/ws?token=..
pub async fn ws_handler(
    State(state): State<AppState>,
    Query(query): Query<LiveQuery>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let token = query
        .token
        .ok_or_else(|| ApiError::Unauthorized("Missing token".to_string()))?;
    let auth = OperatorAuth::from_token(&state.token_verifier, &token)?;

    let subscriber = state.push.subscribe();
    Ok(ws.on_upgrade(move |socket| run_session(socket, subscriber, auth)))
}

async fn run_session(mut socket: WebSocket, mut subscriber: PushSubscriber, auth: OperatorAuth) {
    info!(user_id = auth.user_id, role = %auth.role, "Live client connected");
    metrics::gauge!("live_clients").increment(1.0);

    loop {
        tokio::select! {
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => handle_client_frame(&mut subscriber, &text),
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(error = %e, "Live client read failed");
                        break;
                    }
                }
            }
            outgoing = subscriber.recv() => {
                let Some(message) = outgoing else { break };
                let payload = match serde_json::to_string(&message.frame()) {
                    Ok(payload) => payload,
                    Err(e) => {
                        warn!(error = %e, event = message.event, "Failed to encode push frame");
                        continue;
                    }
                };
                if socket.send(Message::Text(payload)).await.is_err() {
                    break;
                }
            }
        }
    }

    metrics::gauge!("live_clients").decrement(1.0);
    info!(user_id = auth.user_id, "Live client disconnected");
}

fn handle_client_frame(subscriber: &mut PushSubscriber, text: &str) {
    match ClientFrame::parse(text) {
        Some(ClientFrame::Join(group)) => {
            subscriber.join(group);
            debug!(group = %group, "Live client joined group");
        }
        Some(ClientFrame::Leave(group)) => {
            subscriber.leave(group);
            debug!(group = %group, "Live client left group");
        }
        None => debug!("Ignoring unknown live client frame"),
    }
}
