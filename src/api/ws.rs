//! WebSocket endpoint
//!
//! One task per socket: inbound frames are parsed as [`ClientEvent`]s and
//! dispatched to the hub, while a forwarding task drains the connection's
//! gateway channel into the socket.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, Query, State,
    },
    http::{header, HeaderMap, HeaderValue},
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::broadcast::{ClientEvent, ConnectionId, ServerEvent};
use crate::error::Error;
use crate::model::{Mode, VoterIdentity};
use super::auth::session_token;
use super::http::AppState;

/// Query parameters accepted on `/ws`
#[derive(Debug, Default, Deserialize)]
pub struct WsParams {
    /// Admin session token
    #[serde(default)]
    pub token: Option<String>,
    /// Voter session token
    #[serde(default)]
    pub voter: Option<String>,
}

pub(crate) async fn handle_ws(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Query(params): Query<WsParams>,
    headers: HeaderMap,
) -> Response {
    let resolved = state.identity.resolve(peer, &headers, params.voter.as_deref());
    let admin_token = params.token.or_else(|| session_token(&headers));
    let voter = resolved.voter;

    let mut response = ws
        .on_upgrade(move |socket| handle_socket(socket, state, voter, admin_token))
        .into_response();

    if let Some(cookie) = resolved.set_cookie {
        if let Ok(value) = HeaderValue::from_str(&cookie) {
            response.headers_mut().insert(header::SET_COOKIE, value);
        }
    }
    response
}

async fn handle_socket(
    socket: WebSocket,
    state: Arc<AppState>,
    voter: VoterIdentity,
    admin_token: Option<String>,
) {
    let (mut sender, mut receiver) = socket.split();
    let (conn, rx) = state.hub.connect(voter.clone()).await;
    tracing::info!("Client {} connected as {}", conn, voter);

    let mut outbound = UnboundedReceiverStream::new(rx);
    let forward = tokio::spawn(async move {
        while let Some(event) = outbound.next().await {
            if sender.send(Message::Text(event.to_json())).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            Message::Text(text) => {
                let reply = match serde_json::from_str::<ClientEvent>(&text) {
                    Ok(event) => dispatch(&state, conn, &voter, admin_token.as_deref(), event).await,
                    Err(e) => {
                        tracing::debug!("Bad message from {}: {}", conn, e);
                        Some(ServerEvent::error(&Error::InvalidRequest(e.to_string())))
                    }
                };
                if let Some(reply) = reply {
                    state.hub.gateway().send_to(conn, reply).await;
                }
            }
            Message::Binary(_) => {
                let err = Error::InvalidRequest("binary frames are not supported".into());
                state.hub.gateway().send_to(conn, ServerEvent::error(&err)).await;
            }
            Message::Close(_) => break,
            // Protocol-level ping/pong is answered by the socket itself
            Message::Ping(_) | Message::Pong(_) => {}
        }
    }

    state.hub.disconnect(conn).await;
    forward.abort();
    tracing::info!("Client {} disconnected", conn);
}

/// Apply one client event. Returns the reply owed to this connection only;
/// state changes reach everyone through the hub's broadcasts.
pub(crate) async fn dispatch(
    state: &AppState,
    conn: ConnectionId,
    voter: &VoterIdentity,
    admin_token: Option<&str>,
    event: ClientEvent,
) -> Option<ServerEvent> {
    if event.requires_admin() && !state.gate.is_authorized(admin_token).await {
        tracing::warn!("Rejected {} from {}: not authorized", event.type_name(), conn);
        return Some(ServerEvent::error(&Error::Unauthorized));
    }

    match event {
        ClientEvent::CastVote { contestant_id, vote } => {
            match state.hub.submit_vote(voter, contestant_id, vote).await {
                Ok(accepted) => Some(ServerEvent::VoteResult {
                    success: true,
                    message: format!("Vote recorded for {}", accepted.contestant.name),
                }),
                Err(e) => {
                    tracing::debug!("Vote from {} rejected: {}", voter, e);
                    Some(ServerEvent::VoteResult {
                        success: false,
                        message: e.to_string(),
                    })
                }
            }
        }
        ClientEvent::AdminOpenRound { contestant_id, duration_seconds } => {
            let duration = duration_seconds.map(Duration::from_secs);
            state
                .hub
                .open_round(contestant_id, duration)
                .await
                .err()
                .map(|e| ServerEvent::error(&e))
        }
        ClientEvent::AdminCloseRound { mode } => state
            .hub
            .close_round(mode.unwrap_or(Mode::Stopped))
            .await
            .err()
            .map(|e| ServerEvent::error(&e)),
        ClientEvent::AdminReset { landing } => {
            state.hub.reset(landing).await.err().map(|e| ServerEvent::error(&e))
        }
        ClientEvent::AdminShowLanding => {
            state.hub.show_landing().await;
            None
        }
        ClientEvent::Ping => Some(ServerEvent::Pong),
    }
}
