//! WebSocket handler for live round communication.
//!
//! # Connection Flow
//!
//! 1. Client connects via `GET /ws?key=<identity-key>`; a missing key
//!    refuses the upgrade.
//! 2. The connection attaches to the table actor, which resolves the
//!    identity and replies with the current balance and a full round
//!    snapshot, the first two messages every client receives.
//! 3. A send task forwards broadcast events from the actor; the receive
//!    loop parses client commands and forwards them to the actor.
//! 4. On disconnect the connection detaches. An accepted bet stays in
//!    play: the debit already happened and payout targets the identity.
//!
//! # Client Messages
//!
//! ```json
//! {"type": "place_bet", "side": "andar", "amount": 100}
//! {"type": "request_balance"}
//! {"type": "claim_identity", "key": "12345", "profile": {"username": "alice"}}
//! {"type": "leave"}
//! ```
//!
//! # Server Messages
//!
//! Every server message is a tagged [`ServerEvent`]: `round_state`,
//! `countdown_tick`, `card_drawn`, `pot_update`, `bet_accepted`,
//! `round_complete`, `balance_changed`, `error`.

use axum::{
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use log::{debug, info, warn};
use serde::Deserialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use andar_bahar::game::{Chips, Side};
use andar_bahar::identity::Profile;
use andar_bahar::table::{ConnectionId, ServerEvent, TableError};

use super::AppState;
use crate::metrics;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    key: String,
}

/// Client messages received via WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientMessage {
    /// Wager on a side during the lobby phase
    PlaceBet { side: Side, amount: Chips },
    /// Ask for the current balance
    RequestBalance,
    /// Claim an authenticated identity for this session
    ClaimIdentity {
        key: String,
        #[serde(default)]
        profile: Profile,
    },
    /// Gracefully detach
    Leave,
}

/// Upgrade the HTTP connection to a WebSocket attached to the live round.
///
/// Requires an identity key in the query string; the attach is refused
/// without one.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Response {
    let key = query.key.trim().to_string();
    if key.is_empty() {
        return (StatusCode::BAD_REQUEST, "identity key required").into_response();
    }

    ws.on_upgrade(move |socket| handle_socket(socket, key, state))
}

/// Drive one established WebSocket connection until it closes.
async fn handle_socket(socket: WebSocket, key: String, state: AppState) {
    let conn_id: ConnectionId = Uuid::new_v4();
    let (mut sender, mut receiver) = socket.split();

    // All outgoing traffic funnels through one channel: the actor's
    // broadcasts and this handler's targeted replies, in send order.
    let (event_tx, mut event_rx) = mpsc::channel::<ServerEvent>(64);

    let attached = match state.table.attach(conn_id, key.clone(), event_tx.clone()).await {
        Ok(attached) => attached,
        Err(e) => {
            warn!("attach refused for {key}: {e}");
            let refusal = ServerEvent::Error {
                message: e.client_message(),
            };
            if let Ok(json) = serde_json::to_string(&refusal) {
                let _ = sender.send(Message::Text(json.into())).await;
            }
            let _ = sender.send(Message::Close(None)).await;
            return;
        }
    };

    info!("WebSocket connected: conn={conn_id}, key={key}");
    metrics::ws_connection_opened();

    // The newly attached client always hears its balance and a full
    // snapshot first.
    let hello = [
        ServerEvent::BalanceChanged {
            balance: attached.balance,
        },
        ServerEvent::RoundState(attached.snapshot),
    ];
    for event in hello {
        if let Ok(json) = serde_json::to_string(&event)
            && sender.send(Message::Text(json.into())).await.is_err()
        {
            state.table.detach(conn_id).await.ok();
            metrics::ws_connection_closed();
            return;
        }
    }

    // Forward actor events to the socket.
    let send_task = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(e) => {
                    warn!("failed to serialize event: {e}");
                    continue;
                }
            };
            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    // Process incoming client commands.
    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                let message = match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(message) => message,
                    Err(e) => {
                        debug!("unparseable message from {conn_id}: {e}");
                        let _ = event_tx
                            .send(ServerEvent::Error {
                                message: "Invalid message format".to_string(),
                            })
                            .await;
                        continue;
                    }
                };

                if handle_client_message(message, conn_id, &state, &event_tx).await {
                    break;
                }
            }
            Ok(Message::Close(_)) => {
                debug!("WebSocket closed by client: conn={conn_id}");
                break;
            }
            Err(e) => {
                debug!("WebSocket error on conn={conn_id}: {e}");
                break;
            }
            _ => {}
        }
    }

    // Cleanup. Detaching never cancels an accepted bet.
    send_task.abort();
    state.table.detach(conn_id).await.ok();
    metrics::ws_connection_closed();
    info!("WebSocket disconnected: conn={conn_id}");
}

/// Dispatch one parsed client command to the table actor and queue the
/// reply. Returns true when the connection should close.
async fn handle_client_message(
    message: ClientMessage,
    conn_id: ConnectionId,
    state: &AppState,
    replies: &mpsc::Sender<ServerEvent>,
) -> bool {
    match message {
        ClientMessage::PlaceBet { side, amount } => {
            metrics::ws_message_received("place_bet");
            match state.table.place_bet(conn_id, side, amount).await {
                Ok(ack) => {
                    metrics::bet_accepted(ack.amount);
                    let _ = replies
                        .send(ServerEvent::BetAccepted {
                            side: ack.side,
                            amount: ack.amount,
                            pots: ack.pots,
                        })
                        .await;
                    let _ = replies
                        .send(ServerEvent::BalanceChanged {
                            balance: ack.balance,
                        })
                        .await;
                }
                Err(e) => send_error(replies, &e).await,
            }
            false
        }

        ClientMessage::RequestBalance => {
            metrics::ws_message_received("request_balance");
            match state.table.balance(conn_id).await {
                Ok(balance) => {
                    let _ = replies.send(ServerEvent::BalanceChanged { balance }).await;
                }
                Err(e) => send_error(replies, &e).await,
            }
            false
        }

        ClientMessage::ClaimIdentity { key, profile } => {
            metrics::ws_message_received("claim_identity");
            match state.table.claim_identity(conn_id, key, profile).await {
                Ok(ack) => {
                    metrics::identity_claimed();
                    let _ = replies
                        .send(ServerEvent::BalanceChanged {
                            balance: ack.balance,
                        })
                        .await;
                }
                Err(e) => send_error(replies, &e).await,
            }
            false
        }

        ClientMessage::Leave => {
            metrics::ws_message_received("leave");
            true
        }
    }
}

async fn send_error(replies: &mpsc::Sender<ServerEvent>, error: &TableError) {
    let _ = replies
        .send(ServerEvent::Error {
            message: error.client_message(),
        })
        .await;
}
