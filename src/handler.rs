//! WebSocket connection handler.
//!
//! Runs one task per connection: assigns the connection id, forwards
//! outbound messages through a channel, dispatches inbound events into the
//! relay state, and performs cleanup when the socket closes — gracefully or
//! not, the same path runs.

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::protocol::{ClientMessage, ServerMessage, SignalKind};
use crate::state::{RoomLeave, SignalingState};

/// Handle a single WebSocket connection.
///
/// This function runs for the lifetime of the connection:
/// 1. Assigns a connection id and registers the outbound channel
/// 2. Sends `connected` so the client learns its own socket id
/// 3. Spawns a sender task to forward outbound messages
/// 4. Processes incoming events until the socket closes
/// 5. Cleans up membership and registry entries, notifying the room
pub async fn handle_websocket(socket: WebSocket, state: SignalingState) {
    let connection_id = Uuid::new_v4().to_string();
    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Create the outbound channel for this connection
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();

    state.register_connection(&connection_id, tx);
    state.send_to_connection(
        &connection_id,
        ServerMessage::Connected {
            socket_id: connection_id.clone(),
        },
    );

    // ── Sender Task ───────────────────────────────────────────────────────

    let sender_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            match serde_json::to_string(&msg) {
                Ok(json) => {
                    if ws_sender.send(Message::Text(json)).await.is_err() {
                        break; // Connection closed
                    }
                }
                Err(e) => {
                    tracing::error!("Failed to serialize server message: {}", e);
                }
            }
        }
    });

    // ── Event Loop ────────────────────────────────────────────────────────

    while let Some(msg_result) = ws_receiver.next().await {
        match msg_result {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(client_msg) => {
                    handle_client_message(&state, &connection_id, client_msg);
                }
                Err(e) => {
                    tracing::warn!(
                        connection = connection_id.as_str(),
                        error = %e,
                        "Failed to parse client message"
                    );
                    state.send_to_connection(
                        &connection_id,
                        ServerMessage::Error {
                            message: format!("Invalid message format: {}", e),
                        },
                    );
                }
            },
            Ok(Message::Ping(_)) => {
                // Axum answers protocol-level pings itself; nothing to do.
            }
            Ok(Message::Close(_)) => {
                tracing::info!(connection = connection_id.as_str(), "Client sent close frame");
                break;
            }
            Err(e) => {
                tracing::warn!(
                    connection = connection_id.as_str(),
                    error = %e,
                    "WebSocket error"
                );
                break;
            }
            _ => {} // Binary, Pong — ignore
        }
    }

    // ── Cleanup ───────────────────────────────────────────────────────────

    cleanup_connection(&state, &connection_id);
    sender_task.abort();
    tracing::info!(connection = connection_id.as_str(), "WebSocket disconnected");
}

/// Dispatch a parsed client event.
fn handle_client_message(state: &SignalingState, connection_id: &str, msg: ClientMessage) {
    match msg {
        ClientMessage::JoinUserChannel { user_id } => {
            state.associate_user(&user_id, connection_id);
        }

        ClientMessage::LeaveUserChannel { user_id } => {
            state.dissociate_user(&user_id);
        }

        ClientMessage::JoinRoom { room_id } => {
            handle_join_room(state, connection_id, &room_id);
        }

        ClientMessage::LeaveRoom => {
            if let Some(left) = state.leave_room(connection_id) {
                notify_partner_left(state, connection_id, &left);
            }
        }

        ClientMessage::Offer { target, offer } => {
            state.relay_signal(SignalKind::Offer, connection_id, &target, offer);
        }

        ClientMessage::Answer { target, answer } => {
            state.relay_signal(SignalKind::Answer, connection_id, &target, answer);
        }

        ClientMessage::IceCandidate { target, candidate } => {
            state.relay_signal(SignalKind::IceCandidate, connection_id, &target, candidate);
        }

        ClientMessage::SendRoomMessage {
            room_id,
            message,
            sender,
        } => {
            state.broadcast_room_message(&room_id, connection_id, &sender, &message);
        }

        ClientMessage::Ping => {
            state.send_to_connection(connection_id, ServerMessage::Pong);
        }
    }
}

// ── Event Handlers ────────────────────────────────────────────────────────────

/// Join a room and announce the arrival to everyone already in it. When the
/// join switched rooms, the old room hears `partner-left` first.
fn handle_join_room(state: &SignalingState, connection_id: &str, room_id: &str) {
    let Some(join) = state.join_room(connection_id, room_id) else {
        return; // no-op join: empty room id or already a member
    };

    if let Some(ref left) = join.previous {
        notify_partner_left(state, connection_id, left);
    }

    for peer in &join.peers {
        state.send_to_connection(
            peer,
            ServerMessage::NewParticipant {
                socket_id: connection_id.to_string(),
            },
        );
    }
}

/// Tell every remaining member of a room that a participant is gone.
fn notify_partner_left(state: &SignalingState, leaver_id: &str, left: &RoomLeave) {
    for member in &left.remaining {
        state.send_to_connection(
            member,
            ServerMessage::PartnerLeft {
                socket_id: leaver_id.to_string(),
            },
        );
    }
}

/// Disconnect cleanup. Leaving the room runs the same `leave_room` path as
/// an explicit `leave-room` event; on top of that the user channel and the
/// sender registration are dropped.
fn cleanup_connection(state: &SignalingState, connection_id: &str) {
    if let Some(left) = state.leave_room(connection_id) {
        notify_partner_left(state, connection_id, &left);
    }
    state.drop_user_associations(connection_id);
    state.unregister_connection(connection_id);
}

// ── Tests ─────────────────────────────────────────────────────────────────────
