//! Shared relay state.
//!
//! Tracks live connections, user channels, room membership, and the
//! connection→room reverse index. All data structures are concurrent
//! (DashMap) and owned by one cloneable state struct handed to the
//! handlers — there are no module-level globals, so tests get a fresh
//! instance each.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::protocol::{ServerMessage, SignalKind};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    /// Interface to bind, e.g. "0.0.0.0" or "127.0.0.1".
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            bind: "0.0.0.0".to_string(),
        }
    }
}

/// A connected client's sender channel.
pub type ClientSender = mpsc::UnboundedSender<ServerMessage>;

/// A meeting room and its current members. Membership is unordered.
#[derive(Debug, Default)]
pub struct Room {
    pub members: HashSet<String>,
}

/// What a completed leave changed: the room left and who is still in it.
#[derive(Debug)]
pub struct RoomLeave {
    pub room_id: String,
    pub remaining: Vec<String>,
}

/// What a completed join changed: the room implicitly left (when switching
/// rooms) and the peers that were already in the joined room.
#[derive(Debug)]
pub struct RoomJoin {
    pub previous: Option<RoomLeave>,
    pub peers: Vec<String>,
}

/// Shared relay state.
#[derive(Clone)]
pub struct SignalingState {
    /// Connection id → sender channel for live sockets.
    connections: Arc<DashMap<String, ClientSender>>,

    /// User id → the connection currently associated with it.
    /// At most one connection per user; a re-association supersedes.
    user_channels: Arc<DashMap<String, String>>,

    /// Room id → membership. A room with zero members is removed, never
    /// kept empty.
    rooms: Arc<DashMap<String, Room>>,

    /// Connection id → the room it occupies. Kept in lockstep with `rooms`
    /// so disconnect cleanup is a single lookup, not a scan.
    member_rooms: Arc<DashMap<String, String>>,

    /// Server configuration.
    pub config: ServerConfig,
}

impl SignalingState {
    /// Create a new relay state with the given configuration.
    pub fn new(config: ServerConfig) -> Self {
        Self {
            connections: Arc::new(DashMap::new()),
            user_channels: Arc::new(DashMap::new()),
            rooms: Arc::new(DashMap::new()),
            member_rooms: Arc::new(DashMap::new()),
            config,
        }
    }

    // ── Connection Registry ───────────────────────────────────────────────

    /// Register a connection's sender channel under its id.
    pub fn register_connection(&self, connection_id: &str, sender: ClientSender) {
        tracing::info!(connection = connection_id, "Connection registered");
        self.connections.insert(connection_id.to_string(), sender);
    }

    /// Unregister a connection when its socket closes.
    pub fn unregister_connection(&self, connection_id: &str) {
        tracing::info!(connection = connection_id, "Connection unregistered");
        self.connections.remove(connection_id);
    }

    /// Check whether a connection is currently live.
    pub fn is_connected(&self, connection_id: &str) -> bool {
        self.connections.contains_key(connection_id)
    }

    /// Send a message to a live connection. Returns false if the target is
    /// gone; delivery is fire-and-forget and callers may ignore the result.
    pub fn send_to_connection(&self, connection_id: &str, message: ServerMessage) -> bool {
        if let Some(sender) = self.connections.get(connection_id) {
            sender.send(message).is_ok()
        } else {
            false
        }
    }

    /// Number of currently live connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Number of rooms with at least one member.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Number of active user-channel associations.
    pub fn user_channel_count(&self) -> usize {
        self.user_channels.len()
    }

    // ── User Channels ─────────────────────────────────────────────────────

    /// Record that `user_id` is currently reachable at `connection_id`.
    /// Overwrites any prior association for that user.
    pub fn associate_user(&self, user_id: &str, connection_id: &str) {
        tracing::debug!(user = user_id, connection = connection_id, "User channel joined");
        self.user_channels
            .insert(user_id.to_string(), connection_id.to_string());
    }

    /// Remove the association for `user_id`. No-op when absent.
    pub fn dissociate_user(&self, user_id: &str) {
        tracing::debug!(user = user_id, "User channel left");
        self.user_channels.remove(user_id);
    }

    /// Look up the connection a user is reachable at. `None` means the user
    /// is offline, which is a routine state rather than an error.
    pub fn resolve_user(&self, user_id: &str) -> Option<String> {
        self.user_channels
            .get(user_id)
            .map(|entry| entry.value().clone())
    }

    /// Remove every user association still pointing at this connection.
    /// A user who already re-associated from a newer connection keeps the
    /// new entry.
    pub fn drop_user_associations(&self, connection_id: &str) {
        self.user_channels
            .retain(|_, conn| conn.as_str() != connection_id);
    }

    // ── Room Membership ───────────────────────────────────────────────────

    /// Join a room, creating it on first use. Returns what the caller must
    /// announce: the room implicitly left (when switching) and the peers
    /// already present. Returns `None` when nothing changed — the room id
    /// was empty, or the connection is already in that room.
    pub fn join_room(&self, connection_id: &str, room_id: &str) -> Option<RoomJoin> {
        if room_id.is_empty() {
            tracing::warn!(connection = connection_id, "Rejected join with empty room id");
            return None;
        }

        // Re-joining the occupied room is a silent no-op.
        let already_member = self
            .member_rooms
            .get(connection_id)
            .map(|entry| entry.value().as_str() == room_id)
            .unwrap_or(false);
        if already_member {
            return None;
        }

        // One room per connection: switching rooms leaves the old one first.
        let previous = self.leave_room(connection_id);

        let mut room = self.rooms.entry(room_id.to_string()).or_default();
        let peers: Vec<String> = room.members.iter().cloned().collect();
        room.members.insert(connection_id.to_string());
        let member_count = room.members.len();
        drop(room);

        self.member_rooms
            .insert(connection_id.to_string(), room_id.to_string());

        tracing::info!(
            connection = connection_id,
            room = room_id,
            member_count = member_count,
            "Joined room"
        );

        Some(RoomJoin { previous, peers })
    }

    /// Leave the current room, if any. Clears the reverse index, removes the
    /// membership, and deletes the room when it empties. Returns the room
    /// and the remaining members so the caller can notify them. This is the
    /// single cleanup path for both an explicit leave and a disconnect.
    pub fn leave_room(&self, connection_id: &str) -> Option<RoomLeave> {
        let (_, room_id) = self.member_rooms.remove(connection_id)?;

        let remaining: Vec<String> = if let Some(mut room) = self.rooms.get_mut(&room_id) {
            room.members.remove(connection_id);
            room.members.iter().cloned().collect()
        } else {
            Vec::new()
        };

        // Empty rooms are deleted, not kept. remove_if makes the emptiness
        // check and the removal one atomic step.
        self.rooms
            .remove_if(&room_id, |_, room| room.members.is_empty());

        tracing::info!(
            connection = connection_id,
            room = room_id.as_str(),
            remaining = remaining.len(),
            "Left room"
        );

        Some(RoomLeave { room_id, remaining })
    }

    /// The room a connection currently occupies.
    pub fn current_room(&self, connection_id: &str) -> Option<String> {
        self.member_rooms
            .get(connection_id)
            .map(|entry| entry.value().clone())
    }

    /// The members of a room, or `None` if the room does not exist.
    pub fn room_members(&self, room_id: &str) -> Option<Vec<String>> {
        self.rooms
            .get(room_id)
            .map(|room| room.members.iter().cloned().collect())
    }

    // ── Signal Relay ──────────────────────────────────────────────────────

    /// Forward a signaling payload to exactly one connection, tagged with
    /// the sender's id. No co-membership check — trust belongs to the layer
    /// that chose the target. A dead target drops the message silently.
    pub fn relay_signal(&self, kind: SignalKind, sender_id: &str, target_id: &str, payload: Value) {
        let message = kind.into_message(sender_id.to_string(), payload);
        if !self.send_to_connection(target_id, message) {
            tracing::debug!(
                kind = kind.as_str(),
                from = sender_id,
                to = target_id,
                "Signal target gone, dropped"
            );
        }
    }

    // ── Room Chat ─────────────────────────────────────────────────────────

    /// Fan a chat message out to every member of a room, sender included,
    /// with one server-assigned timestamp so all participants order it the
    /// same way. Silent no-op for an unknown room.
    pub fn broadcast_room_message(
        &self,
        room_id: &str,
        sender_id: &str,
        sender_name: &str,
        text: &str,
    ) {
        let Some(members) = self.room_members(room_id) else {
            tracing::debug!(room = room_id, "Dropped chat message for unknown room");
            return;
        };

        let timestamp = Utc::now().timestamp_millis();
        for member in &members {
            self.send_to_connection(
                member,
                ServerMessage::RoomMessage {
                    message: text.to_string(),
                    sender: sender_name.to_string(),
                    timestamp,
                    socket_id: sender_id.to_string(),
                },
            );
        }

        tracing::debug!(
            room = room_id,
            from = sender_id,
            recipients = members.len(),
            "Broadcast room message"
        );
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
