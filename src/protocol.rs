//! Relay protocol message definitions.
//!
//! The relay speaks a simple JSON-over-WebSocket protocol. Every frame is a
//! tagged object: `{"type": "<event>", ...}`. Signaling payloads (SDP
//! offers/answers, ICE candidates) are opaque to the relay — they are
//! forwarded verbatim and never inspected.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ── Client → Relay ────────────────────────────────────────────────────────────

/// Messages sent from a client to the relay server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Associate a durable user id with this connection so it can be
    /// addressed directly, independent of room membership. A repeat from a
    /// newer connection supersedes the old association.
    JoinUserChannel {
        user_id: String,
    },

    /// Drop the user-id association.
    LeaveUserChannel {
        user_id: String,
    },

    /// Join a meeting room. Everyone already in the room is told about the
    /// new participant. A connection occupies at most one room; joining a
    /// different room leaves the current one first.
    JoinRoom {
        room_id: String,
    },

    /// Leave the current room (if any).
    LeaveRoom,

    /// Forward an SDP offer to another connection in the meeting.
    Offer {
        target: String,
        offer: Value,
    },

    /// Forward an SDP answer to another connection.
    Answer {
        target: String,
        answer: Value,
    },

    /// Forward an ICE candidate to another connection.
    IceCandidate {
        target: String,
        candidate: Value,
    },

    /// Broadcast a chat message to every member of a room, sender included.
    SendRoomMessage {
        room_id: String,
        message: String,
        sender: String,
    },

    /// Ping to keep the connection alive.
    Ping,
}

// ── Relay → Client ────────────────────────────────────────────────────────────

/// Messages sent from the relay server to a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// Sent once after the upgrade — tells the client its own socket id.
    Connected {
        socket_id: String,
    },

    /// A new participant joined the room. Sent to every other member.
    NewParticipant {
        socket_id: String,
    },

    /// A participant left the room (or dropped). Sent to remaining members.
    PartnerLeft {
        socket_id: String,
    },

    /// An SDP offer forwarded from another connection.
    Offer {
        from: String,
        offer: Value,
    },

    /// An SDP answer forwarded from another connection.
    Answer {
        from: String,
        answer: Value,
    },

    /// An ICE candidate forwarded from another connection.
    IceCandidate {
        from: String,
        candidate: Value,
    },

    /// A chat message fanned out to the whole room, sender included.
    /// `timestamp` is server-assigned (millis since epoch) so every
    /// participant renders the same ordering.
    RoomMessage {
        message: String,
        sender: String,
        timestamp: i64,
        socket_id: String,
    },

    /// Pong response to keep the connection alive.
    Pong,

    /// Error response. Only sent for frames that fail to parse.
    Error {
        message: String,
    },
}

// ── Signal Kinds ──────────────────────────────────────────────────────────────

/// The three point-to-point signaling kinds the relay forwards. Selects the
/// outbound event name; the payload itself stays opaque.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    Offer,
    Answer,
    IceCandidate,
}

impl SignalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalKind::Offer => "offer",
            SignalKind::Answer => "answer",
            SignalKind::IceCandidate => "ice-candidate",
        }
    }

    /// Wrap an opaque payload in the outbound message for this kind.
    pub fn into_message(self, from: String, payload: Value) -> ServerMessage {
        match self {
            SignalKind::Offer => ServerMessage::Offer {
                from,
                offer: payload,
            },
            SignalKind::Answer => ServerMessage::Answer {
                from,
                answer: payload,
            },
            SignalKind::IceCandidate => ServerMessage::IceCandidate {
                from,
                candidate: payload,
            },
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_client_message_event_names() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type": "join-room", "roomId": "lesson-42"}"#).unwrap();
        match msg {
            ClientMessage::JoinRoom { room_id } => assert_eq!(room_id, "lesson-42"),
            other => panic!("Unexpected message: {:?}", other),
        }

        let msg: ClientMessage = serde_json::from_str(r#"{"type": "leave-room"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::LeaveRoom));

        let msg: ClientMessage =
            serde_json::from_str(r#"{"type": "join-user-channel", "userId": "u1"}"#).unwrap();
        match msg {
            ClientMessage::JoinUserChannel { user_id } => assert_eq!(user_id, "u1"),
            other => panic!("Unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_signal_payload_is_opaque() {
        // Whatever shape the browser sends is carried through untouched.
        let raw = r#"{"type": "offer", "target": "abc", "offer": {"type": "offer", "sdp": "v=0..."}}"#;
        let msg: ClientMessage = serde_json::from_str(raw).unwrap();
        match msg {
            ClientMessage::Offer { target, offer } => {
                assert_eq!(target, "abc");
                assert_eq!(offer["sdp"], "v=0...");
            }
            other => panic!("Unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_ice_candidate_round_trip() {
        let msg: ClientMessage = serde_json::from_str(
            r#"{"type": "ice-candidate", "target": "abc", "candidate": {"candidate": "candidate:1", "sdpMLineIndex": 0}}"#,
        )
        .unwrap();
        match msg {
            ClientMessage::IceCandidate { target, candidate } => {
                assert_eq!(target, "abc");
                assert_eq!(candidate["sdpMLineIndex"], 0);
            }
            other => panic!("Unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_server_message_field_casing() {
        let json = serde_json::to_value(ServerMessage::NewParticipant {
            socket_id: "abc".to_string(),
        })
        .unwrap();
        assert_eq!(json, json!({"type": "new-participant", "socketId": "abc"}));

        let json = serde_json::to_value(ServerMessage::PartnerLeft {
            socket_id: "abc".to_string(),
        })
        .unwrap();
        assert_eq!(json, json!({"type": "partner-left", "socketId": "abc"}));
    }

    #[test]
    fn test_room_message_wire_shape() {
        let json = serde_json::to_value(ServerMessage::RoomMessage {
            message: "hi".to_string(),
            sender: "Alice".to_string(),
            timestamp: 1700000000000,
            socket_id: "abc".to_string(),
        })
        .unwrap();
        assert_eq!(
            json,
            json!({
                "type": "room-message",
                "message": "hi",
                "sender": "Alice",
                "timestamp": 1700000000000i64,
                "socketId": "abc",
            })
        );
    }

    #[test]
    fn test_signal_kind_selects_event_name() {
        let msg = SignalKind::IceCandidate.into_message("abc".to_string(), json!({"x": 1}));
        let json = serde_json::to_value(msg).unwrap();
        assert_eq!(json["type"], "ice-candidate");
        assert_eq!(json["from"], "abc");
        assert_eq!(json["candidate"]["x"], 1);
    }

    #[test]
    fn test_unknown_event_fails_to_parse() {
        let result = serde_json::from_str::<ClientMessage>(r#"{"type": "shutdown"}"#);
        assert!(result.is_err());
    }
}
