//! Lesson Relay Server
//!
//! A lightweight WebSocket signaling relay for live tutoring meetings:
//!
//! 1. **Room membership**: participants join a meeting room; everyone in the
//!    room is told who arrives and who leaves, including ungraceful drops.
//!
//! 2. **WebRTC signaling**: SDP offers/answers and ICE candidates are
//!    forwarded point-to-point so peers can establish a direct media
//!    connection. The relay never parses the payloads it forwards — media
//!    flows peer-to-peer, not through this server.
//!
//! 3. **In-meeting chat**: transient text fan-out to every room member with
//!    a server-assigned timestamp. Nothing is persisted.
//!
//! Identity and persistence live upstream; the relay holds only in-memory
//! state scoped to the process lifetime. Clients re-join after a restart.

mod handler;
mod protocol;
mod state;

use axum::{
    extract::{Path, State, WebSocketUpgrade},
    http::Method,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use clap::Parser;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use state::{ServerConfig, SignalingState};

// ── CLI Arguments ─────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "lesson-relay", version, about = "Signaling relay for live tutoring meetings")]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value_t = 8080, env = "RELAY_PORT")]
    port: u16,

    /// Interface to bind
    #[arg(long, default_value = "0.0.0.0", env = "RELAY_BIND")]
    bind: String,
}

// ── Entry Point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lesson_relay=info,tower_http=info".into()),
        )
        .init();

    let args = Args::parse();

    let config = ServerConfig {
        port: args.port,
        bind: args.bind,
    };

    let state = SignalingState::new(config);

    // Build router
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    let app = Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))
        .route("/presence/:user_id", get(presence_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone());

    let addr = format!("{}:{}", state.config.bind, state.config.port);
    tracing::info!("Lesson relay server starting on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind address");

    axum::serve(listener, app)
        .await
        .expect("Server error");
}

// ── Route Handlers ────────────────────────────────────────────────────────────

/// WebSocket upgrade handler for client connections.
async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<SignalingState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handler::handle_websocket(socket, state))
}

/// Health check endpoint.
async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "lesson-relay",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Statistics endpoint.
async fn stats_handler(State(state): State<SignalingState>) -> impl IntoResponse {
    Json(json!({
        "connections": state.connection_count(),
        "active_rooms": state.room_count(),
        "user_channels": state.user_channel_count(),
    }))
}

/// Presence endpoint — lets the platform backend check whether a user is
/// currently reachable and at which socket. `online: false` is the routine
/// answer for a disconnected user, not an error.
async fn presence_handler(
    Path(user_id): Path<String>,
    State(state): State<SignalingState>,
) -> impl IntoResponse {
    match state.resolve_user(&user_id) {
        Some(connection_id) if state.is_connected(&connection_id) => Json(json!({
            "userId": user_id,
            "online": true,
            "socketId": connection_id,
            "roomId": state.current_room(&connection_id),
        })),
        _ => Json(json!({
            "userId": user_id,
            "online": false,
        })),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_json_structure() {
        let json_val = json!({
            "status": "ok",
            "service": "lesson-relay",
            "version": env!("CARGO_PKG_VERSION"),
        });
        assert_eq!(json_val["status"], "ok");
        assert_eq!(json_val["service"], "lesson-relay");
    }

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.bind, "0.0.0.0");
    }

    #[tokio::test]
    async fn test_state_creation() {
        let state = SignalingState::new(ServerConfig::default());
        assert_eq!(state.connection_count(), 0);
        assert_eq!(state.room_count(), 0);
        assert_eq!(state.user_channel_count(), 0);
    }
}
