//! Inkboard WebSocket relay server.
//!
//! Relays board actions between clients editing the same board and keeps
//! enough state (latest snapshot plus the events after it) to bring late
//! joiners up to date. The server never interprets board contents.
//!
//! ## Protocol
//!
//! JSON text frames, tagged by `type`:
//! ```json
//! { "type": "join", "board": "board-id", "client_id": "c1" }
//! { "type": "action", "action": { "type": 2, "data": { "ids": [1], "dx": 5, "dy": 0 } } }
//! { "type": "save", "data": "<base64 snapshot>", "seen": 42 }
//! ```

mod rooms;

use axum::{
    Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
    routing::get,
};
use futures_util::{SinkExt, StreamExt};
use inkboard_core::protocol::{ClientId, ClientMessage, ServerMessage};
use rooms::{Broadcast, Rooms};
use std::{net::SocketAddr, sync::Arc};
use tokio::sync::broadcast;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

const DEFAULT_ADDR: &str = "0.0.0.0:3030";

type AppState = Arc<Rooms>;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "inkboard_server=info,tower_http=info".into()),
        )
        .init();

    let addr: SocketAddr = std::env::var("INKBOARD_ADDR")
        .unwrap_or_else(|_| DEFAULT_ADDR.to_string())
        .parse()?;

    let app = Router::new()
        .route("/", get(index))
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(Rooms::new()));

    info!("Inkboard relay listening on {addr}");
    info!("WebSocket endpoint: ws://{addr}/ws");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn index() -> &'static str {
    "Inkboard Relay Server - Connect via WebSocket at /ws"
}

async fn health() -> &'static str {
    "ok"
}

async fn ws_handler(ws: WebSocketUpgrade, State(rooms): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, rooms))
}

/// Membership of one connection.
struct Seat {
    board: String,
    client: ClientId,
    rx: broadcast::Receiver<Broadcast>,
}

async fn send_json(
    sender: &mut futures_util::stream::SplitSink<WebSocket, Message>,
    msg: &ServerMessage,
) -> bool {
    match serde_json::to_string(msg) {
        Ok(json) => sender.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            warn!("failed to serialize server message: {e}");
            true
        }
    }
}

fn error(message: impl Into<String>) -> ServerMessage {
    ServerMessage::Error {
        message: message.into(),
    }
}

fn vacate(rooms: &Rooms, seat: Option<Seat>) {
    if let Some(seat) = seat {
        rooms.leave(&seat.board, &seat.client);
        info!("{} left board {}", seat.client, seat.board);
    }
}

async fn handle_socket(socket: WebSocket, rooms: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let mut seat: Option<Seat> = None;

    loop {
        tokio::select! {
            msg = receiver.next() => {
                let text = match msg {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(Message::Binary(_))) => {
                        if !send_json(&mut sender, &error("binary frames are not supported")).await {
                            break;
                        }
                        continue;
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        warn!("WebSocket error: {e}");
                        break;
                    }
                };

                let reply = match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(ClientMessage::Join { board, client_id }) => {
                        vacate(&rooms, seat.take());
                        match rooms.join(&board, &client_id) {
                            Ok(joined) => {
                                info!("{client_id} joined board {board}");
                                seat = Some(Seat {
                                    board,
                                    client: client_id,
                                    rx: joined.rx,
                                });
                                Some(joined.ready)
                            }
                            Err(e) => Some(error(e.to_string())),
                        }
                    }
                    Ok(ClientMessage::Leave) => {
                        vacate(&rooms, seat.take());
                        None
                    }
                    Ok(ClientMessage::Action { action }) => match &seat {
                        Some(s) => match rooms.publish(&s.board, &s.client, action) {
                            Ok(true) => Some(ServerMessage::SaveRequested),
                            Ok(false) => None,
                            Err(e) => Some(error(e.to_string())),
                        },
                        None => Some(error(rooms::RoomError::NotJoined.to_string())),
                    },
                    Ok(ClientMessage::Save { data, seen }) => match &seat {
                        Some(s) => rooms.save(&s.board, &s.client, data, seen).err().map(|e| error(e.to_string())),
                        None => Some(error(rooms::RoomError::NotJoined.to_string())),
                    },
                    Err(e) => {
                        warn!("invalid message: {e}");
                        Some(error(format!("Invalid message: {e}")))
                    }
                };
                if let Some(reply) = reply {
                    if !send_json(&mut sender, &reply).await {
                        break;
                    }
                }
            }

            msg = async {
                match &mut seat {
                    Some(s) => s.rx.recv().await,
                    None => std::future::pending().await,
                }
            } => {
                match msg {
                    Ok((from, server_msg)) => {
                        let own = seat.as_ref().is_some_and(|s| s.client == from);
                        if !own && !send_json(&mut sender, &server_msg).await {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("connection lagged, {n} messages dropped");
                        if !send_json(&mut sender, &error(format!("{n} messages dropped; rejoin to resync"))).await {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        seat = None;
                    }
                }
            }
        }
    }

    vacate(&rooms, seat.take());
}
