// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! WebSocket bridge: translates the client's bi-directional channel (§6) to
//! `SessionHub` calls. JSON text frames in both directions.

use std::net::SocketAddr;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::response::Response;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::hub::SessionHub;
use crate::protocol::ClientMessage;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(hub): State<SessionHub>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, hub, addr))
}

async fn handle_socket(mut socket: WebSocket, hub: SessionHub, peer: SocketAddr) {
    info!(%peer, "client connected");
    let mut events = hub.subscribe();

    loop {
        tokio::select! {
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(cmd) => hub.dispatch(cmd).await,
                            Err(e) => warn!(%peer, error = %e, "invalid client message"),
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(%peer, error = %e, "recv error");
                        break;
                    }
                }
            }
            result = events.recv() => {
                match result {
                    Ok(env) => {
                        if let Ok(json) = serde_json::to_string(&env) {
                            if socket.send(Message::Text(json)).await.is_err() {
                                break;
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(%peer, "client lagged by {n} events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    info!(%peer, "client disconnected");
}
