// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Client Gateway (C7, §2, §6): the client-facing wire protocol and HTTP
//! admin surface sitting in front of the Turn Engine (forge-core) and
//! Session Store (forge-store).

pub mod admin;
pub mod hub;
pub mod protocol;
pub mod ws;
#[cfg(test)]
mod tests;

use std::sync::Arc;

use axum::extract::FromRef;
use axum::routing::{get, post, put};
use axum::Router;
use forge_core::TurnEngine;
use forge_store::SessionStore;

pub use hub::SessionHub;
pub use protocol::ClientMessage;

/// Shared state for every HTTP/WS handler. Cheap to clone (everything
/// inside is an `Arc` or itself clone-cheap).
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<SessionStore>,
    pub engine: Arc<TurnEngine>,
    pub hub: SessionHub,
}

impl FromRef<AppState> for SessionHub {
    fn from_ref(state: &AppState) -> Self {
        state.hub.clone()
    }
}

/// Build the full router: `/ws` for the bi-directional channel, the rest for
/// the non-streaming admin surface (§6).
pub fn router(store: Arc<SessionStore>, engine: Arc<TurnEngine>) -> Router {
    let hub = SessionHub::new(engine.clone());
    let state = AppState { store, engine, hub };

    Router::new()
        .route("/ws", get(ws::ws_handler))
        .route("/session", post(admin::create_session).get(admin::get_session).delete(admin::delete_session))
        .route("/sessions", get(admin::list_sessions))
        .route("/session/snapshot", get(admin::get_snapshot))
        .route("/session/title", put(admin::update_title))
        .route("/generate-title", post(admin::generate_title))
        .with_state(state)
}
