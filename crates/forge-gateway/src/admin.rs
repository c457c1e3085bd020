// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Non-streaming HTTP session admin surface (§6).

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use forge_store::{SessionIndexItem, SessionMode, Snapshot};
use serde::{Deserialize, Serialize};

use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateSessionBody {
    #[serde(default)]
    pub working_dir: Option<String>,
    #[serde(default)]
    pub max_mode: Option<SessionMode>,
}

#[derive(Debug, Serialize)]
pub struct CreateSessionReply {
    pub id: String,
}

pub async fn create_session(
    State(state): State<AppState>,
    Json(body): Json<CreateSessionBody>,
) -> Result<Json<CreateSessionReply>, AdminError> {
    let working_dir = body.working_dir.unwrap_or_else(|| ".".to_string());
    let mode = body.max_mode.unwrap_or_default();
    let id = state.store.create_session(&working_dir, mode).await?;
    Ok(Json(CreateSessionReply { id }))
}

#[derive(Debug, Deserialize)]
pub struct IdQuery {
    pub id: String,
}

pub async fn get_session(
    State(state): State<AppState>,
    Query(q): Query<IdQuery>,
) -> Result<Json<SessionIndexItem>, AdminError> {
    let snapshot = state.store.get_snapshot(&q.id).await?;
    Ok(Json((&snapshot).into()))
}

#[derive(Debug, Serialize)]
pub struct SuccessReply {
    pub success: bool,
}

pub async fn delete_session(
    State(state): State<AppState>,
    Query(q): Query<IdQuery>,
) -> Result<Json<SuccessReply>, AdminError> {
    state.store.clear_session(&q.id).await?;
    Ok(Json(SuccessReply { success: true }))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub working_dir: Option<String>,
}

pub async fn list_sessions(
    State(state): State<AppState>,
    Query(q): Query<ListQuery>,
) -> Json<Vec<SessionIndexItem>> {
    Json(state.store.list_sessions(q.working_dir.as_deref()).await)
}

pub async fn get_snapshot(
    State(state): State<AppState>,
    Query(q): Query<IdQuery>,
) -> Result<Json<Snapshot>, AdminError> {
    Ok(Json(state.store.get_snapshot(&q.id).await?))
}

#[derive(Debug, Deserialize)]
pub struct UpdateTitleBody {
    pub id: String,
    pub title: String,
}

pub async fn update_title(
    State(state): State<AppState>,
    Json(body): Json<UpdateTitleBody>,
) -> Result<Json<SuccessReply>, AdminError> {
    state.store.update_title(&body.id, &body.title).await?;
    Ok(Json(SuccessReply { success: true }))
}

#[derive(Debug, Deserialize)]
pub struct GenerateTitleBody {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct GenerateTitleReply {
    pub title: String,
}

pub async fn generate_title(
    State(state): State<AppState>,
    Json(body): Json<GenerateTitleBody>,
) -> Json<GenerateTitleReply> {
    let title = state.engine.generate_title(&body.message).await;
    Json(GenerateTitleReply { title })
}

/// HTTP-facing error wrapper; never leaks a Rust `Debug` representation.
pub struct AdminError(StatusCode, String);

impl From<forge_store::StoreError> for AdminError {
    fn from(e: forge_store::StoreError) -> Self {
        match e {
            forge_store::StoreError::NotFound(id) => {
                AdminError(StatusCode::NOT_FOUND, format!("session not found: {id}"))
            }
            other => AdminError(StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
        }
    }
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        (self.0, Json(serde_json::json!({ "error": self.1 }))).into_response()
    }
}
