//! Live operation updates — spec §6 WebSocket surface.
//!
//! One broadcast channel per endpoint, created lazily, the same
//! `DashMap<_, broadcast::Sender<_>>` pattern the teacher uses for its SSE
//! status/metric channels in `servers.rs`.

use crate::auth;
use crate::error::AppError;
use crate::extractor::EndpointAuth;
use crate::id::Id;
use crate::model::OperationStatus;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Extension, Query};
use axum::response::Response;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

#[derive(Debug, Clone, Serialize)]
pub struct Progress {
    pub stage: String,
    pub percentage: u8,
    pub current_action: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct OperationUpdate {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub operation_id: Id,
    pub status: OperationStatus,
    pub progress: Progress,
    pub timestamp: chrono::DateTime<Utc>,
}

impl OperationUpdate {
    pub fn new(operation_id: Id, status: OperationStatus, stage: &str, percentage: u8, action: &str) -> Self {
        OperationUpdate {
            kind: "operation_update",
            operation_id,
            status,
            progress: Progress {
                stage: stage.to_string(),
                percentage,
                current_action: action.to_string(),
            },
            timestamp: Utc::now(),
        }
    }
}

static CHANNELS: Lazy<DashMap<Id, broadcast::Sender<OperationUpdate>>> = Lazy::new(DashMap::new);

fn channel(endpoint_id: Id) -> broadcast::Sender<OperationUpdate> {
    match CHANNELS.entry(endpoint_id) {
        Entry::Occupied(e) => e.get().clone(),
        Entry::Vacant(v) => {
            let (tx, _rx) = broadcast::channel(64);
            v.insert(tx.clone());
            tx
        }
    }
}

/// Publishes an update for `endpoint_id`'s subscribers. Silently dropped
/// if nobody is currently subscribed (`send` errors only when there are
/// zero receivers).
pub fn publish(endpoint_id: Id, update: OperationUpdate) {
    let _ = channel(endpoint_id).send(update);
}

#[derive(Deserialize)]
pub struct WsQuery {
    endpoint_id: Id,
}

pub async fn operations_ws(
    Extension(db): Extension<crate::db::Db>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
    headers: axum::http::HeaderMap,
) -> Result<Response, AppError> {
    let token = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(AppError::Unauthorized)?;
    let caller = auth::authenticate(&db, token).await?;
    auth::authorize_self(caller, query.endpoint_id)?;

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, query.endpoint_id)))
}

async fn handle_socket(mut socket: WebSocket, endpoint_id: Id) {
    let mut rx = channel(endpoint_id).subscribe();
    loop {
        tokio::select! {
            update = rx.recv() => {
                let update = match update {
                    Ok(u) => u,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                let Ok(text) = serde_json::to_string(&update) else { continue };
                if socket.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    // Clients don't send anything meaningful; tolerate it.
                    Some(Ok(_)) => continue,
                }
            }
        }
    }
}
