use std::sync::Arc;

use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use snapshot_core::channel_connection;
use tracing::{debug, info, warn};

use crate::auth::token_accepted;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub token: Option<String>,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
) -> Response {
    let authorized = token_accepted(state.config.token(), params.token.as_deref());
    ws.on_upgrade(move |socket| async move {
        if authorized {
            handle_socket(socket, state).await;
        } else {
            reject(socket).await;
        }
    })
}

async fn reject(mut socket: WebSocket) {
    warn!("websocket rejected: bad token");
    let frame = CloseFrame {
        code: close_code::POLICY,
        reason: "unauthorized".into(),
    };
    let _ = socket.send(Message::Close(Some(frame))).await;
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (conn, mut outbound) = channel_connection(state.config.hub.connection_buffer);
    let id = match state.hub.subscribe(Arc::new(conn)).await {
        Ok(id) => id,
        Err(err) => {
            warn!(error = %err, "websocket greeting failed");
            return;
        }
    };
    info!(subscriber = id, "websocket subscribed");

    let (mut sink, mut stream) = socket.split();

    let mut writer = tokio::spawn(async move {
        while let Some(frame) = outbound.recv().await {
            if sink.send(Message::Text(frame.to_string())).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    // Inbound messages carry no meaning; reading only detects the disconnect.
    let mut reader = tokio::spawn(async move {
        while let Some(Ok(message)) = stream.next().await {
            if let Message::Close(_) = message {
                break;
            }
        }
    });

    tokio::select! {
        _ = &mut writer => reader.abort(),
        _ = &mut reader => writer.abort(),
    }

    state.hub.unsubscribe(id).await;
    debug!(subscriber = id, "websocket closed");
}
