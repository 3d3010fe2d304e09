/*
 * Responsibility
 * - GET /api/v1/ws
 * - Sec-WebSocket-Protocol の Authorization.Bearer.<token> で認証
 * - 応答 protocol: アプリ用 protocol があればそれ、なければ credential entry を返す
 * - 失敗時: upgrade 後すぐ 1008 "Not authenticated" で close
 * - 成功時: identity を JSON で 1 回送り、あとは text を echo
 */
use axum::extract::State;
use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, WebSocket, WebSocketUpgrade, close_code};
use axum::http::HeaderMap;
use axum::response::Response;

use crate::services::auth::AuthenticatedIdentity;
use crate::services::auth::authorizer::negotiable_subprotocols;
use crate::state::AppState;

pub const REJECTION_REASON: &str = "Not authenticated";

/// Close frame sent to clients that fail authentication.
pub fn rejection_frame() -> CloseFrame {
    CloseFrame {
        code: close_code::POLICY,
        reason: Utf8Bytes::from_static(REJECTION_REASON),
    }
}

pub async fn ws(
    State(state): State<AppState>,
    headers: HeaderMap,
    upgrade: WebSocketUpgrade,
) -> Response {
    let outcome = state.authorizer.authorize_websocket(&headers).await;

    let upgrade = upgrade.protocols(negotiable_subprotocols(&headers));

    match outcome {
        Ok(identity) => upgrade.on_upgrade(move |socket| session(socket, identity)),
        Err(err) => {
            tracing::warn!(error = %err, "websocket authentication failed");
            upgrade.on_upgrade(reject)
        }
    }
}

async fn reject(mut socket: WebSocket) {
    if let Err(err) = socket.send(Message::Close(Some(rejection_frame()))).await {
        tracing::debug!(error = %err, "failed to send websocket close frame");
    }
}

async fn session(mut socket: WebSocket, identity: AuthenticatedIdentity) {
    let greeting = match serde_json::to_string(&identity) {
        Ok(json) => json,
        Err(err) => {
            tracing::error!(error = %err, "failed to serialize identity");
            return;
        }
    };

    if socket.send(Message::Text(greeting.into())).await.is_err() {
        return;
    }

    while let Some(message) = socket.recv().await {
        match message {
            Ok(Message::Text(text)) => {
                if socket.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => {}
        }
    }

    tracing::debug!(sub = %identity.sub, "websocket session closed");
}
