//! WebSocket gateway endpoint.
//!
//! `GET /ws/chat` authenticates the bearer token *before* upgrading; a bad
//! token gets a 401 and no socket is ever opened. Once upgraded:
//!
//! - **Reader loop:** each text frame goes through [`Connection::handle_text`]
//!   strictly in arrival order.
//! - **Writer task:** the only code that writes to the socket. It drains the
//!   connection's outbound queue, which is fed by both the reader loop (error
//!   frames) and the reply-topic delivery task (relayed replies).
//!
//! Whatever ends the connection (close frame, I/O error, bus failure, server
//! shutdown), [`Connection::close`] runs before the handler returns, so the
//! reply-topic subscription never outlives the socket.
//!
//! [`Connection::handle_text`]: chatrelay_core::gateway::Connection::handle_text
//! [`Connection::close`]: chatrelay_core::gateway::Connection::close

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio_util::sync::CancellationToken;

use chatrelay_core::gateway::OutboundQueue;
use chatrelay_types::identity::Identity;

use crate::http::extractors::auth::Authenticated;
use crate::state::AppState;

/// Upgrade an authenticated request to a gateway connection.
///
/// Mounted at `/ws/chat` in the router.
pub async fn ws_handler(
    auth: Authenticated,
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let identity = auth.identity;
    ws.on_upgrade(move |socket| handle_socket(socket, state, identity))
}

async fn handle_socket(socket: WebSocket, state: AppState, identity: Identity) {
    let (ws_sender, mut ws_receiver) = socket.split();

    let (mut conn, outbound) = state.open_connection(identity);
    let conn_id = conn.id();
    let cancel = conn.cancel_token();
    conn.mark_open();

    let writer = tokio::spawn(write_frames(ws_sender, outbound, cancel.clone()));

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = state.shutdown.cancelled() => {
                tracing::debug!(%conn_id, "server shutting down, closing connection");
                break;
            }
            msg_result = ws_receiver.next() => {
                match msg_result {
                    Some(Ok(Message::Text(text))) => {
                        if let Err(e) = conn.handle_text(text.as_str()).await {
                            tracing::warn!(%conn_id, error = %e, "closing connection after relay failure");
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(err)) => {
                        tracing::debug!(%conn_id, "WebSocket receive error: {err}");
                        break;
                    }
                    // Binary, ping and pong frames are not part of the protocol.
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    conn.close().await;

    if let Err(e) = writer.await {
        tracing::warn!(%conn_id, error = %e, "writer task failed");
    }
}

/// Single writer for the socket.
///
/// Exits when the queue yields `None` (connection no longer open) or a write
/// fails, in which case it cancels the connection so the reader stops too.
async fn write_frames(
    mut ws_sender: SplitSink<WebSocket, Message>,
    mut outbound: OutboundQueue,
    cancel: CancellationToken,
) {
    while let Some(frame) = outbound.recv().await {
        let json = match serde_json::to_string(&frame) {
            Ok(json) => json,
            Err(err) => {
                tracing::warn!("Failed to serialize server frame: {err}");
                continue;
            }
        };

        if ws_sender.send(Message::Text(json.into())).await.is_err() {
            cancel.cancel();
            break;
        }
    }

    let _ = ws_sender.close().await;
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use futures_util::{SinkExt, StreamExt};
    use tokio_tungstenite::connect_async;
    use tokio_tungstenite::tungstenite::{self, Message as WsMessage};

    use chatrelay_core::bus::topic::reply_topic;
    use chatrelay_core::permission::PermissionCheck;
    use chatrelay_core::responder::{EchoGenerator, Responder};
    use chatrelay_types::config::RelayConfig;
    use chatrelay_types::identity::{User, UserRole};
    use chatrelay_types::wire::{ErrorCode, ServerFrame};

    use crate::http::router::build_router;
    use crate::state::AppState;
    use crate::state::tests::test_state;

    const TIMEOUT: Duration = Duration::from_secs(5);

    type WsStream = tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >;

    /// Serve the router on an ephemeral port until the state's shutdown fires.
    async fn boot_server(state: &AppState) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let router = build_router(state.clone());
        let shutdown = state.shutdown.clone();
        tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await
                .unwrap();
        });
        format!("ws://{addr}/ws/chat")
    }

    async fn start_echo(state: &AppState) {
        Responder::new(
            Arc::clone(&state.bus),
            Arc::new(EchoGenerator),
            state.config.inbound_topic.clone(),
        )
        .start(state.shutdown.child_token())
        .await
        .unwrap();
    }

    async fn token_for(state: &AppState, id: &str) -> String {
        let user = User {
            id: id.to_string(),
            name: format!("user-{id}"),
            email: format!("{id}@example.com"),
            role: UserRole::User,
        };
        state.authority.issue_token(&user).await.unwrap()
    }

    async fn next_frame(ws: &mut WsStream) -> ServerFrame {
        loop {
            let msg = tokio::time::timeout(TIMEOUT, ws.next())
                .await
                .expect("timed out waiting for frame")
                .expect("stream ended")
                .unwrap();
            if let WsMessage::Text(text) = msg {
                return serde_json::from_str(text.as_str()).unwrap();
            }
        }
    }

    async fn wait_for_unsubscribe(state: &AppState, user_id: &str) {
        tokio::time::timeout(TIMEOUT, async {
            while state.bus.subscriber_count(&reply_topic(user_id)) != 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("reply subscription outlived the socket");
    }

    #[tokio::test]
    async fn bad_token_is_rejected_before_upgrade() {
        let (_dir, state) = test_state(RelayConfig::default()).await;
        let url = boot_server(&state).await;

        let err = connect_async(format!("{url}?token=bogus")).await.unwrap_err();
        match err {
            tungstenite::Error::Http(resp) => assert_eq!(resp.status().as_u16(), 401),
            other => panic!("expected HTTP rejection, got {other:?}"),
        }

        let err = connect_async(url).await.unwrap_err();
        assert!(matches!(err, tungstenite::Error::Http(_)));
        assert_eq!(state.bus.stats().subscribed_total, 0);

        state.shutdown.cancel();
    }

    #[tokio::test]
    async fn frames_relay_over_the_socket() {
        let (_dir, state) = test_state(RelayConfig::default()).await;
        state.permissions.grant("3", &["7".to_string()]).await.unwrap();
        start_echo(&state).await;
        let token = token_for(&state, "7").await;
        let url = boot_server(&state).await;

        let (mut ws, _) = connect_async(format!("{url}?token={token}")).await.unwrap();

        ws.send(WsMessage::Text(r#"{"userId":"7","agentId":"99","text":"hi"}"#.into()))
            .await
            .unwrap();
        match next_frame(&mut ws).await {
            ServerFrame::Error(err) => assert_eq!(err.error, ErrorCode::Forbidden),
            other => panic!("expected error frame, got {other:?}"),
        }

        ws.send(WsMessage::Text(r#"{"userId":"7","agentId":"3","text":"hi"}"#.into()))
            .await
            .unwrap();
        match next_frame(&mut ws).await {
            ServerFrame::Reply(reply) => {
                assert_eq!(reply.message, "hi-reply");
                assert_eq!(reply.user_id, "7");
                assert_eq!(reply.agent_id, "3");
                assert!(!reply.chat_id.is_empty());
            }
            other => panic!("expected reply, got {other:?}"),
        }
        assert_eq!(state.bus.subscriber_count(&reply_topic("7")), 1);

        ws.close(None).await.unwrap();
        wait_for_unsubscribe(&state, "7").await;

        state.shutdown.cancel();
    }

    #[tokio::test]
    async fn server_shutdown_closes_open_sockets() {
        let (_dir, state) = test_state(RelayConfig::default()).await;
        state.permissions.grant("3", &["7".to_string()]).await.unwrap();
        start_echo(&state).await;
        let token = token_for(&state, "7").await;
        let url = boot_server(&state).await;

        let (mut ws, _) = connect_async(format!("{url}?token={token}")).await.unwrap();
        ws.send(WsMessage::Text(r#"{"userId":"7","agentId":"3","text":"hi"}"#.into()))
            .await
            .unwrap();
        next_frame(&mut ws).await;

        state.shutdown.cancel();

        let ended = tokio::time::timeout(TIMEOUT, async {
            loop {
                match ws.next().await {
                    Some(Ok(WsMessage::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
        })
        .await;
        assert!(ended.is_ok(), "socket stayed open after shutdown");
        wait_for_unsubscribe(&state, "7").await;
    }
}
