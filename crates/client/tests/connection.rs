//! Integration tests for the client connection.
//!
//! Each test runs a throwaway WebSocket server on an OS-assigned port and
//! drives the real connection against it: connect → exchange frames → drop
//! or close.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use pawnhub_client::shared::PlayState;
use pawnhub_client::{ClientConfig, ClientError, Connection, ConnectionState, Session, SessionState};
use serde_json::json;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

type ServerSocket = WebSocketStream<TcpStream>;

const START: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR";

/// Helper: bind a listener on an OS-assigned port, return it with its ws:// URL.
async fn listen() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, format!("ws://{addr}"))
}

/// Helper: accept the next client and complete the WebSocket handshake.
async fn accept(listener: &TcpListener) -> ServerSocket {
    let (stream, _) = timeout(Duration::from_secs(5), listener.accept())
        .await
        .expect("timed out waiting for client")
        .unwrap();
    tokio_tungstenite::accept_async(stream).await.unwrap()
}

/// Helper: a connection pointed at the test server.
fn connect_to(url: &str, grace: Duration) -> (Connection, Arc<Session>) {
    let config = ClientConfig {
        debug_local_server: true,
        local_url: url.to_string(),
        reconnect_grace: grace,
        ..ClientConfig::default()
    };
    let session = Arc::new(Session::new());
    (Connection::new(config, session.clone()), session)
}

/// Helper: accept clients forever, counting completed handshakes.
fn count_accepts(listener: TcpListener) -> Arc<AtomicUsize> {
    let accepted = Arc::new(AtomicUsize::new(0));
    let count = accepted.clone();
    tokio::spawn(async move {
        let mut sockets = Vec::new();
        loop {
            sockets.push(accept(&listener).await);
            count.fetch_add(1, Ordering::SeqCst);
        }
    });
    accepted
}

async fn send_json(ws: &mut ServerSocket, value: serde_json::Value) {
    ws.send(Message::text(value.to_string())).await.unwrap();
}

/// Helper: read the next text frame as JSON, with a timeout.
async fn next_json(ws: &mut ServerSocket) -> serde_json::Value {
    loop {
        let msg = timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for WS message")
            .expect("stream ended")
            .expect("WS error");

        match msg {
            Message::Text(text) => return serde_json::from_str(text.as_str()).expect("invalid JSON"),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("expected Text message, got {other:?}"),
        }
    }
}

async fn wait_until(session: &Session, pred: impl FnMut(&SessionState) -> bool) {
    let mut rx = session.subscribe();
    timeout(Duration::from_secs(5), rx.wait_for(pred))
        .await
        .expect("timed out waiting for session state")
        .expect("session dropped");
}

#[tokio::test]
async fn prepare_reuses_open_socket() {
    let (listener, url) = listen().await;
    let accepted = count_accepts(listener);

    let (connection, _session) = connect_to(&url, Duration::from_secs(20));
    connection.prepare().await.unwrap();
    assert!(connection.is_open());
    assert!(connection.state().is_connected());

    connection.prepare().await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(accepted.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn concurrent_prepares_share_one_socket() {
    let (listener, url) = listen().await;
    let accepted = count_accepts(listener);

    let (connection, _session) = connect_to(&url, Duration::from_secs(20));
    let (first, second) = tokio::join!(connection.prepare(), connection.prepare());
    first.unwrap();
    second.unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(accepted.load(Ordering::SeqCst), 1);
    assert!(connection.is_open());
}

#[tokio::test]
async fn inbound_frames_update_session() {
    let (listener, url) = listen().await;
    tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        send_json(&mut ws, json!({"type": "connected-id", "id": "c1", "reconnect-code": "r1"})).await;
        send_json(&mut ws, json!({"type": "chat", "text": "ignored"})).await;
        send_json(&mut ws, json!({"type": "matched", "fen": format!("{START} w")})).await;
        while ws.next().await.is_some() {}
    });

    let (connection, session) = connect_to(&url, Duration::from_secs(20));
    connection.prepare().await.unwrap();
    wait_until(&session, |s| s.play_state == PlayState::Playing).await;

    let state = session.snapshot();
    assert_eq!(state.client_id, "c1");
    assert_eq!(state.reconnect_code.as_deref(), Some("r1"));
    assert_eq!(state.board_fen, START);
    assert!(state.current_player_white);
}

#[tokio::test]
async fn outbound_senders_write_wire_frames() {
    let (listener, url) = listen().await;
    let (connection, session) = connect_to(&url, Duration::from_secs(20));

    let server = tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        let connect = next_json(&mut ws).await;
        let mv = next_json(&mut ws).await;
        send_json(&mut ws, json!({"type": "accept-move", "fen": format!("{START} b")})).await;
        (connect, mv, ws)
    });

    connection.prepare().await.unwrap();
    connection.send_connect_request("host-7", "42").unwrap();
    connection.send_move("e2", "e4").unwrap();
    assert!(session.snapshot().pending_move);

    let (connect, mv, _ws) = server.await.unwrap();
    assert_eq!(connect, json!({"type": "connect-attendee", "host": "host-7", "code": "42"}));
    assert_eq!(mv, json!({"type": "send-move", "from": "e2", "to": "e4"}));

    wait_until(&session, |s| !s.pending_move).await;
    assert!(!session.snapshot().current_player_white);
}

#[tokio::test]
async fn dropped_socket_resumes_with_captured_code() {
    let (listener, url) = listen().await;
    let grace = Duration::from_millis(300);
    let (connection, session) = connect_to(&url, grace);

    let server = tokio::spawn(async move {
        let mut first = accept(&listener).await;
        send_json(&mut first, json!({"type": "connected-id", "id": "c1", "reconnect-code": "r1"})).await;
        send_json(&mut first, json!({"type": "matched", "fen": format!("{START} w")})).await;
        first.close(None).await.unwrap();

        let mut second = accept(&listener).await;
        let resume = next_json(&mut second).await;
        send_json(&mut second, json!({"type": "reconnected", "reconnect-code": "r2"})).await;
        (resume, second)
    });

    connection.prepare().await.unwrap();
    let (resume, _second) = server.await.unwrap();
    assert_eq!(resume, json!({"type": "reconnect", "id": "c1", "reconnect-code": "r1"}));

    wait_until(&session, |s| s.reconnect_code.as_deref() == Some("r2")).await;

    // The fallback was cancelled by the reconnected reply.
    tokio::time::sleep(grace * 3).await;
    let state = session.snapshot();
    assert_eq!(state.play_state, PlayState::Playing);
    assert_eq!(state.client_id, "c1");
    assert!(connection.is_open());
}

#[tokio::test]
async fn unresumed_match_closes_after_grace_period() {
    let (listener, url) = listen().await;
    let (connection, session) = connect_to(&url, Duration::from_millis(200));

    tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        send_json(&mut ws, json!({"type": "connected-id", "id": "c1", "reconnect-code": "r1"})).await;
        send_json(&mut ws, json!({"type": "matched", "fen": format!("{START} b")})).await;
        // Nobody is listening any more when the client tries to resume.
        drop(listener);
        let _ = ws.close(None).await;
    });

    connection.prepare().await.unwrap();
    wait_until(&session, |s| s.play_state == PlayState::Playing).await;
    wait_until(&session, |s| s.play_state == PlayState::Closed).await;

    let state = session.snapshot();
    assert_eq!(state.client_id, "");
    assert_eq!(state.reconnect_code, None);
    assert!(!connection.is_open());
}

#[tokio::test]
async fn grace_period_expiry_cancels_a_stalled_resume() {
    let (listener, url) = listen().await;
    let grace = Duration::from_millis(150);
    let (connection, session) = connect_to(&url, grace);

    let server = tokio::spawn(async move {
        let mut first = accept(&listener).await;
        send_json(&mut first, json!({"type": "connected-id", "id": "c1", "reconnect-code": "r1"})).await;
        send_json(&mut first, json!({"type": "matched", "fen": format!("{START} w")})).await;
        first.close(None).await.unwrap();

        // Hold the resume handshake until well past the grace period.
        let (stream, _) = timeout(Duration::from_secs(5), listener.accept())
            .await
            .expect("timed out waiting for resume")
            .unwrap();
        tokio::time::sleep(grace * 4).await;

        let Ok(mut second) = tokio_tungstenite::accept_async(stream).await else {
            return false;
        };
        let reply = json!({"type": "reconnected", "reconnect-code": "r2"});
        let _ = second.send(Message::text(reply.to_string())).await;
        matches!(
            timeout(Duration::from_millis(300), second.next()).await,
            Ok(Some(Ok(Message::Text(_))))
        )
    });

    connection.prepare().await.unwrap();
    wait_until(&session, |s| s.play_state == PlayState::Closed).await;

    let resume_sent = server.await.unwrap();
    assert!(!resume_sent);

    let state = session.snapshot();
    assert_eq!(state.play_state, PlayState::Closed);
    assert_eq!(state.client_id, "");
    assert_eq!(state.reconnect_code, None);
    assert!(!connection.is_open());
    assert_eq!(connection.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn explicit_close_does_not_resume() {
    let (listener, url) = listen().await;
    let accepted = Arc::new(AtomicUsize::new(0));

    let count = accepted.clone();
    let server = tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        count.fetch_add(1, Ordering::SeqCst);
        send_json(&mut ws, json!({"type": "connected-id", "id": "c1", "reconnect-code": "r1"})).await;

        let mut saw_close = false;
        while let Some(Ok(msg)) = ws.next().await {
            if msg.is_close() {
                saw_close = true;
                break;
            }
        }

        if timeout(Duration::from_millis(300), listener.accept()).await.is_ok() {
            count.fetch_add(1, Ordering::SeqCst);
        }
        saw_close
    });

    let (connection, session) = connect_to(&url, Duration::from_secs(20));
    connection.prepare().await.unwrap();
    wait_until(&session, |s| s.reconnect_code.is_some()).await;

    connection.close();
    connection.close();

    assert!(server.await.unwrap());
    assert_eq!(accepted.load(Ordering::SeqCst), 1);
    assert_eq!(session.snapshot().play_state, PlayState::Closed);
    assert!(matches!(connection.send("{}"), Err(ClientError::NotOpen)));
}

#[tokio::test]
async fn opponent_disconnect_ends_the_match() {
    let (listener, url) = listen().await;
    let server = tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        send_json(&mut ws, json!({"type": "connected-id", "id": "c1", "reconnect-code": "r1"})).await;
        send_json(&mut ws, json!({"type": "matched", "fen": format!("{START} w")})).await;
        send_json(&mut ws, json!({"type": "opponent-disconnected"})).await;

        let mut saw_close = false;
        while let Some(Ok(msg)) = ws.next().await {
            if msg.is_close() {
                saw_close = true;
                break;
            }
        }
        saw_close
    });

    let (connection, session) = connect_to(&url, Duration::from_secs(20));
    connection.prepare().await.unwrap();

    assert!(server.await.unwrap());
    let state = session.snapshot();
    assert_eq!(state.play_state, PlayState::Closed);
    assert_eq!(state.reconnect_code, None);
}

#[tokio::test]
async fn failed_prepare_reports_error() {
    let (listener, url) = listen().await;
    drop(listener);

    let (connection, _session) = connect_to(&url, Duration::from_secs(20));
    let called = AtomicBool::new(false);

    let result = connection
        .prepare_with(|_| called.store(true, Ordering::SeqCst))
        .await;

    assert!(matches!(result, Err(ClientError::Connect { .. })));
    assert!(called.load(Ordering::SeqCst));
    assert!(!connection.is_open());
    assert!(matches!(connection.send_move("e2", "e4"), Err(ClientError::NotOpen)));
}

#[tokio::test]
async fn stalled_handshake_times_out() {
    let (listener, url) = listen().await;
    tokio::spawn(async move {
        // Accept TCP but never answer the upgrade request.
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });

    let config = ClientConfig {
        debug_local_server: true,
        local_url: url,
        connect_timeout: Duration::from_millis(200),
        ..ClientConfig::default()
    };
    let connection = Connection::new(config, Arc::new(Session::new()));
    let called = AtomicBool::new(false);

    let result = timeout(
        Duration::from_secs(5),
        connection.prepare_with(|_| called.store(true, Ordering::SeqCst)),
    )
    .await
    .expect("prepare never resolved");

    assert!(matches!(result, Err(ClientError::ConnectTimeout { .. })));
    assert!(called.load(Ordering::SeqCst));
    assert!(!connection.is_open());
    assert_eq!(connection.state(), ConnectionState::Disconnected);

    // The connect lock was released, so the next attempt is not stuck behind it.
    let again = timeout(Duration::from_secs(5), connection.prepare())
        .await
        .expect("second prepare never resolved");
    assert!(matches!(again, Err(ClientError::ConnectTimeout { .. })));
}
