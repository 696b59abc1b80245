//! Drives a live server over a real WebSocket.

use duplex_api::{config::Config, router::create_router, state::AppState};
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async, tungstenite::protocol::Message,
};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn spawn_server() -> (SocketAddr, Arc<AppState>) {
    let state = Arc::new(AppState::new(Config::default()));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = create_router(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, state)
}

async fn next_json(client: &mut Client) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), client.next())
            .await
            .expect("timed out waiting for server message")
            .expect("stream ended")
            .expect("websocket error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

async fn send(client: &mut Client, value: Value) {
    client
        .send(Message::Text(value.to_string().into()))
        .await
        .unwrap();
}

async fn send_event(client: &mut Client, event: Value) {
    send(client, json!({ "channel": "event", "event": event })).await;
}

fn media_op(msg: &Value) -> &Value {
    assert_eq!(msg["type"], "media", "expected a media message, got {msg}");
    &msg["op"]
}

#[tokio::test]
async fn test_session_over_websocket() {
    let (addr, state) = spawn_server().await;
    let (mut client, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();

    let started = next_json(&mut client).await;
    assert_eq!(started["type"], "session_started");
    assert!(started["session_id"].is_string());

    // Microphone arrives while the greeting gate is closed.
    send_event(
        &mut client,
        json!({ "type": "track-started", "data": { "id": "mic", "kind": "audio", "origin": "local" } }),
    )
    .await;
    let op = next_json(&mut client).await;
    assert_eq!(
        media_op(&op),
        &json!({ "action": "set_track_enabled", "track_id": "mic", "enabled": false })
    );

    // Agent audio arrives and starts playing.
    send_event(
        &mut client,
        json!({ "type": "track-started", "data": { "id": "bot", "kind": "audio", "origin": "remote" } }),
    )
    .await;
    let op = next_json(&mut client).await;
    assert_eq!(media_op(&op)["action"], "attach_output");
    let op = next_json(&mut client).await;
    assert_eq!(media_op(&op)["action"], "play");

    // Urgent interrupt: pause, then silence the agent's audio track.
    send(
        &mut client,
        json!({ "channel": "urgent", "payload": { "type": "interrupt" } }),
    )
    .await;
    let op = next_json(&mut client).await;
    assert_eq!(media_op(&op)["action"], "pause");
    let op = next_json(&mut client).await;
    assert_eq!(
        media_op(&op),
        &json!({ "action": "set_track_enabled", "track_id": "bot", "enabled": false })
    );

    // A new utterance resumes the agent.
    send_event(&mut client, json!({ "type": "bot-started-speaking" })).await;
    let op = next_json(&mut client).await;
    assert_eq!(
        media_op(&op),
        &json!({ "action": "set_track_enabled", "track_id": "bot", "enabled": true })
    );
    let op = next_json(&mut client).await;
    assert_eq!(media_op(&op)["action"], "play");

    // The first completed utterance opens the microphone.
    send_event(&mut client, json!({ "type": "bot-stopped-speaking" })).await;
    let op = next_json(&mut client).await;
    assert_eq!(
        media_op(&op),
        &json!({ "action": "set_track_enabled", "track_id": "mic", "enabled": true })
    );

    // A finished user turn produces an STT metric.
    send_event(&mut client, json!({ "type": "user-started-speaking" })).await;
    send_event(&mut client, json!({ "type": "user-stopped-speaking" })).await;
    send_event(
        &mut client,
        json!({ "type": "user-transcription", "data": { "text": "hello", "final": true } }),
    )
    .await;
    let metric = next_json(&mut client).await;
    assert_eq!(metric["type"], "metrics");
    assert_eq!(metric["label"], "rtvi-ai");
    assert_eq!(metric["data"]["service"], "stt");
    assert!(metric["data"]["value_ms"].is_u64());

    // Garbage is reported but does not end the session.
    send(&mut client, json!({ "channel": "telepathy" })).await;
    let error = next_json(&mut client).await;
    assert_eq!(error["type"], "error");

    let report = state.sessions.snapshot().await;
    assert_eq!(report.len(), 1);
    assert!(report[0].1.first_agent_utterance_done);

    client.close(None).await.unwrap();
    for _ in 0..50 {
        if state.sessions.snapshot().await.is_empty() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("session was not unregistered after close");
}
