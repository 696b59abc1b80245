//! Manages the WebSocket connection lifecycle for a turn-taking session.

use super::{
    backend::{MediaOp, RemoteMediaBackend},
    protocol::{ClientMessage, ServerMessage},
};
use crate::state::AppState;
use anyhow::Result;
use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use duplex_core::{
    LatencyKind, MetricUpdate, Session, SessionConfig, SessionEvent, TurnController, UrgentSignal,
};
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{Instrument, debug, error, info, instrument, warn};
use uuid::Uuid;

/// Axum handler to upgrade an HTTP connection to a WebSocket.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Main handler for an individual WebSocket connection.
#[instrument(name = "duplex_session", skip_all, fields(session_id))]
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let session_id = Uuid::new_v4();
    tracing::Span::current().record("session_id", tracing::field::display(session_id));
    info!("New WebSocket connection.");

    let (mut socket_tx, socket_rx) = socket.split();
    if send_msg(&mut socket_tx, ServerMessage::SessionStarted { session_id })
        .await
        .is_err()
    {
        error!("Failed to send SessionStarted message to client.");
        return;
    }

    if let Err(e) = run_session(&state, session_id, socket_tx, socket_rx).await {
        error!(error = ?e, "Session terminated with error.");
    }
    state.sessions.unregister(session_id).await;
    info!("WebSocket connection closed.");
}

/// Wires the core dispatch loop to the socket and relays traffic both ways
/// until the client goes away.
async fn run_session(
    state: &Arc<AppState>,
    session_id: Uuid,
    mut socket_tx: SplitSink<WebSocket, Message>,
    mut socket_rx: SplitStream<WebSocket>,
) -> Result<()> {
    let config = &state.config;
    let session_config = SessionConfig {
        gate_mic_until_first_utterance: config.gate_mic_first_utterance,
    };

    let (media_tx, mut media_rx) = mpsc::unbounded_channel::<MediaOp>();
    let (metrics_tx, mut metrics_rx) = mpsc::unbounded_channel::<MetricUpdate>();
    let (state_tx, state_rx) = watch::channel(
        TurnController::new(session_config.gate_mic_until_first_utterance).snapshot(),
    );
    let (urgent_tx, urgent_rx) = mpsc::channel::<UrgentSignal>(config.urgent_queue_capacity);
    let (events_tx, events_rx) = mpsc::channel::<SessionEvent>(config.event_queue_capacity);

    let session = Session::new(session_config, RemoteMediaBackend::new(media_tx))
        .with_metrics(metrics_tx)
        .with_state_watch(state_tx);
    state.sessions.register(session_id, state_rx).await;

    let dispatch = tokio::spawn(
        session
            .run(urgent_rx, events_rx)
            .instrument(tracing::info_span!("dispatch", %session_id)),
    );
    events_tx.send(SessionEvent::Connected).await?;

    loop {
        tokio::select! {
            // Handle messages from the client WebSocket.
            msg_result = socket_rx.next() => {
                let Some(msg_result) = msg_result else { break };
                match msg_result {
                    Ok(Message::Text(text)) => {
                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(ClientMessage::Event { event }) => events_tx.send(event).await?,
                            Ok(ClientMessage::Urgent { payload }) => {
                                match UrgentSignal::from_payload(&payload) {
                                    Some(signal) => urgent_tx.send(signal).await?,
                                    None => debug!(%payload, "Ignoring unrecognised urgent payload"),
                                }
                            }
                            Err(e) => {
                                warn!(error = %e, "Unparseable client message");
                                send_msg(&mut socket_tx, ServerMessage::Error {
                                    message: format!("Invalid message: {}", e),
                                }).await?;
                            }
                        }
                    }
                    Ok(Message::Binary(_)) => warn!("Ignoring binary frame; this endpoint carries control traffic only."),
                    Ok(Message::Close(_)) => {
                        info!("Client sent close frame. Shutting down session.");
                        break;
                    }
                    Ok(Message::Ping(_) | Message::Pong(_)) => {}
                    Err(e) => {
                        error!("Error receiving from client WebSocket: {:?}", e);
                        break;
                    }
                }
            },
            // Media operations decided by the session.
            Some(op) = media_rx.recv() => {
                send_msg(&mut socket_tx, ServerMessage::Media { op }).await?;
            },
            // Latency measurements for the presentation layer.
            Some(update) = metrics_rx.recv() => {
                send_msg(&mut socket_tx, update.into()).await?;
            },
        }
    }

    // Closing both channels ends the dispatch loop, which hands the session back.
    drop(events_tx);
    drop(urgent_tx);
    let session = dispatch.await?;
    for kind in LatencyKind::ALL {
        let samples = session.latency().samples(kind).len();
        if samples > 0 {
            info!(%kind, samples, average_ms = session.latency().average(kind), "Session latency summary");
        }
    }
    Ok(())
}

/// A helper function to serialize and send a `ServerMessage` to the client.
pub(crate) async fn send_msg(
    socket_tx: &mut SplitSink<WebSocket, Message>,
    msg: ServerMessage,
) -> Result<()> {
    let serialized = serde_json::to_string(&msg)?;
    socket_tx.send(Message::Text(serialized.into())).await?;
    Ok(())
}
