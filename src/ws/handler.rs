//! Axum WebSocket upgrade handler and per-connection writer.

use std::time::Duration;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::Instrument;

use super::session::{ConnectionSession, SessionContext};
use crate::app_state::AppState;
use crate::domain::{Connection, OutboundFrame};

/// `GET /ws` — Upgrade HTTP connection to WebSocket.
///
/// Origin and optional token gating run as middleware before this handler.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    let ctx = state.session_context();
    ws.on_upgrade(move |socket| serve_socket(socket, ctx))
}

/// Drives one upgraded socket to completion.
///
/// Splits the socket, spawns the writer, and runs the
/// [`ConnectionSession`] on the read half in the current task.
pub async fn serve_socket(socket: WebSocket, ctx: SessionContext) {
    let (sink, stream) = socket.split();
    let (conn, outbound) = Connection::new(ctx.settings.outbound_buffer);
    let span = tracing::info_span!("session", conn_id = %conn.id());

    let writer = tokio::spawn(
        write_loop(sink, outbound, conn.clone(), ctx.settings.write_timeout)
            .instrument(span.clone()),
    );

    let outcome = ConnectionSession::new(conn, ctx)
        .run(stream)
        .instrument(span)
        .await;

    if let Err(e) = writer.await {
        tracing::warn!(error = %e, "ws writer task failed");
    }
    tracing::debug!(reason = %outcome, "ws connection closed");
}

/// Drains `outbound` into the socket until the connection closes.
///
/// Each write is bounded by `write_timeout`; a failed or stalled write
/// closes the connection so the read loop ends too.
async fn write_loop(
    mut sink: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<OutboundFrame>,
    conn: Connection,
    write_timeout: Duration,
) {
    loop {
        let frame = tokio::select! {
            biased;
            () = conn.closed() => break,
            frame = outbound.recv() => frame,
        };
        let Some(frame) = frame else {
            break;
        };

        match tokio::time::timeout(write_timeout, sink.send(Message::text(frame.to_string()))).await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::debug!(error = %e, "ws write failed");
                conn.close();
                return;
            }
            Err(_) => {
                tracing::warn!(timeout_ms = write_timeout.as_millis(), "ws write timed out");
                conn.close();
                return;
            }
        }
    }

    // Best effort: the peer may already be gone.
    let _ = tokio::time::timeout(write_timeout, sink.send(Message::Close(None))).await;
}
