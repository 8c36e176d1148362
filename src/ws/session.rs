//! Read loop and dispatch for a single WebSocket connection.
//!
//! [`ConnectionSession`] owns everything that belongs to one connection:
//! its [`RateLimiter`], its [`AuthJoinHandshake`] and, once joined, its
//! [`Admission`]. The only shared state it touches is the
//! [`RoomRegistry`]. Whatever ends the loop, the session removes itself
//! from its room (announcing `userleave` to whoever remains) and closes the
//! connection, at most once.

use std::ops::ControlFlow;
use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, close_code};
use futures_util::{Stream, StreamExt};

use super::handshake::{Admission, AuthJoinHandshake};
use super::messages::{Envelope, MessageType};
use super::rate_limiter::RateLimiter;
use crate::auth::TokenValidator;
use crate::config::SessionSettings;
use crate::domain::{Connection, RoomRegistry};
use crate::error::SessionError;

/// Shared collaborators every session needs.
#[derive(Debug, Clone)]
pub struct SessionContext {
    /// Process-wide room registry.
    pub registry: Arc<RoomRegistry>,
    /// Bearer token check for `auth` messages.
    pub validator: Arc<dyn TokenValidator>,
    /// Deadlines, rate policy and name rules.
    pub settings: SessionSettings,
}

/// One connection's lifetime: read, throttle, decode, dispatch, clean up.
#[derive(Debug)]
pub struct ConnectionSession {
    conn: Connection,
    ctx: SessionContext,
    limiter: RateLimiter,
    handshake: AuthJoinHandshake,
    admission: Option<Admission>,
}

impl ConnectionSession {
    /// Creates the session and arms the handshake's auth deadline.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn new(conn: Connection, ctx: SessionContext) -> Self {
        let limiter = RateLimiter::new(ctx.settings.rate_policy);
        let handshake = AuthJoinHandshake::start(conn.clone(), &ctx.settings);
        Self {
            conn,
            ctx,
            limiter,
            handshake,
            admission: None,
        }
    }

    /// Runs the read loop until the connection ends and returns why.
    ///
    /// Frames are read from `inbound`; replies and broadcasts leave through
    /// the [`Connection`]'s outbound queue.
    pub async fn run<S>(mut self, mut inbound: S) -> SessionError
    where
        S: Stream<Item = Result<Message, axum::Error>> + Unpin,
    {
        let outcome = loop {
            let next = tokio::select! {
                biased;
                () = self.conn.closed() => None,
                frame = inbound.next() => Some(frame),
            };

            let Some(frame) = next else {
                break SessionError::ForceClosed;
            };

            if let ControlFlow::Break(reason) = self.on_frame(frame).await {
                break reason;
            }
        };

        self.finish(&outcome).await;
        outcome
    }

    async fn on_frame(
        &mut self,
        frame: Option<Result<Message, axum::Error>>,
    ) -> ControlFlow<SessionError> {
        let result = match frame {
            None => Err(SessionError::PeerClosed),
            Some(Err(e)) => Err(SessionError::Transport(e.to_string())),
            Some(Ok(Message::Close(close))) => {
                log_close_frame(close.as_ref());
                Err(SessionError::PeerClosed)
            }
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => Ok(()),
            Some(Ok(Message::Text(text))) => self.on_data(text.as_str().as_bytes()).await,
            Some(Ok(Message::Binary(bytes))) => self.on_data(&bytes).await,
        };

        match result {
            Ok(()) => ControlFlow::Continue(()),
            Err(reason) => ControlFlow::Break(reason),
        }
    }

    async fn on_data(&mut self, raw: &[u8]) -> Result<(), SessionError> {
        // Throttle before parsing so junk floods cost nothing.
        if !self.limiter.allow_message() {
            return Err(SessionError::RateLimited);
        }

        let envelope = Envelope::decode(raw)
            .map_err(|e| SessionError::ProtocolViolation(format!("malformed envelope: {e}")))?;

        self.dispatch(envelope).await
    }

    async fn dispatch(&mut self, envelope: Envelope) -> Result<(), SessionError> {
        match envelope.msg_type {
            MessageType::Auth => {
                self.handshake
                    .authenticate(envelope.body.as_deref(), self.ctx.validator.as_ref())?;
                self.limiter.reset();
                tracing::debug!(conn_id = %self.conn.id(), "authenticated");
                Ok(())
            }
            MessageType::Join => {
                let admission = self
                    .handshake
                    .join(envelope.username.as_deref(), envelope.room.as_deref())?;

                let total = self
                    .ctx
                    .registry
                    .join_and_announce(&admission.room, self.conn.clone(), |total| {
                        Envelope::joined(admission.username.as_str(), total)
                    })
                    .await;
                self.limiter.reset();

                tracing::info!(
                    conn_id = %self.conn.id(),
                    username = %admission.username,
                    room = %admission.room,
                    total_users = total,
                    "user joined"
                );
                self.admission = Some(admission);
                Ok(())
            }
            MessageType::Message => {
                self.handshake.require_joined(MessageType::Message)?;
                let Some(admission) = &self.admission else {
                    return Err(SessionError::ProtocolViolation(
                        "message before join".to_string(),
                    ));
                };

                let body = envelope.body.unwrap_or_default();
                if body.is_empty() {
                    tracing::debug!(conn_id = %self.conn.id(), "empty message ignored");
                    return Ok(());
                }

                tracing::debug!(
                    room = %admission.room,
                    username = %admission.username,
                    len = body.len(),
                    "relaying message"
                );
                self.ctx
                    .registry
                    .broadcast_except_sender(
                        &admission.room,
                        &self.conn,
                        &Envelope::chat(admission.username.as_str(), body),
                    )
                    .await;
                Ok(())
            }
            MessageType::UserLeave => {
                self.handshake.require_joined(MessageType::UserLeave)?;
                Err(SessionError::ExplicitLeave)
            }
            MessageType::Unknown => Err(SessionError::ProtocolViolation(
                "unknown message type".to_string(),
            )),
        }
    }

    async fn finish(&self, outcome: &SessionError) {
        self.handshake.cancel_deadlines();

        let username = self.admission.as_ref().map(|a| a.username.as_str());
        if outcome.is_fatal_violation() {
            tracing::warn!(conn_id = %self.conn.id(), username, reason = %outcome, "closing connection");
        } else {
            tracing::info!(conn_id = %self.conn.id(), username, reason = %outcome, "session ended");
        }

        depart(&self.conn, &self.ctx.registry, self.admission.as_ref()).await;
    }
}

/// Leaves the joined room, announces the departure, and closes `conn`.
///
/// Only the first caller for a given connection does anything; concurrent
/// or repeated calls return `false` without touching the registry.
pub async fn depart(
    conn: &Connection,
    registry: &RoomRegistry,
    admission: Option<&Admission>,
) -> bool {
    if !conn.try_begin_close() {
        tracing::debug!(conn_id = %conn.id(), "cleanup already ran");
        return false;
    }

    if let Some(admission) = admission {
        let remain = registry
            .leave_and_announce(&admission.room, conn, |remaining| {
                Envelope::user_left(admission.username.as_str(), remaining)
            })
            .await;
        tracing::info!(
            username = %admission.username,
            room = %admission.room,
            room_open = remain,
            "user left"
        );
    }

    conn.close();
    true
}

fn log_close_frame(close: Option<&CloseFrame>) {
    let Some(frame) = close else {
        tracing::debug!("peer closed without a status code");
        return;
    };
    match frame.code {
        close_code::NORMAL | close_code::AWAY | close_code::ABNORMAL => {
            tracing::debug!(code = frame.code, "peer closed");
        }
        code => {
            tracing::warn!(code, reason = %frame.reason.as_str(), "peer closed with unexpected code");
        }
    }
}
