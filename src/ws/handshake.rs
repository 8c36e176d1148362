//! Authenticate-then-join admission for one connection.
//!
//! ```text
//!   Connected ──auth(valid)──▶ Authenticated ──join(valid)──▶ Joined
//!       │                          │
//!       └── auth deadline ──▶ close └── join deadline ──▶ close
//! ```
//!
//! The two deadlines run one after the other: the join clock starts only
//! once authentication succeeds. Each deadline watcher is a task holding a
//! [`CancellationToken`]; a successful transition cancels the token and
//! the task exits without touching the connection.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::auth::TokenValidator;
use crate::config::SessionSettings;
use crate::domain::Connection;
use crate::error::SessionError;

use super::messages::MessageType;

/// Admission progress of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// Accepted, not yet authenticated.
    Connected,
    /// Presented a valid token, not yet in a room.
    Authenticated,
    /// Admitted to a room; chat is allowed.
    Joined,
}

/// Who joined where, fixed at the moment of a successful `join`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admission {
    /// Display name announced to the room.
    pub username: String,
    /// Room the connection was added to.
    pub room: String,
}

/// Per-connection handshake state machine and its deadline watchers.
///
/// Dropping the handshake cancels any watcher still pending.
#[derive(Debug)]
pub struct AuthJoinHandshake {
    state: HandshakeState,
    conn: Connection,
    join_timeout: Duration,
    min_name_len: usize,
    auth_deadline: CancellationToken,
    join_deadline: Option<CancellationToken>,
}

impl AuthJoinHandshake {
    /// Starts the handshake for `conn` and arms the auth deadline.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn start(conn: Connection, settings: &SessionSettings) -> Self {
        let auth_deadline = CancellationToken::new();
        spawn_deadline(
            "auth",
            settings.auth_timeout,
            conn.clone(),
            auth_deadline.clone(),
        );

        Self {
            state: HandshakeState::Connected,
            conn,
            join_timeout: settings.join_timeout,
            min_name_len: settings.min_name_len,
            auth_deadline,
            join_deadline: None,
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> HandshakeState {
        self.state
    }

    /// Handles an `auth` message.
    ///
    /// On success cancels the auth deadline and arms the join deadline.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::AdmissionDenied`] if already authenticated
    /// or if `token` is missing or rejected by `validator`. Pending
    /// deadlines are cancelled before returning the error.
    pub fn authenticate(
        &mut self,
        token: Option<&str>,
        validator: &dyn TokenValidator,
    ) -> Result<(), SessionError> {
        if self.state != HandshakeState::Connected {
            return Err(self.reject(SessionError::AdmissionDenied(
                "duplicate auth".to_string(),
            )));
        }

        let token = token.unwrap_or_default();
        if !validator.validate(token) {
            return Err(self.reject(SessionError::AdmissionDenied(
                "invalid token".to_string(),
            )));
        }

        self.auth_deadline.cancel();
        let join_deadline = CancellationToken::new();
        spawn_deadline(
            "join",
            self.join_timeout,
            self.conn.clone(),
            join_deadline.clone(),
        );
        self.join_deadline = Some(join_deadline);
        self.state = HandshakeState::Authenticated;
        Ok(())
    }

    /// Handles a `join` message.
    ///
    /// On success cancels every pending deadline and returns the validated
    /// [`Admission`]. The caller performs the registry insert.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::ProtocolViolation`] if not yet
    /// authenticated, and [`SessionError::AdmissionDenied`] if already
    /// joined or if the username or room is shorter than the minimum.
    pub fn join(
        &mut self,
        username: Option<&str>,
        room: Option<&str>,
    ) -> Result<Admission, SessionError> {
        match self.state {
            HandshakeState::Connected => {
                return Err(self.reject(SessionError::ProtocolViolation(
                    "join before auth".to_string(),
                )));
            }
            HandshakeState::Joined => {
                return Err(self.reject(SessionError::AdmissionDenied(
                    "duplicate join".to_string(),
                )));
            }
            HandshakeState::Authenticated => {}
        }

        let username = username.unwrap_or_default();
        let room = room.unwrap_or_default();
        if username.chars().count() < self.min_name_len || room.chars().count() < self.min_name_len
        {
            return Err(self.reject(SessionError::AdmissionDenied(format!(
                "username and room must be at least {} characters",
                self.min_name_len
            ))));
        }

        self.cancel_deadlines();
        self.state = HandshakeState::Joined;
        Ok(Admission {
            username: username.to_string(),
            room: room.to_string(),
        })
    }

    /// Checks that a message of `msg_type` is allowed in the current state.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::ProtocolViolation`] unless the connection
    /// has joined a room.
    pub fn require_joined(&self, msg_type: MessageType) -> Result<(), SessionError> {
        if self.state == HandshakeState::Joined {
            return Ok(());
        }
        Err(SessionError::ProtocolViolation(format!(
            "{} before join",
            msg_type.as_str()
        )))
    }

    /// Cancels whichever deadline watchers are still pending.
    pub fn cancel_deadlines(&self) {
        self.auth_deadline.cancel();
        if let Some(join) = &self.join_deadline {
            join.cancel();
        }
    }

    fn reject(&self, err: SessionError) -> SessionError {
        self.cancel_deadlines();
        err
    }
}

impl Drop for AuthJoinHandshake {
    fn drop(&mut self) {
        self.cancel_deadlines();
    }
}

/// Closes `conn` after `after` unless `cancel` fires first.
fn spawn_deadline(
    stage: &'static str,
    after: Duration,
    conn: Connection,
    cancel: CancellationToken,
) {
    tokio::spawn(async move {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {}
            () = conn.closed() => {}
            () = tokio::time::sleep(after) => {
                tracing::warn!(conn_id = %conn.id(), stage, "handshake deadline elapsed, closing connection");
                conn.close();
            }
        }
    });
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use tokio::time::Instant;
    use tokio_test::{assert_err, assert_ok};

    #[derive(Debug)]
    struct AcceptToken(&'static str);

    impl TokenValidator for AcceptToken {
        fn validate(&self, token: &str) -> bool {
            !token.is_empty() && token == self.0
        }
    }

    const VALIDATOR: AcceptToken = AcceptToken("good");

    fn start() -> (AuthJoinHandshake, Connection) {
        let (conn, _rx) = Connection::new(4);
        let hs = AuthJoinHandshake::start(conn.clone(), &SessionSettings::default());
        (hs, conn)
    }

    #[tokio::test]
    async fn happy_path_reaches_joined() {
        let (mut hs, conn) = start();
        assert_eq!(hs.state(), HandshakeState::Connected);

        assert_ok!(hs.authenticate(Some("good"), &VALIDATOR));
        assert_eq!(hs.state(), HandshakeState::Authenticated);

        let admission = assert_ok!(hs.join(Some("alice"), Some("lobby")));
        assert_eq!(admission.username, "alice");
        assert_eq!(admission.room, "lobby");
        assert_eq!(hs.state(), HandshakeState::Joined);
        assert_ok!(hs.require_joined(MessageType::Message));
        assert!(!conn.is_closed());
    }

    #[tokio::test]
    async fn invalid_or_missing_token_is_denied() {
        let (mut hs, _conn) = start();
        let err = assert_err!(hs.authenticate(Some("bad"), &VALIDATOR));
        assert!(matches!(err, SessionError::AdmissionDenied(_)));

        let (mut hs, _conn) = start();
        assert_err!(hs.authenticate(None, &VALIDATOR));
        assert_eq!(hs.state(), HandshakeState::Connected);
    }

    #[tokio::test]
    async fn duplicate_auth_is_denied() {
        let (mut hs, _conn) = start();
        assert_ok!(hs.authenticate(Some("good"), &VALIDATOR));
        let err = assert_err!(hs.authenticate(Some("good"), &VALIDATOR));
        assert_eq!(err, SessionError::AdmissionDenied("duplicate auth".to_string()));
    }

    #[tokio::test]
    async fn join_before_auth_is_a_violation() {
        let (mut hs, _conn) = start();
        let err = assert_err!(hs.join(Some("alice"), Some("lobby")));
        assert!(matches!(err, SessionError::ProtocolViolation(_)));
    }

    #[tokio::test]
    async fn duplicate_join_is_denied() {
        let (mut hs, _conn) = start();
        assert_ok!(hs.authenticate(Some("good"), &VALIDATOR));
        assert_ok!(hs.join(Some("alice"), Some("lobby")));
        let err = assert_err!(hs.join(Some("alice"), Some("other")));
        assert!(matches!(err, SessionError::AdmissionDenied(_)));
    }

    #[tokio::test]
    async fn short_names_are_denied() {
        for (user, room) in [(Some("al"), Some("lobby")), (Some("alice"), Some("lo")), (None, Some("lobby"))] {
            let (mut hs, _conn) = start();
            assert_ok!(hs.authenticate(Some("good"), &VALIDATOR));
            let err = assert_err!(hs.join(user, room));
            assert!(matches!(err, SessionError::AdmissionDenied(_)));
        }
    }

    #[tokio::test]
    async fn name_length_counts_characters() {
        let (mut hs, _conn) = start();
        assert_ok!(hs.authenticate(Some("good"), &VALIDATOR));
        // three characters, six bytes
        assert_ok!(hs.join(Some("日本語"), Some("ろびー")));
    }

    #[tokio::test]
    async fn messages_require_joined() {
        let (mut hs, _conn) = start();
        assert_err!(hs.require_joined(MessageType::Message));
        assert_ok!(hs.authenticate(Some("good"), &VALIDATOR));
        assert_err!(hs.require_joined(MessageType::UserLeave));
    }

    #[tokio::test(start_paused = true)]
    async fn auth_deadline_closes_connection() {
        let started = Instant::now();
        let (_hs, conn) = start();

        conn.closed().await;
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(2));
        assert!(elapsed < Duration::from_millis(2100));
    }

    #[tokio::test(start_paused = true)]
    async fn join_deadline_starts_after_auth() {
        let started = Instant::now();
        let (mut hs, conn) = start();

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_ok!(hs.authenticate(Some("good"), &VALIDATOR));

        // The auth deadline would have fired at 2s; the join deadline runs
        // until 3.5s.
        tokio::time::sleep(Duration::from_millis(1900)).await;
        assert!(!conn.is_closed());

        conn.closed().await;
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(3500));
        assert!(elapsed < Duration::from_millis(3600));
    }

    #[tokio::test(start_paused = true)]
    async fn joining_cancels_all_deadlines() {
        let (mut hs, conn) = start();
        assert_ok!(hs.authenticate(Some("good"), &VALIDATOR));
        assert_ok!(hs.join(Some("alice"), Some("lobby")));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(!conn.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn rejection_cancels_pending_deadline() {
        let (mut hs, conn) = start();
        assert_err!(hs.authenticate(Some("bad"), &VALIDATOR));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(!conn.is_closed(), "cancelled watcher must not close the socket");
        drop(hs);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_handshake_cancels_watchers() {
        let (hs, conn) = start();
        drop(hs);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(!conn.is_closed());
    }
}
