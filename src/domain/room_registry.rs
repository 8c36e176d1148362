//! Concurrent room membership and broadcast.
//!
//! [`RoomRegistry`] maps a room name to the set of [`Connection`]s admitted
//! to it. A room exists exactly as long as it has at least one member: the
//! first [`RoomRegistry::add_member`] creates it and the
//! [`RoomRegistry::remove_member`] that empties it deletes the entry in the
//! same critical section.
//!
//! Broadcasts serialize the message once and hand the shared frame to each
//! member's outbound queue with a non-blocking send, so a slow or dead peer
//! costs one dropped frame and a log line, never a stalled lock.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;

use super::connection::{Connection, OutboundFrame};

/// Central store for all open rooms.
///
/// # Concurrency
///
/// - One registry-wide `RwLock` guards the whole map.
/// - Membership changes take the write lock.
/// - Broadcasts and counts take the read lock; concurrent broadcasts
///   proceed in parallel.
/// - [`RoomRegistry::join_and_announce`] and
///   [`RoomRegistry::leave_and_announce`] hold the write lock across the
///   change and its broadcast, so the announced `totalUsers` cannot be
///   interleaved with another member's join or leave.
#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: RwLock<HashMap<String, HashSet<Connection>>>,
}

impl RoomRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `conn` to `room`, creating the room if needed.
    ///
    /// Idempotent for an existing member. Returns the member count after
    /// the insert.
    pub async fn add_member(&self, room: &str, conn: Connection) -> usize {
        let mut rooms = self.rooms.write().await;
        insert_member(&mut rooms, room, conn)
    }

    /// Removes `conn` from `room`.
    ///
    /// Returns `false` when this removal emptied the room, which is then
    /// deleted. Returns `true` if members remain, and also when the room
    /// does not exist (there is nothing to report).
    pub async fn remove_member(&self, room: &str, conn: &Connection) -> bool {
        let mut rooms = self.rooms.write().await;
        delete_member(&mut rooms, room, conn)
    }

    /// Sends `message` to every member of `room`.
    ///
    /// A missing room is a no-op. Returns the number of members the frame
    /// was queued for.
    pub async fn broadcast_all<T: Serialize>(&self, room: &str, message: &T) -> usize {
        let rooms = self.rooms.read().await;
        fan_out(&rooms, room, None, message)
    }

    /// Sends `message` to every member of `room` except `sender`.
    ///
    /// A missing room is a no-op. Returns the number of members the frame
    /// was queued for.
    pub async fn broadcast_except_sender<T: Serialize>(
        &self,
        room: &str,
        sender: &Connection,
        message: &T,
    ) -> usize {
        let rooms = self.rooms.read().await;
        fan_out(&rooms, room, Some(sender), message)
    }

    /// Adds `conn` to `room` and broadcasts `announce(total)` to the whole
    /// room, including `conn`, under a single write lock.
    ///
    /// Returns the member count carried in the announcement.
    pub async fn join_and_announce<T, F>(&self, room: &str, conn: Connection, announce: F) -> usize
    where
        T: Serialize,
        F: FnOnce(usize) -> T,
    {
        let mut rooms = self.rooms.write().await;
        let total = insert_member(&mut rooms, room, conn);
        fan_out(&rooms, room, None, &announce(total));
        total
    }

    /// Removes `conn` from `room` and, if members remain, broadcasts
    /// `announce(remaining)` to them under a single write lock.
    ///
    /// Returns the same value as [`RoomRegistry::remove_member`]. When the
    /// room closes nothing is broadcast.
    pub async fn leave_and_announce<T, F>(&self, room: &str, conn: &Connection, announce: F) -> bool
    where
        T: Serialize,
        F: FnOnce(usize) -> T,
    {
        let mut rooms = self.rooms.write().await;
        let Some(members) = rooms.get(room) else {
            tracing::debug!(room, "leave from unknown room ignored");
            return true;
        };
        if !members.contains(conn) {
            tracing::debug!(room, conn_id = %conn.id(), "leave from non-member ignored");
            return true;
        }

        let remain = delete_member(&mut rooms, room, conn);
        if remain {
            let remaining = rooms.get(room).map_or(0, HashSet::len);
            fan_out(&rooms, room, None, &announce(remaining));
        }
        remain
    }

    /// Returns the number of members in `room` (0 if it does not exist).
    pub async fn member_count(&self, room: &str) -> usize {
        self.rooms.read().await.get(room).map_or(0, HashSet::len)
    }

    /// Returns `true` if `room` currently exists.
    pub async fn contains_room(&self, room: &str) -> bool {
        self.rooms.read().await.contains_key(room)
    }

    /// Returns the number of open rooms.
    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    /// Returns every open room with its member count, ordered by name.
    pub async fn snapshot(&self) -> BTreeMap<String, usize> {
        self.rooms
            .read()
            .await
            .iter()
            .map(|(name, members)| (name.clone(), members.len()))
            .collect()
    }
}

fn insert_member(
    rooms: &mut HashMap<String, HashSet<Connection>>,
    room: &str,
    conn: Connection,
) -> usize {
    let members = rooms.entry(room.to_string()).or_default();
    members.insert(conn);
    members.len()
}

fn delete_member(
    rooms: &mut HashMap<String, HashSet<Connection>>,
    room: &str,
    conn: &Connection,
) -> bool {
    let Some(members) = rooms.get_mut(room) else {
        tracing::debug!(room, "remove from unknown room ignored");
        return true;
    };
    members.remove(conn);
    if members.is_empty() {
        rooms.remove(room);
        tracing::info!(room, "room is empty, closing");
        return false;
    }
    true
}

fn fan_out<T: Serialize>(
    rooms: &HashMap<String, HashSet<Connection>>,
    room: &str,
    skip: Option<&Connection>,
    message: &T,
) -> usize {
    let Some(members) = rooms.get(room) else {
        tracing::debug!(room, "broadcast to unknown room ignored");
        return 0;
    };

    let frame: OutboundFrame = match serde_json::to_string(message) {
        Ok(json) => Arc::from(json),
        Err(e) => {
            tracing::error!(room, error = %e, "failed to serialize broadcast");
            return 0;
        }
    };

    let mut delivered = 0usize;
    for member in members {
        if skip.is_some_and(|s| s == member) {
            continue;
        }
        match member.send(Arc::clone(&frame)) {
            Ok(()) => delivered = delivered.saturating_add(1),
            Err(e) => {
                tracing::warn!(room, conn_id = %member.id(), error = %e, "dropping frame for member");
            }
        }
    }
    delivered
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use serde_json::{Value, json};
    use tokio::sync::mpsc;

    fn conn() -> (Connection, mpsc::Receiver<OutboundFrame>) {
        Connection::new(8)
    }

    async fn is_member(registry: &RoomRegistry, room: &str, conn: &Connection) -> bool {
        registry
            .rooms
            .read()
            .await
            .get(room)
            .is_some_and(|members| members.contains(conn))
    }

    fn next_json(rx: &mut mpsc::Receiver<OutboundFrame>) -> Value {
        let Ok(frame) = rx.try_recv() else {
            panic!("expected a queued frame");
        };
        let Ok(value) = serde_json::from_str(&frame) else {
            panic!("frame is not JSON");
        };
        value
    }

    #[tokio::test]
    async fn add_creates_room_and_is_idempotent() {
        let registry = RoomRegistry::new();
        let (a, _rx) = conn();

        assert_eq!(registry.add_member("lobby", a.clone()).await, 1);
        assert_eq!(registry.add_member("lobby", a.clone()).await, 1);
        assert!(registry.contains_room("lobby").await);
        assert!(is_member(&registry, "lobby", &a).await);
    }

    #[tokio::test]
    async fn last_member_leaving_deletes_room() {
        let registry = RoomRegistry::new();
        let (a, _rx_a) = conn();
        let (b, _rx_b) = conn();
        registry.add_member("lobby", a.clone()).await;
        registry.add_member("lobby", b.clone()).await;

        assert!(registry.remove_member("lobby", &a).await);
        assert!(registry.contains_room("lobby").await);
        assert!(!registry.remove_member("lobby", &b).await);
        assert!(!registry.contains_room("lobby").await);
        assert_eq!(registry.room_count().await, 0);
    }

    #[tokio::test]
    async fn remove_from_unknown_room_reports_members_remain() {
        let registry = RoomRegistry::new();
        let (a, _rx) = conn();
        assert!(registry.remove_member("nowhere", &a).await);
        assert_eq!(registry.room_count().await, 0);
    }

    #[tokio::test]
    async fn rooms_exist_iff_non_empty_over_a_sequence() {
        let registry = RoomRegistry::new();
        let conns: Vec<_> = (0..4).map(|_| conn()).collect();
        let rooms = ["alpha", "beta"];

        // Interleave adds and removes across two rooms and check the
        // invariant after every step.
        for step in 0..32usize {
            let Some((c, _)) = conns.get(step % conns.len()) else {
                panic!("index in range");
            };
            let Some(room) = rooms.get((step / 3) % rooms.len()) else {
                panic!("index in range");
            };
            if step % 2 == 0 {
                registry.add_member(room, c.clone()).await;
            } else {
                registry.remove_member(room, c).await;
            }
            for (name, count) in registry.snapshot().await {
                assert!(count > 0, "room {name} is present but empty");
            }
            for room in rooms {
                assert_eq!(
                    registry.contains_room(room).await,
                    registry.member_count(room).await > 0
                );
            }
        }
    }

    #[tokio::test]
    async fn broadcast_except_sender_skips_only_sender() {
        let registry = RoomRegistry::new();
        let (a, mut rx_a) = conn();
        let (b, mut rx_b) = conn();
        let (c, mut rx_c) = conn();
        for m in [&a, &b, &c] {
            registry.add_member("lobby", m.clone()).await;
        }

        let delivered = registry
            .broadcast_except_sender("lobby", &a, &json!({"type": "message", "body": "hi"}))
            .await;

        assert_eq!(delivered, 2);
        assert!(rx_a.try_recv().is_err());
        assert_eq!(next_json(&mut rx_b)["body"], "hi");
        assert_eq!(next_json(&mut rx_c)["body"], "hi");
    }

    #[tokio::test]
    async fn broadcast_all_reaches_every_member() {
        let registry = RoomRegistry::new();
        let (a, mut rx_a) = conn();
        let (b, mut rx_b) = conn();
        registry.add_member("lobby", a).await;
        registry.add_member("lobby", b).await;

        assert_eq!(registry.broadcast_all("lobby", &json!({"n": 1})).await, 2);
        assert_eq!(next_json(&mut rx_a)["n"], 1);
        assert_eq!(next_json(&mut rx_b)["n"], 1);
    }

    #[tokio::test]
    async fn broadcast_to_unknown_room_is_noop() {
        let registry = RoomRegistry::new();
        assert_eq!(registry.broadcast_all("ghost", &json!({})).await, 0);
    }

    #[tokio::test]
    async fn stale_member_does_not_break_broadcast() {
        let registry = RoomRegistry::new();
        let (dead, dead_rx) = conn();
        let (live, mut live_rx) = conn();
        registry.add_member("lobby", dead).await;
        registry.add_member("lobby", live).await;
        drop(dead_rx);

        assert_eq!(registry.broadcast_all("lobby", &json!({"n": 2})).await, 1);
        assert_eq!(next_json(&mut live_rx)["n"], 2);
    }

    #[tokio::test]
    async fn full_queue_drops_only_for_that_member() {
        let registry = RoomRegistry::new();
        let (slow, _slow_rx) = Connection::new(1);
        let (fast, mut fast_rx) = conn();
        registry.add_member("lobby", slow).await;
        registry.add_member("lobby", fast).await;

        assert_eq!(registry.broadcast_all("lobby", &json!({"n": 1})).await, 2);
        assert_eq!(registry.broadcast_all("lobby", &json!({"n": 2})).await, 1);
        assert_eq!(next_json(&mut fast_rx)["n"], 1);
        assert_eq!(next_json(&mut fast_rx)["n"], 2);
    }

    #[tokio::test]
    async fn join_and_announce_carries_new_total() {
        let registry = RoomRegistry::new();
        let (a, mut rx_a) = conn();
        let (b, mut rx_b) = conn();

        let first = registry
            .join_and_announce("lobby", a, |total| json!({"type": "join", "totalUsers": total}))
            .await;
        assert_eq!(first, 1);
        assert_eq!(next_json(&mut rx_a)["totalUsers"], 1);

        let second = registry
            .join_and_announce("lobby", b, |total| json!({"type": "join", "totalUsers": total}))
            .await;
        assert_eq!(second, 2);
        assert_eq!(next_json(&mut rx_a)["totalUsers"], 2);
        assert_eq!(next_json(&mut rx_b)["totalUsers"], 2);
    }

    #[tokio::test]
    async fn leave_and_announce_notifies_remaining_members() {
        let registry = RoomRegistry::new();
        let (a, mut rx_a) = conn();
        let (b, _rx_b) = conn();
        registry.add_member("lobby", a.clone()).await;
        registry.add_member("lobby", b.clone()).await;

        let remain = registry
            .leave_and_announce("lobby", &b, |total| json!({"type": "userleave", "totalUsers": total}))
            .await;
        assert!(remain);
        let msg = next_json(&mut rx_a);
        assert_eq!(msg["type"], "userleave");
        assert_eq!(msg["totalUsers"], 1);
    }

    #[tokio::test]
    async fn leave_and_announce_last_member_broadcasts_nothing() {
        let registry = RoomRegistry::new();
        let (a, mut rx_a) = conn();
        registry.add_member("lobby", a.clone()).await;

        let mut announced = false;
        let remain = registry
            .leave_and_announce("lobby", &a, |_| {
                announced = true;
                json!({})
            })
            .await;
        assert!(!remain);
        assert!(!announced);
        assert!(rx_a.try_recv().is_err());
        assert!(!registry.contains_room("lobby").await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_joins_and_leaves_leave_no_empty_rooms() {
        let registry = Arc::new(RoomRegistry::new());
        let mut handles = Vec::new();
        for i in 0..64usize {
            let registry = Arc::clone(&registry);
            handles.push(tokio::spawn(async move {
                let (c, _rx) = Connection::new(4);
                let room = if i % 2 == 0 { "even" } else { "odd" };
                registry.add_member(room, c.clone()).await;
                tokio::task::yield_now().await;
                registry.remove_member(room, &c).await;
            }));
        }
        for h in handles {
            assert!(h.await.is_ok());
        }
        assert_eq!(registry.room_count().await, 0);
    }
}
