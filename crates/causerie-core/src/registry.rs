//! Connection registry: who is online, in which rooms, with which session.
//!
//! This is the only globally shared mutable state in the coordination
//! layer. One `RwLock` guards four maps that always mutate together:
//! user -> session handle, session -> user (the inverse, so disconnect is a
//! lookup instead of a scan), user -> joined rooms, and room -> member
//! users. Races between a disconnect and a concurrent authenticate for the
//! same user resolve to last-writer-wins on the mapping, never to a torn
//! entry.
//!
//! Broadcasts snapshot the recipient handles under the lock and deliver
//! after it is released, so a slow recipient cannot stall registry
//! mutations. Delivery is `try_send` on a bounded per-session queue;
//! a full queue drops the event with a log line and propagates no
//! backpressure to the sender.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

use causerie_shared::{ConversationId, ServerEvent, SessionId, UserId};

use crate::error::{CoreError, Result};
use crate::identity::IdentityVerifier;

/// Default bound of a session's outbound event queue.
pub const DEFAULT_QUEUE_DEPTH: usize = 64;

/// Live handle to one authenticated session's outbound queue.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    session_id: SessionId,
    user_id: UserId,
    tx: mpsc::Sender<ServerEvent>,
}

impl SessionHandle {
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Queue an event for this session, best-effort.
    pub fn send(&self, event: ServerEvent) {
        if self.tx.try_send(event).is_err() {
            debug!(
                session = %self.session_id,
                user = %self.user_id,
                "dropping event for slow or closed session"
            );
        }
    }
}

/// What `authenticate` hands back to the connection task: the session's
/// identity plus the receiving half of its outbound queue.
pub struct AuthenticatedSession {
    pub session_id: SessionId,
    pub user_id: UserId,
    pub events: mpsc::Receiver<ServerEvent>,
}

#[derive(Default)]
struct RegistryInner {
    /// Forward map: at most one live session per user.
    sessions: HashMap<UserId, SessionHandle>,
    /// Inverse map, mutated atomically with `sessions`.
    users_by_session: HashMap<SessionId, UserId>,
    /// Rooms each user's current session has joined.
    rooms_by_user: HashMap<UserId, HashSet<ConversationId>>,
    /// Member users per room, for broadcast fan-out.
    members_by_room: HashMap<ConversationId, HashSet<UserId>>,
}

impl RegistryInner {
    /// Remove every trace of a user's current session. Caller holds the
    /// write lock and decides what to do with the returned handle.
    fn evict(&mut self, user: UserId) -> Option<SessionHandle> {
        let handle = self.sessions.remove(&user)?;
        self.users_by_session.remove(&handle.session_id);
        if let Some(rooms) = self.rooms_by_user.remove(&user) {
            for room in rooms {
                if let Some(members) = self.members_by_room.get_mut(&room) {
                    members.remove(&user);
                    if members.is_empty() {
                        self.members_by_room.remove(&room);
                    }
                }
            }
        }
        Some(handle)
    }

    fn handles_except(&self, exclude: Option<SessionId>) -> Vec<SessionHandle> {
        self.sessions
            .values()
            .filter(|h| Some(h.session_id) != exclude)
            .cloned()
            .collect()
    }

    fn room_handles_except(
        &self,
        room: ConversationId,
        exclude: Option<SessionId>,
    ) -> Vec<SessionHandle> {
        let Some(members) = self.members_by_room.get(&room) else {
            return Vec::new();
        };
        members
            .iter()
            .filter_map(|user| self.sessions.get(user))
            .filter(|h| Some(h.session_id) != exclude)
            .cloned()
            .collect()
    }
}

/// Registry of live sessions and their room memberships.
pub struct ConnectionRegistry {
    verifier: Arc<dyn IdentityVerifier>,
    queue_depth: usize,
    inner: RwLock<RegistryInner>,
}

impl ConnectionRegistry {
    pub fn new(verifier: Arc<dyn IdentityVerifier>, queue_depth: usize) -> Self {
        Self {
            verifier,
            queue_depth,
            inner: RwLock::new(RegistryInner::default()),
        }
    }

    /// Verify a credential token and register a fresh session for its
    /// subject.
    ///
    /// A prior session for the same user is superseded: it receives a final
    /// `session_replaced` event, then its handle is dropped from the
    /// registry (its room memberships included). Everyone else gets a
    /// global `user_online`.
    pub async fn authenticate(&self, token: &str) -> Result<AuthenticatedSession> {
        let user_id = self.verifier.verify(token).ok_or(CoreError::Auth)?;

        let session_id = SessionId::new();
        let (tx, events) = mpsc::channel(self.queue_depth);
        let handle = SessionHandle {
            session_id,
            user_id,
            tx,
        };

        let (replaced, others) = {
            let mut inner = self.inner.write().await;
            let replaced = inner.evict(user_id);
            inner.sessions.insert(user_id, handle);
            inner.users_by_session.insert(session_id, user_id);
            inner.rooms_by_user.insert(user_id, HashSet::new());
            (replaced, inner.handles_except(Some(session_id)))
        };

        // Deliver outside the lock.
        if let Some(old) = replaced {
            info!(
                user = %user_id,
                old_session = %old.session_id,
                new_session = %session_id,
                "session superseded by re-authentication"
            );
            old.send(ServerEvent::SessionReplaced);
        }
        for other in others {
            other.send(ServerEvent::UserOnline { user_id });
        }

        info!(user = %user_id, session = %session_id, "session authenticated");

        Ok(AuthenticatedSession {
            session_id,
            user_id,
            events,
        })
    }

    /// Tear down a session and announce the user offline.
    ///
    /// Idempotent: an unknown or superseded session id leaves the registry
    /// untouched and emits nothing, so a stale disconnect can never evict
    /// the live session that replaced it.
    pub async fn disconnect(&self, session_id: SessionId) {
        let (user_id, others) = {
            let mut inner = self.inner.write().await;
            let Some(user_id) = inner.users_by_session.get(&session_id).copied() else {
                return;
            };
            inner.evict(user_id);
            (user_id, inner.handles_except(None))
        };

        info!(user = %user_id, session = %session_id, "session disconnected");

        for other in others {
            other.send(ServerEvent::UserOffline { user_id });
        }
    }

    /// Enroll the session in a room for subsequent broadcasts. Idempotent;
    /// a no-op for unknown sessions.
    pub async fn join_room(&self, session_id: SessionId, room: ConversationId) {
        let mut inner = self.inner.write().await;
        let Some(user_id) = inner.users_by_session.get(&session_id).copied() else {
            warn!(session = %session_id, room = %room, "join from unregistered session");
            return;
        };

        inner.rooms_by_user.entry(user_id).or_default().insert(room);
        inner.members_by_room.entry(room).or_default().insert(user_id);
        debug!(user = %user_id, room = %room, "joined room");
    }

    /// Remove the session from a room. No-op if not a member.
    pub async fn leave_room(&self, session_id: SessionId, room: ConversationId) {
        let mut inner = self.inner.write().await;
        let Some(user_id) = inner.users_by_session.get(&session_id).copied() else {
            return;
        };

        if let Some(rooms) = inner.rooms_by_user.get_mut(&user_id) {
            rooms.remove(&room);
        }
        if let Some(members) = inner.members_by_room.get_mut(&room) {
            members.remove(&user_id);
            if members.is_empty() {
                inner.members_by_room.remove(&room);
            }
        }
        debug!(user = %user_id, room = %room, "left room");
    }

    /// Whether the user currently has a registered live session.
    pub async fn is_online(&self, user: UserId) -> bool {
        self.inner.read().await.sessions.contains_key(&user)
    }

    /// The user's current session handle, if online.
    pub async fn session_of(&self, user: UserId) -> Option<SessionHandle> {
        self.inner.read().await.sessions.get(&user).cloned()
    }

    /// Fan an event out to every session joined to `room`, optionally
    /// excluding the originating session. Best-effort.
    pub async fn broadcast_room(
        &self,
        room: ConversationId,
        event: ServerEvent,
        exclude: Option<SessionId>,
    ) {
        let handles = {
            let inner = self.inner.read().await;
            inner.room_handles_except(room, exclude)
        };
        for handle in handles {
            handle.send(event.clone());
        }
    }

    /// Fan an event out to every registered session. Best-effort.
    pub async fn broadcast_all(&self, event: ServerEvent, exclude: Option<SessionId>) {
        let handles = {
            let inner = self.inner.read().await;
            inner.handles_except(exclude)
        };
        for handle in handles {
            handle.send(event.clone());
        }
    }

    /// Number of registered live sessions.
    pub async fn online_count(&self) -> usize {
        self.inner.read().await.sessions.len()
    }
}
