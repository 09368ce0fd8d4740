//! Signaling relay: typing broadcasts and point-to-point call payloads.
//!
//! The relay is stateless and keyed purely on current presence. An offline
//! target is a normal, expected branch reported as
//! [`DeliveryOutcome::TargetOffline`], never as an error.

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use causerie_shared::{ConversationId, ServerEvent, SessionId, SignalPayload, UserId};

use crate::registry::ConnectionRegistry;

/// Result of a point-to-point delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Delivered,
    TargetOffline,
}

#[derive(Clone)]
pub struct SignalingRelay {
    registry: Arc<ConnectionRegistry>,
}

impl SignalingRelay {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Announce typing to the conversation room, excluding the originating
    /// session.
    pub async fn typing(
        &self,
        conversation: ConversationId,
        user: UserId,
        origin: SessionId,
    ) {
        self.registry
            .broadcast_room(
                conversation,
                ServerEvent::Typing {
                    conversation_id: conversation,
                    user_id: user,
                },
                Some(origin),
            )
            .await;
    }

    /// Announce the end of typing, same exclusion rule.
    pub async fn stop_typing(
        &self,
        conversation: ConversationId,
        user: UserId,
        origin: SessionId,
    ) {
        self.registry
            .broadcast_room(
                conversation,
                ServerEvent::StopTyping {
                    conversation_id: conversation,
                    user_id: user,
                },
                Some(origin),
            )
            .await;
    }

    /// Forward a call-signaling payload verbatim to the target user's
    /// session, gated on presence.
    pub async fn relay(&self, payload: SignalPayload) -> DeliveryOutcome {
        match self.registry.session_of(payload.target_user_id).await {
            Some(handle) => {
                debug!(
                    kind = ?payload.kind,
                    from = %payload.from_user_id,
                    target = %payload.target_user_id,
                    "relaying signal"
                );
                handle.send(ServerEvent::Signal(payload));
                DeliveryOutcome::Delivered
            }
            None => {
                debug!(
                    kind = ?payload.kind,
                    target = %payload.target_user_id,
                    "signal target offline"
                );
                DeliveryOutcome::TargetOffline
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use ed25519_dalek::SigningKey;
    use rand::rngs::OsRng;

    use causerie_shared::SignalKind;

    use crate::identity::TokenIssuer;
    use crate::registry::AuthenticatedSession;

    struct Fixture {
        registry: Arc<ConnectionRegistry>,
        issuer: TokenIssuer,
        relay: SignalingRelay,
    }

    fn fixture() -> Fixture {
        let issuer = TokenIssuer::new(SigningKey::generate(&mut OsRng));
        let registry = Arc::new(ConnectionRegistry::new(Arc::new(issuer.verifier()), 16));
        let relay = SignalingRelay::new(registry.clone());
        Fixture {
            registry,
            issuer,
            relay,
        }
    }

    impl Fixture {
        async fn connect(&self, user: UserId) -> AuthenticatedSession {
            let token = self.issuer.issue(user, Utc::now() + Duration::hours(1));
            self.registry.authenticate(&token).await.unwrap()
        }
    }

    fn offer(from: UserId, target: UserId) -> SignalPayload {
        SignalPayload {
            kind: SignalKind::Offer,
            from_user_id: from,
            target_user_id: target,
            conversation_id: ConversationId::new(),
            data: serde_json::json!({ "sdp": "v=0 ..." }),
        }
    }

    #[tokio::test]
    async fn relay_to_online_target_delivers_verbatim() {
        let fx = fixture();
        let caller = UserId::new();
        let callee = UserId::new();
        let mut callee_session = fx.connect(callee).await;

        let payload = offer(caller, callee);
        let outcome = fx.relay.relay(payload.clone()).await;
        assert_eq!(outcome, DeliveryOutcome::Delivered);

        assert_eq!(
            callee_session.events.try_recv().unwrap(),
            ServerEvent::Signal(payload)
        );
    }

    #[tokio::test]
    async fn relay_to_offline_target_is_a_normal_outcome() {
        let fx = fixture();
        let outcome = fx.relay.relay(offer(UserId::new(), UserId::new())).await;
        assert_eq!(outcome, DeliveryOutcome::TargetOffline);
    }

    #[tokio::test]
    async fn typing_excludes_the_originator() {
        let fx = fixture();
        let room = ConversationId::new();
        let alice = UserId::new();
        let bob = UserId::new();

        let mut alice_session = fx.connect(alice).await;
        let mut bob_session = fx.connect(bob).await;
        while alice_session.events.try_recv().is_ok() {}
        while bob_session.events.try_recv().is_ok() {}

        fx.registry.join_room(alice_session.session_id, room).await;
        fx.registry.join_room(bob_session.session_id, room).await;

        fx.relay.typing(room, alice, alice_session.session_id).await;
        fx.relay
            .stop_typing(room, alice, alice_session.session_id)
            .await;

        assert_eq!(
            bob_session.events.try_recv().unwrap(),
            ServerEvent::Typing {
                conversation_id: room,
                user_id: alice,
            }
        );
        assert_eq!(
            bob_session.events.try_recv().unwrap(),
            ServerEvent::StopTyping {
                conversation_id: room,
                user_id: alice,
            }
        );
        assert!(alice_session.events.try_recv().is_err());
    }
}
