//! End-to-end flows across the registry, conversation model, message
//! pipeline, chat requests, and signaling relay, driven exactly the way
//! the server surface drives them.

use std::sync::Arc;

use chrono::{Duration, Utc};
use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;

use causerie_store::RecordStore;

use causerie_core::conversations::ConversationService;
use causerie_core::identity::TokenIssuer;
use causerie_core::messages::MessagePipeline;
use causerie_core::registry::AuthenticatedSession;
use causerie_core::requests::ChatRequestService;
use causerie_core::signaling::{DeliveryOutcome, SignalingRelay};
use causerie_core::{ConnectionRegistry, CoreError};
use causerie_shared::{ServerEvent, SignalKind, SignalPayload, UserId};
use causerie_store::{MemoryStore, MessageKind, User};

struct Harness {
    store: Arc<MemoryStore>,
    registry: Arc<ConnectionRegistry>,
    issuer: TokenIssuer,
    conversations: ConversationService,
    messages: MessagePipeline,
    requests: ChatRequestService,
    relay: SignalingRelay,
}

impl Harness {
    fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let issuer = TokenIssuer::new(SigningKey::generate(&mut OsRng));
        let registry = Arc::new(ConnectionRegistry::new(Arc::new(issuer.verifier()), 32));
        let conversations = ConversationService::new(store.clone());
        let messages = MessagePipeline::new(store.clone(), registry.clone());
        let requests =
            ChatRequestService::new(store.clone(), registry.clone(), conversations.clone());
        let relay = SignalingRelay::new(registry.clone());

        Self {
            store,
            registry,
            issuer,
            conversations,
            messages,
            requests,
            relay,
        }
    }

    fn register(&self, name: &str) -> UserId {
        let user = User {
            id: UserId::new(),
            display_name: name.to_string(),
            email: format!("{name}@example.org"),
            avatar_url: None,
            credential_hash: String::new(),
            created_at: Utc::now(),
        };
        self.store.insert_user(&user).unwrap();
        user.id
    }

    async fn connect(&self, user: UserId) -> AuthenticatedSession {
        let token = self.issuer.issue(user, Utc::now() + Duration::hours(24));
        self.registry.authenticate(&token).await.unwrap()
    }
}

fn drain(session: &mut AuthenticatedSession) {
    while session.events.try_recv().is_ok() {}
}

/// The full handshake-to-read-receipt flow: A requests, B accepts, A sends
/// "hi", B reads it.
#[tokio::test]
async fn request_accept_message_read_receipt_flow() {
    let h = Harness::new();
    let alice = h.register("alice");
    let bob = h.register("bob");

    // Alice authenticates and sends a chat request while Bob is offline.
    let mut alice_session = h.connect(alice).await;
    let request = h
        .requests
        .create(alice, bob, Some("hello?".into()), false, None)
        .await
        .unwrap();

    // Bob authenticates and fetches pending requests: exactly one, from
    // Alice.
    let mut bob_session = h.connect(bob).await;
    drain(&mut alice_session);
    let pending = h.requests.pending_for(bob).unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].sender_id, alice);

    // Bob accepts: a conversation with exactly {alice, bob}.
    let view = h.requests.accept(request.id, bob).await.unwrap();
    let conversation = view.conversation.id;
    let mut ids: Vec<UserId> = view.participants.iter().map(|u| u.id).collect();
    ids.sort();
    let mut expected = vec![alice, bob];
    expected.sort();
    assert_eq!(ids, expected);

    // Both sides join the room keyed by the conversation id.
    h.registry.join_room(alice_session.session_id, conversation).await;
    h.registry.join_room(bob_session.session_id, conversation).await;

    // Alice sends "hi": Bob's session receives the broadcast with
    // read_by = [alice].
    let message = h
        .messages
        .send(conversation, alice, "hi".into(), MessageKind::Text)
        .await
        .unwrap();

    match bob_session.events.try_recv().unwrap() {
        ServerEvent::NewMessage {
            message_id,
            content,
            read_by,
            sender_id,
            ..
        } => {
            assert_eq!(message_id, message.id);
            assert_eq!(content, "hi");
            assert_eq!(sender_id, alice);
            assert_eq!(read_by, vec![alice]);
        }
        other => panic!("unexpected event: {other:?}"),
    }

    // Bob marks it read: Alice's session receives the receipt.
    drain(&mut alice_session);
    h.messages.mark_read(message.id, bob).await.unwrap();

    assert_eq!(
        alice_session.events.try_recv().unwrap(),
        ServerEvent::MessageRead {
            message_id: message.id,
            conversation_id: conversation,
            reader_id: bob,
        }
    );
}

/// Creating the same direct pair twice returns the first conversation, and
/// accepting a request between the same pair reuses it too.
#[tokio::test]
async fn direct_conversation_is_deduplicated_everywhere() {
    let h = Harness::new();
    let alice = h.register("alice");
    let bob = h.register("bob");

    let first = h.conversations.create(alice, &[bob], false, None).unwrap();
    let second = h.conversations.create(alice, &[bob], false, None).unwrap();
    assert_eq!(first.id, second.id);
    assert_eq!(h.conversations.list_for(alice).unwrap().len(), 1);

    let request = h
        .requests
        .create(bob, alice, None, false, None)
        .await
        .unwrap();
    let view = h.requests.accept(request.id, alice).await.unwrap();
    assert_eq!(view.conversation.id, first.id);
}

/// Presence flows: online broadcast on authenticate, offline on disconnect,
/// and signaling outcomes tracking presence.
#[tokio::test]
async fn presence_gates_signaling() {
    let h = Harness::new();
    let alice = h.register("alice");
    let bob = h.register("bob");

    let mut alice_session = h.connect(alice).await;

    let payload = SignalPayload {
        kind: SignalKind::CallInvite,
        from_user_id: alice,
        target_user_id: bob,
        conversation_id: causerie_shared::ConversationId::new(),
        data: serde_json::json!({ "call_type": "video" }),
    };
    assert_eq!(
        h.relay.relay(payload.clone()).await,
        DeliveryOutcome::TargetOffline
    );

    let mut bob_session = h.connect(bob).await;
    assert_eq!(
        alice_session.events.try_recv().unwrap(),
        ServerEvent::UserOnline { user_id: bob }
    );

    assert_eq!(h.relay.relay(payload.clone()).await, DeliveryOutcome::Delivered);
    assert_eq!(
        bob_session.events.try_recv().unwrap(),
        ServerEvent::Signal(payload)
    );

    h.registry.disconnect(bob_session.session_id).await;
    assert_eq!(
        alice_session.events.try_recv().unwrap(),
        ServerEvent::UserOffline { user_id: bob }
    );
    assert!(!h.registry.is_online(bob).await);
}

/// Concurrent mark_read calls for the same (message, reader) produce
/// exactly one broadcast: the read-modify-write is atomic per message.
#[tokio::test]
async fn concurrent_mark_read_is_linearizable() {
    let h = Harness::new();
    let alice = h.register("alice");
    let bob = h.register("bob");

    let conversation = h.conversations.create(alice, &[bob], false, None).unwrap();
    let mut alice_session = h.connect(alice).await;
    h.registry
        .join_room(alice_session.session_id, conversation.id)
        .await;

    let message = h
        .messages
        .send(conversation.id, alice, "hi".into(), MessageKind::Text)
        .await
        .unwrap();
    drain(&mut alice_session);

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let messages = h.messages.clone();
        let message_id = message.id;
        tasks.push(tokio::spawn(async move {
            messages.mark_read(message_id, bob).await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let mut receipts = 0;
    while let Ok(event) = alice_session.events.try_recv() {
        if matches!(event, ServerEvent::MessageRead { .. }) {
            receipts += 1;
        }
    }
    assert_eq!(receipts, 1);

    let stored = h.store.get_message(message.id).unwrap();
    assert_eq!(stored.read_by.len(), 2);
}

/// Authorization failures across the surface.
#[tokio::test]
async fn outsiders_are_rejected() {
    let h = Harness::new();
    let alice = h.register("alice");
    let bob = h.register("bob");
    let mallory = h.register("mallory");

    let conversation = h.conversations.create(alice, &[bob], false, None).unwrap();

    assert!(matches!(
        h.messages
            .send(conversation.id, mallory, "hi".into(), MessageKind::Text)
            .await,
        Err(CoreError::Authz(_))
    ));
    assert!(matches!(
        h.messages.fetch(conversation.id, mallory, 50, 0),
        Err(CoreError::Authz(_))
    ));
    assert!(matches!(
        h.conversations.view(conversation.id, mallory),
        Err(CoreError::Authz(_))
    ));
}
