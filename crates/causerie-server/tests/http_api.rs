//! End-to-end tests of the REST surface, driven through the router
//! without binding a socket.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::{Duration, Utc};
use ed25519_dalek::SigningKey;
use http_body_util::BodyExt;
use rand::rngs::OsRng;
use tower::ServiceExt;

use causerie_core::conversations::ConversationService;
use causerie_core::identity::TokenIssuer;
use causerie_core::messages::MessagePipeline;
use causerie_core::requests::ChatRequestService;
use causerie_core::signaling::SignalingRelay;
use causerie_core::ConnectionRegistry;
use causerie_shared::UserId;
use causerie_store::{MemoryStore, RecordStore, User};

use causerie_server::api::{build_router, AppState};
use causerie_server::config::ServerConfig;

struct Harness {
    router: Router,
    store: Arc<MemoryStore>,
    issuer: TokenIssuer,
}

fn harness() -> Harness {
    let issuer = TokenIssuer::new(SigningKey::generate(&mut OsRng));
    let store = Arc::new(MemoryStore::new());
    let registry = Arc::new(ConnectionRegistry::new(Arc::new(issuer.verifier()), 16));

    let conversations = ConversationService::new(store.clone());
    let state = AppState {
        store: store.clone(),
        registry: registry.clone(),
        verifier: Arc::new(issuer.verifier()),
        conversations: conversations.clone(),
        messages: MessagePipeline::new(store.clone(), registry.clone()),
        requests: ChatRequestService::new(store.clone(), registry.clone(), conversations),
        relay: SignalingRelay::new(registry),
        config: Arc::new(ServerConfig::default()),
    };

    Harness {
        router: build_router(state),
        store,
        issuer,
    }
}

impl Harness {
    fn seed_user(&self, name: &str) -> UserId {
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

    fn token_for(&self, user: UserId) -> String {
        self.issuer.issue(user, Utc::now() + Duration::hours(1))
    }

    async fn request(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }
}

#[tokio::test]
async fn health_requires_no_credentials() {
    let h = harness();
    let (status, body) = h.request("GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn missing_or_garbage_token_is_unauthorized() {
    let h = harness();

    let (status, _) = h.request("GET", "/conversations", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = h.request("GET", "/conversations", Some("garbage"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn conversation_create_and_list_round_trip() {
    let h = harness();
    let alice = h.seed_user("alice");
    let bob = h.seed_user("bob");
    let token = h.token_for(alice);

    let (status, created) = h
        .request(
            "POST",
            "/conversations",
            Some(&token),
            Some(serde_json::json!({ "participant_ids": [bob] })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(created["conversation"]["is_group"], false);
    assert_eq!(created["participants"].as_array().unwrap().len(), 2);

    // Creating the same pair again returns the deduplicated conversation.
    let (_, again) = h
        .request(
            "POST",
            "/conversations",
            Some(&token),
            Some(serde_json::json!({ "participant_ids": [bob] })),
        )
        .await;
    assert_eq!(again["conversation"]["id"], created["conversation"]["id"]);

    let (status, listed) = h.request("GET", "/conversations", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn message_send_fetch_and_read_receipt() {
    let h = harness();
    let alice = h.seed_user("alice");
    let bob = h.seed_user("bob");
    let alice_token = h.token_for(alice);
    let bob_token = h.token_for(bob);

    let (_, created) = h
        .request(
            "POST",
            "/conversations",
            Some(&alice_token),
            Some(serde_json::json!({ "participant_ids": [bob] })),
        )
        .await;
    let conversation_id = created["conversation"]["id"].as_str().unwrap().to_string();

    let (status, message) = h
        .request(
            "POST",
            "/messages",
            Some(&alice_token),
            Some(serde_json::json!({
                "conversation_id": conversation_id,
                "content": "bonjour",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(message["content"], "bonjour");
    let message_id = message["id"].as_str().unwrap().to_string();

    let (status, _) = h
        .request(
            "POST",
            &format!("/messages/{message_id}/read"),
            Some(&bob_token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, page) = h
        .request(
            "GET",
            &format!("/messages/{conversation_id}"),
            Some(&bob_token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let page = page.as_array().unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0]["read_by"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn outsiders_get_forbidden_on_conversation_views() {
    let h = harness();
    let alice = h.seed_user("alice");
    let bob = h.seed_user("bob");
    let mallory = h.seed_user("mallory");
    let alice_token = h.token_for(alice);
    let mallory_token = h.token_for(mallory);

    let (_, created) = h
        .request(
            "POST",
            "/conversations",
            Some(&alice_token),
            Some(serde_json::json!({ "participant_ids": [bob] })),
        )
        .await;
    let conversation_id = created["conversation"]["id"].as_str().unwrap();

    let (status, _) = h
        .request(
            "GET",
            &format!("/conversations/{conversation_id}"),
            Some(&mallory_token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn chat_request_lifecycle_over_http() {
    let h = harness();
    let alice = h.seed_user("alice");
    let bob = h.seed_user("bob");
    let alice_token = h.token_for(alice);
    let bob_token = h.token_for(bob);

    let (status, request) = h
        .request(
            "POST",
            "/chat-requests",
            Some(&alice_token),
            Some(serde_json::json!({ "receiver_id": bob, "message": "hi" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let request_id = request["id"].as_str().unwrap().to_string();

    // A second pending request for the same pair conflicts.
    let (status, _) = h
        .request(
            "POST",
            "/chat-requests",
            Some(&alice_token),
            Some(serde_json::json!({ "receiver_id": bob })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, pending) = h
        .request("GET", "/chat-requests", Some(&bob_token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(pending.as_array().unwrap().len(), 1);

    let (status, view) = h
        .request(
            "POST",
            &format!("/chat-requests/{request_id}/accept"),
            Some(&bob_token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["conversation"]["is_group"], false);

    // Accepting twice is a state error.
    let (status, _) = h
        .request(
            "POST",
            &format!("/chat-requests/{request_id}/accept"),
            Some(&bob_token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn signal_to_offline_target_reports_user_offline() {
    let h = harness();
    let alice = h.seed_user("alice");
    let bob = h.seed_user("bob");
    let token = h.token_for(alice);

    let (status, body) = h
        .request(
            "POST",
            "/signal",
            Some(&token),
            Some(serde_json::json!({
                "kind": "call_invite",
                "target_user_id": bob,
                "conversation_id": causerie_shared::ConversationId::new(),
                "data": { "media": "audio" },
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "user_offline");
}

#[tokio::test]
async fn user_search_excludes_the_requester() {
    let h = harness();
    let alice = h.seed_user("alice");
    let _bob = h.seed_user("bob");
    let _bobby = h.seed_user("bobby");
    let token = h.token_for(alice);

    let (status, hits) = h
        .request("GET", "/users/search?query=bob", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(hits.as_array().unwrap().len(), 2);

    let (_, hits) = h
        .request("GET", "/users/search?query=alice", Some(&token), None)
        .await;
    assert!(hits.as_array().unwrap().is_empty());
}
