use axum::{
    Router, middleware,
    routing::{delete, get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use parley_api::middleware::{require_auth, require_moderator};
use parley_api::state::AppState;
use parley_api::{blocks, conversations, messages, moderation, notifications, reports};

pub fn app_router(state: AppState) -> Router {
    let public_routes = Router::new().route("/healthz", get(healthz));

    let protected_routes = Router::new()
        .route("/conversations", get(conversations::list_conversations))
        .route("/conversations", post(conversations::create_conversation))
        .route("/conversations/unread-count", get(conversations::unread_count))
        .route("/conversations/{conversation_id}/read", post(conversations::mark_conversation_read))
        .route("/conversations/{conversation_id}/messages", get(messages::list_messages))
        .route("/conversations/{conversation_id}/messages", post(messages::send_message))
        .route("/blocks", get(blocks::list_blocks))
        .route("/blocks", post(blocks::create_block))
        .route("/blocks/status/{user_id}", get(blocks::block_status))
        .route("/blocks/{user_id}", delete(blocks::delete_block))
        .route("/reports", post(reports::submit_report))
        .route("/notifications", get(notifications::list_notifications))
        .route("/notifications/read", post(notifications::mark_all_read))
        .route("/notifications/{id}/read", post(notifications::mark_read))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state.clone());

    let moderation_routes = Router::new()
        .route("/moderation/reports", get(moderation::list_reports))
        .route("/moderation/reports/{id}/resolve", post(moderation::resolve_report))
        .route("/moderation/messages/{id}/remove", post(moderation::remove_message))
        .layer(middleware::from_fn(require_moderator))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(moderation_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn healthz() -> &'static str {
    "ok"
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use http_body_util::BodyExt;
    use jsonwebtoken::{EncodingKey, Header};
    use serde_json::{Value, json};
    use tower::ServiceExt;
    use uuid::Uuid;

    use parley_api::rate_limit::{Quota, Quotas, RateLimiter};
    use parley_api::state::AppStateInner;
    use parley_db::Database;
    use parley_types::api::Claims;
    use parley_types::models::{MODERATION_PLACEHOLDER, Role};

    const SECRET: &str = "test-secret";

    struct TestUser {
        id: Uuid,
        token: String,
    }

    fn setup_state() -> AppState {
        let db = Arc::new(Database::open_in_memory().expect("in-memory db"));
        Arc::new(AppStateInner {
            db,
            jwt_secret: SECRET.into(),
            limiter: RateLimiter::new(Quotas::default()),
        })
    }

    fn seed_user(state: &AppState, username: &str, role: Role) -> TestUser {
        let id = Uuid::new_v4();
        state
            .db
            .create_user(&id.to_string(), username, role.as_str())
            .expect("seed user");

        let claims = Claims {
            sub: id,
            username: username.into(),
            role,
            exp: (chrono::Utc::now() + chrono::Duration::days(1)).timestamp() as usize,
        };
        let token = jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .expect("encode token");

        TestUser { id, token }
    }

    async fn call(
        app: Router,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request");

        let response = app.oneshot(request).await.expect("handler should respond");
        let status = response.status();
        let bytes = response.into_body().collect().await.expect("body").to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("json body")
        };
        (status, value)
    }

    #[tokio::test]
    async fn healthz_is_public() {
        let app = app_router(setup_state());
        let response = app
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .expect("handler should respond");
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn missing_or_garbage_token_is_unauthorized() {
        let state = setup_state();

        let (status, body) = call(app_router(state.clone()), "GET", "/conversations", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body["message"].is_string());

        let (status, _) = call(
            app_router(state),
            "GET",
            "/conversations",
            Some("not-a-jwt"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn first_contact_messaging_blocking_scenario() {
        let state = setup_state();
        let alice = seed_user(&state, "alice", Role::User);
        let bob = seed_user(&state, "bob", Role::User);

        // A starts a conversation with B.
        let (status, convo) = call(
            app_router(state.clone()),
            "POST",
            "/conversations",
            Some(&alice.token),
            Some(json!({ "recipient_id": bob.id })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let convo_id = convo["id"].as_str().expect("conversation id").to_string();

        // Re-creating from the other side finds the same conversation.
        let (status, again) = call(
            app_router(state.clone()),
            "POST",
            "/conversations",
            Some(&bob.token),
            Some(json!({ "recipient_id": alice.id })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(again["id"], convo["id"]);

        // B sends "hi": A's unread count becomes 1 and a notification lands.
        let (status, message) = call(
            app_router(state.clone()),
            "POST",
            &format!("/conversations/{convo_id}/messages"),
            Some(&bob.token),
            Some(json!({ "body": "hi" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(message["body"], "hi");
        assert_eq!(message["recipient_id"].as_str(), Some(alice.id.to_string().as_str()));

        let (_, unread) = call(
            app_router(state.clone()),
            "GET",
            "/conversations/unread-count",
            Some(&alice.token),
            None,
        )
        .await;
        assert_eq!(unread["unread"], 1);

        let (_, inbox) = call(
            app_router(state.clone()),
            "GET",
            "/notifications",
            Some(&alice.token),
            None,
        )
        .await;
        assert_eq!(inbox["unread_count"], 1);
        assert_eq!(inbox["notifications"][0]["payload"]["kind"], "message");

        // A blocks B: the thread disappears for both and sends bounce.
        let (status, _) = call(
            app_router(state.clone()),
            "POST",
            "/blocks",
            Some(&alice.token),
            Some(json!({ "user_id": bob.id })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (_, listed) = call(
            app_router(state.clone()),
            "GET",
            "/conversations",
            Some(&alice.token),
            None,
        )
        .await;
        assert_eq!(listed.as_array().map(Vec::len), Some(0));
        let (_, listed) = call(
            app_router(state.clone()),
            "GET",
            "/conversations",
            Some(&bob.token),
            None,
        )
        .await;
        assert_eq!(listed.as_array().map(Vec::len), Some(0));

        let (status, err) = call(
            app_router(state.clone()),
            "POST",
            &format!("/conversations/{convo_id}/messages"),
            Some(&bob.token),
            Some(json!({ "body": "are you there?" })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        // Generic wording: never reveals which side blocked.
        assert_eq!(err["message"], "chat is blocked");

        // A unblocks B: the thread reappears with unread state intact.
        let (status, _) = call(
            app_router(state.clone()),
            "DELETE",
            &format!("/blocks/{}", bob.id),
            Some(&alice.token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (_, listed) = call(
            app_router(state.clone()),
            "GET",
            "/conversations",
            Some(&alice.token),
            None,
        )
        .await;
        assert_eq!(listed[0]["id"].as_str(), Some(convo_id.as_str()));
        assert_eq!(listed[0]["unread_count"], 1);
        assert_eq!(listed[0]["last_message_text"], "hi");

        // Marking the conversation read clears messages and notifications
        // together.
        let (status, marked) = call(
            app_router(state.clone()),
            "POST",
            &format!("/conversations/{convo_id}/read"),
            Some(&alice.token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(marked["messages_read"], 1);
        assert_eq!(marked["notifications_read"], 1);

        let (_, unread) = call(
            app_router(state.clone()),
            "GET",
            "/conversations/unread-count",
            Some(&alice.token),
            None,
        )
        .await;
        assert_eq!(unread["unread"], 0);
        let (_, inbox) = call(
            app_router(state),
            "GET",
            "/notifications",
            Some(&alice.token),
            None,
        )
        .await;
        assert_eq!(inbox["unread_count"], 0);
    }

    #[tokio::test]
    async fn self_conversation_and_unknown_recipient_are_rejected() {
        let state = setup_state();
        let alice = seed_user(&state, "alice", Role::User);

        let (status, _) = call(
            app_router(state.clone()),
            "POST",
            "/conversations",
            Some(&alice.token),
            Some(json!({ "recipient_id": alice.id })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(
            app_router(state),
            "POST",
            "/conversations",
            Some(&alice.token),
            Some(json!({ "recipient_id": Uuid::new_v4() })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn message_bodies_are_trimmed_and_bounded() {
        let state = setup_state();
        let alice = seed_user(&state, "alice", Role::User);
        let bob = seed_user(&state, "bob", Role::User);

        let (_, convo) = call(
            app_router(state.clone()),
            "POST",
            "/conversations",
            Some(&alice.token),
            Some(json!({ "recipient_id": bob.id })),
        )
        .await;
        let convo_id = convo["id"].as_str().unwrap().to_string();

        let (status, _) = call(
            app_router(state.clone()),
            "POST",
            &format!("/conversations/{convo_id}/messages"),
            Some(&alice.token),
            Some(json!({ "body": "   " })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(
            app_router(state.clone()),
            "POST",
            &format!("/conversations/{convo_id}/messages"),
            Some(&alice.token),
            Some(json!({ "body": "x".repeat(2001) })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, message) = call(
            app_router(state),
            "POST",
            &format!("/conversations/{convo_id}/messages"),
            Some(&alice.token),
            Some(json!({ "body": "  trimmed  " })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(message["body"], "trimmed");
    }

    #[tokio::test]
    async fn messages_list_ascending_and_respect_clamped_limit() {
        let state = setup_state();
        let alice = seed_user(&state, "alice", Role::User);
        let bob = seed_user(&state, "bob", Role::User);

        let (_, convo) = call(
            app_router(state.clone()),
            "POST",
            "/conversations",
            Some(&alice.token),
            Some(json!({ "recipient_id": bob.id })),
        )
        .await;
        let convo_id = convo["id"].as_str().unwrap().to_string();

        for body in ["one", "two", "three"] {
            let (status, _) = call(
                app_router(state.clone()),
                "POST",
                &format!("/conversations/{convo_id}/messages"),
                Some(&alice.token),
                Some(json!({ "body": body })),
            )
            .await;
            assert_eq!(status, StatusCode::CREATED);
        }

        let (status, listed) = call(
            app_router(state.clone()),
            "GET",
            &format!("/conversations/{convo_id}/messages"),
            Some(&bob.token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let bodies: Vec<&str> = listed
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["body"].as_str().unwrap())
            .collect();
        assert_eq!(bodies, ["one", "two", "three"]);

        // limit=0 clamps up to 1 rather than erroring.
        let (status, listed) = call(
            app_router(state),
            "GET",
            &format!("/conversations/{convo_id}/messages?limit=0"),
            Some(&bob.token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(listed.as_array().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn moderation_routes_require_the_moderator_role() {
        let state = setup_state();
        let alice = seed_user(&state, "alice", Role::User);

        let (status, _) = call(
            app_router(state.clone()),
            "GET",
            "/moderation/reports",
            Some(&alice.token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let moderator = seed_user(&state, "mod", Role::Moderator);
        let (status, reports) = call(
            app_router(state),
            "GET",
            "/moderation/reports",
            Some(&moderator.token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(reports.as_array().map(Vec::len), Some(0));
    }

    #[tokio::test]
    async fn takedown_cascades_into_preview_and_notifications() {
        let state = setup_state();
        let alice = seed_user(&state, "alice", Role::User);
        let bob = seed_user(&state, "bob", Role::User);
        let moderator = seed_user(&state, "mod", Role::Moderator);

        let (_, convo) = call(
            app_router(state.clone()),
            "POST",
            "/conversations",
            Some(&alice.token),
            Some(json!({ "recipient_id": bob.id })),
        )
        .await;
        let convo_id = convo["id"].as_str().unwrap().to_string();

        let (_, first) = call(
            app_router(state.clone()),
            "POST",
            &format!("/conversations/{convo_id}/messages"),
            Some(&alice.token),
            Some(json!({ "body": "perfectly fine" })),
        )
        .await;
        let (_, offensive) = call(
            app_router(state.clone()),
            "POST",
            &format!("/conversations/{convo_id}/messages"),
            Some(&alice.token),
            Some(json!({ "body": "something awful" })),
        )
        .await;
        let offensive_id = offensive["id"].as_str().unwrap().to_string();

        let (status, removed) = call(
            app_router(state.clone()),
            "POST",
            &format!("/moderation/messages/{offensive_id}/remove"),
            Some(&moderator.token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(removed["is_deleted"], true);
        assert_eq!(removed["body"], MODERATION_PLACEHOLDER);

        // The preview falls back to the latest surviving message.
        let (_, listed) = call(
            app_router(state.clone()),
            "GET",
            "/conversations",
            Some(&bob.token),
            None,
        )
        .await;
        assert_eq!(listed[0]["last_message_text"], first["body"]);

        // B's "new message" notification for the removed message is redacted
        // in place, and A is told about the takedown.
        let (_, bob_inbox) = call(
            app_router(state.clone()),
            "GET",
            "/notifications",
            Some(&bob.token),
            None,
        )
        .await;
        let redacted = bob_inbox["notifications"]
            .as_array()
            .unwrap()
            .iter()
            .find(|n| n["payload"]["message_id"] == offensive["id"])
            .expect("notification for removed message");
        assert_eq!(redacted["title"], "Message removed");

        let (_, alice_inbox) = call(
            app_router(state.clone()),
            "GET",
            "/notifications",
            Some(&alice.token),
            None,
        )
        .await;
        assert_eq!(alice_inbox["notifications"][0]["payload"]["kind"], "moderation");

        // The thread still shows the placeholder, never a hole.
        let (_, thread) = call(
            app_router(state),
            "GET",
            &format!("/conversations/{convo_id}/messages"),
            Some(&bob.token),
            None,
        )
        .await;
        assert_eq!(thread.as_array().map(Vec::len), Some(2));
        assert_eq!(thread[1]["body"], MODERATION_PLACEHOLDER);
    }

    #[tokio::test]
    async fn report_lifecycle_with_participant_validation() {
        let state = setup_state();
        let alice = seed_user(&state, "alice", Role::User);
        let bob = seed_user(&state, "bob", Role::User);
        let eve = seed_user(&state, "eve", Role::User);
        let moderator = seed_user(&state, "mod", Role::Moderator);

        let (_, convo) = call(
            app_router(state.clone()),
            "POST",
            "/conversations",
            Some(&alice.token),
            Some(json!({ "recipient_id": bob.id })),
        )
        .await;
        let convo_id = convo["id"].as_str().unwrap().to_string();
        let (_, message) = call(
            app_router(state.clone()),
            "POST",
            &format!("/conversations/{convo_id}/messages"),
            Some(&bob.token),
            Some(json!({ "body": "rude" })),
        )
        .await;

        // An outsider cannot report a message they are not part of.
        let (status, _) = call(
            app_router(state.clone()),
            "POST",
            "/reports",
            Some(&eve.token),
            Some(json!({
                "target_user_id": bob.id,
                "reason": "spam",
                "message_id": message["id"],
            })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        // The target must actually be in the reported message.
        let (status, _) = call(
            app_router(state.clone()),
            "POST",
            "/reports",
            Some(&alice.token),
            Some(json!({
                "target_user_id": eve.id,
                "reason": "spam",
                "message_id": message["id"],
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, report) = call(
            app_router(state.clone()),
            "POST",
            "/reports",
            Some(&alice.token),
            Some(json!({
                "target_user_id": bob.id,
                "reason": "harassment",
                "message_id": message["id"],
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(report["status"], "open");
        assert_eq!(report["conversation_id"].as_str(), Some(convo_id.as_str()));
        let report_id = report["id"].as_str().unwrap().to_string();

        let (_, open) = call(
            app_router(state.clone()),
            "GET",
            "/moderation/reports?status=open",
            Some(&moderator.token),
            None,
        )
        .await;
        assert_eq!(open.as_array().map(Vec::len), Some(1));

        let (status, resolved) = call(
            app_router(state.clone()),
            "POST",
            &format!("/moderation/reports/{report_id}/resolve"),
            Some(&moderator.token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(resolved["status"], "resolved");

        // Re-resolving is a success no-op with the same end state.
        let (status, again) = call(
            app_router(state.clone()),
            "POST",
            &format!("/moderation/reports/{report_id}/resolve"),
            Some(&moderator.token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(again["resolved_at"], resolved["resolved_at"]);

        let (_, open) = call(
            app_router(state),
            "GET",
            "/moderation/reports?status=open",
            Some(&moderator.token),
            None,
        )
        .await;
        assert_eq!(open.as_array().map(Vec::len), Some(0));
    }

    #[tokio::test]
    async fn rate_limited_sends_surface_as_429() {
        let db = Arc::new(Database::open_in_memory().expect("in-memory db"));
        let quotas = Quotas {
            send_message: Quota { max_events: 2, window_secs: 60 },
            ..Quotas::default()
        };
        let state: AppState = Arc::new(AppStateInner {
            db,
            jwt_secret: SECRET.into(),
            limiter: RateLimiter::new(quotas),
        });
        let alice = seed_user(&state, "alice", Role::User);
        let bob = seed_user(&state, "bob", Role::User);

        let (_, convo) = call(
            app_router(state.clone()),
            "POST",
            "/conversations",
            Some(&alice.token),
            Some(json!({ "recipient_id": bob.id })),
        )
        .await;
        let convo_id = convo["id"].as_str().unwrap().to_string();

        for _ in 0..2 {
            let (status, _) = call(
                app_router(state.clone()),
                "POST",
                &format!("/conversations/{convo_id}/messages"),
                Some(&alice.token),
                Some(json!({ "body": "spam" })),
            )
            .await;
            assert_eq!(status, StatusCode::CREATED);
        }

        let (status, body) = call(
            app_router(state),
            "POST",
            &format!("/conversations/{convo_id}/messages"),
            Some(&alice.token),
            Some(json!({ "body": "spam" })),
        )
        .await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert!(body["message"].is_string());
    }
}
