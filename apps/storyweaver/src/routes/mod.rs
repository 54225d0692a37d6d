pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::state::AppState;
use crate::story::handlers;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route("/api/v1/languages", get(handlers::handle_languages))
        .route("/api/v1/usage", get(handlers::handle_usage))
        .route(
            "/api/v1/stories",
            get(handlers::handle_list_stories).post(handlers::handle_create_story),
        )
        .route("/api/v1/stories/:id", get(handlers::handle_get_story))
        .route("/api/v1/stories/:id/next", post(handlers::handle_next_parts))
        .route(
            "/api/v1/stories/:id/choice",
            post(handlers::handle_submit_choice),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use uuid::Uuid;

    use crate::testing::{app_state, ScriptedTextGenerator};

    async fn send(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(match body {
                Some(body) => Body::from(body.to_string()),
                None => Body::empty(),
            })
            .unwrap();

        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn test_health_and_languages() {
        let dir = tempfile::tempdir().unwrap();
        let router = build_router(app_state(ScriptedTextGenerator::failing(), dir.path()));

        let (status, body) = send(&router, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");

        let (status, body) = send(&router, "GET", "/api/v1/languages", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([
            {"code": "EN", "name": "English"},
            {"code": "FR", "name": "French"}
        ]));
    }

    #[tokio::test]
    async fn test_usage_starts_at_zero() {
        let dir = tempfile::tempdir().unwrap();
        let router = build_router(app_state(ScriptedTextGenerator::failing(), dir.path()));

        let (status, body) = send(&router, "GET", "/api/v1/usage", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["images"], 0);
        assert_eq!(body["estimated_cost"], 0.0);
    }

    #[tokio::test]
    async fn test_create_story_validation_errors() {
        let dir = tempfile::tempdir().unwrap();
        let router = build_router(app_state(ScriptedTextGenerator::failing(), dir.path()));

        let cases = [
            json!({"length": 0}),
            json!({"length": 11}),
            json!({"target_language": "klingon"}),
            json!({"title": "Only a title"}),
            json!({"idea": "x", "title": "t", "overview": "o"}),
        ];
        for case in cases {
            let (status, body) = send(&router, "POST", "/api/v1/stories", Some(case.clone())).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{case}");
            assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
        }
    }

    #[tokio::test]
    async fn test_unknown_story_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let router = build_router(app_state(ScriptedTextGenerator::failing(), dir.path()));

        let uri = format!("/api/v1/stories/{}/next", Uuid::new_v4());
        let (status, body) = send(&router, "POST", &uri, None).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_story_flow_over_http() {
        let dir = tempfile::tempdir().unwrap();
        let text = ScriptedTextGenerator::new([
            json!({"story_content": "You wake in a lighthouse."}).to_string(),
            json!({
                "story_content": "A ship nears the rocks.",
                "choices": [{"choice": "Light the lamp"}, {"choice": "Ring the bell"}]
            })
            .to_string(),
            json!({"story_end": "The ship is saved."}).to_string(),
        ]);
        let state = app_state(text, dir.path());
        let router = build_router(state.clone());

        let (status, created) = send(
            &router,
            "POST",
            "/api/v1/stories",
            Some(json!({
                "title": "The Keeper",
                "overview": "A storm night.",
                "length": 1,
                "illustrate": false
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["state"], "introducing");
        let id = created["id"].as_str().unwrap().to_string();

        let (_, next) = send(&router, "POST", &format!("/api/v1/stories/{id}/next"), None).await;
        assert_eq!(next["status"], "ok");
        assert_eq!(next["parts"].as_array().unwrap().len(), 1);

        let (_, next) = send(&router, "POST", &format!("/api/v1/stories/{id}/next"), None).await;
        assert_eq!(next["status"], "awaiting_user_input");

        let choice_uri = format!("/api/v1/stories/{id}/choice");
        let (_, rejected) = send(&router, "POST", &choice_uri, Some(json!({"choice": "Swim"}))).await;
        assert_eq!(rejected["accepted"], false);
        let (_, accepted) =
            send(&router, "POST", &choice_uri, Some(json!({"choice": "Light the lamp"}))).await;
        assert_eq!(accepted["accepted"], true);
        assert_eq!(accepted["state"], "ending");

        let (_, next) = send(&router, "POST", &format!("/api/v1/stories/{id}/next"), None).await;
        assert_eq!(next["status"], "ok");
        let story_id: Uuid = id.parse().unwrap();
        assert!(!state.sessions.contains(story_id).await);

        let (status, view) = send(&router, "GET", &format!("/api/v1/stories/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(view["state"], "complete");
        assert_eq!(view["title"], "The Keeper");
        assert_eq!(view["parts"].as_array().unwrap().len(), 2);

        let (_, history) = send(&router, "GET", "/api/v1/stories", None).await;
        let history = history.as_array().unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0]["title"], "The Keeper");
        assert_eq!(history[0]["language"], "en");
    }

    #[tokio::test]
    async fn test_choice_is_accepted_when_save_fails() {
        let dir = tempfile::tempdir().unwrap();
        let text = ScriptedTextGenerator::new([
            json!({"story_content": "Intro."}).to_string(),
            json!({
                "story_content": "Fork.",
                "choices": [{"choice": "Left"}, {"choice": "Right"}]
            })
            .to_string(),
        ]);
        let state = app_state(text, dir.path());
        let router = build_router(state.clone());

        let (_, created) = send(
            &router,
            "POST",
            "/api/v1/stories",
            Some(json!({"title": "T", "overview": "O", "length": 1, "illustrate": false})),
        )
        .await;
        let id = created["id"].as_str().unwrap().to_string();
        send(&router, "POST", &format!("/api/v1/stories/{id}/next"), None).await;

        // A plain file where the story directory should be makes every save fail.
        let story_dir = state.engine.store().story_dir(id.parse().unwrap());
        std::fs::remove_dir_all(&story_dir).unwrap();
        std::fs::write(&story_dir, b"in the way").unwrap();

        let choice_uri = format!("/api/v1/stories/{id}/choice");
        let (status, body) = send(&router, "POST", &choice_uri, Some(json!({"choice": "Left"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["accepted"], true);
        assert_eq!(body["state"], "ending");

        let (_, again) = send(&router, "POST", &choice_uri, Some(json!({"choice": "Left"}))).await;
        assert_eq!(again["accepted"], false);
    }
}
