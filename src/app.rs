use std::net::SocketAddr;

use axum::{routing::get, Json, Router};
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::state::AppState;
use crate::{auth, generate};

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .merge(auth::router())
        .merge(generate::router(state.clone()))
        .route("/health", get(health))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!("http_request", %method, uri = %uri, status = tracing::field::Empty)
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        let latency_ms = latency.as_millis() as u64;
                        if status.is_server_error() {
                            tracing::error!(%status, latency_ms, "response");
                        } else {
                            tracing::info!(%status, latency_ms, "response");
                        }
                    },
                ),
        )
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn serve(app: Router) -> anyhow::Result<()> {
    let addr: SocketAddr = format!(
        "{}:{}",
        std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
        std::env::var("APP_PORT").unwrap_or_else(|_| "5000".into())
    )
    .parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::Body,
        extract::FromRef,
        http::{header, Request, StatusCode},
    };
    use time::{Duration, OffsetDateTime};
    use tower::ServiceExt;

    use super::*;
    use crate::auth::jwt::JwtKeys;
    use crate::auth::repo::UserStore;
    use crate::generate::normalize::FALLBACK_CSS;
    use crate::state::testing::{fake_state, state_with_users, FailingUserStore, FakeCompletion};

    async fn call(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let resp = app.clone().oneshot(req).await.expect("request");
        let status = resp.status();
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .expect("read body");
        let json = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).expect("json body")
        };
        (status, json)
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn generate_req(token: Option<&str>, prompt: &str) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/generate")
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(t) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {t}"));
        }
        builder
            .body(Body::from(json!({ "prompt": prompt }).to_string()))
            .unwrap()
    }

    async fn register_and_login(app: &Router) -> String {
        let (status, _) = call(
            app,
            post_json(
                "/register",
                json!({ "name": "Ada", "email": "Ada@Example.com", "password": "hunter22" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = call(
            app,
            post_json("/login", json!({ "email": "ada@example.com", "password": "hunter22" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        body["token"].as_str().expect("token").to_string()
    }

    #[tokio::test]
    async fn health_is_ok() {
        let app = build_app(fake_state(FakeCompletion::replying("")));
        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let (status, body) = call(&app, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "status": "ok" }));
    }

    #[tokio::test]
    async fn register_twice_conflicts() {
        let app = build_app(fake_state(FakeCompletion::replying("")));
        let body = json!({ "name": "Ada", "email": "ada@example.com", "password": "hunter22" });

        let (status, first) = call(&app, post_json("/register", body.clone())).await;
        assert_eq!(status, StatusCode::CREATED);
        assert!(first["message"].is_string());
        assert!(first.get("token").is_none());

        let upper = json!({ "name": "Ada", "email": "ADA@EXAMPLE.COM", "password": "other" });
        let (status, second) = call(&app, post_json("/register", upper)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(second["error"], "Email already registered");
    }

    #[tokio::test]
    async fn register_validates_fields() {
        let app = build_app(fake_state(FakeCompletion::replying("")));

        let (status, _) = call(
            &app,
            post_json("/register", json!({ "email": "ada@example.com", "password": "x" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = call(
            &app,
            post_json(
                "/register",
                json!({ "name": "Ada", "email": "not-an-email", "password": "x" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid email");

        let req = Request::builder()
            .method("POST")
            .uri("/register")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let (status, _) = call(&app, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn login_returns_token_and_public_user() {
        let state = fake_state(FakeCompletion::replying(""));
        let keys = JwtKeys::from_ref(&state);
        let app = build_app(state);

        let token = register_and_login(&app).await;
        let claims = keys.verify(&token).expect("issued token verifies");
        assert_eq!(claims.sub, "ada@example.com");
        assert_eq!(claims.name, "Ada");

        let (_, body) = call(
            &app,
            post_json("/login", json!({ "email": "ADA@example.com", "password": "hunter22" })),
        )
        .await;
        assert_eq!(body["message"], "Login successful");
        assert_eq!(body["user"], json!({ "name": "Ada", "email": "ada@example.com" }));
    }

    #[tokio::test]
    async fn unreachable_store_is_a_server_error() {
        let users = Arc::new(FailingUserStore::default());
        let app = build_app(state_with_users(users.clone(), FakeCompletion::replying("")));

        let (status, body) = call(
            &app,
            post_json(
                "/register",
                json!({ "name": "Ada", "email": "ada@example.com", "password": "hunter22" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"]
            .as_str()
            .unwrap()
            .contains("connection refused"));
        assert_eq!(users.appends(), 0);

        let (status, body) = call(
            &app,
            post_json("/login", json!({ "email": "ada@example.com", "password": "hunter22" })),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!body["error"].as_str().unwrap().is_empty());
    }

    #[tokio::test]
    async fn login_rejects_bad_credentials() {
        let app = build_app(fake_state(FakeCompletion::replying("")));
        register_and_login(&app).await;

        let (status, body) = call(
            &app,
            post_json("/login", json!({ "email": "ada@example.com", "password": "wrong" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Invalid credentials");

        let (status, _) = call(
            &app,
            post_json("/login", json!({ "email": "bob@example.com", "password": "hunter22" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = call(&app, post_json("/login", json!({ "email": "ada@example.com" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn generate_without_token_never_calls_upstream() {
        let completion = FakeCompletion::replying("unused");
        let app = build_app(fake_state(completion.clone()));

        let (status, body) = call(&app, generate_req(None, "a red button")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Missing Authorization header");

        let (status, _) = call(&app, generate_req(Some("garbage"), "a red button")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        assert_eq!(completion.calls(), 0);
    }

    #[tokio::test]
    async fn generate_rejects_expired_token() {
        let completion = FakeCompletion::replying("unused");
        let state = fake_state(completion.clone());
        let keys = JwtKeys::from_ref(&state);
        let app = build_app(state);

        let issued = OffsetDateTime::now_utc() - Duration::days(2);
        let token = keys.sign_at("ada@example.com", "Ada", issued).unwrap();
        let (status, body) = call(&app, generate_req(Some(&token), "a red button")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Invalid or expired token");
        assert_eq!(completion.calls(), 0);
    }

    #[tokio::test]
    async fn generate_normalizes_fenced_json() {
        let completion = FakeCompletion::replying(
            "```json\n{\"html\":\"<button>Hi</button>\",\"css\":\"button{color:red}\"}\n```",
        );
        let app = build_app(fake_state(completion.clone()));
        let token = register_and_login(&app).await;

        let (status, body) = call(&app, generate_req(Some(&token), "a red button")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body["result"],
            r#"{"html":"<button>Hi</button>","css":"button{color:red}"}"#
        );
        assert_eq!(completion.calls(), 1);
    }

    #[tokio::test]
    async fn generate_falls_back_on_prose() {
        let app = build_app(fake_state(FakeCompletion::replying("just some words")));
        let token = register_and_login(&app).await;

        let (status, body) = call(&app, generate_req(Some(&token), "anything")).await;
        assert_eq!(status, StatusCode::OK);
        let result: Value = serde_json::from_str(body["result"].as_str().unwrap()).unwrap();
        assert_eq!(result["html"], "just some words");
        assert_eq!(result["css"], FALLBACK_CSS);
    }

    #[tokio::test]
    async fn generate_rejects_empty_prompt() {
        let completion = FakeCompletion::replying("unused");
        let app = build_app(fake_state(completion.clone()));
        let token = register_and_login(&app).await;

        let (status, body) = call(&app, generate_req(Some(&token), "   ")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "No prompt provided");
        assert_eq!(completion.calls(), 0);
    }

    #[tokio::test]
    async fn generate_surfaces_upstream_failure() {
        let completion = FakeCompletion::failing(429, "quota exceeded");
        let app = build_app(fake_state(completion));
        let token = register_and_login(&app).await;

        let (status, body) = call(&app, generate_req(Some(&token), "a red button")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"].as_str().unwrap().contains("quota exceeded"));
    }

    #[tokio::test]
    async fn users_are_shared_across_clones_of_state() {
        let state = fake_state(FakeCompletion::replying(""));
        let app = build_app(state.clone());
        register_and_login(&app).await;
        assert!(state.users.exists_by_email("ada@example.com").await.unwrap());
    }
}
