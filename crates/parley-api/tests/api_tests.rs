use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use parley_api::routes::router;
use parley_api::state::{AppState, AppStateInner};
use parley_api::storage::BlobStore;
use parley_db::Database;
use parley_gateway::dispatcher::Dispatcher;

const PUBLIC_URL: &str = "http://chat.test";
const MAX_UPLOAD: usize = 1024;

struct TestApp {
    router: Router,
    storage: tempfile::TempDir,
}

async fn app() -> TestApp {
    let storage = tempfile::tempdir().unwrap();
    let state: AppState = Arc::new(AppStateInner {
        db: Arc::new(Database::open_in_memory().unwrap()),
        dispatcher: Dispatcher::new(),
        storage: BlobStore::new(storage.path().to_path_buf()).await.unwrap(),
        jwt_secret: "integration-test-secret".into(),
        public_url: PUBLIC_URL.into(),
        max_upload_bytes: MAX_UPLOAD,
        upload_url_ttl_secs: 60,
    });
    TestApp {
        router: router(state),
        storage,
    }
}

impl TestApp {
    fn stored_blobs(&self) -> usize {
        std::fs::read_dir(self.storage.path()).unwrap().count()
    }

    async fn send(&self, req: Request<Body>) -> (StatusCode, Vec<u8>) {
        let resp = self.router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        (status, bytes.to_vec())
    }

    async fn call(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let req = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let (status, bytes) = self.send(req).await;
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    /// Register a user and return their bearer token.
    async fn register(&self, name: &str) -> String {
        let (status, body) = self
            .call(
                Method::POST,
                "/auth/register",
                None,
                Some(json!({
                    "name": name,
                    "email": format!("{name}@example.com"),
                    "password": "correct horse battery",
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        body["token"].as_str().unwrap().to_string()
    }
}

#[tokio::test]
async fn test_protected_routes_need_token() {
    let app = app().await;

    let (status, body) = app.call(Method::GET, "/workspaces", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Unauthorized");

    let (status, _) = app
        .call(Method::GET, "/workspaces", Some("not-a-jwt"), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_login_after_register() {
    let app = app().await;
    app.register("ada").await;

    let (status, body) = app
        .call(
            Method::POST,
            "/auth/login",
            None,
            Some(json!({ "email": "ada@example.com", "password": "correct horse battery" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "ada");

    let (status, _) = app
        .call(
            Method::POST,
            "/auth/login",
            None,
            Some(json!({ "email": "ada@example.com", "password": "wrong password" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let token = body["token"].as_str().unwrap();
    let (status, me) = app.call(Method::GET, "/users/me", Some(token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["email"], "ada@example.com");
    assert!(me.get("password").is_none());
}

#[tokio::test]
async fn test_workspace_message_reaction_flow() {
    let app = app().await;
    let owner = app.register("owner").await;
    let guest = app.register("guest").await;

    let (status, created) = app
        .call(Method::POST, "/workspaces", Some(&owner), Some(json!({ "name": "Acme" })))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let ws = created["id"].as_str().unwrap().to_string();

    let (_, workspace) = app
        .call(Method::GET, &format!("/workspaces/{ws}"), Some(&owner), None)
        .await;
    let code = workspace["join_code"].as_str().unwrap().to_string();

    let (status, _) = app
        .call(
            Method::POST,
            &format!("/workspaces/{ws}/join"),
            Some(&guest),
            Some(json!({ "join_code": code })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, channels) = app
        .call(Method::GET, &format!("/workspaces/{ws}/channels"), Some(&guest), None)
        .await;
    assert_eq!(channels[0]["name"], "general");
    let channel = channels[0]["id"].as_str().unwrap().to_string();

    let (status, posted) = app
        .call(
            Method::POST,
            &format!("/workspaces/{ws}/messages"),
            Some(&guest),
            Some(json!({ "body": "hello team", "channel_id": channel })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let message = posted["id"].as_str().unwrap().to_string();

    let (status, _) = app
        .call(
            Method::POST,
            &format!("/messages/{message}/reactions"),
            Some(&owner),
            Some(json!({ "value": "👍" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, page) = app
        .call(
            Method::GET,
            &format!("/messages?channel_id={channel}&num_items=10"),
            Some(&owner),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["is_done"], true);
    assert!(page["continue_cursor"].is_null());

    let item = &page["page"][0];
    assert_eq!(item["body"], "hello team");
    assert_eq!(item["user"]["name"], "guest");
    assert_eq!(item["reactions"][0]["value"], "👍");
    assert_eq!(item["reactions"][0]["count"], 1);
    assert_eq!(item["thread_count"], 0);
    assert!(item["thread_image"].is_null());
    assert_eq!(item["thread_timestamp"], 0);

    let (status, body) = app
        .call(
            Method::DELETE,
            &format!("/messages/{message}"),
            Some(&owner),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Unauthorized");

    let (status, body) = app
        .call(Method::GET, "/messages?cursor=%25%25", Some(&owner), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_upload_and_download() {
    let app = app().await;
    let token = app.register("uploader").await;

    let (status, body) = app
        .call(Method::POST, "/storage/upload-url", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let upload_url = body["upload_url"].as_str().unwrap().to_string();
    let path = upload_url.strip_prefix(PUBLIC_URL).unwrap().to_string();

    let upload = |bytes: &'static [u8]| {
        Request::builder()
            .method(Method::POST)
            .uri(path.clone())
            .header(header::CONTENT_TYPE, "text/plain")
            .body(Body::from(bytes))
            .unwrap()
    };

    let (status, _) = app.send(upload(b"")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, bytes) = app.send(upload(b"hello storage")).await;
    assert_eq!(status, StatusCode::OK);
    let stored: Value = serde_json::from_slice(&bytes).unwrap();
    let storage_id = stored["storage_id"].as_str().unwrap().to_string();

    // Tickets are single use.
    let (status, _) = app.send(upload(b"again")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let resp = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/storage/{storage_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[header::CONTENT_TYPE], "text/plain");
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"hello storage");

    let (status, url) = app
        .call(Method::GET, &format!("/storage/{storage_id}/url"), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(url, json!(format!("{PUBLIC_URL}/storage/{storage_id}")));

    let (status, _) = app
        .call(Method::GET, &format!("/storage/{}", uuid::Uuid::new_v4()), None, None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_upload_over_limit_rejected() {
    let app = app().await;
    let token = app.register("uploader").await;

    let (_, body) = app
        .call(Method::POST, "/storage/upload-url", Some(&token), None)
        .await;
    let upload_url = body["upload_url"].as_str().unwrap();
    let path = upload_url.strip_prefix(PUBLIC_URL).unwrap();

    let req = Request::builder()
        .method(Method::POST)
        .uri(path)
        .body(Body::from(vec![0u8; MAX_UPLOAD + 1]))
        .unwrap();
    let (status, _) = app.send(req).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_rejected_upload_leaves_no_blob() {
    let app = app().await;
    let token = app.register("uploader").await;

    let req = Request::builder()
        .method(Method::POST)
        .uri("/storage/upload/not-a-ticket")
        .body(Body::from("orphan"))
        .unwrap();
    let (status, _) = app.send(req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(app.stored_blobs(), 0);

    let (_, body) = app
        .call(Method::POST, "/storage/upload-url", Some(&token), None)
        .await;
    let upload_url = body["upload_url"].as_str().unwrap();
    let path = upload_url.strip_prefix(PUBLIC_URL).unwrap();

    let req = Request::builder()
        .method(Method::POST)
        .uri(path)
        .body(Body::from("kept"))
        .unwrap();
    let (status, _) = app.send(req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.stored_blobs(), 1);
}
