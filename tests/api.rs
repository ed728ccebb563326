use std::sync::Arc;

use adhd_reader::db::Database;
use adhd_reader::error::OracleError;
use adhd_reader::handler::AppState;
use adhd_reader::oracle::{SnippetOracle, StaticOracle};
use adhd_reader::reader::{Reader, UpdateDocument};
use async_trait::async_trait;
use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Method, Request, StatusCode, header};
use serde_json::{Value, json};
use tower::ServiceExt;

const CONTENT: &str = "The cat sat. Dogs bark.";

struct FailingOracle;

#[async_trait]
impl SnippetOracle for FailingOracle {
    async fn title(&self, _: &str) -> Result<String, OracleError> {
        Err(OracleError::EmptyReply)
    }

    async fn categories(&self, _: &str) -> Result<Vec<String>, OracleError> {
        Err(OracleError::EmptyReply)
    }

    async fn snippets(&self, _: &str, _: &str) -> Result<Vec<String>, OracleError> {
        Err(OracleError::Status {
            status: 503,
            message: "overloaded".to_string(),
        })
    }
}

/// Rewrites the document while the snippet request is in flight, then
/// answers with a snippet that sits at a different offset in the new text.
struct EditingOracle {
    db: Arc<Database>,
    document_id: i32,
    content: &'static str,
}

#[async_trait]
impl SnippetOracle for EditingOracle {
    async fn title(&self, _: &str) -> Result<String, OracleError> {
        Err(OracleError::EmptyReply)
    }

    async fn categories(&self, _: &str) -> Result<Vec<String>, OracleError> {
        Err(OracleError::EmptyReply)
    }

    async fn snippets(&self, _: &str, _: &str) -> Result<Vec<String>, OracleError> {
        let edit = UpdateDocument {
            content: Some(self.content.to_string()),
            ..Default::default()
        };
        Reader::new(&self.db)
            .update_document(self.document_id, edit)
            .await
            .unwrap()
            .unwrap();
        Ok(vec!["Dogs bark.".into(), "The cat sat.".into()])
    }
}

fn static_oracle() -> StaticOracle {
    StaticOracle {
        title: Some("A Story About Cats And Dogs".to_string()),
        categories: vec!["Animals".into(), "Sounds".into(), "Places".into()],
        snippets: vec![
            "Dogs bark.".into(),
            "The cat sat.".into(),
            "cat".into(),
            "Birds sing.".into(),
        ],
    }
}

async fn send(app: &Router, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut req = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let req = match body {
        Some(body) => req
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => req.body(Body::empty()).unwrap(),
    };

    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

async fn sign_up(app: &Router, email: &str) -> String {
    let (status, _) = send(
        app,
        Method::POST,
        "/api/auth/register",
        None,
        Some(json!({"email": email, "password": "hunter22", "name": "Reader"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(
        app,
        Method::POST,
        "/api/auth/login",
        None,
        Some(json!({"email": email, "password": "hunter22"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body["data"]["token"].as_str().unwrap().to_string()
}

async fn setup() -> (Arc<Database>, Router) {
    let db = Arc::new(Database::open(":memory:").await.unwrap());
    let app = adhd_reader::app(AppState::new(db.clone(), Arc::new(static_oracle()), 1));
    (db, app)
}

#[tokio::test]
async fn test_healthchecks() {
    let (_, app) = setup().await;

    let (status, body) = send(&app, Method::GET, "/", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], "ok");

    let (status, body) = send(&app, Method::GET, "/ping", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], "pong");
}

#[tokio::test]
async fn test_auth_flow() {
    let (_, app) = setup().await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/auth/register",
        None,
        Some(json!({"email": "ada@example.com", "password": "hunter22"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "All fields are required");

    let token = sign_up(&app, "ada@example.com").await;

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/auth/register",
        None,
        Some(json!({"email": "ada@example.com", "password": "x", "name": "Again"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/auth/login",
        None,
        Some(json!({"email": "ada@example.com", "password": "wrong"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].is_string());

    let (status, body) = send(&app, Method::GET, "/api/auth/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["email"], "ada@example.com");
    assert!(body["data"].get("password_hash").is_none());

    let (status, _) = send(&app, Method::GET, "/api/documents", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, Method::POST, "/api/auth/logout", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&app, Method::GET, "/api/auth/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_login_sets_http_only_cookie() {
    let (_, app) = setup().await;
    sign_up(&app, "ada@example.com").await;

    let req = Request::builder()
        .method(Method::POST)
        .uri("/api/auth/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({"email": "ada@example.com", "password": "hunter22"}).to_string(),
        ))
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    let cookie = resp.headers()[header::SET_COOKIE].to_str().unwrap().to_string();
    assert!(cookie.starts_with("token="));
    assert!(cookie.contains("HttpOnly"));

    // the cookie alone authenticates
    let token_pair = cookie.split(';').next().unwrap().to_string();
    let req = Request::builder()
        .uri("/api/auth/me")
        .header(header::COOKIE, token_pair)
        .body(Body::empty())
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_generate_and_render_highlights() {
    let (db, app) = setup().await;
    let token = sign_up(&app, "ada@example.com").await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/documents",
        Some(&token),
        Some(json!({"content": CONTENT, "auto_generate_categories": true})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let doc = &body["data"];
    assert_eq!(doc["title"], "A Story About Cats");
    let categories = doc["categories"].as_array().unwrap();
    assert_eq!(categories.len(), 3);
    assert_eq!(categories[0]["name"], "Animals");
    assert_eq!(categories[0]["color"], "#FDE68A");

    let doc_id = doc["id"].as_i64().unwrap();
    let animals = categories[0]["id"].as_i64().unwrap();
    let sounds = categories[1]["id"].as_i64().unwrap();

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/api/highlights/generate/{animals}"),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let report = &body["data"]["report"];
    assert_eq!(report["requested"], 4);
    assert_eq!(report["accepted"], 2);
    assert_eq!(report["unmatched"], 1);
    assert_eq!(report["overlapping"], 1);
    assert!(report.get("message").is_none());

    let highlights = body["data"]["highlights"].as_array().unwrap();
    assert_eq!(highlights[0]["start_index"], 0);
    assert_eq!(highlights[0]["end_index"], 12);
    assert_eq!(highlights[1]["text"], "Dogs bark.");

    let (status, body) = send(&app, Method::GET, &format!("/api/highlights/{animals}"), Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["highlights"].as_array().unwrap().len(), 2);

    let (status, body) = send(
        &app,
        Method::GET,
        &format!("/api/documents/{doc_id}/render?hidden={sounds}"),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let segments = body["data"]["segments"].as_array().unwrap();
    let texts: Vec<&str> = segments.iter().map(|s| s["text"].as_str().unwrap()).collect();
    assert_eq!(texts, vec!["The cat sat.", " ", "Dogs bark."]);
    assert_eq!(segments[0]["marks"][0]["color"], "#FDE68A");
    assert!(segments[1]["marks"].as_array().unwrap().is_empty());

    let (status, body) = send(
        &app,
        Method::GET,
        &format!("/api/documents/{doc_id}/render?hidden={animals}"),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["segments"].as_array().unwrap().len(), 1);

    // a failing oracle leaves the stored highlights alone
    let failing = adhd_reader::app(AppState::new(db.clone(), Arc::new(FailingOracle), 1));
    let (status, body) = send(
        &failing,
        Method::POST,
        &format!("/api/highlights/generate/{animals}"),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body["error"].is_string());

    let (_, body) = send(&app, Method::GET, &format!("/api/highlights/{animals}"), Some(&token), None).await;
    assert_eq!(body["data"]["highlights"].as_array().unwrap().len(), 2);

    // editing the content drops highlights whose offsets no longer apply
    let (status, _) = send(
        &app,
        Method::PUT,
        &format!("/api/documents/{doc_id}"),
        Some(&token),
        Some(json!({"content": "A cat sat. Dogs bark."})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = send(&app, Method::GET, &format!("/api/highlights/{animals}"), Some(&token), None).await;
    assert!(body["data"]["highlights"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_generation_with_no_matches_reports_why() {
    let db = Arc::new(Database::open(":memory:").await.unwrap());
    let oracle = StaticOracle {
        snippets: vec!["Birds sing.".into()],
        ..Default::default()
    };
    let app = adhd_reader::app(AppState::new(db, Arc::new(oracle), 1));
    let token = sign_up(&app, "ada@example.com").await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/documents",
        Some(&token),
        Some(json!({"content": CONTENT, "categories": [{"name": "Pets"}]})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    // no oracle title: the default applies
    assert_eq!(body["data"]["title"], "Untitled Document");
    let category = body["data"]["categories"][0]["id"].as_i64().unwrap();

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/api/highlights/generate/{category}"),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["report"]["accepted"], 0);
    assert!(
        body["data"]["report"]["message"]
            .as_str()
            .unwrap()
            .contains("matched")
    );
}

#[tokio::test]
async fn test_generation_resolves_against_content_edited_mid_request() {
    let (db, app) = setup().await;
    let token = sign_up(&app, "ada@example.com").await;

    let (_, body) = send(
        &app,
        Method::POST,
        "/api/documents",
        Some(&token),
        Some(json!({"content": CONTENT, "title": "Pets", "categories": [{"name": "Animals"}]})),
    )
    .await;
    let doc_id = body["data"]["id"].as_i64().unwrap();
    let category = body["data"]["categories"][0]["id"].as_i64().unwrap();

    let edited = "Dogs bark. A cat sat.";
    let oracle = EditingOracle {
        db: db.clone(),
        document_id: doc_id as i32,
        content: edited,
    };
    let editing_app = adhd_reader::app(AppState::new(db.clone(), Arc::new(oracle), 1));

    let (status, body) = send(
        &editing_app,
        Method::POST,
        &format!("/api/highlights/generate/{category}"),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["report"]["requested"], 2);
    assert_eq!(body["data"]["report"]["accepted"], 1);
    assert_eq!(body["data"]["report"]["unmatched"], 1);

    let (_, body) = send(&app, Method::GET, &format!("/api/highlights/{category}"), Some(&token), None).await;
    let highlights = body["data"]["highlights"].as_array().unwrap().clone();
    assert_eq!(highlights.len(), 1);
    assert_eq!(highlights[0]["start_index"], 0);
    assert_eq!(highlights[0]["end_index"], 10);
    for h in &highlights {
        let start = h["start_index"].as_u64().unwrap() as usize;
        let end = h["end_index"].as_u64().unwrap() as usize;
        assert_eq!(adhd_reader::resolver::slice_chars(edited, start, end), h["text"].as_str());
    }

    let (_, body) = send(&app, Method::GET, &format!("/api/documents/{doc_id}/render"), Some(&token), None).await;
    assert!(body["data"]["segments"].as_array().unwrap().iter().any(|s| !s["marks"].as_array().unwrap().is_empty()));
}

#[tokio::test]
async fn test_update_document_validates_like_create() {
    let (_, app) = setup().await;
    let token = sign_up(&app, "ada@example.com").await;

    let (_, body) = send(
        &app,
        Method::POST,
        "/api/documents",
        Some(&token),
        Some(json!({"content": CONTENT, "title": "Pets"})),
    )
    .await;
    let doc_id = body["data"]["id"].as_i64().unwrap();
    let uri = format!("/api/documents/{doc_id}");

    let (status, body) = send(&app, Method::PUT, &uri, Some(&token), Some(json!({"content": "   "}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Content is required");

    let (_, body) = send(&app, Method::GET, &uri, Some(&token), None).await;
    assert_eq!(body["data"]["content"], CONTENT);

    let (status, body) = send(&app, Method::PUT, &uri, Some(&token), Some(json!({"title": "  Trimmed  "}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["title"], "Trimmed");
    assert_eq!(body["data"]["content"], CONTENT);
}

#[tokio::test]
async fn test_documents_are_private() {
    let (_, app) = setup().await;
    let owner = sign_up(&app, "ada@example.com").await;
    let other = sign_up(&app, "bob@example.com").await;

    let (_, body) = send(
        &app,
        Method::POST,
        "/api/documents",
        Some(&owner),
        Some(json!({"content": CONTENT, "title": "Pets"})),
    )
    .await;
    let doc_id = body["data"]["id"].as_i64().unwrap();
    assert_eq!(body["data"]["title"], "Pets");

    let (status, _) = send(&app, Method::GET, &format!("/api/documents/{doc_id}"), Some(&other), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, Method::DELETE, &format!("/api/documents/{doc_id}"), Some(&other), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, body) = send(&app, Method::GET, "/api/documents", Some(&other), None).await;
    assert!(body["data"].as_array().unwrap().is_empty());

    let (status, _) = send(&app, Method::DELETE, &format!("/api/documents/{doc_id}"), Some(&owner), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app, Method::DELETE, &format!("/api/documents/{doc_id}"), Some(&owner), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_category_management() {
    let (_, app) = setup().await;
    let token = sign_up(&app, "ada@example.com").await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/documents",
        Some(&token),
        Some(json!({"content": CONTENT, "title": "Pets", "categories": [{"name": "Animals"}, {"name": ""}]})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let doc_id = body["data"]["id"].as_i64().unwrap();
    assert_eq!(body["data"]["categories"][1]["name"], "Untitled Category");
    assert_eq!(body["data"]["categories"][1]["color"], "#A7F3D0");

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/api/categories/{doc_id}"),
        Some(&token),
        Some(json!({"name": "Animals"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["name"], "Animals 2");
    assert_eq!(body["data"]["color"], "#BFDBFE");
    let third = body["data"]["id"].as_i64().unwrap();

    let (status, body) = send(
        &app,
        Method::PUT,
        &format!("/api/categories/{third}"),
        Some(&token),
        Some(json!({"color": "red"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("#FDE68A"));

    let (status, _) = send(
        &app,
        Method::PUT,
        &format!("/api/categories/{third}"),
        Some(&token),
        Some(json!({"name": "Animals"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = send(
        &app,
        Method::PUT,
        &format!("/api/categories/{third}"),
        Some(&token),
        Some(json!({"name": "Noises", "color": "first"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], "Noises");
    assert_eq!(body["data"]["color"], "#FDE68A");

    let (status, _) = send(&app, Method::DELETE, &format!("/api/categories/{third}"), Some(&token), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, body) = send(&app, Method::GET, &format!("/api/categories/{doc_id}"), Some(&token), None).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_sentences() {
    let (_, app) = setup().await;
    let token = sign_up(&app, "ada@example.com").await;

    let (_, body) = send(
        &app,
        Method::POST,
        "/api/documents",
        Some(&token),
        Some(json!({"content": CONTENT, "title": "Pets"})),
    )
    .await;
    let doc_id = body["data"]["id"].as_i64().unwrap();

    let (status, body) = send(&app, Method::POST, &format!("/api/sentences/{doc_id}"), Some(&token), None).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"].as_array().unwrap().len(), 2);

    let (status, body) = send(&app, Method::GET, &format!("/api/sentences/{doc_id}"), Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["text"], "The cat sat.");
    assert_eq!(body["data"][1]["idx"], 1);
}
