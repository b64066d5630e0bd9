//! Shared helpers for API integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use loreweave_api::verification::{DEFAULT_CODE_TTL, Mailer};
use loreweave_api::{AppStateInner, router};
use loreweave_db::Database;
use loreweave_gateway::{Dispatcher, Notifier};

pub const JWT_SECRET: &str = "integration-test-secret";

/// Captures verification codes instead of mailing them.
#[derive(Default)]
pub struct RecordingMailer {
    codes: Mutex<HashMap<String, String>>,
}

impl RecordingMailer {
    pub fn code_for(&self, email: &str) -> Option<String> {
        self.codes.lock().unwrap().get(email).cloned()
    }
}

impl Mailer for RecordingMailer {
    fn send_verification_code(&self, email: &str, code: &str) -> anyhow::Result<()> {
        self.codes
            .lock()
            .unwrap()
            .insert(email.to_string(), code.to_string());
        Ok(())
    }
}

pub struct TestApp {
    pub router: Router,
    pub db: Arc<Database>,
    pub dispatcher: Dispatcher,
    pub mailer: Arc<RecordingMailer>,
}

/// A signed-in user.
pub struct Session {
    pub user_id: String,
    pub username: String,
    pub token: String,
}

pub fn build_test_app() -> TestApp {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let dispatcher = Dispatcher::new();
    let notifier = Notifier::new(db.clone(), dispatcher.clone());
    let mailer = Arc::new(RecordingMailer::default());
    let state = AppStateInner::new(
        db.clone(),
        JWT_SECRET.to_string(),
        notifier,
        mailer.clone(),
        DEFAULT_CODE_TTL,
    );

    TestApp {
        router: router(state),
        db,
        dispatcher,
        mailer,
    }
}

impl TestApp {
    /// Send a request and return the status with the JSON body (`Null` when
    /// the body is empty).
    pub async fn request(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let (status, _, json) = self.request_full(method, uri, token, body).await;
        (status, json)
    }

    pub async fn request_full(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, axum::http::HeaderMap, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&body).unwrap()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, headers, json)
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.request("GET", uri, token, None).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.request("POST", uri, token, Some(body)).await
    }

    /// Register, verify and log in.
    pub async fn sign_up(&self, username: &str) -> Session {
        let email = format!("{}@loreweave.test", username);
        let (status, body) = self
            .post(
                "/auth/register",
                None,
                json!({ "username": username, "email": email, "password": "hunter2hunter2" }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "register failed: {}", body);

        let code = self.mailer.code_for(&email).expect("no code recorded");
        let (status, _) = self
            .post("/auth/verify-email", None, json!({ "email": email, "code": code }))
            .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, body) = self
            .post(
                "/auth/login",
                None,
                json!({ "username": username, "password": "hunter2hunter2" }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "login failed: {}", body);

        Session {
            user_id: body["user_id"].as_str().unwrap().to_string(),
            username: username.to_string(),
            token: body["token"].as_str().unwrap().to_string(),
        }
    }

    /// Sign up and create a character named after the user.
    pub async fn player(&self, username: &str) -> Session {
        let session = self.sign_up(username).await;
        let (status, body) = self
            .post(
                "/characters",
                Some(&session.token),
                json!({ "name": format!("{} the Bold", username) }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "character failed: {}", body);
        session
    }

    /// Create a story as `creator` and return its id.
    pub async fn story(&self, creator: &Session, title: &str) -> String {
        let (status, body) = self
            .post("/stories", Some(&creator.token), json!({ "title": title }))
            .await;
        assert_eq!(status, StatusCode::CREATED, "story failed: {}", body);
        body["id"].as_str().unwrap().to_string()
    }

    pub async fn add_part(&self, author: &Session, story_id: &str, content: &str) -> (StatusCode, Value) {
        self.post(
            &format!("/stories/{}/parts", story_id),
            Some(&author.token),
            json!({ "content": content }),
        )
        .await
    }
}
