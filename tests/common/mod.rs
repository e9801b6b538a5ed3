// tests/common/mod.rs

#![allow(dead_code)]

use std::sync::Arc;

use school_portal::{
    config::Config,
    routes,
    services::accounts::seed_admin,
    state::{AppState, SharedStore},
    store::MemoryStore,
};
use serde_json::{Value, json};

pub const ADMIN_USERNAME: &str = "principal";
pub const ADMIN_PASSWORD: &str = "correct-horse";

pub struct TestApp {
    pub address: String,
    pub client: reqwest::Client,
    pub store: Arc<MemoryStore>,
}

/// Spawns the app on a random port over a fresh in-memory store.
pub async fn spawn_app() -> TestApp {
    let config = Config::from_lookup(|key: &str| {
        let value = match key {
            "STORE_BACKEND" => "memory",
            "JWT_SECRET" => "test_secret_for_integration_tests",
            "JWT_EXPIRATION" => "600",
            "RUST_LOG" => "error",
            "ADMIN_USERNAME" => ADMIN_USERNAME,
            "ADMIN_PASSWORD" => ADMIN_PASSWORD,
            _ => return None,
        };
        Some(value.to_string())
    })
    .expect("Failed to build test config");

    let store = Arc::new(MemoryStore::new());
    let shared: SharedStore = store.clone();
    seed_admin(shared.as_ref(), &config)
        .await
        .expect("Failed to seed admin");

    let app = routes::create_router(AppState {
        store: shared,
        config,
    });

    // Bind to port 0 to get a random available port
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestApp {
        address: format!("http://127.0.0.1:{}", port),
        client: reqwest::Client::new(),
        store,
    }
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    pub async fn admin_token(&self) -> String {
        let body: Value = self
            .client
            .post(self.url("/api/auth/login"))
            .json(&json!({ "username": ADMIN_USERNAME, "password": ADMIN_PASSWORD }))
            .send()
            .await
            .expect("Login failed")
            .json()
            .await
            .expect("Failed to parse login json");

        body["token"].as_str().expect("Token not found").to_string()
    }

    pub async fn admin_post(&self, token: &str, path: &str, body: Value) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn admin_put(&self, token: &str, path: &str, body: Value) -> reqwest::Response {
        self.client
            .put(self.url(path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn admin_get(&self, token: &str, path: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn admin_delete(&self, token: &str, path: &str) -> reqwest::Response {
        self.client
            .delete(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn create_student(&self, token: &str, student_id: &str, class: &str) {
        let response = self
            .admin_post(
                token,
                "/api/admin/students",
                json!({
                    "studentId": student_id,
                    "fullName": format!("Student {}", student_id),
                    "class": class,
                }),
            )
            .await;
        assert_eq!(response.status().as_u16(), 201);
    }

    /// Issues one card and returns its JSON (plaintext PIN included).
    pub async fn issue_card(&self, token: &str, usage_limit: i32) -> Value {
        let response = self
            .admin_post(
                token,
                "/api/admin/cards",
                json!({ "count": 1, "usageLimit": usage_limit }),
            )
            .await;
        assert_eq!(response.status().as_u16(), 201);
        let cards: Vec<Value> = response.json().await.unwrap();
        cards.into_iter().next().expect("No card issued")
    }

    pub async fn check(&self, pin: &str, student_id: &str) -> reqwest::Response {
        self.client
            .post(self.url("/api/results/check"))
            .json(&json!({ "pin": pin, "studentId": student_id }))
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn create_result(&self, token: &str, student_id: &str, class: &str, average: f64) -> Value {
        let response = self
            .admin_post(
                token,
                "/api/admin/results",
                json!({
                    "studentId": student_id,
                    "session": "2024/2025",
                    "term": "First Term",
                    "class": class,
                    "subjects": [
                        { "subject": "Mathematics", "score": average, "grade": "B", "remark": "Good" }
                    ],
                    "totalScore": average,
                    "average": average,
                }),
            )
            .await;
        assert_eq!(response.status().as_u16(), 201);
        response.json().await.unwrap()
    }
}
