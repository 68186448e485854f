use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use reqwest::multipart::Form;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

use taskboard::config::{Config, RegistrationMode, StorageBackend};
use taskboard::storage::{ImageStorage, MemoryStorage, StorageError};

pub const PASSWORD: &str = "password123";

/// In-memory image storage whose writes can be switched to fail.
#[derive(Default)]
pub struct TestStorage {
    inner: MemoryStorage,
    failing: AtomicBool,
}

impl TestStorage {
    pub fn fail_writes(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.contains(key)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }
}

#[async_trait]
impl ImageStorage for TestStorage {
    async fn put(&self, key: &str, bytes: Bytes) -> Result<(), StorageError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StorageError::from(format!("write of {key} refused")));
        }
        self.inner.put(key, bytes).await
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.inner.delete(key).await
    }
}

/// A running test server instance with a dedicated test database.
pub struct TestApp {
    pub addr: SocketAddr,
    pub pool: PgPool,
    pub client: Client,
    pub db_name: String,
    pub storage: Arc<TestStorage>,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn register(&self, email: &str, password: &str, name: &str) -> (Value, StatusCode) {
        let resp = self
            .client
            .post(self.url("/api/v1/auth/register"))
            .json(&json!({ "email": email, "password": password, "name": name }))
            .send()
            .await
            .expect("register request failed");
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(json!(null));
        (body, status)
    }

    pub async fn login(&self, email: &str, password: &str) -> (Value, StatusCode) {
        let resp = self
            .client
            .post(self.url("/api/v1/auth/login"))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .expect("login request failed");
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(json!(null));
        (body, status)
    }

    /// Register a user and return their access token.
    pub async fn user(&self, email: &str, name: &str) -> String {
        let (body, status) = self.register(email, PASSWORD, name).await;
        assert_eq!(status, StatusCode::OK, "register failed: {body}");
        body["access_token"].as_str().unwrap().to_string()
    }

    /// Create a project as `token` and return its id.
    pub async fn create_project(&self, token: &str, name: &str) -> Uuid {
        let (body, status) = self
            .post_auth(
                "/api/v1/projects",
                token,
                &json!({ "name": name, "status": "in_progress", "description": "Test project" }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "create project failed: {body}");
        let redirect = body["redirect"].as_str().unwrap();
        redirect
            .strip_prefix("/projects/")
            .and_then(|id| Uuid::parse_str(id).ok())
            .expect("project redirect carries the id")
    }

    /// Invite `email` with `role` and accept as `invitee_token`.
    pub async fn add_member(
        &self,
        manager_token: &str,
        project_id: Uuid,
        email: &str,
        role: &str,
        invitee_token: &str,
    ) {
        let (body, status) = self
            .post_auth(
                &format!("/api/v1/projects/{project_id}/invitations"),
                manager_token,
                &json!({ "email": email, "role": role }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "invite failed: {body}");

        let (body, status) = self
            .post_auth(
                &format!("/api/v1/projects/{project_id}/invitations/accept"),
                invitee_token,
                &json!({}),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "accept failed: {body}");
    }

    pub async fn user_id(&self, email: &str) -> Uuid {
        sqlx::query_scalar("SELECT id FROM users WHERE email = $1")
            .bind(email)
            .fetch_one(&self.pool)
            .await
            .expect("user exists")
    }

    /// Id of the project's status named `name`.
    pub async fn status_id(&self, project_id: Uuid, name: &str) -> Uuid {
        sqlx::query_scalar("SELECT id FROM task_statuses WHERE project_id = $1 AND name = $2")
            .bind(project_id)
            .bind(name)
            .fetch_one(&self.pool)
            .await
            .expect("status exists")
    }

    pub async fn task_id(&self, name: &str) -> Uuid {
        sqlx::query_scalar("SELECT id FROM tasks WHERE name = $1")
            .bind(name)
            .fetch_one(&self.pool)
            .await
            .expect("task exists")
    }

    pub async fn task_image(&self, task_id: Uuid) -> Option<String> {
        sqlx::query_scalar("SELECT image_path FROM tasks WHERE id = $1")
            .bind(task_id)
            .fetch_one(&self.pool)
            .await
            .expect("task exists")
    }

    pub async fn task_assignee(&self, task_id: Uuid) -> Option<Uuid> {
        sqlx::query_scalar("SELECT assigned_user_id FROM tasks WHERE id = $1")
            .bind(task_id)
            .fetch_one(&self.pool)
            .await
            .expect("task exists")
    }

    pub async fn global_label_id(&self, name: &str) -> Uuid {
        sqlx::query_scalar("SELECT id FROM task_labels WHERE project_id IS NULL AND name = $1")
            .bind(name)
            .fetch_one(&self.pool)
            .await
            .expect("global label exists")
    }

    /// Create a task through the API and return its id.
    pub async fn create_task(&self, token: &str, project_id: Uuid, name: &str, extra: Value) -> Uuid {
        let mut body = json!({
            "project_id": project_id,
            "status_id": self.status_id(project_id, "To Do").await,
            "name": name,
        });
        if let (Some(target), Value::Object(fields)) = (body.as_object_mut(), extra) {
            target.extend(fields);
        }
        let (resp, status) = self.post_auth("/api/v1/tasks", token, &body).await;
        assert_eq!(status, StatusCode::OK, "create task failed: {resp}");
        assert_eq!(resp["message"], "Task created successfully.");
        self.task_id(name).await
    }

    /// Make an authenticated GET request.
    pub async fn get_auth(&self, path: &str, token: &str) -> (Value, StatusCode) {
        let resp = self
            .client
            .get(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .expect("get request failed");
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(json!(null));
        (body, status)
    }

    /// Make an authenticated POST request with JSON body.
    pub async fn post_auth(&self, path: &str, token: &str, body: &Value) -> (Value, StatusCode) {
        let resp = self
            .client
            .post(self.url(path))
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .expect("post request failed");
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(json!(null));
        (body, status)
    }

    /// Make an authenticated multipart POST request.
    pub async fn post_multipart(&self, path: &str, token: &str, form: Form) -> (Value, StatusCode) {
        let resp = self
            .client
            .post(self.url(path))
            .bearer_auth(token)
            .multipart(form)
            .send()
            .await
            .expect("multipart request failed");
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(json!(null));
        (body, status)
    }

    /// Make an authenticated multipart PUT request.
    pub async fn put_multipart(&self, path: &str, token: &str, form: Form) -> (Value, StatusCode) {
        let resp = self
            .client
            .put(self.url(path))
            .bearer_auth(token)
            .multipart(form)
            .send()
            .await
            .expect("multipart request failed");
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(json!(null));
        (body, status)
    }

    /// Make an authenticated PUT request with JSON body.
    pub async fn put_auth(&self, path: &str, token: &str, body: &Value) -> (Value, StatusCode) {
        let resp = self
            .client
            .put(self.url(path))
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .expect("put request failed");
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(json!(null));
        (body, status)
    }

    /// Make an authenticated DELETE request.
    pub async fn delete_auth(&self, path: &str, token: &str) -> (Value, StatusCode) {
        let resp = self
            .client
            .delete(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .expect("delete request failed");
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(json!(null));
        (body, status)
    }
}

/// Spawn a test app with open registration and a fresh temporary database.
pub async fn spawn_app() -> TestApp {
    spawn_app_with(RegistrationMode::Open).await
}

pub async fn spawn_app_with(registration: RegistrationMode) -> TestApp {
    let _ = dotenvy::dotenv();

    let base_url = std::env::var("DATABASE_URL")
        .expect("DATABASE_URL must be set for tests");

    let db_name = format!("taskboard_test_{}", Uuid::now_v7().to_string().replace('-', ""));

    // Connect to default postgres DB to create test DB
    let admin_url = base_url
        .rsplit_once('/')
        .map(|(base, _)| format!("{base}/postgres"))
        .unwrap_or_else(|| base_url.clone());

    let admin_pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&admin_url)
        .await
        .expect("Failed to connect to postgres for test DB creation");

    sqlx::query(&format!("CREATE DATABASE \"{db_name}\""))
        .execute(&admin_pool)
        .await
        .expect("Failed to create test database");

    admin_pool.close().await;

    let test_url = base_url
        .rsplit_once('/')
        .map(|(base, _)| format!("{base}/{db_name}"))
        .unwrap_or_else(|| base_url.clone());

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&test_url)
        .await
        .expect("Failed to connect to test database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations on test database");

    let config = Config {
        database_url: test_url,
        jwt_secret: "test-jwt-secret-that-is-long-enough".to_string(),
        host: "127.0.0.1".parse().unwrap(),
        port: 0, // unused, we bind to random port
        base_url: "http://localhost:0".to_string(),
        registration,
        storage: StorageBackend::Memory,
        max_upload_size: 8 * 1024 * 1024,
        log_level: "warn".to_string(),
    };

    let storage = Arc::new(TestStorage::default());
    let (app, _state) = taskboard::build_app_with_storage(pool.clone(), config, storage.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind to random port");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("Server failed");
    });

    let client = Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap();

    TestApp {
        addr,
        pool,
        client,
        db_name,
        storage,
    }
}

/// Drop the test database after tests complete.
pub async fn cleanup(app: TestApp) {
    let db_name = app.db_name.clone();
    app.pool.close().await;

    let base_url = std::env::var("DATABASE_URL")
        .expect("DATABASE_URL must be set for tests");
    let admin_url = base_url
        .rsplit_once('/')
        .map(|(base, _)| format!("{base}/postgres"))
        .unwrap_or_else(|| base_url.clone());

    let admin_pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&admin_url)
        .await
        .expect("Failed to connect for cleanup");

    let _ = sqlx::query(&format!("DROP DATABASE IF EXISTS \"{db_name}\" WITH (FORCE)"))
        .execute(&admin_pool)
        .await;

    admin_pool.close().await;
}
