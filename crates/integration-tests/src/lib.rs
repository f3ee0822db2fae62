//! Integration test fixtures for the courier portal.
//!
//! Tests drive the real router with `tower::ServiceExt::oneshot` over the
//! in-memory store, in-memory object storage and an in-memory session
//! store. Signing in skips the OAuth round trip: [`TestApp::sign_in`] writes
//! the identity straight into a session record and returns its cookie.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p courier-portal-integration-tests
//! ```

#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
    response::Response,
};
use rust_decimal::Decimal;
use secrecy::SecretString;
use serde_json::Value;
use tower::ServiceExt;
use tower_sessions::{
    MemoryStore, SessionStore,
    cookie::time::{Duration, OffsetDateTime},
    session::{Id, Record},
};

use courier_portal::config::{IdentityProviderConfig, LogFormat, PortalConfig, StorageConfig};
use courier_portal::db::InMemoryStore;
use courier_portal::middleware::session::SESSION_COOKIE_NAME;
use courier_portal::models::{Identity, NewOrder, NewOrderItem, session_keys};
use courier_portal::routes;
use courier_portal::state::AppState;
use courier_portal::storage::MemoryObjectStorage;
use courier_portal_core::{Email, IdentityId, OrderId, OrderStatus};

/// Public base URL of the in-memory bucket.
pub const STORAGE_BASE_URL: &str = "https://files.test/public/delivery-assets";

/// Identity provider issuer used by the test config.
pub const ISSUER_URL: &str = "https://auth.test";

/// Config pointing at unreachable hosts; only URLs are ever built from it.
#[must_use]
pub fn test_config() -> PortalConfig {
    PortalConfig {
        database_url: SecretString::from("postgres://unused"),
        host: IpAddr::V4(Ipv4Addr::LOCALHOST),
        port: 0,
        base_url: "http://portal.test".to_owned(),
        identity: IdentityProviderConfig {
            issuer_url: ISSUER_URL.to_owned(),
            client_id: "portal-tests".to_owned(),
            client_secret: SecretString::from("tK9#vQ2!mZ7@pL4$"),
        },
        storage: StorageConfig {
            url: "https://files.test".to_owned(),
            bucket: "delivery-assets".to_owned(),
            service_key: SecretString::from("sR8%wE3^nB6&yU1*"),
        },
        log_format: LogFormat::Text,
        sentry_dsn: None,
        sentry_environment: None,
        sentry_sample_rate: 0.0,
        sentry_traces_sample_rate: 0.0,
    }
}

/// Build an identity-provider user.
#[must_use]
pub fn identity(id: &str, email: &str) -> Identity {
    Identity {
        id: IdentityId::new(id),
        email: Email::parse(email).unwrap(),
        given_name: Some("Test".to_owned()),
        family_name: Some("Rider".to_owned()),
        picture: None,
    }
}

/// Insert an order with two line items (quantities 1 and 2).
pub fn seed_order(store: &InMemoryStore, status: OrderStatus) -> OrderId {
    store
        .insert_order(&NewOrder {
            total_price: Decimal::new(2450, 2),
            delivery_address: serde_json::json!({
                "street": "3 Canal Walk",
                "city": "Leeds",
                "zip": "LS1 4AB"
            }),
            status,
            items: vec![
                NewOrderItem {
                    medicine_id: "med-amoxicillin-250".to_owned(),
                    medicine_name: Some("Amoxicillin 250mg".to_owned()),
                    quantity: 1,
                    price: Decimal::new(1250, 2),
                },
                NewOrderItem {
                    medicine_id: "med-saline-spray".to_owned(),
                    medicine_name: None,
                    quantity: 2,
                    price: Decimal::new(600, 2),
                },
            ],
        })
        .unwrap()
}

/// A parsed response.
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: axum::http::HeaderMap,
    pub body: Value,
}

impl TestResponse {
    /// The `error` message of a failure body.
    #[must_use]
    pub fn error(&self) -> &str {
        self.body["error"].as_str().unwrap_or_default()
    }
}

/// The portal router over in-memory backends.
pub struct TestApp {
    pub store: Arc<InMemoryStore>,
    pub storage: Arc<MemoryObjectStorage>,
    pub sessions: MemoryStore,
    router: Router,
}

impl Default for TestApp {
    fn default() -> Self {
        Self::new()
    }
}

impl TestApp {
    /// App over a store that provisions agents like the database trigger.
    #[must_use]
    pub fn new() -> Self {
        Self::with_store(InMemoryStore::with_agent_provisioning())
    }

    #[must_use]
    pub fn with_store(store: InMemoryStore) -> Self {
        let store = Arc::new(store);
        let storage = Arc::new(MemoryObjectStorage::new(STORAGE_BASE_URL));
        let sessions = MemoryStore::default();
        let state = AppState::new(test_config(), store.clone(), storage.clone());
        let router = routes::app(state, sessions.clone(), false);

        Self {
            store,
            storage,
            sessions,
            router,
        }
    }

    /// Put `identity` in a fresh session and return the cookie header value.
    pub async fn sign_in(&self, identity: &Identity) -> String {
        let mut record = Record {
            id: Id::default(),
            data: HashMap::from([(
                session_keys::CURRENT_IDENTITY.to_owned(),
                serde_json::to_value(identity).unwrap(),
            )]),
            expiry_date: OffsetDateTime::now_utc() + Duration::days(1),
        };
        self.sessions.create(&mut record).await.unwrap();
        format!("{SESSION_COOKIE_NAME}={}", record.id)
    }

    /// Sign in and run identity sync, returning the cookie.
    pub async fn sign_in_agent(&self, identity: &Identity) -> String {
        let cookie = self.sign_in(identity).await;
        let res = self.post("/api/auth/sync", Some(&cookie), None).await;
        assert_eq!(res.status, StatusCode::OK, "sync failed: {:?}", res.body);
        cookie
    }

    /// Send a raw request.
    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.unwrap()
    }

    /// Send a JSON request and parse the JSON response (non-JSON bodies
    /// become a string value).
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        cookie: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        parse(self.send(request).await).await
    }

    pub async fn get(&self, uri: &str, cookie: Option<&str>) -> TestResponse {
        self.request(Method::GET, uri, cookie, None).await
    }

    pub async fn post(&self, uri: &str, cookie: Option<&str>, body: Option<Value>) -> TestResponse {
        self.request(Method::POST, uri, cookie, body).await
    }

    pub async fn put(&self, uri: &str, cookie: Option<&str>, body: Value) -> TestResponse {
        self.request(Method::PUT, uri, cookie, Some(body)).await
    }

    /// Upload a single multipart `file` field.
    pub async fn upload(
        &self,
        uri: &str,
        cookie: &str,
        content_type: &str,
        bytes: &[u8],
    ) -> TestResponse {
        const BOUNDARY: &str = "portal-test-boundary";

        let mut body = format!(
            "--{BOUNDARY}\r\n\
             Content-Disposition: form-data; name=\"file\"; filename=\"avatar\"\r\n\
             Content-Type: {content_type}\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(bytes);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        let request = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::COOKIE, cookie)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap();

        parse(self.send(request).await).await
    }
}

async fn parse(response: Response) -> TestResponse {
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));

    TestResponse {
        status,
        headers,
        body,
    }
}
