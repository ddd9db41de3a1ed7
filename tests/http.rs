//! The HTTP surface, driven through the router with `oneshot`

mod common;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use common::{app_state, challenge_of, SoftAuthenticator};
use passkey_ceremony::handlers;
use serde_json::{json, Value};
use tower::ServiceExt;
use tower_sessions::{MemoryStore, SessionManagerLayer};

fn app() -> Router {
    let session_layer = SessionManagerLayer::new(MemoryStore::default()).with_secure(false);
    handlers::router(app_state()).layer(session_layer)
}

/// A browser: one cookie jar, one origin
struct Client {
    app: Router,
    cookie: Option<String>,
}

impl Client {
    fn new(app: &Router) -> Self {
        Self {
            app: app.clone(),
            cookie: None,
        }
    }

    async fn send(&mut self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(cookie) = &self.cookie {
            request = request.header(header::COOKIE, cookie);
        }
        let request = match body {
            Some(body) => request
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => request.body(Body::empty()),
        }
        .unwrap();

        let response = self.app.clone().oneshot(request).await.unwrap();
        if let Some(set_cookie) = response.headers().get(header::SET_COOKIE) {
            let pair = set_cookie.to_str().unwrap().split(';').next().unwrap();
            self.cookie = Some(pair.to_string());
        }

        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    async fn post(&mut self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.send(Method::POST, uri, Some(body)).await
    }

    async fn get(&mut self, uri: &str) -> (StatusCode, Value) {
        self.send(Method::GET, uri, None).await
    }

    async fn register(&mut self, email: &str, authenticator: &SoftAuthenticator) -> (StatusCode, Value) {
        let (status, options) = self
            .post("/api/register", json!({ "email": email, "step": "start" }))
            .await;
        assert_eq!(status, StatusCode::OK, "{options}");
        let credential = authenticator.register(&challenge_of(&options), 0);
        self.post(
            "/api/register",
            json!({ "email": email, "step": "verify", "credential": credential }),
        )
        .await
    }

    async fn login(&mut self, email: &str, authenticator: &SoftAuthenticator, counter: u32) -> (StatusCode, Value) {
        let (status, options) = self
            .post("/api/login", json!({ "email": email, "step": "start" }))
            .await;
        assert_eq!(status, StatusCode::OK, "{options}");
        let credential = authenticator.assert(&challenge_of(&options), counter);
        self.post(
            "/api/login",
            json!({ "email": email, "step": "verify", "credential": credential }),
        )
        .await
    }
}

#[tokio::test]
async fn health_reports_store_backend() {
    let app = app();
    let (status, body) = Client::new(&app).get("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["store"], "memory");
}

#[tokio::test]
async fn register_start_returns_creation_options() {
    let app = app();
    let mut client = Client::new(&app);
    let (status, options) = client
        .post("/api/register", json!({ "email": "a@x.com", "step": "start" }))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(options["rp"]["id"], common::RP_ID);
    assert_eq!(options["user"]["name"], "a@x.com");
    assert_eq!(options["attestation"], "none");
    assert_eq!(
        options["pubKeyCredParams"],
        json!([
            { "type": "public-key", "alg": -8 },
            { "type": "public-key", "alg": -7 },
            { "type": "public-key", "alg": -257 }
        ])
    );
    assert_eq!(options["authenticatorSelection"]["residentKey"], "preferred");
    assert_eq!(options["extensions"]["credProps"], true);
    assert!(client.cookie.is_some());
}

#[tokio::test]
async fn full_flow_register_login_profile_logout() {
    let app = app();
    let mut client = Client::new(&app);
    let authenticator = SoftAuthenticator::new(b"alice-phone");

    let (status, body) = client.register("a@x.com", &authenticator).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body, json!({ "verified": true }));

    // Registering does not sign in
    let (status, body) = client.get("/api/session").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Not authenticated");

    let (status, body) = client.login("a@x.com", &authenticator, 1).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body, json!({ "verified": true }));

    let (status, body) = client.get("/api/session").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["email"], "a@x.com");

    let (status, profile) = client.get("/api/users/me").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["email"], "a@x.com");
    assert_eq!(profile["credentials"][0]["counter"], 1);
    assert_eq!(profile["credentials"][0]["device_type"], "multiDevice");
    assert!(profile["credentials"][0].get("public_key").is_none());

    let (status, body) = client.send(Method::DELETE, "/api/session", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let (status, _) = client.get("/api/users/me").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn second_registration_is_a_bad_request() {
    let app = app();
    let authenticator = SoftAuthenticator::new(b"alice-phone");
    let (status, _) = Client::new(&app).register("a@x.com", &authenticator).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = Client::new(&app)
        .post("/api/register", json!({ "email": "a@x.com", "step": "start" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["error"],
        "Email already registered. Please use the login page instead."
    );
}

#[tokio::test]
async fn login_for_unknown_email_is_a_bad_request() {
    let app = app();
    let (status, body) = Client::new(&app)
        .post("/api/login", json!({ "email": "nobody@x.com", "step": "start" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["error"],
        "No account found with this email. Please create an account first."
    );
}

#[tokio::test]
async fn verify_without_start_is_invalid_session() {
    let app = app();
    let authenticator = SoftAuthenticator::new(b"alice-phone");
    let (status, body) = Client::new(&app)
        .post(
            "/api/register",
            json!({
                "email": "a@x.com",
                "step": "verify",
                "credential": authenticator.register("AAAA", 0)
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid session");
}

#[tokio::test]
async fn malformed_requests_are_rejected() {
    let app = app();
    let mut client = Client::new(&app);

    let (status, body) = client
        .post("/api/login", json!({ "email": "a@x.com", "step": "finish" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid request");

    let (status, body) = client
        .post("/api/register", json!({ "email": "a@x.com", "step": "verify" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid request");
}

#[tokio::test]
async fn replaying_a_login_fails() {
    let app = app();
    let authenticator = SoftAuthenticator::new(b"alice-phone");
    let (status, _) = Client::new(&app).register("a@x.com", &authenticator).await;
    assert_eq!(status, StatusCode::OK);

    let mut client = Client::new(&app);
    let (_, options) = client
        .post("/api/login", json!({ "email": "a@x.com", "step": "start" }))
        .await;
    let request = json!({
        "email": "a@x.com",
        "step": "verify",
        "credential": authenticator.assert(&challenge_of(&options), 1)
    });

    // Keep the pre-login cookie to replay the same request with it
    let stale_cookie = client.cookie.clone();
    let (status, _) = client.post("/api/login", request.clone()).await;
    assert_eq!(status, StatusCode::OK);

    let mut replay = Client::new(&app);
    replay.cookie = stale_cookie;
    let (status, body) = replay.post("/api/login", request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid session");
}

#[tokio::test]
async fn blank_email_is_a_bad_request() {
    let app = app();
    for email in ["", "   "] {
        for uri in ["/api/register", "/api/login"] {
            let (status, body) = Client::new(&app)
                .post(uri, json!({ "email": email, "step": "start" }))
                .await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body["error"], "Please enter an email address.");
        }
    }
}

#[tokio::test]
async fn padded_email_cannot_register_twice() {
    let app = app();
    let authenticator = SoftAuthenticator::new(b"alice-phone");
    let (status, _) = Client::new(&app).register("a@x.com", &authenticator).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = Client::new(&app)
        .post("/api/register", json!({ "email": "  a@x.com ", "step": "start" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["error"],
        "Email already registered. Please use the login page instead."
    );
}
