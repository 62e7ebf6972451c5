use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use credo_api::app::AppServices;
use credo_auth::SigningSecret;
use credo_core::Email;
use credo_infra::{
    AuthConfig, ExternalAssertion, IdentityProvider, InMemoryAccountStore, InMemoryRefreshLedger,
    PasswordError, PasswordOracle, ProviderError,
};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde_json::json;

const JWT_SECRET: &str = "test-secret";

/// Reversible stand-in so tests do not pay for Argon2.
struct PlainOracle;

impl PasswordOracle for PlainOracle {
    fn hash(&self, plaintext: &str) -> Result<String, PasswordError> {
        Ok(format!("plain:{plaintext}"))
    }

    fn verify(&self, plaintext: &str, handle: &str) -> bool {
        handle.strip_prefix("plain:") == Some(plaintext)
    }
}

/// Provider stub: code `"alice"` yields a verified assertion, `"unverified"` an unverified one.
struct StubProvider;

#[async_trait]
impl IdentityProvider for StubProvider {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn authorization_url(&self, state: &str) -> String {
        format!("https://idp.test/authorize?state={state}")
    }

    async fn exchange_code(&self, code: &str) -> Result<ExternalAssertion, ProviderError> {
        let email_verified = match code {
            "alice" => true,
            "unverified" => false,
            _ => return Err(ProviderError::Rejected("unknown code".to_string())),
        };
        Ok(ExternalAssertion {
            subject: "google-sub-1".to_string(),
            email: Email::parse("alice@example.com").unwrap(),
            email_verified,
            name: Some("Alice".to_string()),
        })
    }
}

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        Self::spawn_with(None).await
    }

    async fn spawn_with(google: Option<Arc<dyn IdentityProvider>>) -> Self {
        // Same router as prod, in-memory stores, ephemeral port.
        let config = AuthConfig::for_secret(SigningSecret::new(JWT_SECRET).unwrap());
        let services = AppServices::new(
            &config,
            Arc::new(InMemoryAccountStore::new()),
            Arc::new(InMemoryRefreshLedger::new()),
            Arc::new(PlainOracle),
            google,
        );
        let app = credo_api::app::build_app_with(services);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, handle }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn mint_access(secret: &str, uid: i64, email: &str, iat_offset: ChronoDuration, ttl: ChronoDuration) -> String {
    let iat = Utc::now() + iat_offset;
    let claims = json!({
        "sub": email,
        "uid": uid,
        "type": "access",
        "iat": iat.timestamp(),
        "exp": (iat + ttl).timestamp(),
    });

    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .expect("failed to encode jwt")
}

async fn register(client: &reqwest::Client, srv: &TestServer, email: &str) -> serde_json::Value {
    let res = client
        .post(srv.url("/user"))
        .json(&json!({ "email": email, "password": "s3cret", "name": "Bob" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    res.json().await.unwrap()
}

async fn refresh(client: &reqwest::Client, srv: &TestServer, token: &str) -> reqwest::Response {
    client
        .post(srv.url("/auth/refresh"))
        .json(&json!({ "refresh_token": token }))
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn health_is_public() {
    let srv = TestServer::spawn().await;
    let res = reqwest::get(srv.url("/health")).await.unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn auth_required_for_protected_endpoints() {
    let srv = TestServer::spawn().await;

    let client = reqwest::Client::new();
    let res = client.get(srv.url("/user")).send().await.unwrap();

    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(res.headers()["www-authenticate"], "Bearer");
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "not_authenticated");
}

#[tokio::test]
async fn session_lifecycle_register_login_rotate_logout() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let registered = register(&client, &srv, "Bob@Example.com").await;
    assert_eq!(registered["account"]["email"], "bob@example.com");
    assert_eq!(registered["account"]["display_name"], "Bob");
    assert_eq!(registered["token_type"], "bearer");

    // The access credential opens the protected route.
    let access = registered["access_token"].as_str().unwrap();
    let res = client.get(srv.url("/user")).bearer_auth(access).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let me: serde_json::Value = res.json().await.unwrap();
    assert_eq!(me["id"], registered["account"]["id"]);

    // Login with the normalized email works too.
    let res = client
        .post(srv.url("/auth/login"))
        .json(&json!({ "username": "bob@example.com", "password": "s3cret" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let logged_in: serde_json::Value = res.json().await.unwrap();
    let first_refresh = logged_in["refresh_token"].as_str().unwrap().to_string();

    // Rotation hands out a new pair and burns the old refresh credential.
    let res = refresh(&client, &srv, &first_refresh).await;
    assert_eq!(res.status(), StatusCode::OK);
    let rotated: serde_json::Value = res.json().await.unwrap();
    let second_refresh = rotated["refresh_token"].as_str().unwrap().to_string();
    assert_ne!(first_refresh, second_refresh);

    let res = refresh(&client, &srv, &first_refresh).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "revoked_or_unknown");

    // Logout revokes the current one; refreshing with it afterwards fails.
    let res = client
        .post(srv.url("/auth/logout"))
        .json(&json!({ "refresh_token": second_refresh }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["message"], "Successfully logged out");

    let res = refresh(&client, &srv, &second_refresh).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "revoked_or_unknown");
}

#[tokio::test]
async fn duplicate_registration_is_a_conflict() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    register(&client, &srv, "carol@example.com").await;

    let res = client
        .post(srv.url("/user"))
        .json(&json!({ "email": "CAROL@example.com", "password": "other" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn registration_validates_input() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    for body in [
        json!({ "email": "not-an-email", "password": "pw" }),
        json!({ "email": "dave@example.com", "password": "" }),
    ] {
        let res = client.post(srv.url("/user")).json(&body).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }
}

#[tokio::test]
async fn wrong_password_and_unknown_email_look_the_same() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    register(&client, &srv, "erin@example.com").await;

    let mut bodies = Vec::new();
    for (email, password) in [("erin@example.com", "wrong"), ("nobody@example.com", "s3cret")] {
        let res = client
            .post(srv.url("/auth/login"))
            .json(&json!({ "username": email, "password": password }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        bodies.push(res.json::<serde_json::Value>().await.unwrap());
    }
    assert_eq!(bodies[0], bodies[1]);
}

#[tokio::test]
async fn password_grant_returns_bare_token_pair() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    register(&client, &srv, "frank@example.com").await;

    let res = client
        .post(srv.url("/auth/token"))
        .form(&[
            ("grant_type", "password"),
            ("username", "frank@example.com"),
            ("password", "s3cret"),
        ])
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert!(body["access_token"].is_string());
    assert!(body["refresh_token"].is_string());
    assert!(body.get("account").is_none());
}

#[tokio::test]
async fn forged_expired_and_refresh_credentials_are_refused_by_the_guard() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let registered = register(&client, &srv, "grace@example.com").await;
    let uid = registered["account"]["id"].as_i64().unwrap();

    let forged = mint_access("other-secret", uid, "grace@example.com", ChronoDuration::zero(), ChronoDuration::minutes(10));
    let expired = mint_access(
        JWT_SECRET,
        uid,
        "grace@example.com",
        ChronoDuration::minutes(-30),
        ChronoDuration::minutes(15),
    );
    let refresh_as_access = registered["refresh_token"].as_str().unwrap().to_string();

    for token in [forged, expired, refresh_as_access, "garbage".to_string()] {
        let res = client.get(srv.url("/user")).bearer_auth(&token).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        let body: serde_json::Value = res.json().await.unwrap();
        assert_eq!(body["error"], "not_authenticated");
    }

    // A well-signed access credential still works.
    let valid = mint_access(JWT_SECRET, uid, "grace@example.com", ChronoDuration::zero(), ChronoDuration::minutes(10));
    let res = client.get(srv.url("/user")).bearer_auth(&valid).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn access_credential_is_not_accepted_for_refresh() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let registered = register(&client, &srv, "heidi@example.com").await;

    let res = refresh(&client, &srv, registered["access_token"].as_str().unwrap()).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "wrong_kind");
}

#[tokio::test]
async fn logout_is_idempotent() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let registered = register(&client, &srv, "ivan@example.com").await;
    let token = registered["refresh_token"].as_str().unwrap();

    for token in [token, token, "not-a-token"] {
        let res = client
            .post(srv.url("/auth/logout"))
            .json(&json!({ "refresh_token": token }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }
}

#[tokio::test]
async fn provider_routes_are_absent_when_not_configured() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap();

    let res = client.get(srv.url("/auth/google/login")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn federated_login_round_trip() {
    let srv = TestServer::spawn_with(Some(Arc::new(StubProvider))).await;
    let client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap();

    // Password account first: the federated login must link to it by email.
    let registered = register(&client, &srv, "alice@example.com").await;

    let res = client.get(srv.url("/auth/google/login")).send().await.unwrap();
    assert!(res.status().is_redirection());
    let location = res.headers()["location"].to_str().unwrap().to_string();
    let state = location
        .split_once("state=")
        .map(|(_, s)| s.to_string())
        .expect("state in redirect");

    let res = client
        .get(srv.url("/auth/google/callback"))
        .query(&[("code", "alice"), ("state", state.as_str())])
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["account"]["id"], registered["account"]["id"]);
    assert!(body["access_token"].is_string());

    // Unverified provider emails never reach the link-by-email path.
    let res = client
        .get(srv.url("/auth/google/callback"))
        .query(&[("code", "unverified"), ("state", state.as_str())])
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn callback_with_tampered_state_is_refused() {
    let srv = TestServer::spawn_with(Some(Arc::new(StubProvider))).await;
    let client = reqwest::Client::new();

    let res = client
        .get(srv.url("/auth/google/callback"))
        .query(&[("code", "alice"), ("state", "forged.state.value")])
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "invalid_state");
}
