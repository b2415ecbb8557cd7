// Integration tests for the refresh-then-retry-once gateway.
// Token endpoint and platform API are both served by one mockito server.

use mockito::{Matcher, Server, ServerGuard};
use std::sync::Arc;
use std::time::Duration;
use streamwarden::config::ProviderConfig;
use streamwarden::credentials::{
    CredentialStore, CredentialUpdate, SqliteCredentialStore, TokenCipher,
};
use streamwarden::error::{GatewayError, ProviderError, RefreshFailure};
use streamwarden::gateway::{ApiRequest, AuthenticatedGateway, HttpTransport};
use streamwarden::oauth::{RefreshFlights, TokenRefresher};
use tempfile::TempDir;

const ACCOUNT: &str = "141981764";

struct Setup {
    gateway: AuthenticatedGateway,
    store: Arc<SqliteCredentialStore>,
    cipher: TokenCipher,
    _dir: TempDir,
}

async fn setup(server: &ServerGuard, access: &str, refresh: &str) -> Setup {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(SqliteCredentialStore::new(dir.path().join("credentials.db")).unwrap());
    let cipher = TokenCipher::new(&[42u8; 32]).unwrap();

    store
        .update_credential(
            ACCOUNT,
            CredentialUpdate::both(cipher.encrypt(access).unwrap(), cipher.encrypt(refresh).unwrap()),
        )
        .await
        .unwrap();

    let provider = ProviderConfig {
        token_url: format!("{}/oauth2/token", server.url()),
        client_id: "client-abc".to_string(),
        timeout_seconds: 2,
    };
    let refresher =
        TokenRefresher::new(store.clone(), cipher.clone(), &provider, "secret".to_string()).unwrap();
    let transport = HttpTransport::with_base_url(
        format!("{}/helix", server.url()),
        "client-abc".to_string(),
        Duration::from_secs(2),
    )
    .unwrap();

    let gateway = AuthenticatedGateway::new(
        store.clone(),
        cipher.clone(),
        Arc::new(transport),
        Arc::new(RefreshFlights::new(Arc::new(refresher))),
    );

    Setup {
        gateway,
        store,
        cipher,
        _dir: dir,
    }
}

fn users_request() -> ApiRequest {
    ApiRequest::get("/users").query("id", ACCOUNT)
}

#[tokio::test]
async fn valid_token_never_touches_token_endpoint() {
    let mut server = Server::new_async().await;
    let users = server
        .mock("GET", "/helix/users")
        .match_query(Matcher::UrlEncoded("id".into(), ACCOUNT.into()))
        .match_header("authorization", "Bearer valid-access")
        .match_header("client-id", "client-abc")
        .with_status(200)
        .with_body(r#"{"data":[{"id":"141981764","login":"streamer"}]}"#)
        .expect(1)
        .create_async()
        .await;
    let token = server
        .mock("POST", "/oauth2/token")
        .expect(0)
        .create_async()
        .await;

    let s = setup(&server, "valid-access", "refresh-1").await;
    let response = s.gateway.call(ACCOUNT, users_request()).await.unwrap();

    assert!(response.is_success());
    let body: serde_json::Value = response.json().unwrap();
    assert_eq!(body["data"][0]["login"], "streamer");

    users.assert_async().await;
    token.assert_async().await;
}

#[tokio::test]
async fn stale_token_is_refreshed_and_call_retried() {
    let mut server = Server::new_async().await;
    let rejected = server
        .mock("GET", "/helix/users")
        .match_query(Matcher::Any)
        .match_header("authorization", "Bearer stale-access")
        .with_status(401)
        .with_body(r#"{"error":"Unauthorized","status":401,"message":"Invalid OAuth token"}"#)
        .expect(1)
        .create_async()
        .await;
    let accepted = server
        .mock("GET", "/helix/users")
        .match_query(Matcher::Any)
        .match_header("authorization", "Bearer fresh-access")
        .with_status(200)
        .with_body(r#"{"data":[]}"#)
        .expect(1)
        .create_async()
        .await;
    let token = server
        .mock("POST", "/oauth2/token")
        .match_body(Matcher::UrlEncoded("refresh_token".into(), "refresh-1".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"access_token":"fresh-access","refresh_token":"refresh-2","expires_in":14400,"token_type":"bearer"}"#)
        .expect(1)
        .create_async()
        .await;

    let s = setup(&server, "stale-access", "refresh-1").await;
    let response = s.gateway.call(ACCOUNT, users_request()).await.unwrap();

    assert_eq!(response.status.as_u16(), 200);
    rejected.assert_async().await;
    accepted.assert_async().await;
    token.assert_async().await;

    let stored = s.store.fetch_credential(ACCOUNT).await.unwrap().unwrap();
    assert_eq!(s.cipher.decrypt(&stored.access_token).unwrap(), "fresh-access");
    assert_eq!(s.cipher.decrypt(&stored.refresh_token).unwrap(), "refresh-2");
}

#[tokio::test]
async fn rejected_refresh_is_auth_expired_and_store_untouched() {
    let mut server = Server::new_async().await;
    let rejected = server
        .mock("GET", "/helix/users")
        .match_query(Matcher::Any)
        .with_status(401)
        .expect(1)
        .create_async()
        .await;
    let token = server
        .mock("POST", "/oauth2/token")
        .with_status(400)
        .with_body(r#"{"status":400,"message":"Invalid refresh token"}"#)
        .expect(1)
        .create_async()
        .await;

    let s = setup(&server, "stale-access", "revoked-refresh").await;
    let before = s.store.fetch_credential(ACCOUNT).await.unwrap().unwrap();

    let result = s.gateway.call(ACCOUNT, users_request()).await;

    match result {
        Err(GatewayError::AuthExpired(RefreshFailure::Provider(ProviderError::Rejected {
            status,
            ..
        }))) => assert_eq!(status.as_u16(), 400),
        other => panic!("expected AuthExpired, got {:?}", other),
    }

    let after = s.store.fetch_credential(ACCOUNT).await.unwrap().unwrap();
    assert_eq!(after, before);

    rejected.assert_async().await;
    token.assert_async().await;
}

#[tokio::test]
async fn unauthorized_after_refresh_is_returned_not_retried() {
    let mut server = Server::new_async().await;
    let platform = server
        .mock("GET", "/helix/users")
        .match_query(Matcher::Any)
        .with_status(401)
        .expect(2)
        .create_async()
        .await;
    let token = server
        .mock("POST", "/oauth2/token")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"access_token":"fresh-access","refresh_token":"refresh-2"}"#)
        .expect(1)
        .create_async()
        .await;

    let s = setup(&server, "stale-access", "refresh-1").await;
    let response = s.gateway.call(ACCOUNT, users_request()).await.unwrap();

    assert_eq!(response.status.as_u16(), 401);
    platform.assert_async().await;
    token.assert_async().await;
}

#[tokio::test]
async fn unknown_account_is_not_connected() {
    let server = Server::new_async().await;
    let s = setup(&server, "valid-access", "refresh-1").await;

    let result = s.gateway.call("someone-else", users_request()).await;

    assert!(matches!(result, Err(GatewayError::MissingCredential(_))));
}
