//! HTTP auth backend and gateway against a mock server

use assetdesk_auth::client::{AuthBackend, ChangePasswordRequest, LoginRequest};
use assetdesk_auth::{
    ApiGateway, AuthError, CredentialSlot, CredentialStore, HttpAuthBackend,
    MemoryCredentialStore,
};
use assetdesk_core::{ApiConfig, StorageConfig};
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Fixture {
    server: MockServer,
    backend: HttpAuthBackend,
    credentials: CredentialSlot,
}

async fn fixture() -> Fixture {
    let server = MockServer::start().await;
    let store: Arc<dyn CredentialStore> = Arc::new(MemoryCredentialStore::new());
    let credentials = CredentialSlot::new(store, &StorageConfig::default());

    let config = ApiConfig {
        base_url: format!("{}/api", server.uri()),
        ..ApiConfig::default()
    };
    let gateway = ApiGateway::new(&config, credentials.clone()).unwrap();
    let backend = HttpAuthBackend::new(gateway, "/auth");

    Fixture {
        server,
        backend,
        credentials,
    }
}

fn login_request() -> LoginRequest {
    LoginRequest {
        username: "camille".to_string(),
        password: "secret-pass".to_string(),
    }
}

#[tokio::test]
async fn test_login_decodes_tokens_and_user() {
    let fx = fixture().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .and(body_json(json!({"username": "camille", "password": "secret-pass"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "accessToken": "access-1",
            "refreshToken": "refresh-1",
            "expiresIn": 3600,
            "user": {
                "id": 7,
                "username": "camille",
                "firstName": "Camille",
                "roles": ["validateur", "VALIDATEUR", "observateur"],
                "mustChangePassword": true
            }
        })))
        .expect(1)
        .mount(&fx.server)
        .await;

    let response = fx.backend.login(&login_request()).await.unwrap();

    assert_eq!(response.access_token, "access-1");
    assert_eq!(response.refresh_token.as_deref(), Some("refresh-1"));
    assert_eq!(response.user.id, "7");
    assert_eq!(response.user.roles.len(), 2);
    assert!(response.user.must_change_password);
}

#[tokio::test]
async fn test_login_rejection_carries_server_message() {
    let fx = fixture().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({"message": "Identifiants incorrects"})),
        )
        .mount(&fx.server)
        .await;

    let error = fx.backend.login(&login_request()).await.unwrap_err();

    match error {
        AuthError::InvalidCredentials { message } => assert_eq!(message, "Identifiants incorrects"),
        other => panic!("expected invalid credentials, got {:?}", other),
    }
}

#[tokio::test]
async fn test_login_server_failure_is_transport_error() {
    let fx = fixture().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&fx.server)
        .await;

    let error = fx.backend.login(&login_request()).await.unwrap_err();

    assert!(matches!(error, AuthError::Server { status: 503, .. }));
    assert!(error.is_transport_error());
}

#[tokio::test]
async fn test_login_with_garbled_body_is_malformed() {
    let fx = fixture().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>proxy</html>"))
        .mount(&fx.server)
        .await;

    let error = fx.backend.login(&login_request()).await.unwrap_err();

    assert!(matches!(error, AuthError::MalformedResponse { .. }));
}

#[tokio::test]
async fn test_protected_calls_attach_bearer_token() {
    let fx = fixture().await;
    fx.credentials.save("access-42", Some("refresh-42")).unwrap();

    Mock::given(method("GET"))
        .and(path("/api/auth/me"))
        .and(header("authorization", "Bearer access-42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "42",
            "username": "dominique",
            "roles": ["admin"]
        })))
        .expect(1)
        .mount(&fx.server)
        .await;

    let user = fx.backend.me().await.unwrap();

    assert_eq!(user.id, "42");
    assert!(user.roles.contains("ADMIN"));
    assert!(!user.must_change_password);
}

#[tokio::test]
async fn test_gateway_post_json_attaches_bearer_token() {
    let server = MockServer::start().await;
    let store: Arc<dyn CredentialStore> = Arc::new(MemoryCredentialStore::new());
    let credentials = CredentialSlot::new(store, &StorageConfig::default());
    credentials.save("access-9", None).unwrap();
    let config = ApiConfig {
        base_url: format!("{}/api", server.uri()),
        ..ApiConfig::default()
    };
    let gateway = ApiGateway::new(&config, credentials).unwrap();

    Mock::given(method("POST"))
        .and(path("/api/tickets"))
        .and(header("authorization", "Bearer access-9"))
        .and(body_json(json!({"assetId": 12, "summary": "Screen flickers"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 301})))
        .expect(1)
        .mount(&server)
        .await;

    let created: serde_json::Value = gateway
        .post_json(
            "/tickets",
            &json!({"assetId": 12, "summary": "Screen flickers"}),
        )
        .await
        .unwrap();

    assert_eq!(created["id"], 301);
}

#[tokio::test]
async fn test_bearer_follows_the_slot() {
    let fx = fixture().await;
    Mock::given(method("GET"))
        .and(path("/api/auth/me"))
        .and(header("authorization", "Bearer rotated"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "1", "username": "a"})))
        .expect(1)
        .mount(&fx.server)
        .await;

    fx.credentials.save("original", None).unwrap();
    fx.credentials.save("rotated", None).unwrap();

    assert!(fx.backend.me().await.is_ok());
}

#[tokio::test]
async fn test_me_with_rejected_token() {
    let fx = fixture().await;
    fx.credentials.save("stale", None).unwrap();
    Mock::given(method("GET"))
        .and(path("/api/auth/me"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"error": "jwt expired"})))
        .mount(&fx.server)
        .await;

    let error = fx.backend.me().await.unwrap_err();

    match error {
        AuthError::InvalidToken { reason } => assert_eq!(reason, "jwt expired"),
        other => panic!("expected invalid token, got {:?}", other),
    }
}

#[tokio::test]
async fn test_refresh_posts_refresh_token() {
    let fx = fixture().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/refresh-token"))
        .and(body_json(json!({"refreshToken": "refresh-9"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"accessToken": "access-10"})))
        .expect(1)
        .mount(&fx.server)
        .await;

    let tokens = fx.backend.refresh_token("refresh-9").await.unwrap();

    assert_eq!(tokens.access_token, "access-10");
    assert!(tokens.refresh_token.is_none());
}

#[tokio::test]
async fn test_change_password_precondition_failed() {
    let fx = fixture().await;
    fx.credentials.save("access-1", None).unwrap();
    Mock::given(method("POST"))
        .and(path("/api/auth/change-password"))
        .and(header("authorization", "Bearer access-1"))
        .and(body_json(json!({
            "currentPassword": "temporary1",
            "newPassword": "brand-new-secret"
        })))
        .respond_with(
            ResponseTemplate::new(412).set_body_json(json!({"message": "Password change required"})),
        )
        .mount(&fx.server)
        .await;

    let request = ChangePasswordRequest {
        current_password: "temporary1".to_string(),
        new_password: "brand-new-secret".to_string(),
    };
    let error = fx.backend.change_password(&request).await.unwrap_err();

    assert!(matches!(error, AuthError::PasswordChangeRequired { .. }));
    assert!(!error.is_transport_error());
}

#[tokio::test]
async fn test_change_password_success_body() {
    let fx = fixture().await;
    fx.credentials.save("access-1", None).unwrap();
    Mock::given(method("POST"))
        .and(path("/api/auth/change-password"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "message": "Mot de passe modifié"
        })))
        .mount(&fx.server)
        .await;

    let request = ChangePasswordRequest {
        current_password: "temporary1".to_string(),
        new_password: "brand-new-secret".to_string(),
    };
    let response = fx.backend.change_password(&request).await.unwrap();

    assert!(response.success);
    assert_eq!(response.message.as_deref(), Some("Mot de passe modifié"));
}

#[tokio::test]
async fn test_logout_sends_bearer() {
    let fx = fixture().await;
    fx.credentials.save("access-1", None).unwrap();
    Mock::given(method("POST"))
        .and(path("/api/auth/logout"))
        .and(header("authorization", "Bearer access-1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&fx.server)
        .await;

    assert!(fx.backend.logout().await.is_ok());
}

#[tokio::test]
async fn test_gateway_rejects_relative_base_url() {
    let store: Arc<dyn CredentialStore> = Arc::new(MemoryCredentialStore::new());
    let credentials = CredentialSlot::new(store, &StorageConfig::default());
    let config = ApiConfig {
        base_url: "localhost/api".to_string(),
        ..ApiConfig::default()
    };

    let result = ApiGateway::new(&config, credentials);

    assert!(matches!(result, Err(AuthError::Core(_))));
}

#[tokio::test]
async fn test_gateway_rejects_unusable_user_agent() {
    let store: Arc<dyn CredentialStore> = Arc::new(MemoryCredentialStore::new());
    let credentials = CredentialSlot::new(store, &StorageConfig::default());
    let config = ApiConfig {
        user_agent: "assetdesk\n".to_string(),
        ..ApiConfig::default()
    };

    match ApiGateway::new(&config, credentials) {
        Err(AuthError::Core(core)) => {
            assert!(std::error::Error::source(&core).is_some());
            assert_eq!(core.context().unwrap().component, "http_client");
        }
        other => panic!("expected a configuration error, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn test_unreachable_service_is_network_error() {
    let store: Arc<dyn CredentialStore> = Arc::new(MemoryCredentialStore::new());
    let credentials = CredentialSlot::new(store, &StorageConfig::default());
    let config = ApiConfig {
        base_url: "http://127.0.0.1:9/api".to_string(),
        ..ApiConfig::default()
    };
    let backend = HttpAuthBackend::new(ApiGateway::new(&config, credentials).unwrap(), "auth");

    let error = backend.login(&login_request()).await.unwrap_err();

    assert!(error.is_transport_error());
}
