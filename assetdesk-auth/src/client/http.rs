//! HTTP implementation of the auth service contract

use super::gateway::{decode_json, error_message, status_error};
use super::{
    ApiGateway, AuthBackend, ChangePasswordRequest, ChangePasswordResponse, LoginRequest,
    LoginResponse, RefreshRequest, TokenResponse, UserPayload,
};
use crate::error::{AuthError, AuthResult};
use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use tracing::{debug, info};

/// Auth service client over the authorized gateway
#[derive(Debug, Clone)]
pub struct HttpAuthBackend {
    gateway: ApiGateway,
    auth_prefix: String,
}

impl HttpAuthBackend {
    pub fn new(gateway: ApiGateway, auth_prefix: &str) -> Self {
        let auth_prefix = format!("/{}", auth_prefix.trim_matches('/'));
        info!(
            "Created auth client for {}{}",
            gateway.base_url(),
            auth_prefix
        );
        Self {
            gateway,
            auth_prefix,
        }
    }

    pub fn gateway(&self) -> &ApiGateway {
        &self.gateway
    }

    fn endpoint(&self, name: &str) -> String {
        format!("{}/{}", self.auth_prefix, name)
    }
}

#[async_trait]
impl AuthBackend for HttpAuthBackend {
    async fn login(&self, request: &LoginRequest) -> AuthResult<LoginResponse> {
        debug!(username = %request.username, "POST login");
        let response = self
            .gateway
            .anonymous(Method::POST, &self.endpoint("login"))
            .json(request)
            .send()
            .await?;

        let status = response.status();
        match status {
            s if s.is_success() => decode_json(response).await,
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                let message = error_message(response).await;
                Err(AuthError::InvalidCredentials { message })
            }
            _ => {
                let message = error_message(response).await;
                Err(AuthError::Server {
                    status: status.as_u16(),
                    message,
                })
            }
        }
    }

    async fn logout(&self) -> AuthResult<()> {
        let response = self
            .gateway
            .authorized(Method::POST, &self.endpoint("logout"))?
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let message = error_message(response).await;
            Err(status_error(status, message))
        }
    }

    async fn refresh_token(&self, refresh_token: &str) -> AuthResult<TokenResponse> {
        debug!("POST refresh-token");
        let body = RefreshRequest {
            refresh_token: refresh_token.to_string(),
        };
        let response = self
            .gateway
            .anonymous(Method::POST, &self.endpoint("refresh-token"))
            .json(&body)
            .send()
            .await?;

        decode_json(response).await
    }

    async fn change_password(
        &self,
        request: &ChangePasswordRequest,
    ) -> AuthResult<ChangePasswordResponse> {
        let response = self
            .gateway
            .authorized(Method::POST, &self.endpoint("change-password"))?
            .json(request)
            .send()
            .await?;

        let status = response.status();
        match status {
            s if s.is_success() => decode_json(response).await,
            StatusCode::PRECONDITION_FAILED => {
                let message = error_message(response).await;
                Err(AuthError::PasswordChangeRequired { message })
            }
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                let message = error_message(response).await;
                Err(AuthError::Rejected { message })
            }
            _ => {
                let message = error_message(response).await;
                Err(status_error(status, message))
            }
        }
    }

    async fn me(&self) -> AuthResult<UserPayload> {
        self.gateway.get_json(&self.endpoint("me")).await
    }
}
