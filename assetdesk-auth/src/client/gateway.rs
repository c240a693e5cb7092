//! Authorized HTTP gateway to the backend services
//!
//! Every request built through [`ApiGateway::authorized`] carries
//! `Authorization: Bearer <token>` read from the credential slot at send time,
//! so a refreshed token is picked up without rebuilding clients.

use super::ErrorBody;
use crate::error::{AuthError, AuthResult};
use crate::storage::CredentialSlot;
use assetdesk_core::{config_error, ApiConfig, DeskError, ErrorContext};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, USER_AGENT};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct ApiGateway {
    client: reqwest::Client,
    base_url: String,
    credentials: CredentialSlot,
}

impl ApiGateway {
    pub fn new(config: &ApiConfig, credentials: CredentialSlot) -> AuthResult<Self> {
        let parsed = url::Url::parse(&config.base_url).map_err(|e| DeskError::Config {
            message: format!("Invalid API base URL '{}': {}", config.base_url, e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("api_gateway")
                .with_operation("new")
                .with_suggestion("Set api.base_url to an absolute http(s) URL"),
        })?;

        let client = create_http_client(config)?;
        Ok(Self {
            client,
            base_url: parsed.as_str().trim_end_matches('/').to_string(),
            credentials,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn credentials(&self) -> &CredentialSlot {
        &self.credentials
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Request to a public endpoint, no bearer attached
    pub fn anonymous(&self, method: Method, path: &str) -> RequestBuilder {
        let url = self.url(path);
        debug!(%method, %url, "Building anonymous request");
        self.client.request(method, url)
    }

    /// Request to a protected endpoint with the current bearer token
    pub fn authorized(&self, method: Method, path: &str) -> AuthResult<RequestBuilder> {
        let url = self.url(path);
        let builder = self.client.request(method.clone(), &url);

        match self.credentials.access_token()? {
            Some(token) => {
                let value = HeaderValue::from_str(&format!("Bearer {}", token)).map_err(|_| {
                    AuthError::InvalidToken {
                        reason: "token is not a valid header value".to_string(),
                    }
                })?;
                debug!(%method, %url, "Building authorized request");
                Ok(builder.header(AUTHORIZATION, value))
            }
            None => {
                debug!(%method, %url, "No bearer token stored, sending unauthenticated");
                Ok(builder)
            }
        }
    }

    /// GET a protected JSON resource
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> AuthResult<T> {
        let response = self.authorized(Method::GET, path)?.send().await?;
        decode_json(response).await
    }

    /// POST to a protected JSON resource
    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> AuthResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .authorized(Method::POST, path)?
            .json(body)
            .send()
            .await?;
        decode_json(response).await
    }
}

/// Decode a 2xx JSON body, or map the failure status into an [`AuthError`]
pub(crate) async fn decode_json<T: DeserializeOwned>(response: Response) -> AuthResult<T> {
    let status = response.status();
    if !status.is_success() {
        let message = error_message(response).await;
        return Err(status_error(status, message));
    }

    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| AuthError::MalformedResponse {
        message: e.to_string(),
    })
}

/// Message field of an error body, falling back to the status reason
pub(crate) async fn error_message(response: Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    serde_json::from_str::<ErrorBody>(&body)
        .ok()
        .and_then(ErrorBody::into_message)
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("Request failed")
                .to_string()
        })
}

/// Generic status mapping for protected calls
pub(crate) fn status_error(status: StatusCode, message: String) -> AuthError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => AuthError::InvalidToken { reason: message },
        StatusCode::PRECONDITION_FAILED => AuthError::PasswordChangeRequired { message },
        _ => AuthError::Server {
            status: status.as_u16(),
            message,
        },
    }
}

fn create_http_client(config: &ApiConfig) -> AuthResult<reqwest::Client> {
    let mut headers = HeaderMap::new();
    headers.insert(
        USER_AGENT,
        HeaderValue::from_str(&config.user_agent)
            .map_err(|e| config_error!(format!("Invalid api.user_agent: {}", e), "http_client", e))?,
    );

    let client = reqwest::Client::builder()
        .timeout(config.request_timeout())
        .default_headers(headers)
        .build()
        .map_err(|e| DeskError::Network {
            message: format!("Failed to create HTTP client: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("http_client").with_operation("create_client"),
        })?;

    Ok(client)
}
