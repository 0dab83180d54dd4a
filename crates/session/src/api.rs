// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP side of the session: the auth endpoints and a request wrapper that
//! ends the session when the backend stops accepting its token.

use std::future::Future;
use std::pin::Pin;
use std::sync::Once;
use std::time::Duration;

use reqwest::{Method, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::handle::LogoutHandle;
use crate::session::{LoginResult, LogoutReason, TokenPair};
use crate::store::{SessionStores, ACCESS_KEY};

/// Backend API root used when none is configured.
pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8000/api";

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

static CRYPTO_INIT: Once = Once::new();

/// Install the ring crypto provider for reqwest/rustls. Only the first call
/// has any effect.
pub fn ensure_crypto_provider() {
    CRYPTO_INIT.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// The remote refresh endpoint.
pub trait AuthApi: Send + Sync {
    /// Exchange a refresh token for a new access token.
    fn refresh<'a>(
        &'a self,
        refresh_token: &'a str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<String>> + Send + 'a>>;
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    #[serde(default)]
    access: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    #[serde(default)]
    access: String,
    #[serde(default)]
    refresh: String,
    #[serde(default)]
    user: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    detail: Option<String>,
}

/// Pull the backend's `detail` message out of an error body, if it has one.
fn error_detail(body: &str) -> Option<String> {
    serde_json::from_str::<ErrorResponse>(body).ok().and_then(|e| e.detail)
}

fn api_client(timeout: Duration) -> anyhow::Result<reqwest::Client> {
    ensure_crypto_provider();
    Ok(reqwest::Client::builder().timeout(timeout).build()?)
}

fn join_url(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), path.trim_start_matches('/'))
}

// ---------------------------------------------------------------------------
// Auth endpoints
// ---------------------------------------------------------------------------

/// Client for the backend's `/login` and `/token/refresh` endpoints.
#[derive(Debug, Clone)]
pub struct HttpAuthApi {
    base_url: String,
    client: reqwest::Client,
}

impl HttpAuthApi {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self { base_url: base_url.into(), client: api_client(timeout)? })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Exchange email and password for a token pair and user profile.
    pub async fn login(&self, email: &str, password: &str) -> anyhow::Result<LoginResult> {
        let resp = self
            .client
            .post(join_url(&self.base_url, "login"))
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            let detail = error_detail(&text).unwrap_or_else(|| "Login failed".to_owned());
            anyhow::bail!("login failed ({status}): {detail}");
        }

        let body: LoginResponse = resp.json().await?;
        Ok(LoginResult {
            tokens: Some(TokenPair { access: body.access, refresh: body.refresh }),
            user: body.user,
        })
    }

    /// Perform a single refresh request.
    pub async fn do_refresh(&self, refresh_token: &str) -> anyhow::Result<String> {
        let resp = self
            .client
            .post(join_url(&self.base_url, "token/refresh"))
            .json(&serde_json::json!({ "refresh": refresh_token }))
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("refresh failed ({status}): {text}");
        }

        let body: RefreshResponse = resp.json().await?;
        match body.access {
            Some(access) if !access.is_empty() => Ok(access),
            _ => anyhow::bail!("refresh response has no access token"),
        }
    }
}

impl AuthApi for HttpAuthApi {
    fn refresh<'a>(
        &'a self,
        refresh_token: &'a str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<String>> + Send + 'a>> {
        Box::pin(self.do_refresh(refresh_token))
    }
}

// ---------------------------------------------------------------------------
// Authorized requests
// ---------------------------------------------------------------------------

/// Request wrapper for the rest of the backend API.
///
/// Attaches the stored access token as a bearer credential. A 401 response
/// means the backend no longer accepts the session, so it triggers a logout
/// through the shared [`LogoutHandle`] before returning the error.
#[derive(Debug, Clone)]
pub struct AuthorizedClient {
    base_url: String,
    stores: SessionStores,
    logout: LogoutHandle,
    client: reqwest::Client,
}

impl AuthorizedClient {
    pub fn new(
        base_url: impl Into<String>,
        stores: SessionStores,
        logout: LogoutHandle,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        Ok(Self { base_url: base_url.into(), stores, logout, client: api_client(timeout)? })
    }

    /// Send a request and return the JSON body (`null` when empty).
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> anyhow::Result<serde_json::Value> {
        let token = self
            .stores
            .find(ACCESS_KEY)
            .ok_or_else(|| anyhow::anyhow!("not authenticated: no access token stored"))?;

        let mut req =
            self.client.request(method.clone(), join_url(&self.base_url, path)).bearer_auth(token);
        if let Some(body) = body {
            req = req.json(body);
        }
        let resp = req.send().await?;

        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED {
            warn!(%method, path, "request rejected with 401, ending session");
            self.logout.trigger(LogoutReason::Unauthorized);
            anyhow::bail!("{method} {path}: unauthorized");
        }
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            let detail = error_detail(&text).unwrap_or(text);
            anyhow::bail!("{method} {path} failed ({status}): {detail}");
        }

        let bytes = resp.bytes().await?;
        debug!(%method, path, %status, len = bytes.len(), "request ok");
        if bytes.is_empty() {
            return Ok(serde_json::Value::Null);
        }
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub async fn get_json(&self, path: &str) -> anyhow::Result<serde_json::Value> {
        self.send(Method::GET, path, None).await
    }

    pub async fn post_json(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> anyhow::Result<serde_json::Value> {
        self.send(Method::POST, path, Some(body)).await
    }

    pub async fn delete(&self, path: &str) -> anyhow::Result<serde_json::Value> {
        self.send(Method::DELETE, path, None).await
    }
}

#[cfg(test)]
#[path = "api_tests.rs"]
mod tests;
