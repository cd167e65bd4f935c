//! API gateway: the single choke point for requests to the bookkeeping API.
//!
//! Every request carries the current credential. A 401 from any endpoint
//! ends the session globally; a 403 raises a permission-denied notice and
//! leaves the session alone. Either way the error still reaches the caller.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::AUTHORIZATION;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, warn};

use super::ApiError;
use crate::auth::{AuthState, SessionAuthority};
use crate::ports::{Notice, Notifier};

// ============================================================================
// Constants
// ============================================================================

/// Credential exchange endpoint.
const LOGIN_ENDPOINT: &str = "/auth/login";

/// HTTP request timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    access_token: String,
}

/// Clone is cheap - reqwest::Client and the authority share their state.
#[derive(Clone)]
pub struct ApiGateway {
    client: Client,
    base_url: String,
    authority: SessionAuthority,
    notifier: Arc<dyn Notifier>,
}

impl ApiGateway {
    /// Create a gateway for the API at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Network`] if the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        authority: SessionAuthority,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            authority,
            notifier,
        })
    }

    pub fn authority(&self) -> &SessionAuthority {
        &self.authority
    }

    /// Exchange username and password for a credential and start a session.
    ///
    /// The returned state is `Anonymous` if the server issued a credential
    /// the client cannot use.
    ///
    /// # Errors
    ///
    /// Returns the request error when the server refuses the login.
    pub async fn login(&self, username: &str, password: &str) -> Result<AuthState, ApiError> {
        let response: LoginResponse = self
            .post(LOGIN_ENDPOINT, &LoginRequest { username, password })
            .await?;
        Ok(self.authority.login(&response.access_token))
    }

    /// End the session locally.
    pub fn logout(&self) {
        self.authority.logout();
    }

    // ===== Request helpers =====

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Start a request to `path`, with the bearer credential if signed in.
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.client.request(method, self.url(path));
        match self.authority.credential() {
            Some(credential) => builder.bearer_auth(credential),
            None => builder,
        }
    }

    /// Send a request and apply the session-wide status rules.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] for transport failures and non-success statuses.
    pub async fn send(&self, request: RequestBuilder) -> Result<Response, ApiError> {
        let request = request.build()?;
        let sent_credential = request
            .headers()
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::to_string);

        let response = self.client.execute(request).await?;
        self.check_response(response, sent_credential.as_deref()).await
    }

    async fn check_response(
        &self,
        response: Response,
        sent_credential: Option<&str>,
    ) -> Result<Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let url = response.url().path().to_string();
        let body = response.text().await.unwrap_or_default();
        let error = ApiError::from_status(status, &body);

        match &error {
            ApiError::Unauthorized => {
                warn!(%url, "Request rejected as unauthenticated, ending session");
                self.authority.handle_unauthorized(sent_credential);
            }
            ApiError::AccessDenied(_) => {
                warn!(%url, "Request forbidden");
                self.notifier.notify(Notice::PermissionDenied);
            }
            _ => debug!(%url, status = status.as_u16(), "Request failed"),
        }

        Err(error)
    }

    async fn json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ApiError> {
        let response = self.send(request).await?;
        response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.json(self.request(Method::GET, path)).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.json(self.request(Method::POST, path).json(body)).await
    }

    pub async fn put<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.json(self.request(Method::PUT, path).json(body)).await
    }

    pub async fn delete(&self, path: &str) -> Result<(), ApiError> {
        self.send(self.request(Method::DELETE, path)).await?;
        Ok(())
    }
}
