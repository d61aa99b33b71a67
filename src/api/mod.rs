//! REST client for the job server's collaborator endpoints.
//!
//! Failures here are returned to the caller and surfaced as text. They
//! never reach the live run state.

pub mod auth;
pub mod news;

use anyhow::{Context, Result};
use reqwest::{Client, RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

pub use auth::{AuthSession, RegisterRequest, UserProfile};
pub use news::{fallback_suggestions, HotNewsGroup, HotNewsItem, HotNewsResponse};

use crate::types::{FluxError, RunData};

pub struct ApiClient {
    http: Client,
    base: Url,
    token: Option<SecretString>,
}

impl ApiClient {
    pub fn new(base: Url, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("SIGNAL-FLUX/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client for job server")?;
        Ok(Self { http, base: with_trailing_slash(base), token: None })
    }

    /// Attach a bearer token for authenticated endpoints.
    pub fn with_token(mut self, token: SecretString) -> Self {
        self.token = Some(token);
        self
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    // -- Internal helpers ------------------------------------------------

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base
            .join(path)
            .with_context(|| format!("Invalid endpoint path: {path}"))
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token.expose_secret()),
            None => request,
        }
    }

    /// Turn a non-success response into `FluxError::Api` with the server's
    /// `detail` text.
    async fn checked(endpoint: &str, resp: Response) -> Result<Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        let message = auth::error_detail(&body, status.canonical_reason().unwrap_or("request failed"));
        Err(FluxError::Api { endpoint: endpoint.to_string(), message: format!("{status}: {message}") }.into())
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, label: &str) -> Result<T> {
        let url = self.endpoint(path)?;
        debug!(endpoint = label, "GET");
        let resp = self
            .authorized(self.http.get(url))
            .send()
            .await
            .with_context(|| format!("{label} request failed"))?;
        Self::checked(label, resp)
            .await?
            .json()
            .await
            .with_context(|| format!("Failed to parse {label} response"))
    }

    // -- Auth ------------------------------------------------------------

    /// Exchange credentials for an access token.
    pub async fn login(&self, username: &str, password: &SecretString) -> Result<SecretString> {
        let url = self.endpoint("api/auth/login")?;
        let resp = self
            .http
            .post(url)
            .json(&auth::LoginRequest { username, password: password.expose_secret() })
            .send()
            .await
            .context("Login request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(FluxError::Auth(auth::error_detail(&body, "Login failed")).into());
        }
        let body: auth::LoginResponse = resp.json().await.context("Failed to parse login response")?;
        Ok(SecretString::new(body.access_token))
    }

    /// Profile of the user owning `token`.
    pub async fn me(&self, token: &SecretString) -> Result<UserProfile> {
        let url = self.endpoint("api/auth/me")?;
        let resp = self
            .http
            .get(url)
            .bearer_auth(token.expose_secret())
            .send()
            .await
            .context("Profile request failed")?;
        if !resp.status().is_success() {
            return Err(FluxError::Auth("Failed to fetch user profile".to_string()).into());
        }
        resp.json().await.context("Failed to parse profile response")
    }

    /// Login followed by a profile fetch.
    pub async fn sign_in(&self, username: &str, password: &SecretString) -> Result<AuthSession> {
        let token = self.login(username, password).await?;
        let user = self.me(&token).await?;
        info!(username = %user.username, "Signed in");
        Ok(AuthSession { user, token })
    }

    pub async fn register(&self, request: &RegisterRequest) -> Result<()> {
        let url = self.endpoint("api/auth/register")?;
        let resp = self
            .http
            .post(url)
            .json(request)
            .send()
            .await
            .context("Registration request failed")?;
        if !resp.status().is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(FluxError::Auth(auth::error_detail(&body, "Registration failed")).into());
        }
        info!(username = %request.username, "Account registered");
        Ok(())
    }

    // -- Runs ------------------------------------------------------------

    /// Structured output of a finished run. Charts without price bars are
    /// dropped on receipt.
    pub async fn run_data(&self, run_id: &str) -> Result<RunData> {
        let path = format!("api/run/{}/data", urlencoding::encode(run_id));
        let mut data: RunData = self.get_json(&path, "run data").await?;
        if data.run_id.is_empty() {
            data.run_id = run_id.to_string();
        }
        let dropped = data.retain_valid_charts();
        if !dropped.is_empty() {
            warn!(run_id, tickers = ?dropped, "Dropped charts without prices");
        }
        Ok(data)
    }

    // -- News ------------------------------------------------------------

    pub async fn hot_news<S: AsRef<str>>(&self, sources: &[S], count: u32) -> Result<HotNewsResponse> {
        let news: HotNewsResponse = self.get_json(&news::hot_news_path(sources, count), "hot news").await?;
        debug!(groups = news.sources.len(), items = news.item_count(), "Hot news fetched");
        Ok(news)
    }

    pub async fn suggest_queries(&self, title: &str) -> Result<Vec<String>> {
        let url = self.endpoint("api/suggest-queries")?;
        let resp = self
            .authorized(self.http.post(url))
            .json(&news::SuggestRequest { title })
            .send()
            .await
            .context("Suggestion request failed")?;
        let body: news::SuggestResponse = Self::checked("suggest queries", resp)
            .await?
            .json()
            .await
            .context("Failed to parse suggestion response")?;
        Ok(body.suggestions)
    }

    /// Suggestions that never fail: the local fallback list on an error
    /// status, just the title on a transport or parse failure.
    pub async fn suggest_queries_or_fallback(&self, title: &str) -> Vec<String> {
        match self.suggest_queries(title).await {
            Ok(suggestions) => suggestions,
            Err(e) => match e.downcast_ref::<FluxError>() {
                Some(FluxError::Api { .. }) => {
                    warn!(error = %e, "Suggestion service error, using fallback");
                    fallback_suggestions(title)
                }
                _ => {
                    warn!(error = %format!("{e:#}"), "Suggestion request failed");
                    vec![title.to_string()]
                }
            },
        }
    }
}

fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}
