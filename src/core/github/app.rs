#![allow(clippy::result_large_err)]

use super::client::GitHubClient;
use super::recording::DryRunClient;
use super::token::{CachedToken, TokenCache};
use super::{ClientProvider, RepoClient};
use crate::core::error::AppError;
use crate::core::types::{ErrorCategory, RepoRef};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};
use url::Url;

/// App JWTs are valid for at most ten minutes; stay under that with clock skew.
const JWT_LIFETIME_SECONDS: i64 = 540;
const JWT_BACKDATE_SECONDS: i64 = 60;

#[derive(Debug, Serialize)]
struct AppClaims {
    iat: i64,
    exp: i64,
    iss: String,
}

#[derive(Debug, Deserialize)]
struct InstallationToken {
    token: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct Installation {
    id: u64,
}

/// GitHub App credentials plus the installation token cache.
pub struct GitHubApp {
    app_id: u64,
    key: EncodingKey,
    api_base: Url,
    http: reqwest::Client,
    tokens: TokenCache,
}

impl GitHubApp {
    pub fn from_pem(
        app_id: u64,
        pem: &str,
        api_base: Url,
        refresh_margin: Duration,
    ) -> Result<Self, AppError> {
        let key = EncodingKey::from_rsa_pem(pem.as_bytes()).map_err(|err| {
            AppError::new(
                ErrorCategory::ConfigurationError,
                format!("invalid app private key: {}", err),
            )
            .with_code("GH-APP-KEY")
        })?;
        Ok(Self {
            app_id,
            key,
            api_base,
            http: GitHubClient::default_http()?,
            tokens: TokenCache::new(refresh_margin),
        })
    }

    pub fn api_base(&self) -> &Url {
        &self.api_base
    }

    /// Short-lived RS256 JWT identifying the app itself.
    pub fn app_jwt(&self) -> Result<String, AppError> {
        let now = Utc::now().timestamp();
        let claims = AppClaims {
            iat: now - JWT_BACKDATE_SECONDS,
            exp: now + JWT_LIFETIME_SECONDS,
            iss: self.app_id.to_string(),
        };
        encode(&Header::new(Algorithm::RS256), &claims, &self.key).map_err(|err| {
            AppError::new(
                ErrorCategory::AuthenticationError,
                format!("failed to sign app token: {}", err),
            )
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, AppError> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|_| {
                AppError::new(ErrorCategory::ConfigurationError, "api base cannot be a base URL")
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn app_request<T: for<'de> Deserialize<'de>>(
        &self,
        method: reqwest::Method,
        url: Url,
    ) -> Result<T, AppError> {
        let response = self
            .http
            .request(method, url)
            .bearer_auth(self.app_jwt()?)
            .header("Accept", "application/vnd.github+json")
            .send()
            .await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND || status == StatusCode::FORBIDDEN {
            // Repository not covered by any installation of this app.
            return Err(AppError::new(
                ErrorCategory::ForbiddenError,
                format!("app is not installed for this repository ({})", status.as_u16()),
            ));
        }
        Ok(response.error_for_status()?.json().await?)
    }

    /// Installation id for a repository, for deliveries that do not carry one.
    pub async fn installation_for(&self, repo: &RepoRef) -> Result<u64, AppError> {
        let url = self.endpoint(&["repos", &repo.owner, &repo.name, "installation"])?;
        let installation: Installation = self.app_request(reqwest::Method::GET, url).await?;
        Ok(installation.id)
    }

    /// Cached installation access token, refreshed inside the safety margin.
    pub async fn installation_token(&self, installation: u64) -> Result<String, AppError> {
        self.tokens
            .get_or_refresh(installation, || async {
                let url = self.endpoint(&[
                    "app",
                    "installations",
                    &installation.to_string(),
                    "access_tokens",
                ])?;
                let token: InstallationToken =
                    self.app_request(reqwest::Method::POST, url).await?;
                info!(installation, expires_at = %token.expires_at, "installation token issued");
                Ok(CachedToken::new(token.token, token.expires_at))
            })
            .await
    }
}

/// `ClientProvider` that authenticates as an app installation.
pub struct InstallationClients {
    app: Arc<GitHubApp>,
    dry_run: bool,
}

impl InstallationClients {
    pub fn new(app: Arc<GitHubApp>, dry_run: bool) -> Self {
        Self { app, dry_run }
    }
}

#[async_trait]
impl ClientProvider for InstallationClients {
    async fn client_for(
        &self,
        installation_id: Option<u64>,
        repo: &RepoRef,
    ) -> Result<Arc<dyn RepoClient>, AppError> {
        let installation = match installation_id {
            Some(id) => id,
            None => self.app.installation_for(repo).await?,
        };
        debug!(installation, %repo, "creating installation client");
        let token = self.app.installation_token(installation).await?;
        let client: Arc<dyn RepoClient> = Arc::new(GitHubClient::new(
            self.app.http.clone(),
            self.app.api_base.clone(),
            token,
            repo.clone(),
        ));
        if self.dry_run {
            return Ok(Arc::new(DryRunClient::new(client)));
        }
        Ok(client)
    }
}
