//! reqwest-backed [`IdentityClient`].

use crate::client::{IdentityClient, OpenIdConfiguration, TokenRequest, TokenResponse};
use crate::error::{FlowError, FlowResult};
use crate::profile::Profile;
use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;
use url::Url;

fn summarize_response_body(body: &str) -> String {
    let mut hasher = DefaultHasher::new();
    body.hash(&mut hasher);
    format!("len={},digest={:016x}", body.len(), hasher.finish())
}

/// HTTP client for the FxA OAuth and profile servers.
#[derive(Clone)]
pub struct HttpIdentityClient {
    http_client: reqwest::Client,
}

impl HttpIdentityClient {
    /// Create a client whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> FlowResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("fxa-sample/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http_client })
    }

    async fn failure_summary(response: reqwest::Response) -> (reqwest::StatusCode, String) {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        (status, summarize_response_body(&body))
    }
}

#[async_trait]
impl IdentityClient for HttpIdentityClient {
    async fn fetch_openid_configuration(&self, url: &Url) -> FlowResult<OpenIdConfiguration> {
        let response = self.http_client.get(url.clone()).send().await?;

        if !response.status().is_success() {
            let (status, body_summary) = Self::failure_summary(response).await;
            tracing::error!(%url, %status, %body_summary, "Failed to fetch OpenID configuration");
            return Err(FlowError::ConfigFetch(format!(
                "{} returned {} ({})",
                url, status, body_summary
            )));
        }

        let document = response
            .json::<OpenIdConfiguration>()
            .await
            .map_err(|e| FlowError::ConfigFetch(format!("malformed document at {}: {}", url, e)))?;
        tracing::debug!(issuer = %document.issuer, "Fetched OpenID configuration");
        Ok(document)
    }

    async fn exchange_code(
        &self,
        token_endpoint: &Url,
        request: &TokenRequest,
    ) -> FlowResult<TokenResponse> {
        let response = self
            .http_client
            .post(token_endpoint.clone())
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            let (status, body_summary) = Self::failure_summary(response).await;
            tracing::error!(%status, %body_summary, "Token exchange rejected");
            return Err(FlowError::TokenExchange(format!(
                "token endpoint returned {} ({})",
                status, body_summary
            )));
        }

        response
            .json::<TokenResponse>()
            .await
            .map_err(|e| FlowError::TokenExchange(format!("malformed token response: {}", e)))
    }

    async fn fetch_profile(
        &self,
        profile_endpoint: &Url,
        access_token: &str,
    ) -> FlowResult<Profile> {
        let response = self
            .http_client
            .get(profile_endpoint.clone())
            .bearer_auth(access_token)
            .send()
            .await?;

        if !response.status().is_success() {
            let (status, body_summary) = Self::failure_summary(response).await;
            tracing::warn!(%status, %body_summary, "Profile fetch failed");
            return Err(FlowError::ProfileFetch(format!(
                "profile endpoint returned {} ({})",
                status, body_summary
            )));
        }

        response
            .json::<Profile>()
            .await
            .map_err(|e| FlowError::ProfileFetch(format!("malformed profile: {}", e)))
    }
}
