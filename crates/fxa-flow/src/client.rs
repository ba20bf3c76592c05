//! Network seam to the identity service.

use crate::error::FlowResult;
use crate::profile::Profile;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

/// Fields of `/.well-known/openid-configuration` the flows need.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenIdConfiguration {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub userinfo_endpoint: String,
}

/// Body of the authorization-code grant.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct TokenRequest {
    pub grant_type: &'static str,
    pub client_id: String,
    pub code: String,
    pub code_verifier: String,
}

impl TokenRequest {
    pub fn authorization_code(client_id: &str, code: &str, code_verifier: &str) -> Self {
        Self {
            grant_type: "authorization_code",
            client_id: client_id.to_string(),
            code: code.to_string(),
            code_verifier: code_verifier.to_string(),
        }
    }
}

impl std::fmt::Debug for TokenRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenRequest")
            .field("grant_type", &self.grant_type)
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

/// Token endpoint response.
#[derive(Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub session_token: Option<String>,
    #[serde(default)]
    pub scope: String,
    pub expires_in: i64,
    #[serde(default)]
    pub keys_jwe: Option<String>,
}

impl std::fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenResponse")
            .field("scope", &self.scope)
            .field("expires_in", &self.expires_in)
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("has_keys", &self.keys_jwe.is_some())
            .finish_non_exhaustive()
    }
}

/// Operations the flows perform against the identity service.
///
/// Implementations map transport failures to `FlowError::Network` and
/// protocol failures to the operation's own variant.
#[async_trait]
pub trait IdentityClient: Send + Sync {
    /// GET the OpenID configuration document.
    async fn fetch_openid_configuration(&self, url: &Url) -> FlowResult<OpenIdConfiguration>;

    /// POST an authorization-code grant to the token endpoint.
    async fn exchange_code(
        &self,
        token_endpoint: &Url,
        request: &TokenRequest,
    ) -> FlowResult<TokenResponse>;

    /// GET the profile with a bearer token.
    async fn fetch_profile(&self, profile_endpoint: &Url, access_token: &str)
        -> FlowResult<Profile>;
}
