//! Identity-service endpoint set resolved from OpenID discovery.

use crate::client::{IdentityClient, OpenIdConfiguration};
use crate::error::{FlowError, FlowResult};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

const WELL_KNOWN_PATH: &str = ".well-known/openid-configuration";
const PAIRING_SUPPLICANT_PATH: &str = "pair/supp";

/// Endpoints of one identity service deployment. Immutable once resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub issuer_base_url: Url,
    pub authorization_endpoint: Url,
    pub token_endpoint: Url,
    pub profile_endpoint: Url,
}

impl RemoteConfig {
    /// Resolve the configuration of the regular content server.
    pub async fn resolve_standard(client: &dyn IdentityClient, base_url: &str) -> FlowResult<Self> {
        Self::resolve(client, base_url).await
    }

    /// Resolve the configuration of the server that hosts pairing channels.
    pub async fn resolve_pairing(
        client: &dyn IdentityClient,
        pairing_base_url: &str,
    ) -> FlowResult<Self> {
        Self::resolve(client, pairing_base_url).await
    }

    async fn resolve(client: &dyn IdentityClient, base_url: &str) -> FlowResult<Self> {
        let discovery = well_known_url(base_url)?;
        debug!(url = %discovery, "Resolving remote configuration");

        let document = client
            .fetch_openid_configuration(&discovery)
            .await
            .map_err(|e| match e {
                FlowError::Network(_) | FlowError::ConfigFetch(_) => e,
                other => FlowError::ConfigFetch(other.to_string()),
            })?;
        let config = Self::from_document(&document)?;
        info!(issuer = %config.issuer_base_url, "Remote configuration resolved");
        Ok(config)
    }

    /// Build from a discovery document, rejecting unparseable endpoints.
    pub fn from_document(document: &OpenIdConfiguration) -> FlowResult<Self> {
        let parse = |field: &str, value: &str| {
            Url::parse(value).map_err(|e| {
                FlowError::ConfigFetch(format!("invalid {} {:?}: {}", field, value, e))
            })
        };

        Ok(Self {
            issuer_base_url: parse("issuer", &document.issuer)?,
            authorization_endpoint: parse(
                "authorization_endpoint",
                &document.authorization_endpoint,
            )?,
            token_endpoint: parse("token_endpoint", &document.token_endpoint)?,
            profile_endpoint: parse("userinfo_endpoint", &document.userinfo_endpoint)?,
        })
    }

    /// Page where a supplicant device joins a pairing channel.
    pub fn pairing_supplicant_url(&self) -> FlowResult<Url> {
        join_path(self.issuer_base_url.as_str(), PAIRING_SUPPLICANT_PATH)
    }
}

fn well_known_url(base_url: &str) -> FlowResult<Url> {
    let base = Url::parse(base_url)?;
    join_path(base.as_str(), WELL_KNOWN_PATH)
}

fn join_path(base: &str, path: &str) -> FlowResult<Url> {
    Ok(Url::parse(&format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path
    ))?)
}
