//! Authorization URL construction, code exchange, and profile fetch.

use crate::client::{IdentityClient, TokenRequest, TokenResponse};
use crate::error::{FlowError, FlowResult};
use crate::pkce::{generate_pkce_pair, generate_state, KeyExchange};
use crate::profile::Profile;
use crate::state::{
    is_key_bearing_scope, AccountState, FlowKind, FlowRequest, PendingFlow, ScopedKey,
    SessionCredentials,
};
use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::debug;
use url::Url;

/// Completes flows against the identity service.
#[derive(Clone)]
pub struct TokenExchangeClient {
    client: Arc<dyn IdentityClient>,
}

impl TokenExchangeClient {
    pub fn new(client: Arc<dyn IdentityClient>) -> Self {
        Self { client }
    }

    pub fn identity_client(&self) -> &dyn IdentityClient {
        self.client.as_ref()
    }

    /// Authorization URL for the browser flow, plus the pending slot it implies.
    pub fn authorization_url(
        state: &AccountState,
        request: &FlowRequest,
    ) -> FlowResult<(Url, PendingFlow)> {
        let endpoint = state.config.authorization_endpoint.clone();
        Ok(build_flow_url(
            endpoint,
            state,
            FlowKind::Standard,
            &request.scopes,
            request.wants_keys,
        ))
    }

    /// Supplicant URL for a pairing channel. Keys are requested whenever a
    /// key-bearing scope is asked for.
    pub fn pairing_url(
        state: &AccountState,
        pairing_url: &str,
        scopes: &BTreeSet<String>,
    ) -> FlowResult<(Url, PendingFlow)> {
        let channel = Url::parse(pairing_url)?;
        let endpoint = state.config.pairing_supplicant_url()?;
        let wants_keys = scopes.iter().any(|s| is_key_bearing_scope(s));

        let (mut url, pending) =
            build_flow_url(endpoint, state, FlowKind::Pairing, scopes, wants_keys);
        url.set_fragment(channel.fragment());
        Ok((url, pending))
    }

    /// Exchange `code` for credentials. The caller has already matched `state`.
    pub async fn exchange(
        &self,
        state: &AccountState,
        pending: &PendingFlow,
        code: &str,
    ) -> FlowResult<(SessionCredentials, Option<BTreeMap<String, ScopedKey>>)> {
        let request =
            TokenRequest::authorization_code(&state.client_id, code, &pending.pkce.code_verifier);
        let response = self
            .client
            .exchange_code(&state.config.token_endpoint, &request)
            .await
            .map_err(|e| match e {
                FlowError::Network(_) | FlowError::TokenExchange(_) => e,
                other => FlowError::TokenExchange(other.to_string()),
            })?;

        if response.access_token.is_empty() {
            return Err(FlowError::TokenExchange(
                "token response has an empty access_token".to_string(),
            ));
        }

        let keys = scoped_keys(pending, &response);
        let credentials = credentials_from_response(response, &pending.scopes, Utc::now())?;
        debug!(
            scopes = ?credentials.scopes,
            has_keys = keys.is_some(),
            "Authorization code exchanged"
        );
        Ok((credentials, keys))
    }

    /// Fetch the profile with the account's access token.
    pub async fn profile(&self, state: &AccountState) -> FlowResult<Profile> {
        let session = state.session.as_ref().ok_or(FlowError::NotAuthenticated)?;
        self.client
            .fetch_profile(&state.config.profile_endpoint, &session.access_token)
            .await
            .map_err(|e| match e {
                FlowError::Network(_) | FlowError::ProfileFetch(_) => e,
                other => FlowError::ProfileFetch(other.to_string()),
            })
    }
}

fn build_flow_url(
    mut url: Url,
    state: &AccountState,
    kind: FlowKind,
    scopes: &BTreeSet<String>,
    wants_keys: bool,
) -> (Url, PendingFlow) {
    let pkce = generate_pkce_pair();
    let nonce = generate_state();
    let key_exchange = wants_keys.then(KeyExchange::generate);
    let scope = scopes
        .iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(" ");

    {
        let mut query = url.query_pairs_mut();
        query
            .append_pair("client_id", &state.client_id)
            .append_pair("redirect_uri", &state.redirect_uri)
            .append_pair("scope", &scope)
            .append_pair("state", &nonce)
            .append_pair("code_challenge", &pkce.code_challenge)
            .append_pair("code_challenge_method", "S256")
            .append_pair("access_type", "offline");
        if let Some(exchange) = &key_exchange {
            query.append_pair("keys_jwk", &exchange.keys_jwk());
        }
    }

    let pending = PendingFlow {
        kind,
        state: nonce,
        pkce,
        scopes: scopes.clone(),
        key_exchange,
    };
    (url, pending)
}

fn credentials_from_response(
    response: TokenResponse,
    requested: &BTreeSet<String>,
    now: DateTime<Utc>,
) -> FlowResult<SessionCredentials> {
    let expires_at = Duration::try_seconds(response.expires_in.max(0))
        .and_then(|lifetime| now.checked_add_signed(lifetime))
        .ok_or_else(|| {
            FlowError::TokenExchange(format!(
                "expires_in {} is out of range",
                response.expires_in
            ))
        })?;
    let granted: BTreeSet<String> = response
        .scope
        .split_whitespace()
        .map(String::from)
        .collect();
    Ok(SessionCredentials {
        access_token: response.access_token,
        refresh_token: response.refresh_token,
        session_token: response.session_token,
        scopes: if granted.is_empty() {
            requested.clone()
        } else {
            granted
        },
        expires_at,
    })
}

fn scoped_keys(
    pending: &PendingFlow,
    response: &TokenResponse,
) -> Option<BTreeMap<String, ScopedKey>> {
    let exchange = pending.key_exchange.as_ref()?;
    let jwe = response.keys_jwe.as_ref()?;
    let key = ScopedKey {
        keys_jwe: jwe.clone(),
        exchange_secret: exchange.secret_b64(),
    };
    let keys: BTreeMap<String, ScopedKey> = pending
        .scopes
        .iter()
        .filter(|scope| is_key_bearing_scope(scope))
        .map(|scope| (scope.clone(), key.clone()))
        .collect();
    (!keys.is_empty()).then_some(keys)
}
