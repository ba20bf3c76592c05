//! Serializable account state and the transient flow request/pending slot.

use crate::error::{FlowError, FlowResult};
use crate::pkce::{KeyExchange, PkcePair};
use crate::remote_config::RemoteConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Version written into every persisted blob.
pub const SCHEMA_VERSION: u32 = 1;

/// Scope that grants profile read access.
pub const PROFILE_SCOPE: &str = "profile";

/// Scope that carries Sync encryption keys.
pub const OLD_SYNC_SCOPE: &str = "https://identity.mozilla.com/apps/oldsync";

const KEY_BEARING_SCOPE_PREFIX: &str = "https://identity.mozilla.com/apps/";

/// Returns true for scopes whose grant can include key material.
pub fn is_key_bearing_scope(scope: &str) -> bool {
    scope.starts_with(KEY_BEARING_SCOPE_PREFIX)
}

/// Scopes and key preference for one flow invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowRequest {
    pub scopes: BTreeSet<String>,
    pub wants_keys: bool,
}

impl FlowRequest {
    pub fn new<I, S>(scopes: I, wants_keys: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            scopes: scopes.into_iter().map(Into::into).collect(),
            wants_keys,
        }
    }

    /// Profile access only.
    pub fn profile() -> Self {
        Self::new([PROFILE_SCOPE], false)
    }

    /// Profile access plus Sync keys.
    pub fn with_sync_keys() -> Self {
        Self::new([PROFILE_SCOPE, OLD_SYNC_SCOPE], true)
    }

    /// Space-separated `scope` parameter.
    pub fn scope_param(&self) -> String {
        self.scopes
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl Default for FlowRequest {
    fn default() -> Self {
        Self::profile()
    }
}

/// Token material returned by the token endpoint.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCredentials {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_token: Option<String>,
    pub scopes: BTreeSet<String>,
    pub expires_at: DateTime<Utc>,
}

impl SessionCredentials {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

impl std::fmt::Debug for SessionCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCredentials")
            .field("access_token", &"[redacted]")
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("has_session_token", &self.session_token.is_some())
            .field("scopes", &self.scopes)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Encrypted key bundle for one scope plus the exchange key that opens it.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopedKey {
    pub keys_jwe: String,
    pub exchange_secret: String,
}

impl std::fmt::Debug for ScopedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ScopedKey([redacted])")
    }
}

/// Which kind of flow produced the pending slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowKind {
    Standard,
    Pairing,
}

/// The single expected-state slot. Never persisted.
#[derive(Clone, PartialEq, Eq)]
pub struct PendingFlow {
    pub kind: FlowKind,
    pub state: String,
    pub pkce: PkcePair,
    pub scopes: BTreeSet<String>,
    pub key_exchange: Option<KeyExchange>,
}

impl PendingFlow {
    pub fn wants_keys(&self) -> bool {
        self.key_exchange.is_some()
    }
}

impl std::fmt::Debug for PendingFlow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingFlow")
            .field("kind", &self.kind)
            .field("scopes", &self.scopes)
            .field("wants_keys", &self.wants_keys())
            .finish_non_exhaustive()
    }
}

/// Pending or authenticated account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountState {
    pub config: RemoteConfig,
    pub client_id: String,
    pub redirect_uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionCredentials>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keys: Option<BTreeMap<String, ScopedKey>>,
    #[serde(skip)]
    pub(crate) pending: Option<PendingFlow>,
}

#[derive(Serialize)]
struct PersistedRef<'a> {
    schema_version: u32,
    #[serde(flatten)]
    state: &'a AccountState,
}

#[derive(Deserialize)]
struct Persisted {
    schema_version: u32,
    #[serde(flatten)]
    state: AccountState,
}

impl AccountState {
    /// A pending account with no credentials.
    pub fn new(config: RemoteConfig, client_id: &str, redirect_uri: &str) -> Self {
        Self {
            config,
            client_id: client_id.to_string(),
            redirect_uri: redirect_uri.to_string(),
            session: None,
            keys: None,
            pending: None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.is_some()
    }

    pub fn pending(&self) -> Option<&PendingFlow> {
        self.pending.as_ref()
    }

    /// Serialize to the persisted blob format.
    pub fn to_json(&self) -> FlowResult<String> {
        Ok(serde_json::to_string(&PersistedRef {
            schema_version: SCHEMA_VERSION,
            state: self,
        })?)
    }

    /// Parse a persisted blob. Any failure is a `Deserialize` error.
    pub fn from_json(json: &str) -> FlowResult<Self> {
        let persisted: Persisted =
            serde_json::from_str(json).map_err(|e| FlowError::Deserialize(e.to_string()))?;
        if persisted.schema_version != SCHEMA_VERSION {
            return Err(FlowError::Deserialize(format!(
                "unsupported schema_version {}",
                persisted.schema_version
            )));
        }
        Ok(persisted.state)
    }
}
