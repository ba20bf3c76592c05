//! Shared handle to the current account.
//!
//! All mutation goes through one `tokio::sync::Mutex`, so completion,
//! new flow starts and teardown are serialized against each other.

use crate::error::{FlowError, FlowResult};
use crate::flow_fsm::{FlowMachineInput, FlowState, FlowTracker};
use crate::profile::{CachedProfile, Profile, PROFILE_CACHE_TTL};
use crate::state::{AccountState, FlowRequest, PendingFlow};
use crate::token_exchange::TokenExchangeClient;
use std::collections::BTreeSet;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

struct AccountInner {
    state: AccountState,
    flow: FlowTracker,
    profile: Option<CachedProfile>,
}

impl AccountInner {
    fn ensure_live(&self) -> FlowResult<()> {
        if self.flow.state() == FlowState::Discarded {
            return Err(FlowError::AccountDiscarded);
        }
        Ok(())
    }

    /// Refuse before any PKCE or key material is generated for a flow that
    /// could never be recorded.
    fn ensure_can_begin(&self) -> FlowResult<()> {
        self.ensure_live()?;
        let state = self.flow.state();
        if !state.can_begin_flow() {
            return Err(FlowError::InvalidStateTransition(format!(
                "cannot begin a flow from {}",
                state
            )));
        }
        Ok(())
    }

    /// Move to `AwaitingRedirect` and record `pending`, replacing any earlier flow.
    fn start_flow(&mut self, pending: PendingFlow) -> FlowResult<()> {
        self.flow.transition(FlowMachineInput::FlowStarted)?;
        if self.state.pending.is_some() {
            debug!("Replacing previously pending flow");
        }
        self.state.pending = Some(pending);
        Ok(())
    }
}

/// A pending or authenticated account. Handles stay valid across completion.
pub struct Account {
    inner: Mutex<AccountInner>,
    exchange: TokenExchangeClient,
}

impl Account {
    pub(crate) fn new(state: AccountState, flow: FlowTracker, exchange: TokenExchangeClient) -> Self {
        Self {
            inner: Mutex::new(AccountInner {
                state,
                flow,
                profile: None,
            }),
            exchange,
        }
    }

    pub async fn flow_state(&self) -> FlowState {
        self.inner.lock().await.flow.state()
    }

    pub async fn is_authenticated(&self) -> bool {
        self.inner.lock().await.state.is_authenticated()
    }

    /// Copy of the current state, for persistence.
    pub async fn snapshot(&self) -> AccountState {
        self.inner.lock().await.state.clone()
    }

    /// Serialize to the persisted blob format.
    pub async fn to_json(&self) -> FlowResult<String> {
        self.inner.lock().await.state.to_json()
    }

    /// Issue a browser authorization URL with a fresh nonce.
    ///
    /// Fails with `InvalidStateTransition` once the account is authenticated.
    pub async fn begin_oauth_flow(&self, request: &FlowRequest) -> FlowResult<Url> {
        let mut inner = self.inner.lock().await;
        inner.ensure_can_begin()?;

        let (url, pending) = TokenExchangeClient::authorization_url(&inner.state, request)?;
        inner.start_flow(pending)?;
        info!(scopes = %request.scope_param(), wants_keys = request.wants_keys, "OAuth flow started");
        Ok(url)
    }

    /// Issue a pairing supplicant URL for the channel in `pairing_url`.
    pub async fn begin_pairing_flow(
        &self,
        pairing_url: &str,
        scopes: &BTreeSet<String>,
    ) -> FlowResult<Url> {
        let mut inner = self.inner.lock().await;
        inner.ensure_can_begin()?;

        let (url, pending) = TokenExchangeClient::pairing_url(&inner.state, pairing_url, scopes)?;
        inner.start_flow(pending)?;
        info!(scopes = ?scopes, "Pairing flow started");
        Ok(url)
    }

    /// Exchange the redirect's code for credentials.
    ///
    /// A `state` that does not match the pending nonce fails with
    /// `StateMismatch` and leaves the pending flow untouched. A failed
    /// exchange consumes the pending flow; a new one must be started.
    pub async fn complete_oauth_flow(&self, code: &str, state: &str) -> FlowResult<()> {
        let mut inner = self.inner.lock().await;
        inner.ensure_live()?;

        let pending = match inner.state.pending.as_ref() {
            Some(pending) if pending.state == state => pending.clone(),
            Some(_) => {
                warn!("Redirect state does not match the pending flow");
                return Err(FlowError::StateMismatch);
            }
            None => {
                warn!(flow_state = %inner.flow.state(), "Redirect received with no pending flow");
                return Err(FlowError::StateMismatch);
            }
        };

        match self.exchange.exchange(&inner.state, &pending, code).await {
            Ok((session, keys)) => {
                inner.flow.transition(FlowMachineInput::CompletionSucceeded)?;
                inner.state.session = Some(session);
                inner.state.keys = keys;
                inner.state.pending = None;
                inner.profile = None;
                info!(flow = ?pending.kind, "Flow completed, account authenticated");
                Ok(())
            }
            Err(e) => {
                inner.state.pending = None;
                let _ = inner.flow.transition(FlowMachineInput::CompletionFailed);
                warn!(flow = ?pending.kind, error = %e, "Flow completion failed");
                Err(e)
            }
        }
    }

    /// Profile of the authenticated user, served from memory while fresh.
    pub async fn get_profile(&self, ignore_cache: bool) -> FlowResult<Profile> {
        let mut inner = self.inner.lock().await;
        inner.ensure_live()?;

        if !ignore_cache {
            if let Some(profile) = inner
                .profile
                .as_ref()
                .and_then(|cached| cached.fresh(PROFILE_CACHE_TTL))
            {
                return Ok(profile.clone());
            }
        }

        let profile = self.exchange.profile(&inner.state).await?;
        inner.profile = Some(CachedProfile::new(profile.clone()));
        Ok(profile)
    }

    /// Release the account. Later calls fail with `AccountDiscarded`.
    pub async fn close(&self) {
        let mut inner = self.inner.lock().await;
        if inner.flow.state() == FlowState::Discarded {
            return;
        }
        let _ = inner.flow.transition(FlowMachineInput::Discard);
        inner.state.pending = None;
        inner.profile = None;
        info!("Account discarded");
    }
}
