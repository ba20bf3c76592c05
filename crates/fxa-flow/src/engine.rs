//! Session bootstrap: restore, standard, or pairing.

use crate::account::Account;
use crate::client::IdentityClient;
use crate::error::{FlowError, FlowResult};
use crate::flow_fsm::{FlowMachineInput, FlowTracker};
use crate::persistence::PersistenceGateway;
use crate::remote_config::RemoteConfig;
use crate::state::{AccountState, FlowRequest};
use crate::token_exchange::TokenExchangeClient;
use fxa_config_and_utils::Config;
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};
use url::Url;

/// Client registration and server locations the flows run against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowSettings {
    pub client_id: String,
    pub redirect_uri: String,
    pub content_url: String,
    pub pairing_content_url: String,
}

impl FlowSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            client_id: config.client_id.clone(),
            redirect_uri: config.redirect_uri.clone(),
            content_url: config.content_url.clone(),
            pairing_content_url: config.pairing_content_url.clone(),
        }
    }
}

/// How bootstrap produced the account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapOutcome {
    /// Authenticated account recovered from storage.
    Restored,
    /// Pending account; waits for an explicit `begin_oauth_flow`.
    NeedsOAuth,
    /// Pending account with a pairing flow already started.
    PairingStarted { auth_url: Url },
}

/// Result of one bootstrap run.
pub struct Bootstrap {
    pub account: Arc<Account>,
    pub outcome: BootstrapOutcome,
}

/// Runs the bootstrap half of the flow state machine.
pub struct AuthFlowEngine {
    settings: FlowSettings,
    exchange: TokenExchangeClient,
    persistence: PersistenceGateway,
}

impl AuthFlowEngine {
    pub fn new(
        settings: FlowSettings,
        client: Arc<dyn IdentityClient>,
        persistence: PersistenceGateway,
    ) -> Self {
        Self {
            settings,
            exchange: TokenExchangeClient::new(client),
            persistence,
        }
    }

    pub fn settings(&self) -> &FlowSettings {
        &self.settings
    }

    pub fn persistence(&self) -> &PersistenceGateway {
        &self.persistence
    }

    /// Produce the session's account.
    ///
    /// A persisted authenticated account is restored without any network
    /// call. Otherwise the remote configuration is resolved once and, when
    /// `pairing_url` is present, a pairing flow is started immediately.
    pub async fn bootstrap(
        &self,
        pairing_url: Option<&str>,
        request: &FlowRequest,
    ) -> FlowResult<Bootstrap> {
        let mut flow = FlowTracker::new();

        if let Some(state) = self.load_persisted()? {
            flow.transition(FlowMachineInput::PersistedStateFound)?;
            let expired = state
                .session
                .as_ref()
                .is_some_and(|session| session.is_expired(Utc::now()));
            if expired {
                warn!(client_id = %state.client_id, "Restored account holds an expired access token");
            } else {
                info!(client_id = %state.client_id, "Restored persisted account");
            }
            return Ok(Bootstrap {
                account: Arc::new(self.account(state, flow)),
                outcome: BootstrapOutcome::Restored,
            });
        }
        flow.transition(FlowMachineInput::NoPersistedState)?;

        match pairing_url {
            Some(pairing_url) => {
                flow.transition(FlowMachineInput::PairingRequested)?;
                let config = RemoteConfig::resolve_pairing(
                    self.exchange.identity_client(),
                    &self.settings.pairing_content_url,
                )
                .await?;
                let account = Arc::new(self.account(self.pending_state(config), flow));
                let auth_url = account
                    .begin_pairing_flow(pairing_url, &request.scopes)
                    .await?;
                Ok(Bootstrap {
                    account,
                    outcome: BootstrapOutcome::PairingStarted { auth_url },
                })
            }
            None => {
                flow.transition(FlowMachineInput::StandardRequested)?;
                let config = RemoteConfig::resolve_standard(
                    self.exchange.identity_client(),
                    &self.settings.content_url,
                )
                .await?;
                flow.transition(FlowMachineInput::ConfigResolved)?;
                info!("Pending account ready, waiting for a flow to start");
                Ok(Bootstrap {
                    account: Arc::new(self.account(self.pending_state(config), flow)),
                    outcome: BootstrapOutcome::NeedsOAuth,
                })
            }
        }
    }

    /// Persisted account usable by this client, if any. Unreadable blobs
    /// and blobs issued to another client id are ignored.
    fn load_persisted(&self) -> FlowResult<Option<AccountState>> {
        match self.persistence.load() {
            Ok(Some(state)) if state.client_id != self.settings.client_id => {
                warn!(
                    stored = %state.client_id,
                    configured = %self.settings.client_id,
                    "Persisted account belongs to another client id, ignoring it"
                );
                Ok(None)
            }
            Ok(state) => Ok(state),
            Err(FlowError::Deserialize(reason)) => {
                warn!(%reason, "Persisted account is unreadable, starting a new flow");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn pending_state(&self, config: RemoteConfig) -> AccountState {
        AccountState::new(config, &self.settings.client_id, &self.settings.redirect_uri)
    }

    fn account(&self, state: AccountState, flow: FlowTracker) -> Account {
        Account::new(state, flow, self.exchange.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow_fsm::FlowState;
    use crate::state::SessionCredentials;
    use crate::test_support::{document_for, FakeIdentityClient};
    use chrono::{Duration, Utc};
    use fxa_storage::{MemoryStorage, SecureStorage, StorageKeys};

    fn settings() -> FlowSettings {
        FlowSettings {
            client_id: "client-id".to_string(),
            redirect_uri: "fxaclient://android.redirect".to_string(),
            content_url: "https://accounts.example".to_string(),
            pairing_content_url: "https://pair.example".to_string(),
        }
    }

    fn engine(
        fake: Arc<FakeIdentityClient>,
        storage: Arc<MemoryStorage>,
    ) -> AuthFlowEngine {
        AuthFlowEngine::new(settings(), fake, PersistenceGateway::new(storage))
    }

    fn persisted(client_id: &str) -> AccountState {
        let config =
            RemoteConfig::from_document(&document_for("https://accounts.example")).unwrap();
        let mut state = AccountState::new(config, client_id, "fxaclient://android.redirect");
        state.session = Some(SessionCredentials {
            access_token: "at".to_string(),
            refresh_token: None,
            session_token: None,
            scopes: ["profile".to_string()].into_iter().collect(),
            expires_at: Utc::now() + Duration::hours(1),
        });
        state
    }

    #[tokio::test]
    async fn test_restore_makes_no_network_call() {
        let fake = Arc::new(FakeIdentityClient::new());
        let storage = Arc::new(MemoryStorage::new());
        let engine = engine(fake.clone(), storage);
        engine.persistence().save(&persisted("client-id")).unwrap();

        let bootstrap = engine.bootstrap(None, &FlowRequest::profile()).await.unwrap();
        assert_eq!(bootstrap.outcome, BootstrapOutcome::Restored);
        assert_eq!(bootstrap.account.flow_state().await, FlowState::Restored);
        assert!(fake.config_requests().is_empty());
        assert!(fake.token_requests().is_empty());
    }

    #[tokio::test]
    async fn test_expired_account_is_still_restored() {
        let fake = Arc::new(FakeIdentityClient::new());
        let engine = engine(fake.clone(), Arc::new(MemoryStorage::new()));
        let mut state = persisted("client-id");
        if let Some(session) = state.session.as_mut() {
            session.expires_at = Utc::now() - Duration::hours(1);
        }
        engine.persistence().save(&state).unwrap();

        let bootstrap = engine.bootstrap(None, &FlowRequest::profile()).await.unwrap();
        assert_eq!(bootstrap.outcome, BootstrapOutcome::Restored);
        assert!(fake.config_requests().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_blob_falls_back_to_standard() {
        let fake = Arc::new(FakeIdentityClient::new());
        let storage = Arc::new(MemoryStorage::new());
        storage
            .set(StorageKeys::ACCOUNT_STATE, "definitely not json")
            .unwrap();
        let engine = engine(fake.clone(), storage);

        let bootstrap = engine.bootstrap(None, &FlowRequest::profile()).await.unwrap();
        assert_eq!(bootstrap.outcome, BootstrapOutcome::NeedsOAuth);
        assert_eq!(bootstrap.account.flow_state().await, FlowState::Idle);
        assert_eq!(fake.config_requests().len(), 1);
    }

    #[tokio::test]
    async fn test_foreign_client_id_is_ignored() {
        let fake = Arc::new(FakeIdentityClient::new());
        let storage = Arc::new(MemoryStorage::new());
        let engine = engine(fake, storage);
        engine.persistence().save(&persisted("someone-else")).unwrap();

        let bootstrap = engine.bootstrap(None, &FlowRequest::profile()).await.unwrap();
        assert_eq!(bootstrap.outcome, BootstrapOutcome::NeedsOAuth);
    }

    #[tokio::test]
    async fn test_pairing_starts_without_trigger() {
        let fake = Arc::new(FakeIdentityClient::new());
        let engine = engine(fake.clone(), Arc::new(MemoryStorage::new()));

        let bootstrap = engine
            .bootstrap(Some("https://pair.example/abc"), &FlowRequest::profile())
            .await
            .unwrap();

        match bootstrap.outcome {
            BootstrapOutcome::PairingStarted { auth_url } => {
                assert!(auth_url
                    .as_str()
                    .starts_with("https://pair.example/pair/supp?"));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(
            bootstrap.account.flow_state().await,
            FlowState::AwaitingRedirect
        );
        assert_eq!(
            fake.config_requests(),
            vec!["https://pair.example/.well-known/openid-configuration".to_string()]
        );
    }

    #[tokio::test]
    async fn test_config_failure_propagates() {
        let fake = Arc::new(FakeIdentityClient::new());
        fake.fail_config();
        let engine = engine(fake, Arc::new(MemoryStorage::new()));

        let result = engine.bootstrap(None, &FlowRequest::profile()).await;
        assert!(matches!(result, Err(FlowError::ConfigFetch(_))));
    }

    #[test]
    fn test_settings_from_config() {
        let config = Config::new();
        let settings = FlowSettings::from_config(&config);
        assert_eq!(settings.client_id, config.client_id);
        assert_eq!(settings.content_url, config.content_url);
    }
}
