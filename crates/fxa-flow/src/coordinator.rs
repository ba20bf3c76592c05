//! Session-scoped orchestration of the current account.

use crate::account::Account;
use crate::engine::{AuthFlowEngine, BootstrapOutcome};
use crate::error::{FlowError, FlowResult};
use crate::profile::Profile;
use crate::redirect::RedirectParams;
use crate::state::FlowRequest;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{mpsc, OnceCell};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

/// Where the UI should open an authorization URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UrlSurface {
    /// System browser tab.
    #[default]
    CustomTab,
    /// Embedded web view that reports the redirect URL back.
    WebView,
}

impl std::fmt::Display for UrlSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UrlSurface::CustomTab => f.write_str("custom-tab"),
            UrlSurface::WebView => f.write_str("web-view"),
        }
    }
}

/// Notifications for the UI task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    OpenUrl { url: Url, surface: UrlSurface },
    ProfileUpdated(Profile),
    Failed(String),
    LoggedOut,
}

type AccountSlot = Arc<OnceCell<Arc<Account>>>;

/// Owns the one in-flight "current account" computation of a session.
pub struct SessionCoordinator {
    engine: AuthFlowEngine,
    pairing_url: Option<String>,
    bootstrap_request: FlowRequest,
    slot: Mutex<AccountSlot>,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl SessionCoordinator {
    /// Create a coordinator and the receiver its events are delivered to.
    ///
    /// `pairing_url`, when present, starts a pairing flow during bootstrap
    /// with the scopes of `bootstrap_request`.
    pub fn new(
        engine: AuthFlowEngine,
        pairing_url: Option<String>,
        bootstrap_request: FlowRequest,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let coordinator = Self {
            engine,
            pairing_url,
            bootstrap_request,
            slot: Mutex::new(Arc::new(OnceCell::new())),
            events,
        };
        (coordinator, receiver)
    }

    /// The current account, bootstrapping it on first use.
    ///
    /// Concurrent callers share one bootstrap and receive the same handle.
    /// A failed bootstrap is not memoized; the next call retries.
    pub async fn account(&self) -> FlowResult<Arc<Account>> {
        let slot = self.current_slot();
        let account = slot.get_or_try_init(|| self.bootstrap()).await?;
        Ok(account.clone())
    }

    /// Start a browser flow and ask the UI to open it on `surface`.
    pub async fn begin_oauth(&self, request: &FlowRequest, surface: UrlSurface) -> FlowResult<Url> {
        let result = async {
            let account = self.account().await?;
            account.begin_oauth_flow(request).await
        }
        .await;

        let url = self.report(result)?;
        self.emit(SessionEvent::OpenUrl {
            url: url.clone(),
            surface,
        });
        Ok(url)
    }

    /// Complete the pending flow with a redirect's `(code, state)`, persist
    /// the account and refresh the profile.
    pub async fn on_redirect(&self, code: &str, state: &str) -> FlowResult<Profile> {
        let result = self.complete(code, state).await;
        self.report(result)
    }

    /// Same as [`on_redirect`](Self::on_redirect) for a full redirect URL.
    pub async fn on_redirect_url(&self, redirect_url: &str) -> FlowResult<Profile> {
        let params = self.report(RedirectParams::from_url(redirect_url))?;
        self.on_redirect(&params.code, &params.state).await
    }

    /// Clear persisted state and discard the current account. The next
    /// [`account`](Self::account) call bootstraps afresh.
    ///
    /// A bootstrap still in flight is waited for, and the account it
    /// produces is discarded as well.
    pub async fn logout(&self) -> FlowResult<()> {
        self.report(self.engine.persistence().clear())?;

        let previous = {
            let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *slot, Arc::new(OnceCell::new()))
        };
        // Never bootstraps: an empty or failed cell resolves to an error here.
        let settled = previous
            .get_or_try_init(|| async { Err(FlowError::AccountDiscarded) })
            .await;
        if let Ok(account) = settled {
            account.close().await;
        }

        info!("Logged out");
        self.emit(SessionEvent::LoggedOut);
        Ok(())
    }

    /// Release the current account on a background task.
    pub fn shutdown(&self) -> Option<JoinHandle<()>> {
        let account = self.current_slot().get().cloned()?;
        debug!("Releasing account in the background");
        Some(tokio::spawn(async move {
            account.close().await;
        }))
    }

    async fn bootstrap(&self) -> FlowResult<Arc<Account>> {
        let bootstrap = self
            .engine
            .bootstrap(self.pairing_url.as_deref(), &self.bootstrap_request)
            .await?;

        match bootstrap.outcome {
            BootstrapOutcome::Restored => match bootstrap.account.get_profile(false).await {
                Ok(profile) => self.emit(SessionEvent::ProfileUpdated(profile)),
                Err(e) => {
                    warn!(error = %e, "Restored account but profile fetch failed");
                    self.emit(SessionEvent::Failed(e.to_string()));
                }
            },
            BootstrapOutcome::NeedsOAuth => {}
            BootstrapOutcome::PairingStarted { auth_url } => {
                self.emit(SessionEvent::OpenUrl {
                    url: auth_url,
                    surface: UrlSurface::WebView,
                });
            }
        }
        Ok(bootstrap.account)
    }

    async fn complete(&self, code: &str, state: &str) -> FlowResult<Profile> {
        let account = self.account().await?;
        account.complete_oauth_flow(code, state).await?;
        self.engine.persistence().save(&account.snapshot().await)?;

        let profile = account.get_profile(true).await?;
        self.emit(SessionEvent::ProfileUpdated(profile.clone()));
        Ok(profile)
    }

    fn current_slot(&self) -> AccountSlot {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn report<T>(&self, result: FlowResult<T>) -> FlowResult<T> {
        if let Err(e) = &result {
            warn!(error = %e, transient = e.is_transient(), "Session operation failed");
            self.emit(SessionEvent::Failed(e.to_string()));
        }
        result
    }

    fn emit(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            debug!("Session event receiver dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::FlowSettings;
    use crate::persistence::PersistenceGateway;
    use crate::test_support::{FakeIdentityClient, GOOD_CODE};
    use fxa_storage::MemoryStorage;

    fn coordinator(
        fake: Arc<FakeIdentityClient>,
    ) -> (SessionCoordinator, mpsc::UnboundedReceiver<SessionEvent>) {
        let settings = FlowSettings {
            client_id: "client-id".to_string(),
            redirect_uri: "fxaclient://android.redirect".to_string(),
            content_url: "https://accounts.example".to_string(),
            pairing_content_url: "https://pair.example".to_string(),
        };
        let engine = AuthFlowEngine::new(
            settings,
            fake,
            PersistenceGateway::new(Arc::new(MemoryStorage::new())),
        );
        SessionCoordinator::new(engine, None, FlowRequest::profile())
    }

    fn state_param(url: &Url) -> String {
        url.query_pairs()
            .find(|(k, _)| k == "state")
            .map(|(_, v)| v.into_owned())
            .unwrap()
    }

    #[tokio::test]
    async fn test_account_is_memoized() {
        let fake = Arc::new(FakeIdentityClient::new());
        let (coordinator, _events) = coordinator(fake.clone());

        let a = coordinator.account().await.unwrap();
        let b = coordinator.account().await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(fake.config_requests().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_bootstrap_is_retried() {
        let fake = Arc::new(FakeIdentityClient::new());
        fake.fail_config();
        let (coordinator, _events) = coordinator(fake.clone());

        assert!(coordinator.account().await.is_err());
        assert!(coordinator.account().await.is_err());
        assert_eq!(fake.config_requests().len(), 2);
    }

    #[tokio::test]
    async fn test_begin_emits_open_url() {
        let (coordinator, mut events) = coordinator(Arc::new(FakeIdentityClient::new()));

        let url = coordinator
            .begin_oauth(&FlowRequest::profile(), UrlSurface::WebView)
            .await
            .unwrap();
        assert_eq!(
            events.recv().await.unwrap(),
            SessionEvent::OpenUrl {
                url,
                surface: UrlSurface::WebView
            }
        );
    }

    #[tokio::test]
    async fn test_mismatch_emits_failed() {
        let (coordinator, mut events) = coordinator(Arc::new(FakeIdentityClient::new()));
        coordinator
            .begin_oauth(&FlowRequest::profile(), UrlSurface::CustomTab)
            .await
            .unwrap();
        let _open = events.recv().await.unwrap();

        assert!(coordinator.on_redirect(GOOD_CODE, "forged").await.is_err());
        assert!(matches!(
            events.recv().await.unwrap(),
            SessionEvent::Failed(_)
        ));
    }

    #[tokio::test]
    async fn test_redirect_url_ingestion() {
        let (coordinator, mut events) = coordinator(Arc::new(FakeIdentityClient::new()));
        let url = coordinator
            .begin_oauth(&FlowRequest::profile(), UrlSurface::WebView)
            .await
            .unwrap();
        let _open = events.recv().await.unwrap();

        let redirect = format!(
            "fxaclient://android.redirect?code={}&state={}",
            GOOD_CODE,
            state_param(&url)
        );
        let profile = coordinator.on_redirect_url(&redirect).await.unwrap();
        assert_eq!(
            events.recv().await.unwrap(),
            SessionEvent::ProfileUpdated(profile)
        );
    }

    #[tokio::test]
    async fn test_shutdown_releases_account() {
        let (coordinator, _events) = coordinator(Arc::new(FakeIdentityClient::new()));
        assert!(coordinator.shutdown().is_none());

        let account = coordinator.account().await.unwrap();
        coordinator.shutdown().unwrap().await.unwrap();
        assert_eq!(
            account.flow_state().await,
            crate::flow_fsm::FlowState::Discarded
        );
    }

    #[test]
    fn test_surface_display() {
        assert_eq!(UrlSurface::CustomTab.to_string(), "custom-tab");
        assert_eq!(UrlSurface::WebView.to_string(), "web-view");
        assert_eq!(UrlSurface::default(), UrlSurface::CustomTab);
    }
}
