//! Shared doubles for the session integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use fxa_flow::{
    AuthFlowEngine, FlowError, FlowRequest, FlowResult, FlowSettings, IdentityClient,
    OpenIdConfiguration, PersistenceGateway, Profile, SessionCoordinator, SessionEvent,
    TokenRequest, TokenResponse,
};
use fxa_storage::SecureStorage;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use url::Url;

pub const GOOD_CODE: &str = "good-code";

/// Identity service double. Codes other than [`GOOD_CODE`] are rejected.
#[derive(Default)]
pub struct FakeIdentityClient {
    config_requests: Mutex<Vec<String>>,
    token_requests: AtomicUsize,
    profile_requests: AtomicUsize,
    config_delay: Mutex<Option<Duration>>,
    config_finished_at: Mutex<Option<Instant>>,
}

impl FakeIdentityClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn delay_config(&self, delay: Duration) {
        *self.config_delay.lock().unwrap() = Some(delay);
    }

    pub fn config_requests(&self) -> Vec<String> {
        self.config_requests.lock().unwrap().clone()
    }

    /// When the last configuration fetch returned.
    pub fn config_finished_at(&self) -> Option<Instant> {
        *self.config_finished_at.lock().unwrap()
    }

    pub fn token_requests(&self) -> usize {
        self.token_requests.load(Ordering::SeqCst)
    }

    pub fn profile_requests(&self) -> usize {
        self.profile_requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityClient for FakeIdentityClient {
    async fn fetch_openid_configuration(&self, url: &Url) -> FlowResult<OpenIdConfiguration> {
        self.config_requests.lock().unwrap().push(url.to_string());
        let delay = *self.config_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        *self.config_finished_at.lock().unwrap() = Some(Instant::now());

        let base = url
            .as_str()
            .trim_end_matches(".well-known/openid-configuration")
            .trim_end_matches('/');
        Ok(OpenIdConfiguration {
            issuer: base.to_string(),
            authorization_endpoint: format!("{}/authorization", base),
            token_endpoint: format!("{}/v1/token", base),
            userinfo_endpoint: format!("{}/v1/profile", base),
        })
    }

    async fn exchange_code(
        &self,
        _token_endpoint: &Url,
        request: &TokenRequest,
    ) -> FlowResult<TokenResponse> {
        self.token_requests.fetch_add(1, Ordering::SeqCst);
        if request.code != GOOD_CODE {
            return Err(FlowError::TokenExchange("invalid_grant".to_string()));
        }
        Ok(TokenResponse {
            access_token: "access-token".to_string(),
            refresh_token: Some("refresh-token".to_string()),
            session_token: None,
            scope: "profile".to_string(),
            expires_in: 3600,
            keys_jwe: None,
        })
    }

    async fn fetch_profile(
        &self,
        _profile_endpoint: &Url,
        access_token: &str,
    ) -> FlowResult<Profile> {
        self.profile_requests.fetch_add(1, Ordering::SeqCst);
        if access_token != "access-token" {
            return Err(FlowError::ProfileFetch("401 Unauthorized".to_string()));
        }
        Ok(Profile {
            uid: Some("uid-1".to_string()),
            email: "user@example.com".to_string(),
            display_name: Some("Test User".to_string()),
            avatar: None,
        })
    }
}

pub fn settings() -> FlowSettings {
    FlowSettings {
        client_id: "12cc4070a481bc73".to_string(),
        redirect_uri: "fxaclient://android.redirect".to_string(),
        content_url: "https://accounts.example".to_string(),
        pairing_content_url: "https://pair.example".to_string(),
    }
}

/// A coordinator over `storage`, as a fresh process would build it.
pub fn session(
    client: Arc<FakeIdentityClient>,
    storage: Arc<dyn SecureStorage>,
    pairing_url: Option<&str>,
) -> (SessionCoordinator, mpsc::UnboundedReceiver<SessionEvent>) {
    let engine = AuthFlowEngine::new(settings(), client, PersistenceGateway::new(storage));
    SessionCoordinator::new(
        engine,
        pairing_url.map(String::from),
        FlowRequest::profile(),
    )
}

pub fn state_param(url: &Url) -> String {
    url.query_pairs()
        .find(|(key, _)| key == "state")
        .map(|(_, value)| value.into_owned())
        .expect("authorization URL carries a state parameter")
}
