//! In-memory doubles shared by the unit tests.

use crate::client::{IdentityClient, OpenIdConfiguration, TokenRequest, TokenResponse};
use crate::error::{FlowError, FlowResult};
use crate::profile::Profile;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use url::Url;

pub(crate) const GOOD_CODE: &str = "good-code";

pub(crate) fn document_for(base: &str) -> OpenIdConfiguration {
    let base = base.trim_end_matches('/');
    OpenIdConfiguration {
        issuer: base.to_string(),
        authorization_endpoint: format!("{}/authorization", base),
        token_endpoint: format!("{}/v1/token", base),
        userinfo_endpoint: format!("{}/v1/profile", base),
    }
}

pub(crate) fn test_profile() -> Profile {
    Profile {
        uid: Some("uid-1".to_string()),
        email: "user@example.com".to_string(),
        display_name: Some("Test User".to_string()),
        avatar: None,
    }
}

#[derive(Default)]
pub(crate) struct FakeIdentityClient {
    config_requests: Mutex<Vec<String>>,
    token_requests: Mutex<Vec<TokenRequest>>,
    profile_requests: AtomicUsize,
    fail_config: AtomicBool,
    fail_profile: AtomicBool,
    issue_keys: AtomicBool,
    expires_in: Mutex<Option<i64>>,
}

impl FakeIdentityClient {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn fail_config(&self) {
        self.fail_config.store(true, Ordering::SeqCst);
    }

    pub(crate) fn fail_profile(&self) {
        self.fail_profile.store(true, Ordering::SeqCst);
    }

    pub(crate) fn issue_keys(&self) {
        self.issue_keys.store(true, Ordering::SeqCst);
    }

    pub(crate) fn set_expires_in(&self, seconds: i64) {
        *self.expires_in.lock().unwrap() = Some(seconds);
    }

    pub(crate) fn config_requests(&self) -> Vec<String> {
        self.config_requests.lock().unwrap().clone()
    }

    pub(crate) fn token_requests(&self) -> Vec<TokenRequest> {
        self.token_requests.lock().unwrap().clone()
    }

    pub(crate) fn profile_requests(&self) -> usize {
        self.profile_requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityClient for FakeIdentityClient {
    async fn fetch_openid_configuration(&self, url: &Url) -> FlowResult<OpenIdConfiguration> {
        self.config_requests.lock().unwrap().push(url.to_string());
        if self.fail_config.load(Ordering::SeqCst) {
            return Err(FlowError::ConfigFetch("503 Service Unavailable".to_string()));
        }
        let base = url
            .as_str()
            .trim_end_matches(".well-known/openid-configuration");
        Ok(document_for(base))
    }

    async fn exchange_code(
        &self,
        _token_endpoint: &Url,
        request: &TokenRequest,
    ) -> FlowResult<TokenResponse> {
        self.token_requests.lock().unwrap().push(request.clone());
        if request.code != GOOD_CODE {
            return Err(FlowError::TokenExchange("invalid_grant".to_string()));
        }
        let keys = self.issue_keys.load(Ordering::SeqCst);
        Ok(TokenResponse {
            access_token: "access-token".to_string(),
            refresh_token: Some("refresh-token".to_string()),
            session_token: None,
            scope: if keys {
                "profile https://identity.mozilla.com/apps/oldsync".to_string()
            } else {
                "profile".to_string()
            },
            expires_in: self.expires_in.lock().unwrap().unwrap_or(3600),
            keys_jwe: keys.then(|| "eyJhbGciOiJFQ0RILUVTIn0..jwe".to_string()),
        })
    }

    async fn fetch_profile(
        &self,
        _profile_endpoint: &Url,
        access_token: &str,
    ) -> FlowResult<Profile> {
        self.profile_requests.fetch_add(1, Ordering::SeqCst);
        if self.fail_profile.load(Ordering::SeqCst) || access_token.is_empty() {
            return Err(FlowError::ProfileFetch("401 Unauthorized".to_string()));
        }
        Ok(test_profile())
    }
}
