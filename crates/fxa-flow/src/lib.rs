//! Firefox Accounts flow core for the sample client.
//!
//! This crate provides:
//! - Remote configuration discovery for the content and pairing servers
//! - OAuth (PKCE) and device-pairing flows driven by an explicit FSM
//! - Code exchange and profile fetch behind the `IdentityClient` seam
//! - Persistence of the authenticated account through `SecureStorage`
//! - A session coordinator that memoizes bootstrap and reports to the UI

mod account;
mod client;
mod coordinator;
mod engine;
mod error;
mod flow_fsm;
mod http;
mod persistence;
mod pkce;
mod profile;
mod redirect;
mod remote_config;
mod state;
mod token_exchange;

#[cfg(test)]
mod test_support;

pub use account::Account;
pub use client::{IdentityClient, OpenIdConfiguration, TokenRequest, TokenResponse};
pub use coordinator::{SessionCoordinator, SessionEvent, UrlSurface};
pub use engine::{AuthFlowEngine, Bootstrap, BootstrapOutcome, FlowSettings};
pub use error::{FlowError, FlowResult};
pub use flow_fsm::flow_machine;
pub use flow_fsm::{FlowMachine, FlowMachineInput, FlowMachineState, FlowState, FlowTracker};
pub use http::HttpIdentityClient;
pub use persistence::PersistenceGateway;
pub use pkce::{code_challenge_s256, generate_pkce_pair, generate_state, KeyExchange, PkcePair};
pub use profile::{Profile, PROFILE_CACHE_TTL};
pub use redirect::{
    RedirectCallbackServer, RedirectParams, DEFAULT_CALLBACK_PATH, DEFAULT_CALLBACK_PORT,
    DEFAULT_CALLBACK_TIMEOUT_SECS,
};
pub use remote_config::RemoteConfig;
pub use state::{
    is_key_bearing_scope, AccountState, FlowKind, FlowRequest, PendingFlow, ScopedKey,
    SessionCredentials, OLD_SYNC_SCOPE, PROFILE_SCOPE, SCHEMA_VERSION,
};
pub use token_exchange::TokenExchangeClient;
