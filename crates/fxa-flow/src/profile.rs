//! User profile snapshot and its in-memory freshness cache.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// How long a fetched profile is served from memory.
pub const PROFILE_CACHE_TTL: Duration = Duration::from_secs(120);

/// Minimal user identity data returned by the profile endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default, alias = "sub", skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    pub email: String,
    #[serde(
        default,
        rename = "displayName",
        alias = "display_name",
        alias = "name",
        skip_serializing_if = "Option::is_none"
    )]
    pub display_name: Option<String>,
    #[serde(default, alias = "picture", skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

impl Profile {
    /// `"<display name> <email>"`, or just the email when no name is set.
    pub fn display_line(&self) -> String {
        match self.display_name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => format!("{} {}", name, self.email),
            _ => self.email.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct CachedProfile {
    profile: Profile,
    fetched_at: Instant,
}

impl CachedProfile {
    pub(crate) fn new(profile: Profile) -> Self {
        Self {
            profile,
            fetched_at: Instant::now(),
        }
    }

    pub(crate) fn fresh(&self, ttl: Duration) -> Option<&Profile> {
        (self.fetched_at.elapsed() < ttl).then_some(&self.profile)
    }
}
