//! Reads and writes the account blob in the state store.

use crate::error::{FlowError, FlowResult};
use crate::state::AccountState;
use fxa_storage::{SecureStorage, StorageKeys};
use std::sync::Arc;
use tracing::{debug, info};

/// Persists one [`AccountState`] under a fixed storage key.
#[derive(Clone)]
pub struct PersistenceGateway {
    storage: Arc<dyn SecureStorage>,
    key: String,
}

impl PersistenceGateway {
    /// Gateway over `storage` using [`StorageKeys::ACCOUNT_STATE`].
    pub fn new(storage: Arc<dyn SecureStorage>) -> Self {
        Self::with_key(storage, StorageKeys::ACCOUNT_STATE)
    }

    pub fn with_key(storage: Arc<dyn SecureStorage>, key: &str) -> Self {
        Self {
            storage,
            key: key.to_string(),
        }
    }

    /// Load the persisted account.
    ///
    /// Returns `Ok(None)` for a missing or empty blob and for a blob that
    /// parses but carries no credentials. A blob that does not parse is
    /// `Err(Deserialize)`.
    pub fn load(&self) -> FlowResult<Option<AccountState>> {
        let blob = match self.storage.get(&self.key)? {
            Some(blob) if !blob.trim().is_empty() => blob,
            _ => {
                debug!(key = %self.key, "No persisted account");
                return Ok(None);
            }
        };

        let state = AccountState::from_json(&blob)?;
        if !state.is_authenticated() {
            debug!(key = %self.key, "Persisted account has no credentials");
            return Ok(None);
        }
        Ok(Some(state))
    }

    /// Serialize and write `state`.
    pub fn save(&self, state: &AccountState) -> FlowResult<()> {
        let blob = state.to_json()?;
        self.storage.set(&self.key, &blob)?;
        info!(key = %self.key, "Account state persisted");
        Ok(())
    }

    /// Overwrite the blob with an empty string.
    pub fn clear(&self) -> FlowResult<()> {
        self.storage
            .set(&self.key, "")
            .map_err(FlowError::Persistence)?;
        info!(key = %self.key, "Persisted account cleared");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote_config::RemoteConfig;
    use crate::state::SessionCredentials;
    use crate::test_support::document_for;
    use chrono::{Duration, Utc};
    use fxa_storage::{MemoryStorage, StorageError, StorageResult};

    fn authenticated() -> AccountState {
        let config =
            RemoteConfig::from_document(&document_for("https://accounts.example")).unwrap();
        let mut state = AccountState::new(config, "client", "fxaclient://android.redirect");
        state.session = Some(SessionCredentials {
            access_token: "at".to_string(),
            refresh_token: None,
            session_token: None,
            scopes: ["profile".to_string()].into_iter().collect(),
            expires_at: Utc::now() + Duration::hours(1),
        });
        state
    }

    fn gateway() -> (Arc<MemoryStorage>, PersistenceGateway) {
        let storage = Arc::new(MemoryStorage::new());
        let gateway = PersistenceGateway::new(storage.clone());
        (storage, gateway)
    }

    #[test]
    fn test_save_then_load() {
        let (_, gateway) = gateway();
        let state = authenticated();
        gateway.save(&state).unwrap();

        let loaded = gateway.load().unwrap().unwrap();
        assert_eq!(loaded.session, state.session);
        assert_eq!(loaded.config, state.config);
        assert_eq!(loaded.client_id, "client");
    }

    #[test]
    fn test_missing_and_empty_are_none() {
        let (storage, gateway) = gateway();
        assert!(gateway.load().unwrap().is_none());

        storage.set(StorageKeys::ACCOUNT_STATE, "").unwrap();
        assert!(gateway.load().unwrap().is_none());
    }

    #[test]
    fn test_malformed_is_deserialize_error() {
        let (storage, gateway) = gateway();
        storage.set(StorageKeys::ACCOUNT_STATE, "{\"config\":").unwrap();

        let err = gateway.load().unwrap_err();
        assert!(matches!(err, FlowError::Deserialize(_)));
    }

    #[test]
    fn test_unauthenticated_blob_is_none() {
        let (_, gateway) = gateway();
        let mut state = authenticated();
        state.session = None;
        gateway.save(&state).unwrap();

        assert!(gateway.load().unwrap().is_none());
    }

    #[test]
    fn test_clear_writes_empty_blob() {
        let (storage, gateway) = gateway();
        gateway.save(&authenticated()).unwrap();
        gateway.clear().unwrap();

        assert_eq!(
            storage.get(StorageKeys::ACCOUNT_STATE).unwrap(),
            Some(String::new())
        );
        assert!(gateway.load().unwrap().is_none());
    }

    struct BrokenStorage;

    impl SecureStorage for BrokenStorage {
        fn set(&self, _key: &str, _value: &str) -> StorageResult<()> {
            Err(StorageError::Platform("disk full".to_string()))
        }

        fn get(&self, _key: &str) -> StorageResult<Option<String>> {
            Err(StorageError::Platform("locked".to_string()))
        }

        fn delete(&self, _key: &str) -> StorageResult<bool> {
            Ok(false)
        }
    }

    #[test]
    fn test_storage_failures_surface() {
        let gateway = PersistenceGateway::new(Arc::new(BrokenStorage));
        assert!(matches!(gateway.save(&authenticated()), Err(FlowError::Persistence(_))));
        assert!(matches!(gateway.clear(), Err(FlowError::Persistence(_))));
        assert!(matches!(gateway.load(), Err(FlowError::Persistence(_))));
    }
}
