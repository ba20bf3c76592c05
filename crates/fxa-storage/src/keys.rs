//! Storage key constants.

/// Storage keys used by the sample client
pub struct StorageKeys;

impl StorageKeys {
    /// Serialized account state (JSON). Matches the key the Android sample
    /// used in its shared preferences.
    pub const ACCOUNT_STATE: &'static str = "fxaState";
}
