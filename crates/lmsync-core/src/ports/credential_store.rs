//! Credential store port (driven/secondary port)
//!
//! The token is treated as an opaque string; encryption at rest is the
//! backend's business (OS keyring, encrypted file).

/// Port trait for persisting the platform token
pub trait ICredentialStore: Send + Sync {
    /// Returns the stored token, `None` when nothing is stored
    fn get(&self) -> anyhow::Result<Option<String>>;

    /// Replaces the stored token
    fn set(&self, token: &str) -> anyhow::Result<()>;

    /// Removes the stored token; clearing an empty store is not an error
    fn clear(&self) -> anyhow::Result<()>;
}
