use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::errors::{Error, Result};

/// Opaque bearer credential for the upstream model provider.
///
/// The value is trimmed on parse and never printed by `Debug`.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Credential(String);

impl Credential {
    pub fn parse(raw: impl AsRef<str>) -> Result<Self> {
        let value = raw.as_ref().trim();
        if value.is_empty() {
            return Err(Error::InvalidCredential(
                "credential must be a non-empty string".to_string(),
            ));
        }
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First six characters followed by an ellipsis, for logs and UIs.
    pub fn masked(&self) -> String {
        let prefix: String = self.0.chars().take(6).collect();
        format!("{prefix}...")
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Credential").field(&self.masked()).finish()
    }
}

/// In-memory slot holding at most one credential. Nothing is persisted.
#[derive(Debug, Default)]
pub struct CredentialStore {
    slot: RwLock<Option<Credential>>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the trimmed value, replacing any previous credential.
    pub fn set(&self, raw: impl AsRef<str>) -> Result<()> {
        let credential = Credential::parse(raw)?;
        *self.write() = Some(credential);
        Ok(())
    }

    pub fn get(&self) -> Result<Credential> {
        self.read().clone().ok_or(Error::NoCredential)
    }

    /// Idempotent.
    pub fn clear(&self) {
        *self.write() = None;
    }

    pub fn is_set(&self) -> bool {
        self.read().is_some()
    }

    // A panic while holding the lock cannot leave a half-written Option.
    fn read(&self) -> RwLockReadGuard<'_, Option<Credential>> {
        self.slot.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Option<Credential>> {
        self.slot.write().unwrap_or_else(|e| e.into_inner())
    }
}
