// chainlab/src/keychain.rs
//!
//! OS keyring access with an in-memory fallback.
//!
//! When the system keychain cannot be used (no secret-service daemon, CI
//! containers) or `CHAINLAB_USE_IN_MEMORY_KEYCHAIN` is set, secrets go to a
//! process-wide map instead and are lost when the process exits.

use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, Once, PoisonError};

use keyring::credential::{Credential, CredentialApi, CredentialBuilderApi, CredentialPersistence};
use keyring::Error as KeyringError;
use once_cell::sync::Lazy;

/// Service name every chainlab entry is stored under.
pub const KEYCHAIN_SERVICE_NAME: &str = "chainlab";

pub const IN_MEMORY_ENV: &str = "CHAINLAB_USE_IN_MEMORY_KEYCHAIN";

const CHECK_ACCOUNT: &str = "__chainlab_keychain_check__";

static SYSTEM_CHECKED: Once = Once::new();
static MEMORY_ACTIVE: AtomicBool = AtomicBool::new(false);

// Shared by every in-memory credential, so re-installing the builder keeps secrets.
static MEMORY_SECRETS: Lazy<Mutex<HashMap<String, Vec<u8>>>> = Lazy::new(Default::default);

/// Decides once per process whether the system keyring is usable.
pub fn ensure_available() {
    if using_in_memory_fallback() {
        return;
    }

    SYSTEM_CHECKED.call_once(|| {
        let reason = if forced_by_env() {
            Some(format!("{IN_MEMORY_ENV} is set"))
        } else {
            check_system_keyring().err().map(|err| err.to_string())
        };

        if let Some(reason) = reason {
            tracing::warn!(%reason, "using in-memory keyring, secrets will not persist");
            use_memory_store();
        }
    });
}

/// Switches to the in-memory keyring; tests call this before touching secrets.
pub fn force_in_memory_keyring() {
    use_memory_store();
}

pub fn using_in_memory_fallback() -> bool {
    MEMORY_ACTIVE.load(Ordering::SeqCst)
}

pub fn store_secret(account: &str, secret: &str) -> Result<(), KeyringError> {
    entry(account)?.set_password(secret)
}

pub fn load_secret(account: &str) -> Result<String, KeyringError> {
    entry(account)?.get_password()
}

/// Deleting a missing entry is not an error.
pub fn delete_secret(account: &str) -> Result<(), KeyringError> {
    match entry(account)?.delete_credential() {
        Ok(()) | Err(KeyringError::NoEntry) => Ok(()),
        Err(err) => Err(err),
    }
}

fn entry(account: &str) -> keyring::Result<keyring::Entry> {
    ensure_available();
    keyring::Entry::new(KEYCHAIN_SERVICE_NAME, account)
}

fn forced_by_env() -> bool {
    std::env::var(IN_MEMORY_ENV)
        .map(|value| matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

/// Writes, reads back and deletes a throwaway entry.
fn check_system_keyring() -> keyring::Result<()> {
    let entry = keyring::Entry::new(KEYCHAIN_SERVICE_NAME, CHECK_ACCOUNT)?;
    entry.set_password(CHECK_ACCOUNT)?;
    let read_back = entry.get_password()?;
    let _ = entry.delete_credential();

    if read_back == CHECK_ACCOUNT {
        Ok(())
    } else {
        Err(KeyringError::BadEncoding(read_back.into_bytes()))
    }
}

fn use_memory_store() {
    keyring::set_default_credential_builder(Box::new(MemoryBuilder));
    MEMORY_ACTIVE.store(true, Ordering::SeqCst);
}

// ============================================================================
// In-memory credential store
// ============================================================================

#[derive(Debug)]
struct MemoryBuilder;

#[derive(Debug)]
struct MemoryCredential {
    key: String,
}

impl CredentialBuilderApi for MemoryBuilder {
    fn build(
        &self,
        target: Option<&str>,
        service: &str,
        user: &str,
    ) -> keyring::Result<Box<Credential>> {
        let key = format!("{}|{service}|{user}", target.unwrap_or_default());
        Ok(Box::new(MemoryCredential { key }))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn persistence(&self) -> CredentialPersistence {
        CredentialPersistence::ProcessOnly
    }
}

impl CredentialApi for MemoryCredential {
    fn set_secret(&self, secret: &[u8]) -> keyring::Result<()> {
        secrets().insert(self.key.clone(), secret.to_vec());
        Ok(())
    }

    fn get_secret(&self) -> keyring::Result<Vec<u8>> {
        secrets().get(&self.key).cloned().ok_or(KeyringError::NoEntry)
    }

    fn delete_credential(&self) -> keyring::Result<()> {
        match secrets().remove(&self.key) {
            Some(_) => Ok(()),
            None => Err(KeyringError::NoEntry),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn secrets() -> std::sync::MutexGuard<'static, HashMap<String, Vec<u8>>> {
    MEMORY_SECRETS.lock().unwrap_or_else(PoisonError::into_inner)
}
