// chainlab/src/credentials.rs
//!
//! Session tokens for authenticated backend calls.
//!
//! The HTTP client never reads global state for its token; it asks an
//! injected `TokenSource`. The CLI uses the keyring-backed store, tests use
//! `StaticToken`.

use crate::keychain;
use std::sync::{Mutex, PoisonError};

pub trait TokenSource: Send + Sync {
    /// Current session token, `None` when logged out.
    fn token(&self) -> Option<String>;
}

/// Fixed token, or none at all.
#[derive(Debug, Clone, Default)]
pub struct StaticToken(Option<String>);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(Some(token.into()))
    }

    pub fn none() -> Self {
        Self(None)
    }
}

impl TokenSource for StaticToken {
    fn token(&self) -> Option<String> {
        self.0.clone()
    }
}

/// Stores the login token and username in the OS keyring.
#[derive(Debug)]
pub struct KeyringTokenStore {
    account: String,
    cached: Mutex<Option<String>>,
}

const TOKEN_ACCOUNT: &str = "session_token";
const USERNAME_ACCOUNT: &str = "session_username";

impl Default for KeyringTokenStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyringTokenStore {
    pub fn new() -> Self {
        Self::with_account(TOKEN_ACCOUNT)
    }

    /// Separate account name, mainly so tests do not share an entry.
    pub fn with_account(account: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            cached: Mutex::new(None),
        }
    }

    pub fn save(&self, token: &str, username: Option<&str>) -> Result<(), crate::Error> {
        keychain::store_secret(&self.account, token)?;
        if let Some(username) = username {
            keychain::store_secret(&self.username_account(), username)?;
        }
        *self.cached.lock().unwrap_or_else(PoisonError::into_inner) = Some(token.to_string());
        Ok(())
    }

    pub fn username(&self) -> Option<String> {
        keychain::load_secret(&self.username_account()).ok()
    }

    pub fn clear(&self) -> Result<(), crate::Error> {
        keychain::delete_secret(&self.account)?;
        keychain::delete_secret(&self.username_account())?;
        *self.cached.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }

    fn username_account(&self) -> String {
        if self.account == TOKEN_ACCOUNT {
            USERNAME_ACCOUNT.to_string()
        } else {
            format!("{}_username", self.account)
        }
    }
}

impl TokenSource for KeyringTokenStore {
    fn token(&self) -> Option<String> {
        let mut cached = self.cached.lock().unwrap_or_else(PoisonError::into_inner);
        if cached.is_none() {
            match keychain::load_secret(&self.account) {
                Ok(token) => *cached = Some(token),
                Err(keyring::Error::NoEntry) => {}
                Err(err) => tracing::warn!(error = %err, "could not read session token"),
            }
        }
        cached.clone()
    }
}
