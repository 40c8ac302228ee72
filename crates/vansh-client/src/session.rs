//! Authentication context.
//!
//! A [`SessionContext`] is created once at the application root and cloned
//! into whatever needs the token. It hydrates from the session file on
//! start, persists on sign-in and is cleared on sign-out or whenever the
//! backend answers 401. Observers subscribe to a `watch` channel.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use vansh_core::User;

use crate::error::SessionError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub user: User,
}

impl Session {
    /// Expiry (unix seconds) from the token's `exp` claim.
    pub fn expires_at(&self) -> Option<i64> {
        token_expiry(&self.token)
    }

    pub fn is_expired_at(&self, now: i64) -> bool {
        self.expires_at().is_some_and(|exp| exp <= now)
    }
}

/// Decode the `exp` claim of a JWT without verifying it.
pub fn token_expiry(token: &str) -> Option<i64> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
    claims.get("exp")?.as_i64()
}

/// File-backed storage for the current session.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Option<Session>, SessionError> {
        match std::fs::read(&self.path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self, session: &Session) -> Result<(), SessionError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(session)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    pub fn clear(&self) -> Result<(), SessionError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

struct Inner {
    store: SessionStore,
    tx: watch::Sender<Option<Session>>,
}

/// Shared, observable sign-in state.
#[derive(Clone)]
pub struct SessionContext {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("store", &self.inner.store)
            .field("signed_in", &self.is_signed_in())
            .finish()
    }
}

impl SessionContext {
    /// Restore the stored session. A corrupt or expired session is
    /// discarded (and removed from disk) rather than failing start-up.
    pub fn hydrate(store: SessionStore) -> Self {
        Self::hydrate_at(store, chrono::Utc::now().timestamp())
    }

    pub fn hydrate_at(store: SessionStore, now: i64) -> Self {
        let restored = match store.load() {
            Ok(Some(session)) if session.is_expired_at(now) => {
                log::info!("stored session for {} has expired", session.user.email);
                if let Err(e) = store.clear() {
                    log::warn!("failed to remove expired session: {e}");
                }
                None
            }
            Ok(session) => session,
            Err(e) => {
                log::warn!("ignoring unreadable session file {}: {e}", store.path().display());
                None
            }
        };
        let (tx, _rx) = watch::channel(restored);
        Self {
            inner: Arc::new(Inner { store, tx }),
        }
    }

    /// Context that never touches disk until signed in.
    pub fn empty(store: SessionStore) -> Self {
        let (tx, _rx) = watch::channel(None);
        Self {
            inner: Arc::new(Inner { store, tx }),
        }
    }

    pub fn current(&self) -> Option<Session> {
        self.inner.tx.borrow().clone()
    }

    pub fn token(&self) -> Option<String> {
        self.inner.tx.borrow().as_ref().map(|s| s.token.clone())
    }

    pub fn user(&self) -> Option<User> {
        self.inner.tx.borrow().as_ref().map(|s| s.user.clone())
    }

    pub fn is_signed_in(&self) -> bool {
        self.inner.tx.borrow().is_some()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Session>> {
        self.inner.tx.subscribe()
    }

    /// Persist and publish a new session.
    pub fn sign_in(&self, session: Session) -> Result<(), SessionError> {
        self.inner.store.save(&session)?;
        log::info!("signed in as {}", session.user.email);
        self.inner.tx.send_replace(Some(session));
        Ok(())
    }

    pub fn sign_out(&self) -> Result<(), SessionError> {
        self.inner.tx.send_replace(None);
        self.inner.store.clear()
    }

    /// Drop the session after the backend rejected its token.
    pub fn expire(&self) {
        if self.inner.tx.send_replace(None).is_some() {
            log::info!("session rejected by server, signing out");
        }
        if let Err(e) = self.inner.store.clear() {
            log::warn!("failed to clear session file: {e}");
        }
    }
}

#[cfg(test)]
pub(crate) fn test_token(exp: i64) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let claims = URL_SAFE_NO_PAD.encode(format!(r#"{{"sub":"u1","exp":{exp}}}"#));
    format!("{header}.{claims}.signature")
}
