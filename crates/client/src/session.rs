//! Session store: the current access/refresh credentials.
//!
//! The store mirrors the two credential strings into a [`Storage`] backend so
//! a reload picks the session back up. It performs no network calls.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use futures_channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};

use crate::storage::{MemoryStorage, Storage};

/// Credentials currently held by the client.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

impl Session {
    pub fn is_empty(&self) -> bool {
        self.access_token.is_none() && self.refresh_token.is_none()
    }
}

// Tokens stay out of logs.
impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Why the session was torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoutReason {
    /// The user signed out.
    UserRequested,
    /// A request to the refresh endpoint itself came back 401.
    RefreshEndpointRejected,
    /// A 401 arrived and there was no refresh token to recover with.
    MissingRefreshToken,
    /// The refresh call failed.
    RefreshFailed,
}

/// Session lifecycle notifications for UI collaborators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    LoggedIn,
    TokenRefreshed,
    /// The app should return to its unauthenticated entry point.
    LoggedOut { reason: LogoutReason },
}

struct Inner {
    storage: Rc<dyn Storage>,
    access_key: String,
    refresh_key: String,
    session: RefCell<Session>,
    listeners: RefCell<Vec<UnboundedSender<AuthEvent>>>,
}

/// Process-wide credential holder, shared by cloning.
#[derive(Clone)]
pub struct SessionStore {
    inner: Rc<Inner>,
}

impl fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionStore")
            .field("session", &*self.inner.session.borrow())
            .finish()
    }
}

impl SessionStore {
    /// Open the store, restoring any credentials already persisted under `namespace`.
    pub fn new(storage: Rc<dyn Storage>, namespace: &str) -> Self {
        let access_key = format!("{namespace}_access_token");
        let refresh_key = format!("{namespace}_refresh_token");
        let session = Session {
            access_token: storage.get_item(&access_key).filter(|t| !t.is_empty()),
            refresh_token: storage.get_item(&refresh_key).filter(|t| !t.is_empty()),
        };

        Self {
            inner: Rc::new(Inner {
                storage,
                access_key,
                refresh_key,
                session: RefCell::new(session),
                listeners: RefCell::new(Vec::new()),
            }),
        }
    }

    /// A store that persists nothing beyond this process.
    pub fn in_memory() -> Self {
        Self::new(Rc::new(MemoryStorage::new()), "circle")
    }

    pub fn get(&self) -> Session {
        self.inner.session.borrow().clone()
    }

    pub fn access_token(&self) -> Option<String> {
        self.inner.session.borrow().access_token.clone()
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.inner.session.borrow().refresh_token.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.session.borrow().access_token.is_some()
    }

    /// Store a fresh token pair from login or registration.
    pub fn set_tokens(&self, access: impl Into<String>, refresh: impl Into<String>) {
        let access = access.into();
        let refresh = refresh.into();
        self.persist(&self.inner.access_key, &access);
        self.persist(&self.inner.refresh_key, &refresh);
        *self.inner.session.borrow_mut() = Session {
            access_token: Some(access),
            refresh_token: Some(refresh),
        };
        self.emit(AuthEvent::LoggedIn);
    }

    /// Store the result of a successful refresh made with `used_refresh`.
    /// `rotated_refresh` replaces the refresh token when the server issued a
    /// new one.
    ///
    /// Returns false, storing nothing, when the session no longer holds
    /// `used_refresh` (logged out or replaced while the refresh was in flight).
    pub(crate) fn store_refreshed(
        &self,
        used_refresh: &str,
        access: &str,
        rotated_refresh: Option<&str>,
    ) -> bool {
        {
            let mut session = self.inner.session.borrow_mut();
            if session.refresh_token.as_deref() != Some(used_refresh) {
                return false;
            }
            session.access_token = Some(access.to_string());
            if let Some(refresh) = rotated_refresh {
                session.refresh_token = Some(refresh.to_string());
            }
        }
        self.persist(&self.inner.access_key, access);
        if let Some(refresh) = rotated_refresh {
            self.persist(&self.inner.refresh_key, refresh);
        }
        self.emit(AuthEvent::TokenRefreshed);
        true
    }

    /// Drop both credentials. Idempotent; emits nothing.
    pub fn clear(&self) {
        for key in [&self.inner.access_key, &self.inner.refresh_key] {
            if let Err(e) = self.inner.storage.remove_item(key) {
                crate::log_warn!("session: failed to remove {}: {}", key, e);
            }
        }
        *self.inner.session.borrow_mut() = Session::default();
    }

    /// Clear the session and tell subscribers to return to the entry point.
    pub fn logout(&self, reason: LogoutReason) {
        crate::log_info!("session: logging out ({:?})", reason);
        self.clear();
        self.emit(AuthEvent::LoggedOut { reason });
    }

    /// Receive session lifecycle events from now on.
    pub fn subscribe(&self) -> UnboundedReceiver<AuthEvent> {
        let (tx, rx) = unbounded();
        self.inner.listeners.borrow_mut().push(tx);
        rx
    }

    fn persist(&self, key: &str, value: &str) {
        // The in-memory copy stays authoritative for this process.
        if let Err(e) = self.inner.storage.set_item(key, value) {
            crate::log_warn!("session: failed to persist {}: {}", key, e);
        }
    }

    fn emit(&self, event: AuthEvent) {
        self.inner
            .listeners
            .borrow_mut()
            .retain(|tx| tx.unbounded_send(event.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_survive_reopening_the_store() {
        let storage: Rc<dyn Storage> = Rc::new(MemoryStorage::new());
        let store = SessionStore::new(storage.clone(), "t");
        store.set_tokens("a1", "r1");

        let reopened = SessionStore::new(storage, "t");
        assert_eq!(reopened.access_token().as_deref(), Some("a1"));
        assert_eq!(reopened.refresh_token().as_deref(), Some("r1"));
    }

    #[test]
    fn clear_is_idempotent() {
        let storage = Rc::new(MemoryStorage::new());
        let store = SessionStore::new(storage.clone(), "t");
        store.clear();
        store.set_tokens("a", "r");
        store.clear();
        store.clear();
        assert!(store.get().is_empty());
        assert!(storage.is_empty());
    }

    #[test]
    fn refresh_keeps_refresh_token_unless_rotated() {
        let store = SessionStore::in_memory();
        store.set_tokens("a1", "r1");
        assert!(store.store_refreshed("r1", "a2", None));
        assert_eq!(store.access_token().as_deref(), Some("a2"));
        assert_eq!(store.refresh_token().as_deref(), Some("r1"));

        assert!(store.store_refreshed("r1", "a3", Some("r2")));
        assert_eq!(store.refresh_token().as_deref(), Some("r2"));
    }

    #[test]
    fn refresh_result_for_an_ended_session_is_dropped() {
        let store = SessionStore::in_memory();
        store.set_tokens("a1", "r1");
        store.logout(LogoutReason::UserRequested);

        assert!(!store.store_refreshed("r1", "a2", None));
        assert!(store.get().is_empty());
        assert!(!store.is_authenticated());

        // A new login replaced the refresh token.
        store.set_tokens("a3", "r3");
        assert!(!store.store_refreshed("r1", "a2", None));
        assert_eq!(store.access_token().as_deref(), Some("a3"));
    }

    #[test]
    fn logout_notifies_subscribers() {
        let store = SessionStore::in_memory();
        let mut events = store.subscribe();
        store.set_tokens("a", "r");
        store.logout(LogoutReason::UserRequested);

        assert_eq!(events.try_next().unwrap(), Some(AuthEvent::LoggedIn));
        assert_eq!(
            events.try_next().unwrap(),
            Some(AuthEvent::LoggedOut {
                reason: LogoutReason::UserRequested
            })
        );
        assert!(store.get().is_empty());
    }

    #[test]
    fn debug_output_redacts_tokens() {
        let store = SessionStore::in_memory();
        store.set_tokens("secret-access", "secret-refresh");
        let rendered = format!("{store:?}");
        assert!(!rendered.contains("secret"));
    }
}
