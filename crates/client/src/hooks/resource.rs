//! Observable state cell behind every cache hook.
//!
//! A [`Resource`] holds `{data, is_loading, error}` and a list of subscribers
//! that are called after every change (the UI re-renders from
//! [`Resource::snapshot`]). Once [`Resource::dispose`] has been called, the
//! owning view is gone: late async results are dropped instead of applied.
//!
//! ```rust,ignore
//! let feed = FeedHook::new(api);
//! let id = feed.resource().subscribe(move || rerender());
//! feed.load_first_page().await?;
//! let state = feed.snapshot(); // state.data.items, state.is_loading, state.error
//! ```

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::rc::Rc;

use circle_shared::ApiError;

use super::optimistic::OptimisticCommand;

/// Synchronous snapshot handed to the UI.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResourceState<T> {
    pub data: T,
    pub is_loading: bool,
    /// User-facing message from the last failure, cleared on the next load.
    pub error: Option<String>,
}

pub type SubscriptionId = u64;

struct Inner<T> {
    state: RefCell<ResourceState<T>>,
    subscribers: RefCell<Vec<(SubscriptionId, Rc<dyn Fn()>)>>,
    next_id: Cell<SubscriptionId>,
    alive: Cell<bool>,
}

pub struct Resource<T> {
    inner: Rc<Inner<T>>,
}

impl<T> Clone for Resource<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Clone> Resource<T> {
    pub fn new(data: T) -> Self {
        Self {
            inner: Rc::new(Inner {
                state: RefCell::new(ResourceState {
                    data,
                    is_loading: false,
                    error: None,
                }),
                subscribers: RefCell::new(Vec::new()),
                next_id: Cell::new(0),
                alive: Cell::new(true),
            }),
        }
    }

    pub fn snapshot(&self) -> ResourceState<T> {
        self.inner.state.borrow().clone()
    }

    /// Borrow the current state without cloning it.
    pub fn read<R>(&self, f: impl FnOnce(&ResourceState<T>) -> R) -> R {
        f(&self.inner.state.borrow())
    }

    pub fn is_alive(&self) -> bool {
        self.inner.alive.get()
    }

    /// The owning view is gone: drop subscribers and ignore further updates.
    pub fn dispose(&self) {
        self.inner.alive.set(false);
        self.inner.subscribers.borrow_mut().clear();
    }

    pub fn subscribe(&self, callback: impl Fn() + 'static) -> SubscriptionId {
        let id = self.inner.next_id.get();
        self.inner.next_id.set(id + 1);
        self.inner
            .subscribers
            .borrow_mut()
            .push((id, Rc::new(callback)));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.inner
            .subscribers
            .borrow_mut()
            .retain(|(sub, _)| *sub != id);
    }

    /// Apply `f` and notify subscribers. Returns false, without applying,
    /// once the resource has been disposed.
    pub fn update(&self, f: impl FnOnce(&mut ResourceState<T>)) -> bool {
        if !self.is_alive() {
            crate::log_debug!("resource: dropping update for a disposed view");
            return false;
        }
        f(&mut self.inner.state.borrow_mut());
        self.notify();
        true
    }

    pub fn start_loading(&self) {
        self.update(|s| {
            s.is_loading = true;
            s.error = None;
        });
    }

    /// Record a failure while keeping the last good data.
    pub fn fail(&self, error: &ApiError) {
        self.update(|s| {
            s.is_loading = false;
            s.error = Some(error.user_message());
        });
    }

    /// Apply `command` now, run `request`, and revert the command if it fails.
    pub async fn mutate_optimistic<C, F, R>(&self, mut command: C, request: F) -> Result<R, ApiError>
    where
        C: OptimisticCommand<T>,
        F: Future<Output = Result<R, ApiError>>,
    {
        self.update(|s| command.apply(&mut s.data));
        match request.await {
            Ok(value) => Ok(value),
            Err(e) => {
                crate::log_warn!("resource: optimistic update rolled back: {}", e);
                self.update(|s| {
                    command.revert(&mut s.data);
                    s.error = Some(e.user_message());
                });
                Err(e)
            }
        }
    }

    fn notify(&self) {
        // Callbacks may read the resource or (un)subscribe.
        let subscribers: Vec<_> = self
            .inner
            .subscribers
            .borrow()
            .iter()
            .map(|(_, cb)| cb.clone())
            .collect();
        for callback in subscribers {
            callback();
        }
    }
}
