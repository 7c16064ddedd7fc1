//! Coordination of token refresh calls between concurrent 401s.

use std::cell::RefCell;

use circle_shared::ApiError;
use futures_util::future::{FutureExt, LocalBoxFuture, Shared};

use crate::config::RefreshStrategy;

pub(crate) type RefreshFuture = LocalBoxFuture<'static, Result<(), ApiError>>;

pub(crate) struct RefreshCoordinator {
    strategy: RefreshStrategy,
    in_flight: RefCell<Option<Shared<RefreshFuture>>>,
}

impl RefreshCoordinator {
    pub(crate) fn new(strategy: RefreshStrategy) -> Self {
        Self {
            strategy,
            in_flight: RefCell::new(None),
        }
    }

    pub(crate) fn strategy(&self) -> RefreshStrategy {
        self.strategy
    }

    #[cfg(test)]
    pub(crate) fn is_refreshing(&self) -> bool {
        self.in_flight.borrow().is_some()
    }

    /// Run the refresh produced by `start`, or join the one already running.
    ///
    /// `start` is only called when a new refresh has to be issued.
    pub(crate) async fn run(&self, start: impl FnOnce() -> RefreshFuture) -> Result<(), ApiError> {
        if self.strategy == RefreshStrategy::Independent {
            return start().await;
        }

        let flight = {
            let mut slot = self.in_flight.borrow_mut();
            match slot.as_ref() {
                Some(existing) => {
                    crate::log_debug!("refresh: joining in-flight refresh");
                    existing.clone()
                }
                None => {
                    let started = start().shared();
                    *slot = Some(started.clone());
                    started
                }
            }
        };

        let result = flight.clone().await;

        let mut slot = self.in_flight.borrow_mut();
        if slot.as_ref().is_some_and(|current| current.ptr_eq(&flight)) {
            *slot = None;
        }
        result
    }
}
