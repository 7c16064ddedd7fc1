//! Memoized mutual-friend counts, keyed by the other user's id.
//!
//! Entries live as long as the cache (one per profile view); there is no
//! eviction. Failed lookups are not remembered.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use circle_shared::{ApiError, Id};
use futures_util::future::{join_all, FutureExt, LocalBoxFuture, Shared};

use super::resource::{Resource, ResourceState, SubscriptionId};
use crate::api::Api;

type CountFuture = Shared<LocalBoxFuture<'static, Result<u64, ApiError>>>;

#[derive(Clone)]
pub struct MutualFriendCache {
    api: Api,
    resource: Resource<HashMap<Id, u64>>,
    in_flight: Rc<RefCell<HashMap<Id, CountFuture>>>,
}

impl MutualFriendCache {
    pub fn new(api: Api) -> Self {
        Self {
            api,
            resource: Resource::new(HashMap::new()),
            in_flight: Rc::new(RefCell::new(HashMap::new())),
        }
    }

    /// Count already known for `target`, without touching the network.
    pub fn cached(&self, target: &Id) -> Option<u64> {
        self.resource.read(|s| s.data.get(target).copied())
    }

    pub fn snapshot(&self) -> ResourceState<HashMap<Id, u64>> {
        self.resource.snapshot()
    }

    pub fn subscribe(&self, callback: impl Fn() + 'static) -> SubscriptionId {
        self.resource.subscribe(callback)
    }

    pub fn dispose(&self) {
        self.resource.dispose();
        self.in_flight.borrow_mut().clear();
    }

    /// Mutual-friend count for `target`. Only the first miss fetches; callers
    /// arriving while it runs wait for the same response.
    pub async fn get(&self, target: &Id) -> Result<u64, ApiError> {
        if let Some(count) = self.cached(target) {
            return Ok(count);
        }

        let (fetch, started) = {
            let mut in_flight = self.in_flight.borrow_mut();
            match in_flight.get(target) {
                Some(existing) => (existing.clone(), false),
                None => {
                    let fetch = self.fetch(target.clone());
                    in_flight.insert(target.clone(), fetch.clone());
                    (fetch, true)
                }
            }
        };
        if started {
            self.resource.start_loading();
        }

        let result = fetch.clone().await;

        // The first waiter to finish settles the shared state.
        let settled = {
            let mut in_flight = self.in_flight.borrow_mut();
            if in_flight.get(target).is_some_and(|f| f.ptr_eq(&fetch)) {
                in_flight.remove(target);
                Some(in_flight.is_empty())
            } else {
                None
            }
        };
        if let Some(idle) = settled {
            self.resource.update(|s| {
                if let Err(e) = &result {
                    s.error = Some(e.user_message());
                }
                if idle {
                    s.is_loading = false;
                }
            });
        }
        result
    }

    /// Warm the cache for every id in `targets`. Individual failures are
    /// logged and left uncached.
    pub async fn prefetch(&self, targets: &[Id]) {
        let results = join_all(targets.iter().map(|target| self.get(target))).await;
        for (target, result) in targets.iter().zip(results) {
            if let Err(e) = result {
                crate::log_warn!("mutual friends: prefetch for {} failed: {}", target, e);
            }
        }
    }

    fn fetch(&self, target: Id) -> CountFuture {
        let api = self.api.clone();
        let resource = self.resource.clone();
        async move {
            let count = api.mutual_friends(&target).await?.total_or_len();
            resource.update(|s| {
                s.data.insert(target, count);
            });
            Ok(count)
        }
        .boxed_local()
        .shared()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::testing::{gateway, reply, user_json, MockTransport};

    fn path(id: &str) -> String {
        format!("/api/users/{id}/mutual-friends/")
    }

    fn backend() -> Rc<MockTransport> {
        MockTransport::new(|req| match req.path.as_str() {
            "/api/users/u1/mutual-friends/" => reply(200, json!([user_json(2), user_json(3)])),
            "/api/users/u2/mutual-friends/" => {
                reply(200, json!({ "count": 40, "next": "?page=2", "results": [user_json(4)] }))
            }
            _ => reply(500, json!({})),
        })
    }

    #[tokio::test]
    async fn second_get_is_served_from_memory() {
        let transport = backend();
        let cache = MutualFriendCache::new(Api::new(gateway(transport.clone())));
        let target = Id::from("u1");

        assert_eq!(cache.cached(&target), None);
        assert_eq!(cache.get(&target).await.unwrap(), 2);
        assert_eq!(cache.get(&target).await.unwrap(), 2);

        assert_eq!(transport.count(&path("u1")), 1);
        assert_eq!(cache.cached(&target), Some(2));
    }

    #[tokio::test]
    async fn concurrent_misses_share_one_fetch() {
        let transport = backend();
        let cache = MutualFriendCache::new(Api::new(gateway(transport.clone())));
        let release = transport.hold(&path("u2"));
        let target = Id::from("u2");

        let (a, b, _) = futures_util::join!(cache.get(&target), cache.get(&target), async move {
            release.send(()).unwrap();
        });

        assert_eq!(a.unwrap(), 40);
        assert_eq!(b.unwrap(), 40);
        assert_eq!(transport.count(&path("u2")), 1);
    }

    #[tokio::test]
    async fn failures_are_not_cached() {
        let transport = backend();
        let cache = MutualFriendCache::new(Api::new(gateway(transport.clone())));
        let target = Id::from("broken");

        assert!(cache.get(&target).await.is_err());
        assert!(cache.get(&target).await.is_err());

        assert_eq!(transport.count(&path("broken")), 2);
        assert_eq!(cache.cached(&target), None);
        let state = cache.snapshot();
        assert!(state.error.is_some());
        assert!(!state.is_loading);
    }

    #[tokio::test]
    async fn loading_is_reported_while_a_fetch_runs() {
        let transport = backend();
        let cache = MutualFriendCache::new(Api::new(gateway(transport.clone())));
        let release = transport.hold(&path("u1"));
        let observer = cache.clone();

        let user_id = Id::from("u1");
        let (count, _) = futures_util::join!(cache.get(&user_id), async move {
            assert!(observer.snapshot().is_loading);
            release.send(()).unwrap();
        });

        assert_eq!(count.unwrap(), 2);
        let state = cache.snapshot();
        assert!(!state.is_loading);
        assert!(state.error.is_none());
    }

    #[tokio::test]
    async fn prefetch_fills_what_it_can() {
        let transport = backend();
        let cache = MutualFriendCache::new(Api::new(gateway(transport)));

        cache
            .prefetch(&[Id::from("u1"), Id::from("u2"), Id::from("broken")])
            .await;

        let snapshot = cache.snapshot().data;
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.get(&Id::from("u2")), Some(&40));
    }
}
