//! Friendship graph as seen by the current user.

use std::cell::Cell;
use std::rc::Rc;

use circle_shared::{ApiError, FriendshipEdge, FriendshipStatus, Id, User};

use super::optimistic::RemoveById;
use super::resource::{Resource, ResourceState, SubscriptionId};
use crate::api::Api;

/// Edges partitioned by their meaning for `me`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FriendshipView {
    pub accepted: Vec<FriendshipEdge>,
    pub received_requests: Vec<FriendshipEdge>,
    pub sent_requests: Vec<FriendshipEdge>,
    pub suggestions: Vec<User>,
}

/// How another user relates to `me`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relationship {
    Friend,
    RequestReceived,
    RequestSent,
    None,
}

impl FriendshipView {
    pub fn relationship(&self, me: &Id, user: &Id) -> Relationship {
        let involves = |edges: &[FriendshipEdge]| edges.iter().any(|e| &e.other(me).id == user);
        if involves(&self.accepted) {
            Relationship::Friend
        } else if involves(&self.received_requests) {
            Relationship::RequestReceived
        } else if involves(&self.sent_requests) {
            Relationship::RequestSent
        } else {
            Relationship::None
        }
    }

    /// The edge linking `me` and `user`, whatever its state.
    pub fn edge_with(&self, me: &Id, user: &Id) -> Option<&FriendshipEdge> {
        self.accepted
            .iter()
            .chain(&self.received_requests)
            .chain(&self.sent_requests)
            .find(|e| &e.other(me).id == user)
    }
}

/// Partition `edges` for `me`. Declined edges and edges not involving `me`
/// are dropped.
pub fn classify(edges: Vec<FriendshipEdge>, me: &Id) -> FriendshipView {
    let mut view = FriendshipView::default();
    for edge in edges {
        match edge.status {
            FriendshipStatus::Accepted => view.accepted.push(edge),
            FriendshipStatus::Pending if &edge.requester.id == me => view.sent_requests.push(edge),
            FriendshipStatus::Pending if &edge.addressee.id == me => {
                view.received_requests.push(edge)
            }
            FriendshipStatus::Pending | FriendshipStatus::Declined => {}
        }
    }
    view
}

fn accepted_edges(view: &mut FriendshipView) -> &mut Vec<FriendshipEdge> {
    &mut view.accepted
}

fn edge_id(edge: &FriendshipEdge) -> &Id {
    &edge.id
}

#[derive(Clone)]
pub struct FriendshipsHook {
    api: Api,
    me: Id,
    resource: Resource<FriendshipView>,
    /// Bumped by every refresh; results of older refreshes are discarded.
    generation: Rc<Cell<u64>>,
}

impl FriendshipsHook {
    pub fn new(api: Api, me: Id) -> Self {
        Self {
            api,
            me,
            resource: Resource::new(FriendshipView::default()),
            generation: Rc::new(Cell::new(0)),
        }
    }

    pub fn me(&self) -> &Id {
        &self.me
    }

    pub fn snapshot(&self) -> ResourceState<FriendshipView> {
        self.resource.snapshot()
    }

    pub fn resource(&self) -> &Resource<FriendshipView> {
        &self.resource
    }

    pub fn subscribe(&self, callback: impl Fn() + 'static) -> SubscriptionId {
        self.resource.subscribe(callback)
    }

    pub fn relationship(&self, user: &Id) -> Relationship {
        self.resource.read(|s| s.data.relationship(&self.me, user))
    }

    pub fn dispose(&self) {
        self.resource.dispose();
    }

    /// Refetch and reclassify every edge, then the suggestions.
    ///
    /// A suggestions failure is recorded but keeps the new edges.
    pub async fn refresh(&self) -> Result<(), ApiError> {
        let generation = self.generation.get() + 1;
        self.generation.set(generation);
        self.resource.start_loading();

        let edges = self.api.friendships().await;
        if self.generation.get() != generation {
            crate::log_debug!("friendships: discarding edges from a superseded refresh");
            return Ok(());
        }
        let edges = match edges {
            Ok(edges) => edges,
            Err(e) => {
                self.resource.fail(&e);
                return Err(e);
            }
        };
        let view = classify(edges, &self.me);
        self.resource.update(|s| {
            s.data.accepted = view.accepted;
            s.data.received_requests = view.received_requests;
            s.data.sent_requests = view.sent_requests;
        });

        let suggestions = self.api.friend_suggestions().await;
        if self.generation.get() != generation {
            return Ok(());
        }
        match suggestions {
            Ok(suggestions) => {
                self.resource.update(|s| {
                    s.data.suggestions = suggestions;
                    s.is_loading = false;
                });
            }
            Err(e) => {
                crate::log_warn!("friendships: suggestions unavailable: {}", e);
                self.resource.fail(&e);
            }
        }
        Ok(())
    }

    pub async fn send_request(&self, addressee: &Id) -> Result<(), ApiError> {
        let result = self.api.send_friend_request(addressee).await.map(|_| ());
        self.then_refresh(result).await
    }

    pub async fn accept_request(&self, edge: &Id) -> Result<(), ApiError> {
        let result = self.api.accept_friend_request(edge).await;
        self.then_refresh(result).await
    }

    pub async fn decline_request(&self, edge: &Id) -> Result<(), ApiError> {
        let result = self.api.decline_friend_request(edge).await;
        self.then_refresh(result).await
    }

    /// Unfriend or cancel a request.
    pub async fn remove_edge(&self, edge: &Id) -> Result<(), ApiError> {
        let result = self.api.remove_friendship(edge).await;
        self.then_refresh(result).await
    }

    /// Drop a friend from `accepted` immediately and restore it if the server
    /// refuses.
    pub async fn remove_edge_local(&self, edge: &Id) -> Result<(), ApiError> {
        let command = RemoveById::new(edge.clone(), accepted_edges, edge_id);
        self.resource
            .mutate_optimistic(command, self.api.remove_friendship(edge))
            .await
    }

    async fn then_refresh(&self, result: Result<(), ApiError>) -> Result<(), ApiError> {
        if let Err(e) = result {
            self.resource.update(|s| s.error = Some(e.user_message()));
            return Err(e);
        }
        self.refresh().await
    }
}

#[cfg(test)]
mod tests {
    use reqwest::Method;
    use serde_json::{json, Value};

    use super::*;
    use crate::testing::{edge_json, gateway, reply, user_json, MockTransport};

    const ME: u64 = 1;

    fn edge(id: u64, requester: u64, addressee: u64, status: &str) -> FriendshipEdge {
        serde_json::from_value(edge_json(id, requester, addressee, status)).unwrap()
    }

    fn edge_ids(edges: &[FriendshipEdge]) -> Vec<String> {
        edges.iter().map(|e| e.id.to_string()).collect()
    }

    fn page(edges: Vec<Value>) -> Value {
        json!({ "count": edges.len(), "next": null, "previous": null, "results": edges })
    }

    fn graph() -> Vec<Value> {
        vec![
            edge_json(10, ME, 2, "ACCEPTED"),
            edge_json(11, 3, ME, "ACCEPTED"),
            edge_json(12, ME, 4, "PENDING"),
            edge_json(13, 5, ME, "PENDING"),
            edge_json(14, 6, ME, "DECLINED"),
        ]
    }

    #[test]
    fn classify_partitions_by_direction_and_status() {
        let edges = graph()
            .into_iter()
            .map(|v| serde_json::from_value(v).unwrap())
            .collect();

        let view = classify(edges, &Id::from(ME));

        assert_eq!(edge_ids(&view.accepted), ["10", "11"]);
        assert_eq!(edge_ids(&view.sent_requests), ["12"]);
        assert_eq!(edge_ids(&view.received_requests), ["13"]);
    }

    #[test]
    fn pending_edge_shows_as_sent_for_requester_and_received_for_addressee() {
        let a_to_b = || vec![edge(1, 100, 200, "PENDING")];

        let for_a = classify(a_to_b(), &Id::from(100));
        assert_eq!(edge_ids(&for_a.sent_requests), ["1"]);
        assert!(for_a.received_requests.is_empty());

        let for_b = classify(a_to_b(), &Id::from(200));
        assert_eq!(edge_ids(&for_b.received_requests), ["1"]);
        assert!(for_b.sent_requests.is_empty());

        let for_c = classify(a_to_b(), &Id::from(300));
        assert_eq!(for_c, FriendshipView::default());
    }

    #[test]
    fn relationship_lookup() {
        let me = Id::from(ME);
        let edges = graph()
            .into_iter()
            .map(|v| serde_json::from_value(v).unwrap())
            .collect();
        let view = classify(edges, &me);

        assert_eq!(view.relationship(&me, &Id::from(3)), Relationship::Friend);
        assert_eq!(view.relationship(&me, &Id::from(4)), Relationship::RequestSent);
        assert_eq!(view.relationship(&me, &Id::from(5)), Relationship::RequestReceived);
        assert_eq!(view.relationship(&me, &Id::from(6)), Relationship::None);
        assert_eq!(view.edge_with(&me, &Id::from(5)).map(|e| e.id.to_string()), Some("13".into()));
    }

    #[tokio::test]
    async fn refresh_loads_edges_and_suggestions() {
        let transport = MockTransport::new(|req| match req.path.as_str() {
            "/api/friendships/" => reply(200, page(graph())),
            _ => reply(200, json!([user_json(7)])),
        });
        let hook = FriendshipsHook::new(Api::new(gateway(transport)), Id::from(ME));

        hook.refresh().await.unwrap();

        let state = hook.snapshot();
        assert_eq!(state.data.accepted.len(), 2);
        assert_eq!(state.data.suggestions[0].id, Id::from(7));
        assert!(!state.is_loading);
        assert!(state.error.is_none());
    }

    #[tokio::test]
    async fn suggestions_failure_keeps_the_edges() {
        let transport = MockTransport::new(|req| match req.path.as_str() {
            "/api/friendships/" => reply(200, page(graph())),
            _ => reply(503, json!({ "detail": "Suggestions are down." })),
        });
        let hook = FriendshipsHook::new(Api::new(gateway(transport)), Id::from(ME));

        hook.refresh().await.unwrap();

        let state = hook.snapshot();
        assert_eq!(edge_ids(&state.data.received_requests), ["13"]);
        assert!(state.data.suggestions.is_empty());
        assert_eq!(state.error.as_deref(), Some("Suggestions are down."));
    }

    #[tokio::test]
    async fn older_refresh_finishing_last_is_discarded() {
        // The first edge list served is the newer one; the held refresh gets
        // the stale list when it is finally answered.
        let served = Rc::new(Cell::new(0));
        let counter = served.clone();
        let transport = MockTransport::new(move |req| match req.path.as_str() {
            "/api/friendships/" => {
                counter.set(counter.get() + 1);
                if counter.get() == 1 {
                    reply(200, page(vec![edge_json(10, ME, 2, "ACCEPTED")]))
                } else {
                    reply(200, page(graph()))
                }
            }
            _ => reply(200, json!([])),
        });
        let hook = FriendshipsHook::new(Api::new(gateway(transport.clone())), Id::from(ME));

        let release = transport.hold_once("/api/friendships/");
        let newer = hook.clone();
        let (older, _) = futures_util::join!(hook.refresh(), async move {
            newer.refresh().await.unwrap();
            release.send(()).unwrap();
        });

        assert!(older.is_ok());
        assert_eq!(served.get(), 2);
        let state = hook.snapshot();
        assert_eq!(edge_ids(&state.data.accepted), ["10"]);
        assert!(state.data.received_requests.is_empty());
        assert!(!state.is_loading);
    }

    #[tokio::test]
    async fn accept_then_refreshes_everything() {
        let transport = MockTransport::new(|req| match req.path.as_str() {
            "/api/friendships/" => reply(200, page(vec![edge_json(13, 5, ME, "ACCEPTED")])),
            "/api/friendships/13/accept/" => reply(200, json!({})),
            _ => reply(200, json!([])),
        });
        let hook = FriendshipsHook::new(Api::new(gateway(transport.clone())), Id::from(ME));

        hook.accept_request(&Id::from(13)).await.unwrap();

        let paths: Vec<String> = transport.requests().into_iter().map(|r| r.path).collect();
        assert_eq!(
            paths,
            [
                "/api/friendships/13/accept/",
                "/api/friendships/",
                "/api/friendships/suggestions/"
            ]
        );
        assert_eq!(hook.relationship(&Id::from(5)), Relationship::Friend);
    }

    #[tokio::test]
    async fn failed_mutation_skips_the_refresh() {
        let transport = MockTransport::new(|_| reply(400, json!({ "detail": "Already friends." })));
        let hook = FriendshipsHook::new(Api::new(gateway(transport.clone())), Id::from(ME));

        let err = hook.send_request(&Id::from(2)).await.unwrap_err();

        assert_eq!(err.user_message(), "Already friends.");
        assert_eq!(transport.requests().len(), 1);
        assert_eq!(hook.snapshot().error.as_deref(), Some("Already friends."));
    }

    #[tokio::test]
    async fn local_removal_is_restored_on_failure() {
        let transport = MockTransport::new(|req| {
            if req.method == Method::DELETE {
                reply(500, json!({}))
            } else if req.path == "/api/friendships/" {
                reply(200, page(graph()))
            } else {
                reply(200, json!([]))
            }
        });
        let hook = FriendshipsHook::new(Api::new(gateway(transport)), Id::from(ME));
        hook.refresh().await.unwrap();

        assert!(hook.remove_edge_local(&Id::from(10)).await.is_err());

        assert_eq!(edge_ids(&hook.snapshot().data.accepted), ["10", "11"]);
    }

    #[tokio::test]
    async fn local_removal_sticks_on_success() {
        let transport = MockTransport::new(|req| {
            if req.method == Method::DELETE {
                reply(204, json!(null))
            } else if req.path == "/api/friendships/" {
                reply(200, page(graph()))
            } else {
                reply(200, json!([]))
            }
        });
        let hook = FriendshipsHook::new(Api::new(gateway(transport.clone())), Id::from(ME));
        hook.refresh().await.unwrap();

        hook.remove_edge_local(&Id::from(10)).await.unwrap();

        assert_eq!(edge_ids(&hook.snapshot().data.accepted), ["11"]);
        assert_eq!(transport.count("/api/friendships/10/"), 1);
    }
}
