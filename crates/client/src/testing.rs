//! Test doubles shared by the unit tests.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use async_trait::async_trait;
use futures_channel::oneshot;
use futures_util::future::{FutureExt, Shared};
use serde_json::{json, Value};

use crate::config::{ClientConfig, RefreshStrategy};
use crate::gateway::Gateway;
use crate::session::SessionStore;
use crate::transport::{HttpRequest, HttpResponse, Transport, TransportError};

pub(crate) type Reply = Result<HttpResponse, TransportError>;

/// Scripted transport: answers through a handler and records every request.
pub(crate) struct MockTransport {
    handler: Box<dyn Fn(&HttpRequest) -> Reply>,
    requests: RefCell<Vec<HttpRequest>>,
    holds: RefCell<Vec<Hold>>,
}

struct Hold {
    path: String,
    gate: Shared<oneshot::Receiver<()>>,
    /// Consumed by the first matching request.
    once: bool,
}

impl MockTransport {
    pub(crate) fn new(handler: impl Fn(&HttpRequest) -> Reply + 'static) -> Rc<Self> {
        Rc::new(Self {
            handler: Box::new(handler),
            requests: RefCell::new(Vec::new()),
            holds: RefCell::new(Vec::new()),
        })
    }

    /// Hold every request to `path` until the returned sender fires or drops.
    pub(crate) fn hold(&self, path: &str) -> oneshot::Sender<()> {
        self.add_hold(path, false)
    }

    /// Hold only the next request to `path`; later ones pass straight through.
    pub(crate) fn hold_once(&self, path: &str) -> oneshot::Sender<()> {
        self.add_hold(path, true)
    }

    fn add_hold(&self, path: &str, once: bool) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.holds.borrow_mut().push(Hold {
            path: path.to_string(),
            gate: rx.shared(),
            once,
        });
        tx
    }

    pub(crate) fn requests(&self) -> Vec<HttpRequest> {
        self.requests.borrow().clone()
    }

    pub(crate) fn count(&self, path: &str) -> usize {
        self.requests
            .borrow()
            .iter()
            .filter(|r| r.path == path)
            .count()
    }
}

#[async_trait(?Send)]
impl Transport for MockTransport {
    async fn send(&self, request: &HttpRequest) -> Reply {
        self.requests.borrow_mut().push(request.clone());
        let gate = {
            let mut holds = self.holds.borrow_mut();
            holds
                .iter()
                .position(|hold| hold.path == request.path)
                .map(|index| {
                    if holds[index].once {
                        holds.remove(index).gate
                    } else {
                        holds[index].gate.clone()
                    }
                })
        };
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        (self.handler)(request)
    }
}

pub(crate) fn reply(status: u16, body: Value) -> Reply {
    Ok(HttpResponse::new(status, body.to_string()))
}

pub(crate) fn bearer(request: &HttpRequest) -> Option<&str> {
    request
        .header("Authorization")
        .and_then(|v| v.strip_prefix("Bearer "))
}

pub(crate) fn test_config() -> ClientConfig {
    ClientConfig::default()
        .with_base_url("http://api.test")
        .with_request_timeout(Duration::from_secs(5))
}

/// Gateway over `transport` with a logged-in in-memory session.
pub(crate) fn gateway(transport: Rc<MockTransport>) -> Gateway {
    gateway_with(transport, RefreshStrategy::SingleFlight)
}

pub(crate) fn gateway_with(transport: Rc<MockTransport>, strategy: RefreshStrategy) -> Gateway {
    let session = SessionStore::in_memory();
    session.set_tokens("access-1", "refresh-1");
    Gateway::new(
        transport,
        session,
        test_config().with_refresh_strategy(strategy),
    )
}

// --- JSON fixtures, shaped like the server's responses ---

pub(crate) fn user_json(id: u64) -> Value {
    json!({ "id": id, "username": format!("user{id}"), "avatar": null })
}

pub(crate) fn post_json(id: u64) -> Value {
    json!({
        "id": id,
        "author": user_json(1),
        "content": format!("post {id}"),
        "image": null,
        "created_at": "2024-05-01T12:00:00Z",
        "likes_count": 3,
        "is_liked": false,
        "boosts_count": 0,
        "is_boosted": false,
        "comments_count": 0
    })
}

pub(crate) fn edge_json(id: u64, requester: u64, addressee: u64, status: &str) -> Value {
    json!({
        "id": id,
        "requester": user_json(requester),
        "addressee": user_json(addressee),
        "status": status,
        "created_at": "2024-05-01T12:00:00Z"
    })
}

pub(crate) fn comment_json(id: u64, post: u64) -> Value {
    json!({
        "id": id,
        "post": post,
        "author": user_json(2),
        "text": format!("comment {id}"),
        "created_at": "2024-05-01T12:00:00Z"
    })
}

/// A feed page envelope with `ids`, pointing at a next page when `has_next`.
pub(crate) fn feed_page_json(ids: &[u64], has_next: bool) -> Value {
    json!({
        "count": 100,
        "next": if has_next { Value::from("http://api.test/api/feed/?page=next") } else { Value::Null },
        "previous": null,
        "results": ids.iter().map(|id| post_json(*id)).collect::<Vec<_>>()
    })
}

pub(crate) fn query_param<'a>(request: &'a HttpRequest, key: &str) -> Option<&'a str> {
    request
        .query
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}
