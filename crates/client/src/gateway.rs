//! Authenticated request gateway.
//!
//! Every call to the API goes through [`Gateway`]. It attaches the stored
//! access token as a bearer credential and recovers from exactly one class of
//! failure on its own: a 401, by refreshing the access token and replaying the
//! original request once.
//!
//! ```text
//!   execute(req) ──► attach token ──► transport ──► 2xx ──► Ok
//!                                        │
//!                                        ├─► other status ──► Err(Server/Validation)
//!                                        │
//!                                        └─► 401
//!                                             ├─ already retried ──────────► Err(Unauthorized)
//!                                             ├─ refresh endpoint itself ──► logout, Err(RefreshFailed)
//!                                             ├─ no refresh token ─────────► logout, Err(Unauthorized)
//!                                             └─ refresh ─┬─ ok ──► persist, retry once
//!                                                         └─ err ─► logout, Err(RefreshFailed)
//! ```
//!
//! The refresh call itself bypasses interception, so a rejected refresh can
//! never recurse into another refresh.

use std::future::Future;
use std::pin::pin;
use std::rc::Rc;
use std::time::Duration;

use circle_shared::{ApiError, RefreshRequest, RefreshedToken};
use futures_channel::mpsc::UnboundedReceiver;
use futures_util::future::{select, Either, FutureExt};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::{ClientConfig, RefreshStrategy};
use crate::refresh::{RefreshCoordinator, RefreshFuture};
use crate::session::{AuthEvent, LogoutReason, SessionStore};
use crate::storage::PlatformStorage;
use crate::transport::{Body, HttpRequest, HttpResponse, ReqwestTransport, Transport, TransportError};

/// One logical request on its way through the gateway.
#[derive(Debug, Clone)]
pub struct PendingRequest {
    pub request: HttpRequest,
    /// Set once the request has been replayed after a refresh. Never reset.
    pub retried: bool,
    /// Access token attached on the last attempt.
    sent_with: Option<String>,
}

impl PendingRequest {
    pub fn new(request: HttpRequest) -> Self {
        Self {
            request,
            retried: false,
            sent_with: None,
        }
    }
}

struct Inner {
    transport: Rc<dyn Transport>,
    session: SessionStore,
    config: ClientConfig,
    refresh: RefreshCoordinator,
}

/// Handle to the application's gateway. Clones share one instance.
#[derive(Clone)]
pub struct Gateway {
    inner: Rc<Inner>,
}

impl Gateway {
    pub fn new(transport: Rc<dyn Transport>, session: SessionStore, config: ClientConfig) -> Self {
        let refresh = RefreshCoordinator::new(config.refresh_strategy);
        Self {
            inner: Rc::new(Inner {
                transport,
                session,
                config,
                refresh,
            }),
        }
    }

    /// Gateway over `reqwest` with platform storage, as used by the app root.
    pub fn from_config(config: ClientConfig) -> Self {
        let transport = Rc::new(ReqwestTransport::new(config.base_url.clone()));
        let storage = Rc::new(PlatformStorage::new(config.storage_namespace.clone()));
        let session = SessionStore::new(storage, &config.storage_namespace);
        Self::new(transport, session, config)
    }

    pub fn session(&self) -> &SessionStore {
        &self.inner.session
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Session lifecycle events; `LoggedOut` means "go to the entry point".
    pub fn auth_events(&self) -> UnboundedReceiver<AuthEvent> {
        self.inner.session.subscribe()
    }

    /// Send `request`, recovering from a single 401 through the refresh protocol.
    pub async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
        let mut pending = PendingRequest::new(request);
        loop {
            let response = self.dispatch(&mut pending).await?;
            if response.status != 401 {
                return self.finish(&pending, response);
            }
            // Ok means the request is marked retried and goes around once more.
            self.recover_unauthorized(&mut pending, response).await?;
        }
    }

    /// Send `request` without credentials and without the refresh protocol.
    ///
    /// For login and registration, where a 401 means bad credentials rather
    /// than an expired session.
    pub async fn execute_public(&self, mut request: HttpRequest) -> Result<HttpResponse, ApiError> {
        request
            .headers
            .retain(|(name, _)| !name.eq_ignore_ascii_case("Authorization"));
        let response = with_timeout(self.inner.transport.send(&request), self.inner.config.request_timeout)
            .await
            .map_err(|e| ApiError::Network(e.0))?;

        match response.status {
            _ if response.is_success() => Ok(response),
            401 => Err(ApiError::Unauthorized {
                body: Some(response.body),
            }),
            status => Err(ApiError::from_status(status, response.body)),
        }
    }

    async fn dispatch(&self, pending: &mut PendingRequest) -> Result<HttpResponse, ApiError> {
        let token = self.inner.session.access_token();
        match &token {
            Some(token) => pending
                .request
                .set_header("Authorization", format!("Bearer {token}")),
            None => pending
                .request
                .headers
                .retain(|(name, _)| !name.eq_ignore_ascii_case("Authorization")),
        }
        pending.sent_with = token;

        let send = self.inner.transport.send(&pending.request);
        with_timeout(send, self.inner.config.request_timeout)
            .await
            .map_err(|e| {
                crate::log_warn!(
                    "gateway: {} {} failed: {}",
                    pending.request.method,
                    pending.request.path,
                    e
                );
                ApiError::Network(e.0)
            })
    }

    fn finish(&self, pending: &PendingRequest, response: HttpResponse) -> Result<HttpResponse, ApiError> {
        if response.is_success() {
            return Ok(response);
        }
        crate::log_warn!(
            "gateway: {} {} returned {}",
            pending.request.method,
            pending.request.path,
            response.status
        );
        Err(ApiError::from_status(response.status, response.body))
    }

    async fn recover_unauthorized(
        &self,
        pending: &mut PendingRequest,
        response: HttpResponse,
    ) -> Result<(), ApiError> {
        let session = &self.inner.session;
        let path = &pending.request.path;

        if pending.retried {
            crate::log_warn!("gateway: {} still unauthorized after refresh", path);
            return Err(ApiError::Unauthorized {
                body: Some(response.body),
            });
        }

        if self.inner.config.is_refresh_path(path) {
            session.logout(LogoutReason::RefreshEndpointRejected);
            return Err(ApiError::RefreshFailed {
                reason: "refresh token rejected".to_string(),
            });
        }

        // Another request already replaced the token this one was sent with.
        if self.inner.refresh.strategy() == RefreshStrategy::SingleFlight {
            if let Some(current) = session.access_token() {
                if pending.sent_with.as_deref() != Some(current.as_str()) {
                    crate::log_debug!("gateway: {} raced a refresh, replaying", path);
                    pending.retried = true;
                    return Ok(());
                }
            }
        }

        let Some(refresh_token) = session.refresh_token() else {
            session.logout(LogoutReason::MissingRefreshToken);
            return Err(ApiError::Unauthorized {
                body: Some(response.body),
            });
        };

        self.inner
            .refresh
            .run(|| self.start_refresh(refresh_token))
            .await?;

        pending.retried = true;
        Ok(())
    }

    /// Refresh call on a separate channel that is never intercepted.
    ///
    /// Persists the new token before resolving, so a replay always carries it.
    /// A result for a session that ended meanwhile is dropped.
    fn start_refresh(&self, refresh_token: String) -> RefreshFuture {
        let transport = self.inner.transport.clone();
        let session = self.inner.session.clone();
        let path = self.inner.config.refresh_path.clone();
        let timeout = self.inner.config.request_timeout;

        async move {
            crate::log_info!("gateway: refreshing access token");
            let used_refresh = refresh_token.clone();
            let body = serde_json::to_value(RefreshRequest {
                refresh: refresh_token,
            })
            .map_err(|e| ApiError::Deserialize(e.to_string()))?;
            let request = HttpRequest::post(path).with_json(body);

            let outcome = match with_timeout(transport.send(&request), timeout).await {
                Ok(resp) if resp.is_success() => serde_json::from_str::<RefreshedToken>(&resp.body)
                    .map_err(|e| format!("malformed refresh response: {e}")),
                Ok(resp) => Err(format!("refresh rejected with HTTP {}", resp.status)),
                Err(e) => Err(e.0),
            };

            match outcome {
                Ok(token) => {
                    if session.store_refreshed(&used_refresh, &token.access, token.refresh.as_deref()) {
                        crate::log_info!("gateway: access token refreshed");
                        return Ok(());
                    }
                    // The session moved on while this refresh was in flight.
                    if session.refresh_token().is_none() {
                        crate::log_warn!("gateway: session ended during refresh, discarding new token");
                        return Err(ApiError::RefreshFailed {
                            reason: "session ended during refresh".to_string(),
                        });
                    }
                    crate::log_debug!("gateway: credentials replaced during refresh, keeping the newer ones");
                    Ok(())
                }
                Err(reason) => {
                    crate::log_error!("gateway: refresh failed: {}", reason);
                    if session.refresh_token().as_deref() == Some(used_refresh.as_str()) {
                        session.logout(LogoutReason::RefreshFailed);
                    }
                    Err(ApiError::RefreshFailed { reason })
                }
            }
        }
        .boxed_local()
    }

    // --- Typed helpers ---

    /// Execute and decode a JSON response. Empty bodies decode as `null`.
    pub async fn send_json<TRes: DeserializeOwned>(&self, request: HttpRequest) -> Result<TRes, ApiError> {
        let response = self.execute(request).await?;
        decode(&response.body)
    }

    /// [`Gateway::execute_public`] plus JSON decoding.
    pub async fn send_public_json<TRes: DeserializeOwned>(
        &self,
        request: HttpRequest,
    ) -> Result<TRes, ApiError> {
        let response = self.execute_public(request).await?;
        decode(&response.body)
    }

    pub async fn get_json<TRes: DeserializeOwned>(&self, path: &str) -> Result<TRes, ApiError> {
        self.send_json(HttpRequest::get(path)).await
    }

    pub async fn get_json_with_query<TRes: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<TRes, ApiError> {
        let request = query
            .iter()
            .fold(HttpRequest::get(path), |req, (k, v)| req.with_query(*k, v));
        self.send_json(request).await
    }

    pub async fn post_json<TReq: Serialize, TRes: DeserializeOwned>(
        &self,
        path: &str,
        body: &TReq,
    ) -> Result<TRes, ApiError> {
        self.send_json(HttpRequest::post(path).with_json(encode(body)?))
            .await
    }

    pub async fn put_json<TReq: Serialize, TRes: DeserializeOwned>(
        &self,
        path: &str,
        body: &TReq,
    ) -> Result<TRes, ApiError> {
        self.send_json(HttpRequest::new(reqwest::Method::PUT, path).with_json(encode(body)?))
            .await
    }

    pub async fn patch_json<TReq: Serialize, TRes: DeserializeOwned>(
        &self,
        path: &str,
        body: &TReq,
    ) -> Result<TRes, ApiError> {
        self.send_json(HttpRequest::new(reqwest::Method::PATCH, path).with_json(encode(body)?))
            .await
    }

    /// POST with no body, ignoring whatever the server answers.
    pub async fn post_empty(&self, path: &str) -> Result<(), ApiError> {
        self.execute(HttpRequest::post(path)).await?;
        Ok(())
    }

    pub async fn delete(&self, path: &str) -> Result<(), ApiError> {
        self.execute(HttpRequest::delete(path)).await?;
        Ok(())
    }

    pub async fn post_file<TRes: DeserializeOwned>(
        &self,
        path: &str,
        file_name: &str,
        mime: &str,
        bytes: Vec<u8>,
    ) -> Result<TRes, ApiError> {
        let body = Body::File {
            file_name: file_name.to_string(),
            mime: mime.to_string(),
            bytes,
        };
        self.send_json(HttpRequest::post(path).with_body(body)).await
    }
}

pub(crate) fn encode<T: Serialize>(body: &T) -> Result<serde_json::Value, ApiError> {
    serde_json::to_value(body).map_err(|e| ApiError::Deserialize(e.to_string()))
}

fn decode<T: DeserializeOwned>(text: &str) -> Result<T, ApiError> {
    let text = if text.trim().is_empty() { "null" } else { text };
    serde_json::from_str(text).map_err(|e| ApiError::Deserialize(e.to_string()))
}

async fn with_timeout<F>(send: F, timeout: Duration) -> Result<HttpResponse, TransportError>
where
    F: Future<Output = Result<HttpResponse, TransportError>>,
{
    let send = pin!(send);
    let timer = pin!(sleep(timeout));
    match select(send, timer).await {
        Either::Left((result, _)) => result,
        Either::Right(_) => Err(TransportError(format!(
            "request timed out after {}ms",
            timeout.as_millis()
        ))),
    }
}

#[cfg(not(target_arch = "wasm32"))]
async fn sleep(duration: Duration) {
    tokio::time::sleep(duration).await;
}

#[cfg(target_arch = "wasm32")]
async fn sleep(duration: Duration) {
    gloo_timers::future::sleep(duration).await;
}
