//! Circle client core.
//!
//! Authenticated access to the Circle REST backend and the view caches the
//! UI renders from. Every call goes through the [`Gateway`], which attaches
//! the bearer token and recovers from an expired access token with one
//! refresh-and-retry. The [`hooks`] hold feed pages, the friendship graph and
//! mutual-friend counts, with optimistic updates that roll back on failure.

pub mod api;
pub mod auth_session;
pub mod config;
pub mod gateway;
pub mod hooks;
pub mod logging;
pub mod session;
pub mod storage;
pub mod transport;

mod refresh;
#[cfg(test)]
mod testing;

pub use api::{Api, Listing};
pub use auth_session::AuthContext;
pub use circle_shared::{ApiError, Id};
pub use config::{ClientConfig, RefreshStrategy};
pub use gateway::{Gateway, PendingRequest};
pub use session::{AuthEvent, LogoutReason, Session, SessionStore};
pub use storage::{MemoryStorage, PlatformStorage, Storage};
pub use transport::{HttpRequest, HttpResponse, ReqwestTransport, Transport, TransportError};
