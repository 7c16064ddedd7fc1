//! Resource operations: typed call shapes over the gateway.
//!
//! Each operation maps its parameters to one gateway call and normalizes the
//! response. Nothing here caches or retries; that is the gateway's and the
//! hooks' business.

mod auth;
mod boosts;
mod comments;
mod feed;
mod friendships;
mod listing;
mod posts;
mod upload;
mod users;

pub use listing::{ListResponse, Listing};

use circle_shared::{ApiError, Id};
use serde::de::DeserializeOwned;

use crate::gateway::Gateway;
use crate::transport::HttpRequest;

/// Entry point for every resource operation. Cheap to clone.
#[derive(Clone)]
pub struct Api {
    gateway: Gateway,
}

impl Api {
    pub fn new(gateway: Gateway) -> Self {
        Self { gateway }
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    async fn list<T: DeserializeOwned>(&self, request: HttpRequest) -> Result<Listing<T>, ApiError> {
        let raw: ListResponse<T> = self.gateway.send_json(request).await?;
        Ok(raw.into())
    }
}

/// Percent-encode an id for use as a path segment.
fn seg(id: &Id) -> String {
    urlencoding::encode(id.as_str()).into_owned()
}
