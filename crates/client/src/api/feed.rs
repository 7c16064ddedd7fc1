use circle_shared::{ApiError, Post};

use super::{Api, Listing};
use crate::transport::HttpRequest;

const FEED: &str = "/api/feed/";

impl Api {
    /// One page of the home feed, 1-based.
    pub async fn feed(&self, page: u32) -> Result<Listing<Post>, ApiError> {
        self.list(HttpRequest::get(FEED).with_query("page", page)).await
    }
}
