use circle_shared::{ApiError, FriendshipEdge, Id, NewFriendRequest, User};

use super::{seg, Api};
use crate::transport::HttpRequest;

const FRIENDSHIPS: &str = "/api/friendships/";

/// Upper bound on pages followed when collecting the edge set.
const MAX_EDGE_PAGES: u32 = 50;

impl Api {
    /// Every friendship edge involving the current user, across all pages.
    pub async fn friendships(&self) -> Result<Vec<FriendshipEdge>, ApiError> {
        let mut edges = Vec::new();
        for page in 1..=MAX_EDGE_PAGES {
            let listing = self
                .list::<FriendshipEdge>(HttpRequest::get(FRIENDSHIPS).with_query("page", page))
                .await?;
            edges.extend(listing.items);
            if !listing.has_next {
                return Ok(edges);
            }
        }
        crate::log_warn!("friendships: stopped after {} pages", MAX_EDGE_PAGES);
        Ok(edges)
    }

    pub async fn send_friend_request(&self, addressee: &Id) -> Result<FriendshipEdge, ApiError> {
        let body = NewFriendRequest {
            addressee: addressee.clone(),
        };
        self.gateway.post_json(FRIENDSHIPS, &body).await
    }

    pub async fn accept_friend_request(&self, edge: &Id) -> Result<(), ApiError> {
        self.gateway
            .post_empty(&format!("{FRIENDSHIPS}{}/accept/", seg(edge)))
            .await
    }

    pub async fn decline_friend_request(&self, edge: &Id) -> Result<(), ApiError> {
        self.gateway
            .post_empty(&format!("{FRIENDSHIPS}{}/decline/", seg(edge)))
            .await
    }

    /// Unfriend, or cancel a sent request.
    pub async fn remove_friendship(&self, edge: &Id) -> Result<(), ApiError> {
        self.gateway
            .delete(&format!("{FRIENDSHIPS}{}/", seg(edge)))
            .await
    }

    pub async fn friend_suggestions(&self) -> Result<Vec<User>, ApiError> {
        let request = HttpRequest::get(format!("{FRIENDSHIPS}suggestions/"));
        Ok(self.list(request).await?.items)
    }
}
