use circle_shared::{ApiError, Id, User};

use super::{seg, Api, Listing};
use crate::transport::HttpRequest;

impl Api {
    pub async fn user(&self, id: &Id) -> Result<User, ApiError> {
        self.gateway.get_json(&format!("/api/users/{}/", seg(id))).await
    }

    pub async fn search_users(&self, query: &str) -> Result<Vec<User>, ApiError> {
        let request = HttpRequest::get("/api/users/").with_query("search", query);
        Ok(self.list(request).await?.items)
    }

    /// Friends the current user shares with `id`.
    pub async fn mutual_friends(&self, id: &Id) -> Result<Listing<User>, ApiError> {
        self.list(HttpRequest::get(format!("/api/users/{}/mutual-friends/", seg(id))))
            .await
    }
}
