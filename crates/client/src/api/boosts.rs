use circle_shared::{ApiError, Id};

use super::{seg, Api};

impl Api {
    /// Reshare a post to the current user's followers.
    pub async fn boost(&self, post: &Id) -> Result<(), ApiError> {
        self.gateway.post_empty(&boost_path(post)).await
    }

    pub async fn unboost(&self, post: &Id) -> Result<(), ApiError> {
        self.gateway.delete(&boost_path(post)).await
    }
}

fn boost_path(post: &Id) -> String {
    format!("/api/posts/{}/boost/", seg(post))
}
