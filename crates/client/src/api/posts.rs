use circle_shared::{ApiError, Id, NewPost, Post};

use super::{seg, Api};

const POSTS: &str = "/api/posts/";

impl Api {
    pub async fn create_post(&self, post: &NewPost) -> Result<Post, ApiError> {
        self.gateway.post_json(POSTS, post).await
    }

    pub async fn delete_post(&self, id: &Id) -> Result<(), ApiError> {
        self.gateway.delete(&format!("{POSTS}{}/", seg(id))).await
    }

    pub async fn like(&self, id: &Id) -> Result<(), ApiError> {
        self.gateway.post_empty(&format!("{POSTS}{}/like/", seg(id))).await
    }

    pub async fn unlike(&self, id: &Id) -> Result<(), ApiError> {
        self.gateway.delete(&format!("{POSTS}{}/like/", seg(id))).await
    }
}
