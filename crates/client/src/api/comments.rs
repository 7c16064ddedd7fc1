use circle_shared::{ApiError, Comment, Id, NewComment};

use super::{seg, Api, Listing};
use crate::transport::HttpRequest;

impl Api {
    pub async fn comments(&self, post: &Id) -> Result<Listing<Comment>, ApiError> {
        self.list(HttpRequest::get(comments_path(post))).await
    }

    pub async fn add_comment(&self, post: &Id, text: &str) -> Result<Comment, ApiError> {
        let body = NewComment {
            text: text.to_string(),
        };
        self.gateway.post_json(&comments_path(post), &body).await
    }
}

fn comments_path(post: &Id) -> String {
    format!("/api/posts/{}/comments/", seg(post))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::testing::{comment_json, gateway, reply, MockTransport};

    #[tokio::test]
    async fn bare_array_comments_are_accepted() {
        let transport = MockTransport::new(|_| reply(200, json!([comment_json(1, 9), comment_json(2, 9)])));
        let listing = Api::new(gateway(transport)).comments(&Id::from(9)).await.unwrap();
        assert_eq!(listing.items.len(), 2);
        assert!(!listing.has_next);
    }
}
