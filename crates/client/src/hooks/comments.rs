use circle_shared::{ApiError, Comment, Id};

use super::resource::{Resource, ResourceState, SubscriptionId};
use crate::api::Api;

/// Comments under one post.
#[derive(Clone)]
pub struct CommentThread {
    api: Api,
    post: Id,
    resource: Resource<Vec<Comment>>,
}

impl CommentThread {
    pub fn new(api: Api, post: Id) -> Self {
        Self {
            api,
            post,
            resource: Resource::new(Vec::new()),
        }
    }

    pub fn post(&self) -> &Id {
        &self.post
    }

    pub fn snapshot(&self) -> ResourceState<Vec<Comment>> {
        self.resource.snapshot()
    }

    pub fn subscribe(&self, callback: impl Fn() + 'static) -> SubscriptionId {
        self.resource.subscribe(callback)
    }

    pub fn dispose(&self) {
        self.resource.dispose();
    }

    pub async fn load(&self) -> Result<(), ApiError> {
        self.resource.start_loading();
        match self.api.comments(&self.post).await {
            Ok(listing) => {
                self.resource.update(|s| {
                    s.data = listing.items;
                    s.is_loading = false;
                });
                Ok(())
            }
            Err(e) => {
                self.resource.fail(&e);
                Err(e)
            }
        }
    }

    /// Post a comment and append the server's copy once confirmed.
    pub async fn add(&self, text: &str) -> Result<Comment, ApiError> {
        let comment = self.api.add_comment(&self.post, text).await.inspect_err(|e| {
            self.resource.update(|s| s.error = Some(e.user_message()));
        })?;
        self.resource.update(|s| {
            if !s.data.iter().any(|c| c.id == comment.id) {
                s.data.push(comment.clone());
            }
        });
        Ok(comment)
    }
}
