//! Paginated home feed.

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::rc::Rc;

use circle_shared::{ApiError, Id, NewPost, Post};

use super::optimistic::{OptimisticCommand, RemoveById};
use super::resource::{Resource, ResourceState, SubscriptionId};
use crate::api::Api;

/// Loaded feed pages, in server order, without duplicate ids.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedPage {
    pub items: Vec<Post>,
    /// Last page merged into `items`; 0 before anything was loaded.
    pub cursor: u32,
    pub has_more: bool,
}

impl Default for FeedPage {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            cursor: 0,
            has_more: true,
        }
    }
}

impl FeedPage {
    pub fn get(&self, id: &Id) -> Option<&Post> {
        self.items.iter().find(|p| &p.id == id)
    }

    fn get_mut(&mut self, id: &Id) -> Option<&mut Post> {
        self.items.iter_mut().find(|p| &p.id == id)
    }

    /// Append posts not already present, keeping their order.
    fn append(&mut self, posts: Vec<Post>) {
        let mut seen: HashSet<Id> = self.items.iter().map(|p| p.id.clone()).collect();
        self.items
            .extend(posts.into_iter().filter(|p| seen.insert(p.id.clone())));
    }

    fn replace(&mut self, posts: Vec<Post>) {
        self.items.clear();
        self.append(posts);
    }
}

/// A flag on a post that the viewer toggles, with its counter.
fn like_fields(post: &mut Post) -> (&mut bool, &mut u32) {
    (&mut post.is_liked, &mut post.likes_count)
}

fn boost_fields(post: &mut Post) -> (&mut bool, &mut u32) {
    (&mut post.is_boosted, &mut post.boosts_count)
}

fn feed_items(feed: &mut FeedPage) -> &mut Vec<Post> {
    &mut feed.items
}

fn post_id(post: &Post) -> &Id {
    &post.id
}

/// Flip a viewer flag and adjust its counter. Revert restores both values,
/// unless the post was replaced by fresher server data in the meantime.
struct TogglePostFlag {
    post: Id,
    fields: fn(&mut Post) -> (&mut bool, &mut u32),
    previous: Option<(bool, u32)>,
    applied: Option<(bool, u32)>,
}

impl TogglePostFlag {
    fn new(post: Id, fields: fn(&mut Post) -> (&mut bool, &mut u32)) -> Self {
        Self {
            post,
            fields,
            previous: None,
            applied: None,
        }
    }
}

impl OptimisticCommand<FeedPage> for TogglePostFlag {
    fn apply(&mut self, feed: &mut FeedPage) {
        if let Some(post) = feed.get_mut(&self.post) {
            let (flag, count) = (self.fields)(post);
            self.previous = Some((*flag, *count));
            *flag = !*flag;
            *count = if *flag {
                count.saturating_add(1)
            } else {
                count.saturating_sub(1)
            };
            self.applied = Some((*flag, *count));
        }
    }

    fn revert(&mut self, feed: &mut FeedPage) {
        let (Some((was_set, was_count)), Some(applied)) = (self.previous, self.applied) else {
            return;
        };
        if let Some(post) = feed.get_mut(&self.post) {
            let (flag, count) = (self.fields)(post);
            if (*flag, *count) != applied {
                return;
            }
            *flag = was_set;
            *count = was_count;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Mutation {
    Like,
    Boost,
    Remove,
}

#[derive(Default)]
struct Flags {
    loading_more: Cell<bool>,
    /// Bumped by every first-page load; older page results are discarded.
    generation: Cell<u64>,
    in_flight: RefCell<HashSet<(Mutation, Id)>>,
}

/// Feed view state plus its triggers.
#[derive(Clone)]
pub struct FeedHook {
    api: Api,
    resource: Resource<FeedPage>,
    flags: Rc<Flags>,
}

impl FeedHook {
    pub fn new(api: Api) -> Self {
        Self {
            api,
            resource: Resource::new(FeedPage::default()),
            flags: Rc::new(Flags::default()),
        }
    }

    pub fn snapshot(&self) -> ResourceState<FeedPage> {
        self.resource.snapshot()
    }

    pub fn resource(&self) -> &Resource<FeedPage> {
        &self.resource
    }

    pub fn subscribe(&self, callback: impl Fn() + 'static) -> SubscriptionId {
        self.resource.subscribe(callback)
    }

    pub fn is_loading_more(&self) -> bool {
        self.flags.loading_more.get()
    }

    pub fn dispose(&self) {
        self.resource.dispose();
    }

    /// Replace everything with page 1.
    pub async fn load_first_page(&self) -> Result<(), ApiError> {
        let generation = self.flags.generation.get() + 1;
        self.flags.generation.set(generation);
        self.resource.start_loading();

        let result = self.api.feed(1).await;
        if self.flags.generation.get() != generation {
            return Ok(());
        }

        match result {
            Ok(listing) => {
                self.resource.update(|s| {
                    s.data.replace(listing.items);
                    s.data.cursor = 1;
                    s.data.has_more = listing.has_next;
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

    /// Append the next page. No-op while any load is outstanding or when the
    /// server reported no further pages.
    pub async fn load_next_page(&self) -> Result<(), ApiError> {
        let (busy, has_more, cursor) = self
            .resource
            .read(|s| (s.is_loading, s.data.has_more, s.data.cursor));
        if self.flags.loading_more.get() || busy || !has_more {
            return Ok(());
        }

        self.flags.loading_more.set(true);
        let generation = self.flags.generation.get();
        let page = cursor + 1;
        self.resource.start_loading();

        let result = self.api.feed(page).await;
        self.flags.loading_more.set(false);
        if self.flags.generation.get() != generation {
            crate::log_debug!("feed: discarding page {} from before a refresh", page);
            return Ok(());
        }

        match result {
            Ok(listing) => {
                self.resource.update(|s| {
                    s.data.append(listing.items);
                    s.data.cursor = page;
                    s.data.has_more = listing.has_next;
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

    /// Put `post` at the front, replacing any entry with the same id.
    pub fn prepend_local(&self, post: Post) {
        self.resource.update(|s| {
            s.data.items.retain(|p| p.id != post.id);
            s.data.items.insert(0, post);
        });
    }

    /// Upload the optional image, create the post and show it at the front.
    pub async fn create_post(
        &self,
        content: &str,
        image: Option<(String, String, Vec<u8>)>,
    ) -> Result<Post, ApiError> {
        let result = self.publish(content, image).await;

        match result {
            Ok(post) => {
                self.prepend_local(post.clone());
                Ok(post)
            }
            Err(e) => {
                self.resource.update(|s| s.error = Some(e.user_message()));
                Err(e)
            }
        }
    }

    async fn publish(
        &self,
        content: &str,
        image: Option<(String, String, Vec<u8>)>,
    ) -> Result<Post, ApiError> {
        let image = match image {
            Some((file_name, mime, bytes)) => Some(self.api.upload(&file_name, &mime, bytes).await?.url),
            None => None,
        };
        let draft = NewPost {
            content: content.to_string(),
            image,
        };
        self.api.create_post(&draft).await
    }

    /// Like or unlike, showing the result immediately and rolling back on failure.
    pub async fn toggle_like(&self, id: &Id) -> Result<(), ApiError> {
        self.toggle(Mutation::Like, id, like_fields).await
    }

    /// Boost or unboost, showing the result immediately and rolling back on failure.
    pub async fn toggle_boost(&self, id: &Id) -> Result<(), ApiError> {
        self.toggle(Mutation::Boost, id, boost_fields).await
    }

    async fn toggle(
        &self,
        kind: Mutation,
        id: &Id,
        fields: fn(&mut Post) -> (&mut bool, &mut u32),
    ) -> Result<(), ApiError> {
        let Some(was_set) = self.resource.read(|s| {
            s.data
                .get(id)
                .map(|p| if kind == Mutation::Like { p.is_liked } else { p.is_boosted })
        }) else {
            return Ok(());
        };
        // A toggle on the same post is already waiting for the server.
        if !self.begin(kind, id) {
            return Ok(());
        }

        let command = TogglePostFlag::new(id.clone(), fields);
        let request = async {
            match (kind, was_set) {
                (Mutation::Like, false) => self.api.like(id).await,
                (Mutation::Like, true) => self.api.unlike(id).await,
                (_, false) => self.api.boost(id).await,
                (_, true) => self.api.unboost(id).await,
            }
        };
        let result = self.resource.mutate_optimistic(command, request).await;
        self.end(kind, id);
        result
    }

    /// Delete a post, hiding it immediately and restoring it in place on failure.
    pub async fn remove_post(&self, id: &Id) -> Result<(), ApiError> {
        if !self.begin(Mutation::Remove, id) {
            return Ok(());
        }
        let command = RemoveById::new(id.clone(), feed_items, post_id);
        let result = self
            .resource
            .mutate_optimistic(command, self.api.delete_post(id))
            .await;
        self.end(Mutation::Remove, id);
        result
    }

    fn begin(&self, kind: Mutation, id: &Id) -> bool {
        self.flags.in_flight.borrow_mut().insert((kind, id.clone()))
    }

    fn end(&self, kind: Mutation, id: &Id) {
        self.flags.in_flight.borrow_mut().remove(&(kind, id.clone()));
    }
}
