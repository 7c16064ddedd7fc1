//! Stateful view caches built on the resource operations.

mod comments;
mod feed;
mod friendships;
mod mutual_friends;
mod optimistic;
mod resource;

pub use comments::CommentThread;
pub use feed::{FeedHook, FeedPage};
pub use friendships::{classify, FriendshipView, FriendshipsHook, Relationship};
pub use mutual_friends::MutualFriendCache;
pub use optimistic::{OptimisticCommand, RemoveById};
pub use resource::{Resource, ResourceState, SubscriptionId};
