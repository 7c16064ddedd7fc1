//! Normalization of list endpoint responses.
//!
//! List endpoints answer either with a bare JSON array or with a paginated
//! envelope (`{count, next, previous, results}`). Both decode into
//! [`ListResponse`] and are normalized once into [`Listing`].

use serde::Deserialize;

/// Raw list response as sent by the server.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ListResponse<T> {
    Paginated {
        results: Vec<T>,
        #[serde(default)]
        next: Option<String>,
        #[serde(default)]
        previous: Option<String>,
        #[serde(default)]
        count: Option<u64>,
    },
    Array(Vec<T>),
}

/// A normalized list page.
#[derive(Debug, Clone, PartialEq)]
pub struct Listing<T> {
    pub items: Vec<T>,
    /// Whether the server points at a further page.
    pub has_next: bool,
    /// Total across all pages, when the server reports it.
    pub total: Option<u64>,
}

impl<T> Listing<T> {
    /// Total number of items, falling back to the length of this page.
    pub fn total_or_len(&self) -> u64 {
        self.total.unwrap_or(self.items.len() as u64)
    }
}

impl<T> From<ListResponse<T>> for Listing<T> {
    fn from(response: ListResponse<T>) -> Self {
        match response {
            ListResponse::Array(items) => Listing {
                items,
                has_next: false,
                total: None,
            },
            ListResponse::Paginated {
                results,
                next,
                count,
                ..
            } => Listing {
                items: results,
                has_next: next.is_some_and(|n| !n.is_empty()),
                total: count,
            },
        }
    }
}
