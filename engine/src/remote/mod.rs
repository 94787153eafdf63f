//! The remote data service boundary.
//!
//! Stores never talk to a transport directly. They call a [`RemoteService`]
//! bound to one entity type; the service decides wire format, endpoints and
//! authentication. [`memory::InMemoryRemote`] is an in-process implementation
//! used for offline demos and tests.

pub mod memory;

use crate::{error::Result, Entity};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use memory::InMemoryRemote;

/// One page of a remote collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    /// Items of this page, in display order
    pub items: Vec<T>,
    /// Total number of items the server holds for the resource
    pub total: u64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: u64) -> Self {
        Self { items, total }
    }
}

/// Async access to the remote copy of one resource.
///
/// Every call may fail with [`Error::Network`](crate::Error::Network),
/// [`Error::NotFound`](crate::Error::NotFound) or
/// [`Error::Validation`](crate::Error::Validation). Dropping the returned
/// future cancels the request.
#[async_trait]
pub trait RemoteService<T: Entity>: Send + Sync {
    /// Fetch a 1-based page.
    async fn fetch_page(&self, page: u32, page_size: u32) -> Result<Page<T>>;

    /// Create an entity. The returned entity carries the server-assigned id.
    async fn create(&self, payload: T) -> Result<T>;

    /// Apply a partial update and return the server's representation.
    async fn patch(&self, id: &str, patch: T::Patch) -> Result<T>;

    /// Delete an entity.
    async fn delete(&self, id: &str) -> Result<()>;

    /// Full-text search over the resource.
    async fn search(&self, term: &str) -> Result<Vec<T>>;
}
