//! In-process remote service.
//!
//! Holds the "server" copy of a resource in memory, with knobs for latency,
//! injected failures and per-term search delays so that out-of-order
//! completions can be reproduced deterministically.

use super::{Page, RemoteService};
use crate::{entity::is_local_id, error::Result, Entity, Error};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Call counters, readable at any time.
#[derive(Debug, Default)]
pub struct CallCounts {
    fetch: AtomicUsize,
    create: AtomicUsize,
    patch: AtomicUsize,
    delete: AtomicUsize,
    search: AtomicUsize,
}

impl CallCounts {
    pub fn fetch(&self) -> usize {
        self.fetch.load(Ordering::SeqCst)
    }

    pub fn create(&self) -> usize {
        self.create.load(Ordering::SeqCst)
    }

    pub fn patch(&self) -> usize {
        self.patch.load(Ordering::SeqCst)
    }

    pub fn delete(&self) -> usize {
        self.delete.load(Ordering::SeqCst)
    }

    pub fn search(&self) -> usize {
        self.search.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
struct Inner<T> {
    items: Vec<T>,
    failures: VecDeque<Error>,
    search_delays: HashMap<String, Duration>,
    search_log: Vec<String>,
    next_id: u64,
}

/// A [`RemoteService`] backed by a `Vec`.
#[derive(Debug)]
pub struct InMemoryRemote<T> {
    inner: Mutex<Inner<T>>,
    latency: Duration,
    calls: CallCounts,
}

impl<T: Entity> Default for InMemoryRemote<T> {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl<T: Entity> InMemoryRemote<T> {
    /// Create a remote seeded with `items`.
    pub fn new(items: Vec<T>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                items,
                failures: VecDeque::new(),
                search_delays: HashMap::new(),
                search_log: Vec::new(),
                next_id: 1,
            }),
            latency: Duration::ZERO,
            calls: CallCounts::default(),
        }
    }

    /// Delay every call by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    fn inner(&self) -> MutexGuard<'_, Inner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make the next call (of any kind) fail with `error`.
    ///
    /// Failures queue up; each call consumes at most one.
    pub fn fail_next(&self, error: Error) {
        self.inner().failures.push_back(error);
    }

    /// Delay responses for one exact search term.
    pub fn delay_search(&self, term: impl Into<String>, delay: Duration) {
        self.inner().search_delays.insert(term.into(), delay);
    }

    /// Replace the server-side items.
    pub fn set_items(&self, items: Vec<T>) {
        self.inner().items = items;
    }

    /// Snapshot of the server-side items.
    pub fn items(&self) -> Vec<T> {
        self.inner().items.clone()
    }

    /// Terms that reached `search`, in call order.
    pub fn search_log(&self) -> Vec<String> {
        self.inner().search_log.clone()
    }

    pub fn calls(&self) -> &CallCounts {
        &self.calls
    }

    fn take_failure(&self) -> Option<Error> {
        self.inner().failures.pop_front()
    }

    async fn delay(&self, extra: Duration) {
        let total = self.latency + extra;
        if !total.is_zero() {
            tokio::time::sleep(total).await;
        }
    }
}

#[async_trait]
impl<T: Entity> RemoteService<T> for InMemoryRemote<T> {
    async fn fetch_page(&self, page: u32, page_size: u32) -> Result<Page<T>> {
        self.calls.fetch.fetch_add(1, Ordering::SeqCst);
        let failure = self.take_failure();
        self.delay(Duration::ZERO).await;
        if let Some(err) = failure {
            return Err(err);
        }

        let inner = self.inner();
        let start = (page.max(1) as usize - 1) * page_size as usize;
        let items = inner
            .items
            .iter()
            .skip(start)
            .take(page_size as usize)
            .cloned()
            .collect();
        Ok(Page::new(items, inner.items.len() as u64))
    }

    async fn create(&self, payload: T) -> Result<T> {
        self.calls.create.fetch_add(1, Ordering::SeqCst);
        let failure = self.take_failure();
        self.delay(Duration::ZERO).await;
        if let Some(err) = failure {
            return Err(err);
        }

        let mut inner = self.inner();
        let created = if payload.id().is_empty() || is_local_id(payload.id()) {
            let id = format!("{}-{}", T::RESOURCE, inner.next_id);
            inner.next_id += 1;
            payload.with_id(id)
        } else {
            payload
        };
        inner.items.push(created.clone());
        Ok(created)
    }

    async fn patch(&self, id: &str, patch: T::Patch) -> Result<T> {
        self.calls.patch.fetch_add(1, Ordering::SeqCst);
        let failure = self.take_failure();
        self.delay(Duration::ZERO).await;
        if let Some(err) = failure {
            return Err(err);
        }

        let mut inner = self.inner();
        let item = inner
            .items
            .iter_mut()
            .find(|item| item.id() == id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        *item = item.apply_patch(&patch);
        Ok(item.clone())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.calls.delete.fetch_add(1, Ordering::SeqCst);
        let failure = self.take_failure();
        self.delay(Duration::ZERO).await;
        if let Some(err) = failure {
            return Err(err);
        }

        let mut inner = self.inner();
        let before = inner.items.len();
        inner.items.retain(|item| item.id() != id);
        if inner.items.len() == before {
            return Err(Error::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn search(&self, term: &str) -> Result<Vec<T>> {
        self.calls.search.fetch_add(1, Ordering::SeqCst);
        let (failure, extra) = {
            let mut inner = self.inner();
            inner.search_log.push(term.to_string());
            let extra = inner.search_delays.get(term).copied().unwrap_or_default();
            (inner.failures.pop_front(), extra)
        };
        self.delay(extra).await;
        if let Some(err) = failure {
            return Err(err);
        }

        let inner = self.inner();
        Ok(inner
            .items
            .iter()
            .filter(|item| item.matches(term))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Trip;

    fn trips(n: usize) -> Vec<Trip> {
        (1..=n)
            .map(|i| Trip::new(format!("trip-{i}"), format!("Trip {i}"), "Oslo", "user-1"))
            .collect()
    }

    #[tokio::test]
    async fn pages_are_one_based() {
        let remote = InMemoryRemote::new(trips(5));

        let first = remote.fetch_page(1, 2).await.unwrap();
        assert_eq!(first.total, 5);
        assert_eq!(first.items[0].id, "trip-1");

        let last = remote.fetch_page(3, 2).await.unwrap();
        assert_eq!(last.items.len(), 1);
        assert_eq!(last.items[0].id, "trip-5");

        let beyond = remote.fetch_page(4, 2).await.unwrap();
        assert!(beyond.items.is_empty());
        assert_eq!(remote.calls().fetch(), 3);
    }

    #[tokio::test]
    async fn create_assigns_server_id_to_local_drafts() {
        let remote = InMemoryRemote::<Trip>::default();
        let draft = Trip::new(crate::entity::local_id(), "New", "Rome", "user-1");

        let created = remote.create(draft).await.unwrap();
        assert_eq!(created.id, "trips-1");
        assert_eq!(remote.items().len(), 1);
    }

    #[tokio::test]
    async fn injected_failure_is_consumed_once() {
        let remote = InMemoryRemote::new(trips(1));
        remote.fail_next(Error::Network("boom".into()));

        assert_eq!(
            remote.delete("trip-1").await,
            Err(Error::Network("boom".into()))
        );
        assert_eq!(remote.delete("trip-1").await, Ok(()));
        assert_eq!(
            remote.delete("trip-1").await,
            Err(Error::NotFound("trip-1".into()))
        );
    }

    #[tokio::test]
    async fn search_logs_terms() {
        let remote = InMemoryRemote::new(trips(3));
        let found = remote.search("trip 2").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(remote.search_log(), vec!["trip 2".to_string()]);
    }
}
