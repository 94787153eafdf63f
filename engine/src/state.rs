//! Collection state - the value a store publishes to its readers.
//!
//! Every field is read through a pure accessor. Items live behind an `Arc`
//! and are never mutated in place: a mutation builds a new sequence and
//! swaps it in, so cloning a state (a rollback snapshot) is a reference copy.

use crate::{pagination::PaginationController, Entity, Error, Generation};
use std::sync::Arc;

/// Observable state of one paginated collection.
#[derive(Debug, Clone)]
pub struct CollectionState<T> {
    items: Arc<Vec<T>>,
    error: Option<Error>,
    pagination: PaginationController,
    /// Bumped on every change to `items`
    version: u64,
    /// Bumped on reset; in-flight work from an older epoch is discarded
    epoch: Generation,
}

impl<T: Entity> CollectionState<T> {
    /// Empty state for a collection paged by `page_size`.
    pub fn new(page_size: u32) -> Self {
        Self {
            items: Arc::new(Vec::new()),
            error: None,
            pagination: PaginationController::new(page_size),
            version: 0,
            epoch: Generation::ZERO,
        }
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    /// Shared handle to the current item sequence.
    pub fn items_arc(&self) -> Arc<Vec<T>> {
        Arc::clone(&self.items)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&T> {
        self.items.iter().find(|item| item.id() == id)
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.items.iter().position(|item| item.id() == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.position(id).is_some()
    }

    pub fn loading(&self) -> bool {
        self.pagination.is_loading()
    }

    pub fn has_more(&self) -> bool {
        self.pagination.has_more()
    }

    pub fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    pub fn page(&self) -> u32 {
        self.pagination.page()
    }

    pub fn page_size(&self) -> u32 {
        self.pagination.page_size()
    }

    pub fn total_known(&self) -> u64 {
        self.pagination.total_known()
    }

    pub fn pagination(&self) -> &PaginationController {
        &self.pagination
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn epoch(&self) -> Generation {
        self.epoch
    }

    pub(crate) fn pagination_mut(&mut self) -> &mut PaginationController {
        &mut self.pagination
    }

    pub(crate) fn set_error(&mut self, error: Option<Error>) {
        self.error = error;
    }

    /// Swap in a new item sequence and bump the version.
    pub(crate) fn replace_items(&mut self, items: Vec<T>) {
        self.items = Arc::new(items);
        self.version += 1;
    }

    /// Restore a snapshot's items and known total, keeping the version monotonic.
    ///
    /// The load phase is left alone: a load may be in flight independently
    /// of the mutation being rolled back.
    pub(crate) fn restore_from(&mut self, snapshot: &CollectionState<T>) {
        self.items = Arc::clone(&snapshot.items);
        self.pagination
            .restore_total(snapshot.total_known(), self.items.len());
        self.version += 1;
    }

    /// Back to the empty state under a fresh epoch.
    pub(crate) fn reset(&mut self) {
        let page_size = self.pagination.page_size();
        let mut epoch = self.epoch;
        epoch.tick();
        *self = Self {
            items: Arc::new(Vec::new()),
            error: None,
            pagination: PaginationController::new(page_size),
            version: self.version + 1,
            epoch,
        };
    }
}
