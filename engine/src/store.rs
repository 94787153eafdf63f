//! Store - the owner of one paginated collection.
//!
//! A [`StateStore`] owns a single [`CollectionState`] and publishes it
//! through a `tokio::sync::watch` channel. Readers borrow the current value
//! or subscribe for change notifications; nothing outside the store can
//! write it. All mutation happens inside synchronous `send_if_modified`
//! closures, so no state change ever straddles an `.await`.
//!
//! Loads are serialized by the pagination phase: a load requested while
//! another is outstanding is skipped. `reset` moves the store to a fresh
//! epoch, which makes every in-flight load, confirmation and rollback from
//! the old epoch a no-op.

use crate::{
    config::StoreConfig,
    entity::is_local_id,
    error::Result,
    mutation::{MutationFailure, MutationKind, PendingMutation},
    pagination::{merge_page, LoadRejection},
    remote::RemoteService,
    CollectionState, Entity, Error, Generation,
};
use std::sync::Arc;
use tokio::sync::watch;

/// What a load call ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// A page was applied; `added` new items entered the collection
    Loaded { added: usize },
    /// The request was turned down before reaching the network
    Skipped(LoadRejection),
    /// The store was reset while the request was in flight
    Cancelled,
}

/// In-memory owner of one remote collection.
pub struct StateStore<T: Entity> {
    remote: Arc<dyn RemoteService<T>>,
    state: watch::Sender<CollectionState<T>>,
    failures: watch::Sender<Option<MutationFailure>>,
}

impl<T: Entity> std::fmt::Debug for StateStore<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("StateStore")
            .field("resource", &T::RESOURCE)
            .field("items", &state.len())
            .field("version", &state.version())
            .finish()
    }
}

impl<T: Entity> StateStore<T> {
    /// Create a store over `remote` using `config.page_size`.
    pub fn new(remote: Arc<dyn RemoteService<T>>, config: &StoreConfig) -> Self {
        Self {
            remote,
            state: watch::Sender::new(CollectionState::new(config.page_size)),
            failures: watch::Sender::new(None),
        }
    }

    /// Create a store wrapped in `Arc` for sharing with mutators and pollers.
    pub fn new_shared(remote: Arc<dyn RemoteService<T>>, config: &StoreConfig) -> Arc<Self> {
        Arc::new(Self::new(remote, config))
    }

    pub fn remote(&self) -> &Arc<dyn RemoteService<T>> {
        &self.remote
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Copy of the current state. Items are shared, not cloned.
    pub fn snapshot(&self) -> CollectionState<T> {
        self.state.borrow().clone()
    }

    pub fn items(&self) -> Arc<Vec<T>> {
        self.state.borrow().items_arc()
    }

    pub fn get(&self, id: &str) -> Option<T> {
        self.state.borrow().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.state.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.borrow().is_empty()
    }

    pub fn loading(&self) -> bool {
        self.state.borrow().loading()
    }

    pub fn has_more(&self) -> bool {
        self.state.borrow().has_more()
    }

    pub fn error(&self) -> Option<Error> {
        self.state.borrow().error().cloned()
    }

    pub fn version(&self) -> u64 {
        self.state.borrow().version()
    }

    /// Receiver notified on every state change.
    pub fn subscribe(&self) -> watch::Receiver<CollectionState<T>> {
        self.state.subscribe()
    }

    /// Most recent failed optimistic mutation, if not yet cleared.
    pub fn last_failure(&self) -> Option<MutationFailure> {
        self.failures.borrow().clone()
    }

    /// Receiver notified whenever an optimistic mutation fails.
    pub fn subscribe_failures(&self) -> watch::Receiver<Option<MutationFailure>> {
        self.failures.subscribe()
    }

    /// Dismiss the last mutation failure.
    pub fn clear_failure(&self) {
        self.failures.send_if_modified(|failure| failure.take().is_some());
    }

    // ------------------------------------------------------------------
    // Loads
    // ------------------------------------------------------------------

    /// Load page 1 and replace the collection with it.
    ///
    /// On failure the error is recorded in the state and returned; the
    /// loaded items stay visible.
    pub async fn load_first(&self) -> Result<LoadOutcome> {
        let mut begun = Err(LoadRejection::AlreadyLoading);
        let mut epoch = Generation::ZERO;
        self.state.send_if_modified(|state| {
            epoch = state.epoch();
            begun = state.pagination_mut().begin_first();
            if begun.is_ok() {
                state.set_error(None);
            }
            begun.is_ok()
        });
        let request = match begun {
            Ok(request) => request,
            Err(rejection) => {
                tracing::debug!(resource = T::RESOURCE, ?rejection, "load_first skipped");
                return Ok(LoadOutcome::Skipped(rejection));
            }
        };

        let result = self.remote.fetch_page(request.page, request.page_size).await;

        let mut outcome = Ok(LoadOutcome::Cancelled);
        self.state.send_if_modified(|state| {
            if state.epoch() != epoch {
                return false;
            }
            match result {
                Ok(page) => {
                    let (items, added) = merge_page(&[], page.items);
                    let len = items.len();
                    state.replace_items(items);
                    state.pagination_mut().complete_first(page.total, len);
                    outcome = Ok(LoadOutcome::Loaded { added });
                }
                Err(err) => {
                    tracing::warn!(resource = T::RESOURCE, error = %err, "load_first failed");
                    state.pagination_mut().fail();
                    state.set_error(Some(err.clone()));
                    outcome = Err(err);
                }
            }
            true
        });

        if outcome == Ok(LoadOutcome::Cancelled) {
            tracing::debug!(resource = T::RESOURCE, %epoch, "load_first discarded after reset");
        }
        outcome
    }

    /// Load the next page and append it, skipping ids already present.
    ///
    /// A no-op while loading, when every item is loaded, or after a failed
    /// load.
    pub async fn load_more(&self) -> Result<LoadOutcome> {
        let mut begun = Err(LoadRejection::AlreadyLoading);
        let mut epoch = Generation::ZERO;
        self.state.send_if_modified(|state| {
            epoch = state.epoch();
            let errored = state.error().is_some();
            begun = state.pagination_mut().begin_more(errored);
            begun.is_ok()
        });
        let request = match begun {
            Ok(request) => request,
            Err(rejection) => {
                tracing::debug!(resource = T::RESOURCE, ?rejection, "load_more skipped");
                return Ok(LoadOutcome::Skipped(rejection));
            }
        };

        let result = self.remote.fetch_page(request.page, request.page_size).await;

        let mut outcome = Ok(LoadOutcome::Cancelled);
        self.state.send_if_modified(|state| {
            if state.epoch() != epoch {
                return false;
            }
            match result {
                Ok(page) => {
                    let (items, added) = merge_page(state.items(), page.items);
                    let len = items.len();
                    let unconfirmed = items.iter().filter(|item| is_local_id(item.id())).count();
                    state.replace_items(items);
                    state
                        .pagination_mut()
                        .complete_more(page.total, len, added, unconfirmed);
                    outcome = Ok(LoadOutcome::Loaded { added });
                }
                Err(err) => {
                    tracing::warn!(
                        resource = T::RESOURCE,
                        page = request.page,
                        error = %err,
                        "load_more failed"
                    );
                    state.pagination_mut().fail();
                    state.set_error(Some(err.clone()));
                    outcome = Err(err);
                }
            }
            true
        });
        outcome
    }

    /// Return to the empty initial state.
    ///
    /// In-flight loads and pending mutations started before the reset are
    /// discarded when they complete.
    pub fn reset(&self) {
        self.state.send_modify(|state| state.reset());
        self.failures.send_replace(None);
        tracing::debug!(resource = T::RESOURCE, "store reset");
    }

    // ------------------------------------------------------------------
    // Local mutations (the synchronous half of an optimistic mutation)
    // ------------------------------------------------------------------

    /// Insert an entity, or replace the entity with the same id in place.
    pub fn add(&self, entity: T) -> PendingMutation<T> {
        let id = entity.id().to_string();
        // overwritten inside the closure with the state it actually changed
        let mut pending =
            PendingMutation::new(self.snapshot(), MutationKind::Add, id.clone(), None, 0, 0);
        self.state.send_modify(|state| {
            let snapshot = state.clone();
            let mut items = state.items().to_vec();
            let (position, previous) = match state.position(&id) {
                Some(i) => (i, Some(std::mem::replace(&mut items[i], entity))),
                None => {
                    items.push(entity);
                    (items.len() - 1, None)
                }
            };
            let len = items.len();
            state.replace_items(items);
            if previous.is_none() {
                state.pagination_mut().item_added(len);
            }
            pending = PendingMutation::new(
                snapshot,
                MutationKind::Add,
                id,
                previous,
                position,
                state.version(),
            );
        });
        pending
    }

    /// Apply a patch to the entity with `id`. `None` if it is not loaded.
    pub fn update(&self, id: &str, patch: &T::Patch) -> Option<PendingMutation<T>> {
        let mut pending = None;
        self.state.send_if_modified(|state| {
            let Some(position) = state.position(id) else {
                return false;
            };
            let snapshot = state.clone();
            let mut items = state.items().to_vec();
            let previous = items[position].clone();
            items[position] = previous.apply_patch(patch);
            state.replace_items(items);
            pending = Some(PendingMutation::new(
                snapshot,
                MutationKind::Update,
                id.to_string(),
                Some(previous),
                position,
                state.version(),
            ));
            true
        });
        pending
    }

    /// Remove the entity with `id`. `None` (and no change) if it is not loaded.
    pub fn remove(&self, id: &str) -> Option<PendingMutation<T>> {
        let mut pending = None;
        self.state.send_if_modified(|state| {
            let Some(position) = state.position(id) else {
                return false;
            };
            let snapshot = state.clone();
            let mut items = state.items().to_vec();
            let removed = items.remove(position);
            let len = items.len();
            state.replace_items(items);
            state.pagination_mut().item_removed(len);
            pending = Some(PendingMutation::new(
                snapshot,
                MutationKind::Remove,
                id.to_string(),
                Some(removed),
                position,
                state.version(),
            ));
            true
        });
        pending
    }

    /// Adopt the server's copy of an entity after a successful mutation.
    ///
    /// An optimistic add is swapped for the server entity (which carries
    /// the server id); an update is replaced by the server representation.
    pub fn confirm(&self, pending: &PendingMutation<T>, server: T) {
        if pending.kind() == MutationKind::Remove {
            return;
        }
        self.state.send_if_modified(|state| {
            if state.epoch() != pending.epoch() {
                return false;
            }
            let Some(position) = state.position(pending.affected_id()) else {
                return false;
            };
            let mut items = state.items().to_vec();
            let duplicate = server.id() != pending.affected_id() && state.contains(server.id());
            if duplicate {
                // a refresh already brought in the server copy
                items.remove(position);
                let len = items.len();
                state.replace_items(items);
                state.pagination_mut().item_removed(len);
            } else {
                items[position] = server;
                state.replace_items(items);
            }
            true
        });
    }

    /// Undo a local mutation after its network half failed.
    ///
    /// If nothing touched the collection since the mutation, the exact
    /// pre-mutation snapshot is restored. Otherwise only the affected entity
    /// is reverted; when that is impossible (the entity vanished, or a
    /// removed id reappeared) the state is left alone and
    /// [`Error::ConcurrencyConflict`] is returned.
    pub fn rollback(&self, pending: &PendingMutation<T>) -> Result<()> {
        let mut outcome = Ok(());
        self.state.send_if_modified(|state| {
            if state.epoch() != pending.epoch() {
                outcome = Err(Error::ConcurrencyConflict(format!(
                    "store was reset before {} of {} could be rolled back",
                    pending.kind(),
                    pending.affected_id()
                )));
                return false;
            }
            if state.version() == pending.applied_version() {
                state.restore_from(pending.snapshot());
                return true;
            }
            match revert(state, pending) {
                Ok(()) => true,
                Err(err) => {
                    outcome = Err(err);
                    false
                }
            }
        });
        outcome
    }

    /// Publish a failed mutation for the UI.
    pub(crate) fn report_failure(&self, failure: MutationFailure) {
        self.failures.send_replace(Some(failure));
    }
}

/// Targeted inverse of a single mutation.
fn revert<T: Entity>(state: &mut CollectionState<T>, pending: &PendingMutation<T>) -> Result<()> {
    let id = pending.affected_id();
    let mut items = state.items().to_vec();
    match pending.kind() {
        MutationKind::Add => {
            let position = state
                .position(id)
                .ok_or_else(|| Error::ConcurrencyConflict(format!("added entity {id} is gone")))?;
            match pending.previous() {
                Some(previous) => {
                    items[position] = previous.clone();
                    state.replace_items(items);
                }
                None => {
                    items.remove(position);
                    let len = items.len();
                    state.replace_items(items);
                    state.pagination_mut().item_removed(len);
                }
            }
        }
        MutationKind::Update => {
            let position = state
                .position(id)
                .ok_or_else(|| Error::ConcurrencyConflict(format!("updated entity {id} is gone")))?;
            let previous = pending.previous().ok_or_else(|| {
                Error::ConcurrencyConflict(format!("no prior value recorded for {id}"))
            })?;
            items[position] = previous.clone();
            state.replace_items(items);
        }
        MutationKind::Remove => {
            if state.contains(id) {
                return Err(Error::ConcurrencyConflict(format!(
                    "removed entity {id} is present again"
                )));
            }
            let removed = pending.previous().ok_or_else(|| {
                Error::ConcurrencyConflict(format!("no prior value recorded for {id}"))
            })?;
            let position = pending.position().min(items.len());
            items.insert(position, removed.clone());
            let len = items.len();
            state.replace_items(items);
            state.pagination_mut().item_added(len);
        }
    }
    Ok(())
}
