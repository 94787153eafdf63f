//! Optimistic mutations.
//!
//! An optimistic mutation has two halves. The local half runs when the
//! mutator method is *called*: the store is updated and a
//! [`PendingMutation`] records the pre-mutation snapshot. The network half is
//! the returned future. When it succeeds the server copy is adopted; when it
//! fails the pending mutation is rolled back and a [`MutationFailure`] is
//! published next to (not inside) the collection state.
//!
//! Mutations are not queued against each other. Two calls in a row both
//! apply immediately and each rolls back against its own snapshot.

use crate::{
    entity::local_id, error::Result, CollectionState, EntityId, Entity, Error, Generation,
    StateStore,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Kind of local change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationKind {
    Add,
    Update,
    Remove,
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MutationKind::Add => "add",
            MutationKind::Update => "update",
            MutationKind::Remove => "remove",
        };
        f.write_str(name)
    }
}

/// A local change awaiting confirmation from the server.
#[derive(Debug, Clone)]
pub struct PendingMutation<T> {
    snapshot: CollectionState<T>,
    kind: MutationKind,
    affected_id: EntityId,
    /// Entity value before the change, if there was one
    previous: Option<T>,
    /// Index of the entity before (remove) or after (add/update) the change
    position: usize,
    /// Collection version right after the local change was applied
    applied_version: u64,
}

impl<T: Entity> PendingMutation<T> {
    pub(crate) fn new(
        snapshot: CollectionState<T>,
        kind: MutationKind,
        affected_id: EntityId,
        previous: Option<T>,
        position: usize,
        applied_version: u64,
    ) -> Self {
        Self {
            snapshot,
            kind,
            affected_id,
            previous,
            position,
            applied_version,
        }
    }

    /// State as it was before the change.
    pub fn snapshot(&self) -> &CollectionState<T> {
        &self.snapshot
    }

    pub fn kind(&self) -> MutationKind {
        self.kind
    }

    pub fn affected_id(&self) -> &str {
        &self.affected_id
    }

    pub fn previous(&self) -> Option<&T> {
        self.previous.as_ref()
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn applied_version(&self) -> u64 {
        self.applied_version
    }

    pub fn epoch(&self) -> Generation {
        self.snapshot.epoch()
    }
}

/// A mutation whose network half failed and was rolled back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationFailure {
    pub kind: MutationKind,
    pub affected_id: EntityId,
    #[serde(with = "error_text")]
    pub error: Error,
}

mod error_text {
    use crate::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(error: &Error, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&error.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Error, D::Error> {
        String::deserialize(deserializer).map(Error::Network)
    }
}

/// Runs add/update/remove optimistically against one store.
#[derive(Debug, Clone)]
pub struct OptimisticMutator<T: Entity> {
    store: Arc<StateStore<T>>,
}

impl<T: Entity> OptimisticMutator<T> {
    pub fn new(store: Arc<StateStore<T>>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<StateStore<T>> {
        &self.store
    }

    /// Insert `draft` now and create it remotely.
    ///
    /// A draft without an id gets a local one, replaced by the server id on
    /// success. Resolves to the server's entity.
    pub fn add(&self, draft: T) -> impl Future<Output = Result<T>> + Send + 'static {
        let draft = if draft.id().is_empty() {
            draft.with_id(local_id())
        } else {
            draft
        };
        let pending = self.store.add(draft.clone());
        let store = Arc::clone(&self.store);

        async move {
            match store.remote().create(draft).await {
                Ok(created) => {
                    store.confirm(&pending, created.clone());
                    Ok(created)
                }
                Err(err) => Err(fail(&store, &pending, err)),
            }
        }
    }

    /// Patch the entity now and remotely.
    ///
    /// An entity that is not loaded is patched remotely only.
    pub fn update(
        &self,
        id: &str,
        patch: T::Patch,
    ) -> impl Future<Output = Result<T>> + Send + 'static {
        let pending = self.store.update(id, &patch);
        let store = Arc::clone(&self.store);
        let id = id.to_string();

        async move {
            match store.remote().patch(&id, patch).await {
                Ok(updated) => {
                    if let Some(pending) = &pending {
                        store.confirm(pending, updated.clone());
                    }
                    Ok(updated)
                }
                Err(err) => match &pending {
                    Some(pending) => Err(fail(&store, pending, err)),
                    None => {
                        store.report_failure(MutationFailure {
                            kind: MutationKind::Update,
                            affected_id: id,
                            error: err.clone(),
                        });
                        Err(err)
                    }
                },
            }
        }
    }

    /// Remove the entity now and delete it remotely.
    ///
    /// Deleting an id the server no longer knows counts as success.
    pub fn remove(&self, id: &str) -> impl Future<Output = Result<()>> + Send + 'static {
        let pending = self.store.remove(id);
        let store = Arc::clone(&self.store);
        let id = id.to_string();

        async move {
            match store.remote().delete(&id).await {
                Ok(()) | Err(Error::NotFound(_)) => Ok(()),
                Err(err) => match &pending {
                    Some(pending) => Err(fail(&store, pending, err)),
                    None => {
                        store.report_failure(MutationFailure {
                            kind: MutationKind::Remove,
                            affected_id: id,
                            error: err.clone(),
                        });
                        Err(err)
                    }
                },
            }
        }
    }
}

/// Roll back `pending`, publish the failure and hand the error back.
fn fail<T: Entity>(store: &StateStore<T>, pending: &PendingMutation<T>, err: Error) -> Error {
    tracing::warn!(
        resource = T::RESOURCE,
        kind = %pending.kind(),
        id = pending.affected_id(),
        error = %err,
        "optimistic mutation failed, rolling back"
    );
    if let Err(conflict) = store.rollback(pending) {
        tracing::warn!(
            resource = T::RESOURCE,
            id = pending.affected_id(),
            error = %conflict,
            "rollback skipped"
        );
    }
    store.report_failure(MutationFailure {
        kind: pending.kind(),
        affected_id: pending.affected_id().to_string(),
        error: err.clone(),
    });
    err
}
