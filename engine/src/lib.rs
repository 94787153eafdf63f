//! # Roam Engine
//!
//! Client-side state engine for a collaborative trip planner.
//!
//! This crate keeps paginated remote collections (trips, expenses,
//! participants) in memory, applies user edits optimistically and keeps
//! derived values, search results and periodic refreshes consistent while
//! network calls complete in arbitrary order.
//!
//! ## Design Principles
//!
//! - **Single owner**: each collection has exactly one writer, its [`StateStore`]
//! - **Synchronous transitions**: no state change straddles an `.await`
//! - **Stale work is discarded**: responses are tagged with a [`Generation`]
//!   and dropped when superseded
//! - **Pluggable IO**: the network sits behind the [`RemoteService`] trait
//!
//! ## Core Concepts
//!
//! ### Stores
//!
//! A [`StateStore`] owns one [`CollectionState`]: the items, the loading and
//! error flags and the [`PaginationController`] bookkeeping. Readers borrow
//! snapshots or subscribe to a `tokio::sync::watch` receiver.
//!
//! ### Optimistic mutations
//!
//! [`OptimisticMutator`] applies add/update/remove locally first and
//! returns a future for the network half. Failures roll the change back
//! against the [`PendingMutation`] snapshot and publish a
//! [`MutationFailure`].
//!
//! ### Derived values
//!
//! [`ComputedAggregator`] memoizes totals, averages and groupings against
//! the store's version counter.
//!
//! ### Search and polling
//!
//! [`SearchPipeline`] debounces input and guarantees only the latest term
//! publishes results. [`PollingController`] refreshes a store periodically
//! while the page is visible.
//!
//! ## Quick Start
//!
//! ```rust
//! use roam_engine::{
//!     ComputedAggregator, Expense, ExpenseCategory, InMemoryRemote, StateStore, StoreConfig,
//! };
//! use std::sync::Arc;
//!
//! // 1. Create a store over a remote service
//! let remote = Arc::new(InMemoryRemote::<Expense>::default());
//! let store = StateStore::new(remote, &StoreConfig::default());
//!
//! // 2. Derive values from it
//! let totals = ComputedAggregator::new(store.subscribe());
//!
//! // 3. Apply local changes
//! store.add(Expense::new("e1", "trip-1", "Ferry", 42.0, "ana").with_category(ExpenseCategory::Transport));
//! store.add(Expense::new("e2", "trip-1", "Dinner", 58.0, "ben").with_category(ExpenseCategory::Food));
//!
//! assert_eq!(totals.total(), 100.0);
//! assert_eq!(totals.average(), 50.0);
//! ```

pub mod aggregate;
pub mod config;
pub mod entity;
pub mod error;
pub mod generation;
pub mod itinerary;
pub mod mutation;
pub mod pagination;
pub mod polling;
pub mod remote;
pub mod search;
pub mod state;
pub mod store;

// Re-export main types at crate root
pub use aggregate::{percentage, AggregateStats, ComputedAggregator, Measured, Memo};
pub use config::StoreConfig;
pub use entity::{
    Entity, Expense, ExpenseCategory, ExpensePatch, Participant, ParticipantPatch,
    ParticipantRole, Trip, TripPatch,
};
pub use error::Error;
pub use generation::Generation;
pub use itinerary::{Day, Itinerary, ItineraryItem, ItineraryItemPatch};
pub use mutation::{MutationFailure, MutationKind, OptimisticMutator, PendingMutation};
pub use pagination::{merge_page, LoadRejection, PagePhase, PageRequest, PaginationController};
pub use polling::{AlwaysVisible, PollingController, PollingRegistry, VisibilityFlag, VisibilitySource};
pub use remote::{InMemoryRemote, Page, RemoteService};
pub use search::{SearchPhase, SearchPipeline, SearchQueryState};
pub use state::CollectionState;
pub use store::{LoadOutcome, StateStore};

/// Identifier of a remote entity.
pub type EntityId = String;
