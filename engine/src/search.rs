//! Debounced, cancellable search.
//!
//! # Algorithm
//!
//! 1. Every pushed term (re)starts a trailing-edge debounce timer
//! 2. When the timer fires, a term equal to the last committed one is dropped
//! 3. Otherwise the generation is ticked, results are cleared, any in-flight
//!    request is aborted and a new request tagged with the generation is sent
//! 4. A blank term commits an empty result set without touching the network
//! 5. `cancel` drops the outstanding request and any pending input; the next
//!    term is committed even if it equals the cancelled one
//!
//! A response may only write results when its tag is still the current
//! generation. Aborting the older request is an optimisation; the tag check
//! is what guarantees that readers never see results for a stale term, even
//! if responses come back out of order.

use crate::{remote::RemoteService, Entity, Error, Generation};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Where the pipeline is in handling the latest input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SearchPhase {
    #[default]
    Idle,
    /// Waiting for input to settle
    Debouncing,
    /// A request for the committed term is outstanding
    InFlight,
    /// Results for the committed term are published
    Completed,
    /// The outstanding request was cancelled before it completed
    Cancelled,
}

enum Input {
    Term(String),
    Cancel,
}

/// Observable state of a search pipeline.
#[derive(Debug, Clone)]
pub struct SearchQueryState<T> {
    term: String,
    generation: Generation,
    results: Arc<Vec<T>>,
    loading: bool,
    error: Option<Error>,
    phase: SearchPhase,
}

impl<T> Default for SearchQueryState<T> {
    fn default() -> Self {
        Self {
            term: String::new(),
            generation: Generation::ZERO,
            results: Arc::new(Vec::new()),
            loading: false,
            error: None,
            phase: SearchPhase::Idle,
        }
    }
}

impl<T> SearchQueryState<T> {
    /// Last committed term (trimmed).
    pub fn term(&self) -> &str {
        &self.term
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn results(&self) -> &[T] {
        &self.results
    }

    pub fn loading(&self) -> bool {
        self.loading
    }

    pub fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    pub fn phase(&self) -> SearchPhase {
        self.phase
    }
}

/// Write a response into `state` if `tag` is still current.
///
/// Returns whether the response was applied.
fn publish<T>(
    state: &watch::Sender<SearchQueryState<T>>,
    tag: Generation,
    response: Result<Vec<T>, Error>,
) -> bool {
    state.send_if_modified(|state| {
        if !state.generation.is_current(tag) {
            return false;
        }
        match response {
            Ok(items) => {
                state.results = Arc::new(items);
                state.error = None;
            }
            Err(err) => {
                state.results = Arc::new(Vec::new());
                state.error = Some(err);
            }
        }
        state.loading = false;
        state.phase = SearchPhase::Completed;
        true
    })
}

/// A running search pipeline bound to one remote resource.
///
/// Dropping the pipeline closes its input; the driver task then aborts any
/// outstanding request and exits.
#[derive(Debug)]
pub struct SearchPipeline<T> {
    input: mpsc::UnboundedSender<Input>,
    state: watch::Receiver<SearchQueryState<T>>,
}

impl<T: Entity> SearchPipeline<T> {
    /// Start the pipeline's driver task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(remote: Arc<dyn RemoteService<T>>, debounce: Duration) -> Self {
        let (input, rx) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(SearchQueryState::default());
        tokio::spawn(drive(rx, remote, Arc::new(state_tx), debounce));
        Self { input, state }
    }

    /// Feed the next value of the search box.
    pub fn push(&self, term: impl Into<String>) {
        self.send(Input::Term(term.into()));
    }

    /// Drop the outstanding request and any pending input.
    pub fn cancel(&self) {
        self.send(Input::Cancel);
    }

    fn send(&self, input: Input) {
        if self.input.send(input).is_err() {
            tracing::debug!(resource = T::RESOURCE, "search driver gone, input dropped");
        }
    }

    /// Clear the search; commits an empty result set after the debounce.
    pub fn clear(&self) {
        self.push(String::new());
    }

    pub fn state(&self) -> SearchQueryState<T> {
        self.state.borrow().clone()
    }

    pub fn results(&self) -> Arc<Vec<T>> {
        Arc::clone(&self.state.borrow().results)
    }

    pub fn loading(&self) -> bool {
        self.state.borrow().loading
    }

    pub fn subscribe(&self) -> watch::Receiver<SearchQueryState<T>> {
        self.state.clone()
    }
}

async fn drive<T: Entity>(
    mut input: mpsc::UnboundedReceiver<Input>,
    remote: Arc<dyn RemoteService<T>>,
    state: Arc<watch::Sender<SearchQueryState<T>>>,
    debounce: Duration,
) {
    // `None` after a cancel, so that any next term is committed
    let mut committed = Some(String::new());
    let mut in_flight: Option<JoinHandle<()>> = None;

    'input: while let Some(next) = input.recv().await {
        let mut pending = next;
        if matches!(pending, Input::Term(_)) {
            state.send_modify(|s| s.phase = SearchPhase::Debouncing);
            loop {
                tokio::select! {
                    next = input.recv() => match next {
                        Some(next @ Input::Term(_)) => pending = next,
                        Some(Input::Cancel) => {
                            pending = Input::Cancel;
                            break;
                        }
                        None => break 'input,
                    },
                    () = tokio::time::sleep(debounce) => break,
                }
            }
        }

        let term = match pending {
            Input::Cancel => {
                if let Some(handle) = in_flight.take() {
                    handle.abort();
                }
                committed = None;
                state.send_modify(|s| {
                    s.generation.tick();
                    s.loading = false;
                    s.phase = SearchPhase::Cancelled;
                });
                tracing::debug!(resource = T::RESOURCE, "search cancelled");
                continue;
            }
            Input::Term(term) => term.trim().to_string(),
        };
        if committed.as_deref() == Some(term.as_str()) {
            // the committed request may have settled while debouncing
            state.send_modify(|s| {
                s.phase = if s.loading {
                    SearchPhase::InFlight
                } else if s.generation == Generation::ZERO {
                    SearchPhase::Idle
                } else {
                    SearchPhase::Completed
                };
            });
            continue;
        }
        committed = Some(term.clone());

        if let Some(handle) = in_flight.take() {
            handle.abort();
        }

        let blank = term.is_empty();
        let mut tag = Generation::ZERO;
        state.send_modify(|s| {
            tag = s.generation.tick();
            s.term.clone_from(&term);
            s.results = Arc::new(Vec::new());
            s.error = None;
            s.loading = !blank;
            s.phase = if blank {
                SearchPhase::Completed
            } else {
                SearchPhase::InFlight
            };
        });
        tracing::debug!(resource = T::RESOURCE, term = %term, generation = %tag, "search committed");

        if blank {
            continue;
        }

        let remote = Arc::clone(&remote);
        let state = Arc::clone(&state);
        in_flight = Some(tokio::spawn(async move {
            let response = remote.search(&term).await;
            if !publish(&state, tag, response) {
                tracing::debug!(
                    resource = T::RESOURCE,
                    term = %term,
                    generation = %tag,
                    "dropping stale search response"
                );
            }
        }));
    }

    if let Some(handle) = in_flight.take() {
        handle.abort();
    }
}
