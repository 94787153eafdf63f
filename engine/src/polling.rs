//! Visibility-aware periodic refresh.
//!
//! A [`PollingController`] runs a callback once on `start` and then every
//! interval, skipping ticks while the host page is hidden. Visibility is
//! checked on every tick, so a hidden page that becomes visible resumes on
//! the next tick without a restart.
//!
//! At most one poller runs per resource. Controllers handed out by a
//! [`PollingRegistry`] share a set of active resource keys; starting a second
//! poller for a resource that is already polled is rejected instead of
//! silently replacing the first.

use crate::{error::Result, Entity, Error, StateStore};
use dashmap::DashSet;
use futures::future::{BoxFuture, FutureExt};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Host-provided page visibility.
pub trait VisibilitySource: Send + Sync {
    fn is_page_visible(&self) -> bool;
}

/// A host without a notion of visibility.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysVisible;

impl VisibilitySource for AlwaysVisible {
    fn is_page_visible(&self) -> bool {
        true
    }
}

/// Visibility toggled by the host (e.g. from a `visibilitychange` listener).
#[derive(Debug)]
pub struct VisibilityFlag(AtomicBool);

impl Default for VisibilityFlag {
    fn default() -> Self {
        Self::new(true)
    }
}

impl VisibilityFlag {
    pub fn new(visible: bool) -> Self {
        Self(AtomicBool::new(visible))
    }

    pub fn set_visible(&self, visible: bool) {
        self.0.store(visible, Ordering::SeqCst);
    }
}

impl VisibilitySource for VisibilityFlag {
    fn is_page_visible(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

type Callback = Box<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

#[derive(Debug, Default)]
struct PollStats {
    fired: AtomicU64,
    skipped: AtomicU64,
}

/// Tracks which resources currently have a running poller.
pub struct PollingRegistry {
    active: DashSet<String>,
    visibility: Arc<dyn VisibilitySource>,
}

impl std::fmt::Debug for PollingRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollingRegistry")
            .field("active", &self.active.len())
            .finish()
    }
}

impl PollingRegistry {
    /// Create a registry whose controllers consult `visibility`.
    pub fn new_shared(visibility: Arc<dyn VisibilitySource>) -> Arc<Self> {
        Arc::new(Self {
            active: DashSet::new(),
            visibility,
        })
    }

    /// A controller for `resource` bound to this registry.
    pub fn controller(self: &Arc<Self>, resource: impl Into<String>) -> PollingController {
        PollingController {
            resource: resource.into(),
            registry: Some(Arc::clone(self)),
            visibility: Arc::clone(&self.visibility),
            task: Mutex::new(None),
            stats: Arc::new(PollStats::default()),
        }
    }

    pub fn is_active(&self, resource: &str) -> bool {
        self.active.contains(resource)
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    fn claim(&self, resource: &str) -> bool {
        self.active.insert(resource.to_string())
    }

    fn release(&self, resource: &str) {
        self.active.remove(resource);
    }
}

/// Start/stop lifecycle around one periodic refresh task.
///
/// Dropping a running controller stops it.
pub struct PollingController {
    resource: String,
    registry: Option<Arc<PollingRegistry>>,
    visibility: Arc<dyn VisibilitySource>,
    task: Mutex<Option<JoinHandle<()>>>,
    stats: Arc<PollStats>,
}

impl std::fmt::Debug for PollingController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollingController")
            .field("resource", &self.resource)
            .field("running", &self.is_running())
            .field("fired", &self.fired())
            .field("skipped", &self.skipped())
            .finish()
    }
}

impl PollingController {
    /// A standalone controller, not tracked by any registry.
    pub fn new(resource: impl Into<String>, visibility: Arc<dyn VisibilitySource>) -> Self {
        Self {
            resource: resource.into(),
            registry: None,
            visibility,
            task: Mutex::new(None),
            stats: Arc::new(PollStats::default()),
        }
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    fn task(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.task.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether a refresh task is running.
    pub fn is_running(&self) -> bool {
        self.task().as_ref().is_some_and(|handle| !handle.is_finished())
    }

    /// Callback invocations so far.
    pub fn fired(&self) -> u64 {
        self.stats.fired.load(Ordering::SeqCst)
    }

    /// Ticks skipped because the page was hidden.
    pub fn skipped(&self) -> u64 {
        self.stats.skipped.load(Ordering::SeqCst)
    }

    /// Run `callback` now and then every `interval` while visible.
    ///
    /// Rejected with [`Error::AlreadyPolling`] if this controller, or another
    /// controller for the same resource in the registry, is running. Must be
    /// called from within a Tokio runtime.
    pub fn start<F, Fut>(&self, interval: Duration, callback: F) -> Result<()>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut task = self.task();
        match task.as_ref() {
            Some(handle) if !handle.is_finished() => {
                tracing::warn!(resource = %self.resource, "poller already running, start ignored");
                return Err(Error::AlreadyPolling(self.resource.clone()));
            }
            Some(_) => {
                // the previous task died (its callback panicked) without a stop
                *task = None;
                if let Some(registry) = &self.registry {
                    registry.release(&self.resource);
                }
                tracing::warn!(resource = %self.resource, "previous poller ended unexpectedly");
            }
            None => {}
        }
        if let Some(registry) = &self.registry {
            if !registry.claim(&self.resource) {
                tracing::warn!(
                    resource = %self.resource,
                    "another poller owns this resource, start ignored"
                );
                return Err(Error::AlreadyPolling(self.resource.clone()));
            }
        }

        let callback: Callback = Box::new(move || callback().boxed());
        let handle = tokio::spawn(run(
            self.resource.clone(),
            interval,
            callback,
            Arc::clone(&self.visibility),
            Arc::clone(&self.stats),
        ));
        *task = Some(handle);
        tracing::info!(resource = %self.resource, interval_ms = interval.as_millis() as u64, "polling started");
        Ok(())
    }

    /// Poll `store` by reloading its first page.
    pub fn start_store_refresh<T: Entity>(
        &self,
        interval: Duration,
        store: Arc<StateStore<T>>,
    ) -> Result<()> {
        self.start(interval, move || {
            let store = Arc::clone(&store);
            async move {
                // failures are recorded in the store's error field
                let _ = store.load_first().await;
            }
        })
    }

    /// Cancel the timer. Stopping a stopped controller is a no-op.
    pub fn stop(&self) {
        let Some(handle) = self.task().take() else {
            return;
        };
        handle.abort();
        if let Some(registry) = &self.registry {
            registry.release(&self.resource);
        }
        tracing::info!(resource = %self.resource, "polling stopped");
    }
}

impl Drop for PollingController {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run(
    resource: String,
    interval: Duration,
    callback: Callback,
    visibility: Arc<dyn VisibilitySource>,
    stats: Arc<PollStats>,
) {
    stats.fired.fetch_add(1, Ordering::SeqCst);
    callback().await;

    let period = interval.max(Duration::from_millis(1));
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        if !visibility.is_page_visible() {
            stats.skipped.fetch_add(1, Ordering::SeqCst);
            tracing::trace!(resource = %resource, "page hidden, tick skipped");
            continue;
        }
        stats.fired.fetch_add(1, Ordering::SeqCst);
        callback().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting() -> (Arc<AtomicUsize>, impl Fn() -> futures::future::Ready<()> + Send + Sync) {
        let count = Arc::new(AtomicUsize::new(0));
        let inner = Arc::clone(&count);
        let callback = move || {
            inner.fetch_add(1, Ordering::SeqCst);
            futures::future::ready(())
        };
        (count, callback)
    }

    async fn wait(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn fires_immediately_then_every_interval() {
        let controller = PollingController::new("trips", Arc::new(AlwaysVisible));
        let (count, callback) = counting();

        controller.start(Duration::from_secs(1), callback).unwrap();
        wait(10).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        wait(3000).await;
        assert_eq!(count.load(Ordering::SeqCst), 4);
        assert!(controller.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn hidden_page_skips_ticks_but_keeps_running() {
        let visibility = Arc::new(VisibilityFlag::new(true));
        let controller = PollingController::new("trips", visibility.clone());
        let (count, callback) = counting();

        controller.start(Duration::from_secs(1), callback).unwrap();
        wait(10).await;
        visibility.set_visible(false);

        wait(1000).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(controller.skipped(), 1);
        assert!(controller.is_running());

        visibility.set_visible(true);
        wait(1000).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(controller.fired(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn second_start_is_rejected() {
        let controller = PollingController::new("trips", Arc::new(AlwaysVisible));
        let (_, first) = counting();
        let (second_count, second) = counting();

        controller.start(Duration::from_secs(1), first).unwrap();
        let err = controller
            .start(Duration::from_secs(1), second)
            .unwrap_err();
        assert_eq!(err, Error::AlreadyPolling("trips".into()));

        wait(10).await;
        assert_eq!(second_count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_is_idempotent_and_halts_ticks() {
        let controller = PollingController::new("trips", Arc::new(AlwaysVisible));
        let (count, callback) = counting();

        controller.start(Duration::from_secs(1), callback).unwrap();
        wait(10).await;
        controller.stop();
        controller.stop();
        assert!(!controller.is_running());

        wait(5000).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        // can be started again after a stop
        let (again, callback) = counting();
        controller.start(Duration::from_secs(1), callback).unwrap();
        wait(10).await;
        assert_eq!(again.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn registry_allows_one_poller_per_resource() {
        let registry = PollingRegistry::new_shared(Arc::new(AlwaysVisible));
        let first = registry.controller("expenses");
        let second = registry.controller("expenses");
        let other = registry.controller("trips");

        first.start(Duration::from_secs(1), || async {}).unwrap();
        assert_eq!(
            second.start(Duration::from_secs(1), || async {}),
            Err(Error::AlreadyPolling("expenses".into()))
        );
        other.start(Duration::from_secs(1), || async {}).unwrap();
        assert_eq!(registry.active_count(), 2);

        drop(first);
        assert!(!registry.is_active("expenses"));
        second.start(Duration::from_secs(1), || async {}).unwrap();
        assert!(registry.is_active("expenses"));
    }

    #[tokio::test(start_paused = true)]
    async fn panicked_poller_can_be_restarted() {
        let registry = PollingRegistry::new_shared(Arc::new(AlwaysVisible));
        let controller = registry.controller("trips");

        controller
            .start(Duration::from_secs(1), || async {
                if true {
                    panic!("refresh blew up");
                }
            })
            .unwrap();
        wait(10).await;
        assert!(!controller.is_running());

        let (count, callback) = counting();
        controller.start(Duration::from_secs(1), callback).unwrap();
        wait(10).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(registry.is_active("trips"));
        assert_eq!(registry.active_count(), 1);
    }
}
