//! Tunables shared by stores, search pipelines and pollers.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default page size for paginated loads.
pub const DEFAULT_PAGE_SIZE: u32 = 20;
/// Default trailing-edge debounce for search input.
pub const DEFAULT_SEARCH_DEBOUNCE: Duration = Duration::from_millis(300);
/// Default interval between background refreshes.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Engine configuration.
///
/// Durations serialize as milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreConfig {
    /// Items requested per page
    pub page_size: u32,
    /// Quiet period before a search term is committed
    #[serde(with = "millis")]
    pub search_debounce: Duration,
    /// Interval between polling ticks
    #[serde(with = "millis")]
    pub poll_interval: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            search_debounce: DEFAULT_SEARCH_DEBOUNCE,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl StoreConfig {
    /// Override the page size. Zero is bumped to one.
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_search_debounce(mut self, debounce: Duration) -> Self {
        self.search_debounce = debounce;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
