//! Page/cursor bookkeeping for infinite-scroll collections.
//!
//! # State machine
//!
//! ```text
//! Empty --begin_first--> LoadingFirst --complete--> Loaded
//! Loaded --begin_first--> LoadingFirst
//! Loaded(has_more) --begin_more--> LoadingMore --complete--> Loaded
//! Loading* --fail--> previous settled phase
//! ```
//!
//! A request issued while a load is outstanding is rejected, never queued.
//! `has_more` is always recomputed from the cumulative item count, so a
//! short last page cannot leave it stuck at `true`. Items added locally and
//! not yet created on the server are not part of the server's total; a page
//! completion counts them on top of it.

use crate::Entity;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Current phase of a paginated collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PagePhase {
    #[default]
    Empty,
    LoadingFirst,
    Loaded,
    LoadingMore,
}

impl PagePhase {
    pub fn is_loading(&self) -> bool {
        matches!(self, PagePhase::LoadingFirst | PagePhase::LoadingMore)
    }
}

/// A page the caller should fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub page_size: u32,
}

/// Why a load request was turned down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadRejection {
    /// Another load is outstanding
    AlreadyLoading,
    /// Every known item is loaded
    Exhausted,
    /// The last load failed; `load_first` clears it
    Errored,
}

/// Tracks page, page size, known total and `has_more` for one collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationController {
    phase: PagePhase,
    /// Last successfully loaded page, 1-based
    page: u32,
    page_size: u32,
    total_known: u64,
    has_more: bool,
    /// Whether any page was ever loaded
    settled: bool,
}

impl PaginationController {
    pub fn new(page_size: u32) -> Self {
        Self {
            phase: PagePhase::Empty,
            page: 1,
            page_size: page_size.max(1),
            total_known: 0,
            has_more: false,
            settled: false,
        }
    }

    pub fn phase(&self) -> PagePhase {
        self.phase
    }

    pub fn is_loading(&self) -> bool {
        self.phase.is_loading()
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn total_known(&self) -> u64 {
        self.total_known
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    /// Start loading page 1.
    pub fn begin_first(&mut self) -> Result<PageRequest, LoadRejection> {
        if self.is_loading() {
            return Err(LoadRejection::AlreadyLoading);
        }
        self.phase = PagePhase::LoadingFirst;
        Ok(PageRequest {
            page: 1,
            page_size: self.page_size,
        })
    }

    /// Start loading the page after the last loaded one.
    pub fn begin_more(&mut self, errored: bool) -> Result<PageRequest, LoadRejection> {
        if self.is_loading() {
            return Err(LoadRejection::AlreadyLoading);
        }
        if errored {
            return Err(LoadRejection::Errored);
        }
        if !self.has_more {
            return Err(LoadRejection::Exhausted);
        }
        self.phase = PagePhase::LoadingMore;
        Ok(PageRequest {
            page: self.page + 1,
            page_size: self.page_size,
        })
    }

    /// Page 1 arrived; `items_len` is the size of the replaced collection.
    pub fn complete_first(&mut self, total: u64, items_len: usize) {
        self.page = 1;
        self.phase = PagePhase::Loaded;
        self.settled = true;
        self.total_known = total.max(items_len as u64);
        self.recompute(items_len);
    }

    /// A further page arrived and `added` new items were appended.
    ///
    /// `unconfirmed` of the `items_len` loaded items are local adds the
    /// server does not count yet.
    pub fn complete_more(&mut self, total: u64, items_len: usize, added: usize, unconfirmed: usize) {
        self.page += 1;
        self.phase = PagePhase::Loaded;
        self.total_known = (total + unconfirmed as u64).max(items_len as u64);
        self.recompute(items_len);
        if added == 0 {
            // server claims more but sent nothing new
            self.has_more = false;
        }
    }

    /// The outstanding load failed or was abandoned.
    pub fn fail(&mut self) {
        self.phase = if self.settled {
            PagePhase::Loaded
        } else {
            PagePhase::Empty
        };
    }

    /// An item was inserted locally.
    pub fn item_added(&mut self, items_len: usize) {
        self.total_known = (self.total_known + 1).max(items_len as u64);
        self.recompute(items_len);
    }

    /// An item was removed locally.
    pub fn item_removed(&mut self, items_len: usize) {
        self.total_known = self.total_known.saturating_sub(1).max(items_len as u64);
        self.recompute(items_len);
    }

    /// Reinstate a previously recorded total.
    pub fn restore_total(&mut self, total: u64, items_len: usize) {
        self.total_known = total.max(items_len as u64);
        self.recompute(items_len);
    }

    fn recompute(&mut self, items_len: usize) {
        self.has_more = (items_len as u64) < self.total_known;
    }
}

/// Merge an incoming page into the loaded items.
///
/// Items whose id is already present replace the existing entry in place
/// (last write wins); new ids are appended in page order. Returns the merged
/// sequence and the number of appended items.
pub fn merge_page<T: Entity>(existing: &[T], incoming: Vec<T>) -> (Vec<T>, usize) {
    let mut merged = existing.to_vec();
    let mut index: HashMap<String, usize> = merged
        .iter()
        .enumerate()
        .map(|(i, item)| (item.id().to_string(), i))
        .collect();

    let mut added = 0;
    for item in incoming {
        match index.get(item.id()) {
            Some(&i) => merged[i] = item,
            None => {
                index.insert(item.id().to_string(), merged.len());
                merged.push(item);
                added += 1;
            }
        }
    }
    (merged, added)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Trip;

    fn trip(id: &str, name: &str) -> Trip {
        Trip::new(id, name, "Oslo", "user-1")
    }

    #[test]
    fn first_load_then_more() {
        let mut pager = PaginationController::new(2);
        assert_eq!(pager.phase(), PagePhase::Empty);

        let request = pager.begin_first().unwrap();
        assert_eq!(request, PageRequest { page: 1, page_size: 2 });
        assert!(pager.is_loading());

        pager.complete_first(5, 2);
        assert!(pager.has_more());

        let request = pager.begin_more(false).unwrap();
        assert_eq!(request.page, 2);
        pager.complete_more(5, 4, 2, 0);
        assert_eq!(pager.page(), 2);
        assert!(pager.has_more());

        pager.begin_more(false).unwrap();
        pager.complete_more(5, 5, 1, 0);
        assert!(!pager.has_more());
        assert_eq!(pager.begin_more(false), Err(LoadRejection::Exhausted));
    }

    #[test]
    fn rejects_while_loading() {
        let mut pager = PaginationController::new(10);
        pager.begin_first().unwrap();
        assert_eq!(pager.begin_first(), Err(LoadRejection::AlreadyLoading));
        assert_eq!(pager.begin_more(false), Err(LoadRejection::AlreadyLoading));
    }

    #[test]
    fn errored_blocks_more() {
        let mut pager = PaginationController::new(2);
        pager.begin_first().unwrap();
        pager.complete_first(10, 2);
        assert_eq!(pager.begin_more(true), Err(LoadRejection::Errored));
    }

    #[test]
    fn failure_returns_to_settled_phase() {
        let mut pager = PaginationController::new(2);
        pager.begin_first().unwrap();
        pager.fail();
        assert_eq!(pager.phase(), PagePhase::Empty);

        pager.begin_first().unwrap();
        pager.complete_first(4, 2);
        pager.begin_more(false).unwrap();
        pager.fail();
        assert_eq!(pager.phase(), PagePhase::Loaded);
        assert_eq!(pager.page(), 1);
    }

    #[test]
    fn empty_page_stops_scrolling() {
        let mut pager = PaginationController::new(2);
        pager.begin_first().unwrap();
        pager.complete_first(6, 2);
        pager.begin_more(false).unwrap();
        pager.complete_more(6, 2, 0, 0);
        assert!(!pager.has_more());
    }

    #[test]
    fn local_adds_keep_total_ahead_of_items() {
        let mut pager = PaginationController::new(2);
        pager.begin_first().unwrap();
        pager.complete_first(2, 2);
        pager.item_added(3);
        assert_eq!(pager.total_known(), 3);
        assert!(!pager.has_more());

        pager.item_removed(2);
        assert_eq!(pager.total_known(), 2);
    }

    #[test]
    fn unconfirmed_adds_do_not_exhaust_paging() {
        let mut pager = PaginationController::new(2);
        pager.begin_first().unwrap();
        pager.complete_first(5, 2);
        pager.item_added(3);

        // pages 2 of 5 server items plus one local add
        pager.begin_more(false).unwrap();
        pager.complete_more(5, 5, 2, 1);
        assert_eq!(pager.total_known(), 6);
        assert!(pager.has_more());

        pager.begin_more(false).unwrap();
        pager.complete_more(5, 6, 1, 1);
        assert!(!pager.has_more());
    }

    #[test]
    fn merge_replaces_overlap_in_place() {
        let existing = vec![trip("t1", "One"), trip("t2", "Two")];
        let incoming = vec![trip("t2", "Two (edited)"), trip("t3", "Three")];

        let (merged, added) = merge_page(&existing, incoming);
        assert_eq!(added, 1);
        let ids: Vec<_> = merged.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["t1", "t2", "t3"]);
        assert_eq!(merged[1].name, "Two (edited)");
    }

    #[test]
    fn merge_dedups_within_page() {
        let (merged, added) = merge_page(&[], vec![trip("t1", "a"), trip("t1", "b")]);
        assert_eq!(added, 1);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].name, "b");
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;
        use std::collections::HashSet;

        fn arb_ids(max: usize) -> impl Strategy<Value = Vec<String>> {
            prop::collection::vec((0u8..30).prop_map(|n| format!("t{n}")), 0..max)
        }

        proptest! {
            #[test]
            fn prop_merge_never_duplicates(existing in arb_ids(20), incoming in arb_ids(20)) {
                let (existing, _) = merge_page(&[], existing.iter().map(|id| trip(id, "old")).collect());
                let (merged, added) = merge_page(&existing, incoming.iter().map(|id| trip(id, "new")).collect());

                let unique: HashSet<_> = merged.iter().map(|t| t.id.clone()).collect();
                prop_assert_eq!(unique.len(), merged.len());
                prop_assert_eq!(merged.len(), existing.len() + added);
                // existing order is kept as a prefix
                for (before, after) in existing.iter().zip(&merged) {
                    prop_assert_eq!(&before.id, &after.id);
                }
            }

            #[test]
            fn prop_paging_is_monotonic(total in 0usize..60, page_size in 1u32..8) {
                let mut pager = PaginationController::new(page_size);
                let mut loaded = 0usize;
                let page = |n: u32| {
                    let start = (n as usize - 1) * page_size as usize;
                    total.saturating_sub(start).min(page_size as usize)
                };

                pager.begin_first().unwrap();
                loaded += page(1);
                pager.complete_first(total as u64, loaded);

                while let Ok(request) = pager.begin_more(false) {
                    let before = pager.page();
                    let added = page(request.page);
                    loaded += added;
                    pager.complete_more(total as u64, loaded, added, 0);
                    prop_assert!(pager.page() > before);
                    prop_assert!(loaded as u64 <= pager.total_known());
                }

                prop_assert_eq!(loaded, total);
                prop_assert!(!pager.has_more());
            }
        }
    }
}
