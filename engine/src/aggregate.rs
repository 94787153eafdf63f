//! Memoized aggregates over a store's collection.
//!
//! Each aggregate is a pure function of the items. Results are cached
//! together with the collection version they were computed from; a read
//! recomputes only when the store's version moved on. Reads between
//! mutations are a version compare plus a clone of the cached value.

use crate::{CollectionState, Entity, EntityId, Expense, Trip};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use tokio::sync::watch;

/// Numeric view of an entity used by the aggregates.
pub trait Measured {
    /// Amount summed by `total`/`average`/`max`/`min`.
    fn amount(&self) -> f64;

    /// Grouping key for `count_by_category`.
    fn category(&self) -> &str;

    /// Grouping key for `count_by_owner`; also the payer in `balances`.
    fn owner(&self) -> &str;

    /// Participants sharing `amount`. Empty means the owner alone.
    fn split(&self) -> &[EntityId] {
        &[]
    }
}

impl Measured for Expense {
    fn amount(&self) -> f64 {
        self.amount
    }

    fn category(&self) -> &str {
        self.category.as_str()
    }

    fn owner(&self) -> &str {
        &self.paid_by
    }

    fn split(&self) -> &[EntityId] {
        &self.split_among
    }
}

impl Measured for Trip {
    fn amount(&self) -> f64 {
        self.budget
    }

    fn category(&self) -> &str {
        &self.destination
    }

    fn owner(&self) -> &str {
        &self.owner_id
    }
}

/// `part` as a percentage of `whole`, clamped to `0.0..=100.0`.
///
/// A zero or negative `whole` yields `0.0`.
pub fn percentage(part: f64, whole: f64) -> f64 {
    if whole <= 0.0 || !whole.is_finite() {
        return 0.0;
    }
    (part / whole * 100.0).clamp(0.0, 100.0)
}

/// A value cached against a version number.
#[derive(Debug, Default)]
pub struct Memo<V> {
    cell: Mutex<Option<(u64, V)>>,
    computations: AtomicU64,
}

impl<V: Clone> Memo<V> {
    pub fn new() -> Self {
        Self {
            cell: Mutex::new(None),
            computations: AtomicU64::new(0),
        }
    }

    /// Cached value for `version`, computing it if the cache is stale.
    pub fn get_or_compute(&self, version: u64, compute: impl FnOnce() -> V) -> V {
        let mut cell = self.cell.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some((seen, value)) = cell.as_ref() {
            if *seen == version {
                return value.clone();
            }
        }
        let value = compute();
        self.computations.fetch_add(1, Ordering::Relaxed);
        *cell = Some((version, value.clone()));
        value
    }

    /// How many times the value was (re)computed.
    pub fn computations(&self) -> u64 {
        self.computations.load(Ordering::Relaxed)
    }
}

/// Derived values over one store, recomputed lazily on version change.
#[derive(Debug)]
pub struct ComputedAggregator<T> {
    source: watch::Receiver<CollectionState<T>>,
    total: Memo<f64>,
    average: Memo<f64>,
    max: Memo<Option<f64>>,
    min: Memo<Option<f64>>,
    by_category: Memo<BTreeMap<String, usize>>,
    by_owner: Memo<BTreeMap<String, usize>>,
    sum_by_category: Memo<BTreeMap<String, f64>>,
    balances: Memo<BTreeMap<EntityId, f64>>,
}

impl<T: Entity + Measured> ComputedAggregator<T> {
    /// Aggregate over the state published by `source`.
    ///
    /// Usually built with `ComputedAggregator::new(store.subscribe())`.
    pub fn new(source: watch::Receiver<CollectionState<T>>) -> Self {
        Self {
            source,
            total: Memo::new(),
            average: Memo::new(),
            max: Memo::new(),
            min: Memo::new(),
            by_category: Memo::new(),
            by_owner: Memo::new(),
            sum_by_category: Memo::new(),
            balances: Memo::new(),
        }
    }

    fn memoized<V: Clone>(&self, memo: &Memo<V>, f: impl FnOnce(&[T]) -> V) -> V {
        let state = self.source.borrow();
        memo.get_or_compute(state.version(), || f(state.items()))
    }

    /// Version of the collection the aggregates currently reflect.
    pub fn version(&self) -> u64 {
        self.source.borrow().version()
    }

    /// Sum of all amounts; `0.0` for an empty collection.
    pub fn total(&self) -> f64 {
        self.memoized(&self.total, |items| items.iter().map(Measured::amount).sum())
    }

    /// Mean amount; `0.0` for an empty collection.
    pub fn average(&self) -> f64 {
        self.memoized(&self.average, |items| {
            if items.is_empty() {
                return 0.0;
            }
            items.iter().map(Measured::amount).sum::<f64>() / items.len() as f64
        })
    }

    pub fn max(&self) -> Option<f64> {
        self.memoized(&self.max, |items| {
            items.iter().map(Measured::amount).reduce(f64::max)
        })
    }

    pub fn min(&self) -> Option<f64> {
        self.memoized(&self.min, |items| {
            items.iter().map(Measured::amount).reduce(f64::min)
        })
    }

    pub fn count_by_category(&self) -> BTreeMap<String, usize> {
        self.memoized(&self.by_category, |items| {
            let mut counts = BTreeMap::new();
            for item in items {
                *counts.entry(item.category().to_string()).or_insert(0) += 1;
            }
            counts
        })
    }

    pub fn count_by_owner(&self) -> BTreeMap<String, usize> {
        self.memoized(&self.by_owner, |items| {
            let mut counts = BTreeMap::new();
            for item in items {
                *counts.entry(item.owner().to_string()).or_insert(0) += 1;
            }
            counts
        })
    }

    pub fn sum_by_category(&self) -> BTreeMap<String, f64> {
        self.memoized(&self.sum_by_category, |items| {
            let mut sums = BTreeMap::new();
            for item in items {
                *sums.entry(item.category().to_string()).or_insert(0.0) += item.amount();
            }
            sums
        })
    }

    /// Share of `budget` already spent, as a percentage.
    pub fn budget_progress(&self, budget: f64) -> f64 {
        percentage(self.total(), budget)
    }

    /// Net position per participant: positive is owed money, negative owes.
    ///
    /// The owner of each item is credited its amount; every participant in
    /// its split (the owner alone when the split is empty) is debited an
    /// equal share. Balances always sum to zero up to rounding.
    pub fn balances(&self) -> BTreeMap<EntityId, f64> {
        self.memoized(&self.balances, |items| {
            let mut balances: BTreeMap<EntityId, f64> = BTreeMap::new();
            for item in items {
                let amount = item.amount();
                *balances.entry(item.owner().to_string()).or_insert(0.0) += amount;

                let split = item.split();
                if split.is_empty() {
                    *balances.entry(item.owner().to_string()).or_insert(0.0) -= amount;
                } else {
                    let share = amount / split.len() as f64;
                    for participant in split {
                        *balances.entry(participant.clone()).or_insert(0.0) -= share;
                    }
                }
            }
            balances
        })
    }

    /// Recompute counts per aggregate, for diagnostics.
    pub fn computations(&self) -> AggregateStats {
        AggregateStats {
            total: self.total.computations(),
            average: self.average.computations(),
            balances: self.balances.computations(),
        }
    }
}

/// Recompute counters of the most used aggregates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregateStats {
    pub total: u64,
    pub average: u64,
    pub balances: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ExpenseCategory, ExpensePatch, InMemoryRemote, StateStore, StoreConfig};
    use std::sync::Arc;

    fn expense(id: &str, amount: f64, paid_by: &str) -> Expense {
        Expense::new(id, "trip-1", id, amount, paid_by)
    }

    fn empty_store() -> StateStore<Expense> {
        StateStore::new(
            Arc::new(InMemoryRemote::<Expense>::default()),
            &StoreConfig::default(),
        )
    }

    #[test]
    fn empty_collection_yields_zero() {
        let store = empty_store();
        let agg = ComputedAggregator::new(store.subscribe());
        assert_eq!(agg.total(), 0.0);
        assert_eq!(agg.average(), 0.0);
        assert!(!agg.average().is_nan());
        assert_eq!(agg.max(), None);
        assert_eq!(agg.min(), None);
        assert!(agg.count_by_category().is_empty());
    }

    #[test]
    fn reads_between_mutations_hit_the_cache() {
        let store = empty_store();
        let agg = ComputedAggregator::new(store.subscribe());

        store.add(expense("e1", 10.0, "p1"));
        assert_eq!(agg.total(), 10.0);
        assert_eq!(agg.total(), 10.0);
        assert_eq!(agg.computations().total, 1);

        store.add(expense("e2", 5.0, "p2"));
        assert_eq!(agg.total(), 15.0);
        assert_eq!(agg.computations().total, 2);
        assert_eq!(agg.computations().average, 0);
    }

    #[test]
    fn aggregates_follow_updates_and_removals() {
        let store = empty_store();
        let agg = ComputedAggregator::new(store.subscribe());

        store.add(expense("e1", 10.0, "p1").with_category(ExpenseCategory::Food));
        store.add(expense("e2", 30.0, "p1").with_category(ExpenseCategory::Lodging));
        store.add(expense("e3", 20.0, "p2").with_category(ExpenseCategory::Food));

        assert_eq!(agg.average(), 20.0);
        assert_eq!(agg.max(), Some(30.0));
        assert_eq!(agg.min(), Some(10.0));
        assert_eq!(agg.count_by_category()["food"], 2);
        assert_eq!(agg.count_by_owner()["p1"], 2);
        assert_eq!(agg.sum_by_category()["food"], 30.0);

        store.update("e2", &ExpensePatch {
            amount: Some(60.0),
            ..Default::default()
        });
        assert_eq!(agg.total(), 90.0);
        assert_eq!(agg.max(), Some(60.0));

        store.remove("e1");
        assert_eq!(agg.total(), 80.0);
        assert_eq!(agg.count_by_category()["food"], 1);
    }

    #[test]
    fn balances_split_shared_expenses() {
        let store = empty_store();
        let agg = ComputedAggregator::new(store.subscribe());

        store.add(expense("dinner", 90.0, "ana").split_among(["ana", "ben", "cy"]));
        store.add(expense("taxi", 20.0, "ben"));

        let balances = agg.balances();
        assert_eq!(balances["ana"], 60.0);
        assert_eq!(balances["ben"], -30.0);
        assert_eq!(balances["cy"], -30.0);
        let net: f64 = balances.values().sum();
        assert!(net.abs() < 1e-9);
    }

    #[test]
    fn budget_progress_is_guarded() {
        let store = empty_store();
        let agg = ComputedAggregator::new(store.subscribe());
        store.add(expense("e1", 250.0, "p1"));

        assert_eq!(agg.budget_progress(1000.0), 25.0);
        assert_eq!(agg.budget_progress(0.0), 0.0);
        assert_eq!(agg.budget_progress(100.0), 100.0);
    }

    #[test]
    fn percentage_bounds() {
        assert_eq!(percentage(1.0, 4.0), 25.0);
        assert_eq!(percentage(5.0, 0.0), 0.0);
        assert_eq!(percentage(-5.0, 10.0), 0.0);
        assert_eq!(percentage(5.0, f64::NAN), 0.0);
    }

    #[test]
    fn trips_aggregate_budgets() {
        let store = StateStore::new(
            Arc::new(InMemoryRemote::<Trip>::default()),
            &StoreConfig::default(),
        );
        let agg = ComputedAggregator::new(store.subscribe());
        store.add(Trip::new("t1", "A", "Lisbon", "u1").with_budget(500.0));
        store.add(Trip::new("t2", "B", "Lisbon", "u2").with_budget(1500.0));

        assert_eq!(agg.total(), 2000.0);
        assert_eq!(agg.count_by_category()["Lisbon"], 2);
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        #[derive(Debug, Clone)]
        enum Op {
            Add(u8, u16),
            Update(u8, u16),
            Remove(u8),
        }

        fn arb_op() -> impl Strategy<Value = Op> {
            prop_oneof![
                (0u8..12, 0u16..500).prop_map(|(id, amount)| Op::Add(id, amount)),
                (0u8..12, 0u16..500).prop_map(|(id, amount)| Op::Update(id, amount)),
                (0u8..12).prop_map(Op::Remove),
            ]
        }

        proptest! {
            #[test]
            fn prop_aggregates_match_items(ops in prop::collection::vec(arb_op(), 0..40)) {
                let store = empty_store();
                let agg = ComputedAggregator::new(store.subscribe());

                for op in ops {
                    match op {
                        Op::Add(id, amount) => {
                            store.add(expense(&format!("e{id}"), amount as f64, "p1"));
                        }
                        Op::Update(id, amount) => {
                            store.update(&format!("e{id}"), &ExpensePatch {
                                amount: Some(amount as f64),
                                ..Default::default()
                            });
                        }
                        Op::Remove(id) => {
                            store.remove(&format!("e{id}"));
                        }
                    }

                    let items = store.items();
                    let sum: f64 = items.iter().map(|e| e.amount).sum();
                    prop_assert_eq!(agg.total(), sum);
                    let counted: usize = agg.count_by_category().values().sum();
                    prop_assert_eq!(counted, items.len());
                    if items.is_empty() {
                        prop_assert_eq!(agg.average(), 0.0);
                    } else {
                        prop_assert!((agg.average() - sum / items.len() as f64).abs() < 1e-9);
                    }
                }
            }
        }
    }
}
