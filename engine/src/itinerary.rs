//! Day-by-day itinerary with structurally shared edits.
//!
//! Days and items sit behind `Arc`s. An edit rebuilds only the day it
//! touches; every other day (and every untouched item of the edited day) is
//! shared with earlier clones of the itinerary, so keeping a snapshot of the
//! previous version for undo costs one `Vec` of pointers.

use crate::{aggregate::percentage, error::Result, EntityId, Error, Trip};
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One planned activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItineraryItem {
    pub id: EntityId,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<NaiveTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default)]
    pub done: bool,
}

impl ItineraryItem {
    pub fn new(id: impl Into<EntityId>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            time: None,
            location: None,
            done: false,
        }
    }

    pub fn at(mut self, time: NaiveTime) -> Self {
        self.time = Some(time);
        self
    }
}

/// Partial update for an [`ItineraryItem`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItineraryItemPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<NaiveTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub done: Option<bool>,
}

/// A calendar day of the trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Day {
    pub date: NaiveDate,
    pub items: Vec<Arc<ItineraryItem>>,
}

impl Day {
    fn position(&self, id: &str) -> Option<usize> {
        self.items.iter().position(|item| item.id == id)
    }
}

/// The itinerary of one trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Itinerary {
    pub trip_id: EntityId,
    days: Vec<Arc<Day>>,
    version: u64,
}

impl Itinerary {
    pub fn new(trip_id: impl Into<EntityId>) -> Self {
        Self {
            trip_id: trip_id.into(),
            days: Vec::new(),
            version: 0,
        }
    }

    /// One empty day per date of the trip. No days if the trip has no dates.
    pub fn for_trip(trip: &Trip) -> Self {
        let mut itinerary = Self::new(trip.id.clone());
        if let (Some(start), Some(end)) = (trip.start_date, trip.end_date) {
            let mut date = start;
            while date <= end {
                itinerary.add_day(date);
                match date.succ_opt() {
                    Some(next) => date = next,
                    None => break,
                }
            }
        }
        itinerary
    }

    pub fn days(&self) -> &[Arc<Day>] {
        &self.days
    }

    pub fn day(&self, index: usize) -> Option<&Day> {
        self.days.get(index).map(Arc::as_ref)
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn item_count(&self) -> usize {
        self.days.iter().map(|day| day.items.len()).sum()
    }

    pub fn done_count(&self) -> usize {
        self.days
            .iter()
            .flat_map(|day| day.items.iter())
            .filter(|item| item.done)
            .count()
    }

    /// Percentage of items marked done; `0.0` when there are no items.
    pub fn progress(&self) -> f64 {
        percentage(self.done_count() as f64, self.item_count() as f64)
    }

    /// Append a day and return its index.
    pub fn add_day(&mut self, date: NaiveDate) -> usize {
        self.days.push(Arc::new(Day {
            date,
            items: Vec::new(),
        }));
        self.version += 1;
        self.days.len() - 1
    }

    /// Rebuild one day through `edit`; all other days stay shared.
    fn edit_day<R>(
        &mut self,
        index: usize,
        edit: impl FnOnce(&mut Vec<Arc<ItineraryItem>>) -> Result<R>,
    ) -> Result<R> {
        let day = self
            .days
            .get(index)
            .ok_or_else(|| Error::NotFound(format!("day {index}")))?;
        let date = day.date;
        let mut items = day.items.clone();
        let out = edit(&mut items)?;
        self.days[index] = Arc::new(Day { date, items });
        self.version += 1;
        Ok(out)
    }

    pub fn add_item(&mut self, day: usize, item: ItineraryItem) -> Result<()> {
        self.edit_day(day, |items| {
            if items.iter().any(|existing| existing.id == item.id) {
                return Err(Error::Validation(format!("duplicate item id {}", item.id)));
            }
            items.push(Arc::new(item));
            Ok(())
        })
    }

    pub fn update_item(&mut self, day: usize, id: &str, patch: &ItineraryItemPatch) -> Result<()> {
        self.edit_day(day, |items| {
            let position = items
                .iter()
                .position(|item| item.id == id)
                .ok_or_else(|| Error::NotFound(id.to_string()))?;
            let mut next = ItineraryItem::clone(&items[position]);
            if let Some(title) = &patch.title {
                next.title = title.clone();
            }
            if patch.time.is_some() {
                next.time = patch.time;
            }
            if patch.location.is_some() {
                next.location = patch.location.clone();
            }
            if let Some(done) = patch.done {
                next.done = done;
            }
            items[position] = Arc::new(next);
            Ok(())
        })
    }

    pub fn toggle_done(&mut self, day: usize, id: &str) -> Result<bool> {
        let done = self
            .day(day)
            .and_then(|d| d.position(id).map(|i| d.items[i].done))
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        self.update_item(
            day,
            id,
            &ItineraryItemPatch {
                done: Some(!done),
                ..Default::default()
            },
        )?;
        Ok(!done)
    }

    /// Remove an item. Removing an absent item leaves the itinerary untouched.
    pub fn remove_item(&mut self, day: usize, id: &str) -> Result<Option<Arc<ItineraryItem>>> {
        let present = self
            .day(day)
            .ok_or_else(|| Error::NotFound(format!("day {day}")))?
            .position(id);
        match present {
            Some(position) => self.edit_day(day, |items| Ok(Some(items.remove(position)))),
            None => Ok(None),
        }
    }

    /// Move an item to `to_day` at `index` (clamped to the end of that day).
    pub fn move_item(&mut self, from_day: usize, id: &str, to_day: usize, index: usize) -> Result<()> {
        if self.day(to_day).is_none() {
            return Err(Error::NotFound(format!("day {to_day}")));
        }
        let item = self
            .remove_item(from_day, id)?
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        self.edit_day(to_day, |items| {
            let index = index.min(items.len());
            items.insert(index, item);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 8, day).unwrap()
    }

    fn three_days() -> Itinerary {
        let trip = Trip::new("trip-1", "Coast", "Split", "u").with_dates(date(1), date(3));
        let mut itinerary = Itinerary::for_trip(&trip);
        itinerary.add_item(0, ItineraryItem::new("i1", "Ferry")).unwrap();
        itinerary.add_item(0, ItineraryItem::new("i2", "Old town")).unwrap();
        itinerary.add_item(1, ItineraryItem::new("i3", "Kayak")).unwrap();
        itinerary
    }

    #[test]
    fn days_follow_trip_dates() {
        let itinerary = three_days();
        assert_eq!(itinerary.days().len(), 3);
        assert_eq!(itinerary.day(2).unwrap().date, date(3));
    }

    #[test]
    fn edits_share_untouched_nodes() {
        let mut itinerary = three_days();
        let before = itinerary.clone();

        itinerary
            .update_item(0, "i2", &ItineraryItemPatch {
                title: Some("Diocletian's Palace".into()),
                ..Default::default()
            })
            .unwrap();

        // other days are the same allocation
        assert!(Arc::ptr_eq(&before.days()[1], &itinerary.days()[1]));
        // untouched item in the edited day is shared too
        assert!(Arc::ptr_eq(
            &before.days()[0].items[0],
            &itinerary.days()[0].items[0]
        ));
        assert!(!Arc::ptr_eq(&before.days()[0], &itinerary.days()[0]));
        assert_eq!(before.days()[0].items[1].title, "Old town");
        assert!(itinerary.version() > before.version());
    }

    #[test]
    fn progress_counts_done_items() {
        let mut itinerary = three_days();
        assert_eq!(itinerary.progress(), 0.0);

        assert!(itinerary.toggle_done(0, "i1").unwrap());
        let progress = itinerary.progress();
        assert!((progress - 100.0 / 3.0).abs() < 1e-9);

        assert_eq!(Itinerary::new("empty").progress(), 0.0);
    }

    #[test]
    fn move_between_days() {
        let mut itinerary = three_days();
        itinerary.move_item(0, "i1", 1, 0).unwrap();

        let day0: Vec<_> = itinerary.days()[0].items.iter().map(|i| i.id.as_str()).collect();
        let day1: Vec<_> = itinerary.days()[1].items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(day0, vec!["i2"]);
        assert_eq!(day1, vec!["i1", "i3"]);
    }

    #[test]
    fn missing_targets() {
        let mut itinerary = three_days();
        assert_eq!(itinerary.remove_item(0, "nope").unwrap(), None);
        assert!(matches!(
            itinerary.add_item(9, ItineraryItem::new("x", "x")),
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            itinerary.add_item(0, ItineraryItem::new("i1", "dup")),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            itinerary.move_item(0, "ghost", 1, 0),
            Err(Error::NotFound(_))
        ));
    }
}
