//! Entity types held by the stores.
//!
//! Entities are plain values. A store owns the entities it fetched; other
//! stores only ever see copies.

use crate::EntityId;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Prefix of ids generated locally for optimistic adds.
pub const LOCAL_ID_PREFIX: &str = "local-";

/// A value record with a stable identity that a [`StateStore`](crate::StateStore) can hold.
pub trait Entity: Clone + Debug + Send + Sync + 'static {
    /// Partial update applied by [`Entity::apply_patch`].
    type Patch: Clone + Debug + Send + Sync + 'static;

    /// Remote resource name (`"trips"`, `"expenses"`, ...).
    const RESOURCE: &'static str;

    /// Stable unique identifier.
    fn id(&self) -> &str;

    /// Return the same entity under a different id.
    fn with_id(self, id: EntityId) -> Self;

    /// Build a new entity with the patch's fields applied.
    fn apply_patch(&self, patch: &Self::Patch) -> Self;

    /// Case-insensitive match used by in-memory search.
    fn matches(&self, _term: &str) -> bool {
        false
    }
}

/// Generate an id for an optimistically added entity.
pub fn local_id() -> EntityId {
    format!("{}{}", LOCAL_ID_PREFIX, uuid::Uuid::new_v4())
}

/// Whether an id was generated locally and not yet confirmed by the server.
pub fn is_local_id(id: &str) -> bool {
    id.starts_with(LOCAL_ID_PREFIX)
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// A planned group trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trip {
    pub id: EntityId,
    pub name: String,
    pub destination: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    /// Planned budget for the whole group
    #[serde(default)]
    pub budget: f64,
    pub owner_id: EntityId,
    #[serde(default)]
    pub participant_ids: Vec<EntityId>,
}

impl Trip {
    pub fn new(
        id: impl Into<EntityId>,
        name: impl Into<String>,
        destination: impl Into<String>,
        owner_id: impl Into<EntityId>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            destination: destination.into(),
            start_date: None,
            end_date: None,
            budget: 0.0,
            owner_id: owner_id.into(),
            participant_ids: Vec::new(),
        }
    }

    pub fn with_budget(mut self, budget: f64) -> Self {
        self.budget = budget;
        self
    }

    pub fn with_dates(mut self, start: NaiveDate, end: NaiveDate) -> Self {
        self.start_date = Some(start);
        self.end_date = Some(end);
        self
    }

    /// Number of days covered by the trip, inclusive of both ends.
    pub fn duration_days(&self) -> Option<i64> {
        match (self.start_date, self.end_date) {
            (Some(start), Some(end)) if end >= start => Some((end - start).num_days() + 1),
            _ => None,
        }
    }
}

/// Partial update for a [`Trip`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub budget: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub participant_ids: Option<Vec<EntityId>>,
}

impl Entity for Trip {
    type Patch = TripPatch;
    const RESOURCE: &'static str = "trips";

    fn id(&self) -> &str {
        &self.id
    }

    fn with_id(mut self, id: EntityId) -> Self {
        self.id = id;
        self
    }

    fn apply_patch(&self, patch: &TripPatch) -> Self {
        let mut next = self.clone();
        if let Some(name) = &patch.name {
            next.name = name.clone();
        }
        if let Some(destination) = &patch.destination {
            next.destination = destination.clone();
        }
        if patch.start_date.is_some() {
            next.start_date = patch.start_date;
        }
        if patch.end_date.is_some() {
            next.end_date = patch.end_date;
        }
        if let Some(budget) = patch.budget {
            next.budget = budget;
        }
        if let Some(ids) = &patch.participant_ids {
            next.participant_ids = ids.clone();
        }
        next
    }

    fn matches(&self, term: &str) -> bool {
        contains_ci(&self.name, term) || contains_ci(&self.destination, term)
    }
}

/// Spending category of an [`Expense`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpenseCategory {
    Transport,
    Lodging,
    Food,
    Activities,
    #[default]
    Other,
}

impl ExpenseCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExpenseCategory::Transport => "transport",
            ExpenseCategory::Lodging => "lodging",
            ExpenseCategory::Food => "food",
            ExpenseCategory::Activities => "activities",
            ExpenseCategory::Other => "other",
        }
    }
}

/// A shared expense paid by one participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Expense {
    pub id: EntityId,
    pub trip_id: EntityId,
    pub description: String,
    pub amount: f64,
    #[serde(default)]
    pub category: ExpenseCategory,
    /// Participant who paid
    pub paid_by: EntityId,
    /// Participants sharing the cost; empty means the payer alone
    #[serde(default)]
    pub split_among: Vec<EntityId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
}

impl Expense {
    pub fn new(
        id: impl Into<EntityId>,
        trip_id: impl Into<EntityId>,
        description: impl Into<String>,
        amount: f64,
        paid_by: impl Into<EntityId>,
    ) -> Self {
        Self {
            id: id.into(),
            trip_id: trip_id.into(),
            description: description.into(),
            amount,
            category: ExpenseCategory::Other,
            paid_by: paid_by.into(),
            split_among: Vec::new(),
            date: None,
        }
    }

    pub fn with_category(mut self, category: ExpenseCategory) -> Self {
        self.category = category;
        self
    }

    pub fn split_among<I, S>(mut self, participants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<EntityId>,
    {
        self.split_among = participants.into_iter().map(Into::into).collect();
        self
    }
}

/// Partial update for an [`Expense`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpensePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<ExpenseCategory>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paid_by: Option<EntityId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub split_among: Option<Vec<EntityId>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
}

impl Entity for Expense {
    type Patch = ExpensePatch;
    const RESOURCE: &'static str = "expenses";

    fn id(&self) -> &str {
        &self.id
    }

    fn with_id(mut self, id: EntityId) -> Self {
        self.id = id;
        self
    }

    fn apply_patch(&self, patch: &ExpensePatch) -> Self {
        let mut next = self.clone();
        if let Some(description) = &patch.description {
            next.description = description.clone();
        }
        if let Some(amount) = patch.amount {
            next.amount = amount;
        }
        if let Some(category) = patch.category {
            next.category = category;
        }
        if let Some(paid_by) = &patch.paid_by {
            next.paid_by = paid_by.clone();
        }
        if let Some(split) = &patch.split_among {
            next.split_among = split.clone();
        }
        if patch.date.is_some() {
            next.date = patch.date;
        }
        next
    }

    fn matches(&self, term: &str) -> bool {
        contains_ci(&self.description, term) || contains_ci(self.category.as_str(), term)
    }
}

/// Role of a participant within a trip.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantRole {
    Organizer,
    #[default]
    Member,
}

/// A person taking part in a trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: EntityId,
    pub trip_id: EntityId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default)]
    pub role: ParticipantRole,
}

impl Participant {
    pub fn new(
        id: impl Into<EntityId>,
        trip_id: impl Into<EntityId>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            trip_id: trip_id.into(),
            name: name.into(),
            email: None,
            role: ParticipantRole::Member,
        }
    }
}

/// Partial update for a [`Participant`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<ParticipantRole>,
}

impl Entity for Participant {
    type Patch = ParticipantPatch;
    const RESOURCE: &'static str = "participants";

    fn id(&self) -> &str {
        &self.id
    }

    fn with_id(mut self, id: EntityId) -> Self {
        self.id = id;
        self
    }

    fn apply_patch(&self, patch: &ParticipantPatch) -> Self {
        let mut next = self.clone();
        if let Some(name) = &patch.name {
            next.name = name.clone();
        }
        if patch.email.is_some() {
            next.email = patch.email.clone();
        }
        if let Some(role) = patch.role {
            next.role = role;
        }
        next
    }

    fn matches(&self, term: &str) -> bool {
        contains_ci(&self.name, term)
            || self.email.as_deref().is_some_and(|e| contains_ci(e, term))
    }
}
