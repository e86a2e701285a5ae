//! Filter state: which slice of the item set the user is looking at.
//!
//! Pure state with no I/O. Every change bumps [`FilterState::revision`] so
//! derived projections know when to recompute.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::remote::ItemId;

/// Rolling date window applied to publication time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateRange {
    #[default]
    All,
    Today,
    Week,
    Month,
}

impl DateRange {
    pub const ALL: [DateRange; 4] = [
        DateRange::All,
        DateRange::Today,
        DateRange::Week,
        DateRange::Month,
    ];

    /// Inclusive lower bound for the window ending at `now`, `None` for `All`.
    pub fn lower_bound(self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            DateRange::All => None,
            DateRange::Today => Some(now - Duration::days(1)),
            DateRange::Week => Some(now - Duration::days(7)),
            DateRange::Month => Some(now - Duration::days(30)),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DateRange::All => "all",
            DateRange::Today => "today",
            DateRange::Week => "week",
            DateRange::Month => "month",
        }
    }

    /// All -> Today -> Week -> Month -> All.
    pub fn next(self) -> Self {
        match self {
            DateRange::All => DateRange::Today,
            DateRange::Today => DateRange::Week,
            DateRange::Week => DateRange::Month,
            DateRange::Month => DateRange::All,
        }
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DateRange {
    type Err = FilterParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DateRange::ALL
            .into_iter()
            .find(|r| r.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| FilterParseError::UnknownRange(s.to_owned()))
    }
}

/// Ordering of the reader sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SortOrder {
    #[default]
    #[serde(rename = "oldest")]
    OldestFirst,
    #[serde(rename = "newest")]
    NewestFirst,
}

impl SortOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            SortOrder::OldestFirst => "oldest",
            SortOrder::NewestFirst => "newest",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            SortOrder::OldestFirst => SortOrder::NewestFirst,
            SortOrder::NewestFirst => SortOrder::OldestFirst,
        }
    }
}

impl FromStr for SortOrder {
    type Err = FilterParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "oldest" | "asc" => Ok(SortOrder::OldestFirst),
            "newest" | "desc" => Ok(SortOrder::NewestFirst),
            _ => Err(FilterParseError::UnknownSort(s.to_owned())),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FilterParseError {
    #[error("Unknown date range '{0}' (expected all, today, week or month)")]
    UnknownRange(String),
    #[error("Unknown sort order '{0}' (expected oldest or newest)")]
    UnknownSort(String),
    #[error("Invalid value '{value}' for '{key}' (expected 0 or 1)")]
    InvalidFlag { key: String, value: String },
}

/// Identity of a cache partition: the filter fields the server query depends on.
///
/// Sort and hidden ids are applied client-side and do not select a partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FilterKey {
    pub show_read: bool,
    pub date_range: DateRange,
}

#[derive(Debug, Clone, Default)]
pub struct FilterState {
    show_read: bool,
    date_range: DateRange,
    sort: SortOrder,
    hidden: HashSet<ItemId>,
    revision: u64,
}

impl FilterState {
    pub fn new(show_read: bool, date_range: DateRange, sort: SortOrder) -> Self {
        Self {
            show_read,
            date_range,
            sort,
            hidden: HashSet::new(),
            revision: 0,
        }
    }

    pub fn key(&self) -> FilterKey {
        FilterKey {
            show_read: self.show_read,
            date_range: self.date_range,
        }
    }

    pub fn show_read(&self) -> bool {
        self.show_read
    }

    pub fn date_range(&self) -> DateRange {
        self.date_range
    }

    pub fn sort(&self) -> SortOrder {
        self.sort
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn is_hidden(&self, id: &ItemId) -> bool {
        self.hidden.contains(id)
    }

    pub fn hidden_count(&self) -> usize {
        self.hidden.len()
    }

    /// Returns true if the value changed.
    pub fn set_show_read(&mut self, show_read: bool) -> bool {
        if self.show_read == show_read {
            return false;
        }
        self.show_read = show_read;
        self.bump();
        true
    }

    pub fn toggle_show_read(&mut self) {
        self.set_show_read(!self.show_read);
    }

    /// Returns true if the value changed.
    pub fn set_date_range(&mut self, range: DateRange) -> bool {
        if self.date_range == range {
            return false;
        }
        self.date_range = range;
        self.bump();
        true
    }

    pub fn cycle_date_range(&mut self) -> DateRange {
        self.set_date_range(self.date_range.next());
        self.date_range
    }

    /// Returns true if the value changed.
    pub fn set_sort(&mut self, sort: SortOrder) -> bool {
        if self.sort == sort {
            return false;
        }
        self.sort = sort;
        self.bump();
        true
    }

    /// Hides `id` for the rest of the session. Returns true if newly hidden.
    pub fn hide(&mut self, id: ItemId) -> bool {
        let inserted = self.hidden.insert(id);
        if inserted {
            self.bump();
        }
        inserted
    }

    pub fn unhide(&mut self, id: &ItemId) -> bool {
        let removed = self.hidden.remove(id);
        if removed {
            self.bump();
        }
        removed
    }

    /// Restores every hidden item. Returns how many were restored.
    pub fn clear_hidden(&mut self) -> usize {
        let count = self.hidden.len();
        if count > 0 {
            self.hidden.clear();
            self.bump();
        }
        count
    }

    fn bump(&mut self) {
        self.revision = self.revision.wrapping_add(1);
    }

    /// Serializes the persisted fields, e.g. `read=1&range=week`.
    ///
    /// `sort` is appended only when it differs from the default. Hidden ids
    /// are session-scoped and never persisted.
    pub fn to_query(&self) -> String {
        let mut out = url::form_urlencoded::Serializer::new(String::new());
        out.append_pair("read", if self.show_read { "1" } else { "0" });
        out.append_pair("range", self.date_range.as_str());
        if self.sort != SortOrder::default() {
            out.append_pair("sort", self.sort.as_str());
        }
        out.finish()
    }

    /// Applies a query string produced by [`FilterState::to_query`].
    ///
    /// Missing keys leave the current value untouched; unknown keys are
    /// ignored with a warning. Nothing is applied if any known key is invalid.
    pub fn apply_query(&mut self, query: &str) -> Result<(), FilterParseError> {
        let query = query.trim().trim_start_matches('?');
        let mut show_read = self.show_read;
        let mut date_range = self.date_range;
        let mut sort = self.sort;

        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            match key.as_ref() {
                "read" => {
                    show_read = match value.as_ref() {
                        "1" | "true" => true,
                        "0" | "false" => false,
                        _ => {
                            return Err(FilterParseError::InvalidFlag {
                                key: key.into_owned(),
                                value: value.into_owned(),
                            })
                        }
                    }
                }
                "range" => date_range = value.parse()?,
                "sort" => sort = value.parse()?,
                other => {
                    tracing::warn!(key = %other, "Ignoring unknown view parameter");
                }
            }
        }

        self.set_show_read(show_read);
        self.set_date_range(date_range);
        self.set_sort(sort);
        Ok(())
    }

    /// Parses a query string onto default filter values.
    pub fn from_query(query: &str) -> Result<Self, FilterParseError> {
        let mut state = Self::default();
        state.apply_query(query)?;
        Ok(state)
    }
}
