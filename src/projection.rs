//! Read-only views derived from the item cache and the filter.
//!
//! The free functions are pure and never touch the network. [`Projections`]
//! memoizes their result keyed by the cache and filter revisions, so a view
//! is recomputed at most once per change no matter how often it is read.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::cache::ItemCache;
use crate::filter::{FilterState, SortOrder};
use crate::remote::{Item, ItemId};

/// Ordering used by every projection: publication (or receipt) time, then id.
pub fn compare_items(a: &Item, b: &Item, sort: SortOrder) -> Ordering {
    let by_time = a.sort_timestamp().cmp(&b.sort_timestamp());
    let by_time = match sort {
        SortOrder::OldestFirst => by_time,
        SortOrder::NewestFirst => by_time.reverse(),
    };
    by_time.then_with(|| a.id.cmp(&b.id))
}

fn collect(
    cache: &ItemCache,
    filter: &FilterState,
    sort: SortOrder,
    keep: impl Fn(&Item) -> bool,
) -> Vec<Item> {
    let Some(partition) = cache.partition(&filter.key()) else {
        return Vec::new();
    };
    let mut items: Vec<Item> = partition.items().filter(|i| keep(i)).cloned().collect();
    // Hidden ids are subtracted last.
    items.retain(|i| !filter.is_hidden(&i.id));
    items.sort_by(|a, b| compare_items(a, b, sort));
    items
}

/// Visible items with `is_read == false`.
pub fn unread(cache: &ItemCache, filter: &FilterState) -> Vec<Item> {
    collect(cache, filter, filter.sort(), |i| !i.is_read)
}

/// Visible items with `is_read == true`.
///
/// Non-empty even when read items are filtered out server-side: anything
/// marked read during the session stays in the partition.
pub fn read(cache: &ItemCache, filter: &FilterState) -> Vec<Item> {
    collect(cache, filter, filter.sort(), |i| i.is_read)
}

/// Every visible item in the active partition, sorted by `sort`.
pub fn merged(cache: &ItemCache, filter: &FilterState, sort: SortOrder) -> Vec<Item> {
    collect(cache, filter, sort, |_| true)
}

/// The sequence the reader steps through.
///
/// Everything visible when read items are shown, otherwise unread only.
pub fn ordered_sequence(cache: &ItemCache, filter: &FilterState) -> Vec<ItemId> {
    let items = if filter.show_read() {
        merged(cache, filter, filter.sort())
    } else {
        unread(cache, filter)
    };
    items.into_iter().map(|i| i.id).collect()
}

/// One consistent snapshot of every view.
#[derive(Debug, Default)]
pub struct ProjectionSet {
    pub unread: Vec<Item>,
    pub read: Vec<Item>,
    /// Items the list shows, in display order.
    pub visible: Vec<Item>,
    pub sequence: Vec<ItemId>,
}

impl ProjectionSet {
    fn compute(cache: &ItemCache, filter: &FilterState) -> Self {
        let unread = unread(cache, filter);
        let read = read(cache, filter);
        let visible = if filter.show_read() {
            merged(cache, filter, filter.sort())
        } else {
            unread.clone()
        };
        let sequence = visible.iter().map(|i| i.id.clone()).collect();
        Self {
            unread,
            read,
            visible,
            sequence,
        }
    }

    pub fn position(&self, id: &ItemId) -> Option<usize> {
        self.sequence.iter().position(|s| s == id)
    }
}

#[derive(Debug, Default)]
pub struct Projections {
    stamp: Option<(u64, u64)>,
    current: Arc<ProjectionSet>,
    recomputed: u64,
}

impl Projections {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current views, recomputed only if the cache or filter changed.
    pub fn get(&mut self, cache: &ItemCache, filter: &FilterState) -> Arc<ProjectionSet> {
        let stamp = (cache.revision(), filter.revision());
        if self.stamp != Some(stamp) {
            self.current = Arc::new(ProjectionSet::compute(cache, filter));
            self.stamp = Some(stamp);
            self.recomputed += 1;
        }
        Arc::clone(&self.current)
    }

    /// How many times the views have been rebuilt.
    pub fn recompute_count(&self) -> u64 {
        self.recomputed
    }
}
