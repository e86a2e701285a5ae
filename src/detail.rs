//! Full item bodies fetched by id, kept warm for the reader.

use std::num::NonZeroUsize;
use std::time::Duration;

use lru::LruCache;
use tokio::time::Instant;

use crate::remote::{Item, ItemId};

pub const DEFAULT_DETAIL_CAPACITY: usize = 64;
pub const DEFAULT_FRESH_FOR: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
struct DetailEntry {
    /// `None` when the server reported the item gone.
    item: Option<Item>,
    fetched_at: Instant,
}

/// What the detail cache knows about an id right now.
#[derive(Debug, Clone, PartialEq)]
pub enum Detail {
    Available(Item),
    NotFound,
}

pub struct DetailCache {
    entries: LruCache<ItemId, DetailEntry>,
    fresh_for: Duration,
}

impl DetailCache {
    pub fn new(capacity: usize, fresh_for: Duration) -> Self {
        Self {
            entries: LruCache::new(NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN)),
            fresh_for,
        }
    }

    /// Stores a fetch result. `None` records that the item no longer exists.
    pub fn insert(&mut self, id: ItemId, item: Option<Item>) {
        self.entries.put(
            id,
            DetailEntry {
                item,
                fetched_at: Instant::now(),
            },
        );
    }

    /// Fresh entry for `id`, if any. Expired entries are evicted.
    pub fn get_fresh(&mut self, id: &ItemId) -> Option<Detail> {
        let fresh_for = self.fresh_for;
        let expired = match self.entries.get(id) {
            None => return None,
            Some(entry) => entry.fetched_at.elapsed() >= fresh_for,
        };
        if expired {
            self.entries.pop(id);
            return None;
        }
        self.entries.peek(id).map(|entry| match &entry.item {
            Some(item) => Detail::Available(item.clone()),
            None => Detail::NotFound,
        })
    }

    /// True if `id` has a fresh entry. Does not touch LRU order.
    pub fn is_warm(&self, id: &ItemId) -> bool {
        self.entries
            .peek(id)
            .is_some_and(|entry| entry.fetched_at.elapsed() < self.fresh_for)
    }

    /// Keeps a cached body's read flag in step with the item cache.
    pub fn sync_read_flag(&mut self, id: &ItemId, is_read: bool) {
        if let Some(DetailEntry {
            item: Some(item), ..
        }) = self.entries.peek_mut(id)
        {
            item.is_read = is_read;
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for DetailCache {
    fn default() -> Self {
        Self::new(DEFAULT_DETAIL_CAPACITY, DEFAULT_FRESH_FOR)
    }
}
