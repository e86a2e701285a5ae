//! Item cache: the client's single source of truth about items.
//!
//! Items live in partitions keyed by [`FilterKey`]. Each partition is filled
//! by incremental fetches and remembers its own watermark and paging cursor.
//! Read-flag writes are applied optimistically across every partition and
//! settled later by [`ItemCache::confirm_mutation`] or
//! [`ItemCache::rollback_mutation`].
//!
//! Every public mutator is synchronous. Remote calls run elsewhere and feed
//! their results back through the completion halves (`apply_fetch`,
//! `fail_fetch`, `confirm_mutation`, `rollback_mutation`).

mod entry;

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use lru::LruCache;

use crate::filter::FilterKey;
use crate::remote::{Item, ItemId, ListPage, ListQuery};

use entry::{CacheEntry, PendingRead};

/// Number of filter configurations kept before the least recently used is dropped.
pub const PARTITION_CAPACITY: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchStatus {
    Idle,
    Loading,
    /// Last fetch failed. Stale data stays visible; the next fetch retries.
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchKind {
    /// First page of a partition that has never completed a fetch.
    Initial,
    /// Items published after the watermark.
    Refresh,
    /// The page after the last one fetched.
    NextPage,
}

/// A fetch handed out by the cache. Pass it back unchanged on completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub key: FilterKey,
    pub kind: FetchKind,
    pub query: ListQuery,
    pub issued_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MergeReport {
    pub added: usize,
    pub updated: usize,
    pub exhausted: bool,
    /// The rest of a refresh that did not fit in one page. Issue it next;
    /// the watermark only moves once the refresh has been read to the end.
    pub follow_up: Option<FetchRequest>,
}

/// Who asked for a read-flag change. Decides how a failure is surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOrigin {
    /// Explicit user action: failures are shown inline on the item.
    User,
    /// Side effect of stepping through the reader: failures are only logged.
    Traversal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadMutation {
    pub ticket: u64,
    pub ids: Vec<ItemId>,
    pub is_read: bool,
    pub origin: ReadOrigin,
}

/// One failed user mutation after rollback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationFailure {
    pub ticket: u64,
    pub ids: Vec<ItemId>,
    pub message: Arc<str>,
}

/// Items fetched under one filter configuration.
#[derive(Debug)]
pub struct Partition {
    entries: HashMap<ItemId, CacheEntry>,
    /// Date lower bound, anchored when the partition was created.
    since: Option<DateTime<Utc>>,
    watermark: Option<DateTime<Utc>>,
    next_offset: u64,
    total_count: Option<u64>,
    exhausted: bool,
    status: FetchStatus,
    page_in_flight: bool,
    refresh_in_flight: bool,
}

impl Partition {
    fn new(key: FilterKey, now: DateTime<Utc>) -> Self {
        Self {
            entries: HashMap::new(),
            since: key.date_range.lower_bound(now),
            watermark: None,
            next_offset: 0,
            total_count: None,
            exhausted: false,
            status: FetchStatus::Idle,
            page_in_flight: false,
            refresh_in_flight: false,
        }
    }

    pub fn items(&self) -> impl Iterator<Item = &Item> {
        self.entries.values().map(CacheEntry::item)
    }

    pub fn get(&self, id: &ItemId) -> Option<&Item> {
        self.entries.get(id).map(CacheEntry::item)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn status(&self) -> &FetchStatus {
        &self.status
    }

    pub fn watermark(&self) -> Option<DateTime<Utc>> {
        self.watermark
    }

    pub fn next_offset(&self) -> u64 {
        self.next_offset
    }

    pub fn total_count(&self) -> Option<u64> {
        self.total_count
    }

    /// The server has confirmed there are no further pages.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn is_page_in_flight(&self) -> bool {
        self.page_in_flight
    }

    fn is_loading(&self) -> bool {
        self.page_in_flight || self.refresh_in_flight
    }
}

pub struct ItemCache {
    partitions: LruCache<FilterKey, Partition>,
    pending: HashMap<ItemId, PendingRead>,
    item_errors: HashMap<ItemId, Arc<str>>,
    next_ticket: u64,
    revision: u64,
}

impl Default for ItemCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ItemCache {
    pub fn new() -> Self {
        Self::with_capacity(PARTITION_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            partitions: LruCache::new(NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN)),
            pending: HashMap::new(),
            item_errors: HashMap::new(),
            next_ticket: 1,
            revision: 0,
        }
    }

    /// Bumped on every change visible through [`ItemCache::partition`].
    pub fn revision(&self) -> u64 {
        self.revision
    }

    fn bump(&mut self) {
        self.revision = self.revision.wrapping_add(1);
    }

    pub fn partition(&self, key: &FilterKey) -> Option<&Partition> {
        self.partitions.peek(key)
    }

    pub fn contains_partition(&self, key: &FilterKey) -> bool {
        self.partitions.contains(key)
    }

    /// Looks an item up in any partition, most recently used first.
    pub fn find_item(&self, id: &ItemId) -> Option<&Item> {
        self.partitions.iter().find_map(|(_, p)| p.get(id))
    }

    pub fn item_error(&self, id: &ItemId) -> Option<&str> {
        self.item_errors.get(id).map(|m| &**m)
    }

    pub fn has_pending(&self, id: &ItemId) -> bool {
        self.pending.contains_key(id)
    }

    // ========================================================================
    // Fetch
    // ========================================================================

    /// Starts the next fetch for `key`: the first page if the partition has
    /// never loaded, otherwise everything published after its watermark.
    ///
    /// Creates the partition if needed and marks it most recently used.
    /// Returns `None` when an equivalent fetch is already in flight.
    pub fn begin_refresh(
        &mut self,
        key: FilterKey,
        page_size: u32,
        now: DateTime<Utc>,
    ) -> Option<FetchRequest> {
        let created = !self.partitions.contains(&key);
        let partition = self
            .partitions
            .get_or_insert_mut(key, || Partition::new(key, now));

        let request = match partition.watermark {
            None => {
                if partition.page_in_flight {
                    None
                } else {
                    partition.page_in_flight = true;
                    Some(FetchRequest {
                        key,
                        kind: FetchKind::Initial,
                        query: list_query(key, partition.since, page_size, 0),
                        issued_at: now,
                    })
                }
            }
            Some(watermark) => {
                if partition.refresh_in_flight {
                    None
                } else {
                    partition.refresh_in_flight = true;
                    Some(FetchRequest {
                        key,
                        kind: FetchKind::Refresh,
                        query: list_query(key, Some(watermark), page_size, 0),
                        issued_at: now,
                    })
                }
            }
        };

        if request.is_some() && partition.status != FetchStatus::Loading {
            partition.status = FetchStatus::Loading;
        }
        if created || request.is_some() {
            self.bump();
        }
        request
    }

    /// Starts a fetch of the page after the last one loaded.
    ///
    /// Returns `None` if the partition is unknown, exhausted, or already
    /// fetching a page.
    pub fn begin_next_page(
        &mut self,
        key: FilterKey,
        page_size: u32,
        now: DateTime<Utc>,
    ) -> Option<FetchRequest> {
        let partition = self.partitions.get_mut(&key)?;
        if partition.exhausted || partition.page_in_flight {
            return None;
        }
        partition.page_in_flight = true;
        partition.status = FetchStatus::Loading;

        let kind = if partition.watermark.is_none() {
            FetchKind::Initial
        } else {
            FetchKind::NextPage
        };
        let request = FetchRequest {
            key,
            kind,
            query: list_query(key, partition.since, page_size, partition.next_offset),
            issued_at: now,
        };
        self.bump();
        Some(request)
    }

    /// Merges a successful fetch, keyed by id.
    ///
    /// Server-owned fields are overwritten; pending local read flags survive.
    /// Returns `None` when the partition has been evicted since the request
    /// was issued.
    pub fn apply_fetch(&mut self, request: &FetchRequest, page: ListPage) -> Option<MergeReport> {
        let Some(partition) = self.partitions.peek_mut(&request.key) else {
            tracing::debug!(
                kind = ?request.kind,
                show_read = request.key.show_read,
                range = %request.key.date_range,
                "Dropping fetch result for evicted partition"
            );
            return None;
        };

        let mut report = MergeReport::default();
        let returned = page.items.len() as u64;

        for item in page.items {
            let id = item.id.clone();
            self.item_errors.remove(&id);
            let pending = self.pending.get_mut(&id);
            match partition.entries.get_mut(&id) {
                Some(entry) => {
                    if entry.merge_server(item, pending) {
                        report.updated += 1;
                    }
                }
                None => {
                    partition.entries.insert(id, CacheEntry::new(item, pending));
                    report.added += 1;
                }
            }
        }

        match request.kind {
            FetchKind::Initial | FetchKind::NextPage => {
                partition.page_in_flight = false;
                partition.next_offset = request.query.offset.saturating_add(returned);
                partition.total_count = Some(page.total_count);
                partition.exhausted = returned == 0 || partition.next_offset >= page.total_count;
                if request.kind == FetchKind::Initial {
                    partition.watermark = Some(max_opt(partition.watermark, request.issued_at));
                }
            }
            FetchKind::Refresh => {
                let received = request.query.offset.saturating_add(returned);
                if returned > 0 && received < page.total_count {
                    let mut query = request.query.clone();
                    query.offset = received;
                    report.follow_up = Some(FetchRequest {
                        key: request.key,
                        kind: FetchKind::Refresh,
                        query,
                        issued_at: request.issued_at,
                    });
                } else {
                    partition.refresh_in_flight = false;
                    partition.watermark = Some(max_opt(partition.watermark, request.issued_at));
                }
                // New items sort after everything older, so they extend the
                // tail of the listing. When paging had already reached the
                // tail they count as paged too.
                let added = report.added as u64;
                if let Some(total) = partition.total_count {
                    let caught_up = partition.next_offset >= total;
                    partition.total_count = Some(total.saturating_add(added));
                    if caught_up {
                        partition.next_offset = partition.next_offset.saturating_add(added);
                    }
                    partition.exhausted = report.follow_up.is_none()
                        && partition.total_count.is_some_and(|t| partition.next_offset >= t);
                }
            }
        }
        report.exhausted = partition.exhausted;
        partition.status = if partition.is_loading() {
            FetchStatus::Loading
        } else {
            FetchStatus::Idle
        };

        tracing::debug!(
            kind = ?request.kind,
            added = report.added,
            updated = report.updated,
            exhausted = report.exhausted,
            cached = partition.entries.len(),
            "Merged fetch result"
        );

        self.bump();
        Some(report)
    }

    /// Records a failed fetch. Cached items stay as they were.
    pub fn fail_fetch(&mut self, request: &FetchRequest, error: &str) {
        let Some(partition) = self.partitions.peek_mut(&request.key) else {
            tracing::debug!(kind = ?request.kind, "Dropping fetch failure for evicted partition");
            return;
        };
        match request.kind {
            FetchKind::Initial | FetchKind::NextPage => partition.page_in_flight = false,
            FetchKind::Refresh => partition.refresh_in_flight = false,
        }
        partition.status = FetchStatus::Failed(error.to_owned());
        tracing::warn!(kind = ?request.kind, error = %error, "Fetch failed");
        self.bump();
    }

    // ========================================================================
    // Optimistic read-state mutation
    // ========================================================================

    /// Writes `is_read` locally for every known id whose flag differs.
    ///
    /// Returns the mutation to send to the server, or `None` if nothing
    /// changed. Any inline error on the touched ids is cleared.
    pub fn begin_read_mutation(
        &mut self,
        ids: &[ItemId],
        is_read: bool,
        origin: ReadOrigin,
    ) -> Option<ReadMutation> {
        let ticket = self.next_ticket;
        let mut changed = Vec::new();

        for id in ids {
            let Some(current) = self.find_item(id).map(|item| item.is_read) else {
                continue;
            };
            if current == is_read || changed.contains(id) {
                continue;
            }

            // Superseding an unsettled write keeps its fallback: the server
            // still holds whatever was there before the first write.
            let prior = self.pending.get(id).map_or(current, |p| p.prior);
            self.pending
                .insert(id.clone(), PendingRead::new(is_read, prior, ticket));
            for (_, partition) in self.partitions.iter_mut() {
                if let Some(entry) = partition.entries.get_mut(id) {
                    entry.set_read(is_read);
                }
            }
            self.item_errors.remove(id);
            changed.push(id.clone());
        }

        if changed.is_empty() {
            return None;
        }

        self.next_ticket += 1;
        self.bump();
        tracing::debug!(ticket, count = changed.len(), is_read, ?origin, "Optimistic read-state write");
        Some(ReadMutation {
            ticket,
            ids: changed,
            is_read,
            origin,
        })
    }

    /// The server acknowledged `mutation`.
    pub fn confirm_mutation(&mut self, mutation: &ReadMutation) {
        for id in &mutation.ids {
            match self.pending.get_mut(id) {
                Some(p) if p.ticket == mutation.ticket => {
                    self.pending.remove(id);
                }
                Some(p) => p.predecessor_confirmed(mutation.is_read),
                None => {}
            }
            self.shift_unread_offsets(id, mutation.is_read);
        }
        tracing::debug!(ticket = mutation.ticket, "Read-state write confirmed");
    }

    /// The server rejected `mutation`: restore the pre-mutation flags.
    ///
    /// Ids superseded by a later write are left alone. Returns the single
    /// failure to surface for a user mutation, `None` for traversal writes
    /// or when nothing was rolled back.
    pub fn rollback_mutation(
        &mut self,
        mutation: &ReadMutation,
        error: &str,
    ) -> Option<MutationFailure> {
        let mut restored = Vec::new();

        for id in &mutation.ids {
            let value = match self.pending.get(id) {
                Some(p) if p.ticket == mutation.ticket => p.rollback_value(),
                _ => continue,
            };
            self.pending.remove(id);
            for (_, partition) in self.partitions.iter_mut() {
                if let Some(entry) = partition.entries.get_mut(id) {
                    entry.set_read(value);
                }
            }
            restored.push(id.clone());
        }

        if restored.is_empty() {
            return None;
        }
        self.bump();

        match mutation.origin {
            ReadOrigin::Traversal => {
                tracing::warn!(
                    ticket = mutation.ticket,
                    count = restored.len(),
                    error = %error,
                    "Mark-read while reading failed; rolled back"
                );
                None
            }
            ReadOrigin::User => {
                tracing::warn!(
                    ticket = mutation.ticket,
                    count = restored.len(),
                    error = %error,
                    "Read-state write failed; rolled back"
                );
                let message: Arc<str> = Arc::from(error);
                for id in &restored {
                    self.item_errors.insert(id.clone(), Arc::clone(&message));
                }
                Some(MutationFailure {
                    ticket: mutation.ticket,
                    ids: restored,
                    message,
                })
            }
        }
    }

    /// Keeps offset paging aligned in unread-only partitions.
    ///
    /// Once the server marks an item read it leaves the unread listing, so
    /// every later offset moves up by one (and back down when unmarked).
    fn shift_unread_offsets(&mut self, id: &ItemId, is_read: bool) {
        for (key, partition) in self.partitions.iter_mut() {
            if key.show_read || !partition.entries.contains_key(id) {
                continue;
            }
            if is_read {
                partition.next_offset = partition.next_offset.saturating_sub(1);
                partition.total_count = partition.total_count.map(|t| t.saturating_sub(1));
            } else {
                partition.next_offset = partition.next_offset.saturating_add(1);
                partition.total_count = partition.total_count.map(|t| t.saturating_add(1));
            }
        }
    }
}

fn list_query(
    key: FilterKey,
    published_since: Option<DateTime<Utc>>,
    limit: u32,
    offset: u64,
) -> ListQuery {
    ListQuery {
        feed_id: None,
        is_read: if key.show_read { None } else { Some(false) },
        published_since,
        limit,
        offset,
    }
}

fn max_opt(current: Option<DateTime<Utc>>, candidate: DateTime<Utc>) -> DateTime<Utc> {
    current.map_or(candidate, |c| c.max(candidate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::DateRange;
    use chrono::{Duration, TimeZone};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    const UNREAD: FilterKey = FilterKey {
        show_read: false,
        date_range: DateRange::All,
    };
    const ALL: FilterKey = FilterKey {
        show_read: true,
        date_range: DateRange::All,
    };

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap()
    }

    fn item(id: &str, is_read: bool) -> Item {
        Item {
            id: ItemId::new(id),
            feed_id: Arc::from("feed"),
            title: Arc::from(format!("Item {id}")),
            description: None,
            content: None,
            published_at: Some(t0()),
            received_at: t0(),
            is_read,
            author: None,
            category: None,
            image_url: None,
        }
    }

    fn page(items: Vec<Item>, total: u64) -> ListPage {
        ListPage {
            items,
            total_count: total,
        }
    }

    fn loaded(key: FilterKey, items: Vec<Item>, total: u64) -> ItemCache {
        let mut cache = ItemCache::new();
        let req = cache.begin_refresh(key, 50, t0()).unwrap();
        cache.apply_fetch(&req, page(items, total)).unwrap();
        cache
    }

    fn read_flag(cache: &ItemCache, key: FilterKey, id: &str) -> bool {
        cache
            .partition(&key)
            .and_then(|p| p.get(&ItemId::new(id)))
            .map(|i| i.is_read)
            .unwrap()
    }

    #[test]
    fn test_initial_then_refresh_uses_watermark() {
        let mut cache = ItemCache::new();
        let first = cache.begin_refresh(UNREAD, 20, t0()).unwrap();
        assert_eq!(first.kind, FetchKind::Initial);
        assert_eq!(first.query.is_read, Some(false));
        assert_eq!(first.query.published_since, None);

        // Racing refresh while the first page is in flight is a no-op.
        assert!(cache.begin_refresh(UNREAD, 20, t0()).is_none());

        cache
            .apply_fetch(&first, page(vec![item("a", false)], 1))
            .unwrap();
        assert_eq!(cache.partition(&UNREAD).unwrap().watermark(), Some(t0()));

        let later = t0() + Duration::minutes(5);
        let refresh = cache.begin_refresh(UNREAD, 20, later).unwrap();
        assert_eq!(refresh.kind, FetchKind::Refresh);
        assert_eq!(refresh.query.published_since, Some(t0()));

        let report = cache
            .apply_fetch(&refresh, page(vec![item("b", false)], 1))
            .unwrap();
        assert_eq!(report.added, 1);
        let partition = cache.partition(&UNREAD).unwrap();
        assert_eq!(partition.len(), 2);
        assert_eq!(partition.watermark(), Some(later));
        // Paging had reached the tail, so the new item counts as paged.
        assert_eq!(partition.next_offset(), 2);
        assert_eq!(partition.total_count(), Some(2));
        assert!(partition.is_exhausted());
    }

    #[test]
    fn test_refresh_larger_than_a_page_continues() {
        let mut cache = loaded(UNREAD, vec![item("a", false)], 1);
        assert!(cache.partition(&UNREAD).unwrap().is_exhausted());

        let later = t0() + Duration::minutes(10);
        let refresh = cache.begin_refresh(UNREAD, 2, later).unwrap();
        let report = cache
            .apply_fetch(&refresh, page(vec![item("b", false), item("c", false)], 3))
            .unwrap();
        let follow_up = report.follow_up.unwrap();
        assert_eq!(follow_up.kind, FetchKind::Refresh);
        assert_eq!(follow_up.query.offset, 2);
        assert_eq!(follow_up.query.published_since, Some(t0()));
        assert_eq!(follow_up.issued_at, later);

        // Watermark holds until the burst is read to the end.
        let partition = cache.partition(&UNREAD).unwrap();
        assert_eq!(partition.watermark(), Some(t0()));
        assert!(!partition.is_exhausted());
        assert_eq!(partition.status(), &FetchStatus::Loading);
        assert!(cache.begin_refresh(UNREAD, 2, later).is_none());

        let report = cache
            .apply_fetch(&follow_up, page(vec![item("d", false)], 3))
            .unwrap();
        assert_eq!(report.follow_up, None);
        assert!(report.exhausted);
        let partition = cache.partition(&UNREAD).unwrap();
        assert_eq!(partition.len(), 4);
        assert!(partition.get(&ItemId::new("d")).is_some());
        assert_eq!(partition.watermark(), Some(later));
        assert_eq!(partition.total_count(), Some(4));
        assert_eq!(partition.status(), &FetchStatus::Idle);
    }

    #[test]
    fn test_failed_refresh_continuation_keeps_watermark() {
        let mut cache = loaded(UNREAD, vec![item("a", false)], 1);
        let later = t0() + Duration::minutes(10);
        let refresh = cache.begin_refresh(UNREAD, 1, later).unwrap();
        let follow_up = cache
            .apply_fetch(&refresh, page(vec![item("b", false)], 2))
            .unwrap()
            .follow_up
            .unwrap();
        cache.fail_fetch(&follow_up, "HTTP error: status 503");

        assert_eq!(cache.partition(&UNREAD).unwrap().watermark(), Some(t0()));
        // The next refresh starts the burst over from the old watermark.
        let retry = cache.begin_refresh(UNREAD, 1, later).unwrap();
        assert_eq!(retry.query.published_since, Some(t0()));
        assert_eq!(retry.query.offset, 0);
    }

    #[test]
    fn test_date_range_sets_lower_bound() {
        let mut cache = ItemCache::new();
        let key = FilterKey {
            show_read: true,
            date_range: DateRange::Week,
        };
        let req = cache.begin_refresh(key, 20, t0()).unwrap();
        assert_eq!(req.query.is_read, None);
        assert_eq!(req.query.published_since, Some(t0() - Duration::days(7)));
    }

    #[test]
    fn test_paging_until_exhausted() {
        let mut cache = loaded(ALL, vec![item("a", false), item("b", false)], 3);
        assert!(!cache.partition(&ALL).unwrap().is_exhausted());

        let next = cache.begin_next_page(ALL, 2, t0()).unwrap();
        assert_eq!(next.kind, FetchKind::NextPage);
        assert_eq!(next.query.offset, 2);
        assert!(cache.begin_next_page(ALL, 2, t0()).is_none());

        let report = cache
            .apply_fetch(&next, page(vec![item("c", true)], 3))
            .unwrap();
        assert!(report.exhausted);
        assert!(cache.begin_next_page(ALL, 2, t0()).is_none());
    }

    #[test]
    fn test_empty_page_exhausts() {
        let cache = loaded(ALL, vec![], 10);
        assert!(cache.partition(&ALL).unwrap().is_exhausted());
    }

    #[test]
    fn test_fetch_failure_keeps_stale_data() {
        let mut cache = loaded(ALL, vec![item("a", false)], 5);
        let next = cache.begin_next_page(ALL, 1, t0()).unwrap();
        cache.fail_fetch(&next, "HTTP error: status 502");

        let partition = cache.partition(&ALL).unwrap();
        assert_eq!(partition.len(), 1);
        assert!(matches!(partition.status(), FetchStatus::Failed(_)));
        assert!(!partition.is_page_in_flight());

        // Retryable: the same page can be requested again.
        let retry = cache.begin_next_page(ALL, 1, t0()).unwrap();
        assert_eq!(retry.query.offset, 1);
        cache
            .apply_fetch(&retry, page(vec![item("b", false)], 5))
            .unwrap();
        assert_eq!(cache.partition(&ALL).unwrap().status(), &FetchStatus::Idle);
    }

    #[test]
    fn test_evicted_partition_drops_result() {
        let mut cache = ItemCache::with_capacity(1);
        let stale = cache.begin_refresh(UNREAD, 10, t0()).unwrap();
        cache.begin_refresh(ALL, 10, t0()).unwrap();
        assert!(!cache.contains_partition(&UNREAD));

        assert!(cache
            .apply_fetch(&stale, page(vec![item("a", false)], 1))
            .is_none());
        assert!(cache.find_item(&ItemId::new("a")).is_none());
    }

    #[test]
    fn test_optimistic_write_survives_refetch_until_confirmed() {
        let mut cache = loaded(ALL, vec![item("a", false)], 1);
        let mutation = cache
            .begin_read_mutation(&[ItemId::new("a")], true, ReadOrigin::User)
            .unwrap();
        assert!(read_flag(&cache, ALL, "a"));

        // Server has not seen the write yet.
        let refresh = cache.begin_refresh(ALL, 10, t0() + Duration::minutes(1)).unwrap();
        cache.apply_fetch(&refresh, page(vec![item("a", false)], 1));
        assert!(read_flag(&cache, ALL, "a"));

        cache.confirm_mutation(&mutation);
        assert!(!cache.has_pending(&ItemId::new("a")));
        assert!(read_flag(&cache, ALL, "a"));
    }

    #[test]
    fn test_rollback_restores_flag_with_one_error() {
        let mut cache = loaded(ALL, vec![item("a", false), item("b", false)], 2);
        let ids = [ItemId::new("a"), ItemId::new("b")];
        let mutation = cache
            .begin_read_mutation(&ids, true, ReadOrigin::User)
            .unwrap();

        let failure = cache.rollback_mutation(&mutation, "HTTP error: status 500");
        let failure = failure.unwrap();
        assert_eq!(failure.ids.len(), 2);
        assert!(!read_flag(&cache, ALL, "a"));
        assert!(!read_flag(&cache, ALL, "b"));
        assert_eq!(
            cache.item_error(&ItemId::new("a")),
            Some("HTTP error: status 500")
        );

        // Repeating the action clears the inline error.
        cache.begin_read_mutation(&ids[..1], true, ReadOrigin::User);
        assert_eq!(cache.item_error(&ItemId::new("a")), None);
    }

    #[test]
    fn test_traversal_rollback_is_silent() {
        let mut cache = loaded(ALL, vec![item("a", false)], 1);
        let mutation = cache
            .begin_read_mutation(&[ItemId::new("a")], true, ReadOrigin::Traversal)
            .unwrap();
        assert!(cache.rollback_mutation(&mutation, "boom").is_none());
        assert!(!read_flag(&cache, ALL, "a"));
        assert_eq!(cache.item_error(&ItemId::new("a")), None);
    }

    #[test]
    fn test_rollback_uses_server_value_seen_during_write() {
        let mut cache = loaded(ALL, vec![item("a", false)], 1);
        let mutation = cache
            .begin_read_mutation(&[ItemId::new("a")], true, ReadOrigin::User)
            .unwrap();

        let refresh = cache.begin_refresh(ALL, 10, t0() + Duration::minutes(1)).unwrap();
        cache.apply_fetch(&refresh, page(vec![item("a", true)], 1));

        cache.rollback_mutation(&mutation, "offline");
        assert!(read_flag(&cache, ALL, "a"));
    }

    #[test]
    fn test_superseded_write_settles_against_latest() {
        let mut cache = loaded(ALL, vec![item("a", false)], 1);
        let id = [ItemId::new("a")];
        let first = cache.begin_read_mutation(&id, true, ReadOrigin::User).unwrap();
        let second = cache.begin_read_mutation(&id, false, ReadOrigin::User).unwrap();

        // The older ack lands, then the newer write fails: server holds `true`.
        cache.confirm_mutation(&first);
        assert!(cache.rollback_mutation(&second, "offline").is_some());
        assert!(read_flag(&cache, ALL, "a"));
    }

    #[test]
    fn test_stale_rollback_ignored() {
        let mut cache = loaded(ALL, vec![item("a", false)], 1);
        let id = [ItemId::new("a")];
        let first = cache.begin_read_mutation(&id, true, ReadOrigin::User).unwrap();
        let _second = cache.begin_read_mutation(&id, false, ReadOrigin::User).unwrap();

        assert!(cache.rollback_mutation(&first, "offline").is_none());
        assert!(!read_flag(&cache, ALL, "a"));
        assert!(cache.has_pending(&ItemId::new("a")));
    }

    #[test]
    fn test_mutation_spans_partitions() {
        let mut cache = loaded(ALL, vec![item("a", false)], 1);
        let req = cache.begin_refresh(UNREAD, 10, t0()).unwrap();
        cache.apply_fetch(&req, page(vec![item("a", false)], 1));

        cache.begin_read_mutation(&[ItemId::new("a")], true, ReadOrigin::User);
        assert!(read_flag(&cache, ALL, "a"));
        assert!(read_flag(&cache, UNREAD, "a"));
    }

    #[test]
    fn test_unchanged_write_is_noop() {
        let mut cache = loaded(ALL, vec![item("a", true)], 1);
        let before = cache.revision();
        assert!(cache
            .begin_read_mutation(&[ItemId::new("a"), ItemId::new("zzz")], true, ReadOrigin::User)
            .is_none());
        assert_eq!(cache.revision(), before);
    }

    #[test]
    fn test_confirmed_read_shifts_unread_offset() {
        let mut cache = loaded(UNREAD, vec![item("a", false), item("b", false)], 5);
        let mutation = cache
            .begin_read_mutation(&[ItemId::new("a")], true, ReadOrigin::Traversal)
            .unwrap();
        cache.confirm_mutation(&mutation);

        let next = cache.begin_next_page(UNREAD, 2, t0()).unwrap();
        assert_eq!(next.query.offset, 1);
    }

    #[test]
    fn test_refetch_clears_inline_error() {
        let mut cache = loaded(ALL, vec![item("a", false)], 1);
        let mutation = cache
            .begin_read_mutation(&[ItemId::new("a")], true, ReadOrigin::User)
            .unwrap();
        cache.rollback_mutation(&mutation, "offline");
        assert!(cache.item_error(&ItemId::new("a")).is_some());

        let refresh = cache.begin_refresh(ALL, 10, t0()).unwrap();
        cache.apply_fetch(&refresh, page(vec![item("a", false)], 1));
        assert!(cache.item_error(&ItemId::new("a")).is_none());
    }

    fn arb_page() -> impl Strategy<Value = Vec<Item>> {
        prop::collection::vec((0u8..20, any::<bool>(), "[a-z]{0,6}"), 0..30).prop_map(|rows| {
            rows.into_iter()
                .map(|(n, is_read, title)| {
                    let mut it = item(&n.to_string(), is_read);
                    it.title = Arc::from(title);
                    it
                })
                .collect()
        })
    }

    fn snapshot(cache: &ItemCache, key: FilterKey) -> Vec<Item> {
        let mut items: Vec<Item> = cache.partition(&key).unwrap().items().cloned().collect();
        items.sort_by(|a, b| a.id.cmp(&b.id));
        items
    }

    proptest! {
        #[test]
        fn prop_merge_is_idempotent(items in arb_page()) {
            let mut cache = loaded(ALL, Vec::new(), 1000);
            let req = cache.begin_refresh(ALL, 50, t0()).unwrap();
            cache.apply_fetch(&req, page(items.clone(), 1000));
            let once = snapshot(&cache, ALL);

            let req = cache.begin_refresh(ALL, 50, t0()).unwrap();
            cache.apply_fetch(&req, page(items, 1000));
            prop_assert_eq!(snapshot(&cache, ALL), once);
        }

        #[test]
        fn prop_pending_flag_survives_any_refetch(items in arb_page(), flag in any::<bool>()) {
            let mut cache = loaded(ALL, vec![item("0", !flag)], 1000);
            cache.begin_read_mutation(&[ItemId::new("0")], flag, ReadOrigin::User);

            let req = cache.begin_refresh(ALL, 50, t0()).unwrap();
            cache.apply_fetch(&req, page(items, 1000));
            prop_assert_eq!(read_flag(&cache, ALL, "0"), flag);
        }
    }
}
