//! The synchronization session: cache, filter, views, reader and the
//! background work that keeps them in step with the server.
//!
//! `FeedSession` is owned by one event loop. Every remote call runs in a
//! spawned task that reports back as a [`SyncEvent`]; the loop hands those to
//! [`FeedSession::handle_event`], which is the only place results are applied.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinSet};

use crate::cache::{
    FetchKind, FetchRequest, FetchStatus, ItemCache, ReadMutation, ReadOrigin,
};
use crate::detail::{Detail, DetailCache, DEFAULT_DETAIL_CAPACITY, DEFAULT_FRESH_FOR};
use crate::filter::{FilterParseError, FilterState, SortOrder};
use crate::navigation::{NavOutcome, NavigationController, Position};
use crate::prefetch::{compute_window, PrefetchScheduler, DEFAULT_PREFETCH_RADIUS};
use crate::projection::{ProjectionSet, Projections};
use crate::remote::{Item, ItemAuthority, ItemId, ListPage, RemoteError};
use crate::task::catch_task_panic;

pub const DEFAULT_PAGE_SIZE: u32 = 50;

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub page_size: u32,
    pub prefetch_radius: usize,
    pub detail_fresh_for: Duration,
    pub detail_capacity: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            prefetch_radius: DEFAULT_PREFETCH_RADIUS,
            detail_fresh_for: DEFAULT_FRESH_FOR,
            detail_capacity: DEFAULT_DETAIL_CAPACITY,
        }
    }
}

/// Why a detail load was issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetailOrigin {
    /// The reader is waiting for it. Stale once the generation moves on.
    Reader { generation: u64 },
    Prefetch,
}

/// Identifies a background task, so a panic can be settled like a failure.
#[derive(Debug, Clone)]
pub enum TaskLabel {
    Fetch(FetchRequest),
    Mutation(ReadMutation),
    Detail { id: ItemId, origin: DetailOrigin },
}

impl TaskLabel {
    fn name(&self) -> &'static str {
        match self {
            TaskLabel::Fetch(_) => "fetch",
            TaskLabel::Mutation(_) => "mark_read",
            TaskLabel::Detail { .. } => "load_item",
        }
    }
}

/// Results from background tasks.
#[derive(Debug)]
pub enum SyncEvent {
    FetchCompleted {
        request: FetchRequest,
        result: Result<ListPage, RemoteError>,
    },
    MutationSettled {
        mutation: ReadMutation,
        result: Result<(), RemoteError>,
    },
    DetailLoaded {
        id: ItemId,
        origin: DetailOrigin,
        result: Result<Option<Item>, RemoteError>,
    },
    TaskPanicked {
        task: TaskLabel,
        error: String,
    },
}

/// What the reader modal is showing.
#[derive(Debug, Clone, PartialEq)]
pub enum ReaderContent {
    Hidden,
    Loading(ItemId),
    Ready(Item),
    /// The server no longer has this item.
    NotFound(ItemId),
    Failed {
        id: ItemId,
        error: String,
    },
    EndOfList,
}

/// A message for the status bar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Info(String),
    Error(String),
}

/// Result of a reader command.
#[derive(Debug)]
pub struct ReaderStep {
    pub outcome: NavOutcome,
    /// Detail load started for the new content. Abort it if the content
    /// changes before it lands.
    pub load: Option<AbortHandle>,
}

impl ReaderStep {
    fn new(outcome: NavOutcome) -> Self {
        Self {
            outcome,
            load: None,
        }
    }

    /// True if the reader now shows different content.
    pub fn changed_content(&self) -> bool {
        matches!(self.outcome, NavOutcome::Moved { .. })
    }
}

/// What handling one [`SyncEvent`] changed for the caller.
#[derive(Debug, Default)]
pub struct EventReport {
    /// Set when an awaited page let the reader move on.
    pub step: Option<ReaderStep>,
    /// Detail load started while handling the event.
    pub load: Option<AbortHandle>,
    pub notice: Option<Notice>,
}

pub struct FeedSession<A: ItemAuthority> {
    authority: A,
    tx: mpsc::Sender<SyncEvent>,
    settings: SessionSettings,
    filter: FilterState,
    cache: ItemCache,
    projections: Projections,
    details: DetailCache,
    prefetch: PrefetchScheduler,
    nav: NavigationController,
    reader: ReaderContent,
    detail_generation: u64,
    tasks: JoinSet<()>,
}

impl<A: ItemAuthority> FeedSession<A> {
    pub fn new(
        authority: A,
        tx: mpsc::Sender<SyncEvent>,
        settings: SessionSettings,
        filter: FilterState,
    ) -> Self {
        let details = DetailCache::new(settings.detail_capacity, settings.detail_fresh_for);
        Self {
            authority,
            tx,
            settings,
            filter,
            cache: ItemCache::new(),
            projections: Projections::new(),
            details,
            prefetch: PrefetchScheduler::new(),
            nav: NavigationController::new(),
            reader: ReaderContent::Hidden,
            detail_generation: 0,
            tasks: JoinSet::new(),
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn filter(&self) -> &FilterState {
        &self.filter
    }

    pub fn cache(&self) -> &ItemCache {
        &self.cache
    }

    pub fn navigation(&self) -> &NavigationController {
        &self.nav
    }

    pub fn reader(&self) -> &ReaderContent {
        &self.reader
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Current views, recomputed only when the cache or filter changed.
    pub fn views(&mut self) -> Arc<ProjectionSet> {
        self.projections.get(&self.cache, &self.filter)
    }

    /// Effective read flag as the cache sees it.
    pub fn is_read(&self, id: &ItemId) -> Option<bool> {
        self.cache.find_item(id).map(|item| item.is_read)
    }

    pub fn item_error(&self, id: &ItemId) -> Option<&str> {
        self.cache.item_error(id)
    }

    pub fn status(&self) -> Option<&FetchStatus> {
        self.cache
            .partition(&self.filter.key())
            .map(|p| p.status())
    }

    pub fn total_count(&self) -> Option<u64> {
        self.cache
            .partition(&self.filter.key())
            .and_then(|p| p.total_count())
    }

    pub fn is_exhausted(&self) -> bool {
        self.cache
            .partition(&self.filter.key())
            .is_some_and(|p| p.is_exhausted())
    }

    fn page_in_flight(&self) -> bool {
        self.cache
            .partition(&self.filter.key())
            .is_some_and(|p| p.is_page_in_flight())
    }

    pub fn prefetch_in_flight(&self) -> usize {
        self.prefetch.in_flight_count()
    }

    pub fn is_warm(&self, id: &ItemId) -> bool {
        self.details.is_warm(id)
    }

    // ========================================================================
    // Fetching
    // ========================================================================

    /// Fetches new items for the active configuration (the first page if it
    /// has never loaded). Returns false if one is already in flight.
    pub fn refresh(&mut self) -> bool {
        let Some(request) =
            self.cache
                .begin_refresh(self.filter.key(), self.settings.page_size, Utc::now())
        else {
            return false;
        };
        self.spawn_fetch(request);
        true
    }

    /// Fetches the next page. Returns false if exhausted or already loading.
    pub fn load_more(&mut self) -> bool {
        let Some(request) =
            self.cache
                .begin_next_page(self.filter.key(), self.settings.page_size, Utc::now())
        else {
            return false;
        };
        self.spawn_fetch(request);
        true
    }

    fn spawn_fetch(&mut self, request: FetchRequest) {
        tracing::debug!(
            kind = ?request.kind,
            offset = request.query.offset,
            since = ?request.query.published_since,
            "Fetching items"
        );
        let authority = self.authority.clone();
        let label = TaskLabel::Fetch(request.clone());
        self.spawn(label, async move {
            let result = authority.list_items(&request.query).await;
            SyncEvent::FetchCompleted { request, result }
        });
    }

    // ========================================================================
    // Filter
    // ========================================================================

    pub fn set_show_read(&mut self, show_read: bool) {
        if self.filter.set_show_read(show_read) {
            self.after_filter_change(true);
        }
    }

    pub fn toggle_show_read(&mut self) {
        let show_read = !self.filter.show_read();
        self.set_show_read(show_read);
    }

    pub fn cycle_date_range(&mut self) {
        self.filter.cycle_date_range();
        self.after_filter_change(true);
    }

    pub fn set_sort(&mut self, sort: SortOrder) {
        if self.filter.set_sort(sort) {
            self.after_filter_change(false);
        }
    }

    pub fn toggle_sort(&mut self) {
        let sort = self.filter.sort().toggled();
        self.set_sort(sort);
    }

    /// Hides `id` locally for the rest of the session. No network call.
    pub fn hide(&mut self, id: ItemId) -> bool {
        let hidden = self.filter.hide(id);
        if hidden {
            self.after_filter_change(false);
        }
        hidden
    }

    /// Restores every hidden item. No network call.
    pub fn unhide_all(&mut self) -> usize {
        let restored = self.filter.clear_hidden();
        if restored > 0 {
            self.after_filter_change(false);
        }
        restored
    }

    /// Applies a persisted view such as `read=1&range=week`.
    pub fn apply_view_query(&mut self, query: &str) -> Result<(), FilterParseError> {
        let before = self.filter.key();
        let revision = self.filter.revision();
        self.filter.apply_query(query)?;
        if self.filter.revision() != revision {
            self.after_filter_change(self.filter.key() != before);
        }
        Ok(())
    }

    fn after_filter_change(&mut self, partition_changed: bool) {
        if partition_changed {
            // Either the first page of a new partition or a watermark
            // refresh of one still cached.
            self.refresh();
        }
        self.recompute_navigation();
    }

    // ========================================================================
    // Read state
    // ========================================================================

    /// Optimistically sets the read flag, then confirms with the server.
    ///
    /// Returns false if nothing changed locally.
    pub fn mark_read(&mut self, ids: &[ItemId], is_read: bool, origin: ReadOrigin) -> bool {
        let Some(mutation) = self.cache.begin_read_mutation(ids, is_read, origin) else {
            return false;
        };
        for id in &mutation.ids {
            self.details.sync_read_flag(id, is_read);
        }

        let authority = self.authority.clone();
        let label = TaskLabel::Mutation(mutation.clone());
        self.spawn(label, async move {
            let result = authority.set_read(&mutation.ids, mutation.is_read).await;
            SyncEvent::MutationSettled { mutation, result }
        });
        true
    }

    /// Flips the read flag of `id` on behalf of the user.
    pub fn toggle_read(&mut self, id: &ItemId) -> bool {
        let Some(current) = self.is_read(id) else {
            return false;
        };
        self.mark_read(std::slice::from_ref(id), !current, ReadOrigin::User)
    }

    // ========================================================================
    // Reader
    // ========================================================================

    /// Opens the reader on `id`.
    pub fn open(&mut self, id: &ItemId) -> ReaderStep {
        let view = self.views();
        if !self.nav.open(id, &view.sequence) {
            tracing::debug!(item_id = %id, "Open requested for item outside the sequence");
            return ReaderStep::new(NavOutcome::Boundary);
        }
        let load = self.show(id.clone());
        ReaderStep {
            outcome: NavOutcome::Moved {
                from: None,
                to: Position::Item(id.clone()),
            },
            load,
        }
    }

    pub fn close(&mut self) -> Option<Position> {
        self.detail_generation += 1;
        self.reader = ReaderContent::Hidden;
        self.nav.close()
    }

    pub fn next(&mut self) -> ReaderStep {
        let view = self.views();
        let exhausted = self.is_exhausted();
        let outcome = self.nav.next(&view.sequence, exhausted);
        self.follow(outcome)
    }

    pub fn prev(&mut self) -> ReaderStep {
        let view = self.views();
        let outcome = self.nav.prev(&view.sequence);
        self.follow(outcome)
    }

    fn follow(&mut self, outcome: NavOutcome) -> ReaderStep {
        match &outcome {
            NavOutcome::Moved { from, to } => {
                if let Some(from) = from {
                    if self.mark_read(std::slice::from_ref(from), true, ReadOrigin::Traversal) {
                        // The item may have left the sequence.
                        self.recompute_navigation();
                    }
                }
                let load = match to {
                    Position::Item(id) => self.show(id.clone()),
                    Position::EndOfList => {
                        self.detail_generation += 1;
                        self.reader = ReaderContent::EndOfList;
                        None
                    }
                };
                ReaderStep { outcome, load }
            }
            NavOutcome::AwaitingPage => {
                if !self.load_more() && !self.page_in_flight() {
                    // Nothing to wait for (partition gone or not yet loaded).
                    self.nav.page_failed();
                    return ReaderStep::new(NavOutcome::Boundary);
                }
                ReaderStep::new(outcome)
            }
            NavOutcome::Boundary | NavOutcome::Inactive => ReaderStep::new(outcome),
        }
    }

    /// Puts `id` in the reader, from the detail cache when fresh.
    fn show(&mut self, id: ItemId) -> Option<AbortHandle> {
        self.detail_generation += 1;
        let generation = self.detail_generation;

        let load = match self.details.get_fresh(&id) {
            Some(Detail::Available(item)) => {
                self.reader = ReaderContent::Ready(item);
                None
            }
            Some(Detail::NotFound) => {
                self.reader = ReaderContent::NotFound(id);
                None
            }
            None if self.prefetch.is_in_flight(&id) => {
                // Already on its way; the prefetch result will fill the reader.
                self.reader = ReaderContent::Loading(id);
                None
            }
            None => {
                self.reader = ReaderContent::Loading(id.clone());
                Some(self.spawn_detail(id, DetailOrigin::Reader { generation }))
            }
        };

        self.schedule_prefetch();
        load
    }

    fn schedule_prefetch(&mut self) {
        let Some(index) = self.nav.current_index() else {
            return;
        };
        let view = self.views();
        let details = &self.details;
        let window = compute_window(index, &view.sequence, self.settings.prefetch_radius, |id| {
            details.is_warm(id)
        });
        let current = self.nav.current().cloned();
        let claimed = self
            .prefetch
            .schedule(window.into_iter().filter(|id| Some(id) != current.as_ref()));

        if !claimed.is_empty() {
            tracing::debug!(count = claimed.len(), "Prefetching neighbors");
        }
        for id in claimed {
            self.spawn_detail(id, DetailOrigin::Prefetch);
        }
    }

    fn spawn_detail(&mut self, id: ItemId, origin: DetailOrigin) -> AbortHandle {
        let authority = self.authority.clone();
        let label = TaskLabel::Detail {
            id: id.clone(),
            origin,
        };
        self.spawn(label, async move {
            let result = authority.get_item(&id).await;
            SyncEvent::DetailLoaded { id, origin, result }
        })
    }

    fn recompute_navigation(&mut self) {
        if self.nav.is_open() {
            let view = self.views();
            self.nav.recompute(&view.sequence);
        }
    }

    // ========================================================================
    // Events
    // ========================================================================

    /// Applies one background result.
    pub fn handle_event(&mut self, event: SyncEvent) -> EventReport {
        self.reap_tasks();
        let mut report = EventReport::default();

        match event {
            SyncEvent::FetchCompleted { request, result } => match result {
                Ok(page) => self.fetch_succeeded(&request, page, &mut report),
                Err(e) => report.notice = self.fetch_failed(&request, &e.to_string()),
            },
            SyncEvent::MutationSettled { mutation, result } => match result {
                Ok(()) => self.cache.confirm_mutation(&mutation),
                Err(e) => report.notice = self.mutation_failed(&mutation, &e.to_string()),
            },
            SyncEvent::DetailLoaded { id, origin, result } => {
                let result = result.map_err(|e| e.to_string());
                report.load = self.detail_loaded(id, origin, result);
            }
            SyncEvent::TaskPanicked { task, error } => {
                tracing::error!(task = task.name(), error = %error, "Background task panicked");
                let message = format!("internal error: {}", error);
                match task {
                    TaskLabel::Fetch(request) => {
                        self.fetch_failed(&request, &message);
                    }
                    TaskLabel::Mutation(mutation) => {
                        self.mutation_failed(&mutation, &message);
                    }
                    TaskLabel::Detail { id, origin } => {
                        report.load = self.detail_loaded(id, origin, Err(message));
                    }
                }
                report.notice = Some(Notice::Error(format!(
                    "Background task failed: {}",
                    first_line(&error)
                )));
            }
        }

        self.recompute_navigation();
        report
    }

    fn fetch_succeeded(&mut self, request: &FetchRequest, page: ListPage, report: &mut EventReport) {
        let Some(mut merge) = self.cache.apply_fetch(request, page) else {
            return;
        };
        if let Some(follow_up) = merge.follow_up.take() {
            self.spawn_fetch(follow_up);
        }
        if request.key != self.filter.key() || request.kind == FetchKind::Refresh {
            return;
        }
        let view = self.views();
        if let Some(outcome) = self.nav.page_resolved(&view.sequence, merge.exhausted) {
            report.step = Some(self.follow(outcome));
        }
    }

    fn fetch_failed(&mut self, request: &FetchRequest, message: &str) -> Option<Notice> {
        self.cache.fail_fetch(request, message);
        if request.key != self.filter.key() {
            return None;
        }
        // Partition failures stay visible through `status()`; only a reader
        // left waiting on a page gets a transient notice.
        if request.kind != FetchKind::Refresh && self.nav.page_failed() {
            return Some(Notice::Error(format!("Couldn't load more items: {}", message)));
        }
        None
    }

    fn mutation_failed(&mut self, mutation: &ReadMutation, message: &str) -> Option<Notice> {
        let failure = self.cache.rollback_mutation(mutation, message);
        for id in &mutation.ids {
            if let Some(is_read) = self.is_read(id) {
                self.details.sync_read_flag(id, is_read);
            }
        }
        failure.map(|f| {
            let what = if mutation.is_read { "read" } else { "unread" };
            let noun = if f.ids.len() == 1 { "item" } else { "items" };
            Notice::Error(format!(
                "Couldn't mark {} {} as {}: {}",
                f.ids.len(),
                noun,
                what,
                f.message
            ))
        })
    }

    fn detail_loaded(
        &mut self,
        id: ItemId,
        origin: DetailOrigin,
        result: Result<Option<Item>, String>,
    ) -> Option<AbortHandle> {
        if origin == DetailOrigin::Prefetch {
            self.prefetch.complete(&id);
        }
        let waiting = matches!(&self.reader, ReaderContent::Loading(w) if *w == id);
        let current = match origin {
            DetailOrigin::Reader { generation } => generation == self.detail_generation,
            DetailOrigin::Prefetch => true,
        };

        match result {
            Ok(found) => {
                self.details.insert(id.clone(), found.clone());
                if let Some(is_read) = self.is_read(&id) {
                    self.details.sync_read_flag(&id, is_read);
                }
                if waiting && current {
                    self.reader = match self.details.get_fresh(&id) {
                        Some(Detail::Available(item)) => ReaderContent::Ready(item),
                        _ => match found {
                            Some(item) => ReaderContent::Ready(item),
                            None => ReaderContent::NotFound(id),
                        },
                    };
                } else if !current {
                    tracing::debug!(item_id = %id, "Stale item body cached but not shown");
                }
                None
            }
            Err(error) => {
                tracing::debug!(item_id = %id, ?origin, error = %error, "Item body fetch failed");
                if !waiting || !current {
                    return None;
                }
                match origin {
                    DetailOrigin::Prefetch => {
                        // The reader was riding on this prefetch. Ask directly.
                        let generation = self.detail_generation;
                        Some(self.spawn_detail(id, DetailOrigin::Reader { generation }))
                    }
                    DetailOrigin::Reader { .. } => {
                        self.reader = ReaderContent::Failed { id, error };
                        None
                    }
                }
            }
        }
    }

    // ========================================================================
    // Tasks
    // ========================================================================

    fn spawn<F>(&mut self, label: TaskLabel, work: F) -> AbortHandle
    where
        F: Future<Output = SyncEvent> + Send + 'static,
    {
        let tx = self.tx.clone();
        self.tasks.spawn(async move {
            let task = label.name();
            let event = match catch_task_panic(work).await {
                Ok(event) => event,
                Err(error) => SyncEvent::TaskPanicked { task: label, error },
            };
            if tx.send(event).await.is_err() {
                tracing::debug!(task, "Session gone; dropping task result");
            }
        })
    }

    fn reap_tasks(&mut self) {
        while self.tasks.try_join_next().is_some() {}
    }

    /// Background tasks still running.
    pub fn tasks_in_flight(&self) -> usize {
        self.tasks.len()
    }
}

fn first_line(error: &str) -> &str {
    error.lines().next().unwrap_or(error)
}
