use crate::focus::{FocusKey, FocusTrap, TrapOutcome};
use crate::gesture::{GestureRecognizer, Swipe};
use crate::keybindings::KeybindingRegistry;
use crate::navigation::{NavOutcome, Position};
use crate::remote::{ItemAuthority, ItemId};
use crate::session::{EventReport, FeedSession, Notice, ReaderContent, ReaderStep, SyncEvent};
use ratatui::layout::Rect;
use std::borrow::Cow;
use std::time::Duration;
use tokio::time::Instant;

/// Maximum scroll offset for the reader view (ratatui u16 limit).
pub const MAX_SCROLL: usize = u16::MAX as usize;

/// How long a transient status message stays up.
pub const STATUS_TTL: Duration = Duration::from_secs(3);

// ============================================================================
// View and Control Enums
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    List,
    /// Reader modal over the list.
    Reader,
}

/// Focusable buttons in the reader, in tab order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderControl {
    Prev,
    Next,
    ToggleRead,
    Close,
}

impl ReaderControl {
    pub const ALL: [ReaderControl; 4] = [Self::Prev, Self::Next, Self::ToggleRead, Self::Close];
}

/// Screen regions from the last frame, for mouse hit testing.
#[derive(Debug, Clone, Default)]
pub struct HitAreas {
    pub list: Rect,
    pub list_offset: usize,
    pub reader: Option<Rect>,
    pub controls: Vec<(ReaderControl, Rect)>,
}

impl HitAreas {
    pub fn control_at(&self, column: u16, row: u16) -> Option<ReaderControl> {
        self.controls
            .iter()
            .find(|(_, r)| contains(*r, column, row))
            .map(|(c, _)| *c)
    }

    pub fn in_reader(&self, column: u16, row: u16) -> bool {
        self.reader.is_some_and(|r| contains(r, column, row))
    }

    /// Index into the sequence of the list row at `row`.
    pub fn list_row(&self, column: u16, row: u16) -> Option<usize> {
        // One border line on each side.
        let inner = Rect::new(
            self.list.x.saturating_add(1),
            self.list.y.saturating_add(1),
            self.list.width.saturating_sub(2),
            self.list.height.saturating_sub(2),
        );
        contains(inner, column, row).then(|| self.list_offset + (row - inner.y) as usize)
    }
}

fn contains(r: Rect, column: u16, row: u16) -> bool {
    column >= r.x && column < r.x.saturating_add(r.width) && row >= r.y && row < r.y.saturating_add(r.height)
}

// ============================================================================
// Application State
// ============================================================================

/// Central application state: the sync session plus everything the terminal
/// surface needs on top of it.
pub struct App<A: ItemAuthority> {
    pub session: FeedSession<A>,
    pub keybindings: KeybindingRegistry,

    pub view: View,
    /// Selected row in the ordered sequence.
    pub selected: usize,
    /// Reader scroll offset in lines.
    pub scroll_offset: usize,
    /// Reader viewport height from the last frame (without borders).
    pub reader_visible_lines: usize,

    pub status_message: Option<(Cow<'static, str>, Instant)>,

    /// Skip frames when nothing changed.
    pub needs_redraw: bool,

    pub gesture: GestureRecognizer,
    pub focus: FocusTrap<ReaderControl>,
    pub hit_areas: HitAreas,

    /// Loading spinner frame (0-9).
    pub spinner_frame: usize,
}

impl<A: ItemAuthority> App<A> {
    pub fn new(
        session: FeedSession<A>,
        keybindings: KeybindingRegistry,
        swipe_threshold: f32,
        backdrop_close: bool,
    ) -> Self {
        Self {
            session,
            keybindings,
            view: View::List,
            selected: 0,
            scroll_offset: 0,
            reader_visible_lines: 0,
            status_message: None,
            needs_redraw: true,
            gesture: GestureRecognizer::new(swipe_threshold),
            focus: FocusTrap::new(ReaderControl::ALL.to_vec(), backdrop_close),
            hit_areas: HitAreas::default(),
            spinner_frame: 0,
        }
    }

    // ========================================================================
    // List
    // ========================================================================

    pub fn selected_id(&mut self) -> Option<ItemId> {
        self.session.views().sequence.get(self.selected).cloned()
    }

    pub fn clamp_selection(&mut self) {
        let len = self.session.views().sequence.len();
        self.selected = self.selected.min(len.saturating_sub(1));
    }

    pub fn nav_up(&mut self) {
        self.selected = self.selected.saturating_sub(1);
    }

    /// Moves down; past the last row asks for the next page.
    pub fn nav_down(&mut self) {
        let len = self.session.views().sequence.len();
        if self.selected + 1 < len {
            self.selected += 1;
        } else if self.session.load_more() {
            self.set_status("Loading more…");
        }
    }

    pub fn select_id(&mut self, id: &ItemId) {
        if let Some(index) = self.session.views().position(id) {
            self.selected = index;
        }
    }

    pub fn toggle_read_selected(&mut self) {
        if let Some(id) = self.selected_id() {
            self.session.toggle_read(&id);
        }
    }

    pub fn hide_selected(&mut self) {
        if let Some(id) = self.selected_id() {
            if self.session.hide(id) {
                self.set_status("Hidden for this session (X to restore)");
            }
            self.clamp_selection();
        }
    }

    pub fn unhide_all(&mut self) {
        let restored = self.session.unhide_all();
        if restored > 0 {
            self.set_status(format!("Restored {} hidden item(s)", restored));
        }
    }

    /// Runs after any filter change: the sequence may be a different list.
    pub fn after_filter_change(&mut self) {
        self.selected = 0;
        let f = self.session.filter();
        let message = format!(
            "{} · {} · {}",
            if f.show_read() { "all items" } else { "unread" },
            f.date_range(),
            f.sort().as_str()
        );
        self.set_status(message);
    }

    // ========================================================================
    // Reader
    // ========================================================================

    pub fn open_selected(&mut self) {
        let Some(id) = self.selected_id() else {
            return;
        };
        let step = self.session.open(&id);
        if !step.changed_content() {
            return;
        }
        self.view = View::Reader;
        self.focus.on_open();
        self.apply_step(step);
    }

    pub fn reader_next(&mut self) {
        let step = self.session.next();
        self.apply_step(step);
    }

    pub fn reader_prev(&mut self) {
        let step = self.session.prev();
        self.apply_step(step);
    }

    pub fn close_reader(&mut self) {
        let position = self.session.close();
        self.focus.on_close();
        self.gesture.cancel();
        self.view = View::List;
        self.scroll_offset = 0;
        self.hit_areas.reader = None;
        self.hit_areas.controls.clear();
        match position {
            Some(Position::Item(id)) => self.select_id(&id),
            Some(Position::EndOfList) => {
                let len = self.session.views().sequence.len();
                self.selected = len.saturating_sub(1);
            }
            None => {}
        }
        self.clamp_selection();
    }

    /// The item the reader is on, if any.
    pub fn reader_item(&self) -> Option<ItemId> {
        self.session.navigation().current().cloned()
    }

    pub fn toggle_read_current(&mut self) {
        if let Some(id) = self.reader_item() {
            self.session.toggle_read(&id);
        }
    }

    pub fn activate(&mut self, control: ReaderControl) {
        match control {
            ReaderControl::Prev => self.reader_prev(),
            ReaderControl::Next => self.reader_next(),
            ReaderControl::ToggleRead => self.toggle_read_current(),
            ReaderControl::Close => self.close_reader(),
        }
    }

    pub fn activate_focused(&mut self) {
        if let Some(control) = self.focus.focused_control().copied() {
            self.activate(control);
        }
    }

    /// Tab, Shift+Tab or Esc inside the reader.
    pub fn focus_key(&mut self, key: FocusKey) {
        if self.focus.handle_key(key) == TrapOutcome::Close {
            self.close_reader();
        }
    }

    pub fn handle_swipe(&mut self, swipe: Swipe) {
        match swipe {
            Swipe::Left => self.reader_next(),
            Swipe::Right => self.reader_prev(),
        }
    }

    /// Applies a reader move: new content resets scroll and focus, and the
    /// body load (if any) is cancelled when the content changes again.
    fn apply_step(&mut self, step: ReaderStep) {
        if step.changed_content() {
            self.focus.on_content_changed();
            self.scroll_offset = 0;
            if let Some(id) = self.reader_item() {
                self.select_id(&id);
            }
        }
        if step.outcome == NavOutcome::AwaitingPage {
            self.set_status("Loading more…");
        }
        if let Some(load) = step.load {
            self.focus.register_cleanup(move || load.abort());
        }
    }

    pub fn is_loading_reader(&self) -> bool {
        matches!(self.session.reader(), ReaderContent::Loading(_))
    }

    pub fn scroll_up(&mut self, lines: usize) {
        self.scroll_offset = self.scroll_offset.saturating_sub(lines);
    }

    pub fn scroll_down(&mut self, lines: usize) {
        self.scroll_offset = self.scroll_offset.saturating_add(lines).min(MAX_SCROLL);
    }

    pub fn clamp_scroll(&mut self, content_lines: usize) {
        let max_scroll = content_lines.saturating_sub(self.reader_visible_lines);
        self.scroll_offset = self.scroll_offset.min(max_scroll).min(MAX_SCROLL);
    }

    // ========================================================================
    // Background events
    // ========================================================================

    pub fn handle_sync_event(&mut self, event: SyncEvent) {
        let EventReport { step, load, notice } = self.session.handle_event(event);
        if let Some(step) = step {
            self.apply_step(step);
        }
        if let Some(load) = load {
            self.focus.register_cleanup(move || load.abort());
        }
        match notice {
            Some(Notice::Info(msg)) => self.set_status(msg),
            Some(Notice::Error(msg)) => {
                tracing::warn!(message = %msg, "Background operation failed");
                self.set_status(msg);
            }
            None => {}
        }
        if self.view == View::List {
            self.clamp_selection();
        }
    }

    // ========================================================================
    // Status
    // ========================================================================

    pub fn set_status(&mut self, msg: impl Into<Cow<'static, str>>) {
        self.status_message = Some((msg.into(), Instant::now()));
    }

    /// Returns true if a message was actually cleared.
    pub fn clear_expired_status(&mut self) -> bool {
        if let Some((_, time)) = &self.status_message {
            if time.elapsed() >= STATUS_TTL {
                self.status_message = None;
                return true;
            }
        }
        false
    }
}
