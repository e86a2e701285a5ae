//! Keyboard focus containment for the reader modal.
//!
//! Lifecycle is explicit: [`FocusTrap::on_open`], [`FocusTrap::on_content_changed`],
//! [`FocusTrap::after_paint`] and [`FocusTrap::on_close`]. Cleanup callbacks
//! registered for the current content run on every content change and on
//! close, so work tied to a displayed item (a body still loading, say) never
//! outlives it.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusTarget {
    /// The modal itself.
    Container,
    /// Index into the trap's controls.
    Control(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusKey {
    Tab,
    BackTab,
    Escape,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrapOutcome {
    Moved(FocusTarget),
    /// The modal should close.
    Close,
    Ignored,
}

type Cleanup = Box<dyn FnOnce() + Send>;

pub struct FocusTrap<C> {
    controls: Vec<C>,
    focused: FocusTarget,
    backdrop_close: bool,
    open: bool,
    restore_pending: bool,
    cleanups: Vec<Cleanup>,
}

impl<C: fmt::Debug> fmt::Debug for FocusTrap<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FocusTrap")
            .field("controls", &self.controls)
            .field("focused", &self.focused)
            .field("open", &self.open)
            .field("restore_pending", &self.restore_pending)
            .field("cleanups", &self.cleanups.len())
            .finish()
    }
}

impl<C: PartialEq> FocusTrap<C> {
    /// `controls` in tab order. With `backdrop_close` off, Esc does nothing.
    pub fn new(controls: Vec<C>, backdrop_close: bool) -> Self {
        Self {
            controls,
            focused: FocusTarget::Container,
            backdrop_close,
            open: false,
            restore_pending: false,
            cleanups: Vec::new(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn focused(&self) -> FocusTarget {
        self.focused
    }

    pub fn focused_control(&self) -> Option<&C> {
        match self.focused {
            FocusTarget::Container => None,
            FocusTarget::Control(i) => self.controls.get(i),
        }
    }

    pub fn controls(&self) -> &[C] {
        &self.controls
    }

    pub fn on_open(&mut self) {
        self.open = true;
        self.focused = FocusTarget::Container;
        self.restore_pending = false;
    }

    /// New content is about to be shown. Focus returns to the container
    /// once it has painted.
    pub fn on_content_changed(&mut self) {
        self.run_cleanups();
        self.restore_pending = true;
    }

    /// Call after every frame. Returns true if focus was restored.
    pub fn after_paint(&mut self) -> bool {
        if !self.open || !self.restore_pending {
            return false;
        }
        self.restore_pending = false;
        self.focused = FocusTarget::Container;
        true
    }

    pub fn on_close(&mut self) {
        self.run_cleanups();
        self.open = false;
        self.restore_pending = false;
        self.focused = FocusTarget::Container;
    }

    /// Runs `cleanup` on the next content change or close.
    pub fn register_cleanup(&mut self, cleanup: impl FnOnce() + Send + 'static) {
        self.cleanups.push(Box::new(cleanup));
    }

    /// Moves focus directly to `control` (e.g. after a click).
    pub fn focus(&mut self, control: &C) -> bool {
        match self.controls.iter().position(|c| c == control) {
            Some(i) if self.open => {
                self.focused = FocusTarget::Control(i);
                true
            }
            _ => false,
        }
    }

    pub fn handle_key(&mut self, key: FocusKey) -> TrapOutcome {
        if !self.open {
            return TrapOutcome::Ignored;
        }
        let count = self.controls.len();
        match key {
            FocusKey::Escape => {
                if self.backdrop_close {
                    TrapOutcome::Close
                } else {
                    TrapOutcome::Ignored
                }
            }
            _ if count == 0 => TrapOutcome::Moved(FocusTarget::Container),
            FocusKey::Tab => {
                self.focused = match self.focused {
                    FocusTarget::Container => FocusTarget::Control(0),
                    FocusTarget::Control(i) => FocusTarget::Control((i + 1) % count),
                };
                TrapOutcome::Moved(self.focused)
            }
            FocusKey::BackTab => {
                self.focused = match self.focused {
                    FocusTarget::Container | FocusTarget::Control(0) => {
                        FocusTarget::Control(count - 1)
                    }
                    FocusTarget::Control(i) => FocusTarget::Control(i - 1),
                };
                TrapOutcome::Moved(self.focused)
            }
        }
    }

    fn run_cleanups(&mut self) {
        for cleanup in self.cleanups.drain(..) {
            cleanup();
        }
    }
}

impl<C> Drop for FocusTrap<C> {
    fn drop(&mut self) {
        for cleanup in self.cleanups.drain(..) {
            cleanup();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn trap(backdrop_close: bool) -> FocusTrap<&'static str> {
        let mut trap = FocusTrap::new(vec!["A", "B", "C"], backdrop_close);
        trap.on_open();
        trap
    }

    #[test]
    fn test_tab_wraps_forward() {
        let mut trap = trap(true);
        let mut seen = Vec::new();
        for _ in 0..4 {
            trap.handle_key(FocusKey::Tab);
            seen.push(*trap.focused_control().unwrap());
        }
        assert_eq!(seen, vec!["A", "B", "C", "A"]);
    }

    #[test]
    fn test_back_tab_wraps_from_container_and_first() {
        let mut trap = trap(true);
        trap.handle_key(FocusKey::BackTab);
        assert_eq!(trap.focused_control(), Some(&"C"));

        trap.handle_key(FocusKey::Tab);
        assert_eq!(trap.focused_control(), Some(&"A"));
        trap.handle_key(FocusKey::BackTab);
        assert_eq!(trap.focused_control(), Some(&"C"));
    }

    #[test]
    fn test_escape_respects_backdrop_close() {
        assert_eq!(trap(true).handle_key(FocusKey::Escape), TrapOutcome::Close);
        assert_eq!(trap(false).handle_key(FocusKey::Escape), TrapOutcome::Ignored);
    }

    #[test]
    fn test_focus_restored_after_paint() {
        let mut trap = trap(true);
        trap.handle_key(FocusKey::Tab);
        trap.handle_key(FocusKey::Tab);

        trap.on_content_changed();
        // Not yet painted: focus stays put.
        assert_eq!(trap.focused(), FocusTarget::Control(1));
        assert!(trap.after_paint());
        assert_eq!(trap.focused(), FocusTarget::Container);
        assert!(!trap.after_paint());
    }

    #[test]
    fn test_cleanups_run_on_content_change_and_close() {
        let runs = Arc::new(AtomicUsize::new(0));
        let mut trap = trap(true);

        let r = Arc::clone(&runs);
        trap.register_cleanup(move || {
            r.fetch_add(1, Ordering::SeqCst);
        });
        trap.on_content_changed();
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        let r = Arc::clone(&runs);
        trap.register_cleanup(move || {
            r.fetch_add(1, Ordering::SeqCst);
        });
        trap.on_close();
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        // Already drained.
        trap.on_close();
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_closed_trap_ignores_keys() {
        let mut trap: FocusTrap<&str> = FocusTrap::new(vec!["A"], true);
        assert_eq!(trap.handle_key(FocusKey::Tab), TrapOutcome::Ignored);
        assert!(!trap.focus(&"A"));
    }

    #[test]
    fn test_click_focuses_control() {
        let mut trap = trap(true);
        assert!(trap.focus(&"B"));
        assert_eq!(trap.focused(), FocusTarget::Control(1));
        trap.handle_key(FocusKey::Tab);
        assert_eq!(trap.focused_control(), Some(&"C"));
    }
}
