//! Horizontal swipe detection for the reader.
//!
//! Pointer input (touch, or a mouse drag in the terminal) is reduced to one
//! signed horizontal displacement. A swipe is reported on release when the
//! displacement exceeds the threshold; vertical movement past the dead zone
//! cancels the gesture so scrolling never turns the page.

/// Minimum horizontal travel for a swipe. Callers may only raise it.
pub const DEFAULT_SWIPE_THRESHOLD: f32 = 50.0;

/// Vertical travel tolerated before a dominant vertical move cancels.
pub const DEAD_ZONE: f32 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Swipe {
    /// Finger moved left: advance.
    Left,
    /// Finger moved right: go back.
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Session {
    pointer: u64,
    start_x: f32,
    start_y: f32,
    dx: f32,
    cancelled: bool,
}

#[derive(Debug, Clone)]
pub struct GestureRecognizer {
    threshold: f32,
    session: Option<Session>,
}

impl Default for GestureRecognizer {
    fn default() -> Self {
        Self::new(DEFAULT_SWIPE_THRESHOLD)
    }
}

impl GestureRecognizer {
    /// `threshold` below [`DEFAULT_SWIPE_THRESHOLD`] is raised to it.
    pub fn new(threshold: f32) -> Self {
        let threshold = if threshold.is_finite() {
            threshold.max(DEFAULT_SWIPE_THRESHOLD)
        } else {
            DEFAULT_SWIPE_THRESHOLD
        };
        Self {
            threshold,
            session: None,
        }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Live horizontal displacement, 0 when idle or cancelled.
    pub fn displacement(&self) -> f32 {
        match self.session {
            Some(s) if !s.cancelled => s.dx,
            _ => 0.0,
        }
    }

    pub fn is_tracking(&self) -> bool {
        self.session.is_some_and(|s| !s.cancelled)
    }

    /// Starts tracking `pointer`. Ignored while another pointer is down.
    pub fn pointer_down(&mut self, pointer: u64, x: f32, y: f32) {
        if self.session.is_some() {
            return;
        }
        self.session = Some(Session {
            pointer,
            start_x: x,
            start_y: y,
            dx: 0.0,
            cancelled: false,
        });
    }

    pub fn pointer_move(&mut self, pointer: u64, x: f32, y: f32) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.pointer != pointer || session.cancelled {
            return;
        }

        let dx = x - session.start_x;
        let dy = y - session.start_y;
        if dy.abs() > DEAD_ZONE && dy.abs() > dx.abs() {
            tracing::trace!(dx, dy, "Vertical movement cancelled swipe");
            session.cancelled = true;
            session.dx = 0.0;
            return;
        }
        session.dx = dx;
    }

    /// Ends the gesture. Returns the swipe, if one happened.
    ///
    /// Displacement is always back at 0 afterwards.
    pub fn pointer_up(&mut self, pointer: u64, x: f32, y: f32) -> Option<Swipe> {
        if self.session.is_some_and(|s| s.pointer != pointer) {
            return None;
        }
        self.pointer_move(pointer, x, y);
        let session = self.session.take()?;
        if session.cancelled || session.dx.abs() <= self.threshold {
            return None;
        }
        Some(if session.dx < 0.0 {
            Swipe::Left
        } else {
            Swipe::Right
        })
    }

    /// Abandons the gesture (pointer left the surface, modal closed).
    pub fn cancel(&mut self) {
        self.session = None;
    }
}
