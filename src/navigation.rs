//! Sequential navigation through the ordered item sequence.
//!
//! The controller only decides where to go. Marking items read, fetching
//! pages and loading bodies are left to the caller, driven by the returned
//! [`NavOutcome`].
//!
//! `next` may page forward; `prev` never pages backward. The end-of-list
//! sentinel is entered only once the server has confirmed there is nothing
//! further.

use crate::remote::ItemId;

/// Where the reader is pointing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Position {
    Item(ItemId),
    EndOfList,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavState {
    Closed,
    Viewing {
        id: ItemId,
        /// Position of `id`, or the slot it occupied if it left the sequence.
        index: usize,
        in_sequence: bool,
        prev: Option<ItemId>,
        next: Option<ItemId>,
    },
    EndOfList {
        /// Last item before the sentinel, if any.
        after: Option<ItemId>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavOutcome {
    /// Moved synchronously. `from` is the item left behind, if any.
    Moved { from: Option<ItemId>, to: Position },
    /// No successor yet. The caller should fetch the next page and report
    /// back through [`NavigationController::page_resolved`].
    AwaitingPage,
    /// A true boundary: nothing to do.
    Boundary,
    /// The reader is closed.
    Inactive,
}

#[derive(Debug)]
pub struct NavigationController {
    state: NavState,
    awaiting_page: bool,
}

impl Default for NavigationController {
    fn default() -> Self {
        Self::new()
    }
}

impl NavigationController {
    pub fn new() -> Self {
        Self {
            state: NavState::Closed,
            awaiting_page: false,
        }
    }

    pub fn state(&self) -> &NavState {
        &self.state
    }

    pub fn is_open(&self) -> bool {
        !matches!(self.state, NavState::Closed)
    }

    pub fn is_awaiting_page(&self) -> bool {
        self.awaiting_page
    }

    pub fn position(&self) -> Option<Position> {
        match &self.state {
            NavState::Closed => None,
            NavState::Viewing { id, .. } => Some(Position::Item(id.clone())),
            NavState::EndOfList { .. } => Some(Position::EndOfList),
        }
    }

    pub fn current(&self) -> Option<&ItemId> {
        match &self.state {
            NavState::Viewing { id, .. } => Some(id),
            _ => None,
        }
    }

    /// Index of the current item (or its former slot) in the sequence.
    pub fn current_index(&self) -> Option<usize> {
        match &self.state {
            NavState::Viewing { index, .. } => Some(*index),
            _ => None,
        }
    }

    pub fn prev_id(&self) -> Option<&ItemId> {
        match &self.state {
            NavState::Viewing { prev, .. } => prev.as_ref(),
            _ => None,
        }
    }

    pub fn next_id(&self) -> Option<&ItemId> {
        match &self.state {
            NavState::Viewing { next, .. } => next.as_ref(),
            _ => None,
        }
    }

    /// Opens the reader on `id`. Returns false (and stays as before) if `id`
    /// is not in `sequence`.
    pub fn open(&mut self, id: &ItemId, sequence: &[ItemId]) -> bool {
        let Some(index) = sequence.iter().position(|s| s == id) else {
            return false;
        };
        self.awaiting_page = false;
        self.state = viewing_at(sequence, index);
        true
    }

    /// Releases navigation from any state. Returns where the reader was.
    pub fn close(&mut self) -> Option<Position> {
        let previous = self.position();
        self.state = NavState::Closed;
        self.awaiting_page = false;
        previous
    }

    /// Steps forward.
    ///
    /// `exhausted` is whether the server has confirmed there are no further
    /// pages for the current configuration.
    pub fn next(&mut self, sequence: &[ItemId], exhausted: bool) -> NavOutcome {
        self.recompute(sequence);
        match &self.state {
            NavState::Closed => NavOutcome::Inactive,
            NavState::Viewing {
                id,
                index,
                in_sequence,
                next,
                ..
            } => {
                let from = id.clone();
                if next.is_some() {
                    let target = if *in_sequence { index + 1 } else { *index };
                    return self.move_to(sequence, target, Some(from));
                }
                if exhausted {
                    self.awaiting_page = false;
                    self.state = NavState::EndOfList {
                        after: sequence.last().cloned().or_else(|| Some(from.clone())),
                    };
                    return NavOutcome::Moved {
                        from: Some(from),
                        to: Position::EndOfList,
                    };
                }
                self.awaiting_page = true;
                NavOutcome::AwaitingPage
            }
            NavState::EndOfList { after } => {
                // Items may have arrived since the sentinel was entered
                // (e.g. a background refresh). Never fetches from here.
                let target = match after {
                    Some(after) => sequence.iter().position(|s| s == after).map(|i| i + 1),
                    None => Some(0),
                };
                match target {
                    Some(t) if t < sequence.len() => self.move_to(sequence, t, None),
                    _ => NavOutcome::Boundary,
                }
            }
        }
    }

    /// Steps backward. Never fetches; the first item is a true boundary.
    pub fn prev(&mut self, sequence: &[ItemId]) -> NavOutcome {
        self.recompute(sequence);
        match &self.state {
            NavState::Closed => NavOutcome::Inactive,
            NavState::Viewing { id, index, prev, .. } => {
                if prev.is_none() {
                    return NavOutcome::Boundary;
                }
                let from = id.clone();
                let target = index - 1;
                self.awaiting_page = false;
                self.move_to(sequence, target, Some(from))
            }
            NavState::EndOfList { .. } => {
                if sequence.is_empty() {
                    return NavOutcome::Boundary;
                }
                self.move_to(sequence, sequence.len() - 1, None)
            }
        }
    }

    /// The page requested after [`NavOutcome::AwaitingPage`] has been merged.
    ///
    /// Returns `None` if no page was awaited (or the reader moved since).
    pub fn page_resolved(&mut self, sequence: &[ItemId], exhausted: bool) -> Option<NavOutcome> {
        if !self.awaiting_page {
            return None;
        }
        self.awaiting_page = false;
        if !matches!(self.state, NavState::Viewing { .. }) {
            return None;
        }
        Some(self.next(sequence, exhausted))
    }

    /// The awaited page fetch failed. The reader stays where it is.
    pub fn page_failed(&mut self) -> bool {
        std::mem::replace(&mut self.awaiting_page, false)
    }

    /// Recomputes neighbors after the sequence changed.
    ///
    /// If the current item left the sequence, its former slot is kept: the
    /// item now at that slot becomes `next`, the one before it `prev`.
    pub fn recompute(&mut self, sequence: &[ItemId]) {
        let NavState::Viewing { id, index, .. } = &self.state else {
            return;
        };

        let found = if sequence.get(*index) == Some(id) {
            Some(*index)
        } else {
            sequence.iter().position(|s| s == id)
        };

        self.state = match found {
            Some(i) => viewing_at(sequence, i),
            None => {
                let slot = (*index).min(sequence.len());
                NavState::Viewing {
                    id: id.clone(),
                    index: slot,
                    in_sequence: false,
                    prev: slot.checked_sub(1).and_then(|p| sequence.get(p)).cloned(),
                    next: sequence.get(slot).cloned(),
                }
            }
        };
    }

    fn move_to(&mut self, sequence: &[ItemId], index: usize, from: Option<ItemId>) -> NavOutcome {
        self.state = viewing_at(sequence, index);
        match &self.state {
            NavState::Viewing { id, .. } => NavOutcome::Moved {
                from,
                to: Position::Item(id.clone()),
            },
            _ => NavOutcome::Boundary,
        }
    }
}

fn viewing_at(sequence: &[ItemId], index: usize) -> NavState {
    match sequence.get(index) {
        Some(id) => NavState::Viewing {
            id: id.clone(),
            index,
            in_sequence: true,
            prev: index.checked_sub(1).and_then(|p| sequence.get(p)).cloned(),
            next: sequence.get(index + 1).cloned(),
        },
        None => NavState::EndOfList {
            after: sequence.last().cloned(),
        },
    }
}
