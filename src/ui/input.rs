//! Input handling for the TUI.
//!
//! Keys go through the keybinding registry for the active view. Mouse input
//! drives list selection, reader buttons, the backdrop and swipe gestures.

use crate::app::{App, View};
use crate::focus::FocusKey;
use crate::keybindings::{Action as KbAction, Context as KbContext};
use crate::remote::ItemAuthority;
use crossterm::event::{KeyCode, KeyModifiers, MouseButton, MouseEvent, MouseEventKind};

use super::Action;

/// Terminal cells are reported as coordinates; scale them to approximate
/// pixels so the swipe threshold means the same thing as on a touch screen.
const CELL_WIDTH: f32 = 8.0;
const CELL_HEIGHT: f32 = 16.0;

/// The mouse is the only pointer a terminal has.
const MOUSE_POINTER: u64 = 0;

const WHEEL_LINES: usize = 3;

/// Main key dispatch.
pub(super) fn handle_key<A: ItemAuthority>(
    app: &mut App<A>,
    code: KeyCode,
    modifiers: KeyModifiers,
) -> Action {
    let context = match app.view {
        View::List => KbContext::List,
        View::Reader => KbContext::Reader,
    };
    let Some(action) = app.keybindings.action_for_key(code, modifiers, context) else {
        return Action::Continue;
    };
    tracing::trace!(?action, ?context, "Key action");

    match action {
        KbAction::Quit => return Action::Quit,
        KbAction::Refresh => {
            if app.session.refresh() {
                app.set_status("Refreshing…");
            }
        }
        _ => match app.view {
            View::List => handle_list_action(app, action),
            View::Reader => handle_reader_action(app, action, code),
        },
    }
    Action::Continue
}

fn handle_list_action<A: ItemAuthority>(app: &mut App<A>, action: KbAction) {
    match action {
        KbAction::NavDown => app.nav_down(),
        KbAction::NavUp => app.nav_up(),
        KbAction::Open => app.open_selected(),
        KbAction::ToggleRead => app.toggle_read_selected(),
        KbAction::HideItem => app.hide_selected(),
        KbAction::UnhideAll => app.unhide_all(),
        KbAction::LoadMore => {
            if app.session.load_more() {
                app.set_status("Loading more…");
            } else if app.session.is_exhausted() {
                app.set_status("No more items");
            }
        }
        KbAction::ToggleShowRead => {
            app.session.toggle_show_read();
            app.after_filter_change();
        }
        KbAction::CycleDateRange => {
            app.session.cycle_date_range();
            app.after_filter_change();
        }
        KbAction::CycleSort => {
            app.session.toggle_sort();
            app.after_filter_change();
        }
        _ => {}
    }
}

fn handle_reader_action<A: ItemAuthority>(app: &mut App<A>, action: KbAction, code: KeyCode) {
    match action {
        KbAction::ReaderNext => app.reader_next(),
        KbAction::ReaderPrev => app.reader_prev(),
        // Esc is the backdrop key and honors `backdrop_close`; others always close.
        KbAction::ReaderClose if code == KeyCode::Esc => app.focus_key(FocusKey::Escape),
        KbAction::ReaderClose => app.close_reader(),
        KbAction::ScrollDown => app.scroll_down(1),
        KbAction::ScrollUp => app.scroll_up(1),
        KbAction::ToggleRead => app.toggle_read_current(),
        KbAction::FocusNext => app.focus_key(FocusKey::Tab),
        KbAction::FocusPrev => app.focus_key(FocusKey::BackTab),
        KbAction::Activate => app.activate_focused(),
        _ => {}
    }
}

/// Handles one mouse event. Returns true if anything visible changed.
pub(super) fn handle_mouse<A: ItemAuthority>(app: &mut App<A>, mouse: MouseEvent) -> bool {
    match app.view {
        View::List => handle_list_mouse(app, mouse),
        View::Reader => handle_reader_mouse(app, mouse),
    }
}

fn handle_list_mouse<A: ItemAuthority>(app: &mut App<A>, mouse: MouseEvent) -> bool {
    match mouse.kind {
        MouseEventKind::Down(MouseButton::Left) => {
            let Some(row) = app.hit_areas.list_row(mouse.column, mouse.row) else {
                return false;
            };
            if row >= app.session.views().sequence.len() {
                return false;
            }
            // Click selects; a click on the selected row opens it.
            if row == app.selected {
                app.open_selected();
            } else {
                app.selected = row;
            }
            true
        }
        MouseEventKind::ScrollDown => {
            app.nav_down();
            true
        }
        MouseEventKind::ScrollUp => {
            app.nav_up();
            true
        }
        _ => false,
    }
}

fn handle_reader_mouse<A: ItemAuthority>(app: &mut App<A>, mouse: MouseEvent) -> bool {
    let (column, row) = (mouse.column, mouse.row);
    let x = f32::from(column) * CELL_WIDTH;
    let y = f32::from(row) * CELL_HEIGHT;

    match mouse.kind {
        MouseEventKind::Down(MouseButton::Left) => {
            if let Some(control) = app.hit_areas.control_at(column, row) {
                app.focus.focus(&control);
                app.activate(control);
            } else if !app.hit_areas.in_reader(column, row) {
                app.focus_key(FocusKey::Escape);
            } else {
                app.gesture.pointer_down(MOUSE_POINTER, x, y);
            }
            true
        }
        MouseEventKind::Drag(MouseButton::Left) => {
            app.gesture.pointer_move(MOUSE_POINTER, x, y);
            app.gesture.is_tracking()
        }
        MouseEventKind::Up(MouseButton::Left) => {
            if let Some(swipe) = app.gesture.pointer_up(MOUSE_POINTER, x, y) {
                tracing::debug!(?swipe, "Swipe");
                app.handle_swipe(swipe);
            }
            true
        }
        MouseEventKind::ScrollDown => {
            app.scroll_down(WHEEL_LINES);
            true
        }
        MouseEventKind::ScrollUp => {
            app.scroll_up(WHEEL_LINES);
            true
        }
        _ => false,
    }
}
