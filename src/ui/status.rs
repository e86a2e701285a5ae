use crate::app::{App, View};
use crate::cache::FetchStatus;
use crate::keybindings::{Action as KbAction, Context as KbContext};
use crate::remote::ItemAuthority;
use ratatui::{
    layout::Rect,
    style::{Color, Style},
    widgets::Paragraph,
    Frame,
};
use std::borrow::Cow;

const LIST_HINTS: &[(KbAction, &str)] = &[
    (KbAction::Open, "open"),
    (KbAction::ToggleRead, "read"),
    (KbAction::ToggleShowRead, "all/unread"),
    (KbAction::CycleDateRange, "range"),
    (KbAction::CycleSort, "sort"),
    (KbAction::Refresh, "refresh"),
    (KbAction::Quit, "quit"),
];

const READER_HINTS: &[(KbAction, &str)] = &[
    (KbAction::ReaderPrev, "prev"),
    (KbAction::ReaderNext, "next"),
    (KbAction::ToggleRead, "read"),
    (KbAction::FocusNext, "focus"),
    (KbAction::ReaderClose, "close"),
];

/// Builds `[key]label` hints from the current bindings, skipping unbound actions.
fn hints<A: ItemAuthority>(app: &App<A>) -> String {
    let (table, context) = match app.view {
        View::List => (LIST_HINTS, KbContext::List),
        View::Reader => (READER_HINTS, KbContext::Reader),
    };
    table
        .iter()
        .filter_map(|(action, label)| {
            app.keybindings
                .key_for(*action, context)
                .map(|key| format!("[{}]{}", key, label))
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Render the status bar
pub fn render<A: ItemAuthority>(f: &mut Frame, app: &App<A>, area: Rect) {
    if area.width < 1 || area.height < 1 {
        return;
    }

    let mut style = Style::default().bg(Color::DarkGray).fg(Color::White);

    let text: Cow<'_, str> = if let Some((msg, _)) = &app.status_message {
        Cow::Borrowed(msg.as_ref())
    } else {
        match app.session.status() {
            Some(FetchStatus::Failed(e)) => {
                style = style.fg(Color::LightRed);
                Cow::Owned(format!("Fetch failed: {} (r to retry)", e))
            }
            Some(FetchStatus::Loading) if app.view == View::List => Cow::Borrowed("Loading…"),
            _ => Cow::Owned(hints(app)),
        }
    };

    f.render_widget(Paragraph::new(text).style(style), area);
}
