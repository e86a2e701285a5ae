use crate::app::{App, ReaderControl};
use crate::focus::FocusTarget;
use crate::remote::{Item, ItemAuthority};
use crate::session::ReaderContent;
use crate::ui::list::format_relative_time;
use crate::util::{strip_control_chars, wrap_to_width};
use chrono::Utc;
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, Paragraph},
    Frame,
};

const SPINNER: [char; 10] = ['⠋', '⠙', '⠹', '⠸', '⠼', '⠴', '⠦', '⠧', '⠇', '⠏'];

/// Modal footprint as a percentage of the list area.
const MODAL_WIDTH_PCT: u16 = 90;
const MODAL_HEIGHT_PCT: u16 = 90;

fn centered(area: Rect, width_pct: u16, height_pct: u16) -> Rect {
    let width = (area.width as u32 * width_pct as u32 / 100) as u16;
    let height = (area.height as u32 * height_pct as u32 / 100) as u16;
    Rect::new(
        area.x + (area.width - width) / 2,
        area.y + (area.height - height) / 2,
        width,
        height,
    )
}

fn control_label(control: ReaderControl, is_read: bool) -> &'static str {
    match control {
        ReaderControl::Prev => "◀ Prev",
        ReaderControl::Next => "Next ▶",
        ReaderControl::ToggleRead if is_read => "Mark unread",
        ReaderControl::ToggleRead => "Mark read",
        ReaderControl::Close => "Close",
    }
}

/// Wrapped body text for a loaded item. Falls back to the description when
/// the item has no content.
fn item_lines(item: &Item, is_read: bool, width: usize) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    for row in wrap_to_width(&strip_control_chars(&item.title), width) {
        lines.push(Line::from(Span::styled(
            row,
            Style::default().add_modifier(Modifier::BOLD),
        )));
    }

    let mut meta: Vec<String> = Vec::with_capacity(4);
    if let Some(author) = &item.author {
        meta.push(strip_control_chars(author).into_owned());
    }
    if let Some(category) = &item.category {
        meta.push(strip_control_chars(category).into_owned());
    }
    let time = format_relative_time(item.published_at, Utc::now());
    if !time.is_empty() {
        meta.push(time);
    }
    meta.push(if is_read { "read" } else { "unread" }.to_string());
    lines.push(Line::from(Span::styled(
        meta.join(" · "),
        Style::default().fg(Color::DarkGray),
    )));
    lines.push(Line::from(""));

    let body = item
        .content
        .as_deref()
        .or(item.description.as_deref())
        .filter(|s| !s.trim().is_empty());
    match body {
        Some(body) => lines.extend(
            wrap_to_width(&strip_control_chars(body), width)
                .into_iter()
                .map(Line::from),
        ),
        None => lines.push(Line::from(Span::styled(
            "(no content)",
            Style::default().fg(Color::DarkGray),
        ))),
    }
    lines
}

fn dim(text: &'static str) -> Vec<Line<'static>> {
    vec![Line::from(Span::styled(text, Style::default().fg(Color::DarkGray)))]
}

/// Render the reader modal over `area`.
pub fn render<A: ItemAuthority>(f: &mut Frame, app: &mut App<A>, area: Rect) {
    if area.width < 10 || area.height < 6 {
        return;
    }

    let modal = centered(area, MODAL_WIDTH_PCT, MODAL_HEIGHT_PCT);
    app.hit_areas.reader = Some(modal);

    let views = app.session.views();
    let position = match app.session.navigation().current_index() {
        Some(i) => format!("{}/{}", i + 1, views.sequence.len()),
        None => "end".to_string(),
    };
    let dx = app.gesture.displacement();
    let swipe_hint = if dx <= -app.gesture.threshold() {
        " ▶▶"
    } else if dx >= app.gesture.threshold() {
        " ◀◀"
    } else {
        ""
    };
    let container_focused = app.focus.focused() == FocusTarget::Container;
    let border_style = if container_focused {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default().fg(Color::Cyan)
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(border_style)
        .title(format!(" Reader {}{} ", position, swipe_hint));

    f.render_widget(Clear, modal);
    let inner = block.inner(modal);
    f.render_widget(block, modal);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(1), Constraint::Length(1)])
        .split(inner);
    let (body_area, controls_area) = (chunks[0], chunks[1]);
    let width = body_area.width as usize;

    let current_read = app
        .reader_item()
        .and_then(|id| app.session.is_read(&id))
        .unwrap_or(false);

    let lines: Vec<Line<'static>> = match app.session.reader() {
        ReaderContent::Hidden => Vec::new(),
        ReaderContent::Loading(id) => {
            let spinner = SPINNER[app.spinner_frame % SPINNER.len()];
            let mut lines = vec![Line::from(format!("{} Loading…", spinner))];
            if let Some(item) = views.visible.iter().find(|i| &i.id == id) {
                lines.push(Line::from(""));
                for row in wrap_to_width(&strip_control_chars(&item.title), width) {
                    lines.push(Line::from(Span::styled(
                        row,
                        Style::default().add_modifier(Modifier::BOLD),
                    )));
                }
            }
            lines
        }
        ReaderContent::Ready(item) => item_lines(item, current_read, width),
        ReaderContent::NotFound(_) => dim("This item is no longer available."),
        ReaderContent::Failed { id, error } => {
            let mut lines = vec![
                Line::from(Span::styled(
                    format!("Failed to load item: {}", error),
                    Style::default().fg(Color::Red),
                )),
                Line::from(""),
            ];
            let summary = views
                .visible
                .iter()
                .find(|i| &i.id == id)
                .and_then(|i| i.description.clone());
            if let Some(summary) = summary {
                lines.push(Line::from(Span::styled(
                    "Showing summary:",
                    Style::default().fg(Color::Yellow),
                )));
                lines.push(Line::from(""));
                lines.extend(
                    wrap_to_width(&strip_control_chars(&summary), width)
                        .into_iter()
                        .map(Line::from),
                );
            }
            lines
        }
        ReaderContent::EndOfList => dim("You've reached the end of the list."),
    };

    app.reader_visible_lines = body_area.height as usize;
    app.clamp_scroll(lines.len());

    let paragraph =
        Paragraph::new(Text::from(lines)).scroll((app.scroll_offset as u16, 0));
    f.render_widget(paragraph, body_area);

    render_controls(f, app, controls_area, current_read);
}

fn render_controls<A: ItemAuthority>(f: &mut Frame, app: &mut App<A>, area: Rect, is_read: bool) {
    app.hit_areas.controls.clear();
    let focused = app.focus.focused_control().copied();

    let mut spans = Vec::with_capacity(ReaderControl::ALL.len() * 2);
    let mut x = area.x;
    for control in ReaderControl::ALL {
        let label = format!(" {} ", control_label(control, is_read));
        let width = crate::util::display_width(&label) as u16;
        if x.saturating_add(width) > area.x.saturating_add(area.width) {
            break;
        }
        app.hit_areas
            .controls
            .push((control, Rect::new(x, area.y, width, 1)));

        let style = if focused == Some(control) {
            Style::default().bg(Color::Yellow).fg(Color::Black)
        } else {
            Style::default().bg(Color::DarkGray).fg(Color::White)
        };
        spans.push(Span::styled(label, style));
        spans.push(Span::raw(" "));
        x = x.saturating_add(width + 1);
    }

    f.render_widget(Paragraph::new(Line::from(spans)), area);
}
