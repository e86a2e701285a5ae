use crate::app::App;
use crate::cache::FetchStatus;
use crate::remote::ItemAuthority;
use crate::util::{display_width, strip_control_chars, truncate_to_width};
use chrono::{DateTime, Utc};
use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem},
    Frame,
};

/// Format a timestamp relative to `now`: `5m`, `3h`, `2d`, then `Jan 05`.
pub fn format_relative_time(timestamp: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    let Some(ts) = timestamp else {
        return String::new();
    };
    let diff = (now - ts).num_seconds();

    if diff < 0 {
        return "now".to_string();
    }
    if diff < 3600 {
        return format!("{}m", diff / 60);
    }
    if diff < 86400 {
        return format!("{}h", diff / 3600);
    }
    if diff < 604800 {
        return format!("{}d", diff / 86400);
    }
    ts.format("%b %d").to_string()
}

/// First visible row so that `selected` stays on screen, scrolling as little
/// as possible from `previous`.
fn scroll_offset(selected: usize, previous: usize, height: usize) -> usize {
    if height == 0 || selected < previous {
        selected
    } else if selected >= previous + height {
        selected + 1 - height
    } else {
        previous
    }
}

/// Render the item list.
pub fn render<A: ItemAuthority>(f: &mut Frame, app: &mut App<A>, area: Rect) {
    if area.width < 3 || area.height < 3 {
        return;
    }

    let views = app.session.views();
    let height = area.height.saturating_sub(2) as usize;
    let offset = scroll_offset(app.selected, app.hit_areas.list_offset, height);
    app.hit_areas.list = area;
    app.hit_areas.list_offset = offset;

    let now = Utc::now();
    let inner_width = area.width.saturating_sub(2) as usize;

    let items: Vec<ListItem> = if views.visible.is_empty() {
        let msg = match app.session.status() {
            Some(FetchStatus::Loading) | None => "Loading…",
            Some(FetchStatus::Failed(_)) => "Couldn't load items",
            Some(FetchStatus::Idle) => "No items",
        };
        vec![ListItem::new(Span::styled(
            msg,
            Style::default().fg(Color::DarkGray),
        ))]
    } else {
        views
            .visible
            .iter()
            .enumerate()
            .skip(offset)
            .take(height)
            .map(|(i, item)| {
                let time_str = format_relative_time(item.published_at, now);
                let error = app.session.item_error(&item.id);

                let mut spans = Vec::with_capacity(4);
                spans.push(if item.is_read {
                    Span::raw("  ")
                } else {
                    Span::styled("● ", Style::default().fg(Color::Cyan))
                });

                let title_style = if i == app.selected {
                    Style::default().bg(Color::DarkGray).fg(Color::White)
                } else if !item.is_read {
                    Style::default().add_modifier(Modifier::BOLD)
                } else {
                    Style::default().fg(Color::Gray)
                };

                // Marker, two spaces and the time column.
                let reserved = 2 + 2 + display_width(&time_str);
                let title = strip_control_chars(&item.title);
                let title = truncate_to_width(&title, inner_width.saturating_sub(reserved));
                let title_width = display_width(&title);
                spans.push(Span::styled(title.into_owned(), title_style));

                if !time_str.is_empty() {
                    spans.push(Span::styled(
                        format!("  {}", time_str),
                        Style::default().fg(Color::DarkGray),
                    ));
                }

                if let Some(error) = error {
                    let room = inner_width.saturating_sub(reserved + title_width + 3);
                    if room > 4 {
                        spans.push(Span::styled(
                            format!(" ⚠ {}", truncate_to_width(error, room)),
                            Style::default().fg(Color::Red),
                        ));
                    }
                }

                ListItem::new(Line::from(spans))
            })
            .collect()
    };

    let filter = app.session.filter();
    let shown = views.visible.len();
    let count = match app.session.total_count() {
        Some(total) if !app.session.is_exhausted() => format!("{}/{}", shown, total),
        _ => shown.to_string(),
    };
    let title = format!(
        " {} · {} · {} ({}) ",
        if filter.show_read() { "All" } else { "Unread" },
        filter.date_range(),
        filter.sort().as_str(),
        count
    );

    let border_style = match app.session.status() {
        Some(FetchStatus::Failed(_)) => Style::default().fg(Color::Red),
        _ => Style::default().fg(Color::Cyan),
    };

    let list = List::new(items).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(border_style)
            .title(title),
    );

    f.render_widget(list, area);
}
