//! Frame layout: list and status bar, with the reader modal on top.

use crate::app::{App, View};
use crate::remote::ItemAuthority;
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout},
    widgets::Paragraph,
    Frame,
};

use super::{list, reader, status};

/// Minimum terminal dimensions required for normal operation.
pub(super) const MIN_WIDTH: u16 = 40;
pub(super) const MIN_HEIGHT: u16 = 8;

pub(super) fn render<A: ItemAuthority>(f: &mut Frame, app: &mut App<A>) {
    let area = f.area();
    if area.width < 1 || area.height < 1 {
        return;
    }

    if area.width < MIN_WIDTH || area.height < MIN_HEIGHT {
        let msg = if area.height < 3 || area.width < 20 {
            Paragraph::new("Too small")
        } else {
            Paragraph::new(format!(
                "Terminal too small\n\nMinimum: {}x{}\nCurrent: {}x{}",
                MIN_WIDTH, MIN_HEIGHT, area.width, area.height
            ))
            .alignment(Alignment::Center)
        };
        f.render_widget(msg, area);
        return;
    }

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(1)])
        .split(area);

    list::render(f, app, chunks[0]);
    if app.view == View::Reader {
        reader::render(f, app, chunks[0]);
    }
    status::render(f, app, chunks[1]);
}
