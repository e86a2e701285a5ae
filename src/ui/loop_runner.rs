//! Main event loop for the TUI.
//!
//! Multiplexes terminal input, background sync events, the refresh interval
//! and a periodic tick.

use crate::app::App;
use crate::remote::ItemAuthority;
use crate::session::SyncEvent;
use anyhow::{Context, Result};
use crossterm::{
    event::{DisableMouseCapture, EnableMouseCapture, Event, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use futures::StreamExt;
use ratatui::{backend::CrosstermBackend, Terminal};
use std::io::{self, Stdout};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Interval, MissedTickBehavior};

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

use super::input::{handle_key, handle_mouse};
use super::render::render;

/// Number of frames in the loading spinner animation.
const SPINNER_FRAMES: usize = 10;

/// Result of handling an input event.
pub enum Action {
    Continue,
    /// Exit the application and restore the terminal.
    Quit,
}

/// Runs the TUI until the user quits or a termination signal arrives.
///
/// `refresh_every` drives background refreshes of the active view; `None`
/// means manual refresh only. A panic hook restores the terminal before
/// unwinding.
pub async fn run<A: ItemAuthority>(
    app: &mut App<A>,
    mut event_rx: mpsc::Receiver<SyncEvent>,
    refresh_every: Option<Duration>,
) -> Result<()> {
    #[cfg(unix)]
    let mut sigterm = signal(SignalKind::terminate())?;
    #[cfg(unix)]
    let mut sigint = signal(SignalKind::interrupt())?;

    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), DisableMouseCapture, LeaveAlternateScreen);
        original_hook(panic_info);
    }));

    let mut terminal = setup_terminal().context("Failed to set up terminal")?;
    let mut event_stream = crossterm::event::EventStream::new();

    let mut tick_interval = tokio::time::interval(Duration::from_millis(250));
    let mut refresh_interval = refresh_every.map(|period| {
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    });

    // Initial fetch for the active view.
    app.session.refresh();

    let result = loop {
        if app.needs_redraw {
            if let Err(e) = terminal.draw(|f| render(f, app)) {
                break Err(e).context("Failed to draw frame");
            }
            app.needs_redraw = false;
            // Focus returns to the container only once new content is on screen.
            if app.focus.after_paint() {
                app.needs_redraw = true;
            }
        }

        if app.clear_expired_status() {
            app.needs_redraw = true;
        }

        // Drain queued results before waiting on input so a burst of keys
        // cannot starve them.
        while let Ok(event) = event_rx.try_recv() {
            app.needs_redraw = true;
            app.handle_sync_event(event);
        }

        #[cfg(unix)]
        let sigterm_fut = sigterm.recv();
        #[cfg(not(unix))]
        let sigterm_fut = std::future::pending::<Option<()>>();

        #[cfg(unix)]
        let sigint_fut = sigint.recv();
        #[cfg(not(unix))]
        let sigint_fut = std::future::pending::<Option<()>>();

        tokio::select! {
            biased;

            _ = sigterm_fut => {
                tracing::info!("Received SIGTERM, shutting down gracefully");
                break Ok(());
            }

            _ = sigint_fut => {
                tracing::info!("Received SIGINT, shutting down gracefully");
                break Ok(());
            }

            maybe_event = event_stream.next() => {
                let action = match maybe_event {
                    Some(Ok(Event::Key(key))) if key.kind == KeyEventKind::Press => {
                        app.needs_redraw = true;
                        handle_key(app, key.code, key.modifiers)
                    }
                    Some(Ok(Event::Mouse(mouse))) => {
                        app.needs_redraw |= handle_mouse(app, mouse);
                        Action::Continue
                    }
                    Some(Ok(Event::Resize(_, _))) => {
                        app.needs_redraw = true;
                        Action::Continue
                    }
                    Some(Ok(_)) => Action::Continue,
                    Some(Err(e)) => break Err(e).context("Terminal input failed"),
                    None => {
                        tracing::info!("Terminal input closed");
                        break Ok(());
                    }
                };
                if let Action::Quit = action {
                    break Ok(());
                }
            }

            Some(event) = event_rx.recv() => {
                app.needs_redraw = true;
                app.handle_sync_event(event);
            }

            _ = tick(&mut refresh_interval) => {
                tracing::debug!("Periodic refresh");
                if app.session.refresh() {
                    app.needs_redraw = true;
                }
            }

            _ = tick_interval.tick() => {
                handle_tick(app);
            }
        }
    };

    restore_terminal(terminal)?;
    result
}

/// Ticks `interval`, or never resolves when there is none.
async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

fn handle_tick<A: ItemAuthority>(app: &mut App<A>) {
    if app.is_loading_reader() {
        app.spinner_frame = (app.spinner_frame + 1) % SPINNER_FRAMES;
        app.needs_redraw = true;
    }
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let terminal = Terminal::new(backend)?;
    Ok(terminal)
}

fn restore_terminal(mut terminal: Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        DisableMouseCapture,
        LeaveAlternateScreen
    )?;
    terminal.show_cursor()?;
    Ok(())
}
