//! Terminal User Interface module.
//!
//! - `loop_runner` - Main event loop and terminal management
//! - `input` - Keyboard and mouse handling
//! - `render` - Frame layout and dispatch
//! - `list` - Item list widget
//! - `reader` - Reader modal widget
//! - `status` - Status bar widget

mod input;
mod list;
mod loop_runner;
mod reader;
mod render;
mod status;

pub use loop_runner::{run, Action};
