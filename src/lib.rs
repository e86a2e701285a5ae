//! Terminal client for a remote feed-item server.
//!
//! The sync core ([`session::FeedSession`]) owns a partitioned item cache,
//! derived list projections, detail prefetching and sequential reader
//! navigation. The terminal surface ([`app`], [`ui`]) sits on top of it.

pub mod app;
pub mod cache;
pub mod config;
pub mod detail;
pub mod filter;
pub mod focus;
pub mod gesture;
pub mod keybindings;
pub mod navigation;
pub mod prefetch;
pub mod projection;
pub mod remote;
pub mod session;
pub mod ui;
pub mod util;

mod task;
