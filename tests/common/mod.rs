//! Shared fixtures for session-level integration tests.
//!
//! `ScriptedAuthority` is an in-memory item server: it pages, filters and
//! records every call so tests can assert on the traffic the session makes.

#![allow(dead_code)]

use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use riffle::filter::FilterState;
use riffle::remote::{Item, ItemAuthority, ItemId, ListPage, ListQuery, RemoteError};
use riffle::session::{EventReport, FeedSession, SessionSettings, SyncEvent};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Debug, Default)]
struct ServerState {
    items: Vec<Item>,
    list_calls: Vec<ListQuery>,
    get_calls: Vec<ItemId>,
    read_calls: Vec<(Vec<ItemId>, bool)>,
    fail_list: bool,
    fail_get: bool,
    fail_read: bool,
    panic_get: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ScriptedAuthority {
    state: Arc<Mutex<ServerState>>,
}

impl ScriptedAuthority {
    pub fn with_items(items: Vec<Item>) -> Self {
        let authority = Self::default();
        authority.state.lock().unwrap().items = items;
        authority
    }

    pub fn push_item(&self, item: Item) {
        self.state.lock().unwrap().items.push(item);
    }

    pub fn remove_item(&self, id: &str) {
        self.state.lock().unwrap().items.retain(|i| i.id.as_str() != id);
    }

    pub fn server_read_flag(&self, id: &str) -> Option<bool> {
        let state = self.state.lock().unwrap();
        state.items.iter().find(|i| i.id.as_str() == id).map(|i| i.is_read)
    }

    pub fn set_fail_list(&self, fail: bool) {
        self.state.lock().unwrap().fail_list = fail;
    }

    pub fn set_fail_get(&self, fail: bool) {
        self.state.lock().unwrap().fail_get = fail;
    }

    pub fn set_fail_read(&self, fail: bool) {
        self.state.lock().unwrap().fail_read = fail;
    }

    pub fn set_panic_get(&self, panic: bool) {
        self.state.lock().unwrap().panic_get = panic;
    }

    pub fn list_calls(&self) -> Vec<ListQuery> {
        self.state.lock().unwrap().list_calls.clone()
    }

    pub fn get_calls(&self) -> Vec<ItemId> {
        self.state.lock().unwrap().get_calls.clone()
    }

    pub fn read_calls(&self) -> Vec<(Vec<ItemId>, bool)> {
        self.state.lock().unwrap().read_calls.clone()
    }
}

impl ItemAuthority for ScriptedAuthority {
    async fn list_items(&self, query: &ListQuery) -> Result<ListPage, RemoteError> {
        let mut state = self.state.lock().unwrap();
        state.list_calls.push(query.clone());
        if state.fail_list {
            return Err(RemoteError::HttpStatus(503));
        }
        let mut matching: Vec<Item> = state
            .items
            .iter()
            .filter(|i| query.is_read.map_or(true, |r| i.is_read == r))
            .filter(|i| query.published_since.map_or(true, |s| i.sort_timestamp() > s))
            .cloned()
            .collect();
        matching.sort_by(|a, b| {
            a.sort_timestamp()
                .cmp(&b.sort_timestamp())
                .then_with(|| a.id.cmp(&b.id))
        });
        let total_count = matching.len() as u64;
        let items = matching
            .into_iter()
            .skip(query.offset as usize)
            .take(query.limit as usize)
            .collect();
        Ok(ListPage { items, total_count })
    }

    async fn get_item(&self, id: &ItemId) -> Result<Option<Item>, RemoteError> {
        let mut state = self.state.lock().unwrap();
        state.get_calls.push(id.clone());
        if state.panic_get {
            drop(state);
            panic!("scripted panic loading {}", id);
        }
        if state.fail_get {
            return Err(RemoteError::HttpStatus(500));
        }
        Ok(state.items.iter().find(|i| &i.id == id).cloned())
    }

    async fn set_read(&self, ids: &[ItemId], is_read: bool) -> Result<(), RemoteError> {
        let mut state = self.state.lock().unwrap();
        state.read_calls.push((ids.to_vec(), is_read));
        if state.fail_read {
            return Err(RemoteError::HttpStatus(500));
        }
        for item in state.items.iter_mut().filter(|i| ids.contains(&i.id)) {
            item.is_read = is_read;
        }
        Ok(())
    }
}

fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 1, 8, 0, 0).unwrap()
}

/// Item `n`, published `n` minutes after a fixed base time.
pub fn item(n: u32) -> Item {
    let at = base_time() + ChronoDuration::minutes(i64::from(n));
    Item {
        id: ItemId::new(n.to_string()),
        feed_id: Arc::from("feed-1"),
        title: Arc::from(format!("Item {}", n)),
        description: Some(Arc::from(format!("Summary {}", n))),
        content: Some(Arc::from(format!("Body of item {}", n))),
        author: None,
        category: None,
        image_url: None,
        published_at: Some(at),
        received_at: at,
        is_read: false,
    }
}

/// An item published after any watermark issued so far.
pub fn fresh_item(n: u32) -> Item {
    let at = Utc::now() + ChronoDuration::hours(1);
    Item {
        published_at: Some(at),
        received_at: at,
        ..item(n)
    }
}

pub fn items(range: std::ops::RangeInclusive<u32>) -> Vec<Item> {
    range.map(item).collect()
}

pub fn id(n: u32) -> ItemId {
    ItemId::new(n.to_string())
}

pub fn ids(session: &mut FeedSession<ScriptedAuthority>) -> Vec<ItemId> {
    session.views().sequence.clone()
}

pub fn settings(page_size: u32) -> SessionSettings {
    SessionSettings {
        page_size,
        ..SessionSettings::default()
    }
}

pub fn session_with(
    authority: ScriptedAuthority,
    settings: SessionSettings,
) -> (FeedSession<ScriptedAuthority>, mpsc::Receiver<SyncEvent>) {
    let (tx, rx) = mpsc::channel(64);
    let session = FeedSession::new(authority, tx, settings, FilterState::default());
    (session, rx)
}

/// Refreshes and applies the first page.
pub async fn loaded_session(
    authority: ScriptedAuthority,
    page_size: u32,
) -> (FeedSession<ScriptedAuthority>, mpsc::Receiver<SyncEvent>) {
    let (mut session, mut rx) = session_with(authority, settings(page_size));
    assert!(session.refresh());
    settle(&mut session, &mut rx).await;
    (session, rx)
}

/// Applies background results until none arrive for a short while.
pub async fn settle(
    session: &mut FeedSession<ScriptedAuthority>,
    rx: &mut mpsc::Receiver<SyncEvent>,
) -> Vec<EventReport> {
    let mut reports = Vec::new();
    while let Ok(Some(event)) = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await {
        reports.push(session.handle_event(event));
    }
    reports
}
