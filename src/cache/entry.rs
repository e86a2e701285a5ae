use crate::remote::Item;

/// An item as held in one partition.
///
/// `item.is_read` is the effective flag: the pending local value while a
/// mutation is in flight, otherwise the server's.
#[derive(Debug, Clone)]
pub(crate) struct CacheEntry {
    item: Item,
}

impl CacheEntry {
    pub(crate) fn new(mut item: Item, pending: Option<&mut PendingRead>) -> Self {
        if let Some(p) = pending {
            p.observe_server(item.is_read);
            item.is_read = p.value;
        }
        Self { item }
    }

    pub(crate) fn item(&self) -> &Item {
        &self.item
    }

    /// Replaces every server-owned field. A pending local flag survives.
    ///
    /// Returns true if anything visible changed.
    pub(crate) fn merge_server(&mut self, mut item: Item, pending: Option<&mut PendingRead>) -> bool {
        if let Some(p) = pending {
            p.observe_server(item.is_read);
            item.is_read = p.value;
        }
        if self.item == item {
            return false;
        }
        self.item = item;
        true
    }

    pub(crate) fn set_read(&mut self, is_read: bool) -> bool {
        if self.item.is_read == is_read {
            return false;
        }
        self.item.is_read = is_read;
        true
    }
}

/// One in-flight optimistic read-flag write for a single id.
///
/// Three values meet here: the locally written `value`, the `prior` flag that
/// was in effect before it, and the most recent server snapshot observed
/// while the write was pending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PendingRead {
    pub(crate) value: bool,
    pub(crate) prior: bool,
    pub(crate) ticket: u64,
    server_read: Option<bool>,
}

impl PendingRead {
    pub(crate) fn new(value: bool, prior: bool, ticket: u64) -> Self {
        Self {
            value,
            prior,
            ticket,
            server_read: None,
        }
    }

    /// Records a server snapshot that arrived while this write was pending.
    pub(crate) fn observe_server(&mut self, is_read: bool) {
        self.server_read = Some(is_read);
    }

    /// An older write for the same id was acknowledged: the server now holds
    /// that value, so it becomes the fallback for this one.
    pub(crate) fn predecessor_confirmed(&mut self, value: bool) {
        self.prior = value;
        self.server_read = None;
    }

    /// Flag to restore when this write fails.
    ///
    /// A server snapshot seen during the write is fresher than `prior`.
    pub(crate) fn rollback_value(&self) -> bool {
        self.server_read.unwrap_or(self.prior)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::ItemId;
    use chrono::Utc;
    use std::sync::Arc;

    fn item(is_read: bool, title: &str) -> Item {
        Item {
            id: ItemId::new("1"),
            feed_id: Arc::from("f"),
            title: Arc::from(title),
            description: None,
            content: None,
            published_at: None,
            received_at: Utc::now(),
            is_read,
            author: None,
            category: None,
            image_url: None,
        }
    }

    #[test]
    fn test_pending_value_outranks_refetch() {
        let mut entry = CacheEntry::new(item(false, "a"), None);
        let mut pending = PendingRead::new(true, false, 1);
        entry.set_read(true);

        let changed = entry.merge_server(item(false, "renamed"), Some(&mut pending));
        assert!(changed);
        assert!(entry.item().is_read);
        assert_eq!(&*entry.item().title, "renamed");
    }

    #[test]
    fn test_rollback_prefers_observed_server_value() {
        let mut pending = PendingRead::new(true, false, 1);
        assert!(!pending.rollback_value());

        // Another device marked it read while our write was in flight.
        pending.observe_server(true);
        assert!(pending.rollback_value());
    }

    #[test]
    fn test_predecessor_confirmation_resets_fallback() {
        let mut pending = PendingRead::new(false, false, 2);
        pending.observe_server(false);
        pending.predecessor_confirmed(true);
        assert!(pending.rollback_value());
    }

    #[test]
    fn test_identical_merge_reports_no_change() {
        let original = item(false, "a");
        let mut entry = CacheEntry::new(original.clone(), None);
        assert!(!entry.merge_server(original, None));
    }
}
