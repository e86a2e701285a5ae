//! Domain types exchanged with the remote item authority.
//!
//! Wire structs (`Wire*`) mirror the JSON the server speaks and are converted
//! into domain types with `into_item()` so the rest of the crate never sees
//! the loose wire encodings (ids as numbers or strings, timestamps as ISO-8601
//! strings or `{seconds, nanos}` pairs, counters as numbers or strings).

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use super::RemoteError;

// ============================================================================
// Identity
// ============================================================================

/// Opaque item identifier.
///
/// Wraps `Arc<str>` so ids can be cloned into sets, windows and events
/// without reallocating.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemId(Arc<str>);

impl ItemId {
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Arc::from(id.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ItemId {
    fn from(s: String) -> Self {
        Self(Arc::from(s))
    }
}

impl Serialize for ItemId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

// ============================================================================
// Item
// ============================================================================

/// A single feed entry as the client currently believes it to be.
///
/// Every field except `is_read` is owned by the server and replaced wholesale
/// on refetch. String fields use `Arc<str>` for cheap cloning into projections.
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub id: ItemId,
    pub feed_id: Arc<str>,
    pub title: Arc<str>,
    pub description: Option<Arc<str>>,
    pub content: Option<Arc<str>>,
    pub published_at: Option<DateTime<Utc>>,
    pub received_at: DateTime<Utc>,
    pub is_read: bool,
    pub author: Option<Arc<str>>,
    pub category: Option<Arc<str>>,
    pub image_url: Option<Arc<str>>,
}

impl Item {
    /// Timestamp used for ordering: publication date, falling back to receipt.
    pub fn sort_timestamp(&self) -> DateTime<Utc> {
        self.published_at.unwrap_or(self.received_at)
    }
}

// ============================================================================
// Queries
// ============================================================================

/// Parameters for one page of the item listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    pub feed_id: Option<String>,
    /// `Some(false)` restricts to unread items; `None` returns both.
    pub is_read: Option<bool>,
    /// Only items published strictly after this instant.
    pub published_since: Option<DateTime<Utc>>,
    pub limit: u32,
    pub offset: u64,
}

/// One page of the item listing.
#[derive(Debug, Clone, PartialEq)]
pub struct ListPage {
    pub items: Vec<Item>,
    /// Total matching items on the server (across all pages).
    pub total_count: u64,
}

// ============================================================================
// Wire Encodings
// ============================================================================

/// Identifier that may arrive as a JSON string or number.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum WireId {
    Text(String),
    Number(u64),
}

impl WireId {
    fn into_string(self) -> String {
        match self {
            WireId::Text(s) => s,
            WireId::Number(n) => n.to_string(),
        }
    }
}

/// Timestamp as ISO-8601 text or a `{seconds, nanos}` pair.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum WireTimestamp {
    Iso(String),
    Parts {
        seconds: i64,
        #[serde(default)]
        nanos: u32,
    },
}

impl WireTimestamp {
    pub(crate) fn into_datetime(self) -> Result<DateTime<Utc>, RemoteError> {
        match self {
            WireTimestamp::Iso(s) => DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| RemoteError::Decode(format!("bad timestamp '{}': {}", s, e))),
            WireTimestamp::Parts { seconds, nanos } => Utc
                .timestamp_opt(seconds, nanos)
                .single()
                .ok_or_else(|| {
                    RemoteError::Decode(format!("timestamp out of range: {}s {}ns", seconds, nanos))
                }),
        }
    }
}

/// 64-bit counter as a JSON number or a decimal string.
///
/// Never routed through `f64`: large totals keep every digit.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum WireCount {
    Number(u64),
    Text(String),
}

impl WireCount {
    pub(crate) fn into_u64(self) -> Result<u64, RemoteError> {
        match self {
            WireCount::Number(n) => Ok(n),
            WireCount::Text(s) => s
                .trim()
                .parse::<u64>()
                .map_err(|e| RemoteError::Decode(format!("bad count '{}': {}", s, e))),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WireItem {
    pub id: WireId,
    pub feed_id: WireId,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub published_at: Option<WireTimestamp>,
    pub received_at: WireTimestamp,
    #[serde(default)]
    pub is_read: bool,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

impl WireItem {
    pub(crate) fn into_item(self) -> Result<Item, RemoteError> {
        Ok(Item {
            id: ItemId::from(self.id.into_string()),
            feed_id: Arc::from(self.feed_id.into_string()),
            title: Arc::from(self.title),
            description: self.description.map(Arc::from),
            content: self.content.map(Arc::from),
            published_at: self
                .published_at
                .map(WireTimestamp::into_datetime)
                .transpose()?,
            received_at: self.received_at.into_datetime()?,
            is_read: self.is_read,
            author: self.author.map(Arc::from),
            category: self.category.map(Arc::from),
            image_url: self.image_url.map(Arc::from),
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WireListPage {
    pub items: Vec<WireItem>,
    pub total_count: WireCount,
}

impl WireListPage {
    pub(crate) fn into_page(self) -> Result<ListPage, RemoteError> {
        let items = self
            .items
            .into_iter()
            .map(WireItem::into_item)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ListPage {
            items,
            total_count: self.total_count.into_u64()?,
        })
    }
}

/// Body of the batch read-state call.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WireReadUpdate<'a> {
    pub ids: &'a [ItemId],
    pub is_read: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_item_decodes_iso_and_numeric_ids() {
        let json = r#"{
            "id": 42,
            "feedId": "tech",
            "title": "Hello",
            "publishedAt": "2024-03-01T10:00:00Z",
            "receivedAt": {"seconds": 1709287200, "nanos": 500},
            "isRead": true,
            "author": "Ada"
        }"#;
        let wire: WireItem = serde_json::from_str(json).unwrap();
        let item = wire.into_item().unwrap();

        assert_eq!(item.id.as_str(), "42");
        assert_eq!(&*item.feed_id, "tech");
        assert!(item.is_read);
        assert_eq!(item.author.as_deref(), Some("Ada"));
        assert_eq!(
            item.published_at,
            Some(Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap())
        );
        assert_eq!(item.received_at.timestamp(), 1709287200);
        assert_eq!(item.received_at.timestamp_subsec_nanos(), 500);
    }

    #[test]
    fn test_sort_timestamp_falls_back_to_received() {
        let json = r#"{"id":"a","feedId":1,"title":"t","receivedAt":"2024-01-01T00:00:00Z"}"#;
        let item = serde_json::from_str::<WireItem>(json)
            .unwrap()
            .into_item()
            .unwrap();
        assert!(item.published_at.is_none());
        assert_eq!(item.sort_timestamp(), item.received_at);
        assert!(!item.is_read);
    }

    #[test]
    fn test_total_count_string_keeps_precision() {
        // 2^53 + 1 is not representable as f64
        let json = r#"{"items": [], "totalCount": "9007199254740993"}"#;
        let page = serde_json::from_str::<WireListPage>(json)
            .unwrap()
            .into_page()
            .unwrap();
        assert_eq!(page.total_count, 9_007_199_254_740_993);
    }

    #[test]
    fn test_total_count_number() {
        let json = r#"{"items": [], "totalCount": 18446744073709551615}"#;
        let page = serde_json::from_str::<WireListPage>(json)
            .unwrap()
            .into_page()
            .unwrap();
        assert_eq!(page.total_count, u64::MAX);
    }

    #[test]
    fn test_bad_timestamp_is_decode_error() {
        let json = r#"{"id":"a","feedId":"f","title":"t","receivedAt":"yesterday"}"#;
        let result = serde_json::from_str::<WireItem>(json).unwrap().into_item();
        assert!(matches!(result, Err(RemoteError::Decode(_))));
    }

    #[test]
    fn test_read_update_serializes_camel_case() {
        let ids = vec![ItemId::new("1"), ItemId::new("2")];
        let body = WireReadUpdate {
            ids: &ids,
            is_read: true,
        };
        let json = serde_json::to_string(&body).unwrap();
        assert_eq!(json, r#"{"ids":["1","2"],"isRead":true}"#);
    }
}
