//! Neighbor prefetch: warm the detail cache around the item being read.

use std::collections::HashSet;

use crate::remote::ItemId;

pub const DEFAULT_PREFETCH_RADIUS: usize = 3;

/// Ids within `radius` of `current_index`, excluding the current item and
/// anything `is_warm` reports as already cached.
///
/// Neighbors before the index come first in ascending order, then neighbors
/// after it in ascending order. Clipped at both ends; an out-of-range index
/// is clamped to the last position.
///
/// ```
/// use riffle::prefetch::compute_window;
/// use riffle::remote::ItemId;
///
/// let seq: Vec<ItemId> = (0..10).map(|n| ItemId::new(n.to_string())).collect();
/// let window = compute_window(5, &seq, 3, |_| false);
/// let ids: Vec<&str> = window.iter().map(|id| id.as_str()).collect();
/// assert_eq!(ids, ["2", "3", "4", "6", "7", "8"]);
/// ```
pub fn compute_window(
    current_index: usize,
    sequence: &[ItemId],
    radius: usize,
    is_warm: impl Fn(&ItemId) -> bool,
) -> Vec<ItemId> {
    if sequence.is_empty() || radius == 0 {
        return Vec::new();
    }
    let current = current_index.min(sequence.len() - 1);
    let start = current.saturating_sub(radius);
    let end = current.saturating_add(radius).min(sequence.len() - 1);

    sequence[start..current]
        .iter()
        .chain(&sequence[current + 1..=end])
        .filter(|id| !is_warm(id))
        .cloned()
        .collect()
}

/// De-duplicates background detail fetches.
#[derive(Debug, Default)]
pub struct PrefetchScheduler {
    in_flight: HashSet<ItemId>,
}

impl PrefetchScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims every id not already in flight and returns only those.
    ///
    /// The caller issues one fetch per returned id and reports each back
    /// through [`PrefetchScheduler::complete`].
    pub fn schedule(&mut self, ids: impl IntoIterator<Item = ItemId>) -> Vec<ItemId> {
        ids.into_iter()
            .filter(|id| self.in_flight.insert(id.clone()))
            .collect()
    }

    /// Releases `id` whether its fetch succeeded or failed.
    pub fn complete(&mut self, id: &ItemId) -> bool {
        self.in_flight.remove(id)
    }

    pub fn is_in_flight(&self, id: &ItemId) -> bool {
        self.in_flight.contains(id)
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }
}
