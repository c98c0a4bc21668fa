//! Per-tab counters of altered requests.

use std::collections::HashMap;

use bw_engine::TabId;

/// Number of altered (blocked or redirected) requests per tab since that
/// tab's last main-frame navigation.
///
/// A tab with no entry counts as 0; entries are created lazily on the first
/// observed event and evicted when the tab closes. Purely in-memory, no I/O.
#[derive(Debug, Default)]
pub struct BlockCounter {
    counts: HashMap<TabId, u64>,
}

impl BlockCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one altered request to the tab's count.
    pub fn increment(&mut self, tab: TabId) {
        *self.counts.entry(tab).or_insert(0) += 1;
    }

    /// Start the tab's count over, e.g. on main-frame navigation.
    pub fn reset(&mut self, tab: TabId) {
        self.counts.insert(tab, 0);
    }

    pub fn get(&self, tab: TabId) -> u64 {
        self.counts.get(&tab).copied().unwrap_or(0)
    }

    /// Drop the tab's entry entirely (tab closed).
    pub fn forget(&mut self, tab: TabId) {
        self.counts.remove(&tab);
    }

    /// Number of tabs currently tracked.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    /// Iterate over the tracked tabs, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (TabId, u64)> + '_ {
        self.counts.iter().map(|(tab, count)| (*tab, *count))
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn untouched_tab_counts_zero() {
        let counter = BlockCounter::new();
        assert_eq!(counter.get(42), 0);
        assert!(counter.is_empty());
    }

    #[test]
    fn reset_then_increments() {
        let mut counter = BlockCounter::new();
        counter.increment(7);
        counter.increment(7);
        counter.reset(7);
        assert_eq!(counter.get(7), 0);

        counter.increment(7);
        counter.increment(7);
        counter.increment(7);
        assert_eq!(counter.get(7), 3);
    }

    #[test]
    fn tabs_count_independently() {
        let mut counter = BlockCounter::new();
        counter.increment(1);
        counter.increment(2);
        counter.increment(2);
        assert_eq!(counter.get(1), 1);
        assert_eq!(counter.get(2), 2);
        assert_eq!(counter.len(), 2);
    }

    #[test]
    fn forget_evicts_the_entry() {
        let mut counter = BlockCounter::new();
        counter.increment(5);
        counter.forget(5);
        assert_eq!(counter.get(5), 0);
        assert!(counter.is_empty());
    }
}
