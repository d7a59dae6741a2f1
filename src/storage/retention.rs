//! Backend-agnostic retention.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Anything retention can order: a name and a last-modified time.
pub trait Timestamped {
    /// Name used to break ties
    fn name(&self) -> &str;
    /// Primary sort key
    fn last_modified(&self) -> DateTime<Utc>;
}

/// Sort oldest first. Equal modification times are ordered by name so the result
/// does not depend on listing order.
pub fn sort_oldest_first<T: Timestamped>(items: &mut [T]) {
    items.sort_by(|a, b| {
        a.last_modified()
            .cmp(&b.last_modified())
            .then_with(|| a.name().cmp(b.name()))
    });
}

/// How many snapshots each backend keeps
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    retain_count: u64,
}

impl RetentionPolicy {
    /// Keep the newest `retain_count` snapshots; `0` disables pruning.
    pub fn new(retain_count: u64) -> Self {
        Self { retain_count }
    }

    /// Number of snapshots kept
    pub fn retain_count(&self) -> u64 {
        self.retain_count
    }

    /// Whether pruning is turned off
    pub fn is_disabled(&self) -> bool {
        self.retain_count == 0
    }

    /// The objects to delete: the oldest `len - retain_count` of `items`, oldest
    /// first. Nothing when disabled or when there are no more than `retain_count`.
    pub fn select_expired<T: Timestamped>(&self, mut items: Vec<T>) -> Vec<T> {
        let retain = usize::try_from(self.retain_count).unwrap_or(usize::MAX);
        if self.is_disabled() || items.len() <= retain {
            return Vec::new();
        }

        sort_oldest_first(&mut items);
        items.truncate(items.len() - retain);
        items
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[derive(Debug, Clone, PartialEq)]
    struct Entry(&'static str, i64);

    impl Timestamped for Entry {
        fn name(&self) -> &str {
            self.0
        }

        fn last_modified(&self) -> DateTime<Utc> {
            Utc.timestamp_opt(self.1, 0).unwrap()
        }
    }

    #[test]
    fn test_select_expired_takes_oldest() {
        let policy = RetentionPolicy::new(2);
        let items = vec![Entry("c", 30), Entry("a", 10), Entry("d", 40), Entry("b", 20)];

        let expired = policy.select_expired(items);
        assert_eq!(expired, vec![Entry("a", 10), Entry("b", 20)]);
    }

    #[test]
    fn test_disabled_policy_selects_nothing() {
        let policy = RetentionPolicy::new(0);
        assert!(policy.is_disabled());
        assert!(policy.select_expired(vec![Entry("a", 1), Entry("b", 2)]).is_empty());
    }

    #[test]
    fn test_within_limit_selects_nothing() {
        let policy = RetentionPolicy::new(3);
        assert!(policy.select_expired(vec![Entry("a", 1), Entry("b", 2), Entry("c", 3)]).is_empty());
    }

    #[test]
    fn test_ties_broken_by_name() {
        let mut items = vec![Entry("b", 5), Entry("c", 5), Entry("a", 5)];
        sort_oldest_first(&mut items);
        assert_eq!(items, vec![Entry("a", 5), Entry("b", 5), Entry("c", 5)]);
    }
}
