//! Canonical snapshot object names.
//!
//! Every backend stores snapshots as `raft_snapshot-<unix nanos>.snap`. Retention only
//! ever considers names of exactly that shape.

use lazy_static::lazy_static;
use regex::Regex;

/// Literal prefix shared by all snapshot objects
pub const SNAPSHOT_PREFIX: &str = "raft_snapshot-";

/// Literal suffix shared by all snapshot objects
pub const SNAPSHOT_SUFFIX: &str = ".snap";

lazy_static! {
    static ref SNAPSHOT_NAME: Regex = Regex::new(r"^raft_snapshot-(\d+)\.snap$").unwrap();
}

/// Object name for a snapshot captured at `timestamp_nanos`.
pub fn snapshot_name(timestamp_nanos: i64) -> String {
    format!("{}{}{}", SNAPSHOT_PREFIX, timestamp_nanos, SNAPSHOT_SUFFIX)
}

/// Whether `name` was produced by [`snapshot_name`].
pub fn is_snapshot_name(name: &str) -> bool {
    SNAPSHOT_NAME.is_match(name)
}

/// Capture timestamp embedded in a canonical name.
pub fn snapshot_timestamp(name: &str) -> Option<i64> {
    SNAPSHOT_NAME
        .captures(name)
        .and_then(|captures| captures.get(1))
        .and_then(|digits| digits.as_str().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_name_format() {
        assert_eq!(snapshot_name(400), "raft_snapshot-400.snap");
        assert_eq!(
            snapshot_name(1_700_000_000_123_456_789),
            "raft_snapshot-1700000000123456789.snap"
        );
    }

    #[test]
    fn test_is_snapshot_name() {
        assert!(is_snapshot_name("raft_snapshot-100.snap"));

        assert!(!is_snapshot_name("raft_snapshot-.snap"));
        assert!(!is_snapshot_name("raft_snapshot-100.snap.bak"));
        assert!(!is_snapshot_name("old-raft_snapshot-100.snap"));
        assert!(!is_snapshot_name("raft_snapshot-abc.snap"));
        assert!(!is_snapshot_name("nightly.snap"));
        assert!(!is_snapshot_name("raft_snapshots/raft_snapshot-100.snap"));
    }

    #[test]
    fn test_snapshot_timestamp() {
        assert_eq!(snapshot_timestamp("raft_snapshot-300.snap"), Some(300));
        assert_eq!(snapshot_timestamp("unrelated.txt"), None);
    }
}
