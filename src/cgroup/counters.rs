//! Reads cgroup accounting files into a flat field name to counter mapping.
//!
//! Two file shapes exist:
//!
//! - **Key-value files** (`cpu.stat`, `cpuacct.stat`, `memory.stat`, `memory.events`): one
//!   whitespace-separated `key value` pair per line.
//! - **Scalar files** (`memory.current`, `memory.max`, `cpuacct.usage`, ...): a single value,
//!   or the keyword `max` for "no limit".
//!
//! Parsing is lenient: malformed lines, non-numeric values, and lines with extra tokens are
//! skipped rather than failing the whole file. Each file is opened and read exactly once.

use std::collections::HashMap;
use std::path::Path;

use crate::fsutil::{self, FileReadError};

use super::CounterFormat;

/// Counters read from one or more accounting files of a single container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawCounters(HashMap<String, u64>);

impl RawCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<u64> {
        self.0.get(key).copied()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: u64) -> Option<u64> {
        self.0.insert(key.into(), value)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Parses `key value` lines, storing each key with `prefix` prepended.
    ///
    /// A key repeated within the content keeps its last value.
    pub fn extend_from_key_value(&mut self, contents: &str, prefix: &str) {
        for line in contents.lines() {
            let mut parts = line.split_whitespace();
            let (Some(key), Some(value), None) = (parts.next(), parts.next(), parts.next()) else {
                continue;
            };
            match value.parse::<u64>() {
                Ok(value) => {
                    self.0.insert(format!("{prefix}{key}"), value);
                }
                Err(err) => log::trace!("skipping counter `{key}` with value `{value}`: {err}"),
            }
        }
    }

    /// Parses a single-value file into `key`. `max` is stored as [`u64::MAX`].
    ///
    /// A malformed value leaves `key` unset.
    pub fn insert_scalar(&mut self, key: &str, contents: &str) {
        let value = contents.trim();
        let parsed = match value {
            "max" => Some(u64::MAX),
            value => value.parse::<u64>().ok(),
        };
        match parsed {
            Some(parsed) => {
                self.0.insert(key.to_owned(), parsed);
            }
            None => log::trace!("skipping scalar counter `{key}` with value `{value}`"),
        }
    }

    /// Parses the content of a key-value file.
    pub fn from_key_value(contents: &str) -> Self {
        let mut counters = Self::new();
        counters.extend_from_key_value(contents, "");
        counters
    }
}

impl<K: Into<String>, const N: usize> From<[(K, u64); N]> for RawCounters {
    fn from(pairs: [(K, u64); N]) -> Self {
        Self(pairs.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

/// Reads a key-value accounting file.
///
/// # Errors
///
/// Returns a [`FileReadError`] if the file cannot be opened or read.
///
/// # Example
///
/// ```no_run
/// let counters = cgstat::cgroup::read_counters("/sys/fs/cgroup/system.slice/cpu.stat").unwrap();
/// println!("usage: {:?}", counters.get("usage_usec"));
/// ```
pub fn read_counters(path: impl AsRef<Path>) -> Result<RawCounters, FileReadError> {
    let contents = fsutil::read_snapshot(path)?;
    Ok(RawCounters::from_key_value(&contents))
}

/// Reads one accounting file in the given format and merges its counters into `counters`.
///
/// # Errors
///
/// Returns a [`FileReadError`] if the file cannot be opened or read; `counters` is then
/// unchanged.
pub fn read_counters_into(
    counters: &mut RawCounters,
    path: impl AsRef<Path>,
    format: CounterFormat,
) -> Result<(), FileReadError> {
    let contents = fsutil::read_snapshot(path)?;
    match format {
        CounterFormat::KeyValue { prefix } => counters.extend_from_key_value(&contents, prefix),
        CounterFormat::Scalar { key } => counters.insert_scalar(key, &contents),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_empty() {
        assert!(RawCounters::from_key_value("").is_empty());
    }

    #[test]
    fn test_parse_cpuacct_stat() {
        let counters = RawCounters::from_key_value("user 100\nsystem 50\n");
        assert_eq!(counters, RawCounters::from([("user", 100), ("system", 50)]));
    }

    #[test]
    fn test_parse_cpu_stat() {
        let data = "\
usage_usec 623932088000
user_usec 421230248000
system_usec 202701840000
nr_periods 0
nr_throttled 0
throttled_usec 0
";
        let counters = RawCounters::from_key_value(data);
        assert_eq!(counters.len(), 6);
        assert_eq!(counters.get("usage_usec"), Some(623_932_088_000));
        assert_eq!(counters.get("user_usec"), Some(421_230_248_000));
        assert_eq!(counters.get("system_usec"), Some(202_701_840_000));
    }

    #[test]
    fn test_malformed_lines_are_skipped() {
        let data = "\
invalid_line
anon abc
file 2000
some 1 2
negative -5

    kernel_stack     300
";
        let counters = RawCounters::from_key_value(data);
        assert_eq!(
            counters,
            RawCounters::from([("file", 2000), ("kernel_stack", 300)])
        );
    }

    #[test]
    fn test_repeated_key_keeps_last_value() {
        let counters = RawCounters::from_key_value("anon 1000\nanon 2000\n");
        assert_eq!(counters.get("anon"), Some(2000));
    }

    #[test]
    fn test_prefix_is_applied() {
        let mut counters = RawCounters::from([("max", 1)]);
        counters.extend_from_key_value("low 0\nhigh 0\nmax 7\noom 1\noom_kill 1\n", "events.");
        assert_eq!(counters.get("max"), Some(1));
        assert_eq!(counters.get("events.max"), Some(7));
        assert_eq!(counters.get("events.oom_kill"), Some(1));
    }

    #[test]
    fn test_scalar_values() {
        let mut counters = RawCounters::new();
        counters.insert_scalar("usage", "8192\n");
        counters.insert_scalar("limit", "max\n");
        counters.insert_scalar("peak", "abcd\n");
        counters.insert_scalar("failcnt", "");
        assert_eq!(counters.get("usage"), Some(8192));
        assert_eq!(counters.get("limit"), Some(u64::MAX));
        assert!(!counters.contains_key("peak"));
        assert!(!counters.contains_key("failcnt"));
    }

    #[test]
    fn test_read_counters_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cpu.stat");
        std::fs::write(&path, "usage_usec 150\nuser_usec 100\nsystem_usec 50\n").unwrap();

        let counters = read_counters(&path).unwrap();
        assert_eq!(counters.get("user_usec"), Some(100));
    }

    #[test]
    fn test_read_counters_missing_file() {
        let err = read_counters("/definitely/does/not/exist/cpu.stat").unwrap_err();
        assert_eq!(err.source.kind(), std::io::ErrorKind::NotFound);
    }

    #[test]
    fn test_read_counters_into_merges_formats() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("memory.stat"), "file 4096\nanon 1024\n").unwrap();
        std::fs::write(dir.path().join("memory.max"), "max\n").unwrap();

        let mut counters = RawCounters::new();
        read_counters_into(
            &mut counters,
            dir.path().join("memory.stat"),
            CounterFormat::KeyValue { prefix: "" },
        )
        .unwrap();
        read_counters_into(
            &mut counters,
            dir.path().join("memory.max"),
            CounterFormat::Scalar { key: "limit" },
        )
        .unwrap();

        assert_eq!(counters.get("file"), Some(4096));
        assert_eq!(counters.get("limit"), Some(u64::MAX));
        let err = read_counters_into(
            &mut counters,
            dir.path().join("memory.current"),
            CounterFormat::Scalar { key: "usage" },
        )
        .unwrap_err();
        assert_eq!(err.source.kind(), std::io::ErrorKind::NotFound);
        assert_eq!(counters.len(), 3);
    }
}
