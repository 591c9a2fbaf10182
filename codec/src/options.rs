//! Read and write options.

use wire::Limits;

/// Options for reading a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadOptions {
    /// Structural decode limits.
    pub limits: Limits,
    /// Row count at which [`RecordSet::rows`](crate::RecordSet::rows) decodes in parallel.
    pub parallel_threshold: usize,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            limits: Limits::default(),
            parallel_threshold: 4096,
        }
    }
}

impl ReadOptions {
    /// Creates options suitable for testing with smaller values.
    #[must_use]
    pub const fn for_testing() -> Self {
        Self {
            limits: Limits::for_testing(),
            parallel_threshold: 64,
        }
    }

    /// Creates options with no restrictions (use with caution).
    #[must_use]
    pub const fn unlimited() -> Self {
        Self {
            limits: Limits::unlimited(),
            parallel_threshold: usize::MAX,
        }
    }
}

/// What the writer stores in the WDB2 timestamp field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimestampPolicy {
    /// Keep the template's timestamp.
    #[default]
    Preserve,
    /// Use the given Unix time.
    Refresh(u32),
}

/// Options for writing a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOptions {
    /// Replace byte-identical records with copy-table entries.
    pub collapse_copies: bool,
    pub timestamp: TimestampPolicy,
    /// Sparse records are padded to a multiple of this many bytes.
    pub sparse_row_alignment: usize,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            collapse_copies: true,
            timestamp: TimestampPolicy::Preserve,
            sparse_row_alignment: 1,
        }
    }
}

impl WriteOptions {
    /// Options that write every row as a record.
    #[must_use]
    pub const fn without_copies() -> Self {
        Self {
            collapse_copies: false,
            timestamp: TimestampPolicy::Preserve,
            sparse_row_alignment: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let read = ReadOptions::default();
        assert_eq!(read.limits, Limits::default());
        assert_eq!(read.parallel_threshold, 4096);

        let write = WriteOptions::default();
        assert!(write.collapse_copies);
        assert_eq!(write.timestamp, TimestampPolicy::Preserve);
        assert_eq!(write.sparse_row_alignment, 1);
    }

    #[test]
    fn testing_is_smaller() {
        let testing = ReadOptions::for_testing();
        let default = ReadOptions::default();
        assert!(testing.limits.max_records < default.limits.max_records);
        assert!(testing.parallel_threshold < default.parallel_threshold);
    }

    #[test]
    fn without_copies() {
        assert!(!WriteOptions::without_copies().collapse_copies);
    }
}
