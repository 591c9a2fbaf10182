//! Configurable limits for bounded decoding.

use crate::error::{DecodeError, LimitKind, WireResult};

/// Decode limits applied to declared counts before any region is walked.
///
/// Declared counts come straight from untrusted headers, so each is checked
/// against these bounds before it sizes an allocation or a loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limits {
    /// Maximum number of data sections in one file.
    pub max_sections: usize,

    /// Maximum number of physical fields per record.
    pub max_fields: usize,

    /// Maximum number of records (including copy rows and sparse slots).
    pub max_records: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            // Locale splits rarely exceed a couple dozen sections
            max_sections: 32,
            max_fields: 1024,
            max_records: 4 * 1024 * 1024,
        }
    }
}

impl Limits {
    /// Creates limits suitable for testing with smaller values.
    #[must_use]
    pub const fn for_testing() -> Self {
        Self {
            max_sections: 4,
            max_fields: 64,
            max_records: 4096,
        }
    }

    /// Creates limits with no restrictions (use with caution).
    #[must_use]
    pub const fn unlimited() -> Self {
        Self {
            max_sections: usize::MAX,
            max_fields: usize::MAX,
            max_records: usize::MAX,
        }
    }

    /// Checks a declared count against the matching limit.
    pub fn check(&self, kind: LimitKind, actual: usize) -> WireResult<()> {
        let limit = match kind {
            LimitKind::SectionCount => self.max_sections,
            LimitKind::FieldCount => self.max_fields,
            LimitKind::RecordCount => self.max_records,
        };
        if actual > limit {
            return Err(DecodeError::LimitsExceeded {
                kind,
                limit,
                actual,
            });
        }
        Ok(())
    }
}
