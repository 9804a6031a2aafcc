//! Mismatch records and the comparison report.

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

/// Why an entity differs between source and destination.
///
/// Labels are symmetric: swapping the compared sides swaps
/// `MissingInSrc`/`MissingInDst` (and the index variants) and leaves the
/// structural reasons unchanged.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Mismatch {
    /// Present only on the destination side.
    MissingInSrc,

    /// Present only on the source side.
    MissingInDst,

    /// Content hashes differ.
    HashMismatch,

    /// Document counts differ.
    CountMismatch {
        /// Count on the source side.
        src: u64,
        /// Count on the destination side.
        dst: u64,
    },

    /// Collection type differs (collection vs view vs timeseries).
    TypeMismatch,

    /// Collection options differ.
    OptionsMismatch,

    /// The `_id` index definition differs.
    IdIndexMismatch,

    /// An index exists only on the destination side.
    IndexMissingInSrc {
        /// Index name.
        index: String,
    },

    /// An index exists only on the source side.
    IndexMissingInDst {
        /// Index name.
        index: String,
    },

    /// An index exists on both sides with different definitions.
    IndexMismatch {
        /// Index name.
        index: String,
    },

    /// Sharded on one side, unsharded on the other.
    ShardingStatusMismatch,

    /// Shard key patterns differ.
    ShardKeyMismatch,

    /// Shard key uniqueness flags differ.
    ShardKeyUniquenessMismatch,
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingInSrc => write!(f, "missing in src DB"),
            Self::MissingInDst => write!(f, "missing in dst DB"),
            Self::HashMismatch => write!(f, "hash mismatch"),
            Self::CountMismatch { src, dst } => {
                write!(f, "record count mismatch (src={src}, dst={dst})")
            }
            Self::TypeMismatch => write!(f, "collection type mismatch"),
            Self::OptionsMismatch => write!(f, "collection options mismatch"),
            Self::IdIndexMismatch => write!(f, "idIndex mismatch"),
            Self::IndexMissingInSrc { index } => write!(f, "index {index} missing in src"),
            Self::IndexMissingInDst { index } => write!(f, "index {index} missing in dst"),
            Self::IndexMismatch { index } => write!(f, "index {index} definition mismatch"),
            Self::ShardingStatusMismatch => write!(f, "sharded on one side only"),
            Self::ShardKeyMismatch => write!(f, "shard key mismatch"),
            Self::ShardKeyUniquenessMismatch => write!(f, "shard key uniqueness mismatch"),
        }
    }
}

/// One detected difference: the entity (database, namespace) plus the
/// reason.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct MismatchRecord {
    /// What differs: a database (`"app"`) or a namespace
    /// (`"app.orders"`).
    pub entity: String,

    /// How it differs.
    pub reason: Mismatch,
}

impl MismatchRecord {
    /// Creates a record.
    pub fn new(entity: impl Into<String>, reason: Mismatch) -> Self {
        Self {
            entity: entity.into(),
            reason,
        }
    }
}

impl fmt::Display for MismatchRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.entity, self.reason)
    }
}

/// The merged result of all sub-checks.
///
/// Records are kept with set semantics: order-independent and
/// deduplicated, so a difference reported by two sub-checks appears
/// once.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Report {
    mismatches: BTreeSet<MismatchRecord>,
}

impl Report {
    /// Creates an empty report.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one record.
    pub fn record(&mut self, entity: impl Into<String>, reason: Mismatch) {
        self.mismatches.insert(MismatchRecord::new(entity, reason));
    }

    /// Merges records from a sub-check.
    pub fn extend(&mut self, records: impl IntoIterator<Item = MismatchRecord>) {
        self.mismatches.extend(records);
    }

    /// True when no differences were found.
    pub fn is_consistent(&self) -> bool {
        self.mismatches.is_empty()
    }

    /// Number of distinct differences.
    pub fn len(&self) -> usize {
        self.mismatches.len()
    }

    /// True when the report holds no records.
    pub fn is_empty(&self) -> bool {
        self.mismatches.is_empty()
    }

    /// Iterates over the records in entity order.
    pub fn mismatches(&self) -> impl Iterator<Item = &MismatchRecord> {
        self.mismatches.iter()
    }

    /// True if the report contains the given record.
    pub fn contains(&self, entity: &str, reason: &Mismatch) -> bool {
        self.mismatches
            .iter()
            .any(|r| r.entity == entity && &r.reason == reason)
    }

    /// Decomposes into the `(consistent, mismatches)` pair.
    pub fn into_parts(self) -> (bool, Vec<MismatchRecord>) {
        let consistent = self.mismatches.is_empty();
        (consistent, self.mismatches.into_iter().collect())
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_consistent() {
            write!(f, "consistent")
        } else {
            writeln!(f, "{} mismatches:", self.len())?;
            for record in &self.mismatches {
                writeln!(f, "  {record}")?;
            }
            Ok(())
        }
    }
}
