//! Per-collection record-count comparison.

use std::collections::{BTreeMap, BTreeSet};

use mongodb::bson::doc;
use moray_core::client::MongoHandle;
use tracing::warn;

use crate::report::{Mismatch, MismatchRecord};

/// Counts every listed collection on one side.
///
/// A failure counting one collection logs a warning and skips that
/// collection; it never fails the run. Collections that could not be
/// counted are absent from the map and therefore not compared.
pub(crate) async fn fetch_counts(
    handle: &MongoHandle,
    db: &str,
    collections: &BTreeSet<String>,
) -> BTreeMap<String, u64> {
    let mut counts = BTreeMap::new();

    for name in collections {
        match handle.count_documents(db, name, doc! {}).await {
            Ok(count) => {
                counts.insert(name.clone(), count);
            }
            Err(e) => {
                warn!(
                    namespace = %format!("{db}.{name}"),
                    error = %e,
                    "Count failed; skipping collection"
                );
            }
        }
    }

    counts
}

/// Compares counts for collections counted on both sides.
///
/// One-sided collections are the metadata check's finding, not this
/// one's.
pub(crate) fn diff_counts(
    db: &str,
    src: &BTreeMap<String, u64>,
    dst: &BTreeMap<String, u64>,
) -> Vec<MismatchRecord> {
    let mut records = Vec::new();

    for (name, src_count) in src {
        if let Some(dst_count) = dst.get(name) {
            if src_count != dst_count {
                records.push(MismatchRecord::new(
                    format!("{db}.{name}"),
                    Mismatch::CountMismatch {
                        src: *src_count,
                        dst: *dst_count,
                    },
                ));
            }
        }
    }

    records
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(entries: &[(&str, u64)]) -> BTreeMap<String, u64> {
        entries
            .iter()
            .map(|(n, c)| (n.to_string(), *c))
            .collect()
    }

    #[test]
    fn test_equal_counts() {
        let side = counts(&[("orders", 100), ("users", 3)]);
        assert!(diff_counts("app", &side, &side.clone()).is_empty());
    }

    #[test]
    fn test_differing_counts() {
        let src = counts(&[("orders", 100)]);
        let dst = counts(&[("orders", 98)]);

        let records = diff_counts("app", &src, &dst);
        assert_eq!(
            records,
            vec![MismatchRecord::new(
                "app.orders",
                Mismatch::CountMismatch { src: 100, dst: 98 },
            )]
        );
    }

    #[test]
    fn test_one_sided_collections_not_reported_here() {
        let src = counts(&[("orders", 100), ("only_src", 5)]);
        let dst = counts(&[("orders", 100)]);
        assert!(diff_counts("app", &src, &dst).is_empty());
    }
}
