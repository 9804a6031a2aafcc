//! Shard-key comparison over the cluster routing metadata.

use std::collections::{BTreeMap, BTreeSet};

use mongodb::bson::{doc, Document};
use moray_core::client::MongoHandle;
use moray_core::error::ClientError;

use crate::report::{Mismatch, MismatchRecord};

use super::documents_equal;

/// The sharding state of one namespace from `config.collections`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ShardedCollection {
    pub key: Document,
    pub unique: bool,
}

/// Reads the routing metadata of a sharded cluster.
pub(crate) async fn fetch_sharded_collections(
    handle: &MongoHandle,
) -> Result<BTreeMap<String, ShardedCollection>, ClientError> {
    let replies = handle
        .cursor_command("config", doc! { "find": "collections", "filter": {} })
        .await?;

    let mut collections = BTreeMap::new();
    for reply in replies {
        let Ok(namespace) = reply.get_str("_id") else {
            continue;
        };
        // The config database tracks itself and internal namespaces.
        if namespace.starts_with("config.") || namespace.starts_with("admin.") {
            continue;
        }
        // Legacy metadata keeps dropped collections around.
        if reply.get_bool("dropped").unwrap_or(false) {
            continue;
        }
        let Ok(key) = reply.get_document("key") else {
            continue;
        };

        collections.insert(
            namespace.to_string(),
            ShardedCollection {
                key: key.clone(),
                unique: reply.get_bool("unique").unwrap_or(false),
            },
        );
    }

    Ok(collections)
}

/// Compares sharded-vs-unsharded status, shard-key pattern, and the
/// key's uniqueness flag per namespace.
pub(crate) fn diff_sharding(
    src: &BTreeMap<String, ShardedCollection>,
    dst: &BTreeMap<String, ShardedCollection>,
) -> Vec<MismatchRecord> {
    let mut records = Vec::new();

    let namespaces: BTreeSet<&String> = src.keys().chain(dst.keys()).collect();
    for namespace in namespaces {
        match (src.get(namespace), dst.get(namespace)) {
            (Some(s), Some(d)) => {
                if !documents_equal(&s.key, &d.key) {
                    records.push(MismatchRecord::new(namespace, Mismatch::ShardKeyMismatch));
                }
                if s.unique != d.unique {
                    records.push(MismatchRecord::new(
                        namespace,
                        Mismatch::ShardKeyUniquenessMismatch,
                    ));
                }
            }
            // Sharded on one side only.
            _ => {
                records.push(MismatchRecord::new(
                    namespace,
                    Mismatch::ShardingStatusMismatch,
                ));
            }
        }
    }

    records
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sharded(entries: Vec<(&str, Document, bool)>) -> BTreeMap<String, ShardedCollection> {
        entries
            .into_iter()
            .map(|(ns, key, unique)| (ns.to_string(), ShardedCollection { key, unique }))
            .collect()
    }

    #[test]
    fn test_identical_sharding() {
        let side = sharded(vec![("app.orders", doc! { "user": "hashed" }, false)]);
        assert!(diff_sharding(&side, &side.clone()).is_empty());
    }

    #[test]
    fn test_sharded_on_one_side_only() {
        let src = sharded(vec![("app.orders", doc! { "user": 1 }, false)]);
        let dst = sharded(vec![]);

        assert_eq!(
            diff_sharding(&src, &dst),
            vec![MismatchRecord::new(
                "app.orders",
                Mismatch::ShardingStatusMismatch,
            )]
        );
        // Symmetric under swap: same reason, same namespace.
        assert_eq!(diff_sharding(&dst, &src), diff_sharding(&src, &dst));
    }

    #[test]
    fn test_key_and_uniqueness_mismatches() {
        let src = sharded(vec![("app.orders", doc! { "user": 1 }, true)]);
        let dst = sharded(vec![("app.orders", doc! { "user": "hashed" }, false)]);

        let records = diff_sharding(&src, &dst);
        assert_eq!(records.len(), 2);
        assert!(records.contains(&MismatchRecord::new(
            "app.orders",
            Mismatch::ShardKeyMismatch
        )));
        assert!(records.contains(&MismatchRecord::new(
            "app.orders",
            Mismatch::ShardKeyUniquenessMismatch
        )));
    }

    #[test]
    fn test_numeric_key_encoding_is_normalized() {
        let src = sharded(vec![("app.orders", doc! { "user": 1 }, false)]);
        let dst = sharded(vec![("app.orders", doc! { "user": 1.0 }, false)]);
        assert!(diff_sharding(&src, &dst).is_empty());
    }
}
