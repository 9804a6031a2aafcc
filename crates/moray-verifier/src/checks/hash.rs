//! Database content-hash comparison (`dbHash`).

use std::collections::{BTreeMap, BTreeSet};

use mongodb::bson::doc;
use moray_core::client::MongoHandle;
use moray_core::error::ClientError;

use crate::report::{Mismatch, MismatchRecord};

use super::is_system_collection;

/// The `dbHash` reply for one database: per-collection hashes plus the
/// database-level md5.
#[derive(Debug, Clone, Default)]
pub(crate) struct DatabaseHash {
    pub md5: Option<String>,
    pub collections: BTreeMap<String, String>,
}

pub(crate) async fn fetch_database_hash(
    handle: &MongoHandle,
    db: &str,
) -> Result<DatabaseHash, ClientError> {
    let reply = handle.command(db, doc! { "dbHash": 1 }).await?;

    let collections = reply
        .get_document("collections")
        .map(|collections| {
            collections
                .iter()
                .filter_map(|(name, hash)| {
                    hash.as_str().map(|h| (name.clone(), h.to_string()))
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(DatabaseHash {
        md5: reply.get_str("md5").ok().map(str::to_string),
        collections,
    })
}

pub(crate) fn diff_database_hashes(
    db: &str,
    src: &DatabaseHash,
    dst: &DatabaseHash,
) -> Vec<MismatchRecord> {
    let mut records = Vec::new();

    let names: BTreeSet<&String> = src.collections.keys().chain(dst.collections.keys()).collect();
    for name in names {
        if is_system_collection(name) {
            continue;
        }
        let namespace = format!("{db}.{name}");

        match (src.collections.get(name), dst.collections.get(name)) {
            (Some(s), Some(d)) if s != d => {
                records.push(MismatchRecord::new(namespace, Mismatch::HashMismatch));
            }
            (Some(_), Some(_)) => {}
            (Some(_), None) => {
                records.push(MismatchRecord::new(namespace, Mismatch::MissingInDst));
            }
            (None, Some(_)) => {
                records.push(MismatchRecord::new(namespace, Mismatch::MissingInSrc));
            }
            (None, None) => unreachable!(),
        }
    }

    if let (Some(s), Some(d)) = (&src.md5, &dst.md5) {
        if s != d {
            records.push(MismatchRecord::new(db, Mismatch::HashMismatch));
        }
    }

    records
}
