//! Collection metadata comparison (`listCollections`).

use std::collections::{BTreeMap, BTreeSet};

use mongodb::bson::{doc, Document};
use moray_core::client::MongoHandle;
use moray_core::error::ClientError;

use crate::report::{Mismatch, MismatchRecord};

use super::{documents_equal, is_system_collection};

/// One collection's metadata as reported by `listCollections`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct CollectionInfo {
    pub name: String,
    pub coll_type: String,
    pub options: Document,
    pub id_index: Option<Document>,
}

impl CollectionInfo {
    /// True for plain collections (views have no indexes to compare).
    pub(crate) fn is_view(&self) -> bool {
        self.coll_type == "view"
    }
}

pub(crate) async fn fetch_collections(
    handle: &MongoHandle,
    db: &str,
) -> Result<BTreeMap<String, CollectionInfo>, ClientError> {
    let replies = handle
        .cursor_command(db, doc! { "listCollections": 1 })
        .await?;

    let mut collections = BTreeMap::new();
    for reply in replies {
        let Ok(name) = reply.get_str("name") else {
            continue;
        };
        if is_system_collection(name) {
            continue;
        }

        collections.insert(
            name.to_string(),
            CollectionInfo {
                name: name.to_string(),
                coll_type: reply.get_str("type").unwrap_or("collection").to_string(),
                options: reply.get_document("options").cloned().unwrap_or_default(),
                id_index: reply
                    .get_document("idIndex")
                    .ok()
                    .cloned()
                    .map(normalize_id_index),
            },
        );
    }

    Ok(collections)
}

/// Older servers embed the namespace in `idIndex`; strip it so the same
/// index compares equal across versions.
fn normalize_id_index(mut index: Document) -> Document {
    index.remove("ns");
    index
}

pub(crate) fn diff_collections(
    db: &str,
    src: &BTreeMap<String, CollectionInfo>,
    dst: &BTreeMap<String, CollectionInfo>,
) -> Vec<MismatchRecord> {
    let mut records = Vec::new();

    let names: BTreeSet<&String> = src.keys().chain(dst.keys()).collect();
    for name in names {
        let namespace = format!("{db}.{name}");

        match (src.get(name), dst.get(name)) {
            (Some(s), Some(d)) => {
                if s.coll_type != d.coll_type {
                    records.push(MismatchRecord::new(&namespace, Mismatch::TypeMismatch));
                }
                if !documents_equal(&s.options, &d.options) {
                    records.push(MismatchRecord::new(&namespace, Mismatch::OptionsMismatch));
                }
                let id_index_equal = match (&s.id_index, &d.id_index) {
                    (Some(a), Some(b)) => documents_equal(a, b),
                    (None, None) => true,
                    _ => false,
                };
                if !id_index_equal {
                    records.push(MismatchRecord::new(&namespace, Mismatch::IdIndexMismatch));
                }
            }
            (Some(_), None) => {
                records.push(MismatchRecord::new(&namespace, Mismatch::MissingInDst));
            }
            (None, Some(_)) => {
                records.push(MismatchRecord::new(&namespace, Mismatch::MissingInSrc));
            }
            (None, None) => unreachable!(),
        }
    }

    records
}
