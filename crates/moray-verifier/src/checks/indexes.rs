//! Index definition comparison (`listIndexes`).

use std::collections::{BTreeMap, BTreeSet};

use mongodb::bson::{doc, Document};
use moray_core::client::MongoHandle;
use moray_core::error::ClientError;

use crate::report::{Mismatch, MismatchRecord};

use super::bson_values_equal;

/// The fixed field set index definitions are compared over.
///
/// Fields absent on both sides are not compared; server-maintained
/// fields like `v` and `background` are deliberately not in the list.
const COMPARED_FIELDS: &[&str] = &[
    "key",
    "unique",
    "sparse",
    "hidden",
    "storageEngine",
    "collation",
    "partialFilterExpression",
    "expireAfterSeconds",
    // text indexes
    "weights",
    "default_language",
    "language_override",
    "textIndexVersion",
    // geo indexes
    "2dsphereIndexVersion",
    "bits",
    "min",
    "max",
    // wildcard indexes
    "wildcardProjection",
];

/// Fetches one namespace's indexes keyed by index name.
pub(crate) async fn fetch_indexes(
    handle: &MongoHandle,
    db: &str,
    collection: &str,
) -> Result<BTreeMap<String, Document>, ClientError> {
    let replies = handle
        .cursor_command(db, doc! { "listIndexes": collection })
        .await?;

    let mut indexes = BTreeMap::new();
    for index in replies {
        if let Ok(name) = index.get_str("name") {
            indexes.insert(name.to_string(), index.clone());
        }
    }

    Ok(indexes)
}

/// Compares the name-keyed index maps of one namespace.
pub(crate) fn diff_indexes(
    namespace: &str,
    src: &BTreeMap<String, Document>,
    dst: &BTreeMap<String, Document>,
) -> Vec<MismatchRecord> {
    let mut records = Vec::new();

    let names: BTreeSet<&String> = src.keys().chain(dst.keys()).collect();
    for name in names {
        match (src.get(name), dst.get(name)) {
            (Some(s), Some(d)) => {
                if !index_definitions_equal(s, d) {
                    records.push(MismatchRecord::new(
                        namespace,
                        Mismatch::IndexMismatch {
                            index: name.to_string(),
                        },
                    ));
                }
            }
            (Some(_), None) => {
                records.push(MismatchRecord::new(
                    namespace,
                    Mismatch::IndexMissingInDst {
                        index: name.to_string(),
                    },
                ));
            }
            (None, Some(_)) => {
                records.push(MismatchRecord::new(
                    namespace,
                    Mismatch::IndexMissingInSrc {
                        index: name.to_string(),
                    },
                ));
            }
            (None, None) => unreachable!(),
        }
    }

    records
}

/// Structural equality over [`COMPARED_FIELDS`].
pub(crate) fn index_definitions_equal(src: &Document, dst: &Document) -> bool {
    COMPARED_FIELDS.iter().all(|field| {
        match (src.get(field), dst.get(field)) {
            (None, None) => true,
            (Some(s), Some(d)) => bson_values_equal(s, d),
            _ => false,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::Bson;

    fn index_map(indexes: Vec<Document>) -> BTreeMap<String, Document> {
        indexes
            .into_iter()
            .map(|i| (i.get_str("name").unwrap().to_string(), i))
            .collect()
    }

    fn plain_index(name: &str, key: Document) -> Document {
        doc! { "v": 2, "key": key, "name": name }
    }

    #[test]
    fn test_identical_indexes() {
        let side = index_map(vec![
            plain_index("_id_", doc! { "_id": 1 }),
            plain_index("user_1", doc! { "user": 1 }),
        ]);
        assert!(diff_indexes("app.orders", &side, &side.clone()).is_empty());
    }

    #[test]
    fn test_one_sided_indexes_symmetric_under_swap() {
        let src = index_map(vec![
            plain_index("_id_", doc! { "_id": 1 }),
            plain_index("only_src", doc! { "a": 1 }),
        ]);
        let dst = index_map(vec![plain_index("_id_", doc! { "_id": 1 })]);

        let forward = diff_indexes("app.orders", &src, &dst);
        assert_eq!(
            forward,
            vec![MismatchRecord::new(
                "app.orders",
                Mismatch::IndexMissingInDst {
                    index: "only_src".to_string()
                },
            )]
        );

        let backward = diff_indexes("app.orders", &dst, &src);
        assert_eq!(
            backward,
            vec![MismatchRecord::new(
                "app.orders",
                Mismatch::IndexMissingInSrc {
                    index: "only_src".to_string()
                },
            )]
        );
    }

    #[test]
    fn test_structural_mismatch_preserved_under_swap() {
        let mut unique = plain_index("user_1", doc! { "user": 1 });
        unique.insert("unique", true);
        let src = index_map(vec![unique]);
        let dst = index_map(vec![plain_index("user_1", doc! { "user": 1 })]);

        let expected = MismatchRecord::new(
            "app.orders",
            Mismatch::IndexMismatch {
                index: "user_1".to_string(),
            },
        );
        assert_eq!(diff_indexes("app.orders", &src, &dst), vec![expected.clone()]);
        assert_eq!(diff_indexes("app.orders", &dst, &src), vec![expected]);
    }

    #[test]
    fn test_fields_absent_on_both_sides_not_compared() {
        // Differing server-maintained fields do not matter.
        let mut a = plain_index("x_1", doc! { "x": 1 });
        a.insert("v", 1);
        let mut b = plain_index("x_1", doc! { "x": 1 });
        b.insert("v", 2);

        assert!(index_definitions_equal(&a, &b));
    }

    #[test]
    fn test_expire_after_seconds_numeric_encoding() {
        let mut a = plain_index("ttl_1", doc! { "created": 1 });
        a.insert("expireAfterSeconds", Bson::Int32(3600));
        let mut b = plain_index("ttl_1", doc! { "created": 1 });
        b.insert("expireAfterSeconds", Bson::Double(3600.0));

        assert!(index_definitions_equal(&a, &b));

        let mut c = plain_index("ttl_1", doc! { "created": 1 });
        c.insert("expireAfterSeconds", Bson::Int32(7200));
        assert!(!index_definitions_equal(&a, &c));
    }

    #[test]
    fn test_key_pattern_order_matters() {
        let a = plain_index("ab_1", doc! { "a": 1, "b": 1 });
        let b = plain_index("ab_1", doc! { "b": 1, "a": 1 });
        assert!(!index_definitions_equal(&a, &b));
    }

    #[test]
    fn test_partial_filter_and_collation() {
        let mut a = plain_index("p_1", doc! { "p": 1 });
        a.insert("partialFilterExpression", doc! { "p": { "$gt": 0 } });
        a.insert("collation", doc! { "locale": "en", "strength": 2 });

        let mut b = a.clone();
        assert!(index_definitions_equal(&a, &b));

        b.insert("collation", doc! { "locale": "en", "strength": 1 });
        assert!(!index_definitions_equal(&a, &b));
    }

    #[test]
    fn test_hidden_only_on_one_side() {
        let mut a = plain_index("h_1", doc! { "h": 1 });
        a.insert("hidden", true);
        let b = plain_index("h_1", doc! { "h": 1 });

        assert!(!index_definitions_equal(&a, &b));
    }
}
