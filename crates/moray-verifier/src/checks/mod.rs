//! The five comparison dimensions.
//!
//! Each sub-check is split into a fetch step (driver I/O against one
//! side) and a pure diff function over the fetched snapshots, so the
//! comparison logic is exercised by tests without a server. Sub-checks
//! are independent: each emits its own records and the report merges
//! them with set semantics.

pub(crate) mod counts;
pub(crate) mod hash;
pub(crate) mod indexes;
pub(crate) mod metadata;
pub(crate) mod sharding;

use mongodb::bson::{Bson, Document};

/// True for `system.*` collections, which no sub-check compares.
pub(crate) fn is_system_collection(name: &str) -> bool {
    name.starts_with("system.")
}

/// Structural BSON equality with numeric normalization.
///
/// Servers encode the same index option as int32, int64, or double
/// depending on the client that created it; numeric leaves compare by
/// value. Document comparison is order-sensitive, which is what key
/// patterns require.
pub(crate) fn bson_values_equal(a: &Bson, b: &Bson) -> bool {
    if let (Some(x), Some(y)) = (numeric_value(a), numeric_value(b)) {
        return x == y;
    }

    match (a, b) {
        (Bson::Document(a), Bson::Document(b)) => documents_equal(a, b),
        (Bson::Array(a), Bson::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| bson_values_equal(x, y))
        }
        _ => a == b,
    }
}

/// Order-sensitive document equality over [`bson_values_equal`].
pub(crate) fn documents_equal(a: &Document, b: &Document) -> bool {
    a.len() == b.len()
        && a.iter()
            .zip(b.iter())
            .all(|((ka, va), (kb, vb))| ka == kb && bson_values_equal(va, vb))
}

fn numeric_value(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(v) => Some(f64::from(*v)),
        Bson::Int64(v) => Some(*v as f64),
        Bson::Double(v) => Some(*v),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::doc;

    #[test]
    fn test_is_system_collection() {
        assert!(is_system_collection("system.views"));
        assert!(!is_system_collection("orders"));
    }

    #[test]
    fn test_numeric_normalization() {
        assert!(bson_values_equal(&Bson::Int32(1), &Bson::Double(1.0)));
        assert!(bson_values_equal(&Bson::Int64(3600), &Bson::Int32(3600)));
        assert!(!bson_values_equal(&Bson::Int32(1), &Bson::Int32(2)));
    }

    #[test]
    fn test_document_equality_is_order_sensitive() {
        let a = doc! { "a": 1, "b": 1 };
        let b = doc! { "b": 1, "a": 1 };
        assert!(!documents_equal(&a, &b));
        assert!(documents_equal(&a, &doc! { "a": 1.0, "b": 1 }));
    }

    #[test]
    fn test_nested_comparison() {
        let a = doc! { "collation": { "locale": "en", "strength": 2 } };
        let b = doc! { "collation": { "locale": "en", "strength": 2.0 } };
        assert!(documents_equal(&a, &b));

        let c = doc! { "collation": { "locale": "fr", "strength": 2 } };
        assert!(!documents_equal(&a, &c));
    }
}
