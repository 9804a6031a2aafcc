//! The verifier: orchestrates the five sub-checks over two live
//! topologies.

use std::collections::BTreeSet;

use moray_core::client::MongoHandle;
use moray_core::conn::ConnectionSource;
use tracing::{debug, info};

use crate::checks::{counts, hash, indexes, metadata, sharding};
use crate::error::Result;
use crate::report::Report;

/// Databases no comparison ever looks at.
const ADMINISTRATIVE_DATABASES: &[&str] = &["admin", "config", "local"];

/// Verifier configuration.
#[derive(Debug, Clone)]
pub struct VerifierOptions {
    /// Databases excluded from every sub-check: the administrative
    /// databases plus the migration tool's own bookkeeping databases.
    pub excluded_databases: BTreeSet<String>,

    /// Run the `dbHash` comparison even when a side is sharded.
    ///
    /// `dbHash` is not cluster-consistent for sharded collections, so
    /// this is off by default; the skip is this explicit flag, not a
    /// silent drop.
    pub hash_sharded_collections: bool,

    /// Compare shard-key configuration when both sides are sharded.
    pub compare_sharding: bool,
}

impl Default for VerifierOptions {
    fn default() -> Self {
        Self {
            excluded_databases: ADMINISTRATIVE_DATABASES
                .iter()
                .map(|db| db.to_string())
                .collect(),
            hash_sharded_collections: false,
            compare_sharding: true,
        }
    }
}

impl VerifierOptions {
    /// Excludes one more database (a tool's bookkeeping database).
    pub fn exclude_database(mut self, db: impl Into<String>) -> Self {
        self.excluded_databases.insert(db.into());
        self
    }

    /// Excludes several databases.
    pub fn exclude_databases<I, S>(mut self, dbs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excluded_databases
            .extend(dbs.into_iter().map(Into::into));
        self
    }

    /// Enables hashing of sharded topologies.
    pub fn hash_sharded(mut self, enabled: bool) -> Self {
        self.hash_sharded_collections = enabled;
        self
    }
}

/// Compares two live topologies for semantic data equivalence.
#[derive(Debug, Clone, Default)]
pub struct Verifier {
    options: VerifierOptions,
}

impl Verifier {
    /// Creates a verifier with default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a verifier with the given options.
    pub fn with_options(options: VerifierOptions) -> Self {
        Self { options }
    }

    /// Returns the configuration.
    pub fn options(&self) -> &VerifierOptions {
        &self.options
    }

    /// Runs all sub-checks and returns the merged report.
    ///
    /// Issues only read-only commands; neither topology is mutated.
    /// Data differences land in the report; a connection or command
    /// failure on either side aborts with an error.
    pub async fn compare(
        &self,
        source: &dyn ConnectionSource,
        destination: &dyn ConnectionSource,
    ) -> Result<Report> {
        let src = MongoHandle::connect(&source.connection_uri()).await?;
        let dst = MongoHandle::connect(&destination.connection_uri()).await?;

        let src_hello = src.hello().await?;
        let dst_hello = dst.hello().await?;
        let any_sharded = src_hello.is_mongos() || dst_hello.is_mongos();

        let databases = self.databases_to_compare(&src, &dst).await?;
        info!(
            databases = databases.len(),
            src_sharded = src_hello.is_mongos(),
            dst_sharded = dst_hello.is_mongos(),
            "Comparing topologies"
        );

        let mut report = Report::new();

        if any_sharded && !self.options.hash_sharded_collections {
            // dbHash is not cluster-consistent across shards.
            info!("Skipping dbHash comparison for sharded topology");
        } else {
            for db in &databases {
                let src_hash = hash::fetch_database_hash(&src, db).await?;
                let dst_hash = hash::fetch_database_hash(&dst, db).await?;
                report.extend(hash::diff_database_hashes(db, &src_hash, &dst_hash));
            }
        }

        for db in &databases {
            let src_collections = metadata::fetch_collections(&src, db).await?;
            let dst_collections = metadata::fetch_collections(&dst, db).await?;
            report.extend(metadata::diff_collections(
                db,
                &src_collections,
                &dst_collections,
            ));

            let common: BTreeSet<String> = src_collections
                .keys()
                .filter(|name| dst_collections.contains_key(*name))
                .cloned()
                .collect();

            let src_counts = counts::fetch_counts(&src, db, &common).await;
            let dst_counts = counts::fetch_counts(&dst, db, &common).await;
            report.extend(counts::diff_counts(db, &src_counts, &dst_counts));

            for name in &common {
                // Views have no indexes of their own.
                if src_collections[name].is_view() || dst_collections[name].is_view() {
                    continue;
                }
                let namespace = format!("{db}.{name}");
                let src_indexes = indexes::fetch_indexes(&src, db, name).await?;
                let dst_indexes = indexes::fetch_indexes(&dst, db, name).await?;
                report.extend(indexes::diff_indexes(&namespace, &src_indexes, &dst_indexes));
            }
        }

        if self.options.compare_sharding && src_hello.is_mongos() && dst_hello.is_mongos() {
            let src_sharded = sharding::fetch_sharded_collections(&src).await?;
            let dst_sharded = sharding::fetch_sharded_collections(&dst).await?;
            report.extend(sharding::diff_sharding(&src_sharded, &dst_sharded));
        }

        info!(
            consistent = report.is_consistent(),
            mismatches = report.len(),
            "Comparison complete"
        );

        Ok(report)
    }

    async fn databases_to_compare(
        &self,
        src: &MongoHandle,
        dst: &MongoHandle,
    ) -> Result<BTreeSet<String>> {
        let mut databases = BTreeSet::new();
        databases.extend(src.list_database_names().await?);
        databases.extend(dst.list_database_names().await?);

        let filtered: BTreeSet<String> = databases
            .into_iter()
            .filter(|db| !self.options.excluded_databases.contains(db))
            .collect();

        debug!(databases = ?filtered, "Databases selected for comparison");
        Ok(filtered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_exclusions() {
        let options = VerifierOptions::default();
        for db in ["admin", "config", "local"] {
            assert!(options.excluded_databases.contains(db));
        }
        assert!(!options.hash_sharded_collections);
        assert!(options.compare_sharding);
    }

    #[test]
    fn test_tool_bookkeeping_exclusions() {
        let options = VerifierOptions::default()
            .exclude_database("percona_backup_mongodb")
            .exclude_databases(["mongolink_meta", "clustersync_meta"]);

        assert!(options.excluded_databases.contains("percona_backup_mongodb"));
        assert!(options.excluded_databases.contains("mongolink_meta"));
        assert!(options.excluded_databases.contains("clustersync_meta"));
        assert!(options.excluded_databases.contains("admin"));
    }

    #[test]
    fn test_hash_sharded_flag() {
        let options = VerifierOptions::default().hash_sharded(true);
        assert!(options.hash_sharded_collections);
    }
}
