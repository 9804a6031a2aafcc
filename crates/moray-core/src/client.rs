//! Thin typed wrapper over the MongoDB driver.
//!
//! All administrative traffic from the harness flows through
//! [`MongoHandle`]: commands are built with the `doc!` macro and sent via
//! the driver's generic command execution, so there is no string-composed
//! shell code anywhere in the wire path. The wrapper also normalizes
//! driver errors into [`ClientError`] so the orchestrator can match the
//! few transient server conditions it retries.

use std::time::Duration;

use mongodb::bson::{doc, Document};
use mongodb::options::ClientOptions;
use mongodb::Client;
use tracing::debug;

use crate::error::ClientError;

/// How long the driver waits for server selection before a command fails.
///
/// Kept short: the harness does its own polling with explicit timeouts
/// and wants prompt failures underneath.
const SERVER_SELECTION_TIMEOUT: Duration = Duration::from_secs(5);

/// An owned MongoDB client handle.
///
/// Created once per topology endpoint and passed explicitly to whatever
/// needs it; the harness never keeps implicit global connections.
#[derive(Debug, Clone)]
pub struct MongoHandle {
    client: Client,
}

impl MongoHandle {
    /// Connects to the given URI.
    ///
    /// The driver connects lazily, so this only fails on a malformed
    /// connection string; the first command surfaces reachability
    /// problems.
    pub async fn connect(uri: &str) -> Result<Self, ClientError> {
        let mut options = ClientOptions::parse(uri)
            .await
            .map_err(|e| ClientError::InvalidUri(e.to_string()))?;
        options.server_selection_timeout = Some(SERVER_SELECTION_TIMEOUT);

        let client = Client::with_options(options)
            .map_err(|e| ClientError::InvalidUri(e.to_string()))?;

        Ok(Self { client })
    }

    /// Returns the underlying driver client.
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Runs a command against a database and returns the reply document.
    pub async fn command(&self, db: &str, command: Document) -> Result<Document, ClientError> {
        let name = command_name(&command);
        debug!(db = %db, command = %name, "Running command");

        self.client
            .database(db)
            .run_command(command)
            .await
            .map_err(|e| ClientError::from_driver(name, e))
    }

    /// Runs a cursor-producing command and collects the full result set.
    pub async fn cursor_command(
        &self,
        db: &str,
        command: Document,
    ) -> Result<Vec<Document>, ClientError> {
        let name = command_name(&command);
        debug!(db = %db, command = %name, "Running cursor command");

        let mut cursor = self
            .client
            .database(db)
            .run_cursor_command(command)
            .await
            .map_err(|e| ClientError::from_driver(name.clone(), e))?;

        let mut documents = Vec::new();
        while cursor
            .advance()
            .await
            .map_err(|e| ClientError::from_driver(name.clone(), e))?
        {
            documents.push(
                cursor
                    .deserialize_current()
                    .map_err(|e| ClientError::from_driver(name.clone(), e))?,
            );
        }

        Ok(documents)
    }

    /// Lists database names.
    pub async fn list_database_names(&self) -> Result<Vec<String>, ClientError> {
        self.client
            .list_database_names()
            .await
            .map_err(|e| ClientError::from_driver("listDatabases", e))
    }

    /// Counts the documents in a collection that match `filter`.
    pub async fn count_documents(
        &self,
        db: &str,
        collection: &str,
        filter: Document,
    ) -> Result<u64, ClientError> {
        self.client
            .database(db)
            .collection::<Document>(collection)
            .count_documents(filter)
            .await
            .map_err(|e| ClientError::from_driver("countDocuments", e))
    }

    /// Runs `hello` and parses the topology-facing fields.
    ///
    /// `hello` is answerable before authentication, which is what lets
    /// the orchestrator watch elections on a cluster whose users do not
    /// exist yet.
    pub async fn hello(&self) -> Result<HelloStatus, ClientError> {
        let reply = self.command("admin", doc! { "hello": 1 }).await?;
        Ok(HelloStatus::from_document(&reply))
    }
}

/// The fields of a `hello` reply the harness cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelloStatus {
    /// True once the server will accept writes (primary, or mongos).
    pub is_writable_primary: bool,

    /// Replica set name, if the server is a set member.
    pub set_name: Option<String>,

    /// The member the server currently believes is primary.
    pub primary: Option<String>,

    /// Server flavor marker; `"isdbgrid"` identifies a mongos.
    pub msg: Option<String>,
}

impl HelloStatus {
    /// Extracts the status from a raw `hello` reply.
    pub fn from_document(reply: &Document) -> Self {
        Self {
            is_writable_primary: reply.get_bool("isWritablePrimary").unwrap_or(false),
            set_name: reply.get_str("setName").ok().map(str::to_string),
            primary: reply.get_str("primary").ok().map(str::to_string),
            msg: reply.get_str("msg").ok().map(str::to_string),
        }
    }

    /// Returns true if the server is a mongos router.
    pub fn is_mongos(&self) -> bool {
        self.msg.as_deref() == Some("isdbgrid")
    }

    /// One-line rendering used as the "last observed state" in timeouts.
    pub fn summary(&self) -> String {
        format!(
            "isWritablePrimary={} primary={}",
            self.is_writable_primary,
            self.primary.as_deref().unwrap_or("<none>")
        )
    }
}

fn command_name(command: &Document) -> String {
    command
        .keys()
        .next()
        .cloned()
        .unwrap_or_else(|| "<empty>".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hello_status_primary() {
        let reply = doc! {
            "isWritablePrimary": true,
            "setName": "rs0",
            "primary": "rs01:27017",
            "ok": 1.0,
        };

        let status = HelloStatus::from_document(&reply);
        assert!(status.is_writable_primary);
        assert_eq!(status.set_name.as_deref(), Some("rs0"));
        assert_eq!(status.primary.as_deref(), Some("rs01:27017"));
        assert!(!status.is_mongos());
        assert_eq!(status.summary(), "isWritablePrimary=true primary=rs01:27017");
    }

    #[test]
    fn test_hello_status_mongos() {
        let reply = doc! { "isWritablePrimary": true, "msg": "isdbgrid", "ok": 1.0 };
        let status = HelloStatus::from_document(&reply);
        assert!(status.is_mongos());
        assert_eq!(status.set_name, None);
    }

    #[test]
    fn test_hello_status_waiting_secondary() {
        let reply = doc! { "isWritablePrimary": false, "setName": "rs0", "ok": 1.0 };
        let status = HelloStatus::from_document(&reply);
        assert!(!status.is_writable_primary);
        assert_eq!(status.summary(), "isWritablePrimary=false primary=<none>");
    }

    #[test]
    fn test_command_name() {
        assert_eq!(command_name(&doc! { "addShard": "rs1/h1:27017" }), "addShard");
        assert_eq!(command_name(&doc! {}), "<empty>");
    }
}
