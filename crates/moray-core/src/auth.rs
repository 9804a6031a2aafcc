//! Credentials for the well-known harness accounts.
//!
//! Every provisioned topology carries the same three accounts: the root
//! administrative user, an internal service user for the harness itself,
//! and the account the migration tool under test authenticates with.
//! Connection-string builders select one of them by [`CredentialRole`].

use serde::{Deserialize, Serialize};

/// A username/password pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Account name.
    pub username: String,

    /// Account password.
    pub password: String,
}

impl Credentials {
    /// Creates a new credential pair.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

/// Which harness account a connection string should authenticate as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CredentialRole {
    /// The root administrative user.
    Root,

    /// The internal service user used by the harness itself.
    Internal,

    /// The migration tool's service account.
    Tool,
}

/// The fixed account set bootstrapped on every topology.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialSet {
    /// Root administrative user.
    pub root: Credentials,

    /// Internal service user.
    pub internal: Credentials,

    /// Tool service account.
    pub tool: Credentials,
}

impl CredentialSet {
    /// Creates a credential set from the three accounts.
    pub fn new(root: Credentials, internal: Credentials, tool: Credentials) -> Self {
        Self {
            root,
            internal,
            tool,
        }
    }

    /// Well-known accounts for disposable test topologies.
    ///
    /// These are deliberately fixed: the clusters live inside a private
    /// container network and exist for minutes.
    pub fn for_harness() -> Self {
        Self {
            root: Credentials::new("root", "root"),
            internal: Credentials::new("moray", "moraypass"),
            tool: Credentials::new("service", "servicepass"),
        }
    }

    /// Returns the credentials for a role.
    pub fn get(&self, role: CredentialRole) -> &Credentials {
        match role {
            CredentialRole::Root => &self.root,
            CredentialRole::Internal => &self.internal,
            CredentialRole::Tool => &self.tool,
        }
    }
}

impl Default for CredentialSet {
    fn default() -> Self {
        Self::for_harness()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_lookup() {
        let set = CredentialSet::for_harness();
        assert_eq!(set.get(CredentialRole::Root).username, "root");
        assert_eq!(set.get(CredentialRole::Internal).username, "moray");
        assert_eq!(set.get(CredentialRole::Tool).username, "service");
    }
}
