//! Static user directory for sample hosts and tests.
//!
//! Plain-text passwords and fixed tickets; real deployments plug their own verifiers into
//! the strategies instead.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::authenticator::{CredentialVerifier, TicketVerifier};
use crate::principal::Principal;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserRecord {
    pub password: String,
    #[serde(default)]
    pub groups: BTreeSet<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StaticDirectory {
    #[serde(default)]
    pub users: HashMap<String, UserRecord>,
    /// ticket -> user name
    #[serde(default)]
    pub tickets: HashMap<String, String>,
}

impl StaticDirectory {
    pub fn new() -> Self { Self::default() }

    pub fn with_user(mut self, name: &str, password: &str, groups: &[&str]) -> Self {
        let record = UserRecord { password: password.to_string(), groups: groups.iter().map(|g| g.to_string()).collect() };
        self.users.insert(name.to_string(), record);
        self
    }

    pub fn with_ticket(mut self, ticket: &str, user: &str) -> Self {
        self.tickets.insert(ticket.to_string(), user.to_string());
        self
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).with_context(|| format!("Failed to read user directory: {}", path.display()))?;
        serde_json::from_slice(&bytes).with_context(|| format!("Invalid user directory JSON in {}", path.display()))
    }

    fn principal(&self, name: &str) -> Option<Principal> {
        let rec = self.users.get(name)?;
        Some(Principal::new(name, rec.groups.iter().cloned()))
    }
}

impl CredentialVerifier for StaticDirectory {
    fn check_credentials(&self, username: &str, password: &str) -> bool {
        self.users.get(username).is_some_and(|u| u.password == password)
    }

    fn load_principal(&self, username: &str) -> Option<Principal> { self.principal(username) }
}

impl TicketVerifier for StaticDirectory {
    fn verify(&self, ticket: &str) -> Option<Principal> {
        let user = self.tickets.get(ticket)?;
        self.principal(user)
    }
}
