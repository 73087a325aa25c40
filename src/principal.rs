use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// Verified identity: a name plus its group memberships.
///
/// Built by an authenticator once credentials check out and never mutated afterwards;
/// equality covers both name and groups.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Principal {
    name: String,
    #[serde(default)]
    groups: BTreeSet<String>,
}

impl Principal {
    pub fn new<N, I, G>(name: N, groups: I) -> Self
    where
        N: Into<String>,
        I: IntoIterator<Item = G>,
        G: Into<String>,
    {
        Self { name: name.into(), groups: groups.into_iter().map(Into::into).collect() }
    }

    pub fn with_groups(name: &str, groups: &[&str]) -> Self {
        Self::new(name, groups.iter().copied())
    }

    pub fn name(&self) -> &str { &self.name }

    pub fn groups(&self) -> &BTreeSet<String> { &self.groups }

    pub fn has_group(&self, group: &str) -> bool { self.groups.contains(group) }
}

impl Display for Principal {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let groups: Vec<&str> = self.groups.iter().map(String::as_str).collect();
        write!(f, "{} ({})", self.name, groups.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups_are_deduplicated_and_ordered() {
        let p = Principal::with_groups("alice", &["user", "admin", "user"]);
        assert_eq!(p.name(), "alice");
        assert_eq!(p.groups().len(), 2);
        assert!(p.has_group("admin"));
        assert!(!p.has_group("guest"));
        assert_eq!(p.to_string(), "alice (admin, user)");
    }

    #[test]
    fn equality_covers_groups() {
        let a = Principal::with_groups("bob", &["user"]);
        let b = Principal::with_groups("bob", &["user", "admin"]);
        assert_ne!(a, b);
        assert_eq!(a, Principal::new("bob", vec!["user".to_string()]));
    }

    #[test]
    fn json_shape() {
        let p = Principal::with_groups("carol", &["ops"]);
        let v = serde_json::to_value(&p).unwrap();
        assert_eq!(v, serde_json::json!({"name": "carol", "groups": ["ops"]}));
        let back: Principal = serde_json::from_value(serde_json::json!({"name": "carol"})).unwrap();
        assert!(back.groups().is_empty());
    }
}
