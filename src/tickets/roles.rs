use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

/// Set of role codes held by a user.
///
/// Role columns have been written as a bare string, as a JSON array and as
/// a JSON array serialized into a text column. All of these decode into the
/// same set here, so nothing past the storage boundary has to care.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "serde_json::Value", into = "Vec<String>")]
pub struct RoleSet(BTreeSet<String>);

impl RoleSet {
    pub fn new() -> Self {
        Self(BTreeSet::new())
    }

    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::String(s) => Self::parse(s),
            serde_json::Value::Array(items) => items
                .iter()
                .filter_map(|item| item.as_str())
                .collect(),
            _ => Self::new(),
        }
    }

    /// Decodes a raw column value: JSON array text, a comma separated list
    /// or a single role code.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.starts_with('[') {
            if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) {
                return Self::from_json(&value);
            }
        }
        trimmed.split(',').collect()
    }

    pub fn contains(&self, role: &str) -> bool {
        self.0.contains(&normalize(role))
    }

    pub fn insert(&mut self, role: impl Into<String>) {
        let role = normalize(&role.into());
        if !role.is_empty() {
            self.0.insert(role);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::from(self.0.iter().cloned().collect::<Vec<_>>())
    }
}

fn normalize(role: &str) -> String {
    role.trim().trim_matches('"').trim().to_ascii_lowercase()
}

impl<S: AsRef<str>> FromIterator<S> for RoleSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = Self::new();
        for role in iter {
            set.insert(role.as_ref());
        }
        set
    }
}

impl From<serde_json::Value> for RoleSet {
    fn from(value: serde_json::Value) -> Self {
        Self::from_json(&value)
    }
}

impl From<RoleSet> for Vec<String> {
    fn from(set: RoleSet) -> Self {
        set.0.into_iter().collect()
    }
}

impl fmt::Display for RoleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined: Vec<&str> = self.iter().collect();
        write!(f, "{}", joined.join(","))
    }
}

/// Identity of the caller for a single request.
///
/// `active_role` is the role the user is currently operating as. It is a
/// claim carried with the request, never read back from the user row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorContext {
    pub user_id: Uuid,
    pub roles: RoleSet,
    pub active_role: Option<String>,
}

impl ActorContext {
    pub fn new(user_id: Uuid, roles: RoleSet) -> Self {
        Self {
            user_id,
            roles,
            active_role: None,
        }
    }

    pub fn with_active_role(mut self, role: impl Into<String>) -> Self {
        self.active_role = Some(normalize(&role.into()));
        self
    }

    /// Roles the caller may act with on this request.
    ///
    /// An active role narrows the set to that single role. An active role the
    /// user does not hold yields an empty set.
    pub fn effective_roles(&self) -> RoleSet {
        match &self.active_role {
            Some(active) if self.roles.contains(active) => {
                let mut set = RoleSet::new();
                set.insert(active.as_str());
                set
            }
            Some(_) => RoleSet::new(),
            None => self.roles.clone(),
        }
    }

    pub fn can_act_as(&self, role: &str) -> bool {
        self.effective_roles().contains(role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_accepts_every_stored_shape() {
        let expected: RoleSet = ["pegawai", "teknisi"].into_iter().collect();
        assert_eq!(RoleSet::parse(r#"["teknisi","pegawai"]"#), expected);
        assert_eq!(RoleSet::parse("teknisi, pegawai"), expected);
        assert_eq!(RoleSet::from_json(&json!(["teknisi", "pegawai"])), expected);
        assert_eq!(RoleSet::from_json(&json!("[\"teknisi\",\"pegawai\"]")), expected);
        assert_eq!(RoleSet::parse("Teknisi").len(), 1);
        assert!(RoleSet::parse("").is_empty());
        assert!(RoleSet::from_json(&json!(null)).is_empty());
    }

    #[test]
    fn test_serde_round_trip_is_array() {
        let roles: RoleSet = ["admin_layanan"].into_iter().collect();
        let value = serde_json::to_value(&roles).unwrap();
        assert_eq!(value, json!(["admin_layanan"]));
        let back: RoleSet = serde_json::from_value(json!("admin_layanan")).unwrap();
        assert_eq!(back, roles);
    }

    #[test]
    fn test_active_role_narrows_effective_roles() {
        let roles: RoleSet = ["pegawai", "teknisi"].into_iter().collect();
        let actor = ActorContext::new(Uuid::new_v4(), roles.clone());
        assert!(actor.can_act_as("pegawai"));
        assert!(actor.can_act_as("teknisi"));

        let acting = actor.clone().with_active_role("teknisi");
        assert!(acting.can_act_as("teknisi"));
        assert!(!acting.can_act_as("pegawai"));

        let stale = actor.with_active_role("admin_layanan");
        assert!(stale.effective_roles().is_empty());
    }
}
