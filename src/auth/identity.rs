//! Request identities and permission sets.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered user as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub name: String,
    pub email: String,
    #[serde(skip)]
    pub password_hash: String,
    pub activated: bool,
    #[serde(skip)]
    pub version: i32,
}

/// Who is making the current request.
///
/// Attached to the request by the credential resolver and dropped with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    Anonymous,
    Authenticated(User),
}

impl Identity {
    pub fn is_anonymous(&self) -> bool {
        matches!(self, Identity::Anonymous)
    }

    pub fn user(&self) -> Option<&User> {
        match self {
            Identity::Anonymous => None,
            Identity::Authenticated(user) => Some(user),
        }
    }
}

/// Permission codes granted to a user, e.g. `movies:read`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permissions(BTreeSet<String>);

impl Permissions {
    pub fn includes(&self, code: &str) -> bool {
        self.0.contains(code)
    }

    pub fn insert(&mut self, code: impl Into<String>) {
        self.0.insert(code.into());
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for Permissions {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        User {
            id: 7,
            created_at: Utc::now(),
            name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
            password_hash: "hash".to_string(),
            activated: true,
            version: 1,
        }
    }

    #[test]
    fn test_identity_variants() {
        assert!(Identity::Anonymous.is_anonymous());
        assert!(Identity::Anonymous.user().is_none());

        let identity = Identity::Authenticated(user());
        assert!(!identity.is_anonymous());
        assert_eq!(identity.user().map(|u| u.id), Some(7));
    }

    #[test]
    fn test_permissions_includes() {
        let permissions: Permissions = ["movies:read", "movies:write"].into_iter().collect();
        assert!(permissions.includes("movies:read"));
        assert!(!permissions.includes("movies:delete"));
    }

    #[test]
    fn test_user_serialization_hides_secrets() {
        let json = serde_json::to_value(user()).unwrap();
        assert!(json.get("password_hash").is_none());
        assert!(json.get("version").is_none());
        assert_eq!(json["email"], "ada@example.com");
    }
}
