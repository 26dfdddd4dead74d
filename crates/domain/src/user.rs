//! Users, permission paths and allow/deny rules.
//!
//! Every query runs as exactly one [`User`]. Permissions are dotted paths
//! (`node.tag.add.cno.mal`); a [`Rule`] grants or denies every permission it
//! is a prefix of, and the first matching rule wins.

use serde::{Deserialize, Serialize};

use crate::error::{NodehookError, ValidationError};
use crate::id::UserId;
use crate::time::Timestamp;

/// A permission path such as `node.add.inet:ipv4`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Permission(Vec<String>);

impl Permission {
    /// Build a permission from already-split segments.
    #[must_use]
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    /// Parse a dotted permission path.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidPermission`] for empty segments.
    pub fn parse(text: &str) -> Result<Self, ValidationError> {
        let segments: Vec<String> = text.split('.').map(str::to_string).collect();
        if segments.iter().any(|s| s.trim().is_empty() || s.contains(' ')) {
            return Err(ValidationError::InvalidPermission(text.to_string()));
        }
        Ok(Self(segments))
    }

    /// Extend this path with more segments.
    #[must_use]
    pub fn child<I, S>(&self, more: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut segments = self.0.clone();
        segments.extend(more.into_iter().map(Into::into));
        Self(segments)
    }

    /// Whether `self` is a (non-strict) prefix of `other`.
    #[must_use]
    pub fn covers(&self, other: &Self) -> bool {
        self.0.len() <= other.0.len() && self.0.iter().zip(&other.0).all(|(a, b)| a == b)
    }

    /// Permission to add a node of `form`.
    #[must_use]
    pub fn node_add(form: &str) -> Self {
        Self::new(["node", "add", form])
    }

    /// Permission to delete a node of `form`.
    #[must_use]
    pub fn node_del(form: &str) -> Self {
        Self::new(["node", "del", form])
    }

    /// Permission to set the property at `full_prop` (`form:prop`).
    #[must_use]
    pub fn prop_set(full_prop: &str) -> Self {
        Self::new(["node", "prop", "set", full_prop])
    }

    /// Permission to add a (normalized) tag.
    #[must_use]
    pub fn tag_add(tag: &str) -> Self {
        Self::new(["node", "tag", "add"]).child(crate::tag::tag_segments(tag))
    }

    /// Permission to remove a (normalized) tag.
    #[must_use]
    pub fn tag_del(tag: &str) -> Self {
        Self::new(["node", "tag", "del"]).child(crate::tag::tag_segments(tag))
    }
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0.join("."))
    }
}

impl TryFrom<String> for Permission {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Permission> for String {
    fn from(value: Permission) -> Self {
        value.to_string()
    }
}

/// An allow or deny entry in a user's rule list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub allow: bool,
    pub path: Permission,
}

impl Rule {
    #[must_use]
    pub fn allow(path: Permission) -> Self {
        Self { allow: true, path }
    }

    #[must_use]
    pub fn deny(path: Permission) -> Self {
        Self { allow: false, path }
    }
}

/// An identity queries run as.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub admin: bool,
    pub locked: bool,
    pub rules: Vec<Rule>,
    pub created: Timestamp,
}

impl User {
    /// Create a builder for constructing a [`User`].
    #[must_use]
    pub fn builder() -> UserBuilder {
        UserBuilder::default()
    }

    /// Decide whether this user may perform `perm`.
    ///
    /// Locked users are denied everything and admins are allowed everything.
    /// Otherwise the first rule covering `perm` decides; no match denies.
    #[must_use]
    pub fn allowed(&self, perm: &Permission) -> bool {
        if self.locked {
            return false;
        }
        if self.admin {
            return true;
        }
        self.rules
            .iter()
            .find(|rule| rule.path.covers(perm))
            .is_some_and(|rule| rule.allow)
    }

    /// Check domain invariants.
    ///
    /// # Errors
    ///
    /// Returns [`NodehookError::Validation`] when `name` is empty.
    pub fn validate(&self) -> Result<(), NodehookError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyName.into());
        }
        Ok(())
    }
}

/// Step-by-step builder for [`User`].
#[derive(Debug, Default)]
pub struct UserBuilder {
    id: Option<UserId>,
    name: Option<String>,
    admin: bool,
    rules: Vec<Rule>,
}

impl UserBuilder {
    #[must_use]
    pub fn id(mut self, id: UserId) -> Self {
        self.id = Some(id);
        self
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn admin(mut self, admin: bool) -> Self {
        self.admin = admin;
        self
    }

    #[must_use]
    pub fn rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Consume the builder, validate, and return a [`User`].
    ///
    /// # Errors
    ///
    /// Returns [`NodehookError::Validation`] if `name` is missing or empty.
    pub fn build(self) -> Result<User, NodehookError> {
        let user = User {
            id: self.id.unwrap_or_default(),
            name: self.name.unwrap_or_default(),
            admin: self.admin,
            locked: false,
            rules: self.rules,
            created: crate::time::now(),
        };
        user.validate()?;
        Ok(user)
    }
}
