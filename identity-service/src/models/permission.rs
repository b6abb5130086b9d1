//! Resource/action permissions held by a subject.

use serde::Serialize;
use sqlx::FromRow;
use std::collections::{BTreeMap, BTreeSet};

/// Reserved resource key granting administrative access.
pub const ADMIN_PERMISSION: &str = "admin";

/// One store row: a resource and the actions granted on it.
#[derive(Debug, Clone, FromRow)]
pub struct PermissionRow {
    pub resource: String,
    pub actions: Vec<String>,
}

impl PermissionRow {
    pub fn new(resource: impl Into<String>, actions: &[&str]) -> Self {
        Self {
            resource: resource.into(),
            actions: actions.iter().map(|a| a.to_string()).collect(),
        }
    }
}

/// Aggregated `resource -> {actions}` map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Permissions(BTreeMap<String, BTreeSet<String>>);

impl Permissions {
    /// Merge rows by resource, unioning their action sets.
    pub fn from_rows(rows: impl IntoIterator<Item = PermissionRow>) -> Self {
        let mut permissions = Permissions::default();
        for row in rows {
            permissions.grant(row.resource, row.actions);
        }
        permissions
    }

    pub fn grant(&mut self, resource: String, actions: impl IntoIterator<Item = String>) {
        self.0.entry(resource).or_default().extend(actions);
    }

    pub fn has(&self, resource: &str, action: &str) -> bool {
        self.0
            .get(resource)
            .is_some_and(|actions| actions.contains(action))
    }

    pub fn actions(&self, resource: &str) -> Option<&BTreeSet<String>> {
        self.0.get(resource)
    }

    pub fn is_admin(&self) -> bool {
        self.0.contains_key(ADMIN_PERMISSION)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}
