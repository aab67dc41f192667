use serde_json::{Map, Value};

/// Per-type or per-field authorization rules.
#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Authorization {
    /// Rules that narrow the matched set silently.
    #[serde(default)]
    pub filter: Vec<FilterRule>,
    /// Rules that abort the statement with `FORBIDDEN` when violated.
    #[serde(default)]
    pub validate: Vec<ValidateRule>,
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterRule {
    #[serde(default = "AuthOperation::filterable")]
    pub operations: Vec<AuthOperation>,
    #[serde(default = "default_true")]
    pub requires_authentication: bool,
    #[serde(rename = "where")]
    pub predicate: AuthWhere,
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateRule {
    #[serde(default = "AuthOperation::validatable")]
    pub operations: Vec<AuthOperation>,
    #[serde(default = "AuthTiming::both")]
    pub when: Vec<AuthTiming>,
    #[serde(default = "default_true")]
    pub requires_authentication: bool,
    #[serde(rename = "where")]
    pub predicate: AuthWhere,
}

/// A boolean tree over the node (`node`) and the token claims (`jwt`).
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct AuthWhere {
    #[serde(default)]
    pub node: Option<Map<String, Value>>,
    #[serde(default)]
    pub jwt: Option<Map<String, Value>>,
    #[serde(default, rename = "AND")]
    pub and: Vec<AuthWhere>,
    #[serde(default, rename = "OR")]
    pub or: Vec<AuthWhere>,
    #[serde(default, rename = "NOT")]
    pub not: Option<Box<AuthWhere>>,
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Authentication {
    #[serde(default = "AuthOperation::all")]
    pub operations: Vec<AuthOperation>,
    /// Optional predicate over the token claims.
    #[serde(default)]
    pub jwt: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Deserialize, strum::Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthOperation {
    Read,
    Aggregate,
    Create,
    Update,
    Delete,
    CreateRelationship,
    DeleteRelationship,
    Connect,
    Disconnect,
    Subscribe,
}

impl AuthOperation {
    fn filterable() -> Vec<AuthOperation> {
        use AuthOperation::*;
        vec![Read, Aggregate, Update, Delete, Connect, Disconnect, Subscribe]
    }

    fn validatable() -> Vec<AuthOperation> {
        use AuthOperation::*;
        vec![Read, Aggregate, Create, Update, Delete, Connect, Disconnect]
    }

    fn all() -> Vec<AuthOperation> {
        use AuthOperation::*;
        vec![
            Read,
            Aggregate,
            Create,
            Update,
            Delete,
            CreateRelationship,
            DeleteRelationship,
            Connect,
            Disconnect,
            Subscribe,
        ]
    }
}

/// Whether a validate rule runs against the state before or after the write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthTiming {
    Before,
    After,
}

impl AuthTiming {
    fn both() -> Vec<AuthTiming> {
        vec![AuthTiming::Before, AuthTiming::After]
    }
}

fn default_true() -> bool {
    true
}

impl FilterRule {
    pub fn applies_to(&self, operation: AuthOperation) -> bool {
        self.operations.contains(&operation)
    }
}

impl ValidateRule {
    pub fn applies_to(&self, operation: AuthOperation, timing: AuthTiming) -> bool {
        self.operations.contains(&operation) && self.when.contains(&timing)
    }
}

impl Authentication {
    pub fn applies_to(&self, operation: AuthOperation) -> bool {
        self.operations.contains(&operation)
    }
}
