use crate::Field;

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipField {
    #[serde(rename = "type")]
    pub rel_type: String,
    pub direction: Direction,
    /// A node, interface or union name.
    pub target: String,
    /// Name of the [`RelationshipProperties`] type carried by the edge, if any.
    #[serde(default)]
    pub properties: Option<String>,
    #[serde(default = "NestedOperation::all")]
    pub nested_operations: Vec<NestedOperation>,
    /// Set when an interface declares the relationship itself, so every implementation
    /// shares one edge. A singular field that is not declared may otherwise end up linked
    /// once per implementation.
    #[serde(default)]
    pub declared: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    In,
    Out,
    Undirected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, strum::Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum NestedOperation {
    Create,
    Connect,
    Update,
    Delete,
    Disconnect,
    ConnectOrCreate,
}

impl NestedOperation {
    fn all() -> Vec<NestedOperation> {
        vec![
            NestedOperation::Create,
            NestedOperation::Connect,
            NestedOperation::Update,
            NestedOperation::Delete,
            NestedOperation::Disconnect,
            NestedOperation::ConnectOrCreate,
        ]
    }
}

impl RelationshipField {
    pub fn allows(&self, operation: NestedOperation) -> bool {
        self.nested_operations.contains(&operation)
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipProperties {
    pub name: String,
    #[serde(default)]
    pub fields: Vec<Field>,
}

impl RelationshipProperties {
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|field| field.name == name)
    }
}
