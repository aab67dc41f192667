pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid schema metadata: {0}")]
    Deserialize(#[source] serde_json::Error),
    #[error("The type {owner} implements the unknown interface {name}")]
    UnknownInterface { owner: String, name: String },
    #[error("The field {owner}.{field} points to the unknown type {target}")]
    UnknownTarget { owner: String, field: String, target: String },
    #[error("The field {owner}.{field} uses the unknown relationship properties {name}")]
    UnknownProperties { owner: String, field: String, name: String },
    #[error("The union {union} has an unknown member {name}")]
    UnknownUnionMember { union: String, name: String },
    #[error("Relationship properties {owner} cannot declare the relationship field {field}")]
    RelationshipOnProperties { owner: String, field: String },
}
