pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while translating an operation. None of them reach the database:
/// the operation is rejected before a statement is produced.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Unknown type named '{name}'")]
    UnknownType { name: String },
    #[error("{container} does not have a field named '{name}'")]
    UnknownField { container: String, name: String },
    #[error("Unknown filter '{key}' on {container}")]
    UnknownFilter { container: String, key: String },
    #[error("Invalid value for '{key}': {reason}")]
    InvalidFilterValue { key: String, reason: String },
    #[error("The filter operator '{operator}' is not enabled for {field}")]
    DisabledOperator { field: String, operator: String },
    #[error("Cannot update the same field twice in one operation: '{field}' and '{other}'")]
    ConflictingUpdate { field: String, other: String },
    #[error("connectOrCreate on {node} may only match unique fields, '{field}' is not unique")]
    NonUniqueConnectOrCreate { node: String, field: String },
    #[error("Invalid cursor '{cursor}'")]
    InvalidCursor { cursor: String },
    #[error("Missing value for '{path}' in the request context")]
    MissingContextValue { path: String },
    #[error("Invalid {ty} value: {value}")]
    InvalidTemporal { ty: String, value: String },
    #[error("Invalid 64-bit integer value: {value}")]
    InvalidInteger { value: String },
    #[error("Invalid point value for {field}")]
    InvalidPoint { field: String },
    #[error("The operation {operation} is not allowed on {owner}.{field}")]
    UnsupportedNestedOperation {
        owner: String,
        field: String,
        operation: String,
    },
    #[error("Missing argument named '{name}' for field '{field}'")]
    MissingArgument { field: String, name: String },
    #[error("Invalid argument '{name}' for field '{field}': {reason}")]
    InvalidArgument { field: String, name: String, reason: String },
    #[error("Could not find a fulltext index named '{index}' on {node}")]
    UnknownFulltextIndex { node: String, index: String },
    #[error(transparent)]
    Bind(#[from] BindError),
}

/// Errors raised while turning a GraphQL document into resolve trees.
#[derive(Debug, thiserror::Error)]
pub enum BindError {
    #[error("Could not parse the document: {0}")]
    Parse(String),
    #[error("Unknown operation named '{name}'")]
    UnknownOperation { name: String },
    #[error("The document contains several operations, an operation name is required")]
    AmbiguousOperation,
    #[error("The document does not contain any operation")]
    NoOperation,
    #[error("Named fragments are not supported, found a spread of '{name}'")]
    NamedFragment { name: String },
    #[error("Variable '${name}' is used in a list but was not provided")]
    MissingVariable { name: String },
}
