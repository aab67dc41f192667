//! Translates GraphQL operations into a single parameterized Cypher statement.
//!
//! Every entry point takes the schema metadata, a [`ResolveTree`] for the root field and
//! the caller's [`AuthContext`], and returns a [`CypherQuery`]. Translation allocates a
//! fresh scope per call, so identical inputs always produce identical statements.

mod auth;
mod config;
mod connection;
mod context;
mod cursor;
mod cypher;
mod error;
mod filter;
mod mutation;
mod projection;
mod read;
mod scope;
mod selection;
mod translate;
mod translator;
mod value;

pub use config::{Config, FiltersConfig, IdFiltersConfig, LimitsConfig, StringFiltersConfig};
pub use context::AuthContext;
pub use cursor::{cursor_to_offset, offset_to_cursor, PageInfo};
pub use cypher_schema::GeneratedOperation;
pub use error::{BindError, Error, Result};
pub use selection::{bind_operation, BoundOperation, OperationKind, ResolveTree};
pub use translate::{
    translate_aggregate, translate_connection, translate_create, translate_delete, translate_fulltext,
    translate_read, translate_update,
};
pub use translator::TranslateContext;

use serde_json::{Map, Value};

/// Raised by guards when a rule requiring authentication is evaluated anonymously.
pub const UNAUTHENTICATED: &str = "UNAUTHENTICATED";
/// Raised by guards when a validate rule does not hold.
pub const FORBIDDEN: &str = "FORBIDDEN";
/// Prefix of the message raised when relationship cardinality is violated.
pub const RELATIONSHIP_REQUIRED: &str = "RELATIONSHIP-REQUIRED";

/// A statement ready to be executed.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct CypherQuery {
    pub cypher: String,
    /// Exactly the parameters referenced by `cypher`.
    pub params: Map<String, Value>,
    /// Slots of the `resolvedCallbacks` parameter the caller must fill before execution.
    pub callbacks: Vec<CallbackSlot>,
}

/// A value computed outside of the database, referenced as `$resolvedCallbacks.<slot>`.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackSlot {
    pub slot: String,
    pub callback: String,
    pub type_name: String,
    pub field: String,
    pub operation: GeneratedOperation,
}
