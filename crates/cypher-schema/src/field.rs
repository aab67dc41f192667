use crate::{Authentication, Authorization, RelationshipField};

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Field {
    pub name: String,
    /// Name of the stored property when it differs from the GraphQL field name.
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(flatten)]
    pub kind: FieldKind,
    #[serde(default)]
    pub list: bool,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub authorization: Option<Authorization>,
    #[serde(default)]
    pub authentication: Option<Authentication>,
    #[serde(default)]
    pub generated: Option<GeneratedValue>,
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldKind {
    Scalar(ScalarType),
    Temporal(TemporalType),
    Point(PointKind),
    Relationship(RelationshipField),
    CustomResolver(CustomResolver),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, strum::Display)]
pub enum ScalarType {
    #[serde(rename = "ID")]
    #[strum(serialize = "ID")]
    Id,
    String,
    Int,
    BigInt,
    Float,
    Boolean,
    /// Enums and custom scalars: compared as-is, no numeric or string operators.
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, strum::Display)]
pub enum TemporalType {
    DateTime,
    Date,
    Time,
    LocalTime,
    LocalDateTime,
    Duration,
}

impl TemporalType {
    /// The Cypher function constructing a value of this type.
    pub fn constructor(self) -> &'static str {
        match self {
            TemporalType::DateTime => "datetime",
            TemporalType::Date => "date",
            TemporalType::Time => "time",
            TemporalType::LocalTime => "localtime",
            TemporalType::LocalDateTime => "localdatetime",
            TemporalType::Duration => "duration",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
pub enum PointKind {
    Point,
    CartesianPoint,
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomResolver {
    /// Sibling fields that must be fetched for the resolver to run.
    #[serde(default)]
    pub requires: Vec<RequiredField>,
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequiredField {
    pub name: String,
    #[serde(default)]
    pub selection: Vec<RequiredField>,
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum GeneratedValue {
    /// `randomUUID()` on create.
    Uuid,
    Timestamp {
        #[serde(default = "GeneratedOperation::both")]
        operations: Vec<GeneratedOperation>,
    },
    #[serde(rename = "default")]
    DefaultValue { value: serde_json::Value },
    /// Value computed outside of the statement by a named callback.
    Callback {
        callback: String,
        #[serde(default = "GeneratedOperation::both")]
        operations: Vec<GeneratedOperation>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, serde::Serialize, strum::Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum GeneratedOperation {
    Create,
    Update,
}

impl GeneratedOperation {
    fn both() -> Vec<GeneratedOperation> {
        vec![GeneratedOperation::Create, GeneratedOperation::Update]
    }
}

impl Field {
    /// The stored property name.
    pub fn db_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    pub fn relationship(&self) -> Option<&RelationshipField> {
        match &self.kind {
            FieldKind::Relationship(relationship) => Some(relationship),
            _ => None,
        }
    }

    pub fn scalar_type(&self) -> Option<ScalarType> {
        match self.kind {
            FieldKind::Scalar(ty) => Some(ty),
            _ => None,
        }
    }

    pub fn temporal_type(&self) -> Option<TemporalType> {
        match self.kind {
            FieldKind::Temporal(ty) => Some(ty),
            _ => None,
        }
    }

    pub fn is_point(&self) -> bool {
        matches!(self.kind, FieldKind::Point(_))
    }

    pub fn is_custom_resolver(&self) -> bool {
        matches!(self.kind, FieldKind::CustomResolver(_))
    }

    /// Property-backed fields, as opposed to relationships and computed fields.
    pub fn is_stored(&self) -> bool {
        matches!(
            self.kind,
            FieldKind::Scalar(_) | FieldKind::Temporal(_) | FieldKind::Point(_)
        )
    }

    /// Int and BigInt are 64-bit integers in the database.
    pub fn is_int64(&self) -> bool {
        matches!(self.scalar_type(), Some(ScalarType::Int | ScalarType::BigInt))
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self.scalar_type(),
            Some(ScalarType::Int | ScalarType::BigInt | ScalarType::Float)
        )
    }

    pub fn is_string_like(&self) -> bool {
        matches!(self.scalar_type(), Some(ScalarType::String | ScalarType::Id))
    }

    pub fn type_name(&self) -> String {
        match &self.kind {
            FieldKind::Scalar(ty) => ty.to_string(),
            FieldKind::Temporal(ty) => ty.to_string(),
            FieldKind::Point(PointKind::Point) => "Point".to_string(),
            FieldKind::Point(PointKind::CartesianPoint) => "CartesianPoint".to_string(),
            FieldKind::Relationship(relationship) => relationship.target.clone(),
            FieldKind::CustomResolver(_) => "CustomResolver".to_string(),
        }
    }

    pub fn is_generated_on(&self, operation: GeneratedOperation) -> bool {
        match &self.generated {
            Some(GeneratedValue::Uuid | GeneratedValue::DefaultValue { .. }) => {
                operation == GeneratedOperation::Create
            }
            Some(GeneratedValue::Timestamp { operations } | GeneratedValue::Callback { operations, .. }) => {
                operations.contains(&operation)
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn flattened_kind_deserializes() {
        let field: Field = serde_json::from_value(json!({
            "name": "title",
            "alias": "movie_title",
            "scalar": "String",
            "required": true
        }))
        .unwrap();

        assert_eq!(field.db_name(), "movie_title");
        assert_eq!(field.scalar_type(), Some(ScalarType::String));
        assert!(field.required);
        assert!(!field.list);
    }

    #[test]
    fn unknown_scalar_names_become_other() {
        let field: Field = serde_json::from_value(json!({ "name": "genre", "scalar": "Genre" })).unwrap();
        assert_eq!(field.scalar_type(), Some(ScalarType::Other));
    }

    #[test]
    fn generated_values_apply_to_their_operations() {
        let field: Field = serde_json::from_value(json!({
            "name": "updatedAt",
            "temporal": "DateTime",
            "generated": { "kind": "timestamp", "operations": ["UPDATE"] }
        }))
        .unwrap();

        assert!(field.is_generated_on(GeneratedOperation::Update));
        assert!(!field.is_generated_on(GeneratedOperation::Create));

        let id: Field = serde_json::from_value(json!({
            "name": "id",
            "scalar": "ID",
            "generated": { "kind": "uuid" }
        }))
        .unwrap();

        assert!(id.is_generated_on(GeneratedOperation::Create));
        assert!(!id.is_generated_on(GeneratedOperation::Update));
    }
}
