use cynic_parser::{
    common::OperationType,
    executable::{Iter, Selection},
};
use indexmap::IndexMap;
use serde_json::{Map, Number, Value};

use super::{merge_into, ResolveTree};
use crate::BindError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum OperationKind {
    Query,
    Mutation,
    Subscription,
}

#[derive(Debug, Clone)]
pub struct BoundOperation {
    pub kind: OperationKind,
    pub name: Option<String>,
    pub root_fields: Vec<ResolveTree>,
}

/// Turns an executable document into one resolve tree per root field, substituting
/// variables along the way. The document is expected to be validated already.
pub fn bind_operation(
    document: &str,
    operation_name: Option<&str>,
    variables: &Map<String, Value>,
) -> Result<BoundOperation, BindError> {
    let document = cynic_parser::parse_executable_document(document).map_err(|err| BindError::Parse(err.to_string()))?;

    let operation = match operation_name {
        Some(name) => document
            .operations()
            .find(|operation| operation.name() == Some(name))
            .ok_or_else(|| BindError::UnknownOperation { name: name.to_string() })?,
        None => {
            let mut operations = document.operations();
            let operation = operations.next().ok_or(BindError::NoOperation)?;

            if operations.next().is_some() {
                return Err(BindError::AmbiguousOperation);
            }

            operation
        }
    };

    let kind = match operation.operation_type() {
        OperationType::Query => OperationKind::Query,
        OperationType::Mutation => OperationKind::Mutation,
        OperationType::Subscription => OperationKind::Subscription,
    };

    let binder = Binder { variables };
    let mut root = ResolveTree::default();
    binder.bind_selection_set(operation.selection_set(), &mut root, None)?;

    Ok(BoundOperation {
        kind,
        name: operation.name().map(str::to_string),
        root_fields: root.fields.into_values().collect(),
    })
}

struct Binder<'a> {
    variables: &'a Map<String, Value>,
}

impl Binder<'_> {
    fn bind_selection_set<'d>(
        &self,
        selection_set: Iter<'d, Selection<'d>>,
        parent: &mut ResolveTree,
        type_condition: Option<&'d str>,
    ) -> Result<(), BindError> {
        for selection in selection_set {
            match selection {
                Selection::Field(field) => {
                    if field.name() == "__typename" {
                        continue;
                    }

                    let mut tree = ResolveTree::new(field.name());
                    tree.alias = field.alias().unwrap_or(field.name()).to_string();

                    for argument in field.arguments() {
                        if let Some(value) = self.value(argument.value())? {
                            tree.args.insert(argument.name().to_string(), value);
                        }
                    }

                    self.bind_selection_set(field.selection_set(), &mut tree, None)?;

                    let target = match type_condition {
                        Some(type_name) => parent
                            .fields_by_type_name
                            .entry(type_name.to_string())
                            .or_insert_with(IndexMap::new),
                        None => &mut parent.fields,
                    };

                    let alias = tree.alias.clone();
                    merge_into(target, &alias, tree);
                }
                Selection::InlineFragment(fragment) => {
                    let condition = fragment.type_condition().or(type_condition);
                    self.bind_selection_set(fragment.selection_set(), parent, condition)?;
                }
                Selection::FragmentSpread(spread) => {
                    return Err(BindError::NamedFragment {
                        name: spread.fragment_name().to_string(),
                    });
                }
            }
        }

        Ok(())
    }

    /// `None` when the value is an unset variable, which makes the argument absent.
    fn value(&self, value: cynic_parser::Value<'_>) -> Result<Option<Value>, BindError> {
        let value = match value {
            cynic_parser::Value::Variable(variable) => return Ok(self.variables.get(variable.name()).cloned()),
            cynic_parser::Value::Null(_) => Value::Null,
            cynic_parser::Value::Int(int) => Value::from(int.as_i64()),
            cynic_parser::Value::Float(float) => Number::from_f64(float.as_f64()).map_or(Value::Null, Value::Number),
            cynic_parser::Value::String(string) => Value::String(string.as_str().to_string()),
            cynic_parser::Value::Boolean(boolean) => Value::Bool(boolean.value()),
            cynic_parser::Value::Enum(value) => Value::String(value.name().to_string()),
            cynic_parser::Value::List(items) => {
                let mut list = Vec::with_capacity(items.len());

                for item in items.into_iter() {
                    match item {
                        cynic_parser::Value::Variable(variable) if !self.variables.contains_key(variable.name()) => {
                            return Err(BindError::MissingVariable {
                                name: variable.name().to_string(),
                            });
                        }
                        item => list.extend(self.value(item)?),
                    }
                }

                Value::Array(list)
            }
            cynic_parser::Value::Object(fields) => {
                let mut object = Map::new();

                for field in fields.into_iter() {
                    if let Some(value) = self.value(field.value())? {
                        object.insert(field.name().to_string(), value);
                    }
                }

                Value::Object(object)
            }
        };

        Ok(Some(value))
    }
}
