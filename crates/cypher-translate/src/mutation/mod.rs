//! Compiles create, update and delete inputs.
//!
//! A written node goes through the same steps whatever its depth: match or create it,
//! apply its property assignments, run its nested relationship inputs, check the
//! cardinality of its singular relationships and finally the `AFTER` validation rules.
//! Nested relationship inputs become `CALL` subqueries importing the node they hang off
//! and ending with `RETURN count(*)`, so that they never change the number of rows.
//!
//! Values of the root node are passed as individual parameters, values of nested nodes
//! and edges go through one shared parameter addressed by variable and field name.

mod assignments;
mod cardinality;
mod connect;
mod create;
mod delete;
mod disconnect;
mod update;

use cypher_schema::{AuthOperation, AuthTiming, Composite, Field, NestedOperation, Node};
use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::{
    cypher::Block,
    filter::{object, WhereOutput},
    selection::ResolveTree,
    translator::{Relation, Target, Translator},
    Error, Result,
};

/// Nested operations run in this order for every relationship field.
const ORDER: [NestedOperation; 6] = [
    NestedOperation::Disconnect,
    NestedOperation::Delete,
    NestedOperation::Connect,
    NestedOperation::ConnectOrCreate,
    NestedOperation::Create,
    NestedOperation::Update,
];

/// The input key of a nested operation.
fn operation_key(operation: NestedOperation) -> &'static str {
    match operation {
        NestedOperation::Create => "create",
        NestedOperation::Connect => "connect",
        NestedOperation::Update => "update",
        NestedOperation::Delete => "delete",
        NestedOperation::Disconnect => "disconnect",
        NestedOperation::ConnectOrCreate => "connectOrCreate",
    }
}

/// A relationship field of a node being written, narrowed to the type a nested input
/// applies to: the target node, the target interface, or one member of a target union.
#[derive(Clone, Copy)]
pub(crate) struct Link<'a, 'v> {
    pub owner: &'a Node,
    pub variable: &'v str,
    pub relation: Relation<'a>,
    pub target: Composite<'a>,
}

impl<'a> Translator<'a> {
    /// Runs the relationship inputs found in `input`, a node input keyed by field name.
    pub(crate) fn nested_operations(
        &mut self,
        owner: &'a Node,
        variable: &str,
        input: &Map<String, Value>,
    ) -> Result<Block> {
        let mut block = Block::new();

        for (key, value) in input {
            let Some(field) = owner.field(key).filter(|field| field.relationship().is_some()) else {
                continue;
            };

            if value.is_null() {
                continue;
            }

            let relation = self.relation(Target::Node(owner), field)?;

            match relation.target {
                Composite::Union(union) => {
                    for (member, operations) in object(key, value)? {
                        let node = union
                            .members
                            .iter()
                            .find(|name| *name == member)
                            .and_then(|name| self.schema().node(name))
                            .ok_or_else(|| Error::UnknownField {
                                container: relation.qualified_name(),
                                name: member.clone(),
                            })?;

                        let link = Link {
                            owner,
                            variable,
                            relation,
                            target: Composite::Node(node),
                        };
                        self.relationship_operations(link, operations, &mut block)?;
                    }
                }
                target => {
                    let link = Link {
                        owner,
                        variable,
                        relation,
                        target,
                    };
                    self.relationship_operations(link, value, &mut block)?;
                }
            }
        }

        Ok(block)
    }

    fn relationship_operations(
        &mut self,
        link: Link<'a, '_>,
        input: &Value,
        block: &mut Block,
    ) -> Result<()> {
        let operations = group_operations(link.relation.field, input)?;

        if let Some(key) = operations
            .keys()
            .find(|key| !ORDER.iter().any(|operation| operation_key(*operation) == key.as_str()))
        {
            return Err(Error::UnknownField {
                container: link.relation.qualified_name(),
                name: key.clone(),
            });
        }

        for operation in ORDER {
            let key = operation_key(operation);
            let Some(value) = operations.get(key) else {
                continue;
            };

            if !link.relation.relationship.allows(operation) {
                return Err(Error::UnsupportedNestedOperation {
                    owner: link.relation.owner.to_string(),
                    field: link.relation.field.name.clone(),
                    operation: operation.to_string(),
                });
            }

            for item in items(key, value)? {
                match operation {
                    NestedOperation::Disconnect => self.nested_disconnect(link, item, block)?,
                    NestedOperation::Delete => self.nested_delete(link, item, block)?,
                    NestedOperation::Connect => self.nested_connect(link, item, block)?,
                    NestedOperation::ConnectOrCreate => self.nested_connect_or_create(link, item, block)?,
                    NestedOperation::Create => self.nested_create(link, item, block)?,
                    NestedOperation::Update => self.nested_update(link, item, block)?,
                }
            }
        }

        Ok(())
    }

    /// Rewrites `{ field: items }`, the shape of the top-level `connect` argument and of
    /// a nested `connect`, into the `{ field: { connect: items } }` shape of a node input.
    /// Union fields are keyed by member on both sides.
    pub(crate) fn lift(
        &self,
        owner: &Node,
        operation: NestedOperation,
        by_field: &Map<String, Value>,
    ) -> Result<Map<String, Value>> {
        let key = operation_key(operation);
        let mut lifted = Map::new();

        for (name, value) in by_field {
            let field = owner
                .field(name)
                .filter(|field| field.relationship().is_some())
                .ok_or_else(|| Error::UnknownField {
                    container: owner.name.clone(),
                    name: name.clone(),
                })?;

            let is_union = field
                .relationship()
                .is_some_and(|relationship| self.schema().union(&relationship.target).is_some());

            let operations = if is_union {
                object(name, value)?
                    .iter()
                    .map(|(member, items)| (member.clone(), single(key, items.clone())))
                    .collect()
            } else {
                single(key, value.clone())
            };

            lifted.insert(name.clone(), operations);
        }

        Ok(lifted)
    }

    /// The steps shared by every written node once its properties are set: nested
    /// operations, cardinality checks and `AFTER` validation.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn finish_write(
        &mut self,
        node: &'a Node,
        variable: &str,
        operations: &Map<String, Value>,
        fields: &[&'a Field],
        operation: AuthOperation,
        checked: Checked<'_>,
        block: &mut Block,
    ) -> Result<()> {
        let mut tail = self.nested_operations(node, variable, operations)?;
        tail.append(self.validate_cardinality(node, variable, checked)?);

        let after = self.auth_validate(node, fields, variable, operation, AuthTiming::After)?;

        if tail.is_empty() && after.is_empty() {
            return Ok(());
        }

        block.push("WITH *");

        if !tail.is_empty() {
            block.append(tail);
            if !after.is_empty() {
                block.push("WITH *");
            }
        }

        after.push_to(block);
        Ok(())
    }

    /// Stores an input value, as its own parameter for the root node and through the
    /// shared parameter below it.
    pub(crate) fn input_value(&mut self, owner: &str, key: &str, value: Value, nested: bool) -> String {
        if nested {
            self.scope.arena_value(owner, key, value)
        } else {
            self.scope.param(value)
        }
    }

    /// `AFTER` rules of an operation that does not write properties.
    pub(crate) fn validate_after(
        &mut self,
        checks: impl IntoIterator<Item = (&'a Node, String)>,
        operation: AuthOperation,
    ) -> Result<WhereOutput> {
        let mut outputs = Vec::new();

        for (node, variable) in checks {
            outputs.push(self.auth_validate(node, &[], &variable, operation, AuthTiming::After)?);
        }

        Ok(WhereOutput::all(outputs))
    }
}

/// Which singular relationships of a written node are checked.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Checked<'i> {
    /// A created node: all of them.
    All,
    /// An updated node: the ones its input touched.
    Touched(&'i Map<String, Value>),
}

/// The selection of the mutation response: the first field besides `info`.
pub(crate) fn response_selection(node: &Node, tree: &ResolveTree) -> IndexMap<String, ResolveTree> {
    tree.fields
        .values()
        .find(|field| field.name != "info")
        .map(|field| field.fields_for(&[&node.name]))
        .unwrap_or_default()
}

/// Annotated fields written by an input, `tags_PUSH` counting as `tags`.
pub(crate) fn annotated_inputs<'a>(node: &'a Node, input: &Map<String, Value>) -> Vec<&'a Field> {
    node.fields
        .iter()
        .filter(|field| field.authorization.is_some() || field.authentication.is_some())
        .filter(|field| {
            input.keys().any(|key| {
                key == &field.name
                    || key
                        .strip_prefix(field.name.as_str())
                        .is_some_and(|suffix| suffix.starts_with('_'))
            })
        })
        .collect()
}

/// Nested inputs accept a single object or a list of them.
fn items<'v>(key: &str, value: &'v Value) -> Result<Vec<&'v Map<String, Value>>> {
    match value {
        Value::Array(values) => values.iter().map(|value| object(key, value)).collect(),
        value => Ok(vec![object(key, value)?]),
    }
}

/// An optional object entry of a nested input.
fn entry<'v>(input: &'v Map<String, Value>, key: &str) -> Result<Option<&'v Map<String, Value>>> {
    match input.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => object(key, value).map(Some),
    }
}

fn single(key: &str, value: Value) -> Value {
    let mut map = Map::new();
    map.insert(key.to_string(), value);
    Value::Object(map)
}

/// Groups the items of a relationship input by operation, each operation holding a
/// list. Create inputs are a single `{ create, connect, connectOrCreate }` object, update
/// inputs a list of `{ where, update, connect, ... }` objects whose `where` selects the
/// relationships `update` applies to.
fn group_operations(field: &Field, value: &Value) -> Result<Map<String, Value>> {
    let mut grouped = Map::new();

    for item in items(&field.name, value)? {
        for (key, operation) in item {
            match (key.as_str(), operation) {
                ("where", _) | (_, Value::Null) => (),
                ("update", update) => {
                    let mut scoped = Map::new();
                    if let Some(filter) = item.get("where").filter(|filter| !filter.is_null()) {
                        scoped.insert("where".to_string(), filter.clone());
                    }
                    scoped.insert("update".to_string(), update.clone());
                    append_item(grouped.entry(key.clone()).or_insert(Value::Null), Value::Object(scoped));
                }
                (_, Value::Array(values)) => {
                    for value in values {
                        append_item(grouped.entry(key.clone()).or_insert(Value::Null), value.clone());
                    }
                }
                (_, value) => append_item(grouped.entry(key.clone()).or_insert(Value::Null), value.clone()),
            }
        }
    }

    Ok(grouped)
}

fn append_item(slot: &mut Value, item: Value) {
    *slot = match std::mem::take(slot) {
        Value::Null => Value::Array(vec![item]),
        Value::Array(mut items) => {
            items.push(item);
            Value::Array(items)
        }
        other => Value::Array(vec![other, item]),
    };
}

/// Appends lifted top-level inputs to the relationship inputs of a node input, as one
/// more item of each field. Union fields are merged per member.
fn merge_operations(into: &mut Map<String, Value>, from: Map<String, Value>) -> Result<()> {
    for (field, lifted) in from {
        let Value::Object(lifted) = lifted else {
            continue;
        };

        let slot = into.entry(field.clone()).or_insert(Value::Null);
        let by_member = !lifted
            .keys()
            .any(|key| ORDER.iter().any(|operation| operation_key(*operation) == key.as_str()));

        if !by_member {
            append_item(slot, Value::Object(lifted));
            continue;
        }

        if slot.is_null() {
            *slot = Value::Object(Map::new());
        }

        let Value::Object(members) = slot else {
            return Err(Error::InvalidFilterValue {
                key: field,
                reason: "expected an object keyed by union member".to_string(),
            });
        };

        for (member, item) in lifted {
            append_item(members.entry(member).or_insert(Value::Null), item);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn map(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn top_level_inputs_are_appended_per_field() {
        let mut input = map(json!({
            "title": "Up",
            "actors": [{ "create": [{ "node": { "name": "A" } }] }]
        }));
        let lifted = map(json!({
            "actors": { "connect": [{ "where": { "node": { "name": "B" } } }] },
            "director": { "disconnect": {} }
        }));

        merge_operations(&mut input, lifted).unwrap();

        assert_eq!(
            Value::Object(input),
            json!({
                "title": "Up",
                "actors": [
                    { "create": [{ "node": { "name": "A" } }] },
                    { "connect": [{ "where": { "node": { "name": "B" } } }] }
                ],
                "director": [{ "disconnect": {} }]
            })
        );
    }

    #[test]
    fn update_items_keep_their_where() {
        let field: Field = serde_json::from_value(json!({
            "name": "actors",
            "list": true,
            "relationship": { "type": "ACTED_IN", "direction": "IN", "target": "Actor" }
        }))
        .unwrap();

        let grouped = group_operations(
            &field,
            &json!([
                { "where": { "node": { "name": "A" } }, "update": { "node": { "name": "B" } }, "disconnect": { "where": {} } },
                { "create": [{ "node": { "name": "C" } }, { "node": { "name": "D" } }] }
            ]),
        )
        .unwrap();

        assert_eq!(
            Value::Object(grouped),
            json!({
                "update": [{ "where": { "node": { "name": "A" } }, "update": { "node": { "name": "B" } } }],
                "disconnect": [{ "where": {} }],
                "create": [{ "node": { "name": "C" } }, { "node": { "name": "D" } }]
            })
        );
    }

    #[test]
    fn single_objects_are_accepted_as_items() {
        let value = json!({ "where": {} });
        assert_eq!(items("connect", &value).unwrap().len(), 1);

        let value = json!([{ "where": {} }, { "where": {} }]);
        assert_eq!(items("connect", &value).unwrap().len(), 2);

        assert!(items("connect", &json!("nope")).is_err());
    }
}
