use cypher_schema::{Field, GeneratedOperation, GeneratedValue, ScalarType, TemporalType};
use indexmap::IndexMap;
use itertools::Itertools;
use serde_json::{Map, Value};
use strum::IntoEnumIterator;

use crate::{
    cypher::{self, Block},
    filter::Shape,
    translator::{Relation, Target, Translator},
    value, CallbackSlot, Error, Result,
};

/// Property writes of one node or relationship, rendered as a single `SET` clause.
#[derive(Debug, Default)]
pub(crate) struct Assignments {
    /// `CALL apoc.util.validate(...)` checks that must hold before anything is written.
    guards: Vec<String>,
    /// Assignments keyed by the field they write.
    items: Vec<(String, String)>,
}

impl Assignments {
    fn push(&mut self, field: &Field, assignment: String) {
        self.items.push((field.name.clone(), assignment));
    }

    pub fn append(&mut self, other: Assignments) {
        self.guards.extend(other.guards);
        self.items.extend(other.items);
    }

    /// Drops the assignments of the given fields.
    pub fn without(mut self, fields: &[&str]) -> Self {
        self.items.retain(|(field, _)| !fields.contains(&field.as_str()));
        self
    }

    /// `SET this.title = $param0, this.id = randomUUID()`, `clause` being `SET` or
    /// `ON CREATE SET`.
    pub fn push_to(self, block: &mut Block, clause: &str) {
        for guard in self.guards {
            block.push(guard);
        }

        if !self.items.is_empty() {
            block.push(format!(
                "{clause} {}",
                self.items.into_iter().map(|(_, assignment)| assignment).join(", ")
            ));
        }
    }
}

/// Suffix of an update input key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::AsRefStr, strum::EnumIter)]
enum UpdateOperator {
    #[strum(serialize = "")]
    Set,
    #[strum(serialize = "_PUSH")]
    Push,
    #[strum(serialize = "_POP")]
    Pop,
    #[strum(serialize = "_INCREMENT")]
    Increment,
    #[strum(serialize = "_DECREMENT")]
    Decrement,
    #[strum(serialize = "_ADD")]
    Add,
    #[strum(serialize = "_SUBTRACT")]
    Subtract,
    #[strum(serialize = "_MULTIPLY")]
    Multiply,
    #[strum(serialize = "_DIVIDE")]
    Divide,
}

impl UpdateOperator {
    /// Splits `tags_PUSH` into the `tags` field and `Push`, exact field names first.
    fn split<'a>(target: Target<'a>, key: &str) -> Option<(&'a Field, UpdateOperator)> {
        if let Some(field) = target.field(key) {
            return Some((field, UpdateOperator::Set));
        }

        UpdateOperator::iter()
            .filter(|operator| *operator != UpdateOperator::Set)
            .find_map(|operator| {
                key.strip_suffix(operator.as_ref())
                    .and_then(|name| target.field(name))
                    .map(|field| (field, operator))
            })
    }

    fn applies_to(self, field: &Field) -> bool {
        match self {
            UpdateOperator::Set => true,
            UpdateOperator::Push | UpdateOperator::Pop => field.list,
            UpdateOperator::Increment | UpdateOperator::Decrement => !field.list && field.is_int64(),
            UpdateOperator::Add | UpdateOperator::Subtract | UpdateOperator::Multiply | UpdateOperator::Divide => {
                !field.list && field.scalar_type() == Some(ScalarType::Float)
            }
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            UpdateOperator::Increment | UpdateOperator::Add => "+",
            UpdateOperator::Decrement | UpdateOperator::Subtract => "-",
            UpdateOperator::Multiply => "*",
            UpdateOperator::Divide => "/",
            UpdateOperator::Set | UpdateOperator::Push | UpdateOperator::Pop => "",
        }
    }

    /// Width of the result checked for overflow.
    fn overflow_bits(self, field: &Field) -> Option<u32> {
        if self == UpdateOperator::Divide {
            return None;
        }

        match field.scalar_type() {
            Some(ScalarType::Int) => Some(32),
            Some(ScalarType::BigInt | ScalarType::Float) => Some(64),
            _ => None,
        }
    }
}

impl<'a> Translator<'a> {
    /// Assignments of a created node or relationship, plus the generated values of the
    /// fields absent from `input`.
    pub(crate) fn create_assignments(
        &mut self,
        target: Target<'a>,
        variable: &str,
        input: &Map<String, Value>,
        nested: bool,
    ) -> Result<Assignments> {
        let mut assignments = Assignments::default();

        for (key, value) in input {
            let field = target.field(key).ok_or_else(|| unknown_input(target, key))?;

            if field.relationship().is_some() {
                continue;
            }

            if !field.is_stored() {
                return Err(unknown_input(target, key));
            }

            let expression = self.assigned_value(field, variable, &field.name, value, nested)?;
            assignments.push(
                field,
                format!("{} = {expression}", cypher::property(variable, field.db_name())),
            );
        }

        self.generated_assignments(target, variable, input, GeneratedOperation::Create, nested, &mut assignments)?;
        Ok(assignments)
    }

    /// Assignments of an updated node or relationship. Keys may carry a list or
    /// arithmetic operator suffix; every field is written at most once.
    pub(crate) fn update_assignments(
        &mut self,
        target: Target<'a>,
        variable: &str,
        input: &Map<String, Value>,
        nested: bool,
    ) -> Result<Assignments> {
        let mut assignments = Assignments::default();
        let mut written: IndexMap<&str, &str> = IndexMap::new();

        for (key, value) in input {
            let (field, operator) = UpdateOperator::split(target, key)
                .filter(|(field, operator)| operator.applies_to(field))
                .ok_or_else(|| unknown_input(target, key))?;

            if field.relationship().is_some() && operator == UpdateOperator::Set {
                continue;
            }

            if !field.is_stored() {
                return Err(unknown_input(target, key));
            }

            if let Some(previous) = written.insert(&field.name, key) {
                return Err(Error::ConflictingUpdate {
                    field: previous.to_string(),
                    other: key.clone(),
                });
            }

            let property = cypher::property(variable, field.db_name());

            match operator {
                UpdateOperator::Set => {
                    let expression = self.assigned_value(field, variable, &field.name, value, nested)?;
                    assignments.push(field, format!("{property} = {expression}"));
                }
                _ if value.is_null() => (),
                UpdateOperator::Push => {
                    let values = match value {
                        Value::Array(_) => value.clone(),
                        value => Value::Array(vec![value.clone()]),
                    };

                    let reference = self.input_value(variable, key, value::normalize(field, &values)?, nested);
                    let appended = self.wrap_list(&reference, Shape::of(field));

                    assignments.guards.push(null_guard(&property, &field.name));
                    assignments.push(field, format!("{property} = {property} + {appended}"));
                }
                UpdateOperator::Pop => {
                    let count = value::int64(value::parse_int64(value)?);
                    let reference = self.input_value(variable, key, count, nested);

                    assignments.guards.push(null_guard(&property, &field.name));
                    assignments.push(field, format!("{property} = {property}[0..-{reference}]"));
                }
                operator => {
                    let operand = if field.is_int64() {
                        value::int64(value::parse_int64(value)?)
                    } else if value.is_number() {
                        value.clone()
                    } else {
                        return Err(Error::InvalidFilterValue {
                            key: key.clone(),
                            reason: "expected a number".to_string(),
                        });
                    };

                    let reference = self.input_value(variable, key, operand, nested);
                    let name = cypher::string_literal(operator.as_ref());
                    let symbol = operator.symbol();

                    assignments.guards.push(format!(
                        "CALL apoc.util.validate({property} IS NULL, {}, [{name}, {reference}])",
                        cypher::string_literal("Cannot %s %s to Nan"),
                    ));

                    if let Some(bits) = operator.overflow_bits(field) {
                        assignments.guards.push(format!(
                            "CALL apoc.util.validate({property} IS NOT NULL AND {property} {symbol} {reference} > 2^{}-1, {}, [{name}, {}])",
                            bits - 1,
                            cypher::string_literal("Overflow: Value returned from operator %s is larger than %s bit"),
                            cypher::string_literal(&bits.to_string()),
                        ));
                    }

                    assignments.push(field, format!("{property} = {property} {symbol} {reference}"));
                }
            }
        }

        self.generated_assignments(target, variable, input, GeneratedOperation::Update, nested, &mut assignments)?;
        Ok(assignments)
    }

    /// Edge properties written when a relationship is created or updated.
    pub(crate) fn edge_assignments(
        &mut self,
        relation: &Relation<'a>,
        variable: &str,
        edge: Option<&Map<String, Value>>,
        operation: GeneratedOperation,
    ) -> Result<Assignments> {
        let Some(properties) = relation.properties else {
            return match edge {
                Some(edge) if !edge.is_empty() => Err(Error::UnknownField {
                    container: relation.qualified_name(),
                    name: "edge".to_string(),
                }),
                _ => Ok(Assignments::default()),
            };
        };

        let target = Target::Properties(properties);

        match (operation, edge) {
            (GeneratedOperation::Create, edge) => {
                let empty = Map::new();
                self.create_assignments(target, variable, edge.unwrap_or(&empty), true)
            }
            (GeneratedOperation::Update, Some(edge)) => self.update_assignments(target, variable, edge, true),
            (GeneratedOperation::Update, None) => Ok(Assignments::default()),
        }
    }

    fn generated_assignments(
        &mut self,
        target: Target<'a>,
        variable: &str,
        input: &Map<String, Value>,
        operation: GeneratedOperation,
        nested: bool,
        assignments: &mut Assignments,
    ) -> Result<()> {
        for field in target.fields() {
            if input.contains_key(&field.name) || !field.is_generated_on(operation) {
                continue;
            }

            let Some(generated) = &field.generated else {
                continue;
            };

            let expression = match generated {
                GeneratedValue::Uuid => "randomUUID()".to_string(),
                GeneratedValue::Timestamp { .. } => format!(
                    "{}()",
                    field.temporal_type().unwrap_or(TemporalType::DateTime).constructor()
                ),
                GeneratedValue::DefaultValue { value } => {
                    self.assigned_value(field, variable, &field.name, value, nested)?
                }
                GeneratedValue::Callback { callback, .. } => {
                    let reference = self.scope.callback(CallbackSlot {
                        slot: format!("{variable}_{}", field.name),
                        callback: callback.clone(),
                        type_name: target.name().to_string(),
                        field: field.name.clone(),
                        operation,
                    });
                    Shape::of(field).wrap(&reference)
                }
            };

            assignments.push(
                field,
                format!("{} = {expression}", cypher::property(variable, field.db_name())),
            );
        }

        Ok(())
    }

    /// The statement expression of an input value: `$param0`, `datetime($param0)` or
    /// `[var1 IN $param0 | date(var1)]`.
    fn assigned_value(
        &mut self,
        field: &Field,
        variable: &str,
        key: &str,
        value: &Value,
        nested: bool,
    ) -> Result<String> {
        let reference = self.input_value(variable, key, value::normalize(field, value)?, nested);

        Ok(match value {
            Value::Null => reference,
            Value::Array(_) => self.wrap_list(&reference, Shape::of(field)),
            _ => Shape::of(field).wrap(&reference),
        })
    }
}

fn null_guard(property: &str, name: &str) -> String {
    format!(
        "CALL apoc.util.validate({property} IS NULL, {}, [{}])",
        cypher::string_literal("Property %s cannot be NULL"),
        cypher::string_literal(name)
    )
}

fn unknown_input(target: Target<'_>, key: &str) -> Error {
    Error::UnknownField {
        container: target.name().to_string(),
        name: key.to_string(),
    }
}
