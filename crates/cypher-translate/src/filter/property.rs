use cypher_schema::{Field, ScalarType, TemporalType};
use serde_json::Value;

use super::{FilterMode, Operator};
use crate::{
    cypher::{self, Predicate},
    translator::{Target, Translator},
    value, Error, Result,
};

/// How a value is turned into a database value inside the statement.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Shape {
    Plain,
    Temporal(TemporalType),
    Point,
}

impl Shape {
    pub fn of(field: &Field) -> Self {
        if let Some(ty) = field.temporal_type() {
            Shape::Temporal(ty)
        } else if field.is_point() {
            Shape::Point
        } else {
            Shape::Plain
        }
    }

    /// `datetime($param0)`
    pub fn wrap(self, reference: &str) -> String {
        match self {
            Shape::Plain => reference.to_string(),
            Shape::Temporal(ty) => format!("{}({reference})", ty.constructor()),
            Shape::Point => format!("point({reference})"),
        }
    }
}

impl<'a> Translator<'a> {
    #[allow(clippy::too_many_arguments)]
    pub(super) fn compile_property(
        &mut self,
        target: Target<'a>,
        field: &'a Field,
        variable: &str,
        operator: Operator,
        key: &str,
        value: &Value,
        mode: FilterMode,
    ) -> Result<Option<Predicate>> {
        self.check_operator(target, field, operator, key)?;

        let lhs = cypher::property(variable, field.db_name());

        match (operator, value) {
            (Operator::Equal, Value::Null) => return Ok(Some(Predicate::raw(format!("{lhs} IS NULL")))),
            (Operator::Not, Value::Null) => return Ok(Some(Predicate::raw(format!("{lhs} IS NOT NULL")))),
            (_, Value::Null) => return Ok(None),
            (operator, Value::Array(items)) if operator.is_membership() && items.is_empty() => return Ok(None),
            _ => (),
        }

        if mode.claims {
            if let Some(reference) = self.claim_reference(value) {
                let comparison = self.comparison(&lhs, operator, &reference, Shape::Plain, field.list);
                let guard = Predicate::raw(format!("{reference} IS NOT NULL"));
                return Ok(Predicate::and([guard, comparison]));
            }
        }

        let shape = Shape::of(field);

        let parameter = match (shape, operator) {
            (Shape::Point, Operator::Lt | Operator::Lte | Operator::Gt | Operator::Gte | Operator::Distance) => {
                distance_value(field, value)?
            }
            _ => value::normalize(field, value)?,
        };

        let reference = self.scope.param(parameter);
        Ok(Some(self.comparison(&lhs, operator, &reference, shape, field.list)))
    }

    /// `$jwt.sub` style strings are references to request values, not literals.
    pub(crate) fn claim_reference(&mut self, value: &Value) -> Option<String> {
        let value = value.as_str()?;

        if let Some(path) = value.strip_prefix("$jwt.") {
            return Some(self.scope.jwt(path));
        }

        value.strip_prefix("$context.").map(|path| self.scope.context(path))
    }

    pub(crate) fn comparison(
        &mut self,
        lhs: &str,
        operator: Operator,
        rhs: &str,
        shape: Shape,
        list_field: bool,
    ) -> Predicate {
        let expression = match operator {
            Operator::Equal | Operator::Not => {
                let rhs = if list_field {
                    self.wrap_list(rhs, shape)
                } else {
                    shape.wrap(rhs)
                };
                format!("{lhs} = {rhs}")
            }
            Operator::In | Operator::NotIn => format!("{lhs} IN {}", self.wrap_list(rhs, shape)),
            Operator::Includes | Operator::NotIncludes => format!("{} IN {lhs}", shape.wrap(rhs)),
            Operator::Contains | Operator::NotContains => format!("{lhs} CONTAINS {rhs}"),
            Operator::StartsWith | Operator::NotStartsWith => format!("{lhs} STARTS WITH {rhs}"),
            Operator::EndsWith | Operator::NotEndsWith => format!("{lhs} ENDS WITH {rhs}"),
            Operator::Matches => format!("{lhs} =~ {rhs}"),
            Operator::Distance => format!("point.distance({lhs}, point({rhs}.point)) = {rhs}.distance"),
            Operator::Lt | Operator::Lte | Operator::Gt | Operator::Gte => {
                let symbol = match operator {
                    Operator::Lt => "<",
                    Operator::Lte => "<=",
                    Operator::Gt => ">",
                    _ => ">=",
                };

                match shape {
                    Shape::Point => format!("point.distance({lhs}, point({rhs}.point)) {symbol} {rhs}.distance"),
                    shape => format!("{lhs} {symbol} {}", shape.wrap(rhs)),
                }
            }
        };

        let predicate = Predicate::raw(expression);

        match operator {
            Operator::Not
            | Operator::NotIn
            | Operator::NotIncludes
            | Operator::NotContains
            | Operator::NotStartsWith
            | Operator::NotEndsWith => predicate.not(),
            _ => predicate,
        }
    }

    /// `[var0 IN $param0 | datetime(var0)]`
    pub(crate) fn wrap_list(&mut self, reference: &str, shape: Shape) -> String {
        match shape {
            Shape::Plain => reference.to_string(),
            shape => {
                let item = self.scope.next_variable("var");
                format!("[{item} IN {reference} | {}]", shape.wrap(&item))
            }
        }
    }

    fn check_operator(&self, target: Target<'a>, field: &Field, operator: Operator, key: &str) -> Result<()> {
        let unknown = || Error::UnknownFilter {
            container: target.name().to_string(),
            key: key.to_string(),
        };

        let disabled = || Error::DisabledOperator {
            field: format!("{}.{}", target.name(), field.name),
            operator: operator.as_ref().trim_start_matches('_').to_string(),
        };

        let filters = &self.config().filters;

        match operator {
            Operator::Equal | Operator::Not | Operator::In | Operator::NotIn => Ok(()),
            Operator::Contains
            | Operator::NotContains
            | Operator::StartsWith
            | Operator::NotStartsWith
            | Operator::EndsWith
            | Operator::NotEndsWith => {
                if field.is_string_like() && !field.list {
                    Ok(())
                } else {
                    Err(unknown())
                }
            }
            Operator::Matches => match field.scalar_type() {
                _ if field.list => Err(unknown()),
                Some(ScalarType::String) if filters.string.matches => Ok(()),
                Some(ScalarType::Id) if filters.id.matches => Ok(()),
                Some(ScalarType::String | ScalarType::Id) => Err(disabled()),
                _ => Err(unknown()),
            },
            Operator::Lt | Operator::Lte | Operator::Gt | Operator::Gte => {
                if field.list {
                    Err(unknown())
                } else if field.is_numeric() || field.temporal_type().is_some() || field.is_point() {
                    Ok(())
                } else if field.scalar_type() == Some(ScalarType::String) {
                    if filters.string.comparison {
                        Ok(())
                    } else {
                        Err(disabled())
                    }
                } else {
                    Err(unknown())
                }
            }
            Operator::Includes | Operator::NotIncludes => {
                if field.list {
                    Ok(())
                } else {
                    Err(unknown())
                }
            }
            Operator::Distance => {
                if field.is_point() && !field.list {
                    Ok(())
                } else {
                    Err(unknown())
                }
            }
        }
    }
}

/// `{ point: {...}, distance: 5.0 }`, passed through once its shape is checked.
fn distance_value(field: &Field, value: &Value) -> Result<Value> {
    let invalid = || Error::InvalidPoint {
        field: field.name.clone(),
    };

    let object = value.as_object().ok_or_else(invalid)?;
    let point = object.get("point").ok_or_else(invalid)?;
    value::normalize_single(field, point)?;

    if !object.get("distance").is_some_and(Value::is_number) {
        return Err(invalid());
    }

    Ok(value.clone())
}
