use cypher_schema::{Composite, Field};
use serde_json::{Map, Value};

use super::{object, property::Shape, WhereOutput};
use crate::{
    cypher::{self, Block, Predicate},
    translator::{Relation, Target, Translator},
    value, Error, Result,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::AsRefStr, strum::EnumIter)]
enum Aggregation {
    #[strum(serialize = "_AVERAGE_LENGTH")]
    AverageLength,
    #[strum(serialize = "_SHORTEST_LENGTH")]
    ShortestLength,
    #[strum(serialize = "_LONGEST_LENGTH")]
    LongestLength,
    #[strum(serialize = "_AVERAGE")]
    Average,
    #[strum(serialize = "_MIN")]
    Min,
    #[strum(serialize = "_MAX")]
    Max,
    #[strum(serialize = "_SUM")]
    Sum,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::AsRefStr, strum::EnumIter)]
enum Comparison {
    #[strum(serialize = "_EQUAL")]
    Equal,
    #[strum(serialize = "_GTE")]
    Gte,
    #[strum(serialize = "_GT")]
    Gt,
    #[strum(serialize = "_LTE")]
    Lte,
    #[strum(serialize = "_LT")]
    Lt,
}

impl Comparison {
    fn symbol(self) -> &'static str {
        match self {
            Comparison::Equal => "=",
            Comparison::Gte => ">=",
            Comparison::Gt => ">",
            Comparison::Lte => "<=",
            Comparison::Lt => "<",
        }
    }

    fn split(key: &str) -> Option<(&str, Comparison)> {
        use strum::IntoEnumIterator;

        Comparison::iter().find_map(|comparison| key.strip_suffix(comparison.as_ref()).map(|rest| (rest, comparison)))
    }

    /// `count` alone is an equality.
    fn split_count(key: &str) -> Option<Comparison> {
        match key.strip_prefix("count")? {
            "" => Some(Comparison::Equal),
            suffix => Comparison::split(suffix).filter(|(rest, _)| rest.is_empty()).map(|(_, c)| c),
        }
    }
}

impl Aggregation {
    fn split(key: &str) -> Option<(&str, Aggregation)> {
        use strum::IntoEnumIterator;

        Aggregation::iter().find_map(|aggregation| {
            key.strip_suffix(aggregation.as_ref())
                .filter(|rest| !rest.is_empty())
                .map(|rest| (rest, aggregation))
        })
    }
}

impl<'a> Translator<'a> {
    /// `actorsAggregate: { count_GT: 1, node: { name_SHORTEST_LENGTH_LT: 5 } }`, evaluated
    /// in a subquery returning a single boolean.
    pub(super) fn compile_aggregate_filter(
        &mut self,
        relation: &Relation<'a>,
        variable: &str,
        key: &str,
        value: &Value,
    ) -> Result<WhereOutput> {
        if value.is_null() {
            return Ok(WhereOutput::default());
        }

        let filter = object(key, value)?;
        if filter.is_empty() {
            return Ok(WhereOutput::default());
        }

        let labels = self.pattern_labels(relation.target)?;
        let relationship = self.scope.next_variable("this");
        let related = self.scope.next_variable("this");

        let Some(expression) = self.aggregate_expression(relation, &relationship, &related, key, filter)? else {
            return Ok(WhereOutput::default());
        };

        let result = self.scope.next_variable("var");
        let pattern = self.hop(variable, relation, Some(&relationship), Some(&related), &labels, true);

        let mut subquery = Block::new();
        subquery.push(format!("WITH {variable}"));
        subquery.push(format!("MATCH {pattern}"));

        if let Some(narrowing) = self.narrowing(relation.target, &related)? {
            subquery.push(format!("WHERE {narrowing}"));
        }

        subquery.push(format!("RETURN {expression} AS {result}"));

        let mut preludes = Block::new();
        preludes.call(subquery);

        Ok(WhereOutput {
            predicate: Some(Predicate::raw(format!("{result} = true"))),
            preludes,
        })
    }

    fn aggregate_expression(
        &mut self,
        relation: &Relation<'a>,
        relationship: &str,
        related: &str,
        key: &str,
        filter: &Map<String, Value>,
    ) -> Result<Option<Predicate>> {
        let mut predicates = Vec::with_capacity(filter.len());

        for (name, value) in filter {
            let predicate = match name.as_str() {
                "AND" | "OR" => {
                    let mut items = Vec::new();
                    for item in value.as_array().into_iter().flatten() {
                        items.extend(self.aggregate_expression(relation, relationship, related, key, object(name, item)?)?);
                    }

                    if name == "AND" {
                        Predicate::and(items)
                    } else {
                        Predicate::or(items)
                    }
                }
                "NOT" => self
                    .aggregate_expression(relation, relationship, related, key, object(name, value)?)?
                    .map(Predicate::not),
                "node" => {
                    let target = match relation.target {
                        Composite::Node(node) => Target::Node(node),
                        Composite::Interface(interface) => Target::Interface(interface),
                        Composite::Union(_) => return Err(unknown(key, name)),
                    };
                    self.aggregate_fields(target, related, object(name, value)?)?
                }
                "edge" => {
                    let properties = relation.properties.ok_or_else(|| unknown(key, name))?;
                    self.aggregate_fields(Target::Properties(properties), relationship, object(name, value)?)?
                }
                count => {
                    let comparison = Comparison::split_count(count).ok_or_else(|| unknown(key, name))?;
                    let count = value::parse_int64(value)?;
                    let reference = self.scope.param(value::int64(count));
                    Some(Predicate::raw(format!("count({related}) {} {reference}", comparison.symbol())))
                }
            };

            predicates.extend(predicate);
        }

        Ok(Predicate::and(predicates))
    }

    fn aggregate_fields(
        &mut self,
        target: Target<'a>,
        variable: &str,
        filter: &Map<String, Value>,
    ) -> Result<Option<Predicate>> {
        let mut predicates = Vec::with_capacity(filter.len());

        for (key, value) in filter {
            let predicate = match key.as_str() {
                "AND" | "OR" => {
                    let mut items = Vec::new();
                    for item in value.as_array().into_iter().flatten() {
                        items.extend(self.aggregate_fields(target, variable, object(key, item)?)?);
                    }

                    if key == "AND" {
                        Predicate::and(items)
                    } else {
                        Predicate::or(items)
                    }
                }
                "NOT" => self
                    .aggregate_fields(target, variable, object(key, value)?)?
                    .map(Predicate::not),
                _ => Some(self.aggregate_field(target, variable, key, value)?),
            };

            predicates.extend(predicate);
        }

        Ok(Predicate::and(predicates))
    }

    fn aggregate_field(&mut self, target: Target<'a>, variable: &str, key: &str, value: &Value) -> Result<Predicate> {
        let unknown = || unknown(target.name(), key);

        let (rest, comparison) = Comparison::split(key).ok_or_else(unknown)?;
        let (name, aggregation) = Aggregation::split(rest).ok_or_else(unknown)?;
        let field = target.field(name).filter(|field| field.is_stored()).ok_or_else(unknown)?;

        let property = cypher::property(variable, field.db_name());
        let supported = match aggregation {
            Aggregation::AverageLength | Aggregation::ShortestLength | Aggregation::LongestLength => {
                field.is_string_like()
            }
            Aggregation::Average | Aggregation::Sum => field.is_numeric(),
            Aggregation::Min | Aggregation::Max => field.is_numeric() || field.temporal_type().is_some(),
        };

        if !supported || field.list {
            return Err(unknown());
        }

        let (expression, rhs) = match aggregation {
            Aggregation::AverageLength => (format!("avg(size({property}))"), self.scope.param(value.clone())),
            Aggregation::ShortestLength => (format!("min(size({property}))"), self.length_param(value)?),
            Aggregation::LongestLength => (format!("max(size({property}))"), self.length_param(value)?),
            Aggregation::Average => (format!("avg({property})"), self.scope.param(value.clone())),
            Aggregation::Sum => (format!("sum({property})"), self.typed_param(field, value)?),
            Aggregation::Min => (format!("min({property})"), self.typed_param(field, value)?),
            Aggregation::Max => (format!("max({property})"), self.typed_param(field, value)?),
        };

        Ok(Predicate::raw(format!("{expression} {} {rhs}", comparison.symbol())))
    }

    fn length_param(&mut self, value: &Value) -> Result<String> {
        let length = value::parse_int64(value)?;
        Ok(self.scope.param(value::int64(length)))
    }

    fn typed_param(&mut self, field: &Field, value: &Value) -> Result<String> {
        let reference = self.scope.param(value::normalize_single(field, value)?);
        Ok(Shape::of(field).wrap(&reference))
    }
}

fn unknown(container: &str, key: &str) -> Error {
    Error::UnknownFilter {
        container: container.to_string(),
        key: key.to_string(),
    }
}
