use cypher_schema::{AuthOperation, Composite, Field, Node, TemporalType};
use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::{
    cypher::{self, Block, Predicate},
    filter::{FilterMode, WhereOutput},
    projection::format_datetime,
    selection::ResolveTree,
    translator::{Relation, Target, Translator},
    Error, Result,
};

impl<'a> Translator<'a> {
    /// Adds one subquery per requested aggregation target (`count`, `node`, `edge`) and
    /// returns the map combining their results.
    pub fn project_aggregate(
        &mut self,
        relation: &Relation<'a>,
        owner: &str,
        tree: &ResolveTree,
        subqueries: &mut Block,
    ) -> Result<String> {
        let filter = tree.object_arg("where");
        let mut entries = Vec::with_capacity(tree.fields.len());

        for (alias, field) in &tree.fields {
            let result = match field.name.as_str() {
                "count" => self.aggregate_call(relation, owner, filter, subqueries, |_, related, _| {
                    Ok(format!("count({related})"))
                })?,
                "node" => {
                    let target = match relation.target {
                        Composite::Node(node) => Target::Node(node),
                        Composite::Interface(interface) => Target::Interface(interface),
                        Composite::Union(_) => return Err(unknown_aggregate(relation, &field.name)),
                    };

                    self.aggregate_call(relation, owner, filter, subqueries, |translator, related, _| {
                        translator.aggregate_selection(target, related, &field.fields)
                    })?
                }
                "edge" => {
                    let properties = relation
                        .properties
                        .ok_or_else(|| unknown_aggregate(relation, &field.name))?;

                    self.aggregate_call(relation, owner, filter, subqueries, |translator, _, relationship| {
                        translator.aggregate_selection(Target::Properties(properties), relationship, &field.fields)
                    })?
                }
                _ => return Err(unknown_aggregate(relation, &field.name)),
            };

            entries.push(format!("{}: {result}", cypher::escape(alias)));
        }

        Ok(map(entries))
    }

    /// The root `moviesAggregate` field, computed over every `this` matching `where`.
    pub fn root_aggregate(&mut self, node: &'a Node, tree: &ResolveTree) -> Result<Block> {
        let mut block = Block::new();

        if let Some(guard) = self.authentication(node, &[], AuthOperation::Aggregate)? {
            block.push(guard);
        }

        block.push(format!("MATCH (this{})", self.label_expression(node)?));

        let filter = match tree.object_arg("where") {
            Some(filter) => self.compile_where(Target::Node(node), "this", filter, FilterMode::default())?,
            None => WhereOutput::default(),
        };
        let auth = self.auth_where(node, &[], "this", AuthOperation::Aggregate)?;
        WhereOutput::all([filter, auth]).push_to(&mut block);

        let mut entries = Vec::with_capacity(tree.fields.len());

        for (alias, selection) in &tree.fields {
            let value = match selection.name.as_str() {
                "count" => "count(this)".to_string(),
                name => {
                    let field = aggregatable(Target::Node(node), name)?;
                    self.aggregate_value(field, "this", selection)?
                }
            };

            entries.push(format!("{}: {value}", cypher::escape(alias)));
        }

        block.push(format!("RETURN {} AS this", map(entries)));
        Ok(block)
    }

    /// `CALL { WITH this MATCH ... RETURN <expression> AS var2 }`, the expression being
    /// built from the related and relationship variables.
    fn aggregate_call(
        &mut self,
        relation: &Relation<'a>,
        owner: &str,
        filter: Option<&Map<String, Value>>,
        subqueries: &mut Block,
        expression: impl FnOnce(&mut Self, &str, &str) -> Result<String>,
    ) -> Result<String> {
        let relationship = self.scope.next_variable("this");
        let related = self.scope.next_variable("this");

        let mut block = Block::new();
        block.push(format!("WITH {owner}"));

        let (guards, auth) = self.aggregate_auth(relation.target, &related)?;
        for guard in guards {
            block.push(guard);
        }

        let labels = self.pattern_labels(relation.target)?;
        let pattern = self.hop(owner, relation, Some(&relationship), Some(&related), &labels, true);
        block.push(format!("MATCH {pattern}"));

        let filter = match filter {
            Some(filter) => self.compile_composite_where(relation.target, &related, filter, FilterMode::default())?,
            None => WhereOutput::default(),
        };
        WhereOutput::all([auth, filter]).push_to(&mut block);

        let expression = expression(self, &related, &relationship)?;
        let result = self.scope.next_variable("var");
        block.push(format!("RETURN {expression} AS {result}"));

        subqueries.call(block);
        Ok(result)
    }

    /// Authentication guards and authorization filters of the aggregated nodes. Abstract
    /// targets are matched without labels, so each implementation brings its own label.
    fn aggregate_auth(&mut self, target: Composite<'a>, related: &str) -> Result<(Vec<String>, WhereOutput)> {
        let mut guards = Vec::new();

        if let Composite::Node(node) = target {
            guards.extend(self.authentication(node, &[], AuthOperation::Aggregate)?);
            let auth = self.auth_where(node, &[], related, AuthOperation::Aggregate)?;
            return Ok((guards, auth));
        }

        let mut branches = Vec::new();

        for node in self.concrete_nodes(target) {
            guards.extend(self.authentication(node, &[], AuthOperation::Aggregate)?);

            let label = WhereOutput::predicate(Some(self.label_predicate(related, node)?));
            let auth = self.auth_where(node, &[], related, AuthOperation::Aggregate)?;
            branches.push(WhereOutput::all([label, auth]));
        }

        if branches.is_empty() {
            return Ok((guards, WhereOutput::predicate(Some(Predicate::raw("false")))));
        }

        Ok((guards, WhereOutput::any(branches)))
    }

    /// `{ name: { shortest: ..., longest: ... }, born: { min: ..., max: ... } }`
    fn aggregate_selection(
        &mut self,
        target: Target<'a>,
        variable: &str,
        selection: &IndexMap<String, ResolveTree>,
    ) -> Result<String> {
        let mut entries = Vec::with_capacity(selection.len());

        for (alias, tree) in selection {
            let field = aggregatable(target, &tree.name)?;
            let value = self.aggregate_value(field, variable, tree)?;
            entries.push(format!("{}: {value}", cypher::escape(alias)));
        }

        Ok(map(entries))
    }

    /// The functions requested on one field.
    fn aggregate_value(&mut self, field: &Field, variable: &str, tree: &ResolveTree) -> Result<String> {
        let property = cypher::property(variable, field.db_name());
        let temporal = field.temporal_type();
        let mut entries = Vec::with_capacity(tree.fields.len());

        for (alias, function) in &tree.fields {
            let expression = match function.name.as_str() {
                "shortest" if field.is_string_like() => self.length_extreme(&property, "<"),
                "longest" if field.is_string_like() => self.length_extreme(&property, ">"),
                name @ ("min" | "max") if field.is_numeric() || temporal.is_some() => {
                    let expression = format!("{name}({property})");
                    match temporal {
                        Some(TemporalType::DateTime) => format_datetime(&expression),
                        _ => expression,
                    }
                }
                "average" if field.is_numeric() => format!("avg({property})"),
                "sum" if field.is_numeric() => format!("sum({property})"),
                name => {
                    return Err(Error::UnknownField {
                        container: format!("{}AggregateSelection", field.type_name()),
                        name: name.to_string(),
                    })
                }
            };

            entries.push(format!("{}: {expression}", cypher::escape(alias)));
        }

        Ok(map(entries))
    }

    /// Shortest (`<`) or longest (`>`) string by length. Among values of the same length
    /// the first collected one wins.
    fn length_extreme(&mut self, property: &str, comparison: &str) -> String {
        let extreme = self.scope.next_variable("var");
        let current = self.scope.next_variable("var");

        format!(
            "reduce({extreme} = collect({property})[0], {current} IN collect({property}) | \
             CASE WHEN size({current}) {comparison} size({extreme}) THEN {current} ELSE {extreme} END)"
        )
    }
}

fn aggregatable<'a>(target: Target<'a>, name: &str) -> Result<&'a Field> {
    target
        .field(name)
        .filter(|field| field.is_stored() && !field.list && !field.is_point())
        .ok_or_else(|| Error::UnknownField {
            container: format!("{}AggregateSelection", target.name()),
            name: name.to_string(),
        })
}

fn unknown_aggregate(relation: &Relation<'_>, name: &str) -> Error {
    Error::UnknownField {
        container: format!("{}Aggregate", relation.qualified_name()),
        name: name.to_string(),
    }
}

fn map(entries: Vec<String>) -> String {
    if entries.is_empty() {
        "{ }".to_string()
    } else {
        format!("{{ {} }}", entries.join(", "))
    }
}
