//! Compiles `where` input objects into predicates.
//!
//! A filter compiles to a [`WhereOutput`]: the predicate itself plus the `CALL`
//! subqueries it depends on. Relationship filters only need subqueries when they count
//! matches, every other filter is a plain predicate.

mod aggregate;
mod operator;
mod property;
mod relationship;

pub(crate) use operator::Operator;
pub(crate) use property::Shape;

use cypher_schema::Composite;
use serde_json::{Map, Value};

use self::operator::{parse_filter_key, FilterKey};
use crate::{
    cypher::{Block, Predicate},
    translator::{Relation, Target, Translator},
    Error, Result,
};

/// How relationship filters and claim references are compiled.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct FilterMode {
    /// Compile relationship quantifiers as counting subqueries instead of inline
    /// `EXISTS` patterns.
    pub count_subqueries: bool,
    /// Treat `$jwt.x` and `$context.x` strings as parameter references.
    pub claims: bool,
}

impl FilterMode {
    pub fn auth() -> Self {
        Self {
            count_subqueries: true,
            claims: true,
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct WhereOutput {
    pub predicate: Option<Predicate>,
    /// Subqueries that must run before the predicate is evaluated.
    pub preludes: Block,
}

impl WhereOutput {
    pub fn predicate(predicate: Option<Predicate>) -> Self {
        Self {
            predicate,
            preludes: Block::new(),
        }
    }

    pub fn all(outputs: impl IntoIterator<Item = WhereOutput>) -> Self {
        Self::combine(outputs, Predicate::and)
    }

    pub fn any(outputs: impl IntoIterator<Item = WhereOutput>) -> Self {
        Self::combine(outputs, Predicate::or)
    }

    fn combine(
        outputs: impl IntoIterator<Item = WhereOutput>,
        join: fn(Vec<Predicate>) -> Option<Predicate>,
    ) -> Self {
        let mut preludes = Block::new();
        let mut predicates = Vec::new();

        for output in outputs {
            preludes.append(output.preludes);
            predicates.extend(output.predicate);
        }

        Self {
            predicate: join(predicates),
            preludes,
        }
    }

    pub fn negate(self) -> Self {
        Self {
            predicate: self.predicate.map(Predicate::not),
            preludes: self.preludes,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.predicate.is_none() && self.preludes.is_empty()
    }

    /// Emits the subqueries followed by the `WHERE` clause.
    pub fn push_to(self, block: &mut Block) {
        let has_preludes = !self.preludes.is_empty();
        block.append(self.preludes);

        if let Some(predicate) = self.predicate {
            if has_preludes {
                block.push("WITH *");
            }
            block.push(format!("WHERE {predicate}"));
        }
    }
}

impl<'a> Translator<'a> {
    /// Compiles a `where` object over a node, interface or relationship properties
    /// bound to `variable`.
    pub fn compile_where(
        &mut self,
        target: Target<'a>,
        variable: &str,
        filter: &Map<String, Value>,
        mode: FilterMode,
    ) -> Result<WhereOutput> {
        let mut outputs = Vec::with_capacity(filter.len());

        for (key, value) in filter {
            outputs.push(self.compile_entry(target, variable, key, value, mode)?);
        }

        Ok(WhereOutput::all(outputs))
    }

    fn compile_entry(
        &mut self,
        target: Target<'a>,
        variable: &str,
        key: &str,
        value: &Value,
        mode: FilterMode,
    ) -> Result<WhereOutput> {
        let unknown = || Error::UnknownFilter {
            container: target.name().to_string(),
            key: key.to_string(),
        };

        match parse_filter_key(target, key).ok_or_else(unknown)? {
            FilterKey::And | FilterKey::Or => {
                let mut outputs = Vec::new();

                for item in list_of_objects(key, value)? {
                    outputs.push(self.compile_where(target, variable, item, mode)?);
                }

                Ok(match key {
                    "AND" => WhereOutput::all(outputs),
                    _ => WhereOutput::any(outputs),
                })
            }
            FilterKey::Not => match value {
                Value::Null => Ok(WhereOutput::default()),
                value => Ok(self.compile_where(target, variable, object(key, value)?, mode)?.negate()),
            },
            FilterKey::Property { field, operator } => {
                let predicate = self.compile_property(target, field, variable, operator, key, value, mode)?;
                Ok(WhereOutput::predicate(predicate))
            }
            FilterKey::Relationship { field, quantifier } => {
                let relation = self.relation(target, field)?;
                self.compile_relationship_filter(&relation, variable, quantifier, key, value, mode)
            }
            FilterKey::Connection { field, quantifier } => {
                let relation = self.relation(target, field)?;
                self.compile_connection_filter(&relation, variable, quantifier, key, value, mode)
            }
            FilterKey::Aggregate { field } => {
                let relation = self.relation(target, field)?;
                self.compile_aggregate_filter(&relation, variable, key, value)
            }
        }
    }

    /// A `where` over any composite. Unions are filtered per member, e.g.
    /// `{ Movie: { title: "..." }, Series: { ... } }`.
    pub fn compile_composite_where(
        &mut self,
        composite: Composite<'a>,
        variable: &str,
        filter: &Map<String, Value>,
        mode: FilterMode,
    ) -> Result<WhereOutput> {
        match composite {
            Composite::Node(node) => self.compile_where(Target::Node(node), variable, filter, mode),
            Composite::Interface(interface) => self.compile_where(Target::Interface(interface), variable, filter, mode),
            Composite::Union(union) => {
                let mut branches = Vec::with_capacity(filter.len());

                for (member, value) in filter {
                    let node = union
                        .members
                        .iter()
                        .find(|name| *name == member)
                        .and_then(|name| self.schema().node(name))
                        .ok_or_else(|| Error::UnknownFilter {
                            container: union.name.clone(),
                            key: member.clone(),
                        })?;

                    let inner = self.compile_where(Target::Node(node), variable, object(member, value)?, mode)?;
                    let label = WhereOutput::predicate(Some(self.label_predicate(variable, node)?));

                    branches.push(WhereOutput::all([label, inner]));
                }

                Ok(WhereOutput::any(branches))
            }
        }
    }

    /// The `where` of a connection field: `node` and `edge` keys plus logical
    /// combinators. Union targets are keyed by member first.
    pub fn compile_connection_where(
        &mut self,
        relation: &Relation<'a>,
        relationship: &str,
        related: &str,
        filter: &Map<String, Value>,
        mode: FilterMode,
    ) -> Result<WhereOutput> {
        let Composite::Union(union) = relation.target else {
            return self.compile_edge_where(relation, relation.target, relationship, related, filter, mode);
        };

        let mut branches = Vec::with_capacity(filter.len());

        for (member, value) in filter {
            let node = union
                .members
                .iter()
                .find(|name| *name == member)
                .and_then(|name| self.schema().node(name))
                .ok_or_else(|| Error::UnknownFilter {
                    container: format!("{}Connection", relation.field.name),
                    key: member.clone(),
                })?;

            let label = WhereOutput::predicate(Some(self.label_predicate(related, node)?));
            let inner = self.compile_edge_where(
                relation,
                Composite::Node(node),
                relationship,
                related,
                object(member, value)?,
                mode,
            )?;

            branches.push(WhereOutput::all([label, inner]));
        }

        Ok(WhereOutput::any(branches))
    }

    pub(crate) fn compile_edge_where(
        &mut self,
        relation: &Relation<'a>,
        target: Composite<'a>,
        relationship: &str,
        related: &str,
        filter: &Map<String, Value>,
        mode: FilterMode,
    ) -> Result<WhereOutput> {
        let mut outputs = Vec::with_capacity(filter.len());

        for (key, value) in filter {
            let output = match key.as_str() {
                "node" | "node_NOT" => {
                    let output = self.compile_composite_where(target, related, object(key, value)?, mode)?;
                    if key == "node_NOT" {
                        output.negate()
                    } else {
                        output
                    }
                }
                "edge" | "edge_NOT" => {
                    let properties = relation.properties.ok_or_else(|| Error::UnknownFilter {
                        container: format!("{}Connection", relation.field.name),
                        key: key.clone(),
                    })?;

                    let output =
                        self.compile_where(Target::Properties(properties), relationship, object(key, value)?, mode)?;
                    if key == "edge_NOT" {
                        output.negate()
                    } else {
                        output
                    }
                }
                "AND" | "OR" => {
                    let mut items = Vec::new();
                    for item in list_of_objects(key, value)? {
                        items.push(self.compile_edge_where(relation, target, relationship, related, item, mode)?);
                    }

                    if key == "AND" {
                        WhereOutput::all(items)
                    } else {
                        WhereOutput::any(items)
                    }
                }
                "NOT" => self
                    .compile_edge_where(relation, target, relationship, related, object(key, value)?, mode)?
                    .negate(),
                _ => {
                    return Err(Error::UnknownFilter {
                        container: format!("{}Connection", relation.field.name),
                        key: key.clone(),
                    })
                }
            };

            outputs.push(output);
        }

        Ok(WhereOutput::all(outputs))
    }
}

pub(crate) fn object<'v>(key: &str, value: &'v Value) -> Result<&'v Map<String, Value>> {
    value.as_object().ok_or_else(|| Error::InvalidFilterValue {
        key: key.to_string(),
        reason: "expected an object".to_string(),
    })
}

fn list_of_objects<'v>(key: &str, value: &'v Value) -> Result<Vec<&'v Map<String, Value>>> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => items.iter().map(|item| object(key, item)).collect(),
        // A single object is accepted where a list is expected, as GraphQL input coercion does.
        Value::Object(item) => Ok(vec![item]),
        _ => Err(Error::InvalidFilterValue {
            key: key.to_string(),
            reason: "expected a list of objects".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use cypher_schema::Schema;
    use serde_json::json;

    use super::*;
    use crate::{AuthContext, Config, TranslateContext};

    fn schema() -> Schema {
        Schema::from_json(json!({
            "nodes": [
                {
                    "name": "Movie",
                    "fields": [
                        { "name": "_id", "scalar": "ID" },
                        { "name": "id", "scalar": "ID", "required": true },
                        { "name": "title", "scalar": "String" },
                        { "name": "year", "scalar": "Int" },
                        { "name": "rating", "scalar": "Float" },
                        { "name": "tags", "scalar": "String", "list": true },
                        { "name": "released", "temporal": "DateTime" },
                        { "name": "location", "point": "Point" },
                        {
                            "name": "actors",
                            "list": true,
                            "relationship": { "type": "ACTED_IN", "direction": "IN", "target": "Actor" }
                        }
                    ]
                },
                {
                    "name": "Actor",
                    "fields": [{ "name": "name", "scalar": "String" }]
                }
            ]
        }))
        .unwrap()
    }

    fn compile(filter: Value) -> (String, Value) {
        let schema = schema();
        let config = Config::default();
        let auth = AuthContext::anonymous();
        let mut translator = Translator::new(TranslateContext::new(&schema, &config, &auth));
        let movie = translator.node("Movie").unwrap();

        let output = translator
            .compile_where(
                Target::Node(movie),
                "this",
                filter.as_object().unwrap(),
                FilterMode::default(),
            )
            .unwrap();

        let mut block = Block::new();
        output.push_to(&mut block);
        let query = translator.finish(block);

        (query.cypher, Value::Object(query.params))
    }

    #[test]
    fn membership_on_a_property() {
        let (cypher, params) = compile(json!({ "_id_IN": ["123"] }));

        assert_eq!(cypher, "WHERE this._id IN $param0");
        assert_eq!(params, json!({ "param0": ["123"] }));
    }

    #[test]
    fn negated_membership_is_wrapped() {
        let (cypher, params) = compile(json!({ "id_NOT_IN": ["123"] }));

        assert_eq!(cypher, "WHERE NOT (this.id IN $param0)");
        assert_eq!(params, json!({ "param0": ["123"] }));
    }

    #[test]
    fn empty_membership_is_no_constraint() {
        assert_eq!(compile(json!({ "_id_IN": [] })), compile(json!({})));
        assert_eq!(compile(json!({ "_id_IN": [], "title": "Up" })), compile(json!({ "title": "Up" })));
    }

    #[test]
    fn logical_not_wraps_the_whole_expression() {
        let (inner, _) = compile(json!({ "title": "Up", "year_GT": 2000 }));
        let (negated, params) = compile(json!({ "NOT": { "title": "Up", "year_GT": 2000 } }));

        assert_eq!(inner, "WHERE this.title = $param0 AND this.year > $param1");
        assert_eq!(negated, "WHERE NOT (this.title = $param0 AND this.year > $param1)");
        assert_eq!(
            params,
            json!({ "param0": "Up", "param1": { "low": 2000, "high": 0 } })
        );
    }

    #[test]
    fn logical_combinators() {
        let (cypher, _) = compile(json!({
            "OR": [{ "title": "Up" }, { "title_STARTS_WITH": "The", "rating_GTE": 7.5 }],
            "tags_INCLUDES": "animated"
        }));

        assert_eq!(
            cypher,
            "WHERE (this.title = $param0 OR (this.title STARTS WITH $param1 AND this.rating >= $param2)) AND $param3 IN this.tags"
        );
    }

    #[test]
    fn null_equality() {
        let (cypher, params) = compile(json!({ "title": null, "year_NOT": null }));

        assert_eq!(cypher, "WHERE this.title IS NULL AND this.year IS NOT NULL");
        assert_eq!(params, json!({}));
    }

    #[test]
    fn temporal_and_spatial_values() {
        let (cypher, params) = compile(json!({
            "released_GT": "2020-01-01T00:00:00Z",
            "location_DISTANCE": { "point": { "longitude": 1.0, "latitude": 2.0 }, "distance": 5.0 }
        }));

        assert_eq!(
            cypher,
            "WHERE this.released > datetime($param0) AND point.distance(this.location, point($param1.point)) = $param1.distance"
        );
        assert_eq!(params["param0"]["year"], json!(2020));
        assert_eq!(params["param1"]["distance"], json!(5.0));
    }

    #[test]
    fn relationship_quantifiers() {
        let (cypher, _) = compile(json!({ "actors_SOME": { "name": "Keanu" } }));
        assert_eq!(
            cypher,
            "WHERE EXISTS { MATCH (this)<-[:ACTED_IN]-(this0:Actor) WHERE this0.name = $param0 }"
        );

        let (cypher, _) = compile(json!({ "actors_NONE": { "name": "Keanu" } }));
        assert_eq!(
            cypher,
            "WHERE NOT (EXISTS { MATCH (this)<-[:ACTED_IN]-(this0:Actor) WHERE this0.name = $param0 })"
        );

        let (cypher, _) = compile(json!({ "actors_SINGLE": { "name": "Keanu" } }));
        assert_eq!(
            cypher,
            "WHERE single(var1 IN [(this)<-[:ACTED_IN]-(this0:Actor) WHERE this0.name = $param0 | 1] WHERE true)"
        );

        let (cypher, _) = compile(json!({ "actors_ALL": { "name": "Keanu" } }));
        assert_eq!(
            cypher,
            "WHERE EXISTS { MATCH (this)<-[:ACTED_IN]-(this0:Actor) WHERE this0.name = $param0 } AND NOT (EXISTS { MATCH (this)<-[:ACTED_IN]-(this0:Actor) WHERE NOT (this0.name = $param0) })"
        );
    }

    #[test]
    fn empty_relationship_filter_is_no_constraint() {
        assert_eq!(compile(json!({ "actors": {} })), compile(json!({})));
    }

    #[test]
    fn connection_filters_count_matches() {
        let (cypher, _) = compile(json!({
            "actorsConnection_NONE": { "node": { "name": "Keanu" } }
        }));

        insta::assert_snapshot!(cypher, @r"
        CALL {
            WITH this
            MATCH (this)<-[this0:ACTED_IN]-(this1:Actor)
            WHERE this1.name = $param0
            RETURN count(this1) AS var2
        }
        WITH *
        WHERE var2 = 0
        ");
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let schema = schema();
        let config = Config::default();
        let auth = AuthContext::anonymous();
        let mut translator = Translator::new(TranslateContext::new(&schema, &config, &auth));
        let movie = translator.node("Movie").unwrap();

        let error = translator
            .compile_where(
                Target::Node(movie),
                "this",
                json!({ "budget_GT": 1 }).as_object().unwrap(),
                FilterMode::default(),
            )
            .unwrap_err();

        assert_eq!(error.to_string(), "Unknown filter 'budget_GT' on Movie");
    }
}
