use cypher_schema::Composite;
use serde_json::Value;

use super::{object, operator::Quantifier, FilterMode, WhereOutput};
use crate::{
    cypher::{Block, Predicate},
    translator::{Relation, Translator},
    Result,
};

impl<'a> Translator<'a> {
    pub(super) fn compile_relationship_filter(
        &mut self,
        relation: &Relation<'a>,
        variable: &str,
        quantifier: Quantifier,
        key: &str,
        value: &Value,
        mode: FilterMode,
    ) -> Result<WhereOutput> {
        let labels = self.pattern_labels(relation.target)?;

        if value.is_null() {
            return Ok(self.relationship_presence(relation, variable, quantifier, &labels));
        }

        let filter = object(key, value)?;
        if filter.is_empty() {
            return Ok(WhereOutput::default());
        }

        let related = self.scope.next_variable("this");
        let inner = self.compile_composite_where(relation.target, &related, filter, mode)?;
        if inner.is_empty() {
            return Ok(WhereOutput::default());
        }

        let narrowing = self.narrowing(relation.target, &related)?;
        let pattern = self.hop(variable, relation, None, Some(&related), &labels, true);

        if mode.count_subqueries || !inner.preludes.is_empty() {
            return Ok(self.count_filter(variable, &pattern, &related, narrowing, inner, quantifier));
        }

        let conjoin = |predicate: Option<Predicate>| Predicate::and(narrowing.clone().into_iter().chain(predicate));

        let exists = |predicate: Option<Predicate>| {
            let clause = match predicate {
                Some(predicate) => format!("EXISTS {{ MATCH {pattern} WHERE {predicate} }}"),
                None => format!("EXISTS {{ MATCH {pattern} }}"),
            };
            Predicate::raw(clause)
        };

        let predicate = match quantifier {
            Quantifier::Bare | Quantifier::Some => exists(conjoin(inner.predicate)),
            Quantifier::None | Quantifier::Not => exists(conjoin(inner.predicate)).not(),
            Quantifier::Single => {
                let item = self.scope.next_variable("var");
                let clause = match conjoin(inner.predicate) {
                    Some(predicate) => format!(" WHERE {predicate}"),
                    None => String::new(),
                };
                Predicate::raw(format!("single({item} IN [{pattern}{clause} | 1] WHERE true)"))
            }
            Quantifier::All => match inner.predicate {
                Some(predicate) => {
                    let matching = exists(conjoin(Some(predicate.clone())));
                    let failing = exists(conjoin(Some(predicate.not()))).not();
                    Predicate::And(vec![matching, failing])
                }
                None => exists(conjoin(None)),
            },
        };

        Ok(WhereOutput::predicate(Some(predicate)))
    }

    pub(super) fn compile_connection_filter(
        &mut self,
        relation: &Relation<'a>,
        variable: &str,
        quantifier: Quantifier,
        key: &str,
        value: &Value,
        mode: FilterMode,
    ) -> Result<WhereOutput> {
        let labels = self.pattern_labels(relation.target)?;

        if value.is_null() {
            return Ok(self.relationship_presence(relation, variable, quantifier, &labels));
        }

        let filter = object(key, value)?;
        if filter.is_empty() {
            return Ok(WhereOutput::default());
        }

        let relationship = self.scope.next_variable("this");
        let related = self.scope.next_variable("this");
        let inner = self.compile_connection_where(relation, &relationship, &related, filter, mode)?;
        if inner.is_empty() {
            return Ok(WhereOutput::default());
        }

        let narrowing = self.narrowing(relation.target, &related)?;
        let pattern = self.hop(variable, relation, Some(&relationship), Some(&related), &labels, true);

        Ok(self.count_filter(variable, &pattern, &related, narrowing, inner, quantifier))
    }

    /// A `null` relationship filter tests for the presence of any related node.
    fn relationship_presence(
        &mut self,
        relation: &Relation<'a>,
        variable: &str,
        quantifier: Quantifier,
        labels: &str,
    ) -> WhereOutput {
        let pattern = self.hop(variable, relation, None, None, labels, true);
        let exists = Predicate::raw(format!("EXISTS {{ MATCH {pattern} }}"));

        let predicate = match quantifier {
            Quantifier::Bare => Some(exists.not()),
            Quantifier::Not => Some(exists),
            _ => None,
        };

        WhereOutput::predicate(predicate)
    }

    /// Interface targets are matched without labels, so the implementations are
    /// listed explicitly.
    pub(crate) fn narrowing(&self, target: Composite<'a>, related: &str) -> Result<Option<Predicate>> {
        match target {
            Composite::Interface(_) => self.composite_predicate(related, target),
            _ => Ok(None),
        }
    }

    /// Counts related nodes in a subquery and compares the count. `ALL` counts the
    /// related nodes that do not match.
    pub(crate) fn count_filter(
        &mut self,
        variable: &str,
        pattern: &str,
        related: &str,
        narrowing: Option<Predicate>,
        inner: WhereOutput,
        quantifier: Quantifier,
    ) -> WhereOutput {
        let count = self.scope.next_variable("var");

        let inner = match quantifier {
            Quantifier::All => inner.negate(),
            _ => inner,
        };
        let inner = WhereOutput::all([WhereOutput::predicate(narrowing), inner]);

        let mut subquery = Block::new();
        subquery.push(format!("WITH {variable}"));
        subquery.push(format!("MATCH {pattern}"));
        inner.push_to(&mut subquery);
        subquery.push(format!("RETURN count({related}) AS {count}"));

        let comparison = match quantifier {
            Quantifier::Bare | Quantifier::Some => "> 0",
            Quantifier::None | Quantifier::Not | Quantifier::All => "= 0",
            Quantifier::Single => "= 1",
        };

        let mut preludes = Block::new();
        preludes.call(subquery);

        WhereOutput {
            predicate: Some(Predicate::raw(format!("{count} {comparison}"))),
            preludes,
        }
    }
}

#[cfg(test)]
mod tests {
    use cypher_schema::Schema;
    use rstest::rstest;
    use serde_json::json;

    use super::*;
    use crate::{translator::Target, AuthContext, Config, TranslateContext};

    fn schema() -> Schema {
        Schema::from_json(json!({
            "nodes": [
                {
                    "name": "Actor",
                    "fields": [
                        { "name": "name", "scalar": "String" },
                        {
                            "name": "actedIn",
                            "list": true,
                            "relationship": { "type": "ACTED_IN", "direction": "OUT", "target": "Production" }
                        }
                    ]
                },
                { "name": "Movie", "implements": ["Production"], "fields": [{ "name": "title", "scalar": "String" }] },
                { "name": "Series", "implements": ["Production"], "fields": [{ "name": "title", "scalar": "String" }] }
            ],
            "interfaces": [
                { "name": "Production", "fields": [{ "name": "title", "scalar": "String" }] }
            ]
        }))
        .unwrap()
    }

    fn compile(filter: Value, mode: FilterMode) -> String {
        let schema = schema();
        let config = Config::default();
        let auth = AuthContext::anonymous();
        let mut translator = Translator::new(TranslateContext::new(&schema, &config, &auth));
        let actor = translator.node("Actor").unwrap();

        let output = translator
            .compile_where(Target::Node(actor), "this", filter.as_object().unwrap(), mode)
            .unwrap();

        let mut block = Block::new();
        output.push_to(&mut block);
        block.render()
    }

    #[test]
    fn interface_targets_are_narrowed_to_implementations() {
        let cypher = compile(json!({ "actedIn_SOME": { "title": "Up" } }), FilterMode::default());

        assert_eq!(
            cypher,
            "WHERE EXISTS { MATCH (this)-[:ACTED_IN]->(this0) WHERE (this0:Movie OR this0:Series) AND this0.title = $param0 }"
        );
    }

    #[test]
    fn bare_form_is_some() {
        assert_eq!(
            compile(json!({ "actedIn": { "title": "Up" } }), FilterMode::default()),
            compile(json!({ "actedIn_SOME": { "title": "Up" } }), FilterMode::default())
        );
    }

    #[test]
    fn null_tests_presence() {
        assert_eq!(
            compile(json!({ "actedIn": null }), FilterMode::default()),
            "WHERE NOT (EXISTS { MATCH (this)-[:ACTED_IN]->() })"
        );
        assert_eq!(
            compile(json!({ "actedIn_NOT": null }), FilterMode::default()),
            "WHERE EXISTS { MATCH (this)-[:ACTED_IN]->() }"
        );
    }

    #[rstest]
    #[case("actedIn")]
    #[case("actedIn_NONE")]
    #[case("actedIn_SINGLE")]
    #[case("actedIn_ALL")]
    #[case("actedInConnection_ALL")]
    #[case("actedInConnection_NONE")]
    fn filters_compiling_to_nothing_add_no_constraint(#[case] key: &str) {
        let inner = if key.contains("Connection") {
            json!({ "node": { "title_IN": [] } })
        } else {
            json!({ "title_IN": [] })
        };

        assert_eq!(compile(json!({ key: inner.clone() }), FilterMode::default()), "");
        assert_eq!(compile(json!({ key: inner }), FilterMode::auth()), "");
    }

    #[rstest]
    #[case("actedIn_SOME", "WHERE (this0:Movie OR this0:Series) AND this0.title = $param0", "var1 > 0")]
    #[case("actedIn_NONE", "WHERE (this0:Movie OR this0:Series) AND this0.title = $param0", "var1 = 0")]
    #[case("actedIn_SINGLE", "WHERE (this0:Movie OR this0:Series) AND this0.title = $param0", "var1 = 1")]
    #[case(
        "actedIn_ALL",
        "WHERE (this0:Movie OR this0:Series) AND NOT (this0.title = $param0)",
        "var1 = 0"
    )]
    fn counting_quantifiers(#[case] key: &str, #[case] inner: &str, #[case] comparison: &str) {
        let cypher = compile(json!({ key: { "title": "Up" } }), FilterMode::auth());

        let expected = [
            "CALL {",
            "    WITH this",
            "    MATCH (this)-[:ACTED_IN]->(this0)",
            &format!("    {inner}"),
            "    RETURN count(this0) AS var1",
            "}",
            "WITH *",
            &format!("WHERE {comparison}"),
        ]
        .join("\n");

        assert_eq!(cypher, expected);
    }
}
