use cypher_schema::Node;

use super::Checked;
use crate::{
    cypher::{self, Block},
    translator::{Relation, Target, Translator},
    Result, RELATIONSHIP_REQUIRED,
};

impl<'a> Translator<'a> {
    /// Counts the relationships of every checked singular field of a written node and
    /// fails the statement unless a required one is linked exactly once and an optional
    /// one at most once.
    pub(crate) fn validate_cardinality(&mut self, node: &'a Node, variable: &str, checked: Checked<'_>) -> Result<Block> {
        let mut block = Block::new();

        for field in node.relationship_fields().filter(|field| !field.list) {
            if let Checked::Touched(input) = checked {
                if !input.contains_key(&field.name) {
                    continue;
                }
            }

            let relation = self.relation(Target::Node(node), field)?;
            let relationship = self.scope.next_variable("var");
            let count = self.scope.next_variable("var");
            let result = self.scope.next_variable("var");

            let labels = self.pattern_labels(relation.target)?;
            let pattern = self.hop(variable, &relation, Some(&relationship), None, &labels, true);

            let (condition, expectation) = if field.required {
                (format!("{count} = 1"), "required exactly once")
            } else {
                (format!("{count} <= 1"), "must not be linked more than once")
            };

            let message = format!(
                "{RELATIONSHIP_REQUIRED}: {} {expectation}",
                relation.qualified_name()
            );

            let mut check = Block::new();
            check.push(format!("WITH {variable}"));
            check.push(format!("MATCH {pattern}"));
            check.push(format!("WITH count({relationship}) AS {count}"));
            check.push(format!(
                "WHERE apoc.util.validatePredicate(NOT ({condition}), {}, [0])",
                cypher::string_literal(&message)
            ));
            check.push(format!("RETURN {count} AS {result}"));

            block.call(check);
        }

        Ok(block)
    }

    /// Fails the statement when a singular field whose implementations are connected
    /// independently ends up linked to more than one node.
    pub(crate) fn validate_single_link(&mut self, relation: &Relation<'a>, variable: &str) -> Result<Block> {
        let relationship = self.scope.next_variable("var");
        let related = self.scope.next_variable("var");
        let count = self.scope.next_variable("var");
        let result = self.scope.next_variable("var");

        let pattern = self.hop(variable, relation, Some(&relationship), Some(&related), "", true);
        let message = format!(
            "{RELATIONSHIP_REQUIRED}: {} cannot have more than one node linked",
            relation.qualified_name()
        );

        let mut check = Block::new();
        check.push(format!("WITH {variable}"));
        check.push(format!("MATCH {pattern}"));

        if let Some(labels) = self.composite_predicate(&related, relation.target)? {
            check.push(format!("WHERE {labels}"));
        }

        check.push(format!("WITH count({relationship}) AS {count}"));
        check.push(format!(
            "WHERE apoc.util.validatePredicate({count} > 1, {}, [0])",
            cypher::string_literal(&message)
        ));
        check.push(format!("RETURN {count} AS {result}"));

        Ok(check)
    }
}

#[cfg(test)]
mod tests {
    use cypher_schema::Schema;
    use serde_json::{json, Map, Value};

    use super::*;
    use crate::{AuthContext, Config, TranslateContext};

    fn schema() -> Schema {
        Schema::from_json(json!({
            "nodes": [
                {
                    "name": "Movie",
                    "fields": [
                        { "name": "title", "scalar": "String" },
                        {
                            "name": "director",
                            "required": true,
                            "relationship": { "type": "DIRECTED", "direction": "IN", "target": "Person" }
                        },
                        {
                            "name": "studio",
                            "relationship": { "type": "PRODUCED_BY", "direction": "OUT", "target": "Studio" }
                        },
                        {
                            "name": "actors",
                            "list": true,
                            "relationship": { "type": "ACTED_IN", "direction": "IN", "target": "Person" }
                        }
                    ]
                },
                { "name": "Person", "fields": [{ "name": "name", "scalar": "String" }] },
                { "name": "Studio", "fields": [{ "name": "name", "scalar": "String" }] }
            ]
        }))
        .unwrap()
    }

    #[test]
    fn created_nodes_check_every_singular_relationship() {
        let schema = schema();
        let config = Config::default();
        let auth = AuthContext::anonymous();
        let mut translator = Translator::new(TranslateContext::new(&schema, &config, &auth));
        let movie = translator.node("Movie").unwrap();

        let block = translator.validate_cardinality(movie, "this0", Checked::All).unwrap();

        insta::assert_snapshot!(block.render(), @r#"
        CALL {
            WITH this0
            MATCH (this0)<-[var0:DIRECTED]-(:Person)
            WITH count(var0) AS var1
            WHERE apoc.util.validatePredicate(NOT (var1 = 1), "RELATIONSHIP-REQUIRED: Movie.director required exactly once", [0])
            RETURN var1 AS var2
        }
        CALL {
            WITH this0
            MATCH (this0)-[var3:PRODUCED_BY]->(:Studio)
            WITH count(var3) AS var4
            WHERE apoc.util.validatePredicate(NOT (var4 <= 1), "RELATIONSHIP-REQUIRED: Movie.studio must not be linked more than once", [0])
            RETURN var4 AS var5
        }
        "#);
    }

    #[test]
    fn updated_nodes_check_touched_relationships() {
        let schema = schema();
        let config = Config::default();
        let auth = AuthContext::anonymous();
        let mut translator = Translator::new(TranslateContext::new(&schema, &config, &auth));
        let movie = translator.node("Movie").unwrap();

        let input: Map<String, Value> = json!({ "title": "Up", "studio": { "connect": {} } })
            .as_object()
            .cloned()
            .unwrap();

        let block = translator
            .validate_cardinality(movie, "this", Checked::Touched(&input))
            .unwrap();

        let rendered = block.render();
        assert!(rendered.contains("Movie.studio"));
        assert!(!rendered.contains("Movie.director"));
    }
}
