use cypher_schema::{AuthOperation, AuthTiming, NestedOperation, Node};
use serde_json::{Map, Value};

use super::{entry, items, Link};
use crate::{
    cypher::Block,
    filter::{FilterMode, WhereOutput},
    translator::Translator,
    Result,
};

impl<'a> Translator<'a> {
    /// `{ where, disconnect }`, deleting the matched relationships.
    pub(super) fn nested_disconnect(
        &mut self,
        link: Link<'a, '_>,
        input: &Map<String, Value>,
        block: &mut Block,
    ) -> Result<()> {
        for node in self.concrete_nodes(link.target) {
            let inner = self.disconnect_node(link, node, input)?;
            block.call(inner);
        }

        Ok(())
    }

    fn disconnect_node(&mut self, link: Link<'a, '_>, node: &'a Node, input: &Map<String, Value>) -> Result<Block> {
        let relationship = self.scope.next_variable("this");
        let related = self.scope.next_variable("this");

        let mut block = Block::new();
        block.push(format!("WITH {}", link.variable));

        if let Some(guard) = self.authentication(node, &[], AuthOperation::Disconnect)? {
            block.push(guard);
        }

        let labels = self.label_expression(node)?;
        let pattern = self.hop(link.variable, &link.relation, Some(&relationship), Some(&related), &labels, true);
        block.push(format!("OPTIONAL MATCH {pattern}"));

        let filter = match entry(input, "where")? {
            Some(filter) => self.compile_edge_where(
                &link.relation,
                link.target,
                &relationship,
                &related,
                filter,
                FilterMode::default(),
            )?,
            None => WhereOutput::default(),
        };
        let auth = self.auth_where(node, &[], &related, AuthOperation::Disconnect)?;
        let owner_rules = self.auth_validate(
            link.owner,
            &[],
            link.variable,
            AuthOperation::Disconnect,
            AuthTiming::Before,
        )?;
        WhereOutput::all([filter, auth, owner_rules]).push_to(&mut block);

        if let Some(disconnect) = input.get("disconnect").filter(|value| !value.is_null()) {
            for disconnect in items("disconnect", disconnect)? {
                let operations = self.lift(node, NestedOperation::Disconnect, disconnect)?;
                block.append(self.nested_operations(node, &related, &operations)?);
            }
        }

        block.push(format!("DELETE {relationship}"));

        let result = self.scope.next_variable("var");
        block.push(format!("RETURN count(*) AS {result}"));

        Ok(block)
    }
}

#[cfg(test)]
mod tests {
    use cypher_schema::Schema;
    use serde_json::json;

    use super::*;
    use crate::{AuthContext, Config, TranslateContext};

    #[test]
    fn disconnect_with_edge_filter() {
        let schema = Schema::from_json(json!({
            "nodes": [
                {
                    "name": "Movie",
                    "fields": [{
                        "name": "actors",
                        "list": true,
                        "relationship": { "type": "ACTED_IN", "direction": "IN", "target": "Actor", "properties": "ActedIn" }
                    }]
                },
                { "name": "Actor", "fields": [{ "name": "name", "scalar": "String" }] }
            ],
            "relationshipProperties": [
                { "name": "ActedIn", "fields": [{ "name": "role", "scalar": "String" }] }
            ]
        }))
        .unwrap();

        let config = Config::default();
        let auth = AuthContext::anonymous();
        let mut translator = Translator::new(TranslateContext::new(&schema, &config, &auth));
        let movie = translator.node("Movie").unwrap();

        let input = json!({
            "actors": {
                "disconnect": [{ "where": { "node": { "name": "Keanu" }, "edge": { "role": "Neo" } } }]
            }
        });

        let block = translator
            .nested_operations(movie, "this", input.as_object().unwrap())
            .unwrap();

        insta::assert_snapshot!(block.render(), @r"
        CALL {
            WITH this
            OPTIONAL MATCH (this)<-[this0:ACTED_IN]-(this1:Actor)
            WHERE this1.name = $param0 AND this0.role = $param1
            DELETE this0
            RETURN count(*) AS var2
        }
        ");
    }
}
