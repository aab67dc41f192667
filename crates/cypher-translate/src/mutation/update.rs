use cypher_schema::{AuthOperation, GeneratedOperation, NestedOperation, Node};
use serde_json::{Map, Value};

use super::{annotated_inputs, entry, merge_operations, operation_key, response_selection, Checked, Link};
use crate::{
    cypher::Block,
    filter::{FilterMode, WhereOutput},
    selection::ResolveTree,
    translator::{Target, Translator},
    Result,
};

/// Top-level arguments of an update mutation holding relationship inputs keyed by field.
const TOP_LEVEL: [NestedOperation; 5] = [
    NestedOperation::Disconnect,
    NestedOperation::Delete,
    NestedOperation::Connect,
    NestedOperation::ConnectOrCreate,
    NestedOperation::Create,
];

impl<'a> Translator<'a> {
    /// Updates the matched nodes with the `update` input and the top-level relationship
    /// arguments, then projects them under `data`.
    pub fn root_update(&mut self, node: &'a Node, tree: &ResolveTree) -> Result<Block> {
        let empty = Map::new();
        let input = tree.object_arg("update").unwrap_or(&empty);
        let fields = annotated_inputs(node, input);

        let mut block = Block::new();

        if let Some(guard) = self.authentication(node, &fields, AuthOperation::Update)? {
            block.push(guard);
        }

        block.push(format!("MATCH (this{})", self.label_expression(node)?));

        let filter = match tree.object_arg("where") {
            Some(filter) => self.compile_where(Target::Node(node), "this", filter, FilterMode::default())?,
            None => WhereOutput::default(),
        };
        let auth = self.auth_where(node, &fields, "this", AuthOperation::Update)?;
        WhereOutput::all([filter, auth]).push_to(&mut block);

        self.update_assignments(Target::Node(node), "this", input, false)?
            .push_to(&mut block, "SET");

        let mut operations = input.clone();
        for operation in TOP_LEVEL {
            if let Some(by_field) = tree.object_arg(operation_key(operation)) {
                let lifted = self.lift(node, operation, by_field)?;
                merge_operations(&mut operations, lifted)?;
            }
        }

        self.finish_write(
            node,
            "this",
            &operations,
            &fields,
            AuthOperation::Update,
            Checked::Touched(&operations),
            &mut block,
        )?;

        let selection = response_selection(node, tree);
        let mut projection = self.project_node(node, "this", &selection, &[])?;

        if !projection.subqueries.is_empty() {
            block.push("WITH *");
            block.append(std::mem::take(&mut projection.subqueries));
        }

        block.push(format!("RETURN collect(DISTINCT this {}) AS data", projection.map()));
        Ok(block)
    }

    /// `{ where, update: { node, edge } }`, once per concrete node behind the target.
    pub(super) fn nested_update(
        &mut self,
        link: Link<'a, '_>,
        input: &Map<String, Value>,
        block: &mut Block,
    ) -> Result<()> {
        for node in self.concrete_nodes(link.target) {
            let inner = self.update_related(link, node, input)?;
            block.call(inner);
        }

        Ok(())
    }

    fn update_related(&mut self, link: Link<'a, '_>, node: &'a Node, input: &Map<String, Value>) -> Result<Block> {
        let empty = Map::new();
        let update = entry(input, "update")?;
        let node_input = match update {
            Some(update) => entry(update, "node")?.unwrap_or(&empty),
            None => &empty,
        };
        let edge = match update {
            Some(update) => entry(update, "edge")?,
            None => None,
        };
        let fields = annotated_inputs(node, node_input);

        let relationship = self.scope.next_variable("this");
        let related = self.scope.next_variable("this");

        let mut block = Block::new();
        block.push(format!("WITH {}", link.variable));

        if let Some(guard) = self.authentication(node, &fields, AuthOperation::Update)? {
            block.push(guard);
        }

        let labels = self.label_expression(node)?;
        let pattern = self.hop(link.variable, &link.relation, Some(&relationship), Some(&related), &labels, true);
        block.push(format!("MATCH {pattern}"));

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
        let auth = self.auth_where(node, &fields, &related, AuthOperation::Update)?;
        WhereOutput::all([filter, auth]).push_to(&mut block);

        let mut assignments = self.update_assignments(Target::Node(node), &related, node_input, true)?;
        assignments.append(self.edge_assignments(&link.relation, &relationship, edge, GeneratedOperation::Update)?);
        assignments.push_to(&mut block, "SET");

        self.finish_write(
            node,
            &related,
            node_input,
            &fields,
            AuthOperation::Update,
            Checked::Touched(node_input),
            &mut block,
        )?;

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
    use crate::{AuthContext, Config, CypherQuery, TranslateContext};

    fn schema() -> Schema {
        Schema::from_json(json!({
            "nodes": [
                {
                    "name": "Movie",
                    "fields": [
                        { "name": "title", "scalar": "String" },
                        { "name": "tags", "scalar": "String", "list": true },
                        {
                            "name": "actors",
                            "list": true,
                            "relationship": { "type": "ACTED_IN", "direction": "IN", "target": "Actor", "properties": "ActedIn" }
                        }
                    ]
                },
                { "name": "Actor", "fields": [{ "name": "name", "scalar": "String" }] }
            ],
            "relationshipProperties": [
                { "name": "ActedIn", "fields": [{ "name": "role", "scalar": "String" }] }
            ]
        }))
        .unwrap()
    }

    fn update(args: Value) -> crate::Result<CypherQuery> {
        let schema = schema();
        let config = Config::default();
        let auth = AuthContext::anonymous();
        let mut translator = Translator::new(TranslateContext::new(&schema, &config, &auth));
        let movie = translator.node("Movie").unwrap();

        let mut tree = ResolveTree::new("updateMovies");
        tree.args = args.as_object().cloned().unwrap();
        let mut movies = ResolveTree::new("movies");
        movies.fields.insert("title".into(), ResolveTree::new("title"));
        tree.fields.insert("movies".into(), movies);

        let block = translator.root_update(movie, &tree)?;
        Ok(translator.finish(block))
    }

    #[test]
    fn nested_update_of_node_and_edge() {
        let query = update(json!({
            "where": { "title": "The Matrix" },
            "update": {
                "actors": [{
                    "where": { "node": { "name": "Keanu" } },
                    "update": { "node": { "name": "Keanu Reeves" }, "edge": { "role": "Neo" } }
                }]
            }
        }))
        .unwrap();

        insta::assert_snapshot!(query.cypher, @r"
        MATCH (this:Movie)
        WHERE this.title = $param0
        WITH *
        CALL {
            WITH this
            MATCH (this)<-[this0:ACTED_IN]-(this1:Actor)
            WHERE this1.name = $param1
            SET this1.name = $param2.this1.name, this0.role = $param2.this0.role
            RETURN count(*) AS var2
        }
        RETURN collect(DISTINCT this { .title }) AS data
        ");

        assert_eq!(
            query.params["param2"],
            json!({ "this1": { "name": "Keanu Reeves" }, "this0": { "role": "Neo" } })
        );
    }

    #[test]
    fn top_level_connect_joins_the_update() {
        let query = update(json!({
            "update": { "title": "Speed" },
            "connect": { "actors": [{ "where": { "node": { "name": "Sandra" } }, "edge": { "role": "Annie" } }] }
        }))
        .unwrap();

        insta::assert_snapshot!(query.cypher, @r"
        MATCH (this:Movie)
        SET this.title = $param0
        WITH *
        CALL {
            WITH this
            OPTIONAL MATCH (this0:Actor)
            WHERE this0.name = $param1
            CALL {
                WITH *
                WITH collect(this0) AS connectedNodes, collect(this) AS parentNodes
                UNWIND parentNodes AS this
                UNWIND connectedNodes AS this0
                MERGE (this)<-[this1:ACTED_IN]-(this0)
                SET this1.role = $param2.this1.role
            }
            WITH this, this0
            RETURN count(*) AS var2
        }
        RETURN collect(DISTINCT this { .title }) AS data
        ");
    }

    #[test]
    fn unknown_operations_are_rejected() {
        let error = update(json!({
            "update": { "actors": [{ "replace": [{ "where": { "node": { "name": "A" } } }] }] }
        }))
        .unwrap_err();

        assert_eq!(error.to_string(), "Movie.actors does not have a field named 'replace'");
    }
}
