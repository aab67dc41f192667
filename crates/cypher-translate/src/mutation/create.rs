use cypher_schema::{AuthOperation, Composite, GeneratedOperation, Node};
use serde_json::{Map, Value};

use super::{annotated_inputs, entry, items, response_selection, Checked, Link};
use crate::{
    cypher::Block,
    filter::object,
    selection::ResolveTree,
    translator::{Target, Translator},
    Error, Result,
};

impl<'a> Translator<'a> {
    /// One `CALL` creating each input of the batch, then the projection of the created
    /// nodes under `data`.
    pub fn root_create(&mut self, node: &'a Node, tree: &ResolveTree) -> Result<Block> {
        let input = tree.arg("input").ok_or_else(|| Error::MissingArgument {
            field: tree.name.clone(),
            name: "input".to_string(),
        })?;

        let mut block = Block::new();
        let mut created = Vec::new();

        for input in items("input", input)? {
            let variable = self.scope.next_variable("this");

            let mut inner = self.create_node(node, &variable, input, false, None)?;
            inner.push(format!("RETURN {variable}"));
            block.call(inner);

            created.push(variable);
        }

        block.push(format!("WITH [{}] AS created", created.join(", ")));
        block.push("UNWIND created AS this");

        let selection = response_selection(node, tree);
        let mut projection = self.project_node(node, "this", &selection, &[])?;
        block.append(std::mem::take(&mut projection.subqueries));
        block.push(format!("RETURN collect(this {}) AS data", projection.map()));

        Ok(block)
    }

    /// `CREATE` of one node and its properties. `attach` links it to its parent before
    /// the nested inputs run.
    fn create_node(
        &mut self,
        node: &'a Node,
        variable: &str,
        input: &Map<String, Value>,
        nested: bool,
        attach: Option<Block>,
    ) -> Result<Block> {
        let fields = annotated_inputs(node, input);
        let mut block = Block::new();

        if let Some(guard) = self.authentication(node, &fields, AuthOperation::Create)? {
            block.push(guard);
        }

        block.push(format!("CREATE ({variable}{})", self.label_expression(node)?));
        self.create_assignments(Target::Node(node), variable, input, nested)?
            .push_to(&mut block, "SET");

        if let Some(attach) = attach {
            block.append(attach);
        }

        self.finish_write(
            node,
            variable,
            input,
            &fields,
            AuthOperation::Create,
            Checked::All,
            &mut block,
        )?;

        Ok(block)
    }

    /// `{ node, edge }`. Interface targets key `node` by the concrete type to create.
    pub(super) fn nested_create(
        &mut self,
        link: Link<'a, '_>,
        input: &Map<String, Value>,
        block: &mut Block,
    ) -> Result<()> {
        let node_input = entry(input, "node")?.ok_or_else(|| Error::MissingArgument {
            field: link.relation.qualified_name(),
            name: "node".to_string(),
        })?;
        let edge = entry(input, "edge")?;

        match link.target {
            Composite::Node(node) => {
                let inner = self.create_related(link, node, node_input, edge)?;
                block.call(inner);
            }
            target => {
                for (type_name, value) in node_input {
                    let node = self
                        .concrete_nodes(target)
                        .into_iter()
                        .find(|node| node.name == *type_name)
                        .ok_or_else(|| Error::UnknownField {
                            container: target.name().to_string(),
                            name: type_name.clone(),
                        })?;

                    let inner = self.create_related(link, node, object(type_name, value)?, edge)?;
                    block.call(inner);
                }
            }
        }

        Ok(())
    }

    fn create_related(
        &mut self,
        link: Link<'a, '_>,
        node: &'a Node,
        input: &Map<String, Value>,
        edge: Option<&Map<String, Value>>,
    ) -> Result<Block> {
        let related = self.scope.next_variable("this");
        let relationship = self.scope.next_variable("this");

        let mut attach = Block::new();
        let pattern = self.hop(link.variable, &link.relation, Some(&relationship), Some(&related), "", true);
        attach.push(format!("MERGE {pattern}"));
        self.edge_assignments(&link.relation, &relationship, edge, GeneratedOperation::Create)?
            .push_to(&mut attach, "SET");

        let mut block = Block::new();
        block.push(format!("WITH {}", link.variable));
        block.append(self.create_node(node, &related, input, true, Some(attach))?);

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

    fn schema() -> Schema {
        Schema::from_json(json!({
            "nodes": [
                {
                    "name": "Movie",
                    "fields": [
                        { "name": "id", "scalar": "ID", "generated": { "kind": "uuid" } },
                        { "name": "title", "scalar": "String" },
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

    fn create(args: Value) -> crate::CypherQuery {
        let schema = schema();
        let config = Config::default();
        let auth = AuthContext::anonymous();
        let mut translator = Translator::new(TranslateContext::new(&schema, &config, &auth));
        let movie = translator.node("Movie").unwrap();

        let mut tree = ResolveTree::new("createMovies");
        tree.args = args.as_object().cloned().unwrap();
        let mut movies = ResolveTree::new("movies");
        movies.fields.insert("title".into(), ResolveTree::new("title"));
        tree.fields.insert("movies".into(), movies);

        let block = translator.root_create(movie, &tree).unwrap();
        translator.finish(block)
    }

    #[test]
    fn batch_with_nested_create() {
        let query = create(json!({
            "input": [
                {
                    "title": "The Matrix",
                    "actors": { "create": [{ "node": { "name": "Keanu" }, "edge": { "role": "Neo" } }] }
                },
                { "title": "Speed" }
            ]
        }));

        insta::assert_snapshot!(query.cypher, @r"
        CALL {
            CREATE (this0:Movie)
            SET this0.title = $param0, this0.id = randomUUID()
            WITH *
            CALL {
                WITH this0
                CREATE (this1:Actor)
                SET this1.name = $param1.this1.name
                MERGE (this0)<-[this2:ACTED_IN]-(this1)
                SET this2.role = $param1.this2.role
                RETURN count(*) AS var3
            }
            RETURN this0
        }
        CALL {
            CREATE (this4:Movie)
            SET this4.title = $param2, this4.id = randomUUID()
            RETURN this4
        }
        WITH [this0, this4] AS created
        UNWIND created AS this
        RETURN collect(this { .title }) AS data
        ");

        assert_eq!(
            Value::Object(query.params),
            json!({
                "param0": "The Matrix",
                "param1": { "this1": { "name": "Keanu" }, "this2": { "role": "Neo" } },
                "param2": "Speed"
            })
        );
    }

    #[test]
    fn create_needs_an_input() {
        let schema = schema();
        let config = Config::default();
        let auth = AuthContext::anonymous();
        let mut translator = Translator::new(TranslateContext::new(&schema, &config, &auth));
        let movie = translator.node("Movie").unwrap();

        let error = translator.root_create(movie, &ResolveTree::new("createMovies")).unwrap_err();
        assert_eq!(error.to_string(), "Missing argument named 'input' for field 'createMovies'");
    }
}
