use cypher_schema::{AuthOperation, Composite, Node};
use serde_json::{Map, Value};

use super::{order_by, ListOptions};
use crate::{
    cypher::{self, Block},
    filter::{object, FilterMode, WhereOutput},
    selection::ResolveTree,
    translator::{Relation, Target, Translator},
    Result,
};

impl<'a> Translator<'a> {
    /// Adds the subquery resolving a relationship field to `subqueries` and returns the
    /// variable holding its value.
    pub fn project_relationship(
        &mut self,
        relation: &Relation<'a>,
        owner: &str,
        tree: &ResolveTree,
        subqueries: &mut Block,
    ) -> Result<String> {
        match relation.target {
            Composite::Node(node) => self.concrete_relationship(relation, node, owner, tree, subqueries),
            _ => self.polymorphic_relationship(relation, owner, tree, subqueries),
        }
    }

    fn concrete_relationship(
        &mut self,
        relation: &Relation<'a>,
        node: &'a Node,
        owner: &str,
        tree: &ResolveTree,
        subqueries: &mut Block,
    ) -> Result<String> {
        let relationship = self.scope.next_variable("this");
        let related = self.scope.next_variable("this");
        let selection = tree.fields_for(&[&node.name]);

        let mut block = Block::new();
        block.push(format!("WITH {owner}"));

        let (matched, mut projection) = self.match_related(
            relation,
            node,
            owner,
            &relationship,
            &related,
            tree.object_arg("where"),
            &selection,
            &[],
        )?;
        block.append(matched);

        if relation.field.list {
            let options = self.list_options(Target::Node(node), &related, tree)?;
            if !options.is_empty() {
                block.push("WITH *");
                block.append(options);
            }
        }

        block.append(std::mem::take(&mut projection.subqueries));
        block.push(format!("WITH {related} {} AS {related}", projection.map()));

        let result = self.scope.next_variable("var");
        block.push(format!("RETURN {} AS {result}", collect(&related, relation.field.list)));

        subqueries.call(block);
        Ok(result)
    }

    /// One branch per concrete node behind an interface or union, unioned, deduplicated
    /// on `__id` and then sorted as a whole.
    fn polymorphic_relationship(
        &mut self,
        relation: &Relation<'a>,
        owner: &str,
        tree: &ResolveTree,
        subqueries: &mut Block,
    ) -> Result<String> {
        let options = ListOptions::from_tree(tree)?;
        let sort = match relation.target {
            Composite::Interface(interface) => self.sort_keys(Target::Interface(interface), options.sort)?,
            _ => Vec::new(),
        };
        let forced = sort.iter().map(|key| key.field.name.as_str()).collect::<Vec<_>>();

        let result = self.scope.next_variable("var");
        let filter = tree.object_arg("where");
        let mut branches = Vec::new();

        for node in self.concrete_nodes(relation.target) {
            let Some(filter) = branch_filter(relation.target, node, filter)? else {
                continue;
            };

            let relationship = self.scope.next_variable("this");
            let related = self.scope.next_variable("this");
            let selection = tree.fields_for(&[&node.name, relation.target.name()]);

            let mut branch = Block::new();
            branch.push("WITH *");

            let (matched, mut projection) = self.match_related(
                relation,
                node,
                owner,
                &relationship,
                &related,
                filter,
                &selection,
                &forced,
            )?;
            branch.append(matched);
            projection.discriminate(node, &related);

            branch.append(std::mem::take(&mut projection.subqueries));
            branch.push(format!("WITH {related} {} AS {related}", projection.map()));
            branch.push(format!("RETURN {related} AS {result}"));
            branches.push(branch);
        }

        let mut block = Block::new();
        block.push(format!("WITH {owner}"));

        if branches.is_empty() {
            let empty = if relation.field.list { "[]" } else { "null" };
            block.push(format!("RETURN {empty} AS {result}"));
            subqueries.call(block);
            return Ok(result);
        }

        block.call(Block::union(branches));

        let identity = self.scope.next_variable("var");
        block.push(format!("WITH {result}.__id AS {identity}, head(collect({result})) AS {result}"));

        if relation.field.list {
            let mut ordering = Block::new();
            if let Some(order) = order_by(&sort, |key| cypher::property(&result, &key.field.name)) {
                ordering.push(order);
            }
            ordering.append(self.pagination(options.offset, self.limit(options.limit, None)));

            if !ordering.is_empty() {
                block.push(format!("WITH {result}"));
                block.append(ordering);
            }
        }

        block.push(format!("RETURN {} AS {result}", collect(&result, relation.field.list)));

        subqueries.call(block);
        Ok(result)
    }

    /// `MATCH` of one related node type with its filter and authorization, followed by
    /// the projection of `selection`.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn match_related(
        &mut self,
        relation: &Relation<'a>,
        node: &'a Node,
        owner: &str,
        relationship: &str,
        related: &str,
        filter: Option<&Map<String, Value>>,
        selection: &indexmap::IndexMap<String, ResolveTree>,
        forced: &[&str],
    ) -> Result<(Block, super::Projection)> {
        let mut block = Block::new();
        let fields = self.annotated_fields(node, selection);

        if let Some(guard) = self.authentication(node, &fields, AuthOperation::Read)? {
            block.push(guard);
        }

        let labels = self.label_expression(node)?;
        let pattern = self.hop(owner, relation, Some(relationship), Some(related), &labels, true);
        block.push(format!("MATCH {pattern}"));

        let filter = match filter {
            Some(filter) => match relation.target {
                Composite::Interface(interface) => {
                    self.compile_where(Target::Interface(interface), related, filter, FilterMode::default())?
                }
                _ => self.compile_where(Target::Node(node), related, filter, FilterMode::default())?,
            },
            None => WhereOutput::default(),
        };
        let auth = self.auth_where(node, &fields, related, AuthOperation::Read)?;
        WhereOutput::all([filter, auth]).push_to(&mut block);

        let projection = self.project_node(node, related, selection, forced)?;
        Ok((block, projection))
    }
}

/// The filter applying to one branch. Union filters are keyed by member: when any member
/// is filtered, members without a filter are skipped (`Ok(None)`).
pub(crate) fn branch_filter<'v>(
    target: Composite<'_>,
    node: &Node,
    filter: Option<&'v Map<String, Value>>,
) -> Result<Option<Option<&'v Map<String, Value>>>> {
    match (target, filter) {
        (Composite::Union(_), Some(filter)) if !filter.is_empty() => match filter.get(&node.name) {
            Some(value) => Ok(Some(Some(object(&node.name, value)?))),
            None => Ok(None),
        },
        (Composite::Union(_), _) => Ok(Some(None)),
        (_, filter) => Ok(Some(filter)),
    }
}

fn collect(variable: &str, list: bool) -> String {
    if list {
        format!("collect({variable})")
    } else {
        format!("head(collect({variable}))")
    }
}

#[cfg(test)]
mod tests {
    use cypher_schema::Schema;
    use indexmap::IndexMap;
    use serde_json::json;

    use super::*;
    use crate::{AuthContext, Config, TranslateContext};

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
                        },
                        {
                            "name": "agent",
                            "relationship": { "type": "REPRESENTS", "direction": "IN", "target": "Agent" }
                        }
                    ]
                },
                { "name": "Agent", "fields": [{ "name": "name", "scalar": "String" }] },
                { "name": "Movie", "implements": ["Production"], "fields": [{ "name": "title", "scalar": "String" }, { "name": "runtime", "scalar": "Int" }] },
                { "name": "Series", "implements": ["Production"], "fields": [{ "name": "title", "scalar": "String" }, { "name": "episodes", "scalar": "Int" }] }
            ],
            "interfaces": [
                { "name": "Production", "fields": [{ "name": "title", "scalar": "String" }] }
            ]
        }))
        .unwrap()
    }

    fn project(tree: ResolveTree) -> String {
        let schema = schema();
        let config = Config::default();
        let auth = AuthContext::anonymous();
        let mut translator = Translator::new(TranslateContext::new(&schema, &config, &auth));
        let actor = translator.node("Actor").unwrap();

        let mut selection = IndexMap::new();
        selection.insert(tree.alias.clone(), tree);

        let mut projection = translator.project_node(actor, "this", &selection, &[]).unwrap();
        let mut block = std::mem::take(&mut projection.subqueries);
        block.push(format!("RETURN this {} AS this", projection.map()));
        block.render()
    }

    fn leaf(name: &str) -> ResolveTree {
        ResolveTree::new(name)
    }

    #[test]
    fn singular_relationship() {
        let mut agent = leaf("agent");
        agent.fields.insert("name".into(), leaf("name"));

        insta::assert_snapshot!(project(agent), @r"
        CALL {
            WITH this
            MATCH (this)<-[this0:REPRESENTS]-(this1:Agent)
            WITH this1 { .name } AS this1
            RETURN head(collect(this1)) AS var2
        }
        RETURN this { agent: var2 } AS this
        ");
    }

    #[test]
    fn interface_relationship_is_unioned() {
        let mut acted_in = leaf("actedIn");
        acted_in.args = json!({ "options": { "sort": [{ "title": "ASC" }], "limit": 5 } })
            .as_object()
            .cloned()
            .unwrap();

        let mut movie = IndexMap::new();
        movie.insert("runtime".to_string(), leaf("runtime"));
        acted_in.fields_by_type_name.insert("Movie".to_string(), movie);

        insta::assert_snapshot!(project(acted_in), @r#"
        CALL {
            WITH this
            CALL {
                WITH *
                MATCH (this)-[this1:ACTED_IN]->(this2:Movie)
                WITH this2 { .runtime, .title, __resolveType: "Movie", __id: id(this2) } AS this2
                RETURN this2 AS var0
                UNION
                WITH *
                MATCH (this)-[this3:ACTED_IN]->(this4:Series)
                WITH this4 { .title, __resolveType: "Series", __id: id(this4) } AS this4
                RETURN this4 AS var0
            }
            WITH var0.__id AS var5, head(collect(var0)) AS var0
            WITH var0
            ORDER BY var0.title ASC
            LIMIT $param0
            RETURN collect(var0) AS var0
        }
        RETURN this { actedIn: var0 } AS this
        "#);
    }
}
