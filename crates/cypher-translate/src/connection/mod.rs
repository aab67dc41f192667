//! Connection fields: `{ edges { node properties cursor } totalCount pageInfo }`.
//!
//! Edges are collected and counted before they get sorted and sliced, so `totalCount`
//! always reflects every match of the filter. Cursors and `pageInfo` are derived by the
//! caller from the requested offset with [`crate::PageInfo`].

mod aggregate;

use cypher_schema::{AuthOperation, Composite, Node, QueryLimit, RelationshipProperties};
use indexmap::IndexMap;
use itertools::Itertools;
use serde_json::{Map, Value};

use crate::{
    cursor,
    cypher::{self, Block},
    filter::{FilterMode, WhereOutput},
    projection::{branch_filter, unsigned, SortKey},
    selection::ResolveTree,
    translator::{Relation, Target, Translator},
    Error, Result,
};

/// `where`, `sort`, `first` and `after` of a connection field.
#[derive(Debug, Default)]
struct ConnectionArguments<'v> {
    filter: Option<&'v Map<String, Value>>,
    sort: Option<&'v Value>,
    first: Option<u64>,
    /// Edges to skip, one past the `after` cursor.
    skip: Option<u64>,
}

impl<'v> ConnectionArguments<'v> {
    fn from_tree(tree: &'v ResolveTree) -> Result<Self> {
        let skip = match tree.arg("after") {
            Some(Value::String(after)) => {
                let skip = u64::try_from(cursor::cursor_to_offset(after)?)
                    .ok()
                    .and_then(|offset| offset.checked_add(1))
                    .ok_or_else(|| Error::InvalidCursor { cursor: after.clone() })?;
                Some(skip)
            }
            Some(other) => {
                return Err(Error::InvalidCursor {
                    cursor: other.to_string(),
                })
            }
            None => None,
        };

        Ok(Self {
            filter: tree.object_arg("where"),
            sort: tree.arg("sort"),
            first: unsigned(tree, "first", tree.arg("first"))?,
            skip,
        })
    }
}

/// What the response asks for. Every `edges` alias shares the selection of the first.
#[derive(Debug, Default)]
struct ConnectionSelection<'t> {
    edges: Vec<&'t str>,
    total_count: Vec<&'t str>,
    edge: Option<&'t ResolveTree>,
}

impl<'t> ConnectionSelection<'t> {
    fn from_tree(tree: &'t ResolveTree) -> Self {
        let mut selection = Self::default();

        for (alias, field) in &tree.fields {
            match field.name.as_str() {
                "edges" => {
                    selection.edges.push(alias);
                    selection.edge.get_or_insert(field);
                }
                "totalCount" => selection.total_count.push(alias),
                _ => (),
            }
        }

        selection
    }

    /// Sub-selection of the edge field named `name` with its response key.
    fn edge_field(&self, name: &str) -> Option<(&'t str, &'t ResolveTree)> {
        self.edge?
            .fields
            .iter()
            .find(|(_, field)| field.name == name)
            .map(|(alias, field)| (alias.as_str(), field))
    }

    /// `{ edges: var4, totalCount: totalCount }`
    fn result_map(&self, edges: Option<&str>) -> String {
        let mut entries = Vec::new();

        if let Some(edges) = edges {
            entries.extend(self.edges.iter().map(|alias| format!("{}: {edges}", cypher::escape(alias))));
        }

        entries.extend(
            self.total_count
                .iter()
                .map(|alias| format!("{}: totalCount", cypher::escape(alias))),
        );

        if entries.is_empty() {
            "{ }".to_string()
        } else {
            format!("{{ {} }}", entries.join(", "))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EdgeSide {
    Node,
    Properties,
}

#[derive(Debug, Clone, Copy)]
struct EdgeSortKey<'a> {
    side: EdgeSide,
    key: SortKey<'a>,
}

impl<'a> Translator<'a> {
    /// Adds the subquery resolving a connection field to `subqueries` and returns the
    /// variable holding `{ edges, totalCount }`.
    pub fn project_connection(
        &mut self,
        relation: &Relation<'a>,
        owner: &str,
        tree: &ResolveTree,
        subqueries: &mut Block,
    ) -> Result<String> {
        let arguments = ConnectionArguments::from_tree(tree)?;
        let selection = ConnectionSelection::from_tree(tree);
        let sort = self.edge_sort_keys(relation, arguments.sort)?;

        let (block, result) = match relation.target {
            Composite::Node(node) => self.concrete_connection(relation, node, owner, &arguments, &selection, &sort)?,
            _ => self.polymorphic_connection(relation, owner, &arguments, &selection, &sort)?,
        };

        subqueries.call(block);
        Ok(result)
    }

    /// The root `moviesConnection` field, bound to `this`.
    pub fn root_connection(&mut self, node: &'a Node, tree: &ResolveTree) -> Result<Block> {
        let arguments = ConnectionArguments::from_tree(tree)?;
        let selection = ConnectionSelection::from_tree(tree);
        let sort = self
            .sort_keys(Target::Node(node), arguments.sort)?
            .into_iter()
            .map(|key| EdgeSortKey {
                side: EdgeSide::Node,
                key,
            })
            .collect::<Vec<_>>();

        let node_selection = selection
            .edge_field("node")
            .map(|(_, tree)| tree.fields_for(&[&node.name]))
            .unwrap_or_default();
        let fields = self.annotated_fields(node, &node_selection);

        let mut block = Block::new();

        if let Some(guard) = self.authentication(node, &fields, AuthOperation::Read)? {
            block.push(guard);
        }

        block.push(format!("MATCH (this{})", self.label_expression(node)?));

        let filter = match arguments.filter {
            Some(filter) => self.compile_where(Target::Node(node), "this", filter, FilterMode::default())?,
            None => WhereOutput::default(),
        };
        let auth = self.auth_where(node, &fields, "this", AuthOperation::Read)?;
        WhereOutput::all([filter, auth]).push_to(&mut block);

        block.push("WITH collect({ node: this }) AS edges");
        block.push("WITH edges, size(edges) AS totalCount");

        let mut edges = None;

        if selection.edge.is_some() {
            let mut page = Block::new();
            page.push("WITH edges");
            page.push("UNWIND edges AS edge");
            page.push("WITH edge.node AS this");

            let ordering = self.edge_ordering(
                &sort,
                |key| cypher::property("this", key.key.field.db_name()),
                &arguments,
                node.limit,
            );
            if !ordering.is_empty() {
                page.push("WITH *");
                page.append(ordering);
            }

            let record = self.edge_record(node, None, &selection, "this", "", None, &[], &[], &mut page)?;

            let result = self.scope.next_variable("var");
            page.push(format!("RETURN collect({record}) AS {result}"));
            block.call(page);
            edges = Some(result);
        }

        block.push(format!("RETURN {} AS this", selection.result_map(edges.as_deref())));
        Ok(block)
    }

    fn concrete_connection(
        &mut self,
        relation: &Relation<'a>,
        node: &'a Node,
        owner: &str,
        arguments: &ConnectionArguments<'_>,
        selection: &ConnectionSelection<'_>,
        sort: &[EdgeSortKey<'a>],
    ) -> Result<(Block, String)> {
        let relationship = self.scope.next_variable("this");
        let related = self.scope.next_variable("this");

        let mut block = Block::new();
        block.push(format!("WITH {owner}"));
        block.append(self.match_edges(relation, node, owner, &relationship, &related, arguments.filter, selection)?);

        block.push(format!(
            "WITH collect({{ node: {related}, relationship: {relationship} }}) AS edges"
        ));
        block.push("WITH edges, size(edges) AS totalCount");

        let mut edges = None;

        if selection.edge.is_some() {
            let mut page = Block::new();
            page.push("WITH edges");
            page.push("UNWIND edges AS edge");
            page.push(format!("WITH edge.node AS {related}, edge.relationship AS {relationship}"));

            let ordering = self.edge_ordering(
                sort,
                |key| match key.side {
                    EdgeSide::Node => cypher::property(&related, key.key.field.db_name()),
                    EdgeSide::Properties => cypher::property(&relationship, key.key.field.db_name()),
                },
                arguments,
                node.limit,
            );
            if !ordering.is_empty() {
                page.push("WITH *");
                page.append(ordering);
            }

            let record = self.edge_record(
                node,
                relation.properties,
                selection,
                &related,
                &relationship,
                None,
                &[],
                &[],
                &mut page,
            )?;

            let result = self.scope.next_variable("var");
            page.push(format!("RETURN collect({record}) AS {result}"));
            block.call(page);
            edges = Some(result);
        }

        let result = self.scope.next_variable("var");
        block.push(format!("RETURN {} AS {result}", selection.result_map(edges.as_deref())));

        Ok((block, result))
    }

    /// Edges are built per concrete type inside a union, then sorted and sliced on the
    /// projected records.
    fn polymorphic_connection(
        &mut self,
        relation: &Relation<'a>,
        owner: &str,
        arguments: &ConnectionArguments<'_>,
        selection: &ConnectionSelection<'_>,
        sort: &[EdgeSortKey<'a>],
    ) -> Result<(Block, String)> {
        let forced_node = forced(sort, EdgeSide::Node);
        let forced_properties = forced(sort, EdgeSide::Properties);

        let mut branches = Vec::new();

        for node in self.concrete_nodes(relation.target) {
            let Some(filter) = branch_filter(relation.target, node, arguments.filter)? else {
                continue;
            };

            let relationship = self.scope.next_variable("this");
            let related = self.scope.next_variable("this");

            let mut branch = Block::new();
            branch.push("WITH *");

            let labels = self.label_expression(node)?;
            let node_selection = selection
                .edge_field("node")
                .map(|(_, tree)| tree.fields_for(&[&node.name, relation.target.name()]))
                .unwrap_or_default();
            let fields = self.annotated_fields(node, &node_selection);

            if let Some(guard) = self.authentication(node, &fields, AuthOperation::Read)? {
                branch.push(guard);
            }

            let pattern = self.hop(owner, relation, Some(&relationship), Some(&related), &labels, true);
            branch.push(format!("MATCH {pattern}"));

            let filter = match (relation.target, filter) {
                (_, None) => WhereOutput::default(),
                (Composite::Union(_), Some(filter)) => self.compile_edge_where(
                    relation,
                    Composite::Node(node),
                    &relationship,
                    &related,
                    filter,
                    FilterMode::default(),
                )?,
                (_, Some(filter)) => {
                    self.compile_connection_where(relation, &relationship, &related, filter, FilterMode::default())?
                }
            };
            let auth = self.auth_where(node, &fields, &related, AuthOperation::Read)?;
            WhereOutput::all([filter, auth]).push_to(&mut branch);

            let record = self.edge_record(
                node,
                relation.properties,
                selection,
                &related,
                &relationship,
                Some(relation.target.name()),
                &forced_node,
                &forced_properties,
                &mut branch,
            )?;

            branch.push(format!("WITH {record} AS edge"));
            branch.push("RETURN edge");
            branches.push(branch);
        }

        let mut block = Block::new();
        block.push(format!("WITH {owner}"));

        if branches.is_empty() {
            block.push("WITH [] AS edges");
        } else {
            block.call(Block::union(branches));
            block.push("WITH collect(edge) AS edges");
        }

        block.push("WITH edges, size(edges) AS totalCount");

        let mut edges = None;

        if selection.edge.is_some() {
            let node_key = selection.edge_field("node").map_or("node", |(alias, _)| alias);
            let properties_key = selection.edge_field("properties").map_or("properties", |(alias, _)| alias);

            let mut page = Block::new();
            page.push("WITH edges");
            page.push("UNWIND edges AS edge");

            let node_path = format!("edge.{}", cypher::escape(node_key));
            let properties_path = format!("edge.{}", cypher::escape(properties_key));
            let ordering = self.edge_ordering(
                sort,
                |key| match key.side {
                    EdgeSide::Node => cypher::property(&node_path, &key.key.field.name),
                    EdgeSide::Properties => cypher::property(&properties_path, &key.key.field.name),
                },
                arguments,
                None,
            );
            if !ordering.is_empty() {
                page.push("WITH edge");
                page.append(ordering);
            }

            let result = self.scope.next_variable("var");
            page.push(format!("RETURN collect(edge) AS {result}"));
            block.call(page);
            edges = Some(result);
        }

        let result = self.scope.next_variable("var");
        block.push(format!("RETURN {} AS {result}", selection.result_map(edges.as_deref())));

        Ok((block, result))
    }

    /// Authentication guard, `MATCH` and `WHERE` of a concrete connection.
    #[allow(clippy::too_many_arguments)]
    fn match_edges(
        &mut self,
        relation: &Relation<'a>,
        node: &'a Node,
        owner: &str,
        relationship: &str,
        related: &str,
        filter: Option<&Map<String, Value>>,
        selection: &ConnectionSelection<'_>,
    ) -> Result<Block> {
        let node_selection = selection
            .edge_field("node")
            .map(|(_, tree)| tree.fields_for(&[&node.name]))
            .unwrap_or_default();
        let fields = self.annotated_fields(node, &node_selection);

        let mut block = Block::new();

        if let Some(guard) = self.authentication(node, &fields, AuthOperation::Read)? {
            block.push(guard);
        }

        let labels = self.label_expression(node)?;
        let pattern = self.hop(owner, relation, Some(relationship), Some(related), &labels, true);
        block.push(format!("MATCH {pattern}"));

        let filter = match filter {
            Some(filter) => {
                self.compile_connection_where(relation, relationship, related, filter, FilterMode::default())?
            }
            None => WhereOutput::default(),
        };
        let auth = self.auth_where(node, &fields, related, AuthOperation::Read)?;
        WhereOutput::all([filter, auth]).push_to(&mut block);

        Ok(block)
    }

    /// `[{ node: { title: ASC } }, { edge: { role: DESC } }]`
    fn edge_sort_keys(&self, relation: &Relation<'a>, sort: Option<&Value>) -> Result<Vec<EdgeSortKey<'a>>> {
        let items = match sort {
            None | Some(Value::Null) => return Ok(Vec::new()),
            Some(Value::Array(items)) => items.iter().collect::<Vec<_>>(),
            Some(item) => vec![item],
        };

        let invalid = |reason: &str| Error::InvalidArgument {
            field: format!("{}Connection", relation.field.name),
            name: "sort".to_string(),
            reason: reason.to_string(),
        };

        let mut keys = Vec::new();

        for item in items {
            let Some(item) = item.as_object() else {
                return Err(invalid("expected an object"));
            };

            for (side, value) in item {
                let (side, target) = match side.as_str() {
                    "node" => match relation.target {
                        Composite::Node(node) => (EdgeSide::Node, Target::Node(node)),
                        Composite::Interface(interface) => (EdgeSide::Node, Target::Interface(interface)),
                        Composite::Union(_) => return Err(invalid("union members cannot be sorted")),
                    },
                    "edge" => match relation.properties {
                        Some(properties) => (EdgeSide::Properties, Target::Properties(properties)),
                        None => return Err(invalid("the relationship has no properties")),
                    },
                    _ => return Err(invalid("expected node or edge")),
                };

                keys.extend(
                    self.sort_keys(target, Some(value))?
                        .into_iter()
                        .map(|key| EdgeSortKey { side, key }),
                );
            }
        }

        Ok(keys)
    }

    /// `ORDER BY`, `SKIP` and `LIMIT` over the unwound edges, each sort key rendered by
    /// `path`.
    fn edge_ordering(
        &mut self,
        sort: &[EdgeSortKey<'a>],
        path: impl Fn(&EdgeSortKey<'a>) -> String,
        arguments: &ConnectionArguments<'_>,
        limits: Option<QueryLimit>,
    ) -> Block {
        let mut block = Block::new();

        if !sort.is_empty() {
            let keys = sort
                .iter()
                .map(|key| format!("{} {}", path(key), key.key.direction()))
                .join(", ");

            block.push(format!("ORDER BY {keys}"));
        }

        let limit = self.limit(arguments.first, limits);
        block.append(self.pagination(arguments.skip, limit));
        block
    }

    /// `{ node: this1 { .name }, properties: this0 { .role } }` for one edge. Node
    /// subqueries are added to `block`.
    #[allow(clippy::too_many_arguments)]
    fn edge_record(
        &mut self,
        node: &'a Node,
        properties: Option<&'a RelationshipProperties>,
        selection: &ConnectionSelection<'_>,
        related: &str,
        relationship: &str,
        branch_of: Option<&str>,
        forced_node: &[&str],
        forced_properties: &[&str],
        block: &mut Block,
    ) -> Result<String> {
        let mut entries = Vec::new();

        let node_field = selection.edge_field("node");
        if node_field.is_some() || !forced_node.is_empty() {
            let (alias, fields) = match node_field {
                Some((alias, tree)) => (alias, tree.fields_for(&[&node.name, branch_of.unwrap_or_default()])),
                None => ("node", IndexMap::new()),
            };

            let mut projection = self.project_node(node, related, &fields, forced_node)?;
            if branch_of.is_some() {
                projection.discriminate(node, related);
            }

            block.append(std::mem::take(&mut projection.subqueries));
            entries.push(format!("{}: {related} {}", cypher::escape(alias), projection.map()));
        }

        let properties_field = selection.edge_field("properties");
        if properties_field.is_some() || !forced_properties.is_empty() {
            if let Some(properties) = properties {
                let (alias, fields) = match properties_field {
                    Some((alias, tree)) => (alias, tree.fields.clone()),
                    None => ("properties", IndexMap::new()),
                };

                let map = self.project_properties(properties, relationship, &fields, forced_properties)?;
                entries.push(format!("{}: {map}", cypher::escape(alias)));
            }
        }

        if entries.is_empty() {
            Ok("{ }".to_string())
        } else {
            Ok(format!("{{ {} }}", entries.join(", ")))
        }
    }

    /// `this0 { .role, since: this0.startedAt }`
    pub(crate) fn project_properties(
        &mut self,
        properties: &'a RelationshipProperties,
        variable: &str,
        selection: &IndexMap<String, ResolveTree>,
        forced: &[&str],
    ) -> Result<String> {
        let mut entries = Vec::with_capacity(selection.len() + forced.len());

        for (alias, tree) in selection {
            let field = properties
                .field(&tree.name)
                .filter(|field| field.is_stored())
                .ok_or_else(|| Error::UnknownField {
                    container: properties.name.clone(),
                    name: tree.name.clone(),
                })?;

            entries.push(self.stored_entry(alias, field, variable));
        }

        for name in forced {
            if selection.contains_key(*name) {
                continue;
            }

            if let Some(field) = properties.field(name) {
                entries.push(self.stored_entry(name, field, variable));
            }
        }

        if entries.is_empty() {
            Ok(format!("{variable} {{ }}"))
        } else {
            Ok(format!("{variable} {{ {} }}", entries.join(", ")))
        }
    }
}

fn forced<'a>(sort: &[EdgeSortKey<'a>], side: EdgeSide) -> Vec<&'a str> {
    sort.iter()
        .filter(|key| key.side == side)
        .map(|key| key.key.field.name.as_str())
        .unique()
        .collect()
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
                        { "name": "title", "scalar": "String" },
                        {
                            "name": "actors",
                            "list": true,
                            "relationship": { "type": "ACTED_IN", "direction": "IN", "target": "Actor", "properties": "ActedIn" }
                        }
                    ]
                },
                {
                    "name": "Actor",
                    "fields": [
                        { "name": "name", "scalar": "String" },
                        {
                            "name": "actedIn",
                            "list": true,
                            "relationship": { "type": "ACTED_IN", "direction": "OUT", "target": "Production", "properties": "ActedIn" }
                        }
                    ]
                },
                { "name": "Series", "implements": ["Production"], "fields": [{ "name": "title", "scalar": "String" }] }
            ],
            "relationshipProperties": [
                { "name": "ActedIn", "fields": [{ "name": "role", "scalar": "String" }, { "name": "screenTime", "scalar": "Int" }] }
            ],
            "interfaces": [
                { "name": "Production", "fields": [{ "name": "title", "scalar": "String" }] }
            ]
        }))
        .unwrap()
    }

    fn leaf(name: &str) -> ResolveTree {
        ResolveTree::new(name)
    }

    fn tree(name: &str, fields: Vec<ResolveTree>) -> ResolveTree {
        let mut tree = leaf(name);
        for field in fields {
            tree.fields.insert(field.alias.clone(), field);
        }
        tree
    }

    fn project(owner: &str, tree: ResolveTree) -> String {
        let schema = schema();
        let config = Config::default();
        let auth = AuthContext::anonymous();
        let mut translator = Translator::new(TranslateContext::new(&schema, &config, &auth));
        let node = translator.node(owner).unwrap();

        let mut selection = IndexMap::new();
        selection.insert(tree.alias.clone(), tree);

        let mut projection = translator.project_node(node, "this", &selection, &[]).unwrap();
        let mut block = std::mem::take(&mut projection.subqueries);
        block.push(format!("RETURN this {} AS this", projection.map()));
        block.render()
    }

    #[test]
    fn total_count_is_taken_before_slicing() {
        let mut connection = tree(
            "actorsConnection",
            vec![
                leaf("totalCount"),
                tree(
                    "edges",
                    vec![tree("properties", vec![leaf("role")]), tree("node", vec![leaf("name")])],
                ),
            ],
        );
        connection.args = json!({ "first": 2, "sort": [{ "edge": { "screenTime": "DESC" } }] })
            .as_object()
            .cloned()
            .unwrap();

        insta::assert_snapshot!(project("Movie", connection), @r"
        CALL {
            WITH this
            MATCH (this)<-[this0:ACTED_IN]-(this1:Actor)
            WITH collect({ node: this1, relationship: this0 }) AS edges
            WITH edges, size(edges) AS totalCount
            CALL {
                WITH edges
                UNWIND edges AS edge
                WITH edge.node AS this1, edge.relationship AS this0
                WITH *
                ORDER BY this0.screenTime DESC
                LIMIT $param0
                RETURN collect({ properties: this0 { .role }, node: this1 { .name } }) AS var2
            }
            RETURN { totalCount: totalCount, edges: var2 } AS var3
        }
        RETURN this { actorsConnection: var3 } AS this
        ");
    }

    #[test]
    fn count_only_connection_skips_the_edges() {
        let mut connection = tree("actorsConnection", vec![leaf("totalCount")]);
        connection.args = json!({ "where": { "node": { "name": "Keanu" } } })
            .as_object()
            .cloned()
            .unwrap();

        insta::assert_snapshot!(project("Movie", connection), @r"
        CALL {
            WITH this
            MATCH (this)<-[this0:ACTED_IN]-(this1:Actor)
            WHERE this1.name = $param0
            WITH collect({ node: this1, relationship: this0 }) AS edges
            WITH edges, size(edges) AS totalCount
            RETURN { totalCount: totalCount } AS var2
        }
        RETURN this { actorsConnection: var2 } AS this
        ");
    }

    #[test]
    fn interface_connection_sorts_projected_edges() {
        let mut connection = tree(
            "actedInConnection",
            vec![tree("edges", vec![tree("node", vec![leaf("title")])])],
        );
        connection.args = json!({ "after": cursor::offset_to_cursor(4), "sort": [{ "node": { "title": "ASC" } }] })
            .as_object()
            .cloned()
            .unwrap();

        insta::assert_snapshot!(project("Actor", connection), @r#"
        CALL {
            WITH this
            CALL {
                WITH *
                MATCH (this)-[this0:ACTED_IN]->(this1:Series)
                WITH { node: this1 { .title, __resolveType: "Series", __id: id(this1) } } AS edge
                RETURN edge
            }
            WITH collect(edge) AS edges
            WITH edges, size(edges) AS totalCount
            CALL {
                WITH edges
                UNWIND edges AS edge
                WITH edge
                ORDER BY edge.node.title ASC
                SKIP $param0
                RETURN collect(edge) AS var2
            }
            RETURN { edges: var2 } AS var3
        }
        RETURN this { actedInConnection: var3 } AS this
        "#);
    }

    #[test]
    fn foreign_cursor_is_rejected() {
        let schema = schema();
        let config = Config::default();
        let auth = AuthContext::anonymous();
        let mut translator = Translator::new(TranslateContext::new(&schema, &config, &auth));
        let movie = translator.node("Movie").unwrap();

        let mut connection = tree("actorsConnection", vec![leaf("totalCount")]);
        connection.args = json!({ "after": "bm9wZQ==" }).as_object().cloned().unwrap();

        let mut selection = IndexMap::new();
        selection.insert(connection.alias.clone(), connection);

        let error = translator.project_node(movie, "this", &selection, &[]).unwrap_err();
        assert_eq!(error.to_string(), "Invalid cursor 'bm9wZQ=='");
    }
}
