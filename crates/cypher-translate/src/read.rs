//! Root list fields: `movies`, `productions` and the fulltext entry points.

use cypher_schema::{AuthOperation, Composite, Node};
use serde_json::Value;

use crate::{
    cypher::{self, Block, Predicate},
    filter::{FilterMode, WhereOutput},
    projection::{branch_filter, order_by, ListOptions},
    selection::ResolveTree,
    translator::{Target, Translator},
    Error, Result,
};

impl<'a> Translator<'a> {
    pub fn root_read(&mut self, composite: Composite<'a>, tree: &ResolveTree) -> Result<Block> {
        match composite {
            Composite::Node(node) => self.read_node(node, tree),
            _ => self.read_composite(composite, tree),
        }
    }

    fn read_node(&mut self, node: &'a Node, tree: &ResolveTree) -> Result<Block> {
        let selection = tree.fields_for(&[&node.name]);
        let fields = self.annotated_fields(node, &selection);

        let mut block = Block::new();

        if let Some(guard) = self.authentication(node, &fields, AuthOperation::Read)? {
            block.push(guard);
        }

        block.push(format!("MATCH (this{})", self.label_expression(node)?));

        let filter = match tree.object_arg("where") {
            Some(filter) => self.compile_where(Target::Node(node), "this", filter, FilterMode::default())?,
            None => WhereOutput::default(),
        };
        let auth = self.auth_where(node, &fields, "this", AuthOperation::Read)?;
        WhereOutput::all([filter, auth]).push_to(&mut block);

        let options = self.list_options(Target::Node(node), "this", tree)?;
        if !options.is_empty() {
            block.push("WITH *");
            block.append(options);
        }

        let mut projection = self.project_node(node, "this", &selection, &[])?;
        block.append(std::mem::take(&mut projection.subqueries));
        block.push(format!("RETURN this {} AS this", projection.map()));

        Ok(block)
    }

    /// Interfaces and unions read every implementation in its own branch.
    fn read_composite(&mut self, composite: Composite<'a>, tree: &ResolveTree) -> Result<Block> {
        let options = ListOptions::from_tree(tree)?;
        let sort = match composite {
            Composite::Interface(interface) => self.sort_keys(Target::Interface(interface), options.sort)?,
            _ => Vec::new(),
        };
        let forced = sort.iter().map(|key| key.field.name.as_str()).collect::<Vec<_>>();

        let mut branches = Vec::new();

        for node in self.concrete_nodes(composite) {
            let Some(filter) = branch_filter(composite, node, tree.object_arg("where"))? else {
                continue;
            };

            let variable = self.scope.next_variable("this");
            let selection = tree.fields_for(&[&node.name, composite.name()]);
            let fields = self.annotated_fields(node, &selection);

            let mut branch = Block::new();

            if let Some(guard) = self.authentication(node, &fields, AuthOperation::Read)? {
                branch.push(guard);
            }

            branch.push(format!("MATCH ({variable}{})", self.label_expression(node)?));

            let filter = match (composite, filter) {
                (_, None) => WhereOutput::default(),
                (Composite::Interface(interface), Some(filter)) => {
                    self.compile_where(Target::Interface(interface), &variable, filter, FilterMode::default())?
                }
                (_, Some(filter)) => self.compile_where(Target::Node(node), &variable, filter, FilterMode::default())?,
            };
            let auth = self.auth_where(node, &fields, &variable, AuthOperation::Read)?;
            WhereOutput::all([filter, auth]).push_to(&mut branch);

            let mut projection = self.project_node(node, &variable, &selection, &forced)?;
            projection.discriminate(node, &variable);

            branch.append(std::mem::take(&mut projection.subqueries));
            branch.push(format!("WITH {variable} {} AS {variable}", projection.map()));
            branch.push(format!("RETURN {variable} AS this"));
            branches.push(branch);
        }

        let mut block = Block::new();

        if branches.is_empty() {
            block.push("UNWIND [] AS this");
            block.push("RETURN this AS this");
            return Ok(block);
        }

        block.call(Block::union(branches));

        let identity = self.scope.next_variable("var");
        block.push(format!("WITH this.__id AS {identity}, head(collect(this)) AS this"));

        let mut ordering = Block::new();
        if let Some(order) = order_by(&sort, |key| cypher::property("this", &key.field.name)) {
            ordering.push(order);
        }
        ordering.append(self.pagination(options.offset, self.limit(options.limit, None)));

        if !ordering.is_empty() {
            block.push("WITH this");
            block.append(ordering);
        }

        block.push("RETURN this AS this");
        Ok(block)
    }

    /// `CALL db.index.fulltext.queryNodes(...)` followed by the usual filtering and
    /// projection. The result carries the node under its lower-cased type name and the
    /// relevance `score`.
    pub fn root_fulltext(&mut self, node: &'a Node, index: &str, tree: &ResolveTree) -> Result<Block> {
        let index = node.fulltext_index(index).ok_or_else(|| Error::UnknownFulltextIndex {
            node: node.name.clone(),
            index: index.to_string(),
        })?;

        let phrase = tree.arg("phrase").ok_or_else(|| Error::MissingArgument {
            field: tree.name.clone(),
            name: "phrase".to_string(),
        })?;

        let node_key = lower_first(&node.name);
        let node_tree = tree.fields.values().find(|field| field.name == node_key);
        let selection = node_tree.map(|tree| tree.fields_for(&[&node.name])).unwrap_or_default();
        let fields = self.annotated_fields(node, &selection);

        let score = self.scope.next_variable("var");
        let mut block = Block::new();

        if let Some(guard) = self.authentication(node, &fields, AuthOperation::Read)? {
            block.push(guard);
        }

        let phrase = self.scope.param(phrase.clone());
        block.push(format!(
            "CALL db.index.fulltext.queryNodes({}, {phrase}) YIELD node AS this, score AS {score}",
            cypher::string_literal(&index.name)
        ));

        let mut outputs = vec![WhereOutput::predicate(Some(self.label_predicate("this", node)?))];
        let filter = tree.object_arg("where");

        if let Some(bounds) = filter.and_then(|filter| filter.get("score")).and_then(Value::as_object) {
            for (bound, symbol) in [("min", ">="), ("max", "<=")] {
                if let Some(value) = bounds.get(bound).filter(|value| !value.is_null()) {
                    let reference = self.scope.param(value.clone());
                    outputs.push(WhereOutput::predicate(Some(Predicate::raw(format!(
                        "{score} {symbol} {reference}"
                    )))));
                }
            }
        }

        if let Some(node_filter) = filter.and_then(|filter| filter.get(node_key.as_str())) {
            let node_filter = crate::filter::object(&node_key, node_filter)?;
            outputs.push(self.compile_where(Target::Node(node), "this", node_filter, FilterMode::default())?);
        }

        outputs.push(self.auth_where(node, &fields, "this", AuthOperation::Read)?);
        WhereOutput::all(outputs).push_to(&mut block);

        let ordering = self.fulltext_ordering(node, &node_key, &score, tree)?;
        if !ordering.is_empty() {
            block.push("WITH *");
            block.append(ordering);
        }

        let mut projection = self.project_node(node, "this", &selection, &[])?;
        block.append(std::mem::take(&mut projection.subqueries));

        let mut returned = Vec::new();
        for (alias, field) in &tree.fields {
            if field.name == "score" {
                returned.push(format!("{score} AS {}", cypher::escape(alias)));
            } else if field.name == node_key {
                returned.push(format!("this {} AS {}", projection.map(), cypher::escape(alias)));
            }
        }

        if returned.is_empty() {
            returned.push(format!("{score} AS score"));
        }

        block.push(format!("RETURN {}", returned.join(", ")));
        Ok(block)
    }

    /// `sort: [{ score: DESC }, { movie: { title: ASC } }]` plus `limit` and `offset`.
    fn fulltext_ordering(&mut self, node: &'a Node, node_key: &str, score: &str, tree: &ResolveTree) -> Result<Block> {
        let invalid = |reason: &str| Error::InvalidArgument {
            field: tree.name.clone(),
            name: "sort".to_string(),
            reason: reason.to_string(),
        };

        let items = match tree.arg("sort") {
            None => Vec::new(),
            Some(Value::Array(items)) => items.iter().collect(),
            Some(item) => vec![item],
        };

        let mut keys = Vec::new();

        for item in items {
            let Some(item) = item.as_object() else {
                return Err(invalid("expected an object"));
            };

            for (name, value) in item {
                if name == "score" {
                    match value.as_str() {
                        Some(direction @ ("ASC" | "DESC")) => keys.push(format!("{score} {direction}")),
                        _ => return Err(invalid("expected ASC or DESC")),
                    }
                } else if name == node_key {
                    for key in self.sort_keys(Target::Node(node), Some(value))? {
                        keys.push(format!(
                            "{} {}",
                            cypher::property("this", key.field.db_name()),
                            key.direction()
                        ));
                    }
                } else {
                    return Err(invalid("expected score or the node"));
                }
            }
        }

        let mut block = Block::new();

        if !keys.is_empty() {
            block.push(format!("ORDER BY {}", keys.join(", ")));
        }

        let offset = crate::projection::unsigned(tree, "offset", tree.arg("offset"))?;
        let limit = crate::projection::unsigned(tree, "limit", tree.arg("limit"))?;
        let limit = self.limit(limit, node.limit);
        block.append(self.pagination(offset, limit));

        Ok(block)
    }
}

fn lower_first(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}
