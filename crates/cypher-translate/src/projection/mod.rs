//! Compiles selection sets into map projections.
//!
//! Stored fields become map entries (`.title`, `name: this.fullName`), relationship,
//! connection and aggregate fields become `CALL` subqueries whose result variable is
//! referenced from the map.

mod options;
mod relationship;

pub(crate) use options::{order_by, unsigned, ListOptions, SortKey};
pub(crate) use relationship::branch_filter;

use cypher_schema::{Field, FieldKind, Node, RequiredField, TemporalType};
use indexmap::IndexMap;
use itertools::Itertools;

use crate::{
    cypher::{self, Block},
    selection::ResolveTree,
    translator::{Target, Translator},
    Error, Result,
};

const ISO_ZONED: &str = "\"iso_zoned_date_time\"";
const ISO_OFFSET: &str = "\"iso_offset_date_time\"";

#[derive(Debug, Default)]
pub(crate) struct Projection {
    entries: Vec<String>,
    /// Subqueries producing the variables referenced by the entries.
    pub subqueries: Block,
}

impl Projection {
    pub fn push(&mut self, entry: impl Into<String>) {
        self.entries.push(entry.into());
    }

    /// `{ .title, actors: var2 }`
    pub fn map(&self) -> String {
        if self.entries.is_empty() {
            "{ }".to_string()
        } else {
            format!("{{ {} }}", self.entries.iter().join(", "))
        }
    }

    /// `__resolveType` and `__id` entries of a polymorphic branch.
    pub fn discriminate(&mut self, node: &Node, variable: &str) {
        self.push(format!("__resolveType: {}", cypher::string_literal(&node.name)));
        self.push(format!("__id: id({variable})"));
    }
}

/// DateTime values are returned with an offset rather than a zone id.
pub(crate) fn format_datetime(expression: &str) -> String {
    format!("apoc.date.convertFormat(toString({expression}), {ISO_ZONED}, {ISO_OFFSET})")
}

impl<'a> Translator<'a> {
    /// Projects `selection` from the node bound to `variable`. Fields listed in
    /// `forced` are projected under their own name when not selected.
    pub fn project_node(
        &mut self,
        node: &'a Node,
        variable: &str,
        selection: &IndexMap<String, ResolveTree>,
        forced: &[&str],
    ) -> Result<Projection> {
        let mut projection = Projection::default();
        let mut required = Vec::new();

        for (alias, tree) in selection {
            match node.field(&tree.name) {
                Some(field) => match &field.kind {
                    FieldKind::Relationship(_) => {
                        let relation = self.relation(Target::Node(node), field)?;
                        let result = self.project_relationship(&relation, variable, tree, &mut projection.subqueries)?;
                        projection.push(format!("{}: {result}", cypher::escape(alias)));
                    }
                    FieldKind::CustomResolver(resolver) => required.extend(resolver.requires.iter()),
                    _ => {
                        let entry = self.stored_entry(alias, field, variable);
                        projection.push(entry);
                    }
                },
                None => {
                    let entry = self.project_derived(node, variable, alias, tree, &mut projection.subqueries)?;
                    projection.push(entry);
                }
            }
        }

        for name in forced {
            if selection.contains_key(*name) {
                continue;
            }

            if let Some(field) = node.field(name).filter(|field| field.is_stored()) {
                let entry = self.stored_entry(name, field, variable);
                projection.push(entry);
            }
        }

        for requirement in required.into_iter().unique_by(|requirement| requirement.name.clone()) {
            if selection.contains_key(&requirement.name) || forced.contains(&requirement.name.as_str()) {
                continue;
            }

            let field = node.field(&requirement.name).ok_or_else(|| Error::UnknownField {
                container: node.name.clone(),
                name: requirement.name.clone(),
            })?;

            match field.relationship() {
                Some(_) => {
                    let relation = self.relation(Target::Node(node), field)?;
                    let tree = required_tree(requirement);
                    let result = self.project_relationship(&relation, variable, &tree, &mut projection.subqueries)?;
                    projection.push(format!("{}: {result}", cypher::escape(&field.name)));
                }
                None if field.is_stored() => {
                    let entry = self.stored_entry(&field.name, field, variable);
                    projection.push(entry);
                }
                None => (),
            }
        }

        Ok(projection)
    }

    /// `xConnection` and `xAggregate` fields, which have no descriptor of their own.
    fn project_derived(
        &mut self,
        node: &'a Node,
        variable: &str,
        alias: &str,
        tree: &ResolveTree,
        subqueries: &mut Block,
    ) -> Result<String> {
        let unknown = || Error::UnknownField {
            container: node.name.clone(),
            name: tree.name.clone(),
        };

        let relationship_field = |suffix: &str| {
            tree.name
                .strip_suffix(suffix)
                .and_then(|name| node.field(name))
                .filter(|field| field.relationship().is_some())
        };

        if let Some(field) = relationship_field("Connection") {
            let relation = self.relation(Target::Node(node), field)?;
            let result = self.project_connection(&relation, variable, tree, subqueries)?;
            return Ok(format!("{}: {result}", cypher::escape(alias)));
        }

        if let Some(field) = relationship_field("Aggregate") {
            let relation = self.relation(Target::Node(node), field)?;
            let map = self.project_aggregate(&relation, variable, tree, subqueries)?;
            return Ok(format!("{}: {map}", cypher::escape(alias)));
        }

        Err(unknown())
    }

    /// A map entry for a property-backed field.
    pub fn stored_entry(&mut self, alias: &str, field: &Field, variable: &str) -> String {
        let key = cypher::escape(alias);
        let property = cypher::property(variable, field.db_name());

        let convert = |expression: &str| match field.kind {
            FieldKind::Temporal(TemporalType::DateTime) => Some(format_datetime(expression)),
            FieldKind::Point(_) => Some(format!("{{ point: {expression}, crs: {expression}.crs }}")),
            _ => None,
        };

        let Some(single) = convert(&property) else {
            return if alias == field.db_name() {
                format!(".{key}")
            } else {
                format!("{key}: {property}")
            };
        };

        if field.list {
            let item = self.scope.next_variable("var");
            let converted = convert(&item).unwrap_or_default();
            return format!("{key}: [{item} IN {property} | {converted}]");
        }

        match field.kind {
            FieldKind::Point(_) => format!("{key}: CASE WHEN {property} IS NOT NULL THEN {single} ELSE NULL END"),
            _ => format!("{key}: {single}"),
        }
    }
}

fn required_tree(requirement: &RequiredField) -> ResolveTree {
    let mut tree = ResolveTree::new(&requirement.name);

    for nested in &requirement.selection {
        tree.fields.insert(nested.name.clone(), required_tree(nested));
    }

    tree
}
