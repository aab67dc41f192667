use cypher_schema::{AuthOperation, AuthTiming, Composite, GeneratedOperation, GeneratedValue, NestedOperation, Node};
use serde_json::{Map, Value};

use super::{entry, items, Link};
use crate::{
    cypher::{self, Block},
    filter::{FilterMode, Shape, WhereOutput},
    translator::{Target, Translator},
    value, Error, Result,
};

impl<'a> Translator<'a> {
    /// `{ where: { node }, edge, connect }`, once per concrete node behind the target.
    pub(super) fn nested_connect(
        &mut self,
        link: Link<'a, '_>,
        input: &Map<String, Value>,
        block: &mut Block,
    ) -> Result<()> {
        for node in self.concrete_nodes(link.target) {
            let inner = self.connect_node(link, node, input)?;
            block.call(inner);
        }

        if link.relation.links_each_implementation() {
            let check = self.validate_single_link(&link.relation, link.variable)?;
            block.call(check);
        }

        Ok(())
    }

    fn connect_node(&mut self, link: Link<'a, '_>, node: &'a Node, input: &Map<String, Value>) -> Result<Block> {
        let owner = link.variable;
        let related = self.scope.next_variable("this");

        let mut block = Block::new();
        block.push(format!("WITH {owner}"));

        if let Some(guard) = self.authentication(node, &[], AuthOperation::Connect)? {
            block.push(guard);
        }

        block.push(format!("OPTIONAL MATCH ({related}{})", self.label_expression(node)?));

        let filter = match entry(input, "where")? {
            Some(filter) => entry(filter, "node")?,
            None => None,
        };

        let filter = match filter {
            Some(filter) => {
                let target = match link.target {
                    Composite::Interface(interface) => Target::Interface(interface),
                    _ => Target::Node(node),
                };
                self.compile_where(target, &related, filter, FilterMode::default())?
            }
            None => WhereOutput::default(),
        };
        let auth = self.auth_where(node, &[], &related, AuthOperation::Connect)?;
        let owner_rules = self.auth_validate(link.owner, &[], owner, AuthOperation::Connect, AuthTiming::Before)?;
        WhereOutput::all([filter, auth, owner_rules]).push_to(&mut block);

        let relationship = self.scope.next_variable("this");

        // Collecting drops the row when nothing matched.
        let mut merge = Block::new();
        merge.push("WITH *");
        merge.push(format!("WITH collect({related}) AS connectedNodes, collect({owner}) AS parentNodes"));
        merge.push(format!("UNWIND parentNodes AS {owner}"));
        merge.push(format!("UNWIND connectedNodes AS {related}"));

        if !link.relation.field.list && !link.relation.links_each_implementation() {
            let previous = self.scope.next_variable("var");
            let other = self.scope.next_variable("var");
            let pattern = self.hop(owner, &link.relation, Some(&previous), Some(&other), "", true);

            merge.push(format!("OPTIONAL MATCH {pattern}"));
            merge.push(format!("WHERE {other} <> {related}"));
            merge.push(format!("DELETE {previous}"));
            merge.push(format!("WITH DISTINCT {owner}, {related}"));
        }

        let pattern = self.hop(owner, &link.relation, Some(&relationship), Some(&related), "", true);
        merge.push(format!("MERGE {pattern}"));
        self.edge_assignments(
            &link.relation,
            &relationship,
            entry(input, "edge")?,
            GeneratedOperation::Create,
        )?
        .push_to(&mut merge, "SET");

        block.call(merge);
        block.push(format!("WITH {owner}, {related}"));

        if let Some(connect) = input.get("connect").filter(|value| !value.is_null()) {
            for connect in items("connect", connect)? {
                let operations = self.lift(node, NestedOperation::Connect, connect)?;
                block.append(self.nested_operations(node, &related, &operations)?);
            }
        }

        let after = self.validate_after(
            [(link.owner, owner.to_string()), (node, related.clone())],
            AuthOperation::Connect,
        )?;

        if !after.is_empty() {
            block.push("WITH *");
            after.push_to(&mut block);
        }

        let result = self.scope.next_variable("var");
        block.push(format!("RETURN count(*) AS {result}"));

        Ok(block)
    }

    /// `{ where: { node }, onCreate: { node, edge } }`, merging the related node on its
    /// unique fields.
    pub(super) fn nested_connect_or_create(
        &mut self,
        link: Link<'a, '_>,
        input: &Map<String, Value>,
        block: &mut Block,
    ) -> Result<()> {
        let Composite::Node(node) = link.target else {
            return Err(Error::UnsupportedNestedOperation {
                owner: link.relation.owner.to_string(),
                field: link.relation.field.name.clone(),
                operation: NestedOperation::ConnectOrCreate.to_string(),
            });
        };

        let missing_where = || Error::MissingArgument {
            field: link.relation.qualified_name(),
            name: "where".to_string(),
        };
        let unique = entry(input, "where")?.ok_or_else(missing_where)?;
        let unique = entry(unique, "node")?.ok_or_else(missing_where)?;

        let on_create = entry(input, "onCreate")?;
        let node_input = match on_create {
            Some(on_create) => entry(on_create, "node")?,
            None => None,
        };
        let edge = match on_create {
            Some(on_create) => entry(on_create, "edge")?,
            None => None,
        };

        let related = self.scope.next_variable("this");
        let mut keys = Vec::with_capacity(unique.len());

        for (name, value) in unique {
            let field = node.field(name).ok_or_else(|| Error::UnknownField {
                container: node.name.clone(),
                name: name.clone(),
            })?;

            if !(field.unique || matches!(field.generated, Some(GeneratedValue::Uuid))) {
                return Err(Error::NonUniqueConnectOrCreate {
                    node: node.name.clone(),
                    field: name.clone(),
                });
            }

            let reference = self.scope.param(value::normalize(field, value)?);
            keys.push(format!(
                "{}: {}",
                cypher::escape(field.db_name()),
                Shape::of(field).wrap(&reference)
            ));
        }

        if keys.is_empty() {
            return Err(Error::InvalidArgument {
                field: link.relation.qualified_name(),
                name: "where".to_string(),
                reason: "expected at least one unique field".to_string(),
            });
        }

        let mut inner = Block::new();
        inner.push(format!("WITH {}", link.variable));

        if let Some(guard) = self.authentication(node, &[], AuthOperation::Create)? {
            inner.push(guard);
        }

        inner.push(format!(
            "MERGE ({related}{} {{ {} }})",
            self.label_expression(node)?,
            keys.join(", ")
        ));

        let mut created = node_input.cloned().unwrap_or_default();
        created.retain(|name, _| !unique.contains_key(name));
        let fixed = unique.keys().map(String::as_str).collect::<Vec<_>>();

        self.create_assignments(Target::Node(node), &related, &created, true)?
            .without(&fixed)
            .push_to(&mut inner, "ON CREATE SET");

        let relationship = self.scope.next_variable("this");
        let pattern = self.hop(link.variable, &link.relation, Some(&relationship), Some(&related), "", true);
        inner.push(format!("MERGE {pattern}"));
        self.edge_assignments(&link.relation, &relationship, edge, GeneratedOperation::Create)?
            .push_to(&mut inner, "ON CREATE SET");

        let after = self.validate_after(
            [(link.owner, link.variable.to_string()), (node, related.clone())],
            AuthOperation::Connect,
        )?;

        if !after.is_empty() {
            inner.push("WITH *");
            after.push_to(&mut inner);
        }

        let result = self.scope.next_variable("var");
        inner.push(format!("RETURN count(*) AS {result}"));

        block.call(inner);
        Ok(())
    }
}
