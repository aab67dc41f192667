use cypher_schema::{AuthOperation, NestedOperation, Node};
use serde_json::{Map, Value};

use super::{entry, items, Link};
use crate::{
    cypher::Block,
    filter::{FilterMode, WhereOutput},
    selection::ResolveTree,
    translator::{Target, Translator},
    Result,
};

impl<'a> Translator<'a> {
    /// Matches the nodes to delete, runs the nested deletes and detaches them.
    pub fn root_delete(&mut self, node: &'a Node, tree: &ResolveTree) -> Result<Block> {
        let mut block = Block::new();

        if let Some(guard) = self.authentication(node, &[], AuthOperation::Delete)? {
            block.push(guard);
        }

        block.push(format!("MATCH (this{})", self.label_expression(node)?));

        let filter = match tree.object_arg("where") {
            Some(filter) => self.compile_where(Target::Node(node), "this", filter, FilterMode::default())?,
            None => WhereOutput::default(),
        };
        let auth = self.auth_where(node, &[], "this", AuthOperation::Delete)?;
        WhereOutput::all([filter, auth]).push_to(&mut block);

        if let Some(delete) = tree.object_arg("delete") {
            let operations = self.lift(node, NestedOperation::Delete, delete)?;
            block.append(self.nested_operations(node, "this", &operations)?);
        }

        block.push("DETACH DELETE this");
        Ok(block)
    }

    /// `{ where, delete }`, deleting the matched related nodes after their own nested
    /// deletes ran.
    pub(super) fn nested_delete(
        &mut self,
        link: Link<'a, '_>,
        input: &Map<String, Value>,
        block: &mut Block,
    ) -> Result<()> {
        for node in self.concrete_nodes(link.target) {
            let inner = self.delete_node(link, node, input)?;
            block.call(inner);
        }

        Ok(())
    }

    fn delete_node(&mut self, link: Link<'a, '_>, node: &'a Node, input: &Map<String, Value>) -> Result<Block> {
        let relationship = self.scope.next_variable("this");
        let related = self.scope.next_variable("this");

        let mut block = Block::new();
        block.push(format!("WITH {}", link.variable));

        if let Some(guard) = self.authentication(node, &[], AuthOperation::Delete)? {
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
        let auth = self.auth_where(node, &[], &related, AuthOperation::Delete)?;
        WhereOutput::all([filter, auth]).push_to(&mut block);

        if let Some(delete) = input.get("delete").filter(|value| !value.is_null()) {
            for delete in items("delete", delete)? {
                let operations = self.lift(node, NestedOperation::Delete, delete)?;
                block.append(self.nested_operations(node, &related, &operations)?);
            }
        }

        let deleted = self.scope.next_variable("var");
        let item = self.scope.next_variable("var");
        block.push(format!("WITH collect(DISTINCT {related}) AS {deleted}"));
        block.push(format!("FOREACH ({item} IN {deleted} | DETACH DELETE {item})"));

        let result = self.scope.next_variable("var");
        block.push(format!("RETURN count(*) AS {result}"));

        Ok(block)
    }
}
