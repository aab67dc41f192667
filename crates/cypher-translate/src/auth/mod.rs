//! Compiles `@authorization` and `@authentication` annotations.
//!
//! Rules are grouped by where they were declared: the node itself, each interface it
//! implements, and each selected field. Rules of one source are alternatives (OR), the
//! sources must all hold (AND). Filter rules silently narrow the matched nodes, validate
//! rules abort the statement with `FORBIDDEN`.

mod jwt;

use cypher_schema::{AuthOperation, AuthTiming, AuthWhere, Authentication, Authorization, Field, Node};
use indexmap::IndexMap;

use crate::{
    cypher::{self, Predicate},
    filter::{FilterMode, WhereOutput},
    translator::{Target, Translator},
    ResolveTree, Result, FORBIDDEN, UNAUTHENTICATED,
};

struct RuleSource<'a> {
    /// What the `node` part of the rules is evaluated against.
    target: Target<'a>,
    authorization: &'a Authorization,
}

impl<'a> Translator<'a> {
    fn rule_sources(&self, node: &'a Node, fields: &[&'a Field]) -> Vec<RuleSource<'a>> {
        let mut sources = Vec::new();

        if let Some(authorization) = &node.authorization {
            sources.push(RuleSource {
                target: Target::Node(node),
                authorization,
            });
        }

        for interface in self.schema().interfaces_of(node) {
            if let Some(authorization) = &interface.authorization {
                sources.push(RuleSource {
                    target: Target::Interface(interface),
                    authorization,
                });
            }
        }

        for field in fields {
            if let Some(authorization) = &field.authorization {
                sources.push(RuleSource {
                    target: Target::Node(node),
                    authorization,
                });
            }
        }

        sources
    }

    /// Selected fields carrying their own annotations.
    pub fn annotated_fields(&self, node: &'a Node, selection: &IndexMap<String, ResolveTree>) -> Vec<&'a Field> {
        let mut fields: Vec<&'a Field> = Vec::new();

        for tree in selection.values() {
            let Some(field) = node.field(&tree.name) else {
                continue;
            };

            let annotated = field.authorization.is_some() || field.authentication.is_some();
            if annotated && !fields.iter().any(|known| known.name == field.name) {
                fields.push(field);
            }
        }

        fields
    }

    /// Filter rules narrowing the nodes bound to `variable`.
    pub fn auth_filter(&mut self, node: &'a Node, variable: &str, operation: AuthOperation) -> Result<WhereOutput> {
        let mut outputs = Vec::new();

        for source in self.rule_sources(node, &[]) {
            let rules = source
                .authorization
                .filter
                .iter()
                .filter(|rule| rule.applies_to(operation))
                .map(|rule| (&rule.predicate, rule.requires_authentication))
                .collect::<Vec<_>>();

            if let Some(output) = self.compile_source(source.target, variable, &rules)? {
                outputs.push(output);
            }
        }

        Ok(WhereOutput::all(outputs))
    }

    /// Validate rules as a predicate that raises `FORBIDDEN` when violated.
    pub fn auth_validate(
        &mut self,
        node: &'a Node,
        fields: &[&'a Field],
        variable: &str,
        operation: AuthOperation,
        timing: AuthTiming,
    ) -> Result<WhereOutput> {
        let mut outputs = Vec::new();

        for source in self.rule_sources(node, fields) {
            let rules = source
                .authorization
                .validate
                .iter()
                .filter(|rule| rule.applies_to(operation, timing))
                .map(|rule| (&rule.predicate, rule.requires_authentication))
                .collect::<Vec<_>>();

            if let Some(output) = self.compile_source(source.target, variable, &rules)? {
                outputs.push(output);
            }
        }

        let WhereOutput { predicate, preludes } = WhereOutput::all(outputs);

        Ok(WhereOutput {
            predicate: predicate.map(|predicate| {
                Predicate::raw(format!(
                    "apoc.util.validatePredicate({}, {}, [0])",
                    predicate.not(),
                    cypher::string_literal(FORBIDDEN)
                ))
            }),
            preludes,
        })
    }

    /// Filter rules and `BEFORE` validation, checked right after `variable` is matched.
    pub fn auth_where(
        &mut self,
        node: &'a Node,
        fields: &[&'a Field],
        variable: &str,
        operation: AuthOperation,
    ) -> Result<WhereOutput> {
        let filter = self.auth_filter(node, variable, operation)?;
        let validate = self.auth_validate(node, fields, variable, operation, AuthTiming::Before)?;

        Ok(WhereOutput::all([filter, validate]))
    }

    /// A standalone `CALL apoc.util.validate(...)` raising `UNAUTHENTICATED`, when the
    /// node, one of its interfaces or one of `fields` requires authentication.
    pub fn authentication(
        &mut self,
        node: &'a Node,
        fields: &[&'a Field],
        operation: AuthOperation,
    ) -> Result<Option<String>> {
        let annotations: Vec<&'a Authentication> = node
            .authentication
            .iter()
            .chain(
                self.schema()
                    .interfaces_of(node)
                    .filter_map(|interface| interface.authentication.as_ref()),
            )
            .chain(fields.iter().filter_map(|field| field.authentication.as_ref()))
            .filter(|authentication| authentication.applies_to(operation))
            .collect();

        if annotations.is_empty() {
            return Ok(None);
        }

        let mut predicates = vec![Predicate::raw(format!("{} = true", self.scope.is_authenticated()))];

        for annotation in annotations {
            if let Some(jwt) = &annotation.jwt {
                predicates.extend(self.compile_jwt_where(jwt)?);
            }
        }

        Ok(Predicate::and(predicates).map(|predicate| {
            format!(
                "CALL apoc.util.validate({}, {}, [0])",
                predicate.not(),
                cypher::string_literal(UNAUTHENTICATED)
            )
        }))
    }

    /// ORs the applicable rules of one source. `None` when no rule applies or when one of
    /// them is unconditional.
    fn compile_source(
        &mut self,
        target: Target<'a>,
        variable: &str,
        rules: &[(&AuthWhere, bool)],
    ) -> Result<Option<WhereOutput>> {
        let unconditional = |(predicate, requires_authentication): &(&AuthWhere, bool)| {
            !requires_authentication && is_trivial(predicate)
        };

        if rules.is_empty() || rules.iter().any(unconditional) {
            return Ok(None);
        }

        let mut outputs = Vec::with_capacity(rules.len());

        for (predicate, requires_authentication) in rules {
            let mut parts = Vec::with_capacity(2);

            if *requires_authentication {
                let is_authenticated = self.scope.is_authenticated();
                parts.push(WhereOutput::predicate(Some(Predicate::raw(format!(
                    "{is_authenticated} = true"
                )))));
            }

            parts.push(self.compile_auth_where(target, variable, predicate)?);
            outputs.push(WhereOutput::all(parts));
        }

        Ok(Some(WhereOutput::any(outputs)))
    }

    fn compile_auth_where(&mut self, target: Target<'a>, variable: &str, predicate: &AuthWhere) -> Result<WhereOutput> {
        let mut outputs = Vec::new();

        if let Some(node) = &predicate.node {
            outputs.push(self.compile_where(target, variable, node, FilterMode::auth())?);
        }

        if let Some(jwt) = &predicate.jwt {
            outputs.push(WhereOutput::predicate(self.compile_jwt_where(jwt)?));
        }

        if !predicate.and.is_empty() {
            let mut items = Vec::with_capacity(predicate.and.len());
            for item in &predicate.and {
                items.push(self.compile_auth_where(target, variable, item)?);
            }
            outputs.push(WhereOutput::all(items));
        }

        if !predicate.or.is_empty() {
            let mut items = Vec::with_capacity(predicate.or.len());
            for item in &predicate.or {
                items.push(self.compile_auth_where(target, variable, item)?);
            }
            outputs.push(WhereOutput::any(items));
        }

        if let Some(not) = &predicate.not {
            outputs.push(self.compile_auth_where(target, variable, not)?.negate());
        }

        Ok(WhereOutput::all(outputs))
    }
}

fn is_trivial(predicate: &AuthWhere) -> bool {
    predicate.node.as_ref().map_or(true, |node| node.is_empty())
        && predicate.jwt.as_ref().map_or(true, |jwt| jwt.is_empty())
        && predicate.and.iter().all(is_trivial)
        && predicate.or.is_empty()
        && predicate.not.is_none()
}
