use std::sync::LazyLock;

use cypher_schema::{
    Composite, Direction, Field, Interface, Node, QueryLimit, RelationshipField, RelationshipProperties, Schema,
};
use regex::{Captures, Regex};
use serde_json::Value;

use crate::{
    cypher::{self, Block, PatternHop, Predicate},
    scope::Scope,
    AuthContext, Config, CypherQuery, Error, Result,
};

static DYNAMIC_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$(jwt|context)\.([A-Za-z0-9_.]+)").expect("must be valid"));

/// Borrowed inputs of one translation call.
#[derive(Debug, Clone, Copy)]
pub struct TranslateContext<'a> {
    pub schema: &'a Schema,
    pub config: &'a Config,
    pub auth: &'a AuthContext,
}

impl<'a> TranslateContext<'a> {
    pub fn new(schema: &'a Schema, config: &'a Config, auth: &'a AuthContext) -> Self {
        Self { schema, config, auth }
    }
}

/// State of a single translation. Each compiler module adds its own `impl` block.
pub(crate) struct Translator<'a> {
    context: TranslateContext<'a>,
    pub(crate) scope: Scope,
}

/// The type a filter or projection is evaluated against.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Target<'a> {
    Node(&'a Node),
    Interface(&'a Interface),
    Properties(&'a RelationshipProperties),
}

impl<'a> Target<'a> {
    pub fn name(&self) -> &'a str {
        match self {
            Target::Node(node) => &node.name,
            Target::Interface(interface) => &interface.name,
            Target::Properties(properties) => &properties.name,
        }
    }

    pub fn field(&self, name: &str) -> Option<&'a Field> {
        self.fields().iter().find(|field| field.name == name)
    }

    pub fn fields(&self) -> &'a [Field] {
        match self {
            Target::Node(node) => &node.fields,
            Target::Interface(interface) => &interface.fields,
            Target::Properties(properties) => &properties.fields,
        }
    }

    pub fn limit(&self) -> Option<QueryLimit> {
        match self {
            Target::Node(node) => node.limit,
            _ => None,
        }
    }
}

/// A relationship field resolved against the schema.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Relation<'a> {
    pub owner: &'a str,
    pub field: &'a Field,
    pub relationship: &'a RelationshipField,
    pub target: Composite<'a>,
    pub properties: Option<&'a RelationshipProperties>,
}

impl<'a> Relation<'a> {
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.owner, self.field.name)
    }

    /// A singular field towards an interface that does not declare the relationship
    /// itself: writes go through one branch per implementation.
    pub fn links_each_implementation(&self) -> bool {
        !self.field.list && matches!(self.target, Composite::Interface(_)) && !self.relationship.declared
    }
}

impl<'a> Translator<'a> {
    pub fn new(context: TranslateContext<'a>) -> Self {
        Self {
            context,
            scope: Scope::default(),
        }
    }

    pub fn schema(&self) -> &'a Schema {
        self.context.schema
    }

    pub fn config(&self) -> &'a Config {
        self.context.config
    }

    pub fn auth(&self) -> &'a AuthContext {
        self.context.auth
    }

    pub fn finish(self, statement: Block) -> CypherQuery {
        let (params, callbacks) = self.scope.finish(self.context.auth);

        CypherQuery {
            cypher: statement.render(),
            params,
            callbacks,
        }
    }

    pub fn node(&self, name: &str) -> Result<&'a Node> {
        self.schema()
            .node(name)
            .ok_or_else(|| Error::UnknownType { name: name.to_string() })
    }

    pub fn composite(&self, name: &str) -> Result<Composite<'a>> {
        self.schema()
            .composite(name)
            .ok_or_else(|| Error::UnknownType { name: name.to_string() })
    }

    /// Concrete nodes behind a composite, in schema order.
    pub fn concrete_nodes(&self, composite: Composite<'a>) -> Vec<&'a Node> {
        match composite {
            Composite::Node(node) => vec![node],
            _ => self.schema().concrete_types(composite.name()),
        }
    }

    pub fn relation(&self, owner: Target<'a>, field: &'a Field) -> Result<Relation<'a>> {
        let relationship = field.relationship().ok_or_else(|| Error::UnknownField {
            container: owner.name().to_string(),
            name: field.name.clone(),
        })?;

        let properties = match &relationship.properties {
            Some(name) => Some(
                self.schema()
                    .relationship_properties(name)
                    .ok_or_else(|| Error::UnknownType { name: name.clone() })?,
            ),
            None => None,
        };

        Ok(Relation {
            owner: owner.name(),
            field,
            relationship,
            target: self.composite(&relationship.target)?,
            properties,
        })
    }

    /// Stored labels with `$jwt.`/`$context.` placeholders substituted.
    pub fn labels(&self, node: &Node) -> Result<Vec<String>> {
        node.all_labels().iter().map(|label| self.resolve_label(label)).collect()
    }

    fn resolve_label(&self, label: &str) -> Result<String> {
        if !label.contains('$') {
            return Ok(label.to_string());
        }

        let mut missing = None;

        let resolved = DYNAMIC_LABEL.replace_all(label, |captures: &Captures<'_>| {
            let path = &captures[2];
            let value = match &captures[1] {
                "jwt" => self.auth().jwt_value(path),
                _ => self.auth().context_value(path),
            };

            match value {
                Some(Value::String(value)) => value.clone(),
                Some(Value::Number(value)) => value.to_string(),
                _ => {
                    missing.get_or_insert_with(|| captures[0][1..].to_string());
                    String::new()
                }
            }
        });

        match missing {
            Some(path) => Err(Error::MissingContextValue { path }),
            None => Ok(resolved.into_owned()),
        }
    }

    /// `:Movie`
    pub fn label_expression(&self, node: &Node) -> Result<String> {
        Ok(cypher::label_expression(&self.labels(node)?))
    }

    /// `this0:Movie`
    pub fn label_predicate(&self, variable: &str, node: &Node) -> Result<Predicate> {
        Ok(Predicate::raw(format!("{variable}{}", self.label_expression(node)?)))
    }

    /// Labels used in a pattern towards `composite`. Abstract targets match any node and
    /// are narrowed with [`Self::composite_predicate`].
    pub fn pattern_labels(&self, composite: Composite<'a>) -> Result<String> {
        match composite {
            Composite::Node(node) => self.label_expression(node),
            _ => Ok(String::new()),
        }
    }

    /// `(this0:Movie OR this0:Series)` for abstract targets, nothing for nodes.
    pub fn composite_predicate(&self, variable: &str, composite: Composite<'a>) -> Result<Option<Predicate>> {
        match composite {
            Composite::Node(_) => Ok(None),
            _ => {
                let labels = self
                    .concrete_nodes(composite)
                    .into_iter()
                    .map(|node| self.label_predicate(variable, node))
                    .collect::<Result<Vec<_>>>()?;

                Ok(Some(Predicate::or(labels).unwrap_or_else(|| Predicate::raw("false"))))
            }
        }
    }

    pub fn hop(
        &self,
        from: &str,
        relation: &Relation<'a>,
        relationship: Option<&str>,
        to: Option<&str>,
        to_labels: &str,
        directed: bool,
    ) -> String {
        PatternHop {
            from,
            relationship,
            rel_type: &relation.relationship.rel_type,
            direction: if directed {
                relation.relationship.direction
            } else {
                Direction::Undirected
            },
            to,
            to_labels,
        }
        .to_string()
    }

    /// Effective page size: requested, else the type default, capped by the type and
    /// global maximums.
    pub fn limit(&self, requested: Option<u64>, limits: Option<QueryLimit>) -> Option<u64> {
        let limits = limits.unwrap_or_default();
        let mut limit = requested.or(limits.default);

        for max in [limits.max, self.config().limits.max].into_iter().flatten() {
            limit = Some(limit.map_or(max, |limit| limit.min(max)));
        }

        limit
    }
}
