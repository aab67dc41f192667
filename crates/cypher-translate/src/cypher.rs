//! Small builders for statement text.

use std::{fmt, sync::LazyLock};

use cypher_schema::Direction;
use itertools::Itertools;
use regex::Regex;

const INDENT: &str = "    ";

static IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("must be valid"));

/// A sequence of clauses, one per line.
#[derive(Debug, Default, Clone)]
pub(crate) struct Block {
    lines: Vec<String>,
}

impl Block {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    pub fn append(&mut self, other: Block) {
        self.lines.extend(other.lines);
    }

    /// Wraps `inner` into a `CALL { ... }` subquery.
    pub fn call(&mut self, inner: Block) {
        self.push("CALL {");
        self.lines
            .extend(inner.lines.into_iter().map(|line| format!("{INDENT}{line}")));
        self.push("}");
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Unions the branches inside a single subquery.
    pub fn union(branches: Vec<Block>) -> Block {
        let mut block = Block::new();

        for (i, branch) in branches.into_iter().enumerate() {
            if i > 0 {
                block.push("UNION");
            }
            block.append(branch);
        }

        block
    }

    pub fn render(&self) -> String {
        self.lines.join("\n")
    }
}

/// A boolean expression. `And`/`Or` are flattened on construction and only get
/// parenthesized when nested inside another expression.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Predicate {
    Raw(String),
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    pub fn raw(expression: impl Into<String>) -> Self {
        Predicate::Raw(expression.into())
    }

    pub fn and(items: impl IntoIterator<Item = Predicate>) -> Option<Self> {
        let mut flat = Vec::new();

        for item in items {
            match item {
                Predicate::And(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }

        match flat.len() {
            0 => None,
            1 => flat.pop(),
            _ => Some(Predicate::And(flat)),
        }
    }

    pub fn or(items: impl IntoIterator<Item = Predicate>) -> Option<Self> {
        let mut flat = Vec::new();

        for item in items {
            match item {
                Predicate::Or(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }

        match flat.len() {
            0 => None,
            1 => flat.pop(),
            _ => Some(Predicate::Or(flat)),
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Predicate::Not(Box::new(self))
    }

    fn write(&self, f: &mut fmt::Formatter<'_>, nested: bool) -> fmt::Result {
        match self {
            Predicate::Raw(expression) => f.write_str(expression),
            Predicate::And(items) | Predicate::Or(items) => {
                let separator = if matches!(self, Predicate::And(_)) { " AND " } else { " OR " };

                if nested {
                    f.write_str("(")?;
                }

                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(separator)?;
                    }
                    item.write(f, true)?;
                }

                if nested {
                    f.write_str(")")?;
                }

                Ok(())
            }
            Predicate::Not(inner) => {
                f.write_str("NOT (")?;
                inner.write(f, false)?;
                f.write_str(")")
            }
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write(f, false)
    }
}

/// Quotes a label, relationship type or property name when it is not a plain identifier.
pub(crate) fn escape(name: &str) -> String {
    if IDENTIFIER.is_match(name) {
        name.to_string()
    } else {
        format!("`{}`", name.replace('`', "``"))
    }
}

/// `this.title`
pub(crate) fn property(variable: &str, name: &str) -> String {
    format!("{variable}.{}", escape(name))
}

/// `:Movie:Film`
pub(crate) fn label_expression(labels: &[String]) -> String {
    labels.iter().map(|label| format!(":{}", escape(label))).join("")
}

/// A string literal, used for type names and error messages embedded in the statement.
pub(crate) fn string_literal(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

/// One hop of a relationship pattern.
pub(crate) struct PatternHop<'a> {
    pub from: &'a str,
    pub relationship: Option<&'a str>,
    pub rel_type: &'a str,
    pub direction: Direction,
    pub to: Option<&'a str>,
    pub to_labels: &'a str,
}

impl fmt::Display for PatternHop<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let relationship = format!("[{}:{}]", self.relationship.unwrap_or(""), escape(self.rel_type));
        let to = format!("({}{})", self.to.unwrap_or(""), self.to_labels);

        match self.direction {
            Direction::In => write!(f, "({})<-{relationship}-{to}", self.from),
            Direction::Out => write!(f, "({})-{relationship}->{to}", self.from),
            Direction::Undirected => write!(f, "({})-{relationship}-{to}", self.from),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predicates_parenthesize_only_when_nested() {
        let a = Predicate::raw("a = 1");
        let b = Predicate::raw("b = 2");
        let c = Predicate::raw("c = 3");

        let or = Predicate::or([a.clone(), b.clone()]).unwrap();
        let and = Predicate::and([or.clone(), c.clone()]).unwrap();

        assert_eq!(or.to_string(), "a = 1 OR b = 2");
        assert_eq!(and.to_string(), "(a = 1 OR b = 2) AND c = 3");
        assert_eq!(
            Predicate::and([a, b]).unwrap().not().to_string(),
            "NOT (a = 1 AND b = 2)"
        );
        assert_eq!(Predicate::and([]), None);
        assert_eq!(Predicate::or([c.clone()]), Some(c));
    }

    #[test]
    fn nested_conjunctions_are_flattened() {
        let inner = Predicate::and([Predicate::raw("a"), Predicate::raw("b")]).unwrap();
        let outer = Predicate::and([inner, Predicate::raw("c")]).unwrap();

        assert_eq!(outer.to_string(), "a AND b AND c");
    }

    #[test]
    fn escaping() {
        assert_eq!(escape("Movie"), "Movie");
        assert_eq!(escape("_id"), "_id");
        assert_eq!(escape("My Label"), "`My Label`");
        assert_eq!(escape("we`ird"), "`we``ird`");
        assert_eq!(label_expression(&["Movie".into(), "Film".into()]), ":Movie:Film");
    }

    #[test]
    fn patterns() {
        let hop = PatternHop {
            from: "this",
            relationship: Some("this0"),
            rel_type: "ACTED_IN",
            direction: Direction::In,
            to: Some("this1"),
            to_labels: ":Actor",
        };
        assert_eq!(hop.to_string(), "(this)<-[this0:ACTED_IN]-(this1:Actor)");

        let hop = PatternHop {
            from: "this",
            relationship: None,
            rel_type: "DIRECTED",
            direction: Direction::Out,
            to: None,
            to_labels: ":Person",
        };
        assert_eq!(hop.to_string(), "(this)-[:DIRECTED]->(:Person)");
    }

    #[test]
    fn subqueries_are_indented() {
        let mut inner = Block::new();
        inner.push("WITH this");
        inner.push("RETURN count(*) AS var0");

        let mut block = Block::new();
        block.push("MATCH (this:Movie)");
        block.call(inner);

        insta::assert_snapshot!(block.render(), @r"
        MATCH (this:Movie)
        CALL {
            WITH this
            RETURN count(*) AS var0
        }
        ");
    }
}
