use cypher_schema::Field;
use itertools::Itertools;
use serde_json::Value;

use crate::{
    cypher::{self, Block},
    selection::ResolveTree,
    translator::{Target, Translator},
    value, Error, Result,
};

#[derive(Debug, Clone, Copy)]
pub(crate) struct SortKey<'a> {
    pub field: &'a Field,
    pub descending: bool,
}

impl SortKey<'_> {
    pub fn direction(&self) -> &'static str {
        if self.descending {
            "DESC"
        } else {
            "ASC"
        }
    }
}

/// `sort`, `limit` and `offset` of a list field, read from its `options` argument.
#[derive(Debug, Default)]
pub(crate) struct ListOptions<'v> {
    pub sort: Option<&'v Value>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl<'v> ListOptions<'v> {
    pub fn from_tree(tree: &'v ResolveTree) -> Result<Self> {
        let Some(options) = tree.object_arg("options") else {
            return Ok(Self::default());
        };

        Ok(Self {
            sort: options.get("sort").filter(|sort| !sort.is_null()),
            limit: unsigned(tree, "limit", options.get("limit"))?,
            offset: unsigned(tree, "offset", options.get("offset"))?,
        })
    }
}

pub(crate) fn unsigned(tree: &ResolveTree, name: &str, value: Option<&Value>) -> Result<Option<u64>> {
    let Some(value) = value.filter(|value| !value.is_null()) else {
        return Ok(None);
    };

    let invalid = || Error::InvalidArgument {
        field: tree.name.clone(),
        name: name.to_string(),
        reason: "expected a non-negative integer".to_string(),
    };

    let number = value::parse_int64(value).map_err(|_| invalid())?;
    u64::try_from(number).map(Some).map_err(|_| invalid())
}

impl<'a> Translator<'a> {
    /// Parses `[{ title: ASC }, { year: DESC }]` against the fields of `target`.
    pub fn sort_keys(&self, target: Target<'a>, sort: Option<&Value>) -> Result<Vec<SortKey<'a>>> {
        let mut keys = Vec::new();

        let items = match sort {
            None | Some(Value::Null) => return Ok(keys),
            Some(Value::Array(items)) => items.iter().collect::<Vec<_>>(),
            Some(item) => vec![item],
        };

        for item in items {
            let Some(object) = item.as_object() else {
                return Err(invalid_sort(target, "expected an object"));
            };

            for (name, direction) in object {
                let field = target
                    .field(name)
                    .filter(|field| field.is_stored())
                    .ok_or_else(|| Error::UnknownField {
                        container: target.name().to_string(),
                        name: name.clone(),
                    })?;

                let descending = match direction.as_str() {
                    Some("ASC") => false,
                    Some("DESC") => true,
                    _ => return Err(invalid_sort(target, "expected ASC or DESC")),
                };

                keys.push(SortKey { field, descending });
            }
        }

        Ok(keys)
    }

    /// `SKIP` and `LIMIT` clauses. Both travel as 64-bit integers.
    pub fn pagination(&mut self, offset: Option<u64>, limit: Option<u64>) -> Block {
        let mut block = Block::new();

        for (clause, value) in [("SKIP", offset), ("LIMIT", limit)] {
            if let Some(value) = value {
                let reference = self.scope.param(value::int64(i64::try_from(value).unwrap_or(i64::MAX)));
                block.push(format!("{clause} {reference}"));
            }
        }

        block
    }

    /// Sort and pagination of a node list matched as `variable`, or nothing.
    pub fn list_options(&mut self, target: Target<'a>, variable: &str, tree: &ResolveTree) -> Result<Block> {
        let options = ListOptions::from_tree(tree)?;
        let keys = self.sort_keys(target, options.sort)?;
        let limit = self.limit(options.limit, target.limit());

        let mut block = Block::new();

        if let Some(order) = order_by(&keys, |key| cypher::property(variable, key.field.db_name())) {
            block.push(order);
        }

        block.append(self.pagination(options.offset, limit));
        Ok(block)
    }
}

/// `ORDER BY this.title ASC`, with each key rendered by `path`.
pub(crate) fn order_by(keys: &[SortKey<'_>], path: impl Fn(&SortKey<'_>) -> String) -> Option<String> {
    if keys.is_empty() {
        return None;
    }

    Some(format!(
        "ORDER BY {}",
        keys.iter()
            .map(|key| format!("{} {}", path(key), key.direction()))
            .join(", ")
    ))
}

fn invalid_sort(target: Target<'_>, reason: &str) -> Error {
    Error::InvalidArgument {
        field: target.name().to_string(),
        name: "sort".to_string(),
        reason: reason.to_string(),
    }
}
