mod bind;

pub use bind::{bind_operation, BoundOperation, OperationKind};

use indexmap::IndexMap;
use serde_json::{Map, Value};

/// A requested field with its arguments and sub-selections.
///
/// Sub-fields selected through inline fragments are kept apart per type condition in
/// `fields_by_type_name`, the others live in `fields`.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveTree {
    pub name: String,
    /// The response key, equal to `name` when the field is not aliased.
    pub alias: String,
    pub args: Map<String, Value>,
    pub fields: IndexMap<String, ResolveTree>,
    pub fields_by_type_name: IndexMap<String, IndexMap<String, ResolveTree>>,
}

impl ResolveTree {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();

        Self {
            alias: name.clone(),
            name,
            ..Default::default()
        }
    }

    /// Non-null argument value.
    pub fn arg(&self, name: &str) -> Option<&Value> {
        self.args.get(name).filter(|value| !value.is_null())
    }

    pub fn object_arg(&self, name: &str) -> Option<&Map<String, Value>> {
        self.arg(name).and_then(Value::as_object)
    }

    /// First unconditional sub-field named `name`, whatever its alias.
    pub fn field(&self, name: &str) -> Option<&ResolveTree> {
        self.fields.values().find(|field| field.name == name)
    }

    /// The sub-fields that apply to an object of one of `type_names`, unconditional
    /// fields first. Selections sharing a response key are merged.
    pub fn fields_for(&self, type_names: &[&str]) -> IndexMap<String, ResolveTree> {
        let mut fields = self.fields.clone();

        for (type_name, conditional) in &self.fields_by_type_name {
            if !type_names.contains(&type_name.as_str()) {
                continue;
            }

            for (alias, field) in conditional {
                merge_into(&mut fields, alias, field.clone());
            }
        }

        fields
    }

    fn merge(&mut self, other: ResolveTree) {
        for (alias, field) in other.fields {
            merge_into(&mut self.fields, &alias, field);
        }

        for (type_name, fields) in other.fields_by_type_name {
            let target = self.fields_by_type_name.entry(type_name).or_default();
            for (alias, field) in fields {
                merge_into(target, &alias, field);
            }
        }
    }
}

pub(crate) fn merge_into(fields: &mut IndexMap<String, ResolveTree>, alias: &str, field: ResolveTree) {
    match fields.get_mut(alias) {
        Some(existing) => existing.merge(field),
        None => {
            fields.insert(alias.to_string(), field);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(name: &str) -> ResolveTree {
        ResolveTree::new(name)
    }

    #[test]
    fn conditional_fields_are_merged_per_type() {
        let mut tree = leaf("productions");
        tree.fields.insert("title".into(), leaf("title"));

        let mut movie = IndexMap::new();
        movie.insert("runtime".into(), leaf("runtime"));
        tree.fields_by_type_name.insert("Movie".into(), movie);

        let mut series = IndexMap::new();
        series.insert("episodes".into(), leaf("episodes"));
        tree.fields_by_type_name.insert("Series".into(), series);

        let keys = |fields: IndexMap<String, ResolveTree>| fields.into_keys().collect::<Vec<_>>();

        assert_eq!(keys(tree.fields_for(&["Movie", "Production"])), ["title", "runtime"]);
        assert_eq!(keys(tree.fields_for(&["Series"])), ["title", "episodes"]);
        assert_eq!(keys(tree.fields_for(&[])), ["title"]);
    }

    #[test]
    fn same_response_key_merges_sub_selections() {
        let mut left = leaf("actors");
        left.fields.insert("name".into(), leaf("name"));

        let mut right = leaf("actors");
        right.fields.insert("born".into(), leaf("born"));

        let mut fields = IndexMap::new();
        merge_into(&mut fields, "actors", left);
        merge_into(&mut fields, "actors", right);

        assert_eq!(fields["actors"].fields.keys().collect::<Vec<_>>(), ["name", "born"]);
    }
}
