use crate::{Authentication, Authorization, Field};

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub name: String,
    /// Stored labels. Defaults to the type name. A label may be a `$jwt.` or
    /// `$context.` placeholder resolved per request.
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub fields: Vec<Field>,
    #[serde(default)]
    pub implements: Vec<String>,
    #[serde(default)]
    pub authorization: Option<Authorization>,
    #[serde(default)]
    pub authentication: Option<Authentication>,
    #[serde(default)]
    pub fulltext: Vec<FulltextIndex>,
    #[serde(default)]
    pub limit: Option<QueryLimit>,
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FulltextIndex {
    pub name: String,
    #[serde(default)]
    pub fields: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryLimit {
    #[serde(default)]
    pub default: Option<u64>,
    #[serde(default)]
    pub max: Option<u64>,
}

impl Node {
    pub fn all_labels(&self) -> &[String] {
        if self.labels.is_empty() {
            std::slice::from_ref(&self.name)
        } else {
            &self.labels
        }
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn unique_fields(&self) -> impl Iterator<Item = &Field> + '_ {
        self.fields.iter().filter(|field| field.unique)
    }

    pub fn relationship_fields(&self) -> impl Iterator<Item = &Field> + '_ {
        self.fields.iter().filter(|field| field.relationship().is_some())
    }

    pub fn fulltext_index(&self, name: &str) -> Option<&FulltextIndex> {
        self.fulltext.iter().find(|index| index.name == name)
    }
}
