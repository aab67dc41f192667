use crate::{Authentication, Authorization, Field, Node};

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Interface {
    pub name: String,
    #[serde(default)]
    pub fields: Vec<Field>,
    #[serde(default)]
    pub authorization: Option<Authorization>,
    #[serde(default)]
    pub authentication: Option<Authentication>,
}

impl Interface {
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|field| field.name == name)
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Union {
    pub name: String,
    #[serde(default)]
    pub members: Vec<String>,
}

/// Any type a relationship may point to.
#[derive(Debug, Clone, Copy)]
pub enum Composite<'a> {
    Node(&'a Node),
    Interface(&'a Interface),
    Union(&'a Union),
}

impl<'a> Composite<'a> {
    pub fn name(&self) -> &'a str {
        match self {
            Composite::Node(node) => &node.name,
            Composite::Interface(interface) => &interface.name,
            Composite::Union(union) => &union.name,
        }
    }

    pub fn is_abstract(&self) -> bool {
        !matches!(self, Composite::Node(_))
    }
}
