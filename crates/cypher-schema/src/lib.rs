//! The metadata model the translation core reads.
//!
//! A [`Schema`] is produced once by the schema generation step and never mutated
//! afterwards. It is plain data: every descriptor derives `Deserialize` so it can be
//! handed over as JSON by whatever builds it.

mod auth;
mod composite;
mod error;
mod field;
mod node;
mod relationship;

pub use auth::*;
pub use composite::*;
pub use error::*;
pub use field::*;
pub use node::*;
pub use relationship::*;

#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schema {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub relationship_properties: Vec<RelationshipProperties>,
    #[serde(default)]
    pub interfaces: Vec<Interface>,
    #[serde(default)]
    pub unions: Vec<Union>,
}

impl Schema {
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        let schema: Schema = serde_json::from_value(value).map_err(Error::Deserialize)?;
        schema.validate()?;
        Ok(schema)
    }

    pub fn node(&self, name: &str) -> Option<&Node> {
        self.nodes.iter().find(|node| node.name == name)
    }

    pub fn interface(&self, name: &str) -> Option<&Interface> {
        self.interfaces.iter().find(|interface| interface.name == name)
    }

    pub fn union(&self, name: &str) -> Option<&Union> {
        self.unions.iter().find(|union| union.name == name)
    }

    pub fn relationship_properties(&self, name: &str) -> Option<&RelationshipProperties> {
        self.relationship_properties
            .iter()
            .find(|properties| properties.name == name)
    }

    pub fn composite(&self, name: &str) -> Option<Composite<'_>> {
        if let Some(node) = self.node(name) {
            return Some(Composite::Node(node));
        }

        if let Some(interface) = self.interface(name) {
            return Some(Composite::Interface(interface));
        }

        self.union(name).map(Composite::Union)
    }

    /// All nodes implementing the given interface, in declaration order.
    pub fn implementations<'a>(&'a self, interface: &'a str) -> impl Iterator<Item = &'a Node> + 'a {
        self.nodes
            .iter()
            .filter(move |node| node.implements.iter().any(|name| name == interface))
    }

    /// Interfaces declared on the node, skipping unknown names.
    pub fn interfaces_of<'a>(&'a self, node: &'a Node) -> impl Iterator<Item = &'a Interface> + 'a {
        node.implements.iter().filter_map(|name| self.interface(name))
    }

    /// Enumerates the concrete node types behind a type name. A node resolves to itself,
    /// interfaces to their implementations and unions to their members.
    pub fn concrete_types(&self, name: &str) -> Vec<&Node> {
        match self.composite(name) {
            Some(Composite::Node(node)) => vec![node],
            Some(Composite::Interface(interface)) => self.implementations(&interface.name).collect(),
            Some(Composite::Union(union)) => union.members.iter().filter_map(|member| self.node(member)).collect(),
            None => Vec::new(),
        }
    }

    /// Checks that every name referenced by a descriptor resolves.
    pub fn validate(&self) -> Result<()> {
        for node in &self.nodes {
            for interface in &node.implements {
                if self.interface(interface).is_none() {
                    return Err(Error::UnknownInterface {
                        owner: node.name.clone(),
                        name: interface.clone(),
                    });
                }
            }

            self.validate_fields(&node.name, &node.fields)?;
        }

        for interface in &self.interfaces {
            self.validate_fields(&interface.name, &interface.fields)?;
        }

        for union in &self.unions {
            for member in &union.members {
                if self.node(member).is_none() {
                    return Err(Error::UnknownUnionMember {
                        union: union.name.clone(),
                        name: member.clone(),
                    });
                }
            }
        }

        for properties in &self.relationship_properties {
            if let Some(field) = properties.fields.iter().find(|field| field.relationship().is_some()) {
                return Err(Error::RelationshipOnProperties {
                    owner: properties.name.clone(),
                    field: field.name.clone(),
                });
            }
        }

        Ok(())
    }

    fn validate_fields(&self, owner: &str, fields: &[Field]) -> Result<()> {
        for field in fields {
            let Some(relationship) = field.relationship() else {
                continue;
            };

            if self.composite(&relationship.target).is_none() {
                return Err(Error::UnknownTarget {
                    owner: owner.to_string(),
                    field: field.name.clone(),
                    target: relationship.target.clone(),
                });
            }

            if let Some(properties) = &relationship.properties {
                if self.relationship_properties(properties).is_none() {
                    return Err(Error::UnknownProperties {
                        owner: owner.to_string(),
                        field: field.name.clone(),
                        name: properties.clone(),
                    });
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn schema() -> Schema {
        Schema::from_json(json!({
            "nodes": [
                {
                    "name": "Movie",
                    "implements": ["Production"],
                    "fields": [
                        { "name": "title", "scalar": "String" },
                        {
                            "name": "actors",
                            "list": true,
                            "relationship": { "type": "ACTED_IN", "direction": "IN", "target": "Actor" }
                        }
                    ]
                },
                {
                    "name": "Series",
                    "implements": ["Production"],
                    "fields": [{ "name": "title", "scalar": "String" }]
                },
                {
                    "name": "Actor",
                    "fields": [{ "name": "name", "scalar": "String" }]
                }
            ],
            "interfaces": [
                { "name": "Production", "fields": [{ "name": "title", "scalar": "String" }] }
            ],
            "unions": [
                { "name": "Search", "members": ["Movie", "Actor"] }
            ]
        }))
        .unwrap()
    }

    #[test]
    fn concrete_types_resolve_closed_sets() {
        let schema = schema();

        let names = |name: &str| {
            schema
                .concrete_types(name)
                .into_iter()
                .map(|node| node.name.as_str())
                .collect::<Vec<_>>()
        };

        assert_eq!(names("Movie"), ["Movie"]);
        assert_eq!(names("Production"), ["Movie", "Series"]);
        assert_eq!(names("Search"), ["Movie", "Actor"]);
        assert!(names("Unknown").is_empty());
    }

    #[test]
    fn unknown_relationship_target_is_rejected() {
        let error = Schema::from_json(json!({
            "nodes": [{
                "name": "Movie",
                "fields": [{
                    "name": "actors",
                    "relationship": { "type": "ACTED_IN", "direction": "IN", "target": "Actor" }
                }]
            }]
        }))
        .unwrap_err();

        assert_eq!(
            error.to_string(),
            "The field Movie.actors points to the unknown type Actor"
        );
    }

    #[test]
    fn unknown_union_member_is_rejected() {
        let error = Schema::from_json(json!({
            "unions": [{ "name": "Search", "members": ["Movie"] }]
        }))
        .unwrap_err();

        assert_eq!(error.to_string(), "The union Search has an unknown member Movie");
    }
}
