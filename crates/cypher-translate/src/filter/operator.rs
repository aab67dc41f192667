use cypher_schema::Field;
use strum::IntoEnumIterator;

use crate::translator::Target;

/// Comparison selected by the suffix of a filter key. Variants are declared so that
/// `_NOT_X` is tried before `_X`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::AsRefStr, strum::EnumIter)]
pub(crate) enum Operator {
    #[strum(serialize = "")]
    Equal,
    #[strum(serialize = "_NOT_IN")]
    NotIn,
    #[strum(serialize = "_NOT_CONTAINS")]
    NotContains,
    #[strum(serialize = "_NOT_STARTS_WITH")]
    NotStartsWith,
    #[strum(serialize = "_NOT_ENDS_WITH")]
    NotEndsWith,
    #[strum(serialize = "_NOT_INCLUDES")]
    NotIncludes,
    #[strum(serialize = "_IN")]
    In,
    #[strum(serialize = "_CONTAINS")]
    Contains,
    #[strum(serialize = "_STARTS_WITH")]
    StartsWith,
    #[strum(serialize = "_ENDS_WITH")]
    EndsWith,
    #[strum(serialize = "_INCLUDES")]
    Includes,
    #[strum(serialize = "_MATCHES")]
    Matches,
    #[strum(serialize = "_LTE")]
    Lte,
    #[strum(serialize = "_LT")]
    Lt,
    #[strum(serialize = "_GTE")]
    Gte,
    #[strum(serialize = "_GT")]
    Gt,
    #[strum(serialize = "_DISTANCE")]
    Distance,
    #[strum(serialize = "_NOT")]
    Not,
}

impl Operator {
    /// Splits `title_STARTS_WITH` into `("title", StartsWith)`. Keys without a known
    /// suffix are equalities.
    pub fn split(key: &str) -> (&str, Operator) {
        Operator::iter()
            .filter(|operator| *operator != Operator::Equal)
            .find_map(|operator| {
                key.strip_suffix(operator.as_ref())
                    .filter(|prefix| !prefix.is_empty())
                    .map(|prefix| (prefix, operator))
            })
            .unwrap_or((key, Operator::Equal))
    }

    pub fn is_membership(self) -> bool {
        matches!(self, Operator::In | Operator::NotIn)
    }
}

/// List predicate applied to a relationship filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::AsRefStr, strum::EnumIter)]
pub(crate) enum Quantifier {
    #[strum(serialize = "")]
    Bare,
    #[strum(serialize = "_SOME")]
    Some,
    #[strum(serialize = "_NONE")]
    None,
    #[strum(serialize = "_ALL")]
    All,
    #[strum(serialize = "_SINGLE")]
    Single,
    #[strum(serialize = "_NOT")]
    Not,
}

impl Quantifier {
    fn split(key: &str) -> (&str, Quantifier) {
        Quantifier::iter()
            .filter(|quantifier| *quantifier != Quantifier::Bare)
            .find_map(|quantifier| key.strip_suffix(quantifier.as_ref()).map(|prefix| (prefix, quantifier)))
            .unwrap_or((key, Quantifier::Bare))
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum FilterKey<'a> {
    And,
    Or,
    Not,
    Property { field: &'a Field, operator: Operator },
    Relationship { field: &'a Field, quantifier: Quantifier },
    Connection { field: &'a Field, quantifier: Quantifier },
    Aggregate { field: &'a Field },
}

pub(crate) fn parse_filter_key<'a>(target: Target<'a>, key: &str) -> Option<FilterKey<'a>> {
    match key {
        "AND" => return Some(FilterKey::And),
        "OR" => return Some(FilterKey::Or),
        "NOT" => return Some(FilterKey::Not),
        _ => (),
    }

    let relationship = |name: &str| target.field(name).filter(|field| field.relationship().is_some());

    if let Some(field) = target.field(key) {
        return Some(match field.relationship() {
            Some(_) => FilterKey::Relationship {
                field,
                quantifier: Quantifier::Bare,
            },
            None => FilterKey::Property {
                field,
                operator: Operator::Equal,
            },
        });
    }

    if let Some(field) = key.strip_suffix("Aggregate").and_then(relationship) {
        return Some(FilterKey::Aggregate { field });
    }

    let (base, quantifier) = Quantifier::split(key);

    if let Some(field) = base.strip_suffix("Connection").and_then(relationship) {
        return Some(FilterKey::Connection { field, quantifier });
    }

    if let Some(field) = relationship(base) {
        return Some(FilterKey::Relationship { field, quantifier });
    }

    let (name, operator) = Operator::split(key);

    target
        .field(name)
        .filter(|field| field.is_stored())
        .map(|field| FilterKey::Property { field, operator })
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("title", "title", Operator::Equal)]
    #[case("_id_IN", "_id", Operator::In)]
    #[case("id_NOT_IN", "id", Operator::NotIn)]
    #[case("title_NOT", "title", Operator::Not)]
    #[case("title_NOT_STARTS_WITH", "title", Operator::NotStartsWith)]
    #[case("tags_INCLUDES", "tags", Operator::Includes)]
    #[case("year_LTE", "year", Operator::Lte)]
    #[case("year_LT", "year", Operator::Lt)]
    #[case("location_DISTANCE", "location", Operator::Distance)]
    #[case("_IN", "_IN", Operator::Equal)]
    fn operator_suffixes(#[case] key: &str, #[case] name: &str, #[case] operator: Operator) {
        assert_eq!(Operator::split(key), (name, operator));
    }

    #[rstest]
    #[case("actors", "actors", Quantifier::Bare)]
    #[case("actors_SOME", "actors", Quantifier::Some)]
    #[case("actors_NONE", "actors", Quantifier::None)]
    #[case("actorsConnection_ALL", "actorsConnection", Quantifier::All)]
    #[case("actors_SINGLE", "actors", Quantifier::Single)]
    #[case("actors_NOT", "actors", Quantifier::Not)]
    fn quantifier_suffixes(#[case] key: &str, #[case] base: &str, #[case] quantifier: Quantifier) {
        assert_eq!(Quantifier::split(key), (base, quantifier));
    }
}
