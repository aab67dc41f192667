use serde_json::{Map, Value};

use crate::{
    cypher::Predicate,
    filter::{object, Operator, Shape},
    translator::Translator,
    Error, Result,
};

impl Translator<'_> {
    /// Compiles a predicate over the token claims, e.g. `{ roles_INCLUDES: "admin" }`.
    /// Claims are read from the `$jwt` parameter at execution time.
    pub(crate) fn compile_jwt_where(&mut self, filter: &Map<String, Value>) -> Result<Option<Predicate>> {
        let mut predicates = Vec::with_capacity(filter.len());

        for (key, value) in filter {
            let predicate = match key.as_str() {
                "AND" | "OR" => {
                    let mut items = Vec::new();
                    for item in value.as_array().into_iter().flatten() {
                        items.extend(self.compile_jwt_where(object(key, item)?)?);
                    }

                    if key == "AND" {
                        Predicate::and(items)
                    } else {
                        Predicate::or(items)
                    }
                }
                "NOT" => self.compile_jwt_where(object(key, value)?)?.map(Predicate::not),
                _ => self.compile_claim(key, value)?,
            };

            predicates.extend(predicate);
        }

        Ok(Predicate::and(predicates))
    }

    fn compile_claim(&mut self, key: &str, value: &Value) -> Result<Option<Predicate>> {
        let (claim, operator) = Operator::split(key);
        let lhs = self.scope.jwt(claim);

        match (operator, value) {
            (Operator::Equal, Value::Null) => return Ok(Some(Predicate::raw(format!("{lhs} IS NULL")))),
            (Operator::Not, Value::Null) => return Ok(Some(Predicate::raw(format!("{lhs} IS NOT NULL")))),
            (_, Value::Null) => return Ok(None),
            (operator, Value::Array(items)) if operator.is_membership() && items.is_empty() => return Ok(None),
            (Operator::Distance, _) => {
                return Err(Error::UnknownFilter {
                    container: "JWT".to_string(),
                    key: key.to_string(),
                })
            }
            _ => (),
        }

        let rhs = match self.claim_reference(value) {
            Some(reference) => reference,
            None => self.scope.param(value.clone()),
        };

        Ok(Some(self.comparison(&lhs, operator, &rhs, Shape::Plain, false)))
    }
}
