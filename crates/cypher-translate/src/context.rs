use serde_json::{Map, Value};

/// What the request handler knows about the caller.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthContext {
    pub is_authenticated: bool,
    /// Verified token claims.
    pub jwt: Option<Map<String, Value>>,
    /// Extra request values, e.g. a tenant used in dynamic labels.
    pub context: Map<String, Value>,
}

impl AuthContext {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn authenticated(jwt: Map<String, Value>) -> Self {
        Self {
            is_authenticated: true,
            jwt: Some(jwt),
            context: Map::new(),
        }
    }

    #[must_use]
    pub fn with_context(mut self, context: Map<String, Value>) -> Self {
        self.context = context;
        self
    }

    /// Resolves a dotted path against the claims.
    pub fn jwt_value(&self, path: &str) -> Option<&Value> {
        lookup(self.jwt.as_ref()?, path)
    }

    pub fn context_value(&self, path: &str) -> Option<&Value> {
        lookup(&self.context, path)
    }
}

fn lookup<'a>(map: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = map.get(segments.next()?)?;

    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }

    Some(current)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn dotted_paths() {
        let claims = json!({ "sub": "1", "org": { "id": "acme" } });
        let auth = AuthContext::authenticated(claims.as_object().cloned().unwrap());

        assert_eq!(auth.jwt_value("org.id"), Some(&json!("acme")));
        assert_eq!(auth.jwt_value("org.name"), None);
        assert_eq!(AuthContext::anonymous().jwt_value("sub"), None);
    }
}
