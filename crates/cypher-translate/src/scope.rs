use serde_json::{Map, Value};

use crate::{AuthContext, CallbackSlot};

pub(crate) const IS_AUTHENTICATED: &str = "isAuthenticated";
pub(crate) const JWT: &str = "jwt";
pub(crate) const CONTEXT: &str = "context";
pub(crate) const RESOLVED_CALLBACKS: &str = "resolvedCallbacks";

/// Per-call allocator for statement variables and parameters.
///
/// Generated names are `{hint}{counter}`, so they always end with a digit. The
/// fixed names (`this`, `edges`, `jwt`, ...) never do, which keeps the two sets
/// disjoint without any lookup.
#[derive(Debug, Default)]
pub(crate) struct Scope {
    variables: usize,
    params_count: usize,
    params: Map<String, Value>,
    callbacks: Vec<CallbackSlot>,
    /// Values of nested mutation inputs, passed as a single parameter and addressed by path.
    arena: Option<(String, Map<String, Value>)>,
    uses_authentication: bool,
    uses_jwt: bool,
    uses_context: bool,
}

impl Scope {
    pub fn next_variable(&mut self, hint: &str) -> String {
        let name = numbered(hint, self.variables);
        self.variables += 1;
        name
    }

    fn next_param_name(&mut self) -> String {
        let name = numbered("param", self.params_count);
        self.params_count += 1;
        name
    }

    /// Registers a value and returns its reference, e.g. `$param3`.
    pub fn param(&mut self, value: Value) -> String {
        let name = self.next_param_name();
        self.params.insert(name.clone(), value);
        format!("${name}")
    }

    /// Reserves a parameter whose value is only known once the whole input was walked.
    pub fn reserve_param(&mut self) -> String {
        let name = self.next_param_name();
        self.params.insert(name.clone(), Value::Null);
        name
    }

    pub fn fill_param(&mut self, name: &str, value: Value) {
        if let Some(slot) = self.params.get_mut(name) {
            *slot = value;
        }
    }

    /// Stores a nested input value under `owner.key` of the shared arena parameter and
    /// returns its path, e.g. `$param0.this3.name`.
    pub fn arena_value(&mut self, owner: &str, key: &str, value: Value) -> String {
        let name = match &self.arena {
            Some((name, _)) => name.clone(),
            None => {
                let name = self.reserve_param();
                self.arena = Some((name.clone(), Map::new()));
                name
            }
        };

        if let Some((_, values)) = self.arena.as_mut() {
            let entry = values
                .entry(owner.to_string())
                .or_insert_with(|| Value::Object(Map::new()));

            if let Value::Object(entry) = entry {
                entry.insert(key.to_string(), value);
            }
        }

        format!("${name}.{owner}.{}", crate::cypher::escape(key))
    }

    pub fn is_authenticated(&mut self) -> String {
        self.uses_authentication = true;
        format!("${IS_AUTHENTICATED}")
    }

    /// Reference to a claim path, e.g. `$jwt.sub`.
    pub fn jwt(&mut self, path: &str) -> String {
        self.uses_jwt = true;
        format!("${JWT}.{path}")
    }

    pub fn context(&mut self, path: &str) -> String {
        self.uses_context = true;
        format!("${CONTEXT}.{path}")
    }

    pub fn callback(&mut self, slot: CallbackSlot) -> String {
        let reference = format!("${RESOLVED_CALLBACKS}.{}", slot.slot);
        self.callbacks.push(slot);
        reference
    }

    pub fn finish(mut self, auth: &AuthContext) -> (Map<String, Value>, Vec<CallbackSlot>) {
        if let Some((name, values)) = self.arena.take() {
            self.fill_param(&name, Value::Object(values));
        }

        if self.uses_authentication {
            self.params
                .insert(IS_AUTHENTICATED.to_string(), Value::Bool(auth.is_authenticated));
        }

        if self.uses_jwt {
            self.params
                .insert(JWT.to_string(), Value::Object(auth.jwt.clone().unwrap_or_default()));
        }

        if self.uses_context {
            self.params.insert(CONTEXT.to_string(), Value::Object(auth.context.clone()));
        }

        if !self.callbacks.is_empty() {
            // Populated by the caller once the callbacks ran.
            self.params
                .insert(RESOLVED_CALLBACKS.to_string(), Value::Object(Map::new()));
        }

        (self.params, self.callbacks)
    }
}

fn numbered(hint: &str, counter: usize) -> String {
    if hint.ends_with(|c: char| c.is_ascii_digit()) {
        format!("{hint}_{counter}")
    } else {
        format!("{hint}{counter}")
    }
}
