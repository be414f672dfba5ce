//! Template variable bindings
//!
//! Values configured up front live in a parent context; values a test script
//! learns at runtime (a fresh principal, a canister id) shadow them in a child.

use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct VariableContext {
    variables: HashMap<String, String>,
    parent: Option<Box<VariableContext>>,
}

impl VariableContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new context layered over `parent`
    #[must_use]
    pub fn with_parent(parent: VariableContext) -> Self {
        Self {
            variables: HashMap::new(),
            parent: Some(Box::new(parent)),
        }
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.variables.insert(name.into(), value.into());
    }

    /// Get a variable value, checking parent contexts if not found locally
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.variables
            .get(name)
            .map(String::as_str)
            .or_else(|| self.parent.as_ref().and_then(|parent| parent.get(name)))
    }
}

impl<K, V> FromIterator<(K, V)> for VariableContext
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut context = Self::new();
        for (name, value) in iter {
            context.set(name, value);
        }
        context
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_variable_context() {
        let mut context = VariableContext::new();

        assert!(context.get("owner").is_none());

        context.set("owner", "aaaaa-aa");

        assert_eq!(context.get("owner"), Some("aaaaa-aa"));
    }

    #[test]
    fn test_runtime_values_shadow_configured_ones() {
        let configured: VariableContext = [("owner_principal", "aaaaa-aa"), ("token", "ICP")]
            .into_iter()
            .collect();

        let mut runtime = VariableContext::with_parent(configured);
        assert_eq!(runtime.get("owner_principal"), Some("aaaaa-aa"));

        runtime.set("owner_principal", "2vxsx-fae");
        assert_eq!(runtime.get("owner_principal"), Some("2vxsx-fae"));
        assert_eq!(runtime.get("token"), Some("ICP"));
    }
}
