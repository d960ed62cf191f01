/*
 * Kiln - Confined Tool-Calling Agent
 * File Path: src/registry.rs
 * Responsibility: Safe / unsafe capability sets and the tool declarations built from them.
 */

use crate::actions::{ActionKind, Safety};
use serde_json::Value;
use std::collections::BTreeMap;

/// Two disjoint name -> action maps, fixed for the life of the process.
#[derive(Debug, Clone)]
pub struct Registry {
    safe: BTreeMap<&'static str, ActionKind>,
    unsafe_actions: BTreeMap<&'static str, ActionKind>,
}

impl Registry {
    /// Every built-in action, sorted into its safety class.
    pub fn standard() -> Self {
        Self::from_kinds(ActionKind::ALL)
    }

    pub fn from_kinds(kinds: impl IntoIterator<Item = ActionKind>) -> Self {
        let mut safe = BTreeMap::new();
        let mut unsafe_actions = BTreeMap::new();
        for kind in kinds {
            match kind.safety() {
                Safety::Safe => safe.insert(kind.name(), kind),
                Safety::Unsafe => unsafe_actions.insert(kind.name(), kind),
            };
        }
        Self { safe, unsafe_actions }
    }

    /// Unsafe names resolve only when the operator allowed them; otherwise
    /// they look exactly like names that were never registered.
    pub fn resolve(&self, name: &str, allow_unsafe: bool) -> Option<ActionKind> {
        if let Some(kind) = self.safe.get(name) {
            return Some(*kind);
        }
        if allow_unsafe {
            return self.unsafe_actions.get(name).copied();
        }
        None
    }

    pub fn safe_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.safe.keys().copied()
    }

    pub fn unsafe_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.unsafe_actions.keys().copied()
    }

    /// Declarations to advertise to the model for the current permission state.
    pub fn tool_definitions(&self, allow_unsafe: bool) -> Value {
        let mut tools: Vec<Value> = self.safe.values().map(|kind| kind.definition()).collect();
        if allow_unsafe {
            tools.extend(self.unsafe_actions.values().map(|kind| kind.definition()));
        }
        Value::Array(tools)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sets_are_disjoint_and_complete() {
        let registry = Registry::standard();
        let safe: Vec<_> = registry.safe_names().collect();
        let unsafe_names: Vec<_> = registry.unsafe_names().collect();

        assert_eq!(safe.len() + unsafe_names.len(), ActionKind::ALL.len());
        assert!(safe.iter().all(|name| !unsafe_names.contains(name)));
        assert!(unsafe_names.contains(&"run_sh_command"));
        assert!(safe.contains(&"compile_cc"));
    }

    #[test]
    fn test_unsafe_names_are_hidden_without_permission() {
        let registry = Registry::standard();
        assert_eq!(registry.resolve("run_sh_command", false), None);
        assert_eq!(registry.resolve("no_such_action", false), None);
        assert_eq!(
            registry.resolve("run_sh_command", true),
            Some(ActionKind::RunShCommand)
        );
        assert_eq!(registry.resolve("write_file", false), Some(ActionKind::WriteFile));
    }

    #[test]
    fn test_definitions_follow_permission() {
        let registry = Registry::standard();
        let names = |defs: Value| -> Vec<String> {
            defs.as_array()
                .unwrap()
                .iter()
                .map(|d| d["name"].as_str().unwrap().to_string())
                .collect()
        };

        let restricted = names(registry.tool_definitions(false));
        assert!(!restricted.iter().any(|n| n == "run_sh_command"));

        let full = names(registry.tool_definitions(true));
        assert!(full.iter().any(|n| n == "run_sh_command"));
        assert_eq!(full.len(), ActionKind::ALL.len());
    }
}
