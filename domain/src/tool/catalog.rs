//! Merged tool catalog with explicit ownership.

use super::descriptor::ToolDescriptor;
use std::collections::HashMap;

/// Tools advertised by every backing worker, keyed by name to their owner.
///
/// Built once per catalog refresh. When two workers advertise the same name
/// the first registration keeps ownership.
#[derive(Debug, Clone, Default)]
pub struct ToolCatalog {
    descriptors: Vec<ToolDescriptor>,
    owners: HashMap<String, String>,
}

impl ToolCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `tools` as owned by `owner`.
    ///
    /// Returns the names that were already owned by another worker and were
    /// therefore not registered.
    pub fn register(&mut self, owner: &str, tools: Vec<ToolDescriptor>) -> Vec<String> {
        let mut shadowed = Vec::new();
        for tool in tools {
            if self.owners.contains_key(&tool.name) {
                shadowed.push(tool.name);
                continue;
            }
            self.owners.insert(tool.name.clone(), owner.to_string());
            self.descriptors.push(tool);
        }
        shadowed
    }

    /// Name of the worker that executes `tool`.
    pub fn owner_of(&self, tool: &str) -> Option<&str> {
        self.owners.get(tool).map(String::as_str)
    }

    pub fn contains(&self, tool: &str) -> bool {
        self.owners.contains_key(tool)
    }

    /// Descriptors in registration order.
    pub fn descriptors(&self) -> &[ToolDescriptor] {
        &self.descriptors
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tool(name: &str) -> ToolDescriptor {
        ToolDescriptor::new(name, "", json!({"type": "object"}))
    }

    #[test]
    fn owner_lookup() {
        let mut catalog = ToolCatalog::new();
        catalog.register("game-state", vec![tool("get_inventory"), tool("create_character")]);
        catalog.register("combat", vec![tool("resolve_turn")]);

        assert_eq!(catalog.owner_of("get_inventory"), Some("game-state"));
        assert_eq!(catalog.owner_of("resolve_turn"), Some("combat"));
        assert_eq!(catalog.owner_of("cast_fireball"), None);
        assert_eq!(catalog.len(), 3);
    }

    #[test]
    fn first_owner_wins() {
        let mut catalog = ToolCatalog::new();
        catalog.register("game-state", vec![tool("roll_dice")]);
        let shadowed = catalog.register("combat", vec![tool("roll_dice"), tool("attack")]);

        assert_eq!(shadowed, vec!["roll_dice".to_string()]);
        assert_eq!(catalog.owner_of("roll_dice"), Some("game-state"));
        let names: Vec<_> = catalog.descriptors().iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["roll_dice", "attack"]);
    }

    #[test]
    fn empty_catalog() {
        let catalog = ToolCatalog::new();
        assert!(catalog.is_empty());
        assert!(!catalog.contains("anything"));
    }
}
