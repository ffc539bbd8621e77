//! Per-request timeout policy.
//!
//! The deadline for a request depends on its method and, for `tools/call`,
//! on the tool: handshake and discovery are short, ordinary calls get the
//! default, and a fixed set of heavy world-generation and batch tools get an
//! extended deadline.

use super::protocol::{METHOD_CALL_TOOL, METHOD_INITIALIZE, METHOD_LIST_TOOLS};
use std::collections::HashSet;
use std::time::Duration;

/// Tools that regenerate or return large parts of the world.
pub const DEFAULT_COMPLEX_TOOLS: &[&str] = &[
    "generate_world",
    "create_world",
    "get_world_tiles",
    "get_world_state",
    "get_world_map_overview",
    "get_region_map",
    "resolve_turn",
    "batch_create_npcs",
    "batch_update_npcs",
    "batch_create_characters",
    "batch_distribute_items",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeoutPolicy {
    pub initialize: Duration,
    pub list_tools: Duration,
    pub default: Duration,
    pub complex: Duration,
    pub complex_tools: HashSet<String>,
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self {
            initialize: Duration::from_secs(10),
            list_tools: Duration::from_secs(10),
            default: Duration::from_secs(30),
            complex: Duration::from_secs(120),
            complex_tools: DEFAULT_COMPLEX_TOOLS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl TimeoutPolicy {
    /// Deadline for `method`, with `tool` naming the tool of a `tools/call`.
    pub fn for_request(&self, method: &str, tool: Option<&str>) -> Duration {
        match method {
            METHOD_INITIALIZE => self.initialize,
            METHOD_LIST_TOOLS => self.list_tools,
            METHOD_CALL_TOOL => match tool {
                Some(name) if self.complex_tools.contains(name) => self.complex,
                _ => self.default,
            },
            _ => self.default,
        }
    }
}

/// Operation label used in timeout errors and logs, e.g. `tools/call:roll_dice`.
pub fn operation_label(method: &str, tool: Option<&str>) -> String {
    match tool {
        Some(name) => format!("{}:{}", method, name),
        None => method.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handshake_and_discovery_are_short() {
        let policy = TimeoutPolicy::default();
        assert_eq!(policy.for_request("initialize", None), Duration::from_secs(10));
        assert_eq!(policy.for_request("tools/list", None), Duration::from_secs(10));
    }

    #[test]
    fn complex_tools_get_extended_deadline() {
        let policy = TimeoutPolicy::default();
        assert_eq!(
            policy.for_request("tools/call", Some("generate_world")),
            Duration::from_secs(120)
        );
        assert_eq!(
            policy.for_request("tools/call", Some("batch_distribute_items")),
            Duration::from_secs(120)
        );
        assert_eq!(
            policy.for_request("tools/call", Some("roll_dice")),
            Duration::from_secs(30)
        );
    }

    #[test]
    fn unknown_methods_use_default() {
        let policy = TimeoutPolicy::default();
        assert_eq!(policy.for_request("resources/list", None), Duration::from_secs(30));
    }

    #[test]
    fn labels() {
        assert_eq!(operation_label("tools/call", Some("roll_dice")), "tools/call:roll_dice");
        assert_eq!(operation_label("initialize", None), "initialize");
    }
}
