//! The closed set of node-type tags.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Target handle every node type accepts.
pub const INPUT_HANDLE: &str = "input";

/// Source handle an edge leaves from when it names none.
pub const OUTPUT_HANDLE: &str = "output";

/// Discriminator selecting which processor variant handles a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Trigger,
    Tool,
    Agent,
    Condition,
    Adapter,
    Aggregator,
}

impl NodeType {
    pub const ALL: [NodeType; 6] = [
        NodeType::Trigger,
        NodeType::Tool,
        NodeType::Agent,
        NodeType::Condition,
        NodeType::Adapter,
        NodeType::Aggregator,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Trigger => "trigger",
            NodeType::Tool => "tool",
            NodeType::Agent => "agent",
            NodeType::Condition => "condition",
            NodeType::Adapter => "adapter",
            NodeType::Aggregator => "aggregator",
        }
    }

    /// Statically declared source handles.
    ///
    /// Condition nodes declare their handles in configuration, so this
    /// returns an empty slice for them.
    pub fn source_handles(&self) -> &'static [&'static str] {
        match self {
            NodeType::Tool => &[OUTPUT_HANDLE, "error"],
            NodeType::Condition => &[],
            _ => &[OUTPUT_HANDLE],
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NodeType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown node type '{s}'"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_case_insensitively() {
        assert_eq!("Tool".parse::<NodeType>(), Ok(NodeType::Tool));
        assert_eq!("aggregator".parse::<NodeType>(), Ok(NodeType::Aggregator));
        assert!("webhook".parse::<NodeType>().is_err());
    }

    #[test]
    fn serde_uses_snake_case_tags() {
        let json = serde_json::to_string(&NodeType::Condition).unwrap();
        assert_eq!(json, "\"condition\"");
    }
}
