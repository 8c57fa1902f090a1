use serde::{Deserialize, Serialize};

use crate::ir::NodeId;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    Contains,
    Calls,
    Imports,
    Exports,
    Extends,
    Implements,
    References,
    TypeOf,
    Returns,
    Instantiates,
    Overrides,
    Decorates,
}

impl EdgeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeKind::Contains => "contains",
            EdgeKind::Calls => "calls",
            EdgeKind::Imports => "imports",
            EdgeKind::Exports => "exports",
            EdgeKind::Extends => "extends",
            EdgeKind::Implements => "implements",
            EdgeKind::References => "references",
            EdgeKind::TypeOf => "type_of",
            EdgeKind::Returns => "returns",
            EdgeKind::Instantiates => "instantiates",
            EdgeKind::Overrides => "overrides",
            EdgeKind::Decorates => "decorates",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "contains" => EdgeKind::Contains,
            "calls" => EdgeKind::Calls,
            "imports" => EdgeKind::Imports,
            "exports" => EdgeKind::Exports,
            "extends" => EdgeKind::Extends,
            "implements" => EdgeKind::Implements,
            "references" => EdgeKind::References,
            "type_of" => EdgeKind::TypeOf,
            "returns" => EdgeKind::Returns,
            "instantiates" => EdgeKind::Instantiates,
            "overrides" => EdgeKind::Overrides,
            "decorates" => EdgeKind::Decorates,
            _ => return None,
        })
    }
}

/// Where an edge came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    #[default]
    Parser,
    StaticIndex,
    Heuristic,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provenance::Parser => "parser",
            Provenance::StaticIndex => "static_index",
            Provenance::Heuristic => "heuristic",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "parser" => Provenance::Parser,
            "static_index" => Provenance::StaticIndex,
            "heuristic" => Provenance::Heuristic,
            _ => return None,
        })
    }
}

/// A directed relationship between two persisted nodes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Edge {
    pub source: NodeId,
    pub target: NodeId,
    pub kind: EdgeKind,
    pub line: Option<u32>,
    pub column: Option<u32>,
    /// Free-form metadata; resolver edges carry `confidence` and
    /// `resolvedBy` here.
    pub metadata: Option<serde_json::Value>,
    pub provenance: Provenance,
}

impl Edge {
    pub fn new(source: NodeId, target: NodeId, kind: EdgeKind) -> Self {
        Self {
            source,
            target,
            kind,
            line: None,
            column: None,
            metadata: None,
            provenance: Provenance::Parser,
        }
    }

    pub fn at(mut self, line: u32, column: u32) -> Self {
        self.line = Some(line);
        self.column = Some(column);
        self
    }

    pub fn confidence(&self) -> Option<f64> {
        self.metadata
            .as_ref()
            .and_then(|m| m.get("confidence"))
            .and_then(|v| v.as_f64())
    }

    pub fn resolved_by(&self) -> Option<&str> {
        self.metadata
            .as_ref()
            .and_then(|m| m.get("resolvedBy"))
            .and_then(|v| v.as_str())
    }
}

/// A symbol use captured at parse time whose target node is not yet
/// known. The resolver turns these into edges; they stay in the store as
/// evidence of unresolved symbols and are rewritten whenever their source
/// file is re-indexed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UnresolvedRef {
    pub source: NodeId,
    pub name: String,
    pub kind: EdgeKind,
    pub line: u32,
    pub column: u32,
    /// Denormalized for resolver efficiency.
    pub file: String,
    pub language: String,
    /// Candidate qualified names, most specific first.
    pub candidates: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::NodeId;

    #[test]
    fn edge_metadata_accessors() {
        let mut e = Edge::new(
            NodeId::derive("a::x"),
            NodeId::derive("b::y"),
            EdgeKind::Calls,
        );
        assert_eq!(e.confidence(), None);
        e.metadata = Some(serde_json::json!({"confidence": 0.9, "resolvedBy": "import"}));
        assert_eq!(e.confidence(), Some(0.9));
        assert_eq!(e.resolved_by(), Some("import"));
    }

    #[test]
    fn edge_kind_round_trips() {
        for k in [EdgeKind::Contains, EdgeKind::TypeOf, EdgeKind::Decorates] {
            assert_eq!(EdgeKind::parse(k.as_str()), Some(k));
        }
        assert_eq!(EdgeKind::parse("nope"), None);
    }
}
