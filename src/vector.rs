use crate::ir::NodeId;

/// Optional embedding collaborator for semantic search. The core only
/// queries it; building and persisting vectors is someone else's job.
/// Absence is observable via `CodeGraph::has_semantic_search` and never
/// fatal.
pub trait VectorManager: Send + Sync {
    fn name(&self) -> &'static str {
        "vector"
    }

    /// Nodes similar to the query, with a similarity score in [0, 1].
    fn search_similar(&self, query: &str, limit: usize) -> anyhow::Result<Vec<(NodeId, f64)>>;
}
