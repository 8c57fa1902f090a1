use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};

use crate::error::Result;
use crate::ir::reference::{Edge, EdgeKind};
use crate::ir::{Node, NodeId, NodeKind};
use crate::store::Store;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[default]
    Outgoing,
    Incoming,
    Both,
}

#[derive(Debug, Clone, Default)]
pub struct TraverseOptions {
    pub max_depth: Option<u32>,
    pub edge_kinds: Option<Vec<EdgeKind>>,
    pub node_kinds: Option<Vec<NodeKind>>,
    pub direction: Direction,
    pub limit: Option<usize>,
    pub include_start: bool,
}

impl TraverseOptions {
    pub fn new() -> Self {
        Self {
            include_start: true,
            ..Default::default()
        }
    }

    pub fn depth(mut self, d: u32) -> Self {
        self.max_depth = Some(d);
        self
    }

    pub fn direction(mut self, d: Direction) -> Self {
        self.direction = d;
        self
    }

    pub fn edges(mut self, kinds: &[EdgeKind]) -> Self {
        self.edge_kinds = Some(kinds.to_vec());
        self
    }
}

/// In-memory result of a traversal: a node map, the traversed edges and
/// the root ids. The graph itself is never held as a linked object
/// graph; traversal works by id lookup against the store.
#[derive(Debug, Clone, Serialize, Default)]
pub struct Subgraph {
    pub nodes: HashMap<NodeId, Node>,
    pub edges: Vec<Edge>,
    pub roots: Vec<NodeId>,
}

impl Subgraph {
    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn merge(mut self, other: Subgraph) -> Subgraph {
        for (id, n) in other.nodes {
            self.nodes.insert(id, n);
        }
        let mut seen: HashSet<(NodeId, NodeId, EdgeKind, Option<u32>, Option<u32>)> = self
            .edges
            .iter()
            .map(|e| (e.source.clone(), e.target.clone(), e.kind, e.line, e.column))
            .collect();
        for e in other.edges {
            if seen.insert((e.source.clone(), e.target.clone(), e.kind, e.line, e.column)) {
                self.edges.push(e);
            }
        }
        for r in other.roots {
            if !self.roots.contains(&r) {
                self.roots.push(r);
            }
        }
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PathStep {
    pub node: Node,
    /// Edge that led into this node; `None` at position 0.
    pub edge: Option<Edge>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeContext {
    pub node: Node,
    pub ancestors: Vec<Node>,
    pub children: Vec<Node>,
    pub incoming: Vec<Edge>,
    pub outgoing: Vec<Edge>,
    pub related_types: Vec<Node>,
    pub imports: Vec<Node>,
}

/// BFS/DFS and derived queries over the persisted graph. Read-only:
/// bypasses the write locks and observes committed state.
pub struct Traverser<'a> {
    store: &'a Store,
}

impl<'a> Traverser<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    fn edges_for(&self, id: &NodeId, opts: &TraverseOptions) -> Result<Vec<Edge>> {
        let kinds = opts.edge_kinds.as_deref();
        Ok(match opts.direction {
            Direction::Outgoing => self.store.outgoing(id, kinds)?,
            Direction::Incoming => self.store.incoming(id, kinds)?,
            Direction::Both => {
                let mut v = self.store.outgoing(id, kinds)?;
                v.extend(self.store.incoming(id, kinds)?);
                v
            }
        })
    }

    pub fn bfs(&self, start: &NodeId, opts: &TraverseOptions) -> Result<Subgraph> {
        self.walk(start, opts, true)
    }

    pub fn dfs(&self, start: &NodeId, opts: &TraverseOptions) -> Result<Subgraph> {
        self.walk(start, opts, false)
    }

    fn walk(&self, start: &NodeId, opts: &TraverseOptions, bfs: bool) -> Result<Subgraph> {
        let mut out = Subgraph {
            roots: vec![start.clone()],
            ..Default::default()
        };
        let Some(start_node) = self.store.get_node(start)? else {
            return Ok(out);
        };
        let mut visited: HashSet<NodeId> = HashSet::new();
        visited.insert(start.clone());
        if opts.include_start {
            out.nodes.insert(start.clone(), start_node);
        }

        let mut queue: VecDeque<(NodeId, u32)> = VecDeque::new();
        queue.push_back((start.clone(), 0));

        while let Some((cur, depth)) = if bfs {
            queue.pop_front()
        } else {
            queue.pop_back()
        } {
            if let Some(maxd) = opts.max_depth {
                if depth >= maxd {
                    continue;
                }
            }
            for edge in self.edges_for(&cur, opts)? {
                let next = if edge.source == cur {
                    edge.target.clone()
                } else {
                    edge.source.clone()
                };
                if visited.contains(&next) {
                    continue;
                }
                let Some(node) = self.store.get_node(&next)? else {
                    continue;
                };
                if let Some(ks) = &opts.node_kinds {
                    if !ks.contains(&node.kind) {
                        continue;
                    }
                }
                if let Some(limit) = opts.limit {
                    if out.nodes.len() >= limit {
                        return Ok(out);
                    }
                }
                visited.insert(next.clone());
                out.nodes.insert(next.clone(), node);
                out.edges.push(edge);
                queue.push_back((next, depth + 1));
            }
        }
        Ok(out)
    }

    // ── derived queries ────────────────────────────────────────────

    pub fn callers(&self, id: &NodeId, max_depth: u32) -> Result<Subgraph> {
        self.bfs(
            id,
            &TraverseOptions::new()
                .direction(Direction::Incoming)
                .edges(&[EdgeKind::Calls])
                .depth(max_depth),
        )
    }

    pub fn callees(&self, id: &NodeId, max_depth: u32) -> Result<Subgraph> {
        self.bfs(
            id,
            &TraverseOptions::new()
                .direction(Direction::Outgoing)
                .edges(&[EdgeKind::Calls])
                .depth(max_depth),
        )
    }

    pub fn call_graph(&self, id: &NodeId, depth: u32) -> Result<Subgraph> {
        Ok(self.callers(id, depth)?.merge(self.callees(id, depth)?))
    }

    pub fn type_hierarchy(&self, id: &NodeId) -> Result<Subgraph> {
        self.bfs(
            id,
            &TraverseOptions::new()
                .direction(Direction::Both)
                .edges(&[EdgeKind::Extends, EdgeKind::Implements]),
        )
    }

    pub fn find_usages(&self, id: &NodeId) -> Result<Vec<Edge>> {
        self.store.incoming(id, None)
    }

    pub fn impact_radius(&self, id: &NodeId, depth: u32) -> Result<Subgraph> {
        self.bfs(
            id,
            &TraverseOptions::new()
                .direction(Direction::Incoming)
                .depth(depth),
        )
    }

    /// BFS shortest path from `a` to `b`, as (node, incoming edge) pairs
    /// with a `None` edge at position 0. `None` when unreachable.
    pub fn find_path(
        &self,
        a: &NodeId,
        b: &NodeId,
        edge_kinds: Option<&[EdgeKind]>,
    ) -> Result<Option<Vec<PathStep>>> {
        if self.store.get_node(a)?.is_none() || self.store.get_node(b)?.is_none() {
            return Ok(None);
        }
        if a == b {
            let node = self.store.get_node(a)?.unwrap();
            return Ok(Some(vec![PathStep { node, edge: None }]));
        }
        let mut visited: HashSet<NodeId> = HashSet::new();
        visited.insert(a.clone());
        let mut parent: HashMap<NodeId, (NodeId, Edge)> = HashMap::new();
        let mut queue: VecDeque<NodeId> = VecDeque::new();
        queue.push_back(a.clone());
        let mut found = false;
        'bfs: while let Some(cur) = queue.pop_front() {
            for edge in self.store.outgoing(&cur, edge_kinds)? {
                let next = edge.target.clone();
                if !visited.insert(next.clone()) {
                    continue;
                }
                parent.insert(next.clone(), (cur.clone(), edge));
                if &next == b {
                    found = true;
                    break 'bfs;
                }
                queue.push_back(next);
            }
        }
        if !found {
            return Ok(None);
        }
        let mut rev: Vec<PathStep> = Vec::new();
        let mut cur = b.clone();
        loop {
            match parent.get(&cur) {
                Some((prev, edge)) => {
                    let node = self.store.get_node(&cur)?.expect("path node exists");
                    rev.push(PathStep {
                        node,
                        edge: Some(edge.clone()),
                    });
                    cur = prev.clone();
                }
                None => {
                    let node = self.store.get_node(&cur)?.expect("path node exists");
                    rev.push(PathStep { node, edge: None });
                    break;
                }
            }
        }
        rev.reverse();
        Ok(Some(rev))
    }

    /// Chain of `contains` predecessors, immediate parent first.
    pub fn ancestors(&self, id: &NodeId) -> Result<Vec<Node>> {
        let mut out = Vec::new();
        let mut seen: HashSet<NodeId> = HashSet::new();
        seen.insert(id.clone());
        let mut cur = id.clone();
        loop {
            let parents = self.store.incoming(&cur, Some(&[EdgeKind::Contains]))?;
            let Some(edge) = parents.first() else { break };
            let pid = edge.source.clone();
            if !seen.insert(pid.clone()) {
                break;
            }
            let Some(node) = self.store.get_node(&pid)? else {
                break;
            };
            out.push(node);
            cur = pid;
        }
        Ok(out)
    }

    pub fn children(&self, id: &NodeId) -> Result<Vec<Node>> {
        let mut out = Vec::new();
        for e in self.store.outgoing(id, Some(&[EdgeKind::Contains]))? {
            if let Some(n) = self.store.get_node(&e.target)? {
                out.push(n);
            }
        }
        out.sort_by_key(|n| n.span.start_line);
        Ok(out)
    }

    pub fn get_context(&self, id: &NodeId) -> Result<Option<NodeContext>> {
        let Some(node) = self.store.get_node(id)? else {
            return Ok(None);
        };
        let incoming = self.store.incoming(id, None)?;
        let outgoing = self.store.outgoing(id, None)?;
        let mut related_types = Vec::new();
        for e in self
            .store
            .outgoing(id, Some(&[EdgeKind::TypeOf, EdgeKind::Returns]))?
        {
            if let Some(n) = self.store.get_node(&e.target)? {
                related_types.push(n);
            }
        }
        let file_id = NodeId::derive(&node.file);
        let mut imports = Vec::new();
        for e in self.store.outgoing(&file_id, Some(&[EdgeKind::Imports]))? {
            if let Some(n) = self.store.get_node(&e.target)? {
                imports.push(n);
            }
        }
        Ok(Some(NodeContext {
            ancestors: self.ancestors(id)?,
            children: self.children(id)?,
            incoming,
            outgoing,
            related_types,
            imports,
            node,
        }))
    }

    /// Files this file imports, via the `imports` edge set.
    pub fn file_dependencies(&self, path: &str) -> Result<Vec<String>> {
        let id = NodeId::derive(path);
        let mut out: Vec<String> = Vec::new();
        for e in self.store.outgoing(&id, Some(&[EdgeKind::Imports]))? {
            if let Some(n) = self.store.get_node(&e.target)? {
                if n.file != path && !out.contains(&n.file) {
                    out.push(n.file);
                }
            }
        }
        out.sort();
        Ok(out)
    }

    pub fn file_dependents(&self, path: &str) -> Result<Vec<String>> {
        let id = NodeId::derive(path);
        let mut out: Vec<String> = Vec::new();
        for e in self.store.incoming(&id, Some(&[EdgeKind::Imports]))? {
            if let Some(n) = self.store.get_node(&e.source)? {
                if n.file != path && !out.contains(&n.file) {
                    out.push(n.file);
                }
            }
        }
        out.sort();
        Ok(out)
    }

    /// Strongly connected components of size > 1 in the file-level
    /// import graph.
    pub fn find_circular_dependencies(&self) -> Result<Vec<Vec<String>>> {
        let pairs = self.store.import_file_pairs()?;
        let mut index_of: HashMap<String, usize> = HashMap::new();
        let mut names: Vec<String> = Vec::new();
        let intern = |s: &str, names: &mut Vec<String>, index_of: &mut HashMap<String, usize>| {
            *index_of.entry(s.to_string()).or_insert_with(|| {
                names.push(s.to_string());
                names.len() - 1
            })
        };
        let mut adj: Vec<Vec<usize>> = Vec::new();
        for (from, to) in &pairs {
            let f = intern(from, &mut names, &mut index_of);
            let t = intern(to, &mut names, &mut index_of);
            adj.resize(names.len(), Vec::new());
            adj[f].push(t);
        }
        adj.resize(names.len(), Vec::new());

        let sccs = tarjan_sccs(&adj);
        let mut out: Vec<Vec<String>> = sccs
            .into_iter()
            .filter(|c| c.len() > 1)
            .map(|c| {
                let mut files: Vec<String> = c.into_iter().map(|i| names[i].clone()).collect();
                files.sort();
                files
            })
            .collect();
        out.sort();
        Ok(out)
    }

    /// Nodes of the given kinds with no incoming edges of any kind.
    pub fn find_dead_code(&self, kinds: Option<&[NodeKind]>) -> Result<Vec<Node>> {
        let default_kinds = [NodeKind::Function, NodeKind::Method, NodeKind::Class];
        self.store
            .nodes_without_incoming(kinds.unwrap_or(&default_kinds))
    }
}

/// Iterative Tarjan: no recursion so pathological graphs cannot blow the
/// stack.
fn tarjan_sccs(adj: &[Vec<usize>]) -> Vec<Vec<usize>> {
    let n = adj.len();
    let mut index = vec![usize::MAX; n];
    let mut lowlink = vec![0usize; n];
    let mut on_stack = vec![false; n];
    let mut stack: Vec<usize> = Vec::new();
    let mut next_index = 0usize;
    let mut sccs: Vec<Vec<usize>> = Vec::new();

    for root in 0..n {
        if index[root] != usize::MAX {
            continue;
        }
        // (vertex, next child position)
        let mut call: Vec<(usize, usize)> = vec![(root, 0)];
        while !call.is_empty() {
            let (v, child) = *call.last().expect("nonempty");
            if child == 0 {
                index[v] = next_index;
                lowlink[v] = next_index;
                next_index += 1;
                stack.push(v);
                on_stack[v] = true;
            }
            if child < adj[v].len() {
                call.last_mut().expect("nonempty").1 += 1;
                let w = adj[v][child];
                if index[w] == usize::MAX {
                    call.push((w, 0));
                } else if on_stack[w] {
                    lowlink[v] = lowlink[v].min(index[w]);
                }
            } else {
                call.pop();
                if let Some(&(parent, _)) = call.last() {
                    lowlink[parent] = lowlink[parent].min(lowlink[v]);
                }
                if lowlink[v] == index[v] {
                    let mut comp = Vec::new();
                    loop {
                        let w = stack.pop().expect("tarjan stack underflow");
                        on_stack[w] = false;
                        comp.push(w);
                        if w == v {
                            break;
                        }
                    }
                    sccs.push(comp);
                }
            }
        }
    }
    sccs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Span;

    fn node(qname: &str, kind: NodeKind, file: &str) -> Node {
        let name = qname
            .rsplit("::")
            .next()
            .unwrap()
            .rsplit('.')
            .next()
            .unwrap()
            .to_string();
        Node::new(kind, name, qname, file, "typescript", Span::lines(1, 3))
    }

    /// a.ts::f -> b.ts::g -> c.ts::h call chain plus containment.
    fn seeded_store() -> (Store, Node, Node, Node) {
        let mut store = Store::open_in_memory().unwrap();
        let fa = Node::file_node("a.ts", "typescript", 5);
        let fb = Node::file_node("b.ts", "typescript", 5);
        let fc = Node::file_node("c.ts", "typescript", 5);
        let f = node("a.ts::f", NodeKind::Function, "a.ts");
        let g = node("b.ts::g", NodeKind::Function, "b.ts");
        let h = node("c.ts::h", NodeKind::Function, "c.ts");
        store
            .upsert_nodes(&[fa.clone(), fb.clone(), fc.clone(), f.clone(), g.clone(), h.clone()])
            .unwrap();
        store
            .insert_edges(&[
                Edge::new(fa.id.clone(), f.id.clone(), EdgeKind::Contains),
                Edge::new(fb.id.clone(), g.id.clone(), EdgeKind::Contains),
                Edge::new(fc.id.clone(), h.id.clone(), EdgeKind::Contains),
                Edge::new(f.id.clone(), g.id.clone(), EdgeKind::Calls).at(2, 0),
                Edge::new(g.id.clone(), h.id.clone(), EdgeKind::Calls).at(2, 0),
            ])
            .unwrap();
        (store, f, g, h)
    }

    #[test]
    fn bfs_respects_depth_and_direction() {
        let (store, f, g, h) = seeded_store();
        let t = Traverser::new(&store);
        let one = t.callees(&f.id, 1).unwrap();
        assert!(one.contains(&g.id));
        assert!(!one.contains(&h.id));
        let two = t.callees(&f.id, 2).unwrap();
        assert!(two.contains(&h.id));
        let up = t.callers(&h.id, 2).unwrap();
        assert!(up.contains(&f.id) && up.contains(&g.id));
    }

    #[test]
    fn limit_and_include_start() {
        let (store, f, g, _h) = seeded_store();
        let t = Traverser::new(&store);
        let mut opts = TraverseOptions::new()
            .direction(Direction::Outgoing)
            .edges(&[EdgeKind::Calls]);
        opts.include_start = false;
        opts.limit = Some(1);
        let sg = t.bfs(&f.id, &opts).unwrap();
        assert!(!sg.contains(&f.id));
        assert_eq!(sg.nodes.len(), 1);
        assert!(sg.contains(&g.id));
    }

    #[test]
    fn find_path_matches_bfs_reachability() {
        let (store, f, _g, h) = seeded_store();
        let t = Traverser::new(&store);
        let path = t
            .find_path(&f.id, &h.id, Some(&[EdgeKind::Calls]))
            .unwrap()
            .unwrap();
        assert_eq!(path.len(), 3);
        assert!(path[0].edge.is_none());
        assert_eq!(path[0].node.id, f.id);
        assert_eq!(path[2].node.id, h.id);
        for step in &path[1..] {
            assert!(step.edge.is_some());
        }
        // No reverse path over calls.
        assert!(t.find_path(&h.id, &f.id, Some(&[EdgeKind::Calls])).unwrap().is_none());
    }

    #[test]
    fn ancestors_have_no_duplicates_and_follow_contains() {
        let (store, f, _g, _h) = seeded_store();
        let t = Traverser::new(&store);
        let anc = t.ancestors(&f.id).unwrap();
        assert_eq!(anc.len(), 1);
        assert_eq!(anc[0].kind, NodeKind::File);
        let ids: HashSet<_> = anc.iter().map(|n| n.id.clone()).collect();
        assert_eq!(ids.len(), anc.len());
    }

    #[test]
    fn impact_radius_includes_callers_and_their_files() {
        let (store, f, g, h) = seeded_store();
        let t = Traverser::new(&store);
        let sg = t.impact_radius(&h.id, 2).unwrap();
        assert!(sg.contains(&g.id));
        assert!(sg.contains(&f.id));
        // g's containing file arrives via its incoming contains edge.
        assert!(sg.contains(&NodeId::derive("b.ts")));
    }

    #[test]
    fn circular_dependencies_via_import_edges() {
        let mut store = Store::open_in_memory().unwrap();
        let fa = Node::file_node("a.ts", "typescript", 2);
        let fb = Node::file_node("b.ts", "typescript", 2);
        let fc = Node::file_node("c.ts", "typescript", 2);
        store.upsert_nodes(&[fa.clone(), fb.clone(), fc.clone()]).unwrap();
        store
            .insert_edges(&[
                Edge::new(fa.id.clone(), fb.id.clone(), EdgeKind::Imports).at(1, 0),
                Edge::new(fb.id.clone(), fa.id.clone(), EdgeKind::Imports).at(1, 0),
                Edge::new(fb.id.clone(), fc.id.clone(), EdgeKind::Imports).at(2, 0),
            ])
            .unwrap();
        let t = Traverser::new(&store);
        let cycles = t.find_circular_dependencies().unwrap();
        assert_eq!(cycles, vec![vec!["a.ts".to_string(), "b.ts".to_string()]]);
    }

    #[test]
    fn dead_code_finds_uncalled_functions() {
        let mut store = Store::open_in_memory().unwrap();
        let used = node("a.ts::used", NodeKind::Function, "a.ts");
        let dead = node("a.ts::dead", NodeKind::Function, "a.ts");
        let caller = node("b.ts::caller", NodeKind::Function, "b.ts");
        store
            .upsert_nodes(&[used.clone(), dead.clone(), caller.clone()])
            .unwrap();
        store
            .insert_edges(&[Edge::new(caller.id.clone(), used.id.clone(), EdgeKind::Calls)])
            .unwrap();
        let t = Traverser::new(&store);
        let found = t.find_dead_code(None).unwrap();
        let names: Vec<_> = found.iter().map(|n| n.name.as_str()).collect();
        assert!(names.contains(&"dead"));
        assert!(names.contains(&"caller")); // nothing calls the caller
        assert!(!names.contains(&"used"));
    }

    #[test]
    fn file_dependencies_project_to_paths() {
        let mut store = Store::open_in_memory().unwrap();
        let fa = Node::file_node("a.ts", "typescript", 2);
        let fb = Node::file_node("b.ts", "typescript", 2);
        store.upsert_nodes(&[fa.clone(), fb.clone()]).unwrap();
        store
            .insert_edges(&[Edge::new(fb.id.clone(), fa.id.clone(), EdgeKind::Imports)])
            .unwrap();
        let t = Traverser::new(&store);
        assert_eq!(t.file_dependencies("b.ts").unwrap(), vec!["a.ts".to_string()]);
        assert_eq!(t.file_dependents("a.ts").unwrap(), vec!["b.ts".to_string()]);
        assert!(t.file_dependencies("a.ts").unwrap().is_empty());
    }

    #[test]
    fn type_hierarchy_walks_both_directions() {
        let mut store = Store::open_in_memory().unwrap();
        let base = node("a.ts::Base", NodeKind::Class, "a.ts");
        let mid = node("a.ts::Mid", NodeKind::Class, "a.ts");
        let leaf = node("a.ts::Leaf", NodeKind::Class, "a.ts");
        store
            .upsert_nodes(&[base.clone(), mid.clone(), leaf.clone()])
            .unwrap();
        store
            .insert_edges(&[
                Edge::new(mid.id.clone(), base.id.clone(), EdgeKind::Extends),
                Edge::new(leaf.id.clone(), mid.id.clone(), EdgeKind::Extends),
            ])
            .unwrap();
        let t = Traverser::new(&store);
        let sg = t.type_hierarchy(&mid.id).unwrap();
        assert!(sg.contains(&base.id));
        assert!(sg.contains(&leaf.id));
    }
}
