use std::collections::HashSet;

use crate::ir::reference::{Edge, EdgeKind, UnresolvedRef};
use crate::ir::{FileRecord, Node, NodeId, NodeKind};
use crate::languages::{ParsedSource, RawSymbol, parser_for};

/// Everything extracted from one file. Applied to the store as a unit:
/// the file's previous nodes and incident edges are deleted and these are
/// inserted in the same transaction.
#[derive(Debug)]
pub struct FileBundle {
    pub record: FileRecord,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub unresolved: Vec<UnresolvedRef>,
}

#[derive(Debug, Default)]
pub struct Extraction {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub unresolved: Vec<UnresolvedRef>,
}

/// Extract nodes, intra-file `contains` edges and unresolved references
/// from one source file. Pure: the same input yields the same output,
/// including node ids.
pub fn extract_source(path: &str, source: &str, language: &str) -> Extraction {
    let line_count = source.lines().count() as u32;
    let file_node = Node::file_node(path, language, line_count);

    let parsed = match parser_for(language) {
        Some(p) => p.parse(path, source),
        None => ParsedSource::default(),
    };

    synthesize(path, language, file_node, parsed)
}

fn synthesize(
    path: &str,
    language: &str,
    file_node: Node,
    parsed: ParsedSource,
) -> Extraction {
    let symbols = parsed.symbols;

    // Parent of each symbol: the container hint when the parser supplied
    // one (Rust impl blocks), otherwise the innermost enclosing
    // container symbol by span nesting.
    let mut parents: Vec<Option<usize>> = vec![None; symbols.len()];
    for (i, sym) in symbols.iter().enumerate() {
        if let Some(hint) = &sym.container_hint {
            parents[i] = symbols.iter().position(|c| {
                &c.name == hint
                    && matches!(
                        c.kind,
                        NodeKind::Struct
                            | NodeKind::Class
                            | NodeKind::Enum
                            | NodeKind::Trait
                            | NodeKind::Interface
                    )
            });
            if parents[i].is_some() {
                continue;
            }
        }
        let mut best: Option<usize> = None;
        for (j, cand) in symbols.iter().enumerate() {
            if i == j || !cand.kind.is_container() || !cand.span.encloses(&sym.span) {
                continue;
            }
            best = match best {
                None => Some(j),
                Some(b) => {
                    let bs = &symbols[b].span;
                    if symbols[j].span.start_line > bs.start_line
                        || (symbols[j].span.start_line == bs.start_line
                            && symbols[j].span.end_line < bs.end_line)
                    {
                        Some(j)
                    } else {
                        Some(b)
                    }
                }
            };
        }
        parents[i] = best;
    }

    // Qualified names via the parent chain (hint containers that have no
    // symbol of their own still appear in the name).
    let mut qnames: Vec<String> = Vec::with_capacity(symbols.len());
    for (i, sym) in symbols.iter().enumerate() {
        let mut chain = vec![sym.name.clone()];
        if parents[i].is_none() {
            if let Some(hint) = &sym.container_hint {
                chain.insert(0, hint.clone());
            }
        }
        let mut cur = parents[i];
        let mut guard = 0;
        while let Some(p) = cur {
            chain.insert(0, symbols[p].name.clone());
            cur = parents[p];
            guard += 1;
            if guard > 64 {
                break;
            }
        }
        qnames.push(format!("{path}::{}", chain.join(".")));
    }

    let mut nodes = vec![file_node.clone()];
    let mut edges: Vec<Edge> = Vec::new();
    let mut node_ids: Vec<Option<NodeId>> = vec![None; symbols.len()];
    let mut seen: HashSet<NodeId> = HashSet::new();
    seen.insert(file_node.id.clone());

    for (i, sym) in symbols.iter().enumerate() {
        let kind = promote_kind(sym, parents[i].map(|p| &symbols[p]));
        let node = build_node(sym, kind, &qnames[i], path, language);
        if !seen.insert(node.id.clone()) {
            // Duplicate declaration (e.g. TS overload signatures): first
            // occurrence wins.
            continue;
        }
        node_ids[i] = Some(node.id.clone());
        nodes.push(node);
    }

    // Single `contains` parent per node.
    for (i, _) in symbols.iter().enumerate() {
        let Some(child_id) = node_ids[i].clone() else { continue };
        let parent_id = parents[i]
            .and_then(|p| node_ids[p].clone())
            .unwrap_or_else(|| file_node.id.clone());
        edges.push(Edge::new(parent_id, child_id, EdgeKind::Contains));
    }

    // Unresolved references, attributed to the innermost enclosing
    // container symbol; imports and orphans belong to the file node.
    let mut unresolved = Vec::new();
    for r in parsed.refs {
        let source = if r.kind == EdgeKind::Imports {
            file_node.id.clone()
        } else {
            enclosing_source(&symbols, &node_ids, &file_node, r.line)
        };
        let mut candidates = r.candidates.clone();
        if let Some(q) = &r.qualifier {
            let qual = format!("{q}::{}", r.name);
            if !candidates.contains(&qual) {
                candidates.push(qual);
            }
        }
        if r.kind == EdgeKind::Imports {
            // Resolve relative specifiers against the importing file so
            // the resolver can match them to known paths directly.
            let resolved = crate::languages::path::resolve_relative(path, &r.name);
            if resolved != r.name && !candidates.contains(&resolved) {
                candidates.insert(0, resolved);
            }
        }
        unresolved.push(UnresolvedRef {
            source,
            name: r.name,
            kind: r.kind,
            line: r.line,
            column: r.column,
            file: path.to_string(),
            language: language.to_string(),
            candidates,
        });
    }

    Extraction {
        nodes,
        edges,
        unresolved,
    }
}

fn promote_kind(sym: &RawSymbol, parent: Option<&RawSymbol>) -> NodeKind {
    if sym.kind == NodeKind::Function {
        if let Some(p) = parent {
            if matches!(
                p.kind,
                NodeKind::Class | NodeKind::Interface | NodeKind::Struct | NodeKind::Trait
            ) {
                return NodeKind::Method;
            }
        }
    }
    sym.kind
}

fn build_node(sym: &RawSymbol, kind: NodeKind, qname: &str, path: &str, language: &str) -> Node {
    let mut n = Node::new(kind, sym.name.clone(), qname, path, language, sym.span);
    n.doc = sym.doc.clone();
    n.signature = sym.signature.clone();
    n.visibility = sym.visibility.clone();
    n.exported = sym.exported;
    n.is_async = sym.is_async;
    n.is_static = sym.is_static;
    n.is_abstract = sym.is_abstract;
    n.decorators = sym.decorators.clone();
    n.type_params = sym.type_params.clone();
    n
}

fn enclosing_source(
    symbols: &[RawSymbol],
    node_ids: &[Option<NodeId>],
    file_node: &Node,
    line: u32,
) -> NodeId {
    let mut best: Option<usize> = None;
    for (i, s) in symbols.iter().enumerate() {
        if node_ids[i].is_none() || !s.kind.is_container() || !s.span.contains_line(line) {
            continue;
        }
        best = match best {
            None => Some(i),
            Some(b) => {
                if s.span.start_line > symbols[b].span.start_line {
                    Some(i)
                } else {
                    Some(b)
                }
            }
        };
    }
    best.and_then(|i| node_ids[i].clone())
        .unwrap_or_else(|| file_node.id.clone())
}
