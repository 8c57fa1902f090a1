use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use crate::error::Result;
use crate::index::CancelToken;
use crate::ir::reference::{Edge, EdgeKind, Provenance, UnresolvedRef};
use crate::ir::{Node, NodeId, NodeKind};
use crate::store::Store;

pub mod builtins;
pub mod frameworks;
pub mod imports;

use frameworks::{FrameworkResolver, ProjectContext};
use imports::{ImportMap, imports_for, resolve_specifier};

const BATCH: usize = 256;

/// In-memory indexes over all persisted nodes. Built once per resolver
/// run; one full scan buys O(1) lookups on the hot path. Owned by a
/// single resolver instance.
pub struct ResolverCaches {
    pub nodes: Vec<Node>,
    pub by_name: HashMap<String, Vec<usize>>,
    pub by_qualified: HashMap<String, usize>,
    pub by_lower: HashMap<String, Vec<usize>>,
    pub by_kind: HashMap<NodeKind, Vec<usize>>,
    pub by_id: HashMap<NodeId, usize>,
    /// Known repo-relative file paths.
    pub files: HashSet<String>,
}

impl ResolverCaches {
    pub fn build(nodes: Vec<Node>) -> Self {
        let mut by_name: HashMap<String, Vec<usize>> = HashMap::new();
        let mut by_qualified = HashMap::new();
        let mut by_lower: HashMap<String, Vec<usize>> = HashMap::new();
        let mut by_kind: HashMap<NodeKind, Vec<usize>> = HashMap::new();
        let mut by_id = HashMap::new();
        let mut files = HashSet::new();
        for (i, n) in nodes.iter().enumerate() {
            by_name.entry(n.name.clone()).or_default().push(i);
            by_qualified.insert(n.qualified_name.clone(), i);
            by_lower
                .entry(n.name.to_lowercase())
                .or_default()
                .push(i);
            by_kind.entry(n.kind).or_default().push(i);
            by_id.insert(n.id.clone(), i);
            files.insert(n.file.clone());
        }
        Self {
            nodes,
            by_name,
            by_qualified,
            by_lower,
            by_kind,
            by_id,
            files,
        }
    }
}

#[derive(Debug, Clone, Serialize, Default, PartialEq)]
pub struct ResolveReport {
    pub total: usize,
    pub resolved: usize,
    pub filtered: usize,
    pub unresolved: usize,
    pub edges_inserted: usize,
    pub cancelled: bool,
}

#[derive(Debug, Clone)]
struct Resolution {
    target: NodeId,
    confidence: f64,
    resolved_by: String,
    provenance: Provenance,
}

enum Outcome {
    Filtered,
    Resolved(Resolution),
    Unresolved,
}

/// Multi-strategy reference resolver. Strategy order: builtin filter,
/// framework resolvers (short-circuit at confidence >= 0.9), imports,
/// qualified name, method-call pattern, exact name, fuzzy. Among
/// results the highest confidence wins; ties keep the earlier strategy.
pub struct Resolver<'a> {
    root: PathBuf,
    frameworks: &'a [Box<dyn FrameworkResolver>],
    /// Explicit enable list from config; `None` means auto-detect.
    enabled: Option<Vec<String>>,
}

impl<'a> Resolver<'a> {
    pub fn new(
        root: PathBuf,
        frameworks: &'a [Box<dyn FrameworkResolver>],
        enabled: Option<Vec<String>>,
    ) -> Self {
        Self {
            root,
            frameworks,
            enabled,
        }
    }

    pub fn run(
        &self,
        store: &mut Store,
        progress: Option<&dyn Fn(usize, usize)>,
        cancel: &CancelToken,
    ) -> Result<ResolveReport> {
        let caches = ResolverCaches::build(store.all_nodes()?);
        let ctx = ProjectContext::load(&self.root);
        let detected: Vec<&Box<dyn FrameworkResolver>> = self
            .frameworks
            .iter()
            .filter(|fw| match &self.enabled {
                Some(list) => list.iter().any(|n| n == fw.name()),
                None => fw.detect(&ctx, &caches),
            })
            .collect();
        if !detected.is_empty() {
            log::debug!(
                "frameworks active: {}",
                detected.iter().map(|f| f.name()).collect::<Vec<_>>().join(", ")
            );
        }

        // Framework-contributed nodes (e.g. filesystem routes).
        for fw in &detected {
            let extra = fw.extra_nodes(&ctx, &caches);
            if !extra.is_empty() {
                log::info!("{}: {} synthesized nodes", fw.name(), extra.len());
                store.upsert_nodes(&extra)?;
            }
        }

        let urefs = store.list_unresolved()?;
        let mut report = ResolveReport {
            total: urefs.len(),
            ..Default::default()
        };
        let step = (urefs.len() / 100).max(1);
        let mut import_cache: HashMap<String, ImportMap> = HashMap::new();
        let mut pending: Vec<Edge> = Vec::new();

        for (i, r) in urefs.iter().enumerate() {
            if i % BATCH == 0 {
                if cancel.is_cancelled() {
                    report.cancelled = true;
                    break;
                }
                if !pending.is_empty() {
                    report.edges_inserted += store.insert_edges(&pending)?;
                    pending.clear();
                }
            }
            match self.resolve_one(r, &caches, &detected, &mut import_cache) {
                Outcome::Filtered => report.filtered += 1,
                Outcome::Unresolved => report.unresolved += 1,
                Outcome::Resolved(res) => {
                    report.resolved += 1;
                    pending.push(materialize(r, res));
                }
            }
            if i % step == 0 {
                if let Some(cb) = progress {
                    cb(i, report.total);
                }
            }
        }
        if !pending.is_empty() {
            report.edges_inserted += store.insert_edges(&pending)?;
        }
        if let Some(cb) = progress {
            cb(report.total, report.total);
        }
        Ok(report)
    }

    fn resolve_one(
        &self,
        r: &UnresolvedRef,
        caches: &ResolverCaches,
        detected: &[&Box<dyn FrameworkResolver>],
        import_cache: &mut HashMap<String, ImportMap>,
    ) -> Outcome {
        if builtins::is_builtin(&r.language, &r.name) {
            return Outcome::Filtered;
        }

        let mut best: Option<Resolution> = None;
        let consider = |res: Option<Resolution>, best: &mut Option<Resolution>| {
            if let Some(res) = res {
                let replace = best
                    .as_ref()
                    .map(|b| res.confidence > b.confidence + 1e-9)
                    .unwrap_or(true);
                if replace {
                    *best = Some(res);
                }
            }
        };

        for fw in detected {
            if let Some(m) = fw.resolve(r, caches) {
                let res = Resolution {
                    target: m.target,
                    confidence: m.confidence,
                    resolved_by: m.resolved_by,
                    provenance: Provenance::Heuristic,
                };
                let short_circuit = res.confidence >= 0.9;
                consider(Some(res), &mut best);
                if short_circuit {
                    return Outcome::Resolved(best.unwrap());
                }
            }
        }

        consider(self.import_strategy(r, caches, import_cache), &mut best);
        consider(qualified_strategy(r, caches), &mut best);
        consider(method_call_strategy(r, caches), &mut best);
        consider(exact_name_strategy(r, caches), &mut best);
        consider(fuzzy_strategy(r, caches), &mut best);

        match best {
            Some(res) => Outcome::Resolved(res),
            None => Outcome::Unresolved,
        }
    }

    fn import_strategy(
        &self,
        r: &UnresolvedRef,
        caches: &ResolverCaches,
        import_cache: &mut HashMap<String, ImportMap>,
    ) -> Option<Resolution> {
        // Module-level imports: the reference name is the specifier
        // (candidates carry the importer-relative form) and the target
        // is the imported file's node.
        if r.kind == EdgeKind::Imports {
            let target_path = r
                .candidates
                .iter()
                .map(String::as_str)
                .chain(std::iter::once(r.name.as_str()))
                .find_map(|spec| resolve_specifier(spec, &r.language, &caches.files))?;
            let idx = caches.by_qualified.get(&target_path)?;
            return Some(Resolution {
                target: caches.nodes[*idx].id.clone(),
                confidence: 0.9,
                resolved_by: "import".into(),
                provenance: Provenance::StaticIndex,
            });
        }

        let map = import_cache.entry(r.file.clone()).or_insert_with(|| {
            match std::fs::read_to_string(self.root.join(&r.file)) {
                Ok(src) => imports_for(&r.language, &r.file, &src),
                Err(_) => ImportMap::new(),
            }
        });
        let binding = map.get(&r.name)?;
        let target_file = resolve_specifier(&binding.module, &r.language, &caches.files)?;
        let symbol = binding.imported.clone().unwrap_or_else(|| r.name.clone());
        let idx = caches
            .by_name
            .get(&symbol)?
            .iter()
            .filter(|&&i| caches.nodes[i].file == target_file && caches.nodes[i].kind != NodeKind::Import)
            .max_by_key(|&&i| caches.nodes[i].exported)?;
        Some(Resolution {
            target: caches.nodes[*idx].id.clone(),
            confidence: 0.9,
            resolved_by: "import".into(),
            provenance: Provenance::StaticIndex,
        })
    }
}

fn materialize(r: &UnresolvedRef, res: Resolution) -> Edge {
    Edge {
        source: r.source.clone(),
        target: res.target,
        kind: r.kind,
        line: Some(r.line),
        column: Some(r.column),
        metadata: Some(serde_json::json!({
            "confidence": res.confidence,
            "resolvedBy": res.resolved_by,
        })),
        provenance: res.provenance,
    }
}

/// Exact qualified-name match (0.95) or suffix match (0.85) against the
/// reference's candidate qualified names.
fn qualified_strategy(r: &UnresolvedRef, caches: &ResolverCaches) -> Option<Resolution> {
    for cand in &r.candidates {
        if let Some(&idx) = caches.by_qualified.get(cand) {
            if caches.nodes[idx].id != r.source {
                return Some(Resolution {
                    target: caches.nodes[idx].id.clone(),
                    confidence: 0.95,
                    resolved_by: "qualified_name".into(),
                    provenance: Provenance::Heuristic,
                });
            }
        }
    }
    let same_name = caches.by_name.get(&r.name)?;
    for cand in &r.candidates {
        let tail = cand.replace("::", ".");
        if tail.is_empty() {
            continue;
        }
        let hit = same_name.iter().find(|&&i| {
            let q = &caches.nodes[i].qualified_name;
            caches.nodes[i].id != r.source
                && (q.ends_with(&format!("::{tail}")) || q.ends_with(&format!(".{tail}")))
        });
        if let Some(&idx) = hit {
            return Some(Resolution {
                target: caches.nodes[idx].id.clone(),
                confidence: 0.85,
                resolved_by: "qualified_suffix".into(),
                provenance: Provenance::Heuristic,
            });
        }
    }
    None
}

/// `Class.method` / `Class::method` call patterns.
fn method_call_strategy(r: &UnresolvedRef, caches: &ResolverCaches) -> Option<Resolution> {
    let same_name = caches.by_name.get(&r.name)?;
    for cand in &r.candidates {
        let Some((recv, meth)) = cand.split_once("::").or_else(|| cand.split_once('.')) else {
            continue;
        };
        if meth != r.name || recv.is_empty() {
            continue;
        }
        let suffix = format!("{recv}.{meth}");
        let hit = same_name
            .iter()
            .filter(|&&i| {
                caches.nodes[i].id != r.source
                    && caches.nodes[i].kind == NodeKind::Method
                    && (caches.nodes[i].qualified_name.ends_with(&format!("::{suffix}"))
                        || caches.nodes[i].qualified_name.ends_with(&format!(".{suffix}")))
            })
            .max_by_key(|&&i| caches.nodes[i].file == r.file);
        if let Some(&idx) = hit {
            return Some(Resolution {
                target: caches.nodes[idx].id.clone(),
                confidence: 0.85,
                resolved_by: "method_call".into(),
                provenance: Provenance::Heuristic,
            });
        }
    }
    None
}

/// Exact-name match: single candidate scores 0.90, multi-candidate
/// disambiguation scores 0.70.
fn exact_name_strategy(r: &UnresolvedRef, caches: &ResolverCaches) -> Option<Resolution> {
    let cands: Vec<usize> = caches
        .by_name
        .get(&r.name)?
        .iter()
        .copied()
        .filter(|&i| {
            let n = &caches.nodes[i];
            n.id != r.source && !matches!(n.kind, NodeKind::File | NodeKind::Import)
        })
        .collect();
    match cands.as_slice() {
        [] => None,
        [only] => Some(Resolution {
            target: caches.nodes[*only].id.clone(),
            confidence: 0.9,
            resolved_by: "exact_name".into(),
            provenance: Provenance::Heuristic,
        }),
        many => {
            let best = many
                .iter()
                .max_by_key(|&&i| disambiguation_score(r, &caches.nodes[i]))?;
            Some(Resolution {
                target: caches.nodes[*best].id.clone(),
                confidence: 0.7,
                resolved_by: "exact_name".into(),
                provenance: Provenance::Heuristic,
            })
        }
    }
}

/// Multi-candidate scoring: same file +100, same language +50, callable
/// kind for a calls edge +25, exported +10, proximity within the same
/// file up to +20 (inverse to line distance).
fn disambiguation_score(r: &UnresolvedRef, cand: &Node) -> i64 {
    let mut score = 0i64;
    if cand.file == r.file {
        score += 100;
        let dist = (cand.span.start_line as i64 - r.line as i64).abs();
        score += (20 - (dist / 10).min(19)).max(1);
    }
    if cand.language == r.language {
        score += 50;
    }
    if r.kind == EdgeKind::Calls && cand.kind.is_callable() {
        score += 25;
    }
    if cand.exported {
        score += 10;
    }
    score
}

/// Case-insensitive match over callable kinds only.
fn fuzzy_strategy(r: &UnresolvedRef, caches: &ResolverCaches) -> Option<Resolution> {
    let lower = r.name.to_lowercase();
    let best = caches
        .by_lower
        .get(&lower)?
        .iter()
        .filter(|&&i| {
            let n = &caches.nodes[i];
            n.id != r.source && n.name != r.name && n.kind.is_callable()
        })
        .max_by_key(|&&i| disambiguation_score(r, &caches.nodes[i]))?;
    Some(Resolution {
        target: caches.nodes[*best].id.clone(),
        confidence: 0.5,
        resolved_by: "fuzzy".into(),
        provenance: Provenance::Heuristic,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Span;
    use crate::resolve::frameworks::default_frameworks;

    fn node(qname: &str, kind: NodeKind, file: &str, lang: &str) -> Node {
        let name = qname
            .rsplit("::")
            .next()
            .unwrap()
            .rsplit('.')
            .next()
            .unwrap()
            .to_string();
        Node::new(kind, name, qname, file, lang, Span::lines(1, 3))
    }

    fn uref(name: &str, kind: EdgeKind, file: &str, lang: &str) -> UnresolvedRef {
        UnresolvedRef {
            source: NodeId::derive(&format!("{file}")),
            name: name.into(),
            kind,
            line: 5,
            column: 0,
            file: file.into(),
            language: lang.into(),
            candidates: vec![],
        }
    }

    #[test]
    fn exact_name_single_candidate() {
        let target = node("src/a.ts::helper", NodeKind::Function, "src/a.ts", "typescript");
        let caches = ResolverCaches::build(vec![target.clone()]);
        let r = uref("helper", EdgeKind::Calls, "src/b.ts", "typescript");
        let res = exact_name_strategy(&r, &caches).unwrap();
        assert_eq!(res.target, target.id);
        assert!((res.confidence - 0.9).abs() < 1e-9);
    }

    #[test]
    fn exact_name_disambiguates_by_file_and_kind() {
        let far = node("lib/x.py::helper", NodeKind::Function, "lib/x.py", "python");
        let near = node("src/b.ts::helper", NodeKind::Function, "src/b.ts", "typescript");
        let caches = ResolverCaches::build(vec![far, near.clone()]);
        let r = uref("helper", EdgeKind::Calls, "src/b.ts", "typescript");
        let res = exact_name_strategy(&r, &caches).unwrap();
        assert_eq!(res.target, near.id);
        assert!((res.confidence - 0.7).abs() < 1e-9);
    }

    #[test]
    fn qualified_match_beats_suffix() {
        let target = node("src/util.ts::Fmt.pad", NodeKind::Method, "src/util.ts", "typescript");
        let caches = ResolverCaches::build(vec![target.clone()]);
        let mut r = uref("pad", EdgeKind::Calls, "src/b.ts", "typescript");
        r.candidates = vec!["src/util.ts::Fmt.pad".into()];
        let res = qualified_strategy(&r, &caches).unwrap();
        assert!((res.confidence - 0.95).abs() < 1e-9);

        r.candidates = vec!["Fmt::pad".into()];
        let res = qualified_strategy(&r, &caches).unwrap();
        assert!((res.confidence - 0.85).abs() < 1e-9);
        assert_eq!(res.resolved_by, "qualified_suffix");
    }

    #[test]
    fn method_call_pattern() {
        let target = node("src/svc.ts::Svc.save", NodeKind::Method, "src/svc.ts", "typescript");
        let decoy = node("src/other.ts::save", NodeKind::Function, "src/other.ts", "typescript");
        let caches = ResolverCaches::build(vec![target.clone(), decoy]);
        let mut r = uref("save", EdgeKind::Calls, "src/b.ts", "typescript");
        r.candidates = vec!["Svc.save".into()];
        let res = method_call_strategy(&r, &caches).unwrap();
        assert_eq!(res.target, target.id);
        assert!((res.confidence - 0.85).abs() < 1e-9);
    }

    #[test]
    fn fuzzy_applies_to_callable_kinds_only() {
        let f = node("src/a.ts::FormatDate", NodeKind::Function, "src/a.ts", "typescript");
        let v = node("src/a.ts::formatdateval", NodeKind::Variable, "src/a.ts", "typescript");
        let caches = ResolverCaches::build(vec![f.clone(), v]);
        let r = uref("formatdate", EdgeKind::Calls, "src/b.ts", "typescript");
        let res = fuzzy_strategy(&r, &caches).unwrap();
        assert_eq!(res.target, f.id);
        assert!((res.confidence - 0.5).abs() < 1e-9);

        let r2 = uref("formatdateval", EdgeKind::Calls, "src/b.ts", "typescript");
        assert!(fuzzy_strategy(&r2, &caches).is_none());
    }

    #[test]
    fn builtins_are_filtered_before_strategies() {
        let mut store = Store::open_in_memory().unwrap();
        let caller = node("src/b.ts", NodeKind::File, "src/b.ts", "typescript");
        store.upsert_nodes(std::slice::from_ref(&caller)).unwrap();
        store
            .insert_unresolved(&[UnresolvedRef {
                source: caller.id.clone(),
                name: "console".into(),
                kind: EdgeKind::Calls,
                line: 1,
                column: 0,
                file: "src/b.ts".into(),
                language: "typescript".into(),
                candidates: vec![],
            }])
            .unwrap();
        let fws = default_frameworks();
        let resolver = Resolver::new(PathBuf::from("."), &fws, Some(vec![]));
        let report = resolver.run(&mut store, None, &CancelToken::new()).unwrap();
        assert_eq!(report.filtered, 1);
        assert_eq!(report.resolved, 0);
        assert!(store.all_edges().unwrap().is_empty());
    }

    #[test]
    fn resolver_is_idempotent() {
        let mut store = Store::open_in_memory().unwrap();
        let file_b = node("src/b.ts", NodeKind::File, "src/b.ts", "typescript");
        let helper = node("src/a.ts::helper", NodeKind::Function, "src/a.ts", "typescript");
        store.upsert_nodes(&[file_b.clone(), helper.clone()]).unwrap();
        store
            .insert_unresolved(&[UnresolvedRef {
                source: file_b.id.clone(),
                name: "helper".into(),
                kind: EdgeKind::Calls,
                line: 2,
                column: 0,
                file: "src/b.ts".into(),
                language: "typescript".into(),
                candidates: vec![],
            }])
            .unwrap();
        let fws = default_frameworks();
        let resolver = Resolver::new(PathBuf::from("."), &fws, Some(vec![]));
        let r1 = resolver.run(&mut store, None, &CancelToken::new()).unwrap();
        assert_eq!(r1.resolved, 1);
        let edges_after_first = store.all_edges().unwrap();
        let r2 = resolver.run(&mut store, None, &CancelToken::new()).unwrap();
        assert_eq!(r2.resolved, 1);
        assert_eq!(r2.edges_inserted, 0);
        assert_eq!(store.all_edges().unwrap(), edges_after_first);
        // Unresolved refs remain as evidence.
        assert_eq!(store.list_unresolved().unwrap().len(), 1);
    }

    #[test]
    fn resolved_edges_carry_confidence_and_tag() {
        let mut store = Store::open_in_memory().unwrap();
        let file_b = node("src/b.ts", NodeKind::File, "src/b.ts", "typescript");
        let helper = node("src/a.ts::helper", NodeKind::Function, "src/a.ts", "typescript");
        store.upsert_nodes(&[file_b.clone(), helper]).unwrap();
        store
            .insert_unresolved(&[UnresolvedRef {
                source: file_b.id.clone(),
                name: "helper".into(),
                kind: EdgeKind::Calls,
                line: 2,
                column: 0,
                file: "src/b.ts".into(),
                language: "typescript".into(),
                candidates: vec![],
            }])
            .unwrap();
        let fws = default_frameworks();
        let resolver = Resolver::new(PathBuf::from("."), &fws, Some(vec![]));
        resolver.run(&mut store, None, &CancelToken::new()).unwrap();
        let edges = store.all_edges().unwrap();
        assert_eq!(edges.len(), 1);
        let c = edges[0].confidence().unwrap();
        assert!((0.0..=1.0).contains(&c));
        assert!(edges[0].resolved_by().is_some());
        assert_eq!(edges[0].provenance, Provenance::Heuristic);
    }
}
