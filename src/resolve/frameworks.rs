//! Framework-specific resolution: each resolver detects its framework
//! from manifest files or marker file types, resolves references with
//! framework semantics, and may contribute synthesized nodes (e.g.
//! filesystem routes). The registry is fixed at startup.

use std::path::{Path, PathBuf};

use crate::ir::reference::UnresolvedRef;
use crate::ir::{Node, NodeId, NodeKind, Span};
use crate::resolve::ResolverCaches;
use crate::resolve::imports::resolve_specifier;

/// Manifest context handed to `detect`/`extra_nodes`.
#[derive(Debug, Default)]
pub struct ProjectContext {
    pub root: PathBuf,
    pub package_json: Option<serde_json::Value>,
    pub composer_json: Option<serde_json::Value>,
}

impl ProjectContext {
    pub fn load(root: &Path) -> Self {
        let read_json = |name: &str| -> Option<serde_json::Value> {
            let raw = std::fs::read_to_string(root.join(name)).ok()?;
            serde_json::from_str(&raw).ok()
        };
        Self {
            root: root.to_path_buf(),
            package_json: read_json("package.json"),
            composer_json: read_json("composer.json"),
        }
    }

    fn has_npm_dep(&self, name: &str) -> bool {
        let Some(pkg) = &self.package_json else {
            return false;
        };
        ["dependencies", "devDependencies", "peerDependencies"]
            .iter()
            .any(|k| {
                pkg.get(k)
                    .and_then(|d| d.as_object())
                    .map(|d| d.contains_key(name))
                    .unwrap_or(false)
            })
    }

    fn has_composer_dep(&self, name: &str) -> bool {
        let Some(pkg) = &self.composer_json else {
            return false;
        };
        ["require", "require-dev"].iter().any(|k| {
            pkg.get(k)
                .and_then(|d| d.as_object())
                .map(|d| d.contains_key(name))
                .unwrap_or(false)
        })
    }
}

#[derive(Debug, Clone)]
pub struct FrameworkMatch {
    pub target: NodeId,
    pub confidence: f64,
    pub resolved_by: String,
}

pub trait FrameworkResolver: Send + Sync {
    fn name(&self) -> &'static str;
    fn detect(&self, ctx: &ProjectContext, caches: &ResolverCaches) -> bool;
    fn resolve(&self, r: &UnresolvedRef, caches: &ResolverCaches) -> Option<FrameworkMatch>;
    fn extra_nodes(&self, _ctx: &ProjectContext, _caches: &ResolverCaches) -> Vec<Node> {
        Vec::new()
    }
}

/// Registration order is resolution order.
pub fn default_frameworks() -> Vec<Box<dyn FrameworkResolver>> {
    vec![
        Box::new(Svelte),
        Box::new(SvelteKit),
        Box::new(React),
        Box::new(Express),
        Box::new(Laravel),
    ]
}

// ── Svelte ─────────────────────────────────────────────────────────

const SVELTE_RUNES: &[&str] = &[
    "$state", "$derived", "$effect", "$props", "$bindable", "$inspect", "$host",
];

pub struct Svelte;

impl FrameworkResolver for Svelte {
    fn name(&self) -> &'static str {
        "svelte"
    }

    fn detect(&self, ctx: &ProjectContext, caches: &ResolverCaches) -> bool {
        ctx.has_npm_dep("svelte") || caches.files.iter().any(|f| f.ends_with(".svelte"))
    }

    fn resolve(&self, r: &UnresolvedRef, caches: &ResolverCaches) -> Option<FrameworkMatch> {
        if !r.name.starts_with('$') {
            return None;
        }
        // Compile-time runes resolve to a sentinel self-edge.
        if SVELTE_RUNES.contains(&r.name.as_str()) {
            return Some(FrameworkMatch {
                target: r.source.clone(),
                confidence: 1.0,
                resolved_by: "framework:svelte".into(),
            });
        }
        // `$foo` auto-subscribes to the store variable `foo`.
        let bare = &r.name[1..];
        let idx = caches
            .by_name
            .get(bare)?
            .iter()
            .filter(|&&i| {
                matches!(
                    caches.nodes[i].kind,
                    NodeKind::Variable | NodeKind::Constant
                )
            })
            .max_by_key(|&&i| (caches.nodes[i].file == r.file, caches.nodes[i].exported))?;
        Some(FrameworkMatch {
            target: caches.nodes[*idx].id.clone(),
            confidence: 0.95,
            resolved_by: "framework:svelte".into(),
        })
    }
}

// ── SvelteKit ──────────────────────────────────────────────────────

pub struct SvelteKit;

impl FrameworkResolver for SvelteKit {
    fn name(&self) -> &'static str {
        "sveltekit"
    }

    fn detect(&self, ctx: &ProjectContext, caches: &ResolverCaches) -> bool {
        ctx.has_npm_dep("@sveltejs/kit") || caches.files.iter().any(|f| f.starts_with("src/routes/"))
    }

    fn resolve(&self, r: &UnresolvedRef, caches: &ResolverCaches) -> Option<FrameworkMatch> {
        // `$lib/X` aliases `src/lib/X`.
        let rest = r.name.strip_prefix("$lib/")?;
        let target_path = resolve_specifier(&format!("src/lib/{rest}"), "svelte", &caches.files)?;
        let idx = caches.by_qualified.get(&target_path)?;
        Some(FrameworkMatch {
            target: caches.nodes[*idx].id.clone(),
            confidence: 0.95,
            resolved_by: "framework:sveltekit".into(),
        })
    }

    /// Synthesize `route` nodes from the filesystem routing convention.
    fn extra_nodes(&self, _ctx: &ProjectContext, caches: &ResolverCaches) -> Vec<Node> {
        let mut out = Vec::new();
        for file in &caches.files {
            let Some(rest) = file.strip_prefix("src/routes/") else {
                continue;
            };
            let Some((dir, leaf)) = rest.rsplit_once('/').map(|(d, l)| (d, l)).or(Some(("", rest)))
            else {
                continue;
            };
            if !(leaf.starts_with("+page.") || leaf.starts_with("+server.") || leaf.starts_with("+layout."))
            {
                continue;
            }
            let route = route_path(dir);
            let mut n = Node::new(
                NodeKind::Route,
                route.clone(),
                format!("{file}::route:{route}"),
                file.clone(),
                "svelte",
                Span::lines(1, 1),
            );
            n.exported = true;
            out.push(n);
        }
        out.sort_by(|a, b| a.qualified_name.cmp(&b.qualified_name));
        out
    }
}

fn route_path(dir: &str) -> String {
    let segments: Vec<String> = dir
        .split('/')
        .filter(|s| !s.is_empty() && !(s.starts_with('(') && s.ends_with(')')))
        .map(|s| {
            if s.starts_with('[') && s.ends_with(']') {
                format!(":{}", s.trim_matches(['[', ']']))
            } else {
                s.to_string()
            }
        })
        .collect();
    format!("/{}", segments.join("/"))
}

// ── React ──────────────────────────────────────────────────────────

pub struct React;

impl FrameworkResolver for React {
    fn name(&self) -> &'static str {
        "react"
    }

    fn detect(&self, ctx: &ProjectContext, _caches: &ResolverCaches) -> bool {
        ctx.has_npm_dep("react")
    }

    /// JSX component usage: `<Button />` resolves to the component's
    /// declaration, preferring exported candidates.
    fn resolve(&self, r: &UnresolvedRef, caches: &ResolverCaches) -> Option<FrameworkMatch> {
        if !r.name.chars().next().map(char::is_uppercase).unwrap_or(false) {
            return None;
        }
        let idx = caches
            .by_name
            .get(&r.name)?
            .iter()
            .filter(|&&i| {
                matches!(
                    caches.nodes[i].kind,
                    NodeKind::Function | NodeKind::Class | NodeKind::Component | NodeKind::Constant
                )
            })
            .max_by_key(|&&i| (caches.nodes[i].exported, caches.nodes[i].file == r.file))?;
        Some(FrameworkMatch {
            target: caches.nodes[*idx].id.clone(),
            confidence: 0.85,
            resolved_by: "framework:react".into(),
        })
    }
}

// ── Express ────────────────────────────────────────────────────────

pub struct Express;

const EXPRESS_VERBS: &[&str] = &["get", "post", "put", "delete", "patch", "all", "use", "listen"];

impl FrameworkResolver for Express {
    fn name(&self) -> &'static str {
        "express"
    }

    fn detect(&self, ctx: &ProjectContext, _caches: &ResolverCaches) -> bool {
        ctx.has_npm_dep("express")
    }

    /// `app.get(...)`/`router.post(...)` handler registrations resolve
    /// to the app/router binding in the same file.
    fn resolve(&self, r: &UnresolvedRef, caches: &ResolverCaches) -> Option<FrameworkMatch> {
        if !EXPRESS_VERBS.contains(&r.name.as_str()) {
            return None;
        }
        let receiver = r
            .candidates
            .iter()
            .find_map(|c| c.split_once('.').map(|(recv, _)| recv))
            .filter(|recv| matches!(*recv, "app" | "router" | "server"))?;
        let idx = caches
            .by_name
            .get(receiver)?
            .iter()
            .find(|&&i| caches.nodes[i].file == r.file)?;
        Some(FrameworkMatch {
            target: caches.nodes[*idx].id.clone(),
            confidence: 0.8,
            resolved_by: "framework:express".into(),
        })
    }
}

// ── Laravel ────────────────────────────────────────────────────────

pub struct Laravel;

const LARAVEL_FACADES: &[&str] = &[
    "DB", "Route", "Cache", "Log", "Auth", "Storage", "Queue", "Event", "Mail",
    "Session", "Config", "App", "Artisan", "Gate", "Hash", "Http", "Validator", "View",
];

impl FrameworkResolver for Laravel {
    fn name(&self) -> &'static str {
        "laravel"
    }

    fn detect(&self, ctx: &ProjectContext, _caches: &ResolverCaches) -> bool {
        ctx.has_composer_dep("laravel/framework")
    }

    /// Facade calls (`DB::table(...)`) resolve to the facade class node
    /// when one is indexed.
    fn resolve(&self, r: &UnresolvedRef, caches: &ResolverCaches) -> Option<FrameworkMatch> {
        let facade = r.candidates.iter().find_map(|c| {
            let (recv, _) = c.split_once(['.', ':'])?;
            LARAVEL_FACADES.contains(&recv).then_some(recv)
        })?;
        let idx = caches
            .by_name
            .get(facade)?
            .iter()
            .find(|&&i| caches.nodes[i].kind == NodeKind::Class)?;
        Some(FrameworkMatch {
            target: caches.nodes[*idx].id.clone(),
            confidence: 0.8,
            resolved_by: "framework:laravel".into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::reference::EdgeKind;

    fn caches_with(nodes: Vec<Node>) -> ResolverCaches {
        ResolverCaches::build(nodes)
    }

    fn uref(name: &str, kind: EdgeKind, file: &str) -> UnresolvedRef {
        UnresolvedRef {
            source: NodeId::derive(format!("{file}::caller").as_str()),
            name: name.into(),
            kind,
            line: 1,
            column: 0,
            file: file.into(),
            language: "svelte".into(),
            candidates: vec![],
        }
    }

    #[test]
    fn svelte_rune_is_sentinel_self_edge() {
        let caches = caches_with(vec![]);
        let r = uref("$state", EdgeKind::Calls, "src/App.svelte");
        let m = Svelte.resolve(&r, &caches).unwrap();
        assert_eq!(m.target, r.source);
        assert_eq!(m.confidence, 1.0);
    }

    #[test]
    fn svelte_store_subscription_resolves_variable() {
        let store_var = Node::new(
            NodeKind::Constant,
            "count",
            "src/stores.ts::count",
            "src/stores.ts",
            "typescript",
            Span::lines(1, 1),
        );
        let caches = caches_with(vec![store_var.clone()]);
        let r = uref("$count", EdgeKind::References, "src/App.svelte");
        let m = Svelte.resolve(&r, &caches).unwrap();
        assert_eq!(m.target, store_var.id);
        assert!((m.confidence - 0.95).abs() < 1e-9);
    }

    #[test]
    fn sveltekit_routes_from_filesystem() {
        let page = Node::file_node("src/routes/blog/[slug]/+page.svelte", "svelte", 1);
        let caches = caches_with(vec![page]);
        let nodes = SvelteKit.extra_nodes(&ProjectContext::default(), &caches);
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].kind, NodeKind::Route);
        assert_eq!(nodes[0].name, "/blog/:slug");
    }

    #[test]
    fn sveltekit_lib_alias() {
        let lib = Node::file_node("src/lib/date.ts", "typescript", 1);
        let caches = caches_with(vec![lib.clone()]);
        let r = uref("$lib/date", EdgeKind::Imports, "src/routes/+page.svelte");
        let m = SvelteKit.resolve(&r, &caches).unwrap();
        assert_eq!(m.target, lib.id);
    }

    #[test]
    fn route_path_strips_groups_and_maps_params() {
        assert_eq!(route_path("(app)/blog/[slug]"), "/blog/:slug");
        assert_eq!(route_path(""), "/");
    }

    #[test]
    fn express_registration_resolves_to_binding() {
        let mut app = Node::new(
            NodeKind::Constant,
            "app",
            "server.js::app",
            "server.js",
            "javascript",
            Span::lines(1, 1),
        );
        app.exported = false;
        let caches = caches_with(vec![app.clone()]);
        let mut r = uref("get", EdgeKind::Calls, "server.js");
        r.candidates = vec!["app.get".into()];
        let m = Express.resolve(&r, &caches).unwrap();
        assert_eq!(m.target, app.id);
    }
}
