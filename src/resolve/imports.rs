//! Regex-based per-language import mapping, cached per file by the
//! resolver. Bindings map a local name to the module specifier (and the
//! original exported name when aliased).

use regex::Regex;
use std::collections::{HashMap, HashSet};

use crate::languages::path::resolve_relative;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportBinding {
    pub module: String,
    /// Original exported name when the binding renames (`b as c`), the
    /// binding name itself for plain named imports, `None` for default
    /// and namespace imports.
    pub imported: Option<String>,
}

pub type ImportMap = HashMap<String, ImportBinding>;

/// Alias prefixes rewritten to project-root-relative paths.
const ALIAS_PREFIXES: &[(&str, &str)] = &[
    ("@/", "src/"),
    ("~/", "src/"),
    ("@src/", "src/"),
    ("src/", "src/"),
    ("app/", "app/"),
];

pub fn imports_for(language: &str, path: &str, source: &str) -> ImportMap {
    match language {
        "typescript" | "tsx" | "javascript" | "svelte" => ecma_imports(path, source),
        "python" => python_imports(source),
        "rust" => rust_imports(source),
        _ => ImportMap::new(),
    }
}

fn ecma_imports(path: &str, source: &str) -> ImportMap {
    let re_import =
        Regex::new(r#"(?m)^\s*import\s+(?:type\s+)?(.+?)\s+from\s+['"]([^'"]+)['"]"#).unwrap();
    let re_require = Regex::new(
        r#"(?m)^\s*(?:const|let|var)\s+([A-Za-z_$][\w$]*)\s*=\s*require\s*\(\s*['"]([^'"]+)['"]\s*\)"#,
    )
    .unwrap();
    let mut map = ImportMap::new();
    for caps in re_import.captures_iter(source) {
        let clause = caps.get(1).unwrap().as_str();
        let module = resolve_relative(path, caps.get(2).unwrap().as_str());
        bind_clause(clause, &module, &mut map);
    }
    for caps in re_require.captures_iter(source) {
        let local = caps.get(1).unwrap().as_str();
        let module = resolve_relative(path, caps.get(2).unwrap().as_str());
        map.insert(
            local.to_string(),
            ImportBinding {
                module,
                imported: None,
            },
        );
    }
    map
}

fn bind_clause(clause: &str, module: &str, map: &mut ImportMap) {
    let clause = clause.trim();
    let (head, braced) = match clause.find('{') {
        Some(pos) => (
            clause[..pos].trim_end_matches(',').trim(),
            Some(clause[pos + 1..].trim_end_matches('}').trim()),
        ),
        None => (clause, None),
    };
    if let Some(ns) = head.strip_prefix("* as ") {
        map.insert(
            ns.trim().to_string(),
            ImportBinding {
                module: module.to_string(),
                imported: None,
            },
        );
    } else if !head.is_empty() {
        map.insert(
            head.to_string(),
            ImportBinding {
                module: module.to_string(),
                imported: None,
            },
        );
    }
    if let Some(inner) = braced {
        for part in inner.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let (orig, local) = match part.split_once(" as ") {
                Some((o, a)) => (o.trim(), a.trim()),
                None => (part, part),
            };
            map.insert(
                local.to_string(),
                ImportBinding {
                    module: module.to_string(),
                    imported: Some(orig.to_string()),
                },
            );
        }
    }
}

fn python_imports(source: &str) -> ImportMap {
    let re_import =
        Regex::new(r"(?m)^\s*import\s+([A-Za-z_][\w.]*)(?:\s+as\s+([A-Za-z_]\w*))?").unwrap();
    let re_from =
        Regex::new(r"(?m)^\s*from\s+(\.*[A-Za-z_][\w.]*|\.+)\s+import\s+(.+)$").unwrap();
    let mut map = ImportMap::new();
    for caps in re_import.captures_iter(source) {
        let module = caps.get(1).unwrap().as_str();
        let local = caps
            .get(2)
            .map(|m| m.as_str())
            .unwrap_or_else(|| module.split('.').next().unwrap_or(module));
        map.insert(
            local.to_string(),
            ImportBinding {
                module: module.replace('.', "/"),
                imported: None,
            },
        );
    }
    for caps in re_from.captures_iter(source) {
        let module = py_module(caps.get(1).unwrap().as_str());
        for part in caps.get(2).unwrap().as_str().split(',') {
            let part = part.trim().trim_matches(['(', ')']).trim();
            if part.is_empty() || part == "*" {
                continue;
            }
            let (orig, local) = match part.split_once(" as ") {
                Some((o, a)) => (o.trim(), a.trim()),
                None => (part, part),
            };
            map.insert(
                local.to_string(),
                ImportBinding {
                    module: module.clone(),
                    imported: Some(orig.to_string()),
                },
            );
        }
    }
    map
}

fn py_module(module: &str) -> String {
    let dots = module.len() - module.trim_start_matches('.').len();
    let rest = module.trim_start_matches('.').replace('.', "/");
    match dots {
        0 => rest,
        1 => format!("./{rest}"),
        n => format!("{}{rest}", "../".repeat(n - 1)),
    }
}

fn rust_imports(source: &str) -> ImportMap {
    let re_use = Regex::new(r"(?m)^\s*(?:pub\s+)?use\s+([^;{]+?)(?:\s+as\s+([A-Za-z_]\w*))?\s*;").unwrap();
    let mut map = ImportMap::new();
    for caps in re_use.captures_iter(source) {
        let spec = caps.get(1).unwrap().as_str().trim();
        let local = caps
            .get(2)
            .map(|m| m.as_str())
            .unwrap_or_else(|| spec.rsplit("::").next().unwrap_or(spec));
        if local.is_empty() || local == "*" || spec.ends_with("::") {
            continue;
        }
        map.insert(
            local.to_string(),
            ImportBinding {
                module: spec.to_string(),
                imported: None,
            },
        );
    }
    map
}

/// Per-language extension search order for resolving a specifier to a
/// known file, including index-file conventions.
fn extension_candidates(language: &str) -> &'static [&'static str] {
    match language {
        "typescript" | "tsx" => &[
            ".ts", ".tsx", ".d.ts", ".js", ".jsx", "/index.ts", "/index.tsx", "/index.js",
        ],
        "javascript" => &[".js", ".jsx", ".mjs", ".cjs", ".ts", "/index.js", "/index.ts"],
        "svelte" => &[".svelte", ".ts", ".js", "/index.ts", "/index.js"],
        "python" => &[".py", "/__init__.py"],
        _ => &[],
    }
}

/// Resolve a module specifier to a known file path, honoring alias
/// prefixes and the per-language extension search order. Bare package
/// specifiers that match nothing resolve to `None`.
pub fn resolve_specifier(
    specifier: &str,
    language: &str,
    known_files: &HashSet<String>,
) -> Option<String> {
    if language == "rust" {
        return resolve_rust_path(specifier, known_files);
    }
    let mut base = specifier.trim().trim_start_matches("./").to_string();
    for (alias, replacement) in ALIAS_PREFIXES {
        if let Some(rest) = base.strip_prefix(alias) {
            base = format!("{replacement}{rest}");
            break;
        }
    }
    if known_files.contains(&base) {
        return Some(base);
    }
    for ext in extension_candidates(language) {
        let cand = format!("{base}{ext}");
        if known_files.contains(&cand) {
            return Some(cand);
        }
    }
    None
}

fn resolve_rust_path(spec: &str, known_files: &HashSet<String>) -> Option<String> {
    let path = spec
        .trim_start_matches("crate::")
        .trim_start_matches("self::")
        .replace("::", "/");
    for cand in [
        format!("{path}.rs"),
        format!("{path}/mod.rs"),
        format!("src/{path}.rs"),
        format!("src/{path}/mod.rs"),
    ] {
        if known_files.contains(&cand) {
            return Some(cand);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ecma_bindings() {
        let src = "import Default, { a, b as c } from './mod';\nimport * as ns from '../lib/x';\nconst u = require('./util');\n";
        let m = imports_for("typescript", "src/app/main.ts", src);
        assert_eq!(m["a"].module, "src/app/mod");
        assert_eq!(m["a"].imported.as_deref(), Some("a"));
        assert_eq!(m["c"].imported.as_deref(), Some("b"));
        assert_eq!(m["Default"].imported, None);
        assert_eq!(m["ns"].module, "src/lib/x");
        assert_eq!(m["u"].module, "src/app/util");
    }

    #[test]
    fn python_bindings() {
        let src = "import os.path as osp\nfrom .util import fmt, helper as h\n";
        let m = imports_for("python", "pkg/m.py", src);
        assert_eq!(m["osp"].module, "os/path");
        assert_eq!(m["fmt"].module, "./util");
        assert_eq!(m["h"].imported.as_deref(), Some("helper"));
    }

    #[test]
    fn rust_bindings() {
        let src = "use crate::store::Store;\nuse std::fmt as f;\n";
        let m = imports_for("rust", "src/lib.rs", src);
        assert_eq!(m["Store"].module, "crate::store::Store");
        assert_eq!(m["f"].module, "std::fmt");
    }

    #[test]
    fn specifier_resolution_with_aliases_and_extensions() {
        let known: HashSet<String> = [
            "src/lib/date.ts",
            "src/components/Button.tsx",
            "app/routes/home.ts",
            "src/util/index.ts",
            "pkg/util.py",
            "src/store.rs",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        assert_eq!(
            resolve_specifier("@/lib/date", "typescript", &known).as_deref(),
            Some("src/lib/date.ts")
        );
        assert_eq!(
            resolve_specifier("~/components/Button", "tsx", &known).as_deref(),
            Some("src/components/Button.tsx")
        );
        assert_eq!(
            resolve_specifier("app/routes/home", "typescript", &known).as_deref(),
            Some("app/routes/home.ts")
        );
        assert_eq!(
            resolve_specifier("src/util", "typescript", &known).as_deref(),
            Some("src/util/index.ts")
        );
        assert_eq!(
            resolve_specifier("pkg/util", "python", &known).as_deref(),
            Some("pkg/util.py")
        );
        assert_eq!(
            resolve_specifier("crate::store", "rust", &known).as_deref(),
            Some("src/store.rs")
        );
        assert_eq!(resolve_specifier("lodash", "typescript", &known), None);
    }
}
