use regex::Regex;

use crate::ir::reference::EdgeKind;
use crate::ir::{NodeKind, Span};
use crate::languages::util::{indent_block_end, indent_of};
use crate::languages::{LanguageParser, ParsedSource, RawRef, RawSymbol};

pub struct PythonParser;

impl PythonParser {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PythonParser {
    fn default() -> Self {
        Self::new()
    }
}

fn is_py_keyword(name: &str) -> bool {
    matches!(
        name,
        "if" | "elif"
            | "else"
            | "for"
            | "while"
            | "return"
            | "yield"
            | "lambda"
            | "with"
            | "assert"
            | "raise"
            | "except"
            | "def"
            | "class"
            | "not"
            | "and"
            | "or"
            | "in"
            | "is"
            | "del"
            | "print"
    )
}

impl LanguageParser for PythonParser {
    fn language(&self) -> &'static str {
        "python"
    }

    fn parse(&self, _path: &str, source: &str) -> ParsedSource {
        let re_class =
            Regex::new(r"^\s*class\s+([A-Za-z_]\w*)\s*(?:\(([^)]*)\))?\s*:").unwrap();
        let re_def =
            Regex::new(r"^\s*(async\s+)?def\s+([A-Za-z_]\w*)\s*\(").unwrap();
        let re_decorator = Regex::new(r"^\s*@([A-Za-z_][\w.]*)").unwrap();
        let re_import = Regex::new(r"^\s*import\s+([A-Za-z_][\w.]*)(?:\s+as\s+([A-Za-z_]\w*))?").unwrap();
        let re_from_import =
            Regex::new(r"^\s*from\s+(\.*[A-Za-z_][\w.]*|\.+)\s+import\s+(.+)$").unwrap();
        let re_const = Regex::new(r"^([A-Z][A-Z0-9_]*)\s*=").unwrap();
        let re_call = Regex::new(r"(?:^|[^.\w])([A-Za-z_]\w*)\s*\(").unwrap();
        let re_method_call = Regex::new(r"([A-Za-z_]\w*)\s*\.\s*([A-Za-z_]\w*)\s*\(").unwrap();

        let lines: Vec<&str> = source.lines().collect();
        let mut symbols: Vec<RawSymbol> = Vec::new();
        let mut refs: Vec<RawRef> = Vec::new();
        let mut pending_decorators: Vec<String> = Vec::new();

        for (idx, raw_line) in lines.iter().enumerate() {
            let line = *raw_line;
            let trimmed = line.trim();
            let ln = (idx as u32) + 1;
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            if let Some(caps) = re_decorator.captures(line) {
                let name = caps.get(1).unwrap().as_str();
                pending_decorators.push(name.to_string());
                let simple = name.rsplit('.').next().unwrap_or(name);
                refs.push(RawRef::new(
                    simple,
                    EdgeKind::Decorates,
                    ln,
                    caps.get(1).unwrap().start() as u32,
                ));
                continue;
            }
            let decorators = std::mem::take(&mut pending_decorators);

            if let Some(caps) = re_import.captures(line) {
                let module = caps.get(1).unwrap().as_str();
                let local = caps
                    .get(2)
                    .map(|m| m.as_str())
                    .unwrap_or_else(|| module.split('.').next().unwrap_or(module));
                refs.push(RawRef::new(
                    module.replace('.', "/"),
                    EdgeKind::Imports,
                    ln,
                    0,
                ));
                let mut s = RawSymbol::new(local, NodeKind::Import, Span::lines(ln, ln));
                s.span.end_col = line.len() as u32;
                symbols.push(s);
                continue;
            }
            if let Some(caps) = re_from_import.captures(line) {
                let module = caps.get(1).unwrap().as_str();
                refs.push(RawRef::new(
                    py_module_to_path(module),
                    EdgeKind::Imports,
                    ln,
                    0,
                ));
                for part in caps.get(2).unwrap().as_str().split(',') {
                    let part = part.trim().trim_matches(['(', ')']).trim();
                    if part.is_empty() || part == "*" {
                        continue;
                    }
                    let local = match part.split_once(" as ") {
                        Some((_, alias)) => alias.trim(),
                        None => part,
                    };
                    let mut s = RawSymbol::new(local, NodeKind::Import, Span::lines(ln, ln));
                    s.span.end_col = line.len() as u32;
                    symbols.push(s);
                }
                continue;
            }

            if let Some(caps) = re_class.captures(line) {
                let name = caps.get(1).unwrap().as_str();
                let end = indent_block_end(&lines, idx);
                let mut s = RawSymbol::new(
                    name,
                    NodeKind::Class,
                    Span {
                        start_line: ln,
                        start_col: indent_of(line) as u32,
                        end_line: (end as u32) + 1,
                        end_col: lines.get(end).map(|l| l.len() as u32).unwrap_or(0),
                    },
                );
                s.exported = !name.starts_with('_');
                s.decorators = decorators;
                s.doc = docstring_after(&lines, idx);
                if let Some(bases) = caps.get(2) {
                    for base in bases.as_str().split(',') {
                        let base = base.trim();
                        if base.is_empty() || base.starts_with("metaclass") {
                            continue;
                        }
                        let simple = base.rsplit('.').next().unwrap_or(base);
                        let mut r =
                            RawRef::new(simple, EdgeKind::Extends, ln, bases.start() as u32);
                        if base.contains('.') {
                            r.candidates = vec![base.to_string()];
                        }
                        refs.push(r);
                    }
                }
                symbols.push(s);
                continue;
            }
            if let Some(caps) = re_def.captures(line) {
                let name = caps.get(2).unwrap().as_str();
                let end = indent_block_end(&lines, idx);
                let mut s = RawSymbol::new(
                    name,
                    NodeKind::Function,
                    Span {
                        start_line: ln,
                        start_col: indent_of(line) as u32,
                        end_line: (end as u32) + 1,
                        end_col: lines.get(end).map(|l| l.len() as u32).unwrap_or(0),
                    },
                );
                s.is_async = caps.get(1).is_some();
                s.exported = !name.starts_with('_');
                s.is_static = decorators.iter().any(|d| d == "staticmethod");
                s.decorators = decorators;
                s.doc = docstring_after(&lines, idx);
                s.signature = Some(trimmed.trim_end_matches(':').to_string());
                symbols.push(s);
                continue;
            }
            if indent_of(line) == 0 {
                if let Some(caps) = re_const.captures(line) {
                    let mut s = RawSymbol::new(
                        caps.get(1).unwrap().as_str(),
                        NodeKind::Constant,
                        Span::lines(ln, ln),
                    );
                    s.span.end_col = line.len() as u32;
                    s.exported = true;
                    symbols.push(s);
                }
            }
        }

        // Call references.
        let decls_on_line: std::collections::HashSet<(u32, &str)> = symbols
            .iter()
            .map(|s| (s.span.start_line, s.name.as_str()))
            .collect();
        for (idx, raw_line) in lines.iter().enumerate() {
            let line = *raw_line;
            let trimmed = line.trim();
            let ln = (idx as u32) + 1;
            if trimmed.starts_with('#') || trimmed.starts_with("import ") || trimmed.starts_with("from ")
            {
                continue;
            }
            for caps in re_method_call.captures_iter(line) {
                let recv = caps.get(1).unwrap();
                let name = caps.get(2).unwrap();
                if is_py_keyword(name.as_str()) {
                    continue;
                }
                let mut r = RawRef::new(name.as_str(), EdgeKind::Calls, ln, name.start() as u32);
                r.is_method = true;
                r.receiver = Some(recv.as_str().to_string());
                r.candidates = vec![format!("{}.{}", recv.as_str(), name.as_str())];
                refs.push(r);
            }
            for caps in re_call.captures_iter(line) {
                let m = caps.get(1).unwrap();
                let name = m.as_str();
                if is_py_keyword(name) || decls_on_line.contains(&(ln, name)) {
                    continue;
                }
                let prefix = line[..m.start()].trim_end();
                if prefix.ends_with("def") || prefix.ends_with("class") {
                    continue;
                }
                refs.push(RawRef::new(name, EdgeKind::Calls, ln, m.start() as u32));
            }
        }

        ParsedSource { symbols, refs }
    }
}

/// `from .mod import x` -> `./mod`; `from a.b import x` -> `a/b`.
fn py_module_to_path(module: &str) -> String {
    let dots = module.len() - module.trim_start_matches('.').len();
    let rest = module.trim_start_matches('.').replace('.', "/");
    match dots {
        0 => rest,
        1 => format!("./{rest}"),
        n => format!("{}{rest}", "../".repeat(n - 1)),
    }
}

fn docstring_after(lines: &[&str], def_idx: usize) -> Option<String> {
    let next = lines.get(def_idx + 1)?.trim();
    let quoted = next.strip_prefix("\"\"\"").or_else(|| next.strip_prefix("'''"))?;
    let closed = quoted
        .strip_suffix("\"\"\"")
        .or_else(|| quoted.strip_suffix("'''"));
    match closed {
        Some(inner) if !inner.is_empty() => Some(inner.trim().to_string()),
        _ => {
            let t = quoted.trim();
            if t.is_empty() { None } else { Some(t.to_string()) }
        }
    }
}
