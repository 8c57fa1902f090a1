use regex::Regex;

use crate::ir::reference::EdgeKind;
use crate::ir::{NodeKind, Span};
use crate::languages::util::{find_block_end, indent_of};
use crate::languages::{LanguageParser, ParsedSource, RawRef, RawSymbol, is_ecma_keyword};

/// Regex-based JavaScript parser: ES modules plus the CommonJS shapes
/// (`module.exports = ...`, `exports.name = ...`, `require(...)`).
pub struct JavaScriptParser;

impl JavaScriptParser {
    pub fn new() -> Self {
        Self
    }
}

impl Default for JavaScriptParser {
    fn default() -> Self {
        Self::new()
    }
}

impl LanguageParser for JavaScriptParser {
    fn language(&self) -> &'static str {
        "javascript"
    }

    fn parse(&self, _path: &str, source: &str) -> ParsedSource {
        let re_class = Regex::new(
            r"^\s*(?:export\s+)?(?:default\s+)?class\s+([A-Za-z_$][\w$]*)(?:\s+extends\s+([A-Za-z_$][\w$.]*))?",
        )
        .unwrap();
        let re_fn = Regex::new(
            r"^\s*(?:export\s+)?(?:default\s+)?(async\s+)?function\s*\*?\s*([A-Za-z_$][\w$]*)\s*\(",
        )
        .unwrap();
        let re_arrow = Regex::new(
            r"^\s*(?:export\s+)?(?:const|let|var)\s+([A-Za-z_$][\w$]*)\s*=\s*(async\s+)?(?:\([^)]*\)|[A-Za-z_$][\w$]*)\s*=>",
        )
        .unwrap();
        let re_var = Regex::new(r"^\s*(?:export\s+)?(const|let|var)\s+([A-Za-z_$][\w$]*)").unwrap();
        let re_method =
            Regex::new(r"^\s*(static\s+)?(async\s+)?(?:get\s+|set\s+)?\*?\s*([A-Za-z_$][\w$]*)\s*\([^)]*\)\s*\{")
                .unwrap();
        let re_import_from =
            Regex::new(r#"^\s*(?:import|export)\s+(.+?)\s+from\s+['"]([^'"]+)['"]"#).unwrap();
        let re_require =
            Regex::new(r#"(?:const|let|var)\s+([A-Za-z_$][\w$]*)\s*=\s*require\s*\(\s*['"]([^'"]+)['"]\s*\)"#)
                .unwrap();
        let re_require_bare = Regex::new(r#"require\s*\(\s*['"]([^'"]+)['"]\s*\)"#).unwrap();
        let re_module_exports_fn =
            Regex::new(r"^\s*module\.exports\s*=\s*(async\s+)?function\s*\*?\s*([A-Za-z_$][\w$]*)?\s*\(")
                .unwrap();
        let re_exports_member = Regex::new(
            r"^\s*(?:module\.)?exports\.([A-Za-z_$][\w$]*)\s*=\s*(async\s+)?(?:function|\()",
        )
        .unwrap();

        let lines: Vec<&str> = source.lines().collect();
        let mut symbols: Vec<RawSymbol> = Vec::new();
        let mut refs: Vec<RawRef> = Vec::new();
        let mut class_ranges: Vec<(usize, usize)> = Vec::new();

        for (idx, raw_line) in lines.iter().enumerate() {
            let line = *raw_line;
            let trimmed = line.trim();
            let ln = (idx as u32) + 1;
            if trimmed.is_empty() || trimmed.starts_with("//") || trimmed.starts_with('*') {
                continue;
            }
            let exported = trimmed.starts_with("export ");

            if let Some(caps) = re_import_from.captures(line) {
                refs.push(RawRef::new(
                    caps.get(2).unwrap().as_str(),
                    EdgeKind::Imports,
                    ln,
                    0,
                ));
                if trimmed.starts_with("import") {
                    for local in import_locals(caps.get(1).unwrap().as_str()) {
                        let mut s = RawSymbol::new(local, NodeKind::Import, Span::lines(ln, ln));
                        s.span.end_col = line.len() as u32;
                        symbols.push(s);
                    }
                }
                continue;
            }
            if let Some(caps) = re_require.captures(line) {
                refs.push(RawRef::new(
                    caps.get(2).unwrap().as_str(),
                    EdgeKind::Imports,
                    ln,
                    0,
                ));
                let mut s = RawSymbol::new(
                    caps.get(1).unwrap().as_str(),
                    NodeKind::Import,
                    Span::lines(ln, ln),
                );
                s.span.end_col = line.len() as u32;
                symbols.push(s);
                continue;
            } else if let Some(caps) = re_require_bare.captures(line) {
                refs.push(RawRef::new(
                    caps.get(1).unwrap().as_str(),
                    EdgeKind::Imports,
                    ln,
                    0,
                ));
            }

            if let Some(caps) = re_module_exports_fn.captures(line) {
                let name = caps.get(2).map(|m| m.as_str()).unwrap_or("default");
                let mut s = RawSymbol::new(name, NodeKind::Function, span(source, &lines, idx, true));
                s.exported = true;
                s.is_async = caps.get(1).is_some();
                symbols.push(s);
                continue;
            }
            if let Some(caps) = re_exports_member.captures(line) {
                let mut s = RawSymbol::new(
                    caps.get(1).unwrap().as_str(),
                    NodeKind::Function,
                    span(source, &lines, idx, line.contains('{')),
                );
                s.exported = true;
                s.is_async = caps.get(2).is_some();
                symbols.push(s);
                continue;
            }
            if let Some(caps) = re_class.captures(line) {
                let name = caps.get(1).unwrap().as_str();
                let mut s = RawSymbol::new(name, NodeKind::Class, span(source, &lines, idx, true));
                s.exported = exported;
                if let Some(base) = caps.get(2) {
                    let base_name = base.as_str().rsplit('.').next().unwrap_or(base.as_str());
                    refs.push(RawRef::new(
                        base_name,
                        EdgeKind::Extends,
                        ln,
                        base.start() as u32,
                    ));
                }
                class_ranges.push((idx, find_block_end(source, idx)));
                symbols.push(s);
                continue;
            }
            if let Some(caps) = re_fn.captures(line) {
                let mut s = RawSymbol::new(
                    caps.get(2).unwrap().as_str(),
                    NodeKind::Function,
                    span(source, &lines, idx, true),
                );
                s.exported = exported;
                s.is_async = caps.get(1).is_some();
                symbols.push(s);
                continue;
            }
            if let Some(caps) = re_arrow.captures(line) {
                let mut s = RawSymbol::new(
                    caps.get(1).unwrap().as_str(),
                    NodeKind::Function,
                    span(source, &lines, idx, line.contains('{')),
                );
                s.exported = exported;
                s.is_async = caps.get(2).is_some();
                symbols.push(s);
                continue;
            }
            if let Some(caps) = re_var.captures(line) {
                if trimmed.starts_with("for") {
                    continue;
                }
                let kind = if caps.get(1).unwrap().as_str() == "const" {
                    NodeKind::Constant
                } else {
                    NodeKind::Variable
                };
                let mut s =
                    RawSymbol::new(caps.get(2).unwrap().as_str(), kind, span(source, &lines, idx, false));
                s.exported = exported;
                symbols.push(s);
                continue;
            }
        }

        // Class methods.
        for (start, end) in class_ranges {
            let mut idx = start + 1;
            while idx < end {
                if let Some(caps) = re_method.captures(lines[idx]) {
                    let name = caps.get(3).unwrap().as_str();
                    if !is_ecma_keyword(name) || name == "constructor" {
                        let sp = span(source, &lines, idx, true);
                        let body_end = (sp.end_line as usize).saturating_sub(1);
                        let mut s = RawSymbol::new(name, NodeKind::Method, sp);
                        s.is_static = caps.get(1).is_some();
                        s.is_async = caps.get(2).is_some();
                        symbols.push(s);
                        idx = body_end.max(idx) + 1;
                        continue;
                    }
                }
                idx += 1;
            }
        }

        refs.extend(call_refs(&lines, &symbols));
        ParsedSource { symbols, refs }
    }
}

fn span(source: &str, lines: &[&str], idx: usize, block: bool) -> Span {
    let end_idx = if block { find_block_end(source, idx) } else { idx };
    Span {
        start_line: (idx as u32) + 1,
        start_col: indent_of(lines[idx]) as u32,
        end_line: (end_idx as u32) + 1,
        end_col: lines.get(end_idx).map(|l| l.len() as u32).unwrap_or(0),
    }
}

fn import_locals(clause: &str) -> Vec<String> {
    let mut out = Vec::new();
    let clause = clause.trim();
    let (head, braced) = match clause.find('{') {
        Some(pos) => (
            clause[..pos].trim_end_matches(',').trim(),
            Some(clause[pos + 1..].trim_end_matches('}').trim()),
        ),
        None => (clause, None),
    };
    if let Some(rest) = head.strip_prefix("* as ") {
        out.push(rest.trim().to_string());
    } else if !head.is_empty() {
        out.push(head.to_string());
    }
    if let Some(inner) = braced {
        for part in inner.split(',') {
            let local = match part.split_once(" as ") {
                Some((_, alias)) => alias.trim(),
                None => part.trim(),
            };
            if !local.is_empty() {
                out.push(local.to_string());
            }
        }
    }
    out
}

fn call_refs(lines: &[&str], symbols: &[RawSymbol]) -> Vec<RawRef> {
    let re_method_call = Regex::new(r"([A-Za-z_$][\w$]*)\s*\.\s*([A-Za-z_$][\w$]*)\s*\(").unwrap();
    let re_call = Regex::new(r"(?:^|[^.\w$])([A-Za-z_$][\w$]*)\s*\(").unwrap();
    let re_new = Regex::new(r"\bnew\s+([A-Za-z_$][\w$.]*)\s*\(").unwrap();

    let decls_on_line: std::collections::HashSet<(u32, &str)> = symbols
        .iter()
        .map(|s| (s.span.start_line, s.name.as_str()))
        .collect();

    let mut refs = Vec::new();
    for (idx, raw_line) in lines.iter().enumerate() {
        let line = *raw_line;
        let trimmed = line.trim();
        let ln = (idx as u32) + 1;
        if trimmed.starts_with("//") || trimmed.starts_with('*') || trimmed.starts_with("import ") {
            continue;
        }
        for caps in re_new.captures_iter(line) {
            let m = caps.get(1).unwrap();
            let name = m.as_str().rsplit('.').next().unwrap_or(m.as_str());
            refs.push(RawRef::new(name, EdgeKind::Instantiates, ln, m.start() as u32));
        }
        for caps in re_method_call.captures_iter(line) {
            let recv = caps.get(1).unwrap();
            let name = caps.get(2).unwrap();
            if is_ecma_keyword(name.as_str()) || name.as_str() == "require" {
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
            if is_ecma_keyword(name)
                || name == "require"
                || decls_on_line.contains(&(ln, name))
            {
                continue;
            }
            let prefix = line[..m.start()].trim_end();
            if prefix.ends_with("function") || prefix.ends_with("new") {
                continue;
            }
            refs.push(RawRef::new(name, EdgeKind::Calls, ln, m.start() as u32));
        }
    }
    refs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::NodeKind;

    fn parse(src: &str) -> ParsedSource {
        JavaScriptParser::new().parse("src/a.js", src)
    }

    #[test]
    fn commonjs_exports() {
        let src = "module.exports = function main(opts) {\n  return run(opts);\n}\nexports.helper = function (x) { return x; }\n";
        let out = parse(src);
        let main = out.symbols.iter().find(|s| s.name == "main").unwrap();
        assert!(main.exported);
        assert_eq!(main.span.end_line, 3);
        let helper = out.symbols.iter().find(|s| s.name == "helper").unwrap();
        assert!(helper.exported);
        assert!(out
            .refs
            .iter()
            .any(|r| r.kind == EdgeKind::Calls && r.name == "run"));
    }

    #[test]
    fn require_produces_import_binding_and_edge_ref() {
        let src = "const util = require('./util');\nutil.fmt(1);\n";
        let out = parse(src);
        assert!(out
            .symbols
            .iter()
            .any(|s| s.kind == NodeKind::Import && s.name == "util"));
        assert!(out
            .refs
            .iter()
            .any(|r| r.kind == EdgeKind::Imports && r.name == "./util"));
        let call = out.refs.iter().find(|r| r.name == "fmt").unwrap();
        assert!(call.is_method);
        assert_eq!(call.receiver.as_deref(), Some("util"));
    }

    #[test]
    fn class_with_method() {
        let src = "class Queue extends Base {\n  push(x) {\n    this.items.push(x);\n  }\n}\n";
        let out = parse(src);
        assert!(out
            .symbols
            .iter()
            .any(|s| s.kind == NodeKind::Class && s.name == "Queue"));
        assert!(out
            .symbols
            .iter()
            .any(|s| s.kind == NodeKind::Method && s.name == "push"));
        assert!(out
            .refs
            .iter()
            .any(|r| r.kind == EdgeKind::Extends && r.name == "Base"));
    }
}
