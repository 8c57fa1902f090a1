use regex::Regex;

use crate::ir::reference::EdgeKind;
use crate::ir::{NodeKind, Span};
use crate::languages::util::{find_block_end, indent_of};
use crate::languages::{LanguageParser, ParsedSource, RawRef, RawSymbol};

pub struct RustParser;

impl RustParser {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustParser {
    fn default() -> Self {
        Self::new()
    }
}

fn is_rust_keyword(name: &str) -> bool {
    matches!(
        name,
        "if" | "while"
            | "for"
            | "match"
            | "loop"
            | "return"
            | "fn"
            | "let"
            | "mut"
            | "impl"
            | "use"
            | "mod"
            | "pub"
            | "move"
            | "ref"
            | "unsafe"
            | "where"
            | "as"
            | "in"
            | "else"
    )
}

impl LanguageParser for RustParser {
    fn language(&self) -> &'static str {
        "rust"
    }

    fn parse(&self, _path: &str, source: &str) -> ParsedSource {
        let re_fn = Regex::new(
            r"^\s*(pub(?:\([^)]*\))?\s+)?(?:const\s+)?(async\s+)?(?:unsafe\s+)?(?:extern\s+\S+\s+)?fn\s+([a-zA-Z_]\w*)",
        )
        .unwrap();
        let re_struct =
            Regex::new(r"^\s*(pub(?:\([^)]*\))?\s+)?struct\s+([A-Za-z_]\w*)").unwrap();
        let re_enum = Regex::new(r"^\s*(pub(?:\([^)]*\))?\s+)?enum\s+([A-Za-z_]\w*)").unwrap();
        let re_trait = Regex::new(r"^\s*(pub(?:\([^)]*\))?\s+)?trait\s+([A-Za-z_]\w*)").unwrap();
        let re_type =
            Regex::new(r"^\s*(pub(?:\([^)]*\))?\s+)?type\s+([A-Za-z_]\w*)[^=]*=").unwrap();
        let re_const = Regex::new(
            r"^\s*(pub(?:\([^)]*\))?\s+)?(?:const|static)\s+([A-Z_][A-Z0-9_]*)\s*:",
        )
        .unwrap();
        let re_mod = Regex::new(r"^\s*(pub(?:\([^)]*\))?\s+)?mod\s+([a-z_]\w*)\s*\{").unwrap();
        let re_impl = Regex::new(
            r"^\s*impl(?:\s*<[^>]*>)?\s+(?:([A-Za-z_][\w:]*)(?:<[^>]*>)?\s+for\s+)?([A-Za-z_][\w:]*)",
        )
        .unwrap();
        let re_use = Regex::new(r"^\s*(?:pub\s+)?use\s+([^;]+);").unwrap();
        let re_qcall =
            Regex::new(r"([A-Za-z_]\w*(?:::[A-Za-z_]\w*)+)\s*\(").unwrap();
        let re_call = Regex::new(r"(?:^|[^.\w:])([a-z_]\w*)\s*(!)?\s*\(").unwrap();
        let re_method_call = Regex::new(r"\.\s*([a-z_]\w*)\s*\(").unwrap();

        let lines: Vec<&str> = source.lines().collect();
        let mut symbols: Vec<RawSymbol> = Vec::new();
        let mut refs: Vec<RawRef> = Vec::new();
        // (self type, end line idx) of impl blocks, innermost last.
        let mut impl_ranges: Vec<(String, usize, usize)> = Vec::new();
        let mut pending_doc: Option<String> = None;

        for (idx, raw_line) in lines.iter().enumerate() {
            let line = *raw_line;
            let trimmed = line.trim();
            let ln = (idx as u32) + 1;

            if let Some(text) = trimmed.strip_prefix("///") {
                let text = text.trim();
                match &mut pending_doc {
                    Some(d) => {
                        d.push('\n');
                        d.push_str(text);
                    }
                    None => pending_doc = Some(text.to_string()),
                }
                continue;
            }
            if trimmed.is_empty() || trimmed.starts_with("//") || trimmed.starts_with("#[") {
                continue;
            }
            let doc = pending_doc.take();

            if let Some(caps) = re_use.captures(line) {
                let spec = caps.get(1).unwrap().as_str().trim();
                let root = spec.split("::").next().unwrap_or(spec).trim();
                refs.push(RawRef::new(spec, EdgeKind::Imports, ln, 0));
                if !root.is_empty() && root != "crate" && root != "self" && root != "super" {
                    let alias = spec
                        .rsplit("::")
                        .next()
                        .unwrap_or(spec)
                        .trim_matches(['{', '}', '*', ' ']);
                    if !alias.is_empty() && !alias.contains(',') {
                        let mut s =
                            RawSymbol::new(alias, NodeKind::Import, Span::lines(ln, ln));
                        s.span.end_col = line.len() as u32;
                        symbols.push(s);
                    }
                }
                continue;
            }
            if let Some(caps) = re_impl.captures(line) {
                let self_ty = caps.get(2).unwrap().as_str();
                let self_ty = self_ty.rsplit("::").next().unwrap_or(self_ty).to_string();
                let end = find_block_end(source, idx);
                if let Some(trait_name) = caps.get(1) {
                    let t = trait_name.as_str();
                    let simple = t.rsplit("::").next().unwrap_or(t);
                    let mut r =
                        RawRef::new(simple, EdgeKind::Implements, ln, trait_name.start() as u32);
                    if t.contains("::") {
                        r.candidates = vec![t.to_string()];
                    }
                    refs.push(r);
                }
                impl_ranges.push((self_ty, idx, end));
                continue;
            }
            if let Some(caps) = re_mod.captures(line) {
                let name = caps.get(2).unwrap().as_str();
                let mut s = RawSymbol::new(name, NodeKind::Module, block_span(source, &lines, idx));
                s.exported = caps.get(1).is_some();
                s.doc = doc;
                symbols.push(s);
                continue;
            }
            if let Some(caps) = re_fn.captures(line) {
                let name = caps.get(3).unwrap().as_str();
                let in_impl = impl_ranges
                    .iter()
                    .rev()
                    .find(|(_, start, end)| *start < idx && idx <= *end);
                let mut s = RawSymbol::new(
                    name,
                    if in_impl.is_some() {
                        NodeKind::Method
                    } else {
                        NodeKind::Function
                    },
                    block_span(source, &lines, idx),
                );
                s.container_hint = in_impl.map(|(ty, _, _)| ty.clone());
                s.exported = caps.get(1).is_some();
                s.visibility = caps.get(1).map(|m| m.as_str().trim().to_string());
                s.is_async = caps.get(2).is_some();
                s.doc = doc;
                s.signature = Some(
                    trimmed
                        .split('{')
                        .next()
                        .unwrap_or(trimmed)
                        .trim()
                        .to_string(),
                );
                symbols.push(s);
                continue;
            }
            for (re, kind) in [
                (&re_struct, NodeKind::Struct),
                (&re_enum, NodeKind::Enum),
                (&re_trait, NodeKind::Trait),
            ] {
                if let Some(caps) = re.captures(line) {
                    let name = caps.get(2).unwrap().as_str();
                    let span = if line.contains('{') {
                        block_span(source, &lines, idx)
                    } else {
                        single_line_span(&lines, idx)
                    };
                    let mut s = RawSymbol::new(name, kind, span);
                    s.exported = caps.get(1).is_some();
                    s.visibility = caps.get(1).map(|m| m.as_str().trim().to_string());
                    s.doc = doc.clone();
                    symbols.push(s);
                }
            }
            if symbols.last().map(|s| s.span.start_line) == Some(ln) {
                continue;
            }
            if let Some(caps) = re_type.captures(line) {
                let mut s = RawSymbol::new(
                    caps.get(2).unwrap().as_str(),
                    NodeKind::TypeAlias,
                    single_line_span(&lines, idx),
                );
                s.exported = caps.get(1).is_some();
                symbols.push(s);
                continue;
            }
            if let Some(caps) = re_const.captures(line) {
                let mut s = RawSymbol::new(
                    caps.get(2).unwrap().as_str(),
                    NodeKind::Constant,
                    single_line_span(&lines, idx),
                );
                s.exported = caps.get(1).is_some();
                symbols.push(s);
                continue;
            }
        }

        // Call references, teacher-style: qualified paths first, then
        // method calls, then free functions (macros excluded).
        let decls_on_line: std::collections::HashSet<(u32, &str)> = symbols
            .iter()
            .map(|s| (s.span.start_line, s.name.as_str()))
            .collect();
        for (idx, raw_line) in lines.iter().enumerate() {
            let line = *raw_line;
            let trimmed = line.trim();
            let ln = (idx as u32) + 1;
            if trimmed.starts_with("//") || trimmed.starts_with("use ") || trimmed.starts_with("pub use ")
            {
                continue;
            }
            for cap in re_qcall.captures_iter(line) {
                let full = cap.get(1).unwrap();
                let mut parts: Vec<&str> = full.as_str().split("::").collect();
                let Some(last) = parts.pop() else { continue };
                let mut r = RawRef::new(last, EdgeKind::Calls, ln, full.start() as u32);
                r.qualifier = Some(parts.join("::"));
                r.candidates = vec![full.as_str().to_string(), format!("{}.{last}", parts.join("."))];
                r.receiver = parts.last().map(|s| s.to_string());
                refs.push(r);
            }
            for cap in re_method_call.captures_iter(line) {
                let name = cap.get(1).unwrap();
                if is_rust_keyword(name.as_str()) || name.as_str() == "await" {
                    continue;
                }
                let mut r = RawRef::new(name.as_str(), EdgeKind::Calls, ln, name.start() as u32);
                r.is_method = true;
                refs.push(r);
            }
            for cap in re_call.captures_iter(line) {
                if cap.get(2).map(|m| m.as_str() == "!").unwrap_or(false) {
                    continue; // macro invocation
                }
                let m = cap.get(1).unwrap();
                let name = m.as_str();
                if is_rust_keyword(name) || decls_on_line.contains(&(ln, name)) {
                    continue;
                }
                let prefix = line[..m.start()].trim_end();
                if prefix.ends_with("fn") {
                    continue;
                }
                if refs
                    .iter()
                    .any(|r| r.line == ln && r.name == name && r.qualifier.is_some())
                {
                    continue;
                }
                refs.push(RawRef::new(name, EdgeKind::Calls, ln, m.start() as u32));
            }
        }

        ParsedSource { symbols, refs }
    }
}

fn block_span(source: &str, lines: &[&str], idx: usize) -> Span {
    let end = find_block_end(source, idx);
    Span {
        start_line: (idx as u32) + 1,
        start_col: indent_of(lines[idx]) as u32,
        end_line: (end as u32) + 1,
        end_col: lines.get(end).map(|l| l.len() as u32).unwrap_or(0),
    }
}

fn single_line_span(lines: &[&str], idx: usize) -> Span {
    Span {
        start_line: (idx as u32) + 1,
        start_col: indent_of(lines[idx]) as u32,
        end_line: (idx as u32) + 1,
        end_col: lines.get(idx).map(|l| l.len() as u32).unwrap_or(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::NodeKind;

    fn parse(src: &str) -> ParsedSource {
        RustParser::new().parse("src/lib.rs", src)
    }

    #[test]
    fn extracts_basic_symbols() {
        let src = "pub struct S { x: i32 }\n\nimpl S {\n    pub fn m(&self) {}\n}\n\nfn foo() {\n    bar();\n}\n\nenum E { A, B }\n";
        let out = parse(src);
        let s = out.symbols.iter().find(|s| s.name == "S").unwrap();
        assert_eq!(s.kind, NodeKind::Struct);
        assert!(s.exported);
        let m = out.symbols.iter().find(|s| s.name == "m").unwrap();
        assert_eq!(m.kind, NodeKind::Method);
        assert_eq!(m.container_hint.as_deref(), Some("S"));
        let foo = out.symbols.iter().find(|s| s.name == "foo").unwrap();
        assert_eq!(foo.kind, NodeKind::Function);
        assert!(foo.container_hint.is_none());
        assert!(out.symbols.iter().any(|s| s.name == "E" && s.kind == NodeKind::Enum));
    }

    #[test]
    fn macros_are_not_calls() {
        let out = parse("fn foo() { bar(); x.baz(); println!(\"ok\"); }\n");
        let names: Vec<_> = out
            .refs
            .iter()
            .filter(|r| r.kind == EdgeKind::Calls)
            .map(|r| r.name.as_str())
            .collect();
        assert!(names.contains(&"bar"));
        assert!(names.contains(&"baz"));
        assert!(!names.contains(&"println"));
    }

    #[test]
    fn qualified_calls_carry_qualifier() {
        let out = parse("fn foo() { crate::utils::call(); a::b::c(); }\n");
        assert!(out
            .refs
            .iter()
            .any(|r| r.name == "call" && r.qualifier.as_deref() == Some("crate::utils")));
        assert!(out
            .refs
            .iter()
            .any(|r| r.name == "c" && r.qualifier.as_deref() == Some("a::b")));
    }

    #[test]
    fn trait_impl_yields_implements_ref() {
        let out = parse("impl Display for Token {\n    fn fmt(&self) {}\n}\n");
        assert!(out
            .refs
            .iter()
            .any(|r| r.kind == EdgeKind::Implements && r.name == "Display"));
        let fmt = out.symbols.iter().find(|s| s.name == "fmt").unwrap();
        assert_eq!(fmt.container_hint.as_deref(), Some("Token"));
    }

    #[test]
    fn use_lines_become_import_refs() {
        let out = parse("use crate::store::Store;\nuse std::fs;\n");
        let imports: Vec<_> = out
            .refs
            .iter()
            .filter(|r| r.kind == EdgeKind::Imports)
            .map(|r| r.name.as_str())
            .collect();
        assert_eq!(imports, vec!["crate::store::Store", "std::fs"]);
    }

    #[test]
    fn doc_comments_attach() {
        let out = parse("/// Adds one.\n/// Second line.\nfn add_one(x: u32) -> u32 { x + 1 }\n");
        let f = out.symbols.iter().find(|s| s.name == "add_one").unwrap();
        assert_eq!(f.doc.as_deref(), Some("Adds one.\nSecond line."));
        assert_eq!(f.signature.as_deref(), Some("fn add_one(x: u32) -> u32"));
    }
}
