use regex::Regex;

use crate::ir::reference::EdgeKind;
use crate::ir::{NodeKind, Span};
use crate::languages::util::{find_block_end, indent_of};
use crate::languages::{LanguageParser, ParsedSource, RawRef, RawSymbol, is_ecma_keyword};

/// Regex-based TypeScript parser. Also drives `tsx` and Svelte scripts;
/// the dialect only changes the language tag and whether JSX component
/// usage is collected.
pub struct TypeScriptParser {
    dialect: &'static str,
}

impl TypeScriptParser {
    pub fn new(dialect: &'static str) -> Self {
        Self { dialect }
    }

    fn jsx_enabled(&self) -> bool {
        matches!(self.dialect, "tsx" | "svelte")
    }
}

struct DeclPass {
    symbols: Vec<RawSymbol>,
    refs: Vec<RawRef>,
    /// (start_idx, end_idx) of class bodies, for the member pass.
    class_ranges: Vec<(usize, usize)>,
    enum_ranges: Vec<(usize, usize)>,
}

impl LanguageParser for TypeScriptParser {
    fn language(&self) -> &'static str {
        self.dialect
    }

    fn parse(&self, _path: &str, source: &str) -> ParsedSource {
        let lines: Vec<&str> = source.lines().collect();
        let mut pass = declarations(source, &lines);
        members(source, &lines, &mut pass);
        enum_members(&lines, &mut pass);
        mark_reexports(&lines, &mut pass.symbols);
        let refs = call_refs(&lines, &pass.symbols, self.jsx_enabled());
        pass.refs.extend(refs);
        ParsedSource {
            symbols: pass.symbols,
            refs: pass.refs,
        }
    }
}

fn line_span(source: &str, lines: &[&str], idx: usize, block: bool) -> Span {
    let (start, col) = ((idx as u32) + 1, indent_of(lines[idx]) as u32);
    let end_idx = if block { find_block_end(source, idx) } else { idx };
    Span {
        start_line: start,
        start_col: col,
        end_line: (end_idx as u32) + 1,
        end_col: lines.get(end_idx).map(|l| l.len() as u32).unwrap_or(0),
    }
}

fn split_type_params(raw: Option<regex::Match<'_>>) -> Vec<String> {
    raw.map(|m| {
        m.as_str()
            .trim_matches(['<', '>'])
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    })
    .unwrap_or_default()
}

fn declarations(source: &str, lines: &[&str]) -> DeclPass {
    let re_class = Regex::new(
        r"^\s*(?:export\s+)?(?:default\s+)?(abstract\s+)?class\s+([A-Za-z_$][\w$]*)(<[^>{]*>)?(?:\s+extends\s+([A-Za-z_$][\w$.]*))?(?:\s+implements\s+([^{]+))?",
    )
    .unwrap();
    let re_interface = Regex::new(
        r"^\s*(?:export\s+)?interface\s+([A-Za-z_$][\w$]*)(<[^>{]*>)?(?:\s+extends\s+([^{]+))?",
    )
    .unwrap();
    let re_enum =
        Regex::new(r"^\s*(?:export\s+)?(?:declare\s+)?(?:const\s+)?enum\s+([A-Za-z_$][\w$]*)")
            .unwrap();
    let re_type =
        Regex::new(r"^\s*(?:export\s+)?type\s+([A-Za-z_$][\w$]*)(<[^=]*>)?\s*=").unwrap();
    let re_namespace =
        Regex::new(r"^\s*(?:export\s+)?namespace\s+([A-Za-z_$][\w$]*)").unwrap();
    let re_fn = Regex::new(
        r"^\s*(?:export\s+)?(?:default\s+)?(?:declare\s+)?(async\s+)?function\s*\*?\s*([A-Za-z_$][\w$]*)\s*(<[^>(]*>)?\s*\(",
    )
    .unwrap();
    let re_arrow = Regex::new(
        r"^\s*(?:export\s+)?(?:const|let|var)\s+([A-Za-z_$][\w$]*)[^=;]*=\s*(async\s+)?(?:\([^)]*\)|[A-Za-z_$][\w$]*)\s*=>",
    )
    .unwrap();
    let re_var =
        Regex::new(r"^\s*(?:export\s+)?(const|let|var)\s+([A-Za-z_$][\w$]*)").unwrap();
    let re_import_from =
        Regex::new(r#"^\s*(?:import|export)\s+(?:type\s+)?(.+?)\s+from\s+['"]([^'"]+)['"]"#)
            .unwrap();
    let re_import_bare = Regex::new(r#"^\s*import\s+['"]([^'"]+)['"]"#).unwrap();
    let re_return_type = Regex::new(r"\)\s*:\s*([A-Z][\w$]*)").unwrap();
    let re_var_type = Regex::new(r"(?:const|let|var)\s+[\w$]+\s*:\s*([A-Z][\w$]*)").unwrap();
    let re_decorator = Regex::new(r"^\s*@([A-Za-z_$][\w$]*)").unwrap();

    let mut out = DeclPass {
        symbols: Vec::new(),
        refs: Vec::new(),
        class_ranges: Vec::new(),
        enum_ranges: Vec::new(),
    };
    let mut pending_doc: Option<String> = None;
    let mut doc_open = false;
    let mut pending_decorators: Vec<String> = Vec::new();

    for (idx, raw_line) in lines.iter().enumerate() {
        let line = *raw_line;
        let trimmed = line.trim();
        let ln = (idx as u32) + 1;
        let exported = trimmed.starts_with("export ") || trimmed.starts_with("export default ");

        // Doc comment accumulation.
        if doc_open {
            let text = trimmed.trim_start_matches('*').trim();
            if trimmed.contains("*/") {
                doc_open = false;
                let text = text.trim_end_matches("*/").trim_end_matches('*').trim();
                if !text.is_empty() {
                    append_doc(&mut pending_doc, text);
                }
            } else if !text.is_empty() {
                append_doc(&mut pending_doc, text);
            }
            continue;
        }
        if trimmed.starts_with("/**") {
            let inner = trimmed.trim_start_matches("/**").trim();
            if trimmed.ends_with("*/") {
                let inner = inner.trim_end_matches("*/").trim();
                pending_doc = (!inner.is_empty()).then(|| inner.to_string());
            } else {
                pending_doc = None;
                doc_open = true;
                if !inner.is_empty() {
                    append_doc(&mut pending_doc, inner);
                }
            }
            continue;
        }
        if trimmed.is_empty() || trimmed.starts_with("//") {
            continue;
        }
        if let Some(caps) = re_decorator.captures(line) {
            let name = caps.get(1).unwrap().as_str();
            pending_decorators.push(name.to_string());
            out.refs.push(RawRef::new(
                name,
                EdgeKind::Decorates,
                ln,
                caps.get(1).unwrap().start() as u32,
            ));
            continue;
        }

        let doc = pending_doc.take();
        let decorators = std::mem::take(&mut pending_decorators);

        if let Some(caps) = re_import_from.captures(line) {
            let clause = caps.get(1).unwrap().as_str();
            let spec = caps.get(2).unwrap().as_str();
            out.refs
                .push(RawRef::new(spec, EdgeKind::Imports, ln, 0));
            if trimmed.starts_with("import") {
                for (local, _imported) in parse_import_clause(clause) {
                    let mut s =
                        RawSymbol::new(local, NodeKind::Import, Span::lines(ln, ln));
                    s.span.start_col = indent_of(line) as u32;
                    s.span.end_col = line.len() as u32;
                    out.symbols.push(s);
                }
            }
            continue;
        }
        if let Some(caps) = re_import_bare.captures(line) {
            out.refs.push(RawRef::new(
                caps.get(1).unwrap().as_str(),
                EdgeKind::Imports,
                ln,
                0,
            ));
            continue;
        }

        if let Some(caps) = re_class.captures(line) {
            let name = caps.get(2).unwrap().as_str();
            let span = line_span(source, lines, idx, true);
            let mut s = RawSymbol::new(name, NodeKind::Class, span);
            s.exported = exported;
            s.is_abstract = caps.get(1).is_some();
            s.doc = doc;
            s.decorators = decorators;
            s.type_params = split_type_params(caps.get(3));
            if let Some(base) = caps.get(4) {
                let base_name = base.as_str().rsplit('.').next().unwrap_or(base.as_str());
                let mut r =
                    RawRef::new(base_name, EdgeKind::Extends, ln, base.start() as u32);
                r.candidates = vec![base.as_str().to_string()];
                out.refs.push(r);
            }
            if let Some(impls) = caps.get(5) {
                for part in impls.as_str().split(',') {
                    let t = strip_generics(part.trim());
                    if !t.is_empty() {
                        out.refs
                            .push(RawRef::new(t, EdgeKind::Implements, ln, impls.start() as u32));
                    }
                }
            }
            out.class_ranges
                .push((idx, find_block_end(source, idx)));
            out.symbols.push(s);
            continue;
        }
        if let Some(caps) = re_interface.captures(line) {
            let name = caps.get(1).unwrap().as_str();
            let mut s = RawSymbol::new(name, NodeKind::Interface, line_span(source, lines, idx, true));
            s.exported = exported;
            s.doc = doc;
            s.type_params = split_type_params(caps.get(2));
            if let Some(bases) = caps.get(3) {
                for part in bases.as_str().split(',') {
                    let t = strip_generics(part.trim());
                    if !t.is_empty() {
                        out.refs
                            .push(RawRef::new(t, EdgeKind::Extends, ln, bases.start() as u32));
                    }
                }
            }
            out.symbols.push(s);
            continue;
        }
        if let Some(caps) = re_enum.captures(line) {
            let name = caps.get(1).unwrap().as_str();
            let mut s = RawSymbol::new(name, NodeKind::Enum, line_span(source, lines, idx, true));
            s.exported = exported;
            s.doc = doc;
            out.enum_ranges.push((idx, find_block_end(source, idx)));
            out.symbols.push(s);
            continue;
        }
        if let Some(caps) = re_type.captures(line) {
            let name = caps.get(1).unwrap().as_str();
            let mut s = RawSymbol::new(name, NodeKind::TypeAlias, line_span(source, lines, idx, false));
            s.exported = exported;
            s.doc = doc;
            s.type_params = split_type_params(caps.get(2));
            out.symbols.push(s);
            continue;
        }
        if let Some(caps) = re_namespace.captures(line) {
            let name = caps.get(1).unwrap().as_str();
            let mut s =
                RawSymbol::new(name, NodeKind::Namespace, line_span(source, lines, idx, true));
            s.exported = exported;
            out.symbols.push(s);
            continue;
        }
        if let Some(caps) = re_fn.captures(line) {
            let name = caps.get(2).unwrap().as_str();
            let mut s = RawSymbol::new(name, NodeKind::Function, line_span(source, lines, idx, true));
            s.exported = exported;
            s.is_async = caps.get(1).is_some();
            s.doc = doc;
            s.decorators = decorators;
            s.type_params = split_type_params(caps.get(3));
            s.signature = Some(signature_of(trimmed));
            if let Some(ret) = re_return_type.captures(line) {
                let m = ret.get(1).unwrap();
                out.refs
                    .push(RawRef::new(m.as_str(), EdgeKind::Returns, ln, m.start() as u32));
            }
            out.symbols.push(s);
            continue;
        }
        if let Some(caps) = re_arrow.captures(line) {
            let name = caps.get(1).unwrap().as_str();
            let block = line.contains('{');
            let mut s =
                RawSymbol::new(name, NodeKind::Function, line_span(source, lines, idx, block));
            s.exported = exported;
            s.is_async = caps.get(2).is_some();
            s.doc = doc;
            s.signature = Some(signature_of(trimmed));
            out.symbols.push(s);
            continue;
        }
        if let Some(caps) = re_var.captures(line) {
            // Skip destructuring and loop headers.
            if trimmed.starts_with("for") {
                continue;
            }
            let kw = caps.get(1).unwrap().as_str();
            let name = caps.get(2).unwrap().as_str();
            let kind = if kw == "const" {
                NodeKind::Constant
            } else {
                NodeKind::Variable
            };
            let mut s = RawSymbol::new(name, kind, line_span(source, lines, idx, false));
            s.exported = exported;
            s.doc = doc;
            out.symbols.push(s);
            if let Some(t) = re_var_type.captures(line) {
                let m = t.get(1).unwrap();
                out.refs
                    .push(RawRef::new(m.as_str(), EdgeKind::TypeOf, ln, m.start() as u32));
            }
            continue;
        }
    }
    out
}

fn members(source: &str, lines: &[&str], pass: &mut DeclPass) {
    let re_method = Regex::new(
        r"^\s*((?:(?:public|private|protected|readonly|override|abstract)\s+)*)(static\s+)?(async\s+)?(?:get\s+|set\s+)?\*?\s*([A-Za-z_$][\w$]*)\s*(?:<[^>(]*>)?\s*\([^)]*\)?[^;{=>]*\{",
    )
    .unwrap();
    let re_property = Regex::new(
        r"^\s*((?:public|private|protected|readonly|override)\s+)+(static\s+)?([A-Za-z_$][\w$]*)\s*[?!]?\s*[:=]",
    )
    .unwrap();
    let ranges = pass.class_ranges.clone();
    for (start, end) in ranges {
        let mut idx = start + 1;
        while idx < end {
            let line = lines[idx];
            if let Some(caps) = re_property.captures(line) {
                let name = caps.get(3).unwrap().as_str();
                let mut s = RawSymbol::new(
                    name,
                    NodeKind::Property,
                    Span {
                        start_line: (idx as u32) + 1,
                        start_col: indent_of(line) as u32,
                        end_line: (idx as u32) + 1,
                        end_col: line.len() as u32,
                    },
                );
                s.is_static = caps.get(2).is_some();
                s.visibility = caps
                    .get(1)
                    .map(|m| m.as_str().split_whitespace().next().unwrap_or("").to_string());
                pass.symbols.push(s);
                idx += 1;
                continue;
            }
            if let Some(caps) = re_method.captures(line) {
                let name = caps.get(4).unwrap().as_str();
                if is_ecma_keyword(name) && name != "constructor" {
                    idx += 1;
                    continue;
                }
                let span = line_span(source, lines, idx, true);
                let body_end = (span.end_line as usize).saturating_sub(1);
                let mut s = RawSymbol::new(name, NodeKind::Method, span);
                let modifiers = caps.get(1).map(|m| m.as_str()).unwrap_or("");
                s.is_static = caps.get(2).is_some();
                s.is_async = caps.get(3).is_some();
                s.is_abstract = modifiers.contains("abstract");
                s.visibility = modifiers.split_whitespace().next().map(|v| v.to_string());
                s.signature = Some(signature_of(line.trim()));
                pass.symbols.push(s);
                idx = body_end.max(idx) + 1;
                continue;
            }
            idx += 1;
        }
    }
}

fn enum_members(lines: &[&str], pass: &mut DeclPass) {
    let re_member = Regex::new(r"^\s*([A-Za-z_$][\w$]*)\s*(?:=[^,]*)?,?\s*$").unwrap();
    let ranges = pass.enum_ranges.clone();
    for (start, end) in ranges {
        for idx in start + 1..end {
            if let Some(caps) = re_member.captures(lines[idx]) {
                let name = caps.get(1).unwrap().as_str();
                let mut s = RawSymbol::new(
                    name,
                    NodeKind::EnumMember,
                    Span::lines((idx as u32) + 1, (idx as u32) + 1),
                );
                s.span.end_col = lines[idx].len() as u32;
                pass.symbols.push(s);
            }
        }
    }
}

/// `export { a, b as c }` and `export default name` mark existing
/// declarations as exported.
fn mark_reexports(lines: &[&str], symbols: &mut [RawSymbol]) {
    let re_export_list = Regex::new(r"^\s*export\s*\{([^}]*)\}\s*;?\s*$").unwrap();
    let re_export_default = Regex::new(r"^\s*export\s+default\s+([A-Za-z_$][\w$]*)\s*;?\s*$").unwrap();
    let mut exported: Vec<String> = Vec::new();
    for line in lines {
        if let Some(caps) = re_export_list.captures(line) {
            for part in caps.get(1).unwrap().as_str().split(',') {
                let name = part.split_whitespace().next().unwrap_or("").trim();
                if !name.is_empty() {
                    exported.push(name.to_string());
                }
            }
        }
        if let Some(caps) = re_export_default.captures(line) {
            exported.push(caps.get(1).unwrap().as_str().to_string());
        }
    }
    for s in symbols.iter_mut() {
        if exported.iter().any(|n| n == &s.name) {
            s.exported = true;
        }
    }
}

fn call_refs(lines: &[&str], symbols: &[RawSymbol], jsx: bool) -> Vec<RawRef> {
    let re_method_call =
        Regex::new(r"([A-Za-z_$][\w$]*)\s*\.\s*([A-Za-z_$][\w$]*)\s*\(").unwrap();
    let re_call = Regex::new(r"(?:^|[^.\w$])([A-Za-z_$][\w$]*)\s*\(").unwrap();
    let re_new = Regex::new(r"\bnew\s+([A-Za-z_$][\w$.]*)\s*[(<]").unwrap();
    let re_jsx = Regex::new(r"<([A-Z][\w$]*)").unwrap();

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
            let mut r = RawRef::new(name, EdgeKind::Instantiates, ln, m.start() as u32);
            if m.as_str().contains('.') {
                r.candidates = vec![m.as_str().to_string()];
            }
            refs.push(r);
        }
        for caps in re_method_call.captures_iter(line) {
            let recv = caps.get(1).unwrap();
            let name = caps.get(2).unwrap();
            if is_ecma_keyword(name.as_str()) {
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
            if is_ecma_keyword(name) || decls_on_line.contains(&(ln, name)) {
                continue;
            }
            let prefix = line[..m.start()].trim_end();
            if prefix.ends_with("function") || prefix.ends_with("new") {
                continue;
            }
            refs.push(RawRef::new(name, EdgeKind::Calls, ln, m.start() as u32));
        }
        if jsx {
            for caps in re_jsx.captures_iter(line) {
                let m = caps.get(1).unwrap();
                refs.push(RawRef::new(
                    m.as_str(),
                    EdgeKind::References,
                    ln,
                    m.start() as u32,
                ));
            }
        }
    }
    refs
}

fn parse_import_clause(clause: &str) -> Vec<(String, Option<String>)> {
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
        out.push((rest.trim().to_string(), None));
    } else if !head.is_empty() {
        out.push((head.to_string(), None));
    }
    if let Some(inner) = braced {
        for part in inner.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            match part.split_once(" as ") {
                Some((orig, alias)) => out.push((
                    alias.trim().to_string(),
                    Some(orig.trim().to_string()),
                )),
                None => out.push((part.to_string(), Some(part.to_string()))),
            }
        }
    }
    out
}

fn strip_generics(name: &str) -> &str {
    name.split('<').next().unwrap_or(name).trim()
}

fn signature_of(line: &str) -> String {
    line.split('{').next().unwrap_or(line).trim().to_string()
}

fn append_doc(doc: &mut Option<String>, text: &str) {
    match doc {
        Some(d) => {
            d.push('\n');
            d.push_str(text);
        }
        None => *doc = Some(text.to_string()),
    }
}
