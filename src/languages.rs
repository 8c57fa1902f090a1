use crate::ir::reference::EdgeKind;
use crate::ir::{NodeKind, Span};

pub mod javascript;
pub mod path;
pub mod python;
pub mod rust_lang;
pub mod typescript;
pub mod util;

/// High-level symbol record produced by a language parser. The extractor
/// turns these into persisted nodes: it derives qualified names from
/// span nesting, assigns ids and synthesizes `contains` edges.
#[derive(Debug, Clone)]
pub struct RawSymbol {
    pub name: String,
    pub kind: NodeKind,
    pub span: Span,
    pub signature: Option<String>,
    pub doc: Option<String>,
    pub visibility: Option<String>,
    pub exported: bool,
    pub is_async: bool,
    pub is_static: bool,
    pub is_abstract: bool,
    pub decorators: Vec<String>,
    pub type_params: Vec<String>,
    /// Name of the enclosing type when the parser knows it without span
    /// nesting (e.g. Rust `impl` blocks).
    pub container_hint: Option<String>,
}

impl RawSymbol {
    pub fn new(name: impl Into<String>, kind: NodeKind, span: Span) -> Self {
        Self {
            name: name.into(),
            kind,
            span,
            signature: None,
            doc: None,
            visibility: None,
            exported: false,
            is_async: false,
            is_static: false,
            is_abstract: false,
            decorators: Vec::new(),
            type_params: Vec::new(),
            container_hint: None,
        }
    }
}

/// A symbol use whose target cannot be decided within the file.
#[derive(Debug, Clone)]
pub struct RawRef {
    pub name: String,
    pub kind: EdgeKind,
    pub line: u32,
    pub column: u32,
    pub is_method: bool,
    /// Receiver text for method calls (`obj.m()` -> `obj`).
    pub receiver: Option<String>,
    /// Module-path qualifier (`a::b::c()` -> `a::b`).
    pub qualifier: Option<String>,
    /// Candidate qualified names, most specific first.
    pub candidates: Vec<String>,
}

impl RawRef {
    pub fn new(name: impl Into<String>, kind: EdgeKind, line: u32, column: u32) -> Self {
        Self {
            name: name.into(),
            kind,
            line,
            column,
            is_method: false,
            receiver: None,
            qualifier: None,
            candidates: Vec::new(),
        }
    }
}

#[derive(Debug, Default)]
pub struct ParsedSource {
    pub symbols: Vec<RawSymbol>,
    pub refs: Vec<RawRef>,
}

/// Parser capability consumed by the extractor. Implementations must be
/// pure: the same (path, source) yields the same output.
pub trait LanguageParser: Send + Sync {
    fn language(&self) -> &'static str;
    fn parse(&self, path: &str, source: &str) -> ParsedSource;
}

/// Map a file extension to a language tag.
pub fn detect_language(path: &str) -> Option<&'static str> {
    let ext = std::path::Path::new(path)
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("");
    Some(match ext {
        "ts" | "mts" | "cts" => "typescript",
        "tsx" => "tsx",
        "js" | "mjs" | "cjs" | "jsx" => "javascript",
        "py" => "python",
        "rs" => "rust",
        "svelte" => "svelte",
        _ => return None,
    })
}

pub fn parser_for(language: &str) -> Option<Box<dyn LanguageParser>> {
    Some(match language {
        "typescript" => Box::new(typescript::TypeScriptParser::new("typescript")),
        "tsx" => Box::new(typescript::TypeScriptParser::new("tsx")),
        // Svelte scripts are close enough to TS for regex extraction.
        "svelte" => Box::new(typescript::TypeScriptParser::new("svelte")),
        "javascript" => Box::new(javascript::JavaScriptParser::new()),
        "python" => Box::new(python::PythonParser::new()),
        "rust" => Box::new(rust_lang::RustParser::new()),
        _ => return None,
    })
}

pub fn parser_for_path(path: &str) -> Option<Box<dyn LanguageParser>> {
    detect_language(path).and_then(parser_for)
}

/// Keywords that look like calls in C-family syntax.
pub fn is_ecma_keyword(name: &str) -> bool {
    matches!(
        name,
        "if" | "for"
            | "while"
            | "switch"
            | "catch"
            | "return"
            | "function"
            | "typeof"
            | "instanceof"
            | "new"
            | "await"
            | "yield"
            | "super"
            | "constructor"
            | "do"
            | "else"
            | "throw"
            | "delete"
            | "void"
            | "in"
            | "of"
            | "case"
    )
}
