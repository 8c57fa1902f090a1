use serde::{Deserialize, Serialize};

pub mod reference;

/// Source span of a symbol. Lines are 1-based, columns 0-based, end
/// positions exclusive.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Span {
    pub start_line: u32,
    pub start_col: u32,
    pub end_line: u32,
    pub end_col: u32,
}

impl Span {
    pub fn lines(start_line: u32, end_line: u32) -> Self {
        Self {
            start_line,
            start_col: 0,
            end_line,
            end_col: 0,
        }
    }

    pub fn contains_line(&self, line: u32) -> bool {
        self.start_line <= line && line <= self.end_line
    }

    /// Strict containment used for parent/child nesting.
    pub fn encloses(&self, other: &Span) -> bool {
        self.start_line <= other.start_line
            && other.end_line <= self.end_line
            && (self.start_line < other.start_line || other.end_line < self.end_line)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    File,
    Module,
    Class,
    Struct,
    Interface,
    Trait,
    Protocol,
    Function,
    Method,
    Property,
    Field,
    Variable,
    Constant,
    Enum,
    EnumMember,
    TypeAlias,
    Namespace,
    Parameter,
    Import,
    Export,
    Route,
    Component,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::File => "file",
            NodeKind::Module => "module",
            NodeKind::Class => "class",
            NodeKind::Struct => "struct",
            NodeKind::Interface => "interface",
            NodeKind::Trait => "trait",
            NodeKind::Protocol => "protocol",
            NodeKind::Function => "function",
            NodeKind::Method => "method",
            NodeKind::Property => "property",
            NodeKind::Field => "field",
            NodeKind::Variable => "variable",
            NodeKind::Constant => "constant",
            NodeKind::Enum => "enum",
            NodeKind::EnumMember => "enum_member",
            NodeKind::TypeAlias => "type_alias",
            NodeKind::Namespace => "namespace",
            NodeKind::Parameter => "parameter",
            NodeKind::Import => "import",
            NodeKind::Export => "export",
            NodeKind::Route => "route",
            NodeKind::Component => "component",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "file" => NodeKind::File,
            "module" => NodeKind::Module,
            "class" => NodeKind::Class,
            "struct" => NodeKind::Struct,
            "interface" => NodeKind::Interface,
            "trait" => NodeKind::Trait,
            "protocol" => NodeKind::Protocol,
            "function" => NodeKind::Function,
            "method" => NodeKind::Method,
            "property" => NodeKind::Property,
            "field" => NodeKind::Field,
            "variable" => NodeKind::Variable,
            "constant" => NodeKind::Constant,
            "enum" => NodeKind::Enum,
            "enum_member" => NodeKind::EnumMember,
            "type_alias" => NodeKind::TypeAlias,
            "namespace" => NodeKind::Namespace,
            "parameter" => NodeKind::Parameter,
            "import" => NodeKind::Import,
            "export" => NodeKind::Export,
            "route" => NodeKind::Route,
            "component" => NodeKind::Component,
            _ => return None,
        })
    }

    /// Kinds a call site can plausibly target.
    pub fn is_callable(&self) -> bool {
        matches!(
            self,
            NodeKind::Function | NodeKind::Method | NodeKind::Class | NodeKind::Component
        )
    }

    /// Kinds that act as containers for qualified-name purposes.
    pub fn is_container(&self) -> bool {
        matches!(
            self,
            NodeKind::Class
                | NodeKind::Struct
                | NodeKind::Interface
                | NodeKind::Trait
                | NodeKind::Protocol
                | NodeKind::Enum
                | NodeKind::Namespace
                | NodeKind::Module
                | NodeKind::Function
                | NodeKind::Method
        )
    }
}

/// Stable node identifier: a fixed-width blake3 digest of the qualified
/// name (which embeds the repo-relative file path, making the id a pure
/// function of (path, qualified name)).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn derive(qualified_name: &str) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(qualified_name.as_bytes());
        let hex = hasher.finalize().to_hex();
        Self(hex[..32].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A persisted symbol record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    pub name: String,
    /// `<path>::<container>.<name>`, containers joined by `.`. For file
    /// nodes this is the path itself.
    pub qualified_name: String,
    /// Repo-relative, forward-slash normalized.
    pub file: String,
    pub language: String,
    pub span: Span,
    pub doc: Option<String>,
    pub signature: Option<String>,
    pub visibility: Option<String>,
    pub exported: bool,
    pub is_async: bool,
    pub is_static: bool,
    pub is_abstract: bool,
    pub decorators: Vec<String>,
    pub type_params: Vec<String>,
    /// Unix seconds; stamped by the store on write.
    pub updated_at: i64,
}

impl Node {
    pub fn new(
        kind: NodeKind,
        name: impl Into<String>,
        qualified_name: impl Into<String>,
        file: impl Into<String>,
        language: impl Into<String>,
        span: Span,
    ) -> Self {
        let qualified_name = qualified_name.into();
        Self {
            id: NodeId::derive(&qualified_name),
            kind,
            name: name.into(),
            qualified_name,
            file: file.into(),
            language: language.into(),
            span,
            doc: None,
            signature: None,
            visibility: None,
            exported: false,
            is_async: false,
            is_static: false,
            is_abstract: false,
            decorators: Vec::new(),
            type_params: Vec::new(),
            updated_at: 0,
        }
    }

    /// The node representing a file itself.
    pub fn file_node(path: &str, language: &str, line_count: u32) -> Self {
        let name = path.rsplit('/').next().unwrap_or(path).to_string();
        let mut n = Node::new(
            NodeKind::File,
            name,
            path,
            path,
            language,
            Span::lines(1, line_count.max(1)),
        );
        n.exported = true;
        n
    }
}

/// Record of an indexed file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileRecord {
    pub path: String,
    pub hash: String,
    pub language: String,
    pub size: u64,
    pub mtime: i64,
    pub indexed_at: i64,
    pub node_count: i64,
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_id_is_pure_function_of_qualified_name() {
        let a = NodeId::derive("src/a.ts::add");
        let b = NodeId::derive("src/a.ts::add");
        let c = NodeId::derive("src/b.ts::add");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.0.len(), 32);
    }

    #[test]
    fn node_new_derives_id_from_qualified_name() {
        let n = Node::new(
            NodeKind::Function,
            "add",
            "src/a.ts::add",
            "src/a.ts",
            "typescript",
            Span::lines(1, 3),
        );
        assert_eq!(n.id, NodeId::derive("src/a.ts::add"));
    }

    #[test]
    fn span_nesting() {
        let outer = Span::lines(1, 10);
        let inner = Span::lines(2, 5);
        assert!(outer.encloses(&inner));
        assert!(!inner.encloses(&outer));
        assert!(!outer.encloses(&outer));
    }

    #[test]
    fn kind_round_trips_through_str() {
        for k in [
            NodeKind::File,
            NodeKind::EnumMember,
            NodeKind::TypeAlias,
            NodeKind::Route,
        ] {
            assert_eq!(NodeKind::parse(k.as_str()), Some(k));
        }
        assert_eq!(NodeKind::parse("bogus"), None);
    }
}
