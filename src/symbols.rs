use serde::Serialize;
use std::collections::BTreeSet;

/// Kind of a collected definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    Function,
    Method,
    Class,
    Variable,
    Import,
}

impl SymbolKind {
    /// The `type` string emitted in the results document.
    pub fn item_type(self) -> &'static str {
        match self {
            SymbolKind::Function => "unused_function",
            SymbolKind::Method => "unused_method",
            SymbolKind::Class => "unused_class",
            SymbolKind::Variable => "unused_variable",
            SymbolKind::Import => "unused_import",
        }
    }
}

/// Kind of a collected reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UsageKind {
    Call,
    Attribute,
    ImportRef,
    NameRef,
    DecoratorRef,
    /// A SQLAlchemy ORM reference: `Model.query`, `session.query(Model)`,
    /// `relationship("Model")`, `ForeignKey("table.col")`, `backref("name")`.
    /// The name may be a class name, a table name, or a backref name.
    OrmRef,
}

/// Source position: repository-relative POSIX path, 1-based line,
/// 0-based column.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Location {
    pub file: String,
    pub line: usize,
    pub col: usize,
}

/// A definition discovered in the source tree. Immutable after the
/// recognizer has run; `qualified_name` is the unique key.
#[derive(Debug, Clone)]
pub struct Symbol {
    /// `<module>.<name>`, or `<module>.<Class>.<name>` for methods.
    pub qualified_name: String,
    /// Leaf identifier.
    pub name: String,
    pub kind: SymbolKind,
    pub location: Location,
    /// Normalized decorator strings in source order.
    pub decorators: Vec<String>,
    /// Set by the entrypoint recognizer.
    pub is_entrypoint: bool,
    /// All matching recognizer reasons, e.g. `flask:*.route`.
    pub entrypoint_reasons: Vec<String>,
    /// Qualified name of the enclosing class (methods only).
    pub parent_class: Option<String>,
    /// Base-class leaf names. For a class: its own bases; for a method:
    /// the enclosing class's bases. Expanded to the transitive in-project
    /// closure before the recognizer runs.
    pub parent_class_bases: Vec<String>,
    /// Suppression codes in effect on the definition line.
    pub noqa_codes: BTreeSet<String>,
    /// The symbol is the target of a non-literal dynamic attribute form
    /// (`getattr(x, expr)`); the scorer caps its confidence at 50.
    pub dynamic_risk: bool,
}

impl Symbol {
    pub fn is_dunder(&self) -> bool {
        self.name.starts_with("__") && self.name.ends_with("__")
    }

    pub fn is_private(&self) -> bool {
        self.name.starts_with('_') && !self.is_dunder()
    }
}

/// A reference to a name, with enclosing-caller attribution.
#[derive(Debug, Clone)]
pub struct Usage {
    /// The identifier as written (leaf of the chain).
    pub name: String,
    /// Full dotted form when known, e.g. `app.route`.
    pub attribute_chain: Option<String>,
    pub kind: UsageKind,
    pub location: Location,
    /// Qualified name of the enclosing function or method; absent at
    /// module (or class-body) scope.
    pub caller: Option<String>,
    /// Module the reference appears in.
    pub module: String,
}

impl Usage {
    /// The dotted chain used for resolution; falls back to the leaf name.
    pub fn chain(&self) -> &str {
        self.attribute_chain.as_deref().unwrap_or(&self.name)
    }
}

/// Raw import fact collected by the visitor, one per imported name.
#[derive(Debug, Clone)]
pub struct ImportRecord {
    /// The module text as written (`a.b` in `from a.b import c`), empty
    /// for `from . import c`.
    pub module_text: String,
    /// Imported name for `from`-imports; `None` for plain `import a.b`.
    pub imported_name: Option<String>,
    pub alias: Option<String>,
    /// Relative-import level (number of leading dots).
    pub level: usize,
    pub is_star: bool,
    /// Local binding introduced by the statement; empty for star imports.
    pub local_name: String,
    pub location: Location,
    /// Module containing the import statement.
    pub from_module: String,
}

/// A resolved module-level import relation.
#[derive(Debug, Clone, Serialize)]
pub struct ImportEdge {
    pub from_module: String,
    pub to_module: String,
    pub imported_name: Option<String>,
    pub alias: Option<String>,
    pub is_star: bool,
    /// The target is outside the project; ignored by reachability.
    pub external: bool,
}

/// Per-file record kept alongside the symbol table.
#[derive(Debug, Clone)]
pub struct ModuleRecord {
    pub file: String,
    pub module: String,
    pub is_package: bool,
    /// The file has a module-top `if __name__ == "__main__":` block.
    pub has_main_block: bool,
    /// Parsing failed; the file is excluded from the graph and from
    /// orphan determination.
    pub parse_failed: bool,
}

/// Non-fatal problem recorded during analysis.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Diagnostic {
    pub file: String,
    pub line: usize,
    pub kind: DiagnosticKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    Io,
    Parse,
    Timeout,
    Redefinition,
    Dynamic,
    Ambiguity,
}

/// A scored symbol; the scoring fields are filled exactly once.
#[derive(Debug, Clone)]
pub struct DependencyNode {
    pub symbol: Symbol,
    pub confidence: u8,
    pub reachable: bool,
    pub reasons: Vec<String>,
    pub usage_count: usize,
}

/// The externally serialized candidate record.
#[derive(Debug, Clone, Serialize)]
pub struct DeadCodeItem {
    pub qualified_name: String,
    pub name: String,
    #[serde(rename = "type")]
    pub item_type: &'static str,
    pub file: String,
    pub line: usize,
    pub decorators: Vec<String>,
    pub confidence: u8,
    pub reasons: Vec<String>,
    pub suggested_action: &'static str,
}

/// Maps a confidence value to the suggested action band.
pub fn suggested_action(confidence: u8) -> &'static str {
    if confidence >= 80 {
        "delete"
    } else if confidence >= 50 {
        "review"
    } else {
        "keep"
    }
}
