//! Callable extraction from Python syntax trees.
//!
//! Extracts every `def` / `async def`, including:
//! - Module-level functions
//! - Methods (functions inside classes, nested classes included)
//! - Closures and helpers defined inside other functions
//! - Definitions under `if` / `try` / `with` / loops
//!
//! A later definition of the same qualified name replaces the earlier one,
//! together with anything nested inside the earlier one, mirroring runtime
//! shadowing.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;
use tree_sitter::{Node, Parser};

use super::module_path::{module_name, ScopeKind, ScopeStack};
use crate::error::{GhostbustError, GhostbustResult, IoResultExt};

/// A callable declared in source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallableDeclaration {
    /// Dotted path: module, enclosing scopes, name (e.g. `app.Server.start`)
    pub qualified_name: String,
    /// Bare function name
    pub name: String,
    /// Defining file
    pub source_file: PathBuf,
    /// 1-based line of the `def` keyword
    pub line_number: usize,
    /// 1-based line the interpreter reports for this callable's code object
    /// (the first decorator line when decorated)
    pub code_line: usize,
    /// Decorator expressions without the leading `@`
    #[serde(default)]
    pub decorators: Vec<String>,
    /// Defined directly in a class body
    pub is_method: bool,
    pub is_async: bool,
    /// Body does nothing but document, `pass`, `...` or raise `NotImplementedError`
    pub is_stub: bool,
}

impl CallableDeclaration {
    /// Decorator callee paths with call arguments stripped
    /// (`app.route("/")` becomes `app.route`).
    pub fn decorator_names(&self) -> impl Iterator<Item = &str> {
        self.decorators
            .iter()
            .map(|d| d.split('(').next().unwrap_or(d).trim())
    }
}

/// Syntax-tree walker collecting declarations for one file.
struct DeclarationCollector<'a> {
    source: &'a [u8],
    file: PathBuf,
    scopes: ScopeStack,
    /// Declarations by qualified name; later definitions replace earlier ones
    found: HashMap<String, CallableDeclaration>,
    /// Every scope path seen so far (functions and classes)
    seen_scopes: HashSet<String>,
}

impl<'a> DeclarationCollector<'a> {
    fn new(file: &Path, source: &'a [u8]) -> Self {
        Self {
            source,
            file: file.to_path_buf(),
            scopes: ScopeStack::new(module_name(file)),
            found: HashMap::with_capacity(32), // Pre-allocate for typical file
            seen_scopes: HashSet::new(),
        }
    }

    fn text(&self, node: Node) -> &'a str {
        node.utf8_text(self.source).unwrap_or("")
    }

    /// A redefinition makes everything declared inside the old body unreachable.
    fn shadow(&mut self, path: &str) {
        if !self.seen_scopes.insert(path.to_string()) {
            let prefix = format!("{}.", path);
            self.found.retain(|k, _| !k.starts_with(&prefix));
            self.seen_scopes.retain(|k| !k.starts_with(&prefix));
        }
    }

    fn visit(&mut self, node: Node) {
        match node.kind() {
            "function_definition" => self.visit_function(node, node, Vec::new()),
            "class_definition" => self.visit_class(node),
            "decorated_definition" => self.visit_decorated(node),
            _ => self.visit_children(node),
        }
    }

    fn visit_children(&mut self, node: Node) {
        let mut cursor = node.walk();
        let children: Vec<Node> = node.named_children(&mut cursor).collect();
        for child in children {
            self.visit(child);
        }
    }

    fn visit_decorated(&mut self, node: Node) {
        let mut cursor = node.walk();
        let decorators: Vec<String> = node
            .named_children(&mut cursor)
            .filter(|c| c.kind() == "decorator")
            .map(|d| self.text(d).trim_start_matches('@').trim().to_string())
            .collect();

        match node.child_by_field_name("definition") {
            Some(def) if def.kind() == "function_definition" => {
                self.visit_function(def, node, decorators)
            }
            Some(def) => self.visit(def),
            None => {}
        }
    }

    /// `outer` is the decorated wrapper when present, otherwise `def` itself.
    fn visit_function(&mut self, def: Node, outer: Node, decorators: Vec<String>) {
        let Some(name_node) = def.child_by_field_name("name") else {
            return;
        };
        let name = self.text(name_node).to_string();
        let qualified_name = self.scopes.qualify(&name);
        self.shadow(&qualified_name);

        let body = def.child_by_field_name("body");
        let decl = CallableDeclaration {
            qualified_name: qualified_name.clone(),
            name: name.clone(),
            source_file: self.file.clone(),
            line_number: def.start_position().row + 1,
            code_line: outer.start_position().row + 1,
            decorators,
            is_method: self.scopes.innermost() == Some(ScopeKind::Class),
            is_async: def.child(0).is_some_and(|c| c.kind() == "async"),
            is_stub: body.is_some_and(|b| self.is_stub_body(b)),
        };
        self.found.insert(qualified_name, decl);

        if let Some(body) = body {
            self.scopes.push(ScopeKind::Function, name);
            self.visit_children(body);
            self.scopes.pop();
        }
    }

    fn visit_class(&mut self, node: Node) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = self.text(name_node).to_string();
        let path = self.scopes.qualify(&name);
        self.shadow(&path);

        if let Some(body) = node.child_by_field_name("body") {
            self.scopes.push(ScopeKind::Class, name);
            self.visit_children(body);
            self.scopes.pop();
        }
    }

    fn is_stub_body(&self, body: Node) -> bool {
        let mut cursor = body.walk();
        let statements: Vec<Node> = body
            .named_children(&mut cursor)
            .filter(|s| s.kind() != "comment")
            .collect();

        !statements.is_empty()
            && statements.iter().all(|s| match s.kind() {
                "pass_statement" => true,
                "expression_statement" => {
                    let mut c = s.walk();
                    let exprs: Vec<Node> = s.named_children(&mut c).collect();
                    exprs.len() == 1 && matches!(exprs[0].kind(), "string" | "ellipsis")
                }
                "raise_statement" => self.text(*s).contains("NotImplementedError"),
                _ => false,
            })
    }

    fn finish(self) -> Vec<CallableDeclaration> {
        let mut decls: Vec<CallableDeclaration> = self.found.into_values().collect();
        decls.sort_by(|a, b| {
            a.line_number
                .cmp(&b.line_number)
                .then_with(|| a.qualified_name.cmp(&b.qualified_name))
        });
        decls
    }
}

/// First error or missing node in document order.
fn first_syntax_error(node: Node) -> Option<Node> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    if !node.has_error() {
        return None;
    }
    let mut cursor = node.walk();
    let children: Vec<Node> = node.children(&mut cursor).collect();
    children.into_iter().find_map(first_syntax_error)
}

/// Python 2 statements the grammar still accepts but Python 3 rejects.
fn first_legacy_statement(node: Node) -> Option<Node> {
    if matches!(node.kind(), "print_statement" | "exec_statement") {
        return Some(node);
    }
    let mut cursor = node.walk();
    let children: Vec<Node> = node.named_children(&mut cursor).collect();
    children.into_iter().find_map(first_legacy_statement)
}

fn new_parser(path: &Path) -> GhostbustResult<Parser> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_python::LANGUAGE.into())
        .map_err(|e| GhostbustError::parse(path, format!("Python grammar unavailable: {}", e)))?;
    Ok(parser)
}

/// Extract the declarations of one file's content.
///
/// Fails with `GhostbustError::Parse` (file, line, column) on invalid syntax.
pub fn extract_from_source(path: &Path, source: &str) -> GhostbustResult<Vec<CallableDeclaration>> {
    let mut parser = new_parser(path)?;
    let tree = parser
        .parse(source, None)
        .ok_or_else(|| GhostbustError::parse(path, "parser produced no syntax tree"))?;

    let root = tree.root_node();
    if let Some(bad) = first_syntax_error(root) {
        let pos = bad.start_position();
        let message = if bad.is_missing() {
            format!("expected '{}'", bad.kind())
        } else {
            "invalid syntax".to_string()
        };
        return Err(GhostbustError::parse_at(path, message, pos.row + 1, pos.column + 1));
    }
    if let Some(stmt) = first_legacy_statement(root) {
        let pos = stmt.start_position();
        let keyword = if stmt.kind() == "exec_statement" { "exec" } else { "print" };
        let message = format!("Missing parentheses in call to '{}'", keyword);
        return Err(GhostbustError::parse_at(path, message, pos.row + 1, pos.column + 1));
    }

    let mut collector = DeclarationCollector::new(path, source.as_bytes());
    collector.visit(root);
    Ok(collector.finish())
}

/// Read and extract one file.
pub fn extract_file(path: &Path) -> GhostbustResult<Vec<CallableDeclaration>> {
    let bytes = fs::read(path).with_path(path)?;
    let source = String::from_utf8(bytes)
        .map_err(|e| GhostbustError::parse(path, format!("source is not UTF-8: {}", e)))?;
    extract_from_source(path, &source)
}

/// Extract the declared callables of every file in `paths`.
///
/// Files are parsed in parallel. The result is ordered by file, then line.
/// The first file (in input order) that fails to read or parse fails the call;
/// no file is skipped.
pub fn extract_declarations(paths: &[PathBuf]) -> GhostbustResult<Vec<CallableDeclaration>> {
    let mut unique: Vec<&PathBuf> = Vec::with_capacity(paths.len());
    let mut seen = HashSet::new();
    for path in paths {
        let key = fs::canonicalize(path).unwrap_or_else(|_| path.clone());
        if seen.insert(key) {
            unique.push(path);
        }
    }

    let results: Vec<GhostbustResult<Vec<CallableDeclaration>>> =
        unique.par_iter().map(|p| extract_file(p)).collect();

    let mut all = Vec::new();
    for result in results {
        all.extend(result?);
    }
    all.sort_by(|a, b| {
        a.source_file
            .cmp(&b.source_file)
            .then(a.line_number.cmp(&b.line_number))
    });

    debug!(files = unique.len(), declarations = all.len(), "extracted declarations");
    Ok(all)
}
