use crate::error::{Result as SourceResult, SourceError};
use crate::lookup::SpanIndex;
use crate::symbols::SymbolTable;
use depmap_model::{assembly_qualified, member_name, FileSpan, Item, Link, Node, NodeType, ParseError};
use std::collections::HashSet;
use std::path::PathBuf;
use tree_sitter::{Node as TsNode, Parser, Tree};

/// One source project: the assembly it produces and its compilation's file
/// set.
#[derive(Debug, Clone)]
pub struct SourceProject {
    pub assembly: String,
    pub kind: NodeType,
    pub files: Vec<PathBuf>,
}

/// Declaration-pass output for one project: emitted nodes, the symbol
/// table, the span registry, and the retained syntax trees the reference
/// pass walks.
pub struct Declarations {
    pub assembly: String,
    pub symbols: SymbolTable,
    pub spans: SpanIndex,
    nodes: Vec<Item>,
    files: Vec<FileUnit>,
}

struct FileUnit {
    path: String,
    source: String,
    tree: Tree,
    usings: Vec<String>,
}

pub struct SourceParser {
    parser: Parser,
}

impl SourceParser {
    pub fn new() -> SourceResult<Self> {
        let mut parser = Parser::new();
        let language = tree_sitter_c_sharp::LANGUAGE;
        parser
            .set_language(&language.into())
            .map_err(|err| SourceError::TreeSitter(err.to_string()))?;
        Ok(Self { parser })
    }

    /// Parse a whole project in isolation (no referenced-project symbols).
    pub fn parse_project(
        &mut self,
        project: &SourceProject,
    ) -> std::result::Result<(Vec<Item>, SpanIndex), ParseError> {
        let declarations = self.collect_declarations(project)?;
        let items = Self::bind_references(&declarations, &declarations.symbols);
        Ok((items, declarations.spans.clone()))
    }

    /// Pass 1: read and parse every file, emit declaration nodes and build
    /// the project's symbol table. Nothing is bound yet.
    pub fn collect_declarations(
        &mut self,
        project: &SourceProject,
    ) -> std::result::Result<Declarations, ParseError> {
        let mut declarations = Declarations {
            assembly: project.assembly.clone(),
            symbols: SymbolTable::new(),
            spans: SpanIndex::new(),
            nodes: vec![Item::Node(Node::new(&project.assembly, project.kind))],
            files: Vec::new(),
        };
        let mut seen_namespaces = HashSet::new();

        for path in &project.files {
            let source = std::fs::read_to_string(path)?;
            let Some(tree) = self.parser.parse(&source, None) else {
                log::warn!("tree-sitter produced no tree for {}", path.display());
                continue;
            };

            let display_path = path.to_string_lossy().into_owned();
            let usings = collect_usings(tree.root_node(), &source);
            {
                let mut walker = DeclWalker {
                    assembly: &project.assembly,
                    file: &display_path,
                    source: &source,
                    out: &mut declarations,
                    seen_namespaces: &mut seen_namespaces,
                };
                walker.walk_unit(tree.root_node());
            }

            declarations.files.push(FileUnit {
                path: display_path,
                source,
                tree,
                usings,
            });
        }

        log::info!(
            "collected {} declarations from {} ({} files)",
            declarations.symbols.len(),
            project.assembly,
            declarations.files.len()
        );
        Ok(declarations)
    }

    /// Pass 2: bind references against `symbols` (the project's own table,
    /// usually with referenced projects' tables absorbed) and return the
    /// full item list. Identifiers that do not bind are dropped.
    #[must_use]
    pub fn bind_references(declarations: &Declarations, symbols: &SymbolTable) -> Vec<Item> {
        let mut items = declarations.nodes.clone();
        let mut links = Vec::new();

        for file in &declarations.files {
            let mut walker = RefWalker {
                assembly: &declarations.assembly,
                source: &file.source,
                usings: &file.usings,
                symbols,
                links: &mut links,
            };
            walker.walk_unit(file.tree.root_node());
        }

        items.extend(links.into_iter().map(Item::Link));
        items
    }
}

/// Scope stacks shared by both passes.
#[derive(Clone, Default)]
struct Scope {
    namespaces: Vec<String>,
    types: Vec<String>,
}

impl Scope {
    fn namespace_fqn(&self) -> String {
        self.namespaces.join(".")
    }

    fn namespace_chain(&self) -> Vec<String> {
        let mut chain = Vec::new();
        let mut acc = String::new();
        for segment in &self.namespaces {
            if acc.is_empty() {
                acc = segment.clone();
            } else {
                acc = format!("{acc}.{segment}");
            }
            chain.push(acc.clone());
        }
        chain
    }

    fn type_fqn(&self) -> Option<String> {
        if self.types.is_empty() {
            return None;
        }
        let mut parts = Vec::new();
        let ns = self.namespace_fqn();
        if !ns.is_empty() {
            parts.push(ns);
        }
        parts.extend(self.types.iter().cloned());
        Some(parts.join("."))
    }

    fn child_type_fqn(&self, name: &str) -> String {
        match self.type_fqn() {
            Some(outer) => format!("{outer}.{name}"),
            None => {
                let ns = self.namespace_fqn();
                if ns.is_empty() {
                    name.to_string()
                } else {
                    format!("{ns}.{name}")
                }
            }
        }
    }
}

fn node_text<'a>(node: TsNode<'_>, source: &'a str) -> &'a str {
    source.get(node.byte_range()).unwrap_or("")
}

fn span_of(node: TsNode<'_>, path: &str) -> FileSpan {
    FileSpan::new(
        path.to_string(),
        node.start_position().row as u32 + 1,
        node.end_position().row as u32 + 1,
    )
}

fn has_modifier(node: TsNode<'_>, source: &str, wanted: &[&str]) -> bool {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() == "modifier" && wanted.contains(&node_text(child, source)) {
            return true;
        }
    }
    false
}

fn member_is_private(node: TsNode<'_>, source: &str) -> bool {
    !has_modifier(node, source, &["public", "protected", "internal"])
        || has_modifier(node, source, &["private"])
}

fn type_is_private(node: TsNode<'_>, source: &str) -> bool {
    !has_modifier(node, source, &["public"])
}

/// `///` comment run directly above a declaration, reduced to its
/// `<summary>` text.
fn doc_summary(node: TsNode<'_>, source: &str) -> Option<String> {
    let mut parts = Vec::new();
    let mut sibling = node.prev_sibling();
    while let Some(comment) = sibling {
        if comment.kind() != "comment" {
            break;
        }
        let text = node_text(comment, source).trim_start();
        let Some(rest) = text.strip_prefix("///") else {
            break;
        };
        parts.push(rest.trim().to_string());
        sibling = comment.prev_sibling();
    }
    if parts.is_empty() {
        return None;
    }
    parts.reverse();
    let joined = parts.join(" ");
    let summary = match (joined.find("<summary>"), joined.find("</summary>")) {
        (Some(open), Some(close)) if close > open => joined[open + "<summary>".len()..close].trim(),
        _ => joined.trim(),
    };
    let summary = summary.split_whitespace().collect::<Vec<_>>().join(" ");
    (!summary.is_empty()).then_some(summary)
}

fn collect_usings(root: TsNode<'_>, source: &str) -> Vec<String> {
    let mut usings = Vec::new();
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            match child.kind() {
                "using_directive" => {
                    let mut inner = child.walk();
                    for part in child.named_children(&mut inner) {
                        if matches!(
                            part.kind(),
                            "qualified_name" | "identifier" | "alias_qualified_name"
                        ) {
                            usings.push(node_text(part, source).to_string());
                            break;
                        }
                    }
                }
                "namespace_declaration" | "file_scoped_namespace_declaration" => {
                    stack.push(child);
                }
                _ => {}
            }
        }
    }
    usings
}

/// A dotted identifier path, or `None` when the expression is not a plain
/// name chain (method results, literals, casts...).
fn path_text(node: TsNode<'_>, source: &str) -> Option<String> {
    match node.kind() {
        "identifier" => Some(node_text(node, source).to_string()),
        "generic_name" => {
            let mut cursor = node.walk();
            let name = node
                .named_children(&mut cursor)
                .find(|child| child.kind() == "identifier")
                .map(|child| node_text(child, source).to_string());
            name
        }
        "qualified_name" => Some(node_text(node, source).to_string()),
        "member_access_expression" => {
            let receiver = path_text(node.child_by_field_name("expression")?, source)?;
            let name = path_text(node.child_by_field_name("name")?, source)?;
            Some(format!("{receiver}.{name}"))
        }
        _ => None,
    }
}

fn type_kinds() -> &'static [&'static str] {
    &[
        "class_declaration",
        "struct_declaration",
        "interface_declaration",
        "record_declaration",
        "enum_declaration",
    ]
}

// ── Pass 1: declarations ───────────────────────────────────────

struct DeclWalker<'a> {
    assembly: &'a str,
    file: &'a str,
    source: &'a str,
    out: &'a mut Declarations,
    seen_namespaces: &'a mut HashSet<String>,
}

impl DeclWalker<'_> {
    fn walk_unit(&mut self, root: TsNode<'_>) {
        let mut scope = Scope::default();

        // A file-scoped namespace covers every following declaration.
        let mut cursor = root.walk();
        for child in root.named_children(&mut cursor) {
            if child.kind() == "file_scoped_namespace_declaration" {
                if let Some(name_node) = child.child_by_field_name("name") {
                    self.enter_namespace(node_text(name_node, self.source), &mut scope);
                }
            }
        }

        let mut cursor = root.walk();
        for child in root.named_children(&mut cursor) {
            self.walk_declaration(child, &scope);
        }
    }

    fn enter_namespace(&mut self, dotted: &str, scope: &mut Scope) {
        for segment in dotted.split('.').filter(|s| !s.is_empty()) {
            scope.namespaces.push(segment.to_string());
        }
        let fqn = scope.namespace_fqn();
        if !fqn.is_empty() && self.seen_namespaces.insert(fqn.clone()) {
            let node = Node::new(
                assembly_qualified(self.assembly, &fqn),
                NodeType::Namespace,
            )
            .with_parent(self.assembly);
            self.out.nodes.push(Item::Node(node));
        }
    }

    fn walk_declaration(&mut self, node: TsNode<'_>, scope: &Scope) {
        match node.kind() {
            "namespace_declaration" => {
                let Some(name_node) = node.child_by_field_name("name") else {
                    return;
                };
                let mut inner = scope.clone();
                self.enter_namespace(node_text(name_node, self.source), &mut inner);
                if let Some(body) = node.child_by_field_name("body") {
                    let mut cursor = body.walk();
                    for child in body.named_children(&mut cursor) {
                        self.walk_declaration(child, &inner);
                    }
                }
            }
            "file_scoped_namespace_declaration" => {
                // The namespace is already on the scope (walk_unit); visit
                // whatever the grammar put inside the node itself.
                let name_id = node.child_by_field_name("name").map(|n| n.id());
                let mut cursor = node.walk();
                for child in node.named_children(&mut cursor) {
                    if Some(child.id()) != name_id {
                        self.walk_declaration(child, scope);
                    }
                }
            }
            kind if type_kinds().contains(&kind) => self.walk_type(node, scope),
            _ => {}
        }
    }

    fn walk_type(&mut self, node: TsNode<'_>, scope: &Scope) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = node_text(name_node, self.source);
        if name.is_empty() {
            return;
        }

        let fqn = scope.child_type_fqn(name);
        let node_name = assembly_qualified(self.assembly, &fqn);
        let parent = match scope.type_fqn() {
            Some(outer) => assembly_qualified(self.assembly, &outer),
            None => {
                let ns = scope.namespace_fqn();
                if ns.is_empty() {
                    self.assembly.to_string()
                } else {
                    assembly_qualified(self.assembly, &ns)
                }
            }
        };

        let span = span_of(node, self.file);
        let mut graph_node = Node::new(&node_name, NodeType::Type)
            .with_parent(parent)
            .private(type_is_private(node, self.source))
            .with_span(span.clone());
        if let Some(summary) = doc_summary(node, self.source) {
            graph_node = graph_node.with_description(summary);
        }
        self.out.nodes.push(Item::Node(graph_node));
        self.out.symbols.insert(&fqn, &node_name, NodeType::Type);
        self.out.spans.insert(&node_name, span);

        let mut inner = scope.clone();
        inner.types.push(name.to_string());

        if let Some(body) = node.child_by_field_name("body") {
            let mut cursor = body.walk();
            for child in body.named_children(&mut cursor) {
                self.walk_member(child, &inner, &fqn, &node_name, name);
            }
        }
    }

    fn walk_member(
        &mut self,
        node: TsNode<'_>,
        scope: &Scope,
        type_fqn: &str,
        type_node: &str,
        type_simple: &str,
    ) {
        match node.kind() {
            "method_declaration" => {
                if let Some(name_node) = node.child_by_field_name("name") {
                    let name = node_text(name_node, self.source);
                    let private = member_is_private(node, self.source);
                    self.emit_member(node, type_fqn, type_node, name, NodeType::Method, private);
                }
            }
            "constructor_declaration" => {
                let private = member_is_private(node, self.source);
                self.emit_member(
                    node,
                    type_fqn,
                    type_node,
                    type_simple,
                    NodeType::Constructor,
                    private,
                );
            }
            "property_declaration" => {
                if let Some(name_node) = node.child_by_field_name("name") {
                    let name = node_text(name_node, self.source);
                    let private = member_is_private(node, self.source);
                    self.emit_member(node, type_fqn, type_node, name, NodeType::Property, private);
                }
            }
            "field_declaration" | "event_field_declaration" => {
                let kind = if node.kind() == "event_field_declaration" {
                    NodeType::Event
                } else {
                    NodeType::Field
                };
                let private = member_is_private(node, self.source);
                for declarator in variable_declarators(node) {
                    if let Some(name_node) = declarator.child_by_field_name("name") {
                        let name = node_text(name_node, self.source).to_string();
                        self.emit_member(node, type_fqn, type_node, &name, kind, private);
                    }
                }
            }
            "enum_member_declaration" => {
                if let Some(name_node) = node.child_by_field_name("name") {
                    let name = node_text(name_node, self.source);
                    // Enum literals share their enum's visibility.
                    self.emit_member(node, type_fqn, type_node, name, NodeType::Field, false);
                }
            }
            kind if type_kinds().contains(&kind) => {
                // Nested type.
                self.walk_type(node, scope);
            }
            _ => {}
        }
    }

    fn emit_member(
        &mut self,
        node: TsNode<'_>,
        type_fqn: &str,
        type_node: &str,
        name: &str,
        kind: NodeType,
        is_private: bool,
    ) {
        if name.is_empty() {
            return;
        }
        let member_fqn = format!("{type_fqn}.{name}");
        let member_node = member_name(type_node, name);
        let span = span_of(node, self.file);

        let mut graph_node = Node::new(&member_node, kind)
            .with_parent(type_node)
            .private(is_private)
            .with_span(span.clone());
        if let Some(summary) = doc_summary(node, self.source) {
            graph_node = graph_node.with_description(summary);
        }
        self.out.nodes.push(Item::Node(graph_node));
        self.out.symbols.insert(&member_fqn, &member_node, kind);
        self.out.spans.insert(&member_node, span);
    }
}

fn variable_declarators<'t>(node: TsNode<'t>) -> Vec<TsNode<'t>> {
    let mut declarators = Vec::new();
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        if child.kind() == "variable_declaration" {
            let mut inner = child.walk();
            for declarator in child.named_children(&mut inner) {
                if declarator.kind() == "variable_declarator" {
                    declarators.push(declarator);
                }
            }
        }
    }
    declarators
}

// ── Pass 2: references ─────────────────────────────────────────

struct RefWalker<'a> {
    assembly: &'a str,
    source: &'a str,
    usings: &'a [String],
    symbols: &'a SymbolTable,
    links: &'a mut Vec<Link>,
}

impl RefWalker<'_> {
    fn walk_unit(&mut self, root: TsNode<'_>) {
        let mut scope = Scope::default();
        let mut cursor = root.walk();
        for child in root.named_children(&mut cursor) {
            if child.kind() == "file_scoped_namespace_declaration" {
                if let Some(name_node) = child.child_by_field_name("name") {
                    for segment in node_text(name_node, self.source)
                        .split('.')
                        .filter(|s| !s.is_empty())
                    {
                        scope.namespaces.push(segment.to_string());
                    }
                }
            }
        }

        let mut cursor = root.walk();
        for child in root.named_children(&mut cursor) {
            self.walk_declaration(child, &scope);
        }
    }

    fn walk_declaration(&mut self, node: TsNode<'_>, scope: &Scope) {
        match node.kind() {
            "namespace_declaration" => {
                let Some(name_node) = node.child_by_field_name("name") else {
                    return;
                };
                let mut inner = scope.clone();
                for segment in node_text(name_node, self.source)
                    .split('.')
                    .filter(|s| !s.is_empty())
                {
                    inner.namespaces.push(segment.to_string());
                }
                if let Some(body) = node.child_by_field_name("body") {
                    let mut cursor = body.walk();
                    for child in body.named_children(&mut cursor) {
                        self.walk_declaration(child, &inner);
                    }
                }
            }
            "file_scoped_namespace_declaration" => {
                let name_id = node.child_by_field_name("name").map(|n| n.id());
                let mut cursor = node.walk();
                for child in node.named_children(&mut cursor) {
                    if Some(child.id()) != name_id {
                        self.walk_declaration(child, scope);
                    }
                }
            }
            kind if type_kinds().contains(&kind) => self.walk_type(node, scope),
            _ => {}
        }
    }

    fn walk_type(&mut self, node: TsNode<'_>, scope: &Scope) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = node_text(name_node, self.source);
        let fqn = scope.child_type_fqn(name);
        let type_node_name = assembly_qualified(self.assembly, &fqn);

        let mut inner = scope.clone();
        inner.types.push(name.to_string());

        // Base list: inheritance and interface implementation links.
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            if child.kind() == "base_list" {
                let mut bases = child.walk();
                for base in child.named_children(&mut bases) {
                    if let Some(path) = path_text(base, self.source) {
                        if let Some(found) =
                            self.symbols
                                .resolve(&path, None, &inner.namespace_chain(), self.usings)
                        {
                            self.links.push(
                                Link::new(&type_node_name, &found.node_name, found.kind)
                                    .with_description("inherits"),
                            );
                        }
                    }
                }
            }
        }

        if let Some(body) = node.child_by_field_name("body") {
            let mut cursor = body.walk();
            for child in body.named_children(&mut cursor) {
                self.walk_member(child, &inner, &fqn, &type_node_name, name);
            }
        }
    }

    fn walk_member(
        &mut self,
        node: TsNode<'_>,
        scope: &Scope,
        type_fqn: &str,
        type_node: &str,
        type_simple: &str,
    ) {
        let member: Option<String> = match node.kind() {
            "method_declaration" | "property_declaration" => node
                .child_by_field_name("name")
                .map(|n| node_text(n, self.source).to_string()),
            "constructor_declaration" => Some(type_simple.to_string()),
            "field_declaration" | "event_field_declaration" => variable_declarators(node)
                .first()
                .and_then(|d| d.child_by_field_name("name"))
                .map(|n| node_text(n, self.source).to_string()),
            kind if type_kinds().contains(&kind) => {
                self.walk_type(node, scope);
                return;
            }
            _ => None,
        };

        let Some(member) = member else {
            return;
        };
        let source_node = member_name(type_node, &member);
        self.walk_expressions(node, scope, type_fqn, &source_node);
    }

    /// Scan a member subtree for bindable references.
    fn walk_expressions(
        &mut self,
        node: TsNode<'_>,
        scope: &Scope,
        type_fqn: &str,
        source_node: &str,
    ) {
        match node.kind() {
            "invocation_expression" => {
                let function = node.child_by_field_name("function");
                if let Some(function) = function {
                    if let Some(path) = path_text(function, self.source) {
                        self.bind(&path, scope, type_fqn, source_node, ReferenceShape::Call);
                    }
                    // Arguments may hold nested calls; the function path is
                    // already handled.
                    let mut cursor = node.walk();
                    for child in node.named_children(&mut cursor) {
                        if child.id() != function.id() {
                            self.walk_expressions(child, scope, type_fqn, source_node);
                        }
                    }
                    return;
                }
            }
            "object_creation_expression" => {
                if let Some(type_node_ts) = node.child_by_field_name("type") {
                    if let Some(path) = path_text(type_node_ts, self.source) {
                        self.bind(&path, scope, type_fqn, source_node, ReferenceShape::Creation);
                    }
                }
            }
            "variable_declaration" => {
                if let Some(type_node_ts) = node.child_by_field_name("type") {
                    if let Some(path) = path_text(type_node_ts, self.source) {
                        self.bind(&path, scope, type_fqn, source_node, ReferenceShape::TypeUse);
                    }
                }
            }
            "member_access_expression" => {
                if let Some(path) = path_text(node, self.source) {
                    self.bind(&path, scope, type_fqn, source_node, ReferenceShape::Access);
                    return; // children are the same path
                }
            }
            _ => {}
        }

        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            self.walk_expressions(child, scope, type_fqn, source_node);
        }
    }

    fn bind(
        &mut self,
        path: &str,
        scope: &Scope,
        type_fqn: &str,
        source_node: &str,
        shape: ReferenceShape,
    ) {
        let Some(found) = self.symbols.resolve(
            path,
            Some(type_fqn),
            &scope.namespace_chain(),
            self.usings,
        ) else {
            return; // unresolved identifiers are dropped, not faulted
        };
        if found.node_name == source_node {
            return;
        }

        let description = match (shape, found.kind) {
            (ReferenceShape::Creation, _) => "object creation",
            (_, NodeType::Constructor) => "constructor call",
            (_, NodeType::Method) => "method call",
            (_, NodeType::Field) => "field access",
            (_, NodeType::Property) => "property access",
            (_, NodeType::Event) => "event access",
            _ => "type reference",
        };

        // Object creation binds the constructor when one is declared.
        let (target, target_type) = if shape == ReferenceShape::Creation {
            let simple = found.fqn.rsplit('.').next().unwrap_or(&found.fqn);
            match self.symbols.get(&format!("{}.{simple}", found.fqn)) {
                Some(ctor) => (ctor.node_name.clone(), ctor.kind),
                None => (found.node_name.clone(), found.kind),
            }
        } else {
            (found.node_name.clone(), found.kind)
        };

        self.links
            .push(Link::new(source_node, target, target_type).with_description(description));
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum ReferenceShape {
    Call,
    Creation,
    TypeUse,
    Access,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    const ENGINE_CS: &str = r#"using Util;

namespace Core
{
    public interface IParser
    {
        void Run();
    }

    /// <summary>Drives a parse pass.</summary>
    public class Engine : IParser
    {
        private int count;

        public Engine()
        {
        }

        /// <summary>Runs the engine.</summary>
        public void Run()
        {
            var logger = new Logger();
            Helper();
            var level = Severity.High;
            Unknown.Stuff();
        }

        private void Helper()
        {
        }

        public int Count { get; set; }
    }

    public enum Severity
    {
        Low,
        High,
    }
}
"#;

    const LOGGER_CS: &str = r#"namespace Util;

public class Logger
{
    public void Write()
    {
    }
}
"#;

    fn write_project(dir: &TempDir) -> SourceProject {
        let engine = dir.path().join("Engine.cs");
        let logger = dir.path().join("Logger.cs");
        std::fs::write(&engine, ENGINE_CS).unwrap();
        std::fs::write(&logger, LOGGER_CS).unwrap();
        SourceProject {
            assembly: "LibA".to_string(),
            kind: NodeType::Dll,
            files: vec![engine, logger],
        }
    }

    fn parsed(dir: &TempDir) -> (Vec<Item>, SpanIndex) {
        let project = write_project(dir);
        let mut parser = SourceParser::new().unwrap();
        parser.parse_project(&project).unwrap()
    }

    fn find<'a>(items: &'a [Item], name: &str) -> &'a Node {
        items
            .iter()
            .filter_map(|item| match item {
                Item::Node(node) => Some(node),
                Item::Link(_) => None,
            })
            .find(|node| node.name == name)
            .unwrap_or_else(|| panic!("missing node {name}"))
    }

    fn links_from<'a>(items: &'a [Item], source: &str) -> Vec<&'a Link> {
        items
            .iter()
            .filter_map(|item| match item {
                Item::Link(link) if link.source == source => Some(link),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn declarations_build_the_containment_chain_with_spans() {
        let dir = TempDir::new().unwrap();
        let (items, _) = parsed(&dir);

        assert_eq!(find(&items, "LibA").node_type, NodeType::Dll);

        let ns = find(&items, "LibA > Core");
        assert_eq!(ns.node_type, NodeType::Namespace);
        assert_eq!(ns.parent.as_deref(), Some("LibA"));

        let engine = find(&items, "LibA > Core.Engine");
        assert_eq!(engine.node_type, NodeType::Type);
        assert_eq!(engine.parent.as_deref(), Some("LibA > Core"));
        assert!(!engine.is_private);
        let span = engine.span.as_ref().expect("source node has a span");
        assert!(span.path.ends_with("Engine.cs"));
        assert!(span.start_line > 1);
        assert!(span.end_line > span.start_line);
    }

    #[test]
    fn file_scoped_namespaces_cover_their_declarations() {
        let dir = TempDir::new().unwrap();
        let (items, _) = parsed(&dir);

        let logger = find(&items, "LibA > Util.Logger");
        assert_eq!(logger.parent.as_deref(), Some("LibA > Util"));
        find(&items, "LibA > Util.Logger.Write");
    }

    #[test]
    fn members_carry_kind_visibility_and_doc_text() {
        let dir = TempDir::new().unwrap();
        let (items, _) = parsed(&dir);

        let field = find(&items, "LibA > Core.Engine.count");
        assert_eq!(field.node_type, NodeType::Field);
        assert!(field.is_private);

        let ctor = find(&items, "LibA > Core.Engine.Engine");
        assert_eq!(ctor.node_type, NodeType::Constructor);
        assert!(!ctor.is_private);

        let run = find(&items, "LibA > Core.Engine.Run");
        assert_eq!(run.node_type, NodeType::Method);
        assert_eq!(run.description.as_deref(), Some("Runs the engine."));

        let helper = find(&items, "LibA > Core.Engine.Helper");
        assert!(helper.is_private);

        let property = find(&items, "LibA > Core.Engine.Count");
        assert_eq!(property.node_type, NodeType::Property);

        let engine = find(&items, "LibA > Core.Engine");
        assert_eq!(engine.description.as_deref(), Some("Drives a parse pass."));

        let level = find(&items, "LibA > Core.Severity.High");
        assert_eq!(level.node_type, NodeType::Field);
        assert!(!level.is_private);
    }

    #[test]
    fn references_bind_through_usings_and_scope() {
        let dir = TempDir::new().unwrap();
        let (items, _) = parsed(&dir);
        let from_run = links_from(&items, "LibA > Core.Engine.Run");

        // new Logger() binds the type through the using directive; Logger
        // declares no constructor, so the link lands on the type.
        assert!(from_run.iter().any(|l| {
            l.target == "LibA > Util.Logger" && l.description.as_deref() == Some("object creation")
        }));

        // Helper() binds as a member of the enclosing type.
        assert!(from_run.iter().any(|l| {
            l.target == "LibA > Core.Engine.Helper"
                && l.target_type == NodeType::Method
                && l.description.as_deref() == Some("method call")
        }));

        // Severity.High binds through the enclosing namespace.
        assert!(from_run.iter().any(|l| {
            l.target == "LibA > Core.Severity.High" && l.target_type == NodeType::Field
        }));
    }

    #[test]
    fn unresolved_identifiers_produce_no_links() {
        let dir = TempDir::new().unwrap();
        let (items, _) = parsed(&dir);
        let from_run = links_from(&items, "LibA > Core.Engine.Run");
        assert!(from_run.iter().all(|l| !l.target.contains("Unknown")));
    }

    #[test]
    fn base_lists_become_inherits_links() {
        let dir = TempDir::new().unwrap();
        let (items, _) = parsed(&dir);
        let engine_links = links_from(&items, "LibA > Core.Engine");
        assert!(engine_links.iter().any(|l| {
            l.target == "LibA > Core.IParser" && l.description.as_deref() == Some("inherits")
        }));
    }

    #[test]
    fn span_index_supports_inverse_lookup() {
        let dir = TempDir::new().unwrap();
        let (_, spans) = parsed(&dir);

        let run_span = spans.span_of("LibA > Core.Engine.Run").unwrap().clone();
        let inside = run_span.start_line + 1;
        assert_eq!(
            spans.node_at(&run_span.path, inside),
            Some("LibA > Core.Engine.Run")
        );
    }

    #[test]
    fn cross_project_references_bind_via_absorbed_tables() {
        let lib_dir = TempDir::new().unwrap();
        let lib_project = write_project(&lib_dir);

        let app_dir = TempDir::new().unwrap();
        let main_cs = app_dir.path().join("Main.cs");
        std::fs::write(
            &main_cs,
            r#"using Core;

namespace App
{
    public class Program
    {
        public void Main()
        {
            var engine = new Engine();
        }
    }
}
"#,
        )
        .unwrap();
        let app_project = SourceProject {
            assembly: "AppB".to_string(),
            kind: NodeType::Exe,
            files: vec![main_cs],
        };

        let mut parser = SourceParser::new().unwrap();
        let lib_decls = parser.collect_declarations(&lib_project).unwrap();
        let app_decls = parser.collect_declarations(&app_project).unwrap();

        let mut visible = app_decls.symbols.clone();
        visible.absorb(&lib_decls.symbols);
        let items = SourceParser::bind_references(&app_decls, &visible);

        // Engine declares a constructor, so creation binds to it.
        let from_main = links_from(&items, "AppB > App.Program.Main");
        assert!(from_main.iter().any(|l| {
            l.target == "LibA > Core.Engine.Engine" && l.target_type == NodeType::Constructor
        }));
    }

    #[test]
    fn missing_source_file_fails_the_project() {
        let project = SourceProject {
            assembly: "Ghost".to_string(),
            kind: NodeType::Dll,
            files: vec![PathBuf::from("/nonexistent/Ghost.cs")],
        };
        let mut parser = SourceParser::new().unwrap();
        assert!(parser.parse_project(&project).is_err());
    }
}
