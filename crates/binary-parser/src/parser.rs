use crate::doc;
use crate::il;
use crate::metadata::{
    CodedIndex, Metadata, TABLE_ASSEMBLY_REF, TABLE_FIELD, TABLE_MEMBER_REF, TABLE_METHOD_DEF,
    TABLE_METHOD_SPEC, TABLE_MODULE, TABLE_MODULE_REF, TABLE_TYPE_DEF, TABLE_TYPE_REF,
};
use crate::pe::PeFile;
use depmap_model::{assembly_qualified, member_name, Item, Link, Node, NodeType, ParseError};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;

// TypeAttributes / FieldAttributes / MethodAttributes masks (ECMA-335 II.23.1).
const TYPE_VISIBILITY_MASK: u32 = 0x7;
const MEMBER_ACCESS_MASK: u16 = 0x7;
const MEMBER_ACCESS_PUBLIC: u16 = 0x6;
const MEMBER_ACCESS_FAMILY: u16 = 0x4;
const MEMBER_ACCESS_FAM_OR_ASSEM: u16 = 0x5;

/// Parses one compiled module into graph items.
///
/// The whole artifact either parses or fails: nothing is returned for a
/// module whose image, metadata or IL cannot be decoded.
pub struct BinaryParser;

impl BinaryParser {
    /// Parse the module at `path`, returning its buffered items in emission
    /// order (module, namespaces, types with members, then links).
    pub fn parse(path: &Path) -> std::result::Result<Vec<Item>, ParseError> {
        if !path.exists() {
            return Err(ParseError::NotFound(path.to_path_buf()));
        }
        let data = std::fs::read(path)?;

        let pe = PeFile::parse(data)
            .map_err(|err| ParseError::malformed(path, err.to_string()))?;
        let metadata = Metadata::parse(&pe)
            .map_err(|err| ParseError::malformed(path, err.to_string()))?;

        // Walk every method body up front so IL failures surface before a
        // single fragment is produced.
        let mut bodies: HashMap<u32, Vec<u32>> = HashMap::new();
        for (index, method) in metadata.methods.iter().enumerate() {
            if method.rva == 0 {
                continue;
            }
            let offset = pe
                .rva_to_offset(method.rva)
                .map_err(|err| ParseError::malformed(path, err.to_string()))?;
            let tokens = il::method_tokens(&pe.data()[offset..])
                .map_err(|err| ParseError::malformed(path, err.to_string()))?;
            bodies.insert(index as u32 + 1, tokens);
        }

        let kind = module_kind(path, pe.is_executable_image);
        let summaries = doc::load_summaries(&path.with_extension("xml"));
        let fallback = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "module".to_string());

        let emitter = Emitter::new(&metadata, kind, summaries, fallback);
        let items = emitter.emit(&bodies);
        log::info!(
            "parsed module {}: {} items",
            path.display(),
            items.len()
        );
        Ok(items)
    }
}

fn module_kind(path: &Path, executable_image: bool) -> NodeType {
    let by_extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("exe"));
    match by_extension {
        Some(true) => NodeType::Exe,
        Some(false) => NodeType::Dll,
        None if executable_image => NodeType::Exe,
        None => NodeType::Dll,
    }
}

fn is_compiler_generated(name: &str) -> bool {
    name.starts_with('<') || name.contains("<>") || name.contains("$$")
}

/// Turns decoded metadata into nodes and links. Separated from the byte
/// plumbing so resolution is exercised directly in tests.
pub(crate) struct Emitter<'a> {
    metadata: &'a Metadata,
    kind: NodeType,
    summaries: HashMap<String, String>,
    assembly: String,
    /// Full dotted name per TypeDef row (1-based); `None` for filtered
    /// compiler-generated types.
    type_names: Vec<Option<String>>,
    /// Declaring TypeDef row per method row (1-based).
    method_owner: Vec<u32>,
    /// Declaring TypeDef row per field row (1-based).
    field_owner: Vec<u32>,
    /// Method rows that implement property/event accessors; folded into
    /// their association instead of emitted as members.
    accessor_methods: HashSet<u32>,
}

impl<'a> Emitter<'a> {
    pub(crate) fn new(
        metadata: &'a Metadata,
        kind: NodeType,
        summaries: HashMap<String, String>,
        fallback_name: String,
    ) -> Self {
        let assembly = metadata
            .assembly_name
            .map(|index| metadata.string_at(index).to_string())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| {
                let module = metadata.string_at(metadata.module_name);
                let trimmed = module
                    .strip_suffix(".dll")
                    .or_else(|| module.strip_suffix(".exe"))
                    .unwrap_or(module);
                if trimmed.is_empty() {
                    fallback_name
                } else {
                    trimmed.to_string()
                }
            });

        let type_names = resolve_type_names(metadata);
        let (method_owner, field_owner) = owner_tables(metadata);
        let accessor_methods = metadata
            .method_semantics
            .iter()
            .map(|row| row.method)
            .collect();

        Self {
            metadata,
            kind,
            summaries,
            assembly,
            type_names,
            method_owner,
            field_owner,
            accessor_methods,
        }
    }

    pub(crate) fn emit(&self, bodies: &HashMap<u32, Vec<u32>>) -> Vec<Item> {
        let mut items = Vec::new();
        let mut links: Vec<Link> = Vec::new();

        items.push(Item::Node(Node::new(&self.assembly, self.kind)));

        // Namespace containers first, so parents precede their children on
        // the stream.
        let namespaces: BTreeSet<&str> = self
            .surviving_types()
            .map(|(row, _)| self.metadata.string_at(self.metadata.type_defs[row as usize - 1].namespace))
            .filter(|ns| !ns.is_empty())
            .collect();
        for ns in namespaces {
            let node = Node::new(assembly_qualified(&self.assembly, ns), NodeType::Namespace)
                .with_parent(&self.assembly);
            items.push(Item::Node(self.describe(node, &format!("N:{ns}"))));
        }

        for (type_row, fqn) in self.surviving_types().collect::<Vec<_>>() {
            self.emit_type(type_row, &fqn, bodies, &mut items, &mut links);
        }

        items.extend(links.into_iter().map(Item::Link));
        items
    }

    fn surviving_types(&self) -> impl Iterator<Item = (u32, String)> + '_ {
        self.type_names.iter().enumerate().filter_map(|(i, name)| {
            name.as_ref().map(|fqn| (i as u32 + 1, fqn.clone()))
        })
    }

    fn emit_type(
        &self,
        type_row: u32,
        fqn: &str,
        bodies: &HashMap<u32, Vec<u32>>,
        items: &mut Vec<Item>,
        links: &mut Vec<Link>,
    ) {
        let def = &self.metadata.type_defs[type_row as usize - 1];
        let type_name = assembly_qualified(&self.assembly, fqn);
        let parent = self.type_parent(type_row, def.namespace);
        let visibility = def.flags & TYPE_VISIBILITY_MASK;
        let is_private = !matches!(visibility, 0x1 | 0x2);

        let node = Node::new(&type_name, NodeType::Type)
            .with_parent(parent)
            .private(is_private);
        items.push(Item::Node(self.describe(node, &format!("T:{fqn}"))));

        if let Some(base) = self.resolve_type_index(def.extends) {
            if !base.ends_with("System.Object") {
                links.push(
                    Link::new(&type_name, base, NodeType::Type).with_description("inherits"),
                );
            }
        }
        for interface_impl in &self.metadata.interface_impls {
            if interface_impl.class == type_row {
                if let Some(target) = self.resolve_type_index(interface_impl.interface) {
                    links.push(
                        Link::new(&type_name, target, NodeType::Type)
                            .with_description("implements"),
                    );
                }
            }
        }

        self.emit_fields(type_row, fqn, &type_name, items);
        self.emit_properties_and_events(type_row, fqn, &type_name, items);
        self.emit_methods(type_row, fqn, &type_name, bodies, items, links);
    }

    /// Parent of a type node: enclosing type for nested types, namespace
    /// node otherwise, the assembly for the global namespace.
    fn type_parent(&self, type_row: u32, namespace_index: u32) -> String {
        if let Some(&(_, enclosing)) = self
            .metadata
            .nested_classes
            .iter()
            .find(|&&(nested, _)| nested == type_row)
        {
            if let Some(Some(enclosing_fqn)) = self.type_names.get(enclosing as usize - 1) {
                return assembly_qualified(&self.assembly, enclosing_fqn);
            }
        }
        let ns = self.metadata.string_at(namespace_index);
        if ns.is_empty() {
            self.assembly.clone()
        } else {
            assembly_qualified(&self.assembly, ns)
        }
    }

    fn emit_fields(&self, type_row: u32, fqn: &str, type_name: &str, items: &mut Vec<Item>) {
        for field_row in self.field_range(type_row) {
            let field = &self.metadata.fields[field_row as usize - 1];
            let name = self.metadata.string_at(field.name);
            if name.is_empty() || is_compiler_generated(name) {
                continue;
            }
            let access = field.flags & MEMBER_ACCESS_MASK;
            let is_private = !matches!(
                access,
                MEMBER_ACCESS_PUBLIC | MEMBER_ACCESS_FAMILY | MEMBER_ACCESS_FAM_OR_ASSEM
            );
            let node = Node::new(member_name(type_name, name), NodeType::Field)
                .with_parent(type_name)
                .private(is_private);
            items.push(Item::Node(self.describe(node, &format!("F:{fqn}.{name}"))));
        }
    }

    fn emit_properties_and_events(
        &self,
        type_row: u32,
        fqn: &str,
        type_name: &str,
        items: &mut Vec<Item>,
    ) {
        for (property_row, name_index) in
            map_range(&self.metadata.property_maps, type_row, self.metadata.properties.len())
                .map(|row| (row, self.metadata.properties[row as usize - 1].name))
        {
            let name = self.metadata.string_at(name_index);
            if name.is_empty() || is_compiler_generated(name) {
                continue;
            }
            let node = Node::new(member_name(type_name, name), NodeType::Property)
                .with_parent(type_name)
                .private(self.association_is_private(crate::metadata::TABLE_PROPERTY, property_row));
            items.push(Item::Node(self.describe(node, &format!("P:{fqn}.{name}"))));
        }

        for (event_row, name_index) in
            map_range(&self.metadata.event_maps, type_row, self.metadata.events.len())
                .map(|row| (row, self.metadata.events[row as usize - 1].name))
        {
            let name = self.metadata.string_at(name_index);
            if name.is_empty() || is_compiler_generated(name) {
                continue;
            }
            let node = Node::new(member_name(type_name, name), NodeType::Event)
                .with_parent(type_name)
                .private(self.association_is_private(crate::metadata::TABLE_EVENT, event_row));
            items.push(Item::Node(self.describe(node, &format!("E:{fqn}.{name}"))));
        }
    }

    /// Visibility of a property/event follows its accessors: private unless
    /// some accessor is visible outside the type.
    fn association_is_private(&self, table: u8, row: u32) -> bool {
        let mut any_visible = false;
        for semantics in &self.metadata.method_semantics {
            if semantics.method == 0 {
                continue;
            }
            if semantics.association == (CodedIndex { table, row }) {
                if let Some(method) = self.metadata.methods.get(semantics.method as usize - 1) {
                    let access = method.flags & MEMBER_ACCESS_MASK;
                    if matches!(
                        access,
                        MEMBER_ACCESS_PUBLIC | MEMBER_ACCESS_FAMILY | MEMBER_ACCESS_FAM_OR_ASSEM
                    ) {
                        any_visible = true;
                    }
                }
            }
        }
        !any_visible
    }

    fn emit_methods(
        &self,
        type_row: u32,
        fqn: &str,
        type_name: &str,
        bodies: &HashMap<u32, Vec<u32>>,
        items: &mut Vec<Item>,
        links: &mut Vec<Link>,
    ) {
        for method_row in self.method_range(type_row) {
            let method = &self.metadata.methods[method_row as usize - 1];
            let raw_name = self.metadata.string_at(method.name);
            if raw_name.is_empty() || is_compiler_generated(raw_name) {
                continue;
            }
            // Accessors fold into their property/event node.
            if self.accessor_methods.contains(&method_row) {
                continue;
            }

            let (member, kind, doc_id) = self.method_identity(fqn, raw_name);
            let access = method.flags & MEMBER_ACCESS_MASK;
            let is_private = !matches!(
                access,
                MEMBER_ACCESS_PUBLIC | MEMBER_ACCESS_FAMILY | MEMBER_ACCESS_FAM_OR_ASSEM
            );

            let member_node = member_name(type_name, &member);
            let node = Node::new(&member_node, kind)
                .with_parent(type_name)
                .private(is_private);
            items.push(Item::Node(self.describe(node, &doc_id)));

            if let Some(tokens) = bodies.get(&method_row) {
                for &token in tokens {
                    if !il::is_resolvable_table(token) {
                        continue;
                    }
                    if let Some(link) = self.resolve_token_link(&member_node, token) {
                        links.push(link);
                    }
                }
            }
        }
    }

    /// Member name, node kind and doc id for a method; constructors take the
    /// declaring type's simple name, the C# way.
    fn method_identity(&self, fqn: &str, raw_name: &str) -> (String, NodeType, String) {
        if raw_name == ".ctor" || raw_name == ".cctor" {
            let simple = fqn.rsplit('.').next().unwrap_or(fqn);
            (
                simple.to_string(),
                NodeType::Constructor,
                format!("M:{fqn}.#ctor"),
            )
        } else {
            (
                raw_name.to_string(),
                NodeType::Method,
                format!("M:{fqn}.{raw_name}"),
            )
        }
    }

    fn describe(&self, node: Node, doc_id: &str) -> Node {
        match self.summaries.get(doc_id) {
            Some(summary) => node.with_description(summary.clone()),
            None => node,
        }
    }

    fn field_range(&self, type_row: u32) -> std::ops::Range<u32> {
        list_range(
            &self.metadata.type_defs,
            type_row,
            |def| def.field_start,
            self.metadata.fields.len(),
        )
    }

    fn method_range(&self, type_row: u32) -> std::ops::Range<u32> {
        list_range(
            &self.metadata.type_defs,
            type_row,
            |def| def.method_start,
            self.metadata.methods.len(),
        )
    }

    /// Resolve an IL token into a dependency link from `source`.
    fn resolve_token_link(&self, source: &str, token: u32) -> Option<Link> {
        let (target, target_type, description) = self.resolve_token(token)?;
        if target == source {
            return None;
        }
        Some(Link::new(source, target, target_type).with_description(description))
    }

    fn resolve_token(&self, token: u32) -> Option<(String, NodeType, &'static str)> {
        let table = (token >> 24) as u8;
        let row = token & 0x00FF_FFFF;
        if row == 0 {
            return None;
        }
        match table {
            TABLE_TYPE_DEF => {
                let fqn = self.type_names.get(row as usize - 1)?.as_ref()?;
                Some((
                    assembly_qualified(&self.assembly, fqn),
                    NodeType::Type,
                    "type reference",
                ))
            }
            TABLE_TYPE_REF => self
                .resolve_type_ref(row)
                .map(|name| (name, NodeType::Type, "type reference")),
            TABLE_FIELD => {
                let owner_row = *self.field_owner.get(row as usize)?;
                if owner_row == 0 {
                    return None;
                }
                let owner_fqn = self.type_names.get(owner_row as usize - 1)?.as_ref()?;
                let field = self.metadata.fields.get(row as usize - 1)?;
                let name = self.metadata.string_at(field.name);
                if is_compiler_generated(name) {
                    return None;
                }
                Some((
                    member_name(&assembly_qualified(&self.assembly, owner_fqn), name),
                    NodeType::Field,
                    "field access",
                ))
            }
            TABLE_METHOD_DEF => {
                let owner_row = *self.method_owner.get(row as usize)?;
                if owner_row == 0 {
                    return None;
                }
                let owner_fqn = self.type_names.get(owner_row as usize - 1)?.as_ref()?;
                let method = self.metadata.methods.get(row as usize - 1)?;
                let raw_name = self.metadata.string_at(method.name);
                if is_compiler_generated(raw_name) {
                    return None;
                }
                let (member, kind, _) = self.method_identity(owner_fqn, raw_name);
                let description = if kind == NodeType::Constructor {
                    "constructor call"
                } else {
                    "method call"
                };
                Some((
                    member_name(&assembly_qualified(&self.assembly, owner_fqn), &member),
                    kind,
                    description,
                ))
            }
            TABLE_MEMBER_REF => self.resolve_member_ref(row),
            TABLE_METHOD_SPEC => {
                let spec = self.metadata.method_specs.get(row as usize - 1)?;
                let inner = ((u32::from(spec.table)) << 24) | spec.row;
                self.resolve_token(inner)
            }
            _ => None,
        }
    }

    fn resolve_member_ref(&self, row: u32) -> Option<(String, NodeType, &'static str)> {
        let member_ref = self.metadata.member_refs.get(row as usize - 1)?;
        let name = self.metadata.string_at(member_ref.name);
        if name.is_empty() || is_compiler_generated(name) {
            return None;
        }
        if member_ref.parent.row == 0 {
            return None;
        }

        let parent = match member_ref.parent.table {
            TABLE_TYPE_DEF => {
                let fqn = self
                    .type_names
                    .get(member_ref.parent.row as usize - 1)?
                    .as_ref()?;
                assembly_qualified(&self.assembly, fqn)
            }
            TABLE_TYPE_REF => self.resolve_type_ref(member_ref.parent.row)?,
            TABLE_MODULE_REF => {
                let module = self
                    .metadata
                    .module_refs
                    .get(member_ref.parent.row as usize - 1)?;
                self.metadata.string_at(*module).to_string()
            }
            TABLE_METHOD_DEF => {
                // Vararg call site; the link points at the method itself.
                let inner = (u32::from(TABLE_METHOD_DEF) << 24) | member_ref.parent.row;
                return self.resolve_token(inner);
            }
            _ => return None, // generic instantiations (TypeSpec) stay best-effort
        };

        // Field signatures open with 0x06 (ECMA-335 II.23.2.4); everything
        // else is a method shape.
        let is_field = self
            .metadata
            .blob_at(member_ref.signature)
            .and_then(|blob| blob.first().copied())
            == Some(0x06);

        if is_field {
            Some((member_name(&parent, name), NodeType::Field, "field access"))
        } else if name == ".ctor" || name == ".cctor" {
            let simple = parent
                .rsplit('.')
                .next()
                .unwrap_or(&parent)
                .to_string();
            Some((
                member_name(&parent, &simple),
                NodeType::Constructor,
                "constructor call",
            ))
        } else {
            Some((member_name(&parent, name), NodeType::Method, "method call"))
        }
    }

    /// Full node name for a TypeRef, qualified by its resolution scope.
    /// References into other assemblies are first-class: the name lands on
    /// whatever node that assembly's own parse emits (or stays unresolved).
    fn resolve_type_ref(&self, row: u32) -> Option<String> {
        if row == 0 {
            return None;
        }
        let type_ref = self.metadata.type_refs.get(row as usize - 1)?;
        let name = self.metadata.string_at(type_ref.name);
        if name.is_empty() || is_compiler_generated(name) {
            return None;
        }
        let ns = self.metadata.string_at(type_ref.namespace);
        let fqn = if ns.is_empty() {
            name.to_string()
        } else {
            format!("{ns}.{name}")
        };

        match type_ref.scope.table {
            TABLE_ASSEMBLY_REF => {
                if type_ref.scope.row == 0 {
                    return None;
                }
                let assembly = self
                    .metadata
                    .assembly_refs
                    .get(type_ref.scope.row as usize - 1)?;
                Some(assembly_qualified(self.metadata.string_at(*assembly), &fqn))
            }
            TABLE_MODULE | TABLE_MODULE_REF => {
                Some(assembly_qualified(&self.assembly, &fqn))
            }
            TABLE_TYPE_REF => {
                // Nested type: scope is the enclosing TypeRef.
                let enclosing = self.resolve_type_ref(type_ref.scope.row)?;
                Some(format!("{enclosing}.{name}"))
            }
            _ => None,
        }
    }

    fn resolve_type_index(&self, index: CodedIndex) -> Option<String> {
        if index.row == 0 {
            return None;
        }
        match index.table {
            TABLE_TYPE_DEF => {
                let fqn = self.type_names.get(index.row as usize - 1)?.as_ref()?;
                Some(assembly_qualified(&self.assembly, fqn))
            }
            TABLE_TYPE_REF => self.resolve_type_ref(index.row),
            _ => None, // TypeSpec: generic instantiation blobs are skipped
        }
    }
}

/// Full dotted names per TypeDef row; compiler-generated types resolve to
/// `None` and disappear from the graph along with their members.
fn resolve_type_names(metadata: &Metadata) -> Vec<Option<String>> {
    let enclosing: HashMap<u32, u32> = metadata
        .nested_classes
        .iter()
        .map(|&(nested, outer)| (nested, outer))
        .collect();

    fn resolve(
        row: u32,
        metadata: &Metadata,
        enclosing: &HashMap<u32, u32>,
        memo: &mut HashMap<u32, Option<String>>,
        depth: usize,
    ) -> Option<String> {
        if let Some(known) = memo.get(&row) {
            return known.clone();
        }
        if depth > 64 {
            return None;
        }
        let def = metadata.type_defs.get(row as usize - 1)?;
        let name = metadata.string_at(def.name);
        if name.is_empty() || is_compiler_generated(name) {
            memo.insert(row, None);
            return None;
        }
        let full = match enclosing.get(&row) {
            Some(&outer) => {
                let outer_name = resolve(outer, metadata, enclosing, memo, depth + 1)?;
                format!("{outer_name}.{name}")
            }
            None => {
                let ns = metadata.string_at(def.namespace);
                if ns.is_empty() {
                    name.to_string()
                } else {
                    format!("{ns}.{name}")
                }
            }
        };
        memo.insert(row, Some(full.clone()));
        Some(full)
    }

    let mut memo = HashMap::new();
    (1..=metadata.type_defs.len() as u32)
        .map(|row| resolve(row, metadata, &enclosing, &mut memo, 0))
        .collect()
}

/// Owner TypeDef row for every method and field row (index 0 unused).
fn owner_tables(metadata: &Metadata) -> (Vec<u32>, Vec<u32>) {
    let mut method_owner = vec![0u32; metadata.methods.len() + 1];
    let mut field_owner = vec![0u32; metadata.fields.len() + 1];

    for (i, _) in metadata.type_defs.iter().enumerate() {
        let type_row = i as u32 + 1;
        for method_row in list_range(
            &metadata.type_defs,
            type_row,
            |def| def.method_start,
            metadata.methods.len(),
        ) {
            method_owner[method_row as usize] = type_row;
        }
        for field_row in list_range(
            &metadata.type_defs,
            type_row,
            |def| def.field_start,
            metadata.fields.len(),
        ) {
            field_owner[field_row as usize] = type_row;
        }
    }
    (method_owner, field_owner)
}

/// A TypeDef's member list runs from its start index to the next row's
/// start (or the end of the member table).
fn list_range<T>(
    type_defs: &[T],
    type_row: u32,
    start_of: impl Fn(&T) -> u32,
    table_len: usize,
) -> std::ops::Range<u32> {
    let cap = table_len as u32 + 1;
    let index = type_row as usize - 1;
    let start = start_of(&type_defs[index]).clamp(1, cap);
    let end = type_defs
        .get(index + 1)
        .map(|next| start_of(next))
        .unwrap_or(cap)
        .clamp(start, cap);
    start..end
}

/// Rows a map table (PropertyMap / EventMap) assigns to one TypeDef.
fn map_range(
    maps: &[crate::metadata::MapRow],
    type_row: u32,
    table_len: usize,
) -> std::ops::Range<u32> {
    let cap = table_len as u32 + 1;
    for (i, map) in maps.iter().enumerate() {
        if map.parent == type_row {
            let start = map.list_start.clamp(1, cap);
            let end = maps
                .get(i + 1)
                .map(|next| next.list_start)
                .unwrap_or(cap)
                .clamp(start, cap);
            return start..end;
        }
    }
    0..0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{
        FieldRow, MapRow, MemberRefRow, MethodRow, MethodSemanticsRow, PropertyRow, TypeDefRow,
        TypeRefRow,
    };
    use pretty_assertions::assert_eq;

    struct Heap {
        data: Vec<u8>,
    }

    impl Heap {
        fn new() -> Self {
            Self { data: vec![0] }
        }

        fn intern(&mut self, text: &str) -> u32 {
            let index = self.data.len() as u32;
            self.data.extend_from_slice(text.as_bytes());
            self.data.push(0);
            index
        }
    }

    const TYPE_PUBLIC: u32 = 0x1;
    const METHOD_PUBLIC: u16 = 0x6;
    const METHOD_PRIVATE: u16 = 0x1;
    const FIELD_PRIVATE: u16 = 0x1;

    fn none_extends() -> CodedIndex {
        CodedIndex {
            table: TABLE_TYPE_DEF,
            row: 0,
        }
    }

    /// One assembly "LibA" with:
    ///   Core.Engine (public): field count, .ctor, Run (with IL), Count
    ///     property via get_Count accessor
    ///   Core.Secret (internal): method Hide
    ///   <>c__DisplayClass1_0: compiler-generated, must vanish
    /// plus TypeRefs into assembly "OtherLib".
    fn sample_metadata() -> Metadata {
        let mut heap = Heap::new();
        let s_engine = heap.intern("Engine");
        let s_secret = heap.intern("Secret");
        let s_display = heap.intern("<>c__DisplayClass1_0");
        let s_core = heap.intern("Core");
        let s_liba = heap.intern("LibA");
        let s_count = heap.intern("count");
        let s_backing = heap.intern("<state>k__BackingField");
        let s_junk = heap.intern("junk");
        let s_ctor = heap.intern(".ctor");
        let s_run = heap.intern("Run");
        let s_get_count = heap.intern("get_Count");
        let s_hide = heap.intern("Hide");
        let s_lambda = heap.intern("<Run>b__0");
        let s_count_prop = heap.intern("Count");
        let s_libbase = heap.intern("Lib.Base");
        let s_component = heap.intern("Component");
        let s_sys = heap.intern("Sys");
        let s_console = heap.intern("Console");
        let s_writeline = heap.intern("WriteLine");
        let s_otherlib = heap.intern("OtherLib");

        // Blob heap: a method signature and a field signature.
        let mut blobs = vec![0u8];
        let method_sig = blobs.len() as u32;
        blobs.extend_from_slice(&[2, 0x20, 0x00]); // HASTHIS, no params
        let _field_sig = blobs.len() as u32;
        blobs.extend_from_slice(&[2, 0x06, 0x08]); // FIELD, I4

        let mut metadata = Metadata::for_tests(heap.data, blobs);
        metadata.assembly_name = Some(s_liba);

        metadata.type_defs = vec![
            TypeDefRow {
                flags: TYPE_PUBLIC,
                name: s_engine,
                namespace: s_core,
                extends: CodedIndex {
                    table: TABLE_TYPE_REF,
                    row: 1,
                },
                field_start: 1,
                method_start: 1,
            },
            TypeDefRow {
                flags: 0, // NotPublic
                name: s_secret,
                namespace: s_core,
                extends: none_extends(),
                field_start: 2,
                method_start: 4,
            },
            TypeDefRow {
                flags: 0,
                name: s_display,
                namespace: 0,
                extends: none_extends(),
                field_start: 3,
                method_start: 5,
            },
        ];

        metadata.fields = vec![
            FieldRow {
                flags: FIELD_PRIVATE,
                name: s_count,
            },
            FieldRow {
                flags: FIELD_PRIVATE,
                name: s_backing,
            },
            FieldRow {
                flags: FIELD_PRIVATE,
                name: s_junk,
            },
        ];

        metadata.methods = vec![
            MethodRow {
                rva: 0,
                flags: METHOD_PUBLIC,
                name: s_ctor,
            },
            MethodRow {
                rva: 0x2050,
                flags: METHOD_PUBLIC,
                name: s_run,
            },
            MethodRow {
                rva: 0,
                flags: METHOD_PUBLIC,
                name: s_get_count,
            },
            MethodRow {
                rva: 0,
                flags: METHOD_PRIVATE,
                name: s_hide,
            },
            MethodRow {
                rva: 0,
                flags: METHOD_PRIVATE,
                name: s_lambda,
            },
        ];

        metadata.property_maps = vec![MapRow {
            parent: 1,
            list_start: 1,
        }];
        metadata.properties = vec![PropertyRow { name: s_count_prop }];
        metadata.method_semantics = vec![MethodSemanticsRow {
            semantics: 0x2, // getter
            method: 3,
            association: CodedIndex {
                table: crate::metadata::TABLE_PROPERTY,
                row: 1,
            },
        }];

        metadata.type_refs = vec![
            TypeRefRow {
                scope: CodedIndex {
                    table: TABLE_ASSEMBLY_REF,
                    row: 1,
                },
                name: s_component,
                namespace: s_libbase,
            },
            TypeRefRow {
                scope: CodedIndex {
                    table: TABLE_ASSEMBLY_REF,
                    row: 1,
                },
                name: s_console,
                namespace: s_sys,
            },
        ];
        metadata.assembly_refs = vec![s_otherlib];

        metadata.member_refs = vec![
            MemberRefRow {
                parent: CodedIndex {
                    table: TABLE_TYPE_REF,
                    row: 2,
                },
                name: s_writeline,
                signature: method_sig,
            },
            MemberRefRow {
                parent: CodedIndex {
                    table: TABLE_TYPE_REF,
                    row: 1,
                },
                name: s_ctor,
                signature: method_sig,
            },
        ];

        metadata
    }

    fn emitted_items(summaries: HashMap<String, String>) -> Vec<Item> {
        let metadata = sample_metadata();
        let emitter = Emitter::new(&metadata, NodeType::Dll, summaries, "LibA".to_string());

        // Run's IL touches: WriteLine, the count field, OtherLib's ctor,
        // and a raw type token.
        let mut bodies = HashMap::new();
        bodies.insert(
            2,
            vec![0x0A00_0001, 0x0400_0001, 0x0A00_0002, 0x0100_0001],
        );
        emitter.emit(&bodies)
    }

    fn nodes(items: &[Item]) -> Vec<&Node> {
        items
            .iter()
            .filter_map(|item| match item {
                Item::Node(node) => Some(node),
                Item::Link(_) => None,
            })
            .collect()
    }

    fn links(items: &[Item]) -> Vec<&Link> {
        items
            .iter()
            .filter_map(|item| match item {
                Item::Link(link) => Some(link),
                Item::Node(_) => None,
            })
            .collect()
    }

    fn find<'a>(items: &'a [Item], name: &str) -> &'a Node {
        nodes(items)
            .into_iter()
            .find(|node| node.name == name)
            .unwrap_or_else(|| panic!("missing node {name}"))
    }

    #[test]
    fn module_namespace_and_types_form_a_containment_chain() {
        let items = emitted_items(HashMap::new());

        assert_eq!(find(&items, "LibA").node_type, NodeType::Dll);

        let ns = find(&items, "LibA > Core");
        assert_eq!(ns.node_type, NodeType::Namespace);
        assert_eq!(ns.parent.as_deref(), Some("LibA"));

        let engine = find(&items, "LibA > Core.Engine");
        assert_eq!(engine.node_type, NodeType::Type);
        assert_eq!(engine.parent.as_deref(), Some("LibA > Core"));
        assert!(!engine.is_private);

        let secret = find(&items, "LibA > Core.Secret");
        assert!(secret.is_private);
    }

    #[test]
    fn members_carry_kind_parent_and_visibility() {
        let items = emitted_items(HashMap::new());

        let field = find(&items, "LibA > Core.Engine.count");
        assert_eq!(field.node_type, NodeType::Field);
        assert_eq!(field.parent.as_deref(), Some("LibA > Core.Engine"));
        assert!(field.is_private);

        let ctor = find(&items, "LibA > Core.Engine.Engine");
        assert_eq!(ctor.node_type, NodeType::Constructor);
        assert!(!ctor.is_private);

        let run = find(&items, "LibA > Core.Engine.Run");
        assert_eq!(run.node_type, NodeType::Method);

        let hide = find(&items, "LibA > Core.Secret.Hide");
        assert!(hide.is_private);
    }

    #[test]
    fn property_absorbs_its_accessor_method() {
        let items = emitted_items(HashMap::new());

        let property = find(&items, "LibA > Core.Engine.Count");
        assert_eq!(property.node_type, NodeType::Property);
        assert!(!property.is_private); // public getter

        assert!(nodes(&items)
            .iter()
            .all(|node| !node.name.contains("get_Count")));
    }

    #[test]
    fn compiler_generated_types_and_members_vanish() {
        let items = emitted_items(HashMap::new());
        for node in nodes(&items) {
            assert!(!node.name.contains("DisplayClass"), "{}", node.name);
            assert!(!node.name.contains("k__BackingField"), "{}", node.name);
            assert!(!node.name.contains("b__0"), "{}", node.name);
        }
    }

    #[test]
    fn il_tokens_resolve_to_cross_assembly_links() {
        let items = emitted_items(HashMap::new());
        let from_run: Vec<&Link> = links(&items)
            .into_iter()
            .filter(|link| link.source == "LibA > Core.Engine.Run")
            .collect();

        let call = from_run
            .iter()
            .find(|l| l.target == "OtherLib > Sys.Console.WriteLine")
            .expect("method call link");
        assert_eq!(call.target_type, NodeType::Method);
        assert_eq!(call.description.as_deref(), Some("method call"));

        let field = from_run
            .iter()
            .find(|l| l.target == "LibA > Core.Engine.count")
            .expect("field access link");
        assert_eq!(field.target_type, NodeType::Field);

        let ctor = from_run
            .iter()
            .find(|l| l.target == "OtherLib > Lib.Base.Component.Component")
            .expect("constructor call link");
        assert_eq!(ctor.target_type, NodeType::Constructor);

        let type_ref = from_run
            .iter()
            .find(|l| l.target == "OtherLib > Lib.Base.Component")
            .expect("type reference link");
        assert_eq!(type_ref.target_type, NodeType::Type);
    }

    #[test]
    fn base_types_become_inherits_links() {
        let items = emitted_items(HashMap::new());
        let inherits = links(&items)
            .into_iter()
            .find(|l| l.description.as_deref() == Some("inherits"))
            .expect("inherits link");
        assert_eq!(inherits.source, "LibA > Core.Engine");
        assert_eq!(inherits.target, "OtherLib > Lib.Base.Component");
    }

    #[test]
    fn doc_summaries_attach_to_matching_nodes() {
        let mut summaries = HashMap::new();
        summaries.insert(
            "T:Core.Engine".to_string(),
            "Drives a parse pass.".to_string(),
        );
        summaries.insert(
            "M:Core.Engine.#ctor".to_string(),
            "Creates an engine.".to_string(),
        );
        summaries.insert(
            "M:Core.Engine.Run".to_string(),
            "Runs the engine.".to_string(),
        );
        let items = emitted_items(summaries);

        assert_eq!(
            find(&items, "LibA > Core.Engine").description.as_deref(),
            Some("Drives a parse pass.")
        );
        assert_eq!(
            find(&items, "LibA > Core.Engine.Engine").description.as_deref(),
            Some("Creates an engine.")
        );
        assert_eq!(
            find(&items, "LibA > Core.Engine.Run").description.as_deref(),
            Some("Runs the engine.")
        );
    }

    #[test]
    fn missing_file_is_not_found() {
        let err = BinaryParser::parse(Path::new("/nonexistent/LibA.dll")).unwrap_err();
        assert!(matches!(err, ParseError::NotFound(_)));
    }

    #[test]
    fn junk_bytes_are_a_malformed_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Broken.dll");
        std::fs::write(&path, b"definitely not a portable executable").unwrap();

        let err = BinaryParser::parse(&path).unwrap_err();
        assert!(matches!(err, ParseError::Malformed { .. }));
    }
}

