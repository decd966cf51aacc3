use depmap_model::NodeType;
use std::collections::HashMap;

/// One declared symbol: its dotted path inside the project, the graph node
/// name it maps to, and its declared kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declared {
    pub fqn: String,
    pub node_name: String,
    pub kind: NodeType,
}

/// Declaration index for one compilation, plus any referenced projects'
/// declarations merged in. This is what reference binding resolves against.
#[derive(Debug, Default, Clone)]
pub struct SymbolTable {
    by_fqn: HashMap<String, Declared>,
}

impl SymbolTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, fqn: impl Into<String>, node_name: impl Into<String>, kind: NodeType) {
        let fqn = fqn.into();
        let declared = Declared {
            fqn: fqn.clone(),
            node_name: node_name.into(),
            kind,
        };
        self.by_fqn.insert(fqn, declared);
    }

    #[must_use]
    pub fn get(&self, fqn: &str) -> Option<&Declared> {
        self.by_fqn.get(fqn)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_fqn.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_fqn.is_empty()
    }

    /// Merge another project's declarations (referenced-project symbols).
    pub fn absorb(&mut self, other: &SymbolTable) {
        for (fqn, declared) in &other.by_fqn {
            self.by_fqn
                .entry(fqn.clone())
                .or_insert_with(|| declared.clone());
        }
    }

    /// Bind a (possibly dotted) identifier path against the declarations.
    ///
    /// Tried in order: as a member of the enclosing type, as-is, prefixed
    /// with each enclosing namespace innermost-first, then prefixed with
    /// each `using` directive. Dotted paths additionally bind their head as
    /// a type and the tail as that type's member.
    #[must_use]
    pub fn resolve(
        &self,
        path: &str,
        enclosing_type: Option<&str>,
        namespaces: &[String],
        usings: &[String],
    ) -> Option<&Declared> {
        if path.is_empty() {
            return None;
        }

        if !path.contains('.') {
            if let Some(type_fqn) = enclosing_type {
                if let Some(member) = self.get(&format!("{type_fqn}.{path}")) {
                    return Some(member);
                }
            }
            return self.resolve_qualified(path, namespaces, usings);
        }

        // Dotted path: try the full path first, then head-as-type with the
        // tail as its member.
        if let Some(found) = self.resolve_qualified(path, namespaces, usings) {
            return Some(found);
        }
        let (head, tail) = path.split_once('.')?;
        let head_symbol = self.resolve_qualified(head, namespaces, usings)?;
        self.get(&format!("{}.{tail}", head_symbol.fqn))
            .or(Some(head_symbol))
    }

    fn resolve_qualified(
        &self,
        path: &str,
        namespaces: &[String],
        usings: &[String],
    ) -> Option<&Declared> {
        if let Some(found) = self.get(path) {
            return Some(found);
        }
        for ns in namespaces.iter().rev() {
            if let Some(found) = self.get(&format!("{ns}.{path}")) {
                return Some(found);
            }
        }
        for using in usings {
            if let Some(found) = self.get(&format!("{using}.{path}")) {
                return Some(found);
            }
        }
        None
    }
}
