use depmap_model::FileSpan;
use std::collections::HashMap;
use std::path::Path;

/// Bidirectional span registry built during a source parse: node name to
/// declaration span, and per-file spans for the inverse lookup.
#[derive(Debug, Default, Clone)]
pub struct SpanIndex {
    by_name: HashMap<String, FileSpan>,
    by_file: HashMap<String, Vec<(FileSpan, String)>>,
}

impl SpanIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, span: FileSpan) {
        let name = name.into();
        self.by_file
            .entry(span.path.clone())
            .or_default()
            .push((span.clone(), name.clone()));
        self.by_name.insert(name, span);
    }

    pub fn absorb(&mut self, other: SpanIndex) {
        for (name, span) in other.by_name {
            self.insert(name, span);
        }
    }

    /// Declaration span of a node, if it came from source.
    #[must_use]
    pub fn span_of(&self, name: &str) -> Option<&FileSpan> {
        self.by_name.get(name)
    }

    /// Best-matching node for a source location: the nearest enclosing
    /// declaration, i.e. the smallest span covering the line.
    #[must_use]
    pub fn node_at(&self, path: &str, line: u32) -> Option<&str> {
        self.by_file
            .get(path)?
            .iter()
            .filter(|(span, _)| span.contains_line(line))
            .min_by_key(|(span, _)| span.line_count())
            .map(|(_, name)| name.as_str())
    }

    /// The declaration text behind a node, read back from its file.
    pub fn source_excerpt(&self, name: &str) -> std::io::Result<Option<String>> {
        let Some(span) = self.span_of(name) else {
            return Ok(None);
        };
        let text = std::fs::read_to_string(Path::new(&span.path))?;
        let excerpt: Vec<&str> = text
            .lines()
            .skip(span.start_line.saturating_sub(1) as usize)
            .take(span.line_count() as usize)
            .collect();
        Ok(Some(excerpt.join("\n")))
    }
}
