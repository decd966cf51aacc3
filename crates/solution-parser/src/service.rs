use crate::dispatch::{parse_path, ParserKind};
use crate::parser::ParseOutcome;
use depmap_graph::{DependencyGraph, GraphAssembler};
use depmap_model::{ParseError, ParseStats, Result};
use depmap_source_parser::SpanIndex;
use depmap_store::{assess_solution, load_snapshot, save_snapshot, write_watermark, CacheDecision};
use depmap_stream::{channel, CancelSignal, DEFAULT_CAPACITY};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// What a parse request hands back to rendering/navigation collaborators.
pub struct ParseReport {
    pub graph: DependencyGraph,
    /// Absent when the graph was restored from a snapshot.
    pub outcome: Option<ParseOutcome>,
    pub stats: ParseStats,
    pub from_cache: bool,
}

/// The collaborator facade over the whole engine: parse with caching,
/// restore snapshots, answer staleness and source-navigation queries.
pub struct GraphService;

impl GraphService {
    /// Parse (or restore) the artifact at `path` into a graph.
    pub async fn parse(path: &Path) -> Result<ParseReport> {
        Self::parse_with(path, CancelSignal::never(), true).await
    }

    pub async fn parse_with(
        path: &Path,
        cancel: CancelSignal,
        use_cache: bool,
    ) -> Result<ParseReport> {
        let started = Instant::now();
        let kind = ParserKind::for_path(path)?;
        let root = cache_root(path);

        if use_cache && kind == ParserKind::Solution {
            let decision = assess_solution(&root)
                .await
                .map_err(|err| store_error(path, err))?;
            if decision.fresh {
                if let Some(graph) = load_snapshot(&root)
                    .await
                    .map_err(|err| store_error(path, err))?
                {
                    log::info!("cache hit for {}; snapshot restored", path.display());
                    let mut stats = stats_for(&graph, None);
                    stats.time_ms = elapsed_ms(started);
                    return Ok(ParseReport {
                        graph,
                        outcome: None,
                        stats,
                        from_cache: true,
                    });
                }
            } else {
                log::info!(
                    "cache miss for {}: {:?}",
                    path.display(),
                    decision.reasons
                );
            }
        }

        let (sender, receiver) = channel(DEFAULT_CAPACITY);
        let drain_cancel = cancel.clone();
        let drain = tokio::spawn(async move {
            GraphAssembler::new().drain(receiver, &drain_cancel).await
        });

        // A cancelled parse is not an error: the drained graph comes back
        // explicitly marked incomplete.
        let outcome = match parse_path(path, sender, cancel).await {
            Ok(outcome) => Some(outcome),
            Err(ParseError::Cancelled) => None,
            Err(other) => return Err(other),
        };
        let graph = drain
            .await
            .map_err(|join_error| ParseError::malformed(path, join_error.to_string()))?;

        let completed = outcome
            .as_ref()
            .is_some_and(|outcome| !outcome.cancelled);
        if kind == ParserKind::Solution && completed {
            let outcome = outcome.as_ref().expect("completed parse has an outcome");
            save_snapshot(&root, &graph)
                .await
                .map_err(|err| store_error(path, err))?;
            write_watermark(&root, outcome.artifacts.clone())
                .await
                .map_err(|err| store_error(path, err))?;
        }

        let mut stats = stats_for(&graph, outcome.as_ref());
        stats.time_ms = elapsed_ms(started);
        Ok(ParseReport {
            graph,
            outcome,
            stats,
            from_cache: false,
        })
    }

    /// Restore the cached graph for a solution, ignoring staleness.
    pub async fn load_cached(path: &Path) -> Result<Option<DependencyGraph>> {
        load_snapshot(&cache_root(path))
            .await
            .map_err(|err| store_error(path, err))
    }

    /// Current cache decision for a solution, with the oldest relevant
    /// artifact timestamp.
    pub async fn staleness(path: &Path) -> Result<CacheDecision> {
        assess_solution(&cache_root(path))
            .await
            .map_err(|err| store_error(path, err))
    }

    /// Source location of a node, when it was derived from source.
    #[must_use]
    pub fn source_location(graph: &DependencyGraph, name: &str) -> Option<(String, u32)> {
        graph
            .node(name)
            .and_then(|node| node.span.as_ref())
            .map(|span| (span.path.clone(), span.start_line))
    }

    /// Best-matching node for a source location (nearest enclosing
    /// declaration).
    #[must_use]
    pub fn node_at(graph: &DependencyGraph, path: &str, line: u32) -> Option<String> {
        Self::span_index(graph)
            .node_at(path, line)
            .map(str::to_string)
    }

    /// Span registry rebuilt from a graph's nodes; works for restored
    /// snapshots just as for fresh parses.
    #[must_use]
    pub fn span_index(graph: &DependencyGraph) -> SpanIndex {
        let mut index = SpanIndex::new();
        for node in graph.all_nodes() {
            if let Some(span) = &node.span {
                index.insert(&node.name, span.clone());
            }
        }
        index
    }
}

/// Snapshots live next to the manifest that produced them.
fn cache_root(path: &Path) -> PathBuf {
    path.parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

fn stats_for(graph: &DependencyGraph, outcome: Option<&ParseOutcome>) -> ParseStats {
    let mut stats = ParseStats::new();
    stats.nodes = graph.node_count();
    stats.links = graph.link_count();
    if let Some(outcome) = outcome {
        stats.artifacts = outcome.projects.saturating_sub(outcome.failures.len());
        for failure in &outcome.failures {
            stats.add_error(format!("{}: {}", failure.project, failure.error));
        }
    } else {
        stats.artifacts = graph
            .all_nodes()
            .filter(|node| node.node_type.is_module())
            .count();
    }
    stats
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn store_error(path: &Path, err: depmap_store::StoreError) -> ParseError {
    match err {
        depmap_store::StoreError::Io(io) => ParseError::Io(io),
        other => ParseError::malformed(path, other.to_string()),
    }
}
