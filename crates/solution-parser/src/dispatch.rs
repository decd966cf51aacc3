use crate::csproj::parse_project_file;
use crate::parser::{parse_solution, ParseOutcome};
use depmap_binary_parser::BinaryParser;
use depmap_model::{ParseError, Result};
use depmap_source_parser::{SourceParser, SourceProject, SpanIndex};
use depmap_stream::{CancelSignal, ItemSender};
use std::path::Path;

/// The closed set of parser variants. Selection is a pure function of the
/// path; nothing is probed at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserKind {
    Solution,
    Binary,
    Source,
}

impl ParserKind {
    pub fn for_path(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);
        match extension.as_deref() {
            Some("sln") => Ok(ParserKind::Solution),
            Some("dll") | Some("exe") => Ok(ParserKind::Binary),
            Some("csproj") => Ok(ParserKind::Source),
            _ => Err(ParseError::Unsupported(path.to_path_buf())),
        }
    }
}

/// Parse any supported artifact into the item stream: a whole solution, a
/// single compiled module, or a single source project.
pub async fn parse_path(
    path: &Path,
    sender: ItemSender,
    cancel: CancelSignal,
) -> Result<ParseOutcome> {
    match ParserKind::for_path(path)? {
        ParserKind::Solution => parse_solution(path, sender, cancel).await,
        ParserKind::Binary => parse_binary(path, sender, cancel).await,
        ParserKind::Source => parse_source(path, sender, cancel).await,
    }
}

async fn parse_binary(path: &Path, sender: ItemSender, cancel: CancelSignal) -> Result<ParseOutcome> {
    let name = artifact_name(path);
    if cancel.is_cancelled() {
        return Err(ParseError::Cancelled);
    }
    let parse_path = path.to_path_buf();
    let items = tokio::task::spawn_blocking(move || BinaryParser::parse(&parse_path))
        .await
        .map_err(|join_error| ParseError::malformed(path, join_error.to_string()))??;
    sender.send_all(items).await?;

    Ok(ParseOutcome {
        solution: name,
        projects: 1,
        failures: Vec::new(),
        cancelled: cancel.is_cancelled(),
        artifacts: vec![path.to_path_buf()],
        spans: SpanIndex::new(),
    })
}

async fn parse_source(path: &Path, sender: ItemSender, cancel: CancelSignal) -> Result<ParseOutcome> {
    let manifest = parse_project_file(path)?;
    if cancel.is_cancelled() {
        return Err(ParseError::Cancelled);
    }

    let mut artifacts = vec![path.to_path_buf()];
    artifacts.extend(manifest.sources.iter().cloned());

    let project = SourceProject {
        assembly: manifest.assembly.clone(),
        kind: manifest.kind,
        files: manifest.sources,
    };
    let (items, spans) = tokio::task::spawn_blocking(move || {
        let mut parser = SourceParser::new()
            .map_err(|err| ParseError::malformed(std::path::PathBuf::new(), err.to_string()))?;
        parser.parse_project(&project)
    })
    .await
    .map_err(|join_error| ParseError::malformed(path, join_error.to_string()))??;
    sender.send_all(items).await?;

    Ok(ParseOutcome {
        solution: manifest.assembly,
        projects: 1,
        failures: Vec::new(),
        cancelled: cancel.is_cancelled(),
        artifacts,
        spans,
    })
}

fn artifact_name(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "artifact".to_string())
}
