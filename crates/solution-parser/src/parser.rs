use crate::csproj::{parse_project_file, ProjectManifest};
use crate::sln::parse_solution_file;
use depmap_binary_parser::BinaryParser;
use depmap_model::{Node, NodeType, ParseError, Result};
use depmap_source_parser::{Declarations, SourceParser, SourceProject, SpanIndex};
use depmap_stream::{CancelSignal, ItemSender};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// One project that could not contribute to the graph; its node remains as
/// an annotated placeholder.
#[derive(Debug)]
pub struct ProjectFailure {
    pub project: String,
    pub error: ParseError,
}

/// Result of a solution parse. A non-empty `failures` list is the partial-
/// failure state: the graph still stands, minus the failed projects.
#[derive(Debug)]
pub struct ParseOutcome {
    /// Node name of the solution container.
    pub solution: String,
    /// Projects dispatched (after folder/test filtering).
    pub projects: usize,
    pub failures: Vec<ProjectFailure>,
    pub cancelled: bool,
    /// Artifact paths the parse consumed; the staleness watermark tracks
    /// these.
    pub artifacts: Vec<PathBuf>,
    /// Span registry aggregated from source-parsed projects.
    pub spans: SpanIndex,
}

impl ParseOutcome {
    #[must_use]
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }

    /// The partial-failure state as an error value, for callers that need
    /// one; the graph itself still stands.
    #[must_use]
    pub fn partial_failure(&self) -> Option<ParseError> {
        (!self.failures.is_empty()).then(|| ParseError::PartialFailure {
            failed: self.failures.len(),
            total: self.projects,
        })
    }
}

/// Which artifact represents a project right now: whichever of compiled
/// output and source tree is newer wins, so the graph never reflects
/// outdated bytecode.
#[derive(Debug, PartialEq, Eq)]
enum ArtifactChoice {
    Binary(PathBuf),
    Source,
    Unavailable(&'static str),
}

fn choose_artifact(manifest: &ProjectManifest) -> ArtifactChoice {
    let newest_output = manifest
        .output_candidates
        .iter()
        .filter_map(|path| mtime(path).map(|t| (path.clone(), t)))
        .max_by_key(|(_, t)| *t);
    let newest_source = manifest.sources.iter().filter_map(|path| mtime(path)).max();

    match (newest_output, newest_source) {
        (Some((path, output_time)), Some(source_time)) => {
            if output_time >= source_time {
                ArtifactChoice::Binary(path)
            } else {
                ArtifactChoice::Source
            }
        }
        (Some((path, _)), None) => ArtifactChoice::Binary(path),
        (None, Some(_)) => ArtifactChoice::Source,
        (None, None) => ArtifactChoice::Unavailable("no compiled output or sources found"),
    }
}

fn mtime(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).ok()?.modified().ok()
}

struct PlannedProject {
    name: String,
    path: PathBuf,
    manifest: ProjectManifest,
}

/// Parse a whole solution into the item stream.
///
/// Only a missing/malformed solution manifest aborts; every per-project
/// failure is recorded in the outcome and leaves a placeholder node.
pub async fn parse_solution(
    path: &Path,
    sender: ItemSender,
    cancel: CancelSignal,
) -> Result<ParseOutcome> {
    let manifest = parse_solution_file(path)?;
    log::info!(
        "parsing solution {} ({} projects)",
        manifest.name,
        manifest.projects.len()
    );

    let mut failures = Vec::new();
    let mut planned = Vec::new();
    let mut manifest_failures = Vec::new();
    for project in &manifest.projects {
        match parse_project_file(&project.path) {
            Ok(project_manifest) => planned.push(PlannedProject {
                name: project.name.clone(),
                path: project.path.clone(),
                manifest: project_manifest,
            }),
            Err(error) => manifest_failures.push((project.name.clone(), error)),
        }
    }

    // A project sharing the solution's name would collide with the
    // container node.
    let solution = if planned.iter().any(|p| p.manifest.assembly == manifest.name) {
        log::warn!(
            "project named like the solution ({}); container keeps its extension",
            manifest.name
        );
        format!("{}.sln", manifest.name)
    } else {
        manifest.name.clone()
    };

    sender
        .send_node(Node::new(&solution, NodeType::Solution))
        .await?;

    for (name, error) in manifest_failures {
        report_failure(&sender, &solution, &name, NodeType::Assembly, &error).await;
        failures.push(ProjectFailure {
            project: name,
            error,
        });
    }

    let total_projects = manifest.projects.len();
    let mut artifacts = Vec::new();
    let mut binary_jobs = Vec::new();
    let mut source_jobs = Vec::new();

    for project in planned {
        let assembly = project.manifest.assembly.clone();
        let kind = project.manifest.kind;
        sender
            .send_node(Node::new(&assembly, kind).with_parent(&solution))
            .await?;

        match choose_artifact(&project.manifest) {
            ArtifactChoice::Binary(output) => {
                log::info!("{assembly}: parsing compiled output {}", output.display());
                artifacts.push(output.clone());
                binary_jobs.push((assembly, kind, output));
            }
            ArtifactChoice::Source => {
                log::info!(
                    "{assembly}: parsing {} source files",
                    project.manifest.sources.len()
                );
                artifacts.push(project.path.clone());
                artifacts.extend(project.manifest.sources.iter().cloned());
                source_jobs.push((
                    project.name.clone(),
                    SourceProject {
                        assembly,
                        kind,
                        files: project.manifest.sources.clone(),
                    },
                ));
            }
            ArtifactChoice::Unavailable(reason) => {
                let error = ParseError::NotFound(project.manifest.directory.clone());
                report_failure(&sender, &solution, &assembly, kind, &error).await;
                log::warn!("{assembly}: {reason}");
                failures.push(ProjectFailure {
                    project: project.name.clone(),
                    error,
                });
            }
        }
    }

    // Fan out: compiled modules parse as independent tasks while source
    // declarations are collected; each artifact flushes only once it
    // parsed completely.
    let mut binary_handles = Vec::new();
    for (assembly, kind, output) in binary_jobs {
        let sender = sender.clone();
        let cancel = cancel.clone();
        binary_handles.push(tokio::spawn(async move {
            if cancel.is_cancelled() {
                return (assembly, kind, Err(ParseError::Cancelled));
            }
            let parse_path = output.clone();
            let parsed =
                tokio::task::spawn_blocking(move || BinaryParser::parse(&parse_path)).await;
            let result = match parsed {
                Ok(Ok(items)) => sender.send_all(items).await,
                Ok(Err(error)) => Err(error),
                Err(join_error) => Err(ParseError::malformed(output, join_error.to_string())),
            };
            (assembly, kind, result)
        }));
    }

    let mut decl_handles = Vec::new();
    for (project_name, source_project) in source_jobs {
        if cancel.is_cancelled() {
            failures.push(ProjectFailure {
                project: project_name,
                error: ParseError::Cancelled,
            });
            continue;
        }
        decl_handles.push((
            project_name,
            tokio::task::spawn_blocking(move || {
                let mut parser = SourceParser::new().map_err(|err| {
                    ParseError::malformed(PathBuf::new(), err.to_string())
                })?;
                parser.collect_declarations(&source_project)
            }),
        ));
    }

    let mut declarations: Vec<(String, Declarations)> = Vec::new();
    for (project_name, handle) in decl_handles {
        match handle.await {
            Ok(Ok(decls)) => declarations.push((project_name, decls)),
            Ok(Err(error)) => {
                report_failure(&sender, &solution, &project_name, NodeType::Assembly, &error)
                    .await;
                failures.push(ProjectFailure {
                    project: project_name,
                    error,
                });
            }
            Err(join_error) => {
                let error = ParseError::malformed(PathBuf::new(), join_error.to_string());
                failures.push(ProjectFailure {
                    project: project_name,
                    error,
                });
            }
        }
    }

    // Reference binding sees every sibling project's declarations; each
    // project's compilation context stays owned by its own pass.
    let mut spans = SpanIndex::new();
    if !cancel.is_cancelled() {
        for index in 0..declarations.len() {
            let mut visible = declarations[index].1.symbols.clone();
            for (other_index, (_, other)) in declarations.iter().enumerate() {
                if other_index != index {
                    visible.absorb(&other.symbols);
                }
            }
            let items = SourceParser::bind_references(&declarations[index].1, &visible);
            if sender.send_all(items).await.is_err() {
                break;
            }
            spans.absorb(declarations[index].1.spans.clone());
        }
    }

    for handle in binary_handles {
        match handle.await {
            Ok((_, _, Ok(()))) => {}
            Ok((assembly, _, Err(ParseError::Cancelled))) => {
                log::info!("{assembly}: cancelled");
            }
            Ok((assembly, kind, Err(error))) => {
                report_failure(&sender, &solution, &assembly, kind, &error).await;
                failures.push(ProjectFailure {
                    project: assembly,
                    error,
                });
            }
            Err(join_error) => {
                failures.push(ProjectFailure {
                    project: "unknown".to_string(),
                    error: ParseError::malformed(PathBuf::new(), join_error.to_string()),
                });
            }
        }
    }

    let cancelled = cancel.is_cancelled();
    let outcome = ParseOutcome {
        solution,
        projects: total_projects,
        failures,
        cancelled,
        artifacts,
        spans,
    };
    if let Some(partial) = outcome.partial_failure() {
        log::warn!("solution {}: {partial}", outcome.solution);
    }
    Ok(outcome)
}

/// Failed projects stay visible: their node remains, annotated with the
/// failure reason.
async fn report_failure(
    sender: &ItemSender,
    solution: &str,
    project: &str,
    kind: NodeType,
    error: &ParseError,
) {
    log::warn!("project {project} failed: {error}");
    let node = Node::new(project, kind)
        .with_parent(solution)
        .with_description(format!("parse failed: {error}"));
    // The stream may already be closed under cancellation.
    let _ = sender.send_node(node).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::time::{Duration, SystemTime};
    use tempfile::tempdir;

    fn manifest_with(
        sources: Vec<PathBuf>,
        output_candidates: Vec<PathBuf>,
    ) -> ProjectManifest {
        ProjectManifest {
            assembly: "LibA".to_string(),
            kind: NodeType::Dll,
            directory: PathBuf::from("LibA"),
            sources,
            output_candidates,
            project_references: Vec::new(),
        }
    }

    #[test]
    fn newer_output_wins_over_sources() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("Engine.cs");
        let output = dir.path().join("LibA.dll");
        std::fs::write(&source, "class Engine {}").unwrap();
        std::fs::write(&output, "bytes").unwrap();

        // Push the output's mtime well past the source's.
        let later = SystemTime::now() + Duration::from_secs(60);
        let file = std::fs::File::options().write(true).open(&output).unwrap();
        file.set_modified(later).unwrap();

        let manifest = manifest_with(vec![source], vec![output.clone()]);
        assert_eq!(choose_artifact(&manifest), ArtifactChoice::Binary(output));
    }

    #[test]
    fn newer_sources_win_over_stale_output() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("Engine.cs");
        let output = dir.path().join("LibA.dll");
        std::fs::write(&output, "bytes").unwrap();
        std::fs::write(&source, "class Engine {}").unwrap();

        let later = SystemTime::now() + Duration::from_secs(60);
        let file = std::fs::File::options().write(true).open(&source).unwrap();
        file.set_modified(later).unwrap();

        let manifest = manifest_with(vec![source], vec![output]);
        assert_eq!(choose_artifact(&manifest), ArtifactChoice::Source);
    }

    #[test]
    fn missing_output_falls_back_to_sources_and_vice_versa() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("Engine.cs");
        std::fs::write(&source, "class Engine {}").unwrap();

        let from_source = manifest_with(
            vec![source.clone()],
            vec![dir.path().join("missing/LibA.dll")],
        );
        assert_eq!(choose_artifact(&from_source), ArtifactChoice::Source);

        let output = dir.path().join("LibA.dll");
        std::fs::write(&output, "bytes").unwrap();
        let from_binary = manifest_with(vec![dir.path().join("Gone.cs")], vec![output.clone()]);
        assert_eq!(
            choose_artifact(&from_binary),
            ArtifactChoice::Binary(output)
        );

        let nothing = manifest_with(vec![], vec![]);
        assert!(matches!(
            choose_artifact(&nothing),
            ArtifactChoice::Unavailable(_)
        ));
    }
}
