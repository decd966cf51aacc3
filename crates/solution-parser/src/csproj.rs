use depmap_model::{NodeType, ParseError, Result};
use ignore::WalkBuilder;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::path::{Path, PathBuf};

/// The four facts the engine needs from a project file (name, kind, output
/// location, source enumeration) plus project references for symbol
/// visibility.
#[derive(Debug, Clone)]
pub struct ProjectManifest {
    pub assembly: String,
    pub kind: NodeType,
    pub directory: PathBuf,
    pub sources: Vec<PathBuf>,
    pub output_candidates: Vec<PathBuf>,
    pub project_references: Vec<PathBuf>,
}

/// Read a project file directly from its XML; no build engine involved.
pub fn parse_project_file(path: &Path) -> Result<ProjectManifest> {
    if !path.exists() {
        return Err(ParseError::NotFound(path.to_path_buf()));
    }
    let xml = std::fs::read_to_string(path)?;
    let directory = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "project".to_string());

    let raw = scan_project_xml(&xml).map_err(|reason| ParseError::malformed(path, reason))?;

    let assembly = raw.assembly_name.clone().unwrap_or(stem);
    let kind = match raw.output_type.as_deref() {
        Some("Exe") | Some("WinExe") => NodeType::Exe,
        _ => NodeType::Dll,
    };

    let sources = if raw.compile_items.is_empty() {
        enumerate_sources(&directory)
    } else {
        raw.compile_items
            .iter()
            .map(|item| directory.join(item.replace('\\', "/")))
            .collect()
    };

    let output_candidates = output_candidates(&directory, &assembly, kind, &raw);

    let project_references = raw
        .project_references
        .iter()
        .map(|reference| directory.join(reference.replace('\\', "/")))
        .collect();

    Ok(ProjectManifest {
        assembly,
        kind,
        directory,
        sources,
        output_candidates,
        project_references,
    })
}

#[derive(Default)]
struct RawProject {
    assembly_name: Option<String>,
    output_type: Option<String>,
    output_path: Option<String>,
    target_framework: Option<String>,
    compile_items: Vec<String>,
    project_references: Vec<String>,
}

fn scan_project_xml(xml: &str) -> std::result::Result<RawProject, String> {
    let mut reader = Reader::from_str(xml);
    let mut raw = RawProject::default();
    let mut element_stack: Vec<String> = Vec::new();
    let mut saw_project_root = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                if name == "Project" {
                    saw_project_root = true;
                }
                element_stack.push(name);
            }
            Ok(Event::Empty(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                let include = e
                    .attributes()
                    .flatten()
                    .find(|a| a.key.as_ref() == b"Include")
                    .and_then(|a| a.unescape_value().ok())
                    .map(|v| v.into_owned());
                if let Some(include) = include {
                    match name.as_str() {
                        "Compile" => raw.compile_items.push(include),
                        "ProjectReference" => raw.project_references.push(include),
                        _ => {}
                    }
                }
            }
            Ok(Event::Text(t)) => {
                let Some(element) = element_stack.last() else {
                    continue;
                };
                let Ok(text) = t.unescape() else {
                    continue;
                };
                let text = text.trim().to_string();
                if text.is_empty() {
                    continue;
                }
                match element.as_str() {
                    "AssemblyName" => raw.assembly_name = Some(text),
                    "OutputType" => raw.output_type = Some(text),
                    "OutputPath" => raw.output_path = Some(text),
                    "TargetFramework" => raw.target_framework = Some(text),
                    _ => {}
                }
            }
            Ok(Event::End(_)) => {
                element_stack.pop();
            }
            Ok(Event::Eof) => break,
            Err(err) => return Err(err.to_string()),
            _ => {}
        }
    }

    if !saw_project_root {
        return Err("no <Project> root element".to_string());
    }
    Ok(raw)
}

/// SDK-style projects compile every `*.cs` under the project directory;
/// build output trees are excluded.
fn enumerate_sources(directory: &Path) -> Vec<PathBuf> {
    let mut sources = Vec::new();
    let walker = WalkBuilder::new(directory)
        .hidden(true)
        .git_ignore(true)
        .filter_entry(|entry| {
            entry
                .file_name()
                .to_str()
                .map_or(true, |name| name != "bin" && name != "obj")
        })
        .build();

    for entry in walker.flatten() {
        let path = entry.path();
        if entry.file_type().is_some_and(|t| t.is_file())
            && path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("cs"))
        {
            sources.push(path.to_path_buf());
        }
    }
    sources.sort();
    sources
}

/// Where the compiled output may live: an explicit OutputPath, or the
/// conventional bin/{Debug,Release}[/{tfm}] trees.
fn output_candidates(
    directory: &Path,
    assembly: &str,
    kind: NodeType,
    raw: &RawProject,
) -> Vec<PathBuf> {
    let extension = if kind == NodeType::Exe { "exe" } else { "dll" };
    let file_name = format!("{assembly}.{extension}");

    if let Some(output_path) = &raw.output_path {
        return vec![directory.join(output_path.replace('\\', "/")).join(&file_name)];
    }

    let mut candidates = Vec::new();
    for configuration in ["Debug", "Release"] {
        let base = directory.join("bin").join(configuration);
        if let Some(tfm) = &raw.target_framework {
            candidates.push(base.join(tfm).join(&file_name));
        }
        candidates.push(base.join(&file_name));
    }
    candidates
}
