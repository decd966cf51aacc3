use depmap_model::{ParseError, Result};
use std::path::{Path, PathBuf};

/// Project-type GUID marking a solution folder; structural only, never
/// parsed.
const SOLUTION_FOLDER_GUID: &str = "2150E333-8FDC-42A3-9474-1A3956D46DE8";

/// Name suffixes identifying test-only projects; they do not represent
/// shipped dependencies.
const TEST_SUFFIXES: &[&str] = &[
    ".Test",
    ".Tests",
    ".UnitTest",
    ".UnitTests",
    ".IntegrationTest",
    ".IntegrationTests",
    "Test",
    "Tests",
];

#[derive(Debug, Clone)]
pub struct SolutionProject {
    pub name: String,
    /// Project file path, resolved against the solution directory.
    pub path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct SolutionManifest {
    /// Solution name (manifest file stem).
    pub name: String,
    pub directory: PathBuf,
    pub projects: Vec<SolutionProject>,
}

/// Read a solution manifest. Only a missing or unreadable manifest, or one
/// with no recognizable structure, aborts the whole parse.
pub fn parse_solution_file(path: &Path) -> Result<SolutionManifest> {
    if !path.exists() {
        return Err(ParseError::NotFound(path.to_path_buf()));
    }
    let text = std::fs::read_to_string(path)?;

    let name = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "solution".to_string());
    let directory = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    let looks_like_solution = text
        .lines()
        .any(|line| line.contains("Microsoft Visual Studio Solution File"));
    let mut projects = Vec::new();

    for line in text.lines() {
        let trimmed = line.trim_start();
        if !trimmed.starts_with("Project(") {
            continue;
        }
        let Some(entry) = parse_project_line(trimmed) else {
            log::warn!("skipping unparseable project line in {}: {trimmed}", path.display());
            continue;
        };
        if entry.type_guid.eq_ignore_ascii_case(SOLUTION_FOLDER_GUID) {
            continue;
        }
        if is_test_project(&entry.name) {
            log::info!("excluding test project {}", entry.name);
            continue;
        }
        let relative = entry.path.replace('\\', "/");
        projects.push(SolutionProject {
            name: entry.name,
            path: directory.join(relative),
        });
    }

    if projects.is_empty() && !looks_like_solution {
        return Err(ParseError::malformed(
            path,
            "no solution header and no project entries",
        ));
    }

    Ok(SolutionManifest {
        name,
        directory,
        projects,
    })
}

struct ProjectLine {
    type_guid: String,
    name: String,
    path: String,
}

/// `Project("{type-guid}") = "Name", "rel\path.csproj", "{project-guid}"`
fn parse_project_line(line: &str) -> Option<ProjectLine> {
    let mut quoted = line.split('"').skip(1).step_by(2);
    let type_guid = quoted.next()?.trim_matches(['{', '}']).to_string();
    let name = quoted.next()?.to_string();
    let path = quoted.next()?.to_string();
    if name.is_empty() || path.is_empty() {
        return None;
    }
    Some(ProjectLine {
        type_guid,
        name,
        path,
    })
}

pub fn is_test_project(name: &str) -> bool {
    TEST_SUFFIXES.iter().any(|suffix| name.ends_with(suffix))
}
