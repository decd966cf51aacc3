//! End-to-end solution parsing over a real directory layout: manifest
//! reading, per-project dispatch, assembly, caching, and navigation.

use depmap_model::NodeType;
use depmap_solution_parser::GraphService;
use depmap_store::{snapshot_path, StaleReason};
use depmap_stream::cancellation;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

const SLN_TWO_PROJECTS: &str = r#"Microsoft Visual Studio Solution File, Format Version 12.00
Project("{FAE04EC0-301F-11D3-BF4B-00C04F79EFBC}") = "LibA", "LibA\LibA.csproj", "{11111111-1111-1111-1111-111111111111}"
EndProject
Project("{FAE04EC0-301F-11D3-BF4B-00C04F79EFBC}") = "AppB", "AppB\AppB.csproj", "{22222222-2222-2222-2222-222222222222}"
EndProject
Global
EndGlobal
"#;

const LIB_CSPROJ: &str = r#"<Project Sdk="Microsoft.NET.Sdk">
  <PropertyGroup>
    <TargetFramework>net8.0</TargetFramework>
  </PropertyGroup>
</Project>
"#;

const APP_CSPROJ: &str = r#"<Project Sdk="Microsoft.NET.Sdk">
  <PropertyGroup>
    <OutputType>Exe</OutputType>
    <TargetFramework>net8.0</TargetFramework>
  </PropertyGroup>
  <ItemGroup>
    <ProjectReference Include="..\LibA\LibA.csproj" />
  </ItemGroup>
</Project>
"#;

const ENGINE_CS: &str = r#"namespace Core
{
    /// <summary>Drives the shop.</summary>
    public class Engine
    {
        public Engine()
        {
        }

        public void Start()
        {
        }
    }
}
"#;

const MAIN_CS: &str = r#"using Core;

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
"#;

fn write_solution(dir: &TempDir) -> PathBuf {
    let root = dir.path();
    std::fs::create_dir_all(root.join("LibA")).unwrap();
    std::fs::create_dir_all(root.join("AppB")).unwrap();
    std::fs::write(root.join("LibA/LibA.csproj"), LIB_CSPROJ).unwrap();
    std::fs::write(root.join("LibA/Engine.cs"), ENGINE_CS).unwrap();
    std::fs::write(root.join("AppB/AppB.csproj"), APP_CSPROJ).unwrap();
    std::fs::write(root.join("AppB/Main.cs"), MAIN_CS).unwrap();
    let sln = root.join("Shop.sln");
    std::fs::write(&sln, SLN_TWO_PROJECTS).unwrap();
    sln
}

#[tokio::test]
async fn two_project_solution_builds_one_graph_with_a_cross_project_link() {
    let dir = TempDir::new().unwrap();
    let sln = write_solution(&dir);

    let report = GraphService::parse(&sln).await.unwrap();
    let graph = &report.graph;
    let outcome = report.outcome.as_ref().unwrap();
    assert!(outcome.failures.is_empty(), "{:?}", outcome.failures);

    let solution = graph.node("Shop").expect("solution node");
    assert_eq!(solution.node_type, NodeType::Solution);

    let lib = graph.node("LibA").expect("LibA node");
    assert_eq!(lib.node_type, NodeType::Dll);
    assert_eq!(lib.parent.as_deref(), Some("Shop"));

    let app = graph.node("AppB").expect("AppB node");
    assert_eq!(app.node_type, NodeType::Exe);
    assert_eq!(app.parent.as_deref(), Some("Shop"));

    // Types and members under each project.
    assert!(graph.node("LibA > Core.Engine").is_some());
    assert!(graph.node("LibA > Core.Engine.Start").is_some());
    assert!(graph.node("AppB > App.Program").is_some());

    // The cross-project dependency from AppB into LibA.
    let cross: Vec<_> = graph
        .links_from("AppB > App.Program.Main")
        .filter(|link| link.target.starts_with("LibA > "))
        .collect();
    assert!(!cross.is_empty(), "expected a cross-project link");
    assert_eq!(cross[0].target, "LibA > Core.Engine.Engine");

    // No two nodes share a name.
    let mut names: Vec<&str> = graph.all_nodes().map(|n| n.name.as_str()).collect();
    names.sort_unstable();
    let before = names.len();
    names.dedup();
    assert_eq!(names.len(), before);
}

#[tokio::test]
async fn unchanged_solution_is_a_cache_hit_with_byte_identical_snapshot() {
    let dir = TempDir::new().unwrap();
    let sln = write_solution(&dir);

    let first = GraphService::parse(&sln).await.unwrap();
    assert!(!first.from_cache);

    let snapshot_file = snapshot_path(dir.path());
    let bytes_after_first = std::fs::read(&snapshot_file).unwrap();

    let second = GraphService::parse(&sln).await.unwrap();
    assert!(second.from_cache);
    assert_eq!(std::fs::read(&snapshot_file).unwrap(), bytes_after_first);

    // The restored graph matches the parsed one node-for-node.
    assert_eq!(second.graph.node_count(), first.graph.node_count());
    assert_eq!(second.graph.link_count(), first.graph.link_count());

    let decision = GraphService::staleness(&sln).await.unwrap();
    assert!(decision.fresh, "{:?}", decision.reasons);
}

#[tokio::test]
async fn touched_source_flips_the_cache_to_a_miss() {
    let dir = TempDir::new().unwrap();
    let sln = write_solution(&dir);

    GraphService::parse(&sln).await.unwrap();

    let engine = dir.path().join("LibA/Engine.cs");
    let later = SystemTime::now() + Duration::from_secs(60);
    std::fs::File::options()
        .write(true)
        .open(&engine)
        .unwrap()
        .set_modified(later)
        .unwrap();

    let decision = GraphService::staleness(&sln).await.unwrap();
    assert!(!decision.fresh);
    assert!(decision.reasons.contains(&StaleReason::ArtifactNewer));

    let report = GraphService::parse(&sln).await.unwrap();
    assert!(!report.from_cache);
}

#[tokio::test]
async fn missing_project_becomes_an_annotated_placeholder() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    std::fs::create_dir_all(root.join("LibA")).unwrap();
    std::fs::write(root.join("LibA/LibA.csproj"), LIB_CSPROJ).unwrap();
    std::fs::write(root.join("LibA/Engine.cs"), ENGINE_CS).unwrap();

    let sln = root.join("Shop.sln");
    std::fs::write(
        &sln,
        r#"Microsoft Visual Studio Solution File, Format Version 12.00
Project("{FAE04EC0-301F-11D3-BF4B-00C04F79EFBC}") = "LibA", "LibA\LibA.csproj", "{11111111-1111-1111-1111-111111111111}"
EndProject
Project("{FAE04EC0-301F-11D3-BF4B-00C04F79EFBC}") = "Vanished", "Vanished\Vanished.csproj", "{22222222-2222-2222-2222-222222222222}"
EndProject
Global
EndGlobal
"#,
    )
    .unwrap();

    let report = GraphService::parse(&sln).await.unwrap();
    let outcome = report.outcome.as_ref().unwrap();
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].project, "Vanished");
    assert!(outcome.is_partial());

    // The healthy project still parsed in full.
    assert!(report.graph.node("LibA > Core.Engine").is_some());

    // The failed one is present, annotated, and empty.
    let placeholder = report.graph.node("Vanished").expect("placeholder node");
    let description = placeholder.description.as_deref().unwrap_or("");
    assert!(description.contains("parse failed"), "{description}");
    assert_eq!(report.graph.children_of("Vanished").count(), 0);
}

#[tokio::test]
async fn project_with_no_artifacts_is_reported_not_fatal() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    std::fs::create_dir_all(root.join("Ghost")).unwrap();
    std::fs::write(root.join("Ghost/Ghost.csproj"), LIB_CSPROJ).unwrap();

    let sln = root.join("Ghost.sln");
    std::fs::write(
        &sln,
        r#"Microsoft Visual Studio Solution File, Format Version 12.00
Project("{FAE04EC0-301F-11D3-BF4B-00C04F79EFBC}") = "Ghost", "Ghost\Ghost.csproj", "{11111111-1111-1111-1111-111111111111}"
EndProject
Global
EndGlobal
"#,
    )
    .unwrap();

    let report = GraphService::parse(&sln).await.unwrap();
    let outcome = report.outcome.as_ref().unwrap();
    assert_eq!(outcome.failures.len(), 1);

    let placeholder = report.graph.node("Ghost").expect("placeholder node");
    assert!(placeholder.description.is_some());
}

#[tokio::test]
async fn cancelled_parse_yields_an_explicitly_incomplete_graph() {
    let dir = TempDir::new().unwrap();
    let sln = write_solution(&dir);

    let (handle, signal) = cancellation();
    handle.cancel();

    let report = GraphService::parse_with(&sln, signal, false).await.unwrap();
    assert!(report.graph.is_incomplete());
    assert!(!snapshot_path(dir.path()).exists());
}

#[tokio::test]
async fn source_navigation_round_trips_through_the_graph() {
    let dir = TempDir::new().unwrap();
    let sln = write_solution(&dir);

    let report = GraphService::parse(&sln).await.unwrap();
    let graph = &report.graph;

    let (path, line) = GraphService::source_location(graph, "LibA > Core.Engine.Start")
        .expect("source-derived node has a location");
    assert!(Path::new(&path).ends_with("LibA/Engine.cs"));
    assert!(line > 1);

    let back = GraphService::node_at(graph, &path, line).expect("inverse lookup");
    assert_eq!(back, "LibA > Core.Engine.Start");

    // Doc text from the declaration rides along as the description.
    assert_eq!(
        graph.node("LibA > Core.Engine").unwrap().description.as_deref(),
        Some("Drives the shop.")
    );
}
