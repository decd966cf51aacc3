use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use depmap_solution_parser::GraphService;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "depmap")]
#[command(about = "Build and query dependency graphs for .NET solutions", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a solution, project or compiled module into a graph
    Parse(ParseArgs),

    /// Show the source location and excerpt behind a node
    Source(SourceArgs),

    /// Find the node declared at a source location
    Locate(LocateArgs),

    /// Report the cache decision for a solution
    Stale(StaleArgs),
}

#[derive(Args)]
struct ParseArgs {
    /// Path to a .sln, .csproj, .dll or .exe
    path: PathBuf,

    /// Ignore any cached snapshot and re-parse
    #[arg(long)]
    no_cache: bool,

    /// Print statistics as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct SourceArgs {
    /// Path to the solution or project the node belongs to
    path: PathBuf,

    /// Fully-qualified node name, e.g. "LibA > Core.Engine.Run"
    node: String,
}

#[derive(Args)]
struct LocateArgs {
    /// Path to the solution or project
    path: PathBuf,

    /// Source file the location is in
    file: String,

    /// 1-based line number
    line: u32,
}

#[derive(Args)]
struct StaleArgs {
    /// Path to the solution
    path: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Parse(args) => run_parse(args).await,
        Commands::Source(args) => run_source(args).await,
        Commands::Locate(args) => run_locate(args).await,
        Commands::Stale(args) => run_stale(args).await,
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .target(env_logger::Target::Stderr)
        .init();
}

async fn run_parse(args: ParseArgs) -> Result<()> {
    let report = GraphService::parse_with(
        &args.path,
        depmap_stream::CancelSignal::never(),
        !args.no_cache,
    )
    .await
    .with_context(|| format!("parsing {}", args.path.display()))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report.stats)?);
        return Ok(());
    }

    let origin = if report.from_cache {
        "restored from cache"
    } else {
        "parsed"
    };
    println!(
        "{}: {} nodes, {} links ({} unresolved), {} ms",
        origin,
        report.graph.node_count(),
        report.graph.link_count(),
        report.graph.unresolved_links().count(),
        report.stats.time_ms
    );
    if let Some(outcome) = &report.outcome {
        for failure in &outcome.failures {
            println!("  failed: {} ({})", failure.project, failure.error);
        }
    }
    if report.graph.is_incomplete() {
        println!("  graph is incomplete (parse was cancelled)");
    }
    Ok(())
}

async fn run_source(args: SourceArgs) -> Result<()> {
    let report = GraphService::parse(&args.path).await?;
    let Some((file, line)) = GraphService::source_location(&report.graph, &args.node) else {
        bail!("node {} has no source location", args.node);
    };
    println!("{file}:{line}");

    let spans = GraphService::span_index(&report.graph);
    if let Some(excerpt) = spans.source_excerpt(&args.node)? {
        println!("{excerpt}");
    }
    Ok(())
}

async fn run_locate(args: LocateArgs) -> Result<()> {
    let report = GraphService::parse(&args.path).await?;
    match GraphService::node_at(&report.graph, &args.file, args.line) {
        Some(node) => println!("{node}"),
        None => bail!("no node encloses {}:{}", args.file, args.line),
    }
    Ok(())
}

async fn run_stale(args: StaleArgs) -> Result<()> {
    let decision = GraphService::staleness(&args.path).await?;
    if decision.fresh {
        println!("fresh: cached snapshot is current");
    } else {
        println!("stale: {:?}", decision.reasons);
    }
    if let Some(oldest) = decision.oldest_artifact_ms {
        println!("oldest artifact timestamp (ms since epoch): {oldest}");
    }
    Ok(())
}
