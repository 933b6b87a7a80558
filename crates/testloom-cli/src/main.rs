use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde_json::json;
use testloom_core::{
    AdapterRegistry, CancelSignal, Config, DiscoveryOrchestrator, ExecutionOrchestrator, NodeKind,
    RunReport, RunRequest, TestId, TestSession, TestStatus, TestTree,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "testloom")]
#[command(about = "Discover and run Jest and PHPUnit tests as one tree", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover tests and print the tree
    Discover {
        /// Project root (repeatable, defaults to the current directory)
        #[arg(long = "root")]
        roots: Vec<PathBuf>,
        /// Print JSON instead of an indented tree
        #[arg(long)]
        json: bool,
    },
    /// Discover, then run tests
    Run {
        /// Project root (repeatable, defaults to the current directory)
        #[arg(long = "root")]
        roots: Vec<PathBuf>,
        /// Only run this node and everything below it (repeatable)
        #[arg(long = "only")]
        only: Vec<String>,
        /// Skip this node and everything below it (repeatable)
        #[arg(long = "exclude")]
        exclude: Vec<String>,
        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show which framework owns each project root
    Frameworks {
        /// Project root (repeatable, defaults to the current directory)
        #[arg(long = "root")]
        roots: Vec<PathBuf>,
    },
    /// Print the default configuration
    Config,
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode, Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Config => {
            print!("{}", Config::default_config_string());
            Ok(ExitCode::SUCCESS)
        }
        Commands::Frameworks { roots } => {
            let config = Config::load()?;
            let registry = AdapterRegistry::with_builtin(&config);
            println!("Registered: {}", registry.frameworks().join(", "));
            for root in default_roots(roots) {
                match registry.detect(&root) {
                    Some(adapter) => println!("{}: {}", root.display(), adapter.display_name()),
                    None => println!("{}: (none)", root.display()),
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Discover { roots, json } => {
            let (session, discovery, _) = setup(roots)?;
            let summary = discovery.discover_all().await?;
            let tree = session.tree();

            if json {
                let out = json!({ "summary": summary, "tree": tree.roots() });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                print_tree(&tree);
                println!("\n{} tests", summary.test_count);
            }
            session.dispose();
            Ok(ExitCode::SUCCESS)
        }
        Commands::Run {
            roots,
            only,
            exclude,
            json,
        } => {
            let (session, discovery, execution) = setup(roots)?;
            discovery.discover_all().await?;

            let mut request = if only.is_empty() {
                RunRequest::all()
            } else {
                RunRequest::only(only.into_iter().map(TestId::from))
            };
            request = request.excluding(exclude.into_iter().map(TestId::from));

            let cancel = CancelSignal::new();
            let trigger = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    trigger.cancel();
                }
            });

            let report = execution.run(&request, &cancel).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }
            session.dispose();

            let failed = report.totals().failed > 0;
            Ok(if failed || report.cancelled {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            })
        }
    }
}

fn default_roots(roots: Vec<PathBuf>) -> Vec<PathBuf> {
    if roots.is_empty() {
        vec![PathBuf::from(".")]
    } else {
        roots
    }
}

fn setup(
    roots: Vec<PathBuf>,
) -> Result<
    (Arc<TestSession>, DiscoveryOrchestrator, ExecutionOrchestrator),
    Box<dyn std::error::Error>,
> {
    let config = Config::load()?;
    let registry = Arc::new(AdapterRegistry::with_builtin(&config));
    let session = Arc::new(TestSession::new(default_roots(roots), config));
    let discovery = DiscoveryOrchestrator::new(session.clone(), registry.clone());
    let execution = ExecutionOrchestrator::new(session.clone(), registry);
    Ok((session, discovery, execution))
}

fn print_tree(tree: &TestTree) {
    for (depth, node) in tree.flatten() {
        let indent = "  ".repeat(depth);
        match node.kind {
            NodeKind::File => println!("{}{}", indent, node.location.file.display()),
            NodeKind::Suite => println!("{}{}", indent, node.label),
            NodeKind::Case => println!(
                "{}- {}  ({}:{})",
                indent, node.label, node.location.line, node.location.column
            ),
        }
    }
}

fn print_report(report: &RunReport) {
    for result in &report.results {
        let glyph = match result.status {
            TestStatus::Passed => "✔",
            TestStatus::Failed => "✘",
            TestStatus::Skipped => "↩",
        };
        println!("{} {} ({} ms)", glyph, result.test_id, result.duration_ms);
        if let Some(message) = &result.error_message {
            println!("    {}", message);
        }
    }

    println!();
    for file in &report.per_file {
        let name = file
            .file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| file.file_token.clone());
        println!(
            "{}: {} passed, {} failed, {} skipped ({} ms)",
            name, file.stats.passed, file.stats.failed, file.stats.skipped, file.stats.duration_ms
        );
    }
    if let Some(total) = &report.aggregate {
        println!(
            "Total: {} passed, {} failed, {} skipped ({} ms)",
            total.passed, total.failed, total.skipped, total.duration_ms
        );
    }
    for id in &report.unmatched {
        println!("? {} (no matching test in tree)", id);
    }
    if report.cancelled {
        println!("Run cancelled.");
    }
}
