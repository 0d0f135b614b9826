#![forbid(unsafe_code)]

mod cmd;
mod output;

use clap::{CommandFactory, Parser, Subcommand};
use output::{CliError, OutputMode, render_error};
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    name = "carefind",
    author,
    version,
    about = "carefind: filtered semantic search over a provider directory",
    long_about = None
)]
struct Cli {
    /// Enable debug logging for carefind crates.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON output instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    /// Output format (overrides --json and CAREFIND_FORMAT).
    #[arg(long, global = true, value_enum)]
    format: Option<OutputMode>,

    /// Provider database path (overrides config and CAREFIND_DB).
    #[arg(long, global = true, value_name = "PATH")]
    db: Option<PathBuf>,

    /// Embedding model id (overrides config and CAREFIND_EMBEDDING_MODEL).
    #[arg(long, global = true, value_name = "ID")]
    model: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn output_mode(&self) -> OutputMode {
        output::resolve_output_mode(self.format, self.json)
    }

    fn overrides(&self) -> cmd::Overrides {
        cmd::Overrides {
            db: self.db.clone(),
            model: self.model.clone(),
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Store",
        about = "Create the provider store",
        long_about = "Create (or migrate) the provider database and optionally write a default carefind.toml.",
        after_help = "EXAMPLES:\n    # Create the store at the configured path\n    carefind init\n\n    # Also write ./carefind.toml with defaults\n    carefind init --write-config"
    )]
    Init(cmd::init::InitArgs),

    #[command(
        next_help_heading = "Store",
        about = "Embed and upsert provider records",
        long_about = "Read a JSON array of provider records, embed each one, and upsert them by id.\n\n\
                      Validation happens before any write: one malformed record aborts the run.",
        after_help = "EXAMPLES:\n    # Ingest a file\n    carefind ingest providers.json\n\n    # Smaller write transactions\n    carefind ingest providers.json --batch-size 100"
    )]
    Ingest(cmd::ingest::IngestArgs),

    #[command(
        next_help_heading = "Search",
        about = "Search providers by filters and semantic similarity",
        long_about = "Apply every supplied filter, then rank the matches by embedding distance.",
        after_help = "EXAMPLES:\n    # Cardiologists in Austin\n    carefind search --city Austin --specialty cardio\n\n    # Spanish-speaking, accepting new patients, rated 4+\n    carefind search --language Spanish --accepting true --min-rating 4\n\n    # Machine-readable output\n    carefind search --state TX -n 10 --json"
    )]
    Search(cmd::search::SearchArgs),

    #[command(
        next_help_heading = "Search",
        about = "Serve the search_providers tool over stdin/stdout",
        long_about = "Read one JSON request per line from stdin and write one JSON response per line to stdout.",
        after_help = "EXAMPLES:\n    # Print the tool descriptor\n    carefind tool --describe\n\n    # One-shot call\n    echo '{\"id\":1,\"arguments\":{\"city\":\"Austin\"}}' | carefind tool"
    )]
    Tool(cmd::tool::ToolArgs),

    #[command(
        next_help_heading = "Store",
        about = "Show store statistics",
        after_help = "EXAMPLES:\n    carefind stats\n    carefind stats --json"
    )]
    Stats,

    #[command(
        next_help_heading = "Store",
        about = "Check stored embeddings against current provider text",
        long_about = "Recompute each provider's descriptive text and compare its hash with the one stored at ingestion.\n\n\
                      Exits with status 2 when any row is stale.",
        after_help = "EXAMPLES:\n    carefind verify\n    carefind verify --json"
    )]
    Verify,

    #[command(
        next_help_heading = "Setup",
        about = "Show the effective configuration",
        after_help = "EXAMPLES:\n    carefind config\n    carefind config --json"
    )]
    Config,

    #[command(
        next_help_heading = "Setup",
        about = "Generate shell completion scripts",
        after_help = "EXAMPLES:\n    carefind completions bash > ~/.local/share/bash-completion/completions/carefind"
    )]
    Completions(cmd::completions::CompletionsArgs),
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_env("CAREFIND_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if verbose || env::var("DEBUG").is_ok() {
            "carefind=debug,info"
        } else {
            "carefind=info,warn"
        })
    });

    let format = env::var("CAREFIND_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    // stdout carries results and the tool protocol, so logs go to stderr.
    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn run(cli: Cli, output: OutputMode) -> anyhow::Result<ExitCode> {
    let project_root = env::current_dir()?;
    let overrides = cli.overrides();
    debug!(command = ?cli.command, "dispatching");

    match cli.command {
        Commands::Init(ref args) => {
            cmd::init::run_init(args, &overrides, output, &project_root)?;
        }
        Commands::Ingest(ref args) => {
            cmd::ingest::run_ingest(args, &overrides, output, &project_root)?;
        }
        Commands::Search(ref args) => {
            cmd::search::run_search(args, &overrides, output, &project_root)?;
        }
        Commands::Tool(ref args) => {
            cmd::tool::run_tool(args, &overrides, &project_root)?;
        }
        Commands::Stats => cmd::stats::run_stats(&overrides, output, &project_root)?,
        Commands::Verify => {
            return cmd::verify::run_verify(&overrides, output, &project_root);
        }
        Commands::Config => cmd::config::run_config(&overrides, output, &project_root)?,
        Commands::Completions(args) => {
            let mut command = Cli::command();
            cmd::completions::run_completions(args.shell, &mut command)?;
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let output = cli.output_mode();

    match run(cli, output) {
        Ok(code) => code,
        Err(err) => {
            if render_error(output, &CliError::from(&err)).is_err() {
                eprintln!("error: {err:#}");
            }
            ExitCode::FAILURE
        }
    }
}
