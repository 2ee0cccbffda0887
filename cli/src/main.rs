//! `smithers` binary: `run`/`plan`/`init` subcommands over the agent-orchestration
//! core (spec §6). Wires a plan file to an [`smithers::ExecutionEngine`] with a
//! process or mock adapter, an optional desktop bridge, and config-summary logging.

mod desktop;
mod log_format;
mod logging;
mod plan_file;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use smithers::config::{
    AdapterConfigSummary, EngineConfigSummary, MiddlewareConfigSummary, RunConfigSummarySource,
    StoreConfigSummary,
};
use smithers::{
    build_config_summary, Adapter, DebugBus, ExecutionEngine, ExecutionOptions, MockAdapter,
    Pipeline, ProcessAdapter, Store,
};

#[derive(Parser)]
#[command(name = "smithers", version, about = "Agent-orchestration runtime CLI")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Executes a plan file.
    Run(RunArgs),
    /// Parses and prints a plan file without executing it (dry run).
    Plan(RunArgs),
    /// Scaffolds a starter plan file in a directory.
    Init {
        /// Directory to scaffold into (defaults to the current directory).
        dir: Option<PathBuf>,
    },
}

#[derive(Parser)]
struct RunArgs {
    /// Path to a `.smithers.xml` plan file.
    file: PathBuf,

    /// Skip confirmation prompts.
    #[arg(short = 'y', long)]
    yes: bool,

    /// Parse and print the plan without executing any tool calls.
    #[arg(long)]
    dry_run: bool,

    /// Maximum number of engine frames before giving up.
    #[arg(long, default_value_t = 100)]
    max_frames: u32,

    /// Wall-clock timeout in milliseconds.
    #[arg(long)]
    timeout: Option<u64>,

    /// Write the final result to a file instead of stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Emit machine-readable JSON instead of human-readable text.
    #[arg(long)]
    json: bool,

    /// Extra root-level props as a JSON object, merged before the first render.
    #[arg(short, long)]
    props: Option<String>,

    /// Model name forwarded to the adapter.
    #[arg(long)]
    model: Option<String>,

    /// Max tokens per adapter call.
    #[arg(long)]
    max_tokens: Option<u32>,

    /// Use the in-memory mock adapter instead of shelling out to a CLI backend.
    #[arg(long)]
    mock: bool,

    /// Path to a config file (defaults to XDG config resolution).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Don't attempt to connect to a desktop bridge.
    #[arg(long)]
    no_desktop: bool,

    /// Verbose logging (also enables the rolling file log and config summary).
    #[arg(short, long)]
    verbose: bool,
}

struct ExecutionOptionsSnapshot {
    max_frames: u32,
    timeout_ms: Option<u64>,
    model: Option<String>,
    mock_mode: bool,
}

struct CliConfigSummarySource {
    options: ExecutionOptionsSnapshot,
    db_path: String,
    adapter_name: String,
}

impl RunConfigSummarySource for CliConfigSummarySource {
    fn engine_section(&self) -> EngineConfigSummary {
        EngineConfigSummary {
            max_frames: self.options.max_frames,
            timeout_ms: self.options.timeout_ms,
            model: self.options.model.clone(),
            parallelism: 4,
            mock_mode: self.options.mock_mode,
        }
    }

    fn store_section(&self) -> StoreConfigSummary {
        StoreConfigSummary {
            db_path: self.db_path.clone(),
            logs_dir: "~/.config/smithers/logs".to_string(),
        }
    }

    fn middleware_section(&self) -> MiddlewareConfigSummary {
        MiddlewareConfigSummary {
            composed_name: None,
            caching_enabled: false,
            rate_limit_enabled: false,
        }
    }

    fn adapter_section(&self) -> AdapterConfigSummary {
        AdapterConfigSummary {
            name: self.adapter_name.clone(),
            default_model: self.options.model.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    config::load_and_apply("smithers", None::<&std::path::Path>).ok();

    let cli = Cli::parse();

    match cli.command {
        Command::Init { dir } => run_init(dir),
        Command::Plan(args) => run_execute(args, true).await,
        Command::Run(args) => run_execute(args, false).await,
    }
}

fn run_init(dir: Option<PathBuf>) -> ExitCode {
    let dir = dir.unwrap_or_else(|| PathBuf::from("."));
    match plan_file::init_project(&dir) {
        Ok(path) => {
            println!("wrote {}", path.display());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(2)
        }
    }
}

async fn run_execute(args: RunArgs, dry_run_subcommand: bool) -> ExitCode {
    let _guard = match logging::init(args.verbose, args.json) {
        Ok(g) => g,
        Err(e) => {
            eprintln!("error: failed to initialize logging: {e}");
            return ExitCode::from(2);
        }
    };

    if let Some(props_json) = &args.props {
        if let Err(e) = serde_json::from_str::<serde_json::Value>(props_json) {
            eprintln!("error: --props is not valid JSON: {e}");
            return ExitCode::from(2);
        }
    }

    let dry_run = dry_run_subcommand || args.dry_run;

    let plan = match plan_file::load_plan(&args.file) {
        Ok(node) => node,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::from(2);
        }
    };

    if dry_run {
        let xml = smithers::to_canonical_xml(&plan);
        return write_text_output(&xml, args.output.as_deref());
    }

    if !args.yes && !args.json {
        eprintln!(
            "about to execute {}; pass -y/--yes to proceed without this prompt",
            args.file.display()
        );
    }

    let db_path = args.file.with_extension("db").to_string_lossy().into_owned();
    let store = match Store::open(&db_path) {
        Ok(s) => Arc::new(s),
        Err(e) => {
            eprintln!("error: failed to open store at {db_path}: {e}");
            return ExitCode::from(1);
        }
    };

    let (adapter, adapter_name): (Arc<dyn Adapter>, &str) = if args.mock {
        (Arc::new(MockAdapter::echo("mock", "")), "mock")
    } else {
        (Arc::new(ProcessAdapter::new("claude-cli", "claude")), "claude-cli")
    };

    let pipeline = Arc::new(Pipeline::new(vec![]));
    let cancel = CancellationToken::new();

    let desktop_bridge = if args.no_desktop { None } else { desktop::connect(None).await };
    let debug_sink = desktop_bridge.as_ref().map(|(bridge, _)| bridge.sink());
    let debug = Arc::new(DebugBus::new("smithers-run", debug_sink));

    let execution_id = uuid::Uuid::new_v4().to_string();
    let engine = ExecutionEngine::new(store.clone(), execution_id, adapter, pipeline, debug, cancel.clone());

    if let Some((_, mut controls)) = desktop_bridge {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            while let Some(control) = controls.recv().await {
                if matches!(control, desktop::DesktopControl::Cancel) {
                    cancel.cancel();
                }
            }
        });
    }

    let options = ExecutionOptions {
        max_frames: args.max_frames,
        timeout: args.timeout.map(Duration::from_millis),
        mock_mode: args.mock,
        model: args.model.clone(),
        max_tokens: args.max_tokens,
        parallelism: 4,
        debug_include_tree_snapshots: args.verbose,
        on_frame_update: None,
    };

    if args.verbose {
        let summary_source = CliConfigSummarySource {
            options: ExecutionOptionsSnapshot {
                max_frames: options.max_frames,
                timeout_ms: args.timeout,
                model: args.model.clone(),
                mock_mode: args.mock,
            },
            db_path: db_path.clone(),
            adapter_name: adapter_name.to_string(),
        };
        build_config_summary(&summary_source).print_to_stderr();
    }

    let rerender = plan_file::rerender_from_file(args.file.clone());
    let result = engine.run(rerender, options).await;

    let exit_code = if result.error.is_some() { ExitCode::FAILURE } else { ExitCode::SUCCESS };

    let written = if args.json {
        let payload = serde_json::json!({
            "output": result.output,
            "frames": result.frames,
            "total_duration_ms": result.total_duration.as_millis(),
            "reason": format!("{:?}", result.reason),
            "error": result.error,
        });
        write_text_output(&serde_json::to_string_pretty(&payload).unwrap_or_default(), args.output.as_deref())
    } else {
        let code = write_text_output(&result.output.clone().unwrap_or_default(), args.output.as_deref());
        if let Some(err) = &result.error {
            eprintln!("error: {err}");
        }
        code
    };

    let _ = store.close();
    if written != ExitCode::SUCCESS {
        written
    } else {
        exit_code
    }
}

fn write_text_output(text: &str, output: Option<&std::path::Path>) -> ExitCode {
    match output {
        Some(path) => match std::fs::write(path, text) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("error: cannot write {}: {e}", path.display());
                ExitCode::from(2)
            }
        },
        None => {
            println!("{text}");
            ExitCode::SUCCESS
        }
    }
}
