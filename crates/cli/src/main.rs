mod outline;

use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use serde_json::{Map, Value};
use stepline_core::{ExecutionResult, StepTree};
use stepline_eval::PipelineDecl;
use stepline_inspect::Inspector;

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// Inspect and simulate step pipeline runs.
#[derive(Parser)]
#[command(
    name = "stepline",
    version,
    about = "Inspect and simulate step pipeline runs"
)]
struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, global = true)]
    quiet: bool,

    /// Log every step of a run to stderr
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the numbered step tree of a pipeline
    Tree {
        /// Path to the pipeline file (.toml or .json)
        pipeline: PathBuf,
    },

    /// Render the execution flow of a recorded run
    Flow {
        /// Path to the pipeline file (.toml or .json)
        pipeline: PathBuf,
        /// Path to the recorded run (JSON)
        #[arg(long)]
        result: PathBuf,
    },

    /// Print why a recorded run failed (nothing when it succeeded)
    Error {
        /// Path to the pipeline file (.toml or .json)
        pipeline: PathBuf,
        /// Path to the recorded run (JSON)
        #[arg(long)]
        result: PathBuf,
    },

    /// Full inspection report of a recorded run
    Inspect {
        /// Path to the pipeline file (.toml or .json)
        pipeline: PathBuf,
        /// Path to the recorded run (JSON)
        #[arg(long)]
        result: PathBuf,
    },

    /// Run a pipeline with its scripted handlers and inspect the result
    Simulate {
        /// Path to the pipeline file (.toml or .json)
        pipeline: PathBuf,
        /// Input parameters (JSON object)
        #[arg(long)]
        params: Option<PathBuf>,
        /// Write the recorded run to this file
        #[arg(long)]
        save: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    match cli.command {
        Commands::Tree { pipeline } => {
            cmd_tree(&pipeline, cli.output, cli.quiet);
        }
        Commands::Flow { pipeline, result } => {
            cmd_flow(&pipeline, &result, cli.output, cli.quiet);
        }
        Commands::Error { pipeline, result } => {
            cmd_error(&pipeline, &result, cli.output, cli.quiet);
        }
        Commands::Inspect { pipeline, result } => {
            cmd_inspect(&pipeline, &result, cli.output, cli.quiet);
        }
        Commands::Simulate {
            pipeline,
            params,
            save,
        } => {
            cmd_simulate(
                &pipeline,
                params.as_deref(),
                save.as_deref(),
                cli.output,
                cli.quiet,
            );
        }
    }
}

/// Logs go to stderr so reports on stdout stay pipeable.
fn init_logging(verbose: bool, quiet: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else if quiet {
        tracing::Level::ERROR
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .with_target(false)
        .init();
}

// ──────────────────────────────────────────────
// Commands
// ──────────────────────────────────────────────

fn cmd_tree(pipeline_path: &Path, output: OutputFormat, quiet: bool) {
    let tree = load_tree(pipeline_path, output, quiet);
    let flat = tree.flatten();
    match output {
        OutputFormat::Text => println!("{}", outline::render(&flat)),
        OutputFormat::Json => print_json(&outline::entries(&flat), output, quiet),
    }
}

#[derive(Serialize)]
struct FlowOutput<'a> {
    pipeline: &'a str,
    total: usize,
    shown: usize,
    flow: String,
}

fn cmd_flow(pipeline_path: &Path, result_path: &Path, output: OutputFormat, quiet: bool) {
    let tree = load_tree(pipeline_path, output, quiet);
    let result = load_result(result_path, output, quiet);
    let inspector = open_inspector(&tree, &result, output, quiet);
    match output {
        OutputFormat::Text => println!("{}", inspector.execution_flow()),
        OutputFormat::Json => {
            let trace = inspector.trace();
            let out = FlowOutput {
                pipeline: tree.name(),
                total: trace.total,
                shown: trace.shown,
                flow: trace.to_text(),
            };
            print_json(&out, output, quiet);
        }
    }
}

#[derive(Serialize)]
struct ErrorOutput<'a> {
    pipeline: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    failed_at: Option<String>,
    error: String,
}

fn cmd_error(pipeline_path: &Path, result_path: &Path, output: OutputFormat, quiet: bool) {
    let tree = load_tree(pipeline_path, output, quiet);
    let result = load_result(result_path, output, quiet);
    let inspector = open_inspector(&tree, &result, output, quiet);
    let summary = inspector.summary();
    match output {
        OutputFormat::Text => {
            if !summary.message.is_empty() {
                println!("{}", summary.message);
            }
        }
        OutputFormat::Json => {
            let out = ErrorOutput {
                pipeline: tree.name(),
                failed_at: summary.failed_key,
                error: summary.message,
            };
            print_json(&out, output, quiet);
        }
    }
}

fn cmd_inspect(pipeline_path: &Path, result_path: &Path, output: OutputFormat, quiet: bool) {
    let tree = load_tree(pipeline_path, output, quiet);
    let result = load_result(result_path, output, quiet);
    let inspector = open_inspector(&tree, &result, output, quiet);
    print_inspection(&inspector, output, quiet);
}

fn cmd_simulate(
    pipeline_path: &Path,
    params_path: Option<&Path>,
    save_path: Option<&Path>,
    output: OutputFormat,
    quiet: bool,
) {
    let decl = load_decl(pipeline_path, output, quiet);
    let input = match params_path {
        Some(path) => load_params(path, output, quiet),
        None => Map::new(),
    };

    let (tree, result) = match stepline_eval::simulate(&decl, input) {
        Ok(run) => run,
        Err(e) => {
            let msg = format!("error: cannot simulate {}: {}", pipeline_path.display(), e);
            report_error(&msg, output, quiet);
            process::exit(1);
        }
    };

    if let Some(path) = save_path {
        let saved = serde_json::to_string_pretty(&result)
            .map_err(|e| e.to_string())
            .and_then(|json| std::fs::write(path, json + "\n").map_err(|e| e.to_string()));
        if let Err(e) = saved {
            let msg = format!("error: cannot write {}: {}", path.display(), e);
            report_error(&msg, output, quiet);
            process::exit(1);
        }
    }

    let inspector = open_inspector(&tree, &result, output, quiet);
    print_inspection(&inspector, output, quiet);
}

fn print_inspection(inspector: &Inspector<'_>, output: OutputFormat, quiet: bool) {
    match output {
        OutputFormat::Text => println!("{}", inspector.inspect()),
        OutputFormat::Json => print_json(&inspector.report(), output, quiet),
    }
}

// ──────────────────────────────────────────────
// Loading
// ──────────────────────────────────────────────

fn load_decl(path: &Path, output: OutputFormat, quiet: bool) -> PipelineDecl {
    match PipelineDecl::from_path(path) {
        Ok(decl) => decl,
        Err(e) => {
            let msg = format!("error: cannot load pipeline {}: {}", path.display(), e);
            report_error(&msg, output, quiet);
            process::exit(1);
        }
    }
}

fn load_tree(path: &Path, output: OutputFormat, quiet: bool) -> StepTree {
    match load_decl(path, output, quiet).to_tree() {
        Ok(tree) => tree,
        Err(e) => {
            let msg = format!("error: invalid pipeline {}: {}", path.display(), e);
            report_error(&msg, output, quiet);
            process::exit(1);
        }
    }
}

fn read_json(path: &Path, what: &str, output: OutputFormat, quiet: bool) -> Value {
    let text = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(_) => {
            let msg = format!("error: {} file not found: {}", what, path.display());
            report_error(&msg, output, quiet);
            process::exit(1);
        }
    };
    match serde_json::from_str(&text) {
        Ok(v) => v,
        Err(e) => {
            let msg = format!("error: invalid JSON in {}: {}", path.display(), e);
            report_error(&msg, output, quiet);
            process::exit(1);
        }
    }
}

fn load_result(path: &Path, output: OutputFormat, quiet: bool) -> ExecutionResult {
    let value = read_json(path, "result", output, quiet);
    match serde_json::from_value(value) {
        Ok(result) => result,
        Err(e) => {
            let msg = format!("error: invalid run in {}: {}", path.display(), e);
            report_error(&msg, output, quiet);
            process::exit(1);
        }
    }
}

fn load_params(path: &Path, output: OutputFormat, quiet: bool) -> Map<String, Value> {
    match read_json(path, "params", output, quiet) {
        Value::Object(map) => map,
        _ => {
            let msg = format!("error: parameters in {} must be a JSON object", path.display());
            report_error(&msg, output, quiet);
            process::exit(1);
        }
    }
}

fn open_inspector<'a>(
    tree: &'a StepTree,
    result: &'a ExecutionResult,
    output: OutputFormat,
    quiet: bool,
) -> Inspector<'a> {
    match Inspector::new(tree, result) {
        Ok(inspector) => inspector,
        Err(e) => {
            report_error(&format!("error: {}", e), output, quiet);
            process::exit(1);
        }
    }
}

// ──────────────────────────────────────────────
// Output
// ──────────────────────────────────────────────

fn print_json<T: Serialize>(value: &T, output: OutputFormat, quiet: bool) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            report_error(&format!("error: cannot serialize output: {}", e), output, quiet);
            process::exit(1);
        }
    }
}

/// Report an error in the requested output format.
pub(crate) fn report_error(msg: &str, output: OutputFormat, quiet: bool) {
    if quiet {
        return;
    }
    match output {
        OutputFormat::Text => eprintln!("{}", msg),
        OutputFormat::Json => {
            eprintln!("{}", serde_json::json!({ "error": msg }));
        }
    }
}
