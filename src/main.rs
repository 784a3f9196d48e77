use std::time::Duration;

use clap::{Parser, Subcommand};

use toolbelt::config;
use toolbelt::pipeline::{self, PipelineError};
use toolbelt::tools;

#[derive(Parser)]
#[command(
    name = "toolbelt",
    version,
    about = "Policy-gated shell toolbelt for LLM agents"
)]
struct Cli {
    /// Show config resolution details
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Split, validate, and execute a command pipeline
    Run {
        /// The command string (quote it: 'grep -r TODO . | wc -l')
        command: String,
        /// Override the configured wall-clock budget, in seconds
        #[arg(long)]
        timeout: Option<u64>,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Execute a named tool with JSON arguments and print its result
    Call {
        /// Tool name (e.g. "run_safe_shell")
        name: String,
        /// Arguments as a JSON object
        #[arg(long, default_value = "{}")]
        args: String,
        /// Current goal id, used when the tool call does not carry one
        #[arg(long)]
        goal: Option<i64>,
    },
    /// Print the tool definitions as pretty JSON
    Tools,
    /// Print the effective allowed command prefixes, one per line
    Policy,
}

/// Map a pipeline failure to a process exit code: 124 timeout, 127 missing
/// program, 2 malformed input, a failing stage's own code, 1 otherwise.
fn exit_code_for(err: &PipelineError) -> i32 {
    match err {
        PipelineError::Malformed(_) => 2,
        PipelineError::Timeout { .. } => 124,
        PipelineError::Spawn { source, .. } if source.kind() == std::io::ErrorKind::NotFound => 127,
        PipelineError::StageFailed { code, .. } if *code != 0 => *code,
        PipelineError::PolicyViolation { .. }
        | PipelineError::Spawn { .. }
        | PipelineError::StageFailed { .. } => 1,
    }
}

fn cmd_run(command: &str, timeout_override: Option<u64>, json: bool, verbose: bool) -> anyhow::Result<i32> {
    let settings = config::load(verbose)?;
    let timeout = timeout_override.map_or(settings.timeout, Duration::from_secs);

    let stages = match pipeline::split_and_tokenize(command) {
        Ok(stages) => stages,
        Err(e) => {
            eprintln!("[toolbelt] error: {e}");
            return Ok(exit_code_for(&e));
        }
    };

    match pipeline::execute(&stages, &settings.policy, timeout) {
        Ok(result) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else if !result.output.is_empty() {
                print!("{}", result.output);
            }
            Ok(0)
        }
        Err(e) => {
            eprintln!("[toolbelt] error: {e}");
            if let PipelineError::StageFailed { stderr, .. } = &e
                && !stderr.trim().is_empty()
            {
                eprint!("{stderr}");
                if !stderr.ends_with('\n') {
                    eprintln!();
                }
            }
            Ok(exit_code_for(&e))
        }
    }
}

fn cmd_call(name: &str, args: &str, goal: Option<i64>, verbose: bool) -> anyhow::Result<i32> {
    let args: serde_json::Value = serde_json::from_str(args)
        .map_err(|e| anyhow::anyhow!("invalid --args JSON: {e}"))?;
    let settings = config::load(verbose)?;
    let ctx = tools::ToolContext::new(&settings, goal);
    println!("{}", tools::execute_tool(name, &args, &ctx));
    Ok(0)
}

fn cmd_tools() -> anyhow::Result<i32> {
    println!("{}", serde_json::to_string_pretty(&tools::definitions())?);
    Ok(0)
}

fn cmd_policy(verbose: bool) -> anyhow::Result<i32> {
    let settings = config::load(false)?;
    if verbose {
        eprintln!("[toolbelt] config: {}", settings.source);
    }
    for prefix in settings.policy.prefixes() {
        println!("{prefix}");
    }
    Ok(0)
}

fn or_exit(r: anyhow::Result<i32>) -> i32 {
    r.unwrap_or_else(|e| {
        eprintln!("[toolbelt] error: {e:#}");
        1
    })
}

fn main() {
    let cli = Cli::parse();
    let exit_code = match &cli.command {
        Commands::Run {
            command,
            timeout,
            json,
        } => or_exit(cmd_run(command, *timeout, *json, cli.verbose)),
        Commands::Call { name, args, goal } => or_exit(cmd_call(name, args, *goal, cli.verbose)),
        Commands::Tools => or_exit(cmd_tools()),
        Commands::Policy => or_exit(cmd_policy(cli.verbose)),
    };
    std::process::exit(exit_code);
}
