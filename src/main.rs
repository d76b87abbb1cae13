//! Binary entry point for the docsplice CLI.
//!
//! ## Usage
//!
//! ```bash
//! # Fill a file from recorded generator output and print the result
//! docsplice apply src/app.py --responses recorded.json
//!
//! # Rewrite in place, streaming pass events to stderr
//! docsplice apply src/app.py --responses recorded.json --write --events
//!
//! # Show the fields the docstring pass would request
//! docsplice schema src/app.py --task docstrings
//!
//! # Parse a file and list its targets
//! docsplice check src/app.py --format json
//! ```

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};

use docsplice::cli::{load_config, run_apply, run_check, run_schema, ApplyRequest};
use docsplice::error::{CliError, OutputErrorCode};
use docsplice::output::{emit_response, emit_response_compact, ErrorResponse};
use docsplice_python::{EngineConfig, PassEvent, Task};

// ============================================================================
// CLI Structure
// ============================================================================

/// Splice generated annotations, docstrings and comments into Python source.
#[derive(Parser, Debug)]
#[command(name = "docsplice", version, about = "Splice generated documentation into Python source")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Command,
}

/// Global arguments shared by all subcommands.
#[derive(Parser, Debug)]
struct GlobalArgs {
    /// Log level for tracing output.
    #[arg(long, global = true, value_enum, default_value = "warn")]
    log_level: LogLevel,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    /// Engine configuration file (JSON).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format.
    #[arg(long, global = true, value_enum, default_value = "text")]
    format: OutputFormat,
}

/// Log level for tracing output.
#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn to_tracing_level(self) -> tracing::Level {
        match self {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// Resulting source, or a short summary.
    #[default]
    Text,
    /// Full JSON response.
    Json,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum TaskArg {
    Annotations,
    Docstrings,
    Comments,
}

impl From<TaskArg> for Task {
    fn from(task: TaskArg) -> Self {
        match task {
            TaskArg::Annotations => Task::Annotations,
            TaskArg::Docstrings => Task::Docstrings,
            TaskArg::Comments => Task::Comments,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the passes over a file, answered by recorded generator output.
    Apply {
        /// Python source file.
        file: PathBuf,

        /// Recorded generator output (JSON).
        #[arg(long)]
        responses: PathBuf,

        /// Characters per replayed delta.
        #[arg(long, default_value_t = 16)]
        chunk_size: usize,

        /// Request whole outputs instead of streams.
        #[arg(long)]
        no_streaming: bool,

        /// Replace existing annotations, docstrings and comments.
        #[arg(long)]
        overwrite: bool,

        /// Annotate with `Any` instead of generated types.
        #[arg(long)]
        annotate_with_any: bool,

        #[arg(long)]
        skip_annotations: bool,

        #[arg(long)]
        skip_docstrings: bool,

        #[arg(long)]
        skip_comments: bool,

        /// Indentation unit for inserted blocks (default: detected).
        #[arg(long)]
        indent_unit: Option<String>,

        /// Rewrite the file in place.
        #[arg(long)]
        write: bool,

        /// Print pass events to stderr as JSON lines.
        #[arg(long)]
        events: bool,
    },
    /// Print the field schema a pass would request.
    Schema {
        file: PathBuf,

        #[arg(long, value_enum)]
        task: TaskArg,

        #[arg(long)]
        overwrite: bool,

        /// Groups per request.
        #[arg(long)]
        max_nodes: Option<usize>,
    },
    /// Parse a file and summarize its targets.
    Check { file: PathBuf },
}

// ============================================================================
// Main
// ============================================================================

fn main() -> ExitCode {
    let cli = Cli::parse();

    init_tracing(cli.global.log_level, cli.global.log_json);

    match execute(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let error_code = OutputErrorCode::from(&err);
            let response = ErrorResponse::from_error(&err);

            let _ = emit_response(&response, &mut io::stdout());
            let _ = io::stdout().flush();

            ExitCode::from(error_code.code())
        }
    }
}

/// Initialize tracing subscriber.
fn init_tracing(level: LogLevel, json: bool) {
    use tracing_subscriber::fmt::format::FmtSpan;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_tracing_level().to_string()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn execute(cli: Cli) -> Result<(), CliError> {
    let config = load_config(cli.global.config.as_deref())?;
    let format = cli.global.format;
    match cli.command {
        Command::Apply {
            file,
            responses,
            chunk_size,
            no_streaming,
            overwrite,
            annotate_with_any,
            skip_annotations,
            skip_docstrings,
            skip_comments,
            indent_unit,
            write,
            events,
        } => {
            let mut config = config;
            config.overwrite_existing |= overwrite;
            config.annotate_with_any |= annotate_with_any;
            config.streaming &= !no_streaming;
            config.write_annotations &= !skip_annotations;
            config.write_docstrings &= !skip_docstrings;
            config.write_comments &= !skip_comments;
            if indent_unit.is_some() {
                config.indent_unit = indent_unit;
            }
            if chunk_size == 0 {
                return Err(CliError::invalid_args("--chunk-size must be at least 1"));
            }
            let request = ApplyRequest {
                file,
                recording: responses,
                config,
                chunk_size: Some(chunk_size),
                write,
                on_event: events.then_some(print_event as fn(&PassEvent)),
            };
            execute_apply(&request, format)
        }
        Command::Schema {
            file,
            task,
            overwrite,
            max_nodes,
        } => {
            let overwrite = config.overwrite_existing || overwrite;
            let config = EngineConfig {
                max_nodes_per_request: max_nodes.unwrap_or(config.max_nodes_per_request),
                ..config.with_overwrite(overwrite)
            };
            let response = run_schema(&file, task.into(), &config)?;
            emit_response(&response, &mut io::stdout())?;
            Ok(())
        }
        Command::Check { file } => {
            let response = run_check(&file)?;
            match format {
                OutputFormat::Json => emit_response(&response, &mut io::stdout())?,
                OutputFormat::Text => {
                    let mut stdout = io::stdout();
                    writeln!(
                        stdout,
                        "{}: {} functions, {} classes, {} methods, {} code lines",
                        response.file, response.functions, response.classes, response.methods, response.code_lines
                    )?;
                    for target in &response.targets {
                        writeln!(stdout, "  {target}")?;
                    }
                }
            }
            Ok(())
        }
    }
}

fn execute_apply(request: &ApplyRequest, format: OutputFormat) -> Result<(), CliError> {
    let response = run_apply(request)?;
    let mut stdout = io::stdout();
    match format {
        OutputFormat::Json => emit_response(&response, &mut stdout)?,
        OutputFormat::Text if response.written => {
            for pass in &response.passes {
                writeln!(
                    stdout,
                    "{}: {} applied, {} skipped, {} failed",
                    pass.task, pass.applied, pass.skipped, pass.failed
                )?;
            }
        }
        OutputFormat::Text => write!(stdout, "{}", response.output)?,
    }
    stdout.flush()?;
    Ok(())
}

fn print_event(event: &PassEvent) {
    let _ = emit_response_compact(event, &mut io::stderr());
}

#[cfg(test)]
mod tests {
    use super::*;

    mod cli_parsing {
        use super::*;

        #[test]
        fn apply_defaults() {
            let cli = Cli::try_parse_from(["docsplice", "apply", "a.py", "--responses", "r.json"]).unwrap();
            match cli.command {
                Command::Apply {
                    file,
                    responses,
                    chunk_size,
                    no_streaming,
                    write,
                    ..
                } => {
                    assert_eq!(file, PathBuf::from("a.py"));
                    assert_eq!(responses, PathBuf::from("r.json"));
                    assert_eq!(chunk_size, 16);
                    assert!(!no_streaming);
                    assert!(!write);
                }
                _ => panic!("expected Apply"),
            }
            assert_eq!(cli.global.format, OutputFormat::Text);
        }

        #[test]
        fn apply_requires_responses() {
            assert!(Cli::try_parse_from(["docsplice", "apply", "a.py"]).is_err());
        }

        #[test]
        fn schema_task() {
            let cli = Cli::try_parse_from([
                "docsplice",
                "schema",
                "a.py",
                "--task",
                "comments",
                "--max-nodes",
                "3",
            ])
            .unwrap();
            match cli.command {
                Command::Schema { task, max_nodes, .. } => {
                    assert_eq!(Task::from(task), Task::Comments);
                    assert_eq!(max_nodes, Some(3));
                }
                _ => panic!("expected Schema"),
            }
        }

        #[test]
        fn global_flags_after_subcommand() {
            let cli = Cli::try_parse_from(["docsplice", "check", "a.py", "--format", "json", "--log-level", "debug"])
                .unwrap();
            assert_eq!(cli.global.format, OutputFormat::Json);
            assert!(matches!(cli.global.log_level, LogLevel::Debug));
        }
    }
}
