// Copyright 2026 Motion Probe Contributors
// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use motion_probe::cli;
use motion_probe::cli::analyze_cmd::AnalyzeOptions;
use motion_probe::cli::inspect_cmd::InspectView;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "motion-probe",
    about = "motion-probe: recover easing curves, durations and scroll triggers from live sites",
    version,
    after_help = "Run 'motion-probe <command> --help' for details on each command."
)]
struct Cli {
    /// Output results as JSON (machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Suppress non-essential output
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Enable verbose/debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// Log line format
    #[arg(long, global = true, value_enum, default_value = "text")]
    log_format: LogFormat,

    /// Config file (default: MOTION_PROBE_CONFIG, then ./.motion-probe.json,
    /// then ~/.motion-probe/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze sites and write results and a report
    Analyze {
        /// Category names, URLs or files with one URL per line
        #[arg(required = true)]
        targets: Vec<String>,
        /// Directory for the results and report files
        #[arg(long, short, default_value = "results")]
        out: PathBuf,
        /// Prefix for the report file names
        #[arg(long)]
        name: Option<String>,
        /// Chromium executable to use
        #[arg(long)]
        chromium: Option<PathBuf>,
        /// Pause between sites in milliseconds
        #[arg(long)]
        delay: Option<u64>,
        /// Show the browser window
        #[arg(long)]
        headful: bool,
        /// Do not write report files
        #[arg(long)]
        no_report: bool,
    },
    /// List the built-in site categories
    Categories {
        /// Also list each category's URLs
        #[arg(long)]
        urls: bool,
    },
    /// Show one view of a saved results file
    Inspect {
        /// Path to a <name>-results.json file
        file: PathBuf,
        /// What to show
        #[arg(long, value_enum, default_value = "easings")]
        view: InspectView,
        /// Maximum entries per site or channel
        #[arg(long, default_value = "15")]
        limit: usize,
    },
    /// Generate shell completion scripts
    Completions {
        /// Shell type (bash, zsh, fish, powershell)
        shell: Shell,
    },
}

fn init_tracing(verbose: bool, quiet: bool, format: LogFormat) {
    let default = if verbose {
        "motion_probe=debug"
    } else if quiet {
        "motion_probe=error"
    } else {
        "motion_probe=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.with_target(false).init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Global flags are read through env vars by the output helpers
    if cli.json {
        std::env::set_var("MOTION_PROBE_JSON", "1");
    }
    if cli.quiet {
        std::env::set_var("MOTION_PROBE_QUIET", "1");
    }
    if cli.no_color {
        std::env::set_var("MOTION_PROBE_NO_COLOR", "1");
    }
    init_tracing(cli.verbose, cli.quiet, cli.log_format);

    let result = match cli.command {
        Commands::Analyze {
            targets,
            out,
            name,
            chromium,
            delay,
            headful,
            no_report,
        } => {
            let opts = AnalyzeOptions {
                targets,
                out_dir: out,
                name,
                config: cli.config,
                chromium,
                delay_ms: delay,
                headful,
                no_report,
            };
            cli::analyze_cmd::run(&opts).await
        }
        Commands::Categories { urls } => cli::categories_cmd::run(urls),
        Commands::Inspect { file, view, limit } => cli::inspect_cmd::run(&file, view, limit),
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "motion-probe", &mut std::io::stdout());
            Ok(())
        }
    };

    // Consistent exit codes: 0=success, 1=error
    if let Err(e) = &result {
        if cli::output::is_json() {
            cli::output::print_json(&serde_json::json!({
                "error": true,
                "message": format!("{e:#}"),
            }));
        } else if !cli::output::is_quiet() {
            eprintln!("  Error: {e:#}");
        }
        std::process::exit(1);
    }

    result
}
