// Copyright 2026 Modpilot Contributors
// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;
use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use modpilot::cli::{self, run_cmd::RunOptions, SessionOptions};

#[derive(Parser)]
#[command(
    name = "modpilot",
    about = "Complete course modules in order through the platform's progress API",
    version,
    after_help = "Run 'modpilot <command> --help' for details on each command."
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

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct SessionArgs {
    /// Course page URL
    course_url: String,
    /// Session cookie header (e.g. "PHPSESSID=...; csrfToken=...")
    #[arg(long)]
    cookie: Option<String>,
    /// Origin for the progress endpoints (defaults to the course URL's origin)
    #[arg(long)]
    base_url: Option<String>,
    /// Comma-separated position_data candidates for video modules
    #[arg(long)]
    candidates: Option<String>,
    /// Per-request timeout in milliseconds (default: none)
    #[arg(long)]
    timeout_ms: Option<u64>,
}

impl From<SessionArgs> for SessionOptions {
    fn from(args: SessionArgs) -> Self {
        Self {
            course_url: args.course_url,
            cookie: args.cookie,
            base_url: args.base_url,
            candidates: args.candidates,
            timeout_ms: args.timeout_ms,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Complete every module on a course page, in order
    Run {
        #[command(flatten)]
        session: SessionArgs,
        /// Module indices to skip (e.g. "3,7")
        #[arg(long)]
        skip: Option<String>,
        /// Pause between modules in milliseconds
        #[arg(long)]
        delay_ms: Option<u64>,
    },
    /// Show the module table of a course page
    Status {
        #[command(flatten)]
        session: SessionArgs,
    },
    /// Submit stream progress for one module without changing local state
    TestModule {
        #[command(flatten)]
        session: SessionArgs,
        /// Module index
        index: usize,
    },
    /// Generate shell completion scripts
    Completions {
        /// Shell type (bash, zsh, fish, powershell)
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set global flags via environment variables so all modules can check them
    if cli.json {
        std::env::set_var("MODPILOT_JSON", "1");
    }
    if cli.quiet {
        std::env::set_var("MODPILOT_QUIET", "1");
    }
    if cli.verbose {
        std::env::set_var("MODPILOT_VERBOSE", "1");
    }
    cli::init_tracing();

    let result = match cli.command {
        Commands::Run {
            session,
            skip,
            delay_ms,
        } => cli::run_cmd::run(&session.into(), &RunOptions { skip, delay_ms }).await,
        Commands::Status { session } => cli::status_cmd::run(&session.into()).await,
        Commands::TestModule { session, index } => {
            cli::test_cmd::run(&session.into(), index).await
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "modpilot", &mut std::io::stdout());
            Ok(())
        }
    };

    // Consistent exit codes: 0=success, 1=error
    if let Err(e) = &result {
        if !cli::output::is_quiet() && !cli::output::is_json() {
            eprintln!("  Error: {e:#}");
        }
        if cli::output::is_json() {
            cli::output::print_json(&serde_json::json!({
                "error": true,
                "message": format!("{e:#}"),
            }));
        }
        std::process::exit(1);
    }

    result
}
