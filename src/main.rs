//! Agent Notch - supervise a local MCP server and show what it is doing.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use agent_notch::config::{ConfigLoader, ConfigOverrides, NotchConfig, Transport};
use agent_notch::display;
use agent_notch::supervisor::{CoordinatorHandle, CoordinatorSnapshot, McpCoordinator};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum TransportArg {
    Stdio,
    Http,
}

impl From<TransportArg> for Transport {
    fn from(arg: TransportArg) -> Self {
        match arg {
            TransportArg::Stdio => Transport::Stdio,
            TransportArg::Http => Transport::Http,
        }
    }
}

#[derive(Parser)]
#[command(
    name = "agent-notch",
    about = "Supervise a local MCP server and show its tool calls",
    version
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Config file to use instead of the default search paths.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Launch the MCP server and supervise it until Ctrl-C.
    Run {
        /// Path to the server executable.
        #[arg(long)]
        binary: Option<PathBuf>,
        /// Transport mode (stdio, http).
        #[arg(short, long, value_enum)]
        transport: Option<TransportArg>,
        /// Port for HTTP transport.
        #[arg(short, long)]
        port: Option<u16>,
        /// Do not restart the server after a crash.
        #[arg(long)]
        no_auto_restart: bool,
    },
    /// Print the resolved configuration.
    Config,
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let loader = ConfigLoader::from_cli(cli.config.clone());
    let overrides = match &cli.command {
        Commands::Run {
            binary,
            transport,
            port,
            no_auto_restart,
        } => ConfigOverrides {
            binary_path: binary.clone(),
            transport: transport.map(Transport::from),
            http_port: *port,
            disable_auto_restart: *no_auto_restart,
        },
        Commands::Config => ConfigOverrides::default(),
    };

    let config = match loader.load_with(&overrides) {
        Ok(config) => config,
        Err(e) => {
            display::print_error(&e.to_string());
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Commands::Run { .. } => run(&config).await,
        Commands::Config => print_config(&loader, &config),
    }
}

fn print_config(loader: &ConfigLoader, config: &NotchConfig) -> ExitCode {
    println!("Search paths:");
    for path in loader.search_paths() {
        let marker = if path.exists() { "*" } else { " " };
        println!("  {marker} {}", path.display());
    }
    println!();

    match toml::to_string_pretty(config) {
        Ok(text) => {
            println!("{text}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            display::print_error(&format!("Failed to render config: {e}"));
            ExitCode::FAILURE
        }
    }
}

async fn run(config: &NotchConfig) -> ExitCode {
    tracing::info!(
        binary = %config.server.binary_path.display(),
        transport = ?config.server.transport,
        auto_restart = config.restart.auto_restart,
        "Starting agent-notch"
    );

    let handle = McpCoordinator::spawn(config);
    let mut updates = handle.subscribe();
    let mut last = handle.snapshot();

    if let Err(e) = handle.start().await {
        display::print_error(&e.to_string());
        let _ = handle.shutdown().await;
        return ExitCode::FAILURE;
    }
    if let Some(url) = config.server.http_url() {
        tracing::info!(url = %url, "MCP server listening over HTTP");
    }

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            line = stdin.next_line(), if stdin_open => match line {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => forward_line(&handle, line).await,
                Ok(None) => stdin_open = false,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to read stdin");
                    stdin_open = false;
                }
            },
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = updates.borrow_and_update().clone();
                report_changes(&last, &snapshot);
                last = snapshot;
            }
        }
    }

    display::print_token_totals(&last.token_totals);
    if let Err(e) = handle.shutdown().await {
        tracing::debug!(error = %e, "Coordinator already gone");
    }
    ExitCode::SUCCESS
}

async fn forward_line(handle: &CoordinatorHandle, line: String) {
    if let Err(e) = handle.send_line(line).await {
        display::print_error(&e.to_string());
    }
}

fn report_changes(previous: &CoordinatorSnapshot, current: &CoordinatorSnapshot) {
    if previous.state != current.state {
        display::print_state(&current.state, current.pid);
    }
    if current.restart_attempts > previous.restart_attempts {
        display::print_restart(current.restart_attempts);
    }

    // Oldest first so the terminal reads chronologically.
    for call in current.recent_tool_calls.iter().rev() {
        let before = previous.recent_tool_calls.iter().find(|c| c.id == call.id);
        if !before.is_some_and(|b| b.end_time == call.end_time) {
            display::print_tool_call(call);
        }
    }

    if let Some(build) = &current.last_build_result {
        let seen = previous
            .last_build_result
            .as_ref()
            .is_some_and(|b| b.id == build.id);
        if !seen {
            display::print_build_result(build);
        }
    }
}
