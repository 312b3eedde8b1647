//! Portdeck CLI - Inspect and manage processes on listening ports
//!
//! Without a subcommand, launches the interactive dashboard on a terminal
//! and falls back to the list output when piped.

mod commands;
mod dashboard;
mod logbuf;

use clap::{Parser, Subcommand};
use portdeck_core::{FilterConfig, PortDetector, SortKey, SystemPortSource};

use commands::list::ListOptions;
use logbuf::LogBuffer;

#[derive(Parser)]
#[command(name = "portdeck")]
#[command(author, version, about = "Inspect and manage processes on listening ports")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Disable the interactive dashboard
    #[arg(long, global = true)]
    no_tui: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List all listening ports
    #[command(alias = "ls")]
    List {
        /// Filter by port number
        #[arg(short, long)]
        port: Option<u16>,

        /// Filter by process name substring
        #[arg(short = 'n', long)]
        name: Option<String>,

        /// Filter by category glob (e.g. dev-*)
        #[arg(short, long)]
        category: Option<String>,

        /// Filter by owning user glob
        #[arg(short, long)]
        user: Option<String>,

        /// Filter by process name glob
        #[arg(long)]
        process: Option<String>,

        /// Sort by field: port, process, pid, user
        #[arg(short, long, default_value = "port")]
        sort: String,
    },

    /// Kill every process on a port
    Kill {
        /// Port number to kill
        port: u16,

        /// Force kill without graceful shutdown
        #[arg(short, long)]
        force: bool,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::List {
            port,
            name,
            category,
            user,
            process,
            sort,
        }) => {
            init_stderr_logging();
            commands::list::run(
                ListOptions {
                    port,
                    name,
                    category,
                    user,
                    process,
                    sort,
                },
                cli.json,
            )
            .await?;
        }
        Some(Commands::Kill { port, force }) => {
            init_stderr_logging();
            commands::kill::run(port, force, cli.json).await?;
        }
        None => {
            // Default: launch the dashboard, or list when piped.
            if cli.no_tui || !atty::is(atty::Stream::Stdout) {
                init_stderr_logging();
                commands::list::run(
                    ListOptions {
                        port: None,
                        name: None,
                        category: None,
                        user: None,
                        process: None,
                        sort: "port".to_string(),
                    },
                    cli.json,
                )
                .await?;
            } else {
                // Logs go to an in-memory ring surfaced by the dashboard's
                // log modal; writing to the terminal would corrupt the UI.
                let logs = LogBuffer::new();
                tracing_subscriber::fmt()
                    .with_writer(logs.clone())
                    .with_ansi(false)
                    .without_time()
                    .with_target(false)
                    .init();

                let detector = PortDetector::new(SystemPortSource::new());
                let filter = FilterConfig {
                    sort: SortKey::Port,
                    ..FilterConfig::default()
                };
                dashboard::run(&detector, filter, logs).await?;
            }
        }
    }

    Ok(())
}

fn init_stderr_logging() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();
}
