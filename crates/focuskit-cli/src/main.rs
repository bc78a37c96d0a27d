use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod surface;

#[derive(Parser)]
#[command(name = "focuskit", version, about = "Focus session timer")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Timer control
    Timer {
        #[command(subcommand)]
        action: commands::timer::TimerAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
    /// Session history
    History {
        /// Only sessions started today (UTC)
        #[arg(long)]
        today: bool,
    },
    /// Daily focus totals
    Stats {
        #[command(subcommand)]
        action: commands::stats::StatsAction,
    },
}

fn init_logging() {
    let filter =
        EnvFilter::try_from_env("FOCUSKIT_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() {
    init_logging();
    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Timer { action } => commands::timer::run(action),
        Commands::Config { action } => commands::config::run(action),
        Commands::History { today } => commands::history::run(today),
        Commands::Stats { action } => commands::stats::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
