use std::path::PathBuf;

use clap::{Parser, Subcommand};
use pomoloop_core::{logging, Paths};

mod commands;
mod output;

use commands::Context;
use output::Output;

#[derive(Parser)]
#[command(name = "pomoloop", version, about = "Pomodoro timer with a background worker")]
struct Cli {
    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Data directory (default: $POMOLOOP_DATA_DIR or ~/.config/pomoloop)
    #[arg(long, global = true, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a new work interval
    Start {
        /// Duration: 25 (minutes), 25m, 90s or 10m30s. Defaults to the
        /// configured default_duration.
        duration: Option<String>,
    },
    /// Pause the running interval
    Pause,
    /// Resume a paused or interrupted interval
    Resume,
    /// Cancel the active interval
    Cancel,
    /// Resolve a finished interval by hand
    Finish {
        /// completed | abandoned
        resolution: String,
    },
    /// Show the current interval
    Status {
        /// One-line output
        #[arg(long)]
        short: bool,
        /// Refresh every second until no interval is active
        #[arg(long)]
        watch: bool,
    },
    /// Show interval history
    History {
        /// Maximum number of entries
        #[arg(short = 'n', long, default_value_t = 10, value_parser = clap::value_parser!(u32).range(1..))]
        limit: u32,
        /// Completed counts per day instead of individual intervals
        #[arg(long)]
        daily: bool,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
    /// Run the timer loop for one interval (spawned by start/resume)
    #[command(hide = true)]
    Worker {
        interval_id: i64,
    },
}

fn main() {
    let cli = Cli::parse();
    let out = Output::new(cli.json);

    let paths = match Paths::resolve(cli.data_dir.as_deref()) {
        Ok(paths) => paths,
        Err(e) => {
            out.fail(&e);
            std::process::exit(1);
        }
    };
    logging::init(&paths.log_path);
    let ctx = Context::new(paths, out);

    let result = match cli.command {
        Commands::Start { duration } => commands::timer::start(&ctx, duration),
        Commands::Pause => commands::timer::pause(&ctx),
        Commands::Resume => commands::timer::resume(&ctx),
        Commands::Cancel => commands::timer::cancel(&ctx),
        Commands::Finish { resolution } => commands::timer::finish(&ctx, &resolution),
        Commands::Status { short, watch } => commands::timer::status(&ctx, short, watch),
        Commands::History { limit, daily } => commands::history::run(&ctx, limit, daily),
        Commands::Config { action } => commands::config::run(&ctx, action),
        Commands::Worker { interval_id } => commands::worker::run(&ctx, interval_id),
    };

    if let Err(e) = result {
        out.fail(&*e);
        std::process::exit(1);
    }
}
