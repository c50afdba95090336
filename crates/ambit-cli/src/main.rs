mod commands;
mod config;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use config::ConfigSource;

#[derive(Parser)]
#[command(name = "ambit")]
#[command(about = "Ordered task results and ambient context demos")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to the nearest ambit.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Worker threads for the runtime (overrides config)
    #[arg(long, global = true)]
    workers: Option<usize>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run delayed computations and print results as handles resolve
    Order {
        /// Delays in milliseconds, one computation each (overrides config)
        #[arg(short, long, value_delimiter = ',')]
        delays: Vec<u64>,

        /// Deliver in finish order instead of submission order
        #[arg(long)]
        completion: bool,
    },

    /// Build a tree of forked tasks and check each branch sees only its own path
    Fork {
        /// Children per node
        #[arg(short, long)]
        width: Option<usize>,

        /// Levels below the root
        #[arg(short, long)]
        depth: Option<usize>,
    },

    /// Start a tracking context and show it in nested tasks
    Track {
        /// Extra header as KEY=VALUE (repeatable)
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,

        /// Number of concurrent tasks that report the context
        #[arg(short, long, default_value = "3")]
        tasks: usize,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let cli = Cli::parse();

    let (mut settings, source) = config::load(cli.config.as_deref())?;
    match &source {
        ConfigSource::File(path) => log::info!("Using config {}", path.display()),
        ConfigSource::Default => log::debug!("No {} found, using defaults", config::CONFIG_FILE_NAME),
    }
    if let Some(workers) = cli.workers {
        anyhow::ensure!(workers > 0, "--workers must be at least 1");
        settings.worker_threads = workers;
    }

    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(settings.worker_threads)
        .enable_all()
        .build()?;

    match cli.command {
        Commands::Order { delays, completion } => {
            if !delays.is_empty() {
                settings.delays_ms = delays;
            }
            rt.block_on(commands::order::run(&settings.delays_ms, completion))?;
        }

        Commands::Fork { width, depth } => {
            let width = width.unwrap_or(settings.fork_width);
            let depth = depth.unwrap_or(settings.fork_depth);
            rt.block_on(commands::fork::run(width, depth))?;
        }

        Commands::Track { headers, tasks } => {
            rt.block_on(commands::track::run(&headers, tasks))?;
        }
    }

    Ok(())
}
