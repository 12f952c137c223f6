use anyhow::Context;
use clap::{Parser, Subcommand};
use fm_playout::config::StationConfig;
use fm_playout::library::{list_media, resolve_path};
use fm_playout::media_info::provider_for;
use fm_playout::request::StartRequest;
use fm_playout::scheduler::{PlaybackScheduler, StopOutcome};
use serde_json::Value;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "fmplayout", about = "Looping FM playout for PiFmRds")]
struct Cli {
    /// Config file (defaults to the platform config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List playable files in the media directory
    Files,
    /// Show duration and tags for a file
    Probe {
        /// File name (relative to the media directory) or path
        file: String,
    },
    /// Transmit a queue of files on a loop until stopped
    Play {
        /// Frequency in MHz
        #[arg(short, long)]
        freq: Option<String>,
        /// Programme Service name (8 chars)
        #[arg(long)]
        ps: Option<String>,
        /// RadioText (64 chars; {artist}, {title}, {album} are filled in)
        #[arg(long)]
        rt: Option<String>,
        /// Seconds between consecutive tracks; one per adjacent pair
        #[arg(short, long = "gap")]
        gaps: Vec<String>,
        /// Files to play, in order
        #[arg(required = true)]
        files: Vec<String>,
    },
    /// Station configuration
    Config {
        #[command(subcommand)]
        action: ConfigCmd,
    },
}

#[derive(Subcommand)]
enum ConfigCmd {
    /// Print the current configuration
    Show,
    /// Set a configuration value
    Set { key: String, value: String },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(StationConfig::default_path);
    let mut config = StationConfig::load_or_default(&config_path);

    match cli.command {
        Commands::Files => {
            let files = list_media(&config.media_dir, &config.media_extensions)
                .with_context(|| {
                    format!("Unable to scan files in '{}'", config.media_dir.display())
                })?;
            for name in files {
                println!("{name}");
            }
        }
        Commands::Probe { file } => {
            let provider = provider_for(config.probe, &config.ffprobe_path);
            let path = resolve_path(Some(&config.media_dir), &file);
            let info = provider.resolve(&path)?;
            println!("{}", serde_json::to_string_pretty(&info)?);
            println!("Duration: {}", info.duration_display());
        }
        Commands::Play {
            freq,
            ps,
            rt,
            gaps,
            files,
        } => {
            let request = StartRequest {
                frequency: freq.map(Value::String),
                ps,
                rt,
                tracks: files,
                gaps: gaps.into_iter().map(Value::String).collect(),
            };
            let scheduler = config
                .build_scheduler()
                .context("Failed to start the playout driver")?;
            scheduler.start(request.clone())?;
            println!("FM transmission started");
            run_console(&scheduler, request)?;
        }
        Commands::Config { action } => match action {
            ConfigCmd::Show => {
                println!("# {}", config_path.display());
                println!("{}", serde_json::to_string_pretty(&config)?);
            }
            ConfigCmd::Set { key, value } => {
                config.set(&key, &value)?;
                config.save(&config_path)?;
                println!("{key} = {value}");
            }
        },
    }

    Ok(())
}

/// Read commands from stdin while the scheduler runs. EOF counts as `quit`.
fn run_console(scheduler: &PlaybackScheduler, request: StartRequest) -> anyhow::Result<()> {
    println!("Commands: status | json | stop | restart | quit");
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = line.context("Failed to read stdin")?;
        match line.trim() {
            "" => {}
            "status" | "s" => println!("{}", scheduler.snapshot().summary()),
            "json" | "j" => println!("{}", scheduler.snapshot().to_json()),
            "stop" => match scheduler.stop() {
                StopOutcome::Stopped => println!("FM transmission stopped"),
                StopOutcome::AlreadyIdle => println!("No active FM transmission"),
            },
            "restart" | "start" => {
                scheduler.start(request.clone())?;
                println!("FM transmission started");
            }
            "quit" | "q" | "exit" => break,
            other => println!("Unknown command '{other}'"),
        }
        stdout.flush()?;
    }

    if scheduler.stop() == StopOutcome::Stopped {
        println!("FM transmission stopped");
    }
    Ok(())
}
