use adhan_flow::audio_runtime::spawn_audio_runtime;
use adhan_flow::clock::{Clock, SystemClock};
use adhan_flow::config::Config;
use adhan_flow::coordinator::AdhanCoordinator;
use adhan_flow::player::AudioPlayer;
use adhan_flow::playlist::{Playlist, scan_folder};
use adhan_flow::schedule::EventSchedule;
use adhan_flow::source::{FixedTimes, JsonFileSource, TimesSource};
use adhan_flow::ticker::{NOTHING_SCHEDULED, Ticker};
use adhan_flow::worker::{MusicControl, MusicWorker};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "adhan-flow",
    version,
    about = "Plays the Adhan at prayer times over a background music playlist"
)]
struct Cli {
    /// Config file (default: <config dir>/adhan-flow/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Log filter, e.g. "debug" or "adhan_flow=trace" (overrides RUST_LOG)
    #[arg(long, global = true)]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scheduler (default)
    Run(RunArgs),
    /// Print today's remaining schedule and exit
    Schedule(RunArgs),
    /// Configuration file management
    Config {
        #[command(subcommand)]
        action: ConfigCmd,
    },
}

#[derive(Args, Default)]
struct RunArgs {
    /// Adhan audio file (overrides config)
    #[arg(long)]
    cue: Option<PathBuf>,
    /// Background music folder (overrides config)
    #[arg(long)]
    music: Option<PathBuf>,
    /// JSON file with today's prayer times (overrides config)
    #[arg(long)]
    times: Option<PathBuf>,
    /// Fixed time for a slot, e.g. --at fajir=05:00 (repeatable, replaces --times)
    #[arg(long = "at", value_name = "NAME=HH:MM")]
    at: Vec<String>,
    /// Seconds after the Adhan before music resumes (overrides config)
    #[arg(long)]
    resume_delay: Option<u64>,
}

#[derive(Subcommand)]
enum ConfigCmd {
    /// Show the effective configuration
    Show,
    /// Write the default configuration file if none exists
    Init,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref());

    let config_path = cli.config.clone().or_else(Config::default_path);
    let mut config = config_path
        .as_deref()
        .map(Config::load_from)
        .unwrap_or_default();

    match cli.command.unwrap_or(Commands::Run(RunArgs::default())) {
        Commands::Run(args) => {
            apply_overrides(&mut config, &args);
            let source = times_source(&config, &args);
            run(config, source);
        }
        Commands::Schedule(args) => {
            apply_overrides(&mut config, &args);
            let source = times_source(&config, &args);
            print_schedule(&config, source.as_ref());
        }
        Commands::Config { action } => match action {
            ConfigCmd::Show => match serde_json::to_string_pretty(&config) {
                Ok(json) => println!("{}", json),
                Err(e) => exit_with(&format!("Cannot render config: {}", e)),
            },
            ConfigCmd::Init => {
                let Some(path) = config_path else {
                    exit_with("No config directory on this platform; pass --config");
                };
                if path.exists() {
                    println!("Config already exists at {}", path.display());
                    return;
                }
                match Config::default().save_to(&path) {
                    Ok(()) => println!("Wrote default config to {}", path.display()),
                    Err(e) => exit_with(&e.to_string()),
                }
            }
        },
    }
}

fn init_logging(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn apply_overrides(config: &mut Config, args: &RunArgs) {
    if let Some(cue) = &args.cue {
        config.cue_file = cue.clone();
    }
    if let Some(music) = &args.music {
        config.music_folder = music.clone();
    }
    if let Some(times) = &args.times {
        config.times_file = Some(times.clone());
    }
    if let Some(secs) = args.resume_delay {
        config.resume_delay_secs = secs;
    }
    if let Err(e) = config.validate() {
        exit_with(&e.to_string());
    }
}

fn times_source(config: &Config, args: &RunArgs) -> Box<dyn TimesSource> {
    if !args.at.is_empty() {
        return match FixedTimes::from_pairs(args.at.as_slice()) {
            Ok(fixed) => Box::new(fixed),
            Err(e) => exit_with(&e.to_string()),
        };
    }
    match &config.times_file {
        Some(path) => Box::new(JsonFileSource::new(path, config.slots.clone())),
        None => exit_with("No prayer times source: pass --times <file> or --at NAME=HH:MM"),
    }
}

fn print_schedule(config: &Config, source: &dyn TimesSource) {
    let now = SystemClock.now();
    let schedule = match source.times_for(now.date()) {
        Ok(raw) => EventSchedule::build(&raw, now, &config.twelve_hour_slots),
        Err(e) => {
            warn!("{}", e);
            EventSchedule::empty(now.date())
        }
    };
    if schedule.is_empty() {
        println!("{}", NOTHING_SCHEDULED);
        return;
    }
    println!("Schedule for {}:", schedule.date());
    for event in schedule.events() {
        println!("  {:<10} {}", event.name, event.time_display());
    }
}

fn run(config: Config, source: Box<dyn TimesSource>) {
    let audio = match spawn_audio_runtime() {
        Ok(handle) => handle,
        Err(e) => exit_with(&e.to_string()),
    };
    let player: Arc<dyn AudioPlayer> = Arc::new(audio.clone());

    if !config.cue_file.exists() {
        warn!(
            "Adhan file '{}' not found; prayer times will only pause the music",
            config.cue_file.display()
        );
    }

    let playlist = Playlist::new(scan_folder(&config.music_folder, &config.audio_extensions));
    let worker = match MusicWorker::spawn(
        Arc::clone(&player),
        playlist,
        config.poll_interval(),
        config.stop_timeout(),
        |event| debug!(?event, "music worker"),
    ) {
        Ok(worker) => Arc::new(worker),
        Err(e) => exit_with(&e.to_string()),
    };

    let mut coordinator = AdhanCoordinator::new(
        Arc::clone(&worker) as Arc<dyn MusicControl>,
        Arc::clone(&player),
        config.cue_file.clone(),
        config.resume_delay(),
        config.poll_interval(),
    );
    coordinator.start_music();

    let mut ticker = Ticker::new(
        Arc::new(SystemClock),
        source,
        config.twelve_hour_slots.clone(),
        coordinator,
        config.poll_interval(),
    );

    let shutdown = Arc::new(AtomicBool::new(false));
    watch_for_ctrl_c(Arc::clone(&shutdown));
    ticker.run(&shutdown);

    if let Err(e) = worker.stop() {
        error!("{}", e);
    }
    audio.shutdown();
    info!("Stopped");
}

/// Set `shutdown` on the first Ctrl-C; a second one exits immediately.
fn watch_for_ctrl_c(shutdown: Arc<AtomicBool>) {
    let spawned = std::thread::Builder::new()
        .name("signal".into())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    warn!("Cannot watch for Ctrl-C: {}", e);
                    return;
                }
            };
            runtime.block_on(async {
                if tokio::signal::ctrl_c().await.is_err() {
                    return;
                }
                warn!("Shutdown signal received.");
                shutdown.store(true, Ordering::Relaxed);
                if tokio::signal::ctrl_c().await.is_ok() {
                    std::process::exit(130);
                }
            });
        });
    if let Err(e) = spawned {
        warn!("Cannot watch for Ctrl-C: {}", e);
    }
}

fn exit_with(message: &str) -> ! {
    error!("{}", message);
    eprintln!("Error: {}", message);
    std::process::exit(1);
}
