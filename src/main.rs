use std::fs::OpenOptions;
use std::net::TcpStream;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use backoff::ExponentialBackoff;
use clap::{Parser, Subcommand};
use env_logger::{Env, Target, WriteStyle};

use mpd_scrobbler::clock::SystemClock;
use mpd_scrobbler::config::{Config, LoggingConfig, MpdConfig};
use mpd_scrobbler::daemon::{self, Daemon};
use mpd_scrobbler::delivery::DeliveryLog;
use mpd_scrobbler::error::PlayerError;
use mpd_scrobbler::player::MpdClient;
use mpd_scrobbler::queue::ScrobbleQueue;
use mpd_scrobbler::scrobbler::{Service, Transport};
use mpd_scrobbler::state::{Decisions, MachineOptions, ScrobblingMachine};
use mpd_scrobbler::transform::{SongTransformer, TagGuesser};

type ServiceLog = DeliveryLog<Service, SystemClock>;

#[derive(Parser, Debug)]
#[command(name = "mpd-scrobbler")]
#[command(about = "Scrobbles what MPD plays to Last.fm and ListenBrainz", long_about = None)]
struct Cli {
    /// Config file (defaults to the user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Follow MPD and scrobble (default)
    Run,
    /// Retry queued scrobbles once and exit
    Flush,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    init_logging(&config.logging, cli.verbose)?;

    let logs = delivery_logs(&config)?;
    if logs.is_empty() {
        log::warn!("Nothing will be scrobbled until a service is enabled");
    }

    match cli.command.unwrap_or(Command::Run) {
        Command::Flush => {
            daemon::flush_all(&logs);
            Ok(())
        }
        Command::Run => run(&config, logs),
    }
}

fn init_logging(config: &LoggingConfig, verbose: bool) -> Result<()> {
    let level = if verbose { "debug" } else { config.level.as_str() };
    let mut builder = env_logger::Builder::from_env(Env::default().default_filter_or(level));

    match &config.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {:?}", path))?;
            builder
                .target(Target::Pipe(Box::new(file)))
                .write_style(WriteStyle::Never);
        }
        None => {
            let style = if atty::is(atty::Stream::Stderr) {
                WriteStyle::Auto
            } else {
                WriteStyle::Never
            };
            builder.write_style(style);
        }
    }

    builder.init();
    Ok(())
}

fn delivery_logs(config: &Config) -> Result<Vec<ServiceLog>> {
    let queue_dir = config.queue_dir()?;
    std::fs::create_dir_all(&queue_dir)
        .with_context(|| format!("Failed to create queue directory {:?}", queue_dir))?;

    Ok(Service::from_config(config)
        .into_iter()
        .map(|service| {
            let file = format!("queue-{}.jsonl", service.id());
            let queue = ScrobbleQueue::new(queue_dir.join(file));
            log::info!("{}: queue at {:?}", service.id(), queue.path());
            DeliveryLog::new(service, queue, SystemClock)
        })
        .collect())
}

fn run(config: &Config, logs: Vec<ServiceLog>) -> Result<()> {
    let options = MachineOptions {
        compare_song_identity: config.machine.compare_song_identity,
    };
    let transformer = TagGuesser::new(&config.tag_guess);

    let mut client = connect(&config.mpd)?;

    // the state at startup seeds the machine, mid-song attachment included
    let (machine, decisions) = match client.observe() {
        Ok(initial) => {
            let song = initial.song.map(|s| transformer.transform(s));
            match ScrobblingMachine::with_initial(SystemClock, options, &initial.status, song) {
                Ok(seeded) => seeded,
                Err(e) => {
                    log::error!("Ignoring initial player state: {}", e);
                    (ScrobblingMachine::new(SystemClock, options), Decisions::default())
                }
            }
        }
        Err(PlayerError::Parse(e)) => {
            log::error!("Ignoring initial player state: {}", e);
            (ScrobblingMachine::new(SystemClock, options), Decisions::default())
        }
        Err(e) => return Err(e).context("Failed to read player state"),
    };

    let mut daemon = Daemon::new(machine, transformer, logs);
    daemon.dispatch(&decisions);
    daemon.flush_all();

    loop {
        if let Err(e) = follow(&mut client, &mut daemon) {
            log::warn!("Lost connection to MPD: {}", e);
            client = connect(&config.mpd)?;
            if let Err(e) = observe(&mut client, &mut daemon) {
                log::warn!("Failed to read player state after reconnect: {}", e);
            }
        }
    }
}

/// Handle player changes until the connection fails
fn follow(
    client: &mut MpdClient<TcpStream>,
    daemon: &mut Daemon<Service, SystemClock, TagGuesser>,
) -> Result<(), PlayerError> {
    loop {
        client.wait_for_player()?;
        observe(client, daemon)?;
    }
}

/// Read one observation and feed it to the daemon. Bad observations are
/// logged and skipped, connection errors are returned.
fn observe(
    client: &mut MpdClient<TcpStream>,
    daemon: &mut Daemon<Service, SystemClock, TagGuesser>,
) -> Result<(), PlayerError> {
    match client.observe() {
        Ok(observation) => {
            if let Err(e) = daemon.observe(observation) {
                log::error!("Ignoring player event: {}", e);
            }
            Ok(())
        }
        Err(PlayerError::Parse(e)) => {
            log::error!("Ignoring player event: {}", e);
            Ok(())
        }
        Err(e) => Err(e),
    }
}

/// Connect to MPD, retrying with exponential backoff
fn connect(config: &MpdConfig) -> Result<MpdClient<TcpStream>> {
    let policy = ExponentialBackoff {
        max_interval: Duration::from_secs(60),
        max_elapsed_time: None,
        ..ExponentialBackoff::default()
    };

    let op = || {
        MpdClient::connect(&config.host, config.port, config.password.as_deref()).map_err(|e| {
            log::warn!("Cannot connect to MPD at {}:{}: {}", config.host, config.port, e);
            match e {
                PlayerError::Ack(_) | PlayerError::Handshake(_) => backoff::Error::permanent(e),
                _ => backoff::Error::transient(e),
            }
        })
    };

    backoff::retry(policy, op).map_err(|e| {
        let e = match e {
            backoff::Error::Permanent(e) => e,
            backoff::Error::Transient { err, .. } => err,
        };
        anyhow::Error::new(e).context(format!(
            "Failed to connect to MPD at {}:{}",
            config.host, config.port
        ))
    })
}
