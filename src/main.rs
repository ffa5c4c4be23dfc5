mod clock;
mod config;
mod deadline;
mod power;
mod schedule;
mod session;
mod ui;

use std::io::{self, BufRead};
use std::path::PathBuf;
use std::thread;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use crate::clock::SystemClock;
use crate::config::{Settings, load_settings};
use crate::deadline::DeadlineRequest;
use crate::power::LoggingInhibitor;
use crate::session::{Session, SessionOutcome};
use crate::ui::display::DisplayHandle;
use crate::ui::render::ConsoleView;

#[derive(Parser, Debug)]
#[command(
    name = "wakeguard",
    version,
    about = "Keep the system awake until a deadline, with a live countdown"
)]
struct Cli {
    /// Relative deadline, e.g. 90 (minutes), 45m, 1h30m, 2d4h5s
    #[arg(long = "for", value_name = "DURATION", conflicts_with = "until")]
    for_duration: Option<String>,

    /// Absolute local deadline, e.g. "2025-01-02 03:02:01"
    #[arg(long, value_name = "TIMESTAMP")]
    until: Option<String>,

    /// JSON settings file (bounds and cadence table)
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    min_deadline_secs: Option<i64>,

    #[arg(long)]
    max_deadline_secs: Option<i64>,

    /// Keep the countdown running but do not print updates
    #[arg(long)]
    quiet: bool,

    #[arg(long)]
    verbose: bool,
}

impl Cli {
    fn request(&self) -> DeadlineRequest {
        match (&self.for_duration, &self.until) {
            (Some(raw), _) => DeadlineRequest::ForDuration(raw.clone()),
            (None, Some(raw)) => DeadlineRequest::UntilTimestamp(raw.clone()),
            (None, None) => DeadlineRequest::Indefinite,
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    if let Err(err) = run(cli) {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let settings = match &cli.config {
        Some(path) => load_settings(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => Settings::default(),
    }
    .with_overrides(cli.min_deadline_secs, cli.max_deadline_secs)?;

    let clock = SystemClock::new();
    let view = ConsoleView::new(io::stdout(), !cli.quiet);
    let mut session = Session::new(&clock, settings, view);
    spawn_console_quit_listener(session.handle())?;

    let mut inhibitor = LoggingInhibitor::new();
    let outcome = session.run(&cli.request(), &mut inhibitor)?;
    debug!(?outcome, "session finished");
    if outcome == SessionOutcome::AlreadyExpired {
        warn!("deadline passed during startup; nothing was armed");
    }
    Ok(())
}

/// Typing `q` (or `quit`) on stdin ends the session early. EOF is ignored.
fn spawn_console_quit_listener(handle: DisplayHandle) -> Result<()> {
    thread::Builder::new()
        .name("wakeguard-stdin".to_string())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else {
                    return;
                };
                let command = line.trim();
                if command.eq_ignore_ascii_case("q") || command.eq_ignore_ascii_case("quit") {
                    let _ = handle.request_quit("console");
                    return;
                }
            }
        })
        .context("failed to spawn console input thread")?;
    Ok(())
}
