#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Command-line adapter that runs a headless siege session against a simulated population.

mod population;
mod scene;

use std::{path::PathBuf, time::Duration};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use siege_core::{Event, GameState};
use siege_system_orchestrator::{Session, WavePhase};
use siege_world::{FileActivationStore, Registry, Terrain};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use crate::population::Population;

#[derive(Debug, Parser)]
#[command(name = "siege", about = "Wave and spawn scheduling driven from the terminal")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Plays a scene headlessly and prints a summary of every cleared wave.
    Simulate(SimulateArgs),
}

#[derive(Debug, Args)]
struct SimulateArgs {
    /// Scheduler configuration in TOML.
    #[arg(long, value_name = "PATH")]
    config: PathBuf,
    /// Authored scene objects in TOML.
    #[arg(long, value_name = "PATH")]
    markers: PathBuf,
    /// Scene name used as the persistence key.
    #[arg(long, default_value = "arena")]
    scene: String,
    /// JSON file holding persisted activations.
    #[arg(long, value_name = "PATH", default_value = "siege_activations.json")]
    store: PathBuf,
    /// Simulated play time in seconds.
    #[arg(long, default_value_t = 600.0)]
    seconds: f64,
    /// Length of one host frame in milliseconds.
    #[arg(long, default_value_t = 100)]
    tick_ms: u64,
    /// Overrides the session seed from the configuration.
    #[arg(long)]
    seed: Option<u64>,
    /// Erases persisted activations before the session starts.
    #[arg(long)]
    reset: bool,
    /// Shortest lifetime of a simulated enemy in seconds.
    #[arg(long, default_value_t = 1.0)]
    min_lifetime: f64,
    /// Longest lifetime of a simulated enemy in seconds.
    #[arg(long, default_value_t = 6.0)]
    max_lifetime: f64,
}

#[derive(Debug, Default)]
struct Summary {
    cleared: u32,
    forced: u32,
    activations: u32,
    victory: bool,
}

impl Summary {
    fn record(&mut self, events: &[Event]) {
        for event in events {
            match event {
                Event::MarkerActivated { .. } => self.activations += 1,
                Event::WaveStarted { level, expected } => {
                    info!(level = level.get(), expected, "wave_started");
                }
                Event::WaveCompleted { level, forced } => {
                    self.cleared += 1;
                    if *forced {
                        self.forced += 1;
                    }
                    info!(level = level.get(), forced, "wave_completed");
                }
                Event::VictoryReached { level } => {
                    self.victory = true;
                    info!(level = level.get(), "victory");
                }
                _ => {}
            }
        }
    }
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Command::Simulate(args) => simulate(args),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

fn simulate(args: SimulateArgs) -> Result<()> {
    if args.tick_ms == 0 {
        bail!("--tick-ms must be positive");
    }
    if !args.seconds.is_finite() || args.seconds < 0.0 {
        bail!("--seconds must be a non-negative number");
    }
    if !args.min_lifetime.is_finite()
        || !args.max_lifetime.is_finite()
        || args.min_lifetime < 0.0
        || args.max_lifetime < args.min_lifetime
    {
        bail!("--min-lifetime and --max-lifetime must be finite with 0 <= min <= max");
    }

    let mut config = scene::load_config(&args.config)?;
    if let Some(seed) = args.seed {
        config.spawning.seed = seed;
    }
    let authored = scene::load_scene(&args.markers)?;

    let registry = Registry::discover(
        args.scene.as_str(),
        &authored.objects,
        &config,
        Box::new(FileActivationStore::new(&args.store)),
        Terrain::flat(authored.ground_height),
    );
    let mut session = Session::new(&config, registry);
    let mut events = Vec::new();

    if args.reset {
        session.reset_activations(&mut events);
    }
    let restored = session
        .restore(&mut events)
        .with_context(|| format!("failed to restore activations from {}", args.store.display()))?;
    info!(scene = %args.scene, restored, "session_ready");

    let mut summary = Summary::default();
    let mut population = Population::new(config.spawning.seed, args.min_lifetime, args.max_lifetime);
    let dt = Duration::from_millis(args.tick_ms);
    let frames = (args.seconds * 1000.0 / args.tick_ms as f64).ceil() as u64;

    session.set_game_state(GameState::Game, &mut events);
    for frame in 0..frames {
        summary.record(&events);
        population.absorb(&events);
        events.clear();

        population.advance(dt);
        session.tick(dt, &population, &mut events);

        if session.orchestrator().phase() == WavePhase::Victory {
            debug!(frame, "victory_frame");
            break;
        }
    }
    summary.record(&events);
    population.absorb(&events);
    events.clear();

    let level = session.orchestrator().level();
    session.set_game_state(GameState::Menu, &mut events);

    println!("scene            {}", args.scene);
    println!("restored         {restored}");
    println!("activations      {}", summary.activations);
    println!("active spawners  {}", session.spawners().len());
    println!("waves cleared    {} ({} forced)", summary.cleared, summary.forced);
    println!("level reached    {}", level.get());
    println!("enemies spawned  {}", population.spawned());
    println!("enemies killed   {}", population.killed());
    println!("enemies alive    {}", population.alive_count());
    println!("victory          {}", if summary.victory { "yes" } else { "no" });
    Ok(())
}
