//! Main entry point for the power ranking tool
//!
//! Reads a period of game results, solves the configured rating engine,
//! anchors disconnected regions and prints plain-text reports. The
//! period's powers can be published to a snapshot history that seeds the
//! next run.

use anyhow::{anyhow, Result};
use clap::{ArgAction, Parser, ValueEnum};
use power_rank::config::AppConfig;
use power_rank::ingest;
use power_rank::rating::anchor::{
    anchor_teams, AnchorPreview, AnchorResolver, AnchorVerdict, RegionStanding,
};
use power_rank::rating::carry_forward::{CarryForwardMode, RankingHistory};
use power_rank::report;
use power_rank::session::{EngineKind, RankingPeriod};
use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Power Rank - Relative skill ratings from head-to-head results
#[derive(Parser)]
#[command(
    name = "power-rank",
    version,
    about = "Batch power rankings for head-to-head team sports",
    long_about = "Power Rank reads a season of game results, fits a relative power to every \
                 team by regression on the dominance score of each game, anchors regions \
                 that never met on the pitch and prints plain-text ranking reports. \
                 Published powers carry forward between periods through a snapshot history."
)]
struct Args {
    /// Configuration file path
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "Path to configuration file (TOML format)"
    )]
    config: Option<PathBuf>,

    /// Games file override
    #[arg(short, long, value_name = "FILE", help = "Override the game results file")]
    games: Option<PathBuf>,

    /// Period start override
    #[arg(long, value_name = "YYYYMMDD", help = "Override the period start date")]
    start: Option<String>,

    /// Period end override
    #[arg(long, value_name = "YYYYMMDD", help = "Override the period end date")]
    end: Option<String>,

    /// Rating engine override
    #[arg(long, value_enum, help = "Override the rating engine")]
    engine: Option<EngineArg>,

    /// Carry-forward override
    #[arg(
        long,
        value_enum,
        help = "Override how the previous period's powers seed this one"
    )]
    carry_forward: Option<CarryForwardArg>,

    /// Rank every team regardless of activity
    #[arg(
        long,
        help = "Include teams below the activity requirements in the rankings"
    )]
    all: bool,

    /// Print the period's games week by week
    #[arg(long, help = "Print the games of the period grouped by week")]
    weekly: bool,

    /// Compare against the previous published snapshot
    #[arg(
        long,
        help = "Print rank and power changes against the latest published snapshot"
    )]
    compare: bool,

    /// Per-team game log
    #[arg(
        long,
        value_name = "TEAM",
        help = "Print a game log for the named team (repeatable)"
    )]
    team_log: Vec<String>,

    /// Forecast a hypothetical matchup
    #[arg(
        long,
        value_names = ["HOME", "AWAY"],
        num_args = 2,
        action = ArgAction::Append,
        help = "Predict the outcome of a matchup (repeatable)"
    )]
    forecast: Vec<String>,

    /// Publish this period's snapshot to the history file
    #[arg(long, help = "Append this period's snapshot to the history file")]
    write_history: bool,

    /// Never prompt for anchors
    #[arg(
        long,
        help = "Fail instead of prompting when a region has no configured anchor pin"
    )]
    non_interactive: bool,

    /// Log level override
    #[arg(
        short,
        long,
        value_name = "LEVEL",
        help = "Override log level (trace, debug, info, warn, error)"
    )]
    log_level: Option<String>,

    /// Enable debug mode
    #[arg(short, long, help = "Enable debug mode with verbose logging")]
    debug: bool,

    /// Dry run mode (validate config and exit)
    #[arg(long, help = "Validate configuration and exit without solving")]
    dry_run: bool,
}

/// CLI face of the engine selection
#[derive(Debug, Clone, Copy, ValueEnum)]
enum EngineArg {
    Regression,
    Iterative,
}

impl From<EngineArg> for EngineKind {
    fn from(value: EngineArg) -> Self {
        match value {
            EngineArg::Regression => EngineKind::Regression,
            EngineArg::Iterative => EngineKind::Iterative,
        }
    }
}

/// CLI face of the carry-forward selection
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CarryForwardArg {
    Disabled,
    Reseed,
    Incremental,
}

impl From<CarryForwardArg> for CarryForwardMode {
    fn from(value: CarryForwardArg) -> Self {
        match value {
            CarryForwardArg::Disabled => CarryForwardMode::Disabled,
            CarryForwardArg::Reseed => CarryForwardMode::Reseed,
            CarryForwardArg::Incremental => CarryForwardMode::Incremental,
        }
    }
}

/// Initialize structured logging with the configured level
///
/// Logs go to stderr so that stdout stays clean for the reports.
fn init_logging(log_level: &str) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with_target(false)
        .with_writer(io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}

/// Display startup banner with run information
fn display_startup_banner(config: &AppConfig) {
    info!("Power Rank");
    info!("   Service: {}", config.service.name);
    info!("   Log level: {}", config.service.log_level);
    info!("   Period: {} to {}", config.period.start, config.period.end);
    info!("   Games file: {}", config.input.games_file.display());
    info!("   Engine: {}", config.engine.engine);
    info!("   Carry-forward: {:?}", config.engine.carry_forward);
}

/// Load and merge configuration from file, environment and CLI arguments
fn load_config(args: &Args) -> Result<AppConfig> {
    let mut config = if let Some(config_path) = &args.config {
        AppConfig::from_file(config_path)?
    } else {
        AppConfig::from_env()?
    };

    // Apply CLI overrides
    if let Some(log_level) = &args.log_level {
        config.service.log_level = log_level.clone();
    }

    if args.debug {
        config.service.log_level = "debug".to_string();
    }

    if let Some(games) = &args.games {
        config.input.games_file = games.clone();
    }

    if let Some(start) = &args.start {
        config.period.start = start.clone();
    }

    if let Some(end) = &args.end {
        config.period.end = end.clone();
    }

    if let Some(engine) = args.engine {
        config.engine.engine = engine.into();
    }

    if let Some(mode) = args.carry_forward {
        config.engine.carry_forward = mode.into();
    }

    // Overrides can introduce invalid combinations
    power_rank::config::validate_config(&config)?;

    Ok(config)
}

/// Prompts the operator on the console for anchor decisions
///
/// Configured pins are used without prompting; everything else falls
/// through to a question on stdin.
struct ConsoleAnchorResolver {
    pins: BTreeMap<String, f64>,
}

impl ConsoleAnchorResolver {
    fn prompt(message: &str) -> Result<String> {
        print!("{}", message);
        io::stdout().flush()?;
        let mut line = String::new();
        let read = io::stdin().read_line(&mut line)?;
        if read == 0 {
            return Err(anyhow!("end of input while waiting for an answer"));
        }
        Ok(line.trim().to_string())
    }
}

impl AnchorResolver for ConsoleAnchorResolver {
    fn anchor_power(&mut self, region: &RegionStanding) -> Result<f64> {
        if let Some((top, _, _)) = region.members.first() {
            if let Some(pin) = self.pins.get(top) {
                info!("pinning the region led by {} at {:.1} from config", top, pin);
                return Ok(*pin);
            }
        }

        println!("{}", report::region_standings_table(std::slice::from_ref(region)));
        loop {
            let raw = Self::prompt("Anchor power for the top team of this region: ")?;
            match raw.parse::<f64>() {
                Ok(value) if value.is_finite() => return Ok(value),
                _ => println!("Could not read '{}' as a power, try again.", raw),
            }
        }
    }

    fn review(&mut self, preview: &AnchorPreview) -> Result<AnchorVerdict> {
        println!("\nAll regions with the proposed anchors\n");
        println!("Rank   Power  Games   Team");
        for (i, (name, power, games)) in preview.standings.iter().enumerate() {
            println!("{:>3}   {:>6.1}    {:>2}    {}", i + 1, power, games, name);
        }
        loop {
            let raw = Self::prompt("\nAccept these rankings? [y/n] ")?;
            match raw.to_lowercase().as_str() {
                "y" | "yes" => return Ok(AnchorVerdict::Accept),
                "n" | "no" => return Ok(AnchorVerdict::Retry),
                _ => println!("Please answer y or n."),
            }
        }
    }
}

/// Resolves anchors from configured pins only, for unattended runs
struct FixedAnchorResolver {
    pins: BTreeMap<String, f64>,
}

impl AnchorResolver for FixedAnchorResolver {
    fn anchor_power(&mut self, region: &RegionStanding) -> Result<f64> {
        let (top, _, _) = region
            .members
            .first()
            .ok_or_else(|| anyhow!("region standing has no members"))?;
        self.pins
            .get(top)
            .copied()
            .ok_or_else(|| anyhow!("no anchor pin configured for the region led by {}", top))
    }

    fn review(&mut self, _preview: &AnchorPreview) -> Result<AnchorVerdict> {
        Ok(AnchorVerdict::Accept)
    }
}

/// Build the period from the configured inputs
fn build_period(config: &AppConfig) -> Result<RankingPeriod> {
    let start = config.period_start()?;
    let end = config.period_end()?;
    let mut period = RankingPeriod::with_config(start, end, config.tuning.clone())?;

    if let Some(notes) = &config.period.notes {
        period.set_notes(notes.clone());
    }

    if let Some(path) = &config.input.roster_file {
        let names = ingest::read_name_list(path)?;
        info!("registered {} roster teams from {}", names.len(), path.display());
        period.register_roster(names);
    }

    let games = ingest::read_games(&config.input.games_file)?;
    period.ingest_games(games)?;

    if let Some(path) = &config.input.hiatus_file {
        for name in ingest::read_name_list(path)? {
            period.mark_hiatus(&name);
        }
    }
    if let Some(path) = &config.input.disbanded_file {
        for name in ingest::read_name_list(path)? {
            period.mark_disbanded(&name);
        }
    }

    for (name, power) in &config.engine.seed_overrides {
        period.set_seed_override(name, *power)?;
    }
    for (name, rule) in &config.engine.activity_overrides {
        period.set_activity_requirements(name, rule.min_games, rule.min_opponents)?;
    }

    Ok(period)
}

/// Load the snapshot history when one is configured
fn load_history(config: &AppConfig) -> Result<Option<RankingHistory>> {
    let Some(path) = &config.input.history_file else {
        return Ok(None);
    };
    if !path.exists() {
        if config.engine.carry_forward == CarryForwardMode::Incremental {
            return Err(anyhow!(
                "history file {} is required for an incremental solve",
                path.display()
            ));
        }
        warn!("history file {} not found; starting without one", path.display());
        return Ok(None);
    }
    Ok(Some(ingest::load_history(path)?))
}

/// Fix the gauge of the solved powers before publication
fn anchor_rankings(
    period: &mut RankingPeriod,
    config: &AppConfig,
    non_interactive: bool,
) -> Result<()> {
    let regions = period.regions();
    let pins = config.engine.anchor_pins.clone();

    let outcome = if non_interactive {
        let mut resolver = FixedAnchorResolver { pins };
        anchor_teams(period.registry_mut(), &regions, &config.tuning.anchor, &mut resolver)?
    } else {
        let mut resolver = ConsoleAnchorResolver { pins };
        anchor_teams(period.registry_mut(), &regions, &config.tuning.anchor, &mut resolver)?
    };

    if !outcome.pins.is_empty() {
        info!(
            "pinned {} subordinate regions in {} review rounds",
            outcome.pins.len(),
            outcome.rounds
        );
    }
    Ok(())
}

fn run(args: &Args, config: &AppConfig) -> Result<()> {
    let mut period = build_period(config)?;
    let history = load_history(config)?;

    let summary = match (config.engine.engine, config.engine.carry_forward) {
        (EngineKind::Regression, CarryForwardMode::Disabled) => period.solve_regression()?,
        (EngineKind::Regression, CarryForwardMode::Reseed) => {
            if let Some(history) = &history {
                let seeded = period.seed_from_history(history);
                info!("seeded {} teams from published history", seeded);
            }
            period.solve_regression()?
        }
        (EngineKind::Regression, CarryForwardMode::Incremental) => {
            let history = history
                .as_ref()
                .ok_or_else(|| anyhow!("incremental solve requires a history file"))?;
            // seeding first keeps unchanged teams at their published powers
            let seeded = period.seed_from_history(history);
            info!("seeded {} teams from published history", seeded);
            period.solve_regression_incremental(history)?
        }
        (EngineKind::Iterative, CarryForwardMode::Disabled) => period.solve_iterative(None)?,
        (EngineKind::Iterative, CarryForwardMode::Reseed) => {
            period.solve_iterative(history.as_ref())?
        }
        (EngineKind::Iterative, CarryForwardMode::Incremental) => {
            return Err(anyhow!(
                "incremental carry-forward only works with the regression engine"
            ));
        }
    };

    // The incremental solve keeps the published scale, and iterative powers
    // stay on the scale they were seeded with. Only a fresh or reseeded
    // regression solve needs its gauge fixed.
    match (config.engine.engine, config.engine.carry_forward) {
        (EngineKind::Regression, CarryForwardMode::Incremental) => {
            debug!("incremental solve, skipping anchoring");
        }
        (EngineKind::Regression, _) => {
            if summary.teams_solved == 0 {
                warn!("nothing was rated, skipping anchoring");
            } else {
                anchor_rankings(&mut period, config, args.non_interactive)?;
            }
        }
        (EngineKind::Iterative, _) => {
            debug!("iterative engine, skipping anchoring");
        }
    }

    let only_active = config.period.only_active && !args.all;
    print!("{}", report::period_summary(&period, &summary));
    print!("{}", report::ranking_table(&period, only_active));

    if args.weekly {
        print!("{}", report::games_by_week(&period));
    }

    if args.compare {
        match history.as_ref().and_then(|h| h.latest()) {
            Some(prior) => {
                let rows = period.compare_with(prior);
                print!(
                    "{}",
                    report::comparison_table(&rows, period.end(), prior.boundary)
                );
            }
            None => warn!("no published snapshot to compare against"),
        }
    }

    for pair in args.forecast.chunks(2) {
        let forecast = period.expected_result(&pair[0], &pair[1])?;
        print!("{}", report::forecast_narrative(&forecast));
    }

    for name in &args.team_log {
        print!("{}", report::team_log(&period, name)?);
    }

    if args.write_history {
        let path = config.input.history_file.as_ref().ok_or_else(|| {
            anyhow!("--write-history needs input.history_file in the configuration")
        })?;
        let mut history = history.unwrap_or_default();
        history.push(period.snapshot())?;
        ingest::save_history(path, &history)?;
        info!(
            "published the {} snapshot to {}",
            config.period.end,
            path.display()
        );
    }

    Ok(())
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Load configuration (CLI args can override environment/config file)
    let config = load_config(&args).unwrap_or_else(|e| {
        eprintln!("Configuration error: {}", e);
        std::process::exit(1);
    });

    // Initialize logging early (before any other operations)
    if let Err(e) = init_logging(&config.service.log_level) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    if args.dry_run {
        info!("Configuration validation successful");
        display_startup_banner(&config);
        info!("Dry run completed - exiting without solving");
        return Ok(());
    }

    display_startup_banner(&config);

    run(&args, &config)
}
