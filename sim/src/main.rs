//! PF SIM: generate landmark localization scenarios and score the particle filter on them.
//!
//! - `generate` writes a synthetic scenario directory (random map, weaving drive, noisy observations).
//! - `run` replays a scenario directory through the filter and writes one CSV row per step.
//! - `config` writes a default simulation configuration to edit.
//!
//! Filter and noise parameters come from `--config` (TOML/JSON/YAML) when given, otherwise from the
//! built-in defaults; command line flags override both.

mod common;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use common::{LogSettings, ensure_parent_dir, init_logger, validate_scenario_dir};
use landmark_pf::data::Scenario;
use landmark_pf::sim::{
    SimulationConfig, StepResult, generate_scenario, random_map, run_filter, summarize,
    weaving_controls,
};
use landmark_pf::{Pose, ResamplingStrategy};
use log::{info, warn};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::path::PathBuf;

const LONG_ABOUT: &str = "PF SIM: a driver for the landmark particle filter.

Scenarios are directories holding map_data.txt (x, y, id per line, tab separated), control_data.csv,
gt_data.csv and observations.csv. Use `generate` to synthesize one, `run` to localize against it and
`config` to write a starting configuration file.";

/// Command line arguments
#[derive(Parser)]
#[command(author, version, about = "Landmark particle filter simulator.", long_about = LONG_ABOUT)]
struct Cli {
    /// Simulation configuration file (TOML/JSON/YAML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,

    /// Log level (off, error, warn, info, debug, trace); overrides the config file
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log file path (if not specified, logs to stderr)
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand, Clone)]
enum Command {
    #[command(about = "Run the particle filter over a scenario directory")]
    Run(RunArgs),
    #[command(about = "Generate a synthetic scenario directory")]
    Generate(GenerateArgs),
    #[command(about = "Write a default simulation configuration file")]
    Config(ConfigArgs),
}

#[derive(Args, Clone, Debug)]
struct FilterOverrides {
    /// Number of particles
    #[arg(long)]
    particles: Option<usize>,
    /// Random seed
    #[arg(long)]
    seed: Option<u64>,
    /// Resampling strategy (multinomial, systematic, stratified, residual)
    #[arg(long, value_parser = parse_strategy)]
    resampling: Option<ResamplingStrategy>,
}
impl FilterOverrides {
    fn apply(&self, config: &mut SimulationConfig) {
        if let Some(n) = self.particles {
            config.filter.num_particles = n;
        }
        if let Some(seed) = self.seed {
            config.filter.seed = seed;
        }
        if let Some(strategy) = self.resampling {
            config.filter.resampling_strategy = strategy;
        }
    }
}

#[derive(Args, Clone, Debug)]
struct RunArgs {
    /// Scenario directory
    #[arg(short, long)]
    input: PathBuf,
    /// Output CSV of per-step results
    #[arg(short, long)]
    output: PathBuf,
    #[command(flatten)]
    filter: FilterOverrides,
}

#[derive(Args, Clone, Debug)]
struct GenerateArgs {
    /// Output scenario directory
    #[arg(short, long)]
    output: PathBuf,
    /// Number of time steps
    #[arg(long, default_value_t = 500)]
    steps: usize,
    /// Number of map landmarks
    #[arg(long, default_value_t = 40)]
    landmarks: usize,
    /// Landmarks are scattered over [-extent, extent] in both axes (m)
    #[arg(long, default_value_t = 150.0)]
    extent: f64,
    /// Vehicle speed (m/s)
    #[arg(long, default_value_t = 5.0)]
    velocity: f64,
    /// Seed for the map and observation noise
    #[arg(long, default_value_t = 7)]
    seed: u64,
}

#[derive(Args, Clone, Debug)]
struct ConfigArgs {
    /// Output configuration file (.toml, .json, .yaml)
    #[arg(short, long)]
    output: PathBuf,
}

fn parse_strategy(s: &str) -> std::result::Result<ResamplingStrategy, String> {
    match s.to_ascii_lowercase().as_str() {
        "multinomial" => Ok(ResamplingStrategy::Multinomial),
        "systematic" => Ok(ResamplingStrategy::Systematic),
        "stratified" => Ok(ResamplingStrategy::Stratified),
        "residual" => Ok(ResamplingStrategy::Residual),
        other => Err(format!("unknown resampling strategy '{other}'")),
    }
}

fn run(args: &RunArgs, mut config: SimulationConfig) -> Result<()> {
    args.filter.apply(&mut config);
    validate_scenario_dir(&args.input)?;
    let scenario = Scenario::load(&args.input)
        .with_context(|| format!("loading scenario from {}", args.input.display()))?;
    info!(
        "Loaded scenario: {} steps, {} landmarks",
        scenario.num_steps(),
        scenario.map.len()
    );
    info!(
        "Running {} particles with {:?} resampling",
        config.filter.num_particles, config.filter.resampling_strategy
    );

    let results = run_filter(&scenario, &config)?;
    ensure_parent_dir(&args.output)?;
    StepResult::to_csv(&results, &args.output)
        .with_context(|| format!("writing results to {}", args.output.display()))?;
    info!("Wrote {} rows to {}", results.len(), args.output.display());

    match summarize(&results) {
        Some(summary) if summary.within(config.max_translation_error, config.max_yaw_error) => {
            info!(
                "Mean error within tolerance: x {:.3} m, y {:.3} m, yaw {:.4} rad",
                summary.mean.x, summary.mean.y, summary.mean.yaw
            );
        }
        Some(summary) => {
            warn!(
                "Mean error exceeds tolerance ({} m, {} rad): x {:.3} m, y {:.3} m, yaw {:.4} rad",
                config.max_translation_error,
                config.max_yaw_error,
                summary.mean.x,
                summary.mean.y,
                summary.mean.yaw
            );
        }
        None => warn!("Scenario has no steps"),
    }
    Ok(())
}

fn generate(args: &GenerateArgs, config: &SimulationConfig) -> Result<()> {
    if args.steps == 0 {
        bail!("--steps must be positive");
    }
    let mut rng = StdRng::seed_from_u64(args.seed);
    let map = random_map(args.landmarks, args.extent, &mut rng)?;
    let controls = weaving_controls(args.steps, args.velocity, config.delta_t);
    let scenario = generate_scenario(&map, Pose::default(), &controls, config, &mut rng)?;
    scenario
        .save(&args.output)
        .with_context(|| format!("writing scenario to {}", args.output.display()))?;
    info!(
        "Generated {} steps over {} landmarks in {}",
        scenario.num_steps(),
        map.len(),
        args.output.display()
    );
    Ok(())
}

fn write_default_config(args: &ConfigArgs) -> Result<()> {
    ensure_parent_dir(&args.output)?;
    SimulationConfig::default()
        .to_file(&args.output)
        .with_context(|| format!("writing configuration to {}", args.output.display()))?;
    info!("Wrote default configuration to {}", args.output.display());
    Ok(())
}

/// Short tag for log lines: the subcommand and the scenario directory it works on.
fn run_label(command: &Command) -> String {
    let dir_name = |path: &PathBuf| {
        path.file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string())
    };
    match command {
        Command::Run(args) => format!("run:{}", dir_name(&args.input)),
        Command::Generate(args) => format!("generate:{}", dir_name(&args.output)),
        Command::Config(_) => "config".to_string(),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => SimulationConfig::from_file(path)
            .with_context(|| format!("reading configuration {}", path.display()))?,
        None => SimulationConfig::default(),
    };

    let settings = LogSettings::resolve(
        cli.log_level.as_deref(),
        cli.log_file.as_ref(),
        cli.config.as_ref().map(|_| &config.logging),
    )?;
    init_logger(&settings, &run_label(&cli.command))?;

    match &cli.command {
        Command::Run(args) => run(args, config),
        Command::Generate(args) => generate(args, &config),
        Command::Config(args) => write_default_config(args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_run_with_overrides() {
        let cli = Cli::try_parse_from([
            "pf-sim",
            "run",
            "--input",
            "data/scenario",
            "--output",
            "out.csv",
            "--particles",
            "250",
            "--resampling",
            "Systematic",
            "--log-level",
            "debug",
        ])
        .unwrap();
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.input, PathBuf::from("data/scenario"));
        let mut config = SimulationConfig::default();
        args.filter.apply(&mut config);
        assert_eq!(config.filter.num_particles, 250);
        assert_eq!(config.filter.seed, 42);
        assert_eq!(
            config.filter.resampling_strategy,
            ResamplingStrategy::Systematic
        );
    }

    #[test]
    fn log_lines_are_tagged_with_the_scenario() {
        let cli = Cli::try_parse_from(["pf-sim", "run", "-i", "data/loop_a", "-o", "out.csv"])
            .unwrap();
        assert_eq!(run_label(&cli.command), "run:loop_a");
        let cli = Cli::try_parse_from(["pf-sim", "generate", "--output", "scn"]).unwrap();
        assert_eq!(run_label(&cli.command), "generate:scn");
        let cli = Cli::try_parse_from(["pf-sim", "config", "-o", "pf.toml"]).unwrap();
        assert_eq!(run_label(&cli.command), "config");
    }

    #[test]
    fn generate_defaults() {
        let cli = Cli::try_parse_from(["pf-sim", "generate", "--output", "scn"]).unwrap();
        let Command::Generate(args) = cli.command else {
            panic!("expected generate");
        };
        assert_eq!(args.steps, 500);
        assert_eq!(args.landmarks, 40);
    }

    #[test]
    fn unknown_strategy_is_rejected() {
        assert!(parse_strategy("bogus").is_err());
        assert!(
            Cli::try_parse_from([
                "pf-sim", "run", "-i", "a", "-o", "b", "--resampling", "bogus"
            ])
            .is_err()
        );
    }

    #[test]
    fn generate_then_run() {
        let root = std::env::temp_dir().join(format!("pf_sim_main_{}", std::process::id()));
        let scenario_dir = root.join("scenario");
        let config = SimulationConfig::default();
        generate(
            &GenerateArgs {
                output: scenario_dir.clone(),
                steps: 20,
                landmarks: 15,
                extent: 40.0,
                velocity: 3.0,
                seed: 3,
            },
            &config,
        )
        .unwrap();
        let output = root.join("results").join("run.csv");
        run(
            &RunArgs {
                input: scenario_dir,
                output: output.clone(),
                filter: FilterOverrides {
                    particles: Some(50),
                    seed: None,
                    resampling: None,
                },
            },
            config,
        )
        .unwrap();
        assert_eq!(StepResult::from_csv(&output).unwrap().len(), 20);
        let _ = std::fs::remove_dir_all(&root);
    }
}
