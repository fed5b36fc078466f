// src/main.rs
//
// Inspection CLI for the dynsyn layer.
//
// Subcommands:
// - inspect:    print the derived index tables for a layer config
// - forward:    run one evaluation on comma-separated x / hidden vectors
// - schedule:   print the amplitude schedule at a few steps
// - checkpoint: build the configured layer and save it as a JSON checkpoint
//
// Every subcommand loads the config, applies DYNSYN_* env overrides and
// prints a one-line header (variant, M/G/C, tables hash).

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use dynsyn::{
    ActionBatch, LayerCheckpoint, LayerConfig, LayerTelemetry, PolicyLayer, WrapperRegistry,
};

#[derive(Debug, Parser)]
#[command(
    name = "dynsyn",
    about = "Synergy-weighted action expansion (inspection harness)",
    version
)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the index tables derived from the muscle groups.
    Inspect {
        #[arg(long)]
        config: PathBuf,
    },
    /// Evaluate the layer once.
    Forward {
        #[arg(long)]
        config: PathBuf,
        /// Per-group action, comma-separated (width G).
        #[arg(long, allow_hyphen_values = true)]
        x: String,
        /// Hidden representation, comma-separated (width hidden_dim).
        #[arg(long, allow_hyphen_values = true)]
        hidden: String,
        /// Amplitude for this evaluation (default: config value).
        #[arg(long)]
        amp: Option<f32>,
        #[arg(long)]
        deterministic: bool,
        /// Seed for the sampling noise.
        #[arg(long, default_value_t = 0)]
        seed: u64,
        /// Also print the leader projection of the output (revert variant).
        #[arg(long)]
        revert: bool,
    },
    /// Print the configured amplitude schedule.
    Schedule {
        #[arg(long)]
        config: PathBuf,
        /// Total training steps to sample over.
        #[arg(long, default_value_t = 1_000_000)]
        steps: u64,
        /// Number of evenly spaced points to print.
        #[arg(long, default_value_t = 11)]
        points: u64,
    },
    /// Save the freshly built layer as a checkpoint.
    Checkpoint {
        #[arg(long)]
        config: PathBuf,
        #[arg(long)]
        out: PathBuf,
    },
}

fn parse_vector(raw: &str, what: &str) -> Result<Vec<f32>> {
    raw.split(',')
        .filter(|s| !s.trim().is_empty())
        .map(|s| {
            s.trim()
                .parse::<f32>()
                .with_context(|| format!("could not parse {} entry {:?} as f32", what, s))
        })
        .collect()
}

fn load(config: &Path) -> Result<(LayerConfig, PolicyLayer)> {
    let cfg = LayerConfig::from_yaml_file(config)
        .with_context(|| format!("loading layer config {}", config.display()))?
        .with_env_overrides();
    let layer = cfg.build_layer().context("building layer")?;

    let index = layer.base().index();
    eprintln!(
        "dynsyn | variant={} M={} G={} C={} hidden={} amp={} tables_sha256={}",
        layer.variant(),
        index.actuator_count,
        index.group_count,
        index.compressed_dim,
        layer.base().hidden_dim(),
        layer.weight_amp(),
        &index.fingerprint()[..16],
    );
    Ok((cfg, layer))
}

fn format_row(row: &[f32]) -> String {
    row.iter()
        .map(|v| format!("{:.6}", v))
        .collect::<Vec<_>>()
        .join(", ")
}

fn main() -> Result<()> {
    let args = Args::parse();

    match args.command {
        Command::Inspect { config } => {
            let (cfg, layer) = load(&config)?;
            let index = layer.base().index();
            println!("muscle_groups      = {:?}", cfg.muscle_groups.groups());
            println!("group_sizes        = {:?}", index.group_sizes);
            println!("weight_indices     = {:?}", index.weight_indices);
            println!("non_weight_indices = {:?}", index.non_weight_indices);
            println!("placement_table    = {:?}", index.placement_table);
            println!("identity_placement = {}", index.is_identity_placement());
            let wrappers = cfg.build_wrappers(&WrapperRegistry::with_builtins())?;
            println!("wrappers           = {:?}", wrappers.names());
        }
        Command::Forward {
            config,
            x,
            hidden,
            amp,
            deterministic,
            seed,
            revert,
        } => {
            let (cfg, layer) = load(&config)?;
            if let Some(amp) = amp {
                layer.update_weight_amp(amp)?;
            }
            let x = ActionBatch::from_row(parse_vector(&x, "x")?);
            let hidden = ActionBatch::from_row(parse_vector(&hidden, "hidden")?);

            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let (mut actions, stats) =
                layer.forward_with_stats(&x, &hidden, deterministic, &mut rng)?;

            let mut telemetry = LayerTelemetry::from_env();
            telemetry.log_forward(&stats);

            println!("actions = [{}]", format_row(actions.row(0)));
            if revert {
                let leaders = layer.revert(&actions)?;
                println!("revert  = [{}]", format_row(leaders.row(0)));
            }
            let wrappers = cfg.build_wrappers(&WrapperRegistry::with_builtins())?;
            if !wrappers.is_empty() {
                wrappers.apply(&mut actions);
                println!("wrapped = [{}]", format_row(actions.row(0)));
            }
            println!("stats   = {}", serde_json::to_string(&stats)?);
        }
        Command::Schedule {
            config,
            steps,
            points,
        } => {
            let (cfg, _) = load(&config)?;
            if points < 2 {
                bail!("--points must be at least 2");
            }
            let schedule = cfg.effective_schedule();
            for i in 0..points {
                let step = steps.saturating_mul(i) / (points - 1);
                println!("{:>12}  {:.6}", step, schedule.amp_at(step));
            }
        }
        Command::Checkpoint { config, out } => {
            let (_, layer) = load(&config)?;
            LayerCheckpoint::from_layer(&layer)
                .save(&out)
                .with_context(|| format!("writing checkpoint {}", out.display()))?;
            println!("wrote {}", out.display());
        }
    }

    Ok(())
}
