//! The `horizon` binary.
//!
//! Loads a schematic task (JSON, the parser contract) or a previously
//! persisted preprocessed task, compiles it, and plays the planner against
//! an internal simulator for the configured number of rounds: each step the
//! planner submits an action, the simulator samples the successor, and the
//! loop repeats until the horizon is exhausted.

use anyhow::Context;
use clap::Parser;
use hzn_compile::load_preprocessed;
use hzn_compile::preprocess;
use hzn_compile::save_preprocessed;
use hzn_solve::EngineSpec;
use hzn_solve::Planner;
use hzn_task::GroundTask;
use hzn_task::SchematicTask;
use rand::rngs::SmallRng;
use rand::SeedableRng;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "horizon",
    about = "Anytime THTS/UCT planner for factored finite-horizon MDPs",
    after_help = "Engine specifications are nested option lists, e.g.\n  \
                  --se \"[UCT -T ROLLOUTS -r 20000 -i [IDS -sd 10]]\"\n  \
                  --se \"[UCT -t 5.0 -i [RAND]]\""
)]
struct Args {
    /// Schematic task description (JSON).
    task: PathBuf,

    /// Search engine specification (nested `[ENGINE opt …]` syntax).
    #[arg(long = "se", value_name = "SPEC")]
    search_engine: String,

    /// Random seed (default: derived from the clock).
    #[arg(short = 's', long = "seed", value_name = "SEED")]
    seed: Option<u64>,

    /// Memory threshold in kilobytes; caching shuts off beyond it.
    #[arg(long = "ram", value_name = "KB", default_value_t = hzn_core::RAM_LIMIT_KB)]
    ram_limit: usize,

    /// Number of rounds to play against the simulator.
    #[arg(long, default_value_t = 1)]
    rounds: usize,

    /// Directory for the persisted preprocessed task; loaded in place of
    /// rerunning the grounder when present, written after compiling
    /// otherwise.
    #[arg(long, value_name = "DIR")]
    preprocessed_dir: Option<PathBuf>,
}

fn load_task(args: &Args) -> anyhow::Result<GroundTask> {
    if let Some(directory) = &args.preprocessed_dir {
        if let Some(task) = load_preprocessed(directory)? {
            return Ok(task);
        }
    }
    let payload = std::fs::read_to_string(&args.task)
        .with_context(|| format!("cannot read task file {:?}", args.task))?;
    let schematic: SchematicTask =
        serde_json::from_str(&payload).context("malformed schematic task")?;
    let timer = hzn_core::Timer::start();
    let ground = preprocess(&schematic)?;
    log::info!("preprocessing finished ({})", timer);
    if let Some(directory) = &args.preprocessed_dir {
        save_preprocessed(&ground, directory)?;
    }
    Ok(ground)
}

fn clock_seed() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
}

fn run() -> anyhow::Result<()> {
    let args = Args::parse();
    let spec = EngineSpec::parse(&args.search_engine)?;
    let task = load_task(&args)?;
    let seed = args.seed.unwrap_or_else(clock_seed);
    log::info!("seed: {}", seed);

    let horizon = task.horizon;
    let initial_values = task.initial_values.clone();
    let mut planner = Planner::new(task, &spec, seed, args.ram_limit);
    planner.init();

    // the internal simulator stands in for the competition server and
    // draws from its own stream
    let mut simulator = SmallRng::seed_from_u64(seed.wrapping_add(1));

    for round in 0..args.rounds {
        let mut values = initial_values.clone();
        let mut accumulated = 0.0;
        for step in 0..horizon {
            let remaining = horizon - step;
            let action_names = planner.plan(values.clone());
            let state = planner.mdp.task.state_from_values(values, remaining);
            let action = planner
                .mdp
                .task
                .action_states
                .iter()
                .position(|candidate| {
                    candidate.scheduled_names(&planner.mdp.task.action_fluents) == action_names
                })
                .context("planner emitted an unknown action")?;
            accumulated += planner.mdp.calc_reward(&state, action);
            values = planner
                .mdp
                .sample_successor(&mut simulator, &state, action)
                .values;
        }
        log::info!(
            "round {}/{} finished with accumulated reward {}",
            round + 1,
            args.rounds,
            accumulated
        );
        planner.init_next_round();
    }
    Ok(())
}

fn main() {
    hzn_core::log();
    let timer = hzn_core::Timer::start();
    if let Err(error) = run() {
        log::error!("{:#}", error);
        std::process::exit(1);
    }
    log::info!("complete running time: {}", timer);
}
