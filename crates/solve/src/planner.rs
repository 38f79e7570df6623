use crate::generate_training_set;
use crate::EngineSpec;
use crate::Mdp;
use crate::SearchEngine;
use crate::TrainingConfig;
use hzn_core::Value;
use hzn_task::GroundTask;
use rand::rngs::SmallRng;
use rand::Rng;
use rand::SeedableRng;

/// One planning session against an external simulator.
///
/// Owns the façade, the configured engine tree, and the single per-process
/// random stream. `init` runs the one-off preprocessing-time work
/// (training-set generation and learning); each simulator step then calls
/// [`Planner::plan`] with the observed state and receives the names of the
/// true action fluents to execute (empty for noop). Resident memory is
/// probed between steps and caching shuts off globally past the limit.
pub struct Planner {
    pub mdp: Mdp,
    engine: Box<dyn SearchEngine>,
    rng: SmallRng,
    seed: u64,
    ram_limit_kb: usize,
    training: TrainingConfig,
    caching_enabled: bool,
    remaining_steps: usize,
    current_round: usize,
}

impl Planner {
    pub fn new(task: GroundTask, spec: &EngineSpec, seed: u64, ram_limit_kb: usize) -> Self {
        let mdp = Mdp::new(task);
        let engine = spec.build(&mdp);
        let remaining_steps = mdp.horizon();
        Self {
            mdp,
            engine,
            rng: SmallRng::seed_from_u64(seed),
            seed,
            ram_limit_kb,
            training: TrainingConfig::default(),
            caching_enabled: true,
            remaining_steps,
            current_round: 0,
        }
    }

    pub fn with_training_config(mut self, training: TrainingConfig) -> Self {
        self.training = training;
        self
    }

    /// Generates the training set and lets the façade and the engine learn
    /// from it. Runs once, before the first round.
    pub fn init(&mut self) {
        let timer = hzn_core::Timer::start();
        log::info!("generating training set...");
        let root = self.mdp.initial_state();
        let training =
            generate_training_set(&mut self.mdp, &mut self.rng, &self.training, &root);
        // a short training run means the generator timed out mid-walk;
        // reseed so planning stays reproducible regardless
        if training.len() != self.training.target_size {
            self.rng = SmallRng::seed_from_u64(self.seed);
        }
        log::info!("...finished ({})", timer);

        let timer = hzn_core::Timer::start();
        log::info!("learning on training set...");
        self.mdp.learn(&training);
        self.engine.learn(&mut self.mdp, &mut self.rng, &training);
        log::info!("...finished ({})", timer);
    }

    /// Plans one step: estimates the best actions for the observed state,
    /// breaks ties uniformly, and returns the scheduled action-fluent
    /// names.
    pub fn plan(&mut self, state_values: Vec<Value>) -> Vec<String> {
        let state = self
            .mdp
            .task
            .state_from_values(state_values, self.remaining_steps);

        let best = self
            .engine
            .estimate_best_actions(&mut self.mdp, &mut self.rng, &state);
        debug_assert!(!best.is_empty());
        let chosen = best[self.rng.random_range(0..best.len())];

        log::info!(
            "planning step {}/{} in round {}: submitting action {}",
            self.mdp.horizon() - self.remaining_steps + 1,
            self.mdp.horizon(),
            self.current_round + 1,
            self.describe_action(chosen),
        );
        self.monitor_ram_usage();
        self.remaining_steps -= 1;

        let action = &self.mdp.task.action_states[chosen];
        action.scheduled_names(&self.mdp.task.action_fluents)
    }

    /// Resets the step counter for the next round of the session.
    pub fn init_next_round(&mut self) {
        self.current_round += 1;
        self.remaining_steps = self.mdp.horizon();
    }

    pub fn remaining_steps(&self) -> usize {
        self.remaining_steps
    }

    fn describe_action(&self, action: usize) -> String {
        let names = self.mdp.task.action_states[action]
            .scheduled_names(&self.mdp.task.action_fluents);
        if names.is_empty() {
            "noop()".to_string()
        } else {
            names.join(" ")
        }
    }

    /// Disables caching everywhere once resident memory crosses the limit.
    fn monitor_ram_usage(&mut self) {
        if !self.caching_enabled {
            return;
        }
        let used = hzn_core::resident_memory_kb();
        if used > self.ram_limit_kb {
            self.caching_enabled = false;
            self.mdp.disable_caching();
            self.engine.set_caching_enabled(false);
            log::warn!(
                "resident memory {} KB exceeds limit {} KB: caching disabled",
                used,
                self.ram_limit_kb
            );
        }
    }
}
