use crate::Mdp;
use hzn_core::Probability;
use hzn_core::Timer;
use hzn_task::State;
use hzn_task::StateKey;
use rand::rngs::SmallRng;
use rand::Rng;
use rustc_hash::FxHashSet;

/// Knobs of the training-set generator.
#[derive(Debug, Clone, Copy)]
pub struct TrainingConfig {
    /// Number of states to aim for.
    pub target_size: usize,
    /// Probability of keeping a visited state that is not a reward
    /// extremum.
    pub inclusion_probability: Probability,
    /// Wall-clock budget in seconds.
    pub timeout: f64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            target_size: hzn_core::TRAINING_SET_SIZE,
            inclusion_probability: hzn_core::TRAINING_INCLUSION_PROBABILITY,
            timeout: hzn_core::TRAINING_TIMEOUT,
        }
    }
}

/// Synthesizes a set of reachable, diverse states by random walk.
///
/// From the root, a uniformly random applicable action is sampled each
/// step; the walk restarts on terminal states. Reward-extremum states are
/// always kept, others with the configured probability. Stops at the
/// target size or when the time budget runs out.
pub fn generate_training_set(
    mdp: &mut Mdp,
    rng: &mut SmallRng,
    config: &TrainingConfig,
    root: &State,
) -> Vec<State> {
    let timer = Timer::start();
    let mut seen: FxHashSet<StateKey> = FxHashSet::default();
    let mut states: Vec<State> = Vec::new();

    seen.insert(root.key_ignoring_steps());
    states.push(root.clone());

    let mut current = root.clone();
    while states.len() < config.target_size && timer.elapsed() < config.timeout {
        let applicable = mdp.applicable_action_indices(&current, true);
        if applicable.is_empty() {
            current = root.clone();
            continue;
        }
        let action = applicable[rng.random_range(0..applicable.len())];
        let (next, reward) = mdp.sample_transition(rng, &current, action);

        let keep = mdp.is_min_reward(reward)
            || mdp.is_max_reward(reward)
            || hzn_core::value_le(rng.random::<Probability>(), config.inclusion_probability);
        if keep && seen.insert(next.key_ignoring_steps()) {
            states.push(next.clone());
        }

        if next.is_terminal() {
            current = root.clone();
        } else {
            current = next;
        }
    }

    log::info!("created {} training states", states.len());
    states
}

#[cfg(test)]
mod tests {
    use super::*;
    use hzn_compile::testing::compiled_counter_task;
    use rand::SeedableRng;

    #[test]
    fn generated_states_are_reachable_and_unique() {
        let mut mdp = Mdp::new(compiled_counter_task(3));
        let mut rng = SmallRng::seed_from_u64(11);
        let config = TrainingConfig {
            target_size: 6,
            inclusion_probability: 1.0,
            timeout: 1.0,
        };
        let root = mdp.initial_state();
        let states = generate_training_set(&mut mdp, &mut rng, &config, &root);
        assert!(!states.is_empty());
        assert!(states.len() <= config.target_size);
        let keys: FxHashSet<StateKey> =
            states.iter().map(State::key_ignoring_steps).collect();
        assert_eq!(keys.len(), states.len());
        // the counter task only ever sets bits
        for state in &states {
            assert!(state.values.iter().all(|&v| v == 0.0 || v == 1.0));
        }
    }

    #[test]
    fn respects_the_size_target() {
        let mut mdp = Mdp::new(compiled_counter_task(2));
        let mut rng = SmallRng::seed_from_u64(2);
        let config = TrainingConfig {
            target_size: 2,
            inclusion_probability: 1.0,
            timeout: 1.0,
        };
        let root = mdp.initial_state();
        let states = generate_training_set(&mut mdp, &mut rng, &config, &root);
        assert_eq!(states.len(), 2);
    }
}
