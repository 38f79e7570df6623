use crate::CommonOptions;
use crate::DepthFirstSearch;
use crate::Mdp;
use crate::SearchEngine;
use hzn_core::Reward;
use hzn_core::Timer;
use hzn_task::State;
use hzn_task::StateKey;
use rand::rngs::SmallRng;
use rustc_hash::FxHashMap;

/// Iterative deepening over [`DepthFirstSearch`].
///
/// Searches the determinized task with `remaining_steps = 1, 2, …` until
/// the per-call timeout expires, a good action is found (one strictly
/// better than noop, if configured), or the depth limit is reached. The
/// per-step results are averaged per remaining step and cached by state.
///
/// `learn` calibrates the maximum useful depth on a training set: it runs
/// unbounded, records per-depth wall-clock, and keeps the largest depth
/// whose mean time stays below the timeout.
pub struct IterativeDeepeningSearch {
    dfs: DepthFirstSearch,
    caching_enabled: bool,
    max_search_depth: usize,
    timeout: f64,
    strict_timeout: f64,
    terminate_with_reasonable_action: bool,
    min_search_depth: usize,
    noop_is_first_action: bool,

    learning: bool,
    elapsed: Vec<Vec<f64>>,
    q_cache: FxHashMap<StateKey, Vec<Reward>>,

    accumulated_depth: usize,
    runs: usize,
    cache_hits: usize,
}

impl IterativeDeepeningSearch {
    pub fn new(
        mdp: &Mdp,
        common: CommonOptions,
        timeout: f64,
        strict_timeout: f64,
        terminate_with_reasonable_action: bool,
        min_search_depth: usize,
    ) -> Self {
        let max_search_depth = common.max_search_depth.unwrap_or(mdp.horizon());
        let dfs_options = CommonOptions {
            caching: common.caching,
            task_mode: common.task_mode,
            max_search_depth: Some(max_search_depth),
        };
        Self {
            dfs: DepthFirstSearch::new(mdp, dfs_options),
            caching_enabled: common.caching,
            max_search_depth,
            timeout,
            strict_timeout,
            terminate_with_reasonable_action,
            min_search_depth,
            noop_is_first_action: mdp.task.action_states[0].is_noop(),
            learning: false,
            elapsed: vec![Vec::new(); max_search_depth + 1],
            q_cache: FxHashMap::default(),
            accumulated_depth: 0,
            runs: 0,
            cache_hits: 0,
        }
    }

    /// Whether another deepening iteration is worthwhile.
    fn more_iterations(
        &mut self,
        estimates: &[Reward],
        time: f64,
        current_depth: usize,
        depth_limit: usize,
    ) -> bool {
        if self.learning {
            if self.elapsed.len() <= current_depth {
                self.elapsed.resize(current_depth + 1, Vec::new());
            }
            self.elapsed[current_depth].push(time);
            if time > self.strict_timeout {
                self.elapsed.truncate(current_depth);
                self.max_search_depth = current_depth.saturating_sub(1);
                return false;
            }
        } else {
            if self.terminate_with_reasonable_action && self.noop_is_first_action {
                let noop_estimate = estimates[0];
                if estimates[1..]
                    .iter()
                    .any(|&q| hzn_core::value_gt(q, noop_estimate))
                {
                    return false;
                }
            }
            if time > self.timeout {
                return false;
            }
        }
        current_depth < depth_limit
    }
}

impl SearchEngine for IterativeDeepeningSearch {
    fn name(&self) -> &'static str {
        "IDS"
    }

    fn estimate_q_values(
        &mut self,
        mdp: &mut Mdp,
        rng: &mut SmallRng,
        state: &State,
        prune: bool,
    ) -> Vec<Reward> {
        if self.caching_enabled {
            if let Some(cached) = self.q_cache.get(&state.key_ignoring_steps()) {
                self.cache_hits += 1;
                return cached.clone();
            }
        }

        let timer = Timer::start();
        let depth_limit = state.remaining_steps.min(self.max_search_depth);
        let mut current = state.clone();
        // with the noop shortcut a one-step lookahead carries no signal
        current.remaining_steps = if mdp.task.noop_optimal_final_action {
            1
        } else {
            0
        };

        let mut estimates;
        loop {
            current.remaining_steps += 1;
            estimates = self.dfs.estimate_q_values(mdp, rng, &current, prune);
            if !self.more_iterations(
                &estimates,
                timer.elapsed(),
                current.remaining_steps,
                depth_limit,
            ) {
                break;
            }
        }

        // average reward per step makes depths comparable
        for estimate in estimates.iter_mut() {
            if estimate.is_finite() {
                *estimate /= current.remaining_steps as f64;
            }
        }
        self.accumulated_depth += current.remaining_steps;
        self.runs += 1;

        if self.caching_enabled && !self.learning {
            self.q_cache
                .insert(state.key_ignoring_steps(), estimates.clone());
        }
        estimates
    }

    fn learn(&mut self, mdp: &mut Mdp, rng: &mut SmallRng, training: &[State]) {
        log::info!("{}: learning...", self.name());
        self.learning = true;
        let caching_before = self.caching_enabled;
        self.caching_enabled = false;
        self.elapsed = vec![Vec::new(); self.max_search_depth + 1];

        for state in training {
            let mut copy = state.clone();
            copy.remaining_steps = self.max_search_depth;
            self.estimate_q_values(mdp, rng, &copy, true);
            if self.max_search_depth < self.min_search_depth {
                log::info!("{}: setting max search depth to 0", self.name());
                self.max_search_depth = 0;
                self.learning = false;
                self.caching_enabled = caching_before;
                self.dfs.set_max_search_depth(0);
                return;
            }
        }

        self.learning = false;
        self.caching_enabled = caching_before;

        // keep the largest depth whose mean time undercuts the timeout
        self.max_search_depth = 0;
        let first = if mdp.task.noop_optimal_final_action { 2 } else { 1 };
        for depth in first..self.elapsed.len() {
            let samples = &self.elapsed[depth];
            if samples.len() <= training.len() / 2 {
                break;
            }
            let mean = samples.iter().sum::<f64>() / samples.len() as f64;
            log::info!(
                "{}: depth {}: mean time {:.6}s over {} runs",
                self.name(),
                depth,
                mean,
                samples.len()
            );
            if mean < self.timeout {
                self.max_search_depth = depth;
            } else {
                break;
            }
        }
        self.dfs.set_max_search_depth(self.max_search_depth);
        log::info!(
            "{}: setting max search depth to {}",
            self.name(),
            self.max_search_depth
        );
    }

    fn set_caching_enabled(&mut self, enabled: bool) {
        self.caching_enabled = enabled;
        self.dfs.set_caching_enabled(enabled);
    }

    fn set_max_search_depth(&mut self, depth: usize) {
        self.max_search_depth = depth;
        self.dfs.set_max_search_depth(depth);
        if self.elapsed.len() <= depth {
            self.elapsed.resize(depth + 1, Vec::new());
        }
    }

    fn max_search_depth(&self) -> usize {
        self.max_search_depth
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hzn_compile::testing::compiled_counter_task;
    use rand::SeedableRng;

    fn engine(mdp: &Mdp) -> IterativeDeepeningSearch {
        IterativeDeepeningSearch::new(mdp, CommonOptions::default(), 0.005, 0.1, true, 1)
    }

    #[test]
    fn estimates_are_average_rewards_per_step() {
        let mut mdp = Mdp::new(compiled_counter_task(2));
        let mut ids = engine(&mdp);
        let mut rng = SmallRng::seed_from_u64(0);
        let state = mdp.initial_state();
        let estimates = ids.estimate_q_values(&mut mdp, &mut rng, &state, true);
        // advancing beats idling at every depth
        assert!(estimates[1] > estimates[0]);
        assert!(estimates[1] <= 1.0 + hzn_core::EPSILON);
    }

    #[test]
    fn cache_serves_repeated_states() {
        let mut mdp = Mdp::new(compiled_counter_task(2));
        let mut ids = engine(&mdp);
        let mut rng = SmallRng::seed_from_u64(0);
        let state = mdp.initial_state();
        let first = ids.estimate_q_values(&mut mdp, &mut rng, &state, true);
        let second = ids.estimate_q_values(&mut mdp, &mut rng, &state, true);
        assert_eq!(first, second);
        assert_eq!(ids.cache_hits, 1);
    }

    #[test]
    fn learning_calibrates_depth() {
        let mut mdp = Mdp::new(compiled_counter_task(2));
        let mut ids = engine(&mdp);
        let mut rng = SmallRng::seed_from_u64(0);
        let training: Vec<State> = (0..8).map(|_| mdp.initial_state()).collect();
        ids.learn(&mut mdp, &mut rng, &training);
        // the toy task is cheap; every depth fits into the budget
        assert!(ids.max_search_depth() >= 2);
        assert!(ids.max_search_depth() <= mdp.horizon());
    }
}
