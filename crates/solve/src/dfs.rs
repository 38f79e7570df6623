use crate::CommonOptions;
use crate::Mdp;
use crate::SearchEngine;
use hzn_core::Reward;
use hzn_task::State;
use rand::rngs::SmallRng;

/// Exhaustive tree search over the most-likely determinization.
///
/// Expands every applicable action, recurses on deterministic successors,
/// and caches solved state values (keyed on the full state including
/// remaining steps) on the façade. The final step is shortcut through
/// [`Mdp::optimal_final_reward`]. The searched horizon is the root state's
/// remaining steps clamped to the configured maximum search depth.
pub struct DepthFirstSearch {
    caching_enabled: bool,
    max_search_depth: usize,
}

impl DepthFirstSearch {
    pub fn new(mdp: &Mdp, common: CommonOptions) -> Self {
        Self {
            caching_enabled: common.caching,
            max_search_depth: common.max_search_depth.unwrap_or(mdp.horizon()),
        }
    }

    /// Accumulated reward of applying `action` in `state` and following
    /// the best deterministic policy afterwards.
    fn apply_action(&mut self, mdp: &mut Mdp, state: &State, action: usize) -> Reward {
        let (next, reward) = mdp.deterministic_transition(state, action);
        if next.remaining_steps == 0 {
            return reward;
        }
        if let Some(value) = mdp.cached_state_value(&next) {
            return reward + value;
        }
        if next.remaining_steps == 1 {
            return reward + mdp.optimal_final_reward(&next);
        }
        reward + self.expand_state(mdp, &next)
    }

    fn expand_state(&mut self, mdp: &mut Mdp, state: &State) -> Reward {
        let mut best = f64::NEG_INFINITY;
        for action in mdp.applicable_action_indices(state, true) {
            best = best.max(self.apply_action(mdp, state, action));
        }
        if self.caching_enabled {
            mdp.cache_state_value(state, best);
        }
        best
    }
}

impl SearchEngine for DepthFirstSearch {
    fn name(&self) -> &'static str {
        "DFS"
    }

    fn estimate_q_values(
        &mut self,
        mdp: &mut Mdp,
        _rng: &mut SmallRng,
        state: &State,
        prune: bool,
    ) -> Vec<Reward> {
        debug_assert!(state.remaining_steps > 0);
        // the depth cap bounds the searched horizon from the root down
        let clamped;
        let state = if state.remaining_steps > self.max_search_depth {
            let mut copy = state.clone();
            copy.remaining_steps = self.max_search_depth;
            clamped = copy;
            &clamped
        } else {
            state
        };
        let applicable = mdp.applicable_actions(state, prune);
        let mut estimates = vec![f64::NEG_INFINITY; mdp.num_actions()];
        for (action, &entry) in applicable.iter().enumerate() {
            if entry == action as i64 {
                estimates[action] = self.apply_action(mdp, state, action);
            }
        }
        estimates
    }

    fn set_caching_enabled(&mut self, enabled: bool) {
        self.caching_enabled = enabled;
    }

    fn set_max_search_depth(&mut self, depth: usize) {
        self.max_search_depth = depth;
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

    #[test]
    fn finds_the_optimal_deterministic_values() {
        let mut mdp = Mdp::new(compiled_counter_task(3));
        let mut engine = DepthFirstSearch::new(&mdp, CommonOptions::default());
        let mut rng = SmallRng::seed_from_u64(0);
        let state = mdp.initial_state();
        let estimates = engine.estimate_q_values(&mut mdp, &mut rng, &state, true);
        // advancing immediately earns 0 + 1 + 2 over the three steps;
        // idling first leaves time for a single finished counter
        for action in 1..=3 {
            assert!(hzn_core::value_eq(estimates[action], 3.0));
        }
        assert!(hzn_core::value_eq(estimates[0], 1.0));
    }

    #[test]
    fn depth_cap_bounds_the_searched_horizon() {
        let mut mdp = Mdp::new(compiled_counter_task(3));
        let mut engine = DepthFirstSearch::new(
            &mdp,
            CommonOptions {
                caching: true,
                task_mode: None,
                max_search_depth: Some(2),
            },
        );
        let mut rng = SmallRng::seed_from_u64(0);
        let state = mdp.initial_state();
        assert_eq!(state.remaining_steps, 3);
        let estimates = engine.estimate_q_values(&mut mdp, &mut rng, &state, true);
        // only two of the three steps are searched: advance now, then
        // collect the final reward of the single finished counter
        for action in 1..=3 {
            assert!(hzn_core::value_eq(estimates[action], 1.0));
        }
        assert!(hzn_core::value_eq(estimates[0], 0.0));
    }

    #[test]
    fn cached_values_are_reused() {
        let mut mdp = Mdp::new(compiled_counter_task(2));
        let mut engine = DepthFirstSearch::new(&mdp, CommonOptions::default());
        let mut rng = SmallRng::seed_from_u64(0);
        let state = mdp.initial_state();
        let first = engine.estimate_q_values(&mut mdp, &mut rng, &state, true);
        assert!(!mdp.state_value_cache.is_empty());
        let second = engine.estimate_q_values(&mut mdp, &mut rng, &state, true);
        assert_eq!(first, second);
    }
}
