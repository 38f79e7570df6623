use crate::CommonOptions;
use crate::Mdp;
use crate::SearchEngine;
use hzn_core::Reward;
use hzn_task::State;
use rand::rngs::SmallRng;

/// The trivial initializer: a flat zero estimate for every action that
/// survives pruning, leaving successor choice entirely to the tree search.
pub struct RandomSearch {
    max_search_depth: usize,
}

impl RandomSearch {
    pub fn new(mdp: &Mdp, common: CommonOptions) -> Self {
        Self {
            max_search_depth: common.max_search_depth.unwrap_or(mdp.horizon()),
        }
    }
}

impl SearchEngine for RandomSearch {
    fn name(&self) -> &'static str {
        "Random"
    }

    fn estimate_q_values(
        &mut self,
        mdp: &mut Mdp,
        _rng: &mut SmallRng,
        state: &State,
        prune: bool,
    ) -> Vec<Reward> {
        if !prune {
            return vec![0.0; mdp.num_actions()];
        }
        mdp.applicable_actions(state, true)
            .iter()
            .enumerate()
            .map(|(action, &entry)| {
                if entry == action as i64 {
                    0.0
                } else {
                    f64::NEG_INFINITY
                }
            })
            .collect()
    }

    fn set_caching_enabled(&mut self, _enabled: bool) {}

    fn set_max_search_depth(&mut self, depth: usize) {
        self.max_search_depth = depth;
    }

    fn max_search_depth(&self) -> usize {
        self.max_search_depth
    }
}
