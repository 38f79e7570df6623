use crate::Mdp;
use hzn_core::value_eq;
use hzn_task::KleeneState;
use hzn_task::State;
use hzn_task::StateKey;
use rustc_hash::FxHashSet;

/// Kleene fixpoints deeper than this count as "not a lock"; the caches are
/// under-approximations, so giving up stays sound.
const LOCK_RECURSION_LIMIT: usize = 64;

/// A set of concrete states with an under-approximation contract: an
/// inserted state is found again, false positives never occur, false
/// negatives are allowed. The reference implementation backs this with a
/// BDD library; the default implementor is a plain hash set.
pub trait StateSet {
    fn insert(&mut self, state: &State);
    fn contains(&self, state: &State) -> bool;
}

/// Hash-set [`StateSet`] keyed on the variable assignment.
#[derive(Debug, Default)]
pub struct HashStateSet {
    states: FxHashSet<StateKey>,
}

impl StateSet for HashStateSet {
    fn insert(&mut self, state: &State) {
        self.states.insert(state.key_ignoring_steps());
    }
    fn contains(&self, state: &State) -> bool {
        self.states.contains(&state.key_ignoring_steps())
    }
}

impl Mdp {
    /// True if every reachable trajectory from `current` yields the extreme
    /// reward under every action: a *goal* at the maximum, a *dead end* at
    /// the minimum.
    ///
    /// Detection reasons in three-valued logic over Kleene states; it is
    /// only attempted when noop sits at action index 0 (verified by the
    /// compiler) and when learning found locks worth detecting.
    pub fn is_reward_lock(&mut self, current: &State) -> bool {
        if !self.reward_lock_detection_enabled() {
            return false;
        }

        let reward = self.calc_reward(current, 0);
        if self.is_min_reward(reward) {
            if self.dead_ends.contains(current) {
                return true;
            }
            let kleene = self.task.kleene_from_state(current);
            if self.check_dead_end(&kleene, 0) {
                self.dead_ends.insert(current);
                return true;
            }
        } else if self.is_max_reward(reward) {
            if self.goals.contains(current) {
                return true;
            }
            let kleene = self.task.kleene_from_state(current);
            if self.check_goal(&kleene, 0) {
                self.goals.insert(current);
                return true;
            }
        }
        false
    }

    /// A dead end keeps the minimal reward under every action: the merged
    /// Kleene successor over all actions must re-yield the minimum, and the
    /// merge must reach a fixpoint (or recursively prove the same).
    fn check_dead_end(&mut self, current: &KleeneState, depth: usize) -> bool {
        if depth >= LOCK_RECURSION_LIMIT {
            return false;
        }

        let mut merged = match self.kleene_successor_with_extreme_reward(current, 0, true) {
            Some(successor) => successor,
            None => return false,
        };
        for action in 1..self.task.num_actions() {
            match self.kleene_successor_with_extreme_reward(current, action, true) {
                Some(successor) => merged.merge(&successor),
                None => return false,
            }
        }

        self.task.calc_kleene_fluent_hash_keys(&mut merged);
        self.task.calc_kleene_hash_key(&mut merged);
        merged.equals(current) || self.check_dead_end(&merged, depth + 1)
    }

    /// Goals are under-approximated: only noop is considered, and the
    /// parent state is merged into the successor before the fixpoint test.
    fn check_goal(&mut self, current: &KleeneState, depth: usize) -> bool {
        if depth >= LOCK_RECURSION_LIMIT {
            return false;
        }

        let mut merged = match self.kleene_successor_with_extreme_reward(current, 0, false) {
            Some(successor) => successor,
            None => return false,
        };
        merged.merge(current);
        self.task.calc_kleene_fluent_hash_keys(&mut merged);
        self.task.calc_kleene_hash_key(&mut merged);
        merged.equals(current) || self.check_goal(&merged, depth + 1)
    }

    /// The Kleene successor of `(current, action)` if the Kleene reward is
    /// certainly the requested extremum, `None` otherwise.
    fn kleene_successor_with_extreme_reward(
        &mut self,
        current: &KleeneState,
        action: usize,
        minimum: bool,
    ) -> Option<KleeneState> {
        let action_state = &self.task.action_states[action];
        let reward = self
            .task
            .reward
            .eval
            .evaluate_to_kleene(current, action_state);
        let extreme = if minimum {
            self.task.reward.min_value()
        } else {
            self.task.reward.max_value()
        };
        if reward.len() != 1 || !value_eq(reward.min(), extreme) {
            return None;
        }

        let mut next = KleeneState::new(self.task.state_size(), self.task.fluent_hash_key_count);
        let action_state = &self.task.action_states[action];
        for index in 0..self.task.state_size() {
            next.values[index] = self.task.cpfs[index]
                .eval
                .evaluate_to_kleene(current, action_state);
        }
        Some(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hzn_compile::preprocess;
    use hzn_compile::testing::reward_lock_task;

    fn mdp() -> Mdp {
        Mdp::new(preprocess(&reward_lock_task()).unwrap())
    }

    #[test]
    fn hash_state_set_round_trips() {
        let mut set = HashStateSet::default();
        let a = State::from_values(vec![1.0, 0.0], 3, 0);
        let b = State::from_values(vec![1.0, 0.0], 1, 0);
        let c = State::from_values(vec![0.0, 0.0], 3, 0);
        set.insert(&a);
        assert!(set.contains(&a));
        // membership ignores remaining steps
        assert!(set.contains(&b));
        assert!(!set.contains(&c));
    }

    #[test]
    fn dead_state_is_a_minimal_reward_lock() {
        let mut mdp = mdp();
        let dead = mdp.task.state_from_values(vec![1.0, 0.0], 4);
        assert!(mdp.is_reward_lock(&dead));
        // the membership cache now short-circuits
        assert!(mdp.dead_ends.contains(&dead));
    }

    #[test]
    fn goal_state_is_a_maximal_reward_lock() {
        let mut mdp = mdp();
        let goal = mdp.task.state_from_values(vec![0.0, 1.0], 4);
        assert!(mdp.is_reward_lock(&goal));
        assert!(mdp.goals.contains(&goal));
    }

    #[test]
    fn open_state_is_no_lock() {
        let mut mdp = mdp();
        let open = mdp.task.state_from_values(vec![0.0, 0.0], 4);
        assert!(!mdp.is_reward_lock(&open));
    }

    #[test]
    fn locks_are_absorbing() {
        // every successor of a dead state under every action is dead again
        let mut mdp = mdp();
        let dead = mdp.task.state_from_values(vec![1.0, 0.0], 4);
        for action in 0..mdp.num_actions() {
            let next = mdp.deterministic_successor(&dead, action);
            assert!(mdp.is_reward_lock(&next));
        }
    }
}
