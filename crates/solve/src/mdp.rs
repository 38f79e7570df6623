use crate::HashStateSet;
use crate::StateSet;
use hzn_core::value_eq;
use hzn_core::Probability;
use hzn_core::Reward;
use hzn_core::Value;
use hzn_task::GroundTask;
use hzn_task::PdState;
use hzn_task::PdStateKey;
use hzn_task::State;
use hzn_task::StateKey;
use rand::rngs::SmallRng;
use rand::Rng;
use rustc_hash::FxHashMap;
use std::collections::HashMap;

/// The runtime façade over a compiled task.
///
/// Owns every cache that outlives a single engine call: the two
/// applicable-action caches (with and without reasonable-action pruning),
/// the state-value cache of depth-first search, and the reward-lock
/// membership sets. States and actions are never mutated by the façade;
/// successors are fresh states with their hash keys recomputed.
pub struct Mdp {
    pub task: GroundTask,
    /// Learned: whether any training state exposed prunable actions.
    use_reasonable_action_pruning: bool,
    /// Learned: whether any training state was a reward lock.
    use_reward_lock_detection: bool,
    cache_applicable_actions: bool,
    applicable_cache: FxHashMap<StateKey, Vec<i64>>,
    pruned_cache: FxHashMap<StateKey, Vec<i64>>,
    /// Under-approximating membership caches for dead ends and goals.
    pub dead_ends: Box<dyn StateSet>,
    pub goals: Box<dyn StateSet>,
    /// Solved-state values of the deterministic search, keyed on the full
    /// state including remaining steps.
    pub state_value_cache: HashMap<(usize, StateKey), Reward>,
    state_value_caching_enabled: bool,
}

impl Mdp {
    pub fn new(task: GroundTask) -> Self {
        Self {
            task,
            use_reasonable_action_pruning: true,
            use_reward_lock_detection: true,
            cache_applicable_actions: true,
            applicable_cache: FxHashMap::default(),
            pruned_cache: FxHashMap::default(),
            dead_ends: Box::new(HashStateSet::default()),
            goals: Box::new(HashStateSet::default()),
            state_value_cache: HashMap::new(),
            state_value_caching_enabled: true,
        }
    }

    pub fn state_size(&self) -> usize {
        self.task.state_size()
    }

    pub fn num_actions(&self) -> usize {
        self.task.num_actions()
    }

    pub fn horizon(&self) -> usize {
        self.task.horizon
    }

    pub fn initial_state(&self) -> State {
        self.task.initial_state()
    }

    pub fn reward_lock_detection_enabled(&self) -> bool {
        self.task.reward_lock_detection && self.use_reward_lock_detection
    }

    pub fn is_min_reward(&self, reward: Reward) -> bool {
        value_eq(reward, self.task.reward.min_value())
    }

    pub fn is_max_reward(&self, reward: Reward) -> bool {
        value_eq(reward, self.task.reward.max_value())
    }

    /// Evaluates every CPF into the successor distribution of `(s, a)`.
    pub fn successor_pd(&mut self, current: &State, action: usize) -> PdState {
        let mut next = PdState::new(
            self.task.state_size(),
            current.remaining_steps.saturating_sub(1),
        );
        let action_state = &self.task.action_states[action];
        for (index, cpf) in self.task.cpfs.iter_mut().enumerate() {
            next.values[index] = cpf.eval.evaluate_to_pd(current, action_state);
        }
        next
    }

    /// Samples a successor state: deterministic variables are copied, each
    /// probabilistic variable is drawn from its distribution. Hash keys of
    /// the result are recomputed.
    pub fn sample_successor(
        &mut self,
        rng: &mut SmallRng,
        current: &State,
        action: usize,
    ) -> State {
        let pd = self.successor_pd(current, action);
        let mut values: Vec<Value> = Vec::with_capacity(self.task.state_size());
        for pd_value in &pd.values {
            if pd_value.is_deterministic() {
                values.push(pd_value.value());
            } else {
                values.push(pd_value.sample(rng.random::<Probability>()));
            }
        }
        self.task
            .state_from_values(values, current.remaining_steps.saturating_sub(1))
    }

    /// The successor under the most-likely determinization.
    pub fn deterministic_successor(&mut self, current: &State, action: usize) -> State {
        let action_state = &self.task.action_states[action];
        let mut values: Vec<Value> = Vec::with_capacity(self.task.state_size());
        for cpf in self.task.cpfs.iter_mut() {
            values.push(cpf.eval.evaluate(current, action_state));
        }
        self.task
            .state_from_values(values, current.remaining_steps.saturating_sub(1))
    }

    /// The immediate reward of `(s, a)`; the reward formula is
    /// deterministic by construction.
    pub fn calc_reward(&mut self, current: &State, action: usize) -> Reward {
        let action_state = &self.task.action_states[action];
        self.task.reward.eval.evaluate(current, action_state)
    }

    /// Samples the whole transition.
    pub fn sample_transition(
        &mut self,
        rng: &mut SmallRng,
        current: &State,
        action: usize,
    ) -> (State, Reward) {
        let next = self.sample_successor(rng, current, action);
        let reward = self.calc_reward(current, action);
        (next, reward)
    }

    /// The deterministic transition.
    pub fn deterministic_transition(&mut self, current: &State, action: usize) -> (State, Reward) {
        let next = self.deterministic_successor(current, action);
        let reward = self.calc_reward(current, action);
        (next, reward)
    }

    /// Encodes applicable and reasonable actions: `v[i] = i` if action i is
    /// applicable, `v[i] = -1` if not, and `v[i] = j < i` if action i
    /// induces the same successor distribution as the surviving
    /// representative j (only with `prune`, and only when sound).
    pub fn applicable_actions(&mut self, state: &State, prune: bool) -> Vec<i64> {
        let prune = prune
            && self.use_reasonable_action_pruning
            && self
                .task
                .reward
                .does_not_depend_positively_on_actions();
        let key = state.key_ignoring_steps();
        let cache = if prune {
            &self.pruned_cache
        } else {
            &self.applicable_cache
        };
        if let Some(cached) = cache.get(&key) {
            return cached.clone();
        }

        let mut result = self.compute_applicable(state);
        if prune {
            self.prune_unreasonable(state, &mut result);
        }

        if self.cache_applicable_actions {
            let cache = if prune {
                &mut self.pruned_cache
            } else {
                &mut self.applicable_cache
            };
            cache.insert(key, result.clone());
        }
        result
    }

    /// Indices of the applicable actions only.
    pub fn applicable_action_indices(&mut self, state: &State, prune: bool) -> Vec<usize> {
        self.applicable_actions(state, prune)
            .iter()
            .enumerate()
            .filter(|&(index, &entry)| entry == index as i64)
            .map(|(index, _)| index)
            .collect()
    }

    fn compute_applicable(&mut self, state: &State) -> Vec<i64> {
        let mut result: Vec<i64> = Vec::with_capacity(self.task.num_actions());
        for action in 0..self.task.num_actions() {
            let mut applicable = true;
            let relevant = self.task.action_states[action].relevant_preconditions.clone();
            for precondition in relevant {
                let action_state = &self.task.action_states[action];
                let value = self.task.preconditions[precondition]
                    .eval
                    .evaluate(state, action_state);
                if value_eq(value, 0.0) {
                    applicable = false;
                    break;
                }
            }
            result.push(if applicable { action as i64 } else { -1 });
        }
        result
    }

    /// Maps actions with identical successor distributions onto the first
    /// surviving representative.
    fn prune_unreasonable(&mut self, state: &State, result: &mut [i64]) {
        let mut representatives: HashMap<PdStateKey, usize> = HashMap::new();
        for action in 0..result.len() {
            if result[action] != action as i64 {
                continue;
            }
            let pd = self.successor_pd(state, action);
            let key = self.task.pd_state_key(&pd);
            match representatives.get(&key) {
                Some(&representative) => result[action] = representative as i64,
                None => {
                    representatives.insert(key, action);
                }
            }
        }
    }

    /// The best reward obtainable in a final step: noop's reward when noop
    /// is provably optimal there, the maximum over applicable actions
    /// otherwise.
    pub fn optimal_final_reward(&mut self, state: &State) -> Reward {
        if self.task.noop_optimal_final_action {
            return self.calc_reward(state, 0);
        }
        let mut best = f64::NEG_INFINITY;
        for action in self.applicable_action_indices(state, true) {
            best = best.max(self.calc_reward(state, action));
        }
        best
    }

    /// The action attaining [`Self::optimal_final_reward`].
    pub fn optimal_final_action(&mut self, state: &State) -> usize {
        if self.task.noop_optimal_final_action {
            return 0;
        }
        let mut best = f64::NEG_INFINITY;
        let mut chosen = 0;
        for action in self.applicable_action_indices(state, true) {
            let reward = self.calc_reward(state, action);
            if reward > best {
                best = reward;
                chosen = action;
            }
        }
        chosen
    }

    /// Looks up a solved state value recorded by the deterministic search.
    pub fn cached_state_value(&self, state: &State) -> Option<Reward> {
        self.state_value_cache
            .get(&(state.remaining_steps, state.key_ignoring_steps()))
            .copied()
    }

    /// Records a solved state value.
    pub fn cache_state_value(&mut self, state: &State, value: Reward) {
        if self.state_value_caching_enabled {
            self.state_value_cache
                .insert((state.remaining_steps, state.key_ignoring_steps()), value);
        }
    }

    /// Learns from the training set whether reasonable-action pruning and
    /// reward-lock detection pay off on this task.
    pub fn learn(&mut self, training: &[State]) {
        let mut unreasonable_found = false;
        let mut lock_found = false;
        for state in training {
            let applicable = self.applicable_actions(state, true);
            if applicable
                .iter()
                .enumerate()
                .any(|(index, &entry)| entry != index as i64 && entry >= 0)
            {
                unreasonable_found = true;
            }
            if self.is_reward_lock(state) {
                lock_found = true;
            }
        }
        self.use_reasonable_action_pruning = unreasonable_found;
        self.use_reward_lock_detection = lock_found;
        log::info!(
            "reasonable action pruning {}",
            if unreasonable_found { "enabled" } else { "disabled" }
        );
        log::info!(
            "reward lock detection {}",
            if lock_found { "enabled" } else { "disabled" }
        );
    }

    /// Downgrades every map cache to lookup-only and stops recording
    /// applicable actions and state values. Called once when the resident
    /// memory crosses the configured limit.
    pub fn disable_caching(&mut self) {
        for cpf in &mut self.task.cpfs {
            cpf.eval.disable_caching();
        }
        self.task.reward.eval.disable_caching();
        for precondition in &mut self.task.preconditions {
            precondition.eval.disable_caching();
        }
        self.cache_applicable_actions = false;
        self.state_value_caching_enabled = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hzn_compile::testing::bernoulli_flipflop_task;
    use hzn_compile::testing::compiled_counter_task;
    use hzn_compile::preprocess;
    use rand::SeedableRng;

    fn rng() -> SmallRng {
        SmallRng::seed_from_u64(7)
    }

    #[test]
    fn deterministic_successor_applies_cpfs() {
        let mut mdp = Mdp::new(compiled_counter_task(3));
        let state = mdp.initial_state();
        // action 1 advances the first counter
        let (next, reward) = mdp.deterministic_transition(&state, 1);
        assert_eq!(reward, 0.0);
        assert_eq!(next.values.iter().sum::<f64>(), 1.0);
        assert_eq!(next.remaining_steps, state.remaining_steps - 1);
        assert!(next.hash_key.is_some());
    }

    #[test]
    fn sampling_respects_deterministic_variables() {
        let mut mdp = Mdp::new(compiled_counter_task(2));
        let state = mdp.initial_state();
        let next = mdp.sample_successor(&mut rng(), &state, 2);
        let expected = mdp.deterministic_successor(&state, 2);
        assert!(next.equals_ignoring_steps(&expected));
    }

    #[test]
    fn sampled_values_stay_in_domain() {
        let mut mdp = Mdp::new(preprocess(&bernoulli_flipflop_task(false)).unwrap());
        let mut rng = rng();
        let mut state = mdp.initial_state();
        for _ in 0..8 {
            let next = mdp.sample_successor(&mut rng, &state, 1);
            for (cpf, value) in mdp.task.cpfs.iter().zip(next.values.iter()) {
                assert!(cpf.domain.contains(*value));
            }
            if next.is_terminal() {
                break;
            }
            state = next;
        }
    }

    #[test]
    fn pruning_collapses_indistinguishable_actions() {
        // without an action-dependent reward, flipping and noop reach
        // different distributions, so nothing is pruned; the follower
        // variable keeps both actions distinguishable
        let mut mdp = Mdp::new(preprocess(&bernoulli_flipflop_task(false)).unwrap());
        let state = mdp.initial_state();
        let applicable = mdp.applicable_actions(&state, true);
        assert_eq!(applicable, vec![0, 1]);
    }

    #[test]
    fn pruning_is_disabled_for_positive_action_rewards() {
        let mut mdp = Mdp::new(preprocess(&bernoulli_flipflop_task(true)).unwrap());
        let state = mdp.initial_state();
        let applicable = mdp.applicable_actions(&state, true);
        // the reward pays for flipping; both actions must survive
        assert_eq!(applicable, vec![0, 1]);
    }

    #[test]
    fn unreferenced_action_is_unreasonable() {
        use hzn_compile::testing::tiny_counter_task;
        let mut schematic = tiny_counter_task(1);
        schematic.variables.push(hzn_task::VariableSchema {
            name: "wait".to_string(),
            params: Vec::new(),
            kind: hzn_task::VariableKind::ActionFluent,
            value_type: hzn_task::ValueType::Bool,
            default_value: 0.0,
            level: 0,
        });
        let mut mdp = Mdp::new(preprocess(&schematic).unwrap());
        let state = mdp.initial_state();
        let applicable = mdp.applicable_actions(&state, true);
        // `wait` reaches the same successor distribution as noop and maps
        // onto it; `advance` survives
        let noop_alias = applicable
            .iter()
            .enumerate()
            .filter(|&(index, &entry)| entry >= 0 && entry != index as i64)
            .count();
        assert_eq!(noop_alias, 1);
        assert_eq!(applicable.iter().filter(|&&e| e >= 0).count(), 3);
    }

    #[test]
    fn applicable_cache_round_trips() {
        let mut mdp = Mdp::new(compiled_counter_task(2));
        let state = mdp.initial_state();
        let first = mdp.applicable_actions(&state, false);
        let second = mdp.applicable_actions(&state, false);
        assert_eq!(first, second);
        assert_eq!(first.len(), mdp.num_actions());
    }

    #[test]
    fn optimal_final_reward_uses_noop_shortcut() {
        let mut mdp = Mdp::new(compiled_counter_task(2));
        assert!(mdp.task.noop_optimal_final_action);
        let state = mdp
            .task
            .state_from_values(vec![1.0, 0.0], 1);
        assert_eq!(mdp.optimal_final_reward(&state), 1.0);
        assert_eq!(mdp.optimal_final_action(&state), 0);
    }
}
