use crate::choose_uniformly;
use crate::CommonOptions;
use crate::Mdp;
use crate::SearchEngine;
use crate::TaskMode;
use crate::TimeoutPolicy;
use hzn_core::Reward;
use hzn_core::Timer;
use hzn_core::EXPLORATION_FALLBACK;
use hzn_core::NODE_POOL_LIMIT;
use hzn_core::POLICY_CACHE_BUCKETS;
use hzn_core::VISIT_DIFFERENCE_RATIO;
use hzn_task::State;
use hzn_task::StateKey;
use rand::rngs::SmallRng;
use rustc_hash::FxHashMap;

/// Index of a node in the pool; -1 marks an absent child.
type NodeId = i32;
const NO_NODE: NodeId = -1;

/// One search-tree node, shared between decision and chance roles.
///
/// Decision nodes keep one child slot per legal action; chance nodes chain
/// through one level per probabilistic state variable, each level indexed
/// by the sampled value's position in that variable's domain.
#[derive(Debug, Clone, Default)]
struct UctNode {
    children: Vec<NodeId>,
    accumulated_reward: Reward,
    visits: u32,
    children_visits: u32,
    reward_lock: bool,
    initialized: bool,
}

impl UctNode {
    fn reward_estimate(&self) -> Reward {
        self.accumulated_reward / self.visits as f64
    }
}

/// Fixed-budget node pool. A planning step resets the allocation head;
/// claimed nodes are zeroed on reuse, so a reused node is indistinguishable
/// from a fresh one.
#[derive(Debug, Default)]
struct NodePool {
    nodes: Vec<UctNode>,
    next: usize,
}

impl NodePool {
    fn reset(&mut self) {
        self.next = 0;
    }

    fn live(&self) -> usize {
        self.next
    }

    fn claim(&mut self) -> NodeId {
        if self.next == self.nodes.len() {
            self.nodes.push(UctNode::default());
        } else {
            let node = &mut self.nodes[self.next];
            node.children.clear();
            node.accumulated_reward = 0.0;
            node.visits = 0;
            node.children_visits = 0;
            node.reward_lock = false;
            node.initialized = false;
        }
        self.next += 1;
        (self.next - 1) as NodeId
    }

    fn at(&self, id: NodeId) -> &UctNode {
        &self.nodes[id as usize]
    }

    fn at_mut(&mut self, id: NodeId) -> &mut UctNode {
        &mut self.nodes[id as usize]
    }
}

/// Anytime trial-based tree search with UCB1 successor selection.
///
/// Decision nodes are initialized by a subordinate engine whose estimates
/// enter as visit-count priors; chance nodes resolve sampled successors
/// through a per-variable chain. A step ends on the configured timeout
/// policy or when the node pool nears capacity, and the root Q-vector is
/// cached across steps per remaining-steps bucket.
pub struct UctSearch {
    pool: NodePool,
    initializer: Box<dyn SearchEngine>,

    scale: f64,
    timeout_policy: TimeoutPolicy,
    timeout: f64,
    max_rollouts: usize,
    initial_visits: u32,
    visit_difference_selection: bool,
    task_mode: TaskMode,
    caching_enabled: bool,
    max_search_depth: usize,
    /// Initializer estimates already respect pruning when the task is
    /// pruning-equivalent to its determinization.
    prune_with_initialization: bool,

    policy_cache: Vec<FxHashMap<StateKey, Vec<Reward>>>,
    rollouts: usize,
}

impl UctSearch {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        mdp: &Mdp,
        common: CommonOptions,
        scale: f64,
        timeout_policy: TimeoutPolicy,
        timeout: f64,
        max_rollouts: usize,
        initial_visits: u32,
        initializer: Box<dyn SearchEngine>,
    ) -> Self {
        Self {
            pool: NodePool::default(),
            initializer,
            scale,
            timeout_policy,
            timeout,
            max_rollouts,
            initial_visits,
            visit_difference_selection: true,
            task_mode: common.task_mode.unwrap_or(TaskMode::Probabilistic),
            caching_enabled: common.caching,
            max_search_depth: common.max_search_depth.unwrap_or(mdp.horizon()),
            prune_with_initialization: mdp.task.pruning_equivalent_to_det,
            policy_cache: vec![FxHashMap::default(); POLICY_CACHE_BUCKETS],
            rollouts: 0,
        }
    }

    fn cache_bucket(remaining_steps: usize) -> usize {
        remaining_steps.min(POLICY_CACHE_BUCKETS - 1)
    }

    /// One trial from a decision node; returns the accumulated reward of
    /// the tail.
    fn rollout_decision(
        &mut self,
        mdp: &mut Mdp,
        rng: &mut SmallRng,
        node_id: NodeId,
        state: &State,
    ) -> Reward {
        if !self.pool.at(node_id).initialized {
            self.initialize_decision_node(mdp, rng, node_id, state);
        }

        let no_children = self
            .pool
            .at(node_id)
            .children
            .iter()
            .all(|&child| child == NO_NODE);
        let reward;
        if self.pool.at(node_id).reward_lock || no_children {
            // a lock keeps its reward for the remaining steps; a node
            // without applicable actions degenerates the same way
            reward = mdp.calc_reward(state, 0) * state.remaining_steps as f64;
        } else {
            let action = self.choose_decision_child(rng, node_id);
            let chance = self.pool.at(node_id).children[action];
            reward = self.rollout_chance(mdp, rng, chance, state, action);
        }

        let node = self.pool.at_mut(node_id);
        node.accumulated_reward += reward;
        node.visits += 1;
        node.children_visits += 1;
        reward
    }

    /// Samples the transition, resolves the successor through the chance
    /// chain, and continues the trial.
    fn rollout_chance(
        &mut self,
        mdp: &mut Mdp,
        rng: &mut SmallRng,
        node_id: NodeId,
        state: &State,
        action: usize,
    ) -> Reward {
        let (next, mut reward) = match self.task_mode {
            TaskMode::Probabilistic => mdp.sample_transition(rng, state, action),
            TaskMode::MostLikely => mdp.deterministic_transition(state, action),
        };

        if next.remaining_steps == 1 && mdp.task.noop_optimal_final_action {
            // the last decision is free: noop closes the trajectory
            reward += mdp.calc_reward(&next, 0);
        } else if next.remaining_steps > 0 {
            let successor = self.chance_successor(mdp, node_id, &next);
            reward += self.rollout_decision(mdp, rng, successor, &next);
        }

        let node = self.pool.at_mut(node_id);
        node.accumulated_reward += reward;
        node.visits += 1;
        reward
    }

    /// Walks the chance chain: level k branches on the sampled value of the
    /// k-th probabilistic variable, giving lookup linear in the number of
    /// probabilistic variables without a dictionary.
    fn chance_successor(&mut self, mdp: &Mdp, node_id: NodeId, next: &State) -> NodeId {
        let mut current = node_id;
        for var in mdp.task.first_probabilistic_index..mdp.task.state_size() {
            let domain = &mdp.task.cpfs[var].domain;
            let slot = domain.index_of(next.value(var)).unwrap_or(0);
            if self.pool.at(current).children.is_empty() {
                let width = domain.len();
                self.pool.at_mut(current).children = vec![NO_NODE; width];
            }
            if self.pool.at(current).children[slot] == NO_NODE {
                let child = self.pool.claim();
                self.pool.at_mut(current).children[slot] = child;
            }
            current = self.pool.at(current).children[slot];
        }
        current
    }

    /// First expansion of a decision node: reward-lock check, one child
    /// slot per action, initializer estimates injected as visit priors.
    fn initialize_decision_node(
        &mut self,
        mdp: &mut Mdp,
        rng: &mut SmallRng,
        node_id: NodeId,
        state: &State,
    ) {
        self.pool.at_mut(node_id).initialized = true;
        if mdp.is_reward_lock(state) {
            self.pool.at_mut(node_id).reward_lock = true;
            return;
        }

        self.pool.at_mut(node_id).children = vec![NO_NODE; mdp.num_actions()];
        let estimates =
            self.initializer
                .estimate_q_values(mdp, rng, state, self.prune_with_initialization);

        if self.prune_with_initialization {
            for (action, &estimate) in estimates.iter().enumerate() {
                if estimate.is_finite() {
                    self.initialize_decision_child(node_id, action, state, estimate);
                }
            }
        } else {
            let applicable = mdp.applicable_actions(state, true);
            for (action, &entry) in applicable.iter().enumerate() {
                if entry == action as i64 {
                    self.initialize_decision_child(node_id, action, state, estimates[action]);
                }
            }
        }
    }

    fn initialize_decision_child(
        &mut self,
        node_id: NodeId,
        action: usize,
        state: &State,
        estimate: Reward,
    ) {
        // the child doubles as the decision node of the successor state on
        // fully deterministic tasks, so it stays uninitialized here
        let child = self.pool.claim();
        {
            let child_node = self.pool.at_mut(child);
            child_node.visits = self.initial_visits;
            child_node.accumulated_reward =
                self.initial_visits as f64 * state.remaining_steps as f64 * estimate;
        }
        let parent = self.pool.at_mut(node_id);
        parent.children[action] = child;
        parent.children_visits += self.initial_visits;
    }

    /// Three-stage successor selection: unvisited children first, then the
    /// least-visited ones when visit counts diverge too far, then UCB1.
    fn choose_decision_child(&mut self, rng: &mut SmallRng, node_id: NodeId) -> usize {
        let mut candidates = self.unvisited_children(node_id);
        if candidates.is_empty() && self.visit_difference_selection {
            candidates = self.children_by_visit_difference(node_id);
        }
        if candidates.is_empty() {
            candidates = self.children_by_ucb(node_id);
        }
        debug_assert!(!candidates.is_empty());
        choose_uniformly(rng, &candidates)
    }

    fn unvisited_children(&self, node_id: NodeId) -> Vec<usize> {
        let node = self.pool.at(node_id);
        node.children
            .iter()
            .enumerate()
            .filter(|&(_, &child)| child != NO_NODE && self.pool.at(child).visits == 0)
            .map(|(action, _)| action)
            .collect()
    }

    /// The least-visited children, when the most-visited child has more
    /// than [`VISIT_DIFFERENCE_RATIO`] times their visits.
    fn children_by_visit_difference(&self, node_id: NodeId) -> Vec<usize> {
        let node = self.pool.at(node_id);
        let mut smallest = u32::MAX;
        let mut highest = 0;
        let mut candidates: Vec<usize> = Vec::new();
        for (action, &child) in node.children.iter().enumerate() {
            if child == NO_NODE {
                continue;
            }
            let visits = self.pool.at(child).visits;
            if visits < smallest {
                candidates.clear();
                candidates.push(action);
                smallest = visits;
            } else if visits == smallest {
                candidates.push(action);
            }
            highest = highest.max(visits);
        }
        if VISIT_DIFFERENCE_RATIO * smallest >= highest {
            candidates.clear();
        }
        candidates
    }

    /// UCB1: `Q̂(c) + k·sqrt(ln(parent children visits) / visits(c))` with
    /// `k` proportional to the parent's absolute reward estimate.
    fn children_by_ucb(&self, node_id: NodeId) -> Vec<usize> {
        let node = self.pool.at(node_id);
        let exploration = if node.visits == 0 {
            0.0
        } else {
            let magnitude = self.scale * node.reward_estimate().abs();
            if hzn_core::value_eq(magnitude, 0.0) {
                EXPLORATION_FALLBACK
            } else {
                magnitude
            }
        };

        debug_assert!(node.children_visits > 0);
        let visits_log = (node.children_visits as f64).ln();

        let mut best = f64::NEG_INFINITY;
        let mut candidates: Vec<usize> = Vec::new();
        for (action, &child) in node.children.iter().enumerate() {
            if child == NO_NODE {
                continue;
            }
            let child_node = self.pool.at(child);
            let exploration_part =
                exploration * (visits_log / child_node.visits as f64).sqrt();
            let value = child_node.reward_estimate() + exploration_part;
            if hzn_core::value_gt(value, best) {
                candidates.clear();
                candidates.push(action);
                best = value;
            } else if hzn_core::value_eq(value, best) {
                candidates.push(action);
            }
        }
        candidates
    }

    /// The unique reasonable action of the root, if any: locks fall back to
    /// the first action, a single surviving child skips the search.
    fn unique_root_policy(&self, root: NodeId) -> Option<usize> {
        let node = self.pool.at(root);
        if node.reward_lock {
            log::info!("root state is a reward lock");
            return Some(0);
        }
        let mut survivors = node
            .children
            .iter()
            .enumerate()
            .filter(|&(_, &child)| child != NO_NODE)
            .map(|(action, _)| action);
        match (survivors.next(), survivors.next()) {
            (Some(action), None) => {
                log::info!("only one reasonable action at the root");
                Some(action)
            }
            _ => None,
        }
    }
}

impl SearchEngine for UctSearch {
    fn name(&self) -> &'static str {
        "UCT"
    }

    fn estimate_q_values(
        &mut self,
        mdp: &mut Mdp,
        rng: &mut SmallRng,
        state: &State,
        _prune: bool,
    ) -> Vec<Reward> {
        let mut root_state = state.clone();
        root_state.remaining_steps = state.remaining_steps.min(self.max_search_depth);

        let bucket = Self::cache_bucket(root_state.remaining_steps);
        if self.caching_enabled {
            if let Some(cached) = self.policy_cache[bucket].get(&root_state.key_ignoring_steps())
            {
                log::debug!("{}: reusing cached policy", self.name());
                return cached.clone();
            }
        }

        self.pool.reset();
        self.rollouts = 0;
        let root = self.pool.claim();
        self.initialize_decision_node(mdp, rng, root, &root_state);

        if let Some(action) = self.unique_root_policy(root) {
            let mut estimates = vec![f64::NEG_INFINITY; mdp.num_actions()];
            estimates[action] = 0.0;
            return estimates;
        }

        let timer = Timer::start();
        loop {
            let exhausted = match self.timeout_policy {
                TimeoutPolicy::Time => timer.elapsed() >= self.timeout,
                TimeoutPolicy::Rollouts => self.rollouts >= self.max_rollouts,
                TimeoutPolicy::TimeAndRollouts => {
                    timer.elapsed() >= self.timeout || self.rollouts >= self.max_rollouts
                }
            };
            if exhausted || self.pool.live() >= NODE_POOL_LIMIT {
                break;
            }
            self.rollout_decision(mdp, rng, root, &root_state);
            self.rollouts += 1;
        }
        log::debug!(
            "{}: {} rollouts, {} nodes",
            self.name(),
            self.rollouts,
            self.pool.live()
        );

        // per-step averages make results comparable across horizons
        let node = self.pool.at(root);
        let estimates: Vec<Reward> = node
            .children
            .iter()
            .map(|&child| {
                if child == NO_NODE {
                    f64::NEG_INFINITY
                } else {
                    self.pool.at(child).reward_estimate() / root_state.remaining_steps as f64
                }
            })
            .collect();

        if self.caching_enabled {
            self.policy_cache[bucket].insert(root_state.key_ignoring_steps(), estimates.clone());
        }
        estimates
    }

    fn learn(&mut self, mdp: &mut Mdp, rng: &mut SmallRng, training: &[State]) {
        log::info!("{}: learning...", self.name());
        self.initializer.learn(mdp, rng, training);
        if self.initializer.max_search_depth() <= 2 {
            log::info!("initialization aborted: learned search depth is too low");
            self.initializer = Box::new(crate::RandomSearch::new(
                mdp,
                CommonOptions::default(),
            ));
            self.initial_visits = 0;
        }
        log::info!("{}: ...finished", self.name());
    }

    fn set_caching_enabled(&mut self, enabled: bool) {
        self.caching_enabled = enabled;
        self.initializer.set_caching_enabled(enabled);
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
    use crate::EngineSpec;
    use hzn_compile::preprocess;
    use hzn_compile::testing::bernoulli_flipflop_task;
    use hzn_compile::testing::compiled_counter_task;
    use rand::SeedableRng;

    fn uct(mdp: &Mdp, spec: &str) -> Box<dyn SearchEngine> {
        EngineSpec::parse(spec).unwrap().build(mdp)
    }

    #[test]
    fn node_pool_reuse_is_indistinguishable_from_fresh() {
        let mut pool = NodePool::default();
        let id = pool.claim();
        {
            let node = pool.at_mut(id);
            node.accumulated_reward = 4.0;
            node.visits = 2;
            node.children_visits = 2;
            node.children = vec![3];
            node.reward_lock = true;
            node.initialized = true;
        }
        pool.reset();
        let reused = pool.claim();
        assert_eq!(reused, id);
        let node = pool.at(reused);
        assert_eq!(node.accumulated_reward, 0.0);
        assert_eq!(node.visits, 0);
        assert_eq!(node.children_visits, 0);
        assert!(node.children.is_empty());
        assert!(!node.reward_lock);
        assert!(!node.initialized);
    }

    #[test]
    fn rollout_cap_terminates_the_search() {
        let mut mdp = Mdp::new(compiled_counter_task(2));
        let mut engine = uct(&mdp, "[UCT -T ROLLOUTS -r 64 -i [IDS]]");
        let mut rng = SmallRng::seed_from_u64(3);
        let state = mdp.initial_state();
        let estimates = engine.estimate_q_values(&mut mdp, &mut rng, &state, true);
        assert_eq!(estimates.len(), mdp.num_actions());
        assert!(estimates.iter().any(|q| q.is_finite()));
    }

    #[test]
    fn returned_actions_are_applicable() {
        let mut mdp = Mdp::new(preprocess(&bernoulli_flipflop_task(true)).unwrap());
        let mut engine = uct(&mdp, "[UCT -T ROLLOUTS -r 128 -i [RAND]]");
        let mut rng = SmallRng::seed_from_u64(5);
        let state = mdp.initial_state();
        let best = engine.estimate_best_actions(&mut mdp, &mut rng, &state);
        assert!(!best.is_empty());
        let applicable = mdp.applicable_action_indices(&state, true);
        for action in best {
            assert!(applicable.contains(&action));
        }
    }

    #[test]
    fn time_budget_is_respected() {
        let mut mdp = Mdp::new(compiled_counter_task(3));
        let mut engine = uct(&mdp, "[UCT -t 0.05 -i [RAND]]");
        let mut rng = SmallRng::seed_from_u64(1);
        let state = mdp.initial_state();
        let timer = Timer::start();
        engine.estimate_q_values(&mut mdp, &mut rng, &state, true);
        // the budget plus one rollout's worth of slack
        assert!(timer.elapsed() < 1.0);
    }

    #[test]
    fn policy_cache_reuses_root_estimates() {
        let mut mdp = Mdp::new(compiled_counter_task(2));
        let mut engine = uct(&mdp, "[UCT -T ROLLOUTS -r 32 -i [IDS]]");
        let mut rng = SmallRng::seed_from_u64(9);
        let state = mdp.initial_state();
        let first = engine.estimate_q_values(&mut mdp, &mut rng, &state, true);
        let second = engine.estimate_q_values(&mut mdp, &mut rng, &state, true);
        assert_eq!(first, second);
    }
}
