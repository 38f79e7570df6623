use crate::ActionState;
use crate::DiscretePd;
use crate::ExprInfo;
use crate::ExprRef;
use crate::KleeneState;
use crate::State;
use crate::ValueSet;
use hzn_core::HashKey;
use hzn_core::Value;
use rustc_hash::FxHashMap;
use serde::Deserialize;
use serde::Serialize;
use std::collections::BTreeSet;

/// How an evaluatable memoises results for one evaluation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CachingType {
    /// Too many variables influence the formula; nothing is cached.
    None,
    /// Dense cache indexed by the state-fluent hash key.
    Vector,
    /// Sparse cache for large key spaces.
    Map,
    /// A map whose lookups still serve hits but misses are no longer
    /// recorded (after caching was disabled under memory pressure).
    DisabledMap,
}

/// A formula compiled for repeated evaluation: a CPF body, the reward, or a
/// dynamic precondition.
///
/// Carries the probabilistic formula and its most-likely determinization,
/// the dependency sets gathered by [`Expr::collect_info`], the hash-key
/// machinery of the compiler, and one cache per evaluation mode. Evaluation
/// dispatches on the caching type; the cache key is
/// `state.fluent_hash_key(hash_index) + action_hash_keys[action.index]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evaluatable {
    pub name: String,
    pub formula: ExprRef,
    /// Equals `formula` when the evaluatable is deterministic.
    pub determinized: ExprRef,

    pub is_probabilistic: bool,
    pub has_arithmetic: bool,
    pub dependent_state_fluents: BTreeSet<usize>,
    pub positive_action_dependencies: BTreeSet<usize>,
    pub negative_action_dependencies: BTreeSet<usize>,

    /// Slot of this evaluatable in every state's fluent-hash-key vector.
    pub hash_index: usize,
    pub caching: CachingType,
    pub kleene_caching: CachingType,
    /// Dense cache sizes chosen by the compiler (when `Vector`).
    pub cache_size: HashKey,
    pub kleene_cache_size: HashKey,
    /// Hash-key contribution of each legal action, by action index.
    pub action_hash_keys: Vec<HashKey>,

    #[serde(skip)]
    cache_vector: Vec<Value>,
    #[serde(skip)]
    cache_map: FxHashMap<HashKey, Value>,
    #[serde(skip)]
    pd_cache_vector: Vec<DiscretePd>,
    #[serde(skip)]
    pd_cache_map: FxHashMap<HashKey, DiscretePd>,
    #[serde(skip)]
    kleene_cache_vector: Vec<ValueSet>,
    #[serde(skip)]
    kleene_cache_map: FxHashMap<HashKey, ValueSet>,
}

impl Evaluatable {
    pub fn new(name: String, formula: ExprRef) -> Self {
        let mut info = ExprInfo::default();
        formula.collect_info(&mut info);
        Self {
            name,
            determinized: formula.clone(),
            formula,
            is_probabilistic: info.is_probabilistic,
            has_arithmetic: info.has_arithmetic,
            dependent_state_fluents: info.state_fluents,
            positive_action_dependencies: BTreeSet::new(),
            negative_action_dependencies: BTreeSet::new(),
            hash_index: 0,
            caching: CachingType::None,
            kleene_caching: CachingType::None,
            cache_size: 0,
            kleene_cache_size: 0,
            action_hash_keys: Vec::new(),
            cache_vector: Vec::new(),
            cache_map: FxHashMap::default(),
            pd_cache_vector: Vec::new(),
            pd_cache_map: FxHashMap::default(),
            kleene_cache_vector: Vec::new(),
            kleene_cache_map: FxHashMap::default(),
        }
    }

    /// Re-runs dependency analysis, e.g. after the formula was simplified
    /// or determinized.
    pub fn refresh_info(&mut self) {
        let mut info = ExprInfo::default();
        self.formula.collect_info(&mut info);
        self.is_probabilistic = info.is_probabilistic;
        self.has_arithmetic = info.has_arithmetic;
        self.dependent_state_fluents = info.state_fluents;
        let mut positive = BTreeSet::new();
        let mut negative = BTreeSet::new();
        self.formula.classify_action_fluents(&mut positive, &mut negative);
        self.positive_action_dependencies = positive;
        self.negative_action_dependencies = negative;
    }

    pub fn depends_on_action_fluent(&self, index: usize) -> bool {
        self.positive_action_dependencies.contains(&index)
            || self.negative_action_dependencies.contains(&index)
    }

    pub fn is_action_independent(&self) -> bool {
        self.positive_action_dependencies.is_empty()
            && self.negative_action_dependencies.is_empty()
    }

    pub fn has_positive_action_dependencies(&self) -> bool {
        !self.positive_action_dependencies.is_empty()
    }

    pub fn depends_on_state(&self) -> bool {
        !self.dependent_state_fluents.is_empty()
    }

    /// Allocates the dense caches chosen by the compiler. Called once after
    /// hash-key assignment and again after loading a persisted task.
    pub fn allocate_caches(&mut self) {
        if self.caching == CachingType::Vector {
            self.cache_vector = vec![f64::NEG_INFINITY; self.cache_size as usize];
            if self.is_probabilistic {
                self.pd_cache_vector = vec![DiscretePd::undefined(); self.cache_size as usize];
            }
        }
        if self.kleene_caching == CachingType::Vector {
            self.kleene_cache_vector = vec![ValueSet::new(); self.kleene_cache_size as usize];
        }
    }

    /// Dense vectors keep their reserved space; map caches stop recording.
    pub fn disable_caching(&mut self) {
        if self.caching == CachingType::Map {
            self.caching = CachingType::DisabledMap;
        }
        if self.kleene_caching == CachingType::Map {
            self.kleene_caching = CachingType::DisabledMap;
        }
    }

    fn state_hash_key(&self, current: &State, action: &ActionState) -> HashKey {
        current.fluent_hash_key(self.hash_index) + self.action_hash_keys[action.index]
    }

    fn kleene_hash_key(&self, current: &KleeneState, action: &ActionState) -> HashKey {
        current.fluent_hash_key(self.hash_index) + self.action_hash_keys[action.index]
    }

    /// Evaluates the determinized formula (the original one when this
    /// evaluatable is deterministic).
    pub fn evaluate(&mut self, current: &State, action: &ActionState) -> Value {
        match self.caching {
            CachingType::None => self.determinized.evaluate(current, action),
            CachingType::Vector => {
                let key = self.state_hash_key(current, action) as usize;
                if hzn_core::value_is_minus_infinity(self.cache_vector[key]) {
                    self.cache_vector[key] = self.determinized.evaluate(current, action);
                }
                self.cache_vector[key]
            }
            CachingType::Map => {
                let key = self.state_hash_key(current, action);
                if let Some(&cached) = self.cache_map.get(&key) {
                    return cached;
                }
                let result = self.determinized.evaluate(current, action);
                self.cache_map.insert(key, result);
                result
            }
            CachingType::DisabledMap => {
                let key = self.state_hash_key(current, action);
                match self.cache_map.get(&key) {
                    Some(&cached) => cached,
                    None => self.determinized.evaluate(current, action),
                }
            }
        }
    }

    /// Evaluates the probabilistic formula into a distribution; a
    /// deterministic evaluatable yields the point mass of [`Self::evaluate`].
    pub fn evaluate_to_pd(&mut self, current: &State, action: &ActionState) -> DiscretePd {
        if !self.is_probabilistic {
            return DiscretePd::dirac(self.evaluate(current, action));
        }
        match self.caching {
            CachingType::None => self.formula.evaluate_to_pd(current, action),
            CachingType::Vector => {
                let key = self.state_hash_key(current, action) as usize;
                if self.pd_cache_vector[key].is_undefined() {
                    self.pd_cache_vector[key] = self.formula.evaluate_to_pd(current, action);
                }
                self.pd_cache_vector[key].clone()
            }
            CachingType::Map => {
                let key = self.state_hash_key(current, action);
                if let Some(cached) = self.pd_cache_map.get(&key) {
                    return cached.clone();
                }
                let result = self.formula.evaluate_to_pd(current, action);
                self.pd_cache_map.insert(key, result.clone());
                result
            }
            CachingType::DisabledMap => {
                let key = self.state_hash_key(current, action);
                match self.pd_cache_map.get(&key) {
                    Some(cached) => cached.clone(),
                    None => self.formula.evaluate_to_pd(current, action),
                }
            }
        }
    }

    /// Three-valued evaluation of the probabilistic formula.
    pub fn evaluate_to_kleene(&mut self, current: &KleeneState, action: &ActionState) -> ValueSet {
        match self.kleene_caching {
            CachingType::None => self.formula.evaluate_to_kleene(current, action),
            CachingType::Vector => {
                let key = self.kleene_hash_key(current, action) as usize;
                if self.kleene_cache_vector[key].is_empty() {
                    self.kleene_cache_vector[key] =
                        self.formula.evaluate_to_kleene(current, action);
                }
                self.kleene_cache_vector[key].clone()
            }
            CachingType::Map => {
                let key = self.kleene_hash_key(current, action);
                if let Some(cached) = self.kleene_cache_map.get(&key) {
                    return cached.clone();
                }
                let result = self.formula.evaluate_to_kleene(current, action);
                self.kleene_cache_map.insert(key, result.clone());
                result
            }
            CachingType::DisabledMap => {
                let key = self.kleene_hash_key(current, action);
                match self.kleene_cache_map.get(&key) {
                    Some(cached) => cached.clone(),
                    None => self.formula.evaluate_to_kleene(current, action),
                }
            }
        }
    }
}

/// The conditional probability function of one ground state variable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cpf {
    pub eval: Evaluatable,
    /// Index of the head variable in the state-variable ordering.
    pub head_index: usize,
    pub initial_value: Value,
    /// The finite set of values this CPF can produce.
    pub domain: ValueSet,
    /// Number of non-empty subsets of the domain, `2^|D| − 1`; `None` when
    /// that count overflows the machine word.
    pub kleene_domain_size: Option<u64>,
    /// Full-state hash base (0 while state hashing is impossible).
    pub hash_key_base: HashKey,
    /// Kleene-state hash base (0 while Kleene hashing is impossible).
    pub kleene_hash_key_base: HashKey,
    /// Probability-distribution hashing of this variable: the possible
    /// truth probabilities and the assigned base. Present only on tasks
    /// where PD hashing is possible.
    pub pd_hash: Option<PdHashInfo>,
}

/// Hash metadata of one variable for states-as-probability-distributions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PdHashInfo {
    pub base: HashKey,
    pub probability_domain: ValueSet,
}

impl Cpf {
    pub fn new(head_index: usize, initial_value: Value, name: String, formula: ExprRef) -> Self {
        Self {
            eval: Evaluatable::new(name, formula),
            head_index,
            initial_value,
            domain: ValueSet::new(),
            kleene_domain_size: None,
            hash_key_base: 0,
            kleene_hash_key_base: 0,
            pd_hash: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.eval.name
    }

    pub fn domain_size(&self) -> usize {
        self.domain.len()
    }

    /// Builds the determinized mirror formula and simplifies it once more.
    pub fn determinize(&mut self) {
        if self.eval.is_probabilistic {
            let determinized = self.eval.formula.determinize_most_likely();
            self.eval.determinized = determinized.simplify(&crate::Simplifications::default());
        }
    }
}

/// The reward pseudo-fluent: an evaluatable plus the value domain that
/// yields the reward extrema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardFunction {
    pub eval: Evaluatable,
    pub domain: ValueSet,
}

impl RewardFunction {
    pub fn new(formula: ExprRef) -> Self {
        Self {
            eval: Evaluatable::new("reward".to_string(), formula),
            domain: ValueSet::new(),
        }
    }

    pub fn min_value(&self) -> Value {
        self.domain.min()
    }

    pub fn max_value(&self) -> Value {
        self.domain.max()
    }

    /// Sound precondition of reasonable-action pruning and of the noop
    /// final-action shortcut.
    pub fn does_not_depend_positively_on_actions(&self) -> bool {
        self.eval.positive_action_dependencies.is_empty()
    }
}

/// A dynamic precondition attached to the action states that mention it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Precondition {
    pub eval: Evaluatable,
    /// Position within the dynamic-precondition list.
    pub index: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Expr;
    use std::rc::Rc;

    fn noop() -> ActionState {
        let mut action = ActionState::new(0);
        action.index = 0;
        action.refresh_scheduled();
        action
    }

    fn counted_eval() -> Evaluatable {
        // s0 + 1
        let formula = Rc::new(Expr::Addition(vec![
            Expr::state_fluent(0),
            Expr::constant(1.0),
        ]));
        let mut eval = Evaluatable::new("test".to_string(), formula);
        eval.action_hash_keys = vec![0];
        eval
    }

    #[test]
    fn vector_cache_round_trips() {
        let mut eval = counted_eval();
        eval.caching = CachingType::Vector;
        eval.cache_size = 4;
        eval.allocate_caches();

        let mut state = State::new(1, 1, 1);
        state.values[0] = 2.0;
        state.fluent_hash_keys[0] = 2;
        let first = eval.evaluate(&state, &noop());
        let second = eval.evaluate(&state, &noop());
        assert_eq!(first, 3.0);
        assert_eq!(second, 3.0);
    }

    #[test]
    fn map_cache_stops_recording_when_disabled() {
        let mut eval = counted_eval();
        eval.caching = CachingType::Map;

        let mut state = State::new(1, 1, 1);
        state.values[0] = 1.0;
        state.fluent_hash_keys[0] = 1;
        assert_eq!(eval.evaluate(&state, &noop()), 2.0);
        assert_eq!(eval.cache_map.len(), 1);

        eval.disable_caching();
        assert_eq!(eval.caching, CachingType::DisabledMap);
        let mut other = State::new(1, 1, 1);
        other.values[0] = 3.0;
        other.fluent_hash_keys[0] = 3;
        assert_eq!(eval.evaluate(&other, &noop()), 4.0);
        // the miss was not recorded
        assert_eq!(eval.cache_map.len(), 1);
        // hits still serve
        assert_eq!(eval.evaluate(&state, &noop()), 2.0);
    }

    #[test]
    fn cached_values_match_fresh_evaluation() {
        let mut cached = counted_eval();
        cached.caching = CachingType::Map;
        let mut fresh = counted_eval();
        fresh.caching = CachingType::None;

        for value in 0..4 {
            let mut state = State::new(1, 1, 1);
            state.values[0] = value as f64;
            state.fluent_hash_keys[0] = value;
            assert_eq!(
                cached.evaluate(&state, &noop()),
                fresh.evaluate(&state, &noop())
            );
        }
    }

    #[test]
    fn deterministic_pd_is_a_point_mass() {
        let mut eval = counted_eval();
        let mut state = State::new(1, 1, 1);
        state.values[0] = 1.0;
        let pd = eval.evaluate_to_pd(&state, &noop());
        assert!(pd.is_deterministic());
        assert_eq!(pd.value(), 2.0);
    }
}
