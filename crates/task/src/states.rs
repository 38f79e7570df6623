use crate::DiscretePd;
use crate::ValueSet;
use hzn_core::value_eq;
use hzn_core::HashKey;
use hzn_core::Value;
use serde::Deserialize;
use serde::Serialize;

/// A concrete state: one value per ground state variable, the number of
/// decision steps left, and the hashing side-band.
///
/// `fluent_hash_keys` carries one slot per evaluatable hash index — the
/// partial hash contribution of exactly the variables that evaluatable
/// reads. `hash_key` is the full-state hash, present only while the state
/// hashing system is marked possible.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct State {
    pub values: Vec<Value>,
    pub remaining_steps: usize,
    pub fluent_hash_keys: Vec<HashKey>,
    pub hash_key: Option<HashKey>,
}

impl State {
    pub fn new(size: usize, remaining_steps: usize, key_count: usize) -> Self {
        Self {
            values: vec![0.0; size],
            remaining_steps,
            fluent_hash_keys: vec![0; key_count],
            hash_key: None,
        }
    }

    pub fn from_values(values: Vec<Value>, remaining_steps: usize, key_count: usize) -> Self {
        Self {
            values,
            remaining_steps,
            fluent_hash_keys: vec![0; key_count],
            hash_key: None,
        }
    }

    pub fn value(&self, index: usize) -> Value {
        self.values[index]
    }

    pub fn is_terminal(&self) -> bool {
        self.remaining_steps == 0
    }

    pub fn fluent_hash_key(&self, hash_index: usize) -> HashKey {
        self.fluent_hash_keys[hash_index]
    }

    /// Value-wise equality that ignores the horizon; prefers the hash keys
    /// when both sides carry one.
    pub fn equals_ignoring_steps(&self, other: &State) -> bool {
        if let (Some(lhs), Some(rhs)) = (self.hash_key, other.hash_key) {
            return lhs == rhs;
        }
        self.values
            .iter()
            .zip(other.values.iter())
            .all(|(a, b)| value_eq(*a, *b))
    }

    /// Stable map key over the variable assignment only; callers that need
    /// the horizon pair it with `remaining_steps`.
    pub fn key_ignoring_steps(&self) -> StateKey {
        StateKey(self.values.iter().map(|v| v.to_bits()).collect())
    }
}

/// Bit-exact map key of a state's variable assignment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateKey(Vec<u64>);

/// A three-valued abstraction of a state: each variable holds the set of
/// values it could take. Used for sound over-approximation in reward-lock
/// detection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KleeneState {
    pub values: Vec<ValueSet>,
    pub fluent_hash_keys: Vec<HashKey>,
    pub hash_key: Option<HashKey>,
}

impl KleeneState {
    pub fn new(size: usize, key_count: usize) -> Self {
        Self {
            values: vec![ValueSet::new(); size],
            fluent_hash_keys: vec![0; key_count],
            hash_key: None,
        }
    }

    /// Lifts a concrete state into singleton cells.
    pub fn from_state(state: &State) -> Self {
        Self {
            values: state.values.iter().map(|&v| ValueSet::singleton(v)).collect(),
            fluent_hash_keys: vec![0; state.fluent_hash_keys.len()],
            hash_key: None,
        }
    }

    pub fn fluent_hash_key(&self, hash_index: usize) -> HashKey {
        self.fluent_hash_keys[hash_index]
    }

    /// Variable-wise set union; invalidates the hash.
    pub fn merge(&mut self, other: &KleeneState) {
        debug_assert_eq!(self.values.len(), other.values.len());
        for (cell, incoming) in self.values.iter_mut().zip(other.values.iter()) {
            cell.merge(incoming);
        }
        self.hash_key = None;
    }

    /// Cell-wise equality that ignores the hashing side-band unless both
    /// sides carry a hash key.
    pub fn equals(&self, other: &KleeneState) -> bool {
        if let (Some(lhs), Some(rhs)) = (self.hash_key, other.hash_key) {
            return lhs == rhs;
        }
        self.values == other.values
    }

    /// The numeric encoding of one Kleene cell: `(Σ_{v∈K} 2^⌊v⌋) − 1`.
    /// Values past the word width contribute nothing; hashing of such
    /// variables is marked impossible anyway.
    pub fn cell_encoding(cell: &ValueSet) -> HashKey {
        let mut bits: HashKey = 0;
        for &value in cell.iter() {
            bits |= 1u64.checked_shl(value.floor() as u32).unwrap_or(0);
        }
        bits.saturating_sub(1)
    }
}

/// A state in which every variable holds a discrete probability
/// distribution over its domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdState {
    pub values: Vec<DiscretePd>,
    pub remaining_steps: usize,
}

impl PdState {
    pub fn new(size: usize, remaining_steps: usize) -> Self {
        Self {
            values: vec![DiscretePd::undefined(); size],
            remaining_steps,
        }
    }

    /// Bit-exact structural key over all per-variable distributions.
    pub fn structural_key(&self) -> Vec<u64> {
        let mut key = Vec::with_capacity(self.values.len() * 4);
        for pd in &self.values {
            pd.structural_key(&mut key);
        }
        key
    }
}

/// A ground action: a bit-vector over the action fluents, its stable index
/// into the legal-action enumeration, the cached scheduled (true) fluents,
/// and the dynamic preconditions that mention any of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionState {
    pub values: Vec<bool>,
    pub index: usize,
    pub scheduled: Vec<usize>,
    pub relevant_preconditions: Vec<usize>,
}

impl ActionState {
    pub fn new(size: usize) -> Self {
        Self {
            values: vec![false; size],
            index: usize::MAX,
            scheduled: Vec::new(),
            relevant_preconditions: Vec::new(),
        }
    }

    pub fn value(&self, index: usize) -> Value {
        if self.values[index] {
            1.0
        } else {
            0.0
        }
    }

    /// True for the all-false noop action.
    pub fn is_noop(&self) -> bool {
        self.scheduled.is_empty()
    }

    /// Recomputes the scheduled-fluent cache from the bit-vector.
    pub fn refresh_scheduled(&mut self) {
        self.scheduled = self
            .values
            .iter()
            .enumerate()
            .filter(|&(_, &set)| set)
            .map(|(i, _)| i)
            .collect();
    }

    /// Stable enumeration order: fewer scheduled fluents first, then
    /// lexicographic on the bit-vector.
    pub fn enumeration_key(&self) -> (usize, Vec<bool>) {
        (self.values.iter().filter(|&&b| b).count(), self.values.clone())
    }

    /// The names of the scheduled fluents — the wire format of an action.
    pub fn scheduled_names(&self, fluents: &[crate::ActionFluent]) -> Vec<String> {
        self.scheduled
            .iter()
            .map(|&i| fluents[i].name.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_keys_ignore_steps() {
        let a = State::from_values(vec![0.0, 1.0], 5, 0);
        let b = State::from_values(vec![0.0, 1.0], 3, 0);
        let c = State::from_values(vec![1.0, 1.0], 5, 0);
        assert_eq!(a.key_ignoring_steps(), b.key_ignoring_steps());
        assert_ne!(a.key_ignoring_steps(), c.key_ignoring_steps());
        assert!(a.equals_ignoring_steps(&b));
    }

    #[test]
    fn kleene_merge_is_setwise_union() {
        let s = State::from_values(vec![0.0, 1.0], 1, 0);
        let t = State::from_values(vec![1.0, 1.0], 1, 0);
        let mut ks = KleeneState::from_state(&s);
        ks.merge(&KleeneState::from_state(&t));
        assert_eq!(ks.values[0], ValueSet::boolean());
        assert_eq!(ks.values[1], ValueSet::singleton(1.0));
    }

    #[test]
    fn kleene_cell_encoding() {
        assert_eq!(KleeneState::cell_encoding(&ValueSet::singleton(0.0)), 0);
        assert_eq!(KleeneState::cell_encoding(&ValueSet::singleton(1.0)), 1);
        assert_eq!(KleeneState::cell_encoding(&ValueSet::boolean()), 2);
    }

    #[test]
    fn action_enumeration_order() {
        let mut noop = ActionState::new(2);
        noop.refresh_scheduled();
        let mut second = ActionState::new(2);
        second.values[1] = true;
        second.refresh_scheduled();
        let mut both = ActionState::new(2);
        both.values.fill(true);
        both.refresh_scheduled();
        let mut all = vec![both.clone(), second.clone(), noop.clone()];
        all.sort_by_key(|a| a.enumeration_key());
        assert!(all[0].is_noop());
        assert_eq!(all[1], second);
        assert_eq!(all[2], both);
    }
}
