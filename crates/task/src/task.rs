use crate::ActionFluent;
use crate::ActionState;
use crate::Cpf;
use crate::CpfSchema;
use crate::ExprRef;
use crate::KleeneState;
use crate::PdState;
use crate::Precondition;
use crate::RewardFunction;
use crate::State;
use crate::VariableSchema;
use hzn_core::HashKey;
use hzn_core::Value;
use serde::Deserialize;
use serde::Serialize;
use std::collections::BTreeMap;

/// A type declaration of the schematic input; chains to the `object` root
/// when no supertype is given.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeDecl {
    pub name: String,
    pub super_type: Option<String>,
}

/// An object declaration of the schematic input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectDecl {
    pub name: String,
    pub object_type: String,
}

/// The parser contract: everything the core needs from the surface syntax,
/// as one serde document.
///
/// The external tokeniser (or a test builder) produces this; grounding
/// turns it into a [`GroundTask`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchematicTask {
    pub types: Vec<TypeDecl>,
    pub objects: Vec<ObjectDecl>,
    pub variables: Vec<VariableSchema>,
    pub cpfs: Vec<CpfSchema>,
    pub reward: ExprRef,
    pub preconditions: Vec<ExprRef>,
    /// Ground-name to value assignments for the initial state and for
    /// non-fluents; omitted entries take the schema default.
    pub initial_values: BTreeMap<String, Value>,
    pub horizon: usize,
    pub max_concurrent_actions: usize,
    pub discount: f64,
}

/// Key of a probability-distribution state for successor comparison:
/// additive hash when PD hashing is possible, bit-exact structural key
/// otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PdStateKey {
    Hashed(HashKey),
    Structural(Vec<u64>),
}

/// The fully ground, hash-indexed MDP produced by the compiler.
///
/// State variables are ordered with all deterministic CPFs before all
/// probabilistic ones (`first_probabilistic_index` is the boundary), by
/// head name within each group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroundTask {
    pub action_fluents: Vec<ActionFluent>,
    pub action_states: Vec<ActionState>,
    pub cpfs: Vec<Cpf>,
    pub reward: RewardFunction,
    pub preconditions: Vec<Precondition>,

    pub initial_values: Vec<Value>,
    pub horizon: usize,
    pub max_concurrent_actions: usize,
    pub discount: f64,

    pub first_probabilistic_index: usize,
    /// Slots in every state's fluent-hash-key vector: one per CPF, one for
    /// the reward, one per dynamic precondition.
    pub fluent_hash_key_count: usize,
    pub state_hashing_possible: bool,
    pub kleene_hashing_possible: bool,
    pub pd_hashing_possible: bool,

    /// `index_to_fluent_hash_key[var]` lists the `(hash_index, multiplier)`
    /// pairs of every evaluatable reading `var`; a transition only touches
    /// the listed slots.
    pub index_to_fluent_hash_key: Vec<Vec<(usize, HashKey)>>,
    pub index_to_kleene_hash_key: Vec<Vec<(usize, HashKey)>>,

    /// True if reasonable-action pruning on the determinization coincides
    /// with pruning on the probabilistic task.
    pub pruning_equivalent_to_det: bool,
    /// True if noop is always an optimal final action: legal, no dynamic
    /// preconditions, and the reward depends on no action fluent positively.
    pub noop_optimal_final_action: bool,
    /// Reward-lock detection requires noop at action index 0; the compiler
    /// verifies this and disables detection otherwise.
    pub reward_lock_detection: bool,
}

impl GroundTask {
    pub fn state_size(&self) -> usize {
        self.cpfs.len()
    }

    pub fn num_actions(&self) -> usize {
        self.action_states.len()
    }

    pub fn is_deterministic(&self) -> bool {
        self.first_probabilistic_index == self.cpfs.len()
    }

    pub fn action_state(&self, index: usize) -> &ActionState {
        &self.action_states[index]
    }

    /// The problem's initial state with all hash keys computed.
    pub fn initial_state(&self) -> State {
        self.state_from_values(self.initial_values.clone(), self.horizon)
    }

    /// Wraps raw variable values into a state and computes its hash keys.
    pub fn state_from_values(&self, values: Vec<Value>, remaining_steps: usize) -> State {
        let mut state = State::from_values(values, remaining_steps, self.fluent_hash_key_count);
        self.calc_fluent_hash_keys(&mut state);
        self.calc_state_hash_key(&mut state);
        state
    }

    /// Fills the per-evaluatable partial hash keys of a state.
    pub fn calc_fluent_hash_keys(&self, state: &mut State) {
        state.fluent_hash_keys.fill(0);
        for (var, entries) in self.index_to_fluent_hash_key.iter().enumerate() {
            let value = state.value(var);
            if hzn_core::value_gt(value, 0.0) {
                for &(hash_index, multiplier) in entries {
                    state.fluent_hash_keys[hash_index] += (value as HashKey) * multiplier;
                }
            }
        }
    }

    /// Computes the full-state hash key, or leaves it unset when state
    /// hashing has been marked impossible.
    pub fn calc_state_hash_key(&self, state: &mut State) {
        if !self.state_hashing_possible {
            state.hash_key = None;
            return;
        }
        let mut key: HashKey = 0;
        for (cpf, value) in self.cpfs.iter().zip(state.values.iter()) {
            key += (*value as HashKey) * cpf.hash_key_base;
        }
        state.hash_key = Some(key);
    }

    /// Lifts a state into its Kleene abstraction with hash keys computed.
    pub fn kleene_from_state(&self, state: &State) -> KleeneState {
        let mut kleene = KleeneState::from_state(state);
        kleene.fluent_hash_keys = vec![0; self.fluent_hash_key_count];
        self.calc_kleene_fluent_hash_keys(&mut kleene);
        self.calc_kleene_hash_key(&mut kleene);
        kleene
    }

    /// Fills the per-evaluatable partial hash keys of a Kleene state.
    pub fn calc_kleene_fluent_hash_keys(&self, state: &mut KleeneState) {
        state.fluent_hash_keys.fill(0);
        for (var, entries) in self.index_to_kleene_hash_key.iter().enumerate() {
            if entries.is_empty() {
                continue;
            }
            let encoding = KleeneState::cell_encoding(&state.values[var]);
            if encoding > 0 {
                for &(hash_index, multiplier) in entries {
                    state.fluent_hash_keys[hash_index] += encoding * multiplier;
                }
            }
        }
    }

    /// Computes the full Kleene-state hash key when possible.
    pub fn calc_kleene_hash_key(&self, state: &mut KleeneState) {
        if !self.kleene_hashing_possible {
            state.hash_key = None;
            return;
        }
        let mut key: HashKey = 0;
        for (cpf, cell) in self.cpfs.iter().zip(state.values.iter()) {
            key += KleeneState::cell_encoding(cell) * cpf.kleene_hash_key_base;
        }
        state.hash_key = Some(key);
    }

    /// Comparison key of a PD state: additive over per-variable truth
    /// probabilities when PD hashing is possible, structural otherwise.
    pub fn pd_state_key(&self, state: &PdState) -> PdStateKey {
        if self.pd_hashing_possible {
            let mut key: HashKey = 0;
            for (cpf, pd) in self.cpfs.iter().zip(state.values.iter()) {
                let info = cpf.pd_hash.as_ref().expect("pd hashing metadata");
                let slot = info
                    .probability_domain
                    .index_of(pd.truth_probability())
                    .expect("truth probability outside computed domain");
                key += (slot as HashKey) * info.base;
            }
            PdStateKey::Hashed(key)
        } else {
            PdStateKey::Structural(state.structural_key())
        }
    }

    /// The state-variable indices a ground name maps to, for simulator IO.
    pub fn state_variable_index(&self, name: &str) -> Option<usize> {
        self.cpfs
            .iter()
            .position(|cpf| cpf.name() == name)
            .map(|position| self.cpfs[position].head_index)
    }
}
