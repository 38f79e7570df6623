use hzn_core::HashKey;
use hzn_core::CACHE_VECTOR_LIMIT;
use hzn_task::ActionState;
use hzn_task::CachingType;
use hzn_task::Evaluatable;
use hzn_task::Expr;
use hzn_task::ExprInfo;
use hzn_task::GroundTask;
use hzn_task::PdHashInfo;
use hzn_task::ValueSet;

/// Assigns all hash keys and caching policies: per-evaluatable action hash
/// keys and state-fluent hash keys (deterministic and Kleene), the
/// full-state and Kleene-state bases, and the probability-distribution
/// hash metadata.
///
/// Any multiplication that overflows the machine word marks the owning
/// system impossible: the evaluatable's caching type becomes `None`, or the
/// state/Kleene/PD hashing flag of the task is cleared, and evaluation
/// falls back to the uncached path.
pub fn assign_hash_keys(task: &mut GroundTask) {
    let domain_multipliers: Vec<HashKey> =
        task.cpfs.iter().map(|cpf| base_multiplier(&cpf.domain)).collect();
    let kleene_multipliers: Vec<Option<HashKey>> = task
        .cpfs
        .iter()
        .map(|cpf| kleene_base_multiplier(&cpf.domain))
        .collect();
    let action_states = task.action_states.clone();
    let state_size = task.cpfs.len();

    let mut index_to_fluent: Vec<Vec<(usize, HashKey)>> = vec![Vec::new(); state_size];
    let mut index_to_kleene: Vec<Vec<(usize, HashKey)>> = vec![Vec::new(); state_size];

    for index in 0..state_size {
        let mut eval = std::mem::replace(
            &mut task.cpfs[index].eval,
            Evaluatable::new(String::new(), Expr::falsity()),
        );
        assign_evaluatable_keys(
            &mut eval,
            index,
            &action_states,
            &domain_multipliers,
            &kleene_multipliers,
            &mut index_to_fluent,
            &mut index_to_kleene,
        );
        task.cpfs[index].eval = eval;
    }
    assign_evaluatable_keys(
        &mut task.reward.eval,
        state_size,
        &action_states,
        &domain_multipliers,
        &kleene_multipliers,
        &mut index_to_fluent,
        &mut index_to_kleene,
    );
    for (offset, precondition) in task.preconditions.iter_mut().enumerate() {
        assign_evaluatable_keys(
            &mut precondition.eval,
            state_size + 1 + offset,
            &action_states,
            &domain_multipliers,
            &kleene_multipliers,
            &mut index_to_fluent,
            &mut index_to_kleene,
        );
    }

    task.index_to_fluent_hash_key = index_to_fluent;
    task.index_to_kleene_hash_key = index_to_kleene;
    task.fluent_hash_key_count = state_size + 1 + task.preconditions.len();

    assign_state_bases(task, &domain_multipliers);
    assign_kleene_bases(task);
    assign_pd_bases(task);

    for cpf in &mut task.cpfs {
        cpf.eval.allocate_caches();
    }
    task.reward.eval.allocate_caches();
    for precondition in &mut task.preconditions {
        precondition.eval.allocate_caches();
    }
}

/// Base multiplier of a variable in additive hashing. Values are embedded
/// directly, so a non-contiguous domain widens the base to its largest
/// member to keep keys collision-free.
fn base_multiplier(domain: &ValueSet) -> HashKey {
    let span = (domain.max().floor() as HashKey).saturating_add(1);
    span.max(domain.len() as HashKey)
}

/// Kleene base multiplier: the number of non-empty subsets, widened for
/// non-contiguous domains. `None` when the subset count overflows.
fn kleene_base_multiplier(domain: &ValueSet) -> Option<HashKey> {
    let highest = domain.max().floor() as u32;
    if highest >= u64::BITS - 1 {
        return None;
    }
    Some((1u64 << (highest + 1)) - 1)
}

fn assign_evaluatable_keys(
    eval: &mut Evaluatable,
    hash_index: usize,
    action_states: &[ActionState],
    domain_multipliers: &[HashKey],
    kleene_multipliers: &[Option<HashKey>],
    index_to_fluent: &mut [Vec<(usize, HashKey)>],
    index_to_kleene: &mut [Vec<(usize, HashKey)>],
) {
    eval.hash_index = hash_index;
    let first_base = assign_action_hash_keys(eval, action_states);

    // deterministic / sampled evaluation keys
    eval.caching = CachingType::None;
    let mut base = first_base;
    let mut dependencies: Vec<(usize, HashKey)> = Vec::new();
    let mut feasible = true;
    for &var in &eval.dependent_state_fluents {
        dependencies.push((var, base));
        match base.checked_mul(domain_multipliers[var]) {
            Some(next) => base = next,
            None => {
                feasible = false;
                break;
            }
        }
    }
    if feasible {
        for &(var, multiplier) in &dependencies {
            index_to_fluent[var].push((hash_index, multiplier));
        }
        eval.cache_size = base;
        eval.caching = if base > CACHE_VECTOR_LIMIT {
            CachingType::Map
        } else {
            CachingType::Vector
        };
    } else {
        log::info!("hash base of `{}` overflows; evaluation is uncached", eval.name);
    }

    // Kleene evaluation keys, same walk over the subset-count multipliers
    eval.kleene_caching = CachingType::None;
    let mut base = first_base;
    let mut dependencies: Vec<(usize, HashKey)> = Vec::new();
    let mut feasible = true;
    for &var in &eval.dependent_state_fluents {
        dependencies.push((var, base));
        let multiplier = match kleene_multipliers[var] {
            Some(multiplier) => multiplier,
            None => {
                feasible = false;
                break;
            }
        };
        match base.checked_mul(multiplier) {
            Some(next) => base = next,
            None => {
                feasible = false;
                break;
            }
        }
    }
    if feasible {
        for &(var, multiplier) in &dependencies {
            index_to_kleene[var].push((hash_index, multiplier));
        }
        eval.kleene_cache_size = base;
        eval.kleene_caching = if base > CACHE_VECTOR_LIMIT {
            CachingType::Map
        } else {
            CachingType::Vector
        };
    }
}

/// Action hash keys of one evaluatable. An action whose scheduled fluents
/// the formula ignores contributes 0; one whose scheduled set is read in
/// full gets a fresh key; a partially-read action reuses the key of the
/// action state equal to the read subset when one exists. Returns the
/// first state-fluent base, one above the highest assigned key.
fn assign_action_hash_keys(eval: &mut Evaluatable, action_states: &[ActionState]) -> HashKey {
    eval.action_hash_keys = vec![0; action_states.len()];
    let mut next_key: HashKey = 1;
    for action in action_states {
        let read: Vec<usize> = action
            .scheduled
            .iter()
            .copied()
            .filter(|&fluent| eval.depends_on_action_fluent(fluent))
            .collect();
        if read.is_empty() {
            continue;
        }
        if read.len() == action.scheduled.len() {
            eval.action_hash_keys[action.index] = next_key;
            next_key += 1;
            continue;
        }
        match action_states.iter().find(|other| other.scheduled == read) {
            Some(representative) => {
                eval.action_hash_keys[action.index] =
                    eval.action_hash_keys[representative.index];
            }
            None => {
                eval.action_hash_keys[action.index] = next_key;
                next_key += 1;
            }
        }
    }
    next_key
}

fn assign_state_bases(task: &mut GroundTask, domain_multipliers: &[HashKey]) {
    task.state_hashing_possible = true;
    let mut next: HashKey = 1;
    for (cpf, &multiplier) in task.cpfs.iter_mut().zip(domain_multipliers.iter()) {
        cpf.hash_key_base = next;
        match next.checked_mul(multiplier) {
            Some(base) => next = base,
            None => {
                task.state_hashing_possible = false;
                break;
            }
        }
    }
    if !task.state_hashing_possible {
        log::info!("state hashing impossible; states compare by value");
        for cpf in &mut task.cpfs {
            cpf.hash_key_base = 0;
        }
    }
}

fn assign_kleene_bases(task: &mut GroundTask) {
    task.kleene_hashing_possible = true;
    let mut next: HashKey = 1;
    for cpf in task.cpfs.iter_mut() {
        cpf.kleene_hash_key_base = next;
        let step =
            kleene_base_multiplier(&cpf.domain).and_then(|multiplier| next.checked_mul(multiplier));
        match step {
            Some(base) => next = base,
            None => {
                task.kleene_hashing_possible = false;
                break;
            }
        }
    }
    if !task.kleene_hashing_possible {
        for cpf in &mut task.cpfs {
            cpf.kleene_hash_key_base = 0;
        }
    }
}

/// Probability-distribution hashing. Possible only on all-boolean tasks
/// whose per-variable truth-probability domains are computable: a
/// deterministic variable contributes its value domain, a top-level
/// Bernoulli over a deterministic argument contributes that argument's
/// domain; anything else disables the system, and PD states fall back to
/// structural comparison.
fn assign_pd_bases(task: &mut GroundTask) {
    let all_boolean = task
        .cpfs
        .iter()
        .all(|cpf| cpf.domain.iter().all(|&v| v == 0.0 || v == 1.0));
    if !all_boolean {
        task.pd_hashing_possible = false;
        return;
    }

    let var_domains: Vec<ValueSet> = task.cpfs.iter().map(|cpf| cpf.domain.clone()).collect();
    let mut prob_domains: Vec<ValueSet> = Vec::with_capacity(task.cpfs.len());
    for cpf in &task.cpfs {
        match probability_domain(cpf, &var_domains, &task.action_states) {
            Some(domain) => prob_domains.push(domain),
            None => {
                task.pd_hashing_possible = false;
                return;
            }
        }
    }

    let mut bases: Vec<HashKey> = Vec::with_capacity(task.cpfs.len());
    let mut next: HashKey = 1;
    for domain in &prob_domains {
        bases.push(next);
        match next.checked_mul(domain.len() as HashKey) {
            Some(base) => next = base,
            None => {
                task.pd_hashing_possible = false;
                return;
            }
        }
    }

    task.pd_hashing_possible = true;
    for ((cpf, base), domain) in task
        .cpfs
        .iter_mut()
        .zip(bases.into_iter())
        .zip(prob_domains.into_iter())
    {
        cpf.pd_hash = Some(PdHashInfo {
            base,
            probability_domain: domain,
        });
    }
}

/// The truth probabilities a boolean CPF can emit, or `None` when they are
/// not statically enumerable.
pub(crate) fn probability_domain(
    cpf: &hzn_task::Cpf,
    var_domains: &[ValueSet],
    action_states: &[ActionState],
) -> Option<ValueSet> {
    if !cpf.eval.is_probabilistic {
        return Some(cpf.domain.clone());
    }
    if let Expr::Bernoulli(argument) = &*cpf.eval.formula {
        let mut info = ExprInfo::default();
        argument.collect_info(&mut info);
        if info.is_probabilistic {
            return None;
        }
        let mut domain = ValueSet::new();
        for action in action_states {
            domain.merge(&argument.calculate_domain(var_domains, action));
        }
        return Some(domain);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::compiled_counter_task;

    #[test]
    fn hash_keys_are_additive_and_consistent() {
        let task = compiled_counter_task(3);
        assert!(task.state_hashing_possible);
        let state = task.initial_state();
        let mut expected: HashKey = 0;
        for (cpf, value) in task.cpfs.iter().zip(state.values.iter()) {
            expected += (*value as HashKey) * cpf.hash_key_base;
        }
        assert_eq!(state.hash_key, Some(expected));
    }

    #[test]
    fn equal_states_share_hash_keys() {
        let task = compiled_counter_task(3);
        let a = task.state_from_values(vec![1.0, 0.0, 1.0], 2);
        let b = task.state_from_values(vec![1.0, 0.0, 1.0], 5);
        assert_eq!(a.hash_key, b.hash_key);
        let c = task.state_from_values(vec![0.0, 0.0, 1.0], 2);
        assert_ne!(a.hash_key, c.hash_key);
    }

    #[test]
    fn fluent_keys_touch_only_dependent_slots(){
        let task = compiled_counter_task(3);
        // CPF i reads exactly variable i and its action; flipping variable 0
        // must leave the key slots of the other CPFs unchanged
        let base = task.state_from_values(vec![0.0, 0.0, 0.0], 2);
        let flipped = task.state_from_values(vec![1.0, 0.0, 0.0], 2);
        for cpf in &task.cpfs[1..] {
            assert_eq!(
                base.fluent_hash_key(cpf.eval.hash_index),
                flipped.fluent_hash_key(cpf.eval.hash_index)
            );
        }
        assert_ne!(
            base.fluent_hash_key(task.cpfs[0].eval.hash_index),
            flipped.fluent_hash_key(task.cpfs[0].eval.hash_index)
        );
    }

    #[test]
    fn kleene_bases_use_subset_counts() {
        let task = compiled_counter_task(2);
        assert!(task.kleene_hashing_possible);
        // boolean variables have kleene domain size 3
        assert_eq!(task.cpfs[0].kleene_hash_key_base, 1);
        assert_eq!(task.cpfs[1].kleene_hash_key_base, 3);
    }

    #[test]
    fn noop_contributes_no_action_key() {
        let task = compiled_counter_task(2);
        for cpf in &task.cpfs {
            assert_eq!(cpf.eval.action_hash_keys[0], 0);
        }
    }
}
