use crate::assign_hash_keys;
use crate::enumerate_action_states;
use crate::ground;
use crate::probability_domain;
use crate::remap_state_fluents;
use crate::simplify;
use hzn_core::value_gt;
use hzn_core::value_le;
use hzn_core::Value;
use hzn_task::ActionState;
use hzn_task::Cpf;
use hzn_task::Evaluatable;
use hzn_task::ExprInfo;
use hzn_task::ExprRef;
use hzn_task::GroundTask;
use hzn_task::Precondition;
use hzn_task::RewardFunction;
use hzn_task::SchematicTask;
use hzn_task::State;
use hzn_task::TaskError;
use hzn_task::ValueSet;

/// Compiles a schematic task into the ground, hash-indexed MDP the planner
/// runs on: grounding, simplification fixpoint, legal-action enumeration,
/// deterministic-first variable ordering, domain computation, most-likely
/// determinization, task-level flags, and hash-key assignment.
pub fn preprocess(task: &SchematicTask) -> Result<GroundTask, TaskError> {
    let grounding = ground(task)?;
    let simplified = simplify(&grounding)?;

    let mut action_states = enumerate_action_states(
        grounding.action_fluents.len(),
        grounding.max_concurrent_actions,
        &simplified.static_preconditions,
    );
    if action_states.is_empty() {
        return Err(TaskError::Infeasible(
            "no action satisfies the static preconditions".to_string(),
        ));
    }

    // order the surviving CPFs: deterministic before probabilistic, by head
    // name within each group
    struct Pending {
        provisional: usize,
        name: String,
        formula: ExprRef,
        probabilistic: bool,
    }
    let mut pending: Vec<Pending> = simplified
        .cpfs
        .iter()
        .map(|(provisional, formula)| {
            let mut info = ExprInfo::default();
            formula.collect_info(&mut info);
            Pending {
                provisional: *provisional,
                name: grounding.state_fluent_names[*provisional].clone(),
                formula: formula.clone(),
                probabilistic: info.is_probabilistic,
            }
        })
        .collect();
    pending.sort_by(|a, b| {
        (a.probabilistic, &a.name).cmp(&(b.probabilistic, &b.name))
    });
    let first_probabilistic_index = pending
        .iter()
        .position(|cpf| cpf.probabilistic)
        .unwrap_or(pending.len());

    let mut remap = vec![usize::MAX; grounding.state_fluent_names.len()];
    for (index, cpf) in pending.iter().enumerate() {
        remap[cpf.provisional] = index;
    }

    let mut cpfs: Vec<Cpf> = pending
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            let formula = remap_state_fluents(&entry.formula, &remap);
            let mut cpf = Cpf::new(
                index,
                grounding.initial_values[entry.provisional],
                entry.name.clone(),
                formula,
            );
            cpf.eval.refresh_info();
            cpf
        })
        .collect();

    let mut reward = RewardFunction::new(remap_state_fluents(&simplified.reward, &remap));
    reward.eval.refresh_info();
    if reward.eval.is_probabilistic {
        return Err(TaskError::Infeasible(
            "the reward formula must be deterministic".to_string(),
        ));
    }

    let mut preconditions: Vec<Precondition> = Vec::new();
    for (index, formula) in simplified.dynamic_preconditions.iter().enumerate() {
        let mut eval = Evaluatable::new(
            format!("precondition({})", index),
            remap_state_fluents(formula, &remap),
        );
        eval.refresh_info();
        preconditions.push(Precondition { eval, index });
    }
    // every dynamic precondition constrains every action: a constraint can
    // fail because a fluent is scheduled or because it is not, so no sound
    // static relevance filter narrows the list
    for action in &mut action_states {
        action.relevant_preconditions = (0..preconditions.len()).collect();
    }

    let initial_values: Vec<Value> = pending
        .iter()
        .map(|entry| grounding.initial_values[entry.provisional])
        .collect();

    // the initial state must satisfy every state invariant
    let invariant_state = State::from_values(initial_values.clone(), grounding.horizon, 0);
    let noop_probe = ActionState::new(grounding.action_fluents.len());
    for invariant in &simplified.state_invariants {
        let invariant = remap_state_fluents(invariant, &remap);
        if !value_gt(invariant.evaluate(&invariant_state, &noop_probe), 0.0) {
            return Err(TaskError::Infeasible(format!(
                "the initial state violates `{}`",
                invariant
            )));
        }
    }

    for cpf in &mut cpfs {
        cpf.determinize();
    }

    let noop_at_zero = action_states[0].is_noop();
    if !noop_at_zero {
        log::info!("noop is not legal; reward-lock detection disabled");
    }
    let noop_optimal_final_action = noop_at_zero
        && preconditions.is_empty()
        && reward.does_not_depend_positively_on_actions();

    let mut ground_task = GroundTask {
        action_fluents: grounding.action_fluents,
        action_states,
        cpfs,
        reward,
        preconditions,
        initial_values,
        horizon: grounding.horizon,
        max_concurrent_actions: grounding.max_concurrent_actions,
        discount: grounding.discount,
        first_probabilistic_index,
        fluent_hash_key_count: 0,
        state_hashing_possible: false,
        kleene_hashing_possible: false,
        pd_hashing_possible: false,
        index_to_fluent_hash_key: Vec::new(),
        index_to_kleene_hash_key: Vec::new(),
        pruning_equivalent_to_det: false,
        noop_optimal_final_action,
        reward_lock_detection: noop_at_zero,
    };

    compute_domains(&mut ground_task);
    ground_task.pruning_equivalent_to_det = pruning_equivalence(&ground_task);
    assign_hash_keys(&mut ground_task);

    log::info!(
        "compiled task: {} state variables ({} deterministic), {} actions, {} dynamic preconditions",
        ground_task.cpfs.len(),
        ground_task.first_probabilistic_index,
        ground_task.action_states.len(),
        ground_task.preconditions.len(),
    );
    Ok(ground_task)
}

/// Expands per-variable value domains to a fixpoint, starting from the
/// initial values. One round per horizon step suffices: a value unreachable
/// within `horizon` transitions never occurs.
fn compute_domains(task: &mut GroundTask) {
    let mut domains: Vec<ValueSet> = task
        .initial_values
        .iter()
        .map(|&value| ValueSet::singleton(value))
        .collect();

    for _ in 0..task.horizon {
        let mut changed = false;
        for index in 0..task.cpfs.len() {
            let mut reachable = ValueSet::new();
            for action in &task.action_states {
                reachable.merge(&task.cpfs[index].eval.formula.calculate_domain(&domains, action));
            }
            changed |= domains[index].merge(&reachable);
        }
        if !changed {
            break;
        }
    }

    for (cpf, domain) in task.cpfs.iter_mut().zip(domains.iter()) {
        cpf.domain = domain.clone();
        cpf.kleene_domain_size = domain.kleene_domain_size();
    }

    let mut reward_domain = ValueSet::new();
    for action in &task.action_states {
        reward_domain.merge(&task.reward.eval.formula.calculate_domain(&domains, action));
    }
    task.reward.domain = reward_domain;
}

/// True if reasonable-action pruning on the most-likely determinization
/// prunes exactly the actions it would prune on the probabilistic task:
/// every probabilistic variable is boolean with statically enumerable truth
/// probabilities that straddle one half.
fn pruning_equivalence(task: &GroundTask) -> bool {
    let var_domains: Vec<ValueSet> = task.cpfs.iter().map(|cpf| cpf.domain.clone()).collect();
    for cpf in &task.cpfs[task.first_probabilistic_index..] {
        let Some(probabilities) = probability_domain(cpf, &var_domains, &task.action_states)
        else {
            return false;
        };
        match probabilities.len() {
            1 => continue,
            2 => {
                let low = probabilities.min();
                let high = probabilities.max();
                if value_gt(low, 0.5) && value_gt(high, 0.5) {
                    return false;
                }
                if value_le(low, 0.5) && value_le(high, 0.5) {
                    return false;
                }
            }
            _ => return false,
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::bernoulli_flipflop_task;
    use crate::testing::tiny_counter_task;

    #[test]
    fn deterministic_variables_come_first() {
        let task = preprocess(&bernoulli_flipflop_task(false)).unwrap();
        assert_eq!(task.cpfs.len(), 2);
        assert_eq!(task.first_probabilistic_index, 1);
        assert!(!task.cpfs[0].eval.is_probabilistic);
        assert!(task.cpfs[1].eval.is_probabilistic);
        // indices agree with positions
        for (index, cpf) in task.cpfs.iter().enumerate() {
            assert_eq!(cpf.head_index, index);
        }
    }

    #[test]
    fn domains_reach_fixpoint() {
        let task = preprocess(&tiny_counter_task(3)).unwrap();
        for cpf in &task.cpfs {
            assert_eq!(cpf.domain, ValueSet::boolean());
            assert_eq!(cpf.kleene_domain_size, Some(3));
        }
        assert_eq!(task.reward.domain.min(), 0.0);
        assert_eq!(task.reward.domain.max(), 3.0);
    }

    #[test]
    fn counter_task_flags() {
        let task = preprocess(&tiny_counter_task(2)).unwrap();
        assert!(task.action_states[0].is_noop());
        assert!(task.reward_lock_detection);
        // reward reads state fluents only, so noop closes every round
        assert!(task.noop_optimal_final_action);
        assert!(task.is_deterministic());
    }

    #[test]
    fn flipflop_is_pruning_equivalent() {
        // truth probabilities 0.3 and 0.7 straddle one half
        let task = preprocess(&bernoulli_flipflop_task(false)).unwrap();
        assert!(task.pruning_equivalent_to_det);
        assert!(task.pd_hashing_possible);
    }

    #[test]
    fn determinized_formulas_carry_no_distributions() {
        let task = preprocess(&bernoulli_flipflop_task(false)).unwrap();
        let text = format!("{}", task.cpfs[1].eval.determinized);
        assert!(!text.contains("Bernoulli"));
    }
}
