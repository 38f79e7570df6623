use hzn_core::value_eq;
use hzn_task::ActionState;
use hzn_task::ExprRef;
use hzn_task::State;

/// Enumerates the legal action states.
///
/// Expands every subset of action fluents of size at most
/// `max_concurrent`, tests each against all static preconditions, and
/// sorts the survivors (fewer scheduled fluents first, then lexicographic
/// on the bit-vector), so `noop` sits at index 0 whenever it is allowed.
pub fn enumerate_action_states(
    num_action_fluents: usize,
    max_concurrent: usize,
    static_preconditions: &[ExprRef],
) -> Vec<ActionState> {
    let mut combinations: Vec<Vec<usize>> = Vec::new();
    collect_combinations(
        num_action_fluents,
        max_concurrent,
        Vec::new(),
        &mut combinations,
    );

    // static preconditions read no state fluents; any state works
    let dummy = State::new(0, 0, 0);

    let mut legal: Vec<ActionState> = Vec::new();
    'combination: for combination in combinations {
        let mut action = ActionState::new(num_action_fluents);
        for index in combination {
            action.values[index] = true;
        }
        action.refresh_scheduled();
        for precondition in static_preconditions {
            if value_eq(precondition.evaluate(&dummy, &action), 0.0) {
                continue 'combination;
            }
        }
        legal.push(action);
    }

    legal.sort_by_key(ActionState::enumeration_key);
    legal.dedup();
    for (index, action) in legal.iter_mut().enumerate() {
        action.index = index;
    }
    legal
}

/// All ascending index subsets of size at most `remaining`, including the
/// empty one.
fn collect_combinations(
    num_action_fluents: usize,
    remaining: usize,
    prefix: Vec<usize>,
    result: &mut Vec<Vec<usize>>,
) {
    let next = prefix.last().map(|&last| last + 1).unwrap_or(0);
    result.push(prefix.clone());
    if remaining == 0 {
        return;
    }
    for index in next..num_action_fluents {
        let mut extended = prefix.clone();
        extended.push(index);
        collect_combinations(num_action_fluents, remaining - 1, extended, result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hzn_task::Expr;
    use std::rc::Rc;

    #[test]
    fn unbounded_enumeration_counts_subsets() {
        let actions = enumerate_action_states(3, 3, &[]);
        assert_eq!(actions.len(), 8);
        assert!(actions[0].is_noop());
    }

    #[test]
    fn concurrency_bound_limits_subset_size() {
        let actions = enumerate_action_states(3, 1, &[]);
        // noop plus three singletons
        assert_eq!(actions.len(), 4);
        assert!(actions.iter().all(|a| a.scheduled.len() <= 1));
    }

    #[test]
    fn static_preconditions_filter_combinations() {
        // a0 and a1 are mutually exclusive
        let mutex = Rc::new(Expr::Negation(Rc::new(Expr::Conjunction(vec![
            Expr::action_fluent(0),
            Expr::action_fluent(1),
        ]))));
        let actions = enumerate_action_states(2, 2, &[mutex]);
        assert_eq!(actions.len(), 3);
        assert!(actions.iter().all(|a| a.scheduled != vec![0, 1]));
    }

    #[test]
    fn enumeration_is_stable() {
        let first = enumerate_action_states(4, 2, &[]);
        let second = enumerate_action_states(4, 2, &[]);
        assert_eq!(first, second);
        for (index, action) in first.iter().enumerate() {
            assert_eq!(action.index, index);
        }
    }
}
