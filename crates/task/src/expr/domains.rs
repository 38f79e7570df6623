use crate::ActionState;
use crate::Expr;
use crate::KleeneState;
use crate::ValueSet;
use hzn_core::value_ge;
use hzn_core::value_gt;
use hzn_core::value_le;
use hzn_core::value_lt;
use hzn_core::Value;

impl Expr {
    /// Propagates finite value sets bottom-up: each state variable
    /// contributes `domains[index]`, the action contributes its concrete
    /// bits, boolean connectives and comparisons yield subsets of {0, 1},
    /// arithmetic yields pointwise combinations.
    ///
    /// With `domains` taken from a [`KleeneState`] this *is* three-valued
    /// evaluation, so [`Expr::evaluate_to_kleene`] delegates here.
    pub fn calculate_domain(&self, domains: &[ValueSet], action: &ActionState) -> ValueSet {
        match self {
            Expr::StateFluent(index) => domains[*index].clone(),
            Expr::ActionFluent(index) => ValueSet::singleton(action.value(*index)),
            Expr::Constant(value) => ValueSet::singleton(*value),

            Expr::Conjunction(children) => {
                // false as soon as one child must be false; certain only if
                // every child must be true
                let mut must_be_true = true;
                for child in children {
                    let child = child.calculate_domain(domains, action);
                    if child.is_false() {
                        return ValueSet::singleton(0.0);
                    }
                    if child.contains(0.0) {
                        must_be_true = false;
                    }
                }
                let mut result = ValueSet::singleton(1.0);
                if !must_be_true {
                    result.insert(0.0);
                }
                result
            }
            Expr::Disjunction(children) => {
                let mut must_be_false = true;
                for child in children {
                    let child = child.calculate_domain(domains, action);
                    if child.must_be_true() {
                        return ValueSet::singleton(1.0);
                    }
                    if child.len() > 1 || !child.contains(0.0) {
                        must_be_false = false;
                    }
                }
                let mut result = ValueSet::singleton(0.0);
                if !must_be_false {
                    result.insert(1.0);
                }
                result
            }

            Expr::Equals(children) => {
                debug_assert_eq!(children.len(), 2);
                let lhs = children[0].calculate_domain(domains, action);
                let rhs = children[1].calculate_domain(domains, action);
                let mut result = ValueSet::new();
                if lhs.len() != rhs.len() {
                    result.insert(0.0);
                }
                for &value in lhs.iter() {
                    if rhs.contains(value) {
                        result.insert(1.0);
                    } else {
                        result.insert(0.0);
                    }
                    if result.len() == 2 {
                        break;
                    }
                }
                result
            }
            Expr::Greater(children) => comparison_domain(children, domains, action, value_gt),
            Expr::Lower(children) => comparison_domain(children, domains, action, value_lt),
            Expr::GreaterEquals(children) => {
                comparison_domain(children, domains, action, value_ge)
            }
            Expr::LowerEquals(children) => comparison_domain(children, domains, action, value_le),

            Expr::Addition(children) => {
                pointwise_fold(children, domains, action, |a, b| a + b)
            }
            Expr::Subtraction(children) => {
                pointwise_fold(children, domains, action, |a, b| a - b)
            }
            Expr::Multiplication(children) => {
                pointwise_fold(children, domains, action, |a, b| a * b)
            }
            Expr::Division(children) => pointwise_fold(children, domains, action, |a, b| a / b),
            Expr::Negation(child) => {
                let child = child.calculate_domain(domains, action);
                let mut result = ValueSet::new();
                if child.contains(0.0) {
                    result.insert(1.0);
                }
                if child.len() > 1 || !child.contains(0.0) {
                    result.insert(0.0);
                }
                result
            }
            Expr::Exponential(child) => child
                .calculate_domain(domains, action)
                .iter()
                .map(|v| v.exp())
                .collect(),

            Expr::KronDelta(child) => child.calculate_domain(domains, action),
            Expr::Bernoulli(child) => {
                let probs = child.calculate_domain(domains, action);
                let mut result = ValueSet::new();
                for &p in probs.iter() {
                    if value_gt(p, 0.0) {
                        result.insert(1.0);
                    }
                    if value_lt(p, 1.0) {
                        result.insert(0.0);
                    }
                    if result.len() == 2 {
                        break;
                    }
                }
                result
            }
            Expr::Discrete {
                values,
                probabilities,
            } => {
                let mut result = ValueSet::new();
                for (value, prob) in values.iter().zip(probabilities.iter()) {
                    let probs = prob.calculate_domain(domains, action);
                    // the branch is reachable unless its probability must be 0
                    if probs.len() > 1 || !probs.contains(0.0) {
                        result.merge(&value.calculate_domain(domains, action));
                    }
                }
                result
            }

            Expr::IfThenElse {
                condition,
                if_true,
                if_false,
            } => {
                let cond = condition.calculate_domain(domains, action);
                if cond.len() > 1 {
                    let mut result = if_true.calculate_domain(domains, action);
                    if cond.contains(0.0) {
                        result.merge(&if_false.calculate_domain(domains, action));
                    }
                    result
                } else if cond.contains(0.0) {
                    if_false.calculate_domain(domains, action)
                } else {
                    if_true.calculate_domain(domains, action)
                }
            }
            Expr::MultiCondition {
                conditions,
                effects,
            } => {
                let mut result = ValueSet::new();
                for (condition, effect) in conditions.iter().zip(effects.iter()) {
                    let cond = condition.calculate_domain(domains, action);
                    if cond.len() > 1 {
                        result.merge(&effect.calculate_domain(domains, action));
                        if !cond.contains(0.0) {
                            return result;
                        }
                    } else if !cond.contains(0.0) {
                        result.merge(&effect.calculate_domain(domains, action));
                        return result;
                    }
                }
                result
            }

            schematic => unreachable!("schematic node in domain computation: {}", schematic),
        }
    }

    /// Three-valued evaluation: the non-empty set of values the formula may
    /// take when each variable ranges over its Kleene cell.
    pub fn evaluate_to_kleene(&self, current: &KleeneState, action: &ActionState) -> ValueSet {
        self.calculate_domain(&current.values, action)
    }
}

fn comparison_domain(
    children: &[crate::ExprRef],
    domains: &[ValueSet],
    action: &ActionState,
    holds: fn(Value, Value) -> bool,
) -> ValueSet {
    debug_assert_eq!(children.len(), 2);
    let lhs = children[0].calculate_domain(domains, action);
    let rhs = children[1].calculate_domain(domains, action);
    let mut result = ValueSet::new();
    // possible if it holds for the extremes, refutable if it can fail
    if holds(lhs.max(), rhs.min()) {
        result.insert(1.0);
    }
    if !holds(lhs.min(), rhs.max()) {
        result.insert(0.0);
    }
    result
}

fn pointwise_fold(
    children: &[crate::ExprRef],
    domains: &[ValueSet],
    action: &ActionState,
    combine: fn(Value, Value) -> Value,
) -> ValueSet {
    let mut accumulated = children[0].calculate_domain(domains, action);
    for child in &children[1..] {
        let element = child.calculate_domain(domains, action);
        let mut next = ValueSet::new();
        for &a in accumulated.iter() {
            for &b in element.iter() {
                next.insert(combine(a, b));
            }
        }
        accumulated = next;
    }
    accumulated
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    fn noop() -> ActionState {
        let mut action = ActionState::new(1);
        action.index = 0;
        action.refresh_scheduled();
        action
    }

    #[test]
    fn boolean_connectives_yield_truth_subsets() {
        let domains = vec![ValueSet::boolean(), ValueSet::singleton(1.0)];
        let conj = Expr::Conjunction(vec![Expr::state_fluent(0), Expr::state_fluent(1)]);
        assert_eq!(conj.calculate_domain(&domains, &noop()), ValueSet::boolean());

        let certain = Expr::Conjunction(vec![Expr::state_fluent(1)]);
        assert_eq!(
            certain.calculate_domain(&domains, &noop()),
            ValueSet::singleton(1.0)
        );
    }

    #[test]
    fn disjunction_short_circuits_on_certain_truth() {
        let domains = vec![ValueSet::boolean(), ValueSet::singleton(1.0)];
        let disj = Expr::Disjunction(vec![Expr::state_fluent(0), Expr::state_fluent(1)]);
        assert_eq!(
            disj.calculate_domain(&domains, &noop()),
            ValueSet::singleton(1.0)
        );
    }

    #[test]
    fn arithmetic_is_pointwise() {
        let domains = vec![ValueSet::boolean(), ValueSet::boolean()];
        let sum = Expr::Addition(vec![Expr::state_fluent(0), Expr::state_fluent(1)]);
        let expected: ValueSet = [0.0, 1.0, 2.0].into_iter().collect();
        assert_eq!(sum.calculate_domain(&domains, &noop()), expected);
    }

    #[test]
    fn comparison_uses_extremes() {
        let domains = vec![ValueSet::boolean()];
        let expr = Expr::Greater(vec![Expr::state_fluent(0), Expr::constant(0.0)]);
        assert_eq!(expr.calculate_domain(&domains, &noop()), ValueSet::boolean());

        let certain = Expr::Greater(vec![Expr::state_fluent(0), Expr::constant(-1.0)]);
        assert_eq!(
            certain.calculate_domain(&domains, &noop()),
            ValueSet::singleton(1.0)
        );
    }

    #[test]
    fn bernoulli_domain_depends_on_probability_range() {
        let domains = vec![];
        let fair = Expr::Bernoulli(Expr::constant(0.5));
        assert_eq!(fair.calculate_domain(&domains, &noop()), ValueSet::boolean());
        let sure = Expr::Bernoulli(Expr::constant(1.0));
        assert_eq!(
            sure.calculate_domain(&domains, &noop()),
            ValueSet::singleton(1.0)
        );
    }

    #[test]
    fn kleene_evaluation_is_domain_propagation() {
        let state = crate::State::from_values(vec![0.0], 1, 0);
        let mut kleene = KleeneState::from_state(&state);
        kleene.values[0] = ValueSet::boolean();
        let expr = Expr::Negation(Expr::state_fluent(0));
        assert_eq!(
            expr.evaluate_to_kleene(&kleene, &noop()),
            ValueSet::boolean()
        );
    }

    #[test]
    fn multi_condition_unions_reachable_effects() {
        let domains = vec![ValueSet::boolean()];
        let expr = Expr::MultiCondition {
            conditions: vec![Expr::state_fluent(0), Expr::truth()],
            effects: vec![Expr::constant(5.0), Expr::constant(7.0)],
        };
        let expected: ValueSet = [5.0, 7.0].into_iter().collect();
        assert_eq!(expr.calculate_domain(&domains, &noop()), expected);

        let certain = Expr::MultiCondition {
            conditions: vec![Expr::truth(), Expr::truth()],
            effects: vec![Rc::new(Expr::Constant(5.0)), Rc::new(Expr::Constant(7.0))],
        };
        assert_eq!(
            certain.calculate_domain(&domains, &noop()),
            ValueSet::singleton(5.0)
        );
    }
}
