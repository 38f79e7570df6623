use crate::ActionState;
use crate::DiscretePd;
use crate::Expr;
use crate::State;
use hzn_core::value_eq;
use hzn_core::value_ge;
use hzn_core::value_gt;
use hzn_core::value_le;
use hzn_core::value_lt;
use hzn_core::Probability;
use hzn_core::Value;

impl Expr {
    /// Evaluation into a discrete probability distribution.
    ///
    /// Boolean connectives multiply truth/falsity probabilities, comparisons
    /// accumulate pairwise mass, arithmetic convolves child distributions,
    /// and conditionals mix branch distributions by condition mass.
    pub fn evaluate_to_pd(&self, current: &State, action: &ActionState) -> DiscretePd {
        match self {
            Expr::StateFluent(index) => DiscretePd::dirac(current.value(*index)),
            Expr::ActionFluent(index) => DiscretePd::dirac(action.value(*index)),
            Expr::Constant(value) => DiscretePd::dirac(*value),

            Expr::Conjunction(children) => {
                let mut truth_prob = 1.0;
                for child in children {
                    let child = child.evaluate_to_pd(current, action);
                    debug_assert!(child.is_well_defined());
                    if child.is_falsity() {
                        return DiscretePd::dirac(0.0);
                    }
                    truth_prob *= child.truth_probability();
                }
                DiscretePd::bernoulli(truth_prob)
            }
            Expr::Disjunction(children) => {
                let mut falsity_prob = 1.0;
                for child in children {
                    let child = child.evaluate_to_pd(current, action);
                    debug_assert!(child.is_well_defined());
                    if child.is_truth() {
                        return DiscretePd::dirac(1.0);
                    }
                    falsity_prob *= child.falsity_probability();
                }
                DiscretePd::bernoulli(1.0 - falsity_prob)
            }

            Expr::Equals(children) => {
                debug_assert_eq!(children.len(), 2);
                let lhs = children[0].evaluate_to_pd(current, action);
                let rhs = children[1].evaluate_to_pd(current, action);
                // the probability that both sides take the same value
                let mut equality_prob = 0.0;
                for (value, prob) in lhs.values.iter().zip(lhs.probabilities.iter()) {
                    equality_prob += prob * rhs.probability_of(*value);
                }
                DiscretePd::bernoulli(equality_prob)
            }
            Expr::Greater(children) => {
                comparison_pd(children, current, action, value_gt)
            }
            Expr::Lower(children) => comparison_pd(children, current, action, value_lt),
            Expr::GreaterEquals(children) => {
                comparison_pd(children, current, action, value_ge)
            }
            Expr::LowerEquals(children) => comparison_pd(children, current, action, value_le),

            Expr::Addition(children) => convolve(children, current, action, |a, b| a + b),
            Expr::Subtraction(children) => convolve(children, current, action, |a, b| a - b),
            Expr::Multiplication(children) => convolve(children, current, action, |a, b| a * b),
            Expr::Division(children) => convolve(children, current, action, |a, b| a / b),
            Expr::Negation(child) => {
                let child = child.evaluate_to_pd(current, action);
                DiscretePd::bernoulli(child.falsity_probability())
            }
            Expr::Exponential(child) => {
                let child = child.evaluate_to_pd(current, action);
                DiscretePd::discrete(
                    child
                        .values
                        .iter()
                        .map(|v| v.exp())
                        .zip(child.probabilities.iter().copied()),
                )
            }

            Expr::KronDelta(child) => child.evaluate_to_pd(current, action),
            Expr::Bernoulli(child) => {
                let child = child.evaluate_to_pd(current, action);
                // the truth probability is given by a deterministic argument
                debug_assert!(child.is_deterministic());
                DiscretePd::bernoulli(child.value())
            }
            Expr::Discrete {
                values,
                probabilities,
            } => {
                let mut pairs: Vec<(Value, Probability)> = Vec::with_capacity(values.len());
                for (value, prob) in values.iter().zip(probabilities.iter()) {
                    let value = value.evaluate_to_pd(current, action);
                    let prob = prob.evaluate_to_pd(current, action);
                    debug_assert!(value.is_deterministic() && prob.is_deterministic());
                    if value_gt(prob.value(), 0.0) {
                        pairs.push((value.value(), prob.value()));
                    }
                }
                DiscretePd::discrete(pairs)
            }

            Expr::IfThenElse {
                condition,
                if_true,
                if_false,
            } => {
                let cond = condition.evaluate_to_pd(current, action);
                if cond.is_falsity() {
                    if_false.evaluate_to_pd(current, action)
                } else if cond.is_truth() {
                    if_true.evaluate_to_pd(current, action)
                } else {
                    let truth = if_true.evaluate_to_pd(current, action);
                    let falsity = if_false.evaluate_to_pd(current, action);
                    let mut pairs: Vec<(Value, Probability)> = Vec::new();
                    pairs.extend(
                        truth
                            .values
                            .iter()
                            .zip(truth.probabilities.iter())
                            .map(|(v, p)| (*v, p * cond.truth_probability())),
                    );
                    pairs.extend(
                        falsity
                            .values
                            .iter()
                            .zip(falsity.probabilities.iter())
                            .map(|(v, p)| (*v, p * cond.falsity_probability())),
                    );
                    DiscretePd::discrete(pairs)
                }
            }
            Expr::MultiCondition {
                conditions,
                effects,
            } => {
                let mut pairs: Vec<(Value, Probability)> = Vec::new();
                let mut remaining_prob = 1.0;
                for (condition, effect) in conditions.iter().zip(effects.iter()) {
                    let cond = condition.evaluate_to_pd(current, action);
                    debug_assert!(cond.is_well_defined());
                    if !cond.is_falsity() {
                        let effect = effect.evaluate_to_pd(current, action);
                        pairs.extend(
                            effect
                                .values
                                .iter()
                                .zip(effect.probabilities.iter())
                                .map(|(v, p)| {
                                    (*v, cond.truth_probability() * remaining_prob * p)
                                }),
                        );
                    }
                    remaining_prob *= cond.falsity_probability();
                    if value_eq(remaining_prob, 0.0) {
                        break;
                    }
                }
                DiscretePd::discrete(pairs)
            }

            schematic => unreachable!("schematic node in distribution evaluation: {}", schematic),
        }
    }
}

fn comparison_pd(
    children: &[crate::ExprRef],
    current: &State,
    action: &ActionState,
    holds: fn(Value, Value) -> bool,
) -> DiscretePd {
    debug_assert_eq!(children.len(), 2);
    let lhs = children[0].evaluate_to_pd(current, action);
    let rhs = children[1].evaluate_to_pd(current, action);
    let mut prob = 0.0;
    for (lv, lp) in lhs.values.iter().zip(lhs.probabilities.iter()) {
        for (rv, rp) in rhs.values.iter().zip(rhs.probabilities.iter()) {
            if holds(*lv, *rv) {
                prob += lp * rp;
            }
        }
    }
    DiscretePd::bernoulli(prob)
}

fn convolve(
    children: &[crate::ExprRef],
    current: &State,
    action: &ActionState,
    combine: fn(Value, Value) -> Value,
) -> DiscretePd {
    let mut accumulated = children[0].evaluate_to_pd(current, action);
    debug_assert!(accumulated.is_well_defined());
    for child in &children[1..] {
        let element = child.evaluate_to_pd(current, action);
        debug_assert!(element.is_well_defined());
        let mut pairs: Vec<(Value, Probability)> = Vec::new();
        for (av, ap) in accumulated.values.iter().zip(accumulated.probabilities.iter()) {
            for (bv, bp) in element.values.iter().zip(element.probabilities.iter()) {
                pairs.push((combine(*av, *bv), ap * bp));
            }
        }
        accumulated = DiscretePd::discrete(pairs);
    }
    accumulated
}

#[cfg(test)]
mod tests {
    use super::*;
    use hzn_core::value_eq;
    use std::rc::Rc;

    fn state(values: Vec<f64>) -> State {
        State::from_values(values, 1, 0)
    }

    fn action(values: Vec<bool>) -> ActionState {
        let mut action = ActionState::new(values.len());
        action.values = values;
        action.index = 0;
        action.refresh_scheduled();
        action
    }

    #[test]
    fn bernoulli_over_action_argument() {
        let expr = Expr::Bernoulli(Rc::new(Expr::IfThenElse {
            condition: Expr::action_fluent(0),
            if_true: Expr::constant(0.7),
            if_false: Expr::constant(0.3),
        }));
        let on = expr.evaluate_to_pd(&state(vec![]), &action(vec![true]));
        assert!(value_eq(on.truth_probability(), 0.7));
        let off = expr.evaluate_to_pd(&state(vec![]), &action(vec![false]));
        assert!(value_eq(off.truth_probability(), 0.3));
    }

    #[test]
    fn addition_convolves() {
        let expr = Expr::Addition(vec![
            Rc::new(Expr::Bernoulli(Expr::constant(0.5))),
            Rc::new(Expr::Bernoulli(Expr::constant(0.5))),
        ]);
        let pd = expr.evaluate_to_pd(&state(vec![]), &action(vec![]));
        assert_eq!(pd.values, vec![0.0, 1.0, 2.0]);
        assert!(value_eq(pd.probability_of(1.0), 0.5));
        assert!(pd.is_well_defined());
    }

    #[test]
    fn conjunction_multiplies_truth_mass() {
        let expr = Expr::Conjunction(vec![
            Rc::new(Expr::Bernoulli(Expr::constant(0.5))),
            Rc::new(Expr::Bernoulli(Expr::constant(0.5))),
        ]);
        let pd = expr.evaluate_to_pd(&state(vec![]), &action(vec![]));
        assert!(value_eq(pd.truth_probability(), 0.25));
    }

    #[test]
    fn deterministic_formula_is_a_point_mass() {
        let expr = Expr::Addition(vec![Expr::state_fluent(0), Expr::constant(1.0)]);
        let pd = expr.evaluate_to_pd(&state(vec![2.0]), &action(vec![]));
        assert!(pd.is_deterministic());
        assert_eq!(pd.value(), 3.0);
    }

    #[test]
    fn multi_condition_mixes_by_remaining_mass() {
        let expr = Expr::MultiCondition {
            conditions: vec![Rc::new(Expr::Bernoulli(Expr::constant(0.5))), Expr::truth()],
            effects: vec![Expr::constant(1.0), Expr::constant(2.0)],
        };
        let pd = expr.evaluate_to_pd(&state(vec![]), &action(vec![]));
        assert!(value_eq(pd.probability_of(1.0), 0.5));
        assert!(value_eq(pd.probability_of(2.0), 0.5));
    }

    #[test]
    fn pd_agrees_with_simplified_formula() {
        // simplification soundness on a mixed formula
        let expr = Expr::IfThenElse {
            condition: Expr::truth(),
            if_true: Rc::new(Expr::Bernoulli(Expr::constant(0.4))),
            if_false: Expr::constant(0.0),
        };
        let simplified = expr.simplify(&Default::default());
        let s = state(vec![]);
        let a = action(vec![]);
        assert_eq!(
            expr.evaluate_to_pd(&s, &a),
            simplified.evaluate_to_pd(&s, &a)
        );
    }
}
