use crate::Expr;
use crate::ExprRef;
use crate::Simplifications;
use std::rc::Rc;

impl Expr {
    /// Replaces every probabilistic atom by its most likely outcome.
    ///
    /// `Bernoulli(p)` becomes `0.5 <= p`; `Discrete{(vᵢ, pᵢ)}` becomes a
    /// multi-condition checker whose i-th case fires when `pᵢ >= pⱼ` for
    /// every other j, so ties go to the first candidate in declaration
    /// order; `KronDelta` unwraps to its argument. The result contains no
    /// distribution nodes and is idempotent up to simplification.
    pub fn determinize_most_likely(&self) -> ExprRef {
        match self {
            Expr::StateFluent(index) => Expr::state_fluent(*index),
            Expr::ActionFluent(index) => Expr::action_fluent(*index),
            Expr::Constant(value) => Expr::constant(*value),

            Expr::Conjunction(children) => Rc::new(Expr::Conjunction(determinize_all(children))),
            Expr::Disjunction(children) => Rc::new(Expr::Disjunction(determinize_all(children))),
            Expr::Equals(children) => Rc::new(Expr::Equals(determinize_all(children))),
            Expr::Greater(children) => Rc::new(Expr::Greater(determinize_all(children))),
            Expr::Lower(children) => Rc::new(Expr::Lower(determinize_all(children))),
            Expr::GreaterEquals(children) => {
                Rc::new(Expr::GreaterEquals(determinize_all(children)))
            }
            Expr::LowerEquals(children) => Rc::new(Expr::LowerEquals(determinize_all(children))),
            Expr::Addition(children) => Rc::new(Expr::Addition(determinize_all(children))),
            Expr::Subtraction(children) => Rc::new(Expr::Subtraction(determinize_all(children))),
            Expr::Multiplication(children) => {
                Rc::new(Expr::Multiplication(determinize_all(children)))
            }
            Expr::Division(children) => Rc::new(Expr::Division(determinize_all(children))),
            Expr::Negation(child) => Rc::new(Expr::Negation(child.determinize_most_likely())),
            Expr::Exponential(child) => Rc::new(Expr::Exponential(child.determinize_most_likely())),

            Expr::KronDelta(child) => child.determinize_most_likely(),
            Expr::Bernoulli(child) => Rc::new(Expr::LowerEquals(vec![
                Expr::constant(0.5),
                child.determinize_most_likely(),
            ])),
            Expr::Discrete {
                values,
                probabilities,
            } => determinize_discrete(values, probabilities),

            Expr::IfThenElse {
                condition,
                if_true,
                if_false,
            } => Rc::new(Expr::IfThenElse {
                condition: condition.determinize_most_likely(),
                if_true: if_true.determinize_most_likely(),
                if_false: if_false.determinize_most_likely(),
            }),
            Expr::MultiCondition {
                conditions,
                effects,
            } => Rc::new(Expr::MultiCondition {
                conditions: determinize_all(conditions),
                effects: determinize_all(effects),
            }),

            schematic => unreachable!("schematic node in determinization: {}", schematic),
        }
    }
}

fn determinize_all(children: &[ExprRef]) -> Vec<ExprRef> {
    children
        .iter()
        .map(|child| child.determinize_most_likely())
        .collect()
}

/// Selects the value carrying the highest probability: one case per value,
/// guarded by the conjunction of pairwise `>=` comparisons against every
/// other branch's determinized probability.
fn determinize_discrete(values: &[ExprRef], probabilities: &[ExprRef]) -> ExprRef {
    let empty = Simplifications::default();
    let probabilities = determinize_all(probabilities);

    let mut conditions: Vec<ExprRef> = Vec::with_capacity(values.len());
    let mut effects: Vec<ExprRef> = Vec::with_capacity(values.len());
    for (i, value) in values.iter().enumerate() {
        let comparisons: Vec<ExprRef> = probabilities
            .iter()
            .enumerate()
            .filter(|(j, _)| *j != i)
            .map(|(_, other)| {
                Expr::GreaterEquals(vec![probabilities[i].clone(), other.clone()]).simplify(&empty)
            })
            .collect();
        conditions.push(Expr::Conjunction(comparisons).simplify(&empty));
        effects.push(value.determinize_most_likely());
    }

    Expr::MultiCondition {
        conditions,
        effects,
    }
    .simplify(&empty)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ActionState;
    use crate::State;

    fn state(values: Vec<f64>) -> State {
        State::from_values(values, 1, 0)
    }

    fn noop(fluents: usize) -> ActionState {
        let mut action = ActionState::new(fluents);
        action.index = 0;
        action.refresh_scheduled();
        action
    }

    #[test]
    fn bernoulli_becomes_threshold() {
        let det = Expr::Bernoulli(Expr::state_fluent(0)).determinize_most_likely();
        // p >= 0.5 selects the 1-outcome
        assert_eq!(det.evaluate(&state(vec![0.7]), &noop(0)), 1.0);
        assert_eq!(det.evaluate(&state(vec![0.3]), &noop(0)), 0.0);
        assert_eq!(det.evaluate(&state(vec![0.5]), &noop(0)), 1.0);
    }

    #[test]
    fn discrete_selects_most_likely_value() {
        let expr = Expr::Discrete {
            values: vec![Expr::constant(10.0), Expr::constant(20.0)],
            probabilities: vec![Expr::constant(0.2), Expr::constant(0.8)],
        };
        let det = expr.determinize_most_likely();
        assert_eq!(det.evaluate(&state(vec![]), &noop(0)), 20.0);
    }

    #[test]
    fn discrete_ties_go_to_first_candidate() {
        let expr = Expr::Discrete {
            values: vec![Expr::constant(10.0), Expr::constant(20.0)],
            probabilities: vec![Expr::constant(0.5), Expr::constant(0.5)],
        };
        let det = expr.determinize_most_likely();
        assert_eq!(det.evaluate(&state(vec![]), &noop(0)), 10.0);
    }

    #[test]
    fn determinization_is_idempotent() {
        let expr = Expr::IfThenElse {
            condition: Expr::state_fluent(0),
            if_true: Rc::new(Expr::Bernoulli(Expr::constant(0.7))),
            if_false: Rc::new(Expr::KronDelta(Expr::constant(0.0))),
        };
        let empty = Simplifications::default();
        let once = expr.determinize_most_likely().simplify(&empty);
        let twice = once.determinize_most_likely().simplify(&empty);
        assert_eq!(format!("{}", once), format!("{}", twice));
    }
}
