use crate::ActionState;
use crate::Expr;
use crate::State;
use hzn_core::value_eq;
use hzn_core::value_ge;
use hzn_core::value_gt;
use hzn_core::value_le;
use hzn_core::value_lt;
use hzn_core::Value;

impl Expr {
    /// Deterministic evaluation over a concrete state and action.
    ///
    /// Only determinized formulas are evaluated this way, so distribution
    /// nodes cannot occur here (the determinizer removed them).
    pub fn evaluate(&self, current: &State, action: &ActionState) -> Value {
        match self {
            Expr::StateFluent(index) => current.value(*index),
            Expr::ActionFluent(index) => action.value(*index),
            Expr::Constant(value) => *value,

            Expr::Conjunction(children) => {
                let mut result = 1.0;
                for child in children {
                    let value = child.evaluate(current, action);
                    if value_eq(value, 0.0) {
                        return 0.0;
                    }
                    result *= value;
                }
                result
            }
            Expr::Disjunction(children) => {
                for child in children {
                    if !value_eq(child.evaluate(current, action), 0.0) {
                        return 1.0;
                    }
                }
                0.0
            }
            Expr::Equals(children) => {
                let first = children[0].evaluate(current, action);
                for child in &children[1..] {
                    if !value_eq(child.evaluate(current, action), first) {
                        return 0.0;
                    }
                }
                1.0
            }
            Expr::Greater(children) => binary_comparison(children, current, action, value_gt),
            Expr::Lower(children) => binary_comparison(children, current, action, value_lt),
            Expr::GreaterEquals(children) => {
                binary_comparison(children, current, action, value_ge)
            }
            Expr::LowerEquals(children) => binary_comparison(children, current, action, value_le),

            Expr::Addition(children) => children
                .iter()
                .map(|child| child.evaluate(current, action))
                .sum(),
            Expr::Subtraction(children) => {
                let first = children[0].evaluate(current, action);
                children[1..]
                    .iter()
                    .fold(first, |acc, child| acc - child.evaluate(current, action))
            }
            Expr::Multiplication(children) => {
                let mut result = 1.0;
                for child in children {
                    let value = child.evaluate(current, action);
                    if value_eq(value, 0.0) {
                        return 0.0;
                    }
                    result *= value;
                }
                result
            }
            Expr::Division(children) => {
                debug_assert_eq!(children.len(), 2);
                children[0].evaluate(current, action) / children[1].evaluate(current, action)
            }
            Expr::Negation(child) => {
                if value_eq(child.evaluate(current, action), 0.0) {
                    1.0
                } else {
                    0.0
                }
            }
            Expr::Exponential(child) => child.evaluate(current, action).exp(),

            Expr::KronDelta(child) => child.evaluate(current, action),

            Expr::IfThenElse {
                condition,
                if_true,
                if_false,
            } => {
                if value_eq(condition.evaluate(current, action), 0.0) {
                    if_false.evaluate(current, action)
                } else {
                    if_true.evaluate(current, action)
                }
            }
            Expr::MultiCondition {
                conditions,
                effects,
            } => {
                for (condition, effect) in conditions.iter().zip(effects.iter()) {
                    if !value_eq(condition.evaluate(current, action), 0.0) {
                        return effect.evaluate(current, action);
                    }
                }
                unreachable!("multi-condition checker without satisfied condition")
            }

            Expr::Bernoulli(_) | Expr::Discrete { .. } => {
                unreachable!("distribution in deterministic evaluation")
            }
            schematic => unreachable!("schematic node in evaluation: {}", schematic),
        }
    }
}

fn binary_comparison(
    children: &[crate::ExprRef],
    current: &State,
    action: &ActionState,
    holds: fn(Value, Value) -> bool,
) -> Value {
    debug_assert_eq!(children.len(), 2);
    let lhs = children[0].evaluate(current, action);
    let rhs = children[1].evaluate(current, action);
    if holds(lhs, rhs) {
        1.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
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
    fn atoms_read_state_and_action() {
        let s = state(vec![3.0]);
        let a = action(vec![true]);
        assert_eq!(Expr::StateFluent(0).evaluate(&s, &a), 3.0);
        assert_eq!(Expr::ActionFluent(0).evaluate(&s, &a), 1.0);
        assert_eq!(Expr::Constant(2.5).evaluate(&s, &a), 2.5);
    }

    #[test]
    fn connectives() {
        let s = state(vec![1.0, 0.0]);
        let a = action(vec![]);
        let conj = Expr::Conjunction(vec![Expr::state_fluent(0), Expr::state_fluent(1)]);
        assert_eq!(conj.evaluate(&s, &a), 0.0);
        let disj = Expr::Disjunction(vec![Expr::state_fluent(0), Expr::state_fluent(1)]);
        assert_eq!(disj.evaluate(&s, &a), 1.0);
        let eq = Expr::Equals(vec![Expr::state_fluent(0), Expr::constant(1.0)]);
        assert_eq!(eq.evaluate(&s, &a), 1.0);
    }

    #[test]
    fn arithmetic() {
        let s = state(vec![4.0, 2.0]);
        let a = action(vec![]);
        let sub = Expr::Subtraction(vec![
            Expr::state_fluent(0),
            Expr::state_fluent(1),
            Expr::constant(1.0),
        ]);
        assert_eq!(sub.evaluate(&s, &a), 1.0);
        let div = Expr::Division(vec![Expr::state_fluent(0), Expr::state_fluent(1)]);
        assert_eq!(div.evaluate(&s, &a), 2.0);
    }

    #[test]
    fn conditionals_choose_branches() {
        let s = state(vec![0.0]);
        let a = action(vec![]);
        let ite = Expr::IfThenElse {
            condition: Expr::state_fluent(0),
            if_true: Expr::constant(10.0),
            if_false: Expr::constant(20.0),
        };
        assert_eq!(ite.evaluate(&s, &a), 20.0);

        let mcc = Expr::MultiCondition {
            conditions: vec![Expr::state_fluent(0), Expr::truth()],
            effects: vec![Expr::constant(1.0), Rc::new(Expr::Constant(2.0))],
        };
        assert_eq!(mcc.evaluate(&s, &a), 2.0);
    }
}
