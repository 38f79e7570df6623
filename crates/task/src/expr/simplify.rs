use crate::Expr;
use crate::ExprRef;
use hzn_core::value_eq;
use hzn_core::value_ge;
use hzn_core::value_gt;
use hzn_core::value_le;
use hzn_core::value_lt;
use hzn_core::Value;
use rustc_hash::FxHashMap;
use std::rc::Rc;

/// State fluents discovered to be constant, by index.
pub type Simplifications = FxHashMap<usize, Value>;

impl Expr {
    /// Constant-folds the formula under a table of discovered constants.
    ///
    /// Flattens associative connectives, exploits short-circuits (0 in
    /// multiplication, false in conjunction, true in disjunction), and
    /// rewrites `if c then 1 else 0` to `c` and if-else-if chains into a
    /// multi-condition checker.
    pub fn simplify(&self, replacements: &Simplifications) -> ExprRef {
        match self {
            Expr::StateFluent(index) => match replacements.get(index) {
                Some(&value) => Expr::constant(value),
                None => Expr::state_fluent(*index),
            },
            Expr::ActionFluent(index) => Expr::action_fluent(*index),
            Expr::Constant(value) => Expr::constant(*value),

            Expr::Conjunction(children) => simplify_conjunction(children, replacements),
            Expr::Disjunction(children) => simplify_disjunction(children, replacements),
            Expr::Equals(children) => simplify_equals(children, replacements),
            Expr::Greater(children) => {
                simplify_comparison(children, replacements, value_gt, Expr::Greater)
            }
            Expr::Lower(children) => {
                simplify_comparison(children, replacements, value_lt, Expr::Lower)
            }
            Expr::GreaterEquals(children) => {
                simplify_comparison(children, replacements, value_ge, Expr::GreaterEquals)
            }
            Expr::LowerEquals(children) => {
                simplify_comparison(children, replacements, value_le, Expr::LowerEquals)
            }

            Expr::Addition(children) => simplify_addition(children, replacements),
            Expr::Subtraction(children) => simplify_subtraction(children, replacements),
            Expr::Multiplication(children) => simplify_multiplication(children, replacements),
            Expr::Division(children) => simplify_division(children, replacements),
            Expr::Negation(child) => simplify_negation(child, replacements),
            Expr::Exponential(child) => {
                let child = child.simplify(replacements);
                match child.as_constant() {
                    Some(value) => Expr::constant(value.exp()),
                    None => Rc::new(Expr::Exponential(child)),
                }
            }

            Expr::KronDelta(child) => child.simplify(replacements),
            Expr::Bernoulli(child) => simplify_bernoulli(child, replacements),
            Expr::Discrete {
                values,
                probabilities,
            } => simplify_discrete(values, probabilities, replacements),

            Expr::IfThenElse {
                condition,
                if_true,
                if_false,
            } => simplify_if_then_else(condition, if_true, if_false, replacements),
            Expr::MultiCondition {
                conditions,
                effects,
            } => simplify_multi_condition(conditions, effects, replacements),

            // Schematic nodes pass through untouched; grounding removes them
            // before the simplifier runs in the pipeline.
            schematic => Rc::new(schematic.clone()),
        }
    }
}

fn simplify_conjunction(children: &[ExprRef], replacements: &Simplifications) -> ExprRef {
    let mut kept: Vec<ExprRef> = Vec::new();
    for child in children {
        let child = child.simplify(replacements);
        match child.as_constant() {
            // false element: the whole conjunction is false
            Some(value) if value_eq(value, 0.0) => return Expr::falsity(),
            // true element: can be omitted
            Some(_) => {}
            None => match &*child {
                Expr::Conjunction(nested) => kept.extend(nested.iter().cloned()),
                _ => kept.push(child),
            },
        }
    }
    match kept.len() {
        0 => Expr::truth(),
        1 => kept.pop().expect("one element"),
        _ => Rc::new(Expr::Conjunction(kept)),
    }
}

fn simplify_disjunction(children: &[ExprRef], replacements: &Simplifications) -> ExprRef {
    let mut kept: Vec<ExprRef> = Vec::new();
    for child in children {
        let child = child.simplify(replacements);
        match child.as_constant() {
            // true element: the whole disjunction is true
            Some(value) if !value_eq(value, 0.0) => return Expr::truth(),
            Some(_) => {}
            None => match &*child {
                Expr::Disjunction(nested) => kept.extend(nested.iter().cloned()),
                _ => kept.push(child),
            },
        }
    }
    match kept.len() {
        0 => Expr::falsity(),
        1 => kept.pop().expect("one element"),
        _ => Rc::new(Expr::Disjunction(kept)),
    }
}

fn simplify_equals(children: &[ExprRef], replacements: &Simplifications) -> ExprRef {
    let mut kept: Vec<ExprRef> = Vec::new();
    let mut comparator: Option<Value> = None;
    for child in children {
        let child = child.simplify(replacements);
        match child.as_constant() {
            Some(value) => match comparator {
                Some(previous) if !value_eq(previous, value) => return Expr::falsity(),
                Some(_) => {}
                None => {
                    comparator = Some(value);
                    kept.push(child);
                }
            },
            None => kept.push(child),
        }
    }
    if kept.len() == 1 {
        // all children were constant and equal, or there was only one
        return Expr::truth();
    }
    Rc::new(Expr::Equals(kept))
}

fn simplify_comparison(
    children: &[ExprRef],
    replacements: &Simplifications,
    holds: fn(Value, Value) -> bool,
    rebuild: fn(Vec<ExprRef>) -> Expr,
) -> ExprRef {
    debug_assert_eq!(children.len(), 2);
    let lhs = children[0].simplify(replacements);
    let rhs = children[1].simplify(replacements);
    if let (Some(lhs), Some(rhs)) = (lhs.as_constant(), rhs.as_constant()) {
        return if holds(lhs, rhs) {
            Expr::truth()
        } else {
            Expr::falsity()
        };
    }
    Rc::new(rebuild(vec![lhs, rhs]))
}

fn simplify_addition(children: &[ExprRef], replacements: &Simplifications) -> ExprRef {
    let mut kept: Vec<ExprRef> = Vec::new();
    let mut constant = 0.0;
    for child in children {
        let child = child.simplify(replacements);
        match child.as_constant() {
            Some(value) => constant += value,
            None => match &*child {
                Expr::Addition(nested) => {
                    // a merged addition keeps its constant element last
                    for sub in nested {
                        match sub.as_constant() {
                            Some(value) => constant += value,
                            None => kept.push(sub.clone()),
                        }
                    }
                }
                _ => kept.push(child),
            },
        }
    }
    if kept.is_empty() {
        return Expr::constant(constant);
    }
    if kept.len() == 1 && value_eq(constant, 0.0) {
        return kept.pop().expect("one element");
    }
    if !value_eq(constant, 0.0) {
        kept.push(Expr::constant(constant));
    }
    Rc::new(Expr::Addition(kept))
}

fn simplify_subtraction(children: &[ExprRef], replacements: &Simplifications) -> ExprRef {
    debug_assert!(children.len() >= 2);
    let mut kept: Vec<ExprRef> = Vec::new();
    let first = children[0].simplify(replacements);
    let mut constant = 0.0;
    let first_is_constant = match first.as_constant() {
        Some(value) => {
            constant = value;
            true
        }
        None => {
            kept.push(first);
            false
        }
    };
    for child in &children[1..] {
        let child = child.simplify(replacements);
        match child.as_constant() {
            Some(value) => constant -= value,
            None => kept.push(child),
        }
    }
    if kept.is_empty() {
        return Expr::constant(constant);
    }
    if first_is_constant {
        kept.insert(0, Expr::constant(constant));
    } else if !value_eq(constant, 0.0) {
        kept.push(Expr::constant(-constant));
    }
    if kept.len() == 1 {
        return kept.pop().expect("one element");
    }
    Rc::new(Expr::Subtraction(kept))
}

fn simplify_multiplication(children: &[ExprRef], replacements: &Simplifications) -> ExprRef {
    let mut kept: Vec<ExprRef> = Vec::new();
    let mut constant = 1.0;
    for child in children {
        let child = child.simplify(replacements);
        match child.as_constant() {
            Some(value) if value_eq(value, 0.0) => return Expr::falsity(),
            Some(value) => constant *= value,
            None => kept.push(child),
        }
    }
    if !value_eq(constant, 1.0) {
        kept.push(Expr::constant(constant));
    }
    match kept.len() {
        0 => Expr::truth(),
        1 => kept.pop().expect("one element"),
        _ => Rc::new(Expr::Multiplication(kept)),
    }
}

fn simplify_division(children: &[ExprRef], replacements: &Simplifications) -> ExprRef {
    debug_assert_eq!(children.len(), 2);
    let lhs = children[0].simplify(replacements);
    let rhs = children[1].simplify(replacements);
    if let (Some(lhs), Some(rhs)) = (lhs.as_constant(), rhs.as_constant()) {
        return Expr::constant(lhs / rhs);
    }
    Rc::new(Expr::Division(vec![lhs, rhs]))
}

fn simplify_negation(child: &ExprRef, replacements: &Simplifications) -> ExprRef {
    let child = child.simplify(replacements);
    if let Some(value) = child.as_constant() {
        return if value_eq(value, 0.0) {
            Expr::truth()
        } else {
            Expr::falsity()
        };
    }
    if let Expr::Negation(inner) = &*child {
        return inner.clone();
    }
    Rc::new(Expr::Negation(child))
}

fn simplify_bernoulli(child: &ExprRef, replacements: &Simplifications) -> ExprRef {
    let child = child.simplify(replacements);
    if let Some(value) = child.as_constant() {
        if value_le(value, 0.0) {
            return Expr::falsity();
        }
        if value_ge(value, 1.0) {
            return Expr::truth();
        }
    }
    Rc::new(Expr::Bernoulli(child))
}

fn simplify_discrete(
    values: &[ExprRef],
    probabilities: &[ExprRef],
    replacements: &Simplifications,
) -> ExprRef {
    let mut kept_values: Vec<ExprRef> = Vec::new();
    let mut kept_probs: Vec<ExprRef> = Vec::new();
    for (value, prob) in values.iter().zip(probabilities.iter()) {
        let value = value.simplify(replacements);
        let prob = prob.simplify(replacements);
        // drop branches with constant probability zero
        if matches!(prob.as_constant(), Some(p) if value_eq(p, 0.0)) {
            continue;
        }
        kept_values.push(value);
        kept_probs.push(prob);
    }
    debug_assert!(!kept_values.is_empty());
    if kept_values.len() == 1 {
        // the single surviving value must carry all probability mass
        return kept_values.pop().expect("one element");
    }
    Rc::new(Expr::Discrete {
        values: kept_values,
        probabilities: kept_probs,
    })
}

fn simplify_if_then_else(
    condition: &ExprRef,
    if_true: &ExprRef,
    if_false: &ExprRef,
    replacements: &Simplifications,
) -> ExprRef {
    let condition = condition.simplify(replacements);
    let if_true = if_true.simplify(replacements);
    let if_false = if_false.simplify(replacements);

    if let Some(value) = condition.as_constant() {
        return if value_eq(value, 0.0) { if_false } else { if_true };
    }

    if let (Some(t), Some(f)) = (if_true.as_constant(), if_false.as_constant()) {
        if value_eq(t, 1.0) && value_eq(f, 0.0) {
            return condition;
        }
        if value_eq(t, 0.0) && value_eq(f, 1.0) {
            return Expr::Negation(condition).simplify(replacements);
        }
        if value_eq(t, f) {
            return if_true;
        }
    }

    // fold if-else-if chains into one multi-condition checker
    match &*if_false {
        Expr::IfThenElse {
            condition: nested_cond,
            if_true: nested_true,
            if_false: nested_false,
        } => Expr::MultiCondition {
            conditions: vec![condition, nested_cond.clone(), Expr::truth()],
            effects: vec![if_true, nested_true.clone(), nested_false.clone()],
        }
        .simplify(replacements),
        Expr::MultiCondition {
            conditions,
            effects,
        } => {
            let mut all_conditions = vec![condition];
            all_conditions.extend(conditions.iter().cloned());
            let mut all_effects = vec![if_true];
            all_effects.extend(effects.iter().cloned());
            Expr::MultiCondition {
                conditions: all_conditions,
                effects: all_effects,
            }
            .simplify(replacements)
        }
        _ => Rc::new(Expr::IfThenElse {
            condition,
            if_true,
            if_false,
        }),
    }
}

fn simplify_multi_condition(
    conditions: &[ExprRef],
    effects: &[ExprRef],
    replacements: &Simplifications,
) -> ExprRef {
    let mut kept_conditions: Vec<ExprRef> = Vec::new();
    let mut kept_effects: Vec<ExprRef> = Vec::new();
    for (condition, effect) in conditions.iter().zip(effects.iter()) {
        let condition = condition.simplify(replacements);
        let effect = effect.simplify(replacements);
        match condition.as_constant() {
            // an unreachable case is dropped
            Some(value) if value_eq(value, 0.0) => continue,
            // a certain case terminates the chain
            Some(_) => {
                kept_conditions.push(Expr::truth());
                kept_effects.push(effect);
                break;
            }
            None => {
                kept_conditions.push(condition);
                kept_effects.push(effect);
            }
        }
    }
    if kept_conditions.len() == 1 {
        if let Some(value) = kept_conditions[0].as_constant() {
            if !value_eq(value, 0.0) {
                return kept_effects.pop().expect("one effect");
            }
        }
    }
    Rc::new(Expr::MultiCondition {
        conditions: kept_conditions,
        effects: kept_effects,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simplified(expr: Expr) -> ExprRef {
        expr.simplify(&Simplifications::default())
    }

    #[test]
    fn conjunction_short_circuits_on_false() {
        let expr = Expr::Conjunction(vec![Expr::state_fluent(0), Expr::falsity()]);
        assert_eq!(simplified(expr).as_constant(), Some(0.0));
    }

    #[test]
    fn conjunction_drops_true_and_flattens() {
        let nested = Rc::new(Expr::Conjunction(vec![
            Expr::state_fluent(1),
            Expr::state_fluent(2),
        ]));
        let expr = Expr::Conjunction(vec![Expr::truth(), Expr::state_fluent(0), nested]);
        match &*simplified(expr) {
            Expr::Conjunction(children) => assert_eq!(children.len(), 3),
            other => panic!("expected conjunction, got {}", other),
        }
    }

    #[test]
    fn addition_folds_constants_last() {
        let expr = Expr::Addition(vec![
            Expr::constant(2.0),
            Expr::state_fluent(0),
            Expr::constant(3.0),
        ]);
        match &*simplified(expr) {
            Expr::Addition(children) => {
                assert_eq!(children.len(), 2);
                assert_eq!(children[1].as_constant(), Some(5.0));
            }
            other => panic!("expected addition, got {}", other),
        }
    }

    #[test]
    fn multiplication_short_circuits_on_zero() {
        let expr = Expr::Multiplication(vec![Expr::state_fluent(0), Expr::falsity()]);
        assert_eq!(simplified(expr).as_constant(), Some(0.0));
    }

    #[test]
    fn double_negation_cancels() {
        let expr = Expr::Negation(Rc::new(Expr::Negation(Expr::state_fluent(0))));
        assert!(matches!(&*simplified(expr), Expr::StateFluent(0)));
    }

    #[test]
    fn boolean_if_becomes_condition() {
        let expr = Expr::IfThenElse {
            condition: Expr::state_fluent(0),
            if_true: Expr::truth(),
            if_false: Expr::falsity(),
        };
        assert!(matches!(&*simplified(expr), Expr::StateFluent(0)));
    }

    #[test]
    fn if_chain_becomes_multi_condition() {
        let inner = Rc::new(Expr::IfThenElse {
            condition: Expr::state_fluent(1),
            if_true: Expr::constant(2.0),
            if_false: Expr::constant(3.0),
        });
        let expr = Expr::IfThenElse {
            condition: Expr::state_fluent(0),
            if_true: Expr::constant(1.0),
            if_false: inner,
        };
        match &*simplified(expr) {
            Expr::MultiCondition { conditions, .. } => {
                assert_eq!(conditions.len(), 3);
                assert_eq!(conditions[2].as_constant(), Some(1.0));
            }
            other => panic!("expected multi-condition checker, got {}", other),
        }
    }

    #[test]
    fn discovered_constants_propagate() {
        let mut replacements = Simplifications::default();
        replacements.insert(0, 1.0);
        let expr = Expr::Conjunction(vec![Expr::state_fluent(0), Expr::state_fluent(1)]);
        assert!(matches!(
            &*expr.simplify(&replacements),
            Expr::StateFluent(1)
        ));
    }

    #[test]
    fn bernoulli_bounds_collapse() {
        assert_eq!(
            simplified(Expr::Bernoulli(Expr::constant(0.0))).as_constant(),
            Some(0.0)
        );
        assert_eq!(
            simplified(Expr::Bernoulli(Expr::constant(1.0))).as_constant(),
            Some(1.0)
        );
        assert!(matches!(
            &*simplified(Expr::Bernoulli(Expr::constant(0.4))),
            Expr::Bernoulli(_)
        ));
    }

    #[test]
    fn discrete_drops_zero_probability_branches() {
        let expr = Expr::Discrete {
            values: vec![Expr::constant(1.0), Expr::constant(2.0)],
            probabilities: vec![Expr::constant(0.0), Expr::constant(1.0)],
        };
        assert_eq!(simplified(expr).as_constant(), Some(2.0));
    }
}
