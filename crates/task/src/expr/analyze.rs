use crate::Expr;
use hzn_core::value_ge;
use std::collections::BTreeSet;

/// Facts about a formula gathered in one bottom-up pass: whether it nests a
/// probabilistic atom, whether it contains non-trivial arithmetic, and the
/// ground fluents it reads.
#[derive(Debug, Clone, Default)]
pub struct ExprInfo {
    pub is_probabilistic: bool,
    pub has_arithmetic: bool,
    pub state_fluents: BTreeSet<usize>,
    pub action_fluents: BTreeSet<usize>,
}

impl Expr {
    /// Accumulates [`ExprInfo`] over the subtree.
    pub fn collect_info(&self, info: &mut ExprInfo) {
        match self {
            Expr::StateFluent(index) => {
                info.state_fluents.insert(*index);
            }
            Expr::ActionFluent(index) => {
                info.action_fluents.insert(*index);
            }
            Expr::Constant(_) => {}

            Expr::Conjunction(children) | Expr::Disjunction(children) | Expr::Equals(children) => {
                for child in children {
                    child.collect_info(info);
                }
            }
            Expr::Greater(children)
            | Expr::Lower(children)
            | Expr::GreaterEquals(children)
            | Expr::LowerEquals(children)
            | Expr::Addition(children)
            | Expr::Subtraction(children)
            | Expr::Multiplication(children)
            | Expr::Division(children) => {
                for child in children {
                    child.collect_info(info);
                }
                info.has_arithmetic = true;
            }
            Expr::Negation(child) => child.collect_info(info),
            Expr::Exponential(child) => {
                child.collect_info(info);
                info.has_arithmetic = true;
            }

            Expr::KronDelta(child) => child.collect_info(info),
            Expr::Bernoulli(child) => {
                child.collect_info(info);
                info.is_probabilistic = true;
            }
            Expr::Discrete {
                values,
                probabilities,
            } => {
                for (value, prob) in values.iter().zip(probabilities.iter()) {
                    value.collect_info(info);
                    prob.collect_info(info);
                }
                info.is_probabilistic = true;
            }

            Expr::IfThenElse {
                condition,
                if_true,
                if_false,
            } => {
                condition.collect_info(info);
                if_true.collect_info(info);
                if_false.collect_info(info);
            }
            Expr::MultiCondition {
                conditions,
                effects,
            } => {
                for (condition, effect) in conditions.iter().zip(effects.iter()) {
                    condition.collect_info(info);
                    effect.collect_info(info);
                }
            }

            schematic => unreachable!("schematic node in dependency analysis: {}", schematic),
        }
    }

    /// Splits the action fluents the formula reads into positively- and
    /// negatively-dependent sets.
    ///
    /// Negation flips polarity; subtraction flips it for every child but
    /// the first; binary multiplication and division flip the non-constant
    /// side when the other side is a known negative constant; comparisons
    /// and conditions mark every touched fluent in both sets, which is
    /// conservative but sound.
    pub fn classify_action_fluents(
        &self,
        positive: &mut BTreeSet<usize>,
        negative: &mut BTreeSet<usize>,
    ) {
        match self {
            Expr::StateFluent(_) | Expr::Constant(_) => {}
            Expr::ActionFluent(index) => {
                positive.insert(*index);
            }

            Expr::Conjunction(children) | Expr::Disjunction(children) | Expr::Addition(children) => {
                for child in children {
                    child.classify_action_fluents(positive, negative);
                }
            }
            Expr::Equals(children)
            | Expr::Greater(children)
            | Expr::Lower(children)
            | Expr::GreaterEquals(children)
            | Expr::LowerEquals(children) => {
                both_polarities(children, positive, negative);
            }
            Expr::Subtraction(children) => {
                children[0].classify_action_fluents(positive, negative);
                for child in &children[1..] {
                    child.classify_action_fluents(negative, positive);
                }
            }
            Expr::Multiplication(children) | Expr::Division(children) => {
                classify_scaled(children, positive, negative);
            }
            Expr::Negation(child) => child.classify_action_fluents(negative, positive),
            Expr::Exponential(child) => child.classify_action_fluents(positive, negative),

            Expr::KronDelta(child) | Expr::Bernoulli(child) => {
                child.classify_action_fluents(positive, negative);
            }
            Expr::Discrete {
                values,
                probabilities,
            } => {
                let mut all = values.to_vec();
                all.extend(probabilities.iter().cloned());
                both_polarities(&all, positive, negative);
            }

            Expr::IfThenElse {
                condition,
                if_true,
                if_false,
            } => {
                // condition polarity is unknowable without value analysis
                both_polarities(std::slice::from_ref(condition), positive, negative);
                if_true.classify_action_fluents(positive, negative);
                if_false.classify_action_fluents(positive, negative);
            }
            Expr::MultiCondition {
                conditions,
                effects,
            } => {
                both_polarities(conditions, positive, negative);
                for effect in effects {
                    effect.classify_action_fluents(positive, negative);
                }
            }

            schematic => unreachable!("schematic node in polarity analysis: {}", schematic),
        }
    }
}

/// Marks every action fluent below `children` as both positively and
/// negatively dependent.
fn both_polarities(
    children: &[crate::ExprRef],
    positive: &mut BTreeSet<usize>,
    negative: &mut BTreeSet<usize>,
) {
    let mut touched = BTreeSet::new();
    let mut ignored = BTreeSet::new();
    for child in children {
        child.classify_action_fluents(&mut touched, &mut ignored);
    }
    touched.extend(ignored.iter().copied());
    positive.extend(touched.iter().copied());
    negative.extend(touched.iter().copied());
}

/// Binary multiplication/division: a known negative constant on one side
/// flips the polarity of the other; everything else preserves it.
fn classify_scaled(
    children: &[crate::ExprRef],
    positive: &mut BTreeSet<usize>,
    negative: &mut BTreeSet<usize>,
) {
    if children.len() != 2 {
        both_polarities(children, positive, negative);
        return;
    }
    let lhs_constant = children[0].as_constant();
    let rhs_constant = children[1].as_constant();
    match (lhs_constant, rhs_constant) {
        (Some(value), None) if !value_ge(value, 0.0) => {
            children[1].classify_action_fluents(negative, positive);
        }
        (None, Some(value)) if !value_ge(value, 0.0) => {
            children[0].classify_action_fluents(negative, positive);
        }
        _ => {
            children[0].classify_action_fluents(positive, negative);
            children[1].classify_action_fluents(positive, negative);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ExprRef;
    use std::rc::Rc;

    fn classify(expr: &Expr) -> (BTreeSet<usize>, BTreeSet<usize>) {
        let mut positive = BTreeSet::new();
        let mut negative = BTreeSet::new();
        expr.classify_action_fluents(&mut positive, &mut negative);
        (positive, negative)
    }

    #[test]
    fn collects_fluents_and_flags() {
        let expr = Expr::Addition(vec![
            Expr::state_fluent(2),
            Rc::new(Expr::Bernoulli(Expr::action_fluent(1))),
        ]);
        let mut info = ExprInfo::default();
        expr.collect_info(&mut info);
        assert!(info.is_probabilistic);
        assert!(info.has_arithmetic);
        assert!(info.state_fluents.contains(&2));
        assert!(info.action_fluents.contains(&1));
    }

    #[test]
    fn conjunction_is_not_arithmetic() {
        let expr = Expr::Conjunction(vec![Expr::state_fluent(0), Expr::action_fluent(0)]);
        let mut info = ExprInfo::default();
        expr.collect_info(&mut info);
        assert!(!info.has_arithmetic);
        assert!(!info.is_probabilistic);
    }

    #[test]
    fn negation_flips_polarity() {
        let expr = Expr::Negation(Expr::action_fluent(0));
        let (positive, negative) = classify(&expr);
        assert!(negative.contains(&0));
        assert!(!positive.contains(&0));
    }

    #[test]
    fn subtraction_flips_all_but_first() {
        let expr = Expr::Subtraction(vec![Expr::action_fluent(0), Expr::action_fluent(1)]);
        let (positive, negative) = classify(&expr);
        assert!(positive.contains(&0));
        assert!(negative.contains(&1));
    }

    #[test]
    fn negative_constant_scaling_flips() {
        let expr = Expr::Multiplication(vec![Expr::constant(-2.0), Expr::action_fluent(0)]);
        let (positive, negative) = classify(&expr);
        assert!(negative.contains(&0));
        assert!(!positive.contains(&0));
    }

    #[test]
    fn comparisons_are_conservative() {
        let children: Vec<ExprRef> = vec![Expr::action_fluent(0), Expr::constant(1.0)];
        let expr = Expr::Greater(children);
        let (positive, negative) = classify(&expr);
        assert!(positive.contains(&0));
        assert!(negative.contains(&0));
    }
}
