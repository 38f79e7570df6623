use crate::Grounding;
use hzn_core::value_eq;
use hzn_task::Expr;
use hzn_task::ExprInfo;
use hzn_task::ExprRef;
use hzn_task::Simplifications;
use hzn_task::TaskError;

/// The grounding after the constant-discovery fixpoint: surviving CPFs,
/// the simplified reward, and preconditions split by what they read.
#[derive(Debug)]
pub struct SimplifiedGrounding {
    /// `(provisional head index, formula)` of every CPF that did not
    /// collapse to a constant.
    pub cpfs: Vec<(usize, ExprRef)>,
    pub reward: ExprRef,
    /// Preconditions over action fluents only; consumed by legal-action
    /// enumeration.
    pub static_preconditions: Vec<ExprRef>,
    /// Preconditions over state and action fluents; evaluated at runtime.
    pub dynamic_preconditions: Vec<ExprRef>,
    /// Preconditions over state fluents only; checked against the initial
    /// state and then dropped.
    pub state_invariants: Vec<ExprRef>,
    /// Discovered constant state fluents, by provisional index.
    pub discovered_constants: Simplifications,
}

/// Runs the simplification fixpoint.
///
/// Each round simplifies every CPF under the table of already-discovered
/// constants; a CPF whose formula collapses to a constant declares its head
/// a discovered constant, leaves the live set, and restarts the loop.
/// Afterwards the preconditions are simplified once: a precondition that
/// reduces to true is discarded, one that reduces to false makes the task
/// infeasible.
pub fn simplify(grounding: &Grounding) -> Result<SimplifiedGrounding, TaskError> {
    let mut discovered = Simplifications::default();
    let mut live: Vec<(usize, ExprRef)> = grounding.cpfs.clone();

    'fixpoint: loop {
        for position in 0..live.len() {
            let (head, formula) = live[position].clone();
            let simplified = formula.simplify(&discovered);
            if let Some(value) = simplified.as_constant() {
                log::info!(
                    "state variable `{}` is constant {}",
                    grounding.state_fluent_names[head],
                    value
                );
                discovered.insert(head, value);
                live.remove(position);
                continue 'fixpoint;
            }
            live[position] = (head, simplified);
        }
        break;
    }

    let reward = grounding.reward.simplify(&discovered);

    let mut static_preconditions: Vec<ExprRef> = Vec::new();
    let mut dynamic_preconditions: Vec<ExprRef> = Vec::new();
    let mut state_invariants: Vec<ExprRef> = Vec::new();
    for precondition in &grounding.preconditions {
        let simplified = precondition.simplify(&discovered);
        if let Some(value) = simplified.as_constant() {
            if value_eq(value, 0.0) {
                return Err(TaskError::Infeasible(format!(
                    "precondition `{}` is unsatisfiable",
                    precondition
                )));
            }
            // a tautological precondition constrains nothing
            continue;
        }
        let mut info = ExprInfo::default();
        simplified.collect_info(&mut info);
        match (info.state_fluents.is_empty(), info.action_fluents.is_empty()) {
            (true, false) => static_preconditions.push(simplified),
            (false, false) => dynamic_preconditions.push(simplified),
            (false, true) => state_invariants.push(simplified),
            (true, true) => unreachable!("non-constant precondition reads nothing"),
        }
    }

    Ok(SimplifiedGrounding {
        cpfs: live,
        reward,
        static_preconditions,
        dynamic_preconditions,
        state_invariants,
        discovered_constants: discovered,
    })
}

/// Rewrites state-fluent indices through `map` (old provisional index to
/// final index), used after the deterministic-first variable ordering.
pub fn remap_state_fluents(expr: &ExprRef, map: &[usize]) -> ExprRef {
    use std::rc::Rc;
    let remap_all = |children: &[ExprRef]| -> Vec<ExprRef> {
        children
            .iter()
            .map(|child| remap_state_fluents(child, map))
            .collect()
    };
    match &**expr {
        Expr::StateFluent(index) => Expr::state_fluent(map[*index]),
        Expr::ActionFluent(_) | Expr::Constant(_) => expr.clone(),
        Expr::Conjunction(children) => Rc::new(Expr::Conjunction(remap_all(children))),
        Expr::Disjunction(children) => Rc::new(Expr::Disjunction(remap_all(children))),
        Expr::Equals(children) => Rc::new(Expr::Equals(remap_all(children))),
        Expr::Greater(children) => Rc::new(Expr::Greater(remap_all(children))),
        Expr::Lower(children) => Rc::new(Expr::Lower(remap_all(children))),
        Expr::GreaterEquals(children) => Rc::new(Expr::GreaterEquals(remap_all(children))),
        Expr::LowerEquals(children) => Rc::new(Expr::LowerEquals(remap_all(children))),
        Expr::Addition(children) => Rc::new(Expr::Addition(remap_all(children))),
        Expr::Subtraction(children) => Rc::new(Expr::Subtraction(remap_all(children))),
        Expr::Multiplication(children) => Rc::new(Expr::Multiplication(remap_all(children))),
        Expr::Division(children) => Rc::new(Expr::Division(remap_all(children))),
        Expr::Negation(child) => Rc::new(Expr::Negation(remap_state_fluents(child, map))),
        Expr::Exponential(child) => Rc::new(Expr::Exponential(remap_state_fluents(child, map))),
        Expr::KronDelta(child) => Rc::new(Expr::KronDelta(remap_state_fluents(child, map))),
        Expr::Bernoulli(child) => Rc::new(Expr::Bernoulli(remap_state_fluents(child, map))),
        Expr::Discrete {
            values,
            probabilities,
        } => Rc::new(Expr::Discrete {
            values: remap_all(values),
            probabilities: remap_all(probabilities),
        }),
        Expr::IfThenElse {
            condition,
            if_true,
            if_false,
        } => Rc::new(Expr::IfThenElse {
            condition: remap_state_fluents(condition, map),
            if_true: remap_state_fluents(if_true, map),
            if_false: remap_state_fluents(if_false, map),
        }),
        Expr::MultiCondition {
            conditions,
            effects,
        } => Rc::new(Expr::MultiCondition {
            conditions: remap_all(conditions),
            effects: remap_all(effects),
        }),
        schematic => unreachable!("schematic node in index remapping: {}", schematic),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ground;
    use crate::testing::tiny_counter_task;
    use std::rc::Rc;

    #[test]
    fn fixpoint_discovers_chained_constants() {
        // two variables: x' = 1 and y' = x; both collapse
        let mut grounding = ground(&tiny_counter_task(1)).unwrap();
        grounding.state_fluent_names = vec!["x".to_string(), "y".to_string()];
        grounding.initial_values = vec![1.0, 1.0];
        grounding.cpfs = vec![
            (0, Expr::truth()),
            (1, Expr::state_fluent(0)),
        ];
        grounding.preconditions.clear();
        let simplified = simplify(&grounding).unwrap();
        assert!(simplified.cpfs.is_empty());
        assert_eq!(simplified.discovered_constants.len(), 2);
    }

    #[test]
    fn false_precondition_is_infeasible() {
        let mut grounding = ground(&tiny_counter_task(1)).unwrap();
        grounding.preconditions = vec![Expr::falsity()];
        assert!(matches!(
            simplify(&grounding),
            Err(TaskError::Infeasible(_))
        ));
    }

    #[test]
    fn preconditions_are_classified_by_what_they_read() {
        let mut grounding = ground(&tiny_counter_task(2)).unwrap();
        grounding.preconditions = vec![
            // static: actions only
            Rc::new(Expr::Negation(Rc::new(Expr::Conjunction(vec![
                Expr::action_fluent(0),
                Expr::action_fluent(1),
            ])))),
            // dynamic: state and action
            Rc::new(Expr::Disjunction(vec![
                Rc::new(Expr::Negation(Expr::action_fluent(0))),
                Expr::state_fluent(1),
            ])),
            // invariant: state only
            Rc::new(Expr::Disjunction(vec![
                Expr::state_fluent(0),
                Rc::new(Expr::Negation(Expr::state_fluent(0))),
            ])),
            // tautology: dropped
            Expr::truth(),
        ];
        let simplified = simplify(&grounding).unwrap();
        assert_eq!(simplified.static_preconditions.len(), 1);
        assert_eq!(simplified.dynamic_preconditions.len(), 1);
        // the state-only disjunction simplifies structurally but stays
        assert_eq!(simplified.state_invariants.len(), 1);
    }

    #[test]
    fn remapping_rewrites_fluent_indices() {
        let expr = Rc::new(Expr::Addition(vec![
            Expr::state_fluent(0),
            Expr::state_fluent(2),
        ]));
        let remapped = remap_state_fluents(&expr, &[2, 0, 1]);
        match &*remapped {
            Expr::Addition(children) => {
                assert!(matches!(&*children[0], Expr::StateFluent(2)));
                assert!(matches!(&*children[1], Expr::StateFluent(1)));
            }
            other => panic!("expected addition, got {}", other),
        }
    }
}
