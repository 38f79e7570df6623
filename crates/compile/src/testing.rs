//! Hand-built schematic tasks for tests and examples.

use crate::preprocess;
use hzn_task::CpfSchema;
use hzn_task::Expr;
use hzn_task::ExprRef;
use hzn_task::GroundTask;
use hzn_task::ObjectDecl;
use hzn_task::QuantifierKind;
use hzn_task::SchematicTask;
use hzn_task::TypeDecl;
use hzn_task::ValueType;
use hzn_task::VariableKind;
use hzn_task::VariableSchema;
use std::collections::BTreeMap;
use std::rc::Rc;

/// A schematic variable reference; arguments starting with `?` become
/// parameters, everything else an object literal.
pub fn var(name: &str, args: &[&str]) -> ExprRef {
    Rc::new(Expr::Variable {
        name: name.to_string(),
        args: args
            .iter()
            .map(|&arg| -> ExprRef {
                if arg.starts_with('?') {
                    Rc::new(Expr::Parameter(arg.to_string()))
                } else {
                    Rc::new(Expr::Object(arg.to_string()))
                }
            })
            .collect(),
    })
}

fn schema(
    name: &str,
    params: &[&str],
    kind: VariableKind,
    default_value: f64,
) -> VariableSchema {
    VariableSchema {
        name: name.to_string(),
        params: params.iter().map(|&p| p.to_string()).collect(),
        kind,
        value_type: ValueType::Bool,
        default_value,
        level: 0,
    }
}

/// The counter chain: `progress(?c)' = progress(?c) | advance(?c)`, reward
/// is the number of finished counters, one action per step.
pub fn tiny_counter_task(counters: usize) -> SchematicTask {
    SchematicTask {
        types: vec![TypeDecl {
            name: "counter".to_string(),
            super_type: None,
        }],
        objects: (0..counters)
            .map(|i| ObjectDecl {
                name: format!("c{}", i),
                object_type: "counter".to_string(),
            })
            .collect(),
        variables: vec![
            schema("progress", &["counter"], VariableKind::StateFluent, 0.0),
            schema("advance", &["counter"], VariableKind::ActionFluent, 0.0),
        ],
        cpfs: vec![CpfSchema {
            name: "progress".to_string(),
            params: vec!["?c".to_string()],
            formula: Rc::new(Expr::Disjunction(vec![
                var("progress", &["?c"]),
                var("advance", &["?c"]),
            ])),
        }],
        reward: Rc::new(Expr::Quantifier {
            kind: QuantifierKind::Sum,
            params: vec![("?c".to_string(), "counter".to_string())],
            body: var("progress", &["?c"]),
        }),
        preconditions: Vec::new(),
        initial_values: BTreeMap::new(),
        horizon: 3,
        max_concurrent_actions: 1,
        discount: 1.0,
    }
}

/// The counter chain, compiled.
pub fn compiled_counter_task(counters: usize) -> GroundTask {
    preprocess(&tiny_counter_task(counters)).expect("counter task compiles")
}

/// One Bernoulli variable driven by an action: `lit' = Bernoulli(0.7)` when
/// flipping, `Bernoulli(0.3)` otherwise, plus a deterministic follower
/// variable. With `reward_on_action` the reward also pays for flipping,
/// which makes the flip action distinguishable under pruning.
pub fn bernoulli_flipflop_task(reward_on_action: bool) -> SchematicTask {
    let reward: ExprRef = if reward_on_action {
        Rc::new(Expr::Addition(vec![
            var("lit", &[]),
            Rc::new(Expr::Multiplication(vec![
                Expr::constant(0.1),
                var("flip", &[]),
            ])),
        ]))
    } else {
        var("lit", &[])
    };
    SchematicTask {
        types: Vec::new(),
        objects: Vec::new(),
        variables: vec![
            schema("lit", &[], VariableKind::StateFluent, 0.0),
            schema("memory", &[], VariableKind::StateFluent, 0.0),
            schema("flip", &[], VariableKind::ActionFluent, 0.0),
        ],
        cpfs: vec![
            CpfSchema {
                name: "memory".to_string(),
                params: Vec::new(),
                formula: var("lit", &[]),
            },
            CpfSchema {
                name: "lit".to_string(),
                params: Vec::new(),
                formula: Rc::new(Expr::Bernoulli(Rc::new(Expr::IfThenElse {
                    condition: var("flip", &[]),
                    if_true: Expr::constant(0.7),
                    if_false: Expr::constant(0.3),
                }))),
            },
        ],
        reward,
        preconditions: Vec::new(),
        initial_values: BTreeMap::new(),
        horizon: 10,
        max_concurrent_actions: 1,
        discount: 1.0,
    }
}

/// A trap domain: `dead` and `goal` are absorbing, the reward is their
/// difference, so a dead state is a minimal reward lock and a goal state a
/// maximal one.
pub fn reward_lock_task() -> SchematicTask {
    SchematicTask {
        types: Vec::new(),
        objects: Vec::new(),
        variables: vec![
            schema("dead", &[], VariableKind::StateFluent, 0.0),
            schema("goal", &[], VariableKind::StateFluent, 0.0),
            schema("fall", &[], VariableKind::ActionFluent, 0.0),
            schema("win", &[], VariableKind::ActionFluent, 0.0),
        ],
        cpfs: vec![
            CpfSchema {
                name: "dead".to_string(),
                params: Vec::new(),
                formula: Rc::new(Expr::Disjunction(vec![
                    var("dead", &[]),
                    var("fall", &[]),
                ])),
            },
            CpfSchema {
                name: "goal".to_string(),
                params: Vec::new(),
                formula: Rc::new(Expr::Disjunction(vec![
                    var("goal", &[]),
                    Rc::new(Expr::Conjunction(vec![
                        var("win", &[]),
                        Rc::new(Expr::Negation(var("dead", &[]))),
                    ])),
                ])),
            },
        ],
        reward: Rc::new(Expr::Subtraction(vec![var("goal", &[]), var("dead", &[])])),
        preconditions: Vec::new(),
        initial_values: BTreeMap::new(),
        horizon: 5,
        max_concurrent_actions: 1,
        discount: 1.0,
    }
}

/// A single CPF reading `bits` boolean variables at once; past 63 variables
/// the per-expression hash base overflows the machine word and caching must
/// shut off.
pub fn wide_boolean_task(bits: usize) -> SchematicTask {
    SchematicTask {
        types: vec![TypeDecl {
            name: "bit".to_string(),
            super_type: None,
        }],
        objects: (0..bits)
            .map(|i| ObjectDecl {
                name: format!("b{}", i),
                object_type: "bit".to_string(),
            })
            .collect(),
        variables: vec![schema("on", &["bit"], VariableKind::StateFluent, 1.0)],
        cpfs: vec![CpfSchema {
            name: "on".to_string(),
            params: vec!["?b".to_string()],
            formula: Rc::new(Expr::Conjunction(vec![
                var("on", &["?b"]),
                Rc::new(Expr::Quantifier {
                    kind: QuantifierKind::Exists,
                    params: vec![("?c".to_string(), "bit".to_string())],
                    body: var("on", &["?c"]),
                }),
            ])),
        }],
        reward: Rc::new(Expr::Quantifier {
            kind: QuantifierKind::Sum,
            params: vec![("?b".to_string(), "bit".to_string())],
            body: var("on", &["?b"]),
        }),
        preconditions: Vec::new(),
        initial_values: BTreeMap::new(),
        horizon: 4,
        max_concurrent_actions: 1,
        discount: 1.0,
    }
}

/// Two action families over three objects with a mutual-exclusion
/// precondition `forall ?p: ¬(left(?p) ∧ right(?p))` under concurrency 2.
pub fn mutex_task() -> SchematicTask {
    SchematicTask {
        types: vec![TypeDecl {
            name: "slot".to_string(),
            super_type: None,
        }],
        objects: (0..3)
            .map(|i| ObjectDecl {
                name: format!("p{}", i),
                object_type: "slot".to_string(),
            })
            .collect(),
        variables: vec![
            schema("done", &["slot"], VariableKind::StateFluent, 0.0),
            schema("left", &["slot"], VariableKind::ActionFluent, 0.0),
            schema("right", &["slot"], VariableKind::ActionFluent, 0.0),
        ],
        cpfs: vec![CpfSchema {
            name: "done".to_string(),
            params: vec!["?p".to_string()],
            formula: Rc::new(Expr::Disjunction(vec![
                var("done", &["?p"]),
                var("left", &["?p"]),
                var("right", &["?p"]),
            ])),
        }],
        reward: Rc::new(Expr::Quantifier {
            kind: QuantifierKind::Sum,
            params: vec![("?p".to_string(), "slot".to_string())],
            body: var("done", &["?p"]),
        }),
        preconditions: vec![Rc::new(Expr::Quantifier {
            kind: QuantifierKind::Forall,
            params: vec![("?p".to_string(), "slot".to_string())],
            body: Rc::new(Expr::Negation(Rc::new(Expr::Conjunction(vec![
                var("left", &["?p"]),
                var("right", &["?p"]),
            ])))),
        })],
        initial_values: BTreeMap::new(),
        horizon: 4,
        max_concurrent_actions: 2,
        discount: 1.0,
    }
}
