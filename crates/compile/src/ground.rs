use hzn_core::Value;
use hzn_task::ground_name;
use hzn_task::ActionFluent;
use hzn_task::Expr;
use hzn_task::ExprRef;
use hzn_task::QuantifierKind;
use hzn_task::SchematicTask;
use hzn_task::TaskError;
use hzn_task::Universe;
use hzn_task::VariableKind;
use hzn_task::VariableSchema;
use std::collections::HashMap;
use std::rc::Rc;

/// The result of grounding, before simplification and variable ordering.
///
/// State variables carry provisional indices in declaration order; the
/// preprocessor reorders them (deterministic CPFs first) and rewrites all
/// formulas accordingly.
#[derive(Debug)]
pub struct Grounding {
    pub universe: Universe,
    /// Ground state-variable names, by provisional index.
    pub state_fluent_names: Vec<String>,
    /// Initial value per provisional index.
    pub initial_values: Vec<Value>,
    pub action_fluents: Vec<ActionFluent>,
    /// `(provisional head index, ground formula)` per ground CPF.
    pub cpfs: Vec<(usize, ExprRef)>,
    pub reward: ExprRef,
    pub preconditions: Vec<ExprRef>,
    pub horizon: usize,
    pub max_concurrent_actions: usize,
    pub discount: f64,
}

/// Lookup tables threaded through expression instantiation.
struct GroundContext<'a> {
    universe: &'a Universe,
    schemas: HashMap<&'a str, &'a VariableSchema>,
    state_fluents: HashMap<String, usize>,
    action_fluents: HashMap<String, usize>,
    non_fluents: HashMap<String, Value>,
}

/// Grounds a schematic task: instantiates every schema over the Cartesian
/// product of its parameter types, eliminates quantifiers, and resolves all
/// variable references to indexed ground fluents.
pub fn ground(task: &SchematicTask) -> Result<Grounding, TaskError> {
    if task.horizon == 0 {
        return Err(TaskError::Parse("horizon must be positive".to_string()));
    }
    if task.max_concurrent_actions == 0 {
        return Err(TaskError::Parse(
            "concurrent-action bound must be positive".to_string(),
        ));
    }
    if !(task.discount > 0.0 && task.discount <= 1.0) {
        return Err(TaskError::Parse(
            "discount factor must lie in (0, 1]".to_string(),
        ));
    }

    let mut universe = Universe::new();
    for decl in &task.types {
        universe.declare_type(&decl.name, decl.super_type.as_deref())?;
    }
    for decl in &task.objects {
        universe.declare_object(&decl.name, &decl.object_type)?;
    }

    let mut context = GroundContext {
        universe: &universe,
        schemas: task
            .variables
            .iter()
            .map(|schema| (schema.name.as_str(), schema))
            .collect(),
        state_fluents: HashMap::new(),
        action_fluents: HashMap::new(),
        non_fluents: HashMap::new(),
    };

    let mut state_fluent_names: Vec<String> = Vec::new();
    let mut initial_values: Vec<Value> = Vec::new();
    let mut action_fluents: Vec<ActionFluent> = Vec::new();

    for schema in &task.variables {
        for assignment in parameter_assignments(&universe, &schema.params)? {
            let objects: Vec<&hzn_task::Object> =
                assignment.iter().map(|&id| universe.object(id)).collect();
            let name = schema.ground_name(&objects);
            let initial = task
                .initial_values
                .get(&name)
                .copied()
                .unwrap_or(schema.default_value);
            match schema.kind {
                VariableKind::StateFluent | VariableKind::IntermFluent => {
                    context
                        .state_fluents
                        .insert(name.clone(), state_fluent_names.len());
                    state_fluent_names.push(name);
                    initial_values.push(initial);
                }
                VariableKind::ActionFluent => {
                    let index = action_fluents.len();
                    context.action_fluents.insert(name.clone(), index);
                    action_fluents.push(ActionFluent { name, index });
                }
                VariableKind::NonFluent => {
                    context.non_fluents.insert(name, initial);
                }
            }
        }
    }

    // every explicitly assigned initial value must name a declared fluent
    for name in task.initial_values.keys() {
        let known = context.state_fluents.contains_key(name)
            || context.non_fluents.contains_key(name)
            || context.action_fluents.contains_key(name);
        if !known {
            return Err(TaskError::UndefinedReference {
                kind: "variable",
                name: name.clone(),
            });
        }
    }

    let mut cpfs: Vec<(usize, ExprRef)> = Vec::new();
    for cpf in &task.cpfs {
        let schema = *context
            .schemas
            .get(cpf.name.as_str())
            .ok_or_else(|| TaskError::UndefinedReference {
                kind: "schema",
                name: cpf.name.clone(),
            })?;
        if cpf.params.len() != schema.params.len() {
            return Err(TaskError::Parse(format!(
                "CPF head `{}` binds {} parameters, schema declares {}",
                cpf.name,
                cpf.params.len(),
                schema.params.len()
            )));
        }
        let expanded = expand_quantifiers(&cpf.formula, &universe, &HashMap::new())?;
        for assignment in parameter_assignments(&universe, &schema.params)? {
            let replace: HashMap<String, usize> = cpf
                .params
                .iter()
                .cloned()
                .zip(assignment.iter().copied())
                .collect();
            let objects: Vec<&hzn_task::Object> =
                assignment.iter().map(|&id| universe.object(id)).collect();
            let head = schema.ground_name(&objects);
            let head_index =
                *context
                    .state_fluents
                    .get(&head)
                    .ok_or_else(|| TaskError::UndefinedReference {
                        kind: "state fluent",
                        name: head.clone(),
                    })?;
            let body = instantiate(&expanded, &context, &replace)?;
            cpfs.push((head_index, body));
        }
    }

    // every ground state variable needs exactly one transition function
    let mut covered = vec![0usize; state_fluent_names.len()];
    for (head, _) in &cpfs {
        covered[*head] += 1;
    }
    for (index, &count) in covered.iter().enumerate() {
        if count != 1 {
            return Err(TaskError::Parse(format!(
                "state fluent `{}` has {} transition functions",
                state_fluent_names[index], count
            )));
        }
    }

    let reward = {
        let expanded = expand_quantifiers(&task.reward, &universe, &HashMap::new())?;
        instantiate(&expanded, &context, &HashMap::new())?
    };

    let mut preconditions: Vec<ExprRef> = Vec::new();
    for precondition in &task.preconditions {
        let expanded = expand_quantifiers(precondition, &universe, &HashMap::new())?;
        preconditions.push(instantiate(&expanded, &context, &HashMap::new())?);
    }

    Ok(Grounding {
        universe,
        state_fluent_names,
        initial_values,
        action_fluents,
        cpfs,
        reward,
        preconditions,
        horizon: task.horizon,
        max_concurrent_actions: task.max_concurrent_actions,
        discount: task.discount,
    })
}

/// The Cartesian product of the objects of each parameter type, leaf types
/// expanded through the hierarchy. A parameterless schema yields the single
/// empty assignment.
fn parameter_assignments(
    universe: &Universe,
    params: &[String],
) -> Result<Vec<Vec<usize>>, TaskError> {
    let mut result: Vec<Vec<usize>> = vec![Vec::new()];
    for param_type in params {
        let type_id = universe.type_id(param_type)?;
        let objects = universe.objects_of_type(type_id);
        if objects.is_empty() {
            return Err(TaskError::UndefinedReference {
                kind: "object of type",
                name: param_type.clone(),
            });
        }
        result = result
            .into_iter()
            .flat_map(|prefix| {
                objects.iter().map(move |&object| {
                    let mut assignment = prefix.clone();
                    assignment.push(object);
                    assignment
                })
            })
            .collect();
    }
    Ok(result)
}

/// Replaces quantifiers by the corresponding n-ary connective over every
/// replacement map from parameters to objects; the map is threaded through
/// recursion and merged with the caller's bindings.
pub fn expand_quantifiers(
    expr: &ExprRef,
    universe: &Universe,
    bindings: &HashMap<String, usize>,
) -> Result<ExprRef, TaskError> {
    let expand_all = |children: &[ExprRef]| -> Result<Vec<ExprRef>, TaskError> {
        children
            .iter()
            .map(|child| expand_quantifiers(child, universe, bindings))
            .collect()
    };
    Ok(match &**expr {
        Expr::Parameter(name) => match bindings.get(name) {
            Some(&object) => Rc::new(Expr::Object(universe.object(object).name.clone())),
            None => expr.clone(),
        },
        Expr::Object(_) | Expr::Constant(_) | Expr::StateFluent(_) | Expr::ActionFluent(_) => {
            expr.clone()
        }
        Expr::Variable { name, args } => Rc::new(Expr::Variable {
            name: name.clone(),
            args: expand_all(args)?,
        }),
        Expr::Quantifier { kind, params, body } => {
            let mut assignments: Vec<HashMap<String, usize>> = vec![bindings.clone()];
            for (param, param_type) in params {
                let type_id = universe.type_id(param_type)?;
                let objects = universe.objects_of_type(type_id);
                let mut next: Vec<HashMap<String, usize>> = Vec::new();
                for assignment in &assignments {
                    if assignment.contains_key(param) {
                        return Err(TaskError::Parse(format!(
                            "quantifier rebinds parameter `{}`",
                            param
                        )));
                    }
                    for &object in &objects {
                        let mut merged = assignment.clone();
                        merged.insert(param.clone(), object);
                        next.push(merged);
                    }
                }
                assignments = next;
            }
            let mut children: Vec<ExprRef> = Vec::with_capacity(assignments.len());
            for assignment in &assignments {
                children.push(expand_quantifiers(body, universe, assignment)?);
            }
            Rc::new(match kind {
                QuantifierKind::Sum => Expr::Addition(children),
                QuantifierKind::Product => Expr::Multiplication(children),
                QuantifierKind::Forall => Expr::Conjunction(children),
                QuantifierKind::Exists => Expr::Disjunction(children),
            })
        }

        Expr::Conjunction(children) => Rc::new(Expr::Conjunction(expand_all(children)?)),
        Expr::Disjunction(children) => Rc::new(Expr::Disjunction(expand_all(children)?)),
        Expr::Equals(children) => Rc::new(Expr::Equals(expand_all(children)?)),
        Expr::Greater(children) => Rc::new(Expr::Greater(expand_all(children)?)),
        Expr::Lower(children) => Rc::new(Expr::Lower(expand_all(children)?)),
        Expr::GreaterEquals(children) => Rc::new(Expr::GreaterEquals(expand_all(children)?)),
        Expr::LowerEquals(children) => Rc::new(Expr::LowerEquals(expand_all(children)?)),
        Expr::Addition(children) => Rc::new(Expr::Addition(expand_all(children)?)),
        Expr::Subtraction(children) => Rc::new(Expr::Subtraction(expand_all(children)?)),
        Expr::Multiplication(children) => Rc::new(Expr::Multiplication(expand_all(children)?)),
        Expr::Division(children) => Rc::new(Expr::Division(expand_all(children)?)),
        Expr::Negation(child) => Rc::new(Expr::Negation(expand_quantifiers(
            child, universe, bindings,
        )?)),
        Expr::Exponential(child) => Rc::new(Expr::Exponential(expand_quantifiers(
            child, universe, bindings,
        )?)),
        Expr::KronDelta(child) => Rc::new(Expr::KronDelta(expand_quantifiers(
            child, universe, bindings,
        )?)),
        Expr::Bernoulli(child) => Rc::new(Expr::Bernoulli(expand_quantifiers(
            child, universe, bindings,
        )?)),
        Expr::Discrete {
            values,
            probabilities,
        } => Rc::new(Expr::Discrete {
            values: expand_all(values)?,
            probabilities: expand_all(probabilities)?,
        }),
        Expr::IfThenElse {
            condition,
            if_true,
            if_false,
        } => Rc::new(Expr::IfThenElse {
            condition: expand_quantifiers(condition, universe, bindings)?,
            if_true: expand_quantifiers(if_true, universe, bindings)?,
            if_false: expand_quantifiers(if_false, universe, bindings)?,
        }),
        Expr::MultiCondition {
            conditions,
            effects,
        } => Rc::new(Expr::MultiCondition {
            conditions: expand_all(conditions)?,
            effects: expand_all(effects)?,
        }),
    })
}

/// Substitutes parameters by objects and resolves variable references:
/// state fluents and action fluents by index, non-fluents and objects as
/// numeric constants.
fn instantiate(
    expr: &ExprRef,
    context: &GroundContext<'_>,
    replace: &HashMap<String, usize>,
) -> Result<ExprRef, TaskError> {
    let instantiate_all = |children: &[ExprRef]| -> Result<Vec<ExprRef>, TaskError> {
        children
            .iter()
            .map(|child| instantiate(child, context, replace))
            .collect()
    };
    Ok(match &**expr {
        Expr::StateFluent(_) | Expr::ActionFluent(_) | Expr::Constant(_) => expr.clone(),
        Expr::Parameter(name) => {
            let object = replace
                .get(name)
                .copied()
                .ok_or_else(|| TaskError::UndefinedReference {
                    kind: "parameter",
                    name: name.clone(),
                })?;
            Expr::constant(context.universe.object(object).value)
        }
        Expr::Object(name) => {
            let object = context.universe.object_id(name)?;
            Expr::constant(context.universe.object(object).value)
        }
        Expr::Variable { name, args } => resolve_variable(name, args, context, replace)?,
        Expr::Quantifier { .. } => {
            unreachable!("quantifier survived elimination: {}", expr)
        }

        Expr::Conjunction(children) => Rc::new(Expr::Conjunction(instantiate_all(children)?)),
        Expr::Disjunction(children) => Rc::new(Expr::Disjunction(instantiate_all(children)?)),
        Expr::Equals(children) => Rc::new(Expr::Equals(instantiate_all(children)?)),
        Expr::Greater(children) => Rc::new(Expr::Greater(instantiate_all(children)?)),
        Expr::Lower(children) => Rc::new(Expr::Lower(instantiate_all(children)?)),
        Expr::GreaterEquals(children) => Rc::new(Expr::GreaterEquals(instantiate_all(children)?)),
        Expr::LowerEquals(children) => Rc::new(Expr::LowerEquals(instantiate_all(children)?)),
        Expr::Addition(children) => Rc::new(Expr::Addition(instantiate_all(children)?)),
        Expr::Subtraction(children) => Rc::new(Expr::Subtraction(instantiate_all(children)?)),
        Expr::Multiplication(children) => {
            Rc::new(Expr::Multiplication(instantiate_all(children)?))
        }
        Expr::Division(children) => Rc::new(Expr::Division(instantiate_all(children)?)),
        Expr::Negation(child) => Rc::new(Expr::Negation(instantiate(child, context, replace)?)),
        Expr::Exponential(child) => {
            Rc::new(Expr::Exponential(instantiate(child, context, replace)?))
        }
        Expr::KronDelta(child) => Rc::new(Expr::KronDelta(instantiate(child, context, replace)?)),
        Expr::Bernoulli(child) => Rc::new(Expr::Bernoulli(instantiate(child, context, replace)?)),
        Expr::Discrete {
            values,
            probabilities,
        } => Rc::new(Expr::Discrete {
            values: instantiate_all(values)?,
            probabilities: instantiate_all(probabilities)?,
        }),
        Expr::IfThenElse {
            condition,
            if_true,
            if_false,
        } => Rc::new(Expr::IfThenElse {
            condition: instantiate(condition, context, replace)?,
            if_true: instantiate(if_true, context, replace)?,
            if_false: instantiate(if_false, context, replace)?,
        }),
        Expr::MultiCondition {
            conditions,
            effects,
        } => Rc::new(Expr::MultiCondition {
            conditions: instantiate_all(conditions)?,
            effects: instantiate_all(effects)?,
        }),
    })
}

fn resolve_variable(
    name: &str,
    args: &[ExprRef],
    context: &GroundContext<'_>,
    replace: &HashMap<String, usize>,
) -> Result<ExprRef, TaskError> {
    let schema = *context
        .schemas
        .get(name)
        .ok_or_else(|| TaskError::UndefinedReference {
            kind: "schema",
            name: name.to_string(),
        })?;

    let mut objects: Vec<usize> = Vec::with_capacity(args.len());
    for arg in args {
        let object = match &**arg {
            Expr::Object(object_name) => context.universe.object_id(object_name)?,
            Expr::Parameter(param) => {
                replace
                    .get(param)
                    .copied()
                    .ok_or_else(|| TaskError::UndefinedReference {
                        kind: "parameter",
                        name: param.clone(),
                    })?
            }
            other => {
                return Err(TaskError::Parse(format!(
                    "variable `{}` has a non-object argument `{}`",
                    name, other
                )))
            }
        };
        objects.push(object);
    }

    // objects must satisfy the schema's parameter types up to subtyping
    for (object, param_type) in objects.iter().zip(schema.params.iter()) {
        let expected = context.universe.type_id(param_type)?;
        let actual = context.universe.object(*object).type_id;
        if !context.universe.is_subtype(actual, expected) {
            return Err(TaskError::TypeMismatch {
                variable: name.to_string(),
                expected: param_type.clone(),
                object: context.universe.object(*object).name.clone(),
            });
        }
    }

    let ground = ground_name(
        name,
        objects
            .iter()
            .map(|&id| context.universe.object(id).name.as_str()),
    );
    Ok(match schema.kind {
        VariableKind::StateFluent | VariableKind::IntermFluent => {
            let index = *context.state_fluents.get(&ground).ok_or_else(|| {
                TaskError::UndefinedReference {
                    kind: "state fluent",
                    name: ground.clone(),
                }
            })?;
            Expr::state_fluent(index)
        }
        VariableKind::ActionFluent => {
            let index = *context.action_fluents.get(&ground).ok_or_else(|| {
                TaskError::UndefinedReference {
                    kind: "action fluent",
                    name: ground.clone(),
                }
            })?;
            Expr::action_fluent(index)
        }
        VariableKind::NonFluent => {
            let value =
                *context
                    .non_fluents
                    .get(&ground)
                    .ok_or_else(|| TaskError::UndefinedReference {
                        kind: "non-fluent",
                        name: ground.clone(),
                    })?;
            Expr::constant(value)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::tiny_counter_task;

    #[test]
    fn grounds_one_fluent_per_object_tuple() {
        let grounding = ground(&tiny_counter_task(3)).unwrap();
        assert_eq!(grounding.state_fluent_names.len(), 3);
        assert_eq!(grounding.action_fluents.len(), 3);
        assert_eq!(grounding.cpfs.len(), 3);
    }

    #[test]
    fn quantifier_expansion_matches_universe() {
        let grounding = ground(&tiny_counter_task(3)).unwrap();
        // reward = sum_{?c} progress(?c) expands into a ternary addition
        match &*grounding.reward {
            Expr::Addition(children) => assert_eq!(children.len(), 3),
            other => panic!("expected expanded sum, got {}", other),
        }
    }

    #[test]
    fn unknown_schema_is_loud() {
        let mut task = tiny_counter_task(2);
        task.cpfs[0].name = "progres".to_string();
        assert!(matches!(
            ground(&task),
            Err(TaskError::UndefinedReference { kind: "schema", .. })
        ));
    }

    #[test]
    fn unknown_initial_assignment_is_loud() {
        let mut task = tiny_counter_task(2);
        task.initial_values.insert("progress(c9)".to_string(), 1.0);
        assert!(matches!(
            ground(&task),
            Err(TaskError::UndefinedReference { kind: "variable", .. })
        ));
    }
}
