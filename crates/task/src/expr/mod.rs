//! The expression algebra of CPFs, rewards, and preconditions.
//!
//! Formulas are immutable trees of [`Expr`] nodes behind [`Rc`] handles.
//! Schematic atoms (parameters, objects, schematic variable references,
//! quantifiers) only exist before grounding; every runtime traversal sees
//! ground atoms (indexed state and action fluents, constants) exclusively.
//!
//! Each traversal lives in its own submodule and is a pure function of the
//! node's children:
//!
//! - [`simplify`](Expr::simplify) — constant folding, flattening, rewrites
//! - [`determinize_most_likely`](Expr::determinize_most_likely) — most-likely
//!   outcome replacement of probabilistic atoms
//! - [`collect_info`](Expr::collect_info) / [`classify_action_fluents`](Expr::classify_action_fluents)
//!   — dependency analysis
//! - [`calculate_domain`](Expr::calculate_domain) — finite value sets, also
//!   the engine of three-valued (Kleene) evaluation
//! - [`evaluate`](Expr::evaluate) — deterministic evaluation
//! - [`evaluate_to_pd`](Expr::evaluate_to_pd) — discrete distribution
//!   evaluation

mod analyze;
mod determinize;
mod domains;
mod evaluate;
mod simplify;
mod stochastic;

pub use analyze::*;
pub use simplify::*;

use hzn_core::Value;
use serde::Deserialize;
use serde::Serialize;
use std::rc::Rc;

/// Shared handle to an expression node. Node identity is the handle;
/// simplification may share subtrees, so equality on handles is
/// [`Rc::ptr_eq`], never structural.
pub type ExprRef = Rc<Expr>;

/// The quantifiers of the schematic surface language. Grounding eliminates
/// them into the corresponding n-ary connective over all object
/// substitutions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuantifierKind {
    /// `sum_{?p : t}` → addition
    Sum,
    /// `prod_{?p : t}` → multiplication
    Product,
    /// `forall_{?p : t}` → conjunction
    Forall,
    /// `exists_{?p : t}` → disjunction
    Exists,
}

/// A node of the closed expression algebra.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Expr {
    /// Ground state variable, by index into the CPF ordering.
    StateFluent(usize),
    /// Ground boolean action variable, by index.
    ActionFluent(usize),
    Constant(Value),

    /// Schematic: a quantifier-bound or CPF-head parameter (`?p`).
    Parameter(String),
    /// Schematic: an object literal, degrades to its numeric value.
    Object(String),
    /// Schematic: a parametrized variable reference `name(arg, …)`.
    Variable { name: String, args: Vec<ExprRef> },
    /// Schematic: a quantifier over a typed parameter list.
    Quantifier {
        kind: QuantifierKind,
        /// `(parameter name, type name)` pairs.
        params: Vec<(String, String)>,
        body: ExprRef,
    },

    Conjunction(Vec<ExprRef>),
    Disjunction(Vec<ExprRef>),
    Equals(Vec<ExprRef>),
    Greater(Vec<ExprRef>),
    Lower(Vec<ExprRef>),
    GreaterEquals(Vec<ExprRef>),
    LowerEquals(Vec<ExprRef>),

    Addition(Vec<ExprRef>),
    Subtraction(Vec<ExprRef>),
    Multiplication(Vec<ExprRef>),
    Division(Vec<ExprRef>),
    Negation(ExprRef),
    Exponential(ExprRef),

    /// Degenerate distribution; unwraps to its argument.
    KronDelta(ExprRef),
    /// Bernoulli over the truth probability of the argument.
    Bernoulli(ExprRef),
    /// Explicit discrete distribution over value/probability pairs.
    Discrete {
        values: Vec<ExprRef>,
        probabilities: Vec<ExprRef>,
    },

    IfThenElse {
        condition: ExprRef,
        if_true: ExprRef,
        if_false: ExprRef,
    },
    /// Chained when-then cases; the final condition is the constant 1.
    MultiCondition {
        conditions: Vec<ExprRef>,
        effects: Vec<ExprRef>,
    },
}

impl Expr {
    pub fn constant(value: Value) -> ExprRef {
        Rc::new(Expr::Constant(value))
    }

    pub fn truth() -> ExprRef {
        Self::constant(1.0)
    }

    pub fn falsity() -> ExprRef {
        Self::constant(0.0)
    }

    pub fn state_fluent(index: usize) -> ExprRef {
        Rc::new(Expr::StateFluent(index))
    }

    pub fn action_fluent(index: usize) -> ExprRef {
        Rc::new(Expr::ActionFluent(index))
    }

    /// The carried constant, if this node is one.
    pub fn as_constant(&self) -> Option<Value> {
        match self {
            Expr::Constant(value) => Some(*value),
            _ => None,
        }
    }

    /// True for atoms that must not survive grounding.
    pub fn is_schematic(&self) -> bool {
        matches!(
            self,
            Expr::Parameter(_) | Expr::Object(_) | Expr::Variable { .. } | Expr::Quantifier { .. }
        )
    }
}

fn write_infix(
    f: &mut std::fmt::Formatter<'_>,
    op: &str,
    children: &[ExprRef],
) -> std::fmt::Result {
    write!(f, "(")?;
    for (i, child) in children.iter().enumerate() {
        if i > 0 {
            write!(f, " {} ", op)?;
        }
        write!(f, "{}", child)?;
    }
    write!(f, ")")
}

impl std::fmt::Display for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expr::StateFluent(i) => write!(f, "s[{}]", i),
            Expr::ActionFluent(i) => write!(f, "a[{}]", i),
            Expr::Constant(v) => write!(f, "{}", v),
            Expr::Parameter(name) => write!(f, "{}", name),
            Expr::Object(name) => write!(f, "{}", name),
            Expr::Variable { name, args } => {
                write!(f, "{}", name)?;
                if !args.is_empty() {
                    write_infix(f, ",", args)?;
                }
                Ok(())
            }
            Expr::Quantifier { kind, params, body } => {
                let tag = match kind {
                    QuantifierKind::Sum => "sum",
                    QuantifierKind::Product => "prod",
                    QuantifierKind::Forall => "forall",
                    QuantifierKind::Exists => "exists",
                };
                write!(f, "{}_{{", tag)?;
                for (i, (param, ty)) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{} : {}", param, ty)?;
                }
                write!(f, "}} {}", body)
            }
            Expr::Conjunction(children) => write_infix(f, "^", children),
            Expr::Disjunction(children) => write_infix(f, "|", children),
            Expr::Equals(children) => write_infix(f, "==", children),
            Expr::Greater(children) => write_infix(f, ">", children),
            Expr::Lower(children) => write_infix(f, "<", children),
            Expr::GreaterEquals(children) => write_infix(f, ">=", children),
            Expr::LowerEquals(children) => write_infix(f, "<=", children),
            Expr::Addition(children) => write_infix(f, "+", children),
            Expr::Subtraction(children) => write_infix(f, "-", children),
            Expr::Multiplication(children) => write_infix(f, "*", children),
            Expr::Division(children) => write_infix(f, "/", children),
            Expr::Negation(child) => write!(f, "~{}", child),
            Expr::Exponential(child) => write!(f, "exp({})", child),
            Expr::KronDelta(child) => write!(f, "KronDelta({})", child),
            Expr::Bernoulli(child) => write!(f, "Bernoulli({})", child),
            Expr::Discrete {
                values,
                probabilities,
            } => {
                write!(f, "Discrete{{")?;
                for (i, (value, prob)) in values.iter().zip(probabilities.iter()).enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{} : {}", value, prob)?;
                }
                write!(f, "}}")
            }
            Expr::IfThenElse {
                condition,
                if_true,
                if_false,
            } => write!(f, "if {} then {} else {}", condition, if_true, if_false),
            Expr::MultiCondition {
                conditions,
                effects,
            } => {
                write!(f, "switch{{")?;
                for (i, (cond, eff)) in conditions.iter().zip(effects.iter()).enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{} : {}", cond, eff)?;
                }
                write!(f, "}}")
            }
        }
    }
}
