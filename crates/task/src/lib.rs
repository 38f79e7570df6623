//! Data model of a factored, finite-horizon MDP.
//!
//! A task arrives in *schematic* form — a typed object universe, variable
//! schemas parametrized over types, conditional probability functions (CPFs)
//! written against those schemas, a reward formula, and preconditions — and
//! is compiled into a *ground* form in which every fluent is an indexed
//! variable, every formula is an [`Expr`] tree over those indices, and every
//! CPF, the reward, and every precondition is an [`Evaluatable`] carrying its
//! own memoisation caches.
//!
//! The crate owns the expression algebra and all its traversals, the state
//! representations (concrete, Kleene, probability-distribution, action), and
//! the [`SchematicTask`]/[`GroundTask`] aggregates. Grounding itself lives in
//! the compile crate.

mod cpf;
mod error;
mod expr;
mod pd;
mod schema;
mod states;
mod task;
mod types;
mod values;

pub use cpf::*;
pub use error::*;
pub use expr::*;
pub use pd::*;
pub use schema::*;
pub use states::*;
pub use task::*;
pub use types::*;
pub use values::*;
