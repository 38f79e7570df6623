//! Compilation of a schematic task into a ground, hash-indexed MDP.
//!
//! The pipeline runs once, before planning starts:
//!
//! 1. [`ground`] — object instantiation of schemas, quantifier elimination,
//!    CPF and precondition instantiation
//! 2. [`simplify`] — constant-discovery fixpoint over CPFs, precondition
//!    classification, infeasibility detection
//! 3. [`actions`] — legal-action enumeration under the static preconditions
//! 4. [`preprocess`] — variable ordering, domain computation,
//!    determinization, task-level flags
//! 5. [`hashing`] — hash-key assignment and caching-policy selection
//! 6. [`persist`] — optional save/load of the finished [`GroundTask`]
//!
//! [`GroundTask`]: hzn_task::GroundTask

mod actions;
mod ground;
mod hashing;
mod persist;
mod preprocess;
mod simplify;
pub mod testing;

pub use actions::*;
pub use ground::*;
pub use hashing::*;
pub use persist::*;
pub use preprocess::*;
pub use simplify::*;
