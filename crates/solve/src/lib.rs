//! Decision-time planning on a compiled MDP.
//!
//! The [`Mdp`] façade owns the ground task and every runtime cache and
//! exposes the transition operations the engines need: sampled and
//! deterministic successors, rewards, applicable actions with
//! reasonable-action pruning, and reward-lock detection.
//!
//! Search engines implement [`SearchEngine`] and are configured through the
//! nested `[ENGINE opt …]` specification strings of [`EngineSpec`]:
//! anytime [`UctSearch`] with pluggable initialization,
//! [`IterativeDeepeningSearch`] over [`DepthFirstSearch`], and
//! [`RandomSearch`]. The [`Planner`] drives one session: training-set
//! generation, learning, and one `plan` call per simulator step.

mod dfs;
mod engine;
mod ids;
mod locks;
mod mdp;
mod planner;
mod random;
mod training;
mod uct;

pub use dfs::*;
pub use engine::*;
pub use ids::*;
pub use locks::*;
pub use mdp::*;
pub use planner::*;
pub use random::*;
pub use training::*;
pub use uct::*;
