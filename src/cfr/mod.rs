//! Depth-limited CFR solver (component F): the regret-matching node table
//! (`node`) and the recursive search that fills it (`solver`).

pub mod node;
pub mod solver;

pub use node::Node;
pub use solver::{Abstraction, Solver};
