//! Iterative nodal-system solver.
//!
//! Each network assembles a dense system A·x = z (one row per node) and
//! hands it to a stabilized biconjugate gradient (BiCGSTAB) solver. A
//! direct factorization would be wasted effort here: topology and size
//! change constantly, and the warm-started iteration usually reconverges
//! in a few steps from the previous solution.

mod bicgstab;
mod matrix;

pub use bicgstab::{BiCgStab, SolveReport, SolverConfig};
pub use matrix::NodalMatrix;

/// Convergence tolerance on the residual 2-norm.
pub const DEFAULT_TOLERANCE: f64 = 1e-6;

/// Iteration cap per solve call.
pub const DEFAULT_MAX_ITERATIONS: usize = 200;
