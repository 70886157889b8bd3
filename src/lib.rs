//! # Voltgrid
//!
//! A real-time steady-state simulator for dynamically mutable electrical
//! networks.
//!
//! This library provides:
//! - A node/wire graph model with free, fixed-potential (source) and
//!   coupling (ideal-transformer) nodes
//! - Modified nodal analysis with Dirichlet elimination for sources and
//!   constraint rows for couplings
//! - A warm-started BiCGSTAB iterative solver that stays cheap to re-run
//!   as topology changes between steps
//! - Per-space network management: lazy creation, union-by-size merging
//!   and reaping of emptied networks
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`network`] - Graph representation: nodes, wires, networks
//! - [`solver`] - Dense nodal matrix assembly and the BiCGSTAB solver
//! - [`space`] - A simulation space: node arena, connect protocol, merges
//! - [`registry`] - Explicit lifecycle management of simulation spaces
//!
//! ## Usage
//!
//! ```
//! use voltgrid::SpaceRegistry;
//!
//! let mut registry = SpaceRegistry::new();
//! let space_id = registry.create_space();
//!
//! let space = registry.space_mut(space_id).unwrap();
//! let battery = space.add_source_node(10.0);
//! let junction = space.add_free_node();
//! let ground = space.add_source_node(0.0);
//! space.connect(battery, junction, 10.0).unwrap();
//! space.connect(junction, ground, 10.0).unwrap();
//!
//! // Once per simulation step:
//! registry.tick(space_id).unwrap();
//!
//! let v = registry.space(space_id).unwrap().potential(junction).unwrap();
//! assert!((v - 5.0).abs() < 1e-4);
//! ```
//!
//! ## Simulation method
//!
//! Each network keeps a dense N×N conductance matrix with one equation
//! row per node. On every step:
//!
//! 1. Wires stamp Ohmic conductances (diagonal + cross entries)
//! 2. Coupling nodes overwrite their constraint rows
//! 3. Fixed potentials are folded into the right-hand side (Dirichlet
//!    elimination), leaving a diagonal-only `-1` row
//! 4. BiCGSTAB solves the system from the previous solution (warm start)
//! 5. Solved potentials are written back to the nodes
//!
//! Non-convergence is never fatal: the solver keeps its best-effort
//! result and logs a diagnostic, so one ill-conditioned network cannot
//! stall the simulation.

pub mod error;
pub mod network;
pub mod registry;
pub mod solver;
pub mod space;

// Re-export main types for convenience
pub use error::{Result, VoltgridError};
pub use network::{Network, NetworkId, NodeKind, NodeRef, SpaceId, WireId};
pub use registry::SpaceRegistry;
pub use solver::{SolveReport, SolverConfig};
pub use space::Space;
