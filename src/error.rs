//! Error types for the voltgrid simulator.
//!
//! This module provides a unified error type [`VoltgridError`] covering
//! graph bookkeeping and registry access. Numerical trouble inside the
//! solver (non-convergence, breakdown) is deliberately *not* an error:
//! the solver returns a best-effort result and logs a diagnostic instead,
//! so a struggling network never halts the simulation step.

use thiserror::Error;

use crate::network::types::{NetworkId, NodeRef, SpaceId, WireId};

/// Result type alias using [`VoltgridError`].
pub type Result<T> = std::result::Result<T, VoltgridError>;

/// Unified error type for all voltgrid operations.
#[derive(Error, Debug)]
pub enum VoltgridError {
    // ============ Node arena errors ============
    /// A node reference points at a freed or never-allocated slot.
    #[error("Stale node reference {node}")]
    StaleNode { node: NodeRef },

    /// The operation needs the node to be part of a network.
    #[error("Node {node} is not attached to any network")]
    NodeNotAttached { node: NodeRef },

    /// A source-only operation was applied to a non-source node.
    #[error("Node {node} is not a source node")]
    NotASource { node: NodeRef },

    // ============ Wire errors ============
    /// A wire id that was never issued or whose wire is already removed.
    #[error("Wire {wire} not found")]
    WireNotFound { wire: WireId },

    // ============ Coupling errors ============
    /// Coupling terminal count outside the supported 2..=4 range.
    #[error("Coupling requires 2 to 4 terminals, got {count}")]
    InvalidTerminalCount { count: usize },

    // ============ Network errors ============
    /// Access to a network that was never created or already reaped.
    #[error("Network {network} not found")]
    NetworkNotFound { network: NetworkId },

    // ============ Registry errors ============
    /// Access to a simulation space that was never created or already removed.
    #[error("Simulation space {space} not found")]
    SpaceNotFound { space: SpaceId },
}

impl VoltgridError {
    /// Create a stale-node error.
    pub fn stale(node: NodeRef) -> Self {
        Self::StaleNode { node }
    }

    /// Create a not-attached error.
    pub fn unattached(node: NodeRef) -> Self {
        Self::NodeNotAttached { node }
    }
}
