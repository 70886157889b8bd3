//! Node model: free nodes, fixed-potential sources, and coupling nodes,
//! plus the arena that owns them for a whole simulation space.

use crate::error::{Result, VoltgridError};

use super::types::{NetworkId, NodeRef};

/// What kind of equation row a node contributes.
#[derive(Debug, Clone)]
pub enum NodeKind {
    /// Ordinary unknown-potential node.
    Free,
    /// Fixed-potential node; contributes a Dirichlet constraint row.
    Source { potential: f64 },
    /// Virtual node enforcing an ideal-transformer-style linear relation
    /// among 2-4 terminal nodes instead of an Ohmic one.
    Coupling {
        primaries: Vec<NodeRef>,
        secondaries: Vec<NodeRef>,
        ratio: f64,
    },
}

/// Network membership of a node: which network owns it, and at which
/// dense matrix index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Membership {
    pub network: NetworkId,
    pub index: usize,
}

/// One point of unknown (or fixed) potential in the simulation.
///
/// A node belongs to at most one network at a time. The network assigns
/// its matrix index; a merge reassigns the index and moves the node into
/// the surviving network's list.
#[derive(Debug, Clone)]
pub struct Node {
    kind: NodeKind,
    membership: Option<Membership>,
    /// Last solved potential, written back after each recompute.
    potential: f64,
}

impl Node {
    /// Create a free node.
    pub fn free() -> Self {
        Self {
            kind: NodeKind::Free,
            membership: None,
            potential: 0.0,
        }
    }

    /// Create a fixed-potential source node.
    pub fn source(potential: f64) -> Self {
        Self {
            kind: NodeKind::Source { potential },
            membership: None,
            potential,
        }
    }

    /// Create a coupling node over already-split terminal groups.
    pub fn coupling(primaries: Vec<NodeRef>, secondaries: Vec<NodeRef>, ratio: f64) -> Self {
        Self {
            kind: NodeKind::Coupling {
                primaries,
                secondaries,
                ratio,
            },
            membership: None,
            potential: 0.0,
        }
    }

    /// The node's equation-row kind.
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// Current network membership, if any.
    pub fn membership(&self) -> Option<Membership> {
        self.membership
    }

    /// The node's matrix index within its owning network.
    pub fn index(&self) -> Option<usize> {
        self.membership.map(|m| m.index)
    }

    pub(crate) fn set_membership(&mut self, membership: Option<Membership>) {
        self.membership = membership;
    }

    /// Last solved potential.
    pub fn potential(&self) -> f64 {
        self.potential
    }

    /// Write back a solved potential. Called by the owning network after
    /// each recompute.
    pub fn receive_result(&mut self, value: f64) {
        self.potential = value;
    }

    /// For source nodes, the fixed potential value.
    pub fn source_potential(&self) -> Option<f64> {
        match self.kind {
            NodeKind::Source { potential } => Some(potential),
            _ => None,
        }
    }

    /// Update a source node's fixed potential.
    pub(crate) fn set_source_potential(&mut self, value: f64) -> bool {
        match &mut self.kind {
            NodeKind::Source { potential } => {
                *potential = value;
                true
            }
            _ => false,
        }
    }
}

/// Slot-based arena owning every node of a simulation space.
///
/// References stay stable across network merges; freed slots are reused
/// for later insertions.
#[derive(Debug, Default)]
pub struct NodeArena {
    slots: Vec<Option<Node>>,
    free: Vec<usize>,
    live: usize,
}

impl NodeArena {
    /// Create an empty arena.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.live
    }

    /// Whether the arena holds no live nodes.
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Insert a node and return its stable reference.
    pub fn insert(&mut self, node: Node) -> NodeRef {
        self.live += 1;
        if let Some(slot) = self.free.pop() {
            self.slots[slot] = Some(node);
            NodeRef(slot)
        } else {
            self.slots.push(Some(node));
            NodeRef(self.slots.len() - 1)
        }
    }

    /// Remove a node, freeing its slot for reuse.
    pub fn remove(&mut self, node: NodeRef) -> Result<Node> {
        let slot = self
            .slots
            .get_mut(node.0)
            .and_then(Option::take)
            .ok_or(VoltgridError::stale(node))?;
        self.free.push(node.0);
        self.live -= 1;
        Ok(slot)
    }

    /// Borrow a node.
    pub fn get(&self, node: NodeRef) -> Result<&Node> {
        self.slots
            .get(node.0)
            .and_then(Option::as_ref)
            .ok_or(VoltgridError::stale(node))
    }

    /// Mutably borrow a node.
    pub fn get_mut(&mut self, node: NodeRef) -> Result<&mut Node> {
        self.slots
            .get_mut(node.0)
            .and_then(Option::as_mut)
            .ok_or(VoltgridError::stale(node))
    }

    /// Whether the reference points at a live node.
    pub fn contains(&self, node: NodeRef) -> bool {
        self.slots.get(node.0).map_or(false, Option::is_some)
    }

    /// Iterate over all live nodes with their references.
    pub fn iter(&self) -> impl Iterator<Item = (NodeRef, &Node)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(slot, entry)| entry.as_ref().map(|node| (NodeRef(slot), node)))
    }
}
