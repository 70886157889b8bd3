//! Network graph representation.
//!
//! A [`Network`] is one electrically connected component: an ordered node
//! list (position = dense matrix index), a wire set, and the matrix and
//! solver workspace for its nodal system. Networks are created lazily by
//! the owning [`Space`](crate::space::Space) when two unconnected nodes
//! are first wired together, merged when a wire bridges two separate
//! components, and discarded once they hold no wires.

pub mod node;
pub mod types;
pub mod wire;

pub use node::{Membership, Node, NodeArena, NodeKind};
pub use types::{NetworkId, NodeRef, SpaceId, WireId};
pub use wire::Wire;

use crate::error::{Result, VoltgridError};
use crate::solver::{BiCgStab, NodalMatrix, SolveReport, SolverConfig};

/// One connected electrical component and its solver state.
#[derive(Debug)]
pub struct Network {
    id: NetworkId,
    /// Member nodes; position in this list is the node's matrix index.
    nodes: Vec<NodeRef>,
    /// Wire set. Parallel wires are valid and simply add conductance.
    wires: Vec<Wire>,
    matrix: NodalMatrix,
    solver: BiCgStab,
    /// Set on any topology change, cleared after the stabilization pass.
    dirty: bool,
}

impl Network {
    /// Create an empty network.
    pub fn new(id: NetworkId, config: SolverConfig) -> Self {
        Self {
            id,
            nodes: Vec::new(),
            wires: Vec::new(),
            matrix: NodalMatrix::new(0),
            solver: BiCgStab::new(0, config),
            dirty: false,
        }
    }

    /// This network's identity within its space.
    pub fn id(&self) -> NetworkId {
        self.id
    }

    /// A network with no wires is empty and gets reaped by the next
    /// per-step pass, regardless of how many nodes it still lists.
    pub fn is_empty(&self) -> bool {
        self.wires.is_empty()
    }

    /// Whether topology changed since the last stabilized recompute.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Number of member nodes (= matrix dimension at next assembly).
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of wires.
    pub fn wire_count(&self) -> usize {
        self.wires.len()
    }

    /// Member nodes in matrix-index order.
    pub fn nodes(&self) -> &[NodeRef] {
        &self.nodes
    }

    /// The wire set.
    pub fn wires(&self) -> &[Wire] {
        &self.wires
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub(crate) fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    /// Add a node, assigning it the next matrix index.
    pub fn add_node(&mut self, arena: &mut NodeArena, node: NodeRef) -> Result<()> {
        let index = self.nodes.len();
        let entry = arena.get_mut(node)?;
        debug_assert!(
            entry.membership().is_none(),
            "node joining a network while still owned by another"
        );
        entry.set_membership(Some(Membership {
            network: self.id,
            index,
        }));
        self.nodes.push(node);
        self.dirty = true;
        Ok(())
    }

    /// Add several nodes at once.
    pub fn add_nodes(&mut self, arena: &mut NodeArena, nodes: &[NodeRef]) -> Result<()> {
        for &node in nodes {
            self.add_node(arena, node)?;
        }
        Ok(())
    }

    /// Add a wire. The connect protocol guarantees both endpoints are
    /// members of this network.
    pub fn add_wire(&mut self, wire: Wire) {
        self.wires.push(wire);
        self.dirty = true;
    }

    /// Remove a wire by identity.
    pub fn remove_wire(&mut self, id: WireId) -> Option<Wire> {
        let pos = self.wires.iter().position(|w| w.id == id)?;
        self.dirty = true;
        Some(self.wires.swap_remove(pos))
    }

    /// Remove a node and its incident wires. The displaced last node (if
    /// any) takes over the removed node's matrix index.
    ///
    /// Returns the ids of the wires that went with it.
    pub fn remove_node(&mut self, arena: &mut NodeArena, node: NodeRef) -> Result<Vec<WireId>> {
        let membership = arena
            .get(node)?
            .membership()
            .ok_or(VoltgridError::unattached(node))?;
        debug_assert_eq!(membership.network, self.id, "node owned by another network");

        let dropped: Vec<WireId> = self
            .wires
            .iter()
            .filter(|w| w.touches(node))
            .map(|w| w.id)
            .collect();
        self.wires.retain(|w| !w.touches(node));

        let index = membership.index;
        self.nodes.swap_remove(index);
        if index < self.nodes.len() {
            let moved = self.nodes[index];
            let entry = arena.get_mut(moved)?;
            entry.set_membership(Some(Membership {
                network: self.id,
                index,
            }));
        }
        arena.get_mut(node)?.set_membership(None);

        self.dirty = true;
        Ok(dropped)
    }

    /// Absorb another network: every node and wire moves over exactly
    /// once, values unchanged, with the absorbed nodes renumbered to
    /// continue this network's index sequence.
    pub fn merge_from(&mut self, arena: &mut NodeArena, other: Network) -> Result<()> {
        let Network { nodes, wires, .. } = other;
        for node in nodes {
            let index = self.nodes.len();
            let entry = arena.get_mut(node)?;
            entry.set_membership(Some(Membership {
                network: self.id,
                index,
            }));
            self.nodes.push(node);
        }
        self.wires.extend(wires);
        self.dirty = true;
        Ok(())
    }

    /// Matrix index of a member node.
    fn matrix_index(&self, arena: &NodeArena, node: NodeRef) -> Result<usize> {
        let membership = arena
            .get(node)?
            .membership()
            .ok_or(VoltgridError::unattached(node))?;
        debug_assert_eq!(membership.network, self.id, "node owned by another network");
        Ok(membership.index)
    }

    /// Re-solve the network for steady-state node potentials.
    ///
    /// Assembly order matters: wires stamp Ohmic contributions first,
    /// coupling rows then overwrite their own rows unconditionally, and
    /// source folding runs last so fixed potentials see the final
    /// coefficients. The solve is warm-started from the previous result
    /// and each node receives its solved potential afterwards.
    pub fn recompute(&mut self, arena: &mut NodeArena) -> Result<SolveReport> {
        let n = self.nodes.len();
        self.matrix.resize(n);
        self.solver.resize(n);
        self.matrix.clear();

        // Ohmic wires
        for wire in &self.wires {
            let ia = {
                let membership = arena
                    .get(wire.a)?
                    .membership()
                    .ok_or(VoltgridError::unattached(wire.a))?;
                membership.index
            };
            let ib = match wire.b {
                Some(b) => Some(
                    arena
                        .get(b)?
                        .membership()
                        .ok_or(VoltgridError::unattached(b))?
                        .index,
                ),
                None => None,
            };
            self.matrix.stamp_conductance(ia, ib, wire.conductance());
        }

        // Coupling rows own their row unconditionally
        for row in 0..n {
            let node = self.nodes[row];
            let (primary_idx, secondary_idx, ratio) = match arena.get(node)?.kind() {
                NodeKind::Coupling {
                    primaries,
                    secondaries,
                    ratio,
                } => {
                    let mut p = Vec::with_capacity(primaries.len());
                    for &terminal in primaries {
                        p.push(self.matrix_index(arena, terminal)?);
                    }
                    let mut s = Vec::with_capacity(secondaries.len());
                    for &terminal in secondaries {
                        s.push(self.matrix_index(arena, terminal)?);
                    }
                    (p, s, *ratio)
                }
                _ => continue,
            };
            self.matrix
                .stamp_coupling(row, &primary_idx, &secondary_idx, ratio);
        }

        // Dirichlet-fold fixed potentials
        for row in 0..n {
            if let Some(u) = arena.get(self.nodes[row])?.source_potential() {
                self.matrix.fold_source(row, u);
            }
        }

        let report = self.solver.solve(&self.matrix);

        for (i, &node) in self.nodes.iter().enumerate() {
            arena.get_mut(node)?.receive_result(self.solver.guess()[i]);
        }

        Ok(report)
    }
}
