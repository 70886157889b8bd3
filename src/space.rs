//! A simulation space: the node arena, the live networks, and the
//! connect/disconnect protocol that keeps both consistent.
//!
//! All topology mutation goes through the space. Networks are created
//! lazily on the first connection between two unconnected nodes, merged
//! (union-by-size) when a wire bridges two separate components, and
//! reaped by the per-step pass once they hold no wires.

use std::collections::HashMap;

use crate::error::{Result, VoltgridError};
use crate::network::{Network, NetworkId, Node, NodeArena, NodeKind, NodeRef, Wire, WireId};
use crate::solver::{SolveReport, SolverConfig};

/// One independent simulation space and everything living in it.
#[derive(Debug)]
pub struct Space {
    nodes: NodeArena,
    /// Slot-based network storage; freed slots are reused.
    networks: Vec<Option<Network>>,
    free_networks: Vec<usize>,
    /// Which network currently stores each wire.
    wire_index: HashMap<WireId, NetworkId>,
    next_wire: u64,
    solver_config: SolverConfig,
}

impl Default for Space {
    fn default() -> Self {
        Self::new()
    }
}

impl Space {
    /// Create an empty space with default solver settings.
    pub fn new() -> Self {
        Self::with_config(SolverConfig::default())
    }

    /// Create an empty space; every network it spawns uses `config`.
    pub fn with_config(config: SolverConfig) -> Self {
        Self {
            nodes: NodeArena::new(),
            networks: Vec::new(),
            free_networks: Vec::new(),
            wire_index: HashMap::new(),
            next_wire: 0,
            solver_config: config,
        }
    }

    // ============ Node factory ============

    /// Create an ordinary unknown-potential node.
    pub fn add_free_node(&mut self) -> NodeRef {
        self.nodes.insert(Node::free())
    }

    /// Create a fixed-potential source node.
    pub fn add_source_node(&mut self, potential: f64) -> NodeRef {
        self.nodes.insert(Node::source(potential))
    }

    /// Create a coupling node enforcing an ideal-transformer relation
    /// among 2-4 terminals (split 1/1, 1/2 or 2/2 by arity).
    ///
    /// The coupling node must share a matrix with its terminals, so this
    /// unifies the membership of every terminal: their networks are
    /// merged (created, if none exists) and unattached terminals join in.
    pub fn couple(&mut self, ratio: f64, terminals: &[NodeRef]) -> Result<NodeRef> {
        let (primaries, secondaries): (&[NodeRef], &[NodeRef]) = match terminals.len() {
            2 | 3 => (&terminals[..1], &terminals[1..]),
            4 => (&terminals[..2], &terminals[2..]),
            count => return Err(VoltgridError::InvalidTerminalCount { count }),
        };
        for &terminal in terminals {
            self.nodes.get(terminal)?;
        }

        let mut target: Option<NetworkId> = None;
        for &terminal in terminals {
            let home = self.nodes.get(terminal)?.membership().map(|m| m.network);
            target = match (target, home) {
                (None, home) => home,
                (Some(t), None) => Some(t),
                (Some(t), Some(h)) if t == h => Some(t),
                (Some(t), Some(h)) => Some(self.merge_networks(t, h)?),
            };
        }
        let target = match target {
            Some(id) => id,
            None => self.create_network(),
        };

        for &terminal in terminals {
            if self.nodes.get(terminal)?.membership().is_none() {
                self.attach(target, terminal)?;
            }
        }

        let coupling = self
            .nodes
            .insert(Node::coupling(primaries.to_vec(), secondaries.to_vec(), ratio));
        self.attach(target, coupling)?;
        Ok(coupling)
    }

    /// Remove a node along with its incident wires.
    ///
    /// Coupling nodes that list the removed node as a terminal go with
    /// it, the same way incident wires do: a coupling with a freed
    /// terminal would either wedge the next recompute or, once the slot
    /// is reused, silently stamp against an unrelated node.
    pub fn remove_node(&mut self, node: NodeRef) -> Result<()> {
        let dependents: Vec<NodeRef> = self
            .nodes
            .iter()
            .filter(|(_, entry)| match entry.kind() {
                NodeKind::Coupling {
                    primaries,
                    secondaries,
                    ..
                } => primaries.contains(&node) || secondaries.contains(&node),
                _ => false,
            })
            .map(|(dependent, _)| dependent)
            .collect();
        for dependent in dependents {
            // A cascade step may already have taken this one out.
            if self.nodes.contains(dependent) {
                self.remove_node(dependent)?;
            }
        }

        if let Some(membership) = self.nodes.get(node)?.membership() {
            // Split borrow: network slot and arena are disjoint fields.
            let network = self
                .networks
                .get_mut(membership.network.0)
                .and_then(Option::as_mut)
                .ok_or(VoltgridError::NetworkNotFound {
                    network: membership.network,
                })?;
            let dropped = network.remove_node(&mut self.nodes, node)?;
            for wire in dropped {
                self.wire_index.remove(&wire);
            }
        }
        self.nodes.remove(node)?;
        Ok(())
    }

    // ============ Node access ============

    /// Last solved potential of a node.
    pub fn potential(&self, node: NodeRef) -> Result<f64> {
        Ok(self.nodes.get(node)?.potential())
    }

    /// Update a source node's fixed potential.
    ///
    /// A parameter change, not a topology change: the network stays
    /// clean and the warm-started solver absorbs it on the next step.
    pub fn set_source_potential(&mut self, node: NodeRef, potential: f64) -> Result<()> {
        if self.nodes.get_mut(node)?.set_source_potential(potential) {
            Ok(())
        } else {
            Err(VoltgridError::NotASource { node })
        }
    }

    /// Current flowing out of a node through its incident wires, using
    /// the last solved potentials.
    pub fn source_current(&self, node: NodeRef) -> Result<f64> {
        let membership = self
            .nodes
            .get(node)?
            .membership()
            .ok_or(VoltgridError::unattached(node))?;
        let network = self.network(membership.network)?;

        let v_node = self.nodes.get(node)?.potential();
        let mut current = 0.0;
        for wire in network.wires() {
            if let Some(other) = wire.other_end(node) {
                let v_other = match other {
                    Some(n) => self.nodes.get(n)?.potential(),
                    None => 0.0,
                };
                current += wire.conductance() * (v_node - v_other);
            }
        }
        Ok(current)
    }

    /// The network a node currently belongs to, if any.
    pub fn network_of(&self, node: NodeRef) -> Result<Option<NetworkId>> {
        Ok(self.nodes.get(node)?.membership().map(|m| m.network))
    }

    /// Borrow a live network.
    pub fn network(&self, id: NetworkId) -> Result<&Network> {
        self.networks
            .get(id.0)
            .and_then(Option::as_ref)
            .ok_or(VoltgridError::NetworkNotFound { network: id })
    }

    /// Number of live networks.
    pub fn network_count(&self) -> usize {
        self.networks.iter().filter(|slot| slot.is_some()).count()
    }

    /// Number of live nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// The node arena.
    pub fn arena(&self) -> &NodeArena {
        &self.nodes
    }

    // ============ Connection protocol ============

    /// Join two nodes with a resistive wire.
    ///
    /// Self-connections are rejected by returning `Ok(None)`: no wire is
    /// created and no error is raised. Otherwise the endpoints end up in
    /// one shared network (created or merged as needed) holding the new
    /// wire.
    pub fn connect(&mut self, a: NodeRef, b: NodeRef, resistance: f64) -> Result<Option<WireId>> {
        if a == b {
            return Ok(None);
        }
        let home_a = self.nodes.get(a)?.membership().map(|m| m.network);
        let home_b = self.nodes.get(b)?.membership().map(|m| m.network);

        let target = match (home_a, home_b) {
            (None, None) => {
                let id = self.create_network();
                self.attach(id, a)?;
                self.attach(id, b)?;
                id
            }
            (Some(id), None) => {
                self.attach(id, b)?;
                id
            }
            (None, Some(id)) => {
                self.attach(id, a)?;
                id
            }
            (Some(x), Some(y)) if x == y => x,
            (Some(x), Some(y)) => self.merge_networks(x, y)?,
        };

        let id = self.allocate_wire_id();
        let wire = Wire::new(id, a, Some(b), resistance);
        self.network_slot(target)?.add_wire(wire);
        self.wire_index.insert(id, target);
        Ok(Some(id))
    }

    /// Join a node to the implicit reference potential (ground) with a
    /// resistive wire.
    pub fn connect_to_ground(&mut self, node: NodeRef, resistance: f64) -> Result<WireId> {
        let target = match self.nodes.get(node)?.membership().map(|m| m.network) {
            Some(id) => id,
            None => {
                let id = self.create_network();
                self.attach(id, node)?;
                id
            }
        };

        let id = self.allocate_wire_id();
        let wire = Wire::new(id, node, None, resistance);
        self.network_slot(target)?.add_wire(wire);
        self.wire_index.insert(id, target);
        Ok(id)
    }

    /// Remove a wire by identity. The owning network stays as one system
    /// even if the cut actually separates it; an edgeless network is
    /// reaped by the next per-step pass.
    ///
    /// An id that was never issued, or whose wire is already gone, is an
    /// error, like any other stale handle.
    pub fn disconnect(&mut self, wire: WireId) -> Result<()> {
        let network = self
            .wire_index
            .remove(&wire)
            .ok_or(VoltgridError::WireNotFound { wire })?;
        self.network_slot(network)?.remove_wire(wire);
        Ok(())
    }

    // ============ Per-step pass ============

    /// Run the per-step recomputation over every live network.
    ///
    /// Dirty networks get two extra stabilization solves first: a merged
    /// or freshly mutated topology is numerically discontinuous from the
    /// stale warm start, so a couple of throwaway solves let the guess
    /// relax before it is trusted. Edgeless networks are reaped and their
    /// nodes detached.
    pub fn tick(&mut self) -> Result<()> {
        let mut reap = Vec::new();

        for slot in 0..self.networks.len() {
            let network = match self.networks[slot].as_mut() {
                Some(network) => network,
                None => continue,
            };
            if network.is_empty() {
                reap.push(slot);
                continue;
            }
            if network.is_dirty() {
                network.recompute(&mut self.nodes)?;
                network.recompute(&mut self.nodes)?;
                network.clear_dirty();
            }
            network.recompute(&mut self.nodes)?;
        }

        for slot in reap {
            if let Some(network) = self.networks[slot].take() {
                log::debug!("reaping empty network {}", network.id());
                for &node in network.nodes() {
                    self.nodes.get_mut(node)?.set_membership(None);
                }
                self.free_networks.push(slot);
            }
        }
        Ok(())
    }

    /// Recompute a single network immediately, returning the solver
    /// report. The per-step pass is the normal driver; this exists for
    /// hosts that need an out-of-band solve.
    pub fn recompute_network(&mut self, id: NetworkId) -> Result<SolveReport> {
        let network = self
            .networks
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or(VoltgridError::NetworkNotFound { network: id })?;
        network.recompute(&mut self.nodes)
    }

    // ============ Internal bookkeeping ============

    fn allocate_wire_id(&mut self) -> WireId {
        let id = WireId(self.next_wire);
        self.next_wire += 1;
        id
    }

    fn create_network(&mut self) -> NetworkId {
        if let Some(slot) = self.free_networks.pop() {
            let id = NetworkId(slot);
            self.networks[slot] = Some(Network::new(id, self.solver_config.clone()));
            id
        } else {
            let id = NetworkId(self.networks.len());
            self.networks.push(Some(Network::new(id, self.solver_config.clone())));
            id
        }
    }

    fn network_slot(&mut self, id: NetworkId) -> Result<&mut Network> {
        self.networks
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or(VoltgridError::NetworkNotFound { network: id })
    }

    fn attach(&mut self, network: NetworkId, node: NodeRef) -> Result<()> {
        // Split borrow: network slot and arena are disjoint fields.
        let slot = self
            .networks
            .get_mut(network.0)
            .and_then(Option::as_mut)
            .ok_or(VoltgridError::NetworkNotFound { network })?;
        slot.add_node(&mut self.nodes, node)
    }

    /// Union-by-size merge: the smaller network's nodes and wires are
    /// appended into the larger, renumbered to continue its index
    /// sequence, and the smaller is discarded. Returns the survivor.
    fn merge_networks(&mut self, x: NetworkId, y: NetworkId) -> Result<NetworkId> {
        debug_assert_ne!(x, y, "merging a network with itself");
        let size = |space: &Self, id: NetworkId| -> Result<usize> {
            Ok(space.network(id)?.node_count())
        };
        let (keep, absorb) = if size(self, x)? >= size(self, y)? {
            (x, y)
        } else {
            (y, x)
        };

        let absorbed = self
            .networks
            .get_mut(absorb.0)
            .and_then(Option::take)
            .ok_or(VoltgridError::NetworkNotFound { network: absorb })?;
        log::debug!(
            "merging network {} ({} nodes) into {}",
            absorb,
            absorbed.node_count(),
            keep
        );
        for wire in absorbed.wires() {
            self.wire_index.insert(wire.id, keep);
        }
        self.free_networks.push(absorb.0);

        let survivor = self
            .networks
            .get_mut(keep.0)
            .and_then(Option::as_mut)
            .ok_or(VoltgridError::NetworkNotFound { network: keep })?;
        survivor.merge_from(&mut self.nodes, absorbed)?;
        Ok(keep)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// src(10) --R10-- mid --R10-- gnd(0)
    fn build_divider(space: &mut Space) -> (NodeRef, NodeRef, NodeRef) {
        let src = space.add_source_node(10.0);
        let mid = space.add_free_node();
        let gnd = space.add_source_node(0.0);
        space.connect(src, mid, 10.0).unwrap();
        space.connect(mid, gnd, 10.0).unwrap();
        (src, mid, gnd)
    }

    #[test]
    fn test_self_connection_creates_no_wire() {
        let mut space = Space::new();
        let a = space.add_free_node();
        assert!(space.connect(a, a, 5.0).unwrap().is_none());
        assert_eq!(space.network_count(), 0);
    }

    #[test]
    fn test_lazy_network_creation_and_joining() {
        let mut space = Space::new();
        let a = space.add_free_node();
        let b = space.add_free_node();
        let c = space.add_free_node();
        assert_eq!(space.network_of(a).unwrap(), None);

        space.connect(a, b, 1.0).unwrap();
        let net = space.network_of(a).unwrap().unwrap();
        assert_eq!(space.network_of(b).unwrap(), Some(net));
        assert_eq!(space.network_count(), 1);

        // One endpoint attached: the other joins the same network
        space.connect(b, c, 1.0).unwrap();
        assert_eq!(space.network_of(c).unwrap(), Some(net));
        assert_eq!(space.network_count(), 1);

        // Both already in the same network: just another wire
        space.connect(a, c, 1.0).unwrap();
        assert_eq!(space.network_count(), 1);
        assert_eq!(space.network(net).unwrap().wire_count(), 3);
    }

    #[test]
    fn test_union_by_size_merges_smaller_into_larger() {
        let mut space = Space::new();
        let a = space.add_free_node();
        let b = space.add_free_node();
        let c = space.add_free_node();
        space.connect(a, b, 1.0).unwrap();
        space.connect(b, c, 1.0).unwrap();
        let big = space.network_of(a).unwrap().unwrap();

        let d = space.add_free_node();
        let e = space.add_free_node();
        space.connect(d, e, 1.0).unwrap();

        space.connect(c, d, 1.0).unwrap();
        assert_eq!(space.network_count(), 1);
        // The three-node network survived
        assert_eq!(space.network_of(d).unwrap(), Some(big));
        assert_eq!(space.network(big).unwrap().node_count(), 5);
        assert_eq!(space.network(big).unwrap().wire_count(), 4);
    }

    #[test]
    fn test_divider_through_space() {
        let mut space = Space::new();
        let (src, mid, _gnd) = build_divider(&mut space);
        space.tick().unwrap();

        assert_relative_eq!(space.potential(mid).unwrap(), 5.0, epsilon = 1e-4);
        assert_relative_eq!(space.source_current(src).unwrap(), 0.5, epsilon = 1e-5);
    }

    #[test]
    fn test_set_source_potential_takes_effect_next_tick() {
        let mut space = Space::new();
        let (src, mid, _gnd) = build_divider(&mut space);
        space.tick().unwrap();
        assert_relative_eq!(space.potential(mid).unwrap(), 5.0, epsilon = 1e-4);

        space.set_source_potential(src, 20.0).unwrap();
        space.tick().unwrap();
        assert_relative_eq!(space.potential(mid).unwrap(), 10.0, epsilon = 1e-4);

        let free = space.add_free_node();
        assert!(space.set_source_potential(free, 1.0).is_err());
    }

    #[test]
    fn test_merge_invariance() {
        // Two sub-circuits solved separately, then bridged, must match a
        // space where the combined topology was built directly.
        let mut merged = Space::new();
        let src1 = merged.add_source_node(10.0);
        let n1 = merged.add_free_node();
        let gnd1 = merged.add_source_node(0.0);
        merged.connect(src1, n1, 10.0).unwrap();
        merged.connect(n1, gnd1, 10.0).unwrap();

        let src2 = merged.add_source_node(4.0);
        let n2 = merged.add_free_node();
        let gnd2 = merged.add_source_node(0.0);
        merged.connect(src2, n2, 20.0).unwrap();
        merged.connect(n2, gnd2, 20.0).unwrap();

        merged.tick().unwrap();
        assert_eq!(merged.network_count(), 2);

        // Bridge the components
        merged.connect(n1, n2, 5.0).unwrap();
        merged.tick().unwrap();
        assert_eq!(merged.network_count(), 1);

        let mut direct = Space::new();
        let d_src1 = direct.add_source_node(10.0);
        let d_n1 = direct.add_free_node();
        let d_gnd1 = direct.add_source_node(0.0);
        let d_src2 = direct.add_source_node(4.0);
        let d_n2 = direct.add_free_node();
        let d_gnd2 = direct.add_source_node(0.0);
        direct.connect(d_src1, d_n1, 10.0).unwrap();
        direct.connect(d_n1, d_gnd1, 10.0).unwrap();
        direct.connect(d_src2, d_n2, 20.0).unwrap();
        direct.connect(d_n2, d_gnd2, 20.0).unwrap();
        direct.connect(d_n1, d_n2, 5.0).unwrap();
        direct.tick().unwrap();

        assert_relative_eq!(
            merged.potential(n1).unwrap(),
            direct.potential(d_n1).unwrap(),
            epsilon = 1e-4
        );
        assert_relative_eq!(
            merged.potential(n2).unwrap(),
            direct.potential(d_n2).unwrap(),
            epsilon = 1e-4
        );
    }

    #[test]
    fn test_tick_reaps_edgeless_networks() {
        let mut space = Space::new();
        let a = space.add_free_node();
        let b = space.add_free_node();
        let wire = space.connect(a, b, 1.0).unwrap().unwrap();
        assert_eq!(space.network_count(), 1);

        space.disconnect(wire).unwrap();
        space.tick().unwrap();
        assert_eq!(space.network_count(), 0);
        // Members of the reaped network are detached again
        assert_eq!(space.network_of(a).unwrap(), None);
        assert_eq!(space.network_of(b).unwrap(), None);

        // Reconnecting works and reuses the freed slot
        space.connect(a, b, 1.0).unwrap();
        assert_eq!(space.network_count(), 1);
    }

    #[test]
    fn test_disconnect_stale_wire_errors() {
        let mut space = Space::new();
        let a = space.add_free_node();
        let b = space.add_free_node();
        let wire = space.connect(a, b, 1.0).unwrap().unwrap();

        space.disconnect(wire).unwrap();
        assert!(matches!(
            space.disconnect(wire),
            Err(VoltgridError::WireNotFound { .. })
        ));
        // Never-issued ids are just as stale
        assert!(matches!(
            space.disconnect(WireId(999)),
            Err(VoltgridError::WireNotFound { .. })
        ));
    }

    #[test]
    fn test_remove_node_drops_incident_wires() {
        let mut space = Space::new();
        let (src, mid, gnd) = build_divider(&mut space);
        space.tick().unwrap();

        space.remove_node(mid).unwrap();
        assert!(space.potential(mid).is_err());

        // Both wires touched mid, so the network is now edgeless
        let net = space.network_of(src).unwrap().unwrap();
        assert!(space.network(net).unwrap().is_empty());
        space.tick().unwrap();
        assert_eq!(space.network_count(), 0);
        assert_eq!(space.network_of(gnd).unwrap(), None);
    }

    #[test]
    fn test_couple_unifies_membership() {
        let mut space = Space::new();
        let src = space.add_source_node(10.0);
        let prim = space.add_free_node();
        let sec = space.add_free_node();
        space.connect(src, prim, 10.0).unwrap();
        // sec is still unattached; coupling pulls it in
        let xfmr = space.couple(2.0, &[prim, sec]).unwrap();
        space.connect_to_ground(sec, 10.0).unwrap();

        let net = space.network_of(prim).unwrap().unwrap();
        assert_eq!(space.network_of(sec).unwrap(), Some(net));
        assert_eq!(space.network_of(xfmr).unwrap(), Some(net));

        space.tick().unwrap();
        assert_relative_eq!(space.potential(prim).unwrap(), 2.0, epsilon = 1e-4);
        assert_relative_eq!(space.potential(sec).unwrap(), 4.0, epsilon = 1e-4);
    }

    #[test]
    fn test_removing_coupling_terminal_removes_coupling() {
        let mut space = Space::new();
        let src = space.add_source_node(10.0);
        let prim = space.add_free_node();
        let sec = space.add_free_node();
        space.connect(src, prim, 10.0).unwrap();
        let xfmr = space.couple(2.0, &[prim, sec]).unwrap();
        space.connect_to_ground(sec, 10.0).unwrap();
        space.tick().unwrap();

        space.remove_node(prim).unwrap();
        // The coupling went with its terminal instead of dangling
        assert!(!space.arena().contains(xfmr));

        // The space keeps stepping; nothing is wedged
        space.tick().unwrap();
        space.tick().unwrap();
        assert_relative_eq!(space.potential(src).unwrap(), 10.0, epsilon = 1e-4);

        // A node reusing the freed slots must not inherit the coupling
        let fresh = space.add_free_node();
        space.connect(src, fresh, 10.0).unwrap();
        space.connect_to_ground(fresh, 10.0).unwrap();
        space.tick().unwrap();
        assert_relative_eq!(space.potential(fresh).unwrap(), 5.0, epsilon = 1e-4);
    }

    #[test]
    fn test_removing_terminal_cascades_through_couplings() {
        // xfmr2 couples onto xfmr1, so removing mid has to take out both.
        let mut space = Space::new();
        let mid = space.add_free_node();
        let other = space.add_free_node();
        space.connect(mid, other, 1.0).unwrap();
        let xfmr1 = space.couple(2.0, &[mid, other]).unwrap();
        let xfmr2 = space.couple(3.0, &[xfmr1, other]).unwrap();

        space.remove_node(mid).unwrap();
        assert!(!space.arena().contains(xfmr1));
        assert!(!space.arena().contains(xfmr2));
        assert!(space.arena().contains(other));
        space.tick().unwrap();
    }

    #[test]
    fn test_couple_rejects_bad_arity() {
        let mut space = Space::new();
        let a = space.add_free_node();
        assert!(matches!(
            space.couple(1.0, &[a]),
            Err(VoltgridError::InvalidTerminalCount { count: 1 })
        ));
        let b = space.add_free_node();
        let c = space.add_free_node();
        let d = space.add_free_node();
        let e = space.add_free_node();
        assert!(matches!(
            space.couple(1.0, &[a, b, c, d, e]),
            Err(VoltgridError::InvalidTerminalCount { count: 5 })
        ));
    }

    #[test]
    fn test_parallel_wires_halve_resistance() {
        let mut space = Space::new();
        let src = space.add_source_node(10.0);
        let mid = space.add_free_node();
        let gnd = space.add_source_node(0.0);
        space.connect(src, mid, 10.0).unwrap();
        space.connect(src, mid, 10.0).unwrap();
        space.connect(mid, gnd, 10.0).unwrap();
        space.tick().unwrap();

        // Two parallel 10-ohm wires act as 5 ohms: divider gives 2/3 of 10V
        assert_relative_eq!(space.potential(mid).unwrap(), 20.0 / 3.0, epsilon = 1e-4);
    }
}
