//! Resistive wires: the Ohmic edges of the network graph.

use super::types::{NodeRef, WireId};

/// Minimum resistance in ohms. Wires are clamped to this at creation so
/// that conductance stays finite even for nominally zero-resistance
/// connections.
pub const MIN_RESISTANCE: f64 = 1e-9;

/// A resistive connection between two nodes, or between one node and the
/// implicit reference potential (ground).
///
/// Wires are immutable once created and removed by identity. Parallel
/// wires between the same pair of nodes are valid; their conductances
/// simply add during assembly.
#[derive(Debug, Clone)]
pub struct Wire {
    /// Identity within the owning space.
    pub id: WireId,
    /// First endpoint, always a real node.
    pub a: NodeRef,
    /// Second endpoint; `None` means the implicit reference (ground).
    pub b: Option<NodeRef>,
    /// Resistance in ohms, clamped to [`MIN_RESISTANCE`].
    resistance: f64,
}

impl Wire {
    /// Create a new wire. Resistance is clamped to [`MIN_RESISTANCE`].
    pub fn new(id: WireId, a: NodeRef, b: Option<NodeRef>, resistance: f64) -> Self {
        Self {
            id,
            a,
            b,
            resistance: resistance.max(MIN_RESISTANCE),
        }
    }

    /// Resistance in ohms.
    pub fn resistance(&self) -> f64 {
        self.resistance
    }

    /// Conductance in siemens (1/R).
    pub fn conductance(&self) -> f64 {
        1.0 / self.resistance
    }

    /// Whether `node` is one of this wire's endpoints.
    pub fn touches(&self, node: NodeRef) -> bool {
        self.a == node || self.b == Some(node)
    }

    /// The endpoint opposite to `node`, if the wire touches it at all.
    /// `Some(None)` means the other end is the implicit reference.
    pub fn other_end(&self, node: NodeRef) -> Option<Option<NodeRef>> {
        if self.a == node {
            Some(self.b)
        } else if self.b == Some(node) {
            Some(Some(self.a))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conductance() {
        let w = Wire::new(WireId(0), NodeRef(0), Some(NodeRef(1)), 1000.0);
        assert!((w.conductance() - 0.001).abs() < 1e-12);
    }

    #[test]
    fn test_zero_resistance_is_clamped() {
        let w = Wire::new(WireId(0), NodeRef(0), None, 0.0);
        assert!(w.resistance() >= MIN_RESISTANCE);
        assert!(w.conductance().is_finite());
    }

    #[test]
    fn test_other_end() {
        let w = Wire::new(WireId(0), NodeRef(0), Some(NodeRef(1)), 10.0);
        assert_eq!(w.other_end(NodeRef(0)), Some(Some(NodeRef(1))));
        assert_eq!(w.other_end(NodeRef(1)), Some(Some(NodeRef(0))));
        assert_eq!(w.other_end(NodeRef(2)), None);

        let g = Wire::new(WireId(1), NodeRef(0), None, 10.0);
        assert_eq!(g.other_end(NodeRef(0)), Some(None));
    }
}
