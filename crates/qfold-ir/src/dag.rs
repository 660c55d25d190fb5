//! Dependency DAG over elementary operations, used for depth.

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex as PetNodeIndex};
use petgraph::visit::EdgeRef;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::error::{IrError, IrResult};
use crate::instruction::Instruction;
use crate::qubit::{ClbitId, QubitId};

/// Node index type used in the DAG.
pub type NodeIndex = PetNodeIndex<u32>;

/// A node in the dependency DAG.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DagNode {
    /// Input node for a wire.
    In(WireId),
    /// Operation node containing an instruction.
    Op(Instruction),
}

impl DagNode {
    /// Get the instruction if this is an operation node.
    #[inline]
    pub fn instruction(&self) -> Option<&Instruction> {
        match self {
            DagNode::Op(inst) => Some(inst),
            DagNode::In(_) => None,
        }
    }

    /// Layers this node adds to any path through it.
    ///
    /// Barriers order their qubits without occupying a layer.
    fn weight(&self) -> usize {
        match self {
            DagNode::Op(inst) if !inst.is_barrier() => 1,
            _ => 0,
        }
    }
}

/// Identifier for a wire in the DAG.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WireId {
    /// A quantum wire.
    Qubit(QubitId),
    /// A classical wire.
    Clbit(ClbitId),
}

impl From<QubitId> for WireId {
    fn from(q: QubitId) -> Self {
        WireId::Qubit(q)
    }
}

impl From<ClbitId> for WireId {
    fn from(c: ClbitId) -> Self {
        WireId::Clbit(c)
    }
}

/// An edge in the DAG: the wire two operations share.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DagEdge {
    /// The wire this edge represents.
    pub wire: WireId,
}

/// Dependency graph of a flattened program.
///
/// Two operations are connected when they share a qubit or clbit; edges
/// always point forward in program order. Node indices are handed out in
/// insertion order, so index order is a valid topological order.
#[derive(Debug, Default, Clone)]
pub struct CircuitDag {
    graph: DiGraph<DagNode, DagEdge, u32>,
    /// Last node touching each wire.
    wire_front: FxHashMap<WireId, NodeIndex>,
}

impl CircuitDag {
    /// Create an empty DAG.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a qubit wire. Adding an existing wire is a no-op.
    pub fn add_qubit(&mut self, qubit: QubitId) {
        self.add_wire(WireId::Qubit(qubit));
    }

    /// Add a classical wire. Adding an existing wire is a no-op.
    pub fn add_clbit(&mut self, clbit: ClbitId) {
        self.add_wire(WireId::Clbit(clbit));
    }

    fn add_wire(&mut self, wire: WireId) {
        if !self.wire_front.contains_key(&wire) {
            let node = self.graph.add_node(DagNode::In(wire));
            self.wire_front.insert(wire, node);
        }
    }

    /// Append an operation.
    pub fn apply(&mut self, instruction: Instruction) -> IrResult<NodeIndex> {
        self.apply_conditioned(instruction, &[])
    }

    /// Append an operation that additionally depends on `condition` clbits
    /// (operations inside a runtime branch).
    pub fn apply_conditioned(
        &mut self,
        instruction: Instruction,
        condition: &[ClbitId],
    ) -> IrResult<NodeIndex> {
        let gate_name = instruction.as_gate().map(|g| g.name().to_string());
        instruction.check_distinct()?;

        let mut wires: Vec<WireId> = instruction
            .qubits
            .iter()
            .map(|&q| WireId::Qubit(q))
            .chain(instruction.clbits.iter().map(|&c| WireId::Clbit(c)))
            .chain(condition.iter().map(|&c| WireId::Clbit(c)))
            .collect();
        wires.dedup();

        for wire in &wires {
            if !self.wire_front.contains_key(wire) {
                return Err(match *wire {
                    WireId::Qubit(qubit) => IrError::QubitNotFound {
                        qubit,
                        gate_name: gate_name.clone(),
                    },
                    WireId::Clbit(clbit) => IrError::ClbitNotFound {
                        clbit,
                        gate_name: gate_name.clone(),
                    },
                });
            }
        }

        let node = self.graph.add_node(DagNode::Op(instruction));
        for wire in wires {
            if let Some(prev) = self.wire_front.insert(wire, node) {
                // A repeated wire already points at `node`.
                if prev != node {
                    self.graph.add_edge(prev, node, DagEdge { wire });
                }
            }
        }
        Ok(node)
    }

    /// Number of operation nodes.
    pub fn num_ops(&self) -> usize {
        self.graph
            .node_weights()
            .filter(|n| matches!(n, DagNode::Op(_)))
            .count()
    }

    /// Length of the longest dependency chain, counting barriers as zero.
    pub fn depth(&self) -> usize {
        let mut depths = vec![0usize; self.graph.node_count()];
        let mut max_depth = 0;

        for node in self.graph.node_indices() {
            let max_pred_depth = self
                .graph
                .edges_directed(node, Direction::Incoming)
                .map(|e| depths[e.source().index()])
                .max()
                .unwrap_or(0);
            let node_depth = max_pred_depth + self.graph[node].weight();
            max_depth = max_depth.max(node_depth);
            depths[node.index()] = node_depth;
        }

        max_depth
    }

    /// Operations in program order.
    pub fn ops(&self) -> impl Iterator<Item = &Instruction> {
        self.graph.node_weights().filter_map(DagNode::instruction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::Gate;

    fn gate(name: &str, qubits: &[u32]) -> Instruction {
        Instruction::gate(
            Gate::builtin(name, vec![]).unwrap(),
            qubits.iter().map(|&q| QubitId(q)),
        )
        .unwrap()
    }

    fn dag(n: u32, m: u32) -> CircuitDag {
        let mut dag = CircuitDag::new();
        for q in 0..n {
            dag.add_qubit(QubitId(q));
        }
        for c in 0..m {
            dag.add_clbit(ClbitId(c));
        }
        dag
    }

    #[test]
    fn test_empty_depth() {
        assert_eq!(CircuitDag::new().depth(), 0);
    }

    #[test]
    fn test_parallel_ops_share_a_layer() {
        let mut dag = dag(3, 0);
        dag.apply(gate("h", &[0])).unwrap();
        dag.apply(gate("h", &[1])).unwrap();
        dag.apply(gate("h", &[2])).unwrap();
        assert_eq!(dag.depth(), 1);
        assert_eq!(dag.num_ops(), 3);
    }

    #[test]
    fn test_bell_depth() {
        let mut dag = dag(2, 2);
        dag.apply(gate("h", &[0])).unwrap();
        dag.apply(gate("cx", &[0, 1])).unwrap();
        dag.apply(Instruction::measure(QubitId(0), ClbitId(0))).unwrap();
        dag.apply(Instruction::measure(QubitId(1), ClbitId(1))).unwrap();
        assert_eq!(dag.depth(), 3);
    }

    #[test]
    fn test_barrier_synchronizes_without_layer() {
        let mut dag = dag(2, 0);
        dag.apply(gate("h", &[0])).unwrap();
        dag.apply(gate("x", &[0])).unwrap();
        dag.apply(Instruction::barrier([QubitId(0), QubitId(1)])).unwrap();
        dag.apply(gate("h", &[1])).unwrap();
        // h q[1] waits behind the barrier, so it lands in layer 3.
        assert_eq!(dag.depth(), 3);
    }

    #[test]
    fn test_condition_bits_add_dependencies() {
        let mut dag = dag(2, 1);
        dag.apply(Instruction::measure(QubitId(0), ClbitId(0))).unwrap();
        dag.apply_conditioned(gate("x", &[1]), &[ClbitId(0)]).unwrap();
        assert_eq!(dag.depth(), 2);
    }

    #[test]
    fn test_unknown_wire_rejected() {
        let mut dag = dag(1, 0);
        assert!(matches!(
            dag.apply(gate("cx", &[0, 1])),
            Err(IrError::QubitNotFound { qubit: QubitId(1), .. })
        ));
        assert!(matches!(
            dag.apply(Instruction::measure(QubitId(0), ClbitId(0))),
            Err(IrError::ClbitNotFound { .. })
        ));
    }
}
