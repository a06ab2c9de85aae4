//! Dependency ordering of live nodes

use super::FunctionGraph;
use crate::error::{GraphError, Result};
use crate::types::NodeId;
use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

/// A computed node order
///
/// Iterating does not consume the schedule, so it can be walked any number
/// of times, forwards or backwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schedule {
    order: Vec<NodeId>,
}

impl Schedule {
    /// Nodes in dependency order
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = NodeId> + ExactSizeIterator + '_ {
        self.order.iter().copied()
    }

    /// Number of scheduled nodes
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether nothing is scheduled
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Position of `node` in the schedule
    #[must_use]
    pub fn position(&self, node: NodeId) -> Option<usize> {
        self.order.iter().position(|&n| n == node)
    }

    /// The order as a slice
    #[must_use]
    pub fn as_slice(&self) -> &[NodeId] {
        &self.order
    }
}

impl IntoIterator for Schedule {
    type Item = NodeId;
    type IntoIter = std::vec::IntoIter<NodeId>;

    fn into_iter(self) -> Self::IntoIter {
        self.order.into_iter()
    }
}

impl FunctionGraph {
    fn dependency_graph(&self) -> DiGraphMap<NodeId, ()> {
        let mut graph = DiGraphMap::with_capacity(self.apply_nodes.len(), self.apply_nodes.len());
        for &node in &self.apply_nodes {
            graph.add_node(node);
        }
        for &node in &self.apply_nodes {
            for &input in &self.node_arena[node.index()].inputs {
                if let Some(owner) = self.var_arena[input.index()].owner {
                    if self.apply_nodes.contains(&owner.node) {
                        graph.add_edge(owner.node, node, ());
                    }
                }
            }
        }
        graph
    }

    fn schedule(graph: &DiGraphMap<NodeId, ()>) -> Result<Schedule> {
        match toposort(graph, None) {
            Ok(order) => Ok(Schedule { order }),
            Err(cycle) => Err(GraphError::Cycle {
                node: cycle.node_id(),
            }
            .into()),
        }
    }

    /// Order of the live nodes from structural dependencies only
    ///
    /// # Errors
    /// `Cycle` if the store itself is cyclic, which only a bug can cause.
    pub fn io_toposort(&self) -> Result<Schedule> {
        Self::schedule(&self.dependency_graph())
    }

    /// Order of the live nodes honoring every feature's orderings
    ///
    /// Constraints on nodes that are not live are ignored.
    ///
    /// # Errors
    /// `Cycle` if the orderings contradict each other or the structure.
    pub fn toposort(&self) -> Result<Schedule> {
        let mut graph = self.dependency_graph();
        for feature in &self.features {
            for (node, before) in feature.orderings(self) {
                if !self.apply_nodes.contains(&node) {
                    continue;
                }
                for prerequisite in before {
                    if prerequisite == node {
                        return Err(GraphError::Cycle { node }.into());
                    }
                    if self.apply_nodes.contains(&prerequisite) {
                        graph.add_edge(prerequisite, node, ());
                    }
                }
            }
        }
        Self::schedule(&graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DType, Op, Reason, VarType};
    use std::borrow::Cow;
    use std::sync::Arc;

    #[derive(Debug)]
    struct Named(&'static str);

    impl Op for Named {
        fn name(&self) -> Cow<'_, str> {
            Cow::Borrowed(self.0)
        }
    }

    #[test]
    fn producers_come_first() {
        let ty = VarType::scalar(DType::Float32);
        let mut fg = FunctionGraph::default();
        let x = fg.add_input(ty.clone(), None);
        let a = fg.apply_single(Arc::new(Named("neg")), &[x], ty.clone()).unwrap();
        let b = fg.apply_single(Arc::new(Named("exp")), &[a], ty.clone()).unwrap();
        let c = fg.apply_single(Arc::new(Named("add")), &[a, b], ty).unwrap();
        fg.add_output(c, Reason::Init).unwrap();

        let schedule = fg.toposort().unwrap();
        assert_eq!(schedule.len(), 3);
        let at = |var| schedule.position(fg.var(var).unwrap().owner().unwrap().node).unwrap();
        assert!(at(a) < at(b));
        assert!(at(b) < at(c));

        // restartable
        let first: Vec<_> = schedule.iter().collect();
        let second: Vec<_> = schedule.iter().collect();
        assert_eq!(first, second);
    }

    #[test]
    fn empty_graph_has_empty_schedule() {
        let fg = FunctionGraph::default();
        assert!(fg.io_toposort().unwrap().is_empty());
    }
}
