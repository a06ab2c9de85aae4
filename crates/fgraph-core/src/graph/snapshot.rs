//! Structural snapshots and fingerprints
//!
//! A snapshot captures the live structure independently of insertion
//! order, so a graph that was rewritten and reverted compares equal to its
//! earlier self.

use super::FunctionGraph;
use crate::types::{Client, NodeId, VarId};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Op and wiring of one live node
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeShape {
    /// Op name
    pub op: String,
    /// Input variables, in order
    pub inputs: Vec<VarId>,
    /// Output variables, in order
    pub outputs: Vec<VarId>,
}

/// Order-independent view of the live graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphSnapshot {
    /// Graph inputs
    pub inputs: Vec<VarId>,
    /// Graph outputs
    pub outputs: Vec<VarId>,
    /// Live nodes
    pub nodes: BTreeMap<NodeId, NodeShape>,
    /// Client set of every live variable
    pub clients: BTreeMap<VarId, BTreeSet<Client>>,
}

/// SHA-256 digest of a [`GraphSnapshot`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint(pub [u8; 32]);

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl GraphSnapshot {
    /// Digest of the snapshot
    #[must_use]
    pub fn fingerprint(&self) -> Fingerprint {
        let mut hasher = Sha256::new();
        hash_vars(&mut hasher, &self.inputs);
        hash_vars(&mut hasher, &self.outputs);
        for (node, shape) in &self.nodes {
            hasher.update(node.to_string().as_bytes());
            hasher.update(shape.op.as_bytes());
            hasher.update([0]);
            hash_vars(&mut hasher, &shape.inputs);
            hash_vars(&mut hasher, &shape.outputs);
        }
        for (var, clients) in &self.clients {
            hasher.update(var.to_string().as_bytes());
            for client in clients {
                hasher.update(client.to_string().as_bytes());
            }
            hasher.update([0]);
        }
        Fingerprint(hasher.finalize().into())
    }
}

fn hash_vars(hasher: &mut Sha256, vars: &[VarId]) {
    for var in vars {
        hasher.update(var.to_string().as_bytes());
        hasher.update([b',']);
    }
    hasher.update([0]);
}

impl FunctionGraph {
    /// Order-independent structural view of the live graph
    #[must_use]
    pub fn snapshot(&self) -> GraphSnapshot {
        let nodes = self
            .apply_nodes
            .iter()
            .map(|&node| {
                let record = &self.node_arena[node.index()];
                let shape = NodeShape {
                    op: record.op.name().into_owned(),
                    inputs: record.inputs.clone(),
                    outputs: record.outputs.clone(),
                };
                (node, shape)
            })
            .collect();
        let clients = self
            .variables
            .iter()
            .map(|&var| (var, self.clients(var).iter().copied().collect()))
            .collect();
        GraphSnapshot {
            inputs: self.inputs.clone(),
            outputs: self.outputs.clone(),
            nodes,
            clients,
        }
    }

    /// Digest of [`snapshot`](Self::snapshot)
    #[must_use]
    pub fn fingerprint(&self) -> Fingerprint {
        self.snapshot().fingerprint()
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
    fn fingerprint_tracks_structure() {
        let ty = VarType::scalar(DType::Int64);
        let mut fg = FunctionGraph::default();
        let x = fg.add_input(ty.clone(), None);
        let empty = fg.fingerprint();

        let y = fg.apply_single(Arc::new(Named("neg")), &[x], ty).unwrap();
        assert_eq!(fg.fingerprint(), empty);
        fg.add_output(y, Reason::Init).unwrap();
        assert_ne!(fg.fingerprint(), empty);
        assert_eq!(fg.fingerprint().to_string().len(), 64);
    }
}
