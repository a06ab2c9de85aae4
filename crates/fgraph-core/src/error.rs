//! Error types for fgraph
//!
//! Errors are grouped by concern:
//! - [`GraphError`]: structural problems with a proposed mutation
//! - [`FeatureError`]: feature attach/detach and capability lookup
//! - [`ReplaceError`]: rewrite contracts that were not honored
//! - [`FatalError`]: conditions that must not be reverted

use crate::types::{GraphItem, NodeId, VarId, VarType};

/// Result alias used across the crate
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Main fgraph error type
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Structural graph error
    #[error("graph error: {0}")]
    Graph(#[from] GraphError),

    /// Feature protocol error
    #[error("feature error: {0}")]
    Feature(#[from] FeatureError),

    /// Rewrite contract error
    #[error("replace error: {0}")]
    Replace(#[from] ReplaceError),

    /// Unrecoverable error
    #[error("fatal: {0}")]
    Fatal(#[from] FatalError),
}

impl Error {
    /// Whether the caller can carry on after this error
    ///
    /// `AlreadyThere` means the requested feature is effectively present.
    /// Every other non-fatal error leaves the graph as it was before the
    /// failing batch.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        !self.is_fatal()
    }

    /// Whether this error must propagate without a revert
    #[inline]
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }

    /// Whether this is the `AlreadyThere` attach rejection
    #[inline]
    #[must_use]
    pub fn is_already_there(&self) -> bool {
        matches!(self, Self::Feature(FeatureError::AlreadyThere { .. }))
    }

    /// Whether the error rejects the proposed pairs themselves
    ///
    /// These are expected outcomes of a rewrite rule guessing wrong, as
    /// opposed to a bug in the store or one of its listeners.
    #[inline]
    #[must_use]
    pub fn is_rejected_pair(&self) -> bool {
        matches!(
            self,
            Self::Graph(GraphError::ExternalVariable { .. } | GraphError::TypeMismatch { .. })
        )
    }
}

/// Structural graph errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    /// Variable is not registered in this graph
    #[error("variable {var} does not belong to this graph")]
    ExternalVariable {
        /// The offending variable
        var: VarId,
    },

    /// Replacement type is not compatible with the replaced variable
    #[error("the type of the replacement must be compatible: {old} is {expected}, {new} is {found}")]
    TypeMismatch {
        /// Replaced variable
        old: VarId,
        /// Replacement variable
        new: VarId,
        /// Type of `old`
        expected: VarType,
        /// Type of `new`
        found: VarType,
    },

    /// A mutation would introduce a dependency cycle
    #[error("cyclic dependency through node {node}")]
    Cycle {
        /// A node on the cycle
        node: NodeId,
    },

    /// Node cannot be pruned while it still has clients
    #[error("node {node} still has clients")]
    NodeInUse {
        /// The node that is still consumed
        node: NodeId,
    },

    /// Unowned variable that is neither a graph input nor a constant
    #[error("variable {var} is not computable from the graph inputs")]
    MissingInput {
        /// The free variable
        var: VarId,
    },

    /// A structural invariant was violated
    #[error("inconsistency: {0}")]
    Inconsistency(String),

    /// A derived index lost track of a node
    #[error("index corrupted: node {node} is not indexed")]
    IndexCorrupted {
        /// The node missing from the index
        node: NodeId,
    },

    /// Op has no hashable key and cannot be queried
    #[error("{op} is unhashable and cannot be queried")]
    UnhashableOp {
        /// Name of the op
        op: String,
    },

    /// Node id was never allocated by this graph
    #[error("unknown node {0}")]
    UnknownNode(NodeId),

    /// Variable id was never allocated by this graph
    #[error("unknown variable {0}")]
    UnknownVariable(VarId),
}

/// Feature protocol errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FeatureError {
    /// An equivalent feature is already attached
    #[error("{feature} feature is already present or in conflict with another plugin")]
    AlreadyThere {
        /// Name of the rejected feature
        feature: String,
    },

    /// Feature instance already serves another graph
    #[error("a {feature} instance can only serve one graph")]
    AlreadyAttached {
        /// Name of the feature
        feature: String,
    },

    /// Feature instance is not attached to the given graph
    #[error("this {feature} instance was not attached to the provided graph")]
    NotAttached {
        /// Name of the feature
        feature: String,
    },

    /// Operation needs a capability no attached feature provides
    #[error("no attached feature provides `{capability}`")]
    MissingCapability {
        /// Name of the capability
        capability: &'static str,
    },
}

/// Rewrite contract errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReplaceError {
    /// A rewrite claimed to remove something that is still in the graph
    #[error("replacement did not remove {remaining:?} ({reason})")]
    ReplacementDidNotRemove {
        /// Nodes and variables that survived the replacement
        remaining: Vec<String>,
        /// Reason of the rejected rewrite
        reason: String,
    },
}

/// Unrecoverable errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FatalError {
    /// Revert requested for a checkpoint that is not the newest one
    #[error("cannot revert to checkpoint {requested}: newest checkpoint is {current}; only the most recent checkpoint is revertible")]
    CheckpointMismatch {
        /// Checkpoint passed to revert
        requested: String,
        /// Newest checkpoint issued by the history
        current: String,
    },

    /// Graph is deeper than the configured traversal limit
    #[error("graph depth exceeds {limit} while importing {at}; raise `max_graph_depth` in FgraphConfig if this graph is legitimate")]
    DepthExceeded {
        /// Configured limit
        limit: usize,
        /// Node or variable whose producers were being imported
        at: GraphItem,
    },
}
