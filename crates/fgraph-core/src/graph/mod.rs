//! Function graph store
//!
//! [`FunctionGraph`] owns every node and variable record in an arena, plus
//! the live subset that is currently reachable from the designated outputs.
//! Records are never freed while the graph lives: a pruned node keeps its id
//! and can be re-imported by a revert with the same identity.
//!
//! Mutations go through [`import_node`](FunctionGraph::import_node),
//! [`prune_node`](FunctionGraph::prune_node) and
//! [`replace`](FunctionGraph::replace); each fires events to the attached
//! features.

mod mutation;
mod snapshot;
mod toposort;

pub(crate) use mutation::log_replacements;
pub use mutation::ReplaceOutcome;
pub use snapshot::{Fingerprint, GraphSnapshot, NodeShape};
pub use toposort::Schedule;

use crate::config::FgraphConfig;
use crate::error::{Error, FeatureError, GraphError, Result};
use crate::feature::{
    Capabilities, Checkpoint, Feature, Memo, ValidateOptions, ValidationStats,
};
use crate::types::{
    Client, GraphId, GraphItem, NodeId, Op, Owner, Reason, VarId, VarTag, VarType,
};
use indexmap::IndexSet;
use std::collections::HashMap;
use std::sync::Arc;

/// An op applied to ordered inputs, producing ordered outputs
#[derive(Debug, Clone)]
pub struct ApplyNode {
    op: Arc<dyn Op>,
    inputs: Vec<VarId>,
    outputs: Vec<VarId>,
}

impl ApplyNode {
    /// The applied op
    #[inline]
    #[must_use]
    pub fn op(&self) -> &dyn Op {
        self.op.as_ref()
    }

    /// Shared handle to the applied op
    #[inline]
    #[must_use]
    pub fn op_handle(&self) -> Arc<dyn Op> {
        Arc::clone(&self.op)
    }

    /// Input variables, in order
    #[inline]
    #[must_use]
    pub fn inputs(&self) -> &[VarId] {
        &self.inputs
    }

    /// Output variables, in order
    #[inline]
    #[must_use]
    pub fn outputs(&self) -> &[VarId] {
        &self.outputs
    }
}

/// A typed value slot
#[derive(Debug, Clone)]
pub struct Variable {
    ty: VarType,
    owner: Option<Owner>,
    name: Option<String>,
    tag: VarTag,
    constant: bool,
}

impl Variable {
    /// Static type
    #[inline]
    #[must_use]
    pub fn ty(&self) -> &VarType {
        &self.ty
    }

    /// Producing node, `None` for graph inputs and constants
    #[inline]
    #[must_use]
    pub fn owner(&self) -> Option<Owner> {
        self.owner
    }

    /// Optional user-facing name
    #[inline]
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Annotations
    #[inline]
    #[must_use]
    pub fn tag(&self) -> &VarTag {
        &self.tag
    }

    /// Whether this is a constant
    #[inline]
    #[must_use]
    pub fn is_constant(&self) -> bool {
        self.constant
    }
}

/// Computation graph store
#[derive(Debug)]
pub struct FunctionGraph {
    id: GraphId,
    config: FgraphConfig,
    node_arena: Vec<ApplyNode>,
    var_arena: Vec<Variable>,
    inputs: Vec<VarId>,
    outputs: Vec<VarId>,
    apply_nodes: IndexSet<NodeId>,
    variables: IndexSet<VarId>,
    clients: HashMap<VarId, Vec<Client>>,
    features: Vec<Arc<dyn Feature>>,
    replace_seq: u64,
    pub(crate) capabilities: Capabilities,
}

impl FunctionGraph {
    /// Empty graph
    #[must_use]
    pub fn new(config: FgraphConfig) -> Self {
        Self {
            id: GraphId::new(),
            config,
            node_arena: Vec::new(),
            var_arena: Vec::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            apply_nodes: IndexSet::new(),
            variables: IndexSet::new(),
            clients: HashMap::new(),
            features: Vec::new(),
            replace_seq: 0,
            capabilities: Capabilities::default(),
        }
    }

    /// Identity of this graph
    #[inline]
    #[must_use]
    pub fn id(&self) -> GraphId {
        self.id
    }

    /// Configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &FgraphConfig {
        &self.config
    }

    // --- construction -----------------------------------------------------

    fn alloc_var(&mut self, ty: VarType, owner: Option<Owner>, name: Option<&str>, constant: bool) -> VarId {
        let id = VarId::from_raw(u32::try_from(self.var_arena.len()).unwrap_or(u32::MAX));
        self.var_arena.push(Variable {
            ty,
            owner,
            name: name.map(str::to_string),
            tag: VarTag::default(),
            constant,
        });
        id
    }

    /// Declare a graph input; it is live immediately
    pub fn add_input(&mut self, ty: VarType, name: Option<&str>) -> VarId {
        let var = self.alloc_var(ty, None, name, false);
        self.inputs.push(var);
        self.variables.insert(var);
        self.clients.entry(var).or_default();
        var
    }

    /// Allocate a constant; it becomes live once something consumes it
    pub fn add_constant(&mut self, ty: VarType, name: Option<&str>) -> VarId {
        self.alloc_var(ty, None, name, true)
    }

    /// Allocate a node applying `op` to `inputs`, with one output per type
    ///
    /// The node is not part of the graph until it is imported, directly or
    /// through a replacement or [`add_output`](Self::add_output).
    ///
    /// # Errors
    /// `UnknownVariable` if an input was not allocated by this graph.
    pub fn apply(
        &mut self,
        op: Arc<dyn Op>,
        inputs: &[VarId],
        output_types: Vec<VarType>,
    ) -> Result<NodeId> {
        for &input in inputs {
            self.var(input)?;
        }
        let node = NodeId::from_raw(u32::try_from(self.node_arena.len()).unwrap_or(u32::MAX));
        let outputs = output_types
            .into_iter()
            .enumerate()
            .map(|(index, ty)| self.alloc_var(ty, Some(Owner { node, index }), None, false))
            .collect();
        self.node_arena.push(ApplyNode {
            op,
            inputs: inputs.to_vec(),
            outputs,
        });
        Ok(node)
    }

    /// [`apply`](Self::apply) for single-output ops, returning the output
    ///
    /// # Errors
    /// Same as [`apply`](Self::apply).
    pub fn apply_single(&mut self, op: Arc<dyn Op>, inputs: &[VarId], ty: VarType) -> Result<VarId> {
        let node = self.apply(op, inputs, vec![ty])?;
        Ok(self.node_arena[node.index()].outputs[0])
    }

    /// Designate `var` as a graph output, importing whatever computes it
    ///
    /// # Errors
    /// Import errors for the producers of `var`.
    pub fn add_output(&mut self, var: VarId, reason: impl Into<Reason>) -> Result<()> {
        let reason = reason.into();
        self.import_var(var, &reason)?;
        let index = self.outputs.len();
        self.outputs.push(var);
        self.add_client(var, Client::Output { index });
        Ok(())
    }

    /// [`add_output`](Self::add_output) for each of `outputs`, in order
    ///
    /// # Errors
    /// The first import error; outputs before it stay designated.
    pub fn set_outputs(&mut self, outputs: &[VarId], reason: impl Into<Reason>) -> Result<()> {
        let reason = reason.into();
        for &var in outputs {
            self.add_output(var, reason.clone())?;
        }
        Ok(())
    }

    // --- queries ----------------------------------------------------------

    /// Graph inputs, in declaration order
    #[inline]
    #[must_use]
    pub fn inputs(&self) -> &[VarId] {
        &self.inputs
    }

    /// Graph outputs, in declaration order
    #[inline]
    #[must_use]
    pub fn outputs(&self) -> &[VarId] {
        &self.outputs
    }

    /// Node record, live or not
    ///
    /// # Errors
    /// `UnknownNode` if the id was not allocated by this graph.
    pub fn node(&self, node: NodeId) -> Result<&ApplyNode> {
        self.node_arena
            .get(node.index())
            .ok_or_else(|| GraphError::UnknownNode(node).into())
    }

    /// Variable record, live or not
    ///
    /// # Errors
    /// `UnknownVariable` if the id was not allocated by this graph.
    pub fn var(&self, var: VarId) -> Result<&Variable> {
        self.var_arena
            .get(var.index())
            .ok_or_else(|| GraphError::UnknownVariable(var).into())
    }

    /// Output `index` of `node`
    ///
    /// # Errors
    /// `UnknownNode` for foreign ids, `UnknownVariable` for a bad index.
    pub fn output_of(&self, node: NodeId, index: usize) -> Result<VarId> {
        let record = self.node(node)?;
        record.outputs.get(index).copied().ok_or_else(|| {
            GraphError::Inconsistency(format!("{node} has no output {index}")).into()
        })
    }

    /// Current clients of `var`; empty when the variable is not live
    #[must_use]
    pub fn clients(&self, var: VarId) -> &[Client] {
        self.clients.get(&var).map(Vec::as_slice).unwrap_or_default()
    }

    /// Whether `node` is live
    #[inline]
    #[must_use]
    pub fn contains_node(&self, node: NodeId) -> bool {
        self.apply_nodes.contains(&node)
    }

    /// Whether `var` is live
    #[inline]
    #[must_use]
    pub fn contains_var(&self, var: VarId) -> bool {
        self.variables.contains(&var)
    }

    /// Whether a node or variable is live
    #[must_use]
    pub fn contains_item(&self, item: GraphItem) -> bool {
        match item {
            GraphItem::Node(node) => self.contains_node(node),
            GraphItem::Var(var) => self.contains_var(var),
        }
    }

    /// Live nodes, in import order
    pub fn apply_nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.apply_nodes.iter().copied()
    }

    /// Live variables, in registration order
    pub fn variables(&self) -> impl Iterator<Item = VarId> + '_ {
        self.variables.iter().copied()
    }

    /// Number of live nodes
    #[inline]
    #[must_use]
    pub fn num_nodes(&self) -> usize {
        self.apply_nodes.len()
    }

    /// Attached features, in attachment order
    #[inline]
    #[must_use]
    pub fn features(&self) -> &[Arc<dyn Feature>] {
        &self.features
    }

    /// Installed capabilities
    #[inline]
    #[must_use]
    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// Rename a variable
    ///
    /// # Errors
    /// `UnknownVariable` for foreign ids.
    pub fn set_var_name(&mut self, var: VarId, name: Option<String>) -> Result<()> {
        self.var(var)?;
        self.var_arena[var.index()].name = name;
        Ok(())
    }

    /// Replace a variable's annotations
    ///
    /// # Errors
    /// `UnknownVariable` for foreign ids.
    pub fn set_var_tag(&mut self, var: VarId, tag: VarTag) -> Result<()> {
        self.var(var)?;
        self.var_arena[var.index()].tag = tag;
        Ok(())
    }

    // --- features ---------------------------------------------------------

    /// Attach a feature
    ///
    /// Attaching the same instance twice is a no-op.
    ///
    /// # Errors
    /// Whatever the feature's `on_attach` returns, typically `AlreadyThere`;
    /// the feature is not attached in that case.
    pub fn attach_feature(&mut self, feature: Arc<dyn Feature>) -> Result<()> {
        if self.features.iter().any(|f| Arc::ptr_eq(f, &feature)) {
            return Ok(());
        }
        Arc::clone(&feature).on_attach(self)?;
        tracing::debug!(graph = %self.id, feature = feature.name(), "attached feature");
        self.features.push(feature);
        Ok(())
    }

    /// Detach a feature
    ///
    /// # Errors
    /// `NotAttached` if the feature is not attached here, or the feature's
    /// `on_detach` error.
    pub fn remove_feature(&mut self, feature: &Arc<dyn Feature>) -> Result<()> {
        let position = self
            .features
            .iter()
            .position(|f| Arc::ptr_eq(f, feature))
            .ok_or_else(|| FeatureError::NotAttached {
                feature: feature.name().to_string(),
            })?;
        let feature = self.features.remove(position);
        Arc::clone(&feature).on_detach(self)?;
        tracing::debug!(graph = %self.id, feature = feature.name(), "detached feature");
        Ok(())
    }

    /// Run `callback` for each attached feature, in attachment order
    ///
    /// The feature list is snapshotted first; a feature detached by an
    /// earlier callback is skipped.
    pub(crate) fn execute_callbacks<F>(&mut self, mut callback: F) -> Result<()>
    where
        F: FnMut(&dyn Feature, &mut FunctionGraph) -> Result<()>,
    {
        let features = self.features.clone();
        for feature in &features {
            if !self.features.iter().any(|f| Arc::ptr_eq(f, feature)) {
                continue;
            }
            callback(feature.as_ref(), self)?;
        }
        Ok(())
    }

    // --- capabilities -----------------------------------------------------

    fn missing(capability: &'static str) -> Error {
        FeatureError::MissingCapability { capability }.into()
    }

    /// Take a checkpoint, discarding the undo log
    ///
    /// # Errors
    /// `MissingCapability` without a history feature.
    pub fn checkpoint(&mut self) -> Result<Checkpoint> {
        let history = self.capabilities.history.clone().ok_or_else(|| Self::missing("checkpoint"))?;
        history.checkpoint(self)
    }

    /// Undo every replacement since `checkpoint`
    ///
    /// # Errors
    /// `MissingCapability` without a history feature; `CheckpointMismatch`
    /// if `checkpoint` is not the newest one.
    pub fn revert(&mut self, checkpoint: Checkpoint) -> Result<()> {
        let history = self.capabilities.history.clone().ok_or_else(|| Self::missing("revert"))?;
        history.revert(self, checkpoint)
    }

    /// Run every feature's validation hook
    ///
    /// # Errors
    /// `MissingCapability` without a validator, else the first failure.
    pub fn validate(&mut self) -> Result<()> {
        let validator = self.capabilities.validator.clone().ok_or_else(|| Self::missing("validate"))?;
        validator.validate(self, ValidateOptions::reporting(self.config.optimizer_verbose))
    }

    /// Whether validation currently passes
    #[must_use]
    pub fn consistent(&mut self) -> bool {
        match self.capabilities.validator.clone() {
            Some(validator) => validator.consistent(self),
            None => false,
        }
    }

    /// Timing statistics of the validator, if attached
    #[must_use]
    pub fn validation_stats(&self) -> Option<ValidationStats> {
        self.capabilities.validator.as_ref().map(|v| v.stats())
    }

    /// Live nodes applying `op`, in import order
    ///
    /// # Errors
    /// `MissingCapability` without a node finder; `UnhashableOp` for ops
    /// without a key.
    pub fn get_nodes(&self, op: &dyn Op) -> Result<Vec<NodeId>> {
        let finder = self.capabilities.node_finder.as_ref().ok_or_else(|| Self::missing("get_nodes"))?;
        finder.query(op)
    }

    /// Replace `old` by `new` atomically with validation
    ///
    /// # Errors
    /// See [`replace_all_validate`](Self::replace_all_validate).
    pub fn replace_validate(&mut self, old: VarId, new: VarId, reason: impl Into<Reason>) -> Result<()> {
        let replacer = self.capabilities.replacer.clone().ok_or_else(|| Self::missing("replace_validate"))?;
        replacer.replace_validate(self, old, new, &reason.into())
    }

    /// Replace every pair atomically, then validate; revert on any failure
    ///
    /// # Errors
    /// The replace or validation error, after the graph was restored.
    pub fn replace_all_validate(
        &mut self,
        pairs: &[(VarId, VarId)],
        reason: impl Into<Reason>,
        verbose: Option<bool>,
    ) -> Result<(Memo, Checkpoint)> {
        let replacer = self.capabilities.replacer.clone().ok_or_else(|| Self::missing("replace_all_validate"))?;
        replacer.replace_all_validate(self, pairs, &reason.into(), verbose)
    }

    /// As [`replace_all_validate`](Self::replace_all_validate), also
    /// requiring every item of `remove` to be gone afterwards
    ///
    /// # Errors
    /// `ReplacementDidNotRemove` after reverting, or any error of
    /// [`replace_all_validate`](Self::replace_all_validate).
    pub fn replace_all_validate_remove(
        &mut self,
        pairs: &[(VarId, VarId)],
        remove: &[GraphItem],
        reason: impl Into<Reason>,
        warn: bool,
    ) -> Result<Memo> {
        let replacer = self
            .capabilities
            .replacer
            .clone()
            .ok_or_else(|| Self::missing("replace_all_validate_remove"))?;
        replacer.replace_all_validate_remove(self, pairs, remove, &reason.into(), warn)
    }
}

impl Default for FunctionGraph {
    fn default() -> Self {
        Self::new(FgraphConfig::default())
    }
}
