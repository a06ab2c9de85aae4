//! Import, prune and replace
//!
//! Every mutation checks what it can before touching the graph. A replace
//! batch is applied pair by pair; if a later pair or a listener fails, the
//! pairs already applied are unwound before the error is returned, so a
//! non-fatal error leaves the graph as it was.

use super::FunctionGraph;
use crate::error::{FatalError, GraphError, Result};
use crate::feature::{Memo, Move, ReplaceEvent};
use crate::types::{Client, GraphItem, NodeId, Reason, VarId};
use indexmap::IndexMap;
use std::collections::HashSet;

/// Result of a successful [`FunctionGraph::replace`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplaceOutcome {
    /// Every replaced variable mapped to what it finally resolved to
    pub memo: Memo,
    /// Variables that left the graph, without duplicates
    pub unused_vars: Vec<VarId>,
}

struct MoveRequest {
    from: VarId,
    to: VarId,
    clients: Option<Vec<Client>>,
    /// `from` was not live when the batch started, so an earlier pair has
    /// to make it live
    external: bool,
}

impl FunctionGraph {
    // --- clients ----------------------------------------------------------

    pub(crate) fn add_client(&mut self, var: VarId, client: Client) {
        self.clients.entry(var).or_default().push(client);
    }

    fn remove_client(&mut self, var: VarId, client: Client) -> bool {
        let Some(list) = self.clients.get_mut(&var) else {
            return false;
        };
        match list.iter().position(|c| *c == client) {
            Some(position) => {
                list.remove(position);
                true
            }
            None => false,
        }
    }

    fn slot_holds(&self, client: Client, var: VarId) -> bool {
        match client {
            Client::Node { node, index } => {
                self.apply_nodes.contains(&node)
                    && self.node_arena[node.index()].inputs.get(index) == Some(&var)
            }
            Client::Output { index } => self.outputs.get(index) == Some(&var),
        }
    }

    fn set_slot(&mut self, client: Client, var: VarId) {
        match client {
            Client::Node { node, index } => self.node_arena[node.index()].inputs[index] = var,
            Client::Output { index } => self.outputs[index] = var,
        }
    }

    // --- import -----------------------------------------------------------

    /// Producers of `start` that are not live yet, producers first
    ///
    /// Walks iteratively so deep chains cannot overflow the stack; the walk
    /// stops at live nodes, graph inputs and constants.
    fn plan_node_import(&self, start: NodeId, at: GraphItem) -> Result<Vec<NodeId>> {
        let limit = self.config.max_graph_depth;
        let mut order = Vec::new();
        let mut visited: HashSet<NodeId> = HashSet::from([start]);
        let mut on_path: HashSet<NodeId> = HashSet::from([start]);
        let mut stack: Vec<(NodeId, usize)> = vec![(start, 0)];

        while let Some(&(node, position)) = stack.last() {
            let Some(&input) = self.node_arena[node.index()].inputs.get(position) else {
                on_path.remove(&node);
                order.push(node);
                stack.pop();
                continue;
            };
            if let Some(top) = stack.last_mut() {
                top.1 += 1;
            }

            let record = &self.var_arena[input.index()];
            match record.owner {
                Some(owner) if self.apply_nodes.contains(&owner.node) => {}
                Some(owner) => {
                    if on_path.contains(&owner.node) {
                        return Err(GraphError::Cycle { node: owner.node }.into());
                    }
                    if visited.insert(owner.node) {
                        if stack.len() >= limit {
                            return Err(FatalError::DepthExceeded { limit, at }.into());
                        }
                        on_path.insert(owner.node);
                        stack.push((owner.node, 0));
                    }
                }
                None if record.constant || self.variables.contains(&input) => {}
                None => return Err(GraphError::MissingInput { var: input }.into()),
            }
        }
        Ok(order)
    }

    fn connect_node(&mut self, node: NodeId, reason: &Reason) -> Result<()> {
        self.apply_nodes.insert(node);
        let record = &self.node_arena[node.index()];
        let (inputs, outputs) = (record.inputs.clone(), record.outputs.clone());
        for output in outputs {
            self.variables.insert(output);
            self.clients.entry(output).or_default();
        }
        for (index, input) in inputs.into_iter().enumerate() {
            self.variables.insert(input);
            self.add_client(input, Client::Node { node, index });
        }
        tracing::trace!(graph = %self.id, %node, %reason, "imported node");
        self.execute_callbacks(|feature, fg| feature.on_import(fg, node, reason))
    }

    /// Make `var` live along with everything needed to compute it
    ///
    /// Returns the nodes that were imported, producers first.
    pub(crate) fn import_var(&mut self, var: VarId, reason: &Reason) -> Result<Vec<NodeId>> {
        let record = self.var(var)?;
        let plan = match record.owner {
            Some(owner) if self.apply_nodes.contains(&owner.node) => Vec::new(),
            Some(owner) => self.plan_node_import(owner.node, GraphItem::Var(var))?,
            None if record.constant || self.variables.contains(&var) => Vec::new(),
            None => return Err(GraphError::MissingInput { var }.into()),
        };
        if self.variables.insert(var) {
            self.clients.entry(var).or_default();
        }
        for &node in &plan {
            self.connect_node(node, reason)?;
        }
        Ok(plan)
    }

    /// Import `node` and whatever its inputs need
    ///
    /// Importing a live node is a no-op. The node stays live until
    /// something prunes it, even if nothing consumes its outputs.
    ///
    /// # Errors
    /// `UnknownNode`, `Cycle` or `MissingInput` without changing the graph;
    /// `DepthExceeded` for chains longer than `max_graph_depth`.
    pub fn import_node(&mut self, node: NodeId, reason: impl Into<Reason>) -> Result<()> {
        self.node(node)?;
        if self.contains_node(node) {
            return Ok(());
        }
        let reason = reason.into();
        let plan = self.plan_node_import(node, GraphItem::Node(node))?;
        for node in plan {
            self.connect_node(node, &reason)?;
        }
        Ok(())
    }

    // --- prune ------------------------------------------------------------

    /// Queue whatever `var` kept alive, or drop `var` itself if it is an
    /// unconsumed constant
    fn release_var(&mut self, var: VarId, pending: &mut Vec<NodeId>, removed: &mut Vec<VarId>) {
        if !self.clients(var).is_empty() || self.inputs.contains(&var) {
            return;
        }
        match self.var_arena[var.index()].owner {
            Some(owner) => {
                if self.apply_nodes.contains(&owner.node) {
                    pending.push(owner.node);
                }
            }
            None => {
                if self.variables.shift_remove(&var) {
                    self.clients.remove(&var);
                    removed.push(var);
                }
            }
        }
    }

    fn prune_cascade(&mut self, mut pending: Vec<NodeId>, reason: &Reason, removed: &mut Vec<VarId>) -> Result<()> {
        while let Some(node) = pending.pop() {
            if !self.apply_nodes.contains(&node) {
                continue;
            }
            let record = &self.node_arena[node.index()];
            let (inputs, outputs) = (record.inputs.clone(), record.outputs.clone());
            if outputs.iter().any(|&output| !self.clients(output).is_empty()) {
                continue;
            }

            self.apply_nodes.shift_remove(&node);
            for &output in &outputs {
                self.variables.shift_remove(&output);
                self.clients.remove(&output);
                removed.push(output);
            }
            for (index, &input) in inputs.iter().enumerate() {
                self.remove_client(input, Client::Node { node, index });
            }
            tracing::trace!(graph = %self.id, %node, %reason, "pruned node");
            self.execute_callbacks(|feature, fg| feature.on_prune(fg, node, reason))?;

            let mut seen = HashSet::new();
            for input in inputs {
                if seen.insert(input) {
                    self.release_var(input, &mut pending, removed);
                }
            }
        }
        Ok(())
    }

    /// Remove an unconsumed node, then whatever only it kept alive
    ///
    /// Returns the variables that left the graph. Pruning a node that is
    /// not live is a no-op.
    ///
    /// # Errors
    /// `UnknownNode` for foreign ids, `NodeInUse` if an output still has
    /// clients.
    pub fn prune_node(&mut self, node: NodeId, reason: impl Into<Reason>) -> Result<Vec<VarId>> {
        let record = self.node(node)?;
        if !self.contains_node(node) {
            return Ok(Vec::new());
        }
        if record.outputs.iter().any(|&output| !self.clients(output).is_empty()) {
            return Err(GraphError::NodeInUse { node }.into());
        }
        let mut removed = Vec::new();
        self.prune_cascade(vec![node], &reason.into(), &mut removed)?;
        Ok(removed)
    }

    fn discard_unreferenced(&mut self, var: VarId, reason: &Reason, removed: &mut Vec<VarId>) -> Result<()> {
        let mut pending = Vec::new();
        self.release_var(var, &mut pending, removed);
        self.prune_cascade(pending, reason, removed)
    }

    // --- replace ----------------------------------------------------------

    /// Nodes `var` depends on, `var`'s owner included
    fn ancestors(&self, var: VarId) -> HashSet<NodeId> {
        let mut seen = HashSet::new();
        let mut stack = vec![var];
        while let Some(var) = stack.pop() {
            let Some(owner) = self.var_arena[var.index()].owner else {
                continue;
            };
            if seen.insert(owner.node) {
                stack.extend(self.node_arena[owner.node.index()].inputs.iter().copied());
            }
        }
        seen
    }

    fn check_acyclic(&self, clients: &[Client], to: VarId) -> Result<()> {
        if clients.iter().all(|client| client.node().is_none()) {
            return Ok(());
        }
        let ancestors = self.ancestors(to);
        match clients.iter().find_map(|client| client.node().filter(|n| ancestors.contains(n))) {
            Some(node) => Err(GraphError::Cycle { node }.into()),
            None => Ok(()),
        }
    }

    fn check_replacement(&self, old: VarId, new: VarId) -> Result<()> {
        let Some(old_record) = self.var_arena.get(old.index()) else {
            return Err(GraphError::ExternalVariable { var: old }.into());
        };
        let new_record = self.var(new)?;
        if !old_record.ty.accepts(&new_record.ty) {
            return Err(GraphError::TypeMismatch {
                old,
                new,
                expected: old_record.ty.clone(),
                found: new_record.ty.clone(),
            }
            .into());
        }
        Ok(())
    }

    /// Rewire `requested` slots from `from` to `to`
    ///
    /// Slots that no longer consume `from` are skipped. Returns the slots
    /// that moved and the variables that left the graph.
    fn move_clients(
        &mut self,
        from: VarId,
        to: VarId,
        requested: &[Client],
        reason: &Reason,
    ) -> Result<(Vec<Client>, Vec<VarId>)> {
        self.import_var(to, reason)?;
        let clients: Vec<Client> = requested
            .iter()
            .copied()
            .filter(|&client| self.slot_holds(client, from))
            .collect();

        let mut removed = Vec::new();
        if let Err(err) = self.check_acyclic(&clients, to) {
            self.discard_unreferenced(to, reason, &mut removed)?;
            return Err(err);
        }

        for &client in &clients {
            self.set_slot(client, to);
            self.remove_client(from, client);
            self.add_client(to, client);
        }
        self.discard_unreferenced(from, reason, &mut removed)?;
        self.discard_unreferenced(to, reason, &mut removed)?;
        Ok((clients, removed))
    }

    /// Put back the moves of a failed batch, newest first
    fn unwind(&mut self, moves: &[Move], reason: &Reason) {
        let reason = Reason::Unwind(Box::new(reason.clone()));
        for step in moves.iter().rev() {
            let back = step.inverse();
            if let Err(err) = self.move_clients(back.from, back.to, &back.clients, &reason) {
                tracing::error!("Failed to unwind {} -> {}: {}", step.from, step.to, err);
            }
        }
    }

    fn apply_moves(
        &mut self,
        pairs: &[(VarId, VarId)],
        requests: Vec<MoveRequest>,
        reason: &Reason,
        verbose: bool,
    ) -> Result<ReplaceOutcome> {
        let mut moves: Vec<Move> = Vec::new();
        let mut old_clients: IndexMap<VarId, Vec<Client>> = IndexMap::new();
        let mut removed: Vec<VarId> = Vec::new();

        for MoveRequest { from, to, clients, external } in requests {
            if from == to {
                continue;
            }
            if !self.contains_var(from) {
                if external {
                    self.unwind(&moves, reason);
                    return Err(GraphError::ExternalVariable { var: from }.into());
                }
                tracing::debug!(graph = %self.id, var = %from, "replaced variable already left the graph");
                continue;
            }
            let current = self.clients(from).to_vec();
            old_clients.entry(from).or_insert_with(|| current.clone());
            let wanted = clients.unwrap_or(current);
            match self.move_clients(from, to, &wanted, reason) {
                Ok((moved, gone)) => {
                    removed.extend(gone);
                    moves.push(Move { from, to, clients: moved });
                }
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    self.unwind(&moves, reason);
                    return Err(err);
                }
            }
        }

        let memo = resolve_memo(pairs);
        let mut seen = HashSet::new();
        let unused_vars: Vec<VarId> = removed
            .into_iter()
            .filter(|&var| !self.contains_var(var) && seen.insert(var))
            .collect();

        self.replace_seq += 1;
        let event = ReplaceEvent {
            batch: self.replace_seq,
            pairs,
            unused_vars: &unused_vars,
            old_clients: &old_clients,
            memo: &memo,
            moves: &moves,
            reason,
        };
        if let Err(err) = self.execute_callbacks(|feature, fg| feature.on_replace_nodes(fg, &event)) {
            if !err.is_fatal() {
                self.unwind(&moves, reason);
            }
            return Err(err);
        }
        if verbose {
            log_replacements(pairs, reason);
        }
        Ok(ReplaceOutcome { memo, unused_vars })
    }

    /// Redirect every client of each `old` to its `new`, in order
    ///
    /// Each `new` is imported with its producers first; whatever stops
    /// being referenced is pruned. A pair whose `old` already left the
    /// graph because of an earlier pair is skipped. An `old` that was not
    /// live when the call started may still be replaced once an earlier pair
    /// made it live, as in `A->B, B->C`. Attached features see one
    /// `on_replace_nodes` event per successful call.
    ///
    /// `verbose` logs every pair once the batch is in; `None` defers to
    /// the graph's `optimizer_verbose`.
    ///
    /// # Errors
    /// `TypeMismatch` before anything changes. `ExternalVariable` if an
    /// `old` is not live when its pair is reached, `Cycle`, `MissingInput`
    /// or a listener's `on_replace_nodes` error, each after unwinding the
    /// pairs already applied. Fatal errors propagate as is.
    pub fn replace(
        &mut self,
        pairs: &[(VarId, VarId)],
        reason: impl Into<Reason>,
        verbose: Option<bool>,
    ) -> Result<ReplaceOutcome> {
        let reason = reason.into();
        let mut live_at_start = HashSet::new();
        for &(old, new) in pairs {
            self.check_replacement(old, new)?;
            if self.contains_var(old) {
                live_at_start.insert(old);
            }
        }
        let requests = pairs
            .iter()
            .map(|&(from, to)| MoveRequest {
                from,
                to,
                clients: None,
                external: !live_at_start.contains(&from),
            })
            .collect();
        let verbose = verbose.unwrap_or(self.config.optimizer_verbose);
        self.apply_moves(pairs, requests, &reason, verbose)
    }

    /// Move exactly the recorded slots back, newest move first
    ///
    /// This is the inverse of the replace calls that produced `moves`.
    /// Slots that were rewired again since are left alone.
    ///
    /// # Errors
    /// Same as [`replace`](Self::replace), minus the pair checks.
    pub fn restore_clients(&mut self, moves: &[Move], reason: &Reason) -> Result<ReplaceOutcome> {
        let inverse: Vec<Move> = moves.iter().rev().map(Move::inverse).collect();
        let pairs: Vec<(VarId, VarId)> = inverse.iter().map(|step| (step.from, step.to)).collect();
        let requests = inverse
            .into_iter()
            .map(|step| MoveRequest {
                from: step.from,
                to: step.to,
                clients: Some(step.clients),
                external: false,
            })
            .collect();
        self.apply_moves(&pairs, requests, reason, false)
    }
}

/// One `info` line per accepted pair, under `fgraph::optimizer`
pub(crate) fn log_replacements(pairs: &[(VarId, VarId)], reason: &Reason) {
    for (old, new) in pairs {
        tracing::info!(target: "fgraph::optimizer", "rewriting: rewrite {} replaces {} with {}", reason, old, new);
    }
}

/// Old -> final new, following chains inside one batch
fn resolve_memo(pairs: &[(VarId, VarId)]) -> Memo {
    let direct: IndexMap<VarId, VarId> = pairs.iter().copied().filter(|(old, new)| old != new).collect();
    let mut memo = Memo::with_capacity(direct.len());
    for (&old, &first) in &direct {
        let mut target = first;
        let mut hops = 0;
        while let Some(&next) = direct.get(&target) {
            if next == old || hops > direct.len() {
                break;
            }
            target = next;
            hops += 1;
        }
        memo.insert(old, target);
    }
    memo
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FgraphConfig;
    use crate::error::Error;
    use crate::feature::Feature;
    use crate::types::{DType, Op, VarType};
    use pretty_assertions::assert_eq;
    use std::borrow::Cow;
    use std::sync::Arc;

    #[derive(Debug)]
    struct Named(&'static str);

    impl Op for Named {
        fn name(&self) -> Cow<'_, str> {
            Cow::Borrowed(self.0)
        }
    }

    #[derive(Debug)]
    struct RejectReplace;

    impl Feature for RejectReplace {
        fn name(&self) -> &'static str {
            "RejectReplace"
        }

        fn on_replace_nodes(&self, _fg: &mut FunctionGraph, _event: &ReplaceEvent<'_>) -> Result<()> {
            Err(GraphError::Inconsistency("rejected".to_string()).into())
        }
    }

    fn scalar() -> VarType {
        VarType::scalar(DType::Float64)
    }

    /// out = exp(add(x, y))
    fn chain() -> (FunctionGraph, VarId, VarId, VarId, VarId) {
        let mut fg = FunctionGraph::default();
        let x = fg.add_input(scalar(), Some("x"));
        let y = fg.add_input(scalar(), Some("y"));
        let sum = fg.apply_single(Arc::new(Named("add")), &[x, y], scalar()).unwrap();
        let out = fg.apply_single(Arc::new(Named("exp")), &[sum], scalar()).unwrap();
        fg.add_output(out, Reason::Init).unwrap();
        (fg, x, y, sum, out)
    }

    #[test]
    fn add_output_imports_producers() {
        let (fg, x, _, sum, out) = chain();
        assert_eq!(fg.num_nodes(), 2);
        assert!(fg.contains_var(sum));
        assert_eq!(fg.clients(out), &[Client::Output { index: 0 }]);
        assert_eq!(fg.clients(x).len(), 1);
    }

    #[test]
    fn replace_prunes_unreferenced_producers() {
        let (mut fg, x, y, sum, _) = chain();
        let product = fg.apply_single(Arc::new(Named("mul")), &[x, y], scalar()).unwrap();
        let add_node = fg.var(sum).unwrap().owner().unwrap().node;

        let outcome = fg.replace(&[(sum, product)], "add_to_mul", None).unwrap();
        assert_eq!(outcome.unused_vars, vec![sum]);
        assert_eq!(outcome.memo.get(&sum), Some(&product));
        assert!(!fg.contains_node(add_node));
        assert!(fg.contains_var(product));
        assert_eq!(fg.clients(x).len(), 1);
    }

    #[test]
    fn replace_checks_before_mutating() {
        let (mut fg, x, _, sum, _) = chain();
        let stranger = fg.add_constant(VarType::scalar(DType::Int64), None);
        let dangling = fg.add_constant(scalar(), None);

        let err = fg.replace(&[(sum, stranger)], "bad_type", None).unwrap_err();
        assert!(matches!(err, Error::Graph(GraphError::TypeMismatch { .. })));

        let err = fg.replace(&[(dangling, x)], "not_live", None).unwrap_err();
        assert!(matches!(err, Error::Graph(GraphError::ExternalVariable { .. })));
        assert_eq!(fg.num_nodes(), 2);
    }

    #[test]
    fn replacing_with_a_consumer_is_a_cycle() {
        let (mut fg, _, _, sum, out) = chain();
        let before = fg.snapshot();
        let err = fg.replace(&[(sum, out)], "cycle", None).unwrap_err();
        assert!(matches!(err, Error::Graph(GraphError::Cycle { .. })));
        assert_eq!(fg.snapshot(), before);
    }

    #[test]
    fn failed_pair_unwinds_earlier_pairs() {
        let (mut fg, x, y, sum, out) = chain();
        let product = fg.apply_single(Arc::new(Named("mul")), &[x, y], scalar()).unwrap();
        let before = fg.snapshot();

        // the second pair makes `mul` consume its own result
        let err = fg
            .replace(&[(sum, product), (x, out)], "half_good", None)
            .unwrap_err();
        assert!(matches!(err, Error::Graph(GraphError::Cycle { .. })));
        assert_eq!(fg.snapshot(), before);
    }

    #[test]
    fn listener_failure_unwinds_the_batch() {
        let (mut fg, x, y, sum, out) = chain();
        fg.attach_feature(Arc::new(RejectReplace)).unwrap();
        let product = fg.apply_single(Arc::new(Named("mul")), &[x, y], scalar()).unwrap();
        let before = fg.snapshot();

        let err = fg.replace(&[(sum, product)], "add_to_mul", None).unwrap_err();
        assert_eq!(err, GraphError::Inconsistency("rejected".to_string()).into());
        assert_eq!(fg.snapshot(), before);
        assert_eq!(fg.clients(sum).len(), 1);
        assert!(fg.contains_var(out));
        assert!(!fg.contains_var(product));
    }

    #[test]
    fn later_pair_may_replace_a_variable_made_live_earlier() {
        let (mut fg, x, y, sum, out) = chain();
        let product = fg.apply_single(Arc::new(Named("mul")), &[x, y], scalar()).unwrap();
        let negated = fg.apply_single(Arc::new(Named("neg")), &[x], scalar()).unwrap();

        let outcome = fg
            .replace(&[(sum, product), (product, negated)], "chain", None)
            .unwrap();
        assert_eq!(outcome.memo.get(&sum), Some(&negated));
        assert_eq!(outcome.memo.get(&product), Some(&negated));
        assert!(!fg.contains_var(product));
        let exp = fg.var(out).unwrap().owner().unwrap().node;
        assert_eq!(fg.node(exp).unwrap().inputs(), &[negated]);
    }

    #[test]
    fn never_live_variable_unwinds_the_batch() {
        let (mut fg, x, y, sum, _) = chain();
        let product = fg.apply_single(Arc::new(Named("mul")), &[x, y], scalar()).unwrap();
        let stray = fg.apply_single(Arc::new(Named("neg")), &[x], scalar()).unwrap();
        let before = fg.snapshot();

        let err = fg
            .replace(&[(sum, product), (stray, x)], "stray", None)
            .unwrap_err();
        assert_eq!(err, GraphError::ExternalVariable { var: stray }.into());
        assert_eq!(fg.snapshot(), before);
    }

    #[test]
    fn free_variables_are_rejected() {
        let mut fg = FunctionGraph::default();
        let x = fg.add_input(scalar(), None);
        // an unowned non-constant id that is not an input of `fg`
        let free = fg.alloc_var(scalar(), None, None, false);
        let out = fg.apply_single(Arc::new(Named("add")), &[x, free], scalar()).unwrap();
        let err = fg.add_output(out, Reason::Init).unwrap_err();
        assert_eq!(err, GraphError::MissingInput { var: free }.into());
        assert_eq!(fg.num_nodes(), 0);
    }

    #[test]
    fn depth_limit_is_fatal() {
        let mut fg = FunctionGraph::new(FgraphConfig::new().with_max_graph_depth(3));
        let mut var = fg.add_input(scalar(), None);
        for _ in 0..5 {
            var = fg.apply_single(Arc::new(Named("neg")), &[var], scalar()).unwrap();
        }
        let err = fg.add_output(var, Reason::Init).unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(fg.num_nodes(), 0);
    }

    #[test]
    fn prune_refuses_consumed_nodes() {
        let (mut fg, _, _, sum, _) = chain();
        let add_node = fg.var(sum).unwrap().owner().unwrap().node;
        let err = fg.prune_node(add_node, "manual").unwrap_err();
        assert_eq!(err, GraphError::NodeInUse { node: add_node }.into());
    }

    #[test]
    fn constants_leave_with_their_last_client() {
        let mut fg = FunctionGraph::default();
        let x = fg.add_input(scalar(), None);
        let two = fg.add_constant(scalar(), Some("2"));
        let scaled = fg.apply_single(Arc::new(Named("mul")), &[x, two], scalar()).unwrap();
        fg.add_output(scaled, Reason::Init).unwrap();
        assert!(fg.contains_var(two));

        let outcome = fg.replace(&[(scaled, x)], "mul_by_one", None).unwrap();
        assert!(!fg.contains_var(two));
        assert!(outcome.unused_vars.contains(&two));
        assert!(fg.contains_var(x));
    }

    #[test]
    fn memo_follows_chains_within_a_batch() {
        let a = VarId::from_raw(1);
        let b = VarId::from_raw(2);
        let c = VarId::from_raw(3);
        let memo = resolve_memo(&[(a, b), (b, c)]);
        assert_eq!(memo.get(&a), Some(&c));
        assert_eq!(memo.get(&b), Some(&c));

        let memo = resolve_memo(&[(a, b), (b, a)]);
        assert_eq!(memo.len(), 2);
    }

    #[test]
    fn restore_clients_puts_slots_back() {
        let (mut fg, x, y, sum, _) = chain();
        let before = fg.snapshot();
        let product = fg.apply_single(Arc::new(Named("mul")), &[x, y], scalar()).unwrap();
        fg.replace(&[(sum, product)], "add_to_mul", None).unwrap();

        let moves = vec![Move {
            from: sum,
            to: product,
            clients: vec![Client::Node {
                node: fg.var(fg.outputs()[0]).unwrap().owner().unwrap().node,
                index: 0,
            }],
        }];
        fg.restore_clients(&moves, &Reason::Init.reverted()).unwrap();
        assert_eq!(fg.snapshot(), before);
    }
}
