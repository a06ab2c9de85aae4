use fgraph_core::prelude::*;
use fgraph_core::{Error, GraphError, Orderings, PrintListener};
use fgraph_test_utils::*;
use pretty_assertions::assert_eq;
use std::sync::Arc;

/// Requires `after` to run after `before`
#[derive(Debug)]
struct RunAfter {
    after: NodeId,
    before: NodeId,
}

impl Feature for RunAfter {
    fn name(&self) -> &'static str {
        "RunAfter"
    }

    fn orderings(&self, _fg: &FunctionGraph) -> Orderings {
        Orderings::from([(self.after, vec![self.before])])
    }
}

/// outputs `[neg(a), exp(b)]`, two independent nodes
fn two_branches() -> (FunctionGraph, NodeId, NodeId) {
    let mut fg = FunctionGraph::default();
    let a = fg.add_input(float(), Some("a"));
    let b = fg.add_input(float(), Some("b"));
    let x = apply(&mut fg, "neg", &[a]);
    let y = apply(&mut fg, "exp", &[b]);
    fg.add_output(x, Reason::Init).unwrap();
    fg.add_output(y, Reason::Init).unwrap();
    let (neg, exp) = (owner_node(&fg, x), owner_node(&fg, y));
    (fg, neg, exp)
}

#[test]
fn test_toposort_honors_feature_orderings() {
    let (mut fg, neg, exp) = two_branches();
    fg.attach_feature(Arc::new(RunAfter { after: neg, before: exp })).unwrap();

    let order = fg.toposort().unwrap();
    assert_eq!(order.len(), 2);
    assert!(order.position(exp) < order.position(neg));
    // structure alone does not constrain the pair
    assert_eq!(fg.io_toposort().unwrap().len(), 2);
}

#[test]
fn test_contradictory_orderings_are_a_cycle() {
    let (mut fg, neg, exp) = two_branches();
    fg.attach_feature(Arc::new(RunAfter { after: neg, before: exp })).unwrap();
    fg.attach_feature(Arc::new(RunAfter { after: exp, before: neg })).unwrap();

    let err = fg.toposort().unwrap_err();
    assert!(matches!(err, Error::Graph(GraphError::Cycle { .. })));
}

#[test]
fn test_orderings_on_pruned_nodes_are_ignored() {
    let (mut fg, neg, exp) = two_branches();
    fg.attach_feature(Arc::new(RunAfter { after: neg, before: exp })).unwrap();
    let a = fg.inputs()[0];
    let x = fg.outputs()[0];

    fg.replace(&[(x, a)], "drop_neg", None).unwrap();
    assert!(!fg.contains_node(neg));
    assert_eq!(fg.toposort().unwrap().as_slice(), &[exp]);
}

#[test]
fn test_finder_attached_after_populate_sees_every_node() {
    let AddGraph { mut fg, a, b, add, .. } = add_graph();
    let extra = apply(&mut fg, "add", &[b, a]);
    fg.add_output(extra, Reason::Init).unwrap();
    let second = owner_node(&fg, extra);

    let finder = Arc::new(NodeFinder::new());
    fg.attach_feature(finder.clone()).unwrap();
    let mut found = fg.get_nodes(&ToyOp::new("add")).unwrap();
    found.sort_unstable();
    assert_eq!(found, vec![add, second]);
    check_index(&fg, &finder).unwrap();

    let err = fg.get_nodes(&ToyOp::unhashable("add")).unwrap_err();
    assert!(matches!(err, Error::Graph(GraphError::UnhashableOp { .. })));
}

#[test]
fn test_print_listener_does_not_disturb_replacements() {
    init_tracing();
    let AddGraph { mut fg, a, b, c, .. } = add_graph_with(vec![
        Arc::new(PrintListener::new(true)),
        Arc::new(ReplaceValidate::new()),
    ]);
    let d = apply(&mut fg, "mul", &[a, b]);
    fg.replace_validate(c, d, "add_to_mul").unwrap();
    assert_eq!(fg.outputs(), &[d]);
    check_clients(&fg).unwrap();
}

#[test]
fn test_config_verbose_flag_reaches_the_store() {
    init_tracing();
    let mut fg = FunctionGraph::new(FgraphConfig::new().with_verbose(true));
    let a = fg.add_input(float(), Some("a"));
    let b = apply(&mut fg, "neg", &[a]);
    fg.add_output(b, Reason::Init).unwrap();
    assert!(fg.config().optimizer_verbose);

    let c = apply(&mut fg, "exp", &[a]);
    let outcome = fg.replace(&[(b, c)], "neg_to_exp", None).unwrap();
    assert_eq!(outcome.unused_vars, vec![b]);
}
