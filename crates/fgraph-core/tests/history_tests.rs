use fgraph_core::prelude::*;
use fgraph_test_utils::*;
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::sync::Arc;

const OPS: [&str; 4] = ["add", "mul", "sub", "max"];

/// outputs `[mul(sub(mul(add(a, b), a), b), 2), add(a, b)]`
fn populated(extra: Vec<Arc<dyn Feature>>) -> (FunctionGraph, Arc<NodeFinder>) {
    let finder = Arc::new(NodeFinder::new());
    let mut fg = FunctionGraph::default();
    fg.attach_feature(Arc::new(ReplaceValidate::new())).unwrap();
    fg.attach_feature(finder.clone()).unwrap();
    for feature in extra {
        fg.attach_feature(feature).unwrap();
    }

    let a = fg.add_input(float(), Some("a"));
    let b = fg.add_input(float(), Some("b"));
    let two = fg.add_constant(float(), Some("2"));
    let s = apply(&mut fg, "add", &[a, b]);
    let p = apply(&mut fg, "mul", &[s, a]);
    let q = apply(&mut fg, "sub", &[p, b]);
    let r = apply(&mut fg, "mul", &[q, two]);
    fg.set_outputs(&[r, s], Reason::Init).unwrap();
    (fg, finder)
}

/// `old` picked among live variables, `new` a fresh node over live variables
fn random_pair(fg: &mut FunctionGraph, old: usize, lhs: usize, rhs: usize, op: usize) -> (VarId, VarId) {
    let mut live: Vec<VarId> = fg.variables().collect();
    live.sort_unstable();
    let old = live[old % live.len()];
    let inputs = [live[lhs % live.len()], live[rhs % live.len()]];
    let new = apply(fg, OPS[op % OPS.len()], &inputs);
    (old, new)
}

fn steps() -> impl Strategy<Value = Vec<(usize, usize, usize, usize)>> {
    proptest::collection::vec((0..64usize, 0..64usize, 0..64usize, 0..4usize), 1..12)
}

proptest! {
    #[test]
    fn prop_revert_restores_checkpoint(steps in steps()) {
        let (mut fg, finder) = populated(Vec::new());
        let before = fg.snapshot();
        let chk = fg.checkpoint().unwrap();

        for (old, lhs, rhs, op) in steps {
            let pair = random_pair(&mut fg, old, lhs, rhs, op);
            let prior = fg.snapshot();
            if let Err(err) = fg.replace(&[pair], "random", None) {
                prop_assert!(!err.is_fatal());
                prop_assert_eq!(fg.snapshot(), prior);
            }
            prop_assert_eq!(check_clients(&fg), Ok(()));
            prop_assert_eq!(check_index(&fg, &finder), Ok(()));
        }

        fg.revert(chk).unwrap();
        prop_assert_eq!(fg.snapshot(), before);
        prop_assert_eq!(check_clients(&fg), Ok(()));
        prop_assert_eq!(check_index(&fg, &finder), Ok(()));
    }

    #[test]
    fn prop_rejected_batches_are_atomic(steps in steps()) {
        let (mut fg, finder) = populated(vec![Arc::new(RejectAll)]);
        let before = fg.snapshot();

        let mut pairs = Vec::new();
        for (old, lhs, rhs, op) in steps {
            pairs.push(random_pair(&mut fg, old, lhs, rhs, op));
        }
        prop_assert!(fg.replace_all_validate(&pairs, "random_batch", None).is_err());
        prop_assert_eq!(fg.snapshot(), before);
        prop_assert_eq!(check_index(&fg, &finder), Ok(()));
    }
}

#[test]
fn test_multiple_checkpoints_only_newest_reverts() {
    let (mut fg, _finder) = populated(Vec::new());
    let first = fg.checkpoint().unwrap();
    let (old, new) = random_pair(&mut fg, 0, 0, 1, 0);
    fg.replace(&[(old, new)], "first", None).unwrap();
    let after_first = fg.snapshot();

    let second = fg.checkpoint().unwrap();
    let err = fg.revert(first).unwrap_err();
    assert!(err.is_fatal());
    assert_eq!(fg.snapshot(), after_first);

    fg.revert(second).unwrap();
    assert_eq!(fg.snapshot(), after_first);
}

#[test]
fn test_revert_without_changes_is_noop() {
    let (mut fg, _finder) = populated(Vec::new());
    let before = fg.snapshot();
    let chk = fg.checkpoint().unwrap();
    fg.revert(chk).unwrap();
    fg.revert(chk).unwrap();
    assert_eq!(fg.snapshot(), before);
}

#[test]
fn test_chained_batch_memo_and_revert() {
    let (mut fg, finder) = populated(Vec::new());
    let before = fg.snapshot();
    let r = fg.outputs()[0];
    let s = fg.outputs()[1];
    let a = fg.inputs()[0];

    let t = apply(&mut fg, "neg", &[a]);
    let chk = fg.checkpoint().unwrap();
    // `r` resolves to `s`, which itself resolves to `t`
    let outcome = fg.replace(&[(r, s), (s, t)], "chain", None).unwrap();
    assert_eq!(outcome.memo.get(&r), Some(&t));
    assert_eq!(outcome.memo.get(&s), Some(&t));
    assert_eq!(fg.num_nodes(), 1);
    assert_eq!(fg.outputs(), &[t, t]);
    assert_eq!(check_clients(&fg), Ok(()));
    assert_eq!(check_index(&fg, &finder), Ok(()));

    fg.revert(chk).unwrap();
    assert_eq!(fg.snapshot(), before);
}
