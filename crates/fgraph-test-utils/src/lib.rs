//! Testing utilities for fgraph workspace
//!
//! Shared ops, fixtures and recording features.

#![allow(missing_docs)]

use fgraph_core::{
    Client, DType, DestroyMap, Feature, FunctionGraph, GraphError, NodeFinder, NodeId, Op, OpKey,
    Reason, ReplaceEvent, Result, VarId, VarType,
};
use parking_lot::Mutex;
use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io;
use std::sync::Arc;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Install a test subscriber honoring `RUST_LOG`; safe to call repeatedly
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Shared in-memory sink for log lines
#[derive(Debug, Clone, Default)]
pub struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }
}

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Run `f` with `info` and above logged to a buffer on this thread
pub fn capture_logs<T>(f: impl FnOnce() -> T) -> (T, String) {
    let buffer = LogBuffer::default();
    let writer = buffer.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(LevelFilter::INFO)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    let guard = subscriber.set_default();
    let out = f();
    drop(guard);
    (out, buffer.contents())
}

#[derive(Debug, Clone)]
pub struct ToyOp {
    name: String,
    hashable: bool,
    destroy_map: DestroyMap,
}

impl ToyOp {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            hashable: true,
            destroy_map: DestroyMap::new(),
        }
    }

    pub fn unhashable(name: &str) -> Self {
        Self {
            hashable: false,
            ..Self::new(name)
        }
    }

    /// Op whose `output` overwrites `input`
    pub fn inplace(name: &str, output: usize, input: usize) -> Self {
        Self {
            destroy_map: DestroyMap::from([(output, vec![input])]),
            ..Self::new(name)
        }
    }

    pub fn shared(self) -> Arc<dyn Op> {
        Arc::new(self)
    }
}

impl Op for ToyOp {
    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed(&self.name)
    }

    fn key(&self) -> Option<OpKey> {
        self.hashable.then(|| OpKey::new(self.name.as_str()))
    }

    fn destroy_map(&self) -> DestroyMap {
        self.destroy_map.clone()
    }
}

pub fn op(name: &str) -> Arc<dyn Op> {
    ToyOp::new(name).shared()
}

pub fn float() -> VarType {
    VarType::scalar(DType::Float64)
}

pub fn vector() -> VarType {
    VarType::new(DType::Float64, vec![None])
}

/// Apply a single-output op to `inputs`
pub fn apply(fg: &mut FunctionGraph, name: &str, inputs: &[VarId]) -> VarId {
    fg.apply_single(op(name), inputs, float()).unwrap()
}

pub fn owner_node(fg: &FunctionGraph, var: VarId) -> NodeId {
    fg.var(var).unwrap().owner().unwrap().node
}

/// Inputs `[a, b]`, one node `add(a, b) -> c`, outputs `[c]`
pub struct AddGraph {
    pub fg: FunctionGraph,
    pub a: VarId,
    pub b: VarId,
    pub c: VarId,
    pub add: NodeId,
}

pub fn add_graph() -> AddGraph {
    add_graph_with(Vec::new())
}

/// [`add_graph`] with `features` attached before the graph is populated
pub fn add_graph_with(features: Vec<Arc<dyn Feature>>) -> AddGraph {
    let mut fg = FunctionGraph::default();
    for feature in features {
        fg.attach_feature(feature).unwrap();
    }
    let a = fg.add_input(float(), Some("a"));
    let b = fg.add_input(float(), Some("b"));
    let c = apply(&mut fg, "add", &[a, b]);
    fg.set_var_name(c, Some("c".to_string())).unwrap();
    fg.add_output(c, Reason::Init).unwrap();
    let add = owner_node(&fg, c);
    AddGraph { fg, a, b, c, add }
}

/// Records every lifecycle event as a line of text
#[derive(Debug, Default)]
pub struct EventRecorder {
    events: Mutex<Vec<String>>,
}

impl EventRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }

    fn push(&self, line: String) {
        self.events.lock().push(line);
    }
}

impl Feature for EventRecorder {
    fn name(&self) -> &'static str {
        "EventRecorder"
    }

    fn on_import(&self, fg: &mut FunctionGraph, node: NodeId, reason: &Reason) -> Result<()> {
        let op = fg.node(node)?.op().name().into_owned();
        self.push(format!("import {op} {node} {reason}"));
        Ok(())
    }

    fn on_prune(&self, fg: &mut FunctionGraph, node: NodeId, reason: &Reason) -> Result<()> {
        let op = fg.node(node)?.op().name().into_owned();
        self.push(format!("prune {op} {node} {reason}"));
        Ok(())
    }

    fn on_replace_nodes(&self, _fg: &mut FunctionGraph, event: &ReplaceEvent<'_>) -> Result<()> {
        let pairs: Vec<String> = event.pairs.iter().map(|(old, new)| format!("{old}->{new}")).collect();
        self.push(format!("replace {} {}", pairs.join(","), event.reason));
        Ok(())
    }
}

/// Fails `on_replace_nodes` for every named rewrite
#[derive(Debug, Default)]
pub struct FailingListener;

impl Feature for FailingListener {
    fn name(&self) -> &'static str {
        "FailingListener"
    }

    fn on_replace_nodes(&self, _fg: &mut FunctionGraph, event: &ReplaceEvent<'_>) -> Result<()> {
        match event.reason {
            Reason::Rewrite(_) => Err(GraphError::Inconsistency("listener broke".to_string()).into()),
            _ => Ok(()),
        }
    }
}

/// Fails every validation pass
#[derive(Debug, Default)]
pub struct RejectAll;

impl Feature for RejectAll {
    fn name(&self) -> &'static str {
        "RejectAll"
    }

    fn validate(&self, _fg: &mut FunctionGraph) -> Result<()> {
        Err(GraphError::Inconsistency("rejected by RejectAll".to_string()).into())
    }
}

/// Every live variable's client list matches the slots that reference it
pub fn check_clients(fg: &FunctionGraph) -> std::result::Result<(), String> {
    let mut expected: HashMap<VarId, BTreeSet<Client>> =
        fg.variables().map(|var| (var, BTreeSet::new())).collect();
    for node in fg.apply_nodes() {
        let record = fg.node(node).map_err(|e| e.to_string())?;
        for (index, &input) in record.inputs().iter().enumerate() {
            expected
                .get_mut(&input)
                .ok_or_else(|| format!("{node} consumes {input}, which is not live"))?
                .insert(Client::Node { node, index });
        }
        for &output in record.outputs() {
            if !fg.contains_var(output) {
                return Err(format!("output {output} of live {node} is not live"));
            }
        }
    }
    for (index, &out) in fg.outputs().iter().enumerate() {
        expected
            .get_mut(&out)
            .ok_or_else(|| format!("graph output {out} is not live"))?
            .insert(Client::Output { index });
    }
    for (var, want) in expected {
        let list = fg.clients(var);
        let got: BTreeSet<Client> = list.iter().copied().collect();
        if got.len() != list.len() {
            return Err(format!("{var} lists a client twice: {list:?}"));
        }
        if got != want {
            return Err(format!("{var} has clients {got:?}, expected {want:?}"));
        }
    }
    Ok(())
}

/// The finder lists exactly the live nodes of every hashable op
pub fn check_index(fg: &FunctionGraph, finder: &NodeFinder) -> std::result::Result<(), String> {
    let mut expected: BTreeMap<OpKey, BTreeSet<NodeId>> = BTreeMap::new();
    for node in fg.apply_nodes() {
        let record = fg.node(node).map_err(|e| e.to_string())?;
        if let Some(key) = record.op().key() {
            expected.entry(key).or_default().insert(node);
        }
    }
    let got: BTreeMap<OpKey, BTreeSet<NodeId>> = finder
        .entries()
        .into_iter()
        .map(|(key, nodes)| (key, nodes.into_iter().collect()))
        .collect();
    if got == expected {
        Ok(())
    } else {
        Err(format!("index {got:?} does not match live nodes {expected:?}"))
    }
}
