//! Core identifiers and value types
//!
//! Nodes and variables are identified by arena indices. Identity is the id,
//! never structural equality: two `add` nodes over the same inputs are
//! different nodes.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Identity of one graph store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GraphId(pub Uuid);

impl GraphId {
    /// Fresh random id
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for GraphId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for GraphId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Arena index of an apply node
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(u32);

impl NodeId {
    /// Build from a raw arena index
    #[inline]
    #[must_use]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Arena index of a variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VarId(u32);

impl VarId {
    /// Build from a raw arena index
    #[inline]
    #[must_use]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Element type of a variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DType {
    /// Boolean
    Bool,
    /// 32-bit signed integer
    Int32,
    /// 64-bit signed integer
    Int64,
    /// 32-bit float
    Float32,
    /// 64-bit float
    Float64,
}

impl DType {
    /// Numpy-style name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            DType::Bool => "bool",
            DType::Int32 => "int32",
            DType::Int64 => "int64",
            DType::Float32 => "float32",
            DType::Float64 => "float64",
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static type of a variable: dtype plus per-dimension static lengths
///
/// `None` marks a dimension whose length is only known at run time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VarType {
    /// Element type
    pub dtype: DType,
    /// Static shape, one entry per dimension
    pub shape: Vec<Option<usize>>,
}

impl VarType {
    /// Type with the given dtype and static shape
    #[must_use]
    pub fn new(dtype: DType, shape: Vec<Option<usize>>) -> Self {
        Self { dtype, shape }
    }

    /// Zero-dimensional type
    #[must_use]
    pub fn scalar(dtype: DType) -> Self {
        Self::new(dtype, Vec::new())
    }

    /// Number of dimensions
    #[inline]
    #[must_use]
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Whether a value of type `other` may stand in for a value of this type
    ///
    /// Dtype and rank must match; `other` may be more specific than `self`
    /// on dimensions that `self` leaves unknown.
    #[must_use]
    pub fn accepts(&self, other: &VarType) -> bool {
        self.dtype == other.dtype
            && self.ndim() == other.ndim()
            && self
                .shape
                .iter()
                .zip(&other.shape)
                .all(|(mine, theirs)| mine.is_none() || mine == theirs)
    }
}

impl fmt::Display for VarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, (", self.dtype)?;
        for (i, dim) in self.shape.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            match dim {
                Some(len) => write!(f, "{len}")?,
                None => f.write_str("?")?,
            }
        }
        if self.shape.len() == 1 {
            f.write_str(",")?;
        }
        f.write_str(")")
    }
}

/// Free-form annotations carried by a variable across rewrites
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VarTag {
    /// Value is checked for NaN/Inf by debugging modes
    pub nan_guard_mode_check: bool,
}

/// Producer of a variable: a node and the output slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Owner {
    /// Producing node
    pub node: NodeId,
    /// Output index on that node
    pub index: usize,
}

/// One slot that consumes a variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Client {
    /// Input slot `index` of `node`
    Node {
        /// Consuming node
        node: NodeId,
        /// Input position
        index: usize,
    },
    /// Position `index` of the graph output list
    Output {
        /// Output position
        index: usize,
    },
}

impl Client {
    /// Consuming node, if the client is a node
    #[inline]
    #[must_use]
    pub fn node(&self) -> Option<NodeId> {
        match self {
            Client::Node { node, .. } => Some(*node),
            Client::Output { .. } => None,
        }
    }
}

impl fmt::Display for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Client::Node { node, index } => write!(f, "({node}, {index})"),
            Client::Output { index } => write!(f, "(output, {index})"),
        }
    }
}

/// A node or a variable, for APIs that accept either
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GraphItem {
    /// An apply node
    Node(NodeId),
    /// A variable
    Var(VarId),
}

impl fmt::Display for GraphItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphItem::Node(node) => node.fmt(f),
            GraphItem::Var(var) => var.fmt(f),
        }
    }
}

impl From<NodeId> for GraphItem {
    fn from(value: NodeId) -> Self {
        GraphItem::Node(value)
    }
}

impl From<VarId> for GraphItem {
    fn from(value: VarId) -> Self {
        GraphItem::Var(value)
    }
}

/// Why a mutation happened
///
/// By convention the name of a rewrite is the name of the rule that
/// requested it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Reason {
    /// Graph construction
    Init,
    /// Bookkeeping replay while a feature attaches
    Attach,
    /// Bookkeeping replay while a feature detaches
    Detach,
    /// A named rewrite
    Rewrite(Cow<'static, str>),
    /// Undo of an earlier mutation
    Revert(Box<Reason>),
    /// Cleanup of a batch that failed part-way
    Unwind(Box<Reason>),
}

impl Reason {
    /// Named rewrite reason
    #[must_use]
    pub fn rewrite(name: impl Into<Cow<'static, str>>) -> Self {
        Reason::Rewrite(name.into())
    }

    /// Reason recorded when `self` is undone
    #[must_use]
    pub fn reverted(&self) -> Self {
        Reason::Revert(Box::new(self.clone()))
    }

    /// Whether this mutation undoes an earlier one
    #[must_use]
    pub fn is_revert(&self) -> bool {
        matches!(self, Reason::Revert(_))
    }
}

impl From<&'static str> for Reason {
    fn from(value: &'static str) -> Self {
        Reason::Rewrite(Cow::Borrowed(value))
    }
}

impl From<String> for Reason {
    fn from(value: String) -> Self {
        Reason::Rewrite(Cow::Owned(value))
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reason::Init => f.write_str("init"),
            Reason::Attach => f.write_str("on_attach"),
            Reason::Detach => f.write_str("Bookkeeper.detach"),
            Reason::Rewrite(name) => f.write_str(name),
            Reason::Revert(inner) => write!(f, "Revert({inner})"),
            Reason::Unwind(inner) => write!(f, "Unwind({inner})"),
        }
    }
}

/// Hashable identity of an op, used by indexes
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OpKey(String);

impl OpKey {
    /// Key from any string-like identity
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Key as a string
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OpKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Map from output index to the input indices that output overwrites
pub type DestroyMap = BTreeMap<usize, Vec<usize>>;

/// An operation applied by nodes
///
/// Shape and dtype inference are the caller's business: nodes are created
/// with explicit output types.
pub trait Op: fmt::Debug + Send + Sync {
    /// Display name
    fn name(&self) -> Cow<'_, str>;

    /// Hashable identity; `None` for ops that cannot be indexed
    fn key(&self) -> Option<OpKey> {
        Some(OpKey::new(self.name()))
    }

    /// Outputs computed by overwriting an input in place
    fn destroy_map(&self) -> DestroyMap {
        DestroyMap::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_more_specific_shapes() {
        let loose = VarType::new(DType::Float64, vec![None, Some(3)]);
        let tight = VarType::new(DType::Float64, vec![Some(2), Some(3)]);
        assert!(loose.accepts(&tight));
        assert!(!tight.accepts(&loose));
    }

    #[test]
    fn rejects_dtype_and_rank_changes() {
        let ty = VarType::scalar(DType::Float64);
        assert!(!ty.accepts(&VarType::scalar(DType::Float32)));
        assert!(!ty.accepts(&VarType::new(DType::Float64, vec![None])));
    }

    #[test]
    fn var_type_display() {
        assert_eq!(VarType::scalar(DType::Int64).to_string(), "int64, ()");
        assert_eq!(
            VarType::new(DType::Float32, vec![None]).to_string(),
            "float32, (?,)"
        );
    }

    #[test]
    fn reason_display_nests_reverts() {
        let reason = Reason::rewrite("local_mul_to_add").reverted();
        assert!(reason.is_revert());
        assert_eq!(reason.to_string(), "Revert(local_mul_to_add)");
    }
}
