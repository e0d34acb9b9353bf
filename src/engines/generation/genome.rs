/// Genome representation for typed genetic programming
///
/// A genome is a pipeline tree flattened in prefix order. Primitives carry
/// their argument types but no child pointers; the tree shape is implied by
/// arity. For a pipeline `Linear(Scale(data, ...), ...)` the layout is:
///
/// ```text
/// Linear  Scale  data  Scale.factor=2.0  shift=1.0  Linear.intercept=0  Linear.slope=0.5
/// ^root   ^data subtree ................................^  ^hyperparameters of the root
/// ```
///
/// A *valid* genome parses in prefix order starting from the `Prediction`
/// type, with every node's return type matching the argument slot it fills.
/// Mutation and crossover operators return new genomes and must preserve
/// this invariant.
///
/// `subtree()` and `subtree_end()` give the span of the subtree rooted at a
/// position; mutation and crossover splice on these. `spans()` computes the
/// same for every node at once.
use std::fmt;
use std::ops::Range;
use std::sync::Arc;

use crate::functions::{Primitive, Terminal};
use crate::types::NodeType;

#[derive(Debug, Clone)]
pub enum TypedNode {
    Primitive(Arc<Primitive>),
    Terminal(Arc<Terminal>),
}

impl TypedNode {
    pub fn ret(&self) -> &NodeType {
        match self {
            TypedNode::Primitive(p) => &p.ret,
            TypedNode::Terminal(t) => &t.ret,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            TypedNode::Primitive(p) => &p.name,
            TypedNode::Terminal(t) => &t.name,
        }
    }

    pub fn arity(&self) -> usize {
        match self {
            TypedNode::Primitive(p) => p.args.len(),
            TypedNode::Terminal(_) => 0,
        }
    }

    pub fn is_primitive(&self) -> bool {
        matches!(self, TypedNode::Primitive(_))
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TypedNode::Terminal(_))
    }

    pub fn as_primitive(&self) -> Option<&Arc<Primitive>> {
        match self {
            TypedNode::Primitive(p) => Some(p),
            TypedNode::Terminal(_) => None,
        }
    }

    pub fn as_terminal(&self) -> Option<&Arc<Terminal>> {
        match self {
            TypedNode::Terminal(t) => Some(t),
            TypedNode::Primitive(_) => None,
        }
    }
}

impl PartialEq for TypedNode {
    fn eq(&self, other: &Self) -> bool {
        self.is_primitive() == other.is_primitive()
            && self.name() == other.name()
            && self.ret() == other.ret()
    }
}

impl From<Arc<Primitive>> for TypedNode {
    fn from(p: Arc<Primitive>) -> Self {
        TypedNode::Primitive(p)
    }
}

impl From<Arc<Terminal>> for TypedNode {
    fn from(t: Arc<Terminal>) -> Self {
        TypedNode::Terminal(t)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Genome {
    nodes: Vec<TypedNode>,
}

impl Genome {
    pub fn new(nodes: Vec<TypedNode>) -> Self {
        Self { nodes }
    }

    pub fn nodes(&self) -> &[TypedNode] {
        &self.nodes
    }

    pub fn into_nodes(self) -> Vec<TypedNode> {
        self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TypedNode> {
        self.nodes.iter()
    }

    pub fn primitive_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_primitive()).count()
    }

    pub fn terminal_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_terminal()).count()
    }

    /// Pipeline length: the number of primitives.
    pub fn length(&self) -> usize {
        self.primitive_count()
    }

    /// Exclusive end of the subtree rooted at `start`.
    pub fn subtree_end(&self, start: usize) -> usize {
        let mut pending = 1usize;
        let mut i = start;
        while pending > 0 && i < self.nodes.len() {
            pending = pending - 1 + self.nodes[i].arity();
            i += 1;
        }
        i
    }

    pub fn subtree(&self, start: usize) -> Range<usize> {
        start..self.subtree_end(start)
    }

    /// Subtree span of every node, indexed by node position.
    pub fn spans(&self) -> Vec<Range<usize>> {
        let mut ends = vec![0; self.nodes.len()];
        // Walk right to left: a node's subtree ends where its last child's does.
        for i in (0..self.nodes.len()).rev() {
            let mut end = i + 1;
            for _ in 0..self.nodes[i].arity() {
                if end >= self.nodes.len() {
                    break;
                }
                end = ends[end];
            }
            ends[i] = end;
        }
        ends.into_iter().enumerate().map(|(i, end)| i..end).collect()
    }

    /// Start positions of the argument subtrees of the node at `index`.
    pub fn children(&self, index: usize) -> Vec<usize> {
        let mut children = Vec::with_capacity(self.nodes[index].arity());
        let mut next = index + 1;
        for _ in 0..self.nodes[index].arity() {
            if next >= self.nodes.len() {
                break;
            }
            children.push(next);
            next = self.subtree_end(next);
        }
        children
    }

    /// Whether the genome parses as a single `Prediction`-typed tree.
    pub fn is_type_consistent(&self) -> bool {
        if self.nodes.is_empty() {
            return false;
        }
        let mut expected = vec![NodeType::Prediction];
        for node in &self.nodes {
            match expected.pop() {
                Some(want) if &want == node.ret() => {}
                _ => return false,
            }
            if let TypedNode::Primitive(p) = node {
                expected.extend(p.args.iter().rev().cloned());
            }
        }
        expected.is_empty()
    }

    /// Deterministic rendering used for duplicate detection and tie-breaks.
    pub fn canonical_string(&self) -> String {
        self.to_string()
    }

    fn write_subtree(&self, f: &mut fmt::Formatter<'_>, index: usize) -> Result<usize, fmt::Error> {
        match &self.nodes[index] {
            TypedNode::Terminal(t) => {
                write!(f, "{}", t.name)?;
                Ok(index + 1)
            }
            TypedNode::Primitive(p) => {
                write!(f, "{}(", p.name)?;
                let mut next = index + 1;
                for k in 0..p.args.len() {
                    if next >= self.nodes.len() {
                        break;
                    }
                    if k > 0 {
                        write!(f, ", ")?;
                    }
                    next = self.write_subtree(f, next)?;
                }
                write!(f, ")")?;
                Ok(next)
            }
        }
    }
}

impl fmt::Display for Genome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut next = 0;
        while next < self.nodes.len() {
            if next > 0 {
                write!(f, " ")?;
            }
            next = self.write_subtree(f, next)?;
        }
        Ok(())
    }
}

impl From<Vec<TypedNode>> for Genome {
    fn from(nodes: Vec<TypedNode>) -> Self {
        Self::new(nodes)
    }
}

impl<'a> IntoIterator for &'a Genome {
    type Item = &'a TypedNode;
    type IntoIter = std::slice::Iter<'a, TypedNode>;

    fn into_iter(self) -> Self::IntoIter {
        self.nodes.iter()
    }
}

/// Position of the first terminal in `nodes` that no pending primitive argument claims.
///
/// Scanning front to back, a node whose type matches the head of the pending
/// argument queue is consumed; a primitive prepends its own argument types to
/// the queue. The first terminal that is not consumed bounds the subtree that
/// precedes it. Returns `None` when every terminal is claimed.
pub fn find_unmatched_terminal(nodes: &[TypedNode]) -> Option<usize> {
    let mut unmatched: Vec<NodeType> = Vec::new();
    for (i, node) in nodes.iter().enumerate() {
        if unmatched.first() == Some(node.ret()) {
            unmatched.remove(0);
        } else if node.is_terminal() {
            return Some(i);
        }
        if let TypedNode::Primitive(p) = node {
            let mut pending = p.args.clone();
            pending.append(&mut unmatched);
            unmatched = pending;
        }
    }
    None
}
