//! The node tree a template compiles into.
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::Error;
use crate::expression::FilterExpression;
use crate::output::Output;
use crate::runtime::State;
use crate::utils::write_escaped;

/// A renderable piece of a compiled template.
///
/// Nodes are immutable once the parser created them and may be rendered from
/// many threads at once.  State that has to survive from one render call to
/// the next (like the position of a `cycle` tag) is stored in the
/// [`RenderContext`](crate::RenderContext) keyed by a [`NodeId`].
pub trait Node: fmt::Debug + Send + Sync {
    /// Renders the node into the output.
    fn render(&self, state: &mut State, out: &mut Output) -> Result<(), Error>;

    /// Returns `true` for literal text.
    fn is_text(&self) -> bool {
        false
    }

    /// Nodes that have to be the first non-text node of a template
    /// (`extends`).
    fn must_be_first(&self) -> bool {
        false
    }

    /// Persistent nodes are rendered on every render of a mutable template
    /// instead of being frozen into text after the first one.
    fn is_persistent(&self) -> bool {
        false
    }
}

impl<T: Node + ?Sized> Node for Arc<T> {
    fn render(&self, state: &mut State, out: &mut Output) -> Result<(), Error> {
        T::render(self, state, out)
    }

    fn is_text(&self) -> bool {
        T::is_text(self)
    }

    fn must_be_first(&self) -> bool {
        T::must_be_first(self)
    }

    fn is_persistent(&self) -> bool {
        T::is_persistent(self)
    }
}

/// Identifies a node for keying render-scoped state.
///
/// Every call to [`NodeId::new`] hands out a fresh id, so nodes of
/// independently compiled templates never share state even when they were
/// compiled from the same source.  Nodes that carry state allocate their id
/// when the parser creates them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u64);

impl NodeId {
    /// Allocates a new unique id.
    pub fn new() -> NodeId {
        static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);
        NodeId(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for NodeId {
    fn default() -> NodeId {
        NodeId::new()
    }
}

/// A sequence of nodes.
#[derive(Debug, Default)]
pub struct NodeList {
    nodes: Vec<Box<dyn Node>>,
    contains_non_text: bool,
}

impl NodeList {
    /// Appends a node.
    pub fn push(&mut self, node: Box<dyn Node>) {
        if !node.is_text() {
            self.contains_non_text = true;
        }
        self.nodes.push(node);
    }

    /// Returns `true` if any node other than literal text was pushed.
    pub fn contains_non_text(&self) -> bool {
        self.contains_non_text
    }

    /// Returns the number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if the list has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Iterates over the nodes.
    pub fn iter(&self) -> impl Iterator<Item = &dyn Node> {
        self.nodes.iter().map(|x| &**x)
    }

    /// Renders all nodes in order.
    pub fn render(&self, state: &mut State, out: &mut Output) -> Result<(), Error> {
        for node in &self.nodes {
            ok!(node.render(state, out));
        }
        Ok(())
    }

    /// Renders all nodes into a string.
    pub fn render_to_string(&self, state: &mut State, out: &mut Output) -> Result<String, Error> {
        out.capture(|out| self.render(state, out))
    }
}

/// Literal template data.
pub struct TextNode {
    content: String,
}

impl TextNode {
    /// Creates a node that writes `content` unchanged.
    pub fn new<S: Into<String>>(content: S) -> TextNode {
        TextNode {
            content: content.into(),
        }
    }
}

impl fmt::Debug for TextNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TextNode").field(&self.content).finish()
    }
}

impl Node for TextNode {
    fn render(&self, _state: &mut State, out: &mut Output) -> Result<(), Error> {
        out.write_str(&self.content).map_err(Error::from)
    }

    fn is_text(&self) -> bool {
        true
    }
}

/// A `{{ expression }}` tag.
#[derive(Debug)]
pub struct VariableNode {
    expr: FilterExpression,
    line: usize,
}

impl VariableNode {
    /// Creates a node for a compiled expression.
    pub fn new(expr: FilterExpression, line: usize) -> VariableNode {
        VariableNode { expr, line }
    }
}

impl Node for VariableNode {
    fn render(&self, state: &mut State, out: &mut Output) -> Result<(), Error> {
        let value = ok!(state.at_line(self.line, |state| {
            let value = ok!(self.expr.resolve(state));
            ok!(state
                .undefined_behavior()
                .assert_printable(&value, self.expr.source()));
            Ok(value)
        }));
        write_escaped(out, state.autoescape(), &value)
    }
}
