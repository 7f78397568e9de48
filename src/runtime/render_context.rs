use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::nodes::NodeId;
use crate::tags::inheritance::BlockNode;
use crate::value::Value;

/// Tracks the block overrides during an inheritance render.
///
/// Every block name maps to a stack of definitions.  The nearest override
/// (the one from the most derived template) is on top of the stack.
#[derive(Debug, Default, Clone)]
pub struct BlockContext {
    blocks: BTreeMap<String, Vec<Arc<BlockNode>>>,
}

impl BlockContext {
    /// Adds blocks below the ones that are already known.
    ///
    /// Templates are processed from the most derived one upwards so each
    /// new set of blocks is further away than the previous ones.
    pub fn add_blocks<'a, I>(&mut self, blocks: I)
    where
        I: IntoIterator<Item = &'a Arc<BlockNode>>,
    {
        for block in blocks {
            self.blocks
                .entry(block.name().to_string())
                .or_default()
                .insert(0, block.clone());
        }
    }

    /// Removes the given blocks again.
    pub fn remove_blocks<'a, I>(&mut self, blocks: I)
    where
        I: IntoIterator<Item = &'a Arc<BlockNode>>,
    {
        for block in blocks {
            if let Some(stack) = self.blocks.get_mut(block.name()) {
                if let Some(pos) = stack.iter().position(|x| Arc::ptr_eq(x, block)) {
                    stack.remove(pos);
                }
                if stack.is_empty() {
                    self.blocks.remove(block.name());
                }
            }
        }
    }

    /// Takes the nearest definition of a block off the stack.
    pub fn checkout(&mut self, name: &str) -> Option<Arc<BlockNode>> {
        self.blocks.get_mut(name).and_then(|stack| stack.pop())
    }

    /// Puts a block taken with [`checkout`](Self::checkout) back.
    pub fn checkin(&mut self, name: &str, block: Arc<BlockNode>) {
        self.blocks.entry(name.to_string()).or_default().push(block);
    }

    /// Returns the nearest definition of a block without removing it.
    pub fn peek(&self, name: &str) -> Option<&Arc<BlockNode>> {
        self.blocks.get(name).and_then(|stack| stack.last())
    }

    /// Returns `true` if no blocks are known.
    pub fn is_empty(&self) -> bool {
        self.blocks.values().all(|stack| stack.is_empty())
    }
}

/// State that lives as long as a render (or a series of renders sharing
/// a [`Context`](crate::Context)).
///
/// Unlike the variable frames of the context this is not affected by
/// `push`/`pop`.  Tags store per-node data in it keyed by
/// [`NodeId`](crate::NodeId).
#[derive(Debug, Default)]
pub struct RenderContext {
    block_context: BlockContext,
    node_data: HashMap<NodeId, Value>,
    last_loop_id: u64,
    current_loop: Option<u64>,
}

impl RenderContext {
    /// Returns the block context.
    pub fn block_context(&self) -> &BlockContext {
        &self.block_context
    }

    /// Returns the block context mutably.
    pub fn block_context_mut(&mut self) -> &mut BlockContext {
        &mut self.block_context
    }

    /// Swaps in a different block context and returns the old one.
    pub(crate) fn replace_block_context(&mut self, blocks: BlockContext) -> BlockContext {
        std::mem::replace(&mut self.block_context, blocks)
    }

    /// Returns the data stored for a node.
    pub fn get(&self, key: NodeId) -> Option<&Value> {
        self.node_data.get(&key)
    }

    /// Stores data for a node.
    pub fn insert(&mut self, key: NodeId, value: Value) {
        self.node_data.insert(key, value);
    }

    /// Removes the data stored for a node.
    pub fn remove(&mut self, key: NodeId) -> Option<Value> {
        self.node_data.remove(&key)
    }

    /// Returns the id of the innermost loop run, if inside a loop.
    ///
    /// Every run of a `for` tag gets a fresh id, even for the same node.
    pub fn current_loop(&self) -> Option<u64> {
        self.current_loop
    }

    /// Enters a new loop run and returns the id of the enclosing one.
    pub(crate) fn enter_loop(&mut self) -> Option<u64> {
        self.last_loop_id += 1;
        std::mem::replace(&mut self.current_loop, Some(self.last_loop_id))
    }

    /// Leaves a loop run.
    pub(crate) fn leave_loop(&mut self, outer: Option<u64>) {
        self.current_loop = outer;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::nodes::NodeList;

    use similar_asserts::assert_eq;

    fn block(name: &str) -> Arc<BlockNode> {
        Arc::new(BlockNode::new(name, NodeList::default()))
    }

    #[test]
    fn test_block_context_stacking() {
        let child = block("content");
        let parent = block("content");
        let mut ctx = BlockContext::default();
        ctx.add_blocks([&child]);
        ctx.add_blocks([&parent]);
        assert!(Arc::ptr_eq(ctx.peek("content").unwrap(), &child));

        let top = ctx.checkout("content").unwrap();
        assert!(Arc::ptr_eq(&top, &child));
        assert!(Arc::ptr_eq(ctx.peek("content").unwrap(), &parent));
        ctx.checkin("content", top);
        assert!(Arc::ptr_eq(ctx.peek("content").unwrap(), &child));

        ctx.remove_blocks([&child, &parent]);
        assert!(ctx.is_empty());
        assert!(ctx.checkout("content").is_none());
    }

    #[test]
    fn test_loop_ids() {
        let mut rc = RenderContext::default();
        assert_eq!(rc.current_loop(), None);
        let outer = rc.enter_loop();
        let first = rc.current_loop();
        let inner = rc.enter_loop();
        assert_eq!(inner, first);
        assert_ne!(rc.current_loop(), first);
        rc.leave_loop(inner);
        rc.leave_loop(outer);
        assert_eq!(rc.current_loop(), None);
    }
}
