use std::fmt;

use serde::Serialize;

use crate::runtime::render_context::RenderContext;
use crate::value::{Value, ValueMap};

/// The variables a template is rendered with.
///
/// A context is a stack of frames.  Lookups go from the innermost frame
/// outwards.  Block tags like `for` and `with` push a frame for their
/// variables and pop it again when they are done so that nothing leaks.
///
/// The context also owns the [`RenderContext`] which keeps state that must
/// survive frame pushes (block overrides, `cycle` positions).  Rendering the
/// same template twice with the same context continues a `cycle` where it
/// left off:
///
/// ```
/// # use minidtl::{Context, Environment};
/// let env = Environment::new();
/// let tmpl = env.new_template("{% cycle 'a' 'b' 'c' %}", "cycle");
/// let mut ctx = Context::new();
/// let rv: Vec<String> = (0..4).map(|_| tmpl.render_context(&mut ctx).unwrap()).collect();
/// assert_eq!(rv, ["a", "b", "c", "a"]);
/// ```
pub struct Context {
    frames: Vec<ValueMap>,
    autoescape: bool,
    render_context: RenderContext,
}

impl Default for Context {
    fn default() -> Context {
        Context::new()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("frames", &self.frames)
            .field("autoescape", &self.autoescape)
            .finish()
    }
}

impl Context {
    /// Creates an empty context with autoescaping enabled.
    pub fn new() -> Context {
        Context {
            frames: vec![ValueMap::new()],
            autoescape: true,
            render_context: RenderContext::default(),
        }
    }

    /// Creates a context from a serializable value.
    ///
    /// Maps and structs become the variables of the root frame.  Anything
    /// else results in an empty context.
    pub fn from_serialize<S: Serialize>(ctx: S) -> Context {
        Context::from_value(Value::from_serialize(ctx))
    }

    /// Creates a context from a map value.
    pub fn from_value(ctx: Value) -> Context {
        let mut rv = Context::new();
        if let Some(map) = ctx.as_map() {
            rv.frames[0] = map.clone();
        }
        rv
    }

    /// Pushes a new empty frame.
    pub fn push(&mut self) {
        self.frames.push(ValueMap::new());
    }

    /// Pops the innermost frame.  The root frame is never removed.
    pub fn pop(&mut self) {
        if self.frames.len() > 1 {
            self.frames.pop();
        }
    }

    /// Returns the number of frames.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Sets a variable in the innermost frame.
    pub fn insert<V: Into<Value>>(&mut self, name: &str, value: V) {
        if let Some(frame) = self.frames.last_mut() {
            frame.insert(name.to_string(), value.into());
        }
    }

    /// Looks up a variable, innermost frame first.  Missing variables are
    /// undefined.
    pub fn lookup(&self, name: &str) -> Value {
        self.frames
            .iter()
            .rev()
            .find_map(|frame| frame.get(name))
            .cloned()
            .unwrap_or(Value::UNDEFINED)
    }

    /// Returns all frames, outermost first.
    pub fn frames(&self) -> impl Iterator<Item = &ValueMap> {
        self.frames.iter()
    }

    /// Is autoescaping enabled?
    pub fn autoescape(&self) -> bool {
        self.autoescape
    }

    /// Enables or disables autoescaping.
    pub fn set_autoescape(&mut self, yes: bool) {
        self.autoescape = yes;
    }

    /// Returns the render context.
    pub fn render_context(&self) -> &RenderContext {
        &self.render_context
    }

    /// Returns the render context mutably.
    pub fn render_context_mut(&mut self) -> &mut RenderContext {
        &mut self.render_context
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use similar_asserts::assert_eq;

    #[test]
    fn test_push_pop_shadowing() {
        let mut ctx = Context::from_serialize(serde_json::json!({"x": 1, "y": 2}));
        ctx.push();
        ctx.insert("x", 10);
        assert_eq!(ctx.lookup("x"), Value::from(10));
        assert_eq!(ctx.lookup("y"), Value::from(2));
        ctx.pop();
        assert_eq!(ctx.lookup("x"), Value::from(1));
        ctx.pop();
        assert_eq!(ctx.depth(), 1);
        assert!(ctx.lookup("missing").is_undefined());
    }

    #[test]
    fn test_render_context_survives_pop() {
        let mut ctx = Context::new();
        let id = crate::nodes::NodeId::new();
        ctx.push();
        ctx.render_context_mut().insert(id, Value::from("kept"));
        ctx.pop();
        assert_eq!(ctx.render_context().get(id), Some(&Value::from("kept")));
    }
}
