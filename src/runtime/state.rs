use std::fmt;
use std::sync::Arc;

use crate::environment::Environment;
use crate::error::{Error, ErrorKind};
use crate::runtime::context::Context;
use crate::runtime::render_context::RenderContext;
use crate::template::CompiledTemplate;
use crate::utils::UndefinedBehavior;
use crate::value::Value;

/// Provides access to the current render state.
///
/// A state is created for every render call and handed to
/// [`Node::render`](crate::nodes::Node::render).  It gives nodes access to
/// the context, the environment and the template that is being rendered.
pub struct State<'env, 'ctx> {
    env: &'env Environment,
    ctx: &'ctx mut Context,
    template: Arc<CompiledTemplate>,
    depth: usize,
}

impl fmt::Debug for State<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("State")
            .field("template", &self.template.name())
            .field("depth", &self.depth)
            .field("ctx", &self.ctx)
            .finish()
    }
}

impl<'env, 'ctx> State<'env, 'ctx> {
    pub(crate) fn new(
        env: &'env Environment,
        ctx: &'ctx mut Context,
        template: Arc<CompiledTemplate>,
    ) -> State<'env, 'ctx> {
        State {
            env,
            ctx,
            template,
            depth: 0,
        }
    }

    /// Returns the environment.
    pub fn env(&self) -> &'env Environment {
        self.env
    }

    /// Returns the name of the template that is currently rendering.
    pub fn name(&self) -> &str {
        self.template.name()
    }

    /// Returns the context.
    pub fn context(&self) -> &Context {
        &*self.ctx
    }

    /// Returns the context mutably.
    pub fn context_mut(&mut self) -> &mut Context {
        &mut *self.ctx
    }

    /// Returns the render context.
    pub fn render_context_mut(&mut self) -> &mut RenderContext {
        self.ctx.render_context_mut()
    }

    /// Looks up a variable.
    pub fn lookup(&self, name: &str) -> Value {
        self.ctx.lookup(name)
    }

    /// Is autoescaping enabled?
    pub fn autoescape(&self) -> bool {
        self.ctx.autoescape()
    }

    /// Returns the undefined behavior of the environment.
    pub fn undefined_behavior(&self) -> UndefinedBehavior {
        self.env.undefined_behavior()
    }

    /// Returns how deep into extends and include chains this render is.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Runs `f` with a new context frame that is popped afterwards, even on
    /// failure.
    pub fn with_scope<R, F>(&mut self, f: F) -> Result<R, Error>
    where
        F: FnOnce(&mut Self) -> Result<R, Error>,
    {
        self.ctx.push();
        let rv = f(self);
        self.ctx.pop();
        rv
    }

    /// Attaches the current template name and the given line to errors
    /// produced by `f`.
    pub(crate) fn at_line<R, F>(&mut self, line: usize, f: F) -> Result<R, Error>
    where
        F: FnOnce(&mut Self) -> Result<R, Error>,
    {
        f(self).map_err(|err| err.with_location(self.template.name(), line))
    }

    /// Renders with a different current template one level deeper.
    ///
    /// Fails with [`RecursionLimit`](ErrorKind::RecursionLimit) if the
    /// environment's maximum depth is exceeded.
    pub(crate) fn with_template<R, F>(
        &mut self,
        template: Arc<CompiledTemplate>,
        f: F,
    ) -> Result<R, Error>
    where
        F: FnOnce(&mut Self) -> Result<R, Error>,
    {
        if self.depth + 1 > self.env.max_include_depth() {
            return Err(Error::new(
                ErrorKind::RecursionLimit,
                format!(
                    "template {:?} nested more than {} levels deep",
                    template.name(),
                    self.env.max_include_depth()
                ),
            ));
        }
        let old_template = std::mem::replace(&mut self.template, template);
        self.depth += 1;
        let rv = f(self);
        self.depth -= 1;
        self.template = old_template;
        rv
    }
}
