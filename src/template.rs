use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::{fmt, io};

use serde::Serialize;

use crate::environment::Environment;
use crate::error::Error;
use crate::nodes::NodeList;
use crate::output::{Output, WriteWrapper};
use crate::runtime::{Context, State};
use crate::tags::inheritance::BlockNode;

/// A template compiled into its node tree.
///
/// Compiled templates are immutable and shared between threads.  They are
/// what loaders produce and caches hold.
pub struct CompiledTemplate {
    name: String,
    source: String,
    nodes: NodeList,
    blocks: BTreeMap<String, Arc<BlockNode>>,
    starts_with_extends: bool,
}

impl fmt::Debug for CompiledTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledTemplate")
            .field("name", &self.name)
            .field("blocks", &self.blocks.keys().collect::<Vec<_>>())
            .field("starts_with_extends", &self.starts_with_extends)
            .finish()
    }
}

impl CompiledTemplate {
    pub(crate) fn new(
        name: &str,
        source: &str,
        nodes: NodeList,
        blocks: Vec<Arc<BlockNode>>,
    ) -> CompiledTemplate {
        let starts_with_extends = nodes
            .iter()
            .find(|node| !node.is_text())
            .map_or(false, |node| node.must_be_first());
        CompiledTemplate {
            name: name.to_string(),
            source: source.to_string(),
            nodes,
            blocks: blocks
                .into_iter()
                .map(|block| (block.name().to_string(), block))
                .collect(),
            starts_with_extends,
        }
    }

    /// Returns the name of the template.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the source of the template.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Returns the names of all blocks defined in the template.
    pub fn block_names(&self) -> impl Iterator<Item = &str> {
        self.blocks.keys().map(|x| x.as_str())
    }

    pub(crate) fn nodes(&self) -> &NodeList {
        &self.nodes
    }

    pub(crate) fn blocks(&self) -> impl Iterator<Item = &Arc<BlockNode>> {
        self.blocks.values()
    }

    /// Returns `true` if the first non-text node is an `extends` tag.
    pub(crate) fn starts_with_extends(&self) -> bool {
        self.starts_with_extends
    }
}

fn lock_error(slot: &Mutex<Option<Error>>) -> MutexGuard<'_, Option<Error>> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Represents a handle to a template.
///
/// Templates are created with [`Environment::new_template`] or loaded with
/// [`Environment::load_by_name`].  A template whose source failed to compile
/// is still returned but is in an error state: [`error`](Self::error)
/// returns the compile error and rendering fails with it.
///
/// Besides the `Result` returned from the render functions the last error
/// is also kept on the template:
///
/// ```
/// # use minidtl::{Environment, context};
/// let env = Environment::new();
/// let tmpl = env.new_template("Hello {{ name }}!", "hello");
/// assert!(tmpl.error().is_none());
/// assert_eq!(tmpl.render(context!{ name => "John" }).unwrap(), "Hello John!");
/// ```
pub struct Template<'env> {
    env: &'env Environment,
    name: String,
    compiled: Option<Arc<CompiledTemplate>>,
    error: Mutex<Option<Error>>,
}

impl fmt::Debug for Template<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Template")
            .field("name", &self.name)
            .field("compiled", &self.compiled)
            .field("error", &*lock_error(&self.error))
            .finish()
    }
}

impl<'env> Template<'env> {
    pub(crate) fn new(
        env: &'env Environment,
        name: &str,
        compiled: Result<Arc<CompiledTemplate>, Error>,
    ) -> Template<'env> {
        let (compiled, error) = match compiled {
            Ok(compiled) => (Some(compiled), None),
            Err(err) => (None, Some(err)),
        };
        Template {
            env,
            name: name.to_string(),
            compiled,
            error: Mutex::new(error),
        }
    }

    /// Returns the name of the template.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the source code of the template.  Empty for templates that
    /// failed to compile.
    pub fn source(&self) -> &str {
        self.compiled.as_ref().map_or("", |x| x.source())
    }

    /// Returns the compiled template unless compilation failed.
    pub fn compiled(&self) -> Option<&Arc<CompiledTemplate>> {
        self.compiled.as_ref()
    }

    /// Returns the last error of this template.
    ///
    /// For templates that failed to compile this is the compile error.
    /// Otherwise it is the error of the last render, cleared again by a
    /// successful render.
    pub fn error(&self) -> Option<Error> {
        lock_error(&self.error).clone()
    }

    /// Returns the message of the last error or an empty string.
    pub fn error_string(&self) -> String {
        lock_error(&self.error)
            .as_ref()
            .map(|err| err.to_string())
            .unwrap_or_default()
    }

    /// Renders the template into a string.
    ///
    /// The provided value is used as the initial context for the template.  It
    /// can be any object that implements [`Serialize`](serde::Serialize).  You
    /// can either create your own struct and derive `Serialize` for it or the
    /// [`context!`](crate::context) macro can be used to create an ad-hoc context.
    ///
    /// If rendering fails the partial output is discarded.
    pub fn render<S: Serialize>(&self, ctx: S) -> Result<String, Error> {
        let mut ctx = self.new_context(ctx);
        self.render_context(&mut ctx)
    }

    /// Renders the template with an existing context.
    ///
    /// State kept in the render context (like the position of `cycle` tags)
    /// carries over between renders with the same context.
    pub fn render_context(&self, ctx: &mut Context) -> Result<String, Error> {
        let mut rv = String::new();
        self._render(ctx, &mut Output::new(&mut rv)).map(|_| rv)
    }

    /// Renders the template into an [`io::Write`].
    ///
    /// This works like [`render`](Self::render) but writes into `w` while
    /// rendering.  Output written before an error is not taken back.
    pub fn render_to_write<S: Serialize, W: io::Write>(&self, ctx: S, w: W) -> Result<(), Error> {
        let mut ctx = self.new_context(ctx);
        let mut wrapper = WriteWrapper { w, err: None };
        self._render(&mut ctx, &mut Output::new(&mut wrapper))
            .map_err(|err| wrapper.take_err(err))
    }

    fn new_context<S: Serialize>(&self, ctx: S) -> Context {
        let mut ctx = Context::from_serialize(ctx);
        ctx.set_autoescape(self.env.autoescape_default());
        ctx
    }

    fn _render(&self, ctx: &mut Context, out: &mut Output) -> Result<(), Error> {
        let compiled = match self.compiled {
            Some(ref compiled) => compiled.clone(),
            None => return Err(self.stored_error()),
        };
        tracing::trace!(name = %self.name, "rendering template");
        let mut state = State::new(self.env, ctx, compiled.clone());
        let rv = compiled.nodes().render(&mut state, out);
        self.record(rv)
    }

    pub(crate) fn record(&self, rv: Result<(), Error>) -> Result<(), Error> {
        let mut slot = lock_error(&self.error);
        match rv {
            Ok(()) => {
                *slot = None;
                Ok(())
            }
            Err(err) => {
                tracing::debug!(name = %self.name, error = %err, "render failed");
                *slot = Some(err.clone());
                Err(err)
            }
        }
    }

    pub(crate) fn stored_error(&self) -> Error {
        lock_error(&self.error)
            .clone()
            .unwrap_or_else(|| Error::new_not_found(&self.name))
    }

    pub(crate) fn env(&self) -> &'env Environment {
        self.env
    }
}

enum Segment {
    Text(String),
    Live(usize),
}

/// A template that freezes its output after the first render.
///
/// On the first render every top-level node is rendered.  The output of
/// ordinary nodes is kept as literal text while persistent nodes (the
/// `raw` tag of the `mutabletags` library) stay live.  Later renders only
/// re-render the live nodes:
///
/// ```
/// # use minidtl::{Environment, context};
/// let env = Environment::new();
/// let tmpl = env.new_mutable_template(
///     "{% load mutabletags %}{{ a }}-{% raw %}{{ b }}{% endraw %}",
///     "mutable",
/// );
/// assert_eq!(tmpl.render(context!{ a => 1, b => 2 }).unwrap(), "1-2");
/// assert_eq!(tmpl.render(context!{ a => 3, b => 4 }).unwrap(), "1-4");
/// ```
pub struct MutableTemplate<'env> {
    template: Template<'env>,
    segments: Mutex<Option<Vec<Segment>>>,
}

impl fmt::Debug for MutableTemplate<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let frozen = self
            .segments
            .lock()
            .map(|x| x.is_some())
            .unwrap_or(false);
        f.debug_struct("MutableTemplate")
            .field("template", &self.template)
            .field("frozen", &frozen)
            .finish()
    }
}

impl<'env> MutableTemplate<'env> {
    pub(crate) fn new(template: Template<'env>) -> MutableTemplate<'env> {
        MutableTemplate {
            template,
            segments: Mutex::new(None),
        }
    }

    /// Returns the underlying template.
    pub fn template(&self) -> &Template<'env> {
        &self.template
    }

    /// Returns the last error.
    pub fn error(&self) -> Option<Error> {
        self.template.error()
    }

    /// Returns the message of the last error or an empty string.
    pub fn error_string(&self) -> String {
        self.template.error_string()
    }

    /// Renders the template.
    pub fn render<S: Serialize>(&self, ctx: S) -> Result<String, Error> {
        let mut ctx = self.template.new_context(ctx);
        self.render_context(&mut ctx)
    }

    /// Renders the template with an existing context.
    pub fn render_context(&self, ctx: &mut Context) -> Result<String, Error> {
        let compiled = match self.template.compiled() {
            Some(compiled) => compiled.clone(),
            None => return Err(self.template.stored_error()),
        };
        let mut rv = String::new();
        let mut segments = self
            .segments
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let result = {
            let mut out = Output::new(&mut rv);
            let mut state = State::new(self.template.env(), ctx, compiled.clone());
            match segments.as_ref() {
                Some(frozen) => render_frozen(frozen, compiled.nodes(), &mut state, &mut out),
                None => match freeze(compiled.nodes(), &mut state, &mut out) {
                    Ok(frozen) => {
                        *segments = Some(frozen);
                        Ok(())
                    }
                    Err(err) => Err(err),
                },
            }
        };
        self.template.record(result).map(|_| rv)
    }
}

fn freeze(nodes: &NodeList, state: &mut State, out: &mut Output) -> Result<Vec<Segment>, Error> {
    let mut rv = Vec::new();
    for (idx, node) in nodes.iter().enumerate() {
        if node.is_persistent() {
            ok!(node.render(state, out));
            rv.push(Segment::Live(idx));
            continue;
        }
        let text = ok!(out.capture(|out| node.render(state, out)));
        ok!(out.write_str(&text).map_err(Error::from));
        match rv.last_mut() {
            Some(Segment::Text(prev)) => prev.push_str(&text),
            _ => rv.push(Segment::Text(text)),
        }
    }
    Ok(rv)
}

fn render_frozen(
    segments: &[Segment],
    nodes: &NodeList,
    state: &mut State,
    out: &mut Output,
) -> Result<(), Error> {
    for segment in segments {
        match *segment {
            Segment::Text(ref text) => ok!(out.write_str(text).map_err(Error::from)),
            Segment::Live(idx) => {
                if let Some(node) = nodes.iter().nth(idx) {
                    ok!(node.render(state, out));
                }
            }
        }
    }
    Ok(())
}
