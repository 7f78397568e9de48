use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::compiler;
use crate::defaults;
use crate::error::{Error, ErrorKind};
use crate::filters::Filter;
use crate::loader::TemplateLoader;
use crate::tags::{Library, TagFactory};
use crate::template::{CompiledTemplate, MutableTemplate, Template};
use crate::utils::UndefinedBehavior;
use crate::value::Value;

/// The library custom filters and tags go into unless a library is given.
const DEFAULT_FILTERS: &str = "defaultfilters";
const DEFAULT_TAGS: &str = "defaulttags";

/// An abstraction that holds the engine configuration.
///
/// This object holds the central configuration state for templates: the
/// registered tag and filter libraries, the template loaders and the render
/// settings.  Templates borrow the environment they were created from.
///
/// There are generally two ways to construct an environment:
///
/// * [`Environment::new`] creates an environment preconfigured with sensible
///   defaults.  It contains all built-in tags and filters.
/// * [`Environment::empty`] creates a completely blank environment.
///
/// ```
/// # use minidtl::{context, Environment, InMemoryLoader};
/// let mut loader = InMemoryLoader::new();
/// loader.add_template("base.html", "<title>{% block title %}{% endblock %}</title>");
/// let mut env = Environment::new();
/// env.add_loader(loader);
/// let tmpl = env.new_template(
///     "{% extends 'base.html' %}{% block title %}{{ name }}{% endblock %}",
///     "page.html",
/// );
/// assert_eq!(tmpl.render(context!{ name => "Index" }).unwrap(), "<title>Index</title>");
/// ```
pub struct Environment {
    libraries: BTreeMap<String, Library>,
    default_libraries: Vec<String>,
    loaders: Vec<Box<dyn TemplateLoader>>,
    undefined_behavior: UndefinedBehavior,
    max_include_depth: usize,
    autoescape_default: bool,
}

impl Default for Environment {
    fn default() -> Self {
        Environment::empty()
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("libraries", &self.libraries.keys().collect::<BTreeSet<_>>())
            .field("default_libraries", &self.default_libraries)
            .field("loaders", &self.loaders.len())
            .field("undefined_behavior", &self.undefined_behavior)
            .field("max_include_depth", &self.max_include_depth)
            .field("autoescape_default", &self.autoescape_default)
            .finish()
    }
}

impl Environment {
    /// Creates a new environment with sensible defaults.
    ///
    /// The `defaulttags`, `loadertags` and `defaultfilters` libraries are
    /// registered and opened in every template.  The `mutabletags` library is
    /// registered but has to be loaded with `{% load mutabletags %}`.
    pub fn new() -> Environment {
        let mut rv = Environment::empty();
        for (name, library, default) in defaults::get_builtin_libraries() {
            rv.add_library(name, library, default);
        }
        rv
    }

    /// Creates a completely empty environment.
    ///
    /// This environment has no tags, no filters and no loaders.
    pub fn empty() -> Environment {
        Environment {
            libraries: BTreeMap::new(),
            default_libraries: Vec::new(),
            loaders: Vec::new(),
            undefined_behavior: UndefinedBehavior::default(),
            max_include_depth: 32,
            autoescape_default: true,
        }
    }

    /// Registers a library of tags and filters.
    ///
    /// Default libraries are opened in every template, the others have to
    /// be opened with the `load` tag.  Registering a library under an existing
    /// name replaces it.
    pub fn add_library<N: Into<String>>(&mut self, name: N, library: Library, default: bool) {
        let name = name.into();
        if default && !self.default_libraries.contains(&name) {
            self.default_libraries.push(name.clone());
        }
        self.libraries.insert(name, library);
    }

    /// Looks up a registered library.
    pub fn get_library(&self, name: &str) -> Option<&Library> {
        self.libraries.get(name)
    }

    /// Iterates over the libraries that are opened in every template, in
    /// registration order.
    pub(crate) fn default_libraries(&self) -> impl Iterator<Item = &Library> {
        self.default_libraries
            .iter()
            .filter_map(|name| self.libraries.get(name))
    }

    fn default_library_mut(&mut self, name: &str) -> &mut Library {
        if !self.default_libraries.iter().any(|x| x == name) {
            self.default_libraries.push(name.to_string());
        }
        self.libraries.entry(name.to_string()).or_default()
    }

    /// Adds a new filter function.
    ///
    /// The filter is added to the default filter library and is available in
    /// templates compiled afterwards.
    pub fn add_filter<N, F>(&mut self, name: N, f: F)
    where
        N: Into<String>,
        F: Fn(&Value, Option<&Value>, bool) -> Result<Value, Error> + Send + Sync + 'static,
    {
        self.default_library_mut(DEFAULT_FILTERS)
            .add_filter(name, Filter::new(f));
    }

    /// Adds a filter that keeps safe input safe.
    pub fn add_safe_filter<N, F>(&mut self, name: N, f: F)
    where
        N: Into<String>,
        F: Fn(&Value, Option<&Value>, bool) -> Result<Value, Error> + Send + Sync + 'static,
    {
        self.default_library_mut(DEFAULT_FILTERS)
            .add_filter(name, Filter::new_safe(f));
    }

    /// Adds a custom tag to the default tag library.
    pub fn add_tag<N, T>(&mut self, name: N, factory: T)
    where
        N: Into<String>,
        T: TagFactory + 'static,
    {
        self.default_library_mut(DEFAULT_TAGS)
            .add_tag(name, factory);
    }

    /// Adds a template loader.
    ///
    /// Loaders are asked in the order they were added.
    pub fn add_loader<L: TemplateLoader + 'static>(&mut self, loader: L) {
        self.loaders.push(Box::new(loader));
    }

    /// Drops all templates cached by the loaders.
    pub fn clear_templates(&mut self) {
        for loader in &mut self.loaders {
            loader.clear_cache();
        }
    }

    /// Changes the undefined behavior.
    ///
    /// This changes the runtime behavior of undefined values in the template
    /// engine.  For more information see [`UndefinedBehavior`].  The default
    /// is [`UndefinedBehavior::Lenient`].
    pub fn set_undefined_behavior(&mut self, behavior: UndefinedBehavior) {
        self.undefined_behavior = behavior;
    }

    /// Returns the current undefined behavior.
    pub fn undefined_behavior(&self) -> UndefinedBehavior {
        self.undefined_behavior
    }

    /// Sets how deep `extends`, `include` and `ssi` may nest.  The default
    /// is 32.
    pub fn set_max_include_depth(&mut self, depth: usize) {
        self.max_include_depth = depth;
    }

    /// Returns the maximum include depth.
    pub fn max_include_depth(&self) -> usize {
        self.max_include_depth
    }

    /// Enables or disables autoescaping for new renders.  Enabled by
    /// default.
    pub fn set_autoescape_default(&mut self, yes: bool) {
        self.autoescape_default = yes;
    }

    /// Returns whether autoescaping is enabled for new renders.
    pub fn autoescape_default(&self) -> bool {
        self.autoescape_default
    }

    pub(crate) fn compile(&self, source: &str, name: &str) -> Result<Arc<CompiledTemplate>, Error> {
        compiler::compile(self, source, name).map(Arc::new)
    }

    /// Compiles a template from a string.
    ///
    /// This always returns a template.  If compilation failed the template
    /// is in an error state, see [`Template::error`].
    pub fn new_template(&self, source: &str, name: &str) -> Template<'_> {
        let compiled = self.compile(source, name);
        if let Err(ref err) = compiled {
            tracing::debug!(name, error = %err, "template failed to compile");
        }
        Template::new(self, name, compiled)
    }

    /// Compiles a template whose output is frozen after the first render.
    ///
    /// See [`MutableTemplate`].
    pub fn new_mutable_template(&self, source: &str, name: &str) -> MutableTemplate<'_> {
        MutableTemplate::new(self.new_template(source, name))
    }

    /// Returns `true` if one of the loaders knows the template.
    pub fn can_load(&self, name: &str) -> bool {
        self.loaders.iter().any(|loader| loader.can_load(name))
    }

    /// Loads a template through the loaders.
    ///
    /// Returns `None` if no loader has the template.  A template that exists
    /// but fails to compile is returned in its error state.
    pub fn load_by_name(&self, name: &str) -> Option<Template<'_>> {
        for loader in &self.loaders {
            if !loader.can_load(name) {
                continue;
            }
            match loader.load_template(name, self) {
                Ok(Some(compiled)) => return Some(Template::new(self, name, Ok(compiled))),
                Ok(None) => continue,
                Err(err) => return Some(Template::new(self, name, Err(err))),
            }
        }
        tracing::debug!(name, "no loader has the template");
        None
    }

    /// Loads the raw source of a template through the loaders.
    pub(crate) fn load_source(&self, name: &str) -> Result<Option<String>, Error> {
        for loader in &self.loaders {
            if !loader.can_load(name) {
                continue;
            }
            if let Some(source) = ok!(loader.load_source(name)) {
                return Ok(Some(source));
            }
        }
        Ok(None)
    }

    /// Loads a template and fails if it does not exist or does not compile.
    ///
    /// ```
    /// # use minidtl::{Environment, ErrorKind};
    /// let env = Environment::new();
    /// let err = env.get_template("missing.html").unwrap_err();
    /// assert_eq!(err.kind(), ErrorKind::TemplateNotFound);
    /// ```
    pub fn get_template(&self, name: &str) -> Result<Template<'_>, Error> {
        let tmpl = match self.load_by_name(name) {
            Some(tmpl) => tmpl,
            None => return Err(Error::new_not_found(name)),
        };
        match tmpl.error() {
            Some(err) if tmpl.compiled().is_none() => Err(err),
            _ => Ok(tmpl),
        }
    }

    /// Parses and renders a template from a string in one go.
    ///
    /// ```
    /// # use minidtl::{Environment, context};
    /// let env = Environment::new();
    /// let ctx = context!{ foo => "Hello" };
    /// assert_eq!(env.render_str("{{ foo }} World", ctx).unwrap(), "Hello World");
    /// ```
    pub fn render_str<S: Serialize>(&self, source: &str, ctx: S) -> Result<String, Error> {
        let tmpl = self.new_template(source, "<string>");
        if tmpl.compiled().is_none() {
            return Err(tmpl
                .error()
                .unwrap_or_else(|| Error::from(ErrorKind::TagSyntaxError)));
        }
        tmpl.render(ctx)
    }
}
