//! MiniDTL is a template engine for Rust modelled after the Django template
//! language.  It compiles template source into an immutable node tree that
//! can be rendered any number of times, from any number of threads, with
//! data from anything that implements [`serde::Serialize`].
//!
//! ```django
//! {% extends "base.html" %}
//! {% block content %}
//!   {% for user in users %}
//!     <li class="{% cycle 'odd' 'even' %}">{{ user.name|title }}</li>
//!   {% empty %}
//!     <li>No users</li>
//!   {% endfor %}
//! {% endblock %}
//! ```
//!
//! # Template Usage
//!
//! Templates are compiled through an [`Environment`].  It holds the tag and
//! filter libraries and the loaders templates are found with.  The
//! [`context!`] macro creates an ad-hoc context:
//!
//! ```
//! use minidtl::{Environment, InMemoryLoader, context};
//!
//! let mut loader = InMemoryLoader::new();
//! loader.add_template("hello.txt", "Hello {{ name }}!");
//! let mut env = Environment::new();
//! env.add_loader(loader);
//! let tmpl = env.get_template("hello.txt").unwrap();
//! assert_eq!(tmpl.render(context!(name => "John")).unwrap(), "Hello John!");
//! ```
//!
//! For quick one-off renders there is also the [`render!`] macro.
//!
//! A template that fails to compile is still returned by
//! [`Environment::new_template`] but it is in an error state.  Rendering it
//! fails with the compile error and [`Template::error_string`] describes it:
//!
//! ```
//! # use minidtl::{Environment, ErrorKind};
//! let env = Environment::new();
//! let tmpl = env.new_template("{% if %}{% endif %}", "broken.txt");
//! assert_eq!(tmpl.error().unwrap().kind(), ErrorKind::TagSyntaxError);
//! assert!(!tmpl.error_string().is_empty());
//! ```
//!
//! # Custom Filters and Tags
//!
//! Filters are plain functions over [`Value`]s, see the [`filters`] module.
//! Tags are compiled by a [`TagFactory`] that gets access to the [`Parser`]
//! so it can parse its own body, see the [`tags`] module.  Both are grouped
//! into [`Library`] objects.  Libraries that are not opened by default are
//! made available in a template with `{% load name %}`.
//!
//! # Render State
//!
//! Compiled templates never change while rendering.  State that has to
//! survive from one render to the next (the position of a `cycle` tag or the
//! last value an `ifchanged` tag saw) lives in the [`RenderContext`] of a
//! [`Context`].  Rendering repeatedly with the same context continues that
//! state, a fresh context starts over:
//!
//! ```
//! # use minidtl::{Context, Environment};
//! let env = Environment::new();
//! let tmpl = env.new_template("{% cycle 'a' 'b' 'c' %}", "cycle.txt");
//! let mut ctx = Context::new();
//! let rv: Vec<_> = (0..4).map(|_| tmpl.render_context(&mut ctx).unwrap()).collect();
//! assert_eq!(rv, ["a", "b", "c", "a"]);
//! ```
//!
//! # Logging
//!
//! The engine emits [`tracing`](https://docs.rs/tracing) events.  Compilation
//! and loader lookups are logged at debug level, per-tag parsing and
//! rendering at trace level.  Includes of templates that do not exist are
//! skipped with a warning.
//!
//! # Optional Features
//!
//! - `loader`: enables the [`FileSystemLoader`].  Enabled by default.
//! - `unicode`: uses unicode identifier rules for the `slugify` filter.
//! - `urlencode`: adds the `urlencode` filter.
//! - `speedups`: turns on the `v_htmlescape` dependency for faster HTML
//!   escaping.
//! - `stacker`: enables automatic stack growth which permits deeper nesting
//!   of tags at parse time.
#![allow(clippy::cognitive_complexity)]
#![allow(clippy::get_first)]
#![allow(clippy::needless_borrowed_reference)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]

#[macro_use]
mod macros;

mod compiler;
mod defaults;
mod environment;
mod error;
mod expression;
mod loader;
mod nodes;
mod output;
mod runtime;
mod template;
mod utils;

pub mod filters;
pub mod syntax;
pub mod tags;
pub mod value;

pub use self::compiler::lexer::{tokenize, Token, TokenKind};
pub use self::compiler::parser::Parser;
pub use self::environment::Environment;
pub use self::error::{Error, ErrorKind};
pub use self::expression::{FilterExpression, Variable};
pub use self::filters::Filter;
pub use self::loader::{CachingLoaderDecorator, InMemoryLoader, TemplateLoader};
pub use self::nodes::{Node, NodeId, NodeList, TextNode, VariableNode};
pub use self::output::Output;
pub use self::runtime::{BlockContext, Context, RenderContext, State};
pub use self::tags::{Library, TagFactory};
pub use self::template::{CompiledTemplate, MutableTemplate, Template};
pub use self::utils::{smart_split, unescape_string_literal, HtmlEscape, UndefinedBehavior};

#[cfg(feature = "loader")]
pub use self::loader::{safe_join, FileSystemLoader};

/// Re-export for convenience.
pub use self::value::Value;

pub use self::macros::__context;
