//! Tags and tag libraries.
//!
//! A tag is compiled by a [`TagFactory`].  The parser hands the factory the
//! full content of the `{% ... %}` token (tag name included) and itself, so
//! that block tags can parse their bodies:
//!
//! ```
//! # use minidtl::{Environment, Error, Node, Output, Parser, State};
//! #[derive(Debug)]
//! struct Shout(minidtl::NodeList);
//!
//! impl Node for Shout {
//!     fn render(&self, state: &mut State, out: &mut Output) -> Result<(), Error> {
//!         let body = self.0.render_to_string(state, out)?;
//!         out.write_str(&body.to_uppercase()).map_err(Error::from)
//!     }
//! }
//!
//! let mut env = Environment::new();
//! env.add_tag(
//!     "shout",
//!     |_content: &str, parser: &mut Parser<'_>| -> Result<Box<dyn Node>, Error> {
//!         let body = parser.parse_until(&["endshout"])?;
//!         parser.expect_end_tag(&["endshout"])?;
//!         Ok(Box::new(Shout(body)))
//!     },
//! );
//! let rv = env.render_str("{% shout %}hi {{ x }}{% endshout %}", minidtl::context!{ x => "you" });
//! assert_eq!(rv.unwrap(), "HI YOU");
//! ```
//!
//! Tags and filters are grouped into [`Library`] objects which are registered
//! on the [`Environment`](crate::Environment).  Default libraries are open in
//! every template, others are opened with `{% load name %}`.
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::compiler::parser::Parser;
use crate::error::{Error, ErrorKind};
use crate::filters::Filter;
use crate::nodes::Node;
use crate::output::Output;
use crate::runtime::State;

pub mod conditionals;
pub mod inheritance;
pub mod loops;
pub mod raw;
pub mod scoping;

/// Compiles the content of a block tag into a node.
pub trait TagFactory: Send + Sync {
    /// Parses the tag.  `content` is the trimmed content of the block token
    /// including the tag name.
    fn parse(&self, content: &str, parser: &mut Parser<'_>) -> Result<Box<dyn Node>, Error>;
}

impl<F> TagFactory for F
where
    F: Fn(&str, &mut Parser<'_>) -> Result<Box<dyn Node>, Error> + Send + Sync,
{
    fn parse(&self, content: &str, parser: &mut Parser<'_>) -> Result<Box<dyn Node>, Error> {
        (self)(content, parser)
    }
}

/// A named collection of tags and filters.
#[derive(Clone, Default)]
pub struct Library {
    tags: BTreeMap<String, Arc<dyn TagFactory>>,
    filters: BTreeMap<String, Filter>,
}

impl fmt::Debug for Library {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Library")
            .field("tags", &self.tags.keys().collect::<Vec<_>>())
            .field("filters", &self.filters.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Library {
    /// Creates an empty library.
    pub fn new() -> Library {
        Library::default()
    }

    /// Adds a tag.  Registering a name twice replaces the earlier tag.
    pub fn add_tag<N, T>(&mut self, name: N, factory: T)
    where
        N: Into<String>,
        T: TagFactory + 'static,
    {
        self.tags.insert(name.into(), Arc::new(factory));
    }

    /// Adds a filter.
    pub fn add_filter<N: Into<String>>(&mut self, name: N, filter: Filter) {
        self.filters.insert(name.into(), filter);
    }

    /// Returns `true` if the library has a tag with this name.
    pub fn has_tag(&self, name: &str) -> bool {
        self.tags.contains_key(name)
    }

    /// Looks up a filter.
    pub fn get_filter(&self, name: &str) -> Option<&Filter> {
        self.filters.get(name)
    }

    /// Iterates over the tags.
    pub fn tags(&self) -> impl Iterator<Item = (&str, &Arc<dyn TagFactory>)> {
        self.tags.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Iterates over the filters.
    pub fn filters(&self) -> impl Iterator<Item = (&str, &Filter)> {
        self.filters.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Returns everything after the tag name.
pub(crate) fn tag_args(content: &str) -> &str {
    content
        .split_once(char::is_whitespace)
        .map_or("", |(_, rest)| rest.trim())
}

pub(crate) fn syntax_error<D: Into<std::borrow::Cow<'static, str>>>(detail: D) -> Error {
    Error::new(ErrorKind::TagSyntaxError, detail)
}

/// Parses the body of a block tag up to one of the given end tags.  Returns
/// the body and the name of the end tag.
pub(crate) fn parse_body<'a>(
    parser: &mut Parser<'a>,
    end_tags: &[&str],
) -> Result<(crate::nodes::NodeList, &'a str), Error> {
    let body = ok!(parser.parse_until(end_tags));
    let token = ok!(parser.expect_end_tag(end_tags));
    Ok((body, token.tag_name()))
}

/// A node that renders nothing (`comment`, `load`).
#[derive(Debug)]
pub(crate) struct EmptyNode;

impl Node for EmptyNode {
    fn render(&self, _state: &mut State, _out: &mut Output) -> Result<(), Error> {
        Ok(())
    }
}
