//! Template inheritance and inclusion: `block`, `extends`, `include` and
//! `ssi`.
//!
//! When a template extends another one, its blocks are pushed onto the
//! [`BlockContext`] before the parent renders.  Every `block` node of the
//! parent then renders the nearest override of its name instead of its own
//! body.  Inside an override `{{ block.super }}` renders the next definition
//! further down the stack:
//!
//! ```
//! # use minidtl::{context, Environment, InMemoryLoader};
//! let mut loader = InMemoryLoader::new();
//! loader.add_template("base.html", "<h1>{% block title %}Site{% endblock %}</h1>");
//! let mut env = Environment::new();
//! env.add_loader(loader);
//! let tmpl = env.new_template(
//!     "{% extends 'base.html' %}{% block title %}Page - {{ block.super }}{% endblock %}",
//!     "page.html",
//! );
//! assert_eq!(tmpl.render(context!{}).unwrap(), "<h1>Page - Site</h1>");
//! ```
use std::fmt;
use std::sync::Arc;

use crate::compiler::parser::Parser;
use crate::error::{Error, ErrorKind};
use crate::expression::FilterExpression;
use crate::nodes::{Node, NodeList};
use crate::output::Output;
use crate::runtime::{BlockContext, State};
use crate::tags::{syntax_error, tag_args};
use crate::template::CompiledTemplate;
use crate::utils::{smart_split, unescape_string_literal};
use crate::value::Value;

/// A named, overridable section of a template.
pub struct BlockNode {
    name: String,
    body: NodeList,
}

impl fmt::Debug for BlockNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockNode")
            .field("name", &self.name)
            .field("body", &self.body)
            .finish()
    }
}

impl BlockNode {
    /// Creates a block.
    pub fn new<S: Into<String>>(name: S, body: NodeList) -> BlockNode {
        BlockNode {
            name: name.into(),
            body,
        }
    }

    /// Returns the name of the block.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn render_body(&self, state: &mut State, out: &mut Output) -> Result<(), Error> {
        state.with_scope(|state| {
            state
                .context_mut()
                .insert("block", Value::block_ref(&self.name));
            self.body.render(state, out)
        })
    }
}

impl Node for BlockNode {
    fn render(&self, state: &mut State, out: &mut Output) -> Result<(), Error> {
        let nearest = state
            .render_context_mut()
            .block_context_mut()
            .checkout(&self.name);
        match nearest {
            Some(block) => {
                let rv = block.render_body(state, out);
                state
                    .render_context_mut()
                    .block_context_mut()
                    .checkin(&self.name, block);
                rv
            }
            None => self.render_body(state, out),
        }
    }
}

/// Renders the definition of a block below the one currently rendering and
/// returns it as a safe string.  Empty if there is none.
pub(crate) fn render_block_super(state: &mut State, name: &str) -> Result<Value, Error> {
    let parent = match state.render_context_mut().block_context().peek(name) {
        Some(block) => block.clone(),
        None => return Ok(Value::from_safe_string(String::new())),
    };
    let mut rv = String::new();
    ok!(parent.render(state, &mut Output::new(&mut rv)));
    Ok(Value::from_safe_string(rv))
}

/// `{% block name %} ... {% endblock [name] %}`
pub fn parse_block(content: &str, parser: &mut Parser<'_>) -> Result<Box<dyn Node>, Error> {
    let name = match smart_split(content)[..] {
        [_, name] => name,
        _ => return Err(syntax_error("'block' tag takes only one argument")),
    };
    ok!(parser.declare_block(name));
    let body = ok!(parser.parse_until(&["endblock"]));
    let end = ok!(parser.expect_end_tag(&["endblock"]));
    let end_name = tag_args(end.content);
    if !end_name.is_empty() && end_name != name {
        return Err(Error::new(
            ErrorKind::InvalidBlockTagError,
            format!(
                "Invalid block tag: '{}', expected 'endblock' or 'endblock {name}'",
                end.content
            ),
        ));
    }
    let block = Arc::new(BlockNode::new(name, body));
    parser.add_block(block.clone());
    Ok(Box::new(block))
}

/// Resolves the value of an `extends` or `include` argument to a compiled
/// template.  `Ok(None)` means no loader knows the name.
fn resolve_template(
    state: &mut State,
    expr: &FilterExpression,
) -> Result<Option<(String, Arc<CompiledTemplate>)>, Error> {
    let value = ok!(expr.resolve(state));
    if let Some(compiled) = value.as_template() {
        return Ok(Some((compiled.name().to_string(), compiled.clone())));
    }
    let name = value.to_output_string();
    let env = state.env();
    match env.load_by_name(&name) {
        Some(tmpl) => match tmpl.compiled() {
            Some(compiled) => Ok(Some((name, compiled.clone()))),
            None => Err(tmpl.stored_error()),
        },
        None => Ok(None),
    }
}

/// The `extends` tag.
///
/// Everything after it is parsed into the node, but only its blocks matter:
/// the output comes from the parent template.
#[derive(Debug)]
pub struct ExtendsNode {
    parent: FilterExpression,
    nodes: NodeList,
    blocks: Vec<Arc<BlockNode>>,
    line: usize,
}

impl ExtendsNode {
    /// Returns the node list of the extending template.
    pub fn nodes(&self) -> &NodeList {
        &self.nodes
    }

    fn render_parent(
        &self,
        parent: &CompiledTemplate,
        state: &mut State,
        out: &mut Output,
    ) -> Result<(), Error> {
        let parent_blocks: Vec<Arc<BlockNode>> = if parent.starts_with_extends() {
            Vec::new()
        } else {
            parent.blocks().cloned().collect()
        };
        let blocks = state.render_context_mut().block_context_mut();
        blocks.add_blocks(&self.blocks);
        blocks.add_blocks(&parent_blocks);
        let rv = parent.nodes().render(state, out);
        let blocks = state.render_context_mut().block_context_mut();
        blocks.remove_blocks(&self.blocks);
        blocks.remove_blocks(&parent_blocks);
        rv
    }
}

impl Node for ExtendsNode {
    fn render(&self, state: &mut State, out: &mut Output) -> Result<(), Error> {
        let (name, parent) = ok!(state.at_line(self.line, |state| {
            match ok!(resolve_template(state, &self.parent)) {
                Some(rv) => Ok(rv),
                None => {
                    let name = ok!(self.parent.resolve(state)).to_output_string();
                    Err(syntax_error(format!("Template not found {name}")))
                }
            }
        }));
        tracing::trace!(parent = %name, "rendering parent template");
        state.with_template(parent.clone(), |state| {
            self.render_parent(&parent, state, out)
        })
    }

    fn must_be_first(&self) -> bool {
        true
    }
}

/// `{% extends "base.html" %}` or `{% extends variable %}`
pub fn parse_extends(content: &str, parser: &mut Parser<'_>) -> Result<Box<dyn Node>, Error> {
    let parent = match smart_split(content)[..] {
        [_, parent] => ok!(parser.compile_filter(parent)),
        _ => return Err(syntax_error("Error: Extends tag takes only one argument")),
    };
    let line = parser.current_line();
    ok!(parser.mark_extends());
    let nodes = ok!(parser.parse_until(&[]));
    Ok(Box::new(ExtendsNode {
        parent,
        nodes,
        blocks: parser.blocks().to_vec(),
        line,
    }))
}

/// Renders a compiled template in the current context with a fresh block
/// context.
fn render_isolated(
    template: Arc<CompiledTemplate>,
    state: &mut State,
    out: &mut Output,
) -> Result<(), Error> {
    state.with_template(template.clone(), |state| {
        let outer = state
            .render_context_mut()
            .replace_block_context(BlockContext::default());
        let rv = template.nodes().render(state, out);
        state.render_context_mut().replace_block_context(outer);
        rv
    })
}

/// The `include` tag.
#[derive(Debug)]
pub struct IncludeNode {
    template: FilterExpression,
    line: usize,
}

impl Node for IncludeNode {
    fn render(&self, state: &mut State, out: &mut Output) -> Result<(), Error> {
        let resolved = ok!(state.at_line(self.line, |state| resolve_template(state, &self.template)));
        match resolved {
            Some((_, template)) => render_isolated(template, state, out),
            None => {
                tracing::warn!(
                    template = %self.template,
                    from = state.name(),
                    "included template not found"
                );
                Ok(())
            }
        }
    }
}

/// `{% include "name" %}` or `{% include variable %}`
pub fn parse_include(content: &str, parser: &mut Parser<'_>) -> Result<Box<dyn Node>, Error> {
    match smart_split(content)[..] {
        [_, template] => Ok(Box::new(IncludeNode {
            template: ok!(parser.compile_filter(template)),
            line: parser.current_line(),
        })),
        _ => Err(syntax_error(
            "Error: Include tag takes only one argument",
        )),
    }
}

/// The `ssi` tag.
#[derive(Debug)]
pub struct SsiNode {
    name: String,
    parsed: bool,
    line: usize,
}

impl Node for SsiNode {
    fn render(&self, state: &mut State, out: &mut Output) -> Result<(), Error> {
        let source = match ok!(state.env().load_source(&self.name)) {
            Some(source) => source,
            None => {
                tracing::warn!(name = %self.name, from = state.name(), "ssi source not found");
                return Ok(());
            }
        };
        if !self.parsed {
            return out.write_str(&source).map_err(Error::from);
        }
        let compiled = ok!(state.at_line(self.line, |state| {
            state.env().compile(&source, &self.name)
        }));
        render_isolated(compiled, state, out)
    }
}

/// `{% ssi name [parsed] %}` includes the source of another template,
/// verbatim or rendered.
pub fn parse_ssi(content: &str, parser: &mut Parser<'_>) -> Result<Box<dyn Node>, Error> {
    let (name, parsed) = match smart_split(content)[..] {
        [_, name] => (name, false),
        [_, name, "parsed"] => (name, true),
        _ => {
            return Err(syntax_error(
                "'ssi' tag takes one argument: the name of the file to be included",
            ))
        }
    };
    let name = if name.starts_with('"') || name.starts_with('\'') {
        ok!(unescape_string_literal(name))
    } else {
        name.to_string()
    };
    Ok(Box::new(SsiNode {
        name,
        parsed,
        line: parser.current_line(),
    }))
}

#[cfg(test)]
mod tests {
    use crate::environment::Environment;
    use crate::error::ErrorKind;
    use crate::loader::InMemoryLoader;

    use similar_asserts::assert_eq;

    fn env_with(templates: &[(&str, &str)]) -> Environment {
        let mut loader = InMemoryLoader::new();
        for (name, source) in templates {
            loader.add_template(*name, *source);
        }
        let mut env = Environment::new();
        env.add_loader(loader);
        env
    }

    #[test]
    fn test_block_without_parent() {
        let env = Environment::new();
        let tmpl = env.new_template("a{% block x %}b{% endblock x %}c", "t");
        assert_eq!(tmpl.render(()).unwrap(), "abc");
    }

    #[test]
    fn test_endblock_name_mismatch() {
        let env = Environment::new();
        let tmpl = env.new_template("{% block x %}{% endblock y %}", "t");
        assert_eq!(tmpl.error().unwrap().kind(), ErrorKind::InvalidBlockTagError);
        assert!(tmpl.error_string().contains("'endblock' or 'endblock x'"));
    }

    #[test]
    fn test_block_argument_count() {
        let env = Environment::new();
        let tmpl = env.new_template("{% block %}{% endblock %}", "t");
        assert_eq!(tmpl.error().unwrap().kind(), ErrorKind::TagSyntaxError);
        let tmpl = env.new_template("{% block a b %}{% endblock %}", "t");
        assert_eq!(tmpl.error().unwrap().kind(), ErrorKind::TagSyntaxError);
    }

    #[test]
    fn test_block_context_is_clean_after_render() {
        let env = env_with(&[("base", "{% block a %}A{% endblock %}")]);
        let tmpl = env.new_template("{% extends 'base' %}{% block a %}B{% endblock %}", "child");
        let mut ctx = crate::runtime::Context::new();
        assert_eq!(tmpl.render_context(&mut ctx).unwrap(), "B");
        assert!(ctx.render_context().block_context().is_empty());
    }

    #[test]
    fn test_ssi() {
        let env = env_with(&[("part.txt", "{{ x }}!")]);
        let ctx = crate::context! { x => 1 };
        assert_eq!(env.render_str("{% ssi part.txt %}", ctx.clone()).unwrap(), "{{ x }}!");
        assert_eq!(
            env.render_str("{% ssi 'part.txt' parsed %}", ctx.clone()).unwrap(),
            "1!"
        );
        assert_eq!(env.render_str("[{% ssi missing.txt %}]", ctx).unwrap(), "[]");
    }
}
