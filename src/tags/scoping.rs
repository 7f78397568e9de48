//! Tags that change the context or post-process their body: `with`,
//! `autoescape`, `filter`, `spaceless`, plus the small utility tags
//! `comment`, `templatetag`, `widthratio`, `debug` and `load`.
use std::fmt::Write;

use crate::compiler::parser::Parser;
use crate::error::Error;
use crate::expression::FilterExpression;
use crate::nodes::{Node, NodeList};
use crate::output::Output;
use crate::runtime::State;
use crate::tags::{parse_body, syntax_error, tag_args, EmptyNode};
use crate::utils::{smart_split, split_outside_quotes, write_escaped, HtmlEscape};
use crate::value::{ops, Value};

/// The `with` tag.
#[derive(Debug)]
pub struct WithNode {
    bindings: Vec<(String, FilterExpression)>,
    body: NodeList,
}

impl Node for WithNode {
    fn render(&self, state: &mut State, out: &mut Output) -> Result<(), Error> {
        state.with_scope(|state| {
            for (name, expr) in &self.bindings {
                let value = ok!(expr.resolve(state));
                state.context_mut().insert(name, value);
            }
            self.body.render(state, out)
        })
    }
}

/// `{% with expr as name %}` or `{% with a=expr b=expr %}` ... `{% endwith %}`
pub fn parse_with(content: &str, parser: &mut Parser<'_>) -> Result<Box<dyn Node>, Error> {
    let args = smart_split(tag_args(content));
    let mut bindings = Vec::new();
    if let &[expr, "as", name] = &args[..] {
        bindings.push((name.to_string(), ok!(parser.compile_filter(expr))));
    } else {
        for arg in &args {
            match split_outside_quotes(arg, '=')[..] {
                [name, expr] if !name.is_empty() && !expr.is_empty() => {
                    bindings.push((name.to_string(), ok!(parser.compile_filter(expr))));
                }
                _ => {
                    return Err(syntax_error(format!(
                        "'with' expected format is 'value as name' or 'name=value': {content}"
                    )))
                }
            }
        }
    }
    if bindings.is_empty() {
        return Err(syntax_error("'with' tag requires at least one argument"));
    }
    let (body, _) = ok!(parse_body(parser, &["endwith"]));
    Ok(Box::new(WithNode { bindings, body }))
}

/// The `autoescape` tag.
#[derive(Debug)]
pub struct AutoescapeNode {
    enabled: bool,
    body: NodeList,
}

impl Node for AutoescapeNode {
    fn render(&self, state: &mut State, out: &mut Output) -> Result<(), Error> {
        let old = state.autoescape();
        state.context_mut().set_autoescape(self.enabled);
        let rv = self.body.render(state, out);
        state.context_mut().set_autoescape(old);
        rv
    }
}

/// `{% autoescape on|off %} ... {% endautoescape %}`
pub fn parse_autoescape(content: &str, parser: &mut Parser<'_>) -> Result<Box<dyn Node>, Error> {
    let enabled = match tag_args(content) {
        "on" => true,
        "off" => false,
        _ => return Err(syntax_error("'autoescape' argument should be 'on' or 'off'")),
    };
    let (body, _) = ok!(parse_body(parser, &["endautoescape"]));
    Ok(Box::new(AutoescapeNode { enabled, body }))
}

/// The `filter` tag.
#[derive(Debug)]
pub struct FilterNode {
    expr: FilterExpression,
    body: NodeList,
}

impl Node for FilterNode {
    fn render(&self, state: &mut State, out: &mut Output) -> Result<(), Error> {
        let body = ok!(self.body.render_to_string(state, out));
        let value = ok!(self
            .expr
            .apply_filters(Value::from_safe_string(body), state));
        write_escaped(out, state.autoescape(), &value)
    }
}

/// `{% filter lower|force_escape %} ... {% endfilter %}`
pub fn parse_filter(content: &str, parser: &mut Parser<'_>) -> Result<Box<dyn Node>, Error> {
    let chain = tag_args(content);
    if chain.is_empty() {
        return Err(syntax_error("'filter' tag requires at least one filter"));
    }
    let expr = ok!(parser.compile_filter(&format!("var|{chain}")));
    for name in expr.filter_names() {
        if name == "safe" || name == "escape" {
            return Err(syntax_error(format!(
                "\"filter {name}\" is not permitted.  Use the \"autoescape\" tag instead."
            )));
        }
    }
    let (body, _) = ok!(parse_body(parser, &["endfilter"]));
    Ok(Box::new(FilterNode { expr, body }))
}

/// Removes whitespace between HTML tags.
pub fn strip_spaces_between_tags(s: &str) -> String {
    let mut rv = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(idx) = rest.find('>') {
        rv.push_str(&rest[..=idx]);
        rest = &rest[idx + 1..];
        let trimmed = rest.trim_start();
        if trimmed.starts_with('<') {
            rest = trimmed;
        }
    }
    rv.push_str(rest);
    rv
}

/// The `spaceless` tag.
#[derive(Debug)]
pub struct SpacelessNode {
    body: NodeList,
}

impl Node for SpacelessNode {
    fn render(&self, state: &mut State, out: &mut Output) -> Result<(), Error> {
        let body = ok!(self.body.render_to_string(state, out));
        out.write_str(&strip_spaces_between_tags(body.trim()))
            .map_err(Error::from)
    }
}

/// `{% spaceless %} ... {% endspaceless %}`
pub fn parse_spaceless(_content: &str, parser: &mut Parser<'_>) -> Result<Box<dyn Node>, Error> {
    let (body, _) = ok!(parse_body(parser, &["endspaceless"]));
    Ok(Box::new(SpacelessNode { body }))
}

/// `{% comment %} ... {% endcomment %}`.  The body is skipped unparsed.
pub fn parse_comment(_content: &str, parser: &mut Parser<'_>) -> Result<Box<dyn Node>, Error> {
    ok!(parser.skip_past("endcomment"));
    Ok(Box::new(EmptyNode))
}

#[derive(Debug)]
struct LiteralNode(&'static str);

impl Node for LiteralNode {
    fn render(&self, _state: &mut State, out: &mut Output) -> Result<(), Error> {
        out.write_str(self.0).map_err(Error::from)
    }
}

/// `{% templatetag openblock %}` outputs the syntax characters.
pub fn parse_templatetag(content: &str, _parser: &mut Parser<'_>) -> Result<Box<dyn Node>, Error> {
    let output = match tag_args(content) {
        "openblock" => "{%",
        "closeblock" => "%}",
        "openvariable" => "{{",
        "closevariable" => "}}",
        "openbrace" => "{",
        "closebrace" => "}",
        "opencomment" => "{#",
        "closecomment" => "#}",
        other => {
            return Err(syntax_error(format!(
                "Invalid templatetag argument: '{other}'. Must be one of: openblock, \
                 closeblock, openvariable, closevariable, openbrace, closebrace, \
                 opencomment, closecomment"
            )))
        }
    };
    Ok(Box::new(LiteralNode(output)))
}

/// The `widthratio` tag.
#[derive(Debug)]
pub struct WidthRatioNode {
    value: FilterExpression,
    max: FilterExpression,
    width: FilterExpression,
}

impl Node for WidthRatioNode {
    fn render(&self, state: &mut State, out: &mut Output) -> Result<(), Error> {
        let value = ops::to_float(&ok!(self.value.resolve(state)));
        let max = ops::to_float(&ok!(self.max.resolve(state)));
        let width = ops::to_float(&ok!(self.width.resolve(state)));
        let (value, max, width) = match (value, max, width) {
            (Some(value), Some(max), Some(width)) => (value, max, width),
            _ => return Ok(()),
        };
        let ratio = if max == 0.0 {
            0
        } else {
            (value / max * width).round() as i64
        };
        write!(out, "{ratio}").map_err(Error::from)
    }
}

/// `{% widthratio value max_value max_width %}`
pub fn parse_widthratio(content: &str, parser: &mut Parser<'_>) -> Result<Box<dyn Node>, Error> {
    match smart_split(tag_args(content))[..] {
        [value, max, width] => Ok(Box::new(WidthRatioNode {
            value: ok!(parser.compile_filter(value)),
            max: ok!(parser.compile_filter(max)),
            width: ok!(parser.compile_filter(width)),
        })),
        _ => Err(syntax_error("widthratio takes three arguments")),
    }
}

/// The `debug` tag.
#[derive(Debug)]
pub struct DebugNode;

impl Node for DebugNode {
    fn render(&self, state: &mut State, out: &mut Output) -> Result<(), Error> {
        let mut rv = String::from("Context:\n");
        for (depth, frame) in state.context().frames().enumerate() {
            for (key, value) in frame {
                ok!(writeln!(rv, "{depth} {key} ({}): {value}", value.kind()).map_err(Error::from));
            }
        }
        if state.autoescape() {
            write!(out, "{}", HtmlEscape(&rv)).map_err(Error::from)
        } else {
            out.write_str(&rv).map_err(Error::from)
        }
    }
}

/// `{% debug %}` dumps the variables of every context frame.
pub fn parse_debug(_content: &str, _parser: &mut Parser<'_>) -> Result<Box<dyn Node>, Error> {
    Ok(Box::new(DebugNode))
}

/// `{% load lib1 lib2 %}` opens libraries registered on the environment.
pub fn parse_load(content: &str, parser: &mut Parser<'_>) -> Result<Box<dyn Node>, Error> {
    let names = smart_split(tag_args(content));
    if names.is_empty() {
        return Err(syntax_error("'load' tag requires at least one library name"));
    }
    for name in names {
        ok!(parser.load_library(name));
    }
    Ok(Box::new(EmptyNode))
}
