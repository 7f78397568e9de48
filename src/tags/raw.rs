//! The `raw` and `repeater` tags of the `mutabletags` library.
//!
//! Both are the same node under two names.  Their body stays live when a [`MutableTemplate`](crate::MutableTemplate)
//! freezes the rest of its output after the first render.
use crate::compiler::parser::Parser;
use crate::error::Error;
use crate::nodes::{Node, NodeList};
use crate::output::Output;
use crate::runtime::State;
use crate::tags::parse_body;

/// Renders its body on every render of a mutable template.
#[derive(Debug)]
pub struct RawNode {
    body: NodeList,
}

impl Node for RawNode {
    fn render(&self, state: &mut State, out: &mut Output) -> Result<(), Error> {
        self.body.render(state, out)
    }

    fn is_persistent(&self) -> bool {
        true
    }
}

/// `{% raw %} ... {% endraw %}`
pub fn parse_raw(_content: &str, parser: &mut Parser<'_>) -> Result<Box<dyn Node>, Error> {
    let (body, _) = ok!(parse_body(parser, &["endraw"]));
    Ok(Box::new(RawNode { body }))
}

/// `{% repeater %} ... {% endrepeater %}`
pub fn parse_repeater(_content: &str, parser: &mut Parser<'_>) -> Result<Box<dyn Node>, Error> {
    let (body, _) = ok!(parse_body(parser, &["endrepeater"]));
    Ok(Box::new(RawNode { body }))
}

#[cfg(test)]
mod tests {
    use crate::environment::Environment;
    use crate::error::ErrorKind;

    use similar_asserts::assert_eq;

    #[test]
    fn test_raw_renders_body() {
        let env = Environment::new();
        let rv = env
            .render_str("{% load mutabletags %}<{% raw %}{{ x }}{% endraw %}>", crate::context! { x => "y" })
            .unwrap();
        assert_eq!(rv, "<y>");
    }

    #[test]
    fn test_raw_requires_load() {
        let env = Environment::new();
        let tmpl = env.new_template("{% raw %}{% endraw %}", "t");
        assert_eq!(tmpl.error().unwrap().kind(), ErrorKind::InvalidBlockTagError);
    }

    #[test]
    fn test_mutable_template_keeps_raw_live() {
        let env = Environment::new();
        let tmpl = env.new_mutable_template(
            "{% load mutabletags %}{{ a }}{% raw %}[{{ b }}]{% endraw %}{{ a }}",
            "m",
        );
        assert_eq!(tmpl.render(crate::context! { a => "x", b => 1 }).unwrap(), "x[1]x");
        assert_eq!(tmpl.render(crate::context! { a => "z", b => 2 }).unwrap(), "x[2]x");
    }

    #[test]
    fn test_mutable_template_keeps_repeater_live() {
        let env = Environment::new();
        let tmpl = env.new_mutable_template(
            "{% load mutabletags %}{{ a }}:{% repeater %}{% for x in items %}{{ x }}{% endfor %}{% endrepeater %}",
            "m",
        );
        assert_eq!(
            tmpl.render(crate::context! { a => "x", items => vec![1, 2] }).unwrap(),
            "x:12"
        );
        assert_eq!(
            tmpl.render(crate::context! { a => "y", items => vec![3] }).unwrap(),
            "x:3"
        );
        let tmpl = env.new_template("{% load mutabletags %}{% repeater %}x", "unclosed");
        assert_eq!(
            tmpl.error().unwrap().kind(),
            ErrorKind::UnclosedBlockTagError
        );
    }
}
