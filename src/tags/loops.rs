//! `for`, `cycle`, `range` and `regroup`.
use std::sync::Arc;

use crate::compiler::lexer::TokenKind;
use crate::compiler::parser::Parser;
use crate::error::Error;
use crate::expression::FilterExpression;
use crate::nodes::{Node, NodeId, NodeList};
use crate::output::Output;
use crate::runtime::State;
use crate::tags::{parse_body, syntax_error, tag_args};
use crate::utils::{smart_split, write_escaped};
use crate::value::{ops, Value, ValueMap};

/// The `for` tag.
#[derive(Debug)]
pub struct ForNode {
    vars: Vec<String>,
    seq: FilterExpression,
    reversed: bool,
    body: NodeList,
    empty_body: NodeList,
}

fn forloop(idx: usize, len: usize, parent: &Value) -> Value {
    let mut map = ValueMap::new();
    map.insert("counter0".into(), Value::from(idx));
    map.insert("counter".into(), Value::from(idx + 1));
    map.insert("revcounter".into(), Value::from(len - idx));
    map.insert("revcounter0".into(), Value::from(len - idx - 1));
    map.insert("first".into(), Value::from(idx == 0));
    map.insert("last".into(), Value::from(idx + 1 == len));
    map.insert("parentloop".into(), parent.clone());
    Value::from_map(map)
}

impl ForNode {
    fn bind(&self, state: &mut State, item: Value) {
        if let [var] = &self.vars[..] {
            state.context_mut().insert(var, item);
            return;
        }
        let parts = match item.as_slice() {
            Some(parts) => parts.to_vec(),
            None => vec![item],
        };
        for (idx, var) in self.vars.iter().enumerate() {
            let value = parts.get(idx).cloned().unwrap_or(Value::UNDEFINED);
            state.context_mut().insert(var, value);
        }
    }

    fn render_items(
        &self,
        items: Vec<Value>,
        state: &mut State,
        out: &mut Output,
    ) -> Result<(), Error> {
        let parent = state.lookup("forloop");
        let len = items.len();
        for (idx, item) in items.into_iter().enumerate() {
            state
                .context_mut()
                .insert("forloop", forloop(idx, len, &parent));
            self.bind(state, item);
            ok!(self.body.render(state, out));
        }
        Ok(())
    }
}

impl Node for ForNode {
    fn render(&self, state: &mut State, out: &mut Output) -> Result<(), Error> {
        let seq = ok!(self.seq.resolve(state));
        let mut items = seq.try_iter().unwrap_or_default();
        if items.is_empty() {
            return self.empty_body.render(state, out);
        }
        if self.reversed {
            items.reverse();
        }
        state.with_scope(|state| {
            let outer = state.render_context_mut().enter_loop();
            let rv = self.render_items(items, state, out);
            state.render_context_mut().leave_loop(outer);
            rv
        })
    }
}

/// `{% for x in seq [reversed] %} ... {% empty %} ... {% endfor %}`
///
/// The `empty` branch may also be closed with `endempty`, optionally
/// followed by `endfor`.
pub fn parse_for(content: &str, parser: &mut Parser<'_>) -> Result<Box<dyn Node>, Error> {
    let words = smart_split(content);
    if words.len() < 4 {
        return Err(syntax_error(format!(
            "'for' statements should have at least four words: {content}"
        )));
    }
    let reversed = words.last() == Some(&"reversed");
    let in_idx = words.len() - if reversed { 3 } else { 2 };
    if words[in_idx] != "in" {
        return Err(syntax_error(format!(
            "'for' statements should use the form 'for x in y': {content}"
        )));
    }
    let mut vars = Vec::new();
    for var in words[1..in_idx].join(" ").split(',') {
        let var = var.trim();
        if var.is_empty() || var.contains(char::is_whitespace) {
            return Err(syntax_error(format!(
                "'for' tag received invalid argument: {content}"
            )));
        }
        vars.push(var.to_string());
    }
    let seq = ok!(parser.compile_filter(words[in_idx + 1]));

    let (body, end) = ok!(parse_body(parser, &["empty", "endfor"]));
    let empty_body = if end == "empty" {
        let (empty_body, end) = ok!(parse_body(parser, &["endfor", "endempty"]));
        if end == "endempty"
            && parser
                .peek_token()
                .map_or(false, |t| t.kind == TokenKind::Block && t.tag_name() == "endfor")
        {
            parser.take_token();
        }
        empty_body
    } else {
        NodeList::default()
    };

    Ok(Box::new(ForNode {
        vars,
        seq,
        reversed,
        body,
        empty_body,
    }))
}

/// The `cycle` tag.
///
/// The position is kept in the render context, so it carries over to the
/// next render with the same context.
#[derive(Debug)]
pub struct CycleNode {
    id: NodeId,
    values: Vec<FilterExpression>,
    name: Option<String>,
}

impl Node for CycleNode {
    fn render(&self, state: &mut State, out: &mut Output) -> Result<(), Error> {
        let key = self.id;
        let pos = state
            .render_context_mut()
            .get(key)
            .and_then(|x| x.as_i64())
            .unwrap_or(0) as usize;
        state
            .render_context_mut()
            .insert(key, Value::from(pos + 1));
        let value = ok!(self.values[pos % self.values.len()].resolve(state));
        if let Some(ref name) = self.name {
            state.context_mut().insert(name, value.clone());
        }
        write_escaped(out, state.autoescape(), &value)
    }
}

/// `{% cycle a b c %}`, `{% cycle a,b,c %}`, `{% cycle a b as name %}` and
/// `{% cycle name %}`.
pub fn parse_cycle(content: &str, parser: &mut Parser<'_>) -> Result<Box<dyn Node>, Error> {
    let args = smart_split(tag_args(content));
    if args.is_empty() {
        return Err(syntax_error("'cycle' tag requires at least two arguments"));
    }

    if let &[single] = &args[..] {
        if single.contains(',') {
            let values = single
                .split(',')
                .map(|x| FilterExpression::from_literal(Value::from_safe_string(x.into()), x))
                .collect();
            return Ok(Box::new(CycleNode {
                id: NodeId::new(),
                values,
                name: None,
            }));
        }
        return Ok(Box::new(ok!(parser.named_cycle(single))));
    }

    let (values, name) = match args.len() {
        len if len >= 3 && args[len - 2] == "as" => (&args[..len - 2], Some(args[len - 1])),
        _ => (&args[..], None),
    };
    let mut compiled = Vec::with_capacity(values.len());
    for value in values {
        compiled.push(ok!(parser.compile_filter(value)));
    }
    let node = Arc::new(CycleNode {
        id: NodeId::new(),
        values: compiled,
        name: name.map(String::from),
    });
    if let Some(name) = name {
        parser.register_named_cycle(name, node.clone());
    }
    Ok(Box::new(node))
}

/// The `range` tag.
#[derive(Debug)]
pub struct RangeNode {
    start: Option<FilterExpression>,
    stop: FilterExpression,
    step: Option<FilterExpression>,
    name: Option<String>,
    body: NodeList,
}

impl RangeNode {
    fn int(expr: Option<&FilterExpression>, state: &mut State, default: i64) -> Result<i64, Error> {
        match expr {
            Some(expr) => Ok(ops::to_int(&ok!(expr.resolve(state))).unwrap_or(default)),
            None => Ok(default),
        }
    }
}

impl Node for RangeNode {
    fn render(&self, state: &mut State, out: &mut Output) -> Result<(), Error> {
        let start = ok!(RangeNode::int(self.start.as_ref(), state, 0));
        let stop = ok!(RangeNode::int(Some(&self.stop), state, 0));
        let step = ok!(RangeNode::int(self.step.as_ref(), state, 1));
        if step == 0 {
            return Ok(());
        }
        state.with_scope(|state| {
            let mut i = start;
            while (step > 0 && i < stop) || (step < 0 && i > stop) {
                if let Some(ref name) = self.name {
                    state.context_mut().insert(name, Value::from(i));
                }
                ok!(self.body.render(state, out));
                i = match i.checked_add(step) {
                    Some(next) => next,
                    None => break,
                };
            }
            Ok(())
        })
    }
}

/// `{% range [start] stop [step] [as name] %} ... {% endrange %}`
pub fn parse_range(content: &str, parser: &mut Parser<'_>) -> Result<Box<dyn Node>, Error> {
    let args = smart_split(tag_args(content));
    let (bounds, name) = match args.len() {
        len if len >= 3 && args[len - 2] == "as" => (&args[..len - 2], Some(args[len - 1])),
        _ => (&args[..], None),
    };
    let mut compiled = Vec::with_capacity(bounds.len());
    for bound in bounds {
        compiled.push(ok!(parser.compile_filter(bound)));
    }
    let mut compiled = compiled.into_iter();
    let (start, stop, step) = match (compiled.next(), compiled.next(), compiled.next()) {
        (Some(stop), None, None) => (None, stop, None),
        (Some(start), Some(stop), None) => (Some(start), stop, None),
        (Some(start), Some(stop), Some(step)) if compiled.next().is_none() => {
            (Some(start), stop, Some(step))
        }
        _ => {
            return Err(syntax_error(
                "'range' tag requires one to three arguments and an optional 'as name'",
            ))
        }
    };
    let (body, _) = ok!(parse_body(parser, &["endrange"]));
    Ok(Box::new(RangeNode {
        start,
        stop,
        step,
        name: name.map(String::from),
        body,
    }))
}

/// The `regroup` tag.
#[derive(Debug)]
pub struct RegroupNode {
    target: FilterExpression,
    attr: Vec<String>,
    name: String,
}

impl Node for RegroupNode {
    fn render(&self, state: &mut State, _out: &mut Output) -> Result<(), Error> {
        let items = ok!(self.target.resolve(state))
            .try_iter()
            .unwrap_or_default();
        let mut groups: Vec<(Value, Vec<Value>)> = Vec::new();
        for item in items {
            let grouper = self
                .attr
                .iter()
                .fold(item.clone(), |value, segment| value.get_attr(segment));
            match groups.last_mut() {
                Some((last, list)) if *last == grouper => list.push(item),
                _ => groups.push((grouper, vec![item])),
            }
        }
        let rv: Value = groups
            .into_iter()
            .map(|(grouper, list)| {
                let mut map = ValueMap::new();
                map.insert("grouper".into(), grouper);
                map.insert("list".into(), Value::from(list));
                Value::from_map(map)
            })
            .collect();
        state.context_mut().insert(&self.name, rv);
        Ok(())
    }
}

/// `{% regroup people by gender as grouped %}`
pub fn parse_regroup(content: &str, parser: &mut Parser<'_>) -> Result<Box<dyn Node>, Error> {
    let words = smart_split(content);
    if words.len() != 6 {
        return Err(syntax_error("'regroup' tag takes five arguments"));
    }
    if words[2] != "by" {
        return Err(syntax_error(
            "second argument to 'regroup' tag must be 'by'",
        ));
    }
    if words[4] != "as" {
        return Err(syntax_error(
            "next-to-last argument to 'regroup' tag must be 'as'",
        ));
    }
    Ok(Box::new(RegroupNode {
        target: ok!(parser.compile_filter(words[1])),
        attr: words[3].split('.').map(String::from).collect(),
        name: words[5].to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use crate::environment::Environment;
    use crate::error::ErrorKind;
    use crate::runtime::Context;

    use similar_asserts::assert_eq;

    fn render(source: &str, ctx: serde_json::Value) -> String {
        let env = Environment::new();
        env.render_str(source, ctx).unwrap()
    }

    #[test]
    fn test_forloop_variables() {
        let rv = render(
            "{% for x in items %}{{ forloop.counter }}{{ forloop.revcounter0 }}{% if forloop.last %}!{% endif %} {% endfor %}",
            serde_json::json!({"items": ["a", "b", "c"]}),
        );
        assert_eq!(rv, "12 21 30! ");
    }

    #[test]
    fn test_parentloop() {
        let rv = render(
            "{% for a in outer %}{% for b in inner %}{{ forloop.parentloop.counter }}{{ b }},{% endfor %}{% endfor %}",
            serde_json::json!({"outer": [1, 2], "inner": ["x", "y"]}),
        );
        assert_eq!(rv, "1x,1y,2x,2y,");
    }

    #[test]
    fn test_unpacking_and_maps() {
        let ctx = serde_json::json!({"pairs": [[1, "a"], [2]], "map": {"k1": "v1", "k2": "v2"}});
        assert_eq!(
            render("{% for n, c in pairs %}{{ n }}{{ c }};{% endfor %}", ctx.clone()),
            "1a;2;"
        );
        assert_eq!(
            render("{% for k, v in map %}{{ k }}={{ v }} {% endfor %}", ctx.clone()),
            "k1=v1 k2=v2 "
        );
        assert_eq!(
            render("{% for x in pairs reversed %}{{ x.0 }}{% endfor %}", ctx),
            "21"
        );
    }

    #[test]
    fn test_empty_branch() {
        let ctx = serde_json::json!({"items": []});
        assert_eq!(
            render("{% for x in items %}{{ x }}{% empty %}none{% endfor %}", ctx.clone()),
            "none"
        );
        assert_eq!(
            render(
                "{% for x in items %}{{ x }}{% empty %}none{% endempty %}{% endfor %}",
                ctx.clone()
            ),
            "none"
        );
        assert_eq!(
            render("{% for x in missing %}{{ x }}{% empty %}none{% endempty %}", ctx),
            "none"
        );
    }

    #[test]
    fn test_loop_variables_do_not_leak() {
        let rv = render(
            "{% for x in items %}{{ x }}{% endfor %}[{{ x }}][{{ forloop.counter }}]",
            serde_json::json!({"items": [1, 2]}),
        );
        assert_eq!(rv, "12[][]");
    }

    #[test]
    fn test_for_errors() {
        let env = Environment::new();
        for (source, needle) in [
            ("{% for x in %}{% endfor %}", "at least four words"),
            ("{% for x of y %}{% endfor %}", "form 'for x in y'"),
            ("{% for x, in y %}{% endfor %}", "invalid argument"),
            ("{% for x in y %}", "Unclosed tag"),
        ] {
            let tmpl = env.new_template(source, "loop");
            assert!(tmpl.error_string().contains(needle), "{source}");
        }
    }

    #[test]
    fn test_cycle_across_renders() {
        let env = Environment::new();
        let tmpl = env.new_template("{% cycle 'a' 'b' 'c' %}", "cycle");
        let mut ctx = Context::new();
        let rv: Vec<String> = (0..4)
            .map(|_| tmpl.render_context(&mut ctx).unwrap())
            .collect();
        assert_eq!(rv, vec!["a", "b", "c", "a"]);
        assert_eq!(tmpl.render(()).unwrap(), "a");
    }

    #[test]
    fn test_cycle_forms() {
        let ctx = serde_json::json!({"items": [1, 2, 3]});
        assert_eq!(
            render("{% for x in items %}{% cycle odd,even %}{% endfor %}", ctx.clone()),
            "oddevenodd"
        );
        assert_eq!(
            render(
                "{% for x in items %}{% cycle 'r1' 'r2' as row %}[{{ row }}]{% endfor %}",
                ctx.clone()
            ),
            "r1[r1]r2[r2]r1[r1]"
        );
        assert_eq!(
            render(
                "{% cycle 'a' 'b' as c %}{% cycle c %}{% cycle c %}",
                ctx
            ),
            "aba"
        );
    }

    #[test]
    fn test_cycle_errors() {
        let env = Environment::new();
        let tmpl = env.new_template("{% cycle %}", "cycle");
        assert!(tmpl.error_string().contains("at least two arguments"));
        let tmpl = env.new_template("{% cycle nope %}", "cycle");
        assert!(tmpl.error_string().contains("No named cycles in template"));
        let tmpl = env.new_template("{% cycle 'a' 'b' as x %}{% cycle y %}", "cycle");
        assert_eq!(tmpl.error().unwrap().kind(), ErrorKind::TagSyntaxError);
        assert!(tmpl.error_string().contains("Node not found: y"));
    }

    #[test]
    fn test_range() {
        let ctx = serde_json::json!({"n": 3});
        assert_eq!(render("{% range n as i %}{{ i }}{% endrange %}", ctx.clone()), "012");
        assert_eq!(render("{% range 2 5 as i %}{{ i }}{% endrange %}", ctx.clone()), "234");
        assert_eq!(render("{% range 5 0 -2 as i %}{{ i }}{% endrange %}", ctx.clone()), "531");
        assert_eq!(render("{% range 2 %}x{% endrange %}", ctx), "xx");
    }

    #[test]
    fn test_range_stops_at_integer_bounds() {
        let ctx = serde_json::json!({"max": i64::MAX, "min": i64::MIN});
        assert_eq!(render("{% range 1 max max as i %}{{ i }};{% endrange %}", ctx.clone()), "1;");
        assert_eq!(render("{% range -1 min min as i %}{{ i }};{% endrange %}", ctx.clone()), "-1;");
        assert_eq!(
            render("{% range 9223372036854775806 max as i %}{{ i }};{% endrange %}", ctx),
            "9223372036854775806;"
        );
    }

    #[test]
    fn test_regroup() {
        let ctx = serde_json::json!({"people": [
            {"name": "Ann", "city": "Oslo"},
            {"name": "Bob", "city": "Oslo"},
            {"name": "Cid", "city": "Rome"},
        ]});
        let rv = render(
            "{% regroup people by city as groups %}{% for g in groups %}{{ g.grouper }}:{% for p in g.list %}{{ p.name }}{% endfor %};{% endfor %}",
            ctx,
        );
        assert_eq!(rv, "Oslo:AnnBob;Rome:Cid;");
    }
}
