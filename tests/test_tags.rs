use similar_asserts::assert_eq;

use minidtl::value::Value;
use minidtl::{
    context, Context, Environment, Error, ErrorKind, Library, Node, NodeId, NodeList, Output,
    Parser, State,
};

#[derive(Debug)]
struct CounterNode {
    id: NodeId,
}

impl Node for CounterNode {
    fn render(&self, state: &mut State, out: &mut Output) -> Result<(), Error> {
        let key = self.id;
        let next = state
            .render_context_mut()
            .get(key)
            .and_then(|x| x.as_i64())
            .unwrap_or(0)
            + 1;
        state.render_context_mut().insert(key, Value::from(next));
        write!(out, "{next}").map_err(Error::from)
    }
}

fn parse_counter(_content: &str, _parser: &mut Parser<'_>) -> Result<Box<dyn Node>, Error> {
    Ok(Box::new(CounterNode { id: NodeId::new() }))
}

#[derive(Debug)]
struct RepeatNode {
    times: usize,
    body: NodeList,
}

impl Node for RepeatNode {
    fn render(&self, state: &mut State, out: &mut Output) -> Result<(), Error> {
        for _ in 0..self.times {
            self.body.render(state, out)?;
        }
        Ok(())
    }
}

fn parse_repeat(content: &str, parser: &mut Parser<'_>) -> Result<Box<dyn Node>, Error> {
    let times = content
        .split_whitespace()
        .nth(1)
        .and_then(|x| x.parse().ok())
        .ok_or_else(|| Error::new(ErrorKind::TagSyntaxError, "repeat takes a count"))?;
    let body = parser.parse_until(&["endrepeat"])?;
    parser.expect_end_tag(&["endrepeat"])?;
    Ok(Box::new(RepeatNode { times, body }))
}

#[test]
fn test_custom_tags() {
    let mut env = Environment::new();
    env.add_tag("counter", parse_counter);
    env.add_tag("repeat", parse_repeat);

    let tmpl = env.new_template("{% repeat 3 %}[{% counter %}]{% endrepeat %}", "custom");
    assert_eq!(tmpl.render(()).unwrap(), "[1][2][3]");

    let mut ctx = Context::new();
    assert_eq!(tmpl.render_context(&mut ctx).unwrap(), "[1][2][3]");
    assert_eq!(tmpl.render_context(&mut ctx).unwrap(), "[4][5][6]");

    let tmpl = env.new_template("{% repeat many %}x{% endrepeat %}", "bad");
    assert_eq!(tmpl.error().unwrap().kind(), ErrorKind::TagSyntaxError);
    let tmpl = env.new_template("{% repeat 2 %}x", "unclosed");
    assert_eq!(
        tmpl.error().unwrap().kind(),
        ErrorKind::UnclosedBlockTagError
    );
}

#[test]
fn test_tag_library_requires_load() {
    let mut env = Environment::new();
    let mut lib = Library::new();
    lib.add_tag("counter", parse_counter);
    assert!(lib.has_tag("counter"));
    env.add_library("counting", lib, false);

    let tmpl = env.new_template("{% counter %}", "unloaded");
    assert_eq!(tmpl.error().unwrap().kind(), ErrorKind::InvalidBlockTagError);
    let tmpl = env.new_template("{% load counting %}{% counter %}{% counter %}", "loaded");
    assert_eq!(tmpl.render(()).unwrap(), "11");
}

#[test]
fn test_nested_loops_with_cycle_and_ifchanged() {
    let ctx = context! {
        rows => vec![vec!["a", "a", "b"], vec!["b", "b"]],
    };
    let env = Environment::new();
    let rv = env
        .render_str(
            "{% for row in rows %}<{% cycle 'odd' 'even' %}>\
             {% for x in row %}{% ifchanged %}{{ x }}{% endifchanged %}{% endfor %}\
             {% endfor %}",
            &ctx,
        )
        .unwrap();
    // ifchanged starts over in each run of the inner loop
    assert_eq!(rv, "<odd>ab<even>b");
}

#[test]
fn test_ifchanged_with_arguments_and_else() {
    let ctx = context! {
        days => vec![
            context! { month => "Jan", day => 1 },
            context! { month => "Jan", day => 2 },
            context! { month => "Feb", day => 1 },
        ],
    };
    let env = Environment::new();
    let rv = env
        .render_str(
            "{% for d in days %}{% ifchanged d.month %}{{ d.month }}:{% else %},{% endifchanged %}{{ d.day }}{% endfor %}",
            &ctx,
        )
        .unwrap();
    assert_eq!(rv, "Jan:1,2Feb:1");
}

#[test]
fn test_named_cycle_in_loop() {
    let env = Environment::new();
    let rv = env
        .render_str(
            "{% for x in items %}{% cycle 'a' 'b' 'c' as c %}{% cycle c %};{% endfor %}",
            context! { items => vec![1, 2] },
        )
        .unwrap();
    assert_eq!(rv, "ab;ca;");
}

#[test]
fn test_with_and_filters() {
    let env = Environment::new();
    let ctx = context! { user => context! { name => "ann lee", tags => vec!["x", "y"] } };
    assert_eq!(
        env.render_str(
            "{% with user.name|title as n %}{% with count=user.tags|length %}{{ n }} ({{ count }}){% endwith %}{% endwith %}",
            &ctx
        )
        .unwrap(),
        "Ann Lee (2)"
    );
    let tmpl = env.new_template("{% with x %}{% endwith %}", "bad");
    assert_eq!(tmpl.error().unwrap().kind(), ErrorKind::TagSyntaxError);
}

#[test]
fn test_regroup_sorted() {
    let env = Environment::new();
    let ctx = context! {
        cities => vec![
            context! { name => "Mumbai", country => "India" },
            context! { name => "New York", country => "USA" },
            context! { name => "Calcutta", country => "India" },
        ],
    };
    let rv = env
        .render_str(
            "{% regroup cities|dictsort:'country' by country as groups %}\
             {% for g in groups %}{{ g.grouper }}={{ g.list|length }};{% endfor %}",
            &ctx,
        )
        .unwrap();
    assert_eq!(rv, "India=2;USA=1;");
}

#[test]
fn test_filter_and_spaceless() {
    let env = Environment::new();
    assert_eq!(
        env.render_str(
            "{% filter upper|cut:' ' %}a b {{ x }}{% endfilter %}",
            context! { x => "c d" }
        )
        .unwrap(),
        "ABCD"
    );
    assert_eq!(
        env.render_str(
            "{% spaceless %}<p>\n  <a>{{ x }}</a>\n</p>{% endspaceless %}",
            context! { x => "y z" }
        )
        .unwrap(),
        "<p><a>y z</a></p>"
    );
}

#[test]
fn test_range_and_widthratio() {
    let env = Environment::new();
    assert_eq!(
        env.render_str(
            "{% range 1 n as i %}{% widthratio i n 10 %} {% endrange %}",
            context! { n => 4 }
        )
        .unwrap(),
        "3 5 8 "
    );
}

#[test]
fn test_templatetag() {
    let env = Environment::new();
    assert_eq!(
        env.render_str(
            "{% templatetag openvariable %} x {% templatetag closevariable %}{% templatetag opencomment %}",
            ()
        )
        .unwrap(),
        "{{ x }}{#"
    );
    let tmpl = env.new_template("{% templatetag nope %}", "bad");
    assert_eq!(tmpl.error().unwrap().kind(), ErrorKind::TagSyntaxError);
}

#[test]
fn test_debug_escapes() {
    let env = Environment::new();
    let rv = env
        .render_str("{% with b='<b>' %}{% debug %}{% endwith %}", context! { a => 1 })
        .unwrap();
    assert_eq!(rv, "Context:\n0 a (number): 1\n1 b (string): &lt;b&gt;\n");
}

#[test]
fn test_comparisons_with_missing_values() {
    let env = Environment::new();
    let ctx = context! { n => 1 };
    for (cond, expected) in [
        ("missing == none_var", "y"),
        ("missing > 0", "n"),
        ("missing < 0", "n"),
        ("n != missing", "y"),
        ("n in missing", "n"),
        ("not missing", "y"),
    ] {
        let source = format!("{{% if {cond} %}}y{{% else %}}n{{% endif %}}");
        assert_eq!(env.render_str(&source, &ctx).unwrap(), expected, "{cond}");
    }
}
