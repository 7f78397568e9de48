use similar_asserts::assert_eq;

use minidtl::value::Value;
use minidtl::{context, Context, Environment, ErrorKind, InMemoryLoader};

fn create_env(templates: &[(&str, &str)]) -> Environment {
    let mut loader = InMemoryLoader::new();
    for (name, source) in templates {
        loader.add_template(*name, *source);
    }
    let mut env = Environment::new();
    env.add_loader(loader);
    env
}

#[test]
fn test_block_super() {
    let env = create_env(&[("parent", "{% block A %}p{% endblock %}")]);
    let tmpl = env.new_template(
        "{% extends 'parent' %}{% block A %}c{{ block.super }}c{% endblock %}",
        "child",
    );
    assert_eq!(tmpl.render(()).unwrap(), "cpc");
}

#[test]
fn test_unnamed_parent_blocks_render() {
    let env = create_env(&[(
        "base",
        "<title>{% block title %}Base{% endblock %}</title>{% block body %}empty{% endblock body %}",
    )]);
    let tmpl = env.new_template(
        "ignored text{% extends 'base' %}{% block body %}{{ x }}{% endblock %}also ignored",
        "child",
    );
    assert_eq!(
        tmpl.render(context! { x => "content" }).unwrap(),
        "<title>Base</title>content"
    );
}

#[test]
fn test_three_levels() {
    let env = create_env(&[
        ("base", "[{% block a %}base{% endblock %}|{% block b %}B{% endblock %}]"),
        (
            "middle",
            "{% extends 'base' %}{% block a %}middle({{ block.super }}){% endblock %}",
        ),
    ]);
    let tmpl = env.new_template(
        "{% extends 'middle' %}{% block a %}child({{ block.super }}){% endblock %}\
         {% block b %}{{ block.super }}{{ block.super }}{% endblock %}",
        "child",
    );
    assert_eq!(tmpl.render(()).unwrap(), "[child(middle(base))|BB]");

    let middle = env.get_template("middle").unwrap();
    assert_eq!(middle.render(()).unwrap(), "[middle(base)|B]");
}

#[test]
fn test_nested_blocks() {
    let env = create_env(&[(
        "base",
        "{% block outer %}<{% block inner %}i{% endblock %}>{% endblock %}",
    )]);
    let tmpl = env.new_template(
        "{% extends 'base' %}{% block inner %}I{% endblock %}",
        "child",
    );
    assert_eq!(tmpl.render(()).unwrap(), "<I>");
    let tmpl = env.new_template(
        "{% extends 'base' %}{% block outer %}[{{ block.super }}]{% endblock %}",
        "child2",
    );
    assert_eq!(tmpl.render(()).unwrap(), "[<i>]");
}

#[test]
fn test_block_super_without_parent_block() {
    let env = create_env(&[("base", "{% block a %}a{% endblock %}")]);
    let tmpl = env.new_template(
        "{% extends 'base' %}{% block a %}{{ block.super }}{% endblock %}{% block b %}{{ block.super }}x{% endblock %}",
        "child",
    );
    assert_eq!(tmpl.render(()).unwrap(), "a");
    let standalone = env.new_template("{% block b %}[{{ block.super }}]{% endblock %}", "s");
    assert_eq!(standalone.render(()).unwrap(), "[]");
}

#[test]
fn test_blocks_in_loops() {
    let env = create_env(&[(
        "base",
        "{% for i in items %}{% block item %}{{ i }}{% endblock %}{% endfor %}",
    )]);
    let tmpl = env.new_template(
        "{% extends 'base' %}{% block item %}<{{ block.super }}>{% endblock %}",
        "child",
    );
    assert_eq!(tmpl.render(context! { items => vec![1, 2] }).unwrap(), "<1><2>");
}

#[test]
fn test_rerender_is_stable() {
    let env = create_env(&[("base", "{% block a %}p{% endblock %}")]);
    let tmpl = env.new_template(
        "{% extends 'base' %}{% block a %}c{{ block.super }}{% endblock %}",
        "child",
    );
    let mut ctx = Context::new();
    for _ in 0..3 {
        assert_eq!(tmpl.render_context(&mut ctx).unwrap(), "cp");
    }
    assert!(ctx.render_context().block_context().is_empty());
}

#[test]
fn test_duplicate_block() {
    let env = Environment::new();
    let tmpl = env.new_template(
        "{% block a %}1{% endblock %}{% block a %}2{% endblock %}",
        "dup",
    );
    let err = tmpl.error().unwrap();
    assert_eq!(err.kind(), ErrorKind::TagSyntaxError);
    assert_eq!(
        err.detail(),
        Some("'block' tag with name 'a' appears more than once.")
    );

    let tmpl = env.new_template(
        "{% block a %}{% block a %}{% endblock %}{% endblock %}",
        "nested-dup",
    );
    assert_eq!(tmpl.error().unwrap().kind(), ErrorKind::TagSyntaxError);
}

#[test]
fn test_extends_must_be_first() {
    let env = create_env(&[("base", "")]);
    let tmpl = env.new_template("{{ x }}{% extends 'base' %}", "late");
    assert_eq!(tmpl.error().unwrap().kind(), ErrorKind::TagSyntaxError);

    let tmpl = env.new_template("{% extends 'base' %}{% extends 'base' %}", "twice");
    assert_eq!(tmpl.error().unwrap().kind(), ErrorKind::TagSyntaxError);
}

#[test]
fn test_missing_parent() {
    let env = Environment::new();
    let tmpl = env.new_template("{% extends 'nope.html' %}{% block a %}{% endblock %}", "child");
    assert!(tmpl.error().is_none());
    let err = tmpl.render(()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TagSyntaxError);
    assert_eq!(err.detail(), Some("Template not found nope.html"));
    assert_eq!(err.name(), Some("child"));
    assert_eq!(err.line(), Some(1));
    assert!(!tmpl.error_string().is_empty());
}

#[test]
fn test_broken_parent() {
    let env = create_env(&[("base", "{% for %}")]);
    let tmpl = env.new_template("{% extends 'base' %}", "child");
    let err = tmpl.render(()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TagSyntaxError);
    assert_eq!(err.name(), Some("base"));
}

#[test]
fn test_extends_variable() {
    let env = create_env(&[
        ("a", "A{% block x %}{% endblock %}"),
        ("b", "B{% block x %}{% endblock %}"),
    ]);
    let tmpl = env.new_template("{% extends layout %}{% block x %}!{% endblock %}", "child");
    assert_eq!(tmpl.render(context! { layout => "a" }).unwrap(), "A!");
    assert_eq!(tmpl.render(context! { layout => "b" }).unwrap(), "B!");

    let parent = env.new_template("<{% block x %}{% endblock %}>", "inline");
    assert_eq!(
        tmpl.render(context! { layout => Value::from_template(&parent) })
            .unwrap(),
        "<!>"
    );
}

#[test]
fn test_endblock_name() {
    let env = Environment::new();
    let tmpl = env.new_template("{% block a %}{% endblock a %}", "ok");
    assert!(tmpl.error().is_none());
    let tmpl = env.new_template("{% block a %}{% endblock b %}", "bad");
    let err = tmpl.error().unwrap();
    assert_eq!(err.kind(), ErrorKind::InvalidBlockTagError);
    assert!(err.to_string().contains("endblock a"));
}

#[test]
fn test_include() {
    let env = create_env(&[
        ("header", "<h1>{{ title }}</h1>"),
        ("row", "{% for x in row %}{{ x }}{% endfor %};"),
    ]);
    let tmpl = env.new_template(
        "{% include 'header' %}{% for row in rows %}{% include 'row' %}{% endfor %}",
        "page",
    );
    assert_eq!(
        tmpl.render(context! { title => "Hi", rows => vec![vec![1, 2], vec![3]] })
            .unwrap(),
        "<h1>Hi</h1>12;3;"
    );
}

#[test]
fn test_include_missing_is_soft() {
    let env = Environment::new();
    let rv = env.render_str("a{% include 'missing' %}b", ()).unwrap();
    assert_eq!(rv, "ab");
    let rv = env
        .render_str("a{% include name %}b", context! { name => "missing" })
        .unwrap();
    assert_eq!(rv, "ab");
}

#[test]
fn test_include_errors_propagate() {
    let env = create_env(&[("broken", "{% if %}")]);
    let err = env.render_str("{% include 'broken' %}", ()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TagSyntaxError);
}

#[test]
fn test_include_with_inheritance() {
    let env = create_env(&[
        ("base", "[{% block a %}base{% endblock %}]"),
        ("widget", "{% extends 'base' %}{% block a %}widget{% endblock %}"),
    ]);
    let tmpl = env.new_template(
        "{% extends 'base' %}{% block a %}page {% include 'widget' %}{% endblock %}",
        "page",
    );
    assert_eq!(tmpl.render(()).unwrap(), "[page [widget]]");
}

#[test]
fn test_recursion_limit() {
    let mut env = create_env(&[
        ("loop", "{% include 'loop' %}"),
        ("a", "{% extends 'b' %}"),
        ("b", "{% extends 'a' %}"),
    ]);
    env.set_max_include_depth(10);
    let err = env.get_template("loop").unwrap().render(()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RecursionLimit);
    let err = env.get_template("a").unwrap().render(()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RecursionLimit);
}

#[test]
fn test_ssi() {
    let env = create_env(&[("snippet", "{{ x }} <b>")]);
    assert_eq!(
        env.render_str("{% ssi snippet %}", context! { x => 1 }).unwrap(),
        "{{ x }} <b>"
    );
    assert_eq!(
        env.render_str("{% ssi \"snippet\" parsed %}", context! { x => 1 })
            .unwrap(),
        "1 <b>"
    );
    assert_eq!(env.render_str("<{% ssi nothing %}>", ()).unwrap(), "<>");
    let tmpl = env.new_template("{% ssi %}", "bad");
    assert_eq!(tmpl.error().unwrap().kind(), ErrorKind::TagSyntaxError);
}
