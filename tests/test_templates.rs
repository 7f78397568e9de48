use std::collections::BTreeMap;

use similar_asserts::assert_eq;

use minidtl::value::Value;
use minidtl::{context, render, Context, Environment, ErrorKind, UndefinedBehavior};

#[test]
fn test_literal_text_is_identity() {
    let env = Environment::new();
    for source in [
        "",
        "Hello World",
        "  leading and trailing  \n",
        "<p>a & b</p>\r\n\tline two",
        "braces { } %} #} }} without markup",
        "unicode: ünïcödé ✓",
    ] {
        let tmpl = env.new_template(source, "literal");
        assert!(tmpl.error().is_none());
        assert_eq!(tmpl.render(context! { x => 1 }).unwrap(), source);
    }
}

#[test]
fn test_missing_variable_renders_empty() {
    let env = Environment::new();
    let tmpl = env.new_template("[{{ x }}][{{ x.y.z }}][{{ x|upper }}]", "missing");
    assert_eq!(tmpl.render(()).unwrap(), "[][][]");
    assert!(tmpl.error().is_none());
    assert_eq!(tmpl.error_string(), "");
}

#[test]
fn test_filter_chain_order() {
    assert_eq!(render!(r#"{{ "AbC"|upper|lower }}"#), "abc");
    assert_eq!(render!(r#"{{ "AbC"|lower|upper }}"#), "ABC");
    assert_eq!(
        render!(r#"{{ "a b"|cut:" "|capfirst }}"#),
        "Ab"
    );
    assert_eq!(
        render!(r#"{{ "a b"|capfirst|cut:" " }}"#),
        "Ab"
    );
    assert_eq!(render!(r#"{{ value|default:"x"|length }}"#), "1");
    assert_eq!(render!(r#"{{ value|length|default:"x" }}"#), "x");
}

#[test]
fn test_for_and_empty() {
    let env = Environment::new();
    let tmpl = env.new_template("{% for i in items %}{{ i }}{% endfor %}", "for");
    assert_eq!(tmpl.render(context! { items => vec![1, 2, 3] }).unwrap(), "123");

    let tmpl = env.new_template(
        "{% for i in items %}{{ i }}{% empty %}nothing{% endempty %}",
        "empty",
    );
    assert_eq!(tmpl.render(context! { items => Vec::<i32>::new() }).unwrap(), "nothing");
    assert_eq!(tmpl.render(context! { items => vec![1, 2] }).unwrap(), "12");

    let tmpl = env.new_template(
        "{% for i in items %}{{ i }}{% empty %}nothing{% endfor %}",
        "empty2",
    );
    assert_eq!(tmpl.render(context! {}).unwrap(), "nothing");
}

#[test]
fn test_cycle_wraps_across_renders() {
    let env = Environment::new();
    let tmpl = env.new_template(r#"{% cycle "a" "b" "c" %}"#, "cycle");
    let mut ctx = Context::new();
    let rv: Vec<String> = (0..4)
        .map(|_| tmpl.render_context(&mut ctx).unwrap())
        .collect();
    assert_eq!(rv, ["a", "b", "c", "a"]);

    // a fresh context starts over
    assert_eq!(tmpl.render(()).unwrap(), "a");
}

#[test]
fn test_ifchanged_across_renders() {
    let env = Environment::new();
    let tmpl = env.new_template("{% ifchanged %}{{ x }}{% endifchanged %}", "ifchanged");
    let mut ctx = Context::new();
    let mut rv = Vec::new();
    for x in [1, 1, 2] {
        ctx.insert("x", x);
        rv.push(tmpl.render_context(&mut ctx).unwrap());
    }
    assert_eq!(rv, ["1", "", "2"]);
}

#[test]
fn test_ifchanged_in_loop() {
    let rv = render!(
        "{% for x in items %}{% ifchanged %}[{{ x }}]{% endifchanged %}{% endfor %}",
        items => vec![1, 1, 2, 2, 1]
    );
    assert_eq!(rv, "[1][2][1]");
}

#[test]
fn test_independent_templates_do_not_share_state() {
    let env = Environment::new();
    let source = "{% cycle 'a' 'b' %}";
    let first = env.new_template(source, "one");
    let second = env.new_template(source, "two");
    let mut ctx = Context::new();
    assert_eq!(first.render_context(&mut ctx).unwrap(), "a");
    assert_eq!(second.render_context(&mut ctx).unwrap(), "a");
    assert_eq!(first.render_context(&mut ctx).unwrap(), "b");
    assert_eq!(second.render_context(&mut ctx).unwrap(), "b");
}

#[test]
fn test_recompiled_templates_start_fresh() {
    let env = Environment::new();
    let mut ctx = Context::new();
    let mut rv = Vec::new();
    for _ in 0..4 {
        let tmpl = env.new_template("{% cycle 'a' 'b' 'c' %}", "t");
        rv.push(tmpl.render_context(&mut ctx).unwrap());
        drop(tmpl);
    }
    assert_eq!(rv, ["a", "a", "a", "a"]);
}

#[test]
fn test_include_state_follows_compilation() {
    let source = "{% for x in items %}{% include 'row' %}{% endfor %}";
    let ctx = context! { items => vec![1, 2, 3] };

    // every render of an uncached include compiles new nodes
    let mut loader = minidtl::InMemoryLoader::new();
    loader.add_template("row", "{% cycle 'a' 'b' %}");
    let mut env = Environment::new();
    env.add_loader(loader);
    assert_eq!(env.render_str(source, &ctx).unwrap(), "aaa");

    // a cached include keeps rendering the same nodes
    let mut loader = minidtl::InMemoryLoader::new();
    loader.add_template("row", "{% cycle 'a' 'b' %}");
    let mut env = Environment::new();
    env.add_loader(minidtl::CachingLoaderDecorator::new(loader));
    assert_eq!(env.render_str(source, &ctx).unwrap(), "aba");
}

#[test]
fn test_determinism() {
    let env = Environment::new();
    let source = "{% for k, v in data.items %}{{ forloop.counter }}:{{ k|upper }}={{ v|default:'-' }};{% endfor %}\
                  {% if data.b > 1 and not missing %}big{% else %}small{% endif %}";
    let a = env.new_template(source, "a");
    let b = env.new_template(source, "b");
    let mut data = BTreeMap::new();
    data.insert("a", 0);
    data.insert("b", 2);
    data.insert("c", 3);
    let ctx = context! { data };
    let rv = a.render(&ctx).unwrap();
    assert_eq!(rv, b.render(&ctx).unwrap());
    assert_eq!(rv, a.render(&ctx).unwrap());
    assert_eq!(rv, "1:A=-;2:B=2;3:C=3;big");
}

#[test]
fn test_malformed_if() {
    let env = Environment::new();
    let tmpl = env.new_template("{% if %}", "broken");
    let err = tmpl.error().unwrap();
    assert_eq!(err.kind(), ErrorKind::TagSyntaxError);
    assert!(!tmpl.error_string().is_empty());

    let err = tmpl.render(()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TagSyntaxError);
    assert!(!tmpl.error_string().is_empty());
}

#[test]
fn test_render_error_is_recorded() {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    let tmpl = env.new_template("a{{ missing }}b", "strict");
    let err = tmpl.render(()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UndefinedError);
    assert_eq!(tmpl.error().map(|x| x.kind()), Some(ErrorKind::UndefinedError));
    assert_eq!(tmpl.render(context! { missing => 1 }).unwrap(), "a1b");
    assert!(tmpl.error().is_none());
}

#[test]
fn test_strict_undefined_in_conditions() {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    let rv = env
        .render_str("{% if missing %}yes{% else %}no{% endif %}", ())
        .unwrap();
    assert_eq!(rv, "no");
}

#[test]
fn test_lookups() {
    #[derive(serde::Serialize)]
    struct User {
        name: &'static str,
        groups: Vec<&'static str>,
    }

    let ctx = context! {
        user => User { name: "peter", groups: vec!["admin", "staff"] },
    };
    let env = Environment::new();
    assert_eq!(
        env.render_str(
            "{{ user.name.upper }} {{ user.groups.1 }} {{ user.groups.size }} {{ user.groups.9 }}",
            &ctx
        )
        .unwrap(),
        "PETER staff 2 "
    );
    assert_eq!(
        env.render_str("{{ user.name.capitalize }}|{{ user.name.isalpha }}", &ctx)
            .unwrap(),
        "Peter|true"
    );
}

#[test]
fn test_autoescape() {
    let env = Environment::new();
    let ctx = context! { html => "<b>&" };
    assert_eq!(env.render_str("{{ html }}", &ctx).unwrap(), "&lt;b&gt;&amp;");
    assert_eq!(env.render_str("{{ html|safe }}", &ctx).unwrap(), "<b>&");
    assert_eq!(env.render_str("{{ '<i>' }}", &ctx).unwrap(), "<i>");
    assert_eq!(
        env.render_str("{% autoescape off %}{{ html }}{% endautoescape %}", &ctx)
            .unwrap(),
        "<b>&"
    );
    assert_eq!(
        env.render_str("{% autoescape off %}{{ html|escape }}{% endautoescape %}", &ctx)
            .unwrap(),
        "&lt;b&gt;&amp;"
    );

    let mut env = Environment::new();
    env.set_autoescape_default(false);
    assert_eq!(env.render_str("{{ html }}", &ctx).unwrap(), "<b>&");
}

#[test]
fn test_safe_filters_keep_safety() {
    let env = Environment::new();
    let ctx = context! { html => "<B>" };
    // lower is a safe filter: safe input stays safe
    assert_eq!(env.render_str("{{ html|safe|lower }}", &ctx).unwrap(), "<b>");
    // cut is not: the output is escaped again
    assert_eq!(env.render_str("{{ html|safe|cut:'x' }}", &ctx).unwrap(), "&lt;B&gt;");
}

#[test]
fn test_render_to_write() {
    let env = Environment::new();
    let tmpl = env.new_template("{{ a }}-{{ b }}", "write");
    let mut buf = Vec::new();
    tmpl.render_to_write(context! { a => 1, b => "x" }, &mut buf)
        .unwrap();
    assert_eq!(String::from_utf8(buf).unwrap(), "1-x");
}

#[test]
fn test_json_context() {
    let ctx: serde_json::Value = serde_json::from_str(
        r#"{"items": [{"name": "a", "tags": ["x"]}, {"name": "b", "tags": []}]}"#,
    )
    .unwrap();
    let rv = render!(
        "{% for item in items %}{{ item.name }}:{{ item.tags|length }}{% if not forloop.last %},{% endif %}{% endfor %}",
        items => ctx["items"]
    );
    assert_eq!(rv, "a:1,b:0");
}

#[test]
fn test_value_from_template() {
    let env = Environment::new();
    let part = env.new_template("[{{ x }}]", "part");
    let rv = env
        .render_str(
            "{% include part %}",
            context! { part => Value::from_template(&part), x => 42 },
        )
        .unwrap();
    assert_eq!(rv, "[42]");
}

#[test]
fn test_mutable_template() {
    let env = Environment::new();
    let tmpl = env.new_mutable_template(
        "{% load mutabletags %}{{ a }}|{% raw %}{{ b }}{% endraw %}|{% cycle 'x' 'y' %}",
        "mutable",
    );
    assert_eq!(tmpl.render(context! { a => 1, b => 2 }).unwrap(), "1|2|x");
    assert_eq!(tmpl.render(context! { a => 3, b => 4 }).unwrap(), "1|4|x");
    assert!(tmpl.error().is_none());

    let plain = env.new_template(
        "{% load mutabletags %}{{ a }}|{% raw %}{{ b }}{% endraw %}|{% cycle 'x' 'y' %}",
        "plain",
    );
    assert_eq!(plain.render(context! { a => 1, b => 2 }).unwrap(), "1|2|x");
}
