use std::fmt::Write;

use similar_asserts::assert_eq;

use minidtl::{tokenize, ErrorKind, TokenKind};

fn stringify(source: &str) -> String {
    let mut rv = String::new();
    for token in tokenize(source, "lexer.txt").unwrap() {
        writeln!(rv, "{:?}@{} {:?}", token.kind, token.line, token.content).unwrap();
    }
    rv
}

#[test]
fn test_mixed_markup() {
    insta::assert_snapshot!(stringify("<ul>\n{% for item in items %}\n  <li>{{ item|upper }}</li>{# note #}\n{% endfor %}\n</ul>"), @r###"
    Text@1 "<ul>\n"
    Block@2 "for item in items"
    Text@2 "\n  <li>"
    Variable@3 "item|upper"
    Text@3 "</li>"
    Comment@3 "note"
    Text@3 "\n"
    Block@4 "endfor"
    Text@4 "\n</ul>"
    "###);
}

#[test]
fn test_whitespace_inside_markup() {
    insta::assert_snapshot!(stringify("{{x}}{{   spaced   }}{%\nif x\n%}"), @r###"
    Variable@1 "x"
    Variable@1 "spaced"
    Block@1 "if x"
    "###);
}

#[test]
fn test_literal_text_roundtrip() {
    let source = "  keep {braces} and % signs #\n\n\ttabs  ";
    let tokens = tokenize(source, "lexer.txt").unwrap();
    assert_eq!(tokens.len(), 1);
    assert_eq!(tokens[0].kind, TokenKind::Text);
    assert_eq!(tokens[0].content, source);

    let source = "a {{ b }} c {% d %} e";
    let rebuilt: String = tokenize(source, "lexer.txt")
        .unwrap()
        .iter()
        .map(|x| x.to_string())
        .collect();
    assert_eq!(rebuilt, source);
}

#[test]
fn test_unterminated_markup() {
    for (source, detail) in [
        ("{{ x", "unterminated variable tag"),
        ("text {% if", "unterminated block tag"),
        ("{# comment", "unterminated comment tag"),
        ("{{ x {% y %}", "unterminated variable tag"),
        ("{% if x }}", "unterminated block tag"),
    ] {
        let err = tokenize(source, "lexer.txt").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TagSyntaxError);
        assert_eq!(err.detail(), Some(detail), "{source}");
        assert_eq!(err.name(), Some("lexer.txt"));
    }
}
