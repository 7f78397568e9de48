//! `if`, `ifequal`, `ifnotequal`, `ifchanged` and `firstof`.
use std::fmt;

use crate::compiler::parser::Parser;
use crate::error::Error;
use crate::expression::FilterExpression;
use crate::nodes::{Node, NodeId, NodeList};
use crate::output::Output;
use crate::runtime::State;
use crate::tags::{parse_body, syntax_error, tag_args};
use crate::utils::{smart_split, write_escaped};
use crate::value::{ops, Value, ValueMap};

/// An operator of an `if` expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// `or`
    Or,
    /// `and`
    And,
    /// `not`
    Not,
    /// `in`
    In,
    /// `not in`
    NotIn,
    /// `==` (or `=`)
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `>`
    Gt,
    /// `<=`
    Le,
    /// `>=`
    Ge,
}

impl Operator {
    fn from_word(word: &str) -> Option<Operator> {
        Some(match word {
            "or" => Operator::Or,
            "and" => Operator::And,
            "not" => Operator::Not,
            "in" => Operator::In,
            "==" | "=" => Operator::Eq,
            "!=" => Operator::Ne,
            "<" => Operator::Lt,
            ">" => Operator::Gt,
            "<=" => Operator::Le,
            ">=" => Operator::Ge,
            _ => return None,
        })
    }

    fn binding_power(self) -> u8 {
        match self {
            Operator::Or => 6,
            Operator::And => 7,
            Operator::Not => 8,
            Operator::In | Operator::NotIn => 9,
            _ => 10,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Operator::Or => "or",
            Operator::And => "and",
            Operator::Not => "not",
            Operator::In => "in",
            Operator::NotIn => "not in",
            Operator::Eq => "==",
            Operator::Ne => "!=",
            Operator::Lt => "<",
            Operator::Gt => ">",
            Operator::Le => "<=",
            Operator::Ge => ">=",
        }
    }
}

/// A compiled `if` condition.
#[derive(Debug)]
pub enum Condition {
    /// A filter expression.
    Operand(FilterExpression),
    /// A negated condition.
    Not(Box<Condition>),
    /// A binary operator with its operands.
    Binary(Operator, Box<Condition>, Box<Condition>),
}

impl Condition {
    fn eval(&self, state: &mut State) -> Value {
        match self {
            Condition::Operand(expr) => expr.resolve(state).unwrap_or(Value::UNDEFINED),
            Condition::Not(inner) => Value::from(!inner.eval(state).is_true()),
            Condition::Binary(op, lhs, rhs) => Value::from(match op {
                Operator::Or => lhs.eval(state).is_true() || rhs.eval(state).is_true(),
                Operator::And => lhs.eval(state).is_true() && rhs.eval(state).is_true(),
                _ => {
                    let lhs = lhs.eval(state);
                    let rhs = rhs.eval(state);
                    compare(*op, &lhs, &rhs)
                }
            }),
        }
    }

    /// Evaluates the condition.  Failing lookups and filters are false.
    pub fn is_true(&self, state: &mut State) -> bool {
        self.eval(state).is_true()
    }
}

fn compare(op: Operator, lhs: &Value, rhs: &Value) -> bool {
    use std::cmp::Ordering::*;
    let unordered = |x: &Value| x.is_undefined() || x.is_none();
    if matches!(op, Operator::Lt | Operator::Gt | Operator::Le | Operator::Ge)
        && (unordered(lhs) || unordered(rhs))
    {
        return false;
    }
    match op {
        Operator::In => ops::contains(rhs, lhs),
        Operator::NotIn => !ops::contains(rhs, lhs),
        Operator::Eq => ops::equals(lhs, rhs),
        Operator::Ne => !ops::equals(lhs, rhs),
        Operator::Lt => ops::compare(lhs, rhs) == Some(Less),
        Operator::Gt => ops::compare(lhs, rhs) == Some(Greater),
        Operator::Le => matches!(ops::compare(lhs, rhs), Some(Less | Equal)),
        Operator::Ge => matches!(ops::compare(lhs, rhs), Some(Greater | Equal)),
        Operator::Or | Operator::And | Operator::Not => false,
    }
}

enum Item<'s> {
    Op(Operator),
    Operand(&'s str),
}

impl fmt::Display for Item<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Item::Op(op) => f.write_str(op.as_str()),
            Item::Operand(s) => f.write_str(s),
        }
    }
}

/// A top down operator precedence parser for `if` expressions.
struct ConditionParser<'s, 'p, 'a> {
    items: Vec<Item<'s>>,
    pos: usize,
    parser: &'p Parser<'a>,
}

impl<'s, 'p, 'a> ConditionParser<'s, 'p, 'a> {
    fn new(words: Vec<&'s str>, parser: &'p Parser<'a>) -> Self {
        let mut items = Vec::with_capacity(words.len());
        let mut iter = words.into_iter().peekable();
        while let Some(word) = iter.next() {
            if word == "not" && iter.peek() == Some(&"in") {
                iter.next();
                items.push(Item::Op(Operator::NotIn));
            } else if let Some(op) = Operator::from_word(word) {
                items.push(Item::Op(op));
            } else {
                items.push(Item::Operand(word));
            }
        }
        ConditionParser {
            items,
            pos: 0,
            parser,
        }
    }

    fn peek_power(&self) -> u8 {
        match self.items.get(self.pos) {
            Some(Item::Op(op)) => op.binding_power(),
            Some(Item::Operand(_)) | None => 0,
        }
    }

    fn parse(mut self) -> Result<Condition, Error> {
        let rv = ok!(self.expression(0));
        match self.items.get(self.pos) {
            Some(item) => Err(syntax_error(format!(
                "Unused '{item}' at end of if expression."
            ))),
            None => Ok(rv),
        }
    }

    fn expression(&mut self, rbp: u8) -> Result<Condition, Error> {
        let mut left = match self.items.get(self.pos) {
            Some(Item::Operand(expr)) => {
                self.pos += 1;
                Condition::Operand(ok!(self.parser.compile_filter(expr)))
            }
            Some(Item::Op(Operator::Not)) => {
                self.pos += 1;
                Condition::Not(Box::new(ok!(self.expression(Operator::Not.binding_power()))))
            }
            Some(item) => {
                return Err(syntax_error(format!(
                    "Not expecting '{item}' in this position in if tag."
                )))
            }
            None => return Err(syntax_error("Unexpected end of expression in if tag.")),
        };
        while rbp < self.peek_power() {
            let op = match self.items.get(self.pos) {
                Some(Item::Op(op)) if *op != Operator::Not => *op,
                Some(item) => {
                    return Err(syntax_error(format!(
                        "Not expecting '{item}' as infix operator in if tag."
                    )))
                }
                None => break,
            };
            self.pos += 1;
            let right = ok!(self.expression(op.binding_power()));
            left = Condition::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }
}

/// Compiles the arguments of an `if` or `elif` tag.
pub fn parse_condition(args: &str, parser: &Parser<'_>) -> Result<Condition, Error> {
    let words = smart_split(args);
    if words.is_empty() {
        return Err(syntax_error("'if' statement requires at least one argument"));
    }
    ConditionParser::new(words, parser).parse()
}

/// The `if` tag with its `elif` and `else` branches.
#[derive(Debug)]
pub struct IfNode {
    branches: Vec<(Option<Condition>, NodeList)>,
}

impl Node for IfNode {
    fn render(&self, state: &mut State, out: &mut Output) -> Result<(), Error> {
        for (condition, body) in &self.branches {
            let matches = match condition {
                Some(condition) => condition.is_true(state),
                None => true,
            };
            if matches {
                return body.render(state, out);
            }
        }
        Ok(())
    }
}

/// `{% if cond %} ... {% elif cond %} ... {% else %} ... {% endif %}`
pub fn parse_if(content: &str, parser: &mut Parser<'_>) -> Result<Box<dyn Node>, Error> {
    let mut branches = Vec::new();
    let mut condition = Some(ok!(parse_condition(tag_args(content), parser)));
    loop {
        let body = ok!(parser.parse_until(&["elif", "else", "endif"]));
        let token = ok!(parser.expect_end_tag(&["elif", "else", "endif"]));
        branches.push((condition.take(), body));
        match token.tag_name() {
            "elif" => condition = Some(ok!(parse_condition(tag_args(token.content), parser))),
            "else" => {
                let (body, _) = ok!(parse_body(parser, &["endif"]));
                branches.push((None, body));
                break;
            }
            _ => break,
        }
    }
    Ok(Box::new(IfNode { branches }))
}

/// `ifequal` and `ifnotequal`.
#[derive(Debug)]
pub struct IfEqualNode {
    lhs: FilterExpression,
    rhs: FilterExpression,
    negate: bool,
    body: NodeList,
    else_body: NodeList,
}

impl Node for IfEqualNode {
    fn render(&self, state: &mut State, out: &mut Output) -> Result<(), Error> {
        let lhs = self.lhs.resolve(state).unwrap_or(Value::UNDEFINED);
        let rhs = self.rhs.resolve(state).unwrap_or(Value::UNDEFINED);
        if ops::equals(&lhs, &rhs) != self.negate {
            self.body.render(state, out)
        } else {
            self.else_body.render(state, out)
        }
    }
}

fn parse_ifequal_impl(
    content: &str,
    parser: &mut Parser<'_>,
    negate: bool,
) -> Result<Box<dyn Node>, Error> {
    let words = smart_split(content);
    if words.len() != 3 {
        return Err(syntax_error(format!("{} takes two arguments", words[0])));
    }
    let end_tag = format!("end{}", words[0]);
    let lhs = ok!(parser.compile_filter(words[1]));
    let rhs = ok!(parser.compile_filter(words[2]));
    let (body, end) = ok!(parse_body(parser, &["else", end_tag.as_str()]));
    let else_body = if end == "else" {
        ok!(parse_body(parser, &[end_tag.as_str()])).0
    } else {
        NodeList::default()
    };
    Ok(Box::new(IfEqualNode {
        lhs,
        rhs,
        negate,
        body,
        else_body,
    }))
}

/// `{% ifequal a b %} ... {% else %} ... {% endifequal %}`
pub fn parse_ifequal(content: &str, parser: &mut Parser<'_>) -> Result<Box<dyn Node>, Error> {
    parse_ifequal_impl(content, parser, false)
}

/// `{% ifnotequal a b %} ... {% else %} ... {% endifnotequal %}`
pub fn parse_ifnotequal(content: &str, parser: &mut Parser<'_>) -> Result<Box<dyn Node>, Error> {
    parse_ifequal_impl(content, parser, true)
}

/// The `ifchanged` tag.
///
/// Its memory lives in the render context under the identity of the node
/// together with the loop run it was recorded in.  Entering a new run of the
/// enclosing loop starts over.
#[derive(Debug)]
pub struct IfChangedNode {
    id: NodeId,
    watched: Vec<FilterExpression>,
    body: NodeList,
    else_body: NodeList,
}

impl IfChangedNode {
    fn current_loop(state: &mut State) -> Value {
        match state.render_context_mut().current_loop() {
            Some(id) => Value::from(id),
            None => Value::from(()),
        }
    }
}

impl Node for IfChangedNode {
    fn render(&self, state: &mut State, out: &mut Output) -> Result<(), Error> {
        let key = self.id;
        let loop_id = IfChangedNode::current_loop(state);
        let last = state
            .render_context_mut()
            .get(key)
            .and_then(|memory| memory.as_slice().map(|x| x.to_vec()))
            .filter(|memory| memory.first() == Some(&loop_id))
            .and_then(|memory| memory.get(1).cloned());
        let first = last.is_none();

        let mut ifchanged = ValueMap::new();
        ifchanged.insert("firstloop".into(), Value::from(first));

        let (compare_to, rendered) = if self.watched.is_empty() {
            let rendered = ok!(state.with_scope(|state| {
                state
                    .context_mut()
                    .insert("ifchanged", Value::from_map(ifchanged.clone()));
                self.body.render_to_string(state, out)
            }));
            (Value::from(rendered.clone()), Some(rendered))
        } else {
            let mut values = Vec::with_capacity(self.watched.len());
            for expr in &self.watched {
                let value = ok!(expr.resolve(state));
                if value.is_undefined() {
                    return Ok(());
                }
                values.push(value);
            }
            (Value::from(values), None)
        };

        if last.as_ref() != Some(&compare_to) {
            state
                .render_context_mut()
                .insert(key, Value::from(vec![loop_id, compare_to]));
            match rendered {
                Some(rendered) => out.write_str(&rendered).map_err(Error::from),
                None => state.with_scope(|state| {
                    state
                        .context_mut()
                        .insert("ifchanged", Value::from_map(ifchanged));
                    self.body.render(state, out)
                }),
            }
        } else {
            self.else_body.render(state, out)
        }
    }
}

/// `{% ifchanged [expr ...] %} ... {% else %} ... {% endifchanged %}`
pub fn parse_ifchanged(content: &str, parser: &mut Parser<'_>) -> Result<Box<dyn Node>, Error> {
    let mut watched = Vec::new();
    for word in smart_split(tag_args(content)) {
        watched.push(ok!(parser.compile_filter(word)));
    }
    let (body, end) = ok!(parse_body(parser, &["else", "endifchanged"]));
    let else_body = if end == "else" {
        ok!(parse_body(parser, &["endifchanged"])).0
    } else {
        NodeList::default()
    };
    Ok(Box::new(IfChangedNode {
        id: NodeId::new(),
        watched,
        body,
        else_body,
    }))
}

/// Outputs the first truthy argument.
#[derive(Debug)]
pub struct FirstOfNode {
    candidates: Vec<FilterExpression>,
}

impl Node for FirstOfNode {
    fn render(&self, state: &mut State, out: &mut Output) -> Result<(), Error> {
        for expr in &self.candidates {
            let value = expr.resolve(state).unwrap_or(Value::UNDEFINED);
            if value.is_true() {
                return write_escaped(out, state.autoescape(), &value);
            }
        }
        Ok(())
    }
}

/// `{% firstof a b "fallback" %}`
pub fn parse_firstof(content: &str, parser: &mut Parser<'_>) -> Result<Box<dyn Node>, Error> {
    let words = smart_split(tag_args(content));
    if words.is_empty() {
        return Err(syntax_error(
            "'firstof' statement requires at least one argument",
        ));
    }
    let mut candidates = Vec::with_capacity(words.len());
    for word in words {
        candidates.push(ok!(parser.compile_filter(word)));
    }
    Ok(Box::new(FirstOfNode { candidates }))
}
