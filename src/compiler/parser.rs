use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::compiler::lexer::{Token, TokenKind};
use crate::environment::Environment;
use crate::error::{Error, ErrorKind};
use crate::expression::FilterExpression;
use crate::filters::Filter;
use crate::nodes::{Node, NodeList, TextNode, VariableNode};
use crate::tags::inheritance::BlockNode;
use crate::tags::{Library, TagFactory};

const MAX_RECURSION: usize = 150;

/// Turns a token stream into a node tree.
///
/// The parser is handed to every [`TagFactory`] so that block tags can parse
/// their bodies with [`parse_until`](Self::parse_until) and compile their
/// arguments with [`compile_filter`](Self::compile_filter).
pub struct Parser<'a> {
    env: &'a Environment,
    name: &'a str,
    tokens: Vec<Token<'a>>,
    pos: usize,
    depth: usize,
    tags: BTreeMap<String, Arc<dyn TagFactory>>,
    filters: BTreeMap<String, Filter>,
    block_names: BTreeSet<String>,
    blocks: Vec<Arc<BlockNode>>,
    named_cycles: BTreeMap<String, Arc<dyn Node>>,
    seen_extends: bool,
}

impl<'a> Parser<'a> {
    /// Creates a parser with the default libraries of the environment opened.
    pub(crate) fn new(env: &'a Environment, tokens: Vec<Token<'a>>, name: &'a str) -> Parser<'a> {
        let mut parser = Parser {
            env,
            name,
            tokens,
            pos: 0,
            depth: 0,
            tags: BTreeMap::new(),
            filters: BTreeMap::new(),
            block_names: BTreeSet::new(),
            blocks: Vec::new(),
            named_cycles: BTreeMap::new(),
            seen_extends: false,
        };
        for library in env.default_libraries() {
            parser.open_library(library);
        }
        parser
    }

    fn open_library(&mut self, library: &Library) {
        self.tags.extend(
            library
                .tags()
                .map(|(name, factory)| (name.to_string(), factory.clone())),
        );
        self.filters.extend(
            library
                .filters()
                .map(|(name, filter)| (name.to_string(), filter.clone())),
        );
    }

    /// Opens a library registered on the environment (the `load` tag).
    pub fn load_library(&mut self, name: &str) -> Result<(), Error> {
        match self.env.get_library(name) {
            Some(library) => {
                self.open_library(library);
                Ok(())
            }
            None => Err(Error::new(
                ErrorKind::TagSyntaxError,
                format!("'{name}' is not a valid tag library"),
            )),
        }
    }

    /// Returns the environment the template is compiled for.
    pub fn env(&self) -> &'a Environment {
        self.env
    }

    /// Returns the name of the template being compiled.
    pub fn template_name(&self) -> &'a str {
        self.name
    }

    /// Returns the line of the most recently consumed token.
    pub fn current_line(&self) -> usize {
        self.pos
            .checked_sub(1)
            .and_then(|idx| self.tokens.get(idx))
            .map_or(1, |token| token.line)
    }

    /// Returns `true` if there are tokens left.
    pub fn has_next_token(&self) -> bool {
        self.pos < self.tokens.len()
    }

    /// Returns the next token without consuming it.
    pub fn peek_token(&self) -> Option<&Token<'a>> {
        self.tokens.get(self.pos)
    }

    /// Takes the next token from the stream.
    pub fn take_token(&mut self) -> Option<Token<'a>> {
        let rv = self.tokens.get(self.pos).cloned();
        if rv.is_some() {
            self.pos += 1;
        }
        rv
    }

    /// Skips tokens until after the block tag with the given content.
    pub fn skip_past(&mut self, tag: &str) -> Result<(), Error> {
        while let Some(token) = self.take_token() {
            if token.kind == TokenKind::Block && token.content == tag {
                return Ok(());
            }
        }
        Err(Error::new(
            ErrorKind::UnclosedBlockTagError,
            format!("No closing tag found for {tag}"),
        ))
    }

    /// Takes the end tag a preceding [`parse_until`](Self::parse_until)
    /// stopped at.
    pub fn expect_end_tag(&mut self, stop_tags: &[&str]) -> Result<Token<'a>, Error> {
        match self.take_token() {
            Some(token) if token.kind == TokenKind::Block && stop_tags.contains(&token.tag_name()) => {
                Ok(token)
            }
            _ => Err(unclosed(self.name, stop_tags)),
        }
    }

    /// Looks up a filter by name.
    pub fn get_filter(&self, name: &str) -> Result<Filter, Error> {
        self.filters.get(name).cloned().ok_or_else(|| {
            Error::new(
                ErrorKind::UnknownFilterError,
                format!("Unknown filter: {name}"),
            )
        })
    }

    /// Compiles a filter expression like `user.name|default:"x"|upper`.
    pub fn compile_filter(&self, expr: &str) -> Result<FilterExpression, Error> {
        FilterExpression::compile(expr, self)
    }

    /// Records a block name.  Names must be unique within a template.
    pub fn declare_block(&mut self, name: &str) -> Result<(), Error> {
        if self.block_names.insert(name.to_string()) {
            Ok(())
        } else {
            Err(Error::new(
                ErrorKind::TagSyntaxError,
                format!("'block' tag with name '{name}' appears more than once."),
            ))
        }
    }

    pub(crate) fn add_block(&mut self, block: Arc<BlockNode>) {
        self.blocks.push(block);
    }

    pub(crate) fn blocks(&self) -> &[Arc<BlockNode>] {
        &self.blocks
    }

    /// Marks the template as extending another one.  Fails if it already
    /// does.
    pub(crate) fn mark_extends(&mut self) -> Result<(), Error> {
        if std::mem::replace(&mut self.seen_extends, true) {
            Err(Error::new(
                ErrorKind::TagSyntaxError,
                "Extends tag may only appear once in a template.",
            ))
        } else {
            Ok(())
        }
    }

    /// Registers a named node so that later tags can refer to it.
    pub fn register_named_cycle(&mut self, name: &str, node: Arc<dyn Node>) {
        self.named_cycles.insert(name.to_string(), node);
    }

    /// Looks up a node registered with
    /// [`register_named_cycle`](Self::register_named_cycle).
    pub fn named_cycle(&self, name: &str) -> Result<Arc<dyn Node>, Error> {
        if self.named_cycles.is_empty() {
            return Err(Error::new(
                ErrorKind::TagSyntaxError,
                format!("No named cycles in template. '{name}' is not defined"),
            ));
        }
        self.named_cycles.get(name).cloned().ok_or_else(|| {
            Error::new(ErrorKind::TagSyntaxError, format!("Node not found: {name}"))
        })
    }

    /// Parses tokens into a node list until a block tag whose name is one of
    /// `stop_tags` is reached.
    ///
    /// The stop tag itself is left in the stream.  If the input ends while
    /// stop tags are pending an [`UnclosedBlockTagError`](ErrorKind::UnclosedBlockTagError)
    /// is returned.
    pub fn parse_until(&mut self, stop_tags: &[&str]) -> Result<NodeList, Error> {
        self.depth += 1;
        if self.depth > MAX_RECURSION {
            self.depth -= 1;
            return Err(Error::new(
                ErrorKind::RecursionLimit,
                "template exceeds the maximum tag nesting depth",
            ));
        }
        #[cfg(feature = "stacker")]
        let rv = stacker::maybe_grow(32 * 1024, 1024 * 1024, || self.parse_until_impl(stop_tags));
        #[cfg(not(feature = "stacker"))]
        let rv = self.parse_until_impl(stop_tags);
        self.depth -= 1;
        rv
    }

    fn parse_until_impl(&mut self, stop_tags: &[&str]) -> Result<NodeList, Error> {
        let mut nodes = NodeList::default();
        while let Some(token) = self.tokens.get(self.pos).cloned() {
            let node: Box<dyn Node> = match token.kind {
                TokenKind::Text => {
                    self.pos += 1;
                    Box::new(TextNode::new(token.content))
                }
                TokenKind::Comment => {
                    self.pos += 1;
                    continue;
                }
                TokenKind::Variable => {
                    self.pos += 1;
                    if token.content.is_empty() {
                        return Err(Error::new(
                            ErrorKind::EmptyVariableError,
                            format!("Empty variable before \"{}\"", self.peek_preview()),
                        )
                        .with_location(self.name, token.line));
                    }
                    let expr = ok!(self
                        .compile_filter(token.content)
                        .map_err(|err| err.with_location(self.name, token.line)));
                    Box::new(VariableNode::new(expr, token.line))
                }
                TokenKind::Block => {
                    let tag_name = token.tag_name();
                    if !tag_name.is_empty() && stop_tags.contains(&tag_name) {
                        return Ok(nodes);
                    }
                    self.pos += 1;
                    if tag_name.is_empty() {
                        let msg = if self.has_next_token() {
                            format!("Empty block tag before \"{}\"", self.peek_preview())
                        } else {
                            "Empty block tag at end of input.".to_string()
                        };
                        return Err(Error::new(ErrorKind::EmptyBlockTagError, msg)
                            .with_location(self.name, token.line));
                    }
                    let factory = match self.tags.get(tag_name) {
                        Some(factory) => factory.clone(),
                        None => {
                            return Err(Error::new(
                                ErrorKind::InvalidBlockTagError,
                                format!("Unknown tag: \"{tag_name}\""),
                            )
                            .with_location(self.name, token.line))
                        }
                    };
                    tracing::trace!(tag = tag_name, line = token.line, "parsing tag");
                    ok!(factory
                        .parse(token.content, self)
                        .map_err(|err| err.with_location(self.name, token.line)))
                }
            };
            if node.must_be_first() && nodes.contains_non_text() {
                return Err(Error::new(
                    ErrorKind::TagSyntaxError,
                    format!("Node appeared twice in template: {}", token.tag_name()),
                )
                .with_location(self.name, token.line));
            }
            nodes.push(node);
        }

        if stop_tags.is_empty() {
            Ok(nodes)
        } else {
            Err(unclosed(self.name, stop_tags))
        }
    }

    fn peek_preview(&self) -> String {
        self.tokens
            .get(self.pos)
            .map(|token| token.content.chars().take(20).collect())
            .unwrap_or_default()
    }
}

fn unclosed(name: &str, stop_tags: &[&str]) -> Error {
    Error::new(
        ErrorKind::UnclosedBlockTagError,
        format!(
            "Unclosed tag in template {name}. Expected one of: ({})",
            stop_tags.join(" ")
        ),
    )
}
