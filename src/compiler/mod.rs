//! Turns template source into node trees.
pub mod lexer;
pub mod parser;

use crate::environment::Environment;
use crate::error::Error;
use crate::template::CompiledTemplate;

/// Compiles a template source into its node tree.
pub(crate) fn compile(
    env: &Environment,
    source: &str,
    name: &str,
) -> Result<CompiledTemplate, Error> {
    tracing::debug!(name, "compiling template");
    let tokens = ok!(lexer::tokenize(source, name));
    let mut parser = parser::Parser::new(env, tokens, name);
    let nodes = ok!(parser.parse_until(&[]));
    let blocks = parser.blocks().to_vec();
    Ok(CompiledTemplate::new(name, source, nodes, blocks))
}
