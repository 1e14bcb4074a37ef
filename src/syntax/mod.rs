//! Template syntax: the pest grammar, the AST builder and space gobbling.

pub mod gobble;
pub mod parser;

pub use parser::{parse, Parsed};
