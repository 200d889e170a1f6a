// arcc — Arc compiler front end
//
// Library root. Phases in dependency order: lexer and parser produce the
// AST, the analyzer resolves names and types against a scope tree, the
// graph builder lowers flows and sequences to IR, and the stratifier
// assigns execution levels. `analyze::compile` runs them all.

pub mod analyze;
pub mod analyzer;
pub mod ast;
pub mod constraints;
pub mod diag;
pub mod error;
pub mod graph;
pub mod id;
pub mod ir;
pub mod lexer;
pub mod literal;
pub mod logging;
pub mod manifest;
pub mod parser;
pub mod stratify;
pub mod symbol;
pub mod types;
pub mod units;
