//! Parsed SQL statement shapes.
//!
//! The lexer and parser live outside this core; what enters here is the
//! already-parsed syntax tree, [`ParsedSqlNode`]. Tests and the session
//! layer construct these nodes programmatically. Only the DQL/DML subset
//! (CALC, SELECT, INSERT, UPDATE, DELETE, EXPLAIN) is consumed by the
//! statement layer; everything else the parser can produce is handled
//! before reaching this crate.

mod ast;

pub use ast::*;
