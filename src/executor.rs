//! Query executor: expressions, binder, statements, planners, and the
//! Volcano operator pipeline.
//!
//! The flow through this module mirrors the life of a query:
//!
//! - **Expressions** ([`expr`], [`eval`], [`chunk`]): the value-producing
//!   tree with a row evaluator and a vectorized column path for numerics
//! - **Binder** ([`binder`]): resolves names against the catalog and
//!   validates aggregation shape
//! - **Statements** ([`stmt`]): bound SELECT/INSERT/UPDATE/DELETE/EXPLAIN/CALC
//! - **Planners** ([`logical`], [`physical`]): statement to logical tree to
//!   physical operator tree, including subquery plan attachment
//! - **Operators** ([`node`]): open/next/close execution over [`tuple`]s,
//!   with streaming [`aggregate`]s
//! - **Runtime** ([`runtime`]): the drive-to-completion entry point
//!
//! Execution is synchronous and single-threaded per query: every `next()`
//! returns its result directly, and end-of-stream is `Ok(None)`, never an
//! error.

mod aggregate;
mod binder;
mod chunk;
mod error;
mod eval;
mod expr;
mod func;
mod like;
mod logical;
mod node;
mod physical;
mod runtime;
mod stmt;
mod tuple;

pub use aggregate::{AggregateType, Aggregator};
pub use binder::{BinderContext, ExpressionBinder};
pub use chunk::{Chunk, Column, ColumnKind};
pub use error::ExecutorError;
pub use expr::{
    AggregateExpr, ArithmeticExpr, ArithmeticType, ComparisonExpr, ExprKind, ExprType,
    Expression, FieldExpr, SubqueryExpr, SysFuncType, SysFunctionExpr, ValueListExpr,
};
pub use logical::{create_logical_plan, AggregateSpec, LogicalOperator};
pub use node::PhysicalOperator;
pub use physical::create_physical_plan;
pub use runtime::{execute, QueryResult};
pub use stmt::{
    CalcStmt, DeleteStmt, ExplainStmt, FilterStmt, InsertStmt, SelectStmt, Stmt, UpdateStmt,
};
pub use tuple::{JoinedTuple, ProjectTuple, RowTuple, Tuple, TupleCellSpec, ValueListTuple};
