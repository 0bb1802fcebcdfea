//! Query runtime: drives a parsed statement to completion.
//!
//! [`execute`] is the seam the session layer sits on: statement creation,
//! logical and physical planning, then an open/next/close loop over the
//! root operator. End-of-stream never escapes as an error, and the root
//! is closed on every path, including mid-drain failures.

use std::rc::Rc;
use std::sync::Arc;

use crate::catalog::Db;
use crate::sql::ParsedSqlNode;
use crate::storage::Trx;
use crate::value::Value;

use super::error::ExecutorError;
use super::logical::create_logical_plan;
use super::physical::create_physical_plan;
use super::stmt::Stmt;

/// The outcome of executing one statement.
#[derive(Debug, PartialEq)]
pub enum QueryResult {
    /// Query output: column names plus the materialized rows.
    Rows {
        column_names: Vec<String>,
        rows: Vec<Vec<Value>>,
    },
    /// DML output: number of affected rows.
    Affected { count: i32 },
}

impl QueryResult {
    /// The result rows; panics on a DML result. Test/session convenience.
    pub fn rows(&self) -> &[Vec<Value>] {
        match self {
            QueryResult::Rows { rows, .. } => rows,
            QueryResult::Affected { .. } => panic!("DML statements produce no rows"),
        }
    }

    /// The affected-row count; panics on a query result.
    pub fn affected(&self) -> i32 {
        match self {
            QueryResult::Affected { count } => *count,
            QueryResult::Rows { .. } => panic!("queries report rows, not a count"),
        }
    }
}

/// Executes one parsed statement against the catalog under `trx`.
pub fn execute(
    db: &Arc<Db>,
    trx: &Rc<Trx>,
    node: ParsedSqlNode,
) -> Result<QueryResult, ExecutorError> {
    let is_dml = matches!(
        node,
        ParsedSqlNode::Insert(_) | ParsedSqlNode::Update(_) | ParsedSqlNode::Delete(_)
    );

    let stmt = Stmt::create(db, node)?;
    let logical = create_logical_plan(stmt)?;
    let mut root = create_physical_plan(logical)?;
    let column_names = root.output_names();

    if let Err(e) = root.open(trx) {
        let _ = root.close();
        return Err(e);
    }

    let mut rows = Vec::new();
    let drained = loop {
        match root.next() {
            Ok(Some(tuple)) => {
                let mut row = Vec::with_capacity(tuple.cell_num());
                let mut cell_err = None;
                for i in 0..tuple.cell_num() {
                    match tuple.cell_at(i) {
                        Ok(value) => row.push(value),
                        Err(e) => {
                            cell_err = Some(e);
                            break;
                        }
                    }
                }
                match cell_err {
                    Some(e) => break Err(e),
                    None => rows.push(row),
                }
            }
            Ok(None) => break Ok(()),
            Err(e) => break Err(e),
        }
    };
    let close_rc = root.close();
    drained?;
    close_rc?;

    if is_dml {
        let count = rows
            .first()
            .and_then(|row| row.first())
            .map(Value::get_int)
            .unwrap_or(0);
        Ok(QueryResult::Affected { count })
    } else {
        Ok(QueryResult::Rows { column_names, rows })
    }
}
