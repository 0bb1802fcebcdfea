//! Shared helpers for query integration tests.

use std::sync::Arc;

use quern::catalog::{Db, FieldDef};
use quern::executor::{execute, Expression, QueryResult};
use quern::sql::{
    CompOp, ConditionSqlNode, ConjunctionType, InsertSqlNode, ParsedSqlNode, RelationSqlNode,
    SelectSqlNode,
};
use quern::value::Value;

/// Creates `T(id int, name chars(8))` with rows (1,'a'), (2,'b'), (3,'a').
pub fn setup_t(db: &Arc<Db>) {
    db.create_table("T", &[FieldDef::int("id"), FieldDef::chars("name", 8)])
        .unwrap();
    for (id, name) in [(1, "a"), (2, "b"), (3, "a")] {
        insert(db, "T", vec![Value::Int(id), Value::Chars(name.into())]);
    }
}

/// Inserts one row through the full statement pipeline.
pub fn insert(db: &Arc<Db>, table: &str, values: Vec<Value>) {
    let trx = db.begin_trx();
    let result = execute(
        db,
        &trx,
        ParsedSqlNode::Insert(InsertSqlNode {
            relation: table.into(),
            values,
        }),
    )
    .unwrap();
    assert_eq!(result.affected(), 1);
}

/// Runs a statement and returns its result.
pub fn run(db: &Arc<Db>, node: ParsedSqlNode) -> QueryResult {
    let trx = db.begin_trx();
    execute(db, &trx, node).unwrap()
}

/// Runs a SELECT and returns just the rows.
pub fn run_rows(db: &Arc<Db>, node: SelectSqlNode) -> Vec<Vec<Value>> {
    match run(db, ParsedSqlNode::Select(node)) {
        QueryResult::Rows { rows, .. } => rows,
        QueryResult::Affected { .. } => panic!("expected rows"),
    }
}

/// A SELECT over one table with the given select list.
pub fn select_from(exprs: Vec<Expression>, table: &str) -> SelectSqlNode {
    SelectSqlNode {
        expressions: exprs,
        relations: vec![RelationSqlNode::new(table)],
        ..SelectSqlNode::default()
    }
}

/// Adds one condition to a select node.
pub fn with_condition(
    mut node: SelectSqlNode,
    left: Expression,
    comp: CompOp,
    right: Expression,
) -> SelectSqlNode {
    node.conditions.push(ConditionSqlNode::new(left, comp, right));
    node.conjunction = ConjunctionType::And;
    node
}

/// All values of the single-column result, order-insensitively comparable.
pub fn single_column(rows: Vec<Vec<Value>>) -> Vec<Value> {
    rows.into_iter()
        .map(|mut row| {
            assert_eq!(row.len(), 1, "expected single-column rows");
            row.pop().unwrap()
        })
        .collect()
}
