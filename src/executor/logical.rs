//! Logical operators and the logical planner.
//!
//! [`create_logical_plan`] turns a bound [`Stmt`] into a tree of
//! [`LogicalOperator`]s: a left-deep chain of table gets and joins, a
//! predicate above the joins, a group-by above that, and a projection on
//! top. DML statements plan as a table get (read-write) under an optional
//! predicate under the mutating operator.
//!
//! The group-by builder is also where aggregate plumbing happens: every
//! aggregate in the select list is assigned its position in the group
//! output row and its input expression is lifted into the group-by
//! operator, and every plain select expression must match a group-by
//! expression (position-bound by structural equality).

use std::sync::Arc;

use crate::catalog::{FieldMeta, Table};
use crate::storage::LockMode;
use crate::value::Value;

use super::aggregate::AggregateType;
use super::error::ExecutorError;
use super::expr::{ExprKind, Expression};
use super::stmt::{FilterStmt, SelectStmt, Stmt};

/// One aggregate computed by a group-by operator: the function, the bound
/// output name (how projections find the result cell), and the input
/// expression evaluated per input row.
pub struct AggregateSpec {
    pub aggregate_type: AggregateType,
    pub name: String,
    pub input: Expression,
}

/// A logical query plan node.
pub enum LogicalOperator {
    /// Scan of one table in the given lock mode. `predicates` holds any
    /// conditions pushed down into the scan (empty by default).
    TableGet {
        table: Arc<Table>,
        mode: LockMode,
        alias: Option<String>,
        predicates: Vec<Expression>,
    },
    /// Cross product of two children; join conditions live in a Predicate
    /// above.
    Join {
        left: Box<LogicalOperator>,
        right: Box<LogicalOperator>,
    },
    /// Row filter over the bound conjunction.
    Predicate {
        expression: Expression,
        child: Box<LogicalOperator>,
    },
    /// Grouped aggregation.
    GroupBy {
        group_exprs: Vec<Expression>,
        aggregates: Vec<AggregateSpec>,
        child: Box<LogicalOperator>,
    },
    /// Projection; `child` is absent for table-free selects.
    Project {
        expressions: Vec<Expression>,
        child: Option<Box<LogicalOperator>>,
    },
    Insert {
        table: Arc<Table>,
        values: Vec<Value>,
    },
    Update {
        table: Arc<Table>,
        assignments: Vec<(FieldMeta, Expression)>,
        child: Box<LogicalOperator>,
    },
    Delete {
        table: Arc<Table>,
        child: Box<LogicalOperator>,
    },
    Explain {
        child: Box<LogicalOperator>,
    },
    Calc {
        expressions: Vec<Expression>,
    },
}

impl LogicalOperator {
    /// Formats this plan as a human-readable tree, one node per line.
    pub fn explain(&self) -> String {
        self.format_explain(0)
    }

    fn format_explain(&self, indent: usize) -> String {
        let prefix = "  ".repeat(indent);
        match self {
            LogicalOperator::TableGet {
                table, mode, alias, ..
            } => {
                let mode = match mode {
                    LockMode::ReadOnly => "",
                    LockMode::ReadWrite => " (read-write)",
                };
                match alias {
                    Some(alias) => {
                        format!("{}TableGet on {} as {}{}", prefix, table.name(), alias, mode)
                    }
                    None => format!("{}TableGet on {}{}", prefix, table.name(), mode),
                }
            }
            LogicalOperator::Join { left, right } => format!(
                "{}NestedLoopJoin\n{}\n{}",
                prefix,
                left.format_explain(indent + 1),
                right.format_explain(indent + 1)
            ),
            LogicalOperator::Predicate { expression, child } => format!(
                "{}Predicate: {}\n{}",
                prefix,
                expression,
                child.format_explain(indent + 1)
            ),
            LogicalOperator::GroupBy {
                group_exprs,
                aggregates,
                child,
            } => {
                let keys: Vec<String> = group_exprs.iter().map(Expression::to_string).collect();
                let aggs: Vec<&str> = aggregates.iter().map(|a| a.name.as_str()).collect();
                format!(
                    "{}GroupBy: keys({}) aggregates({})\n{}",
                    prefix,
                    keys.join(", "),
                    aggs.join(", "),
                    child.format_explain(indent + 1)
                )
            }
            LogicalOperator::Project { expressions, child } => {
                let cols: Vec<String> =
                    expressions.iter().map(Expression::output_name).collect();
                match child {
                    Some(child) => format!(
                        "{}Project: {}\n{}",
                        prefix,
                        cols.join(", "),
                        child.format_explain(indent + 1)
                    ),
                    None => format!("{}Project: {} (1 row)", prefix, cols.join(", ")),
                }
            }
            LogicalOperator::Insert { table, values } => {
                format!("{}Insert into {} ({} values)", prefix, table.name(), values.len())
            }
            LogicalOperator::Update {
                table,
                assignments,
                child,
            } => {
                let sets: Vec<String> = assignments
                    .iter()
                    .map(|(field, expr)| format!("{}={}", field.name, expr))
                    .collect();
                format!(
                    "{}Update {} set {}\n{}",
                    prefix,
                    table.name(),
                    sets.join(", "),
                    child.format_explain(indent + 1)
                )
            }
            LogicalOperator::Delete { table, child } => format!(
                "{}Delete from {}\n{}",
                prefix,
                table.name(),
                child.format_explain(indent + 1)
            ),
            LogicalOperator::Explain { child } => {
                format!("{}Explain\n{}", prefix, child.format_explain(indent + 1))
            }
            LogicalOperator::Calc { expressions } => {
                let cols: Vec<String> =
                    expressions.iter().map(Expression::output_name).collect();
                format!("{}Calc: {}", prefix, cols.join(", "))
            }
        }
    }
}

/// Builds the logical plan for a bound statement.
pub fn create_logical_plan(stmt: Stmt) -> Result<LogicalOperator, ExecutorError> {
    match stmt {
        Stmt::Select(select) => create_select_plan(select),
        Stmt::Calc(calc) => Ok(LogicalOperator::Calc {
            expressions: calc.expressions,
        }),
        Stmt::Insert(insert) => Ok(LogicalOperator::Insert {
            table: insert.table,
            values: insert.values,
        }),
        Stmt::Update(update) => {
            let child = dml_child(update.table.clone(), update.filter_stmt)?;
            Ok(LogicalOperator::Update {
                table: update.table,
                assignments: update.assignments,
                child: Box::new(child),
            })
        }
        Stmt::Delete(delete) => {
            let child = dml_child(delete.table.clone(), delete.filter_stmt)?;
            Ok(LogicalOperator::Delete {
                table: delete.table,
                child: Box::new(child),
            })
        }
        Stmt::Explain(explain) => {
            let child = create_logical_plan(*explain.child)?;
            Ok(LogicalOperator::Explain {
                child: Box::new(child),
            })
        }
    }
}

/// The table-get (read-write) plus optional predicate under a DML
/// operator.
fn dml_child(
    table: Arc<Table>,
    filter: Option<FilterStmt>,
) -> Result<LogicalOperator, ExecutorError> {
    let table_get = LogicalOperator::TableGet {
        table,
        mode: LockMode::ReadWrite,
        alias: None,
        predicates: Vec::new(),
    };
    match filter {
        None => Ok(table_get),
        Some(filter) => Ok(LogicalOperator::Predicate {
            expression: plan_filter(filter)?,
            child: Box::new(table_get),
        }),
    }
}

fn create_select_plan(stmt: SelectStmt) -> Result<LogicalOperator, ExecutorError> {
    let SelectStmt {
        tables,
        table_aliases,
        mut query_expressions,
        filter_stmt,
        group_by,
    } = stmt;

    // Left-deep join chain over the FROM tables.
    let mut table_oper: Option<LogicalOperator> = None;
    for (table, alias) in tables.into_iter().zip(table_aliases) {
        let table_get = LogicalOperator::TableGet {
            table,
            mode: LockMode::ReadOnly,
            alias,
            predicates: Vec::new(),
        };
        table_oper = Some(match table_oper {
            None => table_get,
            Some(prev) => LogicalOperator::Join {
                left: Box::new(prev),
                right: Box::new(table_get),
            },
        });
    }

    let mut last_oper = table_oper;

    if let Some(filter) = filter_stmt {
        let child = last_oper.ok_or_else(|| {
            ExecutorError::InvalidArgument("WHERE clause requires a FROM table".into())
        })?;
        last_oper = Some(LogicalOperator::Predicate {
            expression: plan_filter(filter)?,
            child: Box::new(child),
        });
    }

    if let Some((group_exprs, aggregates)) =
        build_group_by(&mut query_expressions, group_by)?
    {
        let child = last_oper.ok_or_else(|| {
            ExecutorError::InvalidArgument("GROUP BY requires a FROM table".into())
        })?;
        last_oper = Some(LogicalOperator::GroupBy {
            group_exprs,
            aggregates,
            child: Box::new(child),
        });
    }

    Ok(LogicalOperator::Project {
        expressions: query_expressions,
        child: last_oper.map(Box::new),
    })
}

/// Plans the subqueries inside the filter conditions, then folds the
/// conditions into one conjunction expression.
fn plan_filter(filter: FilterStmt) -> Result<Expression, ExecutorError> {
    let FilterStmt {
        mut conditions,
        conjunction,
    } = filter;
    for condition in &mut conditions {
        plan_subqueries(condition)?;
    }
    Ok(Expression::conjunction(conjunction, conditions))
}

/// Recursively attaches logical plans to every subquery expression.
fn plan_subqueries(expr: &mut Expression) -> Result<(), ExecutorError> {
    if let ExprKind::Subquery(sub) = &mut expr.kind {
        let stmt = sub.stmt.take().ok_or_else(|| {
            ExecutorError::Internal("subquery planned before binding".into())
        })?;
        let plan = create_select_plan(*stmt)?;
        sub.logical = Some(Box::new(plan));
        return Ok(());
    }
    expr.visit_children_mut(&mut |child| plan_subqueries(child))
}

/// Builds the group-by content, if the query aggregates at all.
///
/// Select expressions matching a group-by expression are bound to its
/// output position; aggregates are positioned after the group keys and
/// their input expressions lifted out; anything left referencing a raw
/// field is an error.
fn build_group_by(
    query_expressions: &mut [Expression],
    group_by: Vec<Expression>,
) -> Result<Option<(Vec<Expression>, Vec<AggregateSpec>)>, ExecutorError> {
    for expr in query_expressions.iter_mut() {
        bind_to_group(expr, &group_by);
    }

    let mut found_unbound = false;
    for expr in query_expressions.iter() {
        if find_unbound_field(expr) {
            found_unbound = true;
        }
    }

    let mut aggregates = Vec::new();
    for expr in query_expressions.iter_mut() {
        collect_aggregates(expr, group_by.len(), &mut aggregates)?;
    }

    if group_by.is_empty() && aggregates.is_empty() {
        return Ok(None);
    }
    if found_unbound {
        log::warn!("select expression references a field outside GROUP BY");
        return Err(ExecutorError::InvalidArgument(
            "field must appear in GROUP BY or inside an aggregate".into(),
        ));
    }
    Ok(Some((group_by, aggregates)))
}

/// Binds `expr` (or its subexpressions) to matching group-by expressions
/// by structural equality, recording the group output position.
fn bind_to_group(expr: &mut Expression, group_by: &[Expression]) {
    if matches!(expr.kind, ExprKind::Aggregation(_)) {
        return;
    }
    for (i, group_expr) in group_by.iter().enumerate() {
        if expr.equal(group_expr) {
            expr.set_pos(i as i32);
            return;
        }
    }
    let _ = expr.visit_children_mut::<()>(&mut |child| {
        bind_to_group(child, group_by);
        Ok(())
    });
}

/// Whether a raw field reference survives outside aggregates and group
/// positions.
fn find_unbound_field(expr: &Expression) -> bool {
    if matches!(expr.kind, ExprKind::Aggregation(_)) || expr.pos() != -1 {
        return false;
    }
    if matches!(expr.kind, ExprKind::Field(_)) {
        return true;
    }
    let mut found = false;
    let _ = expr.visit_children::<()>(&mut |child| {
        if find_unbound_field(child) {
            found = true;
        }
        Ok(())
    });
    found
}

/// Positions every aggregate after the group keys and lifts its input
/// expression into the group-by operator.
fn collect_aggregates(
    expr: &mut Expression,
    group_len: usize,
    out: &mut Vec<AggregateSpec>,
) -> Result<(), ExecutorError> {
    let extracted = match &expr.kind {
        ExprKind::Aggregation(agg) => {
            Some((agg.aggregate_type, agg.child.try_clone()?))
        }
        _ => None,
    };
    if let Some((aggregate_type, input)) = extracted {
        expr.set_pos((group_len + out.len()) as i32);
        out.push(AggregateSpec {
            aggregate_type,
            name: expr.name().to_string(),
            input,
        });
        return Ok(());
    }
    expr.visit_children_mut(&mut |child| collect_aggregates(child, group_len, out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Db, FieldDef};
    use crate::sql::{
        CompOp, ConditionSqlNode, RelationSqlNode, SelectSqlNode,
    };

    fn setup() -> Arc<Db> {
        let db = Db::new();
        db.create_table(
            "t",
            &[FieldDef::int("id"), FieldDef::chars("name", 8)],
        )
        .unwrap();
        db.create_table("u", &[FieldDef::int("x")]).unwrap();
        db
    }

    fn plan_select(db: &Arc<Db>, node: SelectSqlNode) -> LogicalOperator {
        let stmt = SelectStmt::create(db, node, None).unwrap();
        create_select_plan(stmt).unwrap()
    }

    #[test]
    fn test_simple_select_plan_shape() {
        let db = setup();
        let plan = plan_select(
            &db,
            SelectSqlNode {
                expressions: vec![Expression::star(None)],
                relations: vec![RelationSqlNode::new("t")],
                ..SelectSqlNode::default()
            },
        );
        match plan {
            LogicalOperator::Project { child, expressions } => {
                assert_eq!(expressions.len(), 2);
                assert!(matches!(
                    child.as_deref(),
                    Some(LogicalOperator::TableGet { .. })
                ));
            }
            _ => panic!("expected Project at the root"),
        }
    }

    #[test]
    fn test_filter_and_join_shape() {
        let db = setup();
        let plan = plan_select(
            &db,
            SelectSqlNode {
                expressions: vec![Expression::star(None)],
                relations: vec![RelationSqlNode::new("t"), RelationSqlNode::new("u")],
                conditions: vec![ConditionSqlNode::new(
                    Expression::unbound_field(Some("t"), "id"),
                    CompOp::EqualTo,
                    Expression::unbound_field(Some("u"), "x"),
                )],
                ..SelectSqlNode::default()
            },
        );
        // Project -> Predicate -> Join(TableGet, TableGet)
        let LogicalOperator::Project { child, .. } = plan else {
            panic!("expected Project");
        };
        let LogicalOperator::Predicate { child, .. } = *child.unwrap() else {
            panic!("expected Predicate under Project");
        };
        let LogicalOperator::Join { left, right } = *child else {
            panic!("expected Join under Predicate");
        };
        assert!(matches!(*left, LogicalOperator::TableGet { .. }));
        assert!(matches!(*right, LogicalOperator::TableGet { .. }));
    }

    #[test]
    fn test_group_by_positions() {
        let db = setup();
        let plan = plan_select(
            &db,
            SelectSqlNode {
                expressions: vec![
                    Expression::unbound_field(None, "name"),
                    Expression::unbound_aggregation("count", Expression::star(None)),
                ],
                relations: vec![RelationSqlNode::new("t")],
                group_by: vec![Expression::unbound_field(None, "name")],
                ..SelectSqlNode::default()
            },
        );
        let LogicalOperator::Project { expressions, child } = plan else {
            panic!("expected Project");
        };
        // The group key sits at position 0, the aggregate after the keys.
        assert_eq!(expressions[0].pos(), 0);
        assert_eq!(expressions[1].pos(), 1);
        let LogicalOperator::GroupBy {
            group_exprs,
            aggregates,
            ..
        } = *child.unwrap()
        else {
            panic!("expected GroupBy under Project");
        };
        assert_eq!(group_exprs.len(), 1);
        assert_eq!(aggregates.len(), 1);
        assert_eq!(aggregates[0].aggregate_type, AggregateType::Count);
        assert_eq!(aggregates[0].name, "count(*)");
    }

    #[test]
    fn test_implicit_group_for_bare_aggregates() {
        let db = setup();
        let plan = plan_select(
            &db,
            SelectSqlNode {
                expressions: vec![Expression::unbound_aggregation(
                    "sum",
                    Expression::unbound_field(None, "id"),
                )],
                relations: vec![RelationSqlNode::new("t")],
                ..SelectSqlNode::default()
            },
        );
        let LogicalOperator::Project { child, .. } = plan else {
            panic!("expected Project");
        };
        let LogicalOperator::GroupBy { group_exprs, .. } = *child.unwrap() else {
            panic!("expected GroupBy for a bare aggregate");
        };
        assert!(group_exprs.is_empty());
    }

    #[test]
    fn test_dml_plan_modes() {
        let db = setup();
        let stmt = Stmt::create(
            &db,
            crate::sql::ParsedSqlNode::Delete(crate::sql::DeleteSqlNode {
                relation: "t".into(),
                conditions: vec![],
                conjunction: crate::sql::ConjunctionType::And,
            }),
        )
        .unwrap();
        let plan = create_logical_plan(stmt).unwrap();
        let LogicalOperator::Delete { child, .. } = plan else {
            panic!("expected Delete at the root");
        };
        assert!(matches!(
            *child,
            LogicalOperator::TableGet {
                mode: LockMode::ReadWrite,
                ..
            }
        ));
    }

    #[test]
    fn test_explain_format() {
        let db = setup();
        let plan = plan_select(
            &db,
            SelectSqlNode {
                expressions: vec![Expression::unbound_field(None, "name")],
                relations: vec![RelationSqlNode::new("t")],
                conditions: vec![ConditionSqlNode::new(
                    Expression::unbound_field(None, "id"),
                    CompOp::GreatThan,
                    Expression::value(Value::Int(1)),
                )],
                ..SelectSqlNode::default()
            },
        );
        let text = plan.explain();
        assert!(text.starts_with("Project: name\n"), "got: {}", text);
        assert!(text.contains("Predicate: "), "got: {}", text);
        assert!(text.contains("TableGet on t"), "got: {}", text);
    }
}
