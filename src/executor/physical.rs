//! Logical-to-physical plan translation.
//!
//! The translation is one-to-one. The only extra work happens at
//! predicates: any subquery expression that received a logical plan gets
//! its physical plan built here and installed for correlated execution,
//! and EXPLAIN renders its child's logical tree into the text the
//! operator will emit (the child is never executed).

use super::error::ExecutorError;
use super::expr::{ExprKind, Expression};
use super::logical::LogicalOperator;
use super::node::{
    Calc, Delete, Explain, Filter, GroupBy, Insert, NestedLoopJoin, PhysicalOperator, Project,
    TableScan, Update,
};

/// Translates a logical plan into its physical operator tree.
pub fn create_physical_plan(logical: LogicalOperator) -> Result<PhysicalOperator, ExecutorError> {
    match logical {
        LogicalOperator::TableGet {
            table,
            mode,
            alias,
            mut predicates,
        } => {
            for predicate in &mut predicates {
                prepare_subqueries(predicate)?;
            }
            Ok(PhysicalOperator::TableScan(TableScan::new(
                table, alias, mode, predicates,
            )))
        }
        LogicalOperator::Join { left, right } => Ok(PhysicalOperator::NestedLoopJoin(
            NestedLoopJoin::new(create_physical_plan(*left)?, create_physical_plan(*right)?),
        )),
        LogicalOperator::Predicate {
            mut expression,
            child,
        } => {
            prepare_subqueries(&mut expression)?;
            Ok(PhysicalOperator::Filter(Filter::new(
                create_physical_plan(*child)?,
                expression,
            )))
        }
        LogicalOperator::GroupBy {
            group_exprs,
            aggregates,
            child,
        } => Ok(PhysicalOperator::GroupBy(GroupBy::new(
            create_physical_plan(*child)?,
            group_exprs,
            aggregates,
        ))),
        LogicalOperator::Project { expressions, child } => {
            let child = match child {
                Some(child) => Some(create_physical_plan(*child)?),
                None => None,
            };
            Ok(PhysicalOperator::Project(Project::new(child, expressions)))
        }
        LogicalOperator::Insert { table, values } => {
            Ok(PhysicalOperator::Insert(Insert::new(table, values)))
        }
        LogicalOperator::Update {
            table,
            assignments,
            child,
        } => Ok(PhysicalOperator::Update(Update::new(
            table,
            assignments,
            create_physical_plan(*child)?,
        ))),
        LogicalOperator::Delete { table, child } => Ok(PhysicalOperator::Delete(Delete::new(
            table,
            create_physical_plan(*child)?,
        ))),
        LogicalOperator::Explain { child } => {
            Ok(PhysicalOperator::Explain(Explain::new(child.explain())))
        }
        LogicalOperator::Calc { expressions } => {
            Ok(PhysicalOperator::Calc(Calc::new(expressions)))
        }
    }
}

/// Builds and installs physical plans for every subquery expression in
/// the tree.
fn prepare_subqueries(expr: &mut Expression) -> Result<(), ExecutorError> {
    if let ExprKind::Subquery(sub) = &mut expr.kind {
        let logical = sub.logical.take().ok_or_else(|| {
            ExecutorError::Internal("subquery reached physical planning without a plan".into())
        })?;
        let physical = create_physical_plan(*logical)?;
        sub.set_physical(physical);
        return Ok(());
    }
    expr.visit_children_mut(&mut |child| prepare_subqueries(child))
}
