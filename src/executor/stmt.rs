//! Bound statements.
//!
//! A [`Stmt`] is the semantically validated form of a [`ParsedSqlNode`]:
//! tables resolved, aliases rewritten to real table names, expressions
//! bound, insert values cast to their field types. No partial statement
//! ever leaves this layer; any semantic error aborts creation.

use std::collections::HashMap;
use std::sync::Arc;

use crate::catalog::{Db, FieldMeta, Table};
use crate::sql::{
    CalcSqlNode, CompOp, ConditionSqlNode, ConjunctionType, DeleteSqlNode, ExplainSqlNode,
    InsertSqlNode, ParsedSqlNode, SelectSqlNode, UpdateSqlNode,
};
use crate::value::Value;

use super::binder::{BinderContext, ExpressionBinder};
use super::error::ExecutorError;
use super::expr::{ExprKind, Expression};

/// A bound statement, ready for logical planning.
pub enum Stmt {
    Select(SelectStmt),
    Insert(InsertStmt),
    Update(UpdateStmt),
    Delete(DeleteStmt),
    Explain(ExplainStmt),
    Calc(CalcStmt),
}

impl Stmt {
    /// Creates the bound statement for a parsed node.
    pub fn create(db: &Arc<Db>, node: ParsedSqlNode) -> Result<Stmt, ExecutorError> {
        match node {
            ParsedSqlNode::Select(select) => {
                Ok(Stmt::Select(SelectStmt::create(db, select, None)?))
            }
            ParsedSqlNode::Insert(insert) => Ok(Stmt::Insert(InsertStmt::create(db, insert)?)),
            ParsedSqlNode::Update(update) => Ok(Stmt::Update(UpdateStmt::create(db, update)?)),
            ParsedSqlNode::Delete(delete) => Ok(Stmt::Delete(DeleteStmt::create(db, delete)?)),
            ParsedSqlNode::Explain(explain) => {
                Ok(Stmt::Explain(ExplainStmt::create(db, explain)?))
            }
            ParsedSqlNode::Calc(calc) => Ok(Stmt::Calc(CalcStmt::create(db, calc)?)),
        }
    }
}

/// A bound WHERE clause: condition expressions plus how they are joined.
pub struct FilterStmt {
    pub conditions: Vec<Expression>,
    pub conjunction: ConjunctionType,
}

impl FilterStmt {
    /// Binds parsed conditions. IS and LIKE conditions become their
    /// dedicated expression kinds; everything else a comparison.
    fn create(
        db: &Arc<Db>,
        context: &BinderContext,
        conditions: Vec<ConditionSqlNode>,
        conjunction: ConjunctionType,
    ) -> Result<Option<FilterStmt>, ExecutorError> {
        if conditions.is_empty() {
            return Ok(None);
        }
        let binder = ExpressionBinder::new(db, context);
        let mut bound = Vec::with_capacity(conditions.len());
        for condition in conditions {
            let ConditionSqlNode { left, comp, right } = condition;
            let expr = match comp {
                CompOp::Is | CompOp::IsNot => {
                    let left = left.ok_or_else(|| {
                        ExecutorError::InvalidArgument("IS requires a left operand".into())
                    })?;
                    Expression::is_expr(comp, left, right)
                }
                CompOp::Like | CompOp::NotLike => {
                    let left = left.ok_or_else(|| {
                        ExecutorError::InvalidArgument("LIKE requires a left operand".into())
                    })?;
                    Expression::like_expr(comp, left, right)
                }
                _ => Expression::comparison(comp, left, right),
            };
            bound.push(binder.bind_one(expr)?);
        }
        Ok(Some(FilterStmt {
            conditions: bound,
            conjunction,
        }))
    }
}

/// A bound SELECT.
pub struct SelectStmt {
    pub tables: Vec<Arc<Table>>,
    pub table_aliases: Vec<Option<String>>,
    pub query_expressions: Vec<Expression>,
    pub filter_stmt: Option<FilterStmt>,
    pub group_by: Vec<Expression>,
}

impl SelectStmt {
    /// Creates a bound SELECT; `outer` carries the enclosing scopes'
    /// tables and aliases when this is a subquery.
    pub fn create(
        db: &Arc<Db>,
        mut node: SelectSqlNode,
        outer: Option<&BinderContext>,
    ) -> Result<SelectStmt, ExecutorError> {
        // Resolve FROM tables, rejecting duplicate aliases.
        let mut tables = Vec::with_capacity(node.relations.len());
        let mut table_aliases = Vec::with_capacity(node.relations.len());
        let mut alias2name: HashMap<String, String> = HashMap::new();
        for relation in &node.relations {
            let table = db.find_table(&relation.name).ok_or_else(|| {
                log::warn!("no such table in from list: {}", relation.name);
                ExecutorError::TableNotFound {
                    name: relation.name.clone(),
                }
            })?;
            if let Some(alias) = &relation.alias {
                if alias2name.contains_key(alias) {
                    return Err(ExecutorError::InvalidArgument(format!(
                        "duplicate table alias {}",
                        alias
                    )));
                }
                alias2name.insert(alias.clone(), relation.name.clone());
            }
            tables.push(table);
            table_aliases.push(relation.alias.clone());
        }

        // Build the binder context: own tables first, then the outer
        // scopes for correlated subqueries. Outer aliases are visible but
        // shadowed by this scope's.
        let mut context = BinderContext::new();
        for table in &tables {
            context.add_table(table.clone());
        }
        for (alias, name) in &alias2name {
            context.add_alias(alias, name);
        }
        if let Some(outer) = outer {
            // A table named in this scope shadows the outer occurrence, so
            // a subquery over the same table does not make its own fields
            // ambiguous.
            for table in outer.query_tables() {
                if context.find_table(table.name()).is_none() {
                    context.add_table(table.clone());
                }
            }
            for (alias, name) in outer.aliases() {
                context.add_alias(alias, name);
            }
        }

        // Rewrite alias qualifiers back to real table names everywhere
        // names can appear, remembering the alias on each node so output
        // schemas and lookups can still use it.
        for expression in &mut node.expressions {
            rewrite_table_aliases(expression, context.aliases());
            if matches!(expression.kind, ExprKind::Star { .. })
                && !expression.alias().is_empty()
            {
                return Err(ExecutorError::InvalidArgument(
                    "* cannot be aliased".into(),
                ));
            }
        }
        for condition in &mut node.conditions {
            if let Some(left) = &mut condition.left {
                rewrite_table_aliases(left, context.aliases());
            }
            rewrite_table_aliases(&mut condition.right, context.aliases());
        }
        for expression in &mut node.group_by {
            rewrite_table_aliases(expression, context.aliases());
        }

        // With aggregation present, every plain select expression must
        // reappear in GROUP BY. The full check (including expressions
        // nested under aggregates) runs again during planning; this early
        // pass rejects the obvious shapes before binding.
        let has_aggregation = node
            .expressions
            .iter()
            .any(|e| matches!(e.kind, ExprKind::UnboundAggregation { .. }));
        if has_aggregation {
            for select_expr in &node.expressions {
                if matches!(select_expr.kind, ExprKind::UnboundAggregation { .. }) {
                    continue;
                }
                if let ExprKind::Arithmetic(arith) = &select_expr.kind {
                    let both_aggregates = matches!(
                        arith.left.kind,
                        ExprKind::UnboundAggregation { .. }
                    ) && arith
                        .right
                        .as_ref()
                        .is_some_and(|r| matches!(r.kind, ExprKind::UnboundAggregation { .. }));
                    if both_aggregates {
                        continue;
                    }
                }
                let found = node.group_by.iter().any(|g| select_expr.equal(g));
                if !found {
                    log::warn!(
                        "select expression {} is neither aggregated nor grouped",
                        select_expr
                    );
                    return Err(ExecutorError::InvalidArgument(format!(
                        "{} must appear in GROUP BY or inside an aggregate",
                        select_expr
                    )));
                }
            }
        }

        let binder = ExpressionBinder::new(db, &context);
        let mut query_expressions = Vec::new();
        for expression in node.expressions {
            query_expressions.extend(binder.bind_expression(expression)?);
        }

        let mut group_by = Vec::new();
        for expression in node.group_by {
            group_by.extend(binder.bind_expression(expression)?);
        }

        let filter_stmt = FilterStmt::create(db, &context, node.conditions, node.conjunction)?;

        Ok(SelectStmt {
            tables,
            table_aliases,
            query_expressions,
            filter_stmt,
            group_by,
        })
    }
}

/// A bound INSERT with values already cast to the field types.
pub struct InsertStmt {
    pub table: Arc<Table>,
    pub values: Vec<Value>,
}

impl InsertStmt {
    fn create(db: &Arc<Db>, node: InsertSqlNode) -> Result<InsertStmt, ExecutorError> {
        let table = db.find_table(&node.relation).ok_or_else(|| {
            ExecutorError::TableNotFound {
                name: node.relation.clone(),
            }
        })?;
        let meta = table.table_meta();
        let user_fields: Vec<&FieldMeta> = meta.user_fields().collect();
        if node.values.len() != user_fields.len() {
            return Err(ExecutorError::InvalidArgument(format!(
                "table {} expects {} values, got {}",
                table.name(),
                user_fields.len(),
                node.values.len()
            )));
        }

        let mut values = Vec::with_capacity(node.values.len());
        for (field, value) in user_fields.iter().zip(node.values) {
            if value.is_null() {
                if !field.nullable {
                    return Err(ExecutorError::InvalidArgument(format!(
                        "field {} does not accept NULL",
                        field.name
                    )));
                }
                values.push(Value::Null);
                continue;
            }
            if Value::cast_cost(value.attr_type(), field.attr_type) == i32::MAX {
                return Err(type_mismatch(field, &value));
            }
            let cast = value
                .cast_to(field.attr_type)
                .map_err(|_| type_mismatch(field, &value))?;
            values.push(cast);
        }
        Ok(InsertStmt { table, values })
    }
}

fn type_mismatch(field: &FieldMeta, value: &Value) -> ExecutorError {
    ExecutorError::TypeMismatch {
        expected: format!("{} for field {}", field.attr_type, field.name),
        found: value.attr_type().to_string(),
    }
}

/// A bound UPDATE: target table, assignments, optional filter.
pub struct UpdateStmt {
    pub table: Arc<Table>,
    pub assignments: Vec<(FieldMeta, Expression)>,
    pub filter_stmt: Option<FilterStmt>,
}

impl UpdateStmt {
    fn create(db: &Arc<Db>, node: UpdateSqlNode) -> Result<UpdateStmt, ExecutorError> {
        let table = db.find_table(&node.relation).ok_or_else(|| {
            ExecutorError::TableNotFound {
                name: node.relation.clone(),
            }
        })?;
        let mut context = BinderContext::new();
        context.add_table(table.clone());
        let binder = ExpressionBinder::new(db, &context);

        let mut assignments = Vec::with_capacity(node.assignments.len());
        for (field_name, expression) in node.assignments {
            let field = table
                .table_meta()
                .field(&field_name)
                .ok_or_else(|| ExecutorError::FieldMissing {
                    name: field_name.clone(),
                })?
                .clone();
            assignments.push((field, binder.bind_one(expression)?));
        }
        if assignments.is_empty() {
            return Err(ExecutorError::InvalidArgument(
                "UPDATE requires at least one assignment".into(),
            ));
        }

        let filter_stmt = FilterStmt::create(db, &context, node.conditions, node.conjunction)?;
        Ok(UpdateStmt {
            table,
            assignments,
            filter_stmt,
        })
    }
}

/// A bound DELETE.
pub struct DeleteStmt {
    pub table: Arc<Table>,
    pub filter_stmt: Option<FilterStmt>,
}

impl DeleteStmt {
    fn create(db: &Arc<Db>, node: DeleteSqlNode) -> Result<DeleteStmt, ExecutorError> {
        let table = db.find_table(&node.relation).ok_or_else(|| {
            ExecutorError::TableNotFound {
                name: node.relation.clone(),
            }
        })?;
        let mut context = BinderContext::new();
        context.add_table(table.clone());
        let filter_stmt = FilterStmt::create(db, &context, node.conditions, node.conjunction)?;
        Ok(DeleteStmt { table, filter_stmt })
    }
}

/// A bound EXPLAIN wrapping its child statement.
pub struct ExplainStmt {
    pub child: Box<Stmt>,
}

impl ExplainStmt {
    fn create(db: &Arc<Db>, node: ExplainSqlNode) -> Result<ExplainStmt, ExecutorError> {
        let child = Stmt::create(db, *node.child)?;
        Ok(ExplainStmt {
            child: Box::new(child),
        })
    }
}

/// A bound CALC: a bare expression list over no table.
pub struct CalcStmt {
    pub expressions: Vec<Expression>,
}

impl CalcStmt {
    fn create(db: &Arc<Db>, node: CalcSqlNode) -> Result<CalcStmt, ExecutorError> {
        let context = BinderContext::new();
        let binder = ExpressionBinder::new(db, &context);
        let mut expressions = Vec::with_capacity(node.expressions.len());
        for expression in node.expressions {
            expressions.push(binder.bind_one(expression)?);
        }
        Ok(CalcStmt { expressions })
    }
}

/// Rewrites alias table qualifiers to real table names throughout an
/// unbound expression tree, remembering the alias on each rewritten node.
fn rewrite_table_aliases(expr: &mut Expression, alias2name: &HashMap<String, String>) {
    let mut rewritten_alias: Option<String> = None;
    match &mut expr.kind {
        ExprKind::Star {
            table_name: Some(t),
        }
        | ExprKind::UnboundField {
            table_name: Some(t),
            ..
        } => {
            if let Some(real) = alias2name.get(t.as_str()) {
                rewritten_alias = Some(t.clone());
                *t = real.clone();
            }
        }
        _ => {}
    }
    if let Some(alias) = rewritten_alias {
        expr.set_table_alias(&alias);
    }
    let _ = expr.visit_children_mut::<()>(&mut |child| {
        rewrite_table_aliases(child, alias2name);
        Ok(())
    });
}
