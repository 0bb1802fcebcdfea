//! Catalog-aware expression binding.
//!
//! The binder consumes parser-produced expression trees and resolves every
//! Star and Unbound* node against the visible tables: `*` expands to one
//! Field per user column, unbound fields become [`FieldExpr`]s, unbound
//! aggregate calls become validated [`AggregateExpr`]s, and subqueries get
//! their statements created recursively with the outer scope's tables
//! appended for correlation. After binding, no placeholder node remains in
//! the tree.

use std::sync::Arc;

use crate::catalog::{Db, Table};
use crate::value::{AttrType, Value};

use super::aggregate::AggregateType;
use super::error::ExecutorError;
use super::expr::{AggregateExpr, ExprKind, Expression, SysFunctionExpr};
use super::stmt::SelectStmt;

/// The tables visible to name resolution, in scope order (the statement's
/// own FROM tables first, then any outer scopes for correlated
/// subqueries), together with the table aliases declared by those scopes.
#[derive(Default)]
pub struct BinderContext {
    tables: Vec<Arc<Table>>,
    aliases: std::collections::HashMap<String, String>,
}

impl BinderContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_table(&mut self, table: Arc<Table>) {
        self.tables.push(table);
    }

    /// Registers `alias` for `table_name`. An inner scope's alias shadows
    /// an outer scope's.
    pub fn add_alias(&mut self, alias: &str, table_name: &str) {
        self.aliases
            .entry(alias.to_string())
            .or_insert_with(|| table_name.to_string());
    }

    /// Finds a visible table by name, case-insensitively.
    pub fn find_table(&self, name: &str) -> Option<Arc<Table>> {
        self.tables
            .iter()
            .find(|t| t.name().eq_ignore_ascii_case(name))
            .cloned()
    }

    pub fn query_tables(&self) -> &[Arc<Table>] {
        &self.tables
    }

    /// All declared aliases, alias to real table name.
    pub fn aliases(&self) -> &std::collections::HashMap<String, String> {
        &self.aliases
    }
}

/// Binds expressions against a [`BinderContext`].
pub struct ExpressionBinder<'a> {
    db: &'a Arc<Db>,
    context: &'a BinderContext,
}

impl<'a> ExpressionBinder<'a> {
    pub fn new(db: &'a Arc<Db>, context: &'a BinderContext) -> Self {
        Self { db, context }
    }

    /// Binds one expression tree, producing its bound form.
    ///
    /// Star expansion is the only case that yields more than one result;
    /// every other node binds to exactly one expression with its children
    /// rewritten in place.
    pub fn bind_expression(
        &self,
        expr: Expression,
    ) -> Result<Vec<Expression>, ExecutorError> {
        match &expr.kind {
            ExprKind::Star { .. } => self.bind_star(expr),
            ExprKind::UnboundField { .. } => self.bind_unbound_field(expr),
            ExprKind::UnboundAggregation { .. } => self.bind_aggregate(expr),
            ExprKind::Value(v) => {
                if v.attr_type() == AttrType::Undefined {
                    return Err(ExecutorError::InvalidArgument(
                        "constant of undefined type".into(),
                    ));
                }
                Ok(vec![expr])
            }
            ExprKind::Field(_) | ExprKind::ValueList(_) | ExprKind::Aggregation(_) => {
                Ok(vec![expr])
            }
            ExprKind::Cast { .. }
            | ExprKind::Comparison(_)
            | ExprKind::Conjunction { .. }
            | ExprKind::Arithmetic(_)
            | ExprKind::Like { .. } => self.bind_children(expr),
            ExprKind::Is { .. } => self.bind_is(expr),
            ExprKind::SysFunction(_) => self.bind_sys_function(expr),
            ExprKind::Subquery(_) => self.bind_subquery(expr),
        }
    }

    /// Binds an expression that must resolve to exactly one node.
    pub(super) fn bind_one(&self, expr: Expression) -> Result<Expression, ExecutorError> {
        let mut bound = self.bind_expression(expr)?;
        if bound.len() != 1 {
            log::warn!("expression bound to {} nodes where one was expected", bound.len());
            return Err(ExecutorError::InvalidArgument(
                "wildcard is not allowed here".into(),
            ));
        }
        Ok(bound.pop().unwrap())
    }

    fn bind_star(&self, expr: Expression) -> Result<Vec<Expression>, ExecutorError> {
        let table_alias = expr.table_alias().to_string();
        let table_name = match &expr.kind {
            ExprKind::Star { table_name } => table_name.clone(),
            _ => unreachable!(),
        };

        let mut to_expand = Vec::new();
        match table_name.as_deref() {
            Some(name) if name != "*" => {
                let table = self.context.find_table(name).ok_or_else(|| {
                    ExecutorError::TableNotFound {
                        name: name.to_string(),
                    }
                })?;
                to_expand.push(table);
            }
            _ => to_expand.extend_from_slice(self.context.query_tables()),
        }

        let mut expanded = Vec::new();
        for table in &to_expand {
            wildcard_fields(table, &table_alias, &mut expanded);
        }
        Ok(expanded)
    }

    fn bind_unbound_field(&self, expr: Expression) -> Result<Vec<Expression>, ExecutorError> {
        let alias = expr.alias().to_string();
        let table_alias = expr.table_alias().to_string();
        let (table_name, field_name) = match &expr.kind {
            ExprKind::UnboundField {
                table_name,
                field_name,
            } => (table_name.clone(), field_name.clone()),
            _ => unreachable!(),
        };

        let table = match &table_name {
            None => {
                // No qualifier: the field must be unambiguous across every
                // visible table, including outer-scope tables brought in
                // for correlated subqueries.
                let mut found: Option<Arc<Table>> = None;
                for table in self.context.query_tables() {
                    if table.table_meta().field(&field_name).is_some() {
                        if found.is_some() {
                            log::warn!("ambiguous field name {}", field_name);
                            return Err(ExecutorError::InvalidArgument(format!(
                                "field {} is ambiguous",
                                field_name
                            )));
                        }
                        found = Some(table.clone());
                    }
                }
                found.ok_or_else(|| ExecutorError::FieldMissing {
                    name: field_name.clone(),
                })?
            }
            Some(name) => self.context.find_table(name).ok_or_else(|| {
                ExecutorError::TableNotFound {
                    name: name.clone(),
                }
            })?,
        };

        if field_name == "*" {
            let mut expanded = Vec::new();
            wildcard_fields(&table, &table_alias, &mut expanded);
            return Ok(expanded);
        }

        let field = table
            .table_meta()
            .field(&field_name)
            .ok_or_else(|| ExecutorError::FieldMissing {
                name: field_name.clone(),
            })?;
        let mut bound = Expression::field(table.name(), field);
        bound.set_name(field_name.clone());
        bound.set_alias(&alias);
        bound.set_table_alias(&table_alias);
        Ok(vec![bound])
    }

    fn bind_aggregate(&self, expr: Expression) -> Result<Vec<Expression>, ExecutorError> {
        let name = expr.name().to_string();
        let alias = expr.alias().to_string();
        let (aggregate_name, child) = match expr.kind {
            ExprKind::UnboundAggregation {
                aggregate_name,
                child,
            } => (aggregate_name, child),
            _ => unreachable!(),
        };

        let aggregate_type = AggregateType::from_name(&aggregate_name).ok_or_else(|| {
            log::warn!("unknown aggregate function {}", aggregate_name);
            ExecutorError::InvalidArgument(format!(
                "unknown aggregate function {}",
                aggregate_name
            ))
        })?;

        // COUNT(*) counts rows: the child becomes the never-NULL constant
        // 1. Every other aggregate binds its child expression.
        let child = if aggregate_type == AggregateType::Count
            && matches!(child.kind, ExprKind::Star { .. })
        {
            Expression::value(Value::Int(1))
        } else {
            self.bind_one(*child)?
        };

        match aggregate_type {
            AggregateType::Sum | AggregateType::Avg => {
                let child_type = child.value_type();
                if child_type != AttrType::Int && child_type != AttrType::Float {
                    return Err(ExecutorError::InvalidArgument(format!(
                        "{} requires a numeric operand, got {}",
                        aggregate_type, child_type
                    )));
                }
            }
            _ => {}
        }
        if contains_aggregation(&child) {
            return Err(ExecutorError::InvalidArgument(
                "aggregate functions cannot be nested".into(),
            ));
        }

        let mut bound = Expression::aggregation(aggregate_type, child);
        if name.is_empty() {
            let synthesized = match &bound.kind {
                ExprKind::Aggregation(AggregateExpr { child, .. }) => {
                    format!("{}({})", aggregate_type, child)
                }
                _ => unreachable!(),
            };
            bound.set_name(synthesized);
        } else {
            bound.set_name(name);
        }
        bound.set_alias(&alias);
        Ok(vec![bound])
    }

    fn bind_sys_function(&self, mut expr: Expression) -> Result<Vec<Expression>, ExecutorError> {
        let kind = std::mem::replace(&mut expr.kind, ExprKind::Value(Value::Null));
        let func = match kind {
            ExprKind::SysFunction(f) => f,
            _ => unreachable!(),
        };
        let mut params = Vec::with_capacity(func.params.len());
        for param in func.params {
            params.push(self.bind_one(param)?);
        }
        let bound = SysFunctionExpr {
            func: func.func,
            params,
        };
        bound.check_params()?;
        expr.kind = ExprKind::SysFunction(bound);
        Ok(vec![expr])
    }

    /// Rebinds every child of a structural node in place.
    fn bind_children(&self, mut expr: Expression) -> Result<Vec<Expression>, ExecutorError> {
        let kind = std::mem::replace(&mut expr.kind, ExprKind::Value(Value::Null));
        expr.kind = match kind {
            ExprKind::Cast { child, target } => ExprKind::Cast {
                child: Box::new(self.bind_one(*child)?),
                target,
            },
            ExprKind::Comparison(mut cmp) => {
                cmp.left = match cmp.left {
                    Some(left) => Some(Box::new(self.bind_one(*left)?)),
                    None => None,
                };
                cmp.right = Box::new(self.bind_one(*cmp.right)?);
                ExprKind::Comparison(cmp)
            }
            ExprKind::Conjunction {
                conjunction_type,
                children,
            } => ExprKind::Conjunction {
                conjunction_type,
                children: children
                    .into_iter()
                    .map(|c| self.bind_one(c))
                    .collect::<Result<_, _>>()?,
            },
            ExprKind::Arithmetic(mut arith) => {
                arith.left = Box::new(self.bind_one(*arith.left)?);
                arith.right = match arith.right {
                    Some(right) => Some(Box::new(self.bind_one(*right)?)),
                    None => None,
                };
                ExprKind::Arithmetic(arith)
            }
            ExprKind::Like { comp, left, right } => ExprKind::Like {
                comp,
                left: Box::new(self.bind_one(*left)?),
                right: Box::new(self.bind_one(*right)?),
            },
            _ => unreachable!(),
        };
        Ok(vec![expr])
    }

    fn bind_is(&self, mut expr: Expression) -> Result<Vec<Expression>, ExecutorError> {
        let kind = std::mem::replace(&mut expr.kind, ExprKind::Value(Value::Null));
        let (comp, left, right) = match kind {
            ExprKind::Is { comp, left, right } => (comp, left, right),
            _ => unreachable!(),
        };
        if !matches!(right.kind, ExprKind::Value(_)) {
            return Err(ExecutorError::InvalidArgument(
                "right operand of IS must be a constant".into(),
            ));
        }
        expr.kind = ExprKind::Is {
            comp,
            left: Box::new(self.bind_one(*left)?),
            right,
        };
        Ok(vec![expr])
    }

    fn bind_subquery(&self, mut expr: Expression) -> Result<Vec<Expression>, ExecutorError> {
        let sub = match &mut expr.kind {
            ExprKind::Subquery(sub) => sub,
            _ => unreachable!(),
        };
        let node = sub.select_node.take().ok_or_else(|| {
            ExecutorError::Internal("subquery bound twice".into())
        })?;
        let stmt = SelectStmt::create(self.db, *node, Some(self.context))?;
        sub.stmt = Some(Box::new(stmt));
        Ok(vec![expr])
    }
}

/// Expands one table into Field expressions over its user columns.
fn wildcard_fields(table: &Arc<Table>, table_alias: &str, out: &mut Vec<Expression>) {
    for field in table.table_meta().user_fields() {
        let mut expr = Expression::field(table.name(), field);
        expr.set_name(field.name.clone());
        expr.set_table_alias(table_alias);
        out.push(expr);
    }
}

/// Whether the tree contains a bound aggregate node.
fn contains_aggregation(expr: &Expression) -> bool {
    if matches!(expr.kind, ExprKind::Aggregation(_)) {
        return true;
    }
    let mut found = false;
    let _ = expr.visit_children::<()>(&mut |child| {
        if contains_aggregation(child) {
            found = true;
        }
        Ok(())
    });
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::FieldDef;
    use crate::executor::ExprType;
    use crate::sql::CompOp;

    fn setup() -> (Arc<Db>, BinderContext) {
        let db = Db::new();
        db.create_table(
            "t",
            &[FieldDef::int("id"), FieldDef::chars("name", 8)],
        )
        .unwrap();
        db.create_table(
            "u",
            &[FieldDef::int("id"), FieldDef::float("score")],
        )
        .unwrap();
        let mut context = BinderContext::new();
        context.add_table(db.find_table("t").unwrap());
        context.add_table(db.find_table("u").unwrap());
        (db, context)
    }

    #[test]
    fn test_star_expands_all_tables() {
        let (db, context) = setup();
        let binder = ExpressionBinder::new(&db, &context);
        let bound = binder.bind_expression(Expression::star(None)).unwrap();
        assert_eq!(bound.len(), 4);
        assert!(bound.iter().all(|e| e.expr_type() == ExprType::Field));
    }

    #[test]
    fn test_star_with_table_qualifier() {
        let (db, context) = setup();
        let binder = ExpressionBinder::new(&db, &context);
        let bound = binder.bind_expression(Expression::star(Some("u"))).unwrap();
        assert_eq!(bound.len(), 2);
        assert_eq!(bound[0].name(), "id");
        assert_eq!(bound[1].name(), "score");

        assert!(matches!(
            binder.bind_expression(Expression::star(Some("missing"))),
            Err(ExecutorError::TableNotFound { .. })
        ));
    }

    #[test]
    fn test_unbound_field_resolution() {
        let (db, context) = setup();
        let binder = ExpressionBinder::new(&db, &context);

        // Unqualified and unique across tables.
        let bound = binder
            .bind_expression(Expression::unbound_field(None, "name"))
            .unwrap();
        assert_eq!(bound.len(), 1);
        assert_eq!(bound[0].expr_type(), ExprType::Field);
        assert_eq!(bound[0].value_type(), AttrType::Chars);

        // Present in both tables: ambiguous.
        assert!(matches!(
            binder.bind_expression(Expression::unbound_field(None, "id")),
            Err(ExecutorError::InvalidArgument(_))
        ));

        // Qualified resolves the ambiguity.
        let bound = binder
            .bind_expression(Expression::unbound_field(Some("u"), "id"))
            .unwrap();
        assert_eq!(bound.len(), 1);

        assert!(matches!(
            binder.bind_expression(Expression::unbound_field(None, "missing")),
            Err(ExecutorError::FieldMissing { .. })
        ));
    }

    #[test]
    fn test_count_star_child_becomes_constant_one() {
        let (db, context) = setup();
        let binder = ExpressionBinder::new(&db, &context);
        let bound = binder
            .bind_expression(Expression::unbound_aggregation(
                "count",
                Expression::star(None),
            ))
            .unwrap();
        assert_eq!(bound.len(), 1);
        assert_eq!(bound[0].name(), "count(*)");
        match &bound[0].kind {
            ExprKind::Aggregation(agg) => {
                assert_eq!(agg.aggregate_type, AggregateType::Count);
                assert!(matches!(agg.child.kind, ExprKind::Value(Value::Int(1))));
            }
            other => panic!("expected aggregation, got {:?}", other),
        }
    }

    #[test]
    fn test_sum_requires_numeric_child() {
        let (db, context) = setup();
        let binder = ExpressionBinder::new(&db, &context);
        assert!(matches!(
            binder.bind_expression(Expression::unbound_aggregation(
                "sum",
                Expression::unbound_field(None, "name"),
            )),
            Err(ExecutorError::InvalidArgument(_))
        ));
        assert!(binder
            .bind_expression(Expression::unbound_aggregation(
                "sum",
                Expression::unbound_field(Some("u"), "score"),
            ))
            .is_ok());
    }

    #[test]
    fn test_nested_aggregates_rejected() {
        let (db, context) = setup();
        let binder = ExpressionBinder::new(&db, &context);
        let nested = Expression::unbound_aggregation(
            "max",
            Expression::unbound_aggregation("count", Expression::star(None)),
        );
        // The inner unbound aggregation binds first, so the outer check
        // sees a bound aggregate in its child tree.
        assert!(binder.bind_expression(nested).is_err());
    }

    #[test]
    fn test_unknown_aggregate_name() {
        let (db, context) = setup();
        let binder = ExpressionBinder::new(&db, &context);
        assert!(matches!(
            binder.bind_expression(Expression::unbound_aggregation(
                "median",
                Expression::star(None),
            )),
            Err(ExecutorError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_comparison_binds_children_in_place() {
        let (db, context) = setup();
        let binder = ExpressionBinder::new(&db, &context);
        let cmp = Expression::comparison(
            CompOp::GreatThan,
            Some(Expression::unbound_field(None, "name")),
            Expression::value(Value::Chars("a".into())),
        );
        let bound = binder.bind_one(cmp).unwrap();
        match &bound.kind {
            ExprKind::Comparison(c) => {
                assert_eq!(c.left.as_ref().unwrap().expr_type(), ExprType::Field);
            }
            other => panic!("expected comparison, got {:?}", other),
        }
    }

    #[test]
    fn test_is_right_operand_must_be_constant() {
        let (db, context) = setup();
        let binder = ExpressionBinder::new(&db, &context);
        let bad = Expression::is_expr(
            CompOp::Is,
            Expression::unbound_field(None, "name"),
            Expression::unbound_field(Some("u"), "score"),
        );
        assert!(matches!(
            binder.bind_expression(bad),
            Err(ExecutorError::InvalidArgument(_))
        ));
    }
}
