//! Row-path expression evaluation.
//!
//! [`Expression::evaluate`] computes a single [`Value`] against a tuple.
//! The comparison driver in this module also implements the subquery and
//! value-list shapes: IN / NOT IN scan their right-hand rows, EXISTS /
//! NOT EXISTS probe for any row, and scalar-context subqueries are
//! enforced to a single row. Any subquery driven here is closed again
//! before the comparison returns.
//!
//! Comparisons collapse three-valued logic to two-valued: an incomparable
//! result (anything against NULL) is false, so a predicate always yields
//! a Boolean value, never NULL.

use std::cmp::Ordering;

use crate::sql::{CompOp, ConjunctionType};
use crate::value::Value;

use super::error::ExecutorError;
use super::expr::{ArithmeticType, ComparisonExpr, ExprKind, Expression, SubqueryExpr};
use super::like::string_like;
use super::tuple::{Tuple, TupleCellSpec};

impl Expression {
    /// Evaluates this expression against one tuple.
    pub fn evaluate(&self, tuple: &Tuple) -> Result<Value, ExecutorError> {
        match &self.kind {
            ExprKind::Star { .. }
            | ExprKind::UnboundField { .. }
            | ExprKind::UnboundAggregation { .. } => Err(ExecutorError::Internal(format!(
                "unbound expression {} reached evaluation",
                self
            ))),

            ExprKind::Field(field_expr) => {
                let spec = TupleCellSpec::new(
                    Some(field_expr.table_name.as_str()),
                    &field_expr.field.name,
                )
                .with_table_alias(self.table_alias());
                tuple.find_cell(&spec)?.ok_or_else(|| {
                    ExecutorError::Internal(format!(
                        "cell {}.{} not found in tuple",
                        field_expr.table_name, field_expr.field.name
                    ))
                })
            }

            ExprKind::Value(v) => Ok(v.clone()),

            ExprKind::Cast { child, target } => {
                let v = child.evaluate(tuple)?;
                if v.attr_type() == *target {
                    Ok(v)
                } else {
                    Ok(v.cast_to(*target)?)
                }
            }

            ExprKind::Comparison(cmp) => cmp.eval_row(tuple),

            ExprKind::Conjunction {
                conjunction_type,
                children,
            } => {
                if children.is_empty() {
                    return Ok(Value::Boolean(true));
                }
                for child in children {
                    let truthy = child.evaluate(tuple)?.get_boolean();
                    match conjunction_type {
                        ConjunctionType::And if !truthy => return Ok(Value::Boolean(false)),
                        ConjunctionType::Or if truthy => return Ok(Value::Boolean(true)),
                        _ => {}
                    }
                }
                Ok(Value::Boolean(*conjunction_type == ConjunctionType::And))
            }

            ExprKind::Arithmetic(arith) => {
                let left = arith.left.evaluate(tuple)?;
                let right = match &arith.right {
                    Some(r) => Some(r.evaluate(tuple)?),
                    None => None,
                };
                calc_arithmetic(arith.arithmetic_type, &left, right.as_ref())
            }

            // A bound aggregate never recomputes: it reads the cell the
            // group-by operator produced under this expression's name.
            ExprKind::Aggregation(_) => {
                let spec = TupleCellSpec::by_name(self.name());
                tuple.find_cell(&spec)?.ok_or_else(|| {
                    ExecutorError::Internal(format!(
                        "aggregate result {} not found in tuple",
                        self.name()
                    ))
                })
            }

            ExprKind::SysFunction(func) => {
                let mut params = Vec::with_capacity(func.params.len());
                for param in &func.params {
                    params.push(param.evaluate(tuple)?);
                }
                func.compute(&params)
            }

            ExprKind::Is { comp, left, right } => {
                let right_value = match &right.kind {
                    ExprKind::Value(v) => v.clone(),
                    _ => {
                        return Err(ExecutorError::InvalidArgument(
                            "right operand of IS must be a constant".into(),
                        ));
                    }
                };
                let left_value = left.evaluate(tuple)?;
                let negated = *comp == CompOp::IsNot;
                match right_value {
                    Value::Null => Ok(Value::Boolean(left_value.is_null() != negated)),
                    Value::Boolean(b) => {
                        Ok(Value::Boolean((left_value.get_boolean() == b) != negated))
                    }
                    _ => Err(ExecutorError::InvalidArgument(
                        "right operand of IS must be NULL or a boolean".into(),
                    )),
                }
            }

            ExprKind::Like { comp, left, right } => {
                let left_value = left.evaluate(tuple)?;
                let right_value = right.evaluate(tuple)?;
                if left_value.is_null() || right_value.is_null() {
                    return Ok(Value::Boolean(false));
                }
                let (s, pattern) = match (&left_value, &right_value) {
                    (Value::Chars(s), Value::Chars(p)) => (s, p),
                    _ => {
                        log::warn!(
                            "LIKE over {} and {} is not supported",
                            left_value.attr_type(),
                            right_value.attr_type()
                        );
                        return Err(ExecutorError::Unimplemented(
                            "LIKE supports chars operands only".into(),
                        ));
                    }
                };
                let matched = string_like(s, pattern)?;
                Ok(Value::Boolean(matched == (*comp == CompOp::Like)))
            }

            ExprKind::ValueList(_) => Err(ExecutorError::Internal(
                "value list evaluated outside a comparison".into(),
            )),

            ExprKind::Subquery(_) => Err(ExecutorError::Internal(
                "subquery evaluated outside a comparison".into(),
            )),
        }
    }

    /// Evaluates this expression without a tuple, where possible.
    ///
    /// Constants, casts and arithmetic over constants, constant-only
    /// comparisons, and system functions over constants fold; everything
    /// else reports `Unimplemented`.
    pub fn try_evaluate(&self) -> Result<Value, ExecutorError> {
        match &self.kind {
            ExprKind::Value(v) => Ok(v.clone()),
            ExprKind::Cast { child, target } => {
                let v = child.try_evaluate()?;
                if v.attr_type() == *target {
                    Ok(v)
                } else {
                    Ok(v.cast_to(*target)?)
                }
            }
            ExprKind::Arithmetic(arith) => {
                let left = arith.left.try_evaluate()?;
                let right = match &arith.right {
                    Some(r) => Some(r.try_evaluate()?),
                    None => None,
                };
                calc_arithmetic(arith.arithmetic_type, &left, right.as_ref())
            }
            ExprKind::Comparison(cmp) => match (&cmp.left, &cmp.right.kind) {
                (Some(left), ExprKind::Value(rv)) => match &left.kind {
                    ExprKind::Value(lv) => {
                        Ok(Value::Boolean(compare_by_op(cmp.comp, lv, rv)?))
                    }
                    _ => Err(ExecutorError::InvalidArgument(
                        "comparison is not constant".into(),
                    )),
                },
                _ => Err(ExecutorError::InvalidArgument(
                    "comparison is not constant".into(),
                )),
            },
            ExprKind::SysFunction(func) => {
                let mut params = Vec::with_capacity(func.params.len());
                for param in &func.params {
                    params.push(param.try_evaluate()?);
                }
                func.compute(&params)
            }
            _ => Err(ExecutorError::Unimplemented(format!(
                "{:?} expressions have no tuple-free value",
                self.expr_type()
            ))),
        }
    }
}

/// Applies an arithmetic operator to evaluated operands.
fn calc_arithmetic(
    op: ArithmeticType,
    left: &Value,
    right: Option<&Value>,
) -> Result<Value, ExecutorError> {
    let result = match op {
        ArithmeticType::Negative => Value::negative(left)?,
        ArithmeticType::Add => Value::add(left, required(right)?)?,
        ArithmeticType::Sub => Value::subtract(left, required(right)?)?,
        ArithmeticType::Mul => Value::multiply(left, required(right)?)?,
        ArithmeticType::Div => Value::divide(left, required(right)?)?,
    };
    Ok(result)
}

fn required(right: Option<&Value>) -> Result<&Value, ExecutorError> {
    right.ok_or_else(|| ExecutorError::Internal("binary operator missing right operand".into()))
}

/// Maps an ordering (or the incomparable sentinel) through a scalar
/// comparison operator. Incomparable always collapses to false.
fn compare_by_op(comp: CompOp, left: &Value, right: &Value) -> Result<bool, ExecutorError> {
    let ord = match left.compare(right) {
        None => return Ok(false),
        Some(ord) => ord,
    };
    let result = match comp {
        CompOp::EqualTo => ord == Ordering::Equal,
        CompOp::NotEqual => ord != Ordering::Equal,
        CompOp::LessThan => ord == Ordering::Less,
        CompOp::LessEqual => ord != Ordering::Greater,
        CompOp::GreatThan => ord == Ordering::Greater,
        CompOp::GreatEqual => ord != Ordering::Less,
        other => {
            return Err(ExecutorError::Internal(format!(
                "{} is not a scalar comparison",
                other
            )));
        }
    };
    Ok(result)
}

impl ComparisonExpr {
    /// Evaluates the comparison against one tuple, producing a Boolean.
    ///
    /// The operand kinds select the code path: membership (IN / NOT IN)
    /// and existence shapes are driven by a value list or subquery on the
    /// right; everything else is a scalar comparison, where a subquery
    /// operand must produce at most one row.
    pub fn eval_row(&self, tuple: &Tuple) -> Result<Value, ExecutorError> {
        match self.comp {
            CompOp::Exists | CompOp::NotExists => self.eval_exists(tuple),
            CompOp::In | CompOp::NotIn => self.eval_membership(tuple),
            CompOp::Is | CompOp::IsNot | CompOp::Like | CompOp::NotLike => {
                Err(ExecutorError::InvalidArgument(format!(
                    "{} is carried by its dedicated expression kind",
                    self.comp
                )))
            }
            _ => self.eval_scalar(tuple),
        }
    }

    fn eval_exists(&self, tuple: &Tuple) -> Result<Value, ExecutorError> {
        if self.left.is_some() {
            return Err(ExecutorError::InvalidArgument(
                "EXISTS takes no left operand".into(),
            ));
        }
        let want = self.comp == CompOp::Exists;
        match &self.right.kind {
            ExprKind::Subquery(sub) => {
                sub.open(Some(tuple))?;
                let fetched = sub.next_row();
                let close_rc = sub.close();
                let any = fetched?.is_some();
                close_rc?;
                Ok(Value::Boolean(any == want))
            }
            ExprKind::ValueList(list) => {
                Ok(Value::Boolean(!list.values().is_empty() == want))
            }
            _ => Err(ExecutorError::InvalidArgument(
                "EXISTS requires a subquery or value list".into(),
            )),
        }
    }

    fn eval_membership(&self, tuple: &Tuple) -> Result<Value, ExecutorError> {
        let left_expr = self.left.as_ref().ok_or_else(|| {
            ExecutorError::InvalidArgument(format!("{} requires a left operand", self.comp))
        })?;
        if matches!(left_expr.kind, ExprKind::Subquery(_) | ExprKind::ValueList(_)) {
            return Err(ExecutorError::InvalidArgument(format!(
                "left operand of {} must be scalar",
                self.comp
            )));
        }
        let probe = left_expr.evaluate(tuple)?;

        // A match decides both shapes immediately (IN true, NOT IN
        // false). NOT IN otherwise scans to the end: any incomparable
        // element (a NULL) keeps it from ever being true.
        let mut found = false;
        let mut saw_incomparable = false;
        match &self.right.kind {
            ExprKind::ValueList(list) => {
                list.reset();
                while let Some(v) = list.next_value() {
                    match probe.compare(&v) {
                        Some(Ordering::Equal) => {
                            found = true;
                            break;
                        }
                        Some(_) => {}
                        None => saw_incomparable = true,
                    }
                }
            }
            ExprKind::Subquery(sub) => {
                sub.open(Some(tuple))?;
                let mut scan_err = None;
                loop {
                    match sub.next_value() {
                        Ok(Some(v)) => match probe.compare(&v) {
                            Some(Ordering::Equal) => {
                                found = true;
                                break;
                            }
                            Some(_) => {}
                            None => saw_incomparable = true,
                        },
                        Ok(None) => break,
                        Err(e) => {
                            scan_err = Some(e);
                            break;
                        }
                    }
                }
                let close_rc = sub.close();
                if let Some(e) = scan_err {
                    return Err(e);
                }
                close_rc?;
            }
            _ => {
                return Err(ExecutorError::InvalidArgument(format!(
                    "{} requires a value list or subquery",
                    self.comp
                )));
            }
        }

        let result = if self.comp == CompOp::NotIn {
            !found && !saw_incomparable
        } else {
            found
        };
        Ok(Value::Boolean(result))
    }

    fn eval_scalar(&self, tuple: &Tuple) -> Result<Value, ExecutorError> {
        let left_expr = self.left.as_ref().ok_or_else(|| {
            ExecutorError::InvalidArgument(format!("{} requires a left operand", self.comp))
        })?;
        if matches!(left_expr.kind, ExprKind::ValueList(_))
            || matches!(self.right.kind, ExprKind::ValueList(_))
        {
            return Err(ExecutorError::InvalidArgument(format!(
                "value list cannot be an operand of {}",
                self.comp
            )));
        }
        let left_value = operand_value(left_expr, tuple)?;
        let right_value = operand_value(&self.right, tuple)?;
        Ok(Value::Boolean(compare_by_op(
            self.comp,
            &left_value,
            &right_value,
        )?))
    }
}

/// Evaluates a scalar-comparison operand: expressions directly, subqueries
/// by driving their plan and enforcing the single-row rule.
fn operand_value(expr: &Expression, tuple: &Tuple) -> Result<Value, ExecutorError> {
    match &expr.kind {
        ExprKind::Subquery(sub) => fetch_single(sub, tuple),
        _ => expr.evaluate(tuple),
    }
}

/// Fetches the single value of a scalar-context subquery.
///
/// An empty result is NULL; more than one row is an argument error. The
/// subquery is closed on every path out.
fn fetch_single(sub: &SubqueryExpr, outer: &Tuple) -> Result<Value, ExecutorError> {
    sub.open(Some(outer))?;
    let fetched = (|| {
        let first = sub.next_value()?;
        if first.is_some() && sub.next_value()?.is_some() {
            return Err(ExecutorError::InvalidArgument(
                "scalar subquery produced more than one row".into(),
            ));
        }
        Ok(first.unwrap_or(Value::Null))
    })();
    let close_rc = sub.close();
    let value = fetched?;
    close_rc?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::AttrType;

    fn int(n: i32) -> Expression {
        Expression::value(Value::Int(n))
    }

    fn chars(s: &str) -> Expression {
        Expression::value(Value::Chars(s.into()))
    }

    fn eval(expr: &Expression) -> Value {
        expr.evaluate(&Tuple::Empty).unwrap()
    }

    #[test]
    fn test_scalar_comparison() {
        let cmp = Expression::comparison(CompOp::LessThan, Some(int(1)), int(2));
        assert_eq!(eval(&cmp), Value::Boolean(true));

        let cmp = Expression::comparison(CompOp::NotEqual, Some(int(3)), int(3));
        assert_eq!(eval(&cmp), Value::Boolean(false));
    }

    #[test]
    fn test_comparison_with_null_is_false_not_null() {
        for comp in [CompOp::EqualTo, CompOp::NotEqual, CompOp::LessThan] {
            let cmp = Expression::comparison(
                comp,
                Some(Expression::value(Value::Null)),
                int(1),
            );
            // Three-valued logic collapses: the result is a Boolean false.
            assert_eq!(eval(&cmp), Value::Boolean(false));
        }
    }

    #[test]
    fn test_conjunction_short_circuit() {
        let and = Expression::conjunction(
            ConjunctionType::And,
            vec![
                Expression::comparison(CompOp::EqualTo, Some(int(1)), int(1)),
                Expression::comparison(CompOp::EqualTo, Some(int(1)), int(2)),
            ],
        );
        assert_eq!(eval(&and), Value::Boolean(false));

        let or = Expression::conjunction(
            ConjunctionType::Or,
            vec![
                Expression::comparison(CompOp::EqualTo, Some(int(1)), int(1)),
                Expression::comparison(CompOp::EqualTo, Some(int(1)), int(2)),
            ],
        );
        assert_eq!(eval(&or), Value::Boolean(true));
    }

    #[test]
    fn test_empty_conjunction_is_true() {
        let empty = Expression::conjunction(ConjunctionType::And, vec![]);
        assert_eq!(eval(&empty), Value::Boolean(true));
    }

    #[test]
    fn test_arithmetic_and_cast() {
        let expr = Expression::arithmetic(ArithmeticType::Add, int(40), int(2));
        assert_eq!(eval(&expr), Value::Int(42));

        let cast = Expression::cast(int(3), AttrType::Float);
        assert_eq!(eval(&cast), Value::Float(3.0));

        // Same-type cast passes the value through.
        let noop = Expression::cast(int(3), AttrType::Int);
        assert_eq!(eval(&noop), Value::Int(3));
    }

    #[test]
    fn test_is_null_and_is_boolean() {
        let is_null = Expression::is_expr(
            CompOp::Is,
            Expression::value(Value::Null),
            Expression::value(Value::Null),
        );
        assert_eq!(eval(&is_null), Value::Boolean(true));

        let is_not_null =
            Expression::is_expr(CompOp::IsNot, int(5), Expression::value(Value::Null));
        assert_eq!(eval(&is_not_null), Value::Boolean(true));

        let is_true = Expression::is_expr(
            CompOp::Is,
            Expression::comparison(CompOp::EqualTo, Some(int(1)), int(1)),
            Expression::value(Value::Boolean(true)),
        );
        assert_eq!(eval(&is_true), Value::Boolean(true));

        let bad = Expression::is_expr(CompOp::Is, int(1), int(2));
        assert!(matches!(
            bad.evaluate(&Tuple::Empty),
            Err(ExecutorError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_like() {
        let like = Expression::like_expr(CompOp::Like, chars("hello"), chars("h%o"));
        assert_eq!(eval(&like), Value::Boolean(true));

        let not_like = Expression::like_expr(CompOp::NotLike, chars("hello"), chars("h_"));
        assert_eq!(eval(&not_like), Value::Boolean(true));

        let bad = Expression::like_expr(CompOp::Like, int(1), chars("%"));
        assert!(matches!(
            bad.evaluate(&Tuple::Empty),
            Err(ExecutorError::Unimplemented(_))
        ));
    }

    #[test]
    fn test_in_value_list() {
        let hit = Expression::comparison(
            CompOp::In,
            Some(int(3)),
            Expression::value_list(vec![Value::Int(1), Value::Int(3)]),
        );
        assert_eq!(eval(&hit), Value::Boolean(true));

        let miss = Expression::comparison(
            CompOp::In,
            Some(int(5)),
            Expression::value_list(vec![Value::Int(1), Value::Int(3)]),
        );
        assert_eq!(eval(&miss), Value::Boolean(false));
    }

    #[test]
    fn test_not_in_with_null_is_never_true() {
        let with_null = Expression::comparison(
            CompOp::NotIn,
            Some(int(5)),
            Expression::value_list(vec![Value::Int(1), Value::Null]),
        );
        assert_eq!(eval(&with_null), Value::Boolean(false));

        let without_null = Expression::comparison(
            CompOp::NotIn,
            Some(int(5)),
            Expression::value_list(vec![Value::Int(1), Value::Int(2)]),
        );
        assert_eq!(eval(&without_null), Value::Boolean(true));

        // A real match still decides NOT IN even when NULL is present.
        let matched = Expression::comparison(
            CompOp::NotIn,
            Some(int(1)),
            Expression::value_list(vec![Value::Int(1), Value::Null]),
        );
        assert_eq!(eval(&matched), Value::Boolean(false));
    }

    #[test]
    fn test_exists_over_value_list() {
        let exists = Expression::comparison(
            CompOp::Exists,
            None,
            Expression::value_list(vec![Value::Int(1)]),
        );
        assert_eq!(eval(&exists), Value::Boolean(true));

        let not_exists = Expression::comparison(
            CompOp::NotExists,
            None,
            Expression::value_list(vec![]),
        );
        assert_eq!(eval(&not_exists), Value::Boolean(true));
    }

    #[test]
    fn test_shape_mismatches_are_argument_errors() {
        // IN over a scalar right-hand side.
        let bad_in = Expression::comparison(CompOp::In, Some(int(1)), int(1));
        assert!(matches!(
            bad_in.evaluate(&Tuple::Empty),
            Err(ExecutorError::InvalidArgument(_))
        ));

        // `=` over a value list.
        let bad_eq = Expression::comparison(
            CompOp::EqualTo,
            Some(int(1)),
            Expression::value_list(vec![Value::Int(1)]),
        );
        assert!(matches!(
            bad_eq.evaluate(&Tuple::Empty),
            Err(ExecutorError::InvalidArgument(_))
        ));

        // EXISTS with a left operand.
        let bad_exists = Expression::comparison(
            CompOp::Exists,
            Some(int(1)),
            Expression::value_list(vec![]),
        );
        assert!(matches!(
            bad_exists.evaluate(&Tuple::Empty),
            Err(ExecutorError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_try_evaluate_folds_constants() {
        let expr = Expression::arithmetic(ArithmeticType::Mul, int(6), int(7));
        assert_eq!(expr.try_evaluate().unwrap(), Value::Int(42));

        let cmp = Expression::comparison(CompOp::GreatThan, Some(int(2)), int(1));
        assert_eq!(cmp.try_evaluate().unwrap(), Value::Boolean(true));

        let field = Expression::unbound_field(None, "x");
        assert!(field.try_evaluate().is_err());
    }

    #[test]
    fn test_division_by_zero_yields_null() {
        let expr = Expression::arithmetic(ArithmeticType::Div, int(1), int(0));
        assert!(eval(&expr).is_null());
    }
}
