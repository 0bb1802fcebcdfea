//! The expression tree.
//!
//! [`Expression`] is a tagged tree: a shared header (name, alias, table
//! alias, and the precomputed-column position `pos`) plus an [`ExprKind`]
//! variant per node kind. The parser hands over trees containing Star and
//! Unbound* placeholders; the binder rewrites them in place into Field and
//! Aggregation nodes, after which the tree is immutable for the rest of
//! the query.
//!
//! Evaluation lives in the sibling modules: the row path in [`eval`](super::eval),
//! the vectorized column path in [`chunk`](super::chunk).

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::catalog::FieldMeta;
use crate::sql::{CompOp, ConjunctionType, SelectSqlNode};
use crate::storage::Trx;
use crate::value::{AttrType, Value};

use super::aggregate::AggregateType;
use super::error::ExecutorError;
use super::logical::LogicalOperator;
use super::node::PhysicalOperator;
use super::stmt::SelectStmt;
use super::tuple::Tuple;

/// Expression node kind tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExprType {
    Star,
    UnboundField,
    UnboundAggregation,
    Field,
    Value,
    Cast,
    Comparison,
    Conjunction,
    Arithmetic,
    Aggregation,
    SysFunction,
    Is,
    Like,
    ValueList,
    Subquery,
}

/// Arithmetic operator of an [`ArithmeticExpr`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithmeticType {
    Add,
    Sub,
    Mul,
    Div,
    /// Unary negation; the node has no right child.
    Negative,
}

/// System (scalar) functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SysFuncType {
    Length,
    Round,
    DateFormat,
}

impl fmt::Display for SysFuncType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SysFuncType::Length => "length",
            SysFuncType::Round => "round",
            SysFuncType::DateFormat => "date_format",
        };
        write!(f, "{}", s)
    }
}

/// State shared by every expression node.
#[derive(Debug, Default, Clone)]
pub struct ExprHeader {
    name: String,
    alias: String,
    table_alias: String,
    /// Index of this expression's precomputed column in the child
    /// operator's chunk; -1 when not precomputed.
    pos: i32,
}

/// A bound field reference.
#[derive(Debug, Clone)]
pub struct FieldExpr {
    pub table_name: String,
    pub field: FieldMeta,
}

/// A comparison; `left` is absent for EXISTS / NOT EXISTS.
#[derive(Debug)]
pub struct ComparisonExpr {
    pub comp: CompOp,
    pub left: Option<Box<Expression>>,
    pub right: Box<Expression>,
}

/// An arithmetic operation; `right` is absent for unary negation.
#[derive(Debug)]
pub struct ArithmeticExpr {
    pub arithmetic_type: ArithmeticType,
    pub left: Box<Expression>,
    pub right: Option<Box<Expression>>,
}

/// A bound aggregate call.
#[derive(Debug)]
pub struct AggregateExpr {
    pub aggregate_type: AggregateType,
    pub child: Box<Expression>,
}

/// A system function call.
#[derive(Debug)]
pub struct SysFunctionExpr {
    pub func: SysFuncType,
    pub params: Vec<Expression>,
}

/// A constant value list for IN / NOT IN / EXISTS / NOT EXISTS.
///
/// The comparison driver scans the list through an interior-mutable
/// cursor so the same node can be re-scanned per outer row.
#[derive(Debug)]
pub struct ValueListExpr {
    values: Vec<Value>,
    cursor: Cell<usize>,
}

impl ValueListExpr {
    pub fn new(values: Vec<Value>) -> Self {
        Self {
            values,
            cursor: Cell::new(0),
        }
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Rewinds the cursor to the first value.
    pub fn reset(&self) {
        self.cursor.set(0);
    }

    /// Returns the value under the cursor and advances it.
    pub fn next_value(&self) -> Option<Value> {
        let i = self.cursor.get();
        let v = self.values.get(i).cloned();
        if v.is_some() {
            self.cursor.set(i + 1);
        }
        v
    }
}

/// Execution-time state of a subquery expression.
#[derive(Default)]
struct SubqueryState {
    is_open: bool,
    trx: Option<Rc<Trx>>,
}

/// A subquery expression.
///
/// Owns the whole pipeline for its sub-select: the parsed node until
/// binding, the bound statement until logical planning, the logical plan
/// until physical planning, and finally the physical operator driven
/// during evaluation. Only the physical operator and the open/transaction
/// state are interior-mutable; everything else is rewritten in place by
/// the planning stages that own the tree at that point.
pub struct SubqueryExpr {
    pub(super) select_node: Option<Box<SelectSqlNode>>,
    pub(super) stmt: Option<Box<SelectStmt>>,
    pub(super) logical: Option<Box<LogicalOperator>>,
    physical: RefCell<Option<Box<PhysicalOperator>>>,
    state: RefCell<SubqueryState>,
}

impl SubqueryExpr {
    pub fn new(node: SelectSqlNode) -> Self {
        Self {
            select_node: Some(Box::new(node)),
            stmt: None,
            logical: None,
            physical: RefCell::new(None),
            state: RefCell::new(SubqueryState::default()),
        }
    }

    /// Installs the physical plan produced by the physical planner.
    pub(super) fn set_physical(&self, op: PhysicalOperator) {
        *self.physical.borrow_mut() = Some(Box::new(op));
    }

    /// Remembers the enclosing operator's transaction for later opens.
    pub(super) fn set_trx(&self, trx: &Rc<Trx>) {
        self.state.borrow_mut().trx = Some(trx.clone());
    }

    /// Opens (or reopens) the subquery plan with the given outer tuple.
    ///
    /// Every open reinitializes the child scanners, so correlated
    /// predicates observe the current outer row.
    pub fn open(&self, outer: Option<&Tuple>) -> Result<(), ExecutorError> {
        let trx = self
            .state
            .borrow()
            .trx
            .clone()
            .ok_or_else(|| ExecutorError::Internal("subquery opened without a transaction".into()))?;
        let mut physical = self.physical.borrow_mut();
        let op = physical
            .as_mut()
            .ok_or_else(|| ExecutorError::Internal("subquery has no physical plan".into()))?;
        if self.state.borrow().is_open {
            op.close()?;
        }
        op.set_outer_tuple(outer.cloned());
        op.open(&trx)?;
        self.state.borrow_mut().is_open = true;
        Ok(())
    }

    /// Pulls the next row from the subquery plan.
    pub fn next_row(&self) -> Result<Option<Tuple>, ExecutorError> {
        let mut physical = self.physical.borrow_mut();
        let op = physical
            .as_mut()
            .ok_or_else(|| ExecutorError::Internal("subquery has no physical plan".into()))?;
        op.next()
    }

    /// Pulls the next row and extracts its single cell.
    ///
    /// End-of-rows surfaces as `Ok(None)` so the comparison driver can
    /// implement IN / NOT IN / EXISTS / NOT EXISTS. A row with more than
    /// one cell is an argument error.
    pub fn next_value(&self) -> Result<Option<Value>, ExecutorError> {
        match self.next_row()? {
            None => Ok(None),
            Some(tuple) => {
                if tuple.cell_num() != 1 {
                    return Err(ExecutorError::InvalidArgument(format!(
                        "subquery must produce exactly one column, got {}",
                        tuple.cell_num()
                    )));
                }
                Ok(Some(tuple.cell_at(0)?))
            }
        }
    }

    /// Closes the subquery plan. Closing an unopened subquery is a no-op.
    pub fn close(&self) -> Result<(), ExecutorError> {
        if !self.state.borrow().is_open {
            return Ok(());
        }
        let mut physical = self.physical.borrow_mut();
        if let Some(op) = physical.as_mut() {
            op.close()?;
        }
        self.state.borrow_mut().is_open = false;
        Ok(())
    }
}

impl fmt::Debug for SubqueryExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubqueryExpr")
            .field("bound", &self.stmt.is_some())
            .field("planned", &self.physical.borrow().is_some())
            .finish()
    }
}

/// One node of the expression tree.
#[derive(Debug)]
pub enum ExprKind {
    /// `*` or `table.*`; expanded away by the binder.
    Star { table_name: Option<String> },
    /// A field reference not yet resolved against the catalog.
    UnboundField {
        table_name: Option<String>,
        field_name: String,
    },
    /// An aggregate call whose function name is not yet resolved.
    UnboundAggregation {
        aggregate_name: String,
        child: Box<Expression>,
    },
    Field(FieldExpr),
    Value(Value),
    Cast {
        child: Box<Expression>,
        target: AttrType,
    },
    Comparison(ComparisonExpr),
    Conjunction {
        conjunction_type: ConjunctionType,
        children: Vec<Expression>,
    },
    Arithmetic(ArithmeticExpr),
    Aggregation(AggregateExpr),
    SysFunction(SysFunctionExpr),
    Is {
        comp: CompOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Like {
        comp: CompOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    ValueList(ValueListExpr),
    Subquery(SubqueryExpr),
}

/// A value-producing expression: shared header plus kind.
#[derive(Debug)]
pub struct Expression {
    header: ExprHeader,
    pub kind: ExprKind,
}

impl Expression {
    fn new(kind: ExprKind) -> Self {
        Self {
            header: ExprHeader {
                pos: -1,
                ..ExprHeader::default()
            },
            kind,
        }
    }

    pub fn star(table_name: Option<&str>) -> Self {
        Self::new(ExprKind::Star {
            table_name: table_name.map(str::to_string),
        })
    }

    pub fn unbound_field(table_name: Option<&str>, field_name: &str) -> Self {
        let mut expr = Self::new(ExprKind::UnboundField {
            table_name: table_name.map(str::to_string),
            field_name: field_name.to_string(),
        });
        expr.header.name = field_name.to_string();
        expr
    }

    pub fn unbound_aggregation(aggregate_name: &str, child: Expression) -> Self {
        let mut expr = Self::new(ExprKind::UnboundAggregation {
            aggregate_name: aggregate_name.to_string(),
            child: Box::new(child),
        });
        expr.header.name = format!("{}({})", aggregate_name, expr_child_name(&expr));
        expr
    }

    pub fn field(table_name: &str, field: &FieldMeta) -> Self {
        let mut expr = Self::new(ExprKind::Field(FieldExpr {
            table_name: table_name.to_string(),
            field: field.clone(),
        }));
        expr.header.name = field.name.clone();
        expr
    }

    pub fn value(value: Value) -> Self {
        let mut expr = Self::new(ExprKind::Value(value));
        expr.header.name = match &expr.kind {
            ExprKind::Value(v) => v.to_string(),
            _ => unreachable!(),
        };
        expr
    }

    pub fn cast(child: Expression, target: AttrType) -> Self {
        Self::new(ExprKind::Cast {
            child: Box::new(child),
            target,
        })
    }

    pub fn comparison(comp: CompOp, left: Option<Expression>, right: Expression) -> Self {
        Self::new(ExprKind::Comparison(ComparisonExpr {
            comp,
            left: left.map(Box::new),
            right: Box::new(right),
        }))
    }

    pub fn conjunction(conjunction_type: ConjunctionType, children: Vec<Expression>) -> Self {
        Self::new(ExprKind::Conjunction {
            conjunction_type,
            children,
        })
    }

    pub fn arithmetic(arithmetic_type: ArithmeticType, left: Expression, right: Expression) -> Self {
        Self::new(ExprKind::Arithmetic(ArithmeticExpr {
            arithmetic_type,
            left: Box::new(left),
            right: Some(Box::new(right)),
        }))
    }

    pub fn negative(child: Expression) -> Self {
        Self::new(ExprKind::Arithmetic(ArithmeticExpr {
            arithmetic_type: ArithmeticType::Negative,
            left: Box::new(child),
            right: None,
        }))
    }

    pub fn aggregation(aggregate_type: AggregateType, child: Expression) -> Self {
        Self::new(ExprKind::Aggregation(AggregateExpr {
            aggregate_type,
            child: Box::new(child),
        }))
    }

    pub fn sys_function(func: SysFuncType, params: Vec<Expression>) -> Self {
        Self::new(ExprKind::SysFunction(SysFunctionExpr { func, params }))
    }

    pub fn is_expr(comp: CompOp, left: Expression, right: Expression) -> Self {
        Self::new(ExprKind::Is {
            comp,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    pub fn like_expr(comp: CompOp, left: Expression, right: Expression) -> Self {
        Self::new(ExprKind::Like {
            comp,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    pub fn value_list(values: Vec<Value>) -> Self {
        Self::new(ExprKind::ValueList(ValueListExpr::new(values)))
    }

    pub fn subquery(node: SelectSqlNode) -> Self {
        Self::new(ExprKind::Subquery(SubqueryExpr::new(node)))
    }

    /// Builder-style alias setter for constructing select lists.
    pub fn with_alias(mut self, alias: &str) -> Self {
        self.set_alias(alias);
        self
    }

    pub fn expr_type(&self) -> ExprType {
        match &self.kind {
            ExprKind::Star { .. } => ExprType::Star,
            ExprKind::UnboundField { .. } => ExprType::UnboundField,
            ExprKind::UnboundAggregation { .. } => ExprType::UnboundAggregation,
            ExprKind::Field(_) => ExprType::Field,
            ExprKind::Value(_) => ExprType::Value,
            ExprKind::Cast { .. } => ExprType::Cast,
            ExprKind::Comparison(_) => ExprType::Comparison,
            ExprKind::Conjunction { .. } => ExprType::Conjunction,
            ExprKind::Arithmetic(_) => ExprType::Arithmetic,
            ExprKind::Aggregation(_) => ExprType::Aggregation,
            ExprKind::SysFunction(_) => ExprType::SysFunction,
            ExprKind::Is { .. } => ExprType::Is,
            ExprKind::Like { .. } => ExprType::Like,
            ExprKind::ValueList(_) => ExprType::ValueList,
            ExprKind::Subquery(_) => ExprType::Subquery,
        }
    }

    pub fn name(&self) -> &str {
        &self.header.name
    }

    pub fn set_name(&mut self, name: String) {
        self.header.name = name;
    }

    pub fn alias(&self) -> &str {
        &self.header.alias
    }

    pub fn set_alias(&mut self, alias: &str) {
        self.header.alias = alias.to_string();
    }

    pub fn table_alias(&self) -> &str {
        &self.header.table_alias
    }

    pub fn set_table_alias(&mut self, table_alias: &str) {
        self.header.table_alias = table_alias.to_string();
    }

    pub fn pos(&self) -> i32 {
        self.header.pos
    }

    pub fn set_pos(&mut self, pos: i32) {
        self.header.pos = pos;
    }

    /// Name this expression contributes to an output schema: the alias if
    /// one was given, else the bound name, else the rendered expression.
    pub fn output_name(&self) -> String {
        if !self.header.alias.is_empty() {
            self.header.alias.clone()
        } else if !self.header.name.is_empty() {
            self.header.name.clone()
        } else {
            self.to_string()
        }
    }

    /// The type a value produced by this node carries.
    pub fn value_type(&self) -> AttrType {
        match &self.kind {
            ExprKind::Star { .. }
            | ExprKind::UnboundField { .. }
            | ExprKind::Subquery(_) => AttrType::Undefined,
            ExprKind::UnboundAggregation { child, .. } => child.value_type(),
            ExprKind::Field(field_expr) => field_expr.field.attr_type,
            ExprKind::Value(v) => v.attr_type(),
            ExprKind::Cast { target, .. } => *target,
            ExprKind::Comparison(_)
            | ExprKind::Conjunction { .. }
            | ExprKind::Is { .. }
            | ExprKind::Like { .. } => AttrType::Boolean,
            ExprKind::Arithmetic(arith) => match &arith.right {
                None => arith.left.value_type(),
                Some(right) => {
                    if arith.left.value_type() == AttrType::Int
                        && right.value_type() == AttrType::Int
                        && arith.arithmetic_type != ArithmeticType::Div
                    {
                        AttrType::Int
                    } else {
                        AttrType::Float
                    }
                }
            },
            ExprKind::Aggregation(agg) => match agg.aggregate_type {
                AggregateType::Count => AttrType::Int,
                AggregateType::Avg => AttrType::Float,
                _ => agg.child.value_type(),
            },
            ExprKind::SysFunction(func) => match func.func {
                SysFuncType::Length => AttrType::Int,
                SysFuncType::Round => AttrType::Float,
                SysFuncType::DateFormat => AttrType::Chars,
            },
            ExprKind::ValueList(list) => list
                .values()
                .first()
                .map(Value::attr_type)
                .unwrap_or(AttrType::Undefined),
        }
    }

    /// Byte length of a value produced by this node, or -1 when unknown.
    pub fn value_length(&self) -> i32 {
        match &self.kind {
            ExprKind::Field(field_expr) => field_expr.field.len as i32,
            ExprKind::Value(v) => v.length() as i32,
            ExprKind::Arithmetic(arith) => match &arith.right {
                None => arith.left.value_length(),
                Some(_) => 4,
            },
            ExprKind::Aggregation(agg) => agg.child.value_length(),
            _ => -1,
        }
    }

    /// Structural equality, used to match select expressions against
    /// group-by expressions.
    ///
    /// Defined for field references (bound and unbound), constants,
    /// arithmetic, and aggregates; all other kinds never compare equal.
    pub fn equal(&self, other: &Expression) -> bool {
        match (&self.kind, &other.kind) {
            (ExprKind::Field(a), ExprKind::Field(b)) => {
                a.table_name == b.table_name && a.field.name == b.field.name
            }
            (
                ExprKind::UnboundField {
                    table_name: at,
                    field_name: af,
                },
                ExprKind::UnboundField {
                    table_name: bt,
                    field_name: bf,
                },
            ) => at == bt && af == bf,
            // A bound field still matches the unbound spelling of the same
            // column; group-by validation runs on both shapes.
            (
                ExprKind::Field(a),
                ExprKind::UnboundField {
                    table_name: bt,
                    field_name: bf,
                },
            ) => a.field.name == *bf && bt.as_deref().map_or(true, |t| t == a.table_name),
            (ExprKind::UnboundField { .. }, ExprKind::Field(_)) => other.equal(self),
            (ExprKind::Value(a), ExprKind::Value(b)) => {
                a.compare(b) == Some(std::cmp::Ordering::Equal)
            }
            (ExprKind::Arithmetic(a), ExprKind::Arithmetic(b)) => {
                a.arithmetic_type == b.arithmetic_type
                    && a.left.equal(&b.left)
                    && match (&a.right, &b.right) {
                        (Some(x), Some(y)) => x.equal(y),
                        (None, None) => true,
                        _ => false,
                    }
            }
            (ExprKind::Aggregation(a), ExprKind::Aggregation(b)) => {
                a.aggregate_type == b.aggregate_type && a.child.equal(&b.child)
            }
            _ => false,
        }
    }

    /// Applies `f` to each direct child expression.
    pub fn visit_children<E>(
        &self,
        f: &mut impl FnMut(&Expression) -> Result<(), E>,
    ) -> Result<(), E> {
        match &self.kind {
            ExprKind::UnboundAggregation { child, .. }
            | ExprKind::Cast { child, .. } => f(child),
            ExprKind::Comparison(cmp) => {
                if let Some(left) = &cmp.left {
                    f(left)?;
                }
                f(&cmp.right)
            }
            ExprKind::Conjunction { children, .. } => {
                children.iter().try_for_each(|c| f(c))
            }
            ExprKind::Arithmetic(arith) => {
                f(&arith.left)?;
                if let Some(right) = &arith.right {
                    f(right)?;
                }
                Ok(())
            }
            ExprKind::Aggregation(agg) => f(&agg.child),
            ExprKind::SysFunction(func) => func.params.iter().try_for_each(|p| f(p)),
            ExprKind::Is { left, right, .. } | ExprKind::Like { left, right, .. } => {
                f(left)?;
                f(right)
            }
            _ => Ok(()),
        }
    }

    /// Applies `f` to each direct child expression, mutably.
    pub fn visit_children_mut<E>(
        &mut self,
        f: &mut impl FnMut(&mut Expression) -> Result<(), E>,
    ) -> Result<(), E> {
        match &mut self.kind {
            ExprKind::UnboundAggregation { child, .. }
            | ExprKind::Cast { child, .. } => f(child),
            ExprKind::Comparison(cmp) => {
                if let Some(left) = &mut cmp.left {
                    f(left)?;
                }
                f(&mut cmp.right)
            }
            ExprKind::Conjunction { children, .. } => {
                children.iter_mut().try_for_each(|c| f(c))
            }
            ExprKind::Arithmetic(arith) => {
                f(&mut arith.left)?;
                if let Some(right) = &mut arith.right {
                    f(right)?;
                }
                Ok(())
            }
            ExprKind::Aggregation(agg) => f(&mut agg.child),
            ExprKind::SysFunction(func) => func.params.iter_mut().try_for_each(|p| f(p)),
            ExprKind::Is { left, right, .. } | ExprKind::Like { left, right, .. } => {
                f(left)?;
                f(right)
            }
            _ => Ok(()),
        }
    }

    /// Duplicates this expression tree.
    ///
    /// Subqueries own per-query plan state and cannot be duplicated; the
    /// group-by planner uses this to lift aggregate inputs out of the
    /// select list, where subqueries cannot appear.
    pub fn try_clone(&self) -> Result<Expression, ExecutorError> {
        let kind = match &self.kind {
            ExprKind::Star { table_name } => ExprKind::Star {
                table_name: table_name.clone(),
            },
            ExprKind::UnboundField {
                table_name,
                field_name,
            } => ExprKind::UnboundField {
                table_name: table_name.clone(),
                field_name: field_name.clone(),
            },
            ExprKind::UnboundAggregation {
                aggregate_name,
                child,
            } => ExprKind::UnboundAggregation {
                aggregate_name: aggregate_name.clone(),
                child: Box::new(child.try_clone()?),
            },
            ExprKind::Field(field_expr) => ExprKind::Field(field_expr.clone()),
            ExprKind::Value(v) => ExprKind::Value(v.clone()),
            ExprKind::Cast { child, target } => ExprKind::Cast {
                child: Box::new(child.try_clone()?),
                target: *target,
            },
            ExprKind::Comparison(cmp) => ExprKind::Comparison(ComparisonExpr {
                comp: cmp.comp,
                left: match &cmp.left {
                    Some(left) => Some(Box::new(left.try_clone()?)),
                    None => None,
                },
                right: Box::new(cmp.right.try_clone()?),
            }),
            ExprKind::Conjunction {
                conjunction_type,
                children,
            } => ExprKind::Conjunction {
                conjunction_type: *conjunction_type,
                children: children
                    .iter()
                    .map(Expression::try_clone)
                    .collect::<Result<_, _>>()?,
            },
            ExprKind::Arithmetic(arith) => ExprKind::Arithmetic(ArithmeticExpr {
                arithmetic_type: arith.arithmetic_type,
                left: Box::new(arith.left.try_clone()?),
                right: match &arith.right {
                    Some(right) => Some(Box::new(right.try_clone()?)),
                    None => None,
                },
            }),
            ExprKind::Aggregation(agg) => ExprKind::Aggregation(AggregateExpr {
                aggregate_type: agg.aggregate_type,
                child: Box::new(agg.child.try_clone()?),
            }),
            ExprKind::SysFunction(func) => ExprKind::SysFunction(SysFunctionExpr {
                func: func.func,
                params: func
                    .params
                    .iter()
                    .map(Expression::try_clone)
                    .collect::<Result<_, _>>()?,
            }),
            ExprKind::Is { comp, left, right } => ExprKind::Is {
                comp: *comp,
                left: Box::new(left.try_clone()?),
                right: Box::new(right.try_clone()?),
            },
            ExprKind::Like { comp, left, right } => ExprKind::Like {
                comp: *comp,
                left: Box::new(left.try_clone()?),
                right: Box::new(right.try_clone()?),
            },
            ExprKind::ValueList(list) => {
                ExprKind::ValueList(ValueListExpr::new(list.values().to_vec()))
            }
            ExprKind::Subquery(_) => {
                return Err(ExecutorError::Unimplemented(
                    "subquery expressions cannot be duplicated".into(),
                ));
            }
        };
        Ok(Expression {
            header: self.header.clone(),
            kind,
        })
    }

    /// Injects the current transaction into every subquery in this tree,
    /// so correlated opens during evaluation can reach storage. Called by
    /// operators when they open.
    pub fn attach_trx(&self, trx: &Rc<Trx>) {
        if let ExprKind::Subquery(sub) = &self.kind {
            sub.set_trx(trx);
        }
        let _ = self.visit_children::<()>(&mut |child| {
            child.attach_trx(trx);
            Ok(())
        });
    }
}

/// Name of a freshly built unbound aggregate's child, for default naming.
fn expr_child_name(expr: &Expression) -> String {
    match &expr.kind {
        ExprKind::UnboundAggregation { child, .. } => match &child.kind {
            ExprKind::Star { .. } => "*".to_string(),
            _ => child.to_string(),
        },
        _ => String::new(),
    }
}

impl fmt::Display for ArithmeticType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ArithmeticType::Add => "+",
            ArithmeticType::Sub => "-",
            ArithmeticType::Mul => "*",
            ArithmeticType::Div => "/",
            ArithmeticType::Negative => "-",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ExprKind::Star { table_name: Some(t) } => write!(f, "{}.*", t),
            ExprKind::Star { table_name: None } => write!(f, "*"),
            ExprKind::UnboundField {
                table_name: Some(t),
                field_name,
            } => write!(f, "{}.{}", t, field_name),
            ExprKind::UnboundField {
                table_name: None,
                field_name,
            } => write!(f, "{}", field_name),
            ExprKind::UnboundAggregation {
                aggregate_name,
                child,
            } => write!(f, "{}({})", aggregate_name, child),
            ExprKind::Field(field_expr) => {
                if self.header.table_alias.is_empty() {
                    write!(f, "{}.{}", field_expr.table_name, field_expr.field.name)
                } else {
                    write!(f, "{}.{}", self.header.table_alias, field_expr.field.name)
                }
            }
            ExprKind::Value(v) => write!(f, "{}", v),
            ExprKind::Cast { child, target } => write!(f, "cast({} as {})", child, target),
            ExprKind::Comparison(cmp) => match &cmp.left {
                Some(left) => write!(f, "{} {} {}", left, cmp.comp, cmp.right),
                None => write!(f, "{} {}", cmp.comp, cmp.right),
            },
            ExprKind::Conjunction {
                conjunction_type,
                children,
            } => {
                let sep = match conjunction_type {
                    ConjunctionType::And => " AND ",
                    ConjunctionType::Or => " OR ",
                };
                let parts: Vec<String> = children.iter().map(Expression::to_string).collect();
                write!(f, "{}", parts.join(sep))
            }
            ExprKind::Arithmetic(arith) => match &arith.right {
                Some(right) => write!(f, "{} {} {}", arith.left, arith.arithmetic_type, right),
                None => write!(f, "-{}", arith.left),
            },
            ExprKind::Aggregation(agg) => {
                write!(f, "{}({})", agg.aggregate_type, agg.child)
            }
            ExprKind::SysFunction(func) => {
                let parts: Vec<String> = func.params.iter().map(Expression::to_string).collect();
                write!(f, "{}({})", func.func, parts.join(", "))
            }
            ExprKind::Is { comp, left, right } | ExprKind::Like { comp, left, right } => {
                write!(f, "{} {} {}", left, comp, right)
            }
            ExprKind::ValueList(list) => {
                let parts: Vec<String> = list.values().iter().map(Value::to_string).collect();
                write!(f, "({})", parts.join(", "))
            }
            ExprKind::Subquery(_) => write!(f, "(subquery)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_type_arithmetic() {
        let int_add = Expression::arithmetic(
            ArithmeticType::Add,
            Expression::value(Value::Int(1)),
            Expression::value(Value::Int(2)),
        );
        assert_eq!(int_add.value_type(), AttrType::Int);

        let int_div = Expression::arithmetic(
            ArithmeticType::Div,
            Expression::value(Value::Int(1)),
            Expression::value(Value::Int(2)),
        );
        assert_eq!(int_div.value_type(), AttrType::Float);

        let mixed = Expression::arithmetic(
            ArithmeticType::Mul,
            Expression::value(Value::Int(1)),
            Expression::value(Value::Float(2.0)),
        );
        assert_eq!(mixed.value_type(), AttrType::Float);

        let neg = Expression::negative(Expression::value(Value::Int(1)));
        assert_eq!(neg.value_type(), AttrType::Int);
    }

    #[test]
    fn test_value_type_predicates() {
        let cmp = Expression::comparison(
            CompOp::EqualTo,
            Some(Expression::value(Value::Int(1))),
            Expression::value(Value::Int(2)),
        );
        assert_eq!(cmp.value_type(), AttrType::Boolean);
        assert_eq!(cmp.expr_type(), ExprType::Comparison);
    }

    #[test]
    fn test_structural_equality() {
        let a = Expression::unbound_field(None, "name");
        let b = Expression::unbound_field(None, "name");
        let c = Expression::unbound_field(None, "id");
        assert!(a.equal(&b));
        assert!(!a.equal(&c));

        let x = Expression::arithmetic(
            ArithmeticType::Add,
            Expression::unbound_field(None, "x"),
            Expression::value(Value::Int(1)),
        );
        let y = Expression::arithmetic(
            ArithmeticType::Add,
            Expression::unbound_field(None, "x"),
            Expression::value(Value::Int(1)),
        );
        assert!(x.equal(&y));
    }

    #[test]
    fn test_default_names() {
        let agg = Expression::unbound_aggregation("count", Expression::star(None));
        assert_eq!(agg.name(), "count(*)");

        let v = Expression::value(Value::Int(42));
        assert_eq!(v.name(), "42");

        let f = Expression::unbound_field(Some("t"), "id");
        assert_eq!(f.name(), "id");
        assert_eq!(f.to_string(), "t.id");
    }

    #[test]
    fn test_output_name_prefers_alias() {
        let expr = Expression::unbound_field(None, "id").with_alias("renamed");
        assert_eq!(expr.output_name(), "renamed");
    }

    #[test]
    fn test_try_clone_rejects_subqueries() {
        let sub = Expression::subquery(SelectSqlNode::default());
        assert!(sub.try_clone().is_err());

        let plain = Expression::arithmetic(
            ArithmeticType::Add,
            Expression::value(Value::Int(1)),
            Expression::value(Value::Int(2)),
        );
        assert!(plain.try_clone().is_ok());
    }

    #[test]
    fn test_value_list_cursor() {
        let list = ValueListExpr::new(vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(list.next_value(), Some(Value::Int(1)));
        assert_eq!(list.next_value(), Some(Value::Int(2)));
        assert_eq!(list.next_value(), None);
        list.reset();
        assert_eq!(list.next_value(), Some(Value::Int(1)));
    }
}
