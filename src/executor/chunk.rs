//! Column batches and the vectorized expression path.
//!
//! A [`Chunk`] is a batch of rows laid out column-wise; a [`Column`] is a
//! typed vector of Int or Float cells, or a single broadcast constant.
//! Only those two element types are vectorized: `evaluate_column` and
//! `evaluate_select` return [`ExecutorError::Unimplemented`] for anything
//! else, and callers fall back to the row path.
//!
//! The arithmetic and comparison kernels are specialized over the four
//! operand layouts (constant/constant, constant/vector, vector/constant,
//! vector/vector) so the inner loops stay branch-free.

use crate::sql::CompOp;
use crate::value::{AttrType, Value};

use super::error::ExecutorError;
use super::expr::{ArithmeticType, ComparisonExpr, ExprKind, Expression};

/// Whether a column holds one value per row or a single broadcast value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Normal,
    Constant,
}

#[derive(Debug, Clone)]
enum ColumnData {
    Int(Vec<i32>),
    Float(Vec<f32>),
}

/// A typed column of cells.
#[derive(Debug, Clone)]
pub struct Column {
    kind: ColumnKind,
    data: ColumnData,
}

impl Column {
    pub fn ints(values: Vec<i32>) -> Self {
        Self {
            kind: ColumnKind::Normal,
            data: ColumnData::Int(values),
        }
    }

    pub fn floats(values: Vec<f32>) -> Self {
        Self {
            kind: ColumnKind::Normal,
            data: ColumnData::Float(values),
        }
    }

    /// A single-cell constant column broadcast over the chunk.
    pub fn constant(value: &Value) -> Result<Self, ExecutorError> {
        let data = match value {
            Value::Int(n) => ColumnData::Int(vec![*n]),
            Value::Float(f) => ColumnData::Float(vec![*f]),
            other => {
                return Err(ExecutorError::Unimplemented(format!(
                    "no vectorized representation for {}",
                    other.attr_type()
                )));
            }
        };
        Ok(Self {
            kind: ColumnKind::Constant,
            data,
        })
    }

    pub fn kind(&self) -> ColumnKind {
        self.kind
    }

    pub fn attr_type(&self) -> AttrType {
        match self.data {
            ColumnData::Int(_) => AttrType::Int,
            ColumnData::Float(_) => AttrType::Float,
        }
    }

    /// Number of stored cells (1 for a constant column).
    pub fn count(&self) -> usize {
        match &self.data {
            ColumnData::Int(v) => v.len(),
            ColumnData::Float(v) => v.len(),
        }
    }

    /// Cell at `row`, honoring constant broadcast.
    pub fn value_at(&self, row: usize) -> Value {
        let i = match self.kind {
            ColumnKind::Constant => 0,
            ColumnKind::Normal => row,
        };
        match &self.data {
            ColumnData::Int(v) => Value::Int(v[i]),
            ColumnData::Float(v) => Value::Float(v[i]),
        }
    }

    fn is_constant(&self) -> bool {
        self.kind == ColumnKind::Constant
    }

    /// The cells widened to f32, for mixed-type arithmetic and compares.
    fn to_floats(&self) -> Vec<f32> {
        match &self.data {
            ColumnData::Int(v) => v.iter().map(|n| *n as f32).collect(),
            ColumnData::Float(v) => v.clone(),
        }
    }

    fn as_ints(&self) -> Option<&[i32]> {
        match &self.data {
            ColumnData::Int(v) => Some(v),
            ColumnData::Float(_) => None,
        }
    }
}

/// A batch of rows in columnar layout.
pub struct Chunk {
    columns: Vec<Column>,
    rows: usize,
}

impl Chunk {
    pub fn new(columns: Vec<Column>) -> Self {
        let rows = columns
            .iter()
            .filter(|c| !c.is_constant())
            .map(Column::count)
            .max()
            .unwrap_or(0);
        Self { columns, rows }
    }

    pub fn column(&self, index: usize) -> Result<&Column, ExecutorError> {
        self.columns.get(index).ok_or_else(|| {
            ExecutorError::Internal(format!("chunk has no column {}", index))
        })
    }

    pub fn column_num(&self) -> usize {
        self.columns.len()
    }

    pub fn rows(&self) -> usize {
        self.rows
    }
}

/// Runs `op` over the four operand layouts.
fn binary_kernel<T: Copy>(
    left: &[T],
    right: &[T],
    left_const: bool,
    right_const: bool,
    rows: usize,
    op: impl Fn(T, T) -> T,
) -> Vec<T> {
    match (left_const, right_const) {
        (true, true) => vec![op(left[0], right[0])],
        (true, false) => (0..rows).map(|i| op(left[0], right[i])).collect(),
        (false, true) => (0..rows).map(|i| op(left[i], right[0])).collect(),
        (false, false) => (0..rows).map(|i| op(left[i], right[i])).collect(),
    }
}

/// Comparison counterpart of [`binary_kernel`], producing a 0/1 selection
/// vector of one entry per chunk row.
fn compare_kernel<T: Copy + PartialOrd>(
    left: &[T],
    right: &[T],
    left_const: bool,
    right_const: bool,
    rows: usize,
    op: impl Fn(T, T) -> bool,
) -> Vec<u8> {
    match (left_const, right_const) {
        (true, true) => vec![op(left[0], right[0]) as u8; rows],
        (true, false) => (0..rows).map(|i| op(left[0], right[i]) as u8).collect(),
        (false, true) => (0..rows).map(|i| op(left[i], right[0]) as u8).collect(),
        (false, false) => (0..rows).map(|i| op(left[i], right[i]) as u8).collect(),
    }
}

impl Expression {
    /// Evaluates this expression over a chunk, producing a column.
    ///
    /// Defined for Field, Value, and Arithmetic over Int/Float, and for
    /// bound aggregates whose result was precomputed into the chunk
    /// (`pos >= 0`). Everything else reports `Unimplemented` so callers
    /// fall back to the row path.
    pub fn evaluate_column(&self, chunk: &Chunk) -> Result<Column, ExecutorError> {
        match &self.kind {
            ExprKind::Field(field_expr) => {
                let index = if self.pos() >= 0 {
                    self.pos() as usize
                } else {
                    field_expr.field.field_id
                };
                Ok(chunk.column(index)?.clone())
            }
            ExprKind::Value(v) => Column::constant(v),
            ExprKind::Aggregation(_) => {
                if self.pos() >= 0 {
                    Ok(chunk.column(self.pos() as usize)?.clone())
                } else {
                    Err(ExecutorError::Internal(
                        "aggregate has no precomputed column".into(),
                    ))
                }
            }
            ExprKind::Arithmetic(arith) => {
                if self.pos() >= 0 {
                    return Ok(chunk.column(self.pos() as usize)?.clone());
                }
                let left = arith.left.evaluate_column(chunk)?;
                match &arith.right {
                    None => Ok(negate_column(&left)),
                    Some(right_expr) => {
                        let right = right_expr.evaluate_column(chunk)?;
                        calc_column(
                            arith.arithmetic_type,
                            self.value_type(),
                            &left,
                            &right,
                            chunk.rows(),
                        )
                    }
                }
            }
            _ => Err(ExecutorError::Unimplemented(format!(
                "no vectorized evaluation for {:?} expressions",
                self.expr_type()
            ))),
        }
    }

    /// Evaluates a comparison over a chunk into a 0/1 selection vector.
    pub fn evaluate_select(&self, chunk: &Chunk) -> Result<Vec<u8>, ExecutorError> {
        match &self.kind {
            ExprKind::Comparison(cmp) => cmp.eval_select(chunk),
            _ => Err(ExecutorError::Unimplemented(format!(
                "no vectorized selection for {:?} expressions",
                self.expr_type()
            ))),
        }
    }
}

fn negate_column(input: &Column) -> Column {
    let data = match &input.data {
        ColumnData::Int(v) => ColumnData::Int(v.iter().map(|n| n.wrapping_neg()).collect()),
        ColumnData::Float(v) => ColumnData::Float(v.iter().map(|f| -f).collect()),
    };
    Column {
        kind: input.kind,
        data,
    }
}

fn calc_column(
    op: ArithmeticType,
    target: AttrType,
    left: &Column,
    right: &Column,
    rows: usize,
) -> Result<Column, ExecutorError> {
    let kind = if left.is_constant() && right.is_constant() {
        ColumnKind::Constant
    } else {
        ColumnKind::Normal
    };

    // Division and any Float operand compute in f32; pure Int arithmetic
    // stays in i32.
    let data = if target == AttrType::Int {
        let (l, r) = match (left.as_ints(), right.as_ints()) {
            (Some(l), Some(r)) => (l, r),
            _ => {
                return Err(ExecutorError::Internal(
                    "int arithmetic over non-int columns".into(),
                ));
            }
        };
        let cells = match op {
            ArithmeticType::Add => {
                binary_kernel(l, r, left.is_constant(), right.is_constant(), rows, |a, b| {
                    a.wrapping_add(b)
                })
            }
            ArithmeticType::Sub => {
                binary_kernel(l, r, left.is_constant(), right.is_constant(), rows, |a, b| {
                    a.wrapping_sub(b)
                })
            }
            ArithmeticType::Mul => {
                binary_kernel(l, r, left.is_constant(), right.is_constant(), rows, |a, b| {
                    a.wrapping_mul(b)
                })
            }
            _ => {
                return Err(ExecutorError::Internal(format!(
                    "operator {} cannot produce an int column",
                    op
                )));
            }
        };
        ColumnData::Int(cells)
    } else {
        let l = left.to_floats();
        let r = right.to_floats();
        let (lc, rc) = (left.is_constant(), right.is_constant());
        let cells = match op {
            ArithmeticType::Add => binary_kernel(&l, &r, lc, rc, rows, |a, b| a + b),
            ArithmeticType::Sub => binary_kernel(&l, &r, lc, rc, rows, |a, b| a - b),
            ArithmeticType::Mul => binary_kernel(&l, &r, lc, rc, rows, |a, b| a * b),
            ArithmeticType::Div => binary_kernel(&l, &r, lc, rc, rows, |a, b| a / b),
            ArithmeticType::Negative => {
                return Err(ExecutorError::Internal(
                    "negation is unary".into(),
                ));
            }
        };
        ColumnData::Float(cells)
    };
    Ok(Column { kind, data })
}

impl ComparisonExpr {
    /// The vectorized comparison: one 0/1 entry per chunk row.
    ///
    /// Only the six scalar operators are vectorized; membership and
    /// existence shapes stay on the row path.
    pub fn eval_select(&self, chunk: &Chunk) -> Result<Vec<u8>, ExecutorError> {
        let left_expr = self.left.as_ref().ok_or_else(|| {
            ExecutorError::Unimplemented("no vectorized evaluation without a left operand".into())
        })?;
        if !matches!(
            self.comp,
            CompOp::EqualTo
                | CompOp::NotEqual
                | CompOp::LessThan
                | CompOp::LessEqual
                | CompOp::GreatThan
                | CompOp::GreatEqual
        ) {
            return Err(ExecutorError::Unimplemented(format!(
                "no vectorized evaluation for {}",
                self.comp
            )));
        }

        let left = left_expr.evaluate_column(chunk)?;
        let right = self.right.evaluate_column(chunk)?;
        let rows = chunk.rows();
        let (lc, rc) = (left.is_constant(), right.is_constant());

        let comp = self.comp;
        if left.attr_type() == AttrType::Int && right.attr_type() == AttrType::Int {
            let (l, r) = (left.as_ints().unwrap(), right.as_ints().unwrap());
            Ok(select_by_op(comp, l, r, lc, rc, rows))
        } else {
            let (l, r) = (left.to_floats(), right.to_floats());
            Ok(select_by_op(comp, &l, &r, lc, rc, rows))
        }
    }
}

fn select_by_op<T: Copy + PartialOrd>(
    comp: CompOp,
    l: &[T],
    r: &[T],
    lc: bool,
    rc: bool,
    rows: usize,
) -> Vec<u8> {
    match comp {
        CompOp::EqualTo => compare_kernel(l, r, lc, rc, rows, |a, b| a == b),
        CompOp::NotEqual => compare_kernel(l, r, lc, rc, rows, |a, b| a != b),
        CompOp::LessThan => compare_kernel(l, r, lc, rc, rows, |a, b| a < b),
        CompOp::LessEqual => compare_kernel(l, r, lc, rc, rows, |a, b| a <= b),
        CompOp::GreatThan => compare_kernel(l, r, lc, rc, rows, |a, b| a > b),
        CompOp::GreatEqual => compare_kernel(l, r, lc, rc, rows, |a, b| a >= b),
        _ => unreachable!("filtered by eval_select"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int_chunk() -> Chunk {
        Chunk::new(vec![
            Column::ints(vec![1, 2, 3, 4]),
            Column::ints(vec![10, 20, 30, 40]),
        ])
    }

    fn field_expr(field_id: usize, attr_type: AttrType) -> Expression {
        use crate::catalog::FieldMeta;
        Expression::field(
            "t",
            &FieldMeta {
                name: format!("c{}", field_id),
                attr_type,
                offset: 0,
                len: 4,
                nullable: true,
                field_id,
                is_sys: false,
            },
        )
    }

    #[test]
    fn test_field_column_by_field_id_and_pos() {
        let chunk = int_chunk();
        let by_id = field_expr(1, AttrType::Int);
        let col = by_id.evaluate_column(&chunk).unwrap();
        assert_eq!(col.value_at(2), Value::Int(30));

        let mut by_pos = field_expr(1, AttrType::Int);
        by_pos.set_pos(0);
        let col = by_pos.evaluate_column(&chunk).unwrap();
        assert_eq!(col.value_at(2), Value::Int(3));
    }

    #[test]
    fn test_vector_vector_arithmetic() {
        let chunk = int_chunk();
        let sum = Expression::arithmetic(
            ArithmeticType::Add,
            field_expr(0, AttrType::Int),
            field_expr(1, AttrType::Int),
        );
        let col = sum.evaluate_column(&chunk).unwrap();
        assert_eq!(col.attr_type(), AttrType::Int);
        assert_eq!(col.kind(), ColumnKind::Normal);
        assert_eq!(col.count(), 4);
        assert_eq!(col.value_at(3), Value::Int(44));
    }

    #[test]
    fn test_constant_operand_layouts() {
        let chunk = int_chunk();

        // constant + vector
        let left_const = Expression::arithmetic(
            ArithmeticType::Add,
            Expression::value(Value::Int(100)),
            field_expr(0, AttrType::Int),
        );
        let col = left_const.evaluate_column(&chunk).unwrap();
        assert_eq!(col.value_at(1), Value::Int(102));

        // vector - constant
        let right_const = Expression::arithmetic(
            ArithmeticType::Sub,
            field_expr(1, AttrType::Int),
            Expression::value(Value::Int(5)),
        );
        let col = right_const.evaluate_column(&chunk).unwrap();
        assert_eq!(col.value_at(0), Value::Int(5));

        // constant * constant stays a constant column
        let both_const = Expression::arithmetic(
            ArithmeticType::Mul,
            Expression::value(Value::Int(6)),
            Expression::value(Value::Int(7)),
        );
        let col = both_const.evaluate_column(&chunk).unwrap();
        assert_eq!(col.kind(), ColumnKind::Constant);
        assert_eq!(col.value_at(3), Value::Int(42));
    }

    #[test]
    fn test_int_division_produces_float_column() {
        let chunk = int_chunk();
        let div = Expression::arithmetic(
            ArithmeticType::Div,
            field_expr(1, AttrType::Int),
            field_expr(0, AttrType::Int),
        );
        let col = div.evaluate_column(&chunk).unwrap();
        assert_eq!(col.attr_type(), AttrType::Float);
        assert_eq!(col.value_at(1), Value::Float(10.0));
    }

    #[test]
    fn test_unary_negate() {
        let chunk = int_chunk();
        let neg = Expression::negative(field_expr(0, AttrType::Int));
        let col = neg.evaluate_column(&chunk).unwrap();
        assert_eq!(col.value_at(2), Value::Int(-3));
    }

    #[test]
    fn test_float_kernel() {
        let chunk = Chunk::new(vec![Column::floats(vec![1.5, 2.5])]);
        let mul = Expression::arithmetic(
            ArithmeticType::Mul,
            field_expr(0, AttrType::Float),
            Expression::value(Value::Float(2.0)),
        );
        let col = mul.evaluate_column(&chunk).unwrap();
        assert_eq!(col.value_at(1), Value::Float(5.0));
    }

    #[test]
    fn test_comparison_select_vector() {
        let chunk = int_chunk();
        let cmp = Expression::comparison(
            CompOp::GreatThan,
            Some(field_expr(0, AttrType::Int)),
            Expression::value(Value::Int(2)),
        );
        assert_eq!(cmp.evaluate_select(&chunk).unwrap(), vec![0, 0, 1, 1]);
    }

    #[test]
    fn test_comparison_select_mixed_types_promotes_to_float() {
        let chunk = Chunk::new(vec![
            Column::ints(vec![1, 2, 3]),
            Column::floats(vec![1.5, 1.5, 1.5]),
        ]);
        let cmp = Expression::comparison(
            CompOp::LessThan,
            Some(field_expr(0, AttrType::Int)),
            field_expr(1, AttrType::Float),
        );
        assert_eq!(cmp.evaluate_select(&chunk).unwrap(), vec![1, 0, 0]);
    }

    #[test]
    fn test_unsupported_types_report_unimplemented() {
        let chunk = int_chunk();
        assert!(matches!(
            Expression::value(Value::Chars("x".into())).evaluate_column(&chunk),
            Err(ExecutorError::Unimplemented(_))
        ));

        let in_cmp = Expression::comparison(
            CompOp::In,
            Some(field_expr(0, AttrType::Int)),
            Expression::value_list(vec![Value::Int(1)]),
        );
        assert!(matches!(
            in_cmp.evaluate_select(&chunk),
            Err(ExecutorError::Unimplemented(_))
        ));
    }
}
