//! Tuple types for query execution.
//!
//! A [`Tuple`] is one logical row with uniform cell access regardless of
//! where it came from: a table record, a join of two rows, a projection
//! over a child row, a materialized value list (group-by output), or the
//! empty tuple used to evaluate table-free expressions.
//!
//! Cells are addressed positionally (`cell_at`) or by a [`TupleCellSpec`]
//! (`find_cell`), which resolves a table qualifier by alias first, then by
//! raw table name.

use std::rc::Rc;
use std::sync::Arc;

use crate::catalog::Table;
use crate::storage::{decode_field, Record};
use crate::value::Value;

use super::error::ExecutorError;
use super::expr::Expression;

/// Addresses one cell of a tuple: an optional table qualifier (real name
/// and/or alias) plus the field or expression name.
#[derive(Debug, Clone, PartialEq)]
pub struct TupleCellSpec {
    pub table_name: Option<String>,
    pub name: String,
    pub table_alias: Option<String>,
}

impl TupleCellSpec {
    pub fn new(table_name: Option<&str>, name: &str) -> Self {
        Self {
            table_name: table_name.map(str::to_string),
            name: name.to_string(),
            table_alias: None,
        }
    }

    /// A spec addressing a cell purely by name (aggregate outputs,
    /// projection columns).
    pub fn by_name(name: &str) -> Self {
        Self::new(None, name)
    }

    pub fn with_table_alias(mut self, alias: &str) -> Self {
        if !alias.is_empty() {
            self.table_alias = Some(alias.to_string());
        }
        self
    }

    /// Whether this spec (the probe) addresses the cell described by
    /// `cell`. The alias is consulted before the raw table name; a probe
    /// without any qualifier matches any table.
    fn matches(&self, cell: &TupleCellSpec) -> bool {
        if self.name != cell.name {
            return false;
        }
        if let (Some(probe), Some(cell_alias)) = (&self.table_alias, &cell.table_alias) {
            return probe == cell_alias;
        }
        match (&self.table_name, &cell.table_name) {
            (Some(probe), Some(name)) => probe.eq_ignore_ascii_case(name),
            (Some(_), None) => false,
            (None, _) => true,
        }
    }
}

/// One row from a single table: the raw record plus the table handle used
/// to decode it.
#[derive(Clone)]
pub struct RowTuple {
    table: Arc<Table>,
    table_alias: Option<String>,
    record: Record,
}

impl RowTuple {
    pub fn new(table: Arc<Table>, table_alias: Option<String>, record: Record) -> Self {
        Self {
            table,
            table_alias,
            record,
        }
    }

    pub fn record(&self) -> &Record {
        &self.record
    }

    fn cell_num(&self) -> usize {
        let meta = self.table.table_meta();
        meta.field_num() - meta.sys_field_num()
    }

    fn cell_at(&self, index: usize) -> Result<Value, ExecutorError> {
        let meta = self.table.table_meta();
        let field_index = meta.sys_field_num() + index;
        if field_index >= meta.field_num() {
            return Err(ExecutorError::Internal(format!(
                "cell index {} out of range for table {}",
                index,
                self.table.name()
            )));
        }
        Ok(decode_field(meta, meta.field_at(field_index), self.record.data()))
    }

    fn find_cell(&self, spec: &TupleCellSpec) -> Option<Value> {
        let table_ok = match (&spec.table_alias, &self.table_alias) {
            (Some(probe), Some(alias)) if probe == alias => true,
            _ => match &spec.table_name {
                Some(name) => name.eq_ignore_ascii_case(self.table.name()),
                None => spec.table_alias.is_none(),
            },
        };
        if !table_ok {
            return None;
        }
        let meta = self.table.table_meta();
        let field = meta.field(&spec.name)?;
        Some(decode_field(meta, field, self.record.data()))
    }
}

/// The concatenation of two child tuples, left cells first. Cell lookup
/// tries the left child before the right, which also gives correlated
/// subqueries their inner-before-outer resolution order.
#[derive(Clone)]
pub struct JoinedTuple {
    left: Box<Tuple>,
    right: Box<Tuple>,
}

impl JoinedTuple {
    pub fn new(left: Tuple, right: Tuple) -> Self {
        Self {
            left: Box::new(left),
            right: Box::new(right),
        }
    }
}

/// A child tuple viewed through a projection list. Cells are computed on
/// access by evaluating the projection expressions against the child.
#[derive(Clone)]
pub struct ProjectTuple {
    child: Box<Tuple>,
    exprs: Rc<Vec<Expression>>,
}

impl ProjectTuple {
    pub fn new(child: Tuple, exprs: Rc<Vec<Expression>>) -> Self {
        Self {
            child: Box::new(child),
            exprs,
        }
    }
}

/// A fully materialized row: explicit cell specs and values. Produced by
/// group-by (key columns then aggregate results) and by operators that
/// emit synthetic rows (counts, plan text).
#[derive(Clone)]
pub struct ValueListTuple {
    specs: Vec<TupleCellSpec>,
    cells: Vec<Value>,
}

impl ValueListTuple {
    pub fn new(specs: Vec<TupleCellSpec>, cells: Vec<Value>) -> Self {
        debug_assert_eq!(specs.len(), cells.len());
        Self { specs, cells }
    }
}

/// One logical row during execution.
#[derive(Clone)]
pub enum Tuple {
    Row(RowTuple),
    Joined(JoinedTuple),
    Project(ProjectTuple),
    ValueList(ValueListTuple),
    Empty,
}

impl Tuple {
    /// Number of cells in this row.
    pub fn cell_num(&self) -> usize {
        match self {
            Tuple::Row(t) => t.cell_num(),
            Tuple::Joined(t) => t.left.cell_num() + t.right.cell_num(),
            Tuple::Project(t) => t.exprs.len(),
            Tuple::ValueList(t) => t.cells.len(),
            Tuple::Empty => 0,
        }
    }

    /// Returns the cell at `index`.
    pub fn cell_at(&self, index: usize) -> Result<Value, ExecutorError> {
        match self {
            Tuple::Row(t) => t.cell_at(index),
            Tuple::Joined(t) => {
                let left_num = t.left.cell_num();
                if index < left_num {
                    t.left.cell_at(index)
                } else {
                    t.right.cell_at(index - left_num)
                }
            }
            Tuple::Project(t) => match t.exprs.get(index) {
                Some(expr) => expr.evaluate(&t.child),
                None => Err(ExecutorError::Internal(format!(
                    "cell index {} out of range for projection",
                    index
                ))),
            },
            Tuple::ValueList(t) => t.cells.get(index).cloned().ok_or_else(|| {
                ExecutorError::Internal(format!("cell index {} out of range", index))
            }),
            Tuple::Empty => Err(ExecutorError::Internal(
                "empty tuple has no cells".to_string(),
            )),
        }
    }

    /// Looks up a cell by spec. Returns `None` when this row has no such
    /// cell, letting joined lookups fall through to the other side.
    pub fn find_cell(&self, spec: &TupleCellSpec) -> Result<Option<Value>, ExecutorError> {
        match self {
            Tuple::Row(t) => Ok(t.find_cell(spec)),
            Tuple::Joined(t) => match t.left.find_cell(spec)? {
                Some(v) => Ok(Some(v)),
                None => t.right.find_cell(spec),
            },
            Tuple::Project(t) => {
                for expr in t.exprs.iter() {
                    let matched = (!expr.alias().is_empty() && expr.alias() == spec.name)
                        || (!expr.name().is_empty() && expr.name() == spec.name);
                    if matched {
                        return Ok(Some(expr.evaluate(&t.child)?));
                    }
                }
                Ok(None)
            }
            Tuple::ValueList(t) => {
                for (cell_spec, cell) in t.specs.iter().zip(&t.cells) {
                    if spec.matches(cell_spec) {
                        return Ok(Some(cell.clone()));
                    }
                }
                Ok(None)
            }
            Tuple::Empty => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value_list(pairs: Vec<(TupleCellSpec, Value)>) -> Tuple {
        let (specs, cells) = pairs.into_iter().unzip();
        Tuple::ValueList(ValueListTuple::new(specs, cells))
    }

    #[test]
    fn test_value_list_tuple_lookup() {
        let tuple = value_list(vec![
            (TupleCellSpec::new(Some("t"), "id"), Value::Int(7)),
            (TupleCellSpec::by_name("count(*)"), Value::Int(3)),
        ]);
        assert_eq!(tuple.cell_num(), 2);
        assert_eq!(tuple.cell_at(1).unwrap(), Value::Int(3));
        assert_eq!(
            tuple
                .find_cell(&TupleCellSpec::new(Some("t"), "id"))
                .unwrap(),
            Some(Value::Int(7))
        );
        assert_eq!(
            tuple.find_cell(&TupleCellSpec::by_name("id")).unwrap(),
            Some(Value::Int(7))
        );
        assert_eq!(
            tuple
                .find_cell(&TupleCellSpec::new(Some("other"), "id"))
                .unwrap(),
            None
        );
    }

    #[test]
    fn test_joined_tuple_prefers_left() {
        let left = value_list(vec![(TupleCellSpec::new(Some("a"), "x"), Value::Int(1))]);
        let right = value_list(vec![
            (TupleCellSpec::new(Some("b"), "x"), Value::Int(2)),
            (TupleCellSpec::new(Some("b"), "y"), Value::Int(3)),
        ]);
        let joined = Tuple::Joined(JoinedTuple::new(left, right));

        assert_eq!(joined.cell_num(), 3);
        assert_eq!(joined.cell_at(0).unwrap(), Value::Int(1));
        assert_eq!(joined.cell_at(2).unwrap(), Value::Int(3));
        // Unqualified lookup resolves on the left side first.
        assert_eq!(
            joined.find_cell(&TupleCellSpec::by_name("x")).unwrap(),
            Some(Value::Int(1))
        );
        assert_eq!(
            joined
                .find_cell(&TupleCellSpec::new(Some("b"), "x"))
                .unwrap(),
            Some(Value::Int(2))
        );
    }

    #[test]
    fn test_alias_resolves_before_table_name() {
        let spec = TupleCellSpec::new(Some("t"), "id").with_table_alias("t1");
        let cell_aliased = TupleCellSpec::new(Some("t"), "id").with_table_alias("t1");
        let cell_other_alias = TupleCellSpec::new(Some("t"), "id").with_table_alias("t2");
        assert!(spec.matches(&cell_aliased));
        assert!(!spec.matches(&cell_other_alias));
    }

    #[test]
    fn test_empty_tuple() {
        assert_eq!(Tuple::Empty.cell_num(), 0);
        assert!(Tuple::Empty.cell_at(0).is_err());
        assert_eq!(
            Tuple::Empty.find_cell(&TupleCellSpec::by_name("x")).unwrap(),
            None
        );
    }
}
