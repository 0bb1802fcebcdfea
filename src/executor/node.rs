//! Physical operators implementing the Volcano iterator model.
//!
//! Every operator follows the open/next/close contract: `open` acquires
//! scanners and locks (and injects the transaction into any subquery
//! expressions it evaluates), `next` produces one tuple or `Ok(None)` at
//! end of stream, and `close` releases resources. Closing twice is a
//! no-op, and a parent's close cascades to its children.
//!
//! Operators are composed through enum dispatch: the number of operator
//! kinds is small and fixed, and it keeps the tree free of boxing
//! gymnastics beyond one `Box` per edge.
//!
//! Correlated subqueries inject an "outer tuple" before reopening a plan;
//! scan and filter operators chain it behind their own row for predicate
//! evaluation, so inner names win and outer columns resolve through the
//! fallback.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::rc::Rc;
use std::sync::Arc;

use crate::catalog::{FieldMeta, Table};
use crate::storage::{patch_field, LockMode, Record, RecordScanner, Rid, Trx};
use crate::value::Value;

use super::aggregate::Aggregator;
use super::error::ExecutorError;
use super::expr::Expression;
use super::logical::AggregateSpec;
use super::tuple::{JoinedTuple, ProjectTuple, RowTuple, Tuple, TupleCellSpec, ValueListTuple};

/// A physical operator tree node.
pub enum PhysicalOperator {
    TableScan(TableScan),
    Filter(Filter),
    NestedLoopJoin(NestedLoopJoin),
    GroupBy(GroupBy),
    Project(Project),
    Insert(Insert),
    Update(Update),
    Delete(Delete),
    Explain(Explain),
    Calc(Calc),
}

impl PhysicalOperator {
    /// Opens the operator: acquires scanners/locks and readies children.
    pub fn open(&mut self, trx: &Rc<Trx>) -> Result<(), ExecutorError> {
        match self {
            PhysicalOperator::TableScan(op) => op.open(trx),
            PhysicalOperator::Filter(op) => op.open(trx),
            PhysicalOperator::NestedLoopJoin(op) => op.open(trx),
            PhysicalOperator::GroupBy(op) => op.open(trx),
            PhysicalOperator::Project(op) => op.open(trx),
            PhysicalOperator::Insert(op) => op.open(trx),
            PhysicalOperator::Update(op) => op.open(trx),
            PhysicalOperator::Delete(op) => op.open(trx),
            PhysicalOperator::Explain(_) => Ok(()),
            PhysicalOperator::Calc(op) => op.open(trx),
        }
    }

    /// Produces the next tuple, or `Ok(None)` at end of stream.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Result<Option<Tuple>, ExecutorError> {
        match self {
            PhysicalOperator::TableScan(op) => op.next(),
            PhysicalOperator::Filter(op) => op.next(),
            PhysicalOperator::NestedLoopJoin(op) => op.next(),
            PhysicalOperator::GroupBy(op) => op.next(),
            PhysicalOperator::Project(op) => op.next(),
            PhysicalOperator::Insert(op) => op.next(),
            PhysicalOperator::Update(op) => op.next(),
            PhysicalOperator::Delete(op) => op.next(),
            PhysicalOperator::Explain(op) => op.next(),
            PhysicalOperator::Calc(op) => op.next(),
        }
    }

    /// Releases the operator's resources. Idempotent; cascades to
    /// children.
    pub fn close(&mut self) -> Result<(), ExecutorError> {
        match self {
            PhysicalOperator::TableScan(op) => op.close(),
            PhysicalOperator::Filter(op) => op.close(),
            PhysicalOperator::NestedLoopJoin(op) => op.close(),
            PhysicalOperator::GroupBy(op) => op.close(),
            PhysicalOperator::Project(op) => op.close(),
            PhysicalOperator::Insert(op) => op.close(),
            PhysicalOperator::Update(op) => op.close(),
            PhysicalOperator::Delete(op) => op.close(),
            PhysicalOperator::Explain(_) => Ok(()),
            PhysicalOperator::Calc(_) => Ok(()),
        }
    }

    /// Installs (or clears) the outer tuple a correlated subquery parent
    /// provides. Recurses into children; scans and filters keep a copy
    /// for predicate evaluation.
    pub fn set_outer_tuple(&mut self, outer: Option<Tuple>) {
        match self {
            PhysicalOperator::TableScan(op) => op.outer = outer,
            PhysicalOperator::Filter(op) => {
                op.outer = outer.clone();
                op.child.set_outer_tuple(outer);
            }
            PhysicalOperator::NestedLoopJoin(op) => {
                op.left.set_outer_tuple(outer.clone());
                op.right.set_outer_tuple(outer);
            }
            PhysicalOperator::GroupBy(op) => op.child.set_outer_tuple(outer),
            PhysicalOperator::Project(op) => {
                if let Some(child) = &mut op.child {
                    child.set_outer_tuple(outer);
                }
            }
            PhysicalOperator::Update(op) => {
                if let Some(child) = &mut op.child {
                    child.set_outer_tuple(outer);
                }
            }
            PhysicalOperator::Delete(op) => op.child.set_outer_tuple(outer),
            PhysicalOperator::Insert(_)
            | PhysicalOperator::Explain(_)
            | PhysicalOperator::Calc(_) => {}
        }
    }

    /// Column names of this operator's output rows, for the session
    /// layer. Only root-capable operators report names.
    pub fn output_names(&self) -> Vec<String> {
        match self {
            PhysicalOperator::Project(op) => {
                op.expressions.iter().map(Expression::output_name).collect()
            }
            PhysicalOperator::Calc(op) => {
                op.expressions.iter().map(Expression::output_name).collect()
            }
            PhysicalOperator::Explain(_) => vec!["Query Plan".to_string()],
            PhysicalOperator::Insert(_)
            | PhysicalOperator::Update(_)
            | PhysicalOperator::Delete(_) => vec!["rows".to_string()],
            _ => Vec::new(),
        }
    }
}

/// Wraps the current row with the outer tuple (if any) so predicate
/// evaluation resolves inner columns first and falls back to the outer
/// row.
fn chain_outer(tuple: &Tuple, outer: &Option<Tuple>) -> Tuple {
    match outer {
        Some(outer) => Tuple::Joined(JoinedTuple::new(tuple.clone(), outer.clone())),
        None => tuple.clone(),
    }
}

/// The single-cell row DML operators emit to report their affected-row
/// count.
fn affected_rows_tuple(count: i32) -> Tuple {
    Tuple::ValueList(ValueListTuple::new(
        vec![TupleCellSpec::by_name("rows")],
        vec![Value::Int(count)],
    ))
}

/// The record id behind a row tuple; DML children always produce rows of
/// their target table.
fn row_record(tuple: &Tuple) -> Result<&Record, ExecutorError> {
    match tuple {
        Tuple::Row(row) => Ok(row.record()),
        _ => Err(ExecutorError::Internal(
            "DML operator expected a table row".into(),
        )),
    }
}

/// Table scan in storage order, with optional pushed-down predicates.
pub struct TableScan {
    table: Arc<Table>,
    alias: Option<String>,
    mode: LockMode,
    predicates: Vec<Expression>,
    scanner: Option<RecordScanner>,
    outer: Option<Tuple>,
}

impl TableScan {
    pub fn new(
        table: Arc<Table>,
        alias: Option<String>,
        mode: LockMode,
        predicates: Vec<Expression>,
    ) -> Self {
        Self {
            table,
            alias,
            mode,
            predicates,
            scanner: None,
            outer: None,
        }
    }

    fn open(&mut self, trx: &Rc<Trx>) -> Result<(), ExecutorError> {
        // Reopening resets the cursor; correlated predicates re-read the
        // freshly injected outer tuple on the next pass.
        if let Some(mut scanner) = self.scanner.take() {
            scanner.close();
        }
        for predicate in &self.predicates {
            predicate.attach_trx(trx);
        }
        self.scanner = Some(self.table.get_record_scanner(trx, self.mode)?);
        Ok(())
    }

    fn next(&mut self) -> Result<Option<Tuple>, ExecutorError> {
        let scanner = self
            .scanner
            .as_mut()
            .ok_or_else(|| ExecutorError::Internal("table scan is not open".into()))?;
        loop {
            let record = match scanner.next()? {
                Some(record) => record,
                None => return Ok(None),
            };
            let tuple = Tuple::Row(RowTuple::new(
                self.table.clone(),
                self.alias.clone(),
                record,
            ));
            if self.predicates.is_empty() {
                return Ok(Some(tuple));
            }
            let eval_tuple = chain_outer(&tuple, &self.outer);
            let mut passes = true;
            for predicate in &self.predicates {
                if !predicate.evaluate(&eval_tuple)?.get_boolean() {
                    passes = false;
                    break;
                }
            }
            if passes {
                return Ok(Some(tuple));
            }
        }
    }

    fn close(&mut self) -> Result<(), ExecutorError> {
        if let Some(mut scanner) = self.scanner.take() {
            scanner.close();
        }
        Ok(())
    }
}

/// Row filter over a bound conjunction.
pub struct Filter {
    child: Box<PhysicalOperator>,
    predicate: Expression,
    outer: Option<Tuple>,
}

impl Filter {
    pub fn new(child: PhysicalOperator, predicate: Expression) -> Self {
        Self {
            child: Box::new(child),
            predicate,
            outer: None,
        }
    }

    fn open(&mut self, trx: &Rc<Trx>) -> Result<(), ExecutorError> {
        self.predicate.attach_trx(trx);
        self.child.open(trx)
    }

    fn next(&mut self) -> Result<Option<Tuple>, ExecutorError> {
        loop {
            let tuple = match self.child.next()? {
                Some(tuple) => tuple,
                None => return Ok(None),
            };
            let eval_tuple = chain_outer(&tuple, &self.outer);
            if self.predicate.evaluate(&eval_tuple)?.get_boolean() {
                return Ok(Some(tuple));
            }
        }
    }

    fn close(&mut self) -> Result<(), ExecutorError> {
        self.child.close()
    }
}

/// Nested-loop join: left-major, right child reopened per left row. The
/// cross product carries no join predicate; conditions sit in a Filter
/// above.
pub struct NestedLoopJoin {
    left: Box<PhysicalOperator>,
    right: Box<PhysicalOperator>,
    trx: Option<Rc<Trx>>,
    left_tuple: Option<Tuple>,
}

impl NestedLoopJoin {
    pub fn new(left: PhysicalOperator, right: PhysicalOperator) -> Self {
        Self {
            left: Box::new(left),
            right: Box::new(right),
            trx: None,
            left_tuple: None,
        }
    }

    fn open(&mut self, trx: &Rc<Trx>) -> Result<(), ExecutorError> {
        self.trx = Some(trx.clone());
        self.left_tuple = None;
        self.left.open(trx)?;
        self.right.open(trx)
    }

    fn next(&mut self) -> Result<Option<Tuple>, ExecutorError> {
        loop {
            if self.left_tuple.is_none() {
                self.left_tuple = self.left.next()?;
                if self.left_tuple.is_none() {
                    return Ok(None);
                }
            }
            if let Some(right_tuple) = self.right.next()? {
                let left_tuple = self.left_tuple.clone().unwrap();
                return Ok(Some(Tuple::Joined(JoinedTuple::new(
                    left_tuple,
                    right_tuple,
                ))));
            }
            // Right side exhausted: advance the outer row and rescan.
            self.left_tuple = self.left.next()?;
            if self.left_tuple.is_none() {
                return Ok(None);
            }
            let trx = self
                .trx
                .clone()
                .ok_or_else(|| ExecutorError::Internal("join is not open".into()))?;
            self.right.close()?;
            self.right.open(&trx)?;
        }
    }

    fn close(&mut self) -> Result<(), ExecutorError> {
        self.left_tuple = None;
        self.left.close()?;
        self.right.close()
    }
}

/// Group key with SQL GROUP BY equality: NULL groups with NULL, floats
/// compare by bit pattern (so NaN groups with NaN).
struct GroupKey(Vec<Value>);

impl PartialEq for GroupKey {
    fn eq(&self, other: &Self) -> bool {
        if self.0.len() != other.0.len() {
            return false;
        }
        self.0.iter().zip(&other.0).all(|(a, b)| match (a, b) {
            (Value::Null, Value::Null) => true,
            (Value::Float(x), Value::Float(y)) => x.to_bits() == y.to_bits(),
            (Value::Null, _) | (_, Value::Null) => false,
            _ => a.compare(b) == Some(std::cmp::Ordering::Equal),
        })
    }
}

impl Eq for GroupKey {}

impl Hash for GroupKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.len().hash(state);
        for value in &self.0 {
            match value {
                Value::Null => 0u8.hash(state),
                Value::Int(n) => {
                    1u8.hash(state);
                    n.hash(state);
                }
                Value::Float(f) => {
                    2u8.hash(state);
                    f.to_bits().hash(state);
                }
                Value::Chars(s) => {
                    3u8.hash(state);
                    s.hash(state);
                }
                Value::Date(d) => {
                    4u8.hash(state);
                    d.hash(state);
                }
                Value::Boolean(b) => {
                    5u8.hash(state);
                    b.hash(state);
                }
                Value::Undefined => 6u8.hash(state),
            }
        }
    }
}

/// Grouped aggregation: drains its child, partitions rows by the group
/// key, streams each row into one accumulator per aggregate, and emits
/// groups in first-seen order as key cells followed by aggregate finals.
pub struct GroupBy {
    child: Box<PhysicalOperator>,
    group_exprs: Vec<Expression>,
    aggregates: Vec<AggregateSpec>,
    output_specs: Vec<TupleCellSpec>,
    groups: Vec<(Vec<Value>, Vec<Box<dyn Aggregator>>)>,
    index: HashMap<GroupKey, usize>,
    cursor: usize,
    materialized: bool,
}

impl GroupBy {
    pub fn new(
        child: PhysicalOperator,
        group_exprs: Vec<Expression>,
        aggregates: Vec<AggregateSpec>,
    ) -> Self {
        let mut output_specs = Vec::with_capacity(group_exprs.len() + aggregates.len());
        for expr in &group_exprs {
            output_specs.push(group_output_spec(expr));
        }
        for aggregate in &aggregates {
            output_specs.push(TupleCellSpec::by_name(&aggregate.name));
        }
        Self {
            child: Box::new(child),
            group_exprs,
            aggregates,
            output_specs,
            groups: Vec::new(),
            index: HashMap::new(),
            cursor: 0,
            materialized: false,
        }
    }

    fn open(&mut self, trx: &Rc<Trx>) -> Result<(), ExecutorError> {
        self.groups.clear();
        self.index.clear();
        self.cursor = 0;
        self.materialized = false;
        self.child.open(trx)
    }

    fn next(&mut self) -> Result<Option<Tuple>, ExecutorError> {
        if !self.materialized {
            self.materialize()?;
        }
        let Some((key, aggregators)) = self.groups.get(self.cursor) else {
            return Ok(None);
        };
        self.cursor += 1;

        let mut cells = key.clone();
        for aggregator in aggregators {
            cells.push(aggregator.evaluate()?);
        }
        Ok(Some(Tuple::ValueList(ValueListTuple::new(
            self.output_specs.clone(),
            cells,
        ))))
    }

    fn materialize(&mut self) -> Result<(), ExecutorError> {
        while let Some(tuple) = self.child.next()? {
            let mut key = Vec::with_capacity(self.group_exprs.len());
            for expr in &self.group_exprs {
                key.push(expr.evaluate(&tuple)?);
            }
            let group_index = match self.index.get(&GroupKey(key.clone())) {
                Some(index) => *index,
                None => {
                    let aggregators = self
                        .aggregates
                        .iter()
                        .map(|a| a.aggregate_type.create_aggregator())
                        .collect();
                    self.groups.push((key.clone(), aggregators));
                    self.index.insert(GroupKey(key), self.groups.len() - 1);
                    self.groups.len() - 1
                }
            };
            for (spec, aggregator) in self
                .aggregates
                .iter()
                .zip(self.groups[group_index].1.iter_mut())
            {
                let value = spec.input.evaluate(&tuple)?;
                aggregator.accumulate(&value)?;
            }
        }

        // Aggregates without GROUP BY form one implicit group, present
        // even over empty input (SUM/AVG/MAX/MIN finish NULL, COUNT 0).
        if self.groups.is_empty() && self.group_exprs.is_empty() {
            let aggregators = self
                .aggregates
                .iter()
                .map(|a| a.aggregate_type.create_aggregator())
                .collect();
            self.groups.push((Vec::new(), aggregators));
        }
        self.materialized = true;
        Ok(())
    }

    fn close(&mut self) -> Result<(), ExecutorError> {
        self.groups.clear();
        self.index.clear();
        self.cursor = 0;
        self.materialized = false;
        self.child.close()
    }
}

/// How a group-by output row labels the cell of one group expression.
fn group_output_spec(expr: &Expression) -> TupleCellSpec {
    use super::expr::ExprKind;
    match &expr.kind {
        ExprKind::Field(field_expr) => {
            TupleCellSpec::new(Some(field_expr.table_name.as_str()), &field_expr.field.name)
                .with_table_alias(expr.table_alias())
        }
        _ => {
            let name = if expr.name().is_empty() {
                expr.to_string()
            } else {
                expr.name().to_string()
            };
            TupleCellSpec::by_name(&name)
        }
    }
}

/// Projection: wraps child rows into schema-renamed tuples. Without a
/// child it emits exactly one row over the empty tuple.
pub struct Project {
    child: Option<Box<PhysicalOperator>>,
    expressions: Rc<Vec<Expression>>,
    emitted: bool,
}

impl Project {
    pub fn new(child: Option<PhysicalOperator>, expressions: Vec<Expression>) -> Self {
        Self {
            child: child.map(Box::new),
            expressions: Rc::new(expressions),
            emitted: false,
        }
    }

    fn open(&mut self, trx: &Rc<Trx>) -> Result<(), ExecutorError> {
        self.emitted = false;
        for expression in self.expressions.iter() {
            expression.attach_trx(trx);
        }
        match &mut self.child {
            Some(child) => child.open(trx),
            None => Ok(()),
        }
    }

    fn next(&mut self) -> Result<Option<Tuple>, ExecutorError> {
        match &mut self.child {
            Some(child) => match child.next()? {
                Some(tuple) => Ok(Some(Tuple::Project(ProjectTuple::new(
                    tuple,
                    self.expressions.clone(),
                )))),
                None => Ok(None),
            },
            None => {
                if self.emitted {
                    return Ok(None);
                }
                self.emitted = true;
                Ok(Some(Tuple::Project(ProjectTuple::new(
                    Tuple::Empty,
                    self.expressions.clone(),
                ))))
            }
        }
    }

    fn close(&mut self) -> Result<(), ExecutorError> {
        match &mut self.child {
            Some(child) => child.close(),
            None => Ok(()),
        }
    }
}

/// Inserts one record on open; reports the affected count from next().
pub struct Insert {
    table: Arc<Table>,
    values: Vec<Value>,
    trx: Option<Rc<Trx>>,
    locked: bool,
    emitted: bool,
}

impl Insert {
    pub fn new(table: Arc<Table>, values: Vec<Value>) -> Self {
        Self {
            table,
            values,
            trx: None,
            locked: false,
            emitted: false,
        }
    }

    fn open(&mut self, trx: &Rc<Trx>) -> Result<(), ExecutorError> {
        self.table.lock(trx, LockMode::ReadWrite)?;
        self.locked = true;
        self.trx = Some(trx.clone());
        let record = self.table.make_record(&self.values)?;
        self.table.insert_record(record)?;
        Ok(())
    }

    fn next(&mut self) -> Result<Option<Tuple>, ExecutorError> {
        if self.emitted {
            return Ok(None);
        }
        self.emitted = true;
        Ok(Some(affected_rows_tuple(1)))
    }

    fn close(&mut self) -> Result<(), ExecutorError> {
        if self.locked {
            if let Some(trx) = &self.trx {
                self.table.unlock(trx, LockMode::ReadWrite);
            }
            self.locked = false;
        }
        Ok(())
    }
}

/// Two-pass update.
///
/// Pass 1 drains the child scan, materializing for every matching row its
/// rid, record image, and the per-row evaluated assignment values; the
/// child is then closed, releasing its scan lock. Pass 2 re-acquires the
/// table lock for writing and replaces each record with a patched image.
/// A NULL headed for a non-nullable field aborts during pass 1, before
/// any mutation.
pub struct Update {
    table: Arc<Table>,
    assignments: Vec<(FieldMeta, Expression)>,
    child: Option<Box<PhysicalOperator>>,
    trx: Option<Rc<Trx>>,
    locked: bool,
    count: i32,
    emitted: bool,
}

impl Update {
    pub fn new(
        table: Arc<Table>,
        assignments: Vec<(FieldMeta, Expression)>,
        child: PhysicalOperator,
    ) -> Self {
        Self {
            table,
            assignments,
            child: Some(Box::new(child)),
            trx: None,
            locked: false,
            count: 0,
            emitted: false,
        }
    }

    fn open(&mut self, trx: &Rc<Trx>) -> Result<(), ExecutorError> {
        let mut child = self
            .child
            .take()
            .ok_or_else(|| ExecutorError::Internal("update opened twice".into()))?;
        child.open(trx)?;

        // Pass 1: collect (rid, image, new values) for every target row.
        let mut staged: Vec<(Rid, Vec<u8>, Vec<Value>)> = Vec::new();
        let drain = loop {
            let tuple = match child.next() {
                Ok(Some(tuple)) => tuple,
                Ok(None) => break Ok(()),
                Err(e) => break Err(e),
            };
            match self.stage_row(&tuple) {
                Ok(row) => staged.push(row),
                Err(e) => break Err(e),
            }
        };
        child.close()?;
        drain?;

        // Pass 2: with the scan lock gone, take the write lock and
        // replace each record with its patched image.
        self.table.lock(trx, LockMode::ReadWrite)?;
        self.locked = true;
        self.trx = Some(trx.clone());
        for (rid, mut image, values) in staged {
            self.table.visit_record(rid, |_| ())?;
            self.table.delete_record(rid)?;
            for ((field, _), value) in self.assignments.iter().zip(&values) {
                patch_field(self.table.table_meta(), field, &mut image, value);
            }
            self.table.insert_record(Record::new(image))?;
            self.count += 1;
        }
        Ok(())
    }

    /// Evaluates the assignments against one matching row, enforcing
    /// nullability and field types.
    fn stage_row(&self, tuple: &Tuple) -> Result<(Rid, Vec<u8>, Vec<Value>), ExecutorError> {
        let record = row_record(tuple)?;
        let mut values = Vec::with_capacity(self.assignments.len());
        for (field, expr) in &self.assignments {
            let value = expr.evaluate(tuple)?;
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
            let cast = value.cast_to(field.attr_type).map_err(|_| {
                ExecutorError::TypeMismatch {
                    expected: field.attr_type.to_string(),
                    found: value.attr_type().to_string(),
                }
            })?;
            values.push(cast);
        }
        Ok((record.rid(), record.data().to_vec(), values))
    }

    fn next(&mut self) -> Result<Option<Tuple>, ExecutorError> {
        if self.emitted {
            return Ok(None);
        }
        self.emitted = true;
        Ok(Some(affected_rows_tuple(self.count)))
    }

    fn close(&mut self) -> Result<(), ExecutorError> {
        if self.locked {
            if let Some(trx) = &self.trx {
                self.table.unlock(trx, LockMode::ReadWrite);
            }
            self.locked = false;
        }
        Ok(())
    }
}

/// Deletes each row its child produces, then reports the count.
pub struct Delete {
    table: Arc<Table>,
    child: Box<PhysicalOperator>,
    count: i32,
    emitted: bool,
}

impl Delete {
    pub fn new(table: Arc<Table>, child: PhysicalOperator) -> Self {
        Self {
            table,
            child: Box::new(child),
            count: 0,
            emitted: false,
        }
    }

    fn open(&mut self, trx: &Rc<Trx>) -> Result<(), ExecutorError> {
        self.child.open(trx)?;
        while let Some(tuple) = self.child.next()? {
            let rid = row_record(&tuple)?.rid();
            self.table.delete_record(rid)?;
            self.count += 1;
        }
        Ok(())
    }

    fn next(&mut self) -> Result<Option<Tuple>, ExecutorError> {
        if self.emitted {
            return Ok(None);
        }
        self.emitted = true;
        Ok(Some(affected_rows_tuple(self.count)))
    }

    fn close(&mut self) -> Result<(), ExecutorError> {
        self.child.close()
    }
}

/// Emits one row holding the formatted plan of the explained statement.
/// The child plan is rendered, not executed.
pub struct Explain {
    text: String,
    emitted: bool,
}

impl Explain {
    pub fn new(text: String) -> Self {
        Self {
            text,
            emitted: false,
        }
    }

    fn next(&mut self) -> Result<Option<Tuple>, ExecutorError> {
        if self.emitted {
            return Ok(None);
        }
        self.emitted = true;
        Ok(Some(Tuple::ValueList(ValueListTuple::new(
            vec![TupleCellSpec::by_name("Query Plan")],
            vec![Value::Chars(self.text.clone())],
        ))))
    }
}

/// Evaluates a bare expression list once against the empty tuple.
pub struct Calc {
    expressions: Vec<Expression>,
    emitted: bool,
}

impl Calc {
    pub fn new(expressions: Vec<Expression>) -> Self {
        Self {
            expressions,
            emitted: false,
        }
    }

    fn open(&mut self, trx: &Rc<Trx>) -> Result<(), ExecutorError> {
        self.emitted = false;
        for expression in &self.expressions {
            expression.attach_trx(trx);
        }
        Ok(())
    }

    fn next(&mut self) -> Result<Option<Tuple>, ExecutorError> {
        if self.emitted {
            return Ok(None);
        }
        self.emitted = true;
        let mut specs = Vec::with_capacity(self.expressions.len());
        let mut cells = Vec::with_capacity(self.expressions.len());
        for expression in &self.expressions {
            specs.push(TupleCellSpec::by_name(&expression.output_name()));
            cells.push(expression.evaluate(&Tuple::Empty)?);
        }
        Ok(Some(Tuple::ValueList(ValueListTuple::new(specs, cells))))
    }
}
