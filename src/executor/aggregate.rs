//! Aggregate function definitions and streaming accumulators.
//!
//! This module provides the building blocks for GROUP BY processing:
//!
//! - [`AggregateType`] — the supported aggregate functions
//! - [`Aggregator`] — a streaming accumulator fed one value per input row
//!
//! Accumulators start from the `Undefined` value state; the first non-NULL
//! input seeds them. NULL inputs are always skipped, so an all-NULL (or
//! empty) group finishes as NULL — except COUNT, which finishes as 0.

use std::fmt;

use crate::value::{AttrType, Value};

use super::error::ExecutorError;

/// Supported aggregate functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateType {
    Count,
    Sum,
    Avg,
    Max,
    Min,
}

impl AggregateType {
    /// Resolves a function name (case-insensitive) to an aggregate type.
    ///
    /// Returns `None` for names that are not aggregate functions.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "count" => Some(AggregateType::Count),
            "sum" => Some(AggregateType::Sum),
            "avg" => Some(AggregateType::Avg),
            "max" => Some(AggregateType::Max),
            "min" => Some(AggregateType::Min),
            _ => None,
        }
    }

    /// Creates a fresh accumulator for this function.
    pub fn create_aggregator(&self) -> Box<dyn Aggregator> {
        match self {
            AggregateType::Count => Box::new(CountAggregator { count: 0 }),
            AggregateType::Sum => Box::new(SumAggregator {
                value: Value::Undefined,
            }),
            AggregateType::Avg => Box::new(AvgAggregator {
                value: Value::Undefined,
                count: 0,
            }),
            AggregateType::Max => Box::new(MaxAggregator {
                value: Value::Undefined,
            }),
            AggregateType::Min => Box::new(MinAggregator {
                value: Value::Undefined,
            }),
        }
    }
}

impl fmt::Display for AggregateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AggregateType::Count => "count",
            AggregateType::Sum => "sum",
            AggregateType::Avg => "avg",
            AggregateType::Max => "max",
            AggregateType::Min => "min",
        };
        write!(f, "{}", s)
    }
}

/// A streaming accumulator: `accumulate` per input row, `evaluate` once at
/// group end.
pub trait Aggregator {
    fn accumulate(&mut self, value: &Value) -> Result<(), ExecutorError>;
    fn evaluate(&self) -> Result<Value, ExecutorError>;
}

struct SumAggregator {
    value: Value,
}

impl Aggregator for SumAggregator {
    fn accumulate(&mut self, value: &Value) -> Result<(), ExecutorError> {
        if value.is_null() {
            return Ok(());
        }
        if self.value.attr_type() == AttrType::Undefined {
            self.value = value.clone();
            return Ok(());
        }
        if value.attr_type() != self.value.attr_type() {
            return Err(ExecutorError::Internal(format!(
                "sum over mixed types: {} and {}",
                self.value.attr_type(),
                value.attr_type()
            )));
        }
        self.value = Value::add(&self.value, value)?;
        Ok(())
    }

    fn evaluate(&self) -> Result<Value, ExecutorError> {
        if self.value.attr_type() == AttrType::Undefined {
            return Ok(Value::Null);
        }
        Ok(self.value.clone())
    }
}

struct AvgAggregator {
    value: Value,
    count: i32,
}

impl Aggregator for AvgAggregator {
    fn accumulate(&mut self, value: &Value) -> Result<(), ExecutorError> {
        if value.is_null() {
            return Ok(());
        }
        if self.value.attr_type() == AttrType::Undefined {
            self.value = value.clone();
            self.count = 1;
            return Ok(());
        }
        self.value = Value::add(&self.value, value)?;
        self.count += 1;
        Ok(())
    }

    fn evaluate(&self) -> Result<Value, ExecutorError> {
        if self.value.attr_type() == AttrType::Undefined {
            return Ok(Value::Null);
        }
        Ok(Value::divide(&self.value, &Value::Int(self.count))?)
    }
}

struct CountAggregator {
    count: i32,
}

impl Aggregator for CountAggregator {
    fn accumulate(&mut self, value: &Value) -> Result<(), ExecutorError> {
        if value.is_null() {
            return Ok(());
        }
        self.count += 1;
        Ok(())
    }

    fn evaluate(&self) -> Result<Value, ExecutorError> {
        // An empty group counts as 0, never NULL.
        Ok(Value::Int(self.count))
    }
}

struct MaxAggregator {
    value: Value,
}

impl Aggregator for MaxAggregator {
    fn accumulate(&mut self, value: &Value) -> Result<(), ExecutorError> {
        if value.is_null() {
            return Ok(());
        }
        if self.value.attr_type() == AttrType::Undefined {
            self.value = value.clone();
            return Ok(());
        }
        if value.compare(&self.value) == Some(std::cmp::Ordering::Greater) {
            self.value = value.clone();
        }
        Ok(())
    }

    fn evaluate(&self) -> Result<Value, ExecutorError> {
        if self.value.attr_type() == AttrType::Undefined {
            return Ok(Value::Null);
        }
        Ok(self.value.clone())
    }
}

struct MinAggregator {
    value: Value,
}

impl Aggregator for MinAggregator {
    fn accumulate(&mut self, value: &Value) -> Result<(), ExecutorError> {
        if value.is_null() {
            return Ok(());
        }
        if self.value.attr_type() == AttrType::Undefined {
            self.value = value.clone();
            return Ok(());
        }
        if value.compare(&self.value) == Some(std::cmp::Ordering::Less) {
            self.value = value.clone();
        }
        Ok(())
    }

    fn evaluate(&self) -> Result<Value, ExecutorError> {
        if self.value.attr_type() == AttrType::Undefined {
            return Ok(Value::Null);
        }
        Ok(self.value.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(ty: AggregateType, inputs: &[Value]) -> Value {
        let mut agg = ty.create_aggregator();
        for v in inputs {
            agg.accumulate(v).unwrap();
        }
        agg.evaluate().unwrap()
    }

    #[test]
    fn test_sum() {
        assert_eq!(
            run(
                AggregateType::Sum,
                &[Value::Int(10), Value::Null, Value::Int(5)]
            ),
            Value::Int(15)
        );
        assert_eq!(
            run(AggregateType::Sum, &[Value::Float(1.5), Value::Float(2.5)]),
            Value::Float(4.0)
        );
    }

    #[test]
    fn test_sum_empty_group_is_null() {
        assert!(run(AggregateType::Sum, &[]).is_null());
        assert!(run(AggregateType::Sum, &[Value::Null, Value::Null]).is_null());
    }

    #[test]
    fn test_sum_mixed_types_rejected() {
        let mut agg = AggregateType::Sum.create_aggregator();
        agg.accumulate(&Value::Int(1)).unwrap();
        assert!(agg.accumulate(&Value::Float(1.0)).is_err());
    }

    #[test]
    fn test_avg() {
        assert_eq!(
            run(
                AggregateType::Avg,
                &[Value::Int(1), Value::Int(2), Value::Null]
            ),
            Value::Float(1.5)
        );
        assert!(run(AggregateType::Avg, &[]).is_null());
    }

    #[test]
    fn test_count() {
        assert_eq!(
            run(
                AggregateType::Count,
                &[Value::Int(1), Value::Null, Value::Int(3)]
            ),
            Value::Int(2)
        );
        assert_eq!(run(AggregateType::Count, &[]), Value::Int(0));
    }

    #[test]
    fn test_max_min() {
        let values = [Value::Int(3), Value::Int(1), Value::Null, Value::Int(2)];
        assert_eq!(run(AggregateType::Max, &values), Value::Int(3));
        assert_eq!(run(AggregateType::Min, &values), Value::Int(1));

        let strings = [
            Value::Chars("banana".into()),
            Value::Chars("apple".into()),
        ];
        assert_eq!(
            run(AggregateType::Max, &strings),
            Value::Chars("banana".into())
        );
        assert_eq!(
            run(AggregateType::Min, &strings),
            Value::Chars("apple".into())
        );
        assert!(run(AggregateType::Max, &[]).is_null());
    }

    #[test]
    fn test_from_name() {
        assert_eq!(AggregateType::from_name("COUNT"), Some(AggregateType::Count));
        assert_eq!(AggregateType::from_name("Sum"), Some(AggregateType::Sum));
        assert_eq!(AggregateType::from_name("median"), None);
    }
}
