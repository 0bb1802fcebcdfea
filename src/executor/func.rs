//! System function evaluation: LENGTH, ROUND, DATE_FORMAT.

use crate::value::{AttrType, Value};

use super::error::ExecutorError;
use super::expr::{SysFuncType, SysFunctionExpr};

const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

impl SysFunctionExpr {
    /// Validates parameter count and types after the parameters have been
    /// bound.
    pub fn check_params(&self) -> Result<(), ExecutorError> {
        let types: Vec<AttrType> = self.params.iter().map(|p| p.value_type()).collect();
        let ok = match self.func {
            SysFuncType::Length => matches!(types.as_slice(), [AttrType::Chars]),
            SysFuncType::Round => matches!(
                types.as_slice(),
                [AttrType::Float] | [AttrType::Float, AttrType::Int]
            ),
            SysFuncType::DateFormat => {
                matches!(types.as_slice(), [AttrType::Date, AttrType::Chars])
            }
        };
        if ok {
            Ok(())
        } else {
            log::warn!("bad parameters for {}: {:?}", self.func, types);
            Err(ExecutorError::InvalidArgument(format!(
                "invalid parameters for {}",
                self.func
            )))
        }
    }

    /// Computes the function over already-evaluated parameter values.
    pub fn compute(&self, params: &[Value]) -> Result<Value, ExecutorError> {
        match self.func {
            SysFuncType::Length => match &params[0] {
                Value::Chars(s) => Ok(Value::Int(s.len() as i32)),
                Value::Null => Ok(Value::Null),
                other => Err(ExecutorError::InvalidArgument(format!(
                    "length() expects chars, got {}",
                    other.attr_type()
                ))),
            },
            SysFuncType::Round => {
                if params[0].is_null() {
                    return Ok(Value::Null);
                }
                let value = params[0].get_float();
                let digits = params.get(1).map(|p| p.get_int()).unwrap_or(0).max(0) as usize;
                Ok(Value::Float(round_to_digits(value, digits)))
            }
            SysFuncType::DateFormat => match (&params[0], &params[1]) {
                (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
                (Value::Date(packed), Value::Chars(format)) => {
                    Ok(Value::Chars(format_date(*packed, format)))
                }
                (a, b) => Err(ExecutorError::InvalidArgument(format!(
                    "date_format() expects (date, chars), got ({}, {})",
                    a.attr_type(),
                    b.attr_type()
                ))),
            },
        }
    }
}

/// Rounds to `digits` decimal places via formatted text, which applies
/// round-half-to-even, then reparses.
fn round_to_digits(value: f32, digits: usize) -> f32 {
    format!("{:.*}", digits, value).parse().unwrap_or(value)
}

/// Renders a packed date through a DATE_FORMAT pattern.
///
/// Specifiers: `%Y` 4-digit year, `%y` 2-digit year, `%m` zero-padded
/// month, `%M` English month name, `%d` zero-padded day, `%D` day with
/// English ordinal suffix, `%%` a literal percent. Any other character
/// after `%` is copied through.
fn format_date(packed: i32, format: &str) -> String {
    let year = packed / 10000;
    let month = (packed / 100) % 100;
    let day = packed % 100;

    let mut out = String::with_capacity(format.len());
    let mut chars = format.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('Y') => out.push_str(&format!("{:04}", year)),
            Some('y') => out.push_str(&format!("{:02}", year % 100)),
            Some('m') => out.push_str(&format!("{:02}", month)),
            Some('M') => match MONTH_NAMES.get(month as usize - 1) {
                Some(name) => out.push_str(name),
                None => out.push_str(&month.to_string()),
            },
            Some('d') => out.push_str(&format!("{:02}", day)),
            Some('D') => out.push_str(&ordinal(day)),
            Some('%') => out.push('%'),
            Some(other) => out.push(other),
            None => out.push('%'),
        }
    }
    out
}

/// English ordinal form of a day number, with the 11/12/13 exception.
fn ordinal(n: i32) -> String {
    let suffix = match (n % 10, n % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    };
    format!("{}{}", n, suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length() {
        let func = SysFunctionExpr {
            func: SysFuncType::Length,
            params: vec![],
        };
        assert_eq!(
            func.compute(&[Value::Chars("hello".into())]).unwrap(),
            Value::Int(5)
        );
        assert!(func.compute(&[Value::Null]).unwrap().is_null());
    }

    #[test]
    fn test_round() {
        let func = SysFunctionExpr {
            func: SysFuncType::Round,
            params: vec![],
        };
        assert_eq!(
            func.compute(&[Value::Float(2.567), Value::Int(2)]).unwrap(),
            Value::Float(2.57)
        );
        assert_eq!(
            func.compute(&[Value::Float(2.4)]).unwrap(),
            Value::Float(2.0)
        );
        // Round-half-to-even at the .5 boundary.
        assert_eq!(
            func.compute(&[Value::Float(2.5)]).unwrap(),
            Value::Float(2.0)
        );
        assert_eq!(
            func.compute(&[Value::Float(3.5)]).unwrap(),
            Value::Float(4.0)
        );
    }

    #[test]
    fn test_date_format() {
        assert_eq!(format_date(20010204, "%Y/%m/%d"), "2001/02/04");
        assert_eq!(format_date(20010204, "%y-%M-%D"), "01-February-4th");
        assert_eq!(format_date(20231111, "%D"), "11th");
        assert_eq!(format_date(20231121, "%D"), "21st");
        assert_eq!(format_date(20231103, "%D"), "3rd");
        assert_eq!(format_date(20010204, "100%%"), "100%");
        assert_eq!(format_date(20010204, "day %d!"), "day 04!");
    }

    #[test]
    fn test_ordinal_teens() {
        assert_eq!(ordinal(1), "1st");
        assert_eq!(ordinal(2), "2nd");
        assert_eq!(ordinal(3), "3rd");
        assert_eq!(ordinal(4), "4th");
        assert_eq!(ordinal(11), "11th");
        assert_eq!(ordinal(12), "12th");
        assert_eq!(ordinal(13), "13th");
        assert_eq!(ordinal(22), "22nd");
    }
}
