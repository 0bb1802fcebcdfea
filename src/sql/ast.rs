//! Parsed statement nodes.

use std::fmt;

use crate::executor::Expression;
use crate::value::Value;

/// Comparison operators, including the membership and existence shapes
/// driven by value lists and subqueries, and the IS/LIKE forms carried by
/// their dedicated expression kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompOp {
    EqualTo,
    LessEqual,
    NotEqual,
    LessThan,
    GreatEqual,
    GreatThan,
    In,
    NotIn,
    Exists,
    NotExists,
    Is,
    IsNot,
    Like,
    NotLike,
}

impl fmt::Display for CompOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CompOp::EqualTo => "=",
            CompOp::LessEqual => "<=",
            CompOp::NotEqual => "<>",
            CompOp::LessThan => "<",
            CompOp::GreatEqual => ">=",
            CompOp::GreatThan => ">",
            CompOp::In => "IN",
            CompOp::NotIn => "NOT IN",
            CompOp::Exists => "EXISTS",
            CompOp::NotExists => "NOT EXISTS",
            CompOp::Is => "IS",
            CompOp::IsNot => "IS NOT",
            CompOp::Like => "LIKE",
            CompOp::NotLike => "NOT LIKE",
        };
        write!(f, "{}", s)
    }
}

/// How a statement's filter conditions are joined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConjunctionType {
    #[default]
    And,
    Or,
}

/// One table reference in a FROM clause.
#[derive(Debug)]
pub struct RelationSqlNode {
    pub name: String,
    pub alias: Option<String>,
}

impl RelationSqlNode {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            alias: None,
        }
    }

    pub fn with_alias(name: &str, alias: &str) -> Self {
        Self {
            name: name.to_string(),
            alias: Some(alias.to_string()),
        }
    }
}

/// One WHERE condition: `left comp right`.
///
/// `left` is absent for EXISTS / NOT EXISTS, whose only operand is the
/// right-hand subquery or value list.
#[derive(Debug)]
pub struct ConditionSqlNode {
    pub left: Option<Expression>,
    pub comp: CompOp,
    pub right: Expression,
}

impl ConditionSqlNode {
    pub fn new(left: Expression, comp: CompOp, right: Expression) -> Self {
        Self {
            left: Some(left),
            comp,
            right,
        }
    }

    pub fn unary(comp: CompOp, right: Expression) -> Self {
        Self {
            left: None,
            comp,
            right,
        }
    }
}

/// A parsed SELECT.
#[derive(Debug, Default)]
pub struct SelectSqlNode {
    pub expressions: Vec<Expression>,
    pub relations: Vec<RelationSqlNode>,
    pub conditions: Vec<ConditionSqlNode>,
    pub conjunction: ConjunctionType,
    pub group_by: Vec<Expression>,
}

/// A parsed CALC: bare expressions with no table.
#[derive(Debug)]
pub struct CalcSqlNode {
    pub expressions: Vec<Expression>,
}

/// A parsed INSERT.
#[derive(Debug)]
pub struct InsertSqlNode {
    pub relation: String,
    pub values: Vec<Value>,
}

/// A parsed UPDATE with one or more `field = expression` assignments.
#[derive(Debug)]
pub struct UpdateSqlNode {
    pub relation: String,
    pub assignments: Vec<(String, Expression)>,
    pub conditions: Vec<ConditionSqlNode>,
    pub conjunction: ConjunctionType,
}

/// A parsed DELETE.
#[derive(Debug)]
pub struct DeleteSqlNode {
    pub relation: String,
    pub conditions: Vec<ConditionSqlNode>,
    pub conjunction: ConjunctionType,
}

/// A parsed EXPLAIN wrapping any other statement.
#[derive(Debug)]
pub struct ExplainSqlNode {
    pub child: Box<ParsedSqlNode>,
}

/// A parsed SQL statement, as handed over by the parser subsystem.
#[derive(Debug)]
pub enum ParsedSqlNode {
    Calc(CalcSqlNode),
    Select(SelectSqlNode),
    Insert(InsertSqlNode),
    Update(UpdateSqlNode),
    Delete(DeleteSqlNode),
    Explain(ExplainSqlNode),
}
