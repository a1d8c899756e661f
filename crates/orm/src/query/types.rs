//! Query builder types - operators, joins, and per-statement parameters

use std::fmt;

use serde_json::Value;

use crate::error::QueryBuilderError;

/// Whitelisted comparison operators for condition keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Equal,
    NotEqual,
    GreaterThan,
    LessThan,
    GreaterThanOrEqual,
    LessThanOrEqual,
    Between,
    NotBetween,
    Like,
    NotLike,
    In,
    NotIn,
}

impl Operator {
    /// Parse the operator part of a `"field OP"` condition key.
    pub fn parse(token: &str) -> Result<Operator, QueryBuilderError> {
        let normalized = token.trim().to_uppercase();
        match normalized.as_str() {
            "=" => Ok(Operator::Equal),
            "!=" | "<>" => Ok(Operator::NotEqual),
            ">" => Ok(Operator::GreaterThan),
            "<" => Ok(Operator::LessThan),
            ">=" => Ok(Operator::GreaterThanOrEqual),
            "<=" => Ok(Operator::LessThanOrEqual),
            "BETWEEN" => Ok(Operator::Between),
            "NOT BETWEEN" => Ok(Operator::NotBetween),
            "LIKE" => Ok(Operator::Like),
            "NOT LIKE" => Ok(Operator::NotLike),
            "IN" => Ok(Operator::In),
            "NOT IN" => Ok(Operator::NotIn),
            _ => Err(QueryBuilderError::InvalidOperator(token.trim().to_string())),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operator::Equal => write!(f, "="),
            Operator::NotEqual => write!(f, "!="),
            Operator::GreaterThan => write!(f, ">"),
            Operator::LessThan => write!(f, "<"),
            Operator::GreaterThanOrEqual => write!(f, ">="),
            Operator::LessThanOrEqual => write!(f, "<="),
            Operator::Between => write!(f, "BETWEEN"),
            Operator::NotBetween => write!(f, "NOT BETWEEN"),
            Operator::Like => write!(f, "LIKE"),
            Operator::NotLike => write!(f, "NOT LIKE"),
            Operator::In => write!(f, "IN"),
            Operator::NotIn => write!(f, "NOT IN"),
        }
    }
}

/// Join types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JoinKind {
    #[default]
    Left,
    Inner,
    Right,
    Full,
}

impl fmt::Display for JoinKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinKind::Left => write!(f, "LEFT JOIN"),
            JoinKind::Inner => write!(f, "INNER JOIN"),
            JoinKind::Right => write!(f, "RIGHT JOIN"),
            JoinKind::Full => write!(f, "FULL JOIN"),
        }
    }
}

/// A join clause. Conditions follow the same tree grammar as WHERE
/// conditions; column-identity comparisons are written as raw fragments
/// (`"Bookmark.user_id = User.id"`) so they are not bound as values.
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub table: String,
    pub alias: Option<String>,
    pub kind: JoinKind,
    pub conditions: Value,
}

impl Join {
    pub fn new(table: impl Into<String>, conditions: Value) -> Self {
        Join {
            table: table.into(),
            alias: None,
            kind: JoinKind::default(),
            conditions,
        }
    }

    pub fn aliased(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn kind(mut self, kind: JoinKind) -> Self {
        self.kind = kind;
        self
    }
}

/// Per-statement parameters consumed by a select statement. Defaults are
/// merged upstream, at the model's public-method boundary; the builder only
/// consumes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryParams {
    pub conditions: Option<Value>,
    pub joins: Vec<Join>,
    pub group: Vec<String>,
    pub having: Option<Value>,
    pub order: Vec<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub page: Option<u64>,
    pub lock: bool,
}
