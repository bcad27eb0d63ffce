//! Predicate and ordering composition.
//!
//! Queries are assembled as a small in-memory tree ([`Select`] holding
//! [`Predicate`]s and [`OrderBy`]s) that knows nothing about SQL text. The
//! persistence layer lowers the tree into a parameterized statement, so every
//! literal travels as a bound parameter.

use lazy_static::lazy_static;
use regex::Regex;

use crate::construct::Id;
use crate::error::{Result, StoreError};

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Column(String),
    Lower(String),
}
impl Expr {
    pub fn column(name: &str) -> Self {
        Self::Column(name.to_string())
    }
    pub fn lower(name: &str) -> Self {
        Self::Lower(name.to_string())
    }
    pub fn eq(self, value: impl Into<Literal>) -> Predicate {
        Predicate::Eq(self, value.into())
    }
    pub fn like(self, pattern: impl Into<Literal>) -> Predicate {
        Predicate::Like(self, pattern.into())
    }
    pub fn is_null(self) -> Predicate {
        Predicate::IsNull(self)
    }
    pub fn is_in<L: Into<Literal>>(self, values: impl IntoIterator<Item = L>) -> Predicate {
        Predicate::In(self, values.into_iter().map(Into::into).collect())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Integer(i64),
    Text(String),
}
impl From<Id> for Literal {
    fn from(value: Id) -> Self {
        // identities never use the sign bit
        Self::Integer(value as i64)
    }
}
impl From<i64> for Literal {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}
impl From<&str> for Literal {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}
impl From<String> for Literal {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    IsNull(Expr),
    Eq(Expr, Literal),
    In(Expr, Vec<Literal>),
    Like(Expr, Literal),
    /// Grouped in parentheses; an empty alternative list matches nothing.
    Or(Vec<Predicate>),
    /// A boolean fragment in the target query language with positional `?`
    /// placeholders. It is emitted verbatim; no grouping is added around it.
    Raw { sql: String, args: Vec<Literal> },
}
impl Predicate {
    pub fn or(predicates: Vec<Predicate>) -> Self {
        Self::Or(predicates)
    }
    pub fn raw(sql: &str, args: Vec<Literal>) -> Self {
        Self::Raw {
            sql: sql.to_string(),
            args,
        }
    }
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Raw { sql, .. } => sql.trim().is_empty(),
            _ => false,
        }
    }
}

/// Rows that have not been soft deleted.
pub fn active() -> Predicate {
    Expr::column("deleted_at").is_null()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub column: String,
    pub direction: Direction,
}

lazy_static! {
    static ref ORDER_TERM: Regex =
        Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)(?:\s+([A-Za-z]+))?$").unwrap();
}

/// Parses a sort specification such as `"name desc, id"` into order terms.
///
/// Terms are comma separated, each a column optionally followed by `asc` or
/// `desc` (any case). Columns must appear in `columns`.
pub fn parse_order(spec: &str, columns: &[&str]) -> Result<Vec<OrderBy>> {
    let mut order = Vec::new();
    for term in spec.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        let invalid = || StoreError::OrderSpecInvalid(term.to_string());
        let captures = ORDER_TERM.captures(term).ok_or_else(invalid)?;
        let column = captures[1].to_lowercase();
        if !columns.contains(&column.as_str()) {
            return Err(invalid());
        }
        let direction = match captures.get(2).map(|d| d.as_str().to_lowercase()) {
            None => Direction::Asc,
            Some(d) if d == "asc" => Direction::Asc,
            Some(d) if d == "desc" => Direction::Desc,
            Some(_) => return Err(invalid()),
        };
        order.push(OrderBy { column, direction });
    }
    Ok(order)
}

#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    table: String,
    columns: Vec<String>,
    filters: Vec<Predicate>,
    order: Vec<OrderBy>,
}
impl Select {
    pub fn from(table: &str, columns: &[&str]) -> Self {
        Self {
            table: table.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            filters: Vec::new(),
            order: Vec::new(),
        }
    }
    /// Adds a predicate; all predicates are combined with AND.
    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.filters.push(predicate);
        self
    }
    pub fn order_by(mut self, order: Vec<OrderBy>) -> Self {
        self.order.extend(order);
        self
    }
    pub fn table(&self) -> &str {
        &self.table
    }
    pub fn columns(&self) -> &[String] {
        &self.columns
    }
    pub fn filters(&self) -> &[Predicate] {
        &self.filters
    }
    pub fn order(&self) -> &[OrderBy] {
        &self.order
    }
}
