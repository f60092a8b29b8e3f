//! Database-agnostic filter expressions.
//!
//! A [`Query`] is an ordered list of [`Expression`]s that are implicitly
//! AND-ed together. Backends translate it into their native query language;
//! variants a backend cannot express must be rejected with
//! [`DataError::NotImplemented`](crate::DataError::NotImplemented).
//!
//! ```ignore
//! let query: Query = vec![
//!     Expression::collection("book"),
//!     Expression::gt("pages", 100),
//!     Expression::or(vec![
//!         Query::from(vec![Expression::eq("author", "lisa")]),
//!         Query::from(vec![Expression::exists("award", true)]),
//!     ]),
//! ]
//! .into();
//! ```

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use regex::Regex;
use serde_json::Value;

use crate::record::Record;

/// An ordered list of expressions, implicitly AND-ed.
#[derive(Debug, Clone, Default)]
pub struct Query(Vec<Expression>);

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, expression: Expression) {
        self.0.push(expression);
    }

    /// Append all expressions of `other` (AND semantics).
    pub fn extend(&mut self, other: Query) {
        self.0.extend(other.0);
    }

    pub fn into_inner(self) -> Vec<Expression> {
        self.0
    }
}

impl Deref for Query {
    type Target = [Expression];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Vec<Expression>> for Query {
    fn from(expressions: Vec<Expression>) -> Self {
        Self(expressions)
    }
}

impl FromIterator<Expression> for Query {
    fn from_iter<I: IntoIterator<Item = Expression>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for Query {
    type Item = Expression;
    type IntoIter = std::vec::IntoIter<Expression>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Query {
    type Item = &'a Expression;
    type IntoIter = std::slice::Iter<'a, Expression>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// A single node of a filter expression tree.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum Expression {
    /// Matches records of the given kind.
    Collection(String),
    Equal { field: String, value: Value },
    NotEqual { field: String, value: Value },
    GreaterThan { field: String, value: Value },
    GreaterOrEqual { field: String, value: Value },
    LowerThan { field: String, value: Value },
    LowerOrEqual { field: String, value: Value },
    In { field: String, values: Vec<Value> },
    NotIn { field: String, values: Vec<Value> },
    And(Vec<Query>),
    Or(Vec<Query>),
    Nor(Vec<Query>),
    /// Negates a field-scoped condition; the field is the wrapped one's.
    Not(Box<Expression>),
    Exist { field: String, exists: bool },
    Mod { field: String, divisor: f64, remainder: f64 },
    Regex { field: String, pattern: Regex },
    Text(TextSearch),
    /// In-process predicate that no database can evaluate.
    Custom(CustomExpression),
}

impl Expression {
    pub fn collection(kind: impl Into<String>) -> Self {
        Expression::Collection(kind.into())
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Expression::Equal { field: field.into(), value: value.into() }
    }

    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Expression::NotEqual { field: field.into(), value: value.into() }
    }

    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Expression::GreaterThan { field: field.into(), value: value.into() }
    }

    pub fn gte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Expression::GreaterOrEqual { field: field.into(), value: value.into() }
    }

    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Expression::LowerThan { field: field.into(), value: value.into() }
    }

    pub fn lte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Expression::LowerOrEqual { field: field.into(), value: value.into() }
    }

    pub fn in_values<V: Into<Value>>(field: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        Expression::In {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn not_in_values<V: Into<Value>>(field: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        Expression::NotIn {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn and(queries: Vec<Query>) -> Self {
        Expression::And(queries)
    }

    pub fn or(queries: Vec<Query>) -> Self {
        Expression::Or(queries)
    }

    pub fn nor(queries: Vec<Query>) -> Self {
        Expression::Nor(queries)
    }

    pub fn not(condition: Expression) -> Self {
        Expression::Not(Box::new(condition))
    }

    pub fn exists(field: impl Into<String>, exists: bool) -> Self {
        Expression::Exist { field: field.into(), exists }
    }

    pub fn modulo(field: impl Into<String>, divisor: f64, remainder: f64) -> Self {
        Expression::Mod { field: field.into(), divisor, remainder }
    }

    pub fn regex(field: impl Into<String>, pattern: Regex) -> Self {
        Expression::Regex { field: field.into(), pattern }
    }

    pub fn text(search: TextSearch) -> Self {
        Expression::Text(search)
    }

    /// The field a field-scoped expression applies to.
    ///
    /// `None` for logical, text, collection and custom expressions.
    pub fn field(&self) -> Option<&str> {
        match self {
            Expression::Equal { field, .. }
            | Expression::NotEqual { field, .. }
            | Expression::GreaterThan { field, .. }
            | Expression::GreaterOrEqual { field, .. }
            | Expression::LowerThan { field, .. }
            | Expression::LowerOrEqual { field, .. }
            | Expression::In { field, .. }
            | Expression::NotIn { field, .. }
            | Expression::Exist { field, .. }
            | Expression::Mod { field, .. }
            | Expression::Regex { field, .. } => Some(field),
            Expression::Not(inner) => inner.field(),
            Expression::Collection(_)
            | Expression::And(_)
            | Expression::Or(_)
            | Expression::Nor(_)
            | Expression::Text(_)
            | Expression::Custom(_) => None,
        }
    }
}

/// Full-text search directive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextSearch {
    pub search: String,
    /// Empty means the engine picks the language.
    pub language: String,
    pub case_sensitive: bool,
    pub diacritic_sensitive: bool,
}

impl TextSearch {
    pub fn new(search: impl Into<String>) -> Self {
        Self {
            search: search.into(),
            ..Self::default()
        }
    }

    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn case_sensitive(mut self, yes: bool) -> Self {
        self.case_sensitive = yes;
        self
    }

    pub fn diacritic_sensitive(mut self, yes: bool) -> Self {
        self.diacritic_sensitive = yes;
        self
    }
}

type Predicate = dyn Fn(&Record) -> bool + Send + Sync;

/// A named predicate evaluated in process.
#[derive(Clone)]
pub struct CustomExpression {
    name: String,
    predicate: Arc<Predicate>,
}

impl CustomExpression {
    pub fn new(name: impl Into<String>, predicate: impl Fn(&Record) -> bool + Send + Sync + 'static) -> Self {
        Self {
            name: name.into(),
            predicate: Arc::new(predicate),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn matches(&self, record: &Record) -> bool {
        (self.predicate)(record)
    }
}

impl fmt::Debug for CustomExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomExpression").field("name", &self.name).finish_non_exhaustive()
    }
}
