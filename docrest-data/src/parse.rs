//! Building a [`Query`] from its JSON form.
//!
//! The accepted dialect mirrors the operators backends understand:
//!
//! ```json
//! {
//!   "$collection": "book",
//!   "pages": { "$gte": 100, "$lt": 500 },
//!   "$or": [ { "author": "lisa" }, { "award": { "$exists": true } } ]
//! }
//! ```

use std::str::FromStr;

use regex::Regex;
use serde_json::{Map, Value};

use crate::error::DataError;
use crate::filter::{Expression, Query, TextSearch};

impl Query {
    /// Parse a query from a JSON object.
    pub fn from_json(value: &Value) -> Result<Query, DataError> {
        match value {
            Value::Object(map) => parse_object(map),
            other => Err(DataError::invalid(format!("query must be an object, got {other}"))),
        }
    }
}

impl FromStr for Query {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value: Value = serde_json::from_str(s).map_err(|e| DataError::invalid(e.to_string()))?;
        Query::from_json(&value)
    }
}

fn parse_object(map: &Map<String, Value>) -> Result<Query, DataError> {
    let mut query = Query::new();
    for (key, value) in map {
        match key.as_str() {
            "$and" => query.push(Expression::And(parse_list(key, value)?)),
            "$or" => query.push(Expression::Or(parse_list(key, value)?)),
            "$nor" => query.push(Expression::Nor(parse_list(key, value)?)),
            "$text" => query.push(Expression::Text(parse_text(value)?)),
            "$collection" => match value {
                Value::String(kind) => query.push(Expression::Collection(kind.clone())),
                _ => return Err(DataError::invalid("$collection: expected a string")),
            },
            op if op.starts_with('$') => {
                return Err(DataError::invalid(format!("unknown top-level operator {op}")));
            }
            field => match value {
                Value::Object(ops) if is_operator_object(ops) => {
                    for (op, arg) in ops {
                        query.push(parse_operator(field, op, arg)?);
                    }
                }
                value => query.push(Expression::eq(field, value.clone())),
            },
        }
    }
    Ok(query)
}

fn is_operator_object(map: &Map<String, Value>) -> bool {
    !map.is_empty() && map.keys().all(|k| k.starts_with('$'))
}

fn parse_list(op: &str, value: &Value) -> Result<Vec<Query>, DataError> {
    let Value::Array(items) = value else {
        return Err(DataError::invalid(format!("{op}: expected an array")));
    };
    if items.is_empty() {
        return Err(DataError::invalid(format!("{op}: expected at least one item")));
    }
    items.iter().map(Query::from_json).collect()
}

fn parse_operator(field: &str, op: &str, arg: &Value) -> Result<Expression, DataError> {
    let expr = match op {
        "$eq" => Expression::eq(field, arg.clone()),
        "$ne" => Expression::ne(field, arg.clone()),
        "$gt" => Expression::gt(field, arg.clone()),
        "$gte" => Expression::gte(field, arg.clone()),
        "$lt" => Expression::lt(field, arg.clone()),
        "$lte" => Expression::lte(field, arg.clone()),
        "$in" => Expression::in_values(field, array(field, op, arg)?.iter().cloned()),
        "$nin" => Expression::not_in_values(field, array(field, op, arg)?.iter().cloned()),
        "$exists" => match arg {
            Value::Bool(exists) => Expression::exists(field, *exists),
            _ => return Err(DataError::invalid(format!("{field}: $exists expects a boolean"))),
        },
        "$mod" => match array(field, op, arg)?.as_slice() {
            [divisor, remainder] => match (divisor.as_f64(), remainder.as_f64()) {
                (Some(d), Some(r)) if d != 0.0 => Expression::modulo(field, d, r),
                _ => return Err(DataError::invalid(format!("{field}: $mod expects [divisor, remainder]"))),
            },
            _ => return Err(DataError::invalid(format!("{field}: $mod expects [divisor, remainder]"))),
        },
        "$regex" => match arg {
            Value::String(pattern) => {
                let pattern = Regex::new(pattern)
                    .map_err(|e| DataError::invalid(format!("{field}: invalid regex: {e}")))?;
                Expression::regex(field, pattern)
            }
            _ => return Err(DataError::invalid(format!("{field}: $regex expects a string"))),
        },
        "$not" => match arg {
            Value::Object(inner) if inner.len() == 1 => match inner.iter().next() {
                Some((inner_op, inner_arg)) if inner_op.starts_with('$') => {
                    Expression::not(parse_operator(field, inner_op, inner_arg)?)
                }
                _ => return Err(DataError::invalid(format!("{field}: $not expects an operator"))),
            },
            _ => return Err(DataError::invalid(format!("{field}: $not expects exactly one operator"))),
        },
        other => return Err(DataError::invalid(format!("{field}: unknown operator {other}"))),
    };
    Ok(expr)
}

fn array<'a>(field: &str, op: &str, arg: &'a Value) -> Result<&'a Vec<Value>, DataError> {
    match arg {
        Value::Array(values) => Ok(values),
        _ => Err(DataError::invalid(format!("{field}: {op} expects an array"))),
    }
}

fn parse_text(value: &Value) -> Result<TextSearch, DataError> {
    let Value::Object(map) = value else {
        return Err(DataError::invalid("$text: expected an object"));
    };
    let mut text = TextSearch::default();
    for (key, arg) in map {
        match (key.as_str(), arg) {
            ("$search", Value::String(s)) => text.search = s.clone(),
            ("$language", Value::String(s)) => text.language = s.clone(),
            ("$caseSensitive", Value::Bool(b)) => text.case_sensitive = *b,
            ("$diacriticSensitive", Value::Bool(b)) => text.diacritic_sensitive = *b,
            (key, _) => return Err(DataError::invalid(format!("$text: invalid option {key}"))),
        }
    }
    if text.search.is_empty() {
        return Err(DataError::invalid("$text: $search is required"));
    }
    Ok(text)
}
