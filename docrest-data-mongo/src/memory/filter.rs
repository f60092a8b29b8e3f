//! Evaluation of MongoDB query, sort and projection documents against
//! in-memory documents.
//!
//! Covers the operators the query translator emits. Anything else is
//! reported as an error instead of matching silently.

use std::cmp::Ordering;

use mongodb::bson::{Bson, Document};
use regex::RegexBuilder;

use crate::backend::NativeError;

type Result<T> = std::result::Result<T, NativeError>;

fn unsupported(what: impl std::fmt::Display) -> NativeError {
    NativeError::Driver(format!("unsupported query construct: {what}").into())
}

/// Whether `doc` satisfies `filter`. An empty filter matches everything.
pub fn matches(doc: &Document, filter: &Document) -> Result<bool> {
    for (key, condition) in filter {
        let ok = match key.as_str() {
            "$and" => {
                let mut all = true;
                for branch in branches(condition)? {
                    if !matches(doc, branch)? {
                        all = false;
                        break;
                    }
                }
                all
            }
            "$or" => any_branch(doc, condition)?,
            "$nor" => !any_branch(doc, condition)?,
            "$text" => text_matches(doc, condition)?,
            op if op.starts_with('$') => return Err(unsupported(op)),
            field => field_matches(lookup(doc, field), condition)?,
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn branches(condition: &Bson) -> Result<Vec<&Document>> {
    let Bson::Array(list) = condition else {
        return Err(unsupported("logical operator without an array"));
    };
    list.iter()
        .map(|b| match b {
            Bson::Document(d) => Ok(d),
            other => Err(unsupported(format!("logical branch {other}"))),
        })
        .collect()
}

fn any_branch(doc: &Document, condition: &Bson) -> Result<bool> {
    for branch in branches(condition)? {
        if matches(doc, branch)? {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Resolve a dotted path.
pub fn lookup<'a>(doc: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut parts = path.split('.');
    let mut current = doc.get(parts.next()?)?;
    for part in parts {
        match current {
            Bson::Document(inner) => current = inner.get(part)?,
            _ => return None,
        }
    }
    Some(current)
}

fn is_operator_document(condition: &Bson) -> Option<&Document> {
    match condition {
        Bson::Document(d) if d.keys().next().is_some_and(|k| k.starts_with('$')) => Some(d),
        _ => None,
    }
}

fn field_matches(value: Option<&Bson>, condition: &Bson) -> Result<bool> {
    match is_operator_document(condition) {
        Some(ops) => operators_match(value, ops),
        None => Ok(equals(value, condition)),
    }
}

fn operators_match(value: Option<&Bson>, ops: &Document) -> Result<bool> {
    for (op, operand) in ops {
        let ok = match op.as_str() {
            "$eq" => equals(value, operand),
            "$ne" => !equals(value, operand),
            "$gt" => compares(value, operand, |o| o == Ordering::Greater),
            "$gte" => compares(value, operand, |o| o != Ordering::Less),
            "$lt" => compares(value, operand, |o| o == Ordering::Less),
            "$lte" => compares(value, operand, |o| o != Ordering::Greater),
            "$in" => in_list(value, operand)?,
            "$nin" => !in_list(value, operand)?,
            "$exists" => value.is_some() == truthy(operand),
            "$mod" => modulo(value, operand)?,
            "$regex" => regex_matches(value, operand, ops.get_str("$options").unwrap_or_default())?,
            "$options" => true,
            "$not" => match operand {
                Bson::Document(inner) => !operators_match(value, inner)?,
                other => return Err(unsupported(format!("$not operand {other}"))),
            },
            other => return Err(unsupported(other)),
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Equality with array fan-out; a missing field equals null.
fn equals(value: Option<&Bson>, expected: &Bson) -> bool {
    match value {
        None => matches!(expected, Bson::Null),
        Some(v @ Bson::Array(items)) => same(v, expected) || items.iter().any(|item| same(item, expected)),
        Some(v) => same(v, expected),
    }
}

fn same(a: &Bson, b: &Bson) -> bool {
    match (number(a), number(b)) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn compares(value: Option<&Bson>, operand: &Bson, accept: impl Fn(Ordering) -> bool) -> bool {
    let check = |v: &Bson| rank(v) == rank(operand) && accept(compare(v, operand));
    match value {
        None => false,
        Some(Bson::Array(items)) => items.iter().any(check),
        Some(v) => check(v),
    }
}

fn in_list(value: Option<&Bson>, operand: &Bson) -> Result<bool> {
    let Bson::Array(candidates) = operand else {
        return Err(unsupported("$in/$nin without an array"));
    };
    Ok(candidates.iter().any(|c| equals(value, c)))
}

fn truthy(operand: &Bson) -> bool {
    match operand {
        Bson::Boolean(b) => *b,
        Bson::Null => false,
        other => number(other).map_or(true, |n| n != 0.0),
    }
}

fn modulo(value: Option<&Bson>, operand: &Bson) -> Result<bool> {
    let (divisor, remainder) = match operand {
        Bson::Array(pair) if pair.len() == 2 => match (number(&pair[0]), number(&pair[1])) {
            (Some(d), Some(r)) => (d.trunc() as i64, r.trunc() as i64),
            _ => return Err(unsupported("$mod with non-numeric operands")),
        },
        _ => return Err(unsupported("$mod without [divisor, remainder]")),
    };
    if divisor == 0 {
        return Err(unsupported("$mod by zero"));
    }
    // checked_rem only fails on i64::MIN % -1, whose remainder is 0
    let check = |v: &Bson| {
        number(v).is_some_and(|n| (n.trunc() as i64).checked_rem(divisor).unwrap_or(0) == remainder)
    };
    Ok(match value {
        Some(Bson::Array(items)) => items.iter().any(check),
        Some(v) => check(v),
        None => false,
    })
}

fn regex_matches(value: Option<&Bson>, operand: &Bson, options: &str) -> Result<bool> {
    let (pattern, flags) = match operand {
        Bson::String(p) => (p.as_str(), options),
        Bson::RegularExpression(r) => (r.pattern.as_str(), r.options.as_str()),
        other => return Err(unsupported(format!("$regex operand {other}"))),
    };
    let re = RegexBuilder::new(pattern)
        .case_insensitive(flags.contains('i'))
        .multi_line(flags.contains('m'))
        .dot_matches_new_line(flags.contains('s'))
        .build()
        .map_err(|e| NativeError::Driver(Box::new(e)))?;
    let check = |v: &Bson| matches!(v, Bson::String(s) if re.is_match(s));
    Ok(match value {
        Some(Bson::Array(items)) => items.iter().any(check),
        Some(v) => check(v),
        None => false,
    })
}

/// Whole-word search over every string in the document. Terms prefixed
/// with `-` exclude a document.
fn text_matches(doc: &Document, condition: &Bson) -> Result<bool> {
    let Bson::Document(spec) = condition else {
        return Err(unsupported("$text without a document"));
    };
    let search = spec.get_str("$search").map_err(|_| unsupported("$text without $search"))?;
    let case_sensitive = spec.get_bool("$caseSensitive").unwrap_or(false);
    let normalize = |s: &str| if case_sensitive { s.to_string() } else { s.to_lowercase() };

    let mut found = Vec::new();
    doc.values().for_each(|v| collect_words(v, &mut found));
    let words: Vec<String> = found.into_iter().map(normalize).collect();

    let mut wanted = false;
    for term in search.split_whitespace() {
        match term.strip_prefix('-') {
            Some(excluded) if words.contains(&normalize(excluded)) => return Ok(false),
            Some(_) => {}
            None => wanted |= words.contains(&normalize(term)),
        }
    }
    Ok(wanted)
}

fn collect_words<'a>(value: &'a Bson, out: &mut Vec<&'a str>) {
    match value {
        Bson::String(s) => out.extend(s.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty())),
        Bson::Array(items) => items.iter().for_each(|item| collect_words(item, out)),
        Bson::Document(doc) => doc.values().for_each(|v| collect_words(v, out)),
        _ => {}
    }
}

fn number(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(n) => Some(f64::from(*n)),
        Bson::Int64(n) => Some(*n as f64),
        Bson::Double(n) => Some(*n),
        _ => None,
    }
}

/// Cross-type ordering bucket, lowest first.
fn rank(value: &Bson) -> u8 {
    match value {
        Bson::MinKey => 0,
        Bson::Null | Bson::Undefined => 1,
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_) => 2,
        Bson::String(_) | Bson::Symbol(_) => 3,
        Bson::Document(_) => 4,
        Bson::Array(_) => 5,
        Bson::Binary(_) => 6,
        Bson::ObjectId(_) => 7,
        Bson::Boolean(_) => 8,
        Bson::DateTime(_) => 9,
        Bson::Timestamp(_) => 10,
        Bson::RegularExpression(_) => 11,
        Bson::MaxKey => 13,
        _ => 12,
    }
}

/// Total order used for sorting and range operators.
pub fn compare(a: &Bson, b: &Bson) -> Ordering {
    match rank(a).cmp(&rank(b)) {
        Ordering::Equal => {}
        other => return other,
    }
    match (a, b) {
        (Bson::String(x), Bson::String(y)) => x.cmp(y),
        (Bson::Boolean(x), Bson::Boolean(y)) => x.cmp(y),
        (Bson::DateTime(x), Bson::DateTime(y)) => x.cmp(y),
        (Bson::ObjectId(x), Bson::ObjectId(y)) => x.bytes().cmp(&y.bytes()),
        (Bson::Array(x), Bson::Array(y)) => x
            .iter()
            .zip(y)
            .map(|(l, r)| compare(l, r))
            .find(|o| o.is_ne())
            .unwrap_or_else(|| x.len().cmp(&y.len())),
        _ => match (number(a), number(b)) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
            _ => Ordering::Equal,
        },
    }
}

/// Order documents by a sort specification (`{field: 1 | -1}`).
pub fn sort(docs: &mut [Document], spec: &Document) {
    let keys: Vec<(&str, bool)> = spec
        .iter()
        .map(|(field, dir)| (field.as_str(), number(dir).map_or(true, |d| d >= 0.0)))
        .collect();
    docs.sort_by(|a, b| {
        for (field, ascending) in &keys {
            let left = lookup(a, field).unwrap_or(&Bson::Null);
            let right = lookup(b, field).unwrap_or(&Bson::Null);
            let ord = compare(left, right);
            let ord = if *ascending { ord } else { ord.reverse() };
            if ord.is_ne() {
                return ord;
            }
        }
        Ordering::Equal
    });
}

/// Apply an inclusion projection. `_id` is kept unless excluded.
pub fn project(doc: &Document, projection: &Document) -> Document {
    let mut out = Document::new();
    if projection.get("_id").map_or(true, truthy) {
        if let Some(id) = doc.get("_id") {
            out.insert("_id", id.clone());
        }
    }
    for (path, flag) in projection {
        if path == "_id" || !truthy(flag) {
            continue;
        }
        if let Some(value) = lookup(doc, path) {
            insert_path(&mut out, path, value.clone());
        }
    }
    out
}

fn insert_path(doc: &mut Document, path: &str, value: Bson) {
    match path.split_once('.') {
        None => {
            doc.insert(path, value);
        }
        Some((head, rest)) => {
            if !matches!(doc.get(head), Some(Bson::Document(_))) {
                doc.insert(head, Document::new());
            }
            if let Some(Bson::Document(inner)) = doc.get_mut(head) {
                insert_path(inner, rest, value);
            }
        }
    }
}
