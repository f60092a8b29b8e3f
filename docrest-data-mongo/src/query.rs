//! Translation of filter expressions into MongoDB query documents.
//!
//! The translation is structural: every [`Expression`] variant maps to one
//! MongoDB operator and logical expressions recurse into their branches.
//! Variants without a MongoDB counterpart fail with
//! [`DataError::NotImplemented`]; nothing is silently dropped.

use docrest_data::{DataError, Expression, Lookup, Query, ID_FIELD};
use mongodb::bson::{self, doc, Bson, Document};
use serde_json::Value;

/// MongoDB primary key field.
pub const PRIMARY_KEY: &str = "_id";
pub const ETAG_FIELD: &str = "_etag";
pub const CREATED_FIELD: &str = "_created";
pub const UPDATED_FIELD: &str = "_updated";
/// Stores the record kind when several kinds share one collection.
pub const TYPE_FIELD: &str = "_type";

/// Map a logical field name to its storage name (`id` -> `_id`).
pub fn field_name(field: &str) -> &str {
    if field == ID_FIELD {
        PRIMARY_KEY
    } else {
        field
    }
}

/// Translate the filter of a lookup.
pub fn translate_lookup(lookup: &Lookup) -> Result<Document, DataError> {
    translate(lookup.filter())
}

/// Translate an expression list into a query document.
///
/// An empty list yields an empty document, which matches everything.
pub fn translate(query: &Query) -> Result<Document, DataError> {
    let mut out = Document::new();
    let mut collisions = Vec::new();
    for expr in query {
        let (key, condition) = match expr {
            Expression::Collection(kind) => (TYPE_FIELD.to_string(), Bson::String(kind.clone())),
            Expression::Equal { field, value } => (field_name(field).to_string(), to_bson(value)?),
            Expression::And(branches) => ("$and".to_string(), translate_branches(branches)?),
            Expression::Or(branches) => ("$or".to_string(), translate_branches(branches)?),
            Expression::Nor(branches) => ("$nor".to_string(), translate_branches(branches)?),
            Expression::Text(text) => (
                "$text".to_string(),
                Bson::Document(doc! {
                    "$search": text.search.as_str(),
                    "$language": text.language.as_str(),
                    "$caseSensitive": text.case_sensitive,
                    "$diacriticSensitive": text.diacritic_sensitive,
                }),
            ),
            Expression::Not(inner) => {
                let field = inner.field().ok_or(DataError::NotImplemented)?;
                let negated = match inner.as_ref() {
                    Expression::Equal { value, .. } => doc! { "$eq": to_bson(value)? },
                    other => operator(other)?,
                };
                (field_name(field).to_string(), Bson::Document(doc! { "$not": negated }))
            }
            other => {
                let field = other.field().ok_or(DataError::NotImplemented)?;
                (field_name(field).to_string(), Bson::Document(operator(other)?))
            }
        };
        put(&mut out, &mut collisions, key, condition);
    }
    if !collisions.is_empty() {
        // a caller's own $and stays one nested entry with its branches intact
        if let Some(existing) = out.remove("$and") {
            collisions.insert(0, Bson::Document(doc! { "$and": existing }));
        }
        out.insert("$and", Bson::Array(collisions));
    }
    Ok(out)
}

/// Operator document of a field-scoped, non-equality expression.
fn operator(expr: &Expression) -> Result<Document, DataError> {
    let op = match expr {
        Expression::NotEqual { value, .. } => doc! { "$ne": to_bson(value)? },
        Expression::GreaterThan { value, .. } => doc! { "$gt": to_bson(value)? },
        Expression::GreaterOrEqual { value, .. } => doc! { "$gte": to_bson(value)? },
        Expression::LowerThan { value, .. } => doc! { "$lt": to_bson(value)? },
        Expression::LowerOrEqual { value, .. } => doc! { "$lte": to_bson(value)? },
        Expression::In { values, .. } => doc! { "$in": to_bson_array(values)? },
        Expression::NotIn { values, .. } => doc! { "$nin": to_bson_array(values)? },
        Expression::Exist { exists, .. } => doc! { "$exists": *exists },
        Expression::Mod { divisor, remainder, .. } => doc! { "$mod": [*divisor, *remainder] },
        Expression::Regex { pattern, .. } => doc! { "$regex": pattern.as_str() },
        _ => return Err(DataError::NotImplemented),
    };
    Ok(op)
}

fn translate_branches(branches: &[Query]) -> Result<Bson, DataError> {
    branches
        .iter()
        .map(|branch| translate(branch).map(Bson::Document))
        .collect::<Result<Vec<_>, _>>()
        .map(Bson::Array)
}

/// Insert a condition, setting it aside for a top-level `$and` when the
/// key is already taken.
fn put(out: &mut Document, collisions: &mut Vec<Bson>, key: String, condition: Bson) {
    if out.contains_key(&key) {
        let mut extra = Document::new();
        extra.insert(key, condition);
        collisions.push(Bson::Document(extra));
    } else {
        out.insert(key, condition);
    }
}

fn to_bson(value: &Value) -> Result<Bson, DataError> {
    bson::to_bson(value).map_err(|e| DataError::InvalidQuery(e.to_string()))
}

fn to_bson_array(values: &[Value]) -> Result<Bson, DataError> {
    values.iter().map(to_bson).collect::<Result<Vec<_>, _>>().map(Bson::Array)
}

/// Translate sort keys into a sort document.
///
/// With no keys the sort falls back to the primary key so that paginated
/// reads are deterministic.
pub fn translate_sort(keys: &[String]) -> Document {
    let mut sort = Document::new();
    for key in keys {
        match key.strip_prefix('-') {
            Some(field) => sort.insert(field_name(field), -1),
            None => sort.insert(field_name(key), 1),
        };
    }
    if sort.is_empty() {
        sort.insert(PRIMARY_KEY, 1);
    }
    sort
}

/// Translate a field allow-list into a projection document.
///
/// Record metadata is always projected so results still decode.
pub fn translate_projection(fields: &[String]) -> Document {
    let mut projection = Document::new();
    for field in fields {
        projection.insert(field_name(field), 1);
    }
    for meta in [ETAG_FIELD, CREATED_FIELD, UPDATED_FIELD, TYPE_FIELD] {
        projection.insert(meta, 1);
    }
    projection
}

#[cfg(test)]
mod tests {
    use super::*;
    use docrest_data::{CustomExpression, TextSearch};
    use regex::Regex;

    fn q(expressions: Vec<Expression>) -> Query {
        expressions.into()
    }

    #[test]
    fn empty_query_matches_everything() {
        assert_eq!(translate(&Query::new()).unwrap(), Document::new());
    }

    #[test]
    fn id_is_remapped_to_primary_key() {
        let out = translate(&q(vec![Expression::eq("id", "abc")])).unwrap();
        assert_eq!(out, doc! { "_id": "abc" });
    }

    #[test]
    fn comparison_operators() {
        let cases = vec![
            (Expression::gt("age", 30), doc! { "age": { "$gt": 30_i64 } }),
            (Expression::gte("age", 30), doc! { "age": { "$gte": 30_i64 } }),
            (Expression::lt("age", 30), doc! { "age": { "$lt": 30_i64 } }),
            (Expression::lte("age", 30), doc! { "age": { "$lte": 30_i64 } }),
            (Expression::ne("name", "x"), doc! { "name": { "$ne": "x" } }),
            (Expression::ne("id", "x"), doc! { "_id": { "$ne": "x" } }),
            (Expression::in_values("tag", ["a", "b"]), doc! { "tag": { "$in": ["a", "b"] } }),
            (Expression::not_in_values("id", ["a"]), doc! { "_id": { "$nin": ["a"] } }),
        ];
        for (expr, expected) in cases {
            assert_eq!(translate(&q(vec![expr])).unwrap(), expected);
        }
    }

    #[test]
    fn element_and_evaluation_operators() {
        let out = translate(&q(vec![
            Expression::exists("qty", true),
            Expression::modulo("qty", 4.0, 0.0),
            Expression::regex("name", Regex::new("^al").unwrap()),
        ]))
        .unwrap();
        // both qty conditions survive: the second is AND-ed in
        assert_eq!(
            out,
            doc! {
                "qty": { "$exists": true },
                "$and": [ { "qty": { "$mod": [4.0, 0.0] } } ],
                "name": { "$regex": "^al" },
            }
        );
    }

    #[test]
    fn collisions_leave_caller_and_intact() {
        let out = translate(&q(vec![
            Expression::and(vec![q(vec![Expression::eq("a", 1)])]),
            Expression::eq("x", 1),
            Expression::eq("x", 2),
        ]))
        .unwrap();
        let list = out.get_array("$and").unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0], Bson::Document(doc! { "$and": [ { "a": 1_i64 } ] }));
        assert_eq!(list[1], Bson::Document(doc! { "x": 2_i64 }));
        assert_eq!(out.get_i64("x").unwrap(), 1);

        let single = translate(&q(vec![Expression::and(vec![q(vec![Expression::eq("a", 1)])])])).unwrap();
        assert_eq!(single.get_array("$and").unwrap().len(), 1);
    }

    #[test]
    fn negation_wraps_operator() {
        let out = translate(&q(vec![Expression::not(Expression::gt("price", 1.99))])).unwrap();
        assert_eq!(out, doc! { "price": { "$not": { "$gt": 1.99 } } });

        let out = translate(&q(vec![Expression::not(Expression::eq("id", "a"))])).unwrap();
        assert_eq!(out, doc! { "_id": { "$not": { "$eq": "a" } } });
    }

    #[test]
    fn logical_operators_preserve_branches() {
        let branches = vec![
            q(vec![Expression::collection("author"), Expression::eq("firstName", "Lisa")]),
            q(vec![Expression::collection("book")]),
            q(vec![Expression::lt("id", "m")]),
        ];
        for (expr, key) in [
            (Expression::and(branches.clone()), "$and"),
            (Expression::or(branches.clone()), "$or"),
            (Expression::nor(branches.clone()), "$nor"),
        ] {
            let out = translate(&q(vec![expr])).unwrap();
            let list = out.get_array(key).unwrap();
            assert_eq!(list.len(), 3);
            assert_eq!(list[0], Bson::Document(doc! { "_type": "author", "firstName": "Lisa" }));
            assert_eq!(list[1], Bson::Document(doc! { "_type": "book" }));
            assert_eq!(list[2], Bson::Document(doc! { "_id": { "$lt": "m" } }));
        }
    }

    #[test]
    fn text_search_carries_all_options() {
        let out = translate(&q(vec![Expression::text(TextSearch::new("coffee").case_sensitive(true))])).unwrap();
        assert_eq!(
            out,
            doc! { "$text": {
                "$search": "coffee",
                "$language": "",
                "$caseSensitive": true,
                "$diacriticSensitive": false,
            } }
        );
    }

    #[test]
    fn unsupported_expressions_fail() {
        let custom = Expression::Custom(CustomExpression::new("always", |_| true));
        let res = translate(&q(vec![Expression::eq("a", 1), custom.clone()]));
        assert!(matches!(res, Err(DataError::NotImplemented)));

        // nested failures surface through logical operators
        let nested = Expression::or(vec![q(vec![Expression::eq("a", 1)]), q(vec![custom])]);
        assert!(matches!(translate(&q(vec![nested])), Err(DataError::NotImplemented)));

        let not_logical = Expression::not(Expression::or(vec![q(vec![Expression::eq("a", 1)])]));
        assert!(matches!(translate(&q(vec![not_logical])), Err(DataError::NotImplemented)));
    }

    #[test]
    fn sort_defaults_to_primary_key() {
        assert_eq!(translate_sort(&[]), doc! { "_id": 1 });
    }

    #[test]
    fn sort_keys_keep_order_and_direction() {
        let keys = vec!["-age".to_string(), "id".to_string(), "name".to_string()];
        let sort = translate_sort(&keys);
        assert_eq!(sort, doc! { "age": -1, "_id": 1, "name": 1 });
        assert_eq!(sort.keys().collect::<Vec<_>>(), ["age", "_id", "name"]);
    }

    #[test]
    fn projection_keeps_metadata() {
        let projection = translate_projection(&["id".to_string(), "name".to_string()]);
        assert_eq!(
            projection,
            doc! { "_id": 1, "name": 1, "_etag": 1, "_created": 1, "_updated": 1, "_type": 1 }
        );
    }
}
