use crate::error::DataError;
use crate::filter::Query;

/// Caller-supplied bundle of filter, sort and projection for one request.
///
/// Sort keys are field names, optionally prefixed with `-` for descending
/// order. An empty sort list lets the backend pick a deterministic default.
///
/// # Example
///
/// ```ignore
/// let lookup = Lookup::new()
///     .with_filter(r#"{"$collection": "book", "pages": {"$gt": 100}}"#.parse()?)
///     .with_sort(["-pages", "name"])
///     .with_fields(["name", "pages"]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Lookup {
    filter: Query,
    sort: Vec<String>,
    fields: Option<Vec<String>>,
}

impl Lookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filter(mut self, filter: Query) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_sort<S: Into<String>>(mut self, keys: impl IntoIterator<Item = S>) -> Self {
        self.sort = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_fields<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// AND an additional query onto the current filter.
    pub fn add_query(&mut self, query: Query) {
        self.filter.extend(query);
    }

    /// Replace the sort keys, rejecting empty field names.
    pub fn set_sort<S: AsRef<str>>(&mut self, keys: impl IntoIterator<Item = S>) -> Result<(), DataError> {
        let mut sort = Vec::new();
        for key in keys {
            let key = key.as_ref().trim();
            let field = key.strip_prefix('-').unwrap_or(key);
            if field.is_empty() {
                return Err(DataError::invalid(format!("invalid sort key '{key}'")));
            }
            sort.push(key.to_string());
        }
        self.sort = sort;
        Ok(())
    }

    pub fn set_fields(&mut self, fields: Option<Vec<String>>) {
        self.fields = fields;
    }

    pub fn filter(&self) -> &Query {
        &self.filter
    }

    pub fn sort(&self) -> &[String] {
        &self.sort
    }

    /// Field allow-list, `None` when every field is wanted.
    pub fn fields(&self) -> Option<&[String]> {
        self.fields.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::Expression;

    #[test]
    fn add_query_appends() {
        let mut lookup = Lookup::new().with_filter(vec![Expression::collection("book")].into());
        lookup.add_query(vec![Expression::eq("name", "X")].into());
        assert_eq!(lookup.filter().len(), 2);
    }

    #[test]
    fn set_sort_rejects_empty_keys() {
        let mut lookup = Lookup::new();
        assert!(lookup.set_sort(["-age", "name"]).is_ok());
        assert_eq!(lookup.sort(), ["-age", "name"]);
        assert!(matches!(lookup.set_sort(["-"]), Err(DataError::InvalidQuery(_))));
        assert!(matches!(lookup.set_sort([""]), Err(DataError::InvalidQuery(_))));
        assert_eq!(lookup.sort(), ["-age", "name"]);
    }

    #[test]
    fn fields_default_to_none() {
        assert!(Lookup::new().fields().is_none());
        let lookup = Lookup::new().with_fields(["name"]);
        assert_eq!(lookup.fields(), Some(&["name".to_string()][..]));
    }
}
