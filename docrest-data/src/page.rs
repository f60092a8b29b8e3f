use serde::{Deserialize, Serialize};

use crate::record::Record;

/// Offset/limit window of a find request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub offset: u64,
    /// `None` requests every remaining record.
    pub limit: Option<u64>,
}

impl Window {
    pub fn new(offset: u64, limit: Option<u64>) -> Self {
        Self { offset, limit }
    }

    /// Everything, starting at the first record.
    pub fn all() -> Self {
        Self::default()
    }

    /// Zero-based page number and page size.
    pub fn page(page: u64, size: u64) -> Self {
        Self {
            offset: page.saturating_mul(size),
            limit: Some(size),
        }
    }

    /// Total number of matches deducible from a page of `returned` records.
    ///
    /// A short page (or an unlimited request) means the result set ended
    /// inside this window, so the total is `offset + returned`. A full page
    /// says nothing about what follows and yields `None`.
    pub fn total(&self, returned: usize) -> Option<u64> {
        let returned = returned as u64;
        match self.limit {
            Some(limit) if returned >= limit => None,
            _ => Some(self.offset.saturating_add(returned)),
        }
    }
}

/// A page of records returned by a find.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RecordList {
    /// Total number of matching records, `None` when unknown.
    pub total: Option<u64>,
    pub records: Vec<Record>,
}

impl RecordList {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
