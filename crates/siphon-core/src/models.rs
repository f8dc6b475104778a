//! Request-scoped harvest entities.
//!
//! None of these outlive a single harvest: a [`Query`] is issued, the server
//! answers with [`Page`]s linked by [`Cursor`]s, and an [`Accumulator`]
//! gathers everything until it is written out once.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::dedup::Deduplicator;

/// Inclusive date range, both ends included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Number of calendar days covered, counting both ends.
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    /// Formats a bound the way the research API expects it (`YYYYMMDD`).
    pub fn compact(date: NaiveDate) -> String {
        date.format("%Y%m%d").to_string()
    }
}

/// A search or filter expression plus optional time bounds. Immutable once issued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub expression: String,
    pub window: Option<DateWindow>,
    pub page_size: u32,
}

impl Query {
    pub fn new(expression: impl Into<String>, page_size: u32) -> Self {
        Self {
            expression: expression.into(),
            window: None,
            page_size,
        }
    }

    /// Returns a copy of this query restricted to `window`.
    pub fn within(&self, window: DateWindow) -> Self {
        Self {
            window: Some(window),
            ..self.clone()
        }
    }
}

/// Server-issued continuation state.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Cursor {
    /// Opaque continuation token.
    Token(String),
    /// Numeric offset into the result set.
    Offset(u64),
    /// Offset scoped to a server-side search session.
    Search { cursor: u64, search_id: String },
}

impl std::fmt::Display for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Cursor::Token(token) => write!(f, "token:{}", token),
            Cursor::Offset(offset) => write!(f, "offset:{}", offset),
            Cursor::Search { cursor, search_id } => write!(f, "search:{}@{}", search_id, cursor),
        }
    }
}

/// One server response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub records: Vec<Value>,
    /// Side-table name → records (each value an array).
    pub side_tables: Map<String, Value>,
    /// `None` when the server reports no further pages.
    pub next: Option<Cursor>,
}

impl Page {
    pub fn new(records: Vec<Value>) -> Self {
        Self {
            records,
            ..Default::default()
        }
    }

    pub fn with_next(mut self, next: Option<Cursor>) -> Self {
        self.next = next;
        self
    }

    pub fn with_side_tables(mut self, side_tables: Map<String, Value>) -> Self {
        self.side_tables = side_tables;
        self
    }
}

/// Records collected across all pages of one harvest.
///
/// Records are only ever appended. Side-tables are merged by concatenation
/// under their key, with no type-specific logic.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Accumulator {
    records: Vec<Value>,
    side_tables: Map<String, Value>,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a page. Returns the number of primary records taken.
    pub fn absorb(&mut self, page: Page) -> usize {
        let taken = page.records.len();
        self.records.extend(page.records);
        self.merge_side_tables(page.side_tables);
        taken
    }

    /// Appends a page, dropping primary records the deduplicator has already seen.
    pub fn absorb_with(&mut self, page: Page, dedup: &mut Deduplicator) -> usize {
        let before = self.records.len();
        for record in page.records {
            if dedup.admit(&record) {
                self.records.push(record);
            }
        }
        self.merge_side_tables(page.side_tables);
        self.records.len() - before
    }

    /// Appends another accumulator, e.g. one harvested for a later time window.
    pub fn extend(&mut self, other: Accumulator) {
        self.records.extend(other.records);
        self.merge_side_tables(other.side_tables);
    }

    fn merge_side_tables(&mut self, tables: Map<String, Value>) {
        for (name, items) in tables {
            let items = match items {
                Value::Array(items) => items,
                other => vec![other],
            };
            match self.side_tables.get_mut(&name) {
                Some(Value::Array(existing)) => existing.extend(items),
                _ => {
                    self.side_tables.insert(name, Value::Array(items));
                }
            }
        }
    }

    pub fn records(&self) -> &[Value] {
        &self.records
    }

    pub fn side_tables(&self) -> &Map<String, Value> {
        &self.side_tables
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Renders the final document: `{ "<records_key>": [...], "includes": {...} }`.
    ///
    /// `includes` is always present, empty when no page carried side-tables.
    pub fn into_document(self, records_key: &str) -> Value {
        let mut doc = Map::new();
        doc.insert(records_key.to_string(), Value::Array(self.records));
        doc.insert("includes".to_string(), Value::Object(self.side_tables));
        Value::Object(doc)
    }
}

/// Bearer token issued by a client-credentials exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessToken {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub token_type: Option<String>,
    /// Full response body, kept for persistence.
    #[serde(skip)]
    pub raw: Value,
}
