//! Limit and offset pagination.

use serde::{Deserialize, Serialize};

/// A limit/offset window over a result set.
///
/// `limit: None` means unbounded. Offsets are unsigned, and windows that fall
/// outside the records produce an empty result rather than an error.
///
/// # Example
///
/// ```ignore
/// use poro::page::Limit;
///
/// let window = Limit::new(Some(2), 3);
/// assert_eq!(window.paginate(vec!['a', 'b', 'c', 'd']), vec!['d']);
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Limit {
    pub limit: Option<usize>,
    pub offset: usize,
}

impl Limit {
    pub fn new(limit: Option<usize>, offset: usize) -> Self {
        Self { limit, offset }
    }

    /// All records.
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn is_unbounded(&self) -> bool {
        self.limit.is_none() && self.offset == 0
    }

    /// The same window narrowed to at most one record.
    pub fn single(self) -> Self {
        Self {
            limit: Some(1),
            offset: self.offset,
        }
    }

    pub fn paginate<T>(&self, records: Vec<T>) -> Vec<T> {
        paginate(records, self.limit, self.offset)
    }
}

/// Returns at most `limit` records starting at `offset`.
pub fn paginate<T>(records: Vec<T>, limit: Option<usize>, offset: usize) -> Vec<T> {
    let window = records.into_iter().skip(offset);

    match limit {
        Some(limit) => window.take(limit).collect(),
        None => window.collect(),
    }
}
