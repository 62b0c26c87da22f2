//! Query planning and in-memory execution.
//!
//! A find either targets a single record by primary key, or scans: filter,
//! then sort, then paginate. Stores that hold their records in memory run
//! [`QueryEngine::execute`] directly; stores that can push queries down only
//! use [`QueryEngine::plan`].

use crate::{
    filter::filter,
    keypath::Record,
    query::FindOptions,
    sort::Sorter,
};

/// How a find will be answered.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryPlan<V> {
    /// Fetch the record with `id`, then apply `rest` to that singleton.
    ById { id: V, rest: FindOptions<V> },
    /// Scan every record with the options as given.
    Scan(FindOptions<V>),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct QueryEngine {
    sorter: Sorter,
}

impl QueryEngine {
    pub fn new(sorter: Sorter) -> Self {
        Self { sorter }
    }

    pub fn sorter(&self) -> &Sorter {
        &self.sorter
    }

    /// Routes a find on the primary key to a direct fetch.
    ///
    /// The first condition naming `primary_key` becomes the fetched id; every
    /// other condition, the order and the limit stay in `rest`.
    pub fn plan<V>(&self, primary_key: &str, mut options: FindOptions<V>) -> QueryPlan<V> {
        let position = options
            .conditions
            .iter()
            .position(|c| c.keypath.is_field(primary_key));

        match position {
            Some(position) => {
                let id = options.conditions.remove(position).value;
                QueryPlan::ById { id, rest: options }
            }
            None => QueryPlan::Scan(options),
        }
    }

    /// Filters, sorts and paginates `records`.
    pub fn execute<R: Record>(&self, records: Vec<R>, options: &FindOptions<R>) -> Vec<R> {
        let mut records = filter(records, &options.conditions);
        self.sorter.sort(&mut records, &options.order);
        options.limit.paginate(records)
    }
}
