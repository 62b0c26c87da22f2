//! Multi-key, multi-direction stable sorting.

use std::cmp::Ordering;
use serde::Deserialize;

use crate::keypath::{Keypath, Record, resolve};

/// Sort direction for one sort key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(from = "RawDirection")]
pub enum Direction {
    /// Ascending order (A to Z, 0 to 9, earliest to latest).
    #[default]
    Asc,
    /// Descending order (Z to A, 9 to 0, latest to earliest).
    Desc,
}

impl Direction {
    /// Parses a direction leniently: anything other than `desc` (in any
    /// case) is ascending.
    pub fn parse(direction: &str) -> Self {
        if direction.eq_ignore_ascii_case("desc") {
            Direction::Desc
        } else {
            Direction::Asc
        }
    }

    pub fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            Direction::Asc => ordering,
            Direction::Desc => ordering.reverse(),
        }
    }
}

impl From<&str> for Direction {
    fn from(value: &str) -> Self {
        Direction::parse(value)
    }
}

impl From<i64> for Direction {
    fn from(value: i64) -> Self {
        if value < 0 { Direction::Desc } else { Direction::Asc }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawDirection {
    Name(String),
    Sign(i64),
    Other(serde_json::Value),
}

impl From<RawDirection> for Direction {
    fn from(raw: RawDirection) -> Self {
        match raw {
            RawDirection::Name(name) => Direction::parse(&name),
            RawDirection::Sign(sign) => Direction::from(sign),
            RawDirection::Other(_) => Direction::Asc,
        }
    }
}

/// One sort key: a keypath and its direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub keypath: Keypath,
    pub direction: Direction,
}

impl SortKey {
    pub fn new(keypath: impl Into<Keypath>, direction: Direction) -> Self {
        Self {
            keypath: keypath.into(),
            direction,
        }
    }
}

/// Where null (and missing) values sort relative to everything else when
/// ascending. Descending keys reverse it along with the rest of the order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NullOrdering {
    #[default]
    First,
    Last,
}

/// Sorts records by an ordered list of [`SortKey`]s.
///
/// The first key whose comparison is not equal decides. Values that cannot
/// be compared with each other (a string against a number, NaN) count as
/// equal for that key. That relation is not transitive, so [`Sorter::sort`]
/// uses its own stable merge sort, which tolerates it, rather than the
/// standard library sort, which may panic on it.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sorter {
    nulls: NullOrdering,
}

impl Sorter {
    pub fn new(nulls: NullOrdering) -> Self {
        Self { nulls }
    }

    pub fn nulls(&self) -> NullOrdering {
        self.nulls
    }

    pub fn compare<R: Record>(&self, a: &R, b: &R, order: &[SortKey]) -> Ordering {
        for key in order {
            let ordering = key.direction.apply(self.compare_key(a, b, &key.keypath));
            if ordering != Ordering::Equal {
                return ordering;
            }
        }

        Ordering::Equal
    }

    fn compare_key<R: Record>(&self, a: &R, b: &R, keypath: &Keypath) -> Ordering {
        let left = resolve(a, keypath).value().filter(|v| !v.is_null());
        let right = resolve(b, keypath).value().filter(|v| !v.is_null());

        let null_first = match self.nulls {
            NullOrdering::First => Ordering::Less,
            NullOrdering::Last => Ordering::Greater,
        };

        match (left, right) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => null_first,
            (Some(_), None) => null_first.reverse(),
            (Some(l), Some(r)) => l.compare(r).unwrap_or(Ordering::Equal),
        }
    }

    /// Sorts in place. An empty order leaves the records untouched.
    pub fn sort<R: Record>(&self, records: &mut Vec<R>, order: &[SortKey]) {
        if order.is_empty() || records.len() < 2 {
            return;
        }

        let mut positions: Vec<usize> = (0..records.len()).collect();
        merge_sort(&mut positions, &|a, b| self.compare(&records[a], &records[b], order));

        let mut slots: Vec<Option<R>> = records.drain(..).map(Some).collect();
        records.extend(positions.into_iter().filter_map(|i| slots[i].take()));
    }
}

/// Stable top-down merge sort over record positions.
///
/// Every element is placed exactly once whatever `compare` answers, so an
/// inconsistent comparator yields some permutation instead of a panic.
fn merge_sort<F>(positions: &mut Vec<usize>, compare: &F)
where
    F: Fn(usize, usize) -> Ordering,
{
    if positions.len() < 2 {
        return;
    }

    let mut right = positions.split_off(positions.len() / 2);
    merge_sort(positions, compare);
    merge_sort(&mut right, compare);

    let left = std::mem::take(positions);
    positions.reserve(left.len() + right.len());

    let mut left = left.into_iter().peekable();
    let mut right = right.into_iter().peekable();
    loop {
        match (left.peek(), right.peek()) {
            (Some(&l), Some(&r)) => {
                // Left wins ties.
                if compare(r, l) == Ordering::Less {
                    positions.push(r);
                    right.next();
                } else {
                    positions.push(l);
                    left.next();
                }
            }
            (Some(_), None) => {
                positions.extend(left);
                break;
            }
            (None, _) => {
                positions.extend(right);
                break;
            }
        }
    }
}
