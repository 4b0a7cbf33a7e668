use crate::storage::types::Record;

use std::cmp::Reverse;

/// Stable merge sort over an arbitrary key.
///
/// Halves the input recursively and merges, taking from the left half when keys
/// are equal, so equal keys keep their input order. Keys only need `PartialOrd`;
/// incomparable keys (NaN) sort after the element they are compared with.
pub fn merge_sort_by_key<T, K, F>(items: &[T], key: F) -> Vec<T>
where
    T: Clone,
    K: PartialOrd,
    F: Fn(&T) -> K,
{
    sort_slice(items, &key)
}

fn sort_slice<T, K, F>(items: &[T], key: &F) -> Vec<T>
where
    T: Clone,
    K: PartialOrd,
    F: Fn(&T) -> K,
{
    if items.len() <= 1 {
        return items.to_vec();
    }

    let mid = items.len() / 2;
    let left = sort_slice(&items[..mid], key);
    let right = sort_slice(&items[mid..], key);
    merge(left, right, key)
}

fn merge<T, K, F>(left: Vec<T>, right: Vec<T>, key: &F) -> Vec<T>
where
    K: PartialOrd,
    F: Fn(&T) -> K,
{
    let mut merged = Vec::with_capacity(left.len() + right.len());
    let mut left = left.into_iter().peekable();
    let mut right = right.into_iter().peekable();

    loop {
        let take_left = match (left.peek(), right.peek()) {
            (Some(l), Some(r)) => key(l) <= key(r),
            _ => break,
        };
        let next = if take_left { left.next() } else { right.next() };
        merged.extend(next);
    }

    merged.extend(left);
    merged.extend(right);
    merged
}

/// Ascending by score.
pub fn sort_by_score(records: &[Record]) -> Vec<Record> {
    merge_sort_by_key(records, |r| r.score)
}

/// Ascending by id; the order `binary_search_by_id` expects.
pub fn sort_by_id(records: &[Record]) -> Vec<Record> {
    merge_sort_by_key(records, |r| r.id)
}

/// Descending by `score + presence`; ties keep input order.
pub fn rank_by_total(records: &[Record]) -> Vec<Record> {
    merge_sort_by_key(records, |r| Reverse(r.total()))
}
