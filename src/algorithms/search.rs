use crate::storage::types::Record;

/// Binary search over `sorted`, which must be ascending by `key`.
///
/// The ordering is not checked; on unsorted input the result is meaningless.
pub fn binary_search_by_key<'a, T, K, F>(sorted: &'a [T], target: &K, key: F) -> Option<&'a T>
where
    K: Ord,
    F: Fn(&T) -> K,
{
    let mut low = 0;
    let mut high = sorted.len();

    while low < high {
        let mid = low + (high - low) / 2;
        match key(&sorted[mid]).cmp(target) {
            std::cmp::Ordering::Equal => return Some(&sorted[mid]),
            std::cmp::Ordering::Less => low = mid + 1,
            std::cmp::Ordering::Greater => high = mid,
        }
    }

    None
}

/// Finds a record by id in a slice sorted ascending by id.
pub fn binary_search_by_id(sorted: &[Record], id: i64) -> Option<&Record> {
    binary_search_by_key(sorted, &id, |r| r.id)
}
