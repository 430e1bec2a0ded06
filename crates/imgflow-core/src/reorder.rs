//! Consumer-side reordering of out-of-order results.

use std::collections::BTreeMap;

/// Holds items that arrived early until every smaller id has been seen.
///
/// Ids are expected to be contiguous starting at `first_id`. An id below the
/// next expected one (a duplicate, or one that was never buffered) is passed
/// straight through.
#[derive(Debug)]
pub struct ReorderBuffer<T> {
    next: u32,
    pending: BTreeMap<u32, T>,
}

impl<T> ReorderBuffer<T> {
    pub fn new(first_id: u32) -> Self {
        Self {
            next: first_id,
            pending: BTreeMap::new(),
        }
    }

    /// Accept one item and return every item that is now in order.
    pub fn push(&mut self, id: u32, item: T) -> Vec<T> {
        if id < self.next {
            tracing::warn!("Id {} arrived after {} was released", id, self.next);
            return vec![item];
        }
        self.pending.insert(id, item);

        let mut ready = Vec::new();
        while let Some(item) = self.pending.remove(&self.next) {
            ready.push(item);
            self.next = self.next.wrapping_add(1);
        }
        ready
    }

    /// Id of the next item to be released.
    pub fn next_id(&self) -> u32 {
        self.next
    }

    /// Number of buffered items waiting for a gap to fill.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Release everything still buffered, in id order, skipping gaps.
    pub fn finish(self) -> Vec<T> {
        self.pending.into_values().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_releases_contiguous_runs() {
        let mut buf = ReorderBuffer::new(0);
        assert!(buf.push(2, "c").is_empty());
        assert!(buf.push(1, "b").is_empty());
        assert_eq!(buf.pending(), 2);
        assert_eq!(buf.push(0, "a"), vec!["a", "b", "c"]);
        assert_eq!(buf.next_id(), 3);
        assert_eq!(buf.push(3, "d"), vec!["d"]);
    }

    #[test]
    fn test_finish_skips_gaps() {
        let mut buf = ReorderBuffer::new(10);
        buf.push(13, 'x');
        buf.push(12, 'y');
        assert_eq!(buf.finish(), vec!['y', 'x']);
    }

    #[test]
    fn test_late_id_passes_through() {
        let mut buf = ReorderBuffer::new(0);
        assert_eq!(buf.push(0, 1), vec![1]);
        assert_eq!(buf.push(0, 2), vec![2]);
    }
}
