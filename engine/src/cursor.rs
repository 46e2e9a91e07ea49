use std::sync::atomic::{AtomicU64, Ordering};

use shared::interaction::NonceRange;

/// Monotonic allocator over the u64 nonce space of one round.
///
/// Every reservation is a single atomic update, so concurrent callers always get disjoint
/// ranges and the union of everything handed out is exactly `[origin, position)`.
#[derive(Debug, Default)]
pub struct NonceCursor {
    next: AtomicU64,
}

impl NonceCursor {
    pub fn new() -> Self {
        Self::starting_at(0)
    }

    pub fn starting_at(origin: u64) -> Self {
        Self { next: AtomicU64::new(origin) }
    }

    /// Reserve up to `bulk` nonces. The last range before `u64::MAX` may be shorter,
    /// `None` once the space is used up.
    pub fn reserve(&self, bulk: u64) -> Option<NonceRange> {
        let start = self
            .next
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |cur| {
                if cur == u64::MAX || bulk == 0 {
                    None
                } else {
                    Some(cur.saturating_add(bulk))
                }
            })
            .ok()?;
        let end = start.saturating_add(bulk);
        Some(NonceRange::new(start, end - start))
    }

    pub fn position(&self) -> u64 {
        self.next.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use super::*;

    fn assert_exact_cover(mut ranges: Vec<NonceRange>, origin: u64, position: u64) {
        ranges.sort_by_key(|r| r.start);
        let mut expect = origin;
        for range in ranges {
            assert_eq!(range.start, expect, "gap or overlap at {expect}");
            expect = range.end();
        }
        assert_eq!(expect, position);
    }

    #[test]
    fn sequential_reservations_are_contiguous() {
        let cursor = NonceCursor::new();
        assert_eq!(cursor.reserve(10), Some(NonceRange::new(0, 10)));
        assert_eq!(cursor.reserve(5), Some(NonceRange::new(10, 5)));
        assert_eq!(cursor.position(), 15);
    }

    #[test]
    fn concurrent_reservations_never_overlap() {
        let cursor = Arc::new(NonceCursor::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let cursor = cursor.clone();
                thread::spawn(move || {
                    (0..1_000).filter_map(|_| cursor.reserve(1 + i as u64)).collect::<Vec<_>>()
                })
            })
            .collect();

        let ranges: Vec<_> = handles.into_iter().flat_map(|h| h.join().unwrap()).collect();
        assert_eq!(ranges.len(), 8_000);
        assert_exact_cover(ranges, 0, cursor.position());
    }

    #[test]
    fn tail_of_space_is_truncated() {
        let origin = u64::MAX - 10;
        let cursor = NonceCursor::starting_at(origin);
        assert_eq!(cursor.reserve(8), Some(NonceRange::new(origin, 8)));
        assert_eq!(cursor.reserve(8), Some(NonceRange::new(u64::MAX - 2, 2)));
        assert_eq!(cursor.reserve(8), None);
        assert_eq!(cursor.position(), u64::MAX);
    }
}
