//! Property tests for block scheduling on a source list.
//!
//! Times are multiples of 0.25 s so float comparisons stay exact.

use proptest::prelude::*;
use tessitura::timing::{ScheduledBlock, SourceList};

fn block(start: u32, len: u32) -> ScheduledBlock {
    ScheduledBlock::new(start as f64 * 0.25, (start + len) as f64 * 0.25, 0.0)
}

fn spans() -> impl Strategy<Value = Vec<(u32, u32)>> {
    prop::collection::vec((0u32..400, 1u32..40), 0..60)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    /// Whatever order blocks arrive in, the list stays sorted and
    /// non-overlapping, and a block is rejected exactly when it would
    /// overlap one already accepted.
    #[test]
    fn list_never_overlaps(spans in spans()) {
        let mut list = SourceList::new();
        let mut accepted: Vec<(f64, f64)> = Vec::new();

        for (start, len) in spans {
            let candidate = block(start, len);
            let clashes = accepted
                .iter()
                .any(|(s, e)| candidate.overlaps(*s, *e));
            let result = list.add(candidate.clone());
            prop_assert_eq!(result.is_err(), clashes);
            if !clashes {
                accepted.push((candidate.start, candidate.end));
            }
        }

        prop_assert_eq!(list.len(), accepted.len());
        for pair in list.iter().collect::<Vec<_>>().windows(2) {
            prop_assert!(pair[0].end <= pair[1].start);
        }
    }

    /// The cached lookup agrees with a linear scan for any sequence of
    /// windows, including ones that jump backwards.
    #[test]
    fn match_range_agrees_with_scan(
        spans in spans(),
        windows in prop::collection::vec((0u32..460, 1u32..30), 1..40),
    ) {
        let mut list = SourceList::new();
        for (start, len) in spans {
            let _ = list.add(block(start, len));
        }

        for (start, len) in windows {
            let (from, to) = (start as f64 * 0.25, (start + len) as f64 * 0.25);
            let hits: Vec<usize> = list
                .iter()
                .enumerate()
                .filter(|(_, b)| b.overlaps(from, to))
                .map(|(i, _)| i)
                .collect();
            let expected = hits.first().zip(hits.last()).map(|(a, b)| (*a, *b));
            prop_assert_eq!(list.match_range(from, to), expected);
        }
    }

    /// Splitting a block and sticking the halves back together restores it.
    #[test]
    fn split_then_stick_is_identity(start in 0u32..100, len in 2u32..40, cut in 1u32..39) {
        prop_assume!(cut < len);
        let mut list = SourceList::new();
        let mut original = block(start, len);
        original.offset = -1.5;
        list.add(original.clone()).unwrap();

        let time = (start + cut) as f64 * 0.25;
        list.split(0, time).unwrap();
        prop_assert_eq!(list.len(), 2);
        prop_assert_eq!(list.get(1).unwrap().start, time);

        list.stick_with_next(0).unwrap();
        let merged = list.get(0).unwrap();
        prop_assert_eq!(list.len(), 1);
        prop_assert_eq!((merged.start, merged.end, merged.offset),
            (original.start, original.end, original.offset));
    }
}
