//! Lyrics cursor — maps elapsed time to the active lyric line index.
//!
//! [`active_index`] is a pure function and the source of truth; it can be
//! called at any time value, every render tick, without touching shared
//! state.  [`LyricsCursor`] layers a monotonic scan hint on top so the
//! common case (time moving forward line by line) does not rescan the whole
//! sequence; the hint is an optimisation only and never affects the result.

use crate::track::LyricLine;

// ---------------------------------------------------------------------------
// active_index
// ---------------------------------------------------------------------------

/// Index of the line active at `time`, or `None` during a gap or outside
/// the lyric range.
///
/// A line is active for `start <= time < end` — `end` is exclusive, so at
/// the exact boundary the time belongs to the next line if it is
/// contiguous.  When the input violates the non-overlap invariant, the
/// *first* matching line in sequence order wins, deterministically.
pub fn active_index(lines: &[LyricLine], time: f64) -> Option<usize> {
    lines
        .iter()
        .position(|line| time >= line.start && time < line.end)
}

// ---------------------------------------------------------------------------
// LyricsCursor
// ---------------------------------------------------------------------------

/// Stateful wrapper around [`active_index`] with a monotonic scan hint.
///
/// While time advances, the search starts from the last known position
/// instead of index 0.  A backwards jump (seek, reset) falls back to a full
/// scan, so correctness never depends on the hint.
/// The hint assumes the same line sequence on every call — true for a
/// session, where [`crate::track::Track`] lyrics are immutable once loaded.
#[derive(Debug, Default)]
pub struct LyricsCursor {
    /// Last time value observed, used to detect backwards jumps.
    last_time: f64,
    /// First index worth scanning when time has only moved forward.
    scan_from: usize,
    /// Whether the sequence is sorted and non-overlapping, checked once.
    /// Violating sequences always take the pure scan path.
    ordered: Option<bool>,
}

impl LyricsCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Same result as [`active_index`], amortised O(1) for monotonic time.
    pub fn advance(&mut self, lines: &[LyricLine], time: f64) -> Option<usize> {
        let ordered = *self
            .ordered
            .get_or_insert_with(|| is_ordered(lines));
        if !ordered {
            return active_index(lines, time);
        }

        if time < self.last_time {
            self.scan_from = 0;
        }
        self.last_time = time;

        while self.scan_from < lines.len() && lines[self.scan_from].end <= time {
            self.scan_from += 1;
        }
        match lines.get(self.scan_from) {
            Some(line) if time >= line.start && time < line.end => Some(self.scan_from),
            _ => None,
        }
    }

    /// Forget the scan hint (e.g. when a new take restarts at zero).
    pub fn reset(&mut self) {
        self.last_time = 0.0;
        self.scan_from = 0;
    }
}

/// Sorted by start with non-overlapping `[start, end)` intervals.
fn is_ordered(lines: &[LyricLine]) -> bool {
    lines.windows(2).all(|w| w[0].end <= w[1].start)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn line(start: f64, end: f64, text: &str) -> LyricLine {
        LyricLine {
            start,
            end,
            text: text.into(),
        }
    }

    // ---- Pure function ----------------------------------------------------

    #[test]
    fn boundary_scenario_from_track_data() {
        // Track duration 180 s, one line {10, 14, "Hello"}.
        let lines = vec![line(10.0, 14.0, "Hello")];

        assert_eq!(active_index(&lines, 9.9), None);
        assert_eq!(active_index(&lines, 10.0), Some(0));
        assert_eq!(active_index(&lines, 13.99), Some(0));
        assert_eq!(active_index(&lines, 14.0), None);
    }

    #[test]
    fn end_boundary_belongs_to_next_contiguous_line() {
        let lines = vec![line(10.0, 14.0, "Hello"), line(14.0, 18.0, "World")];
        assert_eq!(active_index(&lines, 14.0), Some(1));
    }

    #[test]
    fn gap_between_lines_yields_none() {
        let lines = vec![line(0.0, 4.0, "a"), line(8.0, 12.0, "b")];
        assert_eq!(active_index(&lines, 5.0), None);
    }

    #[test]
    fn before_and_after_range_yield_none() {
        let lines = vec![line(10.0, 14.0, "a")];
        assert_eq!(active_index(&lines, 0.0), None);
        assert_eq!(active_index(&lines, 170.0), None);
    }

    #[test]
    fn empty_lines_always_none() {
        assert_eq!(active_index(&[], 5.0), None);
    }

    #[test]
    fn overlap_violation_picks_first_in_sequence_order() {
        // Two lines overlap on [5, 8) — the first by sequence order wins,
        // even though the second starts earlier.
        let lines = vec![line(5.0, 10.0, "first"), line(3.0, 8.0, "second")];
        assert_eq!(active_index(&lines, 6.0), Some(0));
        // Only the second covers t = 4.
        assert_eq!(active_index(&lines, 4.0), Some(1));
    }

    // ---- Cursor (hint must never change the answer) -----------------------

    #[test]
    fn cursor_matches_pure_function_on_forward_sweep() {
        let lines = vec![
            line(0.0, 2.0, "a"),
            line(2.0, 4.0, "b"),
            line(6.0, 8.0, "c"),
        ];
        let mut cursor = LyricsCursor::new();
        let mut t = 0.0;
        while t < 9.0 {
            assert_eq!(cursor.advance(&lines, t), active_index(&lines, t), "t={t}");
            t += 0.1;
        }
    }

    #[test]
    fn cursor_correct_after_backwards_seek() {
        let lines = vec![line(0.0, 2.0, "a"), line(2.0, 4.0, "b")];
        let mut cursor = LyricsCursor::new();

        assert_eq!(cursor.advance(&lines, 3.0), Some(1));
        assert_eq!(cursor.advance(&lines, 0.5), Some(0));
    }

    #[test]
    fn cursor_correct_on_unsorted_input() {
        let lines = vec![line(5.0, 10.0, "late"), line(0.0, 3.0, "early")];
        let mut cursor = LyricsCursor::new();

        assert_eq!(cursor.advance(&lines, 7.0), Some(0));
        // Time keeps moving forward but the match is at an earlier index.
        assert_eq!(cursor.advance(&lines, 7.5), Some(0));
        cursor.reset();
        assert_eq!(cursor.advance(&lines, 1.0), Some(1));
    }

    #[test]
    fn cursor_reset_clears_hint() {
        let lines = vec![line(0.0, 2.0, "a"), line(2.0, 4.0, "b")];
        let mut cursor = LyricsCursor::new();
        cursor.advance(&lines, 3.0);
        cursor.reset();
        assert_eq!(cursor.advance(&lines, 1.0), Some(0));
    }
}
