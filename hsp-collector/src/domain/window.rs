//! Inclusive date windows.

use std::fmt;

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

/// Longest window HSP serves in a single `serviceMetrics` call, in days.
pub const MAX_WINDOW_DAYS: u64 = 7;

/// An inclusive range of service dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DateWindow {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateWindow {
    /// Create a window; returns `None` if `end` is before `start`.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Option<Self> {
        (start <= end).then_some(Self { start, end })
    }

    /// A window covering a single day.
    pub fn single(day: NaiveDate) -> Self {
        Self {
            start: day,
            end: day,
        }
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Number of days covered (at least 1).
    pub fn len_days(&self) -> u64 {
        (self.end - self.start).num_days() as u64 + 1
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Iterate over every date in the window.
    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + use<> {
        let end = self.end;
        self.start.iter_days().take_while(move |d| *d <= end)
    }

    /// Split into contiguous chunks of at most `max_days` days.
    ///
    /// The chunks cover the window with no gaps or overlaps; only the last
    /// one may be shorter than `max_days`.
    pub fn chunks(&self, max_days: u64) -> Vec<DateWindow> {
        let max_days = max_days.max(1);
        let mut chunks = Vec::new();
        let mut start = self.start;

        loop {
            let end = start
                .checked_add_days(Days::new(max_days - 1))
                .map_or(self.end, |d| d.min(self.end));
            chunks.push(DateWindow { start, end });

            match end.succ_opt() {
                Some(next) if end < self.end => start = next,
                _ => break,
            }
        }

        chunks
    }
}

impl fmt::Display for DateWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Chunks tile the window exactly and respect the size cap.
        #[test]
        fn chunks_tile_window(offset in 0u64..3000, span in 0u64..400, max in 1u64..15) {
            let base = NaiveDate::from_ymd_opt(2015, 1, 1).unwrap();
            let start = base.checked_add_days(Days::new(offset)).unwrap();
            let end = start.checked_add_days(Days::new(span)).unwrap();
            let w = DateWindow::new(start, end).unwrap();

            let chunks = w.chunks(max);
            prop_assert_eq!(chunks.first().unwrap().start(), start);
            prop_assert_eq!(chunks.last().unwrap().end(), end);
            for c in &chunks {
                prop_assert!(c.len_days() <= max);
            }
            for pair in chunks.windows(2) {
                prop_assert_eq!(pair[0].end().succ_opt().unwrap(), pair[1].start());
            }
            let total: u64 = chunks.iter().map(DateWindow::len_days).sum();
            prop_assert_eq!(total, w.len_days());
        }
    }
}
