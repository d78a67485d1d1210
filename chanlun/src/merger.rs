//! 合并K线：去除相邻K线之间的包含关系。

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::bar::{Bar, MergedBar};
use crate::constant::{Const, Direction};
use crate::series::{StructureSeries, index_after};
use crate::utils::first_changed_index;

#[derive(Debug, Default)]
pub struct BarMerger {
    rows: StructureSeries<MergedBar>,
}

impl BarMerger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> &[MergedBar] {
        self.rows.as_slice()
    }

    pub fn clear(&mut self) {
        self.rows.clear();
    }

    pub fn trim_until(&mut self, dt: DateTime<Utc>) {
        self.rows.retain_after(dt);
    }

    /// Re-derives the merged tail from `bars` and returns the first merged
    /// index that differs from the previous state.
    pub fn update(&mut self, bars: &[Bar]) -> Option<usize> {
        let Some(first) = bars.first() else {
            let had_rows = !self.rows.is_empty();
            self.rows.clear();
            return had_rows.then_some(0);
        };

        let mut base = self.rows.len().saturating_sub(Const::MERGE_TAIL);
        if base < 2 {
            base = 0;
        }
        let previous_tail = self.rows.truncate_tail(self.rows.len() - base);

        let start = match self.rows.last() {
            Some(last) => index_after(bars, last.dt),
            None => {
                self.rows.push(MergedBar::from_bar(first));
                1
            }
        };
        for bar in &bars[start..] {
            self.absorb(bar);
        }

        let backtrack = first_changed_index(
            &previous_tail,
            &self.rows.as_slice()[base..],
            |a, b| a == b,
            true,
        )
        .map(|offset| base + offset);
        if let Some(index) = backtrack {
            debug!(index, merged = self.rows.len(), "merged bars changed");
        }
        backtrack
    }

    fn direction(&self) -> Direction {
        match self.rows.last_n(2) {
            [prev, last] if last.high > prev.high => Direction::Up,
            [_, _] => Direction::Down,
            _ => Direction::Up,
        }
    }

    fn absorb(&mut self, bar: &Bar) {
        let direction = self.direction();
        let merged = match self.rows.last() {
            Some(last) if last.is_inclusive(bar.high, bar.low) => last.absorb(bar, direction),
            _ => {
                self.rows.push(MergedBar::from_bar(bar));
                return;
            }
        };
        self.rows.replace_last(merged);
    }
}

/// True when no two consecutive merged bars contain one another.
pub fn is_containment_free(rows: &[MergedBar]) -> bool {
    rows.windows(2)
        .all(|pair| !pair[0].is_inclusive(pair[1].high, pair[1].low))
}
