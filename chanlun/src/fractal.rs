use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::bar::{MergedBar, has_gap};
use crate::constant::Mark;
use crate::series::{StructureSeries, Timestamped, index_after};
use crate::utils::{first_changed_dt, max_f64, min_f64};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Fractal {
    /// Timestamp of the middle merged bar.
    pub dt: DateTime<Utc>,
    pub mark: Mark,
    pub price: f64,
    pub start_dt: DateTime<Utc>,
    pub end_dt: DateTime<Utc>,
    pub high: f64,
    pub low: f64,
}

impl Fractal {
    pub fn verify(left: &MergedBar, middle: &MergedBar, right: &MergedBar) -> Option<Mark> {
        if left.high < middle.high && middle.high > right.high {
            Some(Mark::Peak)
        } else if left.low > middle.low && middle.low < right.low {
            Some(Mark::Trough)
        } else {
            None
        }
    }

    /// Builds the fractal of a merged triple; a gap next to the middle bar
    /// leaves the outer bar out of the envelope.
    pub fn from_triple(
        left: &MergedBar,
        middle: &MergedBar,
        right: &MergedBar,
        gap_margin: f64,
    ) -> Option<Self> {
        let mark = Self::verify(left, middle, right)?;
        let mut kept = vec![middle];
        if !has_gap(left, middle, gap_margin) {
            kept.push(left);
        }
        if !has_gap(middle, right, gap_margin) {
            kept.push(right);
        }

        let (price, high, low) = match mark {
            Mark::Peak => (
                middle.high,
                middle.high,
                min_f64(kept.iter().map(|bar| bar.low)).unwrap_or(middle.low),
            ),
            Mark::Trough => (
                middle.low,
                max_f64(kept.iter().map(|bar| bar.high)).unwrap_or(middle.high),
                middle.low,
            ),
        };
        Some(Self {
            dt: middle.dt,
            mark,
            price,
            start_dt: left.dt,
            end_dt: right.dt,
            high,
            low,
        })
    }
}

impl Timestamped for Fractal {
    fn dt(&self) -> DateTime<Utc> {
        self.dt
    }
}

#[derive(Debug)]
pub struct FractalDetector {
    rows: StructureSeries<Fractal>,
    gap_margin: f64,
}

impl FractalDetector {
    pub fn new(gap_margin: f64) -> Self {
        Self {
            rows: StructureSeries::new(),
            gap_margin,
        }
    }

    pub fn rows(&self) -> &[Fractal] {
        self.rows.as_slice()
    }

    pub fn clear(&mut self) {
        self.rows.clear();
    }

    pub fn trim_until(&mut self, dt: DateTime<Utc>) {
        self.rows.retain_after(dt);
    }

    /// Rescans the merged tail starting at `merged_backtrack`, the first
    /// merged index the merger reported as changed. Returns the timestamp of
    /// the first fractal that differs from the previous state.
    pub fn update(
        &mut self,
        merged: &[MergedBar],
        merged_backtrack: Option<usize>,
    ) -> Option<DateTime<Utc>> {
        let changed = merged_backtrack?;

        // A triple is stale once its right bar changed.
        let mut cut = match changed.checked_sub(1).and_then(|idx| merged.get(idx)) {
            Some(bar) => Some(bar.dt),
            None if changed == 0 => None,
            None => merged.last().map(|bar| bar.dt),
        };
        if let Some(last) = self.rows.last() {
            cut = Some(cut.map_or(last.dt, |dt| dt.min(last.dt)));
        }

        let keep = match cut {
            Some(dt) => self.rows.index_at_or_after(dt),
            None => 0,
        };
        let previous_tail = self.rows.truncate_tail(self.rows.len() - keep);

        let first_middle = match self.rows.last() {
            Some(last) => index_after(merged, last.dt).max(1),
            None => 1,
        };
        for middle in first_middle..merged.len().saturating_sub(1) {
            let triple = (&merged[middle - 1], &merged[middle], &merged[middle + 1]);
            if let Some(fractal) = Fractal::from_triple(triple.0, triple.1, triple.2, self.gap_margin) {
                self.rows.push(fractal);
            }
        }

        let current_tail = &self.rows.as_slice()[keep..];
        let dt = first_changed_dt(&previous_tail, current_tail, |a, b| a == b)?;
        debug!(%dt, fractals = self.rows.len(), "fractals changed");
        Some(dt)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    fn merged(idx: i64, high: f64, low: f64) -> MergedBar {
        let dt = Utc.with_ymd_and_hms(2024, 2, 1, 9, 0, 0).unwrap() + Duration::minutes(idx);
        MergedBar {
            start_dt: dt,
            dt,
            open: low,
            high,
            low,
            close: high,
            volume: 1.0,
            elements: 1,
        }
    }

    #[test]
    fn peak_envelope_uses_lowest_kept_low() {
        let fractal = Fractal::from_triple(
            &merged(0, 10.0, 8.0),
            &merged(1, 12.0, 9.0),
            &merged(2, 11.0, 8.5),
            0.002,
        )
        .unwrap();
        assert_eq!(fractal.mark, Mark::Peak);
        assert_eq!((fractal.price, fractal.high, fractal.low), (12.0, 12.0, 8.0));
    }

    #[test]
    fn gap_excludes_outer_bar() {
        let fractal = Fractal::from_triple(
            &merged(0, 100.0, 95.0),
            &merged(1, 110.0, 101.0),
            &merged(2, 108.0, 99.0),
            0.002,
        )
        .unwrap();
        assert_eq!(fractal.mark, Mark::Peak);
        assert_eq!(fractal.low, 99.0);
    }

    #[test]
    fn detector_emits_alternating_marks() {
        let bars = vec![
            merged(0, 10.0, 8.0),
            merged(1, 12.0, 9.0),
            merged(2, 11.0, 7.0),
            merged(3, 10.0, 6.0),
            merged(4, 13.0, 7.5),
            merged(5, 12.0, 7.0),
        ];
        let mut detector = FractalDetector::new(0.002);
        let backtrack = detector.update(&bars, Some(0));
        let marks: Vec<Mark> = detector.rows().iter().map(|f| f.mark).collect();
        assert_eq!(marks, vec![Mark::Peak, Mark::Trough, Mark::Peak]);
        assert_eq!(backtrack, Some(bars[1].dt));
        assert_eq!(detector.update(&bars, None), None);
    }
}
