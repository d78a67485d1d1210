//! 线段：由笔构成的更高一级结构。

pub mod feature;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::constant::{Const, Mark, PointState};
use crate::series::{Stateful, StructureSeries, Timestamped, index_at_or_after};
use crate::stroke::Stroke;
use crate::utils::first_changed_dt;

pub use feature::{FeatureRange, is_valid_point, standardize};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Segment {
    pub dt: DateTime<Utc>,
    pub mark: Mark,
    pub price: f64,
    pub start_dt: DateTime<Utc>,
    pub end_dt: DateTime<Utc>,
    pub high: f64,
    pub low: f64,
    pub state: PointState,
}

impl Segment {
    pub fn from_stroke(stroke: &Stroke) -> Self {
        Self {
            dt: stroke.dt,
            mark: stroke.mark,
            price: stroke.price,
            start_dt: stroke.start_dt,
            end_dt: stroke.end_dt,
            high: stroke.high,
            low: stroke.low,
            state: PointState::Tentative,
        }
    }

    fn is_exceeded_by(&self, price: f64) -> bool {
        match self.mark {
            Mark::Peak => price > self.price,
            Mark::Trough => price < self.price,
        }
    }

    /// A peak under this trough, or a trough over this peak.
    fn is_contradicted_by(&self, candidate: &Stroke) -> bool {
        match self.mark {
            Mark::Trough => candidate.price < self.price,
            Mark::Peak => candidate.price > self.price,
        }
    }
}

impl Timestamped for Segment {
    fn dt(&self) -> DateTime<Utc> {
        self.dt
    }
}

impl Stateful for Segment {
    fn set_state(&mut self, state: PointState) {
        self.state = state;
    }
}

#[derive(Debug, Default)]
pub struct SegmentBuilder {
    rows: StructureSeries<Segment>,
}

impl SegmentBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> &[Segment] {
        self.rows.as_slice()
    }

    pub fn clear(&mut self) {
        self.rows.clear();
    }

    pub fn trim_until(&mut self, dt: DateTime<Utc>) {
        self.rows.retain_after(dt);
        self.rows.refresh_states();
    }

    /// Rebuilds the segment points from the stroke sequence and returns the
    /// timestamp of the first point that differs from the previous state.
    pub fn update(&mut self, strokes: &[Stroke]) -> Option<DateTime<Utc>> {
        let candidates = build_candidates(strokes);
        let refined = refine(strokes, candidates);

        let previous = self.rows.truncate_tail(self.rows.len());
        self.rows.replace_all(refined);
        self.rows.refresh_states();

        let current = self.rows.as_slice();
        let dt = first_changed_dt(&previous, current, same_point)?;
        debug!(%dt, segments = current.len(), "segments changed");
        Some(dt)
    }
}

fn same_point(a: &Segment, b: &Segment) -> bool {
    a.dt == b.dt && a.mark == b.mark && a.price == b.price
}

/// Strokes that are more extreme than both same-mark neighbours, in time
/// order.
pub fn potential_points(strokes: &[Stroke]) -> Vec<&Stroke> {
    let peaks: Vec<&Stroke> = strokes.iter().filter(|s| s.mark == Mark::Peak).collect();
    let troughs: Vec<&Stroke> = strokes.iter().filter(|s| s.mark == Mark::Trough).collect();

    let mut out: Vec<&Stroke> = Vec::new();
    out.extend(
        troughs
            .windows(3)
            .filter(|w| w[0].price > w[1].price && w[1].price < w[2].price)
            .map(|w| w[1]),
    );
    out.extend(
        peaks
            .windows(3)
            .filter(|w| w[0].price < w[1].price && w[1].price > w[2].price)
            .map(|w| w[1]),
    );
    out.sort_by_key(|s| s.dt);
    out
}

/// First pass: seeds with the first three strokes and follows the extreme
/// points of the stroke sequence.
pub fn build_candidates(strokes: &[Stroke]) -> Vec<Segment> {
    if strokes.len() < Const::MIN_SEGMENT_POINTS {
        return Vec::new();
    }
    let mut rows: Vec<Segment> = strokes[..3].iter().map(Segment::from_stroke).collect();
    let right = &strokes[2..];

    for candidate in potential_points(right) {
        let Some(last) = rows.last() else {
            break;
        };
        if last.mark == candidate.mark {
            if last.is_exceeded_by(candidate.price) {
                let replaced = Segment::from_stroke(candidate);
                if let Some(slot) = rows.last_mut() {
                    *slot = replaced;
                }
            }
            continue;
        }
        if last.is_contradicted_by(candidate) {
            continue;
        }
        let lo = index_at_or_after(right, last.dt);
        let hi = index_at_or_after(right, candidate.dt) + 1;
        if hi.saturating_sub(lo) < Const::MIN_SEGMENT_POINTS {
            continue;
        }
        rows.push(Segment::from_stroke(candidate));
    }
    rows
}

/// Second pass: keeps only points whose characteristic sequences confirm
/// them, then drops a trailing point already broken by the latest stroke.
pub fn refine(strokes: &[Stroke], candidates: Vec<Segment>) -> Vec<Segment> {
    if candidates.len() <= 4 {
        return candidates;
    }
    let idx: Vec<usize> = candidates
        .iter()
        .map(|c| index_at_or_after(strokes, c.dt))
        .collect();
    let n = candidates.len();

    let mut kept: Vec<&Segment> = Vec::new();
    for i in 1..n - 2 {
        if is_valid_point(strokes, idx[i - 1]..idx[i] + 1, idx[i]..idx[i + 1] + 1, idx[i + 2] + 1) {
            kept.push(&candidates[i]);
        } else {
            debug!(dt = %candidates[i].dt, "segment point rejected");
        }
    }
    if is_valid_point(strokes, idx[n - 3]..idx[n - 2] + 1, idx[n - 2]..idx[n - 1] + 1, strokes.len()) {
        kept.push(&candidates[n - 2]);
    }
    if strokes.len().saturating_sub(idx[n - 1]) >= Const::MIN_SEGMENT_POINTS {
        kept.push(&candidates[n - 1]);
    }

    let mut rows: Vec<Segment> = Vec::new();
    for point in kept {
        match rows.last_mut() {
            Some(last) if last.mark == point.mark => {
                if last.is_exceeded_by(point.price) {
                    *last = point.clone();
                }
            }
            _ => rows.push(point.clone()),
        }
    }

    if let (Some(last), Some(stroke)) = (rows.last(), strokes.last()) {
        if last.is_exceeded_by(stroke.price) {
            debug!(dt = %last.dt, "last segment point broken by latest stroke");
            rows.pop();
        }
    }
    rows
}
