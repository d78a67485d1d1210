//! 特征序列：线段端点有效性检验。

use std::ops::Range;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::constant::{Const, Direction, Mark};
use crate::stroke::Stroke;
use crate::utils::{max_f64, min_f64};

/// One element of a standardized characteristic sequence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FeatureRange {
    pub start_dt: DateTime<Utc>,
    pub end_dt: DateTime<Utc>,
    pub high: f64,
    pub low: f64,
}

impl FeatureRange {
    fn contains_or_within(&self, other: &Self) -> bool {
        (self.high >= other.high && self.low <= other.low)
            || (self.high <= other.high && self.low >= other.low)
    }
}

/// Characteristic sequence of a stroke run, with containment merged.
///
/// Ranges are taken from points (1,2), (3,4), ... of the run, i.e. the
/// strokes that move against the run's direction.
pub fn standardize(points: &[Stroke]) -> Vec<FeatureRange> {
    let Some(first) = points.first() else {
        return Vec::new();
    };
    let direction = match first.mark {
        Mark::Trough => Direction::Up,
        Mark::Peak => Direction::Down,
    };

    let mut out: Vec<FeatureRange> = Vec::new();
    let mut idx = 1;
    while idx + 1 < points.len() {
        let (a, b) = (&points[idx], &points[idx + 1]);
        let range = FeatureRange {
            start_dt: a.dt,
            end_dt: b.dt,
            high: a.price.max(b.price),
            low: a.price.min(b.price),
        };
        idx += 2;

        match out.last_mut() {
            Some(last) if last.contains_or_within(&range) => {
                let (high, low) = match direction {
                    Direction::Up => (last.high.max(range.high), last.low.max(range.low)),
                    Direction::Down => (last.high.min(range.high), last.low.min(range.low)),
                };
                last.high = high;
                last.low = low;
                last.end_dt = range.end_dt;
            }
            _ => out.push(range),
        }
    }
    out
}

/// Whether the segment point at `seq2.start` holds, given the two segment
/// spans around it (inclusive stroke runs `seq1 = [S1, S2]`,
/// `seq2 = [S2, S3]`) and the stroke index `end` where the following run
/// stops (exclusive).
pub fn is_valid_point(strokes: &[Stroke], seq1: Range<usize>, seq2: Range<usize>, end: usize) -> bool {
    let (Some(run1), Some(run2)) = (strokes.get(seq1), strokes.get(seq2.clone())) else {
        return false;
    };
    let std1 = standardize(run1);
    if std1.is_empty() || run2.len() < Const::MIN_SEGMENT_POINTS {
        return false;
    }

    let origin = &run2[0];
    let first_turn = run2[1].price;
    let closing = run2[run2.len() - 1].price;
    let extended = match strokes.get(seq2.start..end.max(seq2.end)) {
        Some(run) => run,
        None => return false,
    };

    match origin.mark {
        Mark::Trough => {
            let floor = min_f64(std1.iter().map(|r| r.low)).unwrap_or(f64::INFINITY);
            if first_turn >= floor {
                closing >= first_turn
            } else {
                holds_after_break(extended, origin, Mark::Peak)
            }
        }
        Mark::Peak => {
            let ceiling = max_f64(std1.iter().map(|r| r.high)).unwrap_or(f64::NEG_INFINITY);
            if first_turn <= ceiling {
                closing <= first_turn
            } else {
                holds_after_break(extended, origin, Mark::Trough)
            }
        }
    }
}

/// The run broke through the prior characteristic sequence at once; the
/// point holds only if the extended run forms a turning triple that never
/// crosses back over the origin.
fn holds_after_break(extended: &[Stroke], origin: &Stroke, turn: Mark) -> bool {
    let std2 = standardize(extended);
    if std2.len() < 3 {
        return false;
    }
    let mut found = false;
    for triple in std2.windows(3) {
        let (a, b, c) = (&triple[0], &triple[1], &triple[2]);
        match turn {
            Mark::Peak if a.high < b.high && b.high > c.high => {
                found = true;
                let low = a.low.min(b.low).min(c.low);
                if low < origin.price {
                    return false;
                }
            }
            Mark::Trough if a.low > b.low && b.low < c.low => {
                found = true;
                let high = a.high.max(b.high).max(c.high);
                if high > origin.price {
                    return false;
                }
            }
            _ => {}
        }
    }
    found
}
