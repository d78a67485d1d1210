//! 中枢：滑动窗口识别，三买/三卖突破时完成。

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::constant::{Const, Direction, Mark, PivotBasis};
use crate::segment::Segment;
use crate::series::{StructureSeries, Timestamped};
use crate::stroke::Stroke;
use crate::utils::{first_changed_dt, max_f64, min_f64};

/// A stroke or segment point as seen by the pivot detector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PivotPoint {
    pub dt: DateTime<Utc>,
    pub mark: Mark,
    pub price: f64,
}

impl From<&Stroke> for PivotPoint {
    fn from(stroke: &Stroke) -> Self {
        Self {
            dt: stroke.dt,
            mark: stroke.mark,
            price: stroke.price,
        }
    }
}

impl From<&Segment> for PivotPoint {
    fn from(segment: &Segment) -> Self {
        Self {
            dt: segment.dt,
            mark: segment.mark,
            price: segment.price,
        }
    }
}

impl Timestamped for PivotPoint {
    fn dt(&self) -> DateTime<Utc> {
        self.dt
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PivotLeg {
    pub start_dt: DateTime<Utc>,
    pub end_dt: DateTime<Utc>,
    pub high: f64,
    pub low: f64,
    pub mid: f64,
    pub direction: Direction,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum Breakout {
    ThirdBuy(PivotPoint),
    ThirdSell(PivotPoint),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Pivot {
    pub zg: f64,
    pub zd: f64,
    pub g: f64,
    pub gg: f64,
    pub d: f64,
    pub dd: f64,
    pub start: PivotPoint,
    pub end: Option<PivotPoint>,
    pub points: Vec<PivotPoint>,
    pub zn: Vec<PivotLeg>,
    pub extending: bool,
    pub finished: bool,
    pub breakout: Option<Breakout>,
}

impl Pivot {
    fn from_window(
        window: &[PivotPoint],
        bounds: (f64, f64),
        extending: bool,
        breakout: Option<Breakout>,
    ) -> Option<Self> {
        let (zd, zg) = bounds;
        let start = *window.first()?;
        let peaks = window.iter().filter(|p| p.mark == Mark::Peak).map(|p| p.price);
        let troughs = window.iter().filter(|p| p.mark == Mark::Trough).map(|p| p.price);
        let finished = breakout.is_some();
        Some(Self {
            zg,
            zd,
            g: min_f64(peaks.clone())?,
            gg: max_f64(peaks)?,
            d: max_f64(troughs.clone())?,
            dd: min_f64(troughs)?,
            start,
            end: if finished { window.last().copied() } else { None },
            points: window.to_vec(),
            zn: legs(&window[1..]),
            extending,
            finished,
            breakout,
        })
    }
}

impl Timestamped for Pivot {
    fn dt(&self) -> DateTime<Utc> {
        self.start.dt
    }
}

/// `(zd, zg)` from the first four points of the window.
fn zone_bounds(window: &[PivotPoint]) -> Option<(f64, f64)> {
    let seed = &window[..window.len().min(Const::PIVOT_SEED_POINTS)];
    let zd = max_f64(seed.iter().filter(|p| p.mark == Mark::Trough).map(|p| p.price))?;
    let zg = min_f64(seed.iter().filter(|p| p.mark == Mark::Peak).map(|p| p.price))?;
    Some((zd, zg))
}

fn legs(points: &[PivotPoint]) -> Vec<PivotLeg> {
    points
        .chunks_exact(2)
        .map(|pair| {
            let (a, b) = (pair[0], pair[1]);
            let high = a.price.max(b.price);
            let low = a.price.min(b.price);
            PivotLeg {
                start_dt: a.dt,
                end_dt: b.dt,
                high,
                low,
                mid: low + (high - low) / 2.0,
                direction: match a.mark {
                    Mark::Trough => Direction::Up,
                    Mark::Peak => Direction::Down,
                },
            }
        })
        .collect()
}

/// Scans `points` once and returns every pivot, the unfinished one last.
pub fn detect(points: &[PivotPoint]) -> Vec<Pivot> {
    let mut pivots = Vec::new();
    if points.len() < 3 {
        return pivots;
    }

    let mut window: VecDeque<PivotPoint> = VecDeque::new();
    let mut extending = false;
    for point in points {
        if window.len() < Const::PIVOT_SEED_POINTS {
            window.push_back(*point);
            continue;
        }
        let bounds = zone_bounds(window.make_contiguous());
        let Some((zd, zg)) = bounds.filter(|(zd, zg)| zg > zd) else {
            window.push_back(*point);
            window.pop_front();
            continue;
        };

        let breakout = match point.mark {
            Mark::Trough if point.price > zg => Some(Breakout::ThirdBuy(*point)),
            Mark::Peak if point.price < zd => Some(Breakout::ThirdSell(*point)),
            _ => None,
        };
        if breakout.is_some() {
            if let Some(pivot) =
                Pivot::from_window(window.make_contiguous(), (zd, zg), extending, breakout)
            {
                info!(start = %pivot.start.dt, zg, zd, "pivot finished");
                pivots.push(pivot);
            }
            window.clear();
            extending = false;
        } else {
            window.push_back(*point);
            extending = true;
        }
    }

    if window.len() >= Const::PIVOT_UNFINISHED_POINTS {
        let slice = window.make_contiguous();
        if let Some(bounds) = zone_bounds(slice).filter(|(zd, zg)| zg > zd) {
            if let Some(pivot) = Pivot::from_window(slice, bounds, extending, None) {
                debug!(start = %pivot.start.dt, "pivot still forming");
                pivots.push(pivot);
            }
        }
    }
    pivots
}

#[derive(Debug)]
pub struct PivotDetector {
    rows: StructureSeries<Pivot>,
    basis: PivotBasis,
}

impl PivotDetector {
    pub fn new(basis: PivotBasis) -> Self {
        Self {
            rows: StructureSeries::new(),
            basis,
        }
    }

    pub fn basis(&self) -> PivotBasis {
        self.basis
    }

    pub fn rows(&self) -> &[Pivot] {
        self.rows.as_slice()
    }

    pub fn clear(&mut self) {
        self.rows.clear();
    }

    pub fn trim_until(&mut self, dt: DateTime<Utc>) {
        self.rows.retain_after(dt);
    }

    /// Re-detects pivots over the configured basis and returns the start of
    /// the first pivot that differs from the previous state.
    pub fn update(&mut self, strokes: &[Stroke], segments: &[Segment]) -> Option<DateTime<Utc>> {
        let points: Vec<PivotPoint> = match self.basis {
            PivotBasis::Segment => segments.iter().map(PivotPoint::from).collect(),
            PivotBasis::Stroke => strokes.iter().map(PivotPoint::from).collect(),
        };
        let previous = self.rows.truncate_tail(self.rows.len());
        self.rows.replace_all(detect(&points));

        let current = self.rows.as_slice();
        first_changed_dt(&previous, current, |a, b| a == b)
    }
}

/// Finished pivots keep their core inside their extremes.
pub fn is_sound(pivot: &Pivot) -> bool {
    let peaks_ok = pivot
        .points
        .iter()
        .filter(|p| p.mark == Mark::Peak)
        .all(|p| p.price >= pivot.g && p.price <= pivot.gg);
    let troughs_ok = pivot
        .points
        .iter()
        .filter(|p| p.mark == Mark::Trough)
        .all(|p| p.price >= pivot.dd && p.price <= pivot.d);
    (!pivot.finished || pivot.zg > pivot.zd) && peaks_ok && troughs_ok
}
