use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::constant::Direction;
use crate::series::Timestamped;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bar {
    pub symbol: String,
    /// Open timestamp.
    pub dt: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    pub fn body(&self) -> f64 {
        (self.close - self.open).abs()
    }

    pub fn total_range(&self) -> f64 {
        self.high - self.low
    }

    pub fn is_falling(&self) -> bool {
        self.open >= self.close
    }
}

impl Timestamped for Bar {
    fn dt(&self) -> DateTime<Utc> {
        self.dt
    }
}

/// One or more raw bars with containment removed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergedBar {
    pub start_dt: DateTime<Utc>,
    pub dt: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub elements: usize,
}

impl MergedBar {
    pub fn from_bar(bar: &Bar) -> Self {
        Self {
            start_dt: bar.dt,
            dt: bar.dt,
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            volume: bar.volume,
            elements: 1,
        }
    }

    /// Either range nests inside the other; equal bounds count.
    pub fn is_inclusive(&self, high: f64, low: f64) -> bool {
        (self.high >= high && self.low <= low) || (self.high <= high && self.low >= low)
    }

    /// Folds a contained raw bar in, keeping the color of the incoming bar.
    pub fn absorb(&self, bar: &Bar, direction: Direction) -> Self {
        let (high, low) = match direction {
            Direction::Up => (self.high.max(bar.high), self.low.max(bar.low)),
            Direction::Down => (self.high.min(bar.high), self.low.min(bar.low)),
        };
        let (open, close) = if bar.is_falling() {
            (high, low)
        } else {
            (low, high)
        };
        Self {
            start_dt: self.start_dt,
            dt: bar.dt,
            open,
            high,
            low,
            close,
            volume: bar.volume,
            elements: self.elements + 1,
        }
    }
}

impl Timestamped for MergedBar {
    fn dt(&self) -> DateTime<Utc> {
        self.dt
    }
}

/// Price gap between two merged bars, tolerating `margin` of relative overlap.
pub(crate) fn has_gap(a: &MergedBar, b: &MergedBar, margin: f64) -> bool {
    a.high < b.low * (1.0 - margin) || b.high < a.low * (1.0 - margin)
}
