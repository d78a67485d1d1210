//! 背驰：比较两段走势的MACD面积。

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::constant::{ChanError, Direction, Level};
use crate::indicator::MacdPoint;
use crate::series::range;

/// A closed time span measured for momentum.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PowerRange {
    pub start_dt: DateTime<Utc>,
    pub end_dt: DateTime<Utc>,
    pub direction: Direction,
}

impl PowerRange {
    pub fn new(start_dt: DateTime<Utc>, end_dt: DateTime<Utc>, direction: Direction) -> Self {
        Self {
            start_dt,
            end_dt,
            direction,
        }
    }

    fn check(&self, label: &str) -> Result<(), ChanError> {
        if self.start_dt < self.end_dt {
            Ok(())
        } else {
            Err(ChanError::InvalidRange(format!(
                "{label} range starts at {} but ends at {}",
                self.start_dt, self.end_dt
            )))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DivergenceVerdict {
    pub recent_power: f64,
    pub earlier_power: f64,
    pub adjust: f64,
    pub divergent: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct DivergenceAnalyzer {
    adjust: f64,
}

impl DivergenceAnalyzer {
    pub fn new(adjust: f64) -> Self {
        Self { adjust }
    }

    pub fn adjust(&self) -> f64 {
        self.adjust
    }

    /// Sum of absolute histogram values over the span. Segment level only
    /// counts bars whose histogram sign follows the span's direction.
    pub fn power(macd: &[MacdPoint], span: &PowerRange, level: Level) -> f64 {
        range(macd, span.start_dt, span.end_dt)
            .iter()
            .filter_map(|point| point.macd)
            .filter(|value| match level {
                Level::Stroke => true,
                Level::Segment => match span.direction {
                    Direction::Up => *value > 0.0,
                    Direction::Down => *value < 0.0,
                },
            })
            .map(f64::abs)
            .sum()
    }

    pub fn compare(
        &self,
        macd: &[MacdPoint],
        recent: &PowerRange,
        earlier: &PowerRange,
        level: Level,
        last_n: Option<usize>,
    ) -> Result<DivergenceVerdict, ChanError> {
        recent.check("recent")?;
        earlier.check("earlier")?;
        if recent.start_dt <= earlier.end_dt {
            return Err(ChanError::InvalidRange(format!(
                "recent range starts at {} before earlier range ends at {}",
                recent.start_dt, earlier.end_dt
            )));
        }

        // zero means no limit
        let scope = match last_n {
            Some(n) if n > 0 => &macd[macd.len().saturating_sub(n)..],
            _ => macd,
        };
        let recent_power = Self::power(scope, recent, level);
        let earlier_power = Self::power(scope, earlier, level);
        Ok(DivergenceVerdict {
            recent_power,
            earlier_power,
            adjust: self.adjust,
            divergent: recent_power < earlier_power * self.adjust,
        })
    }

    pub fn is_divergent(
        &self,
        macd: &[MacdPoint],
        recent: &PowerRange,
        earlier: &PowerRange,
        level: Level,
        last_n: Option<usize>,
    ) -> Result<bool, ChanError> {
        self.compare(macd, recent, earlier, level, last_n)
            .map(|verdict| verdict.divergent)
    }
}

/// A span between two structure points with its momentum.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Move {
    pub start_dt: DateTime<Utc>,
    pub end_dt: DateTime<Utc>,
    pub power: f64,
    pub direction: Direction,
    pub high: f64,
    pub low: f64,
    pub level: Level,
}

impl Move {
    pub fn span(&self) -> PowerRange {
        PowerRange::new(self.start_dt, self.end_dt, self.direction)
    }
}
