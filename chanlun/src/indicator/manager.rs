use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::bar::Bar;
use crate::constant::{ChanError, Const};
use crate::series::{StructureSeries, Timestamped};

use super::core::{MacdValue, MomentumRoutine};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MaPoint {
    pub dt: DateTime<Utc>,
    /// `(period, value)` per configured period.
    pub values: Vec<(usize, Option<f64>)>,
}

impl MaPoint {
    pub fn value(&self, period: usize) -> Option<f64> {
        self.values
            .iter()
            .find(|(p, _)| *p == period)
            .and_then(|(_, v)| *v)
    }
}

impl Timestamped for MaPoint {
    fn dt(&self) -> DateTime<Utc> {
        self.dt
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MacdPoint {
    pub dt: DateTime<Utc>,
    pub diff: Option<f64>,
    pub dea: Option<f64>,
    pub macd: Option<f64>,
}

impl MacdPoint {
    fn new(dt: DateTime<Utc>, value: MacdValue) -> Self {
        Self {
            dt,
            diff: value.diff,
            dea: value.dea,
            macd: value.macd,
        }
    }
}

impl Timestamped for MacdPoint {
    fn dt(&self) -> DateTime<Utc> {
        self.dt
    }
}

/// Moving averages and MACD kept in lockstep with the raw bars.
pub struct MomentumTracker {
    routine: Arc<dyn MomentumRoutine>,
    ma_periods: Vec<usize>,
    macd_params: (usize, usize, usize),
    ma: StructureSeries<MaPoint>,
    macd: StructureSeries<MacdPoint>,
}

impl MomentumTracker {
    pub fn new(
        routine: Arc<dyn MomentumRoutine>,
        ma_periods: Vec<usize>,
        macd_params: (usize, usize, usize),
    ) -> Self {
        Self {
            routine,
            ma_periods,
            macd_params,
            ma: StructureSeries::new(),
            macd: StructureSeries::new(),
        }
    }

    pub fn routine(&self) -> &dyn MomentumRoutine {
        self.routine.as_ref()
    }

    pub fn ma(&self) -> &[MaPoint] {
        self.ma.as_slice()
    }

    pub fn macd(&self) -> &[MacdPoint] {
        self.macd.as_slice()
    }

    pub fn clear(&mut self) {
        self.ma.clear();
        self.macd.clear();
    }

    pub fn trim_until(&mut self, dt: DateTime<Utc>) {
        self.ma.retain_after(dt);
        self.macd.retain_after(dt);
    }

    /// Full pass over the whole history.
    pub fn rebuild(&mut self, bars: &[Bar]) -> Result<(), ChanError> {
        let closes: Vec<f64> = bars.iter().map(|bar| bar.close).collect();
        let columns: Vec<(usize, Vec<Option<f64>>)> = self
            .ma_periods
            .iter()
            .map(|period| (*period, self.routine.sma(&closes, *period)))
            .collect();
        let (fast, slow, signal) = self.macd_params;
        let macd = self.routine.macd(&closes, fast, slow, signal);

        let mut ma_rows = Vec::with_capacity(bars.len());
        let mut macd_rows = Vec::with_capacity(bars.len());
        for (idx, bar) in bars.iter().enumerate() {
            ma_rows.push(MaPoint {
                dt: bar.dt,
                values: columns
                    .iter()
                    .map(|(period, values)| (*period, values.get(idx).copied().flatten()))
                    .collect(),
            });
            macd_rows.push(MacdPoint::new(
                bar.dt,
                macd.get(idx).copied().unwrap_or_default(),
            ));
        }
        self.ma.replace_all(ma_rows);
        self.macd.replace_all(macd_rows);
        self.check_alignment(bars)
    }

    /// Recomputes the newest point over a bounded trailing window, appending
    /// it or overwriting the last point when the newest bar was replaced.
    pub fn update(&mut self, bars: &[Bar]) -> Result<(), ChanError> {
        let Some(last_bar) = bars.last() else {
            return Ok(());
        };
        if self.macd.is_empty() {
            return self.rebuild(bars);
        }

        let longest = self.ma_periods.iter().copied().max().unwrap_or(0);
        let window = Const::MOMENTUM_WINDOW.max(longest);
        let start = bars.len().saturating_sub(window);
        let closes: Vec<f64> = bars[start..].iter().map(|bar| bar.close).collect();

        let ma_point = MaPoint {
            dt: last_bar.dt,
            values: self
                .ma_periods
                .iter()
                .map(|period| {
                    let values = self.routine.sma(&closes, *period);
                    (*period, values.last().copied().flatten())
                })
                .collect(),
        };
        let (fast, slow, signal) = self.macd_params;
        let macd_value = self
            .routine
            .macd(&closes, fast, slow, signal)
            .last()
            .copied()
            .unwrap_or_default();
        let macd_point = MacdPoint::new(last_bar.dt, macd_value);

        let previous_bar_dt = bars.len().checked_sub(2).map(|idx| bars[idx].dt);
        let appended = self.macd.last().map(|point| point.dt) == previous_bar_dt;
        if appended {
            self.ma.push(ma_point);
            self.macd.push(macd_point);
        } else {
            debug!(dt = %last_bar.dt, "momentum point overwritten");
            self.ma.replace_last(ma_point);
            self.macd.replace_last(macd_point);
        }
        self.check_alignment(bars)
    }

    fn check_alignment(&self, bars: &[Bar]) -> Result<(), ChanError> {
        if bars.len() < 2 {
            return Ok(());
        }
        let expected = bars[bars.len() - 2].dt;
        for found in [
            self.macd.as_slice().iter().rev().nth(1).map(|p| p.dt),
            self.ma.as_slice().iter().rev().nth(1).map(|p| p.dt),
        ] {
            match found {
                Some(found) if found == expected => {}
                Some(found) => return Err(ChanError::MomentumDesync { expected, found }),
                None => {
                    return Err(ChanError::MomentumDesync {
                        expected,
                        found: bars[bars.len() - 1].dt,
                    });
                }
            }
        }
        Ok(())
    }
}
