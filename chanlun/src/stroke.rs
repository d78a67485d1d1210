//! 笔：相邻且交替的分型之间的连线。

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::bar::{Bar, MergedBar};
use crate::constant::{Const, Mark, PointState, StrokeBasis};
use crate::fractal::Fractal;
use crate::series::{Stateful, StructureSeries, Timestamped, count_between, index_after};
use crate::utils::first_changed_dt;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stroke {
    pub dt: DateTime<Utc>,
    pub mark: Mark,
    pub price: f64,
    pub start_dt: DateTime<Utc>,
    pub end_dt: DateTime<Utc>,
    pub high: f64,
    pub low: f64,
    pub state: PointState,
}

impl Stroke {
    pub fn from_fractal(fractal: &Fractal) -> Self {
        Self {
            dt: fractal.dt,
            mark: fractal.mark,
            price: fractal.price,
            start_dt: fractal.start_dt,
            end_dt: fractal.end_dt,
            high: fractal.high,
            low: fractal.low,
            state: PointState::Tentative,
        }
    }

    fn is_exceeded_by(&self, price: f64) -> bool {
        match self.mark {
            Mark::Peak => price > self.price,
            Mark::Trough => price < self.price,
        }
    }

    /// The opposite fractal's envelope must not nest inside this one.
    fn is_separated_from(&self, fractal: &Fractal) -> bool {
        match self.mark {
            Mark::Peak => fractal.low < self.low && fractal.high < self.high,
            Mark::Trough => fractal.high > self.high && fractal.low > self.low,
        }
    }
}

impl Timestamped for Stroke {
    fn dt(&self) -> DateTime<Utc> {
        self.dt
    }
}

impl Stateful for Stroke {
    fn set_state(&mut self, state: PointState) {
        self.state = state;
    }
}

#[derive(Debug)]
pub struct StrokeBuilder {
    rows: StructureSeries<Stroke>,
    basis: StrokeBasis,
}

impl StrokeBuilder {
    pub fn new(basis: StrokeBasis) -> Self {
        Self {
            rows: StructureSeries::new(),
            basis,
        }
    }

    pub fn basis(&self) -> StrokeBasis {
        self.basis
    }

    pub fn rows(&self) -> &[Stroke] {
        self.rows.as_slice()
    }

    pub fn clear(&mut self) {
        self.rows.clear();
    }

    pub fn trim_until(&mut self, dt: DateTime<Utc>) {
        self.rows.retain_after(dt);
        self.rows.refresh_states();
    }

    /// Re-derives the last stroke points from the fractal tail. Returns the
    /// timestamp of the first stroke point that differs from the previous
    /// state.
    pub fn update(
        &mut self,
        fractals: &[Fractal],
        raw: &[Bar],
        merged: &[MergedBar],
    ) -> Option<DateTime<Utc>> {
        let base = self.rows.len().saturating_sub(Const::STROKE_TAIL);
        let previous_tail = self.rows.truncate_tail(Const::STROKE_TAIL);

        if fractals.len() >= 2 {
            let start = match self.rows.last() {
                Some(last) => index_after(fractals, last.dt),
                None => {
                    self.rows.push(Stroke::from_fractal(&fractals[0]));
                    1
                }
            };
            for fractal in &fractals[start..] {
                self.accept(fractal, raw, merged);
            }
            self.drop_exceeded_tail(merged);
        } else {
            self.rows.clear();
        }
        self.rows.refresh_states();

        let base = base.min(self.rows.len());
        let current_tail = &self.rows.as_slice()[base..];
        first_changed_dt(&previous_tail, current_tail, same_point)
    }

    fn accept(&mut self, fractal: &Fractal, raw: &[Bar], merged: &[MergedBar]) {
        let Some(last) = self.rows.last() else {
            self.rows.push(Stroke::from_fractal(fractal));
            return;
        };

        if last.mark == fractal.mark {
            if last.is_exceeded_by(fractal.price) {
                debug!(from = %last.dt, to = %fractal.dt, "stroke point extended");
                self.rows.replace_last(Stroke::from_fractal(fractal));
            }
            return;
        }

        let between = match self.basis {
            StrokeBasis::Raw => count_between(raw, last.end_dt, fractal.start_dt),
            StrokeBasis::Merged => count_between(merged, last.end_dt, fractal.start_dt),
        };
        if between == 0 {
            debug!(dt = %fractal.dt, "candidate too close to last stroke point");
            return;
        }
        if !last.is_separated_from(fractal) {
            debug!(dt = %fractal.dt, "candidate envelope overlaps last stroke point");
            return;
        }
        self.rows.push(Stroke::from_fractal(fractal));
    }

    fn drop_exceeded_tail(&mut self, merged: &[MergedBar]) {
        let (Some(last), Some(bar)) = (self.rows.last(), merged.last()) else {
            return;
        };
        let extreme = match last.mark {
            Mark::Peak => bar.high,
            Mark::Trough => bar.low,
        };
        if last.is_exceeded_by(extreme) {
            debug!(dt = %last.dt, "last stroke point invalidated by newest bar");
            self.rows.pop();
        }
    }
}

fn same_point(a: &Stroke, b: &Stroke) -> bool {
    a.dt == b.dt && a.mark == b.mark && a.price == b.price
}

/// True when consecutive points alternate between peaks and troughs.
pub fn is_alternating<T, F>(rows: &[T], mark_of: F) -> bool
where
    F: Fn(&T) -> Mark,
{
    rows.windows(2).all(|pair| mark_of(&pair[0]) != mark_of(&pair[1]))
}
