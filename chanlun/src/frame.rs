//! 表格输出：以 polars DataFrame 形式导出各级结构。

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use polars::df;
use polars::prelude::{DataFrame, NamedFrom, Series};

use crate::analyzer::Analyzer;
use crate::constant::{ChanError, Mark};
use crate::pivot::Breakout;

/// Which bars the annotated frame is built on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameBasis {
    #[default]
    Raw,
    Merged,
}

#[derive(Debug, Clone)]
pub struct FrameOptions {
    pub basis: FrameBasis,
    pub ma_periods: Vec<usize>,
    pub with_macd: bool,
    pub max_count: usize,
}

impl Default for FrameOptions {
    fn default() -> Self {
        Self {
            basis: FrameBasis::Raw,
            ma_periods: vec![5, 20],
            with_macd: false,
            max_count: 1000,
        }
    }
}

struct FrameRow {
    dt: DateTime<Utc>,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

fn millis(dt: DateTime<Utc>) -> i64 {
    dt.timestamp_millis()
}

fn mark_code(mark: Mark) -> i32 {
    match mark {
        Mark::Peak => 1,
        Mark::Trough => -1,
    }
}

fn tail<T>(rows: &[T], n: usize) -> &[T] {
    &rows[rows.len().saturating_sub(n)..]
}

impl Analyzer {
    /// The last `max_count` bars annotated with fractal, stroke and segment
    /// prices, moving averages and optionally MACD over the same closes.
    pub fn kline_frame(&self, options: &FrameOptions) -> Result<DataFrame, ChanError> {
        let rows: Vec<FrameRow> = match options.basis {
            FrameBasis::Raw => tail(self.bars(), options.max_count)
                .iter()
                .map(|b| FrameRow {
                    dt: b.dt,
                    open: b.open,
                    high: b.high,
                    low: b.low,
                    close: b.close,
                    volume: b.volume,
                })
                .collect(),
            FrameBasis::Merged => tail(self.merged(), options.max_count)
                .iter()
                .map(|b| FrameRow {
                    dt: b.dt,
                    open: b.open,
                    high: b.high,
                    low: b.low,
                    close: b.close,
                    volume: b.volume,
                })
                .collect(),
        };

        let fractals: HashMap<DateTime<Utc>, (Mark, f64)> = tail(self.fractals(), options.max_count / 2)
            .iter()
            .map(|f| (f.dt, (f.mark, f.price)))
            .collect();
        let strokes: HashMap<DateTime<Utc>, f64> = tail(self.strokes(), options.max_count / 4)
            .iter()
            .map(|s| (s.dt, s.price))
            .collect();
        let segments: HashMap<DateTime<Utc>, f64> = tail(self.segments(), options.max_count / 8)
            .iter()
            .map(|s| (s.dt, s.price))
            .collect();

        let closes: Vec<f64> = rows.iter().map(|r| r.close).collect();
        let mut columns = vec![
            Series::new("dt", rows.iter().map(|r| millis(r.dt)).collect::<Vec<i64>>()),
            Series::new("open", rows.iter().map(|r| r.open).collect::<Vec<f64>>()),
            Series::new("high", rows.iter().map(|r| r.high).collect::<Vec<f64>>()),
            Series::new("low", rows.iter().map(|r| r.low).collect::<Vec<f64>>()),
            Series::new("close", closes.clone()),
            Series::new("volume", rows.iter().map(|r| r.volume).collect::<Vec<f64>>()),
            Series::new(
                "fx_mark",
                rows.iter()
                    .map(|r| fractals.get(&r.dt).map_or(0, |(mark, _)| mark_code(*mark)))
                    .collect::<Vec<i32>>(),
            ),
            Series::new(
                "fx",
                rows.iter()
                    .map(|r| fractals.get(&r.dt).map(|(_, price)| *price))
                    .collect::<Vec<Option<f64>>>(),
            ),
            Series::new(
                "bi",
                rows.iter().map(|r| strokes.get(&r.dt).copied()).collect::<Vec<Option<f64>>>(),
            ),
            Series::new(
                "xd",
                rows.iter().map(|r| segments.get(&r.dt).copied()).collect::<Vec<Option<f64>>>(),
            ),
        ];

        let routine = self.momentum_routine();
        for period in &options.ma_periods {
            columns.push(Series::new(&format!("ma{period}"), routine.sma(&closes, *period)));
        }
        if options.with_macd {
            let (fast, slow, signal) = self.config().macd_params();
            let values = routine.macd(&closes, fast, slow, signal);
            columns.push(Series::new("diff", values.iter().map(|v| v.diff).collect::<Vec<_>>()));
            columns.push(Series::new("dea", values.iter().map(|v| v.dea).collect::<Vec<_>>()));
            columns.push(Series::new("macd", values.iter().map(|v| v.macd).collect::<Vec<_>>()));
        }

        Ok(DataFrame::new(columns)?)
    }

    pub fn merged_frame(&self) -> Result<DataFrame, ChanError> {
        let rows = self.merged();
        Ok(df!(
            "start_dt" => rows.iter().map(|r| millis(r.start_dt)).collect::<Vec<i64>>(),
            "dt" => rows.iter().map(|r| millis(r.dt)).collect::<Vec<i64>>(),
            "open" => rows.iter().map(|r| r.open).collect::<Vec<f64>>(),
            "high" => rows.iter().map(|r| r.high).collect::<Vec<f64>>(),
            "low" => rows.iter().map(|r| r.low).collect::<Vec<f64>>(),
            "close" => rows.iter().map(|r| r.close).collect::<Vec<f64>>(),
            "volume" => rows.iter().map(|r| r.volume).collect::<Vec<f64>>(),
            "elements" => rows.iter().map(|r| r.elements as u32).collect::<Vec<u32>>()
        )?)
    }

    pub fn fractal_frame(&self) -> Result<DataFrame, ChanError> {
        let rows = self.fractals();
        Ok(df!(
            "dt" => rows.iter().map(|r| millis(r.dt)).collect::<Vec<i64>>(),
            "mark" => rows.iter().map(|r| mark_code(r.mark)).collect::<Vec<i32>>(),
            "price" => rows.iter().map(|r| r.price).collect::<Vec<f64>>(),
            "start_dt" => rows.iter().map(|r| millis(r.start_dt)).collect::<Vec<i64>>(),
            "end_dt" => rows.iter().map(|r| millis(r.end_dt)).collect::<Vec<i64>>(),
            "high" => rows.iter().map(|r| r.high).collect::<Vec<f64>>(),
            "low" => rows.iter().map(|r| r.low).collect::<Vec<f64>>()
        )?)
    }

    pub fn stroke_frame(&self) -> Result<DataFrame, ChanError> {
        let rows = self.strokes();
        Ok(df!(
            "dt" => rows.iter().map(|r| millis(r.dt)).collect::<Vec<i64>>(),
            "mark" => rows.iter().map(|r| mark_code(r.mark)).collect::<Vec<i32>>(),
            "price" => rows.iter().map(|r| r.price).collect::<Vec<f64>>(),
            "high" => rows.iter().map(|r| r.high).collect::<Vec<f64>>(),
            "low" => rows.iter().map(|r| r.low).collect::<Vec<f64>>(),
            "confirmed" => (0..rows.len()).map(|i| i + 1 < rows.len()).collect::<Vec<bool>>()
        )?)
    }

    pub fn segment_frame(&self) -> Result<DataFrame, ChanError> {
        let rows = self.segments();
        Ok(df!(
            "dt" => rows.iter().map(|r| millis(r.dt)).collect::<Vec<i64>>(),
            "mark" => rows.iter().map(|r| mark_code(r.mark)).collect::<Vec<i32>>(),
            "price" => rows.iter().map(|r| r.price).collect::<Vec<f64>>(),
            "confirmed" => (0..rows.len()).map(|i| i + 1 < rows.len()).collect::<Vec<bool>>()
        )?)
    }

    pub fn pivot_frame(&self) -> Result<DataFrame, ChanError> {
        let rows = self.pivots();
        Ok(df!(
            "start_dt" => rows.iter().map(|r| millis(r.start.dt)).collect::<Vec<i64>>(),
            "end_dt" => rows.iter().map(|r| r.end.map(|p| millis(p.dt))).collect::<Vec<Option<i64>>>(),
            "zg" => rows.iter().map(|r| r.zg).collect::<Vec<f64>>(),
            "zd" => rows.iter().map(|r| r.zd).collect::<Vec<f64>>(),
            "gg" => rows.iter().map(|r| r.gg).collect::<Vec<f64>>(),
            "dd" => rows.iter().map(|r| r.dd).collect::<Vec<f64>>(),
            "points" => rows.iter().map(|r| r.points.len() as u32).collect::<Vec<u32>>(),
            "finished" => rows.iter().map(|r| r.finished).collect::<Vec<bool>>(),
            "breakout" => rows
                .iter()
                .map(|r| match r.breakout {
                    Some(Breakout::ThirdBuy(_)) => 1,
                    Some(Breakout::ThirdSell(_)) => -1,
                    None => 0,
                })
                .collect::<Vec<i32>>()
        )?)
    }
}
