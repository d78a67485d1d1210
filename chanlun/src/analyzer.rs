use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::bar::{Bar, MergedBar};
use crate::config::AnalyzerConfig;
use crate::constant::{
    BarUpdate, ChanError, Const, Direction, EventType, Level, Mark, SectionKind, Timeframe,
};
use crate::divergence::{DivergenceAnalyzer, DivergenceVerdict, Move, PowerRange};
use crate::events::{EventPayload, Observable, Subscriber, SubscriptionId};
use crate::fractal::{Fractal, FractalDetector};
use crate::indicator::{MaPoint, MacdPoint, MomentumRoutine, MomentumTracker, TalibRoutine};
use crate::merger::BarMerger;
use crate::pivot::{Pivot, PivotDetector};
use crate::segment::{Segment, SegmentBuilder};
use crate::series::{StructureSeries, Timestamped, index_at_or_after, range};
use crate::stroke::{Stroke, StrokeBuilder};

/// Earliest changed timestamp per stage after one update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageChanges {
    pub merged: Option<DateTime<Utc>>,
    pub fractal: Option<DateTime<Utc>>,
    pub stroke: Option<DateTime<Utc>>,
    pub segment: Option<DateTime<Utc>>,
    pub pivot: Option<DateTime<Utc>>,
    pub trimmed: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Section<'a> {
    Merged(&'a [MergedBar]),
    Fractal(&'a [Fractal]),
    Stroke(&'a [Stroke]),
    Segment(&'a [Segment]),
}

impl Section<'_> {
    pub fn len(&self) -> usize {
        match self {
            Self::Merged(rows) => rows.len(),
            Self::Fractal(rows) => rows.len(),
            Self::Stroke(rows) => rows.len(),
            Self::Segment(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisSnapshot {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub bars: Vec<Bar>,
    pub merged: Vec<MergedBar>,
    pub fractals: Vec<Fractal>,
    pub strokes: Vec<Stroke>,
    pub segments: Vec<Segment>,
    pub pivots: Vec<Pivot>,
    pub ma: Vec<MaPoint>,
    pub macd: Vec<MacdPoint>,
}

/// Incremental structure pipeline for one symbol at one timeframe.
pub struct Analyzer {
    symbol: String,
    timeframe: Timeframe,
    config: AnalyzerConfig,
    bars: StructureSeries<Bar>,
    momentum: MomentumTracker,
    merger: BarMerger,
    fractals: FractalDetector,
    strokes: StrokeBuilder,
    segments: SegmentBuilder,
    pivots: PivotDetector,
    divergence: DivergenceAnalyzer,
    observable: Observable,
    last_changes: StageChanges,
}

impl Analyzer {
    pub fn new(symbol: impl Into<String>, timeframe: Timeframe) -> Self {
        Self::with_config(symbol, timeframe, AnalyzerConfig::default())
    }

    pub fn with_config(symbol: impl Into<String>, timeframe: Timeframe, config: AnalyzerConfig) -> Self {
        Self::with_routine(symbol, timeframe, config, Arc::new(TalibRoutine))
    }

    pub fn with_routine(
        symbol: impl Into<String>,
        timeframe: Timeframe,
        config: AnalyzerConfig,
        routine: Arc<dyn MomentumRoutine>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            timeframe,
            momentum: MomentumTracker::new(routine, config.ma_periods.clone(), config.macd_params()),
            merger: BarMerger::new(),
            fractals: FractalDetector::new(config.gap_margin),
            strokes: StrokeBuilder::new(config.stroke_basis),
            segments: SegmentBuilder::new(),
            pivots: PivotDetector::new(config.pivot_basis),
            divergence: DivergenceAnalyzer::new(config.divergence_adjust),
            bars: StructureSeries::new(),
            observable: Observable::default(),
            last_changes: StageChanges::default(),
            config,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    pub fn bars(&self) -> &[Bar] {
        self.bars.as_slice()
    }

    pub fn merged(&self) -> &[MergedBar] {
        self.merger.rows()
    }

    pub fn fractals(&self) -> &[Fractal] {
        self.fractals.rows()
    }

    pub fn strokes(&self) -> &[Stroke] {
        self.strokes.rows()
    }

    pub fn segments(&self) -> &[Segment] {
        self.segments.rows()
    }

    pub fn pivots(&self) -> &[Pivot] {
        self.pivots.rows()
    }

    pub fn ma(&self) -> &[MaPoint] {
        self.momentum.ma()
    }

    pub fn macd(&self) -> &[MacdPoint] {
        self.momentum.macd()
    }

    pub fn momentum_routine(&self) -> &dyn MomentumRoutine {
        self.momentum.routine()
    }

    pub fn last_changes(&self) -> StageChanges {
        self.last_changes
    }

    pub fn subscribe(&mut self, event_type: Option<EventType>, subscriber: Subscriber) -> SubscriptionId {
        self.observable.subscribe(event_type, subscriber)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.observable.unsubscribe(id)
    }

    /// Feeds one bar. A bar sharing the newest timestamp replaces it.
    pub fn update(&mut self, bar: Bar) -> Result<BarUpdate, ChanError> {
        let kind = match self.bars.last() {
            Some(last) if bar.dt < last.dt => {
                return Err(ChanError::NonMonotonicBar {
                    last: last.dt,
                    incoming: bar.dt,
                });
            }
            Some(last) if bar.dt == last.dt => BarUpdate::Replaced,
            _ => BarUpdate::Appended,
        };
        let dt = bar.dt;
        let displaced = match kind {
            BarUpdate::Appended => {
                self.bars.push(bar);
                None
            }
            BarUpdate::Replaced => {
                let previous = self.bars.last().cloned();
                self.bars.replace_last(bar);
                previous
            }
        };

        if let Err(err) = self.momentum.update(self.bars.as_slice()) {
            self.roll_back(displaced);
            return Err(err);
        }
        let mut changes = self.recompute();
        changes.trimmed = self.trim_history();
        self.last_changes = changes;

        let event = match kind {
            BarUpdate::Appended => EventType::BarAppended,
            BarUpdate::Replaced => EventType::BarReplaced,
        };
        self.publish(Some((event, dt)), changes);
        Ok(kind)
    }

    /// Replaces the whole history and derives every structure in one pass.
    pub fn reset(&mut self, bars: Vec<Bar>) -> Result<(), ChanError> {
        if let Some(pair) = bars.windows(2).find(|pair| pair[1].dt <= pair[0].dt) {
            return Err(ChanError::NonMonotonicBar {
                last: pair[0].dt,
                incoming: pair[1].dt,
            });
        }

        self.merger.clear();
        self.fractals.clear();
        self.strokes.clear();
        self.segments.clear();
        self.pivots.clear();
        self.momentum.clear();
        self.bars.replace_all(bars);

        self.momentum.rebuild(self.bars.as_slice())?;
        let changes = self.recompute();
        self.last_changes = changes;
        info!(
            symbol = %self.symbol,
            timeframe = %self.timeframe,
            bars = self.bars.len(),
            strokes = self.strokes.rows().len(),
            segments = self.segments.rows().len(),
            "analyzer reset"
        );
        self.publish(None, changes);
        Ok(())
    }

    /// Restores the bar history from before a failed update and resyncs the
    /// momentum points with it.
    fn roll_back(&mut self, displaced: Option<Bar>) {
        match displaced {
            Some(previous) => self.bars.replace_last(previous),
            None => {
                self.bars.pop();
            }
        }
        if let Err(err) = self.momentum.rebuild(self.bars.as_slice()) {
            warn!(symbol = %self.symbol, %err, "momentum rebuild failed");
        }
        warn!(
            symbol = %self.symbol,
            timeframe = %self.timeframe,
            bars = self.bars.len(),
            "bar rolled back"
        );
    }

    fn recompute(&mut self) -> StageChanges {
        let bars = self.bars.as_slice();
        let merged_index = self.merger.update(bars);
        let merged = self.merger.rows();
        let merged_dt = merged_index
            .and_then(|idx| merged.get(idx).or(merged.last()))
            .map(|bar| bar.dt);

        let fractal = self.fractals.update(merged, merged_index);
        let stroke = self.strokes.update(self.fractals.rows(), bars, merged);
        let segment = self.segments.update(self.strokes.rows());
        let pivot = self.pivots.update(self.strokes.rows(), self.segments.rows());

        StageChanges {
            merged: merged_dt,
            fractal,
            stroke,
            segment,
            pivot,
            trimmed: None,
        }
    }

    /// Once more than `max_segments` segment points exist, drops everything
    /// at or before the oldest of the last `max_segments` points.
    fn trim_history(&mut self) -> Option<DateTime<Utc>> {
        let max = self.config.max_segments;
        let segments = self.segments.rows();
        if max == 0 || segments.len() <= max {
            return None;
        }
        let cutoff = segments[segments.len() - max].dt;

        let dropped = self.bars.retain_after(cutoff);
        self.momentum.trim_until(cutoff);
        self.merger.trim_until(cutoff);
        self.fractals.trim_until(cutoff);
        self.strokes.trim_until(cutoff);
        self.segments.trim_until(cutoff);
        self.pivots.trim_until(cutoff);
        info!(
            symbol = %self.symbol,
            timeframe = %self.timeframe,
            %cutoff,
            dropped,
            "history trimmed"
        );
        Some(cutoff)
    }

    fn publish(&self, bar_event: Option<(EventType, DateTime<Utc>)>, changes: StageChanges) {
        if !self.observable.has_subscribers() {
            return;
        }
        if let Some((event, dt)) = bar_event {
            self.emit(event, Some(dt), self.bars.len());
        }
        for (event, dt, rows) in [
            (EventType::MergedChanged, changes.merged, self.merged().len()),
            (EventType::FractalChanged, changes.fractal, self.fractals().len()),
            (EventType::StrokeChanged, changes.stroke, self.strokes().len()),
            (EventType::SegmentChanged, changes.segment, self.segments().len()),
            (EventType::PivotChanged, changes.pivot, self.pivots().len()),
            (EventType::HistoryTrimmed, changes.trimmed, self.bars.len()),
        ] {
            if dt.is_some() {
                self.emit(event, dt, rows);
            }
        }
        self.emit(EventType::UpdateEnd, self.bars.last().map(|bar| bar.dt), self.bars.len());
    }

    fn emit(&self, event: EventType, backtrack_dt: Option<DateTime<Utc>>, rows: usize) {
        let payload = EventPayload {
            symbol: self.symbol.clone(),
            backtrack_dt,
            rows,
        };
        self.observable.notify(self.timeframe, event, &payload);
    }

    pub fn snapshot(&self) -> AnalysisSnapshot {
        AnalysisSnapshot {
            symbol: self.symbol.clone(),
            timeframe: self.timeframe,
            bars: self.bars().to_vec(),
            merged: self.merged().to_vec(),
            fractals: self.fractals().to_vec(),
            strokes: self.strokes().to_vec(),
            segments: self.segments().to_vec(),
            pivots: self.pivots().to_vec(),
            ma: self.ma().to_vec(),
            macd: self.macd().to_vec(),
        }
    }

    /// Rows of one structure kind with `start <= dt <= end`. `is_last`
    /// restricts the search to the most recent rows of that kind.
    pub fn sub_section(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        kind: SectionKind,
        is_last: bool,
    ) -> Section<'_> {
        let cap = is_last.then(|| kind.tail_cap());
        match kind {
            SectionKind::Merged => Section::Merged(section(self.merged(), start, end, cap)),
            SectionKind::Fractal => Section::Fractal(section(self.fractals(), start, end, cap)),
            SectionKind::Stroke => Section::Stroke(section(self.strokes(), start, end, cap)),
            SectionKind::Segment => Section::Segment(section(self.segments(), start, end, cap)),
        }
    }

    pub fn macd_power(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        level: Level,
        direction: Direction,
    ) -> f64 {
        DivergenceAnalyzer::power(self.macd(), &PowerRange::new(start, end, direction), level)
    }

    pub fn volume_power(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
        range(self.bars(), start, end).iter().map(|bar| bar.volume).sum()
    }

    pub fn is_divergent(
        &self,
        recent: &PowerRange,
        earlier: &PowerRange,
        level: Level,
        last_n: Option<usize>,
    ) -> Result<bool, ChanError> {
        self.divergence
            .is_divergent(self.macd(), recent, earlier, level, last_n)
    }

    pub fn divergence_verdict(
        &self,
        recent: &PowerRange,
        earlier: &PowerRange,
        level: Level,
        last_n: Option<usize>,
    ) -> Result<DivergenceVerdict, ChanError> {
        self.divergence
            .compare(self.macd(), recent, earlier, level, last_n)
    }

    /// The last `n` spans between consecutive points of `level`.
    pub fn latest_moves(&self, n: usize, level: Level) -> Vec<Move> {
        let points: Vec<(DateTime<Utc>, f64)> = match level {
            Level::Stroke => tail(self.strokes(), n + 1).iter().map(|p| (p.dt, p.price)).collect(),
            Level::Segment => tail(self.segments(), n + 1).iter().map(|p| (p.dt, p.price)).collect(),
        };
        points
            .windows(2)
            .map(|pair| {
                let direction = if pair[0].1 < pair[1].1 {
                    Direction::Up
                } else {
                    Direction::Down
                };
                self.build_move(pair[0], pair[1], level, direction)
            })
            .collect()
    }

    /// The move still forming after the last point of `level`, ending at the
    /// most extreme opposite point seen since.
    pub fn last_move(&self, level: Level) -> Option<Move> {
        let (origin, candidates): ((DateTime<Utc>, Mark, f64), Vec<(DateTime<Utc>, Mark, f64)>) =
            match level {
                Level::Stroke => {
                    let origin = self.strokes().last()?;
                    let recent = tail(self.fractals(), Const::LAST_MOVE_LOOKBACK);
                    let after = &recent[index_at_or_after(recent, origin.dt)..];
                    if after.len() < 2 {
                        return None;
                    }
                    (
                        (origin.dt, origin.mark, origin.price),
                        after.iter().map(|f| (f.dt, f.mark, f.price)).collect(),
                    )
                }
                Level::Segment => {
                    let origin = self.segments().last()?;
                    let recent = tail(self.strokes(), Const::LAST_MOVE_LOOKBACK);
                    let after = &recent[index_at_or_after(recent, origin.dt)..];
                    if after.len() < Const::MIN_SEGMENT_POINTS {
                        return None;
                    }
                    (
                        (origin.dt, origin.mark, origin.price),
                        after.iter().map(|s| (s.dt, s.mark, s.price)).collect(),
                    )
                }
            };

        let target = origin.1.opposite();
        let mut best: Option<(DateTime<Utc>, f64)> = None;
        for (dt, mark, price) in candidates {
            if mark != target {
                continue;
            }
            let better = match (best, target) {
                (None, _) => true,
                (Some((_, current)), Mark::Peak) => price > current,
                (Some((_, current)), Mark::Trough) => price < current,
            };
            if better {
                best = Some((dt, price));
            }
        }
        let end = best?;
        debug!(level = level.as_str(), start = %origin.0, end = %end.0, "last move located");
        let direction = match origin.1 {
            Mark::Trough => Direction::Up,
            Mark::Peak => Direction::Down,
        };
        Some(self.build_move((origin.0, origin.2), end, level, direction))
    }

    fn build_move(
        &self,
        start: (DateTime<Utc>, f64),
        end: (DateTime<Utc>, f64),
        level: Level,
        direction: Direction,
    ) -> Move {
        Move {
            start_dt: start.0,
            end_dt: end.0,
            power: self.macd_power(start.0, end.0, level, direction),
            direction,
            high: start.1.max(end.1),
            low: start.1.min(end.1),
            level,
        }
    }
}

fn tail<T>(rows: &[T], n: usize) -> &[T] {
    &rows[rows.len().saturating_sub(n)..]
}

fn section<T: Timestamped>(
    rows: &[T],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    cap: Option<usize>,
) -> &[T] {
    let rows = match cap {
        Some(n) => tail(rows, n),
        None => rows,
    };
    range(rows, start, end)
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    fn bars(n: usize) -> Vec<Bar> {
        let base = Utc.with_ymd_and_hms(2024, 5, 6, 9, 30, 0).unwrap();
        (0..n)
            .map(|i| {
                let close = 100.0 + (i as f64 * 0.7).sin() * 4.0;
                Bar {
                    symbol: "TEST".to_string(),
                    dt: base + Duration::minutes(i as i64 * 15),
                    open: close - 0.3,
                    high: close + 0.6,
                    low: close - 0.6,
                    close,
                    volume: 10.0,
                }
            })
            .collect()
    }

    fn desync(analyzer: &mut Analyzer, history: &[Bar]) {
        analyzer.momentum.clear();
        analyzer.momentum.rebuild(&history[..5]).unwrap();
    }

    #[test]
    fn desynced_momentum_rolls_back_appended_bar() {
        let history = bars(12);
        let mut analyzer = Analyzer::new("TEST", Timeframe::M15);
        for bar in &history[..10] {
            analyzer.update(bar.clone()).unwrap();
        }
        let merged_before = analyzer.merged().to_vec();

        desync(&mut analyzer, &history);
        let err = analyzer.update(history[10].clone()).unwrap_err();
        assert!(matches!(err, ChanError::MomentumDesync { .. }));
        assert_eq!(analyzer.bars().len(), 10);
        assert_eq!(analyzer.bars().last().map(|b| b.dt), Some(history[9].dt));
        assert_eq!(analyzer.merged(), merged_before.as_slice());
        assert_eq!(analyzer.macd().len(), 10, "momentum resynced with the kept bars");

        assert_eq!(analyzer.update(history[10].clone()).unwrap(), BarUpdate::Appended);
        assert_eq!(analyzer.bars().len(), 11);
        assert_eq!(analyzer.macd().len(), 11);
    }

    #[test]
    fn desynced_momentum_restores_replaced_bar() {
        let history = bars(12);
        let mut analyzer = Analyzer::new("TEST", Timeframe::M15);
        for bar in &history[..11] {
            analyzer.update(bar.clone()).unwrap();
        }

        desync(&mut analyzer, &history);
        let mut draft = history[10].clone();
        draft.close += 3.0;
        draft.high += 3.0;
        assert!(analyzer.update(draft).is_err());
        assert_eq!(analyzer.bars().len(), 11);
        assert_eq!(analyzer.bars().last(), Some(&history[10]));
        assert_eq!(analyzer.macd().last().map(|p| p.dt), Some(history[10].dt));
    }
}
