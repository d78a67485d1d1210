use std::collections::BTreeMap;

use serde::Serialize;
use tracing::info;

use crate::analyzer::{AnalysisSnapshot, Analyzer};
use crate::bar::Bar;
use crate::config::{AnalyzerConfig, AnalyzerProfileConfig};
use crate::constant::{BarUpdate, ChanError, Timeframe};
use crate::pivot::Pivot;
use crate::resample::Resampler;
use crate::segment::Segment;
use crate::stroke::Stroke;

/// Latest structure points of one level, for a compact overview.
#[derive(Debug, Clone, Serialize)]
pub struct TimeframeAnalysis {
    pub timeframe: Timeframe,
    pub bars: usize,
    pub latest_stroke: Option<Stroke>,
    pub latest_segment: Option<Segment>,
    pub latest_pivot: Option<Pivot>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EngineSnapshot {
    pub symbol: String,
    pub base: AnalysisSnapshot,
    pub levels: Vec<AnalysisSnapshot>,
}

/// A base-level analyzer plus analyzers for coarser timeframes derived from
/// the same history.
pub struct AnalysisEngine {
    symbol: String,
    base: Analyzer,
    levels: BTreeMap<Timeframe, Analyzer>,
    profile: AnalyzerProfileConfig,
}

impl AnalysisEngine {
    pub fn new(symbol: impl Into<String>, timeframe: Timeframe) -> Self {
        Self::with_profile(symbol, timeframe, AnalyzerProfileConfig::default())
    }

    pub fn with_profile(
        symbol: impl Into<String>,
        timeframe: Timeframe,
        profile: AnalyzerProfileConfig,
    ) -> Self {
        let symbol = symbol.into();
        let config = profile.resolve_for(&symbol, timeframe);
        Self {
            base: Analyzer::with_config(symbol.clone(), timeframe, config),
            symbol,
            levels: BTreeMap::new(),
            profile,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn base(&self) -> &Analyzer {
        &self.base
    }

    pub fn base_mut(&mut self) -> &mut Analyzer {
        &mut self.base
    }

    pub fn level(&self, timeframe: Timeframe) -> Option<&Analyzer> {
        if timeframe == self.base.timeframe() {
            return Some(&self.base);
        }
        self.levels.get(&timeframe)
    }

    pub fn timeframes(&self) -> Vec<Timeframe> {
        std::iter::once(self.base.timeframe())
            .chain(self.levels.keys().copied())
            .collect()
    }

    fn config_for(&self, timeframe: Timeframe) -> AnalyzerConfig {
        self.profile.resolve_for(&self.symbol, timeframe)
    }

    /// Rebuilds every level from `bars` at the base timeframe. Coarser
    /// levels are produced by `resampler`.
    pub fn reset(
        &mut self,
        bars: Vec<Bar>,
        levels: &[Timeframe],
        resampler: &dyn Resampler,
    ) -> Result<(), ChanError> {
        let base_tf = self.base.timeframe();
        let mut built = BTreeMap::new();
        for timeframe in levels.iter().copied().filter(|tf| *tf != base_tf) {
            let coarse = resampler.resample(&bars, base_tf, timeframe)?;
            let mut analyzer =
                Analyzer::with_config(self.symbol.clone(), timeframe, self.config_for(timeframe));
            analyzer.reset(coarse)?;
            built.insert(timeframe, analyzer);
        }
        self.base.reset(bars)?;
        self.levels = built;
        info!(
            symbol = %self.symbol,
            levels = self.levels.len() + 1,
            "engine reset"
        );
        Ok(())
    }

    /// Feeds the base level only; coarser levels change on the next reset.
    pub fn update(&mut self, bar: Bar) -> Result<BarUpdate, ChanError> {
        self.base.update(bar)
    }

    pub fn timeframe_analysis(&self, timeframe: Timeframe) -> Option<TimeframeAnalysis> {
        let analyzer = self.level(timeframe)?;
        Some(TimeframeAnalysis {
            timeframe,
            bars: analyzer.bars().len(),
            latest_stroke: analyzer.strokes().last().cloned(),
            latest_segment: analyzer.segments().last().cloned(),
            latest_pivot: analyzer.pivots().last().cloned(),
        })
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            symbol: self.symbol.clone(),
            base: self.base.snapshot(),
            levels: self.levels.values().map(Analyzer::snapshot).collect(),
        }
    }
}
