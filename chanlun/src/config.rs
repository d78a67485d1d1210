use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::constant::{ChanError, Const, PivotBasis, StrokeBasis, Timeframe};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyzerConfig {
    pub stroke_basis: StrokeBasis,
    pub pivot_basis: PivotBasis,
    /// Segment points kept before older history is discarded; 0 keeps all.
    pub max_segments: usize,
    pub ma_periods: Vec<usize>,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub gap_margin: f64,
    pub divergence_adjust: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnalyzerConfigPatch {
    pub stroke_basis: Option<StrokeBasis>,
    pub pivot_basis: Option<PivotBasis>,
    pub max_segments: Option<usize>,
    pub ma_periods: Option<Vec<usize>>,
    pub macd_fast: Option<usize>,
    pub macd_slow: Option<usize>,
    pub macd_signal: Option<usize>,
    pub gap_margin: Option<f64>,
    pub divergence_adjust: Option<f64>,
}

/// Per-timeframe and per-symbol overrides layered over a default patch.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnalyzerProfileConfig {
    #[serde(default)]
    pub default: AnalyzerConfigPatch,
    #[serde(default)]
    pub timeframe: HashMap<String, AnalyzerConfigPatch>,
    #[serde(default)]
    pub symbol: HashMap<String, AnalyzerConfigPatch>,
    #[serde(default)]
    pub symbol_timeframe: HashMap<String, AnalyzerConfigPatch>,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        let (macd_fast, macd_slow, macd_signal) = Const::DEFAULT_MACD;
        Self {
            stroke_basis: StrokeBasis::Raw,
            pivot_basis: PivotBasis::Segment,
            max_segments: Const::DEFAULT_MAX_SEGMENTS,
            ma_periods: Const::DEFAULT_MA_PERIODS.to_vec(),
            macd_fast,
            macd_slow,
            macd_signal,
            gap_margin: Const::DEFAULT_GAP_MARGIN,
            divergence_adjust: Const::DEFAULT_DIVERGENCE_ADJUST,
        }
    }
}

impl AnalyzerConfig {
    pub fn apply_patch(mut self, patch: AnalyzerConfigPatch) -> Self {
        if let Some(v) = patch.stroke_basis {
            self.stroke_basis = v;
        }
        if let Some(v) = patch.pivot_basis {
            self.pivot_basis = v;
        }
        if let Some(v) = patch.max_segments {
            self.max_segments = v;
        }
        if let Some(v) = patch.ma_periods {
            self.ma_periods = v;
        }

        if let Some(v) = patch.macd_fast {
            self.macd_fast = v;
        }
        if let Some(v) = patch.macd_slow {
            self.macd_slow = v;
        }
        if let Some(v) = patch.macd_signal {
            self.macd_signal = v;
        }

        if let Some(v) = patch.gap_margin {
            self.gap_margin = v;
        }
        if let Some(v) = patch.divergence_adjust {
            self.divergence_adjust = v;
        }
        self
    }

    pub fn macd_params(&self) -> (usize, usize, usize) {
        (self.macd_fast, self.macd_slow, self.macd_signal)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, ChanError> {
        let patch: AnalyzerConfigPatch = serde_yaml::from_str(yaml)?;
        Ok(Self::default().apply_patch(patch))
    }

    pub fn from_json_str(json: &str) -> Result<Self, ChanError> {
        let patch: AnalyzerConfigPatch = serde_json::from_str(json)?;
        Ok(Self::default().apply_patch(patch))
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ChanError> {
        let raw = fs::read_to_string(path)?;
        Self::from_yaml_str(&raw)
    }

    /// Reads a YAML or JSON patch depending on the file extension.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ChanError> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .map(|s| s.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "yaml" | "yml" => Self::from_yaml_file(path),
            "json" => Self::from_json_str(&fs::read_to_string(path)?),
            _ => Err(ChanError::InvalidSelector {
                kind: "config format",
                value: path.display().to_string(),
            }),
        }
    }
}

impl AnalyzerProfileConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ChanError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ChanError> {
        let raw = fs::read_to_string(path)?;
        Self::from_yaml_str(&raw)
    }

    pub fn resolve_for(&self, symbol: &str, timeframe: Timeframe) -> AnalyzerConfig {
        let symbol_norm = normalize_key(symbol);
        let tf_norm = timeframe.as_str().to_string();
        let symbol_tf = format!("{symbol_norm}.{tf_norm}");
        let symbol_wild = format!("{symbol_norm}.*");
        let tf_wild = format!("*.{tf_norm}");

        let mut config = AnalyzerConfig::default().apply_patch(self.default.clone());

        if let Some(patch) = find_patch(&self.timeframe, &tf_norm) {
            config = config.apply_patch(patch.clone());
        }
        if let Some(patch) = find_patch(&self.symbol, &symbol_norm) {
            config = config.apply_patch(patch.clone());
        }
        for key in [&tf_wild, &symbol_wild, &symbol_tf] {
            if let Some(patch) = find_patch(&self.symbol_timeframe, key) {
                config = config.apply_patch(patch.clone());
            }
        }
        config
    }
}

fn normalize_key(value: &str) -> String {
    value.trim().to_ascii_lowercase()
}

fn find_patch<'a>(
    map: &'a HashMap<String, AnalyzerConfigPatch>,
    key: &str,
) -> Option<&'a AnalyzerConfigPatch> {
    let key_norm = normalize_key(key);
    map.iter()
        .find(|(k, _)| normalize_key(k) == key_norm)
        .map(|(_, v)| v)
}
