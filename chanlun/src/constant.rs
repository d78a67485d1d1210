use std::fmt::{Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mark {
    Peak,
    Trough,
}

impl Mark {
    pub fn opposite(self) -> Self {
        match self {
            Self::Peak => Self::Trough,
            Self::Trough => Self::Peak,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Peak => "peak",
            Self::Trough => "trough",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    pub fn opposite(self) -> Self {
        match self {
            Self::Up => Self::Down,
            Self::Down => Self::Up,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
        }
    }
}

impl FromStr for Direction {
    type Err = ChanError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "up" => Ok(Self::Up),
            "down" => Ok(Self::Down),
            _ => Err(ChanError::InvalidSelector {
                kind: "direction",
                value: value.to_string(),
            }),
        }
    }
}

/// Whether a raw bar extended the history or overwrote its newest bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum BarUpdate {
    Appended,
    Replaced,
}

/// Every entry of a structure series except the last one is confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PointState {
    Confirmed,
    Tentative,
}

/// Bars consulted when deciding whether two fractals are far enough apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrokeBasis {
    /// At least one raw bar strictly between the two fractal windows.
    #[serde(alias = "new")]
    Raw,
    /// At least one merged bar strictly between the two fractal windows.
    #[serde(alias = "old")]
    Merged,
}

impl FromStr for StrokeBasis {
    type Err = ChanError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "raw" | "new" => Ok(Self::Raw),
            "merged" | "old" => Ok(Self::Merged),
            _ => Err(ChanError::InvalidSelector {
                kind: "stroke basis",
                value: value.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PivotBasis {
    #[serde(alias = "xd")]
    Segment,
    #[serde(alias = "bi")]
    Stroke,
}

impl FromStr for PivotBasis {
    type Err = ChanError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "segment" | "xd" => Ok(Self::Segment),
            "stroke" | "bi" => Ok(Self::Stroke),
            _ => Err(ChanError::InvalidSelector {
                kind: "pivot basis",
                value: value.to_string(),
            }),
        }
    }
}

/// Structure level a move or a divergence check is measured on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    #[serde(alias = "bi")]
    Stroke,
    #[serde(alias = "xd")]
    Segment,
}

impl Level {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stroke => "stroke",
            Self::Segment => "segment",
        }
    }
}

impl FromStr for Level {
    type Err = ChanError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "stroke" | "bi" => Ok(Self::Stroke),
            "segment" | "xd" => Ok(Self::Segment),
            _ => Err(ChanError::InvalidSelector {
                kind: "level",
                value: value.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SectionKind {
    Merged,
    Fractal,
    Stroke,
    Segment,
}

impl SectionKind {
    pub(crate) fn tail_cap(self) -> usize {
        match self {
            Self::Merged => Const::SECTION_TAIL_MERGED,
            Self::Fractal => Const::SECTION_TAIL_FRACTAL,
            Self::Stroke => Const::SECTION_TAIL_STROKE,
            Self::Segment => Const::SECTION_TAIL_SEGMENT,
        }
    }
}

impl FromStr for SectionKind {
    type Err = ChanError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "merged" | "kn" => Ok(Self::Merged),
            "fractal" | "fx" => Ok(Self::Fractal),
            "stroke" | "bi" => Ok(Self::Stroke),
            "segment" | "xd" => Ok(Self::Segment),
            _ => Err(ChanError::InvalidSelector {
                kind: "section",
                value: value.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    BarAppended,
    BarReplaced,
    MergedChanged,
    FractalChanged,
    StrokeChanged,
    SegmentChanged,
    PivotChanged,
    HistoryTrimmed,
    UpdateEnd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Timeframe {
    M1,
    M5,
    M15,
    M30,
    H1,
    D1,
}

impl Timeframe {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::M1 => "1m",
            Self::M5 => "5m",
            Self::M15 => "15m",
            Self::M30 => "30m",
            Self::H1 => "1h",
            Self::D1 => "1d",
        }
    }

    pub fn minutes(self) -> u32 {
        match self {
            Self::M1 => 1,
            Self::M5 => 5,
            Self::M15 => 15,
            Self::M30 => 30,
            Self::H1 => 60,
            Self::D1 => 1440,
        }
    }
}

impl Display for Timeframe {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = ChanError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "1m" | "m1" => Ok(Self::M1),
            "5m" | "m5" => Ok(Self::M5),
            "15m" | "m15" => Ok(Self::M15),
            "30m" | "m30" => Ok(Self::M30),
            "1h" | "h1" | "60m" => Ok(Self::H1),
            "1d" | "d1" | "d" => Ok(Self::D1),
            _ => Err(ChanError::InvalidSelector {
                kind: "timeframe",
                value: value.to_string(),
            }),
        }
    }
}

pub struct Const;

impl Const {
    /// Merged bars re-derived on every update.
    pub const MERGE_TAIL: usize = 2;
    /// Stroke points re-derived on every update.
    pub const STROKE_TAIL: usize = 2;
    /// Trailing closes fed to the momentum routines after the first full pass.
    pub const MOMENTUM_WINDOW: usize = 200;
    /// Stroke points needed between two opposite segment points.
    pub const MIN_SEGMENT_POINTS: usize = 4;
    pub const PIVOT_SEED_POINTS: usize = 4;
    pub const PIVOT_UNFINISHED_POINTS: usize = 5;
    /// How far back `last_move` looks for the opposite extreme.
    pub const LAST_MOVE_LOOKBACK: usize = 60;
    pub const SECTION_TAIL_MERGED: usize = 200;
    pub const SECTION_TAIL_FRACTAL: usize = 100;
    pub const SECTION_TAIL_STROKE: usize = 50;
    pub const SECTION_TAIL_SEGMENT: usize = 30;
    pub const DEFAULT_MAX_SEGMENTS: usize = 20;
    pub const DEFAULT_GAP_MARGIN: f64 = 0.002;
    pub const DEFAULT_DIVERGENCE_ADJUST: f64 = 0.9;
    pub const DEFAULT_MA_PERIODS: [usize; 3] = [5, 34, 120];
    pub const DEFAULT_MACD: (usize, usize, usize) = (12, 26, 9);
}

#[derive(Debug, Error)]
pub enum ChanError {
    #[error("bar at {incoming} arrived after bar at {last}")]
    NonMonotonicBar {
        last: DateTime<Utc>,
        incoming: DateTime<Utc>,
    },
    #[error("invalid range: {0}")]
    InvalidRange(String),
    #[error("invalid {kind}: {value}")]
    InvalidSelector { kind: &'static str, value: String },
    #[error("momentum point at {found} does not match bar at {expected}")]
    MomentumDesync {
        expected: DateTime<Utc>,
        found: DateTime<Utc>,
    },
    #[error("invalid datetime: {0}")]
    InvalidDatetime(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("polars error: {0}")]
    Polars(#[from] polars::prelude::PolarsError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selectors_accept_legacy_aliases() {
        assert_eq!("new".parse::<StrokeBasis>().ok(), Some(StrokeBasis::Raw));
        assert_eq!("old".parse::<StrokeBasis>().ok(), Some(StrokeBasis::Merged));
        assert_eq!("xd".parse::<PivotBasis>().ok(), Some(PivotBasis::Segment));
        assert_eq!("bi".parse::<Level>().ok(), Some(Level::Stroke));
        assert_eq!("fx".parse::<SectionKind>().ok(), Some(SectionKind::Fractal));
        assert_eq!("5m".parse::<Timeframe>().ok(), Some(Timeframe::M5));
    }

    #[test]
    fn unknown_selector_is_rejected() {
        let err = "sideways".parse::<Direction>().unwrap_err();
        assert!(matches!(err, ChanError::InvalidSelector { kind: "direction", .. }));
        assert!("weekly".parse::<Timeframe>().is_err());
    }
}
