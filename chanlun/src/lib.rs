pub mod analyzer;
pub mod bar;
pub mod config;
pub mod constant;
pub mod divergence;
pub mod engine;
pub mod events;
pub mod fractal;
pub mod frame;
pub mod indicator;
pub mod logging;
pub mod merger;
pub mod pivot;
pub mod receiver;
pub mod resample;
pub mod segment;
pub mod series;
pub mod stroke;
mod utils;

pub use analyzer::{AnalysisSnapshot, Analyzer, Section, StageChanges};
pub use bar::{Bar, MergedBar};
pub use config::{AnalyzerConfig, AnalyzerConfigPatch, AnalyzerProfileConfig};
pub use constant::{
	BarUpdate, ChanError, Const, Direction, EventType, Level, Mark, PivotBasis, PointState,
	SectionKind, StrokeBasis, Timeframe,
};
pub use divergence::{DivergenceAnalyzer, DivergenceVerdict, Move, PowerRange};
pub use engine::{AnalysisEngine, EngineSnapshot, TimeframeAnalysis};
pub use events::{EventPayload, Observable, Subscriber, SubscriptionId};
pub use fractal::{Fractal, FractalDetector};
pub use frame::{FrameBasis, FrameOptions};
pub use indicator::{MaPoint, MacdPoint, MacdValue, MomentumRoutine, MomentumTracker, TalibRoutine};
pub use logging::init_logging;
pub use merger::BarMerger;
pub use pivot::{Breakout, Pivot, PivotDetector, PivotLeg, PivotPoint};
pub use receiver::{BarNormalizer, CsvBarLoader, CsvBarRecord, parse_datetime};
pub use resample::{Resampler, WindowResampler};
pub use segment::{FeatureRange, Segment, SegmentBuilder};
pub use series::{StructureSeries, Timestamped};
pub use stroke::{Stroke, StrokeBuilder};
