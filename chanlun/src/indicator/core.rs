use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct MacdValue {
    pub diff: Option<f64>,
    pub dea: Option<f64>,
    pub macd: Option<f64>,
}

/// Numeric routines the momentum tracker delegates to.
///
/// Both methods return one output per input sample, `None` during warm-up.
pub trait MomentumRoutine: Send + Sync {
    fn name(&self) -> &str;
    fn sma(&self, series: &[f64], period: usize) -> Vec<Option<f64>>;
    fn macd(&self, series: &[f64], fast: usize, slow: usize, signal: usize) -> Vec<MacdValue>;
}
