use super::core::{MacdValue, MomentumRoutine};
use super::ema::Ema;

/// SMA and MACD with the warm-up and seeding conventions of TA-Lib.
#[derive(Debug, Clone, Copy, Default)]
pub struct TalibRoutine;

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

impl MomentumRoutine for TalibRoutine {
    fn name(&self) -> &str {
        "talib"
    }

    fn sma(&self, series: &[f64], period: usize) -> Vec<Option<f64>> {
        let mut out = vec![None; series.len()];
        if period == 0 || series.len() < period {
            return out;
        }
        let mut sum: f64 = series[..period].iter().sum();
        out[period - 1] = Some(sum / period as f64);
        for idx in period..series.len() {
            sum += series[idx] - series[idx - period];
            out[idx] = Some(sum / period as f64);
        }
        out
    }

    fn macd(&self, series: &[f64], fast: usize, slow: usize, signal: usize) -> Vec<MacdValue> {
        let mut out = vec![MacdValue::default(); series.len()];
        let (fast, slow) = if fast > slow { (slow, fast) } else { (fast, slow) };
        if fast == 0 || signal == 0 || series.len() < slow + signal - 1 {
            return out;
        }

        // Both averages produce their first value on the same sample.
        let start = slow - 1;
        let fast_seed = mean(&series[slow - fast..slow]);
        let slow_seed = mean(&series[..slow]);
        let mut fast_ema = Ema::seeded(fast, fast_seed);
        let mut slow_ema = Ema::seeded(slow, slow_seed);
        let mut diffs = Vec::with_capacity(series.len() - start);
        diffs.push(fast_seed - slow_seed);
        for price in &series[slow..] {
            diffs.push(fast_ema.update(*price) - slow_ema.update(*price));
        }

        let signal_seed = mean(&diffs[..signal]);
        let mut signal_ema = Ema::seeded(signal, signal_seed);
        for (offset, diff) in diffs.iter().enumerate().skip(signal - 1) {
            let dea = if offset == signal - 1 {
                signal_seed
            } else {
                signal_ema.update(*diff)
            };
            out[start + offset] = MacdValue {
                diff: Some(*diff),
                dea: Some(dea),
                macd: Some(diff - dea),
            };
        }
        out
    }
}
