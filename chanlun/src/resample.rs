use crate::bar::Bar;
use crate::constant::{ChanError, Timeframe};

/// Turns bars at one timeframe into bars at a coarser one.
pub trait Resampler {
    fn resample(&self, bars: &[Bar], from: Timeframe, to: Timeframe) -> Result<Vec<Bar>, ChanError>;
}

/// Groups a fixed number of consecutive bars per coarser bar. A coarse bar
/// takes the open timestamp of its first member.
#[derive(Debug, Clone, Copy)]
pub struct WindowResampler {
    /// Emit the trailing incomplete window as a still-forming bar.
    pub emit_partial: bool,
}

impl Default for WindowResampler {
    fn default() -> Self {
        Self { emit_partial: true }
    }
}

impl WindowResampler {
    pub fn window(from: Timeframe, to: Timeframe) -> Result<usize, ChanError> {
        let (fine, coarse) = (from.minutes(), to.minutes());
        if coarse <= fine || coarse % fine != 0 {
            return Err(ChanError::InvalidSelector {
                kind: "resample target",
                value: format!("{from} -> {to}"),
            });
        }
        Ok((coarse / fine) as usize)
    }

    fn aggregate(members: &[Bar]) -> Option<Bar> {
        let first = members.first()?;
        let last = members.last()?;
        let high = members.iter().map(|x| x.high).fold(f64::MIN, f64::max);
        let low = members.iter().map(|x| x.low).fold(f64::MAX, f64::min);
        let volume: f64 = members.iter().map(|x| x.volume).sum();
        Some(Bar {
            symbol: first.symbol.clone(),
            dt: first.dt,
            open: first.open,
            high,
            low,
            close: last.close,
            volume,
        })
    }
}

impl Resampler for WindowResampler {
    fn resample(&self, bars: &[Bar], from: Timeframe, to: Timeframe) -> Result<Vec<Bar>, ChanError> {
        let window = Self::window(from, to)?;
        Ok(bars
            .chunks(window)
            .filter(|chunk| self.emit_partial || chunk.len() == window)
            .filter_map(Self::aggregate)
            .collect())
    }
}
