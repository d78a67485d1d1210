/// Exponential average started from a caller-supplied seed, usually the
/// simple mean of the first `period` samples.
#[derive(Debug, Clone, Copy)]
pub struct Ema {
    alpha: f64,
    value: f64,
}

impl Ema {
    pub fn seeded(period: usize, seed: f64) -> Self {
        Self {
            alpha: 2.0 / (period.max(1) as f64 + 1.0),
            value: seed,
        }
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn update(&mut self, price: f64) -> f64 {
        self.value += self.alpha * (price - self.value);
        self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn moves_towards_price_by_alpha() {
        let mut ema = Ema::seeded(3, 10.0);
        assert_eq!(ema.value(), 10.0);
        assert!((ema.update(12.0) - 11.0).abs() < 1e-12);
        assert!((ema.update(11.0) - 11.0).abs() < 1e-12);
    }
}
