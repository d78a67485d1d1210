pub mod core;
pub mod ema;
pub mod manager;
pub mod talib;

pub use core::{MacdValue, MomentumRoutine};
pub use ema::Ema;
pub use manager::{MaPoint, MacdPoint, MomentumTracker};
pub use talib::TalibRoutine;
