use chrono::{Duration, TimeZone, Utc};

use chanlun::{
    AnalysisEngine, AnalyzerProfileConfig, Bar, BarUpdate, Timeframe, WindowResampler,
};

#[test]
fn reset_builds_every_requested_level() {
    let bars = sample_bars(800);
    let mut engine = AnalysisEngine::new("RB8888", Timeframe::M15);
    engine
        .reset(bars.clone(), &[Timeframe::H1, Timeframe::M15], &WindowResampler::default())
        .expect("ordered bars");

    assert_eq!(engine.symbol(), "RB8888");
    assert_eq!(engine.timeframes(), vec![Timeframe::M15, Timeframe::H1]);
    assert_eq!(engine.base().bars().len(), 800);

    let hourly = engine.level(Timeframe::H1).expect("hourly level");
    assert_eq!(hourly.bars().len(), 200);
    assert_eq!(hourly.bars()[1].dt, bars[4].dt);
    assert!(engine.level(Timeframe::D1).is_none());

    let analysis = engine.timeframe_analysis(Timeframe::M15).expect("base analysis");
    assert_eq!(analysis.bars, 800);
    assert_eq!(analysis.latest_stroke.as_ref(), engine.base().strokes().last());

    let snapshot = engine.snapshot();
    assert_eq!(snapshot.levels.len(), 1);
    assert_eq!(snapshot.levels[0].timeframe, Timeframe::H1);
}

#[test]
fn updates_only_touch_the_base_level() {
    let bars = sample_bars(400);
    let (history, live) = bars.split_at(380);
    let mut engine = AnalysisEngine::new("RB8888", Timeframe::M15);
    engine
        .reset(history.to_vec(), &[Timeframe::H1], &WindowResampler::default())
        .expect("ordered bars");

    for bar in live.iter().cloned() {
        assert_eq!(engine.update(bar).expect("monotonic bars"), BarUpdate::Appended);
    }
    assert_eq!(engine.base().bars().len(), 400);
    assert_eq!(engine.level(Timeframe::H1).map(|a| a.bars().len()), Some(95));
}

#[test]
fn profile_applies_per_level() {
    let profile = AnalyzerProfileConfig::from_yaml_str(
        "symbol_timeframe:\n  \"rb8888.1h\":\n    max_segments: 3\n",
    )
    .expect("valid profile");
    let mut engine = AnalysisEngine::with_profile("RB8888", Timeframe::M15, profile);
    engine
        .reset(sample_bars(200), &[Timeframe::H1], &WindowResampler::default())
        .expect("ordered bars");

    assert_ne!(engine.base().config().max_segments, 3);
    let hourly = engine.level(Timeframe::H1).expect("hourly level");
    assert_eq!(hourly.config().max_segments, 3);
}

#[test]
fn uneven_level_is_rejected() {
    let mut engine = AnalysisEngine::new("RB8888", Timeframe::H1);
    let result = engine.reset(sample_bars(40), &[Timeframe::M30], &WindowResampler::default());
    assert!(result.is_err());
}

fn sample_bars(count: usize) -> Vec<Bar> {
    let base_dt = Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap();
    let mut price: f64 = 100.0;
    let mut bars = Vec::with_capacity(count);
    for i in 0..count {
        let t = i as f64;
        let open = price;
        let close = 100.0 + 12.0 * (t / 40.0).sin() + 3.0 * (t / 6.0).sin();
        price = close;
        bars.push(Bar {
            symbol: "RB8888".to_string(),
            dt: base_dt + Duration::minutes((i as i64) * 15),
            open,
            high: open.max(close) + 0.5,
            low: open.min(close) - 0.5,
            close,
            volume: 100.0,
        });
    }
    bars
}
