use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{Duration, TimeZone, Utc};

use chanlun::{
    Analyzer, AnalyzerConfig, Bar, BarUpdate, ChanError, Direction, EventPayload, EventType,
    FrameBasis, FrameOptions, Level, Mark, Section, SectionKind, Timeframe,
};

#[test]
fn incremental_updates_match_batch_reset() {
    let bars = sample_bars(900);
    let incremental = fed(&bars, untrimmed());

    let mut batch = Analyzer::with_config("RB8888", Timeframe::M15, untrimmed());
    batch.reset(bars.clone()).expect("ordered bars");

    assert_eq!(incremental.bars(), batch.bars());
    assert_eq!(incremental.merged(), batch.merged());
    assert_eq!(incremental.fractals(), batch.fractals());
    assert_eq!(incremental.strokes(), batch.strokes());
    assert_eq!(incremental.segments(), batch.segments());
    assert_eq!(incremental.pivots(), batch.pivots());
    assert!(!batch.strokes().is_empty());
}

#[test]
fn replaced_bars_leave_the_same_merged_and_fractal_history() {
    let bars = sample_bars(600);
    let mut analyzer = Analyzer::with_config("RB8888", Timeframe::M15, untrimmed());
    for (i, bar) in bars.iter().enumerate() {
        if i % 7 == 3 {
            let mut draft = bar.clone();
            draft.high = draft.open + 0.1;
            draft.low = draft.open - 0.1;
            draft.close = draft.open;
            assert_eq!(analyzer.update(draft).expect("monotonic bars"), BarUpdate::Appended);
            assert_eq!(analyzer.update(bar.clone()).expect("same dt"), BarUpdate::Replaced);
        } else {
            assert_eq!(analyzer.update(bar.clone()).expect("monotonic bars"), BarUpdate::Appended);
        }
    }

    let mut batch = Analyzer::with_config("RB8888", Timeframe::M15, untrimmed());
    batch.reset(bars).expect("ordered bars");
    assert_eq!(analyzer.bars(), batch.bars());
    assert_eq!(analyzer.merged(), batch.merged());
    assert_eq!(analyzer.fractals(), batch.fractals());
}

#[test]
fn older_bar_is_rejected_without_side_effects() {
    let bars = sample_bars(50);
    let mut analyzer = fed(&bars, untrimmed());
    let before = analyzer.bars().len();

    let stale = bars[10].clone();
    let err = analyzer.update(stale);
    assert!(matches!(err, Err(ChanError::NonMonotonicBar { .. })));
    assert_eq!(analyzer.bars().len(), before);
    assert_eq!(analyzer.bars().last(), bars.last());
}

#[test]
fn reset_rejects_unordered_history() {
    let mut bars = sample_bars(20);
    bars[12].dt = bars[11].dt;
    let mut analyzer = Analyzer::new("RB8888", Timeframe::M15);
    assert!(matches!(
        analyzer.reset(bars),
        Err(ChanError::NonMonotonicBar { .. })
    ));
}

#[test]
fn history_is_trimmed_to_recent_segments() {
    let bars = sample_bars(1500);
    let config = AnalyzerConfig {
        max_segments: 1,
        ..AnalyzerConfig::default()
    };
    let mut analyzer = Analyzer::with_config("RB8888", Timeframe::M15, config);
    let mut trimmed = 0;
    for bar in bars.iter().cloned() {
        analyzer.update(bar).expect("monotonic bars");
        assert!(analyzer.segments().len() <= 1);
        if let Some(cutoff) = analyzer.last_changes().trimmed {
            trimmed += 1;
            assert!(analyzer.bars().iter().all(|b| b.dt > cutoff));
            assert!(analyzer.strokes().iter().all(|s| s.dt > cutoff));
        }
    }
    assert!(trimmed > 0, "segments should accumulate past the limit");
    assert!(analyzer.bars().len() < bars.len());
}

#[test]
fn subscribers_see_one_update_end_per_bar() {
    let bars = sample_bars(120);
    let mut analyzer = Analyzer::with_config("RB8888", Timeframe::M15, untrimmed());

    let ends = Arc::new(AtomicUsize::new(0));
    let replaced = Arc::new(AtomicUsize::new(0));
    let all = Arc::new(AtomicUsize::new(0));
    {
        let ends = Arc::clone(&ends);
        analyzer.subscribe(
            Some(EventType::UpdateEnd),
            Arc::new(move |timeframe: Timeframe, _: EventType, payload: &EventPayload| {
                assert_eq!(timeframe, Timeframe::M15);
                assert!(payload.backtrack_dt.is_some());
                assert_eq!(payload.symbol, "RB8888");
                assert!(payload.rows > 0);
                ends.fetch_add(1, Ordering::SeqCst);
            }),
        );
        let replaced = Arc::clone(&replaced);
        analyzer.subscribe(
            Some(EventType::BarReplaced),
            Arc::new(move |_: Timeframe, _: EventType, _: &EventPayload| {
                replaced.fetch_add(1, Ordering::SeqCst);
            }),
        );
        let all = Arc::clone(&all);
        analyzer.subscribe(
            None,
            Arc::new(move |_: Timeframe, _: EventType, _: &EventPayload| {
                all.fetch_add(1, Ordering::SeqCst);
            }),
        );
    }

    let dropped = Arc::new(AtomicUsize::new(0));
    let dropped_id = {
        let dropped = Arc::clone(&dropped);
        analyzer.subscribe(
            None,
            Arc::new(move |_: Timeframe, _: EventType, _: &EventPayload| {
                dropped.fetch_add(1, Ordering::SeqCst);
            }),
        )
    };
    assert!(analyzer.unsubscribe(dropped_id));

    for bar in bars.iter().cloned() {
        analyzer.update(bar).expect("monotonic bars");
    }
    let last = bars.last().cloned().expect("bars");
    analyzer.update(last).expect("same dt");

    assert_eq!(ends.load(Ordering::SeqCst), bars.len() + 1);
    assert_eq!(replaced.load(Ordering::SeqCst), 1);
    assert_eq!(dropped.load(Ordering::SeqCst), 0);
    // at least the bar event and the end marker per update
    assert!(all.load(Ordering::SeqCst) >= 2 * (bars.len() + 1));
}

#[test]
fn sub_section_is_inclusive() {
    let analyzer = fed(&sample_bars(600), untrimmed());
    let strokes = analyzer.strokes();
    assert!(strokes.len() > 4);

    match analyzer.sub_section(strokes[1].dt, strokes[3].dt, SectionKind::Stroke, false) {
        Section::Stroke(rows) => {
            assert_eq!(rows.len(), 3);
            assert_eq!(rows[0], strokes[1]);
            assert_eq!(rows[2], strokes[3]);
        }
        other => panic!("unexpected section kind: {other:?}"),
    }

    let merged = analyzer.sub_section(strokes[1].dt, strokes[3].dt, SectionKind::Merged, false);
    assert!(!merged.is_empty());
    let empty = analyzer.sub_section(strokes[3].dt, strokes[1].dt, SectionKind::Fractal, true);
    assert!(empty.is_empty());
}

#[test]
fn latest_moves_connect_consecutive_strokes() {
    let analyzer = fed(&sample_bars(600), untrimmed());
    let strokes = analyzer.strokes();
    assert!(strokes.len() >= 4);
    let moves = analyzer.latest_moves(3, Level::Stroke);
    assert_eq!(moves.len(), 3);

    let tail = &strokes[strokes.len() - 4..];
    for (mv, pair) in moves.iter().zip(tail.windows(2)) {
        assert_eq!(mv.start_dt, pair[0].dt);
        assert_eq!(mv.end_dt, pair[1].dt);
        let expected = if pair[0].mark == Mark::Trough {
            Direction::Up
        } else {
            Direction::Down
        };
        assert_eq!(mv.direction, expected);
        assert!(mv.high >= mv.low);
        assert!(mv.power >= 0.0);
        assert_eq!(mv.level, Level::Stroke);
    }
}

#[test]
fn last_move_starts_at_the_last_stroke_point() {
    let bars = sample_bars(600);
    let mut analyzer = Analyzer::with_config("RB8888", Timeframe::M15, untrimmed());
    let mut seen = 0;
    for bar in bars {
        analyzer.update(bar).expect("monotonic bars");
        let Some(mv) = analyzer.last_move(Level::Stroke) else {
            continue;
        };
        seen += 1;
        let origin = analyzer.strokes().last().expect("origin stroke");
        assert_eq!(mv.start_dt, origin.dt);
        assert!(mv.end_dt > mv.start_dt);
        let expected = match origin.mark {
            Mark::Trough => Direction::Up,
            Mark::Peak => Direction::Down,
        };
        assert_eq!(mv.direction, expected);
    }
    assert!(seen > 0, "a forming move should appear between stroke points");
}

#[test]
fn divergence_queries_use_tracked_macd() {
    let analyzer = fed(&sample_bars(600), untrimmed());
    let moves = analyzer.latest_moves(3, Level::Stroke);
    let (earlier, recent) = (moves[0].span(), moves[2].span());
    let verdict = analyzer
        .divergence_verdict(&recent, &earlier, Level::Stroke, None)
        .expect("ordered ranges");
    assert_eq!(verdict.recent_power, moves[2].power);
    assert_eq!(verdict.earlier_power, moves[0].power);
    assert_eq!(
        analyzer.is_divergent(&recent, &earlier, Level::Stroke, None).expect("ordered ranges"),
        verdict.divergent
    );
    assert!(analyzer.is_divergent(&earlier, &recent, Level::Stroke, None).is_err());

    let volume = analyzer.volume_power(moves[0].start_dt, moves[0].end_dt);
    assert!(volume > 0.0);
}

#[test]
fn kline_frame_annotates_recent_bars() {
    let analyzer = fed(&sample_bars(300), untrimmed());

    let frame = analyzer
        .kline_frame(&FrameOptions {
            max_count: 200,
            with_macd: true,
            ..FrameOptions::default()
        })
        .expect("frame");
    assert_eq!(frame.height(), 200);
    let names = frame.get_column_names();
    for column in [
        "dt", "open", "high", "low", "close", "volume", "fx_mark", "fx", "bi", "xd", "ma5",
        "ma20", "diff", "dea", "macd",
    ] {
        assert!(names.contains(&column), "missing column {column}");
    }

    let merged = analyzer
        .kline_frame(&FrameOptions {
            basis: FrameBasis::Merged,
            max_count: usize::MAX,
            ..FrameOptions::default()
        })
        .expect("frame");
    assert_eq!(merged.height(), analyzer.merged().len());

    assert_eq!(analyzer.stroke_frame().expect("frame").height(), analyzer.strokes().len());
    assert_eq!(analyzer.fractal_frame().expect("frame").height(), analyzer.fractals().len());
}

#[test]
fn snapshot_serializes_every_structure() {
    let analyzer = fed(&sample_bars(300), untrimmed());
    let value = serde_json::to_value(analyzer.snapshot()).expect("serializable snapshot");
    assert_eq!(value["symbol"], "RB8888");
    assert_eq!(
        value["strokes"].as_array().map(Vec::len),
        Some(analyzer.strokes().len())
    );
    assert_eq!(value["bars"].as_array().map(Vec::len), Some(300));
}

fn untrimmed() -> AnalyzerConfig {
    AnalyzerConfig {
        max_segments: 0,
        ..AnalyzerConfig::default()
    }
}

fn fed(bars: &[Bar], config: AnalyzerConfig) -> Analyzer {
    let mut analyzer = Analyzer::with_config("RB8888", Timeframe::M15, config);
    for bar in bars.iter().cloned() {
        analyzer.update(bar).expect("monotonic bars");
    }
    analyzer
}

fn sample_bars(count: usize) -> Vec<Bar> {
    let base_dt = Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap();
    let cycle = [0.0_f64, 1.2, -0.9, 1.6, -1.3, 0.8, -0.6, 1.5, -1.2, 0.7];
    let mut price: f64 = 100.0;
    let mut bars = Vec::with_capacity(count);
    for i in 0..count {
        let t = i as f64;
        let open = price;
        let close = 100.0
            + 30.0 * (t / 150.0).sin()
            + 9.0 * (t / 25.0).sin()
            + 3.0 * (t / 5.0).sin()
            + cycle[i % cycle.len()];
        price = close;
        bars.push(Bar {
            symbol: "RB8888".to_string(),
            dt: base_dt + Duration::minutes((i as i64) * 15),
            open,
            high: open.max(close) + 0.5,
            low: open.min(close) - 0.5,
            close,
            volume: 100.0 + t,
        });
    }
    bars
}
