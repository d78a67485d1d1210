use chrono::{DateTime, Duration, TimeZone, Utc};

use chanlun::segment::{build_candidates, potential_points, refine};
use chanlun::stroke::is_alternating;
use chanlun::{
    Analyzer, AnalyzerConfig, Bar, Mark, PointState, SegmentBuilder, Stroke, Timeframe,
};

#[test]
fn candidates_follow_extreme_strokes() {
    let strokes = strokes(&[10.0, 15.0, 12.0, 18.0, 14.0, 22.0, 17.0, 19.0, 13.0, 16.0, 8.0]);

    let points: Vec<f64> = potential_points(&strokes[2..]).iter().map(|s| s.price).collect();
    assert_eq!(points, vec![22.0], "only the 22 peak beats both neighbours");

    let candidates = build_candidates(&strokes);
    let summary: Vec<(Mark, f64)> = candidates.iter().map(|c| (c.mark, c.price)).collect();
    assert_eq!(
        summary,
        vec![
            (Mark::Trough, 10.0),
            (Mark::Peak, 15.0),
            (Mark::Trough, 12.0),
            (Mark::Peak, 22.0),
        ]
    );
    // four candidates pass through the second pass untouched
    assert_eq!(refine(&strokes, candidates.clone()), candidates);
}

// up 10-20, down to 11, up to 22, down to 9, up to 25, then a pullback
const SIX_CANDIDATE_WAVES: [f64; 20] = [
    10.0, 15.0, 12.0, 20.0, 16.0, 18.0, 11.0, 18.0, 16.0, 22.0, 17.0, 19.0, 9.0, 13.0, 11.0,
    25.0, 20.0, 22.0, 15.0, 17.0,
];

#[test]
fn refine_keeps_confirmed_interior_points() {
    let strokes = strokes(&SIX_CANDIDATE_WAVES);
    let candidates = build_candidates(&strokes);
    let summary: Vec<(Mark, f64)> = candidates.iter().map(|c| (c.mark, c.price)).collect();
    assert_eq!(
        summary,
        vec![
            (Mark::Trough, 10.0),
            (Mark::Peak, 15.0),
            (Mark::Trough, 11.0),
            (Mark::Peak, 22.0),
            (Mark::Trough, 9.0),
            (Mark::Peak, 25.0),
        ]
    );

    let refined = refine(&strokes, candidates);
    let prices: Vec<f64> = refined.iter().map(|s| s.price).collect();
    // 15 has no characteristic sequence before it. The rebound after 9 stays
    // under 17..19, and the later peak turn never dips below 9.
    assert_eq!(prices, vec![11.0, 22.0, 9.0, 25.0]);
    assert_eq!(refined[0].dt, strokes[6].dt);
    assert_eq!(refined[3].dt, strokes[15].dt);
}

#[test]
fn refine_drops_trailing_point_broken_by_latest_stroke() {
    let mut prices = SIX_CANDIDATE_WAVES;
    prices[19] = 27.0;
    let strokes = strokes(&prices);
    let candidates = build_candidates(&strokes);
    assert_eq!(candidates.len(), 6);
    assert_eq!(candidates[5].price, 25.0);

    let refined = refine(&strokes, candidates);
    let summary: Vec<(Mark, f64)> = refined.iter().map(|s| (s.mark, s.price)).collect();
    assert_eq!(
        summary,
        vec![(Mark::Trough, 11.0), (Mark::Peak, 22.0), (Mark::Trough, 9.0)],
        "the 25 peak is exceeded by the 27 stroke"
    );
}

#[test]
fn fewer_than_four_strokes_build_no_segment() {
    let strokes = strokes(&[10.0, 15.0, 12.0]);
    assert!(build_candidates(&strokes).is_empty());

    let mut builder = SegmentBuilder::new();
    assert_eq!(builder.update(&strokes), None);
    assert!(builder.rows().is_empty());
}

#[test]
fn builder_reports_first_changed_point() {
    let mut all = strokes(&[10.0, 15.0, 12.0, 18.0, 14.0, 22.0, 17.0, 19.0, 13.0, 16.0, 8.0]);
    let mut builder = SegmentBuilder::new();
    let first = builder.update(&all);
    assert_eq!(first, Some(all[0].dt), "a fresh build changes from the first point");
    assert_eq!(builder.rows().last().map(|s| s.state), Some(PointState::Tentative));

    assert_eq!(builder.update(&all), None, "same strokes should not report a change");

    all.truncate(3);
    assert_eq!(builder.update(&all), Some(all[0].dt));
    assert!(builder.rows().is_empty());
}

#[test]
fn analyzer_segments_alternate_on_stroke_points() {
    let mut analyzer = Analyzer::with_config(
        "RB8888",
        Timeframe::M15,
        AnalyzerConfig {
            max_segments: 0,
            ..AnalyzerConfig::default()
        },
    );
    for bar in sample_bars(1500) {
        analyzer.update(bar).expect("monotonic bars");
    }

    let segments = analyzer.segments();
    assert!(segments.len() >= 2, "long waves should produce segments");
    assert!(is_alternating(segments, |s| s.mark));
    for segment in segments {
        assert!(
            analyzer
                .strokes()
                .iter()
                .any(|s| s.dt == segment.dt && s.mark == segment.mark && s.price == segment.price),
            "segment point {} should be a stroke point",
            segment.dt
        );
    }
}

fn strokes(prices: &[f64]) -> Vec<Stroke> {
    let base = Utc.with_ymd_and_hms(2024, 4, 1, 9, 0, 0).unwrap();
    prices
        .iter()
        .enumerate()
        .map(|(i, price)| {
            let dt = base + Duration::minutes((i as i64) * 10);
            stroke(dt, if i % 2 == 0 { Mark::Trough } else { Mark::Peak }, *price)
        })
        .collect()
}

fn stroke(dt: DateTime<Utc>, mark: Mark, price: f64) -> Stroke {
    Stroke {
        dt,
        mark,
        price,
        start_dt: dt - Duration::minutes(1),
        end_dt: dt + Duration::minutes(1),
        high: price + 0.5,
        low: price - 0.5,
        state: PointState::Confirmed,
    }
}

fn sample_bars(count: usize) -> Vec<Bar> {
    let base_dt = Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap();
    let mut price: f64 = 100.0;
    let mut bars = Vec::with_capacity(count);
    for i in 0..count {
        let t = i as f64;
        let open = price;
        let close = 100.0 + 30.0 * (t / 150.0).sin() + 9.0 * (t / 25.0).sin() + 3.0 * (t / 5.0).sin();
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
