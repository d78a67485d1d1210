use std::fs;
use std::path::PathBuf;

use chanlun::{
    Analyzer, AnalyzerConfig, Breakout, CsvBarLoader, FrameOptions, Mark, PointState, Timeframe,
    init_logging,
};
use serde::Serialize;
use tracing::info;

#[derive(Debug, Serialize)]
struct ExportPayload {
    symbol: String,
    timeframe: String,
    candles: Vec<CandlePoint>,
    merged_candles: Vec<CandlePoint>,
    fractals: Vec<PointMarker>,
    strokes: Vec<AnchoredLine>,
    segments: Vec<AnchoredLine>,
    pivots: Vec<PivotBox>,
}

#[derive(Debug, Serialize)]
struct CandlePoint {
    time: i64,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
}

#[derive(Debug, Serialize)]
struct PointMarker {
    time: i64,
    price: f64,
    kind: String,
}

#[derive(Debug, Serialize)]
struct AnchoredLine {
    t0: i64,
    t1: i64,
    v0: f64,
    v1: f64,
    confirmed: bool,
}

#[derive(Debug, Serialize)]
struct PivotBox {
    t0: i64,
    t1: Option<i64>,
    upper: f64,
    lower: f64,
    finished: bool,
    breakout: Option<String>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 4 {
        eprintln!(
            "usage: cargo run -p replay --bin export_structures -- <csv_path> <symbol> <timeframe:1m|5m|15m|30m|1h|1d> [output_json] [max_rows] [config.yaml|config.json]"
        );
        std::process::exit(2);
    }
    init_logging();

    let csv_path = PathBuf::from(&args[1]);
    let symbol = args[2].clone();
    let timeframe: Timeframe = args[3].parse()?;
    let output = match args.get(4) {
        Some(path) => PathBuf::from(path),
        None => PathBuf::from(format!("structures-{}-{}.json", symbol.to_ascii_lowercase(), timeframe)),
    };
    let max_rows = match args.get(5) {
        Some(raw) => Some(raw.parse::<usize>()?),
        None => None,
    };
    let config = match args.get(6) {
        Some(path) => AnalyzerConfig::from_file(path)?,
        None => AnalyzerConfig::default(),
    };

    let bars = CsvBarLoader::new(symbol.clone()).load(&csv_path)?;
    let mut analyzer = Analyzer::with_config(symbol.clone(), timeframe, config);
    let mut ingested = 0usize;
    for bar in bars.into_iter().take(max_rows.unwrap_or(usize::MAX)) {
        analyzer.update(bar)?;
        ingested += 1;
    }

    let payload = ExportPayload {
        symbol: symbol.clone(),
        timeframe: timeframe.to_string(),
        candles: analyzer
            .bars()
            .iter()
            .map(|bar| CandlePoint {
                time: bar.dt.timestamp(),
                open: bar.open,
                high: bar.high,
                low: bar.low,
                close: bar.close,
            })
            .collect(),
        merged_candles: analyzer
            .merged()
            .iter()
            .map(|bar| CandlePoint {
                time: bar.dt.timestamp(),
                open: bar.open,
                high: bar.high,
                low: bar.low,
                close: bar.close,
            })
            .collect(),
        fractals: analyzer
            .fractals()
            .iter()
            .map(|fx| PointMarker {
                time: fx.dt.timestamp(),
                price: fx.price,
                kind: mark_label(fx.mark).to_string(),
            })
            .collect(),
        strokes: analyzer
            .strokes()
            .windows(2)
            .map(|pair| AnchoredLine {
                t0: pair[0].dt.timestamp(),
                t1: pair[1].dt.timestamp(),
                v0: pair[0].price,
                v1: pair[1].price,
                confirmed: pair[1].state == PointState::Confirmed,
            })
            .collect(),
        segments: analyzer
            .segments()
            .windows(2)
            .map(|pair| AnchoredLine {
                t0: pair[0].dt.timestamp(),
                t1: pair[1].dt.timestamp(),
                v0: pair[0].price,
                v1: pair[1].price,
                confirmed: pair[1].state == PointState::Confirmed,
            })
            .collect(),
        pivots: analyzer
            .pivots()
            .iter()
            .map(|pivot| PivotBox {
                t0: pivot.start.dt.timestamp(),
                t1: pivot.end.map(|p| p.dt.timestamp()),
                upper: pivot.zg,
                lower: pivot.zd,
                finished: pivot.finished,
                breakout: pivot.breakout.map(|b| match b {
                    Breakout::ThirdBuy(_) => "third_buy".to_string(),
                    Breakout::ThirdSell(_) => "third_sell".to_string(),
                }),
            })
            .collect(),
    };

    fs::write(&output, serde_json::to_vec_pretty(&payload)?)?;
    info!(
        %symbol,
        %timeframe,
        ingested,
        strokes = payload.strokes.len(),
        segments = payload.segments.len(),
        pivots = payload.pivots.len(),
        output = %output.display(),
        "structures exported"
    );

    let frame = analyzer.kline_frame(&FrameOptions {
        max_count: 20,
        ..FrameOptions::default()
    })?;
    println!("{frame}");
    Ok(())
}

fn mark_label(mark: Mark) -> &'static str {
    match mark {
        Mark::Peak => "Top",
        Mark::Trough => "Bottom",
    }
}
