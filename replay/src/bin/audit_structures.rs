use std::path::PathBuf;

use chanlun::merger::is_containment_free;
use chanlun::pivot::is_sound;
use chanlun::stroke::is_alternating;
use chanlun::{Analyzer, AnalyzerConfig, CsvBarLoader, Fractal, Timeframe, init_logging};
use tracing::warn;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 4 {
        eprintln!(
            "usage: cargo run -q -p replay --bin audit_structures -- <csv_path> <symbol> <timeframe:1m|5m|15m|30m|1h|1d> [max_rows] [config.yaml|config.json]"
        );
        std::process::exit(2);
    }
    init_logging();

    let csv_path = PathBuf::from(&args[1]);
    let symbol = args[2].clone();
    let timeframe: Timeframe = args[3].parse()?;
    let max_rows = match args.get(4) {
        Some(raw) => raw.parse::<usize>()?,
        None => 3000,
    };
    let mut config = match args.get(5) {
        Some(path) => AnalyzerConfig::from_file(path)?,
        None => AnalyzerConfig::default(),
    };
    // trimming would make the incremental history shorter than the batch one
    config.max_segments = 0;

    let bars: Vec<_> = CsvBarLoader::new(symbol.clone())
        .load(&csv_path)?
        .into_iter()
        .take(max_rows)
        .collect();

    let mut live = Analyzer::with_config(symbol.clone(), timeframe, config.clone());
    for bar in bars.iter().cloned() {
        live.update(bar)?;
    }
    let mut batch = Analyzer::with_config(symbol, timeframe, config);
    batch.reset(bars)?;

    let mut violations = Vec::<String>::new();

    let merged = live.merged();
    if !is_containment_free(merged) {
        violations.push("MERGED adjacent bars still contain each other".to_string());
    }
    let covered: usize = merged.iter().map(|bar| bar.elements).sum();
    if covered != live.bars().len() {
        violations.push(format!(
            "MERGED coverage mismatch: {covered} raw bars merged, {} loaded",
            live.bars().len()
        ));
    }

    for fx in live.fractals() {
        let idx = merged.partition_point(|bar| bar.dt < fx.dt);
        if idx == 0 || idx + 1 >= merged.len() {
            violations.push(format!("FRACTAL at {} has no surrounding bars", fx.dt));
            continue;
        }
        let expected = Fractal::verify(&merged[idx - 1], &merged[idx], &merged[idx + 1]);
        if expected != Some(fx.mark) {
            violations.push(format!(
                "FRACTAL mismatch at {}: got {:?}, expected {:?}",
                fx.dt, fx.mark, expected
            ));
        }
    }

    if !is_alternating(live.strokes(), |s| s.mark) {
        violations.push("STROKE points do not alternate".to_string());
    }
    for stroke in live.strokes() {
        if !live.fractals().iter().any(|fx| fx.dt == stroke.dt && fx.mark == stroke.mark) {
            violations.push(format!("STROKE point at {} is not a fractal", stroke.dt));
        }
    }

    if !is_alternating(live.segments(), |s| s.mark) {
        violations.push("SEGMENT points do not alternate".to_string());
    }
    for pivot in live.pivots().iter().filter(|p| !is_sound(p)) {
        violations.push(format!(
            "PIVOT at {} unsound: zg={} zd={} g={} gg={} d={} dd={}",
            pivot.start.dt, pivot.zg, pivot.zd, pivot.g, pivot.gg, pivot.d, pivot.dd
        ));
    }

    if live.merged() != batch.merged() {
        violations.push("EQUIVALENCE merged bars differ from batch rebuild".to_string());
    }
    if live.fractals() != batch.fractals() {
        violations.push("EQUIVALENCE fractals differ from batch rebuild".to_string());
    }
    if live.strokes() != batch.strokes() {
        violations.push("EQUIVALENCE strokes differ from batch rebuild".to_string());
    }
    if live.segments() != batch.segments() {
        violations.push("EQUIVALENCE segments differ from batch rebuild".to_string());
    }
    if live.pivots() != batch.pivots() {
        violations.push("EQUIVALENCE pivots differ from batch rebuild".to_string());
    }

    println!(
        "AUDIT summary: bars={} merged={} fractals={} strokes={} segments={} pivots={}",
        live.bars().len(),
        merged.len(),
        live.fractals().len(),
        live.strokes().len(),
        live.segments().len(),
        live.pivots().len(),
    );

    if violations.is_empty() {
        println!("AUDIT result: PASS (no structural violations found)");
        return Ok(());
    }

    println!("AUDIT result: FAIL violations={}", violations.len());
    for item in violations.iter().take(30) {
        println!("- {item}");
    }
    if violations.len() > 30 {
        println!("- ... {} more", violations.len() - 30);
    }
    warn!(violations = violations.len(), "structure audit failed");
    std::process::exit(1);
}
