use std::io::Read;
use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Deserialize;

use crate::bar::Bar;
use crate::constant::ChanError;

/// Converts a vendor-specific record into a normalized bar.
pub trait BarNormalizer {
    type Input;

    fn normalize(&self, input: Self::Input) -> Result<Bar, ChanError>;
}

/// 标准 CSV 行：列名兼容 open/open_price 等常见写法。
#[derive(Debug, Clone, Deserialize)]
pub struct CsvBarRecord {
    #[serde(alias = "dt", alias = "date", alias = "time")]
    pub datetime: String,
    #[serde(alias = "open_price")]
    pub open: f64,
    #[serde(alias = "high_price")]
    pub high: f64,
    #[serde(alias = "low_price")]
    pub low: f64,
    #[serde(alias = "close_price")]
    pub close: f64,
    #[serde(default, alias = "vol")]
    pub volume: f64,
}

#[derive(Debug, Clone)]
pub struct CsvBarLoader {
    symbol: String,
}

impl CsvBarLoader {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
        }
    }

    pub fn load(&self, file_path: impl AsRef<Path>) -> Result<Vec<Bar>, ChanError> {
        let reader = csv::Reader::from_path(file_path)?;
        self.collect(reader)
    }

    pub fn from_reader<R: Read>(&self, source: R) -> Result<Vec<Bar>, ChanError> {
        self.collect(csv::Reader::from_reader(source))
    }

    fn collect<R: Read>(&self, mut reader: csv::Reader<R>) -> Result<Vec<Bar>, ChanError> {
        let mut out = Vec::new();
        for row in reader.deserialize::<CsvBarRecord>() {
            out.push(self.normalize(row?)?);
        }
        out.sort_by_key(|bar| bar.dt);
        out.dedup_by(|later, earlier| {
            if later.dt == earlier.dt {
                *earlier = later.clone();
                true
            } else {
                false
            }
        });
        Ok(out)
    }
}

impl BarNormalizer for CsvBarLoader {
    type Input = CsvBarRecord;

    fn normalize(&self, input: CsvBarRecord) -> Result<Bar, ChanError> {
        let dt = parse_datetime(input.datetime.trim())?;
        Ok(Bar {
            symbol: self.symbol.clone(),
            dt,
            open: input.open,
            high: input.high.max(input.low),
            low: input.low.min(input.high),
            close: input.close,
            volume: input.volume,
        })
    }
}

pub fn parse_datetime(value: &str) -> Result<DateTime<Utc>, ChanError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }

    let patterns = [
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y/%m/%d %H:%M:%S%.f",
        "%Y%m%d%H%M%S%.f",
        "%Y-%m-%d %H:%M",
    ];

    for pattern in patterns {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, pattern) {
            return Ok(DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc));
        }
    }

    for pattern in ["%Y-%m-%d", "%Y%m%d"] {
        if let Some(dt) = NaiveDate::parse_from_str(value, pattern)
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
        {
            return Ok(DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc));
        }
    }

    Err(ChanError::InvalidDatetime(value.to_string()))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn parses_common_layouts() {
        let expected = Utc.with_ymd_and_hms(2024, 1, 2, 9, 31, 0).unwrap();
        assert_eq!(parse_datetime("2024-01-02 09:31:00").unwrap(), expected);
        assert_eq!(parse_datetime("2024/01/02 09:31:00").unwrap(), expected);
        assert_eq!(parse_datetime("20240102093100").unwrap(), expected);
        assert_eq!(parse_datetime("2024-01-02T09:31:00Z").unwrap(), expected);
        assert_eq!(
            parse_datetime("2024-01-02").unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap()
        );
        assert!(matches!(
            parse_datetime("yesterday"),
            Err(ChanError::InvalidDatetime(_))
        ));
    }

    #[test]
    fn loader_sorts_and_keeps_latest_duplicate() {
        let data = "\
dt,open,high,low,close,vol
2024-01-02 09:32:00,10.5,11,10,10.8,300
2024-01-02 09:31:00,10,10.6,9.9,10.5,100
2024-01-02 09:32:00,10.5,11.2,10,11.1,350
";
        let bars = CsvBarLoader::new("TEST").from_reader(data.as_bytes()).unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].close, 10.5);
        assert_eq!(bars[1].close, 11.1);
        assert_eq!(bars[1].volume, 350.0);
        assert_eq!(bars[1].symbol, "TEST");
    }
}
