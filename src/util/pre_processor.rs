// External crates
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use log::{debug, info, warn};
use polars::prelude::*;
use std::collections::HashMap;
use std::fs::File;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

// Local modules
use crate::constants::MIN_HISTORY_BARS;
use crate::error::{DataSourceError, ForecastError};
use crate::util::feature_engineering::PriceBar;

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"];
const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

/// Source of daily price history
pub trait MarketDataSource {
    /// Daily bars of `symbol`, ascending by date with unique dates
    fn fetch_history(&self, symbol: &str) -> Result<Vec<PriceBar>, DataSourceError>;
}

/// Reads `<root>/<SYMBOL>.csv` files
#[derive(Debug, Clone)]
pub struct CsvMarketData {
    root: PathBuf,
}

impl CsvMarketData {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn path_for(&self, symbol: &str) -> PathBuf {
        self.root.join(format!("{symbol}.csv"))
    }
}

impl MarketDataSource for CsvMarketData {
    fn fetch_history(&self, symbol: &str) -> Result<Vec<PriceBar>, DataSourceError> {
        let symbol = symbol.trim();
        if symbol.is_empty() || symbol.contains(['/', '\\']) || symbol.starts_with('.') {
            return Err(DataSourceError::SymbolNotFound(symbol.to_string()));
        }

        let path = self.path_for(symbol);
        info!("Loading data from: {}", path.display());

        let file = File::open(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => DataSourceError::SymbolNotFound(symbol.to_string()),
            _ => DataSourceError::Transient {
                symbol: symbol.to_string(),
                reason: e.to_string(),
            },
        })?;

        let invalid = |reason: String| DataSourceError::InvalidData {
            symbol: symbol.to_string(),
            reason,
        };

        let df = CsvReader::new(file)
            .finish()
            .map_err(|e| invalid(e.to_string()))?;
        let bars = dataframe_to_bars(&df).map_err(invalid)?;
        if bars.is_empty() {
            return Err(invalid("no usable rows".to_string()));
        }

        let bars = normalize_history(bars);
        info!(
            "Loaded {} daily bars for {} ({} to {})",
            bars.len(),
            symbol,
            bars[0].date,
            bars[bars.len() - 1].date
        );
        Ok(bars)
    }
}

/// Standard name of a CSV column, matched case-insensitively against
/// common spellings and abbreviations
fn standard_column(name: &str) -> Option<&'static str> {
    let standard = match name.trim().to_lowercase().as_str() {
        "open" | "o" | "op" | "openprice" | "open_price" => "open",
        "high" | "h" | "highprice" | "high_price" | "max" => "high",
        "low" | "l" | "lowprice" | "low_price" | "min" => "low",
        "close" | "c" | "cl" | "closeprice" | "close_price" => "close",
        "adj close" | "adj_close" | "adjusted close" | "adjusted_close" | "adjclose" => {
            "adjusted_close"
        }
        "volume" | "vol" | "v" | "volumes" => "volume",
        "timestamp" | "time" | "date" | "t" | "datetime" | "dt" | "day" => "date",
        _ => return None,
    };
    Some(standard)
}

fn resolve_columns(df: &DataFrame) -> HashMap<&'static str, String> {
    let mut columns = HashMap::new();
    for name in df.get_column_names() {
        if let Some(standard) = standard_column(name.as_str()) {
            columns
                .entry(standard)
                .or_insert_with(|| name.to_string());
        }
    }
    columns
}

fn required_column<'a>(
    columns: &'a HashMap<&'static str, String>,
    name: &str,
) -> Result<&'a str, String> {
    columns
        .get(name)
        .map(String::as_str)
        .ok_or_else(|| format!("required column {name} not found"))
}

fn float_column(df: &DataFrame, name: &str) -> PolarsResult<Vec<Option<f64>>> {
    let column = df.column(name)?.cast(&DataType::Float64)?;
    Ok(column.f64()?.into_iter().collect())
}

fn string_column(df: &DataFrame, name: &str) -> PolarsResult<Vec<Option<String>>> {
    let column = df.column(name)?.cast(&DataType::String)?;
    Ok(column
        .as_materialized_series()
        .str()?
        .into_iter()
        .map(|value| value.map(str::to_string))
        .collect())
}

/// Parse a calendar date, a date-time or a unix timestamp (seconds or
/// milliseconds)
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Some(date) = DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(raw, format).ok())
    {
        return Some(date);
    }
    if let Some(datetime) = DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
    {
        return Some(datetime.date());
    }
    if let Ok(datetime) = DateTime::parse_from_rfc3339(raw) {
        return Some(datetime.date_naive());
    }

    let timestamp: i64 = raw.parse().ok()?;
    let seconds = if timestamp.abs() >= 100_000_000_000 {
        timestamp / 1000
    } else {
        timestamp
    };
    DateTime::from_timestamp(seconds, 0).map(|datetime| datetime.date_naive())
}

/// Convert a raw price frame into bars.
///
/// Rows with a missing price field are skipped; an unparseable date or a
/// non-finite price fails the whole frame.
fn dataframe_to_bars(df: &DataFrame) -> Result<Vec<PriceBar>, String> {
    let columns = resolve_columns(df);
    let close_name = match columns.get("close") {
        Some(name) => name.as_str(),
        None => required_column(&columns, "adjusted_close")?,
    };
    let read_floats = |name: &str| float_column(df, name).map_err(|e| e.to_string());

    let dates =
        string_column(df, required_column(&columns, "date")?).map_err(|e| e.to_string())?;
    let opens = read_floats(required_column(&columns, "open")?)?;
    let highs = read_floats(required_column(&columns, "high")?)?;
    let lows = read_floats(required_column(&columns, "low")?)?;
    let closes = read_floats(close_name)?;
    let volumes = match columns.get("volume") {
        Some(name) => read_floats(name)?,
        None => {
            warn!("No volume column, using 0");
            vec![Some(0.0); df.height()]
        }
    };

    let mut bars = Vec::with_capacity(df.height());
    let mut skipped = 0;
    for row in 0..df.height() {
        let (Some(raw_date), Some(open), Some(high), Some(low), Some(close)) = (
            dates[row].as_deref(),
            opens[row],
            highs[row],
            lows[row],
            closes[row],
        ) else {
            skipped += 1;
            continue;
        };

        let date = parse_date(raw_date)
            .ok_or_else(|| format!("unparseable date {raw_date:?} in row {}", row + 1))?;
        if ![open, high, low, close].iter().all(|v| v.is_finite()) {
            return Err(format!("non-finite price in row {}", row + 1));
        }

        bars.push(PriceBar {
            date,
            open,
            high,
            low,
            close,
            volume: volumes[row].unwrap_or(0.0),
        });
    }

    if skipped > 0 {
        warn!("Skipped {} rows with missing prices", skipped);
    }
    Ok(bars)
}

/// Sort ascending by date and keep the first bar of every date
pub fn normalize_history(mut bars: Vec<PriceBar>) -> Vec<PriceBar> {
    let original_len = bars.len();
    bars.sort_by_key(|bar| bar.date);
    bars.dedup_by_key(|bar| bar.date);
    if bars.len() < original_len {
        debug!("Removed {} duplicate dates", original_len - bars.len());
    }
    bars
}

/// Reject histories too short to train on
pub fn validate_history(bars: &[PriceBar]) -> Result<(), ForecastError> {
    if bars.len() < MIN_HISTORY_BARS {
        return Err(ForecastError::InsufficientHistory {
            available: bars.len(),
            required: MIN_HISTORY_BARS,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::test_utils::linear_bars;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_csv(dir: &TempDir, symbol: &str, contents: &str) {
        let mut file = File::create(dir.path().join(format!("{symbol}.csv"))).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
    }

    #[test]
    fn test_fetch_history_aliases_sorts_and_dedups() {
        let dir = TempDir::new().unwrap();
        write_csv(
            &dir,
            "ACME",
            "Date,Open,High,Low,Close,Volume\n\
             2024-01-04,11.0,12.0,10.5,11.5,1200\n\
             2024-01-02,10.0,11.0,9.5,10.5,1000\n\
             2024-01-03,10.5,11.5,10.0,11.0,1100\n\
             2024-01-03,99.0,99.0,99.0,99.0,1\n",
        );

        let bars = CsvMarketData::new(dir.path()).fetch_history("ACME").unwrap();
        let dates: Vec<String> = bars.iter().map(|b| b.date.to_string()).collect();
        assert_eq!(dates, vec!["2024-01-02", "2024-01-03", "2024-01-04"]);
        assert_eq!(bars[0].close, 10.5);
        assert_eq!(bars[2].volume, 1200.0);
    }

    #[test]
    fn test_adjusted_close_fallback() {
        let dir = TempDir::new().unwrap();
        write_csv(
            &dir,
            "ADJ",
            "timestamp,o,h,l,Adj Close,vol\n\
             2024-02-01,1.0,2.0,0.5,1.5,10\n",
        );

        let bars = CsvMarketData::new(dir.path()).fetch_history("ADJ").unwrap();
        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].close, 1.5);
    }

    #[test]
    fn test_missing_symbol() {
        let dir = TempDir::new().unwrap();
        let source = CsvMarketData::new(dir.path());
        assert!(matches!(
            source.fetch_history("NOPE"),
            Err(DataSourceError::SymbolNotFound(symbol)) if symbol == "NOPE"
        ));
        assert!(matches!(
            source.fetch_history("../etc"),
            Err(DataSourceError::SymbolNotFound(_))
        ));
    }

    #[test]
    fn test_missing_close_column_is_invalid() {
        let dir = TempDir::new().unwrap();
        write_csv(&dir, "BAD", "date,open,high,low,volume\n2024-01-02,1,2,0.5,10\n");

        let result = CsvMarketData::new(dir.path()).fetch_history("BAD");
        assert!(matches!(result, Err(DataSourceError::InvalidData { .. })));
    }

    #[test]
    fn test_parse_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        assert_eq!(parse_date("2024-03-15"), Some(expected));
        assert_eq!(parse_date("2024/03/15"), Some(expected));
        assert_eq!(parse_date("2024-03-15 16:00:00"), Some(expected));
        assert_eq!(parse_date("2024-03-15T16:00:00Z"), Some(expected));
        // 2024-03-15 12:00:00 UTC
        assert_eq!(parse_date("1710504000"), Some(expected));
        assert_eq!(parse_date("1710504000000"), Some(expected));
        assert_eq!(parse_date("yesterday"), None);
    }

    #[test]
    fn test_validate_history_minimum() {
        let short = linear_bars(MIN_HISTORY_BARS - 1, 10.0, 1.0);
        assert!(matches!(
            validate_history(&short),
            Err(ForecastError::InsufficientHistory { available: 59, required: 60 })
        ));
        assert!(validate_history(&linear_bars(MIN_HISTORY_BARS, 10.0, 1.0)).is_ok());
    }

    #[test]
    fn test_normalize_history_keeps_first_duplicate() {
        let mut bars = linear_bars(3, 10.0, 1.0);
        let mut duplicate = bars[1];
        duplicate.close = 999.0;
        bars.push(duplicate);
        bars.reverse();

        let normalized = normalize_history(bars);
        assert_eq!(normalized.len(), 3);
        assert!(normalized.windows(2).all(|w| w[0].date < w[1].date));
    }
}
