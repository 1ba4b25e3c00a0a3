use thiserror::Error;

/// Errors raised by a market data source.
///
/// `SymbolNotFound` and `Transient` are kept apart so the caller can decide
/// whether to retry against another source or ask for a different symbol.
#[derive(Debug, Error)]
pub enum DataSourceError {
    #[error("symbol not found: {0}. Check the ticker code")]
    SymbolNotFound(String),

    #[error("transient data source failure for {symbol}: {reason}")]
    Transient { symbol: String, reason: String },

    #[error("invalid price data for {symbol}: {reason}")]
    InvalidData { symbol: String, reason: String },
}

/// Errors raised by the forecasting pipeline.
#[derive(Debug, Error)]
pub enum ForecastError {
    #[error(
        "insufficient data: {available} bars cannot fill a {window_size}-bar window \
         plus {prediction_days} prediction day(s). Reduce the window size or prediction days"
    )]
    InsufficientData {
        available: usize,
        window_size: usize,
        prediction_days: usize,
    },

    #[error(
        "insufficient history: {available} daily bars supplied, at least {required} required. \
         Fetch a longer history or pick another symbol"
    )]
    InsufficientHistory { available: usize, required: usize },

    #[error(
        "empty partition: {train} training and {test} test examples. \
         Supply more history or reduce the window size"
    )]
    EmptyPartition { train: usize, test: usize },

    #[error("training failed: {0}")]
    Training(String),

    #[error(transparent)]
    DataSource(#[from] DataSourceError),
}

pub type Result<T> = std::result::Result<T, ForecastError>;
