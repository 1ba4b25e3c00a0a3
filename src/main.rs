// External crates
use anyhow::{ensure, Context, Result};
use clap::{Parser, ValueEnum};
use log::info;
use std::path::PathBuf;
use std::time::Instant;

// Local modules
use price_forecast_lstm::daily::lstm::step_1_tensor_preparation::ForecastStrategy;
use price_forecast_lstm::forecast::config::ForecastConfig;
use price_forecast_lstm::forecast::progress::Phase;
use price_forecast_lstm::forecast::task::spawn_forecast;
use price_forecast_lstm::util::feature_engineering::FeatureSet;
use price_forecast_lstm::util::model_logger::ForecastReport;
use price_forecast_lstm::util::pre_processor::{validate_history, CsvMarketData, MarketDataSource};

pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    /// Close-only model, one day at a time
    Iterative,
    /// OHLCV model predicting the whole horizon at once
    DirectOhlcv,
    /// OHLCV plus technical indicators, whole horizon at once
    DirectIndicators,
}

impl From<Mode> for ForecastStrategy {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Iterative => ForecastStrategy::IterativeClose,
            Mode::DirectOhlcv => ForecastStrategy::Direct(FeatureSet::Ohlcv),
            Mode::DirectIndicators => ForecastStrategy::Direct(FeatureSet::OhlcvWithIndicators),
        }
    }
}

/// Forecast the next few daily closes of a symbol with a stacked LSTM
#[derive(Parser, Debug)]
#[command(name = "price-forecast", version, about)]
struct Cli {
    /// Ticker symbol, read from <DATA_DIR>/<SYMBOL>.csv
    symbol: String,

    /// Directory holding the daily CSV files
    #[arg(long, default_value = ".")]
    data_dir: PathBuf,

    /// JSON file with forecast settings; flags override it
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, value_parser = clap::value_parser!(u16).range(10..=60))]
    window_size: Option<u16>,

    #[arg(long, value_parser = clap::value_parser!(u16).range(10..=200))]
    epochs: Option<u16>,

    #[arg(long, value_parser = parse_learning_rate)]
    learning_rate: Option<f64>,

    #[arg(long, value_parser = clap::value_parser!(u16).range(16..=64))]
    batch_size: Option<u16>,

    #[arg(long, value_parser = clap::value_parser!(u16).range(1..=5))]
    prediction_days: Option<u16>,

    #[arg(long, value_enum)]
    mode: Option<Mode>,

    /// Write a JSON run report into this directory
    #[arg(long)]
    report: Option<PathBuf>,
}

fn parse_learning_rate(raw: &str) -> Result<f64, String> {
    let value: f64 = raw.parse().map_err(|_| format!("`{raw}` is not a number"))?;
    if (0.0001..=0.01).contains(&value) {
        Ok(value)
    } else {
        Err("learning rate must be between 0.0001 and 0.01".to_string())
    }
}

/// Price with two decimals and no currency symbol; the CSV does not say which
/// currency it is in
fn format_price(price: f64) -> String {
    format!("{price:.2}")
}

fn check_ranges(config: &ForecastConfig) -> Result<()> {
    ensure!(
        (10..=60).contains(&config.window_size),
        "window size must be between 10 and 60"
    );
    ensure!((10..=200).contains(&config.epochs), "epochs must be between 10 and 200");
    ensure!(
        (0.0001..=0.01).contains(&config.learning_rate),
        "learning rate must be between 0.0001 and 0.01"
    );
    ensure!(
        (16..=64).contains(&config.batch_size),
        "batch size must be between 16 and 64"
    );
    ensure!(
        (1..=5).contains(&config.prediction_days),
        "prediction days must be between 1 and 5"
    );
    Ok(())
}

fn build_config(cli: &Cli) -> Result<ForecastConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            ForecastConfig::from_json_str(&json)
                .with_context(|| format!("Invalid config {}", path.display()))?
        }
        None => ForecastConfig::default(),
    };

    if let Some(window_size) = cli.window_size {
        config.window_size = window_size.into();
    }
    if let Some(epochs) = cli.epochs {
        config.epochs = epochs.into();
    }
    if let Some(learning_rate) = cli.learning_rate {
        config.learning_rate = learning_rate;
    }
    if let Some(batch_size) = cli.batch_size {
        config.batch_size = batch_size.into();
    }
    if let Some(prediction_days) = cli.prediction_days {
        config.prediction_days = prediction_days.into();
    }
    if let Some(mode) = cli.mode {
        config.strategy = mode.into();
    }

    check_ranges(&config)?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    info!(
        "{} {} ({}, {})",
        built_info::PKG_NAME,
        built_info::PKG_VERSION,
        built_info::TARGET,
        built_info::PROFILE
    );

    let config = build_config(&cli)?;
    let symbol = cli.symbol.trim().to_uppercase();

    let source = CsvMarketData::new(&cli.data_dir);
    let bars = source
        .fetch_history(&symbol)
        .with_context(|| format!("Failed to load history for {symbol}"))?;
    validate_history(&bars)?;
    let bars_used = bars.len();

    let started = Instant::now();
    let mut task = spawn_forecast(bars, config.clone());
    while let Some(event) = task.next_event().await {
        match (event.phase, event.loss) {
            (Phase::Training, Some(loss)) => {
                eprintln!("Epoch {}/{}  loss {:.6}", event.current_epoch, event.total_epochs, loss)
            }
            (phase, _) => eprintln!("{phase}"),
        }
    }
    let result = task.result().await?;
    let elapsed = started.elapsed().as_secs_f64();

    println!("Test RMSE: {:.4}", result.rmse);
    println!("Predictions for the next {} business days:", result.predictions.len());
    for point in &result.predictions {
        println!("  {}  {}", point.date, format_price(point.price));
    }
    if matches!(config.strategy, ForecastStrategy::IterativeClose) {
        println!(
            "Note: iterative forecasts feed predictions back in, \
             so errors compound with the horizon"
        );
    }

    if let Some(report_dir) = &cli.report {
        let mut report = ForecastReport::new(&symbol, &config, bars_used, &result);
        report.set_training_time(elapsed);
        let path = report.save(report_dir)?;
        info!("Report written to {}", path.display());
    }

    Ok(())
}
