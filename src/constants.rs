// Raw OHLCV features and the indicator fields appended by feature engineering
pub const OHLCV_FEATURES: [&str; 5] = ["open", "high", "low", "close", "volume"];

pub const TECHNICAL_INDICATORS: [&str; 8] = [
    "sma_5",
    "sma_20",
    "rsi_14",
    "macd",
    "macd_signal",
    "macd_hist",
    "bb_upper",
    "bb_lower",
];

// Indicator parameters
pub const SMA_SHORT_PERIOD: usize = 5;
pub const SMA_LONG_PERIOD: usize = 20;
pub const RSI_PERIOD: usize = 14;
pub const RSI_NEUTRAL: f64 = 50.0;
pub const MACD_FAST_PERIOD: usize = 12;
pub const MACD_SLOW_PERIOD: usize = 26;
pub const MACD_SIGNAL_PERIOD: usize = 9;
pub const BOLLINGER_PERIOD: usize = 20;
pub const BOLLINGER_STD_DEVS: f64 = 2.0;

// Model parameters
pub const HIDDEN_SIZE: usize = 50;
pub const DENSE_HIDDEN_SIZE: usize = 25;
pub const DROPOUT_RATE: f64 = 0.2;

// Training defaults
pub const DEFAULT_WINDOW_SIZE: usize = 30;
pub const DEFAULT_EPOCHS: usize = 50;
pub const DEFAULT_LEARNING_RATE: f64 = 0.001;
pub const DEFAULT_BATCH_SIZE: usize = 32;
pub const DEFAULT_PREDICTION_DAYS: usize = 5;
pub const DEFAULT_SEED: u64 = 42;

// Data preprocessing
pub const TRAIN_SPLIT_RATIO: f64 = 0.8; // 80% of windows for training
pub const MIN_HISTORY_BARS: usize = 60;
