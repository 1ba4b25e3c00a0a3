// External crates
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// Local modules
use crate::constants::{
    BOLLINGER_PERIOD, BOLLINGER_STD_DEVS, MACD_FAST_PERIOD, MACD_SIGNAL_PERIOD, MACD_SLOW_PERIOD,
    RSI_NEUTRAL, RSI_PERIOD, SMA_LONG_PERIOD, SMA_SHORT_PERIOD,
};

/// One trading day of OHLCV data
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// A price bar with its technical indicators.
///
/// Every field is defined: where an indicator's lookback is not yet
/// satisfied the bar carries a fallback (close for averages and bands,
/// 50 for RSI, 0 for the MACD family).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnrichedBar {
    pub bar: PriceBar,
    pub sma5: f64,
    pub sma20: f64,
    pub rsi: f64,
    pub macd: f64,
    pub macd_signal: f64,
    pub macd_hist: f64,
    pub bb_upper: f64,
    pub bb_lower: f64,
}

/// Model-visible features of an enriched bar
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    Open,
    High,
    Low,
    Close,
    Volume,
    Sma5,
    Sma20,
    Rsi,
    Macd,
    MacdSignal,
    MacdHist,
    BbUpper,
    BbLower,
}

impl Feature {
    pub const OHLCV: [Feature; 5] = [
        Feature::Open,
        Feature::High,
        Feature::Low,
        Feature::Close,
        Feature::Volume,
    ];

    pub const WITH_INDICATORS: [Feature; 13] = [
        Feature::Open,
        Feature::High,
        Feature::Low,
        Feature::Close,
        Feature::Volume,
        Feature::Sma5,
        Feature::Sma20,
        Feature::Rsi,
        Feature::Macd,
        Feature::MacdSignal,
        Feature::MacdHist,
        Feature::BbUpper,
        Feature::BbLower,
    ];

    /// Column name of the feature
    pub fn name(self) -> &'static str {
        match self {
            Feature::Open => "open",
            Feature::High => "high",
            Feature::Low => "low",
            Feature::Close => "close",
            Feature::Volume => "volume",
            Feature::Sma5 => "sma_5",
            Feature::Sma20 => "sma_20",
            Feature::Rsi => "rsi_14",
            Feature::Macd => "macd",
            Feature::MacdSignal => "macd_signal",
            Feature::MacdHist => "macd_hist",
            Feature::BbUpper => "bb_upper",
            Feature::BbLower => "bb_lower",
        }
    }

    /// Read this feature's value from an enriched bar
    pub fn value(self, bar: &EnrichedBar) -> f64 {
        match self {
            Feature::Open => bar.bar.open,
            Feature::High => bar.bar.high,
            Feature::Low => bar.bar.low,
            Feature::Close => bar.bar.close,
            Feature::Volume => bar.bar.volume,
            Feature::Sma5 => bar.sma5,
            Feature::Sma20 => bar.sma20,
            Feature::Rsi => bar.rsi,
            Feature::Macd => bar.macd,
            Feature::MacdSignal => bar.macd_signal,
            Feature::MacdHist => bar.macd_hist,
            Feature::BbUpper => bar.bb_upper,
            Feature::BbLower => bar.bb_lower,
        }
    }
}

/// Which features feed the model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureSet {
    /// open, high, low, close, volume
    Ohlcv,
    /// OHLCV plus SMA, RSI, MACD and Bollinger features
    OhlcvWithIndicators,
}

impl FeatureSet {
    pub fn features(self) -> &'static [Feature] {
        match self {
            FeatureSet::Ohlcv => &Feature::OHLCV,
            FeatureSet::OhlcvWithIndicators => &Feature::WITH_INDICATORS,
        }
    }

    pub fn len(self) -> usize {
        self.features().len()
    }
}

/// MACD line, signal line and histogram
#[derive(Debug, Clone, PartialEq)]
pub struct MacdSeries {
    pub line: Vec<Option<f64>>,
    pub signal: Vec<Option<f64>>,
    pub histogram: Vec<Option<f64>>,
}

/// Bollinger middle, upper and lower bands
#[derive(Debug, Clone, PartialEq)]
pub struct BollingerBands {
    pub middle: Vec<Option<f64>>,
    pub upper: Vec<Option<f64>>,
    pub lower: Vec<Option<f64>>,
}

/// Simple Moving Average over the trailing `period` values.
///
/// Indices before `period - 1` are `None`.
pub fn calculate_sma(data: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut result = vec![None; data.len()];
    if period == 0 || data.len() < period {
        return result;
    }

    let mut window_sum: f64 = data[..period].iter().sum();
    result[period - 1] = Some(window_sum / period as f64);
    for i in period..data.len() {
        window_sum += data[i] - data[i - period];
        result[i] = Some(window_sum / period as f64);
    }
    result
}

/// Exponential Moving Average seeded with the SMA of the first `period` values
pub fn calculate_ema(data: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut result = vec![None; data.len()];
    if period == 0 || data.len() < period {
        return result;
    }

    let multiplier = 2.0 / (period as f64 + 1.0);
    let mut ema = data[..period].iter().sum::<f64>() / period as f64;
    result[period - 1] = Some(ema);
    for i in period..data.len() {
        ema = (data[i] - ema) * multiplier + ema;
        result[i] = Some(ema);
    }
    result
}

/// Relative Strength Index with Wilder smoothing.
///
/// The first value is reported at index `period`; an average loss of zero
/// maps to 100.
pub fn calculate_rsi(data: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut result = vec![None; data.len()];
    if period == 0 || data.len() <= period {
        return result;
    }

    let deltas: Vec<f64> = data.windows(2).map(|w| w[1] - w[0]).collect();
    let gain = |d: f64| d.max(0.0);
    let loss = |d: f64| (-d).max(0.0);

    let mut avg_gain = deltas[..period].iter().map(|&d| gain(d)).sum::<f64>() / period as f64;
    let mut avg_loss = deltas[..period].iter().map(|&d| loss(d)).sum::<f64>() / period as f64;
    result[period] = Some(rsi_value(avg_gain, avg_loss));

    for i in (period + 1)..data.len() {
        let delta = deltas[i - 1];
        avg_gain = (avg_gain * (period - 1) as f64 + gain(delta)) / period as f64;
        avg_loss = (avg_loss * (period - 1) as f64 + loss(delta)) / period as f64;
        result[i] = Some(rsi_value(avg_gain, avg_loss));
    }
    result
}

fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        return 100.0;
    }
    100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
}

/// Moving Average Convergence Divergence.
///
/// The signal EMA runs over the defined part of the MACD line only and is
/// realigned to the original indices.
pub fn calculate_macd(
    data: &[f64],
    fast_period: usize,
    slow_period: usize,
    signal_period: usize,
) -> MacdSeries {
    let ema_fast = calculate_ema(data, fast_period);
    let ema_slow = calculate_ema(data, slow_period);

    let line: Vec<Option<f64>> = ema_fast
        .iter()
        .zip(ema_slow.iter())
        .map(|(fast, slow)| match (fast, slow) {
            (Some(f), Some(s)) => Some(f - s),
            _ => None,
        })
        .collect();

    let defined: Vec<f64> = line.iter().flatten().copied().collect();
    let mut signal_values = calculate_ema(&defined, signal_period).into_iter();

    let signal: Vec<Option<f64>> = line
        .iter()
        .map(|value| match value {
            Some(_) => signal_values.next().flatten(),
            None => None,
        })
        .collect();

    let histogram = line
        .iter()
        .zip(signal.iter())
        .map(|(l, s)| match (l, s) {
            (Some(l), Some(s)) => Some(l - s),
            _ => None,
        })
        .collect();

    MacdSeries {
        line,
        signal,
        histogram,
    }
}

/// Bollinger Bands using the population standard deviation of the window
pub fn calculate_bollinger_bands(data: &[f64], period: usize, num_std: f64) -> BollingerBands {
    let middle = calculate_sma(data, period);
    let mut upper = vec![None; data.len()];
    let mut lower = vec![None; data.len()];

    for (i, mean) in middle.iter().enumerate() {
        let Some(mean) = *mean else { continue };
        let window = &data[i + 1 - period..=i];
        let variance = window.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / period as f64;
        let std = variance.sqrt();
        upper[i] = Some(mean + num_std * std);
        lower[i] = Some(mean - num_std * std);
    }

    BollingerBands {
        middle,
        upper,
        lower,
    }
}

/// Adds all technical indicators to each bar, substituting fallbacks where
/// an indicator is undefined
pub fn add_technical_indicators(bars: &[PriceBar]) -> Vec<EnrichedBar> {
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();

    let sma5 = calculate_sma(&closes, SMA_SHORT_PERIOD);
    let sma20 = calculate_sma(&closes, SMA_LONG_PERIOD);
    let rsi = calculate_rsi(&closes, RSI_PERIOD);
    let macd = calculate_macd(
        &closes,
        MACD_FAST_PERIOD,
        MACD_SLOW_PERIOD,
        MACD_SIGNAL_PERIOD,
    );
    let bands = calculate_bollinger_bands(&closes, BOLLINGER_PERIOD, BOLLINGER_STD_DEVS);

    bars.iter()
        .enumerate()
        .map(|(i, bar)| EnrichedBar {
            bar: *bar,
            sma5: sma5[i].unwrap_or(bar.close),
            sma20: sma20[i].unwrap_or(bar.close),
            rsi: rsi[i].unwrap_or(RSI_NEUTRAL),
            macd: macd.line[i].unwrap_or(0.0),
            macd_signal: macd.signal[i].unwrap_or(0.0),
            macd_hist: macd.histogram[i].unwrap_or(0.0),
            bb_upper: bands.upper[i].unwrap_or(bar.close),
            bb_lower: bands.lower[i].unwrap_or(bar.close),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::test_utils::{linear_bars, random_walk_bars};

    fn closes(bars: &[PriceBar]) -> Vec<f64> {
        bars.iter().map(|b| b.close).collect()
    }

    #[test]
    fn test_sma_undefined_before_period() {
        let data = [1.0, 2.0, 3.0, 4.0, 5.0];
        let sma = calculate_sma(&data, 3);
        assert_eq!(sma, vec![None, None, Some(2.0), Some(3.0), Some(4.0)]);
    }

    #[test]
    fn test_sma_with_short_history_is_all_undefined() {
        assert!(calculate_sma(&[1.0, 2.0], 5).iter().all(Option::is_none));
        assert!(calculate_sma(&[1.0, 2.0], 0).iter().all(Option::is_none));
    }

    #[test]
    fn test_ema_seeded_with_sma() {
        let data = [2.0, 4.0, 6.0, 8.0];
        let ema = calculate_ema(&data, 3);
        assert_eq!(ema[0], None);
        assert_eq!(ema[1], None);
        assert_eq!(ema[2], Some(4.0));
        // (8 - 4) * 0.5 + 4
        assert_eq!(ema[3], Some(6.0));
    }

    #[test]
    fn test_moving_averages_monotonic_on_rising_series() {
        let data = closes(&linear_bars(120, 1000.0, 2.0));
        for series in [calculate_sma(&data, 5), calculate_ema(&data, 12)] {
            let defined: Vec<f64> = series.into_iter().flatten().collect();
            assert!(!defined.is_empty());
            assert!(defined.windows(2).all(|w| w[1] > w[0]));
        }
    }

    #[test]
    fn test_rsi_bounds_and_alignment() {
        let data = closes(&random_walk_bars(200, 7));
        let rsi = calculate_rsi(&data, 14);
        assert!(rsi[..14].iter().all(Option::is_none));
        for value in rsi[14..].iter() {
            let value = value.expect("RSI should be defined from index 14");
            assert!((0.0..=100.0).contains(&value), "RSI out of range: {}", value);
        }
    }

    #[test]
    fn test_rsi_without_losses_is_100() {
        let data: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let rsi = calculate_rsi(&data, 14);
        assert_eq!(rsi[14], Some(100.0));
        assert_eq!(rsi[29], Some(100.0));
    }

    #[test]
    fn test_rsi_without_gains_is_0() {
        let data: Vec<f64> = (0..30).map(|i| 100.0 - i as f64).collect();
        let rsi = calculate_rsi(&data, 14);
        assert_eq!(rsi[20], Some(0.0));
    }

    #[test]
    fn test_macd_alignment() {
        let data = closes(&random_walk_bars(80, 3));
        let macd = calculate_macd(&data, 12, 26, 9);

        // Line needs the slow EMA (index 25); signal needs 9 line values more
        assert!(macd.line[..25].iter().all(Option::is_none));
        assert!(macd.line[25].is_some());
        assert!(macd.signal[..33].iter().all(Option::is_none));
        assert!(macd.signal[33].is_some());
        assert!(macd.histogram[32].is_none());

        let hist = macd.histogram[40].unwrap();
        let expected = macd.line[40].unwrap() - macd.signal[40].unwrap();
        assert!((hist - expected).abs() < 1e-12);
    }

    #[test]
    fn test_bollinger_band_ordering() {
        let data = closes(&random_walk_bars(150, 11));
        let bands = calculate_bollinger_bands(&data, 20, 2.0);
        for i in 0..data.len() {
            match (bands.upper[i], bands.middle[i], bands.lower[i]) {
                (Some(u), Some(m), Some(l)) => assert!(u >= m && m >= l),
                (None, None, None) => assert!(i < 19),
                _ => panic!("bands defined inconsistently at {}", i),
            }
        }
    }

    #[test]
    fn test_bollinger_uses_population_std() {
        let data = [1.0, 2.0, 3.0, 4.0];
        let bands = calculate_bollinger_bands(&data, 4, 1.0);
        // mean 2.5, population variance 1.25
        let std = 1.25f64.sqrt();
        assert!((bands.upper[3].unwrap() - (2.5 + std)).abs() < 1e-12);
        assert!((bands.lower[3].unwrap() - (2.5 - std)).abs() < 1e-12);
    }

    #[test]
    fn test_enriched_bars_use_fallbacks() {
        let bars = linear_bars(10, 500.0, 1.0);
        let enriched = add_technical_indicators(&bars);
        assert_eq!(enriched.len(), bars.len());

        let first = enriched[0];
        assert_eq!(first.sma5, first.bar.close);
        assert_eq!(first.sma20, first.bar.close);
        assert_eq!(first.rsi, RSI_NEUTRAL);
        assert_eq!(first.macd, 0.0);
        assert_eq!(first.macd_signal, 0.0);
        assert_eq!(first.macd_hist, 0.0);
        assert_eq!(first.bb_upper, first.bar.close);
        assert_eq!(first.bb_lower, first.bar.close);

        // SMA5 becomes defined at index 4: mean of 500..=504
        assert_eq!(enriched[4].sma5, 502.0);
    }

    #[test]
    fn test_feature_set_layout() {
        assert_eq!(FeatureSet::Ohlcv.len(), 5);
        assert_eq!(FeatureSet::OhlcvWithIndicators.len(), 13);
        let names: Vec<&str> = FeatureSet::OhlcvWithIndicators
            .features()
            .iter()
            .map(|f| f.name())
            .collect();
        assert_eq!(&names[..5], &crate::constants::OHLCV_FEATURES);
        assert_eq!(&names[5..], &crate::constants::TECHNICAL_INDICATORS);
    }
}
