// External crates
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// Internal modules
use crate::error::{ForecastError, Result};
use crate::util::feature_engineering::{EnrichedBar, Feature, FeatureSet};

/// How the model consumes history and produces the horizon
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode", content = "features")]
pub enum ForecastStrategy {
    /// Univariate close windows, one output, rolled forward one day at a time
    IterativeClose,
    /// Multivariate windows, one output per prediction day, single inference
    Direct(FeatureSet),
}

impl ForecastStrategy {
    /// Features fed to the model for every bar of a window
    pub fn features(self) -> &'static [Feature] {
        match self {
            ForecastStrategy::IterativeClose => &[Feature::Close],
            ForecastStrategy::Direct(feature_set) => feature_set.features(),
        }
    }

    pub fn num_features(self) -> usize {
        self.features().len()
    }

    /// Position of the close price within a window row
    pub fn close_index(self) -> usize {
        self.features()
            .iter()
            .position(|feature| *feature == Feature::Close)
            .unwrap_or(0)
    }

    /// Width of the model's output layer
    pub fn output_size(self, prediction_days: usize) -> usize {
        match self {
            ForecastStrategy::IterativeClose => 1,
            ForecastStrategy::Direct(_) => prediction_days,
        }
    }

    /// Whether the model gets a dense hidden layer before the projection
    pub fn uses_dense_head(self) -> bool {
        matches!(
            self,
            ForecastStrategy::Direct(FeatureSet::OhlcvWithIndicators)
        )
    }
}

/// Min/max scaler of a single feature
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Scaler {
    pub min: f64,
    pub max: f64,
    /// `max - min`, or 1 for a constant feature; always positive
    pub range: f64,
}

impl Scaler {
    /// Fit a scaler to the given values, `None` if there are none
    pub fn fit<I: IntoIterator<Item = f64>>(values: I) -> Option<Self> {
        let mut iter = values.into_iter();
        let first = iter.next()?;
        let (min, max) = iter.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v)));
        let range = if max - min == 0.0 { 1.0 } else { max - min };
        Some(Self { min, max, range })
    }

    pub fn transform(&self, value: f64) -> f64 {
        (value - self.min) / self.range
    }

    pub fn inverse_transform(&self, value: f64) -> f64 {
        value * self.range + self.min
    }
}

/// Per-feature scalers fitted on a run's enriched bars.
///
/// The close scaler is always present since model outputs are closes.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureScalers {
    features: Vec<Feature>,
    scalers: BTreeMap<Feature, Scaler>,
}

impl FeatureScalers {
    /// Compute min/max of every active feature across all bars
    pub fn fit(bars: &[EnrichedBar], features: &[Feature]) -> Option<Self> {
        let mut scalers = BTreeMap::new();
        for &feature in features.iter().chain(std::iter::once(&Feature::Close)) {
            if scalers.contains_key(&feature) {
                continue;
            }
            let scaler = Scaler::fit(bars.iter().map(|bar| feature.value(bar)))?;
            debug!(
                "Scaler {}: min={:.4} max={:.4} range={:.4}",
                feature.name(),
                scaler.min,
                scaler.max,
                scaler.range
            );
            scalers.insert(feature, scaler);
        }

        Some(Self {
            features: features.to_vec(),
            scalers,
        })
    }

    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    pub fn get(&self, feature: Feature) -> Option<&Scaler> {
        self.scalers.get(&feature)
    }

    pub fn close(&self) -> &Scaler {
        // fit() always inserts the close scaler
        &self.scalers[&Feature::Close]
    }

    /// Normalized values of the active features of one bar, in feature order
    pub fn transform(&self, bar: &EnrichedBar) -> Vec<f64> {
        self.features
            .iter()
            .map(|&feature| self.scalers[&feature].transform(feature.value(bar)))
            .collect()
    }

    pub fn transform_value(&self, feature: Feature, value: f64) -> Option<f64> {
        self.get(feature).map(|scaler| scaler.transform(value))
    }

    /// Map a normalized close back to price scale
    pub fn inverse_transform_close(&self, value: f64) -> f64 {
        self.close().inverse_transform(value)
    }
}

/// Borrowed view of one window example
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowExample<'a> {
    /// `window_size * num_features` values, bar-major
    pub input: &'a [f32],
    /// One value per model output
    pub target: &'a [f32],
}

/// Window examples stored as contiguous row-major buffers
#[derive(Debug, Clone, PartialEq)]
pub struct WindowedDataset {
    window_size: usize,
    num_features: usize,
    output_size: usize,
    inputs: Vec<f32>,
    targets: Vec<f32>,
}

impl WindowedDataset {
    pub fn len(&self) -> usize {
        if self.output_size == 0 {
            return 0;
        }
        self.targets.len() / self.output_size
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn num_features(&self) -> usize {
        self.num_features
    }

    pub fn output_size(&self) -> usize {
        self.output_size
    }

    fn input_stride(&self) -> usize {
        self.window_size * self.num_features
    }

    pub fn example(&self, index: usize) -> Option<WindowExample<'_>> {
        if index >= self.len() {
            return None;
        }
        let stride = self.input_stride();
        Some(WindowExample {
            input: &self.inputs[index * stride..(index + 1) * stride],
            target: &self.targets[index * self.output_size..(index + 1) * self.output_size],
        })
    }

    pub fn targets(&self) -> &[f32] {
        &self.targets
    }

    /// Split into `[0, index)` and `[index, len)`, preserving order
    pub fn split_at(mut self, index: usize) -> (Self, Self) {
        let index = index.min(self.len());
        let test_inputs = self.inputs.split_off(index * self.input_stride());
        let test_targets = self.targets.split_off(index * self.output_size);
        let test = Self {
            window_size: self.window_size,
            num_features: self.num_features,
            output_size: self.output_size,
            inputs: test_inputs,
            targets: test_targets,
        };
        (self, test)
    }

    /// Whole dataset as `[n, window_size, num_features]` and `[n, output_size]`
    pub fn to_tensors<B: Backend>(&self, device: &B::Device) -> (Tensor<B, 3>, Tensor<B, 2>) {
        let n = self.len();
        let features = Tensor::<B, 1>::from_data(self.inputs.as_slice(), device).reshape([
            n,
            self.window_size,
            self.num_features,
        ]);
        let targets = Tensor::<B, 1>::from_data(self.targets.as_slice(), device)
            .reshape([n, self.output_size]);
        (features, targets)
    }

    /// Gather the given examples into a mini-batch
    pub fn batch<B: Backend>(
        &self,
        indices: &[usize],
        device: &B::Device,
    ) -> (Tensor<B, 3>, Tensor<B, 2>) {
        let stride = self.input_stride();
        let mut x_data = Vec::with_capacity(indices.len() * stride);
        let mut y_data = Vec::with_capacity(indices.len() * self.output_size);
        for &i in indices {
            x_data.extend_from_slice(&self.inputs[i * stride..(i + 1) * stride]);
            let targets = &self.targets[i * self.output_size..(i + 1) * self.output_size];
            y_data.extend_from_slice(targets);
        }

        let features = Tensor::<B, 1>::from_data(x_data.as_slice(), device).reshape([
            indices.len(),
            self.window_size,
            self.num_features,
        ]);
        let targets = Tensor::<B, 1>::from_data(y_data.as_slice(), device)
            .reshape([indices.len(), self.output_size]);
        (features, targets)
    }
}

/// Single-step windows over a univariate series: `values[i..i+w]` predicts
/// `values[i+w]`
pub fn build_iterative_windows(values: &[f64], window_size: usize) -> Result<WindowedDataset> {
    let num_samples = if window_size > 0 {
        values.len().saturating_sub(window_size)
    } else {
        0
    };
    if num_samples == 0 {
        return Err(ForecastError::InsufficientData {
            available: values.len(),
            window_size,
            prediction_days: 1,
        });
    }

    let mut inputs = Vec::with_capacity(num_samples * window_size);
    let mut targets = Vec::with_capacity(num_samples);
    for i in 0..num_samples {
        inputs.extend(values[i..i + window_size].iter().map(|&v| v as f32));
        targets.push(values[i + window_size] as f32);
    }

    Ok(WindowedDataset {
        window_size,
        num_features: 1,
        output_size: 1,
        inputs,
        targets,
    })
}

/// Direct multi-step windows: rows `[i, i+w)` predict the closes of rows
/// `[i+w, i+w+p)`
///
/// # Arguments
///
/// * `rows` - Normalized feature vectors, one per bar, all the same width
/// * `closes` - Normalized closes aligned with `rows`
/// * `window_size` - Bars per input window
/// * `prediction_days` - Horizon length
pub fn build_direct_windows(
    rows: &[Vec<f64>],
    closes: &[f64],
    window_size: usize,
    prediction_days: usize,
) -> Result<WindowedDataset> {
    let length = rows.len().min(closes.len());
    let fits = window_size > 0 && prediction_days > 0 && length >= window_size + prediction_days;
    let num_samples = if fits {
        length - window_size - prediction_days + 1
    } else {
        0
    };
    if num_samples == 0 {
        return Err(ForecastError::InsufficientData {
            available: length,
            window_size,
            prediction_days,
        });
    }

    let num_features = rows[0].len();
    let mut inputs = Vec::with_capacity(num_samples * window_size * num_features);
    let mut targets = Vec::with_capacity(num_samples * prediction_days);
    for i in 0..num_samples {
        for row in &rows[i..i + window_size] {
            inputs.extend(row.iter().map(|&v| v as f32));
        }
        targets.extend(
            closes[i + window_size..i + window_size + prediction_days]
                .iter()
                .map(|&v| v as f32),
        );
    }

    Ok(WindowedDataset {
        window_size,
        num_features,
        output_size: prediction_days,
        inputs,
        targets,
    })
}

/// Normalize enriched bars and window them for the given strategy
pub fn prepare_windows(
    bars: &[EnrichedBar],
    scalers: &FeatureScalers,
    strategy: ForecastStrategy,
    window_size: usize,
    prediction_days: usize,
) -> Result<WindowedDataset> {
    let closes: Vec<f64> = bars
        .iter()
        .map(|bar| scalers.close().transform(bar.bar.close))
        .collect();

    match strategy {
        ForecastStrategy::IterativeClose => build_iterative_windows(&closes, window_size),
        ForecastStrategy::Direct(_) => {
            let rows: Vec<Vec<f64>> = bars.iter().map(|bar| scalers.transform(bar)).collect();
            build_direct_windows(&rows, &closes, window_size, prediction_days)
        }
    }
}

/// The most recent `window_size` bars as a normalized, bar-major input window
pub fn latest_window(
    bars: &[EnrichedBar],
    scalers: &FeatureScalers,
    strategy: ForecastStrategy,
    window_size: usize,
) -> Result<Vec<f32>> {
    if window_size == 0 || bars.len() < window_size {
        return Err(ForecastError::InsufficientData {
            available: bars.len(),
            window_size,
            prediction_days: 0,
        });
    }

    let recent = &bars[bars.len() - window_size..];
    let window = match strategy {
        ForecastStrategy::IterativeClose => recent
            .iter()
            .map(|bar| scalers.close().transform(bar.bar.close) as f32)
            .collect(),
        ForecastStrategy::Direct(_) => recent
            .iter()
            .flat_map(|bar| scalers.transform(bar))
            .map(|v| v as f32)
            .collect(),
    };
    Ok(window)
}

/// Chronological train/test split: the first `floor(n * train_ratio)`
/// examples train, the rest test
pub fn split_train_test(
    dataset: WindowedDataset,
    train_ratio: f64,
) -> Result<(WindowedDataset, WindowedDataset)> {
    let n = dataset.len();
    let split_index = ((n as f64 * train_ratio).floor().max(0.0) as usize).min(n);
    let (train, test) = dataset.split_at(split_index);

    if train.is_empty() || test.is_empty() {
        return Err(ForecastError::EmptyPartition {
            train: train.len(),
            test: test.len(),
        });
    }
    Ok((train, test))
}
