// External imports
use serde::{Deserialize, Serialize};

// Internal imports
use crate::constants::{
    DEFAULT_BATCH_SIZE, DEFAULT_EPOCHS, DEFAULT_LEARNING_RATE, DEFAULT_PREDICTION_DAYS,
    DEFAULT_SEED, DEFAULT_WINDOW_SIZE, DENSE_HIDDEN_SIZE, DROPOUT_RATE, HIDDEN_SIZE,
    TRAIN_SPLIT_RATIO,
};
use crate::daily::lstm::step_1_tensor_preparation::ForecastStrategy;
use crate::daily::lstm::step_3_lstm_model_arch::DailyLSTMModelConfig;
use crate::daily::lstm::step_4_train_model::TrainingConfig;
use crate::util::feature_engineering::FeatureSet;

/// Parameters of one forecasting run
///
/// Missing fields take their defaults when deserialized, so a JSON file only
/// needs the values it overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    /// Bars per input window
    pub window_size: usize,
    pub epochs: usize,
    pub learning_rate: f64,
    pub batch_size: usize,
    /// Business days to forecast
    pub prediction_days: usize,
    pub strategy: ForecastStrategy,
    /// Share of window examples used for training, the rest is the test set
    pub train_ratio: f64,
    pub hidden_size: usize,
    pub dropout_rate: f64,
    pub seed: u64,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            epochs: DEFAULT_EPOCHS,
            learning_rate: DEFAULT_LEARNING_RATE,
            batch_size: DEFAULT_BATCH_SIZE,
            prediction_days: DEFAULT_PREDICTION_DAYS,
            strategy: ForecastStrategy::Direct(FeatureSet::OhlcvWithIndicators),
            train_ratio: TRAIN_SPLIT_RATIO,
            hidden_size: HIDDEN_SIZE,
            dropout_rate: DROPOUT_RATE,
            seed: DEFAULT_SEED,
        }
    }
}

impl ForecastConfig {
    pub fn from_json_str(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn model_config(&self) -> DailyLSTMModelConfig {
        let dense = self.strategy.uses_dense_head().then_some(DENSE_HIDDEN_SIZE);
        DailyLSTMModelConfig::new(
            self.strategy.num_features(),
            self.hidden_size,
            self.strategy.output_size(self.prediction_days),
            self.dropout_rate,
        )
        .with_dense_hidden_size(dense)
        .with_close_index(self.strategy.close_index())
    }

    pub fn training_config(&self) -> TrainingConfig {
        TrainingConfig {
            learning_rate: self.learning_rate,
            batch_size: self.batch_size,
            epochs: self.epochs,
            seed: self.seed,
        }
    }
}
