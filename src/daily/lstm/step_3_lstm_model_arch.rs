// External imports
use burn::module::Module;
use burn::nn::{Dropout, DropoutConfig, Initializer, Linear, LinearConfig};
use burn::tensor::{activation, backend::Backend, Tensor};
use serde::{Deserialize, Serialize};

// Internal imports
use super::step_1_tensor_preparation::ForecastStrategy;
use super::step_2_lstm_cell::DailyLSTM;
use crate::constants::{DENSE_HIDDEN_SIZE, DROPOUT_RATE, HIDDEN_SIZE};

/// Two stacked LSTM layers with dropout and a dense projection.
///
/// The first layer feeds its whole output sequence to the second; only the
/// second layer's final hidden state reaches the head. Windows are shifted so
/// their last row is zero before entering the LSTM, and the head predicts the
/// offset of each output close from the window's last close. An untrained
/// model therefore forecasts the last close, and a steady trend looks the same
/// at every price level.
#[derive(Module, Debug)]
pub struct DailyLSTMModel<B: Backend> {
    // Model hyperparameters
    input_size: usize,
    hidden_size: usize,
    output_size: usize,
    close_index: usize,

    // Model layers
    lstm_1: DailyLSTM<B>,
    dropout_1: Dropout,
    lstm_2: DailyLSTM<B>,
    dropout_2: Dropout,
    dense: Option<Linear<B>>,
    output_layer: Linear<B>,
}

impl<B: Backend> DailyLSTMModel<B> {
    /// Forward pass through the model
    ///
    /// # Arguments
    ///
    /// * `x` - Input tensor of shape [batch_size, sequence_length, input_size]
    /// * `is_training` - Whether the model is in training mode (affects dropout)
    ///
    /// # Returns
    ///
    /// Returns the output tensor of shape [batch_size, output_size]
    pub fn forward(&self, x: Tensor<B, 3>, is_training: bool) -> Tensor<B, 2> {
        let [batch_size, sequence_length, _] = x.dims();

        let last_row = x.clone().narrow(1, sequence_length - 1, 1);
        let last_close = last_row
            .clone()
            .narrow(2, self.close_index, 1)
            .reshape([batch_size, 1]);
        let centered = x - last_row.repeat_dim(1, sequence_length);

        let sequence = self.lstm_1.forward(centered);
        let sequence = if is_training {
            self.dropout_1.forward(sequence)
        } else {
            sequence
        };

        let last_output = self
            .lstm_2
            .forward(sequence)
            .narrow(1, sequence_length - 1, 1)
            .reshape([batch_size, self.hidden_size]);
        let last_output = if is_training {
            self.dropout_2.forward(last_output)
        } else {
            last_output
        };

        let features = match &self.dense {
            Some(dense) => activation::relu(dense.forward(last_output)),
            None => last_output,
        };

        self.output_layer.forward(features) + last_close.repeat_dim(1, self.output_size)
    }

    /// Inference without dropout
    pub fn predict(&self, x: Tensor<B, 3>) -> Tensor<B, 2> {
        self.forward(x, false)
    }

    pub fn input_size(&self) -> usize {
        self.input_size
    }

    pub fn hidden_size(&self) -> usize {
        self.hidden_size
    }

    pub fn output_size(&self) -> usize {
        self.output_size
    }

    pub fn close_index(&self) -> usize {
        self.close_index
    }

    pub fn has_dense_head(&self) -> bool {
        self.dense.is_some()
    }
}

/// Configuration for the DailyLSTMModel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyLSTMModelConfig {
    pub input_size: usize,
    pub hidden_size: usize,
    pub output_size: usize,
    pub dropout_rate: f64,
    /// Width of the dense hidden layer, `None` for a direct projection
    pub dense_hidden_size: Option<usize>,
    /// Feature index of the close price in each input row
    pub close_index: usize,
}

impl DailyLSTMModelConfig {
    pub fn new(
        input_size: usize,
        hidden_size: usize,
        output_size: usize,
        dropout_rate: f64,
    ) -> Self {
        Self {
            input_size,
            hidden_size,
            output_size,
            dropout_rate,
            dense_hidden_size: None,
            close_index: 0,
        }
    }

    pub fn with_dense_hidden_size(mut self, dense_hidden_size: Option<usize>) -> Self {
        self.dense_hidden_size = dense_hidden_size;
        self
    }

    pub fn with_close_index(mut self, close_index: usize) -> Self {
        self.close_index = close_index;
        self
    }

    /// Model shape for a forecasting strategy with default layer sizes
    pub fn for_strategy(strategy: ForecastStrategy, prediction_days: usize) -> Self {
        let dense = strategy.uses_dense_head().then_some(DENSE_HIDDEN_SIZE);
        Self::new(
            strategy.num_features(),
            HIDDEN_SIZE,
            strategy.output_size(prediction_days),
            DROPOUT_RATE,
        )
        .with_dense_hidden_size(dense)
        .with_close_index(strategy.close_index())
    }

    /// Initialize a model from this configuration
    pub fn init<B: Backend>(&self, device: &B::Device) -> DailyLSTMModel<B> {
        let lstm_1 = DailyLSTM::new(self.input_size, self.hidden_size, device);
        let lstm_2 = DailyLSTM::new(self.hidden_size, self.hidden_size, device);
        let dropout_1 = DropoutConfig::new(self.dropout_rate).init();
        let dropout_2 = DropoutConfig::new(self.dropout_rate).init();

        let (dense, head_input) = match self.dense_hidden_size {
            Some(width) => (
                Some(LinearConfig::new(self.hidden_size, width).init(device)),
                width,
            ),
            None => (None, self.hidden_size),
        };
        // Zero offsets until trained
        let output_layer = LinearConfig::new(head_input, self.output_size)
            .with_initializer(Initializer::Zeros)
            .init(device);

        DailyLSTMModel {
            input_size: self.input_size,
            hidden_size: self.hidden_size,
            output_size: self.output_size,
            close_index: self.close_index.min(self.input_size.saturating_sub(1)),
            lstm_1,
            dropout_1,
            lstm_2,
            dropout_2,
            dense,
            output_layer,
        }
    }
}
