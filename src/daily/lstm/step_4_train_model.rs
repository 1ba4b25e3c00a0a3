// External imports
use burn::module::AutodiffModule;
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::cast::ToElement;
use log::{debug, info};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

// Internal imports
use super::step_1_tensor_preparation::WindowedDataset;
use super::step_3_lstm_model_arch::DailyLSTMModel;
use crate::constants::{DEFAULT_BATCH_SIZE, DEFAULT_EPOCHS, DEFAULT_LEARNING_RATE, DEFAULT_SEED};
use crate::error::{ForecastError, Result};
use crate::forecast::progress::{emit_guarded, ProgressEvent, ProgressSink};

/// Configuration for training the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub learning_rate: f64,
    pub batch_size: usize,
    pub epochs: usize,
    /// Seed of the per-epoch example shuffle
    pub seed: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            learning_rate: DEFAULT_LEARNING_RATE,
            batch_size: DEFAULT_BATCH_SIZE,
            epochs: DEFAULT_EPOCHS,
            seed: DEFAULT_SEED,
        }
    }
}

/// Train the model with Adam on mean squared error.
///
/// Examples are shuffled every epoch and split into mini-batches of
/// `batch_size` (the last one may be smaller). The learning rate decays
/// linearly per mini-batch from `learning_rate` towards zero at the last
/// step. One progress event is emitted per epoch carrying the mean batch loss
/// of that epoch.
///
/// # Returns
///
/// The trained model and the per-epoch loss history
pub fn train_model<B: AutodiffBackend>(
    mut model: DailyLSTMModel<B>,
    train: &WindowedDataset,
    config: &TrainingConfig,
    device: &B::Device,
    sink: &dyn ProgressSink,
) -> Result<(DailyLSTMModel<B>, Vec<f64>)> {
    if train.is_empty() {
        return Err(ForecastError::InsufficientData {
            available: train.len(),
            window_size: train.window_size(),
            prediction_days: train.output_size(),
        });
    }

    let batch_size = config.batch_size.max(1);
    let mut optimizer = AdamConfig::new().init::<B, DailyLSTMModel<B>>();
    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut indices: Vec<usize> = (0..train.len()).collect();
    let mut loss_history = Vec::with_capacity(config.epochs);
    let total_steps = config.epochs * train.len().div_ceil(batch_size);
    let mut step = 0;

    info!(
        "Training on {} examples for {} epochs (batch size {}, lr {})",
        train.len(),
        config.epochs,
        batch_size,
        config.learning_rate
    );

    for epoch in 1..=config.epochs {
        indices.shuffle(&mut rng);

        let mut epoch_loss = 0.0;
        let mut num_batches = 0;
        for batch_indices in indices.chunks(batch_size) {
            let (features, targets) = train.batch::<B>(batch_indices, device);

            // Forward pass
            let predictions = model.forward(features, true);
            let diff = predictions - targets;
            let loss_tensor = (diff.clone() * diff).mean();
            let loss = loss_tensor.clone().into_scalar().to_f64();
            if !loss.is_finite() {
                return Err(ForecastError::Training(format!(
                    "loss diverged to {loss} in epoch {epoch}. Try a lower learning rate"
                )));
            }

            // Backward pass and optimizer step
            let grads = GradientsParams::from_grads(loss_tensor.backward(), &model);
            let current_lr = decayed_learning_rate(config.learning_rate, step, total_steps);
            model = optimizer.step(current_lr, model, grads);
            step += 1;

            epoch_loss += loss;
            num_batches += 1;
        }

        let avg_loss = epoch_loss / num_batches as f64;
        debug!("Epoch {}/{} loss {:.6}", epoch, config.epochs, avg_loss);
        loss_history.push(avg_loss);
        emit_guarded(sink, ProgressEvent::epoch(epoch, config.epochs, avg_loss));
    }

    if let Some(final_loss) = loss_history.last() {
        info!("Training finished with loss {:.6}", final_loss);
    }
    Ok((model, loss_history))
}

/// Linear decay over the optimizer steps, counted from 0
fn decayed_learning_rate(learning_rate: f64, step: usize, total_steps: usize) -> f64 {
    let progress = step as f64 / total_steps.max(1) as f64;
    (learning_rate * (1.0 - progress)).max(1e-8)
}

/// Inference copy of a trained model on the inner backend
pub fn into_inference<B: AutodiffBackend>(
    model: DailyLSTMModel<B>,
) -> DailyLSTMModel<B::InnerBackend> {
    model.valid()
}
