// External imports
use burn::tensor::{backend::Backend, Tensor};
use log::{debug, info};

// Internal imports
use super::step_1_tensor_preparation::{FeatureScalers, ForecastStrategy, WindowedDataset};
use super::step_3_lstm_model_arch::DailyLSTMModel;
use crate::error::{ForecastError, Result};

/// Make a prediction using the trained LSTM model
///
/// # Arguments
///
/// * `model` - Trained LSTM model
/// * `input_data` - Input tensor of shape [batch_size, sequence_length, input_size]
///
/// # Returns
///
/// Returns a tensor of shape [batch_size, output_size] in normalized units
pub fn predict_with_model<B: Backend>(
    model: &DailyLSTMModel<B>,
    input_data: Tensor<B, 3>,
) -> Tensor<B, 2> {
    model.predict(input_data)
}

fn tensor_values<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Result<Vec<f32>> {
    tensor
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| ForecastError::Training(format!("failed to read model output: {e:?}")))
}

/// Root mean squared error over paired values, `None` when the slices are
/// empty or of different lengths
pub fn calculate_rmse(actual: &[f64], predicted: &[f64]) -> Option<f64> {
    if actual.is_empty() || actual.len() != predicted.len() {
        return None;
    }
    let sum_squared: f64 = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).powi(2))
        .sum();
    Some((sum_squared / actual.len() as f64).sqrt())
}

/// Test-set RMSE in price units.
///
/// Predictions and targets are both mapped back through the close scaler, and
/// every predicted horizon step counts as one pair.
pub fn evaluate_model<B: Backend>(
    model: &DailyLSTMModel<B>,
    test: &WindowedDataset,
    scalers: &FeatureScalers,
    device: &B::Device,
) -> Result<f64> {
    if test.is_empty() {
        return Err(ForecastError::InsufficientData {
            available: test.len(),
            window_size: test.window_size(),
            prediction_days: test.output_size(),
        });
    }

    let (features, _) = test.to_tensors::<B>(device);
    let predicted: Vec<f64> = tensor_values(predict_with_model(model, features))?
        .into_iter()
        .map(|v| scalers.inverse_transform_close(v as f64))
        .collect();
    let actual: Vec<f64> = test
        .targets()
        .iter()
        .map(|&v| scalers.inverse_transform_close(v as f64))
        .collect();

    let rmse = calculate_rmse(&actual, &predicted).ok_or_else(|| {
        ForecastError::Training(format!(
            "model produced {} values for {} targets",
            predicted.len(),
            actual.len()
        ))
    })?;
    if !rmse.is_finite() {
        return Err(ForecastError::Training(format!(
            "test RMSE is {rmse}; the model output is not finite"
        )));
    }

    info!("Test RMSE over {} examples: {:.4}", test.len(), rmse);
    Ok(rmse)
}

/// Forecast the next `prediction_days` closes in price units.
///
/// With [`ForecastStrategy::IterativeClose`] the model predicts one day, the
/// prediction is appended to the window and the oldest bar dropped, repeated
/// `prediction_days` times. Direct strategies run a single inference whose
/// outputs are the whole horizon.
///
/// # Arguments
///
/// * `model` - Trained model
/// * `last_window` - Normalized, bar-major values of the most recent window
/// * `scalers` - Scalers fitted on the training history
/// * `strategy` - Strategy the model was trained with
/// * `prediction_days` - Horizon length
/// * `device` - Device to place tensors on
pub fn predict_future<B: Backend>(
    model: &DailyLSTMModel<B>,
    last_window: &[f32],
    scalers: &FeatureScalers,
    strategy: ForecastStrategy,
    prediction_days: usize,
    device: &B::Device,
) -> Result<Vec<f64>> {
    let num_features = model.input_size();
    if num_features == 0 || last_window.is_empty() || last_window.len() % num_features != 0 {
        return Err(ForecastError::Training(format!(
            "input window of {} values does not match {} features per bar",
            last_window.len(),
            num_features
        )));
    }
    let window_size = last_window.len() / num_features;

    let normalized = match strategy {
        ForecastStrategy::IterativeClose => {
            let mut window = last_window.to_vec();
            let mut outputs = Vec::with_capacity(prediction_days);
            for day in 0..prediction_days {
                let input = Tensor::<B, 1>::from_data(window.as_slice(), device)
                    .reshape([1, window_size, num_features]);
                let next = tensor_values(predict_with_model(model, input))?
                    .first()
                    .copied()
                    .ok_or_else(|| ForecastError::Training("model produced no output".into()))?;
                debug!("Day {} normalized prediction {:.6}", day + 1, next);

                outputs.push(next);
                window.rotate_left(1);
                if let Some(last) = window.last_mut() {
                    *last = next;
                }
            }
            outputs
        }
        ForecastStrategy::Direct(_) => {
            let input = Tensor::<B, 1>::from_data(last_window, device)
                .reshape([1, window_size, num_features]);
            let outputs = tensor_values(predict_with_model(model, input))?;
            if outputs.len() < prediction_days {
                return Err(ForecastError::Training(format!(
                    "model predicts {} days, {} requested",
                    outputs.len(),
                    prediction_days
                )));
            }
            outputs.into_iter().take(prediction_days).collect()
        }
    };

    Ok(normalized
        .into_iter()
        .map(|v| scalers.inverse_transform_close(v as f64))
        .collect())
}
