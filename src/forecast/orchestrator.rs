// External imports
use burn::tensor::backend::AutodiffBackend;
use burn_autodiff::Autodiff;
use burn_ndarray::{NdArray, NdArrayDevice};
use chrono::NaiveDate;
use log::{info, warn};
use serde::{Deserialize, Serialize};

// Internal imports
use super::config::ForecastConfig;
use super::progress::{emit_guarded, Phase, ProgressEvent, ProgressSink};
use crate::daily::lstm::step_1_tensor_preparation::{
    latest_window, prepare_windows, split_train_test, FeatureScalers,
};
use crate::daily::lstm::step_4_train_model::{into_inference, train_model};
use crate::daily::lstm::step_5_prediction::{evaluate_model, predict_future};
use crate::error::{ForecastError, Result};
use crate::util::business_days::next_business_days;
use crate::util::feature_engineering::{add_technical_indicators, PriceBar};

/// Default training backend: CPU ndarray with autodiff
pub type DefaultBackend = Autodiff<NdArray<f32>>;

/// One forecast business day
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub date: NaiveDate,
    pub price: f64,
}

/// Outcome of a completed run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastResult {
    pub predictions: Vec<ForecastPoint>,
    /// Test-set RMSE in price units
    pub rmse: f64,
    /// Mean training loss per epoch
    pub loss_history: Vec<f64>,
}

/// Current phase of a run plus the sink it reports to
struct RunState<'a> {
    sink: &'a dyn ProgressSink,
    started: bool,
    phase: Phase,
    current_epoch: usize,
    total_epochs: usize,
    rmse: Option<f64>,
}

impl<'a> RunState<'a> {
    fn new(sink: &'a dyn ProgressSink, total_epochs: usize) -> Self {
        Self {
            sink,
            started: false,
            phase: Phase::Idle,
            current_epoch: 0,
            total_epochs,
            rmse: None,
        }
    }

    /// Move to `phase` and report the transition
    fn enter(&mut self, phase: Phase) {
        let exited = self.started.then_some(self.phase);
        self.started = true;
        self.phase = phase;
        info!("{}", phase);
        self.emit(exited);
    }

    fn fail(&mut self, error: &ForecastError) {
        warn!("Forecast failed during {:?}: {}", self.phase, error);
        let exited = Some(self.phase);
        self.phase = Phase::Failed;
        self.emit(exited);
    }

    fn emit(&self, exited: Option<Phase>) {
        let event = ProgressEvent::new(self.phase, self.current_epoch, self.total_epochs)
            .with_rmse(self.rmse)
            .with_exited(exited);
        emit_guarded(self.sink, event);
    }
}

/// Run the full pipeline on the default CPU backend
pub fn run_forecast(
    bars: &[PriceBar],
    config: &ForecastConfig,
    sink: &dyn ProgressSink,
) -> Result<ForecastResult> {
    let device = NdArrayDevice::default();
    run_forecast_with_backend::<DefaultBackend>(bars, config, sink, &device)
}

/// Run the full pipeline: indicators, normalization, windowing, split,
/// training, evaluation and forecast.
///
/// `bars` must be sorted ascending by date without duplicates. Every phase
/// transition emits one progress event naming the phase entered and the one
/// exited, and every epoch emits one more; the last event is always `Done` or
/// `Failed`. A sink that panics loses its event without stopping the run.
pub fn run_forecast_with_backend<B: AutodiffBackend>(
    bars: &[PriceBar],
    config: &ForecastConfig,
    sink: &dyn ProgressSink,
    device: &B::Device,
) -> Result<ForecastResult> {
    let mut state = RunState::new(sink, config.epochs);
    state.enter(Phase::Idle);

    match execute::<B>(bars, config, device, &mut state) {
        Ok(result) => {
            state.enter(Phase::Done);
            Ok(result)
        }
        Err(error) => {
            state.fail(&error);
            Err(error)
        }
    }
}

fn execute<B: AutodiffBackend>(
    bars: &[PriceBar],
    config: &ForecastConfig,
    device: &B::Device,
    state: &mut RunState<'_>,
) -> Result<ForecastResult> {
    let strategy = config.strategy;
    let last_date = bars
        .last()
        .map(|bar| bar.date)
        .ok_or(ForecastError::InsufficientData {
            available: 0,
            window_size: config.window_size,
            prediction_days: config.prediction_days,
        })?;

    state.enter(Phase::FeatureEngineering);
    let enriched = add_technical_indicators(bars);

    state.enter(Phase::Normalizing);
    let feature_names: Vec<&str> = strategy.features().iter().map(|f| f.name()).collect();
    info!("Model features: {}", feature_names.join(", "));
    let scalers = FeatureScalers::fit(&enriched, strategy.features()).ok_or(
        ForecastError::InsufficientData {
            available: enriched.len(),
            window_size: config.window_size,
            prediction_days: config.prediction_days,
        },
    )?;

    state.enter(Phase::Windowing);
    let dataset = prepare_windows(
        &enriched,
        &scalers,
        strategy,
        config.window_size,
        config.prediction_days,
    )?;
    info!("Built {} window examples", dataset.len());

    state.enter(Phase::Splitting);
    let (train, test) = split_train_test(dataset, config.train_ratio)?;
    info!("Split into {} train / {} test examples", train.len(), test.len());

    state.enter(Phase::Training);
    let model = config.model_config().init::<B>(device);
    let (model, loss_history) =
        train_model(model, &train, &config.training_config(), device, state.sink)?;
    state.current_epoch = config.epochs;

    state.enter(Phase::Evaluating);
    let model = into_inference(model);
    let rmse = evaluate_model(&model, &test, &scalers, device)?;
    state.rmse = Some(rmse);

    state.enter(Phase::Forecasting);
    let window = latest_window(&enriched, &scalers, strategy, config.window_size)?;
    let prices = predict_future(
        &model,
        &window,
        &scalers,
        strategy,
        config.prediction_days,
        device,
    )?;
    // Parameters are released before completion is reported
    drop(model);

    let predictions = next_business_days(last_date, prices.len())
        .into_iter()
        .zip(prices)
        .map(|(date, price)| ForecastPoint { date, price })
        .collect();

    Ok(ForecastResult {
        predictions,
        rmse,
        loss_history,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::daily::lstm::step_1_tensor_preparation::ForecastStrategy;
    use crate::forecast::progress::NoopSink;
    use crate::util::feature_engineering::FeatureSet;
    use crate::util::test_utils::{linear_bars, random_walk_bars};
    use chrono::{Datelike, Weekday};
    use std::cell::RefCell;

    fn quick_config(strategy: ForecastStrategy) -> ForecastConfig {
        ForecastConfig {
            window_size: 10,
            epochs: 2,
            batch_size: 16,
            prediction_days: 3,
            strategy,
            hidden_size: 8,
            ..ForecastConfig::default()
        }
    }

    fn collect_events(
        bars: &[PriceBar],
        config: &ForecastConfig,
    ) -> (Result<ForecastResult>, Vec<ProgressEvent>) {
        let (tx, rx) = std::sync::mpsc::channel();
        let result = run_forecast(bars, config, &tx);
        drop(tx);
        (result, rx.iter().collect())
    }

    #[test]
    fn test_phases_in_order() {
        let bars = random_walk_bars(90, 11);
        let config = quick_config(ForecastStrategy::Direct(FeatureSet::OhlcvWithIndicators));
        let (result, events) = collect_events(&bars, &config);
        result.unwrap();

        let phases: Vec<Phase> = events.iter().map(|e| e.phase).collect();
        assert_eq!(
            phases,
            vec![
                Phase::Idle,
                Phase::FeatureEngineering,
                Phase::Normalizing,
                Phase::Windowing,
                Phase::Splitting,
                Phase::Training,
                Phase::Training,
                Phase::Training,
                Phase::Evaluating,
                Phase::Forecasting,
                Phase::Done,
            ]
        );
        // Phases never go backwards
        assert!(phases.windows(2).all(|pair| pair[0] <= pair[1]));
        // Epoch events count up to the total
        let epochs: Vec<usize> = events
            .iter()
            .filter(|e| e.loss.is_some())
            .map(|e| e.current_epoch)
            .collect();
        assert_eq!(epochs, vec![1, 2]);
        assert!(events.last().unwrap().rmse.is_some());

        // Each transition names the phase it leaves
        let transitions: Vec<(Option<Phase>, Phase)> = events
            .iter()
            .filter(|e| e.loss.is_none())
            .map(|e| (e.exited, e.phase))
            .collect();
        assert_eq!(
            transitions,
            vec![
                (None, Phase::Idle),
                (Some(Phase::Idle), Phase::FeatureEngineering),
                (Some(Phase::FeatureEngineering), Phase::Normalizing),
                (Some(Phase::Normalizing), Phase::Windowing),
                (Some(Phase::Windowing), Phase::Splitting),
                (Some(Phase::Splitting), Phase::Training),
                (Some(Phase::Training), Phase::Evaluating),
                (Some(Phase::Evaluating), Phase::Forecasting),
                (Some(Phase::Forecasting), Phase::Done),
            ]
        );
        assert!(events.iter().filter(|e| e.loss.is_some()).all(|e| e.exited.is_none()));
    }

    /// Records every event, then panics on training events
    struct FailingObserver {
        seen: RefCell<Vec<ProgressEvent>>,
    }

    impl ProgressSink for FailingObserver {
        fn emit(&self, event: ProgressEvent) {
            let phase = event.phase;
            self.seen.borrow_mut().push(event);
            if phase == Phase::Training {
                panic!("observer failure during training");
            }
        }
    }

    #[test]
    fn test_panicking_sink_does_not_abort_run() {
        let bars = linear_bars(80, 100.0, 1.0);
        let config = quick_config(ForecastStrategy::IterativeClose);
        let observer = FailingObserver {
            seen: RefCell::new(Vec::new()),
        };

        let result = run_forecast(&bars, &config, &observer).unwrap();
        assert_eq!(result.predictions.len(), 3);
        assert_eq!(result.loss_history.len(), 2);

        let seen = observer.seen.into_inner();
        // Phase entry plus both epochs reached the sink despite panicking
        assert_eq!(seen.iter().filter(|e| e.phase == Phase::Training).count(), 3);
        assert_eq!(seen.last().map(|e| e.phase), Some(Phase::Done));
    }

    #[test]
    fn test_result_dates_are_business_days() {
        let bars = linear_bars(80, 100.0, 1.0);
        let config = quick_config(ForecastStrategy::IterativeClose);
        let result = run_forecast(&bars, &config, &NoopSink).unwrap();

        assert_eq!(result.predictions.len(), 3);
        assert_eq!(result.loss_history.len(), 2);
        assert!(result.rmse.is_finite() && result.rmse >= 0.0);

        let last_date = bars.last().unwrap().date;
        let mut previous = last_date;
        for point in &result.predictions {
            assert!(point.date > previous);
            assert!(!matches!(point.date.weekday(), Weekday::Sat | Weekday::Sun));
            assert!(point.price.is_finite());
            previous = point.date;
        }
    }

    #[test]
    fn test_window_too_large_fails_with_event() {
        let bars = linear_bars(60, 10.0, 0.5);
        let config = ForecastConfig {
            window_size: 58,
            ..quick_config(ForecastStrategy::Direct(FeatureSet::Ohlcv))
        };
        let (result, events) = collect_events(&bars, &config);

        assert!(matches!(result, Err(ForecastError::InsufficientData { .. })));
        let last = events.last().unwrap();
        assert_eq!(last.phase, Phase::Failed);
        assert_eq!(last.exited, Some(Phase::Windowing));
        assert!(events.iter().all(|e| e.phase != Phase::Training));
    }

    #[test]
    fn test_empty_test_partition_fails() {
        // 15 bars, window 10, horizon 3 give three examples; a ratio of 1.0 keeps all of them
        let bars = linear_bars(15, 10.0, 1.0);
        let config = ForecastConfig {
            train_ratio: 1.0,
            ..quick_config(ForecastStrategy::Direct(FeatureSet::Ohlcv))
        };
        let (result, events) = collect_events(&bars, &config);

        assert!(matches!(
            result,
            Err(ForecastError::EmptyPartition { train: 3, test: 0 })
        ));
        assert_eq!(events.last().unwrap().phase, Phase::Failed);
    }

    #[test]
    fn test_no_bars_fails() {
        let config = quick_config(ForecastStrategy::IterativeClose);
        let (result, events) = collect_events(&[], &config);
        assert!(matches!(result, Err(ForecastError::InsufficientData { available: 0, .. })));
        assert_eq!(
            events.iter().map(|e| e.phase).collect::<Vec<_>>(),
            vec![Phase::Idle, Phase::Failed]
        );
    }
}
