// External imports
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::task::JoinHandle;

// Internal imports
use super::config::ForecastConfig;
use super::orchestrator::{run_forecast, ForecastResult};
use super::progress::ProgressEvent;
use crate::error::{ForecastError, Result};
use crate::util::feature_engineering::PriceBar;

/// A forecast running on the blocking thread pool.
///
/// Events arrive in emission order; the channel closes once the run has
/// reached `Done` or `Failed`.
pub struct ForecastTask {
    events: UnboundedReceiver<ProgressEvent>,
    handle: JoinHandle<Result<ForecastResult>>,
}

impl ForecastTask {
    /// Next progress event, `None` after the final one
    pub async fn next_event(&mut self) -> Option<ProgressEvent> {
        self.events.recv().await
    }

    /// Wait for the run to finish
    pub async fn result(self) -> Result<ForecastResult> {
        match self.handle.await {
            Ok(result) => result,
            Err(join_error) => Err(ForecastError::Training(format!(
                "forecast task did not complete: {join_error}"
            ))),
        }
    }
}

/// Start a forecast without blocking the async runtime.
///
/// Must be called from within a tokio runtime. Training is CPU-bound, so the
/// run lives on `spawn_blocking` and reports through an unbounded channel.
pub fn spawn_forecast(bars: Vec<PriceBar>, config: ForecastConfig) -> ForecastTask {
    let (tx, events) = mpsc::unbounded_channel();
    let handle = tokio::task::spawn_blocking(move || run_forecast(&bars, &config, &tx));
    ForecastTask { events, handle }
}
