pub mod constants;
pub mod daily;
pub mod error;
pub mod forecast;
pub mod util {
    pub mod business_days;
    pub mod feature_engineering;
    pub mod model_logger;
    pub mod pre_processor;
    #[cfg(test)]
    pub mod test_utils;
}

pub use error::{DataSourceError, ForecastError, Result};
pub use forecast::config::ForecastConfig;
pub use forecast::orchestrator::{run_forecast, ForecastPoint, ForecastResult};
pub use forecast::progress::{NoopSink, Phase, ProgressEvent, ProgressSink};
pub use forecast::task::{spawn_forecast, ForecastTask};
pub use util::feature_engineering::PriceBar;
