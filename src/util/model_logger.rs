use anyhow::{Context, Result};
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::daily::lstm::step_1_tensor_preparation::ForecastStrategy;
use crate::forecast::config::ForecastConfig;
use crate::forecast::orchestrator::{ForecastPoint, ForecastResult};

/// Record of one forecasting run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastReport {
    pub timestamp: String,
    pub symbol: String,
    pub config: ForecastConfig,
    pub bars_used: usize,
    pub test_rmse: f64,
    pub final_loss: Option<f64>,
    pub training_time_seconds: Option<f64>,
    pub predictions: Vec<ForecastPoint>,
    pub notes: String,
}

impl ForecastReport {
    pub fn new(
        symbol: &str,
        config: &ForecastConfig,
        bars_used: usize,
        result: &ForecastResult,
    ) -> Self {
        Self {
            timestamp: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            symbol: symbol.to_string(),
            config: config.clone(),
            bars_used,
            test_rmse: result.rmse,
            final_loss: result.loss_history.last().copied(),
            training_time_seconds: None,
            predictions: result.predictions.clone(),
            notes: String::new(),
        }
    }

    pub fn set_training_time(&mut self, seconds: f64) {
        self.training_time_seconds = Some(seconds);
    }

    pub fn add_note(&mut self, note: &str) {
        if !self.notes.is_empty() {
            self.notes.push('\n');
        }
        self.notes.push_str(note);
    }

    fn file_name(&self) -> String {
        let mode = match self.config.strategy {
            ForecastStrategy::IterativeClose => "iterative",
            ForecastStrategy::Direct(_) => "direct",
        };
        format!(
            "{}_{}_w{}_p{}_forecast.json",
            self.symbol, mode, self.config.window_size, self.config.prediction_days
        )
    }

    /// Write the report as pretty JSON into `report_dir`
    pub fn save(&self, report_dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(report_dir)
            .with_context(|| format!("Failed to create {}", report_dir.display()))?;

        let file_path = report_dir.join(self.file_name());
        let json = serde_json::to_string_pretty(&self)?;
        let mut file = fs::File::create(&file_path)
            .with_context(|| format!("Failed to create {}", file_path.display()))?;
        file.write_all(json.as_bytes())?;

        Ok(file_path)
    }
}

/// Timestamped directory for the reports of one session
pub fn create_report_dir(base: &Path) -> Result<PathBuf> {
    let dir = base.join(Local::now().format("%Y%m%d_%H%M%S").to_string());
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn sample_result() -> ForecastResult {
        ForecastResult {
            predictions: vec![ForecastPoint {
                date: NaiveDate::from_ymd_opt(2024, 5, 6).unwrap(),
                price: 101.25,
            }],
            rmse: 1.5,
            loss_history: vec![0.3, 0.1],
        }
    }

    #[test]
    fn test_report_round_trips_through_disk() {
        let dir = TempDir::new().unwrap();
        let config = ForecastConfig::default();
        let mut report = ForecastReport::new("ACME", &config, 250, &sample_result());
        report.set_training_time(2.5);
        report.add_note("first");
        report.add_note("second");

        let path = report.save(dir.path()).unwrap();
        assert!(path.ends_with("ACME_direct_w30_p5_forecast.json"));

        let loaded: ForecastReport =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded, report);
        assert_eq!(loaded.final_loss, Some(0.1));
        assert_eq!(loaded.notes, "first\nsecond");
    }

    #[test]
    fn test_create_report_dir() {
        let base = TempDir::new().unwrap();
        let dir = create_report_dir(base.path()).unwrap();
        assert!(dir.is_dir());
        assert!(dir.starts_with(base.path()));
    }
}
