// External imports
use chrono::NaiveDate;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

// Internal imports
use crate::util::business_days::next_business_days;
use crate::util::feature_engineering::PriceBar;

fn start_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2023, 1, 2).unwrap()
}

fn trading_dates(num_rows: usize) -> Vec<NaiveDate> {
    let mut dates = vec![start_date()];
    dates.extend(next_business_days(start_date(), num_rows.saturating_sub(1)));
    dates.truncate(num_rows);
    dates
}

/// Bars whose close rises by `step` each business day
pub fn linear_bars(num_rows: usize, start_price: f64, step: f64) -> Vec<PriceBar> {
    trading_dates(num_rows)
        .into_iter()
        .enumerate()
        .map(|(i, date)| {
            let close = start_price + step * i as f64;
            PriceBar {
                date,
                open: close - step / 2.0,
                high: close + 1.0,
                low: close - step / 2.0 - 1.0,
                close,
                volume: 100_000.0 + 10.0 * i as f64,
            }
        })
        .collect()
}

/// Bars with the same price every day
pub fn constant_bars(num_rows: usize, price: f64) -> Vec<PriceBar> {
    trading_dates(num_rows)
        .into_iter()
        .map(|date| PriceBar {
            date,
            open: price,
            high: price,
            low: price,
            close: price,
            volume: 50_000.0,
        })
        .collect()
}

/// Seeded random walk with realistic OHLC relationships
pub fn random_walk_bars(num_rows: usize, seed: u64) -> Vec<PriceBar> {
    let mut rng = StdRng::seed_from_u64(seed);

    // Start with a base price around 100
    let mut current_price: f64 = 100.0 + rng.random::<f64>() * 50.0;

    trading_dates(num_rows)
        .into_iter()
        .map(|date| {
            // Random price movement between -1% and +1%
            let movement = (rng.random::<f64>() * 2.0 - 1.0) * 0.01;
            current_price *= 1.0 + movement;

            let open = current_price * (1.0 + (rng.random::<f64>() * 0.01 - 0.005));
            let high = current_price.max(open) * (1.0 + rng.random::<f64>() * 0.005);
            let low = current_price.min(open) * (1.0 - rng.random::<f64>() * 0.005);
            let volume = (rng.random::<u32>() % 100_000 + 10_000) as f64;

            PriceBar {
                date,
                open,
                high,
                low,
                close: current_price,
                volume,
            }
        })
        .collect()
}
