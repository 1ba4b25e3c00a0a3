use chrono::{Datelike, Days, NaiveDate, Weekday};

/// Returns the `count` business days following `last_date`, skipping
/// Saturdays and Sundays. Market holidays are not considered.
pub fn next_business_days(last_date: NaiveDate, count: usize) -> Vec<NaiveDate> {
    let mut dates = Vec::with_capacity(count);
    let mut current = last_date;
    while dates.len() < count {
        current = match current.checked_add_days(Days::new(1)) {
            Some(next) => next,
            None => break,
        };
        if !matches!(current.weekday(), Weekday::Sat | Weekday::Sun) {
            dates.push(current);
        }
    }
    dates
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_skips_weekend() {
        // Thursday 2024-03-07
        let dates = next_business_days(date(2024, 3, 7), 3);
        assert_eq!(dates, vec![date(2024, 3, 8), date(2024, 3, 11), date(2024, 3, 12)]);
    }

    #[test]
    fn test_from_saturday() {
        let dates = next_business_days(date(2024, 3, 9), 1);
        assert_eq!(dates, vec![date(2024, 3, 11)]);
    }

    #[test]
    fn test_zero_days() {
        assert!(next_business_days(date(2024, 3, 9), 0).is_empty());
    }
}
