//! Temporal filtering of scraped movements.

use chrono::{Datelike, Days, Local, NaiveDate, Weekday};
use mirror_scraper::PortfolioRecord;
use serde::{Deserialize, Serialize};

/// Which records survive the filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterMode {
    /// Only the most recent Friday on or before the reference date
    Friday,
    /// Only the newest date present in the input
    LatestDate,
    /// No filtering
    All,
}

/// The most recent Friday on or before `reference`.
pub fn target_friday(reference: NaiveDate) -> NaiveDate {
    let weekday = reference.weekday().num_days_from_monday();
    let friday = Weekday::Fri.num_days_from_monday();
    let back = (weekday + 7 - friday) % 7;
    reference - Days::new(u64::from(back))
}

/// Restricts records to one rebalance date.
#[derive(Debug, Clone, Copy)]
pub struct MovementFilter {
    mode: FilterMode,
    reference: NaiveDate,
}

impl MovementFilter {
    /// Filter relative to today's local date.
    pub fn new(mode: FilterMode) -> Self {
        Self::with_reference(mode, Local::now().date_naive())
    }

    pub fn with_reference(mode: FilterMode, reference: NaiveDate) -> Self {
        Self { mode, reference }
    }

    pub fn mode(&self) -> FilterMode {
        self.mode
    }

    pub fn reference(&self) -> NaiveDate {
        self.reference
    }

    /// Date the filter keeps, if it targets a single date.
    pub fn target_date(&self, records: &[PortfolioRecord]) -> Option<NaiveDate> {
        match self.mode {
            FilterMode::Friday => Some(target_friday(self.reference)),
            FilterMode::LatestDate => records
                .iter()
                .filter_map(|r| r.date)
                .filter(|d| *d <= self.reference)
                .max(),
            FilterMode::All => None,
        }
    }

    /// Keep matching records in input order. Undated records never match a
    /// date target. An empty result is a normal outcome.
    pub fn apply(&self, records: Vec<PortfolioRecord>) -> Vec<PortfolioRecord> {
        if self.mode == FilterMode::All {
            return records;
        }

        let Some(target) = self.target_date(&records) else {
            tracing::info!(mode = ?self.mode, "No dated records to filter on");
            return Vec::new();
        };

        let total = records.len();
        let kept: Vec<_> = records
            .into_iter()
            .filter(|r| r.date == Some(target))
            .collect();
        tracing::info!(
            mode = ?self.mode,
            reference = %self.reference,
            target = %target,
            total,
            kept = kept.len(),
            "Movements filtered"
        );
        kept
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mirror_scraper::Action;
    use proptest::prelude::*;
    use test_case::test_case;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test_case(date(2024, 6, 13), date(2024, 6, 7) ; "thursday goes back to previous friday")]
    #[test_case(date(2024, 6, 14), date(2024, 6, 14) ; "friday is its own target")]
    #[test_case(date(2024, 6, 15), date(2024, 6, 14) ; "saturday")]
    #[test_case(date(2024, 6, 17), date(2024, 6, 14) ; "monday")]
    #[test_case(date(2024, 1, 4), date(2023, 12, 29) ; "across year boundary")]
    fn test_target_friday(reference: NaiveDate, expected: NaiveDate) {
        assert_eq!(target_friday(reference), expected);
    }

    #[test]
    fn test_friday_filter_keeps_only_target() {
        let records = vec![
            PortfolioRecord::new("NEM", Action::Buy).on(date(2024, 6, 7)).with_weight(2.0),
            PortfolioRecord::new("W", Action::Sell).on(date(2024, 6, 10)).with_weight(-5.0),
            PortfolioRecord::new("CAT", Action::Buy),
        ];
        let kept = MovementFilter::with_reference(FilterMode::Friday, date(2024, 6, 13)).apply(records);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].symbol, "NEM");
    }

    #[test]
    fn test_no_match_is_empty_not_error() {
        let records = vec![PortfolioRecord::new("NEM", Action::Buy).on(date(2024, 5, 31))];
        let kept = MovementFilter::with_reference(FilterMode::Friday, date(2024, 6, 13)).apply(records);
        assert!(kept.is_empty());
    }

    #[test]
    fn test_latest_date_mode() {
        let records = vec![
            PortfolioRecord::new("NEM", Action::Buy).on(date(2024, 5, 31)),
            PortfolioRecord::new("W", Action::Sell).on(date(2024, 6, 3)),
            PortfolioRecord::new("CAT", Action::Buy).on(date(2024, 6, 3)),
            PortfolioRecord::new("FUTURE", Action::Buy).on(date(2024, 7, 1)),
        ];
        let filter = MovementFilter::with_reference(FilterMode::LatestDate, date(2024, 6, 13));
        assert_eq!(filter.target_date(&records), Some(date(2024, 6, 3)));
        let symbols: Vec<_> = filter.apply(records).into_iter().map(|r| r.symbol).collect();
        assert_eq!(symbols, vec!["W", "CAT"]);
    }

    fn arb_record() -> impl Strategy<Value = PortfolioRecord> {
        (0i64..120, proptest::bool::ANY).prop_map(|(offset, dated)| {
            let record = PortfolioRecord::new("NEM", Action::Buy);
            if dated {
                record.on(date(2024, 3, 1) + chrono::Duration::days(offset))
            } else {
                record
            }
        })
    }

    proptest! {
        #[test]
        fn prop_friday_target_is_unique_friday(offset in 0i64..3650) {
            let reference = date(2020, 1, 1) + chrono::Duration::days(offset);
            let target = target_friday(reference);
            prop_assert_eq!(target.weekday(), Weekday::Fri);
            prop_assert!(target <= reference);
            prop_assert!((reference - target).num_days() < 7);
        }

        #[test]
        fn prop_friday_mode_keeps_only_target(
            records in proptest::collection::vec(arb_record(), 0..40),
            offset in 0i64..120,
        ) {
            let reference = date(2024, 3, 1) + chrono::Duration::days(offset);
            let target = target_friday(reference);
            let kept = MovementFilter::with_reference(FilterMode::Friday, reference).apply(records.clone());
            prop_assert!(kept.iter().all(|r| r.date == Some(target)));
            let expected = records.iter().filter(|r| r.date == Some(target)).count();
            prop_assert_eq!(kept.len(), expected);
        }

        #[test]
        fn prop_all_mode_is_identity(records in proptest::collection::vec(arb_record(), 0..40)) {
            let kept = MovementFilter::with_reference(FilterMode::All, date(2024, 6, 13)).apply(records.clone());
            prop_assert_eq!(kept, records);
        }
    }
}
