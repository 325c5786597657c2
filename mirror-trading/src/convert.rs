//! Record-to-action conversion.
//!
//! | Record                                   | Action            |
//! |------------------------------------------|-------------------|
//! | Buy                                      | BUY dollar amount |
//! | Sell                                     | SELL full close   |
//! | Rebalance, resulting weight <= 0         | SELL full close   |
//! | Rebalance, weight change > deadband      | BUY dollar amount |
//! | Rebalance, reduction still held          | dropped           |
//! | Rebalance, weight change within deadband | dropped           |
//! | Unknown                                  | BUY on the picks table, otherwise dropped |
//!
//! A symbol yields at most one action. When it has both signals the SELL
//! wins, and the action keeps the position of the symbol's first record.

use crate::execution::{Side, TradeAction};
use mirror_scraper::{Action, PortfolioRecord};
use std::collections::HashMap;

/// Conversion policy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConverterConfig {
    /// Dollars attached to every BUY
    pub dollar_amount: f64,
    /// Treat `Unknown` as Buy (the current picks table has no action column)
    pub unknown_as_buy: bool,
    /// Rebalance weight changes at or below this magnitude are ignored
    pub deadband_pct: f64,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            dollar_amount: 500.0,
            unknown_as_buy: false,
            deadband_pct: 0.0,
        }
    }
}

/// Actions plus the records that were set aside.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Conversion {
    pub actions: Vec<TradeAction>,
    /// One line per record that produced no action
    pub warnings: Vec<String>,
}

/// Maps filtered records to a deduplicated action list.
#[derive(Debug, Clone)]
pub struct ActionConverter {
    config: ConverterConfig,
}

impl ActionConverter {
    pub fn new(config: ConverterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ConverterConfig {
        &self.config
    }

    fn signal(&self, record: &PortfolioRecord) -> Result<Side, String> {
        match record.action {
            Action::Buy => Ok(Side::Buy),
            Action::Sell => Ok(Side::Sell),
            Action::Unknown if self.config.unknown_as_buy => Ok(Side::Buy),
            Action::Unknown => Err("unrecognized action".into()),
            Action::Rebalance => {
                if record.resulting_weight.is_some_and(|w| w <= 0.0) {
                    return Ok(Side::Sell);
                }
                match record.weight {
                    None => Err("rebalance without weight change".into()),
                    Some(w) if w.abs() <= self.config.deadband_pct => {
                        Err(format!("rebalance of {w:+.2}% within deadband"))
                    }
                    Some(w) if w > 0.0 => Ok(Side::Buy),
                    Some(w) => match record.resulting_weight {
                        // still held after the cut
                        Some(_) => Err(format!("partial reduction of {w:+.2}% not mirrored")),
                        None => Ok(Side::Sell),
                    },
                }
            }
        }
    }

    /// Convert `records`. The same input always yields the same output.
    pub fn convert(&self, records: &[PortfolioRecord]) -> Conversion {
        let mut order: Vec<&str> = Vec::new();
        let mut sides: HashMap<&str, Side> = HashMap::new();
        let mut warnings = Vec::new();

        for record in records {
            let side = match self.signal(record) {
                Ok(side) => side,
                Err(reason) => {
                    tracing::warn!(symbol = %record.symbol, action = %record.action, reason = %reason, "Record dropped");
                    warnings.push(format!("{} ({}): {reason}", record.symbol, record.action));
                    continue;
                }
            };

            match sides.get_mut(record.symbol.as_str()) {
                Some(existing) => {
                    if *existing != side {
                        tracing::info!(symbol = %record.symbol, "Conflicting signals, SELL wins");
                        *existing = Side::Sell;
                    }
                }
                None => {
                    order.push(&record.symbol);
                    sides.insert(&record.symbol, side);
                }
            }
        }

        let actions = order
            .into_iter()
            .filter_map(|symbol| {
                sides.get(symbol).map(|side| match side {
                    Side::Buy => TradeAction::buy(symbol, self.config.dollar_amount),
                    Side::Sell => TradeAction::close(symbol),
                })
            })
            .collect();

        Conversion { actions, warnings }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::Sizing;
    use proptest::prelude::*;

    fn converter() -> ActionConverter {
        ActionConverter::new(ConverterConfig::default())
    }

    #[test]
    fn test_buy_and_sell() {
        let records = vec![
            PortfolioRecord::new("NEM", Action::Buy).with_weight(2.0),
            PortfolioRecord::new("W", Action::Sell).with_weight(-5.0),
        ];
        let conversion = converter().convert(&records);
        assert_eq!(
            conversion.actions,
            vec![TradeAction::buy("NEM", 500.0), TradeAction::close("W")]
        );
        assert!(conversion.warnings.is_empty());
    }

    #[test]
    fn test_rebalance_rules() {
        let records = vec![
            PortfolioRecord::new("UP", Action::Rebalance)
                .with_weight(0.8)
                .with_resulting_weight(4.2),
            PortfolioRecord::new("OUT", Action::Rebalance)
                .with_weight(-3.0)
                .with_resulting_weight(0.0),
            PortfolioRecord::new("TRIM", Action::Rebalance)
                .with_weight(-0.5)
                .with_resulting_weight(3.6),
            PortfolioRecord::new("CUT", Action::Rebalance).with_weight(-1.5),
            PortfolioRecord::new("BARE", Action::Rebalance),
        ];
        let conversion = converter().convert(&records);
        assert_eq!(
            conversion.actions,
            vec![
                TradeAction::buy("UP", 500.0),
                TradeAction::close("OUT"),
                TradeAction::close("CUT"),
            ]
        );
        assert_eq!(conversion.warnings.len(), 2);
        assert!(conversion.warnings[0].starts_with("TRIM"));
    }

    #[test]
    fn test_deadband_drops_small_rebalance() {
        let converter = ActionConverter::new(ConverterConfig {
            deadband_pct: 0.25,
            ..ConverterConfig::default()
        });
        let records = vec![
            PortfolioRecord::new("NEM", Action::Rebalance).with_weight(0.2),
            PortfolioRecord::new("CAT", Action::Rebalance).with_weight(0.3),
        ];
        let conversion = converter.convert(&records);
        assert_eq!(conversion.actions, vec![TradeAction::buy("CAT", 500.0)]);
        assert_eq!(conversion.warnings.len(), 1);
    }

    #[test]
    fn test_unknown_depends_on_table() {
        let records = vec![PortfolioRecord::new("NEM", Action::Unknown).with_weight(3.1)];
        assert!(converter().convert(&records).actions.is_empty());

        let picks = ActionConverter::new(ConverterConfig {
            unknown_as_buy: true,
            dollar_amount: 250.0,
            ..ConverterConfig::default()
        });
        assert_eq!(
            picks.convert(&records).actions,
            vec![TradeAction::buy("NEM", 250.0)]
        );
    }

    #[test]
    fn test_sell_wins_and_keeps_first_position() {
        let records = vec![
            PortfolioRecord::new("NEM", Action::Buy),
            PortfolioRecord::new("CAT", Action::Buy),
            PortfolioRecord::new("NEM", Action::Sell),
            PortfolioRecord::new("CAT", Action::Buy),
        ];
        let actions = converter().convert(&records).actions;
        assert_eq!(
            actions,
            vec![TradeAction::close("NEM"), TradeAction::buy("CAT", 500.0)]
        );
    }

    fn arb_action() -> impl Strategy<Value = Action> {
        prop_oneof![
            Just(Action::Buy),
            Just(Action::Sell),
            Just(Action::Rebalance),
            Just(Action::Unknown),
        ]
    }

    fn arb_record() -> impl Strategy<Value = PortfolioRecord> {
        (
            prop::sample::select(vec!["NEM", "W", "CAT", "BRK.B"]),
            arb_action(),
            proptest::option::of(-5.0f64..5.0),
            proptest::option::of(0.0f64..6.0),
        )
            .prop_map(|(symbol, action, weight, resulting)| PortfolioRecord {
                symbol: symbol.to_string(),
                date: None,
                action,
                weight,
                resulting_weight: resulting,
                price: None,
            })
    }

    proptest! {
        #[test]
        fn prop_one_action_per_symbol_and_sell_wins(
            records in proptest::collection::vec(arb_record(), 0..30)
        ) {
            let converter = converter();
            let actions = converter.convert(&records).actions;

            let mut seen = std::collections::HashSet::new();
            for action in &actions {
                prop_assert!(seen.insert(action.symbol.clone()));
                let sells = records
                    .iter()
                    .filter(|r| r.symbol == action.symbol)
                    .any(|r| converter.signal(r) == Ok(Side::Sell));
                if sells {
                    prop_assert_eq!(action.side, Side::Sell);
                    prop_assert_eq!(action.sizing, Sizing::FullClose);
                }
            }
        }

        #[test]
        fn prop_conversion_is_deterministic(
            records in proptest::collection::vec(arb_record(), 0..30)
        ) {
            let converter = converter();
            prop_assert_eq!(converter.convert(&records), converter.convert(&records));
        }
    }
}
