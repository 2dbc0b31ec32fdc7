//! Derivation of invoice totals from line items.
//!
//! Amounts come in as major units (dollars) and leave as integer minor units
//! (cents). Rounding happens exactly once per derived amount, at the total
//! level: rounding each line separately drifts away from the rounded sum.

use crate::error::InvoicingError;
use crate::models::{InvoiceTotals, LineItem};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

const MINOR_UNITS_PER_MAJOR: Decimal = Decimal::ONE_HUNDRED;
const MAX_TAX_RATE: Decimal = Decimal::ONE_HUNDRED;
/// Decimal places a tax rate may carry; matches the `tax_rate` column.
const MAX_TAX_RATE_SCALE: u32 = 4;

/// Pure calculator for subtotal, tax and total.
pub struct LineItemCalculator;

impl LineItemCalculator {
    /// Compute the monetary fields for a set of line items.
    ///
    /// `tax_rate` is a percentage between 0 and 100; `None` applies no tax.
    pub fn calculate(
        line_items: &[LineItem],
        tax_rate: Option<Decimal>,
    ) -> Result<InvoiceTotals, InvoicingError> {
        Self::validate(line_items, tax_rate)?;

        let mut amount = Decimal::ZERO;
        for item in line_items {
            amount = item
                .quantity
                .checked_mul(item.rate)
                .and_then(|line| amount.checked_add(line))
                .ok_or_else(overflow)?;
        }

        let subtotal = to_minor_units(
            amount
                .checked_mul(MINOR_UNITS_PER_MAJOR)
                .ok_or_else(overflow)?,
        )?;

        let tax_amount = match tax_rate {
            Some(rate) => {
                let tax = Decimal::from(subtotal)
                    .checked_mul(rate)
                    .and_then(|t| t.checked_div(Decimal::ONE_HUNDRED))
                    .ok_or_else(overflow)?;
                to_minor_units(tax)?
            }
            None => 0,
        };

        let total = subtotal.checked_add(tax_amount).ok_or_else(overflow)?;

        Ok(InvoiceTotals {
            subtotal,
            tax_amount,
            total,
        })
    }

    fn validate(line_items: &[LineItem], tax_rate: Option<Decimal>) -> Result<(), InvoicingError> {
        if line_items.is_empty() {
            return Err(InvoicingError::validation(
                "Invoice must have at least one line item",
            ));
        }

        for (index, item) in line_items.iter().enumerate() {
            let position = index + 1;
            if item.description.trim().is_empty() {
                return Err(InvoicingError::validation(format!(
                    "Line item {} must have a description",
                    position
                )));
            }
            if item.quantity <= Decimal::ZERO {
                return Err(InvoicingError::validation(format!(
                    "Line item {} quantity must be greater than zero",
                    position
                )));
            }
            if item.rate < Decimal::ZERO {
                return Err(InvoicingError::validation(format!(
                    "Line item {} rate must not be negative",
                    position
                )));
            }
        }

        if let Some(rate) = tax_rate {
            if rate < Decimal::ZERO || rate > MAX_TAX_RATE {
                return Err(InvoicingError::validation(
                    "Tax rate must be between 0 and 100",
                ));
            }
            if rate.normalize().scale() > MAX_TAX_RATE_SCALE {
                return Err(InvoicingError::validation(format!(
                    "Tax rate must have at most {} decimal places",
                    MAX_TAX_RATE_SCALE
                )));
            }
        }

        Ok(())
    }
}

/// Round half-up to a whole number of minor units.
fn to_minor_units(value: Decimal) -> Result<i64, InvoicingError> {
    value
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .ok_or_else(overflow)
}

fn overflow() -> InvoicingError {
    InvoicingError::validation("Invoice amount is too large")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn item(description: &str, quantity: Decimal, rate: Decimal) -> LineItem {
        LineItem::new(description, quantity, rate)
    }

    #[test]
    fn computes_subtotal_tax_and_total_in_cents() {
        let items = vec![
            item("Design", dec!(10), dec!(85.50)),
            item("Hosting", dec!(1), dec!(20)),
        ];

        let totals = LineItemCalculator::calculate(&items, Some(dec!(8.25))).unwrap();

        assert_eq!(totals.subtotal, 87_500);
        // 87_500 * 8.25% = 7218.75 -> 7219
        assert_eq!(totals.tax_amount, 7_219);
        assert_eq!(totals.total, 94_719);
    }

    #[test]
    fn no_tax_rate_means_zero_tax() {
        let items = vec![item("Support", dec!(3), dec!(49.99))];

        let totals = LineItemCalculator::calculate(&items, None).unwrap();

        assert_eq!(totals.tax_amount, 0);
        assert_eq!(totals.total, totals.subtotal);
        assert_eq!(totals.subtotal, 14_997);
    }

    #[test]
    fn rounds_once_at_the_subtotal_not_per_line() {
        // Each line is 33.3 cents. Per-line rounding would give 33 * 3 = 99;
        // rounding the exact sum (99.9 cents) gives 100.
        let items = vec![
            item("Widget A", dec!(1), dec!(0.333)),
            item("Widget B", dec!(1), dec!(0.333)),
            item("Widget C", dec!(1), dec!(0.333)),
        ];

        let totals = LineItemCalculator::calculate(&items, None).unwrap();

        let per_line: i64 = items
            .iter()
            .map(|i| to_minor_units(i.quantity * i.rate * dec!(100)).unwrap())
            .sum();
        assert_eq!(per_line, 99);
        assert_eq!(totals.subtotal, 100);
    }

    #[test]
    fn half_cent_rounds_up() {
        let items = vec![item("Half", dec!(1), dec!(0.005))];
        assert_eq!(LineItemCalculator::calculate(&items, None).unwrap().subtotal, 1);

        let items = vec![item("Base", dec!(1), dec!(0.10))];
        // 10 cents at 5% = 0.5 cents -> 1
        let totals = LineItemCalculator::calculate(&items, Some(dec!(5))).unwrap();
        assert_eq!(totals.tax_amount, 1);
    }

    #[test]
    fn fractional_quantities_are_supported() {
        let items = vec![item("Hours", dec!(2.5), dec!(120))];
        let totals = LineItemCalculator::calculate(&items, Some(dec!(10))).unwrap();
        assert_eq!(totals.subtotal, 30_000);
        assert_eq!(totals.tax_amount, 3_000);
        assert_eq!(totals.total, 33_000);
    }

    #[test]
    fn is_idempotent() {
        let items = vec![
            item("A", dec!(1.25), dec!(19.99)),
            item("B", dec!(7), dec!(0.07)),
        ];
        let first = LineItemCalculator::calculate(&items, Some(dec!(12.5))).unwrap();
        let second = LineItemCalculator::calculate(&items, Some(dec!(12.5))).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn total_is_always_subtotal_plus_tax() {
        let rates = [
            None,
            Some(dec!(0)),
            Some(dec!(7.5)),
            Some(dec!(19)),
            Some(dec!(100)),
        ];
        let quantities = [dec!(0.5), dec!(1), dec!(3), dec!(12.75)];
        let prices = [dec!(0), dec!(0.01), dec!(9.99), dec!(1234.567)];

        for rate in rates {
            for quantity in quantities {
                for price in prices {
                    let items = vec![
                        item("x", quantity, price),
                        item("y", dec!(2), dec!(0.015)),
                    ];
                    let totals = LineItemCalculator::calculate(&items, rate).unwrap();
                    assert_eq!(totals.total, totals.subtotal + totals.tax_amount);
                }
            }
        }
    }

    #[test]
    fn zero_rate_lines_are_allowed() {
        let items = vec![item("Complimentary", dec!(1), dec!(0))];
        let totals = LineItemCalculator::calculate(&items, Some(dec!(20))).unwrap();
        assert_eq!(totals, InvoiceTotals::default());
    }

    #[test]
    fn rejects_empty_line_items() {
        let err = LineItemCalculator::calculate(&[], None).unwrap_err();
        assert!(matches!(err, InvoicingError::Validation(_)));
    }

    #[test]
    fn rejects_blank_description() {
        let items = vec![item("   ", dec!(1), dec!(10))];
        let err = LineItemCalculator::calculate(&items, None).unwrap_err();
        assert!(err.to_string().contains("description"));
    }

    #[test]
    fn rejects_non_positive_quantity() {
        for quantity in [dec!(0), dec!(-1)] {
            let items = vec![item("Item", quantity, dec!(10))];
            let err = LineItemCalculator::calculate(&items, None).unwrap_err();
            assert!(err.to_string().contains("quantity"));
        }
    }

    #[test]
    fn rejects_negative_rate() {
        let items = vec![item("Refund", dec!(1), dec!(-5))];
        let err = LineItemCalculator::calculate(&items, None).unwrap_err();
        assert!(err.to_string().contains("rate"));
    }

    #[test]
    fn rejects_tax_rate_out_of_range() {
        let items = vec![item("Item", dec!(1), dec!(10))];
        for rate in [dec!(-0.01), dec!(100.01)] {
            let err = LineItemCalculator::calculate(&items, Some(rate)).unwrap_err();
            assert!(matches!(err, InvoicingError::Validation(_)));
        }
    }

    #[test]
    fn rejects_tax_rate_finer_than_storage_precision() {
        let items = vec![item("Licence", dec!(1000000), dec!(1))];

        let err = LineItemCalculator::calculate(&items, Some(dec!(7.12345))).unwrap_err();
        assert!(err.to_string().contains("decimal places"));

        let totals = LineItemCalculator::calculate(&items, Some(dec!(7.1235))).unwrap();
        assert_eq!(totals.tax_amount, 7_123_500);

        // Trailing zeros do not count against the limit
        assert!(LineItemCalculator::calculate(&items, Some(dec!(7.123400))).is_ok());
    }

    #[test]
    fn rejects_amounts_outside_the_minor_unit_range() {
        let items = vec![item("Everything", dec!(1000000000000), dec!(1000000000000))];
        let err = LineItemCalculator::calculate(&items, None).unwrap_err();
        assert!(matches!(err, InvoicingError::Validation(_)));
    }
}
