//! Landed-cost allocation for purchase lines.

use serde::{Deserialize, Serialize};

use fleetstock_core::{DomainError, DomainResult, Money, VariantId};

use crate::purchase::PurchaseItem;

/// One requested purchase line (unit cost in minor units).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseLine {
    pub variant_id: VariantId,
    pub quantity: i64,
    pub cost_price: Money,
}

/// Prorates a purchase's shipping cost across its lines.
pub struct CostAllocator;

impl CostAllocator {
    /// Turn requested lines into committed purchase items.
    ///
    /// Shipping is split by line quantity with the remainder on the last line,
    /// so `Σ allocated_shipping_cost == shipping_cost` exactly.
    pub fn allocate(shipping_cost: Money, lines: &[PurchaseLine]) -> DomainResult<Vec<PurchaseItem>> {
        if lines.is_empty() {
            return Err(DomainError::validation("purchase must have at least one item"));
        }
        if shipping_cost.is_negative() {
            return Err(DomainError::validation("shipping_cost cannot be negative"));
        }
        for line in lines {
            if line.quantity <= 0 {
                return Err(DomainError::validation(format!(
                    "quantity for variant {} must be positive",
                    line.variant_id
                )));
            }
            if line.cost_price.is_negative() {
                return Err(DomainError::validation(format!(
                    "cost_price for variant {} cannot be negative",
                    line.variant_id
                )));
            }
        }

        let quantities: Vec<i64> = lines.iter().map(|l| l.quantity).collect();
        let shares = shipping_cost.prorate(&quantities)?;

        lines
            .iter()
            .zip(shares)
            .enumerate()
            .map(|(idx, (line, allocated))| {
                let goods = line.cost_price.checked_mul(line.quantity)?;
                Ok(PurchaseItem {
                    line_no: idx as u32 + 1,
                    variant_id: line.variant_id,
                    quantity: line.quantity,
                    cost_price: line.cost_price,
                    allocated_shipping_cost: allocated,
                    total_cost_price: goods.checked_add(allocated)?,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn line(quantity: i64, cost_price: i64) -> PurchaseLine {
        PurchaseLine {
            variant_id: VariantId::new(),
            quantity,
            cost_price: Money::from_minor(cost_price),
        }
    }

    #[test]
    fn shipping_split_matches_quantities() {
        let items = CostAllocator::allocate(
            Money::from_minor(200),
            &[line(10, 1_000), line(5, 2_000)],
        )
        .unwrap();

        let shares: Vec<i64> = items.iter().map(|i| i.allocated_shipping_cost.minor()).collect();
        assert_eq!(shares, vec![133, 67]);
        assert_eq!(items[0].total_cost_price.minor(), 10 * 1_000 + 133);
        assert_eq!(items[1].total_cost_price.minor(), 5 * 2_000 + 67);
        assert_eq!(items[0].line_no, 1);
        assert_eq!(items[1].line_no, 2);
    }

    #[test]
    fn rejects_empty_and_invalid_lines() {
        assert!(matches!(
            CostAllocator::allocate(Money::ZERO, &[]),
            Err(DomainError::Validation(_))
        ));
        assert!(matches!(
            CostAllocator::allocate(Money::ZERO, &[line(0, 10)]),
            Err(DomainError::Validation(_))
        ));
        assert!(matches!(
            CostAllocator::allocate(Money::ZERO, &[line(1, -10)]),
            Err(DomainError::Validation(_))
        ));
        assert!(matches!(
            CostAllocator::allocate(Money::from_minor(-1), &[line(1, 10)]),
            Err(DomainError::Validation(_))
        ));
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: allocated shipping always reconciles to the purchase's shipping cost.
        #[test]
        fn allocated_shipping_reconciles(
            shipping in 0i64..5_000_000,
            lines in prop::collection::vec((1i64..1_000, 0i64..100_000), 1..15)
        ) {
            let lines: Vec<PurchaseLine> = lines.into_iter().map(|(q, c)| line(q, c)).collect();
            let items = CostAllocator::allocate(Money::from_minor(shipping), &lines).unwrap();

            let allocated: i64 = items.iter().map(|i| i.allocated_shipping_cost.minor()).sum();
            prop_assert_eq!(allocated, shipping);
            for (item, line) in items.iter().zip(&lines) {
                prop_assert_eq!(
                    item.total_cost_price.minor(),
                    line.cost_price.minor() * line.quantity + item.allocated_shipping_cost.minor()
                );
            }
        }
    }
}
