use serde::{Deserialize, Serialize};

use fleetstock_core::{DomainError, DomainResult, Entity, Money, VariantId, div_round_half_up};

/// A sellable product variant (one SKU) with its running cost aggregates.
///
/// `average_cost` is never stored: it is always derived from the two totals
/// with round-half-up division, so every reader sees the same figure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductVariant {
    id: VariantId,
    sku: String,
    unit_price: Money,
    total_purchased_quantity: i64,
    total_cost_amount: Money,
}

/// Before/after snapshot of one cost-aggregate update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostUpdate {
    pub variant_id: VariantId,
    pub previous_average_cost: Money,
    pub total_purchased_quantity: i64,
    pub total_cost_amount: Money,
    pub average_cost: Money,
}

impl ProductVariant {
    pub fn new(id: VariantId, sku: impl Into<String>, unit_price: Money) -> DomainResult<Self> {
        let sku = sku.into().trim().to_string();
        if sku.is_empty() {
            return Err(DomainError::validation("sku cannot be empty"));
        }
        if unit_price.is_negative() {
            return Err(DomainError::validation("unit_price cannot be negative"));
        }
        Ok(Self {
            id,
            sku,
            unit_price,
            total_purchased_quantity: 0,
            total_cost_amount: Money::ZERO,
        })
    }

    /// Rehydrate a variant from persisted aggregates.
    pub fn from_parts(
        id: VariantId,
        sku: String,
        unit_price: Money,
        total_purchased_quantity: i64,
        total_cost_amount: Money,
    ) -> DomainResult<Self> {
        if total_purchased_quantity < 0 || total_cost_amount.is_negative() {
            return Err(DomainError::invariant("cost aggregates cannot be negative"));
        }
        Ok(Self {
            id,
            sku,
            unit_price,
            total_purchased_quantity,
            total_cost_amount,
        })
    }

    pub fn id_typed(&self) -> VariantId {
        self.id
    }

    pub fn sku(&self) -> &str {
        &self.sku
    }

    pub fn unit_price(&self) -> Money {
        self.unit_price
    }

    pub fn total_purchased_quantity(&self) -> i64 {
        self.total_purchased_quantity
    }

    pub fn total_cost_amount(&self) -> Money {
        self.total_cost_amount
    }

    /// Weighted average cost per unit; zero before the first purchase.
    pub fn average_cost(&self) -> Money {
        Money::from_minor(div_round_half_up(
            self.total_cost_amount.minor(),
            self.total_purchased_quantity,
        ))
    }

    /// Fold a received purchase line into the running aggregates.
    ///
    /// `line_total_cost` is the full landed cost of the line (unit cost ×
    /// quantity + allocated shipping).
    pub fn record_purchase(&mut self, quantity: i64, line_total_cost: Money) -> DomainResult<CostUpdate> {
        if quantity <= 0 {
            return Err(DomainError::validation("purchased quantity must be positive"));
        }
        if line_total_cost.is_negative() {
            return Err(DomainError::validation("purchase cost cannot be negative"));
        }

        let previous_average_cost = self.average_cost();
        let total_purchased_quantity = self
            .total_purchased_quantity
            .checked_add(quantity)
            .ok_or_else(|| DomainError::invariant("purchased quantity overflow"))?;
        let total_cost_amount = self.total_cost_amount.checked_add(line_total_cost)?;

        self.total_purchased_quantity = total_purchased_quantity;
        self.total_cost_amount = total_cost_amount;

        Ok(CostUpdate {
            variant_id: self.id,
            previous_average_cost,
            total_purchased_quantity,
            total_cost_amount,
            average_cost: self.average_cost(),
        })
    }
}

impl Entity for ProductVariant {
    type Id = VariantId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn variant() -> ProductVariant {
        ProductVariant::new(VariantId::new(), "TEE-RED-M", Money::from_minor(2_500)).unwrap()
    }

    #[test]
    fn average_cost_is_zero_before_first_purchase() {
        assert_eq!(variant().average_cost(), Money::ZERO);
    }

    #[test]
    fn weighted_average_across_purchases() {
        let mut v = variant();
        // 10 units landed at 1_133 total, then 5 units landed at 567.
        v.record_purchase(10, Money::from_minor(1_133)).unwrap();
        assert_eq!(v.average_cost().minor(), 113); // 113.3
        let update = v.record_purchase(5, Money::from_minor(567)).unwrap();
        assert_eq!(update.previous_average_cost.minor(), 113);
        assert_eq!(update.total_purchased_quantity, 15);
        assert_eq!(update.total_cost_amount.minor(), 1_700);
        assert_eq!(update.average_cost.minor(), 113); // 113.33
    }

    #[test]
    fn average_cost_rounds_half_up() {
        let mut v = variant();
        v.record_purchase(4, Money::from_minor(10)).unwrap();
        assert_eq!(v.average_cost().minor(), 3); // 2.5 -> 3
    }

    #[test]
    fn rejects_empty_sku_and_bad_lines() {
        assert!(ProductVariant::new(VariantId::new(), " ", Money::ZERO).is_err());
        let mut v = variant();
        assert!(matches!(
            v.record_purchase(0, Money::from_minor(1)),
            Err(DomainError::Validation(_))
        ));
        assert!(matches!(
            v.record_purchase(1, Money::from_minor(-1)),
            Err(DomainError::Validation(_))
        ));
        assert_eq!(v.total_purchased_quantity(), 0);
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: after any sequence of purchases the average equals the
        /// rounded ratio of the totals and is never negative.
        #[test]
        fn average_tracks_totals(
            lines in prop::collection::vec((1i64..500, 0i64..1_000_000), 1..30)
        ) {
            let mut v = variant();
            let mut qty = 0i64;
            let mut cost = 0i64;
            for (q, c) in lines {
                v.record_purchase(q, Money::from_minor(c)).unwrap();
                qty += q;
                cost += c;
                prop_assert_eq!(v.total_purchased_quantity(), qty);
                prop_assert_eq!(v.total_cost_amount().minor(), cost);
                prop_assert_eq!(v.average_cost().minor(), div_round_half_up(cost, qty));
                prop_assert!(v.average_cost().minor() >= 0);
            }
        }
    }
}
