//! Order totals and loyalty earnings.

use serde::{Deserialize, Serialize};

use super::{LineItem, Money, OrderError};

/// Currency units one loyalty point is worth when spent.
pub const POINT_VALUE: i64 = 1000;

/// Share of the final total returned as points, in percent.
pub const EARN_RATE_PERCENT: i64 = 10;

/// Highest unit price a product may carry.
pub const MAX_UNIT_PRICE: Money = Money::new(1_000_000_000_000);

/// Points earned on an order: `floor(total * 10% / POINT_VALUE)`.
pub fn points_earned(total: Money) -> u32 {
    if total.is_negative() {
        return 0;
    }
    let points = i128::from(total.amount()) * i128::from(EARN_RATE_PERCENT)
        / 100
        / i128::from(POINT_VALUE);
    u32::try_from(points).unwrap_or(u32::MAX)
}


/// Currency value of a number of points.
pub fn points_value(points: u32) -> Money {
    Money::new(i64::from(points) * POINT_VALUE)
}

/// Computed amounts of an order.
///
/// `total_amount = subtotal - discount_amount - loyalty_points_used * POINT_VALUE`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pricing {
    pub subtotal: Money,
    pub discount_amount: Money,
    pub loyalty_points_used: u32,
    pub loyalty_points_earned: u32,
    pub total_amount: Money,
}

impl Pricing {
    /// Sum of line totals. Fails instead of wrapping when the amount does not fit.
    pub fn subtotal(line_items: &[LineItem]) -> Result<Money, OrderError> {
        line_items.iter().try_fold(Money::zero(), |acc, item| {
            item.line_total()
                .and_then(|line| acc.checked_add(line))
                .ok_or(OrderError::AmountOverflow)
        })
    }

    /// Prices `line_items` with an optional discount percent and a points spend.
    ///
    /// Fails if the points would be worth more than what is left after the
    /// discount.
    pub fn compute(
        line_items: &[LineItem],
        discount_percent: Option<u8>,
        loyalty_points_used: u32,
    ) -> Result<Self, OrderError> {
        let subtotal = Self::subtotal(line_items)?;
        let discount_amount = discount_percent
            .map(|percent| subtotal.percent(percent.min(100)))
            .unwrap_or_default();
        let after_discount = subtotal - discount_amount;

        let points_deduction = points_value(loyalty_points_used);
        if points_deduction > after_discount {
            return Err(OrderError::PointsExceedTotal {
                points: loyalty_points_used,
                value: points_deduction,
                payable: after_discount,
            });
        }

        let total_amount = after_discount - points_deduction;
        Ok(Self {
            subtotal,
            discount_amount,
            loyalty_points_used,
            loyalty_points_earned: points_earned(total_amount),
            total_amount,
        })
    }
}
