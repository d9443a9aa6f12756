//! Discount code rules.
//!
//! Codes are exactly eight characters from `A-Z0-9`. Input is trimmed and
//! upper-cased before use, so `" save2024 "` and `"SAVE2024"` name the same
//! code.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::order::{Money, OrderId};

pub const CODE_LENGTH: usize = 8;
pub const MAX_PERCENT: u8 = 100;
pub const MIN_USES: u32 = 1;
pub const MAX_USES: u32 = 10;

/// Why a code cannot be used for an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountRejection {
    NotFound,
    Inactive,
    UsageLimitReached,
}

impl DiscountRejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscountRejection::NotFound => "not_found",
            DiscountRejection::Inactive => "inactive",
            DiscountRejection::UsageLimitReached => "usage_limit_reached",
        }
    }
}

impl std::fmt::Display for DiscountRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            DiscountRejection::NotFound => "code does not exist",
            DiscountRejection::Inactive => "code is not active",
            DiscountRejection::UsageLimitReached => "code has reached its usage limit",
        };
        f.write_str(text)
    }
}

/// Errors from creating or administering codes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiscountError {
    #[error("Invalid discount code {input:?}: expected {CODE_LENGTH} characters from A-Z and 0-9")]
    InvalidCode { input: String },

    #[error("Invalid discount percent {0}: must be between 0 and {MAX_PERCENT}")]
    InvalidPercent(u32),

    #[error("Invalid max uses {0}: must be between {MIN_USES} and {MAX_USES}")]
    InvalidMaxUses(u32),

    #[error("Discount code {code} already exists")]
    AlreadyExists { code: String },

    #[error("Discount code {code} has been used {uses} time(s) and cannot be deleted")]
    InUse { code: String, uses: u32 },
}

/// Trims and upper-cases `input`, then checks the code format.
pub fn normalize_code(input: &str) -> Result<String, DiscountError> {
    let code = input.trim().to_ascii_uppercase();
    let well_formed = code.len() == CODE_LENGTH
        && code
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit());
    if well_formed {
        Ok(code)
    } else {
        Err(DiscountError::InvalidCode {
            input: input.to_string(),
        })
    }
}

/// Result of pricing a subtotal with a code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscountQuote {
    pub percent: u8,
    pub savings: Money,
    pub discounted_total: Money,
}

impl DiscountQuote {
    /// `savings = floor(subtotal * percent / 100)`.
    pub fn for_subtotal(subtotal: Money, percent: u8) -> Self {
        let savings = subtotal.percent(percent.min(MAX_PERCENT));
        Self {
            percent,
            savings,
            discounted_total: subtotal - savings,
        }
    }
}

/// A discount code and its usage.
///
/// `current_uses` never exceeds `max_uses`, and each use links one order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscountCode {
    pub code: String,
    pub percent: u8,
    pub max_uses: u32,
    pub current_uses: u32,
    pub is_active: bool,
    pub linked_orders: Vec<OrderId>,
    pub created_at: DateTime<Utc>,
}

impl DiscountCode {
    /// Creates an active, unused code after validating every field.
    pub fn new(code: &str, percent: u32, max_uses: u32) -> Result<Self, DiscountError> {
        let code = normalize_code(code)?;
        let percent = u8::try_from(percent)
            .ok()
            .filter(|p| *p <= MAX_PERCENT)
            .ok_or(DiscountError::InvalidPercent(percent))?;
        if !(MIN_USES..=MAX_USES).contains(&max_uses) {
            return Err(DiscountError::InvalidMaxUses(max_uses));
        }

        Ok(Self {
            code,
            percent,
            max_uses,
            current_uses: 0,
            is_active: true,
            linked_orders: Vec::new(),
            created_at: Utc::now(),
        })
    }

    pub fn remaining_uses(&self) -> u32 {
        self.max_uses.saturating_sub(self.current_uses)
    }

    /// Usable iff active and under its cap.
    pub fn check_usable(&self) -> Result<(), DiscountRejection> {
        if !self.is_active {
            return Err(DiscountRejection::Inactive);
        }
        if self.current_uses >= self.max_uses {
            return Err(DiscountRejection::UsageLimitReached);
        }
        Ok(())
    }

    /// Prices `subtotal` with this code. Never changes the code.
    pub fn quote(&self, subtotal: Money) -> Result<DiscountQuote, DiscountRejection> {
        self.check_usable()?;
        Ok(DiscountQuote::for_subtotal(subtotal, self.percent))
    }

    /// Consumes one use for `order_id`, re-checking the cap.
    pub fn record_use(&mut self, order_id: OrderId) -> Result<(), DiscountRejection> {
        self.check_usable()?;
        self.current_uses += 1;
        self.linked_orders.push(order_id);
        Ok(())
    }

    /// Gives back the use held by `order_id`. Returns false if that order
    /// never used this code.
    pub fn release_use(&mut self, order_id: OrderId) -> bool {
        let Some(position) = self.linked_orders.iter().position(|id| *id == order_id) else {
            return false;
        };
        self.linked_orders.remove(position);
        self.current_uses = self.current_uses.saturating_sub(1);
        true
    }

    /// Codes that have been used are kept for the audit trail.
    pub fn ensure_deletable(&self) -> Result<(), DiscountError> {
        if self.current_uses > 0 {
            return Err(DiscountError::InUse {
                code: self.code.clone(),
                uses: self.current_uses,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_case_and_whitespace() {
        assert_eq!(normalize_code("  save2024 ").unwrap(), "SAVE2024");
    }

    #[test]
    fn rejects_malformed_codes() {
        for input in ["SAVE202", "SAVE20245", "SAVE-024", "", "ÄBCDEFGH"] {
            assert!(
                matches!(normalize_code(input), Err(DiscountError::InvalidCode { .. })),
                "{input:?} should be rejected"
            );
        }
    }

    #[test]
    fn new_validates_ranges() {
        assert!(DiscountCode::new("SAVE2024", 0, 1).is_ok());
        assert!(DiscountCode::new("SAVE2024", 100, 10).is_ok());
        assert_eq!(
            DiscountCode::new("SAVE2024", 101, 1).unwrap_err(),
            DiscountError::InvalidPercent(101)
        );
        assert_eq!(
            DiscountCode::new("SAVE2024", 10, 0).unwrap_err(),
            DiscountError::InvalidMaxUses(0)
        );
        assert_eq!(
            DiscountCode::new("SAVE2024", 10, 11).unwrap_err(),
            DiscountError::InvalidMaxUses(11)
        );
    }

    #[test]
    fn quote_floors_savings_and_does_not_consume() {
        let code = DiscountCode::new("SAVE2024", 15, 1).unwrap();
        let quote = code.quote(Money::new(99_999)).unwrap();

        assert_eq!(quote.savings, Money::new(14_999));
        assert_eq!(quote.discounted_total, Money::new(85_000));
        assert_eq!(code.current_uses, 0);
    }

    #[test]
    fn cap_is_enforced_on_record() {
        let mut code = DiscountCode::new("ONCEONLY", 10, 1).unwrap();
        let first = OrderId::new();

        code.record_use(first).unwrap();
        assert_eq!(
            code.record_use(OrderId::new()),
            Err(DiscountRejection::UsageLimitReached)
        );
        assert_eq!(code.current_uses, 1);
        assert_eq!(code.linked_orders, vec![first]);
        assert_eq!(
            code.quote(Money::new(1_000)),
            Err(DiscountRejection::UsageLimitReached)
        );
    }

    #[test]
    fn inactive_codes_are_rejected() {
        let mut code = DiscountCode::new("PAUSED01", 10, 5).unwrap();
        code.is_active = false;
        assert_eq!(code.check_usable(), Err(DiscountRejection::Inactive));
    }

    #[test]
    fn release_undoes_a_use() {
        let mut code = DiscountCode::new("SAVE2024", 10, 2).unwrap();
        let order = OrderId::new();
        code.record_use(order).unwrap();

        assert!(code.release_use(order));
        assert!(!code.release_use(order));
        assert_eq!(code.current_uses, 0);
        assert_eq!(code.remaining_uses(), 2);
    }

    #[test]
    fn used_codes_cannot_be_deleted() {
        let mut code = DiscountCode::new("SAVE2024", 10, 2).unwrap();
        assert!(code.ensure_deletable().is_ok());
        code.record_use(OrderId::new()).unwrap();
        assert!(matches!(
            code.ensure_deletable(),
            Err(DiscountError::InUse { uses: 1, .. })
        ));
    }
}
