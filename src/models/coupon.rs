//! Coupon evaluation outcomes and their wire form.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::money::Money;

/// Supported discount calculators. Unknown types from the coupon store fall
/// through to an explicit unsupported outcome rather than a default branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiscountType {
    Percent,
    FixedCart,
    FixedProduct,
}

impl DiscountType {
    pub fn as_str(self) -> &'static str {
        match self {
            DiscountType::Percent => "percent",
            DiscountType::FixedCart => "fixed_cart",
            DiscountType::FixedProduct => "fixed_product",
        }
    }

    pub fn parse(s: &str) -> Option<DiscountType> {
        match s {
            "percent" => Some(DiscountType::Percent),
            "fixed_cart" => Some(DiscountType::FixedCart),
            "fixed_product" => Some(DiscountType::FixedProduct),
            _ => None,
        }
    }
}

/// Why a coupon was rejected. `as_str` yields the stable wire kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidReason {
    NotFound,
    Disabled,
    Expired,
    UsageLimit,
    MinSpend,
    MaxSpend,
    NotApplicable,
}

impl InvalidReason {
    pub fn as_str(self) -> &'static str {
        match self {
            InvalidReason::NotFound => "coupon_not_found",
            InvalidReason::Disabled => "coupon_disabled",
            InvalidReason::Expired => "coupon_expired",
            InvalidReason::UsageLimit => "coupon_usage_limit",
            InvalidReason::MinSpend => "coupon_min_spend",
            InvalidReason::MaxSpend => "coupon_max_spend",
            InvalidReason::NotApplicable => "coupon_not_applicable",
        }
    }
}

/// Result of evaluating one coupon code. Both arms carry the normalized code.
#[derive(Debug, Clone)]
pub enum CouponOutcome {
    Valid {
        code: String,
        discount: Money,
        discount_type: DiscountType,
        free_shipping: bool,
        amount_raw: String,
        description: String,
    },
    Invalid {
        code: String,
        reason: InvalidReason,
        message: String,
    },
}

impl CouponOutcome {
    pub fn code(&self) -> &str {
        match self {
            CouponOutcome::Valid { code, .. } | CouponOutcome::Invalid { code, .. } => code,
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, CouponOutcome::Valid { .. })
    }

    pub fn discount(&self) -> Money {
        match self {
            CouponOutcome::Valid { discount, .. } => *discount,
            CouponOutcome::Invalid { .. } => Money::ZERO,
        }
    }
}

/// Wire form of a coupon outcome, used both inside quotes and as the body of
/// `POST /coupon/validate`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CouponSummary {
    pub code: String,
    pub valid: bool,
    #[schema(value_type = String)]
    pub discount: Money,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discount_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub free_shipping: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl From<&CouponOutcome> for CouponSummary {
    fn from(outcome: &CouponOutcome) -> Self {
        match outcome {
            CouponOutcome::Valid {
                code,
                discount,
                discount_type,
                free_shipping,
                amount_raw,
                description,
            } => CouponSummary {
                code: code.clone(),
                valid: true,
                discount: *discount,
                discount_type: Some(discount_type.as_str().to_string()),
                amount: Some(amount_raw.clone()),
                free_shipping: *free_shipping,
                description: if description.is_empty() {
                    None
                } else {
                    Some(description.clone())
                },
                reason: None,
                message: None,
            },
            CouponOutcome::Invalid {
                code,
                reason,
                message,
            } => CouponSummary {
                code: code.clone(),
                valid: false,
                discount: Money::ZERO,
                discount_type: None,
                amount: None,
                free_shipping: false,
                description: None,
                reason: Some(reason.as_str().to_string()),
                message: Some(message.clone()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reasons_use_full_wire_kinds() {
        assert_eq!(InvalidReason::Expired.as_str(), "coupon_expired");
        assert_eq!(InvalidReason::MinSpend.as_str(), "coupon_min_spend");
    }

    #[test]
    fn invalid_outcome_serializes_without_discount_fields() {
        let outcome = CouponOutcome::Invalid {
            code: "gone10".into(),
            reason: InvalidReason::Expired,
            message: "coupon has expired".into(),
        };
        let json = serde_json::to_value(CouponSummary::from(&outcome)).unwrap();
        assert_eq!(json["valid"], false);
        assert_eq!(json["discount"], "0");
        assert_eq!(json["reason"], "coupon_expired");
        assert!(json.get("discount_type").is_none());
        assert!(json.get("free_shipping").is_none());
    }

    #[test]
    fn valid_outcome_carries_type_and_raw_amount() {
        let outcome = CouponOutcome::Valid {
            code: "save10".into(),
            discount: Money::from_minor(200),
            discount_type: DiscountType::Percent,
            free_shipping: false,
            amount_raw: "10".into(),
            description: String::new(),
        };
        let json = serde_json::to_value(CouponSummary::from(&outcome)).unwrap();
        assert_eq!(json["valid"], true);
        assert_eq!(json["discount"], "200");
        assert_eq!(json["discount_type"], "percent");
        assert_eq!(json["amount"], "10");
    }
}
