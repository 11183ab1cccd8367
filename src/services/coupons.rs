//! Coupon evaluation.
//!
//! `validate` runs the rule checks in a fixed order; the first failing check
//! decides the rejection reason. Business rejections are returned as
//! [`CouponOutcome::Invalid`], never as errors — only a failing coupon store
//! surfaces as an error. Discount math per type lives behind a registry of
//! [`DiscountCalculator`]s assembled at composition time.

use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use tracing::instrument;

use crate::backoffice::{CouponRecord, CouponStore};
use crate::config::CurrencyConfig;
use crate::errors::ServiceError;
use crate::models::{CouponOutcome, DiscountType, InvalidReason, ResolvedLineItem};
use crate::money::Money;

/// Canonical form for coupon codes: trimmed, lowercase.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_lowercase()
}

/// Indexes of lines a coupon may act on. Exclusions win; when inclusion lists
/// are present, only matching lines qualify.
fn eligible_lines(coupon: &CouponRecord, lines: &[ResolvedLineItem]) -> Vec<usize> {
    let excluded = |line: &ResolvedLineItem| {
        coupon.excluded_product_ids.contains(&line.product_id)
            || (line.variation_id != 0 && coupon.excluded_product_ids.contains(&line.variation_id))
            || line
                .category_ids
                .iter()
                .any(|c| coupon.excluded_product_categories.contains(c))
    };
    let restricted = !coupon.product_ids.is_empty() || !coupon.product_categories.is_empty();
    let included = |line: &ResolvedLineItem| {
        if !restricted {
            return true;
        }
        coupon.product_ids.contains(&line.product_id)
            || (line.variation_id != 0 && coupon.product_ids.contains(&line.variation_id))
            || line
                .category_ids
                .iter()
                .any(|c| coupon.product_categories.contains(c))
    };

    lines
        .iter()
        .enumerate()
        .filter(|(_, line)| !excluded(line) && included(line))
        .map(|(i, _)| i)
        .collect()
}

fn parse_threshold(raw: &str, decimals: u32) -> Result<Option<Money>, ServiceError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let amount = Money::from_decimal_string(trimmed, decimals)
        .map_err(|e| ServiceError::CouponStoreUnavailable(format!("malformed coupon record: {e}")))?;
    Ok(if amount.is_zero() { None } else { Some(amount) })
}

fn parse_amount(raw: &str) -> Result<Decimal, ServiceError> {
    Decimal::from_str(raw.trim())
        .map_err(|e| ServiceError::CouponStoreUnavailable(format!("malformed coupon amount: {e}")))
}

/// One discount computation strategy, keyed by `discount_type`.
pub trait DiscountCalculator: Send + Sync {
    fn discount(
        &self,
        coupon: &CouponRecord,
        lines: &[ResolvedLineItem],
        eligible: &[usize],
        subtotal: Money,
        decimals: u32,
    ) -> Result<Money, ServiceError>;
}

pub struct PercentCalculator;

impl DiscountCalculator for PercentCalculator {
    fn discount(
        &self,
        coupon: &CouponRecord,
        _lines: &[ResolvedLineItem],
        _eligible: &[usize],
        subtotal: Money,
        _decimals: u32,
    ) -> Result<Money, ServiceError> {
        let pct = parse_amount(&coupon.amount)?;
        subtotal
            .percent(pct)
            .map_err(|e| ServiceError::CouponStoreUnavailable(e.to_string()))
    }
}

pub struct FixedCartCalculator;

impl DiscountCalculator for FixedCartCalculator {
    fn discount(
        &self,
        coupon: &CouponRecord,
        _lines: &[ResolvedLineItem],
        _eligible: &[usize],
        subtotal: Money,
        decimals: u32,
    ) -> Result<Money, ServiceError> {
        let amount = Money::from_decimal_string(&coupon.amount, decimals)
            .map_err(|e| ServiceError::CouponStoreUnavailable(e.to_string()))?;
        Ok(amount.min(subtotal))
    }
}

pub struct FixedProductCalculator;

impl DiscountCalculator for FixedProductCalculator {
    fn discount(
        &self,
        coupon: &CouponRecord,
        lines: &[ResolvedLineItem],
        eligible: &[usize],
        _subtotal: Money,
        decimals: u32,
    ) -> Result<Money, ServiceError> {
        let amount = Money::from_decimal_string(&coupon.amount, decimals)
            .map_err(|e| ServiceError::CouponStoreUnavailable(e.to_string()))?;
        let mut total = Money::ZERO;
        for &idx in eligible {
            total = total.add(amount.mul_quantity(lines[idx].quantity));
        }
        Ok(total)
    }
}

/// Registry with the three stock calculators. Extensible at composition time;
/// there is no runtime hook.
pub fn default_calculators() -> HashMap<String, Arc<dyn DiscountCalculator>> {
    let mut map: HashMap<String, Arc<dyn DiscountCalculator>> = HashMap::new();
    map.insert(
        DiscountType::Percent.as_str().to_string(),
        Arc::new(PercentCalculator),
    );
    map.insert(
        DiscountType::FixedCart.as_str().to_string(),
        Arc::new(FixedCartCalculator),
    );
    map.insert(
        DiscountType::FixedProduct.as_str().to_string(),
        Arc::new(FixedProductCalculator),
    );
    map
}

/// Discount a coupon record yields against a line set, after caps. Shared by
/// the evaluator and the in-memory order sink's recomputation. Returns `None`
/// for unsupported discount types.
pub fn coupon_discount(
    coupon: &CouponRecord,
    lines: &[ResolvedLineItem],
    subtotal: Money,
    decimals: u32,
) -> Result<Option<Money>, ServiceError> {
    let calculators = default_calculators();
    let Some(calculator) = calculators.get(coupon.discount_type.as_str()) else {
        return Ok(None);
    };
    let eligible = eligible_lines(coupon, lines);
    let mut discount = calculator.discount(coupon, lines, &eligible, subtotal, decimals)?;
    if let Some(max) = parse_threshold(&coupon.maximum_amount, decimals)? {
        discount = discount.min(max);
    }
    Ok(Some(discount.min(subtotal)))
}

pub struct CouponEvaluator {
    store: Arc<dyn CouponStore>,
    currency: CurrencyConfig,
    calculators: HashMap<String, Arc<dyn DiscountCalculator>>,
}

impl CouponEvaluator {
    pub fn new(store: Arc<dyn CouponStore>, currency: CurrencyConfig) -> Self {
        Self::with_calculators(store, currency, default_calculators())
    }

    pub fn with_calculators(
        store: Arc<dyn CouponStore>,
        currency: CurrencyConfig,
        calculators: HashMap<String, Arc<dyn DiscountCalculator>>,
    ) -> Self {
        Self {
            store,
            currency,
            calculators,
        }
    }

    /// Validates one code against a resolved line set and its pre-discount
    /// subtotal. Checks run in a fixed order; the first failure decides the
    /// reason.
    #[instrument(skip(self, lines), fields(code = %code, line_count = lines.len()))]
    pub async fn validate(
        &self,
        code: &str,
        lines: &[ResolvedLineItem],
        subtotal: Money,
    ) -> Result<CouponOutcome, ServiceError> {
        let code = normalize_code(code);
        let decimals = self.currency.decimals;

        let invalid = |reason: InvalidReason, message: String| CouponOutcome::Invalid {
            code: code.clone(),
            reason,
            message,
        };

        // 1. Existence
        let Some(coupon) = self
            .store
            .get(&code)
            .await
            .map_err(|e| ServiceError::CouponStoreUnavailable(e.to_string()))?
        else {
            return Ok(invalid(
                InvalidReason::NotFound,
                format!("coupon \"{code}\" does not exist"),
            ));
        };

        // 2. Enabled
        if coupon.status != "publish" {
            return Ok(invalid(
                InvalidReason::Disabled,
                format!("coupon \"{code}\" is not active"),
            ));
        }

        // 3. Expiry
        if let Some(expires) = coupon.date_expires {
            if expires <= Utc::now() {
                return Ok(invalid(
                    InvalidReason::Expired,
                    format!("coupon \"{code}\" has expired"),
                ));
            }
        }

        // 4. Usage cap
        if coupon.usage_limit > 0 && coupon.usage_count >= coupon.usage_limit {
            return Ok(invalid(
                InvalidReason::UsageLimit,
                format!("coupon \"{code}\" has reached its usage limit"),
            ));
        }

        // 5. Minimum spend
        if let Some(minimum) = parse_threshold(&coupon.minimum_amount, decimals)? {
            if subtotal < minimum {
                return Ok(invalid(
                    InvalidReason::MinSpend,
                    format!(
                        "a minimum spend of {} is required for coupon \"{code}\"",
                        minimum.format_display(&self.currency.symbol, decimals)
                    ),
                ));
            }
        }

        // 6. Maximum spend
        if let Some(maximum) = parse_threshold(&coupon.maximum_amount, decimals)? {
            if subtotal > maximum {
                return Ok(invalid(
                    InvalidReason::MaxSpend,
                    format!(
                        "coupon \"{code}\" only applies to carts up to {}",
                        maximum.format_display(&self.currency.symbol, decimals)
                    ),
                ));
            }
        }

        // 7. Product restriction
        let eligible = eligible_lines(&coupon, lines);
        let restricted =
            !coupon.product_ids.is_empty() || !coupon.product_categories.is_empty();
        if restricted && eligible.is_empty() {
            return Ok(invalid(
                InvalidReason::NotApplicable,
                format!("coupon \"{code}\" is not applicable to these items"),
            ));
        }

        let Some(discount_type) = DiscountType::parse(&coupon.discount_type) else {
            return Ok(invalid(
                InvalidReason::NotApplicable,
                format!("coupon \"{code}\" uses an unsupported discount type"),
            ));
        };
        let Some(calculator) = self.calculators.get(coupon.discount_type.as_str()) else {
            return Ok(invalid(
                InvalidReason::NotApplicable,
                format!("coupon \"{code}\" uses an unsupported discount type"),
            ));
        };

        let mut discount = calculator.discount(&coupon, lines, &eligible, subtotal, decimals)?;
        if let Some(max) = parse_threshold(&coupon.maximum_amount, decimals)? {
            discount = discount.min(max);
        }
        discount = discount.min(subtotal);

        Ok(CouponOutcome::Valid {
            code,
            discount,
            discount_type,
            free_shipping: coupon.free_shipping,
            amount_raw: coupon.amount.clone(),
            description: coupon.description.clone(),
        })
    }
}
