//! Order request, summary, and initial-status derivation.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::address::Address;
use crate::money::Money;

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct OrderRequest {
    #[serde(default)]
    pub quote_id: String,
    #[serde(default)]
    pub idempotency_key: Option<String>,
    #[serde(default)]
    pub shipping_rate_id: Option<String>,
    #[serde(default)]
    pub billing_address: Option<Address>,
    #[serde(default)]
    pub shipping_address: Option<Address>,
    #[serde(default)]
    pub customer_email: Option<String>,
    #[serde(default)]
    pub payment_method: String,
    #[serde(default)]
    pub customer_note: Option<String>,
    #[serde(default)]
    pub set_paid: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct OrderTotals {
    #[schema(value_type = String)]
    pub subtotal: Money,
    #[schema(value_type = String)]
    pub shipping: Money,
    #[schema(value_type = String)]
    pub discount: Money,
    #[schema(value_type = String)]
    pub tax: Money,
    #[schema(value_type = String)]
    pub total: Money,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextAction {
    AwaitPayment,
    AwaitPaymentConfirmation,
    OrderConfirmed,
    OrderComplete,
    Unknown,
}

impl NextAction {
    pub fn as_str(self) -> &'static str {
        match self {
            NextAction::AwaitPayment => "await_payment",
            NextAction::AwaitPaymentConfirmation => "await_payment_confirmation",
            NextAction::OrderConfirmed => "order_confirmed",
            NextAction::OrderComplete => "order_complete",
            NextAction::Unknown => "unknown",
        }
    }
}

/// Initial order status derivation, first match wins.
pub fn derive_initial_status(set_paid: bool, payment_method: &str) -> (&'static str, NextAction) {
    if set_paid {
        return ("processing", NextAction::OrderConfirmed);
    }
    match payment_method {
        "cod" => ("processing", NextAction::OrderConfirmed),
        "bacs" | "cheque" => ("on-hold", NextAction::AwaitPaymentConfirmation),
        _ => ("pending", NextAction::AwaitPayment),
    }
}

/// Maps a durable order status back to the client's next action, used when an
/// idempotent replay returns an order the engine did not just derive.
pub fn next_action_for_status(status: &str) -> NextAction {
    match status {
        "pending" => NextAction::AwaitPayment,
        "on-hold" => NextAction::AwaitPaymentConfirmation,
        "processing" => NextAction::OrderConfirmed,
        "completed" => NextAction::OrderComplete,
        _ => NextAction::Unknown,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateOrderResponse {
    pub order_id: u64,
    pub order_key: String,
    pub status: String,
    pub totals: OrderTotals,
    pub payment_url: String,
    pub next_action: String,
    pub created: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_paid_wins_over_payment_method() {
        assert_eq!(
            derive_initial_status(true, "bacs"),
            ("processing", NextAction::OrderConfirmed)
        );
    }

    #[test]
    fn cod_confirms_immediately() {
        assert_eq!(
            derive_initial_status(false, "cod"),
            ("processing", NextAction::OrderConfirmed)
        );
    }

    #[test]
    fn offline_methods_hold_for_confirmation() {
        for method in ["bacs", "cheque"] {
            assert_eq!(
                derive_initial_status(false, method),
                ("on-hold", NextAction::AwaitPaymentConfirmation)
            );
        }
    }

    #[test]
    fn gateways_default_to_pending() {
        assert_eq!(
            derive_initial_status(false, "stripe"),
            ("pending", NextAction::AwaitPayment)
        );
    }

    #[test]
    fn replay_next_action_from_status() {
        assert_eq!(next_action_for_status("completed"), NextAction::OrderComplete);
        assert_eq!(next_action_for_status("refunded"), NextAction::Unknown);
    }
}
