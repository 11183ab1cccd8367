pub mod common;
pub mod coupons;
pub mod health;
pub mod orders;
pub mod quotes;

use std::sync::Arc;

use crate::backoffice::BackOfficeInfo;
use crate::services::{CouponEvaluator, OrderService, QuoteService};

/// Services layer consumed by the HTTP handlers.
#[derive(Clone)]
pub struct AppServices {
    pub quotes: Arc<QuoteService>,
    pub orders: Arc<OrderService>,
    pub coupons: Arc<CouponEvaluator>,
    pub backoffice_info: Arc<dyn BackOfficeInfo>,
}
