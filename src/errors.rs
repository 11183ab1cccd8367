//! Error taxonomy with stable wire codes.
//!
//! Every failure a client can observe maps to one `ServiceError` variant and
//! one stable `code` string. Business rejections are 4xx and not retryable;
//! infrastructure failures are 5xx and retryable. Coupon business rejections
//! never surface here — they travel inside the coupon outcome on the quote.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;

/// The wire shape of every error response.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorEnvelope {
    pub code: String,
    pub message: String,
    pub status: u16,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    // Client errors
    #[error("{0}")]
    InvalidItems(String),

    #[error("{0}")]
    InvalidProduct(String),

    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("coupon code is required")]
    MissingCode,

    #[error("{0}")]
    InvalidShippingRate(String),

    // Business errors
    #[error("product {0} not found")]
    ProductNotFound(u64),

    #[error("product {0} cannot be purchased")]
    ProductNotPurchasable(u64),

    #[error("product {product_id} is out of stock")]
    OutOfStock { product_id: u64 },

    #[error("only {available} of product {product_id} available")]
    InsufficientStock { product_id: u64, available: i64 },

    #[error("quote not found")]
    QuoteNotFound,

    #[error("quote is expired or no longer exists")]
    QuoteExpired,

    // Infrastructure errors
    #[error("catalog unavailable: {0}")]
    CatalogUnavailable(String),

    #[error("coupon store unavailable: {0}")]
    CouponStoreUnavailable(String),

    #[error("quote store unavailable: {0}")]
    QuoteStoreUnavailable(String),

    #[error("shipping rates unavailable: {0}")]
    ShippingUnavailable(String),

    #[error("order creation failed: {0}")]
    OrderCreationFailed(String),

    #[error("authentication required")]
    Unauthorized,

    #[error("key does not grant write access")]
    InsufficientPermissions,
}

impl ServiceError {
    /// The stable machine-readable kind carried on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::InvalidItems(_) => "invalid_items",
            ServiceError::InvalidProduct(_) => "invalid_product",
            ServiceError::MissingField(_) => "missing_field",
            ServiceError::MissingCode => "missing_code",
            ServiceError::InvalidShippingRate(_) => "invalid_shipping_rate",
            ServiceError::ProductNotFound(_) => "product_not_found",
            ServiceError::ProductNotPurchasable(_) => "product_not_purchasable",
            ServiceError::OutOfStock { .. } => "out_of_stock",
            ServiceError::InsufficientStock { .. } => "insufficient_stock",
            ServiceError::QuoteNotFound => "quote_not_found",
            ServiceError::QuoteExpired => "quote_expired",
            ServiceError::CatalogUnavailable(_) => "catalog_unavailable",
            ServiceError::CouponStoreUnavailable(_) => "coupon_store_unavailable",
            ServiceError::QuoteStoreUnavailable(_) => "quote_store_unavailable",
            ServiceError::ShippingUnavailable(_) => "shipping_unavailable",
            ServiceError::OrderCreationFailed(_) => "order_creation_failed",
            ServiceError::Unauthorized => "unauthorized",
            ServiceError::InsufficientPermissions => "insufficient_permissions",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ServiceError::InvalidItems(_)
            | ServiceError::InvalidProduct(_)
            | ServiceError::MissingField(_)
            | ServiceError::MissingCode
            | ServiceError::InvalidShippingRate(_)
            | ServiceError::ProductNotPurchasable(_)
            | ServiceError::OutOfStock { .. }
            | ServiceError::InsufficientStock { .. }
            | ServiceError::QuoteExpired => StatusCode::BAD_REQUEST,
            ServiceError::ProductNotFound(_) | ServiceError::QuoteNotFound => StatusCode::NOT_FOUND,
            ServiceError::Unauthorized => StatusCode::UNAUTHORIZED,
            ServiceError::InsufficientPermissions => StatusCode::FORBIDDEN,
            ServiceError::CatalogUnavailable(_)
            | ServiceError::CouponStoreUnavailable(_)
            | ServiceError::QuoteStoreUnavailable(_)
            | ServiceError::ShippingUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ServiceError::OrderCreationFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The message shown to clients. Infra failures get a generic message so
    /// upstream details never leak; the full error is logged server-side.
    fn client_message(&self) -> String {
        match self {
            ServiceError::CatalogUnavailable(_) => "product catalog is unavailable".to_string(),
            ServiceError::CouponStoreUnavailable(_) => "coupon store is unavailable".to_string(),
            ServiceError::QuoteStoreUnavailable(_) => "quote store is unavailable".to_string(),
            ServiceError::ShippingUnavailable(_) => "shipping rates are unavailable".to_string(),
            ServiceError::OrderCreationFailed(_) => "order could not be created".to_string(),
            other => other.to_string(),
        }
    }

    pub fn envelope(&self) -> ErrorEnvelope {
        ErrorEnvelope {
            code: self.kind().to_string(),
            message: self.client_message(),
            status: self.status().as_u16(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        if self.status().is_server_error() {
            tracing::error!(code = self.kind(), error = %self, "request failed");
        }
        (self.status(), Json(self.envelope())).into_response()
    }
}

/// Picks between the two stock rejection kinds used by the order path.
pub fn stock_rejection(product_id: u64, available: i64) -> ServiceError {
    if available <= 0 {
        ServiceError::OutOfStock { product_id }
    } else {
        ServiceError::InsufficientStock {
            product_id,
            available,
        }
    }
}
