//! Shipping rate orchestration.
//!
//! The engine does not interpret rate semantics; whatever the provider
//! returns is presented to the client verbatim, keyed by `rate_id`.

use std::sync::Arc;
use tracing::instrument;

use crate::backoffice::RateProvider;
use crate::errors::ServiceError;
use crate::models::{Address, ResolvedLineItem, ShippingRate};

pub struct ShippingService {
    provider: Arc<dyn RateProvider>,
}

impl ShippingService {
    pub fn new(provider: Arc<dyn RateProvider>) -> Self {
        Self { provider }
    }

    /// Rates for the shippable subset of a line set. No shippable items or no
    /// usable destination short-circuits to an empty list without consulting
    /// the provider.
    #[instrument(skip(self, destination, lines), fields(line_count = lines.len()))]
    pub async fn rates(
        &self,
        destination: Option<&Address>,
        lines: &[ResolvedLineItem],
    ) -> Result<Vec<ShippingRate>, ServiceError> {
        let shippable: Vec<ResolvedLineItem> = lines
            .iter()
            .filter(|line| line.needs_shipping)
            .cloned()
            .collect();
        let Some(destination) = destination else {
            return Ok(Vec::new());
        };
        if shippable.is_empty() || !destination.has_country() {
            return Ok(Vec::new());
        }

        self.provider
            .rates(destination, &shippable)
            .await
            .map_err(|e| ServiceError::ShippingUnavailable(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backoffice::memory::MemoryBackOffice;
    use crate::money::Money;
    use std::collections::BTreeMap;

    fn line(needs_shipping: bool) -> ResolvedLineItem {
        ResolvedLineItem {
            product_id: 1,
            variation_id: 0,
            name: "Beans".into(),
            sku: "BEANS".into(),
            quantity: 1,
            unit_price: Money::from_minor(1000),
            line_total: Money::from_minor(1000),
            line_tax: Money::ZERO,
            meta: BTreeMap::new(),
            tax_class: String::new(),
            needs_shipping,
            category_ids: vec![],
        }
    }

    fn service() -> ShippingService {
        let backoffice = Arc::new(MemoryBackOffice::new("https://shop.test"));
        backoffice.set_flat_rate(Money::from_minor(500), "Flat rate");
        ShippingService::new(backoffice)
    }

    #[tokio::test]
    async fn no_destination_means_no_rates() {
        let rates = service().rates(None, &[line(true)]).await.unwrap();
        assert!(rates.is_empty());
    }

    #[tokio::test]
    async fn virtual_only_carts_get_no_rates() {
        let dest = Address {
            country: "US".into(),
            ..Address::default()
        };
        let rates = service().rates(Some(&dest), &[line(false)]).await.unwrap();
        assert!(rates.is_empty());
    }

    #[tokio::test]
    async fn empty_country_means_no_rates() {
        let dest = Address {
            city: "Portland".into(),
            ..Address::default()
        };
        let rates = service().rates(Some(&dest), &[line(true)]).await.unwrap();
        assert!(rates.is_empty());
    }

    #[tokio::test]
    async fn provider_rates_pass_through_verbatim() {
        let dest = Address {
            country: "US".into(),
            ..Address::default()
        };
        let rates = service().rates(Some(&dest), &[line(true)]).await.unwrap();
        assert_eq!(rates.len(), 1);
        assert_eq!(rates[0].rate_id, "flat_rate:1");
        assert_eq!(rates[0].cost, Money::from_minor(500));
    }
}
