//! Postal address record shared by quote destinations and order addresses.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

const MAX_FIELD_LENGTH: usize = 120;

/// Every field is optional on the wire; an all-empty address is "absent".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Address {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub first_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub last_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub company: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub address_1: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub address_2: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub city: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub state: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub postcode: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub country: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub email: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub phone: String,
}

impl Address {
    /// A destination is only usable for shipping and tax lookups once it
    /// names a country.
    pub fn has_country(&self) -> bool {
        !self.country.trim().is_empty()
    }

    /// Boundary sanitization: trims whitespace, strips control characters,
    /// bounds field length, and uppercases the country code.
    pub fn sanitized(&self) -> Address {
        let clean = |s: &str| -> String {
            s.trim()
                .chars()
                .filter(|c| !c.is_control())
                .take(MAX_FIELD_LENGTH)
                .collect()
        };
        Address {
            first_name: clean(&self.first_name),
            last_name: clean(&self.last_name),
            company: clean(&self.company),
            address_1: clean(&self.address_1),
            address_2: clean(&self.address_2),
            city: clean(&self.city),
            state: clean(&self.state),
            postcode: clean(&self.postcode),
            country: clean(&self.country).to_ascii_uppercase(),
            email: clean(&self.email),
            phone: clean(&self.phone),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_trims_and_uppercases_country() {
        let addr = Address {
            first_name: "  Ada ".into(),
            country: "us".into(),
            city: "Berke\u{0007}ley".into(),
            ..Address::default()
        };
        let clean = addr.sanitized();
        assert_eq!(clean.first_name, "Ada");
        assert_eq!(clean.country, "US");
        assert_eq!(clean.city, "Berkeley");
    }

    #[test]
    fn sanitize_bounds_field_length() {
        let addr = Address {
            address_1: "x".repeat(500),
            ..Address::default()
        };
        assert_eq!(addr.sanitized().address_1.len(), 120);
    }

    #[test]
    fn empty_country_is_not_shippable() {
        assert!(!Address::default().has_country());
        assert!(Address {
            country: "DE".into(),
            ..Address::default()
        }
        .has_country());
    }
}
