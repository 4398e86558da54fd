use serde::{Deserialize, Serialize};

use super::errors::DomainError;

// ============================================================================
// Delivery Value Object
// ============================================================================

/// Recipient contact and address. Name and email may be empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivery {
    pub name: String,
    pub phone: String,
    pub zip: String,
    pub city: String,
    pub address: String,
    pub region: String,
    pub email: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryParams {
    pub name: String,
    pub phone: String,
    pub zip: String,
    pub city: String,
    pub address: String,
    pub region: String,
    pub email: String,
}

impl Delivery {
    pub fn new(params: DeliveryParams) -> Result<Self, DomainError> {
        let required = [
            ("delivery.phone", &params.phone),
            ("delivery.zip", &params.zip),
            ("delivery.city", &params.city),
            ("delivery.address", &params.address),
            ("delivery.region", &params.region),
        ];
        for (field, value) in required {
            if value.is_empty() {
                return Err(DomainError::MissingRequiredField(field));
            }
        }

        Ok(Self {
            name: params.name,
            phone: params.phone,
            zip: params.zip,
            city: params.city,
            address: params.address,
            region: params.region,
            email: params.email,
        })
    }
}
