//! Value objects for the order domain.

use chrono::{DateTime, Utc};
use common::{HistoryEntryId, Money, OrderId, OrderItemId, PaymentId, ProductId, UserId};
use serde::{Deserialize, Serialize};

use super::state::FulfillmentStatus;
use crate::error::DomainError;

fn default_country() -> String {
    "Ghana".to_string()
}

/// Where an order is shipped to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingAddress {
    pub full_name: String,
    pub street: String,
    pub city: String,
    pub state: String,
    #[serde(default)]
    pub zip_code: Option<String>,
    #[serde(default = "default_country")]
    pub country: String,
    pub phone: String,
}

impl ShippingAddress {
    /// Minimum number of characters accepted for a phone number.
    pub const MIN_PHONE_LEN: usize = 10;

    pub fn validate(&self) -> Result<(), DomainError> {
        let required = [
            ("fullName", &self.full_name),
            ("street", &self.street),
            ("city", &self.city),
            ("state", &self.state),
            ("country", &self.country),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(DomainError::InvalidInput(format!(
                    "shippingAddress.{field} is required"
                )));
            }
        }
        if self.phone.trim().len() < Self::MIN_PHONE_LEN {
            return Err(DomainError::InvalidInput(
                "shippingAddress.phone must be a valid phone number".to_string(),
            ));
        }
        Ok(())
    }
}

/// How the customer intends to pay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    CreditCard,
    Momo,
    BankTransfer,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::CreditCard => "CREDIT_CARD",
            PaymentMethod::Momo => "MOMO",
            PaymentMethod::BankTransfer => "BANK_TRANSFER",
        }
    }
}

impl std::str::FromStr for PaymentMethod {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREDIT_CARD" => Ok(PaymentMethod::CreditCard),
            "MOMO" => Ok(PaymentMethod::Momo),
            "BANK_TRANSFER" => Ok(PaymentMethod::BankTransfer),
            other => Err(DomainError::InvalidInput(format!(
                "unknown payment method: {other}"
            ))),
        }
    }
}

/// Settlement state of a payment. Only `Pending` is set by this system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Completed,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Completed => "COMPLETED",
            PaymentStatus::Failed => "FAILED",
        }
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(PaymentStatus::Pending),
            "COMPLETED" => Ok(PaymentStatus::Completed),
            "FAILED" => Ok(PaymentStatus::Failed),
            other => Err(DomainError::InvalidInput(format!(
                "unknown payment status: {other}"
            ))),
        }
    }
}

/// Bookkeeping record of what is owed for an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: PaymentId,
    pub order_id: OrderId,
    pub amount: Money,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
}

/// Append-only audit entry for an order or one of its items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: HistoryEntryId,
    pub order_id: OrderId,
    /// Set when the entry records an item-level transition.
    pub order_item_id: Option<OrderItemId>,
    pub status: String,
    pub note: String,
    pub actor_id: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn new(
        order_id: OrderId,
        order_item_id: Option<OrderItemId>,
        status: &str,
        note: impl Into<String>,
        actor_id: Option<UserId>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: HistoryEntryId::new(),
            order_id,
            order_item_id,
            status: status.to_string(),
            note: note.into(),
            actor_id,
            created_at,
        }
    }
}

/// Optional carrier data supplied when shipping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipmentDetails {
    #[serde(default)]
    pub tracking_number: Option<String>,
    #[serde(default)]
    pub carrier: Option<String>,
}

/// A shop's request to move one line item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemStatusUpdate {
    pub status: FulfillmentStatus,
    #[serde(default)]
    pub tracking_number: Option<String>,
    #[serde(default)]
    pub carrier_name: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl ItemStatusUpdate {
    pub fn to(status: FulfillmentStatus) -> Self {
        Self {
            status,
            tracking_number: None,
            carrier_name: None,
            notes: None,
        }
    }
}

/// A signed stock movement for one product. Positive puts units back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAdjustment {
    pub product_id: ProductId,
    pub quantity: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address() -> ShippingAddress {
        ShippingAddress {
            full_name: "Ama Mensah".to_string(),
            street: "12 Oxford St".to_string(),
            city: "Accra".to_string(),
            state: "Greater Accra".to_string(),
            zip_code: None,
            country: "Ghana".to_string(),
            phone: "0241234567".to_string(),
        }
    }

    #[test]
    fn valid_address_passes() {
        assert!(address().validate().is_ok());
    }

    #[test]
    fn blank_fields_and_short_phone_fail() {
        let mut blank = address();
        blank.city = "  ".to_string();
        assert!(matches!(
            blank.validate(),
            Err(DomainError::InvalidInput(msg)) if msg.contains("city")
        ));

        let mut short = address();
        short.phone = "024".to_string();
        assert!(short.validate().is_err());
    }

    #[test]
    fn country_defaults_when_missing() {
        let json = serde_json::json!({
            "fullName": "Kofi",
            "street": "1 Ring Rd",
            "city": "Kumasi",
            "state": "Ashanti",
            "phone": "0201234567"
        });
        let parsed: ShippingAddress = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.country, "Ghana");
        assert!(parsed.zip_code.is_none());
    }

    #[test]
    fn payment_method_wire_names() {
        assert_eq!(
            serde_json::to_string(&PaymentMethod::BankTransfer).unwrap(),
            "\"BANK_TRANSFER\""
        );
        assert_eq!(
            "MOMO".parse::<PaymentMethod>().unwrap(),
            PaymentMethod::Momo
        );
        assert!("CASH".parse::<PaymentMethod>().is_err());
    }
}
