use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

/// An order together with its delivery, payment and line items.
///
/// Fields absent from the inbound JSON decode to their zero value so that
/// [`Order::validate`] decides acceptability rather than the decoder.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Order {
    pub order_uid: String,
    pub track_number: String,
    pub entry: String,
    pub delivery: Delivery,
    pub payment: Payment,
    pub items: Vec<Item>,
    pub locale: String,
    pub internal_signature: String,
    pub customer_id: String,
    pub delivery_service: String,
    pub shardkey: String,
    pub sm_id: i32,
    pub date_created: String,
    pub oof_shard: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Delivery {
    pub name: String,
    pub phone: String,
    pub zip: String,
    pub city: String,
    pub address: String,
    pub region: String,
    pub email: String,
}

/// Payment amounts are integers in currency minor units.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Payment {
    pub transaction: String,
    pub request_id: String,
    pub currency: String,
    pub provider: String,
    pub amount: i64,
    pub payment_dt: i64,
    pub bank: String,
    pub delivery_cost: i64,
    pub goods_total: i64,
    pub custom_fee: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Item {
    pub chrt_id: i64,
    pub track_number: String,
    pub price: i64,
    pub rid: String,
    pub name: String,
    pub sale: i64,
    pub size: String,
    pub total_price: i64,
    pub nm_id: i64,
    pub brand: String,
    pub status: i64,
}

impl Order {
    /// Decode an order from a raw message payload
    pub fn from_slice(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }

    /// Structural checks applied before an order is persisted.
    ///
    /// Only the fields the store and the read path depend on are checked:
    /// a non-empty identifier, at least one item, a reachable recipient and
    /// a non-negative payment amount.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.order_uid.trim().is_empty() {
            return Err(DomainError::EmptyOrderUid);
        }

        if self.items.is_empty() {
            return Err(DomainError::NoItems(self.order_uid.clone()));
        }

        if self.delivery.name.trim().is_empty() || self.delivery.phone.trim().is_empty() {
            return Err(DomainError::IncompleteDelivery {
                order_uid: self.order_uid.clone(),
                name: self.delivery.name.clone(),
                phone: self.delivery.phone.clone(),
            });
        }

        if self.payment.amount < 0 {
            return Err(DomainError::NegativeAmount {
                order_uid: self.order_uid.clone(),
                amount: self.payment.amount,
            });
        }

        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }
}
