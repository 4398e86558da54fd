use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Delivery, Item, Order, Payment};

// ============================================================================
// HTTP projections of the order aggregate
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderResponse {
    pub order_uid: String,
    pub track_number: String,
    pub delivery: DeliveryResponse,
    pub payment: PaymentResponse,
    pub items: Vec<ItemResponse>,
    pub customer_id: String,
    pub delivery_service: String,
    pub date_created: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryResponse {
    pub name: String,
    pub phone: String,
    pub zip: String,
    pub city: String,
    pub address: String,
    pub region: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentResponse {
    pub transaction: String,
    pub request_id: String,
    pub currency: String,
    pub provider: String,
    pub amount: i64,
    pub bank: String,
    pub delivery_cost: i64,
    pub goods_total: i64,
    pub custom_fee: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemResponse {
    pub chrt_id: i64,
    pub track_number: String,
    pub price: i64,
    pub name: String,
    pub sale: i64,
    pub size: String,
    pub total_price: i64,
    pub brand: String,
    pub status: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: u16,
    pub message: String,
}

impl From<&Order> for OrderResponse {
    fn from(order: &Order) -> Self {
        Self {
            order_uid: order.order_uid.clone(),
            track_number: order.track_number.clone(),
            delivery: DeliveryResponse::from(&order.delivery),
            payment: PaymentResponse::from(&order.payment),
            items: order.items.iter().map(ItemResponse::from).collect(),
            customer_id: order.customer_id.clone(),
            delivery_service: order.delivery_service.clone(),
            date_created: order.date_created,
        }
    }
}

impl From<&Delivery> for DeliveryResponse {
    fn from(delivery: &Delivery) -> Self {
        Self {
            name: delivery.name.clone(),
            phone: delivery.phone.clone(),
            zip: delivery.zip.clone(),
            city: delivery.city.clone(),
            address: delivery.address.clone(),
            region: delivery.region.clone(),
            email: delivery.email.clone(),
        }
    }
}

impl From<&Payment> for PaymentResponse {
    fn from(payment: &Payment) -> Self {
        Self {
            transaction: payment.transaction.clone(),
            request_id: payment.request_id.clone(),
            currency: payment.currency.clone(),
            provider: payment.provider.clone(),
            amount: payment.amount,
            bank: payment.bank.clone(),
            delivery_cost: payment.delivery_cost,
            goods_total: payment.goods_total,
            custom_fee: payment.custom_fee,
        }
    }
}

impl From<&Item> for ItemResponse {
    fn from(item: &Item) -> Self {
        Self {
            chrt_id: item.chrt_id,
            track_number: item.track_number.clone(),
            price: item.price,
            name: item.name.clone(),
            sale: item.sale,
            size: item.size.clone(),
            total_price: item.total_price,
            brand: item.brand.clone(),
            status: item.status,
        }
    }
}
