use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::delivery::{Delivery, DeliveryParams};
use super::errors::DomainError;
use super::item::{Item, ItemParams};
use super::payment::{Payment, PaymentParams};

// ============================================================================
// Order Aggregate
// ============================================================================
//
// Orders are created once from an ingestion payload and never mutated
// afterwards. Repository and cache hold snapshots of the same value.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
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
    pub sm_id: i64,
    pub date_created: DateTime<Utc>,
    pub oof_shard: String,
}

/// Raw order-creation payload as it arrives on the orders topic.
///
/// Every field defaults when absent so that a structurally incomplete payload
/// still decodes and is rejected by validation rather than by the decoder.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrderParams {
    pub order_uid: String,
    pub track_number: String,
    pub entry: String,
    pub delivery: DeliveryParams,
    pub payment: PaymentParams,
    pub items: Vec<ItemParams>,
    pub locale: String,
    pub internal_signature: String,
    pub customer_id: String,
    pub delivery_service: String,
    pub shardkey: String,
    pub sm_id: i64,
    pub date_created: DateTime<Utc>,
    pub oof_shard: String,
}

impl Order {
    /// Validate the payload and build an immutable order.
    ///
    /// Checks run in a fixed order and the first violation wins:
    /// uid, track number, item track numbers, customer id, then delivery,
    /// payment and the item list.
    pub fn new(params: OrderParams) -> Result<Self, DomainError> {
        if params.order_uid.is_empty() {
            return Err(DomainError::MissingRequiredField("order_uid"));
        }
        if params.track_number.is_empty() {
            return Err(DomainError::MissingRequiredField("track_number"));
        }
        if let Some(index) = params
            .items
            .iter()
            .position(|item| item.track_number != params.track_number)
        {
            return Err(DomainError::InvalidItem {
                index,
                field: "track_number",
                reason: "does not match order track_number",
            });
        }
        if params.customer_id.is_empty() {
            return Err(DomainError::MissingRequiredField("customer_id"));
        }

        let delivery = Delivery::new(params.delivery)?;
        let payment = Payment::new(params.payment)?;
        let items = Item::new_list(params.items)?;

        Ok(Self {
            order_uid: params.order_uid,
            track_number: params.track_number,
            entry: params.entry,
            delivery,
            payment,
            items,
            locale: params.locale,
            internal_signature: params.internal_signature,
            customer_id: params.customer_id,
            delivery_service: params.delivery_service,
            shardkey: params.shardkey,
            sm_id: params.sm_id,
            date_created: params.date_created,
            oof_shard: params.oof_shard,
        })
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::TimeZone;

    pub(crate) const SAMPLE_PAYLOAD: &str = r#"{
        "order_uid": "b563feb7b2b84b6test",
        "track_number": "WBILMTESTTRACK",
        "entry": "WBIL",
        "delivery": {
            "name": "Test Testov",
            "phone": "+9720000000",
            "zip": "2639809",
            "city": "Kiryat Mozkin",
            "address": "Ploshad Mira 15",
            "region": "Kraiot",
            "email": "test@gmail.com"
        },
        "payment": {
            "transaction": "b563feb7b2b84b6test",
            "request_id": "",
            "currency": "USD",
            "provider": "wbpay",
            "amount": 1817,
            "payment_dt": 1637907727,
            "bank": "alpha",
            "delivery_cost": 1500,
            "goods_total": 317,
            "custom_fee": 0
        },
        "items": [
            {
                "chrt_id": 9934930,
                "track_number": "WBILMTESTTRACK",
                "price": 453,
                "rid": "ab4219087a764ae0btest",
                "name": "Mascaras",
                "sale": 30,
                "size": "0",
                "total_price": 317,
                "nm_id": 2389212,
                "brand": "Vivienne Sabo",
                "status": 202
            }
        ],
        "locale": "en",
        "internal_signature": "",
        "customer_id": "test",
        "delivery_service": "meest",
        "shardkey": "9",
        "sm_id": 99,
        "date_created": "2021-11-26T06:22:19Z",
        "oof_shard": "1"
    }"#;

    pub(crate) fn sample_params() -> OrderParams {
        serde_json::from_str(SAMPLE_PAYLOAD).unwrap()
    }

    pub(crate) fn sample_order() -> Order {
        Order::new(sample_params()).unwrap()
    }

    #[test]
    fn test_valid_params_preserve_every_field() {
        let params = sample_params();
        let order = Order::new(params.clone()).unwrap();

        // Order and OrderParams share one field layout, so equal JSON means
        // every nested field came through untouched
        assert_eq!(
            serde_json::to_value(&order).unwrap(),
            serde_json::to_value(&params).unwrap()
        );
        assert_eq!(
            order.date_created,
            Utc.with_ymd_and_hms(2021, 11, 26, 6, 22, 19).unwrap()
        );
        assert_eq!(order.payment.payment_dt, 1637907727);
        assert_eq!(order.items[0].rid, "ab4219087a764ae0btest");
    }

    #[test]
    fn test_empty_uid_rejected_first() {
        let mut params = sample_params();
        params.order_uid.clear();
        params.customer_id.clear();

        let err = Order::new(params).unwrap_err();
        assert_eq!(err, DomainError::MissingRequiredField("order_uid"));
    }

    #[test]
    fn test_empty_track_number_rejected() {
        let mut params = sample_params();
        params.track_number.clear();

        let err = Order::new(params).unwrap_err();
        assert_eq!(err.field(), "track_number");
    }

    #[test]
    fn test_item_track_number_must_match_order() {
        let mut params = sample_params();
        let mut other = params.items[0].clone();
        other.track_number = "OTHERTRACK".to_string();
        params.items.push(other);

        let err = Order::new(params).unwrap_err();
        assert!(matches!(
            err,
            DomainError::InvalidItem { index: 1, field: "track_number", .. }
        ));
    }

    #[test]
    fn test_track_number_checked_before_customer() {
        let mut params = sample_params();
        params.items[0].track_number = "OTHERTRACK".to_string();
        params.customer_id.clear();

        let err = Order::new(params).unwrap_err();
        assert_eq!(err.field(), "track_number");
    }

    #[test]
    fn test_nested_validation_errors_propagate() {
        let mut params = sample_params();
        params.delivery.zip.clear();
        assert_eq!(Order::new(params).unwrap_err().field(), "delivery.zip");

        let mut params = sample_params();
        params.payment.amount = -1;
        assert_eq!(Order::new(params).unwrap_err().field(), "payment.amount");

        let mut params = sample_params();
        params.items.clear();
        assert_eq!(Order::new(params).unwrap_err().field(), "items");
    }

    #[test]
    fn test_partial_payload_decodes_with_defaults() {
        let params: OrderParams = serde_json::from_str(r#"{"order_uid": "12345"}"#).unwrap();
        assert_eq!(params.order_uid, "12345");
        assert!(params.items.is_empty());
        assert!(Order::new(params).is_err());
    }

    mod properties {
        use super::*;
        use chrono::TimeZone;
        use proptest::prelude::*;

        fn text() -> impl Strategy<Value = String> {
            "[a-zA-Z0-9 +@.]{0,16}"
        }

        fn required() -> impl Strategy<Value = String> {
            "[a-zA-Z0-9]{1,16}"
        }

        fn amount() -> impl Strategy<Value = i64> {
            0i64..1_000_000_000
        }

        prop_compose! {
            fn delivery_params()(
                name in text(),
                phone in required(),
                zip in required(),
                city in required(),
                address in required(),
                region in required(),
                email in text(),
            ) -> DeliveryParams {
                DeliveryParams { name, phone, zip, city, address, region, email }
            }
        }

        prop_compose! {
            fn payment_params()(
                transaction in required(),
                request_id in text(),
                currency in required(),
                provider in text(),
                amount in amount(),
                payment_dt in amount(),
                bank in text(),
                delivery_cost in amount(),
                goods_total in amount(),
                custom_fee in amount(),
            ) -> PaymentParams {
                PaymentParams {
                    transaction,
                    request_id,
                    currency,
                    provider,
                    amount,
                    payment_dt,
                    bank,
                    delivery_cost,
                    goods_total,
                    custom_fee,
                }
            }
        }

        prop_compose! {
            fn item_params(track_number: String)(
                chrt_id in any::<i64>(),
                price in amount(),
                rid in text(),
                name in text(),
                sale in any::<i64>(),
                size in text(),
                total_price in amount(),
                nm_id in any::<i64>(),
                brand in text(),
                status in any::<i64>(),
            ) -> ItemParams {
                ItemParams {
                    chrt_id,
                    track_number: track_number.clone(),
                    price,
                    rid,
                    name,
                    sale,
                    size,
                    total_price,
                    nm_id,
                    brand,
                    status,
                }
            }
        }

        prop_compose! {
            fn valid_params()(track_number in required())(
                items in prop::collection::vec(item_params(track_number.clone()), 1..5),
                track_number in Just(track_number),
                ids in (required(), required()),
                delivery in delivery_params(),
                payment in payment_params(),
                strings in (text(), text(), text(), text(), text(), text()),
                sm_id in any::<i64>(),
                created_secs in 0i64..4_000_000_000,
            ) -> OrderParams {
                let (order_uid, customer_id) = ids;
                let (entry, locale, internal_signature, delivery_service, shardkey, oof_shard) = strings;
                OrderParams {
                    order_uid,
                    track_number,
                    entry,
                    delivery,
                    payment,
                    items,
                    locale,
                    internal_signature,
                    customer_id,
                    delivery_service,
                    shardkey,
                    sm_id,
                    date_created: Utc.timestamp_opt(created_secs, 0).unwrap(),
                    oof_shard,
                }
            }
        }

        proptest! {
            #[test]
            fn valid_params_are_preserved(params in valid_params()) {
                let order = Order::new(params.clone());
                prop_assert!(order.is_ok(), "rejected valid params: {:?}", order);

                let order = order.unwrap();
                prop_assert_eq!(
                    serde_json::to_value(&order).unwrap(),
                    serde_json::to_value(&params).unwrap()
                );
            }

            #[test]
            fn mismatched_item_track_number_is_rejected(
                params in valid_params(),
                pick in any::<prop::sample::Index>(),
                other in required(),
            ) {
                prop_assume!(other != params.track_number);

                let mut params = params;
                let index = pick.index(params.items.len());
                params.items[index].track_number = other;

                let err = Order::new(params).unwrap_err();
                prop_assert!(
                    matches!(
                        err,
                        DomainError::InvalidItem { index: i, field: "track_number", .. } if i == index
                    ),
                    "unexpected error: {:?}",
                    err
                );
            }
        }
    }
}
