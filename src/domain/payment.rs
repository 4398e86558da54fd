use serde::{Deserialize, Serialize};

use super::errors::DomainError;

// ============================================================================
// Payment Value Object
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
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
pub struct PaymentParams {
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

impl Payment {
    pub fn new(params: PaymentParams) -> Result<Self, DomainError> {
        if params.transaction.is_empty() {
            return Err(DomainError::MissingRequiredField("payment.transaction"));
        }
        if params.currency.is_empty() {
            return Err(DomainError::MissingRequiredField("payment.currency"));
        }

        let amounts = [
            ("payment.amount", params.amount),
            ("payment.payment_dt", params.payment_dt),
            ("payment.delivery_cost", params.delivery_cost),
            ("payment.goods_total", params.goods_total),
            ("payment.custom_fee", params.custom_fee),
        ];
        for (field, value) in amounts {
            if value < 0 {
                return Err(DomainError::invalid(field, "is below zero"));
            }
        }

        Ok(Self {
            transaction: params.transaction,
            request_id: params.request_id,
            currency: params.currency,
            provider: params.provider,
            amount: params.amount,
            payment_dt: params.payment_dt,
            bank: params.bank,
            delivery_cost: params.delivery_cost,
            goods_total: params.goods_total,
            custom_fee: params.custom_fee,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> PaymentParams {
        PaymentParams {
            transaction: "b563feb7b2b84b6test".to_string(),
            request_id: String::new(),
            currency: "USD".to_string(),
            provider: "wbpay".to_string(),
            amount: 1817,
            payment_dt: 1637907727,
            bank: "alpha".to_string(),
            delivery_cost: 1500,
            goods_total: 317,
            custom_fee: 0,
        }
    }

    #[test]
    fn test_valid_payment_keeps_fields() {
        let payment = Payment::new(params()).unwrap();
        assert_eq!(payment.amount, 1817);
        assert_eq!(payment.delivery_cost, 1500);
        assert_eq!(payment.request_id, "");
    }

    #[test]
    fn test_transaction_and_currency_required() {
        let mut p = params();
        p.transaction.clear();
        assert_eq!(
            Payment::new(p).unwrap_err(),
            DomainError::MissingRequiredField("payment.transaction")
        );

        let mut p = params();
        p.currency.clear();
        assert_eq!(
            Payment::new(p).unwrap_err(),
            DomainError::MissingRequiredField("payment.currency")
        );
    }

    #[test]
    fn test_negative_amounts_rejected() {
        let mut p = params();
        p.goods_total = -1;
        assert_eq!(Payment::new(p).unwrap_err().field(), "payment.goods_total");

        let mut p = params();
        p.custom_fee = -10;
        assert_eq!(Payment::new(p).unwrap_err().field(), "payment.custom_fee");
    }

    #[test]
    fn test_zero_amounts_allowed() {
        let mut p = params();
        p.amount = 0;
        p.delivery_cost = 0;
        assert!(Payment::new(p).is_ok());
    }
}
