use serde::{Deserialize, Serialize};

use super::errors::DomainError;

// ============================================================================
// Item Value Object
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
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

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ItemParams {
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

impl Item {
    fn new(index: usize, params: ItemParams) -> Result<Self, DomainError> {
        if params.price < 0 {
            return Err(DomainError::InvalidItem {
                index,
                field: "price",
                reason: "is below zero",
            });
        }
        if params.total_price < 0 {
            return Err(DomainError::InvalidItem {
                index,
                field: "total_price",
                reason: "is below zero",
            });
        }

        Ok(Self {
            chrt_id: params.chrt_id,
            track_number: params.track_number,
            price: params.price,
            rid: params.rid,
            name: params.name,
            sale: params.sale,
            size: params.size,
            total_price: params.total_price,
            nm_id: params.nm_id,
            brand: params.brand,
            status: params.status,
        })
    }

    /// Build the item list of an order. At least one item is required.
    pub fn new_list(params: Vec<ItemParams>) -> Result<Vec<Self>, DomainError> {
        if params.is_empty() {
            return Err(DomainError::invalid("items", "must not be empty"));
        }

        params
            .into_iter()
            .enumerate()
            .map(|(index, p)| Item::new(index, p))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> ItemParams {
        ItemParams {
            chrt_id: 9934930,
            track_number: "WBILMTESTTRACK".to_string(),
            price: 453,
            rid: "ab4219087a764ae0btest".to_string(),
            name: "Mascaras".to_string(),
            sale: 30,
            size: "0".to_string(),
            total_price: 317,
            nm_id: 2389212,
            brand: "Vivienne Sabo".to_string(),
            status: 202,
        }
    }

    #[test]
    fn test_item_list_preserves_order() {
        let mut second = params();
        second.chrt_id = 1;
        let items = Item::new_list(vec![params(), second]).unwrap();

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].chrt_id, 9934930);
        assert_eq!(items[1].chrt_id, 1);
    }

    #[test]
    fn test_empty_item_list_rejected() {
        let err = Item::new_list(vec![]).unwrap_err();
        assert_eq!(err.field(), "items");
    }

    #[test]
    fn test_negative_prices_rejected_with_index() {
        let mut bad = params();
        bad.total_price = -1;
        let err = Item::new_list(vec![params(), bad]).unwrap_err();

        assert_eq!(
            err,
            DomainError::InvalidItem {
                index: 1,
                field: "total_price",
                reason: "is below zero",
            }
        );

        let mut bad = params();
        bad.price = -5;
        assert_eq!(Item::new_list(vec![bad]).unwrap_err().field(), "price");
    }
}
