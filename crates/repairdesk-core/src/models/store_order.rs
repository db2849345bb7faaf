use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
pub enum StoreOrderStatus {
    #[default]
    Pending,
    Ordered,
    Received,
    Cancelled,
}

impl StoreOrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreOrderStatus::Pending => "pending",
            StoreOrderStatus::Ordered => "ordered",
            StoreOrderStatus::Received => "received",
            StoreOrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(StoreOrderStatus::Pending),
            "ordered" => Some(StoreOrderStatus::Ordered),
            "received" => Some(StoreOrderStatus::Received),
            "cancelled" => Some(StoreOrderStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, StoreOrderStatus::Pending | StoreOrderStatus::Ordered)
    }
}

impl fmt::Display for StoreOrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parts order placed with a supplier (`/tech/store-orders/`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
pub struct StoreOrder {
    pub id: i64,
    pub supplier: i64,
    #[serde(default)]
    pub supplier_name: Option<String>,
    #[serde(default)]
    pub status: StoreOrderStatus,
    #[serde(default)]
    pub order_date: Option<String>,
    #[serde(default)]
    pub expected_delivery_date: Option<String>,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub items_description: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

/// Body for `POST /tech/store-orders/`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
pub struct NewStoreOrder {
    pub supplier: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_delivery_date: Option<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub notes: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub items_description: String,
}

/// PATCH body for a store order; only set fields are sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
pub struct StoreOrderUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supplier: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<StoreOrderStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_delivery_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items_description: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_order_from_api() {
        let order: StoreOrder = serde_json::from_str(
            r#"{"id": 3, "supplier_name": "PiecesPro", "status": "ordered",
                "order_date": "2024-03-01T09:00:00Z", "expected_delivery_date": "2024-03-08",
                "notes": "", "items_description": "2x iPhone 12 screen",
                "created_at": "2024-03-01T09:00:00Z", "updated_at": "2024-03-01T09:00:00Z",
                "supplier": 5}"#,
        )
        .unwrap();
        assert_eq!(order.status, StoreOrderStatus::Ordered);
        assert!(order.status.is_open());
        assert_eq!(order.supplier, 5);
    }

    #[test]
    fn test_status_parse() {
        assert_eq!(StoreOrderStatus::parse("received"), Some(StoreOrderStatus::Received));
        assert_eq!(StoreOrderStatus::parse("shipped"), None);
        assert!(!StoreOrderStatus::Cancelled.is_open());
    }
}
